//! An IPv4 routing table engine: the ordered collection of known
//! destination networks, the gateway and interface each is reached
//! through, and the lookups that resolve an arbitrary destination to
//! the best matching route for forwarding or local delivery.
//!
//! # Organization
//!
//! - [`ipv4`] provides the address and mask types plus classful mask
//!   derivation
//! - [`iface`] provides the read-only view of network interfaces the
//!   engine consumes
//! - [`route`] defines route entries and their flags
//! - [`Router`] is the engine itself: the mutation API (add, delete,
//!   device flush) and the two resolution algorithms
//!
//! # What stays outside
//!
//! The engine does not manage interfaces, check caller permissions,
//! parse administrative request formats, or render the table as text;
//! it exposes [`Router::snapshot`] and expects callers to have done
//! their own marshaling and authorization. Refused requests and failed
//! lookups are typed results ([`Rejected`], [`NoRoute`]), never panics:
//! a missing route is answered with a drop or an ICMP unreachable by
//! the caller, not by this crate.

pub mod iface;
pub mod ipv4;
pub mod route;

mod engine;
mod table;

pub use engine::{Rejected, Router};
pub use iface::{Iface, IfaceConfig, IfaceFlags, IfaceRegistry, HEADER_SIZE};
pub use ipv4::{Ipv4Address, Ipv4Mask};
pub use route::{RouteEntry, RouteFlags, RouteView};
pub use table::{NoRoute, Resolved};
