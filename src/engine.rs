//! The routing engine: validation, the mutation API, and the locking
//! discipline around the table.
//!
//! All mutation (add, delete, device flush) runs under the write half
//! of an `RwLock`, so a redirect handler installing a route from
//! another thread serializes with administrative changes and an
//! observer can never see a half-applied replace. Resolution and
//! snapshots take the read half: concurrent lookups proceed in
//! parallel, wait only while a mutation is mid-flight, and can never
//! observe a torn entry. Use counters are atomic, so resolution never
//! needs write access.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::iface::{Iface, IfaceConfig, HEADER_SIZE};
use crate::ipv4::{classful_mask, Ipv4Address, Ipv4Mask};
use crate::route::{RouteEntry, RouteFlags, RouteView};
use crate::table::{NoRoute, Resolved, RouteTable};

/// A route request was refused and the table left unchanged.
///
/// Refusals are ordinary outcomes of validation, not faults; a caller
/// with no use for the reason is free to discard it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejected {
    /// A redirect-installed route may not point onto the interface's
    /// own network.
    #[error("dynamic route onto own network")]
    DynamicOnOwnNetwork,
    /// No directly attached network contains the gateway.
    #[error("gateway is not directly reachable")]
    GatewayUnreachable,
    /// The gateway is reachable, but through a different interface than
    /// the request named.
    #[error("gateway is reached through a different interface")]
    GatewayInterfaceMismatch,
}

/// The routing table engine.
///
/// One `Router` is process-wide shared state: clone an `Arc<Router>`
/// into whatever contexts mutate or resolve routes.
#[derive(Debug, Default)]
pub struct Router {
    table: RwLock<RouteTable>,
}

/// Derives a mask for a destination no mask was supplied for: the
/// classful default, unless the destination still overlaps the
/// interface's own network under that classful mask, in which case the
/// interface's more specific configured mask wins (the sub-netted local
/// network case). The zero destination gets the empty mask.
fn guess_mask(destination: Ipv4Address, config: &IfaceConfig) -> Ipv4Mask {
    if destination.is_unspecified() {
        return Ipv4Mask::ANY;
    }
    let mask = classful_mask(destination);
    if (destination.to_u32() ^ config.address.to_u32()) & mask.to_u32() != 0 {
        mask
    } else {
        config.mask
    }
}

impl Router {
    /// Creates an engine with an empty table.
    pub fn new() -> Self {
        Default::default()
    }

    /// Validates and installs a route.
    ///
    /// `mask` may be omitted to have it derived from the interface or
    /// the destination's address class; `gateway` may be omitted for
    /// directly attached networks. `mss` and `window` are ignored
    /// unless the corresponding override flag is set. The committed
    /// entry always carries [`RouteFlags::UP`] and replaces any
    /// existing entry with the same `(destination, mask)` pair.
    #[allow(clippy::too_many_arguments)]
    pub fn add_route(
        &self,
        flags: RouteFlags,
        destination: Ipv4Address,
        mask: Option<Ipv4Mask>,
        gateway: Option<Ipv4Address>,
        iface: &Arc<Iface>,
        mss: u32,
        window: u32,
    ) -> Result<(), Rejected> {
        let config = iface.config();
        let mut flags = flags;

        // A host is a unique machine and has no network bits.
        let mask = if flags.contains(RouteFlags::HOST) {
            Ipv4Mask::HOST
        } else if let Some(mask) = mask {
            mask
        } else if (destination.to_u32() ^ config.address.to_u32()) & config.mask.to_u32() == 0 {
            // The destination is on our own attached network: adopt the
            // interface's mask and reach it directly. A redirect must
            // never install such a route.
            flags = flags.without(RouteFlags::GATEWAY);
            if flags.contains(RouteFlags::DYNAMIC) {
                tracing::debug!(%destination, dev = %iface, "dynamic route onto own network rejected");
                return Err(Rejected::DynamicOnOwnNetwork);
            }
            config.mask
        } else {
            guess_mask(destination, &config)
        };
        let destination = destination.masked(mask);

        // A gateway that is absent or the interface's own address
        // demotes the route to a direct one.
        let mut gateway = gateway.unwrap_or(Ipv4Address::UNSPECIFIED);
        if gateway.is_unspecified() || gateway == config.address {
            flags = flags.without(RouteFlags::GATEWAY);
        }
        if !flags.contains(RouteFlags::GATEWAY) {
            gateway = Ipv4Address::UNSPECIFIED;
        }

        let flags = flags.with(RouteFlags::UP);
        let mss = if flags.contains(RouteFlags::MSS) {
            mss
        } else {
            config.mtu.saturating_sub(HEADER_SIZE)
        };
        let window = if flags.contains(RouteFlags::WINDOW) {
            window
        } else {
            0
        };

        let mut table = self.write();
        if flags.contains(RouteFlags::GATEWAY) {
            // Don't try to add a gateway we can't reach. The check runs
            // under the write lock so the entry it relies on cannot be
            // deleted before the commit.
            match table.gateway_iface(gateway) {
                Some(via) if Arc::ptr_eq(&via, iface) => {}
                Some(via) => {
                    tracing::debug!(%gateway, dev = %via, "gateway belongs to a different interface");
                    return Err(Rejected::GatewayInterfaceMismatch);
                }
                None => {
                    tracing::debug!(%gateway, "gateway not directly reachable");
                    return Err(Rejected::GatewayUnreachable);
                }
            }
        }
        table.commit(RouteEntry::new(
            destination,
            mask,
            gateway,
            Arc::clone(iface),
            flags,
            mss,
            window,
        ));
        tracing::debug!(%destination, %mask, %gateway, dev = %iface, %flags, "route added");
        Ok(())
    }

    /// Removes every route with exactly this destination; with an
    /// interface name, only that interface's routes. Removing nothing
    /// is not an error.
    pub fn delete_route(&self, destination: Ipv4Address, iface_name: Option<&str>) {
        let removed = self.write().delete(destination, iface_name);
        if removed > 0 {
            tracing::debug!(%destination, removed, "route deleted");
        }
    }

    /// Removes every route through `iface`. Called when the device goes
    /// down.
    pub fn flush_routes(&self, iface: &Arc<Iface>) {
        let removed = self.write().flush(iface);
        if removed > 0 {
            tracing::debug!(dev = %iface, removed, "routes flushed");
        }
    }

    /// Resolves a destination for packet forwarding: the first entry in
    /// specificity order whose network matches wins, gateway routes
    /// included, with the broadcast and loopback special cases of the
    /// table scan. With `want_source`, the selected interface's address
    /// is returned alongside the route.
    pub fn resolve_forwarding(
        &self,
        destination: Ipv4Address,
        want_source: bool,
    ) -> Result<Resolved, NoRoute> {
        self.read().resolve_forwarding(destination, want_source)
    }

    /// Resolves a destination for local delivery: like
    /// [`resolve_forwarding`](Self::resolve_forwarding) but gateway
    /// routes are never selected, so the result names the directly
    /// attached interface or nothing.
    pub fn resolve_local(
        &self,
        destination: Ipv4Address,
        want_source: bool,
    ) -> Result<Resolved, NoRoute> {
        self.read().resolve_local(destination, want_source)
    }

    /// An ordered snapshot of the table for diagnostic reporting.
    pub fn snapshot(&self) -> Vec<RouteView> {
        self.read().snapshot()
    }

    // A poisoned lock still holds a structurally sound table, so
    // recover the guard instead of propagating the panic.
    fn read(&self) -> RwLockReadGuard<'_, RouteTable> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RouteTable> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }
}
