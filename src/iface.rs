//! Network interface references.
//!
//! The routing engine never manages interfaces; it only reads their
//! current attributes. An [`Iface`] is shared as an `Arc` between the
//! owner (whatever device layer created it) and the route entries that
//! point at it, and its attribute block can be swapped out at runtime
//! without touching the routes.

use std::fmt::{self, Display};
use std::sync::{Arc, RwLock};

use dashmap::DashMap;

use crate::ipv4::{Ipv4Address, Ipv4Mask};

/// Fixed per-packet header allowance (link, IP, and TCP headers plus
/// slop) subtracted from the interface MTU to derive a route's default
/// MSS.
pub const HEADER_SIZE: u32 = 64;

/// Interface status flags, a thin wrapper around a `u16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IfaceFlags(u16);

impl IfaceFlags {
    /// The interface is up.
    pub const UP: Self = Self(0x0001);
    /// The interface supports link-level broadcast.
    pub const BROADCAST: Self = Self(0x0002);
    /// The interface is the loopback device.
    pub const LOOPBACK: Self = Self(0x0008);

    /// No flags set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Returns `true` if every bit of `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for IfaceFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// The mutable attribute block of an interface: everything the routing
/// engine reads, nothing it owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IfaceConfig {
    /// The interface's own address.
    pub address: Ipv4Address,
    /// The network mask configured on the interface.
    pub mask: Ipv4Mask,
    /// The broadcast address of the attached network.
    pub broadcast: Ipv4Address,
    /// Maximum transmission unit.
    pub mtu: u32,
    /// Status flags.
    pub flags: IfaceFlags,
}

/// A network interface as seen by the routing engine.
///
/// Attributes live behind a lock so the owning device layer can
/// reconfigure the interface while routes still point at it; the engine
/// takes a fresh [`IfaceConfig`] snapshot each time it needs one.
pub struct Iface {
    name: String,
    config: RwLock<IfaceConfig>,
}

impl Iface {
    /// Creates a new shared interface reference.
    pub fn new(name: impl Into<String>, config: IfaceConfig) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            config: RwLock::new(config),
        })
    }

    /// The interface name, e.g. `eth0`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A snapshot of the current attributes.
    pub fn config(&self) -> IfaceConfig {
        *self
            .config
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Replaces the attribute block, e.g. after the device was
    /// reconfigured.
    pub fn update(&self, config: IfaceConfig) {
        *self
            .config
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = config;
    }

    /// Returns `true` if the interface is loopback-flagged.
    pub fn is_loopback(&self) -> bool {
        self.config().flags.contains(IfaceFlags::LOOPBACK)
    }
}

impl fmt::Debug for Iface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iface")
            .field("name", &self.name)
            .field("config", &self.config())
            .finish()
    }
}

impl Display for Iface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A name-to-interface table for embedders that address interfaces by
/// name, the way administrative route requests do.
///
/// The registry is auxiliary: the engine core works on `Arc<Iface>`
/// handles and never consults it.
#[derive(Debug, Default)]
pub struct IfaceRegistry {
    ifaces: DashMap<String, Arc<Iface>>,
}

impl IfaceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds an interface, replacing any previous entry with the same
    /// name.
    pub fn register(&self, iface: Arc<Iface>) {
        self.ifaces.insert(iface.name().to_string(), iface);
    }

    /// Looks up an interface by name.
    pub fn get(&self, name: &str) -> Option<Arc<Iface>> {
        self.ifaces.get(name).map(|entry| entry.value().clone())
    }

    /// Removes an interface by name, returning the handle so the caller
    /// can flush its routes.
    pub fn unregister(&self, name: &str) -> Option<Arc<Iface>> {
        self.ifaces.remove(name).map(|(_, iface)| iface)
    }
}
