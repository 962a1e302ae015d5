//! Route entries and their flag bits.

use std::fmt::{self, Display};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::iface::Iface;
use crate::ipv4::{Ipv4Address, Ipv4Mask};

/// Route entry flags, a thin wrapper around a `u16`.
///
/// The override flags `MSS` and `WINDOW` mark the corresponding request
/// fields as meaningful; without them the defaults derived from the
/// interface apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RouteFlags(u16);

impl RouteFlags {
    /// The route is usable. Set on every committed entry.
    pub const UP: Self = Self(0x0001);
    /// Packets must be forwarded to the gateway rather than delivered
    /// on-link.
    pub const GATEWAY: Self = Self(0x0002);
    /// The destination is a single host, not a network.
    pub const HOST: Self = Self(0x0004);
    /// Installed by a redirect, not by an administrator.
    pub const DYNAMIC: Self = Self(0x0010);
    /// The request's `mss` field overrides the interface-derived
    /// default.
    pub const MSS: Self = Self(0x0400);
    /// The request's `window` field overrides the no-clamp default.
    pub const WINDOW: Self = Self(0x0800);

    /// No flags set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Returns `true` if every bit of `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `self` with the bits of `other` added.
    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns `self` with the bits of `other` cleared.
    #[must_use]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl std::ops::BitOr for RouteFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.with(rhs)
    }
}

impl Display for RouteFlags {
    /// Renders the netstat-style letter string, e.g. `UG` for an up
    /// gateway route.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (bit, letter) in [
            (Self::UP, 'U'),
            (Self::GATEWAY, 'G'),
            (Self::HOST, 'H'),
            (Self::DYNAMIC, 'D'),
            (Self::MSS, 'M'),
            (Self::WINDOW, 'W'),
        ] {
            if self.contains(bit) {
                write!(f, "{}", letter)?;
            }
        }
        Ok(())
    }
}

/// One forwarding rule: a destination network, the interface it is
/// reached through, and an optional gateway.
///
/// Entries are created by [`Router::add_route`](crate::Router::add_route)
/// and owned by the table; the only field that changes after commit is
/// the use counter.
#[derive(Debug)]
pub struct RouteEntry {
    /// Destination network address, already masked to its network
    /// portion.
    pub destination: Ipv4Address,
    /// Network mask; all-ones for host routes.
    pub mask: Ipv4Mask,
    /// Next-hop address, or `0.0.0.0` for a directly attached network.
    pub gateway: Ipv4Address,
    /// The interface packets leave through. Borrowed from the device
    /// layer, never owned.
    pub iface: Arc<Iface>,
    /// Route flags.
    pub flags: RouteFlags,
    /// Maximum segment size to advertise over this route.
    pub mss: u32,
    /// Receive-window clamp; 0 means no clamp.
    pub window: u32,
    /// Metric, carried for diagnostics but unused in matching.
    pub metric: u32,
    /// Reference count, carried for diagnostics but unused in matching.
    pub ref_count: u32,
    use_count: AtomicU64,
}

impl RouteEntry {
    pub(crate) fn new(
        destination: Ipv4Address,
        mask: Ipv4Mask,
        gateway: Ipv4Address,
        iface: Arc<Iface>,
        flags: RouteFlags,
        mss: u32,
        window: u32,
    ) -> Self {
        Self {
            destination,
            mask,
            gateway,
            iface,
            flags,
            mss,
            window,
            metric: 0,
            ref_count: 0,
            use_count: AtomicU64::new(0),
        }
    }

    /// Returns `true` if the entry's network contains `destination`.
    pub fn matches(&self, destination: Ipv4Address) -> bool {
        (self.destination.to_u32() ^ destination.to_u32()) & self.mask.to_u32() == 0
    }

    /// Returns `true` if packets on this route go through a gateway.
    pub fn is_gateway_route(&self) -> bool {
        self.flags.contains(RouteFlags::GATEWAY)
    }

    /// How many resolutions have selected this entry.
    pub fn use_count(&self) -> u64 {
        self.use_count.load(Ordering::Relaxed)
    }

    pub(crate) fn note_use(&self) {
        self.use_count.fetch_add(1, Ordering::Relaxed);
    }

    /// An owned snapshot of this entry for diagnostic reporting.
    pub fn view(&self) -> RouteView {
        RouteView {
            iface: self.iface.name().to_string(),
            destination: self.destination,
            gateway: self.gateway,
            flags: self.flags,
            ref_count: self.ref_count,
            use_count: self.use_count(),
            metric: self.metric,
            mask: self.mask,
            mss: self.mss,
            window: self.window,
        }
    }
}

/// An owned copy of one route table row, detached from the table and
/// safe to hold across mutations. This is what diagnostic reporting
/// formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteView {
    pub iface: String,
    pub destination: Ipv4Address,
    pub gateway: Ipv4Address,
    pub flags: RouteFlags,
    pub ref_count: u32,
    pub use_count: u64,
    pub metric: u32,
    pub mask: Ipv4Mask,
    pub mss: u32,
    pub window: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iface::{IfaceConfig, IfaceFlags};

    fn entry(destination: [u8; 4], mask_len: u32) -> RouteEntry {
        let iface = Iface::new(
            "eth0",
            IfaceConfig {
                address: Ipv4Address::new([10, 0, 0, 1]),
                mask: Ipv4Mask::from_bitcount(24),
                broadcast: Ipv4Address::new([10, 0, 0, 255]),
                mtu: 1500,
                flags: IfaceFlags::UP | IfaceFlags::BROADCAST,
            },
        );
        RouteEntry::new(
            Ipv4Address::new(destination),
            Ipv4Mask::from_bitcount(mask_len),
            Ipv4Address::UNSPECIFIED,
            iface,
            RouteFlags::UP,
            1436,
            0,
        )
    }

    #[test]
    fn network_matching() {
        let route = entry([10, 0, 0, 0], 24);
        assert!(route.matches(Ipv4Address::new([10, 0, 0, 5])));
        assert!(route.matches(Ipv4Address::new([10, 0, 0, 255])));
        assert!(!route.matches(Ipv4Address::new([10, 0, 1, 5])));

        let default = entry([0, 0, 0, 0], 0);
        assert!(default.matches(Ipv4Address::new([8, 8, 8, 8])));
    }

    #[test]
    fn flag_letters() {
        let flags = RouteFlags::UP | RouteFlags::GATEWAY | RouteFlags::DYNAMIC;
        assert_eq!(flags.to_string(), "UGD");
        assert_eq!(RouteFlags::empty().to_string(), "");
        assert_eq!(
            (RouteFlags::UP | RouteFlags::HOST | RouteFlags::MSS | RouteFlags::WINDOW).to_string(),
            "UHMW"
        );
    }

    #[test]
    fn flag_set_operations() {
        let flags = RouteFlags::UP | RouteFlags::GATEWAY;
        assert!(flags.contains(RouteFlags::GATEWAY));
        let flags = flags.without(RouteFlags::GATEWAY);
        assert!(!flags.contains(RouteFlags::GATEWAY));
        assert!(flags.contains(RouteFlags::UP));
        assert_eq!(flags.with(RouteFlags::HOST), RouteFlags::UP | RouteFlags::HOST);
    }

    #[test]
    fn use_counter() {
        let route = entry([10, 0, 0, 0], 24);
        assert_eq!(route.use_count(), 0);
        route.note_use();
        route.note_use();
        assert_eq!(route.use_count(), 2);
        assert_eq!(route.view().use_count, 2);
    }
}
