//! The ordered route table and its resolution scans.
//!
//! Entries are kept in descending specificity order: an entry is
//! inserted immediately before the first existing entry whose mask does
//! not cover the new entry's mask. Host routes therefore come first and
//! a default route, if any, comes last; entries with equal masks keep
//! their insertion order. Resolution walks the table front to back and
//! takes the first match, which makes the first match also the most
//! specific one.
//!
//! [`RouteTable`] on its own is not synchronized; the
//! [`Router`](crate::Router) wrapper owns the locking discipline.

use std::sync::{Arc, Weak};

use crate::iface::{Iface, IfaceFlags};
use crate::ipv4::Ipv4Address;
use crate::route::{RouteEntry, RouteView};

/// The table contains no route for the requested destination.
///
/// On the packet path this is an expected outcome, to be answered with
/// a drop or an ICMP unreachable, never a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no route to destination")]
pub struct NoRoute;

/// A successful resolution: the selected route and, when requested, the
/// source address to put on the packet.
#[derive(Debug, Clone)]
pub struct Resolved {
    /// The selected entry. Holding it does not pin it in the table; a
    /// concurrent delete leaves this handle valid but detached.
    pub route: Arc<RouteEntry>,
    /// The selected interface's own address, if the caller asked for
    /// it. Set from the entry matched by the scan even when the
    /// loopback substitution redirects the returned route.
    pub source: Option<Ipv4Address>,
}

/// The ordered collection of route entries plus the designated
/// loopback route.
#[derive(Debug, Default)]
pub(crate) struct RouteTable {
    entries: Vec<Arc<RouteEntry>>,
    /// Weak handle on the designated loopback entry; cleared when that
    /// entry leaves the table and reassigned only by a later loopback
    /// insertion.
    loopback: Weak<RouteEntry>,
}

impl RouteTable {
    pub(crate) fn new() -> Self {
        Default::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Commits a fully validated entry: drops any `(destination, mask)`
    /// duplicate, inserts at the position the specificity order
    /// demands, and designates the entry as the loopback route when its
    /// interface is loopback-flagged and no designation exists.
    pub(crate) fn commit(&mut self, entry: RouteEntry) {
        let entry = Arc::new(entry);

        // Last writer wins: a duplicate is deleted and replaced, never
        // updated in place.
        self.entries.retain(|existing| {
            !(existing.destination == entry.destination && existing.mask == entry.mask)
        });
        self.sync_loopback();

        let position = self
            .entries
            .iter()
            .position(|existing| !entry.mask.covered_by(existing.mask))
            .unwrap_or(self.entries.len());
        self.entries.insert(position, Arc::clone(&entry));

        if entry.iface.is_loopback() && self.loopback.upgrade().is_none() {
            self.loopback = Arc::downgrade(&entry);
        }
    }

    /// Removes every entry with exactly this destination, restricted to
    /// one interface when a name is given. Returns how many entries
    /// were removed.
    pub(crate) fn delete(&mut self, destination: Ipv4Address, iface_name: Option<&str>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| {
            entry.destination != destination
                || iface_name.map_or(false, |name| entry.iface.name() != name)
        });
        self.sync_loopback();
        before - self.entries.len()
    }

    /// Removes every entry owned by `iface`, for when the device goes
    /// down. Returns how many entries were removed.
    pub(crate) fn flush(&mut self, iface: &Arc<Iface>) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|entry| !Arc::ptr_eq(&entry.iface, iface));
        self.sync_loopback();
        before - self.entries.len()
    }

    /// Clears the loopback designation if the designated entry is no
    /// longer in the table. An outstanding [`Resolved`] can keep the
    /// entry itself alive, so presence must be checked by identity.
    fn sync_loopback(&mut self) {
        if let Some(designated) = self.loopback.upgrade() {
            if !self
                .entries
                .iter()
                .any(|entry| Arc::ptr_eq(entry, &designated))
            {
                self.loopback = Weak::new();
            }
        }
    }

    /// Finds the interface through which `gateway` is directly
    /// reachable: the first entry whose network contains the gateway,
    /// provided that entry is not itself a gateway route. A gateway
    /// behind another gateway is unreachable.
    pub(crate) fn gateway_iface(&self, gateway: Ipv4Address) -> Option<Arc<Iface>> {
        for entry in &self.entries {
            if !entry.matches(gateway) {
                continue;
            }
            if entry.is_gateway_route() {
                return None;
            }
            return Some(Arc::clone(&entry.iface));
        }
        None
    }

    /// Forwarding lookup: a gateway route is selected when its network
    /// matches, which is how a default route picks up everything
    /// nothing more specific claims.
    pub(crate) fn resolve_forwarding(
        &self,
        destination: Ipv4Address,
        want_source: bool,
    ) -> Result<Resolved, NoRoute> {
        self.resolve(destination, want_source, false)
    }

    /// Local-delivery lookup: gateway routes are skipped outright, so
    /// the result is always a directly attached interface.
    pub(crate) fn resolve_local(
        &self,
        destination: Ipv4Address,
        want_source: bool,
    ) -> Result<Resolved, NoRoute> {
        self.resolve(destination, want_source, true)
    }

    fn resolve(
        &self,
        destination: Ipv4Address,
        want_source: bool,
        direct_only: bool,
    ) -> Result<Resolved, NoRoute> {
        let selected = self.select(destination, direct_only).ok_or(NoRoute)?;
        let config = selected.iface.config();
        let source = want_source.then_some(config.address);

        // A packet addressed to the host's own interface goes over the
        // designated loopback route; without one there is no route.
        let route = if destination == config.address {
            self.loopback.upgrade().ok_or(NoRoute)?
        } else {
            Arc::clone(selected)
        };
        route.note_use();
        Ok(Resolved { route, source })
    }

    fn select(&self, destination: Ipv4Address, direct_only: bool) -> Option<&Arc<RouteEntry>> {
        self.entries.iter().find(|entry| {
            if direct_only && entry.is_gateway_route() {
                return false;
            }
            if entry.matches(destination) {
                return true;
            }
            if entry.is_gateway_route() {
                return false;
            }
            // Direct routes also claim their network's broadcast
            // address when the interface can broadcast.
            let config = entry.iface.config();
            config.flags.contains(IfaceFlags::BROADCAST) && config.broadcast == destination
        })
    }

    pub(crate) fn snapshot(&self) -> Vec<RouteView> {
        self.entries.iter().map(|entry| entry.view()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iface::IfaceConfig;
    use crate::ipv4::Ipv4Mask;
    use crate::route::RouteFlags;

    fn eth(name: &str, address: [u8; 4]) -> Arc<Iface> {
        Iface::new(
            name,
            IfaceConfig {
                address: Ipv4Address::new(address),
                mask: Ipv4Mask::from_bitcount(24),
                broadcast: Ipv4Address::new([address[0], address[1], address[2], 255]),
                mtu: 1500,
                flags: IfaceFlags::UP | IfaceFlags::BROADCAST,
            },
        )
    }

    fn lo() -> Arc<Iface> {
        Iface::new(
            "lo",
            IfaceConfig {
                address: Ipv4Address::LOCALHOST,
                mask: Ipv4Mask::from_bitcount(8),
                broadcast: Ipv4Address::UNSPECIFIED,
                mtu: 65536,
                flags: IfaceFlags::UP | IfaceFlags::LOOPBACK,
            },
        )
    }

    fn entry(
        destination: [u8; 4],
        mask_len: u32,
        gateway: [u8; 4],
        iface: &Arc<Iface>,
    ) -> RouteEntry {
        let gateway = Ipv4Address::new(gateway);
        let flags = if gateway.is_unspecified() {
            RouteFlags::UP
        } else {
            RouteFlags::UP | RouteFlags::GATEWAY
        };
        RouteEntry::new(
            Ipv4Address::new(destination),
            Ipv4Mask::from_bitcount(mask_len),
            gateway,
            Arc::clone(iface),
            flags,
            1436,
            0,
        )
    }

    fn mask_lens(table: &RouteTable) -> Vec<u32> {
        table
            .entries
            .iter()
            .map(|entry| entry.mask.count_ones())
            .collect()
    }

    #[test]
    fn insertion_keeps_specificity_order() {
        let dev = eth("eth0", [10, 0, 0, 1]);
        let mut table = RouteTable::new();
        table.commit(entry([0, 0, 0, 0], 0, [0, 0, 0, 0], &dev));
        table.commit(entry([10, 0, 0, 0], 16, [0, 0, 0, 0], &dev));
        table.commit(entry([10, 0, 0, 5], 32, [0, 0, 0, 0], &dev));
        table.commit(entry([10, 0, 0, 0], 24, [0, 0, 0, 0], &dev));

        assert_eq!(mask_lens(&table), vec![32, 24, 16, 0]);
    }

    #[test]
    fn equal_masks_keep_insertion_order() {
        let dev = eth("eth0", [10, 0, 0, 1]);
        let mut table = RouteTable::new();
        table.commit(entry([10, 0, 1, 0], 24, [0, 0, 0, 0], &dev));
        table.commit(entry([10, 0, 2, 0], 24, [0, 0, 0, 0], &dev));
        table.commit(entry([10, 0, 3, 0], 24, [0, 0, 0, 0], &dev));

        let destinations: Vec<Ipv4Address> =
            table.entries.iter().map(|entry| entry.destination).collect();
        assert_eq!(
            destinations,
            vec![
                Ipv4Address::new([10, 0, 1, 0]),
                Ipv4Address::new([10, 0, 2, 0]),
                Ipv4Address::new([10, 0, 3, 0]),
            ]
        );
    }

    #[test]
    fn duplicate_replaces_existing_entry() {
        let dev = eth("eth0", [10, 0, 0, 1]);
        let mut table = RouteTable::new();
        table.commit(entry([10, 0, 0, 0], 24, [0, 0, 0, 0], &dev));
        table.commit(entry([10, 1, 0, 0], 24, [0, 0, 0, 0], &dev));
        table.commit(entry([10, 0, 0, 0], 24, [10, 1, 0, 9], &dev));

        assert_eq!(table.len(), 2);
        let replaced = table
            .entries
            .iter()
            .find(|entry| entry.destination == Ipv4Address::new([10, 0, 0, 0]))
            .unwrap();
        assert_eq!(replaced.gateway, Ipv4Address::new([10, 1, 0, 9]));
    }

    #[test]
    fn loopback_designation_lifecycle() {
        let dev = eth("eth0", [10, 0, 0, 1]);
        let lo = lo();
        let mut table = RouteTable::new();
        table.commit(entry([10, 0, 0, 0], 24, [0, 0, 0, 0], &dev));
        assert!(table.loopback.upgrade().is_none());

        table.commit(entry([127, 0, 0, 1], 32, [0, 0, 0, 0], &lo));
        let designated = table.loopback.upgrade().expect("designated");
        assert_eq!(designated.destination, Ipv4Address::LOCALHOST);

        // A second loopback route does not steal the designation.
        table.commit(entry([127, 0, 0, 0], 8, [0, 0, 0, 0], &lo));
        let still = table.loopback.upgrade().expect("still designated");
        assert!(Arc::ptr_eq(&still, &designated));

        // Deleting the designated entry clears the designation without
        // reassigning it to the surviving loopback route.
        table.delete(Ipv4Address::LOCALHOST, None);
        assert!(table.loopback.upgrade().is_none());

        // The next loopback insertion designates again.
        table.commit(entry([127, 0, 0, 1], 32, [0, 0, 0, 0], &lo));
        assert!(table.loopback.upgrade().is_some());
    }

    #[test]
    fn duplicate_of_designated_entry_transfers_designation() {
        let lo = lo();
        let mut table = RouteTable::new();
        table.commit(entry([127, 0, 0, 1], 32, [0, 0, 0, 0], &lo));
        let first = table.loopback.upgrade().expect("designated");

        table.commit(entry([127, 0, 0, 1], 32, [0, 0, 0, 0], &lo));
        let second = table.loopback.upgrade().expect("redesignated");
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn delete_filters_by_interface_name() {
        let eth0 = eth("eth0", [10, 0, 0, 1]);
        let eth1 = eth("eth1", [10, 0, 1, 1]);
        let mut table = RouteTable::new();
        table.commit(entry([10, 9, 0, 0], 24, [0, 0, 0, 0], &eth0));
        table.commit(entry([10, 9, 0, 0], 16, [0, 0, 0, 0], &eth1));

        assert_eq!(table.delete(Ipv4Address::new([10, 9, 0, 0]), Some("eth1")), 1);
        assert_eq!(table.len(), 1);
        assert_eq!(table.delete(Ipv4Address::new([10, 9, 0, 0]), None), 1);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn flush_removes_all_routes_for_device() {
        let eth0 = eth("eth0", [10, 0, 0, 1]);
        let eth1 = eth("eth1", [10, 0, 1, 1]);
        let mut table = RouteTable::new();
        table.commit(entry([10, 2, 0, 0], 24, [0, 0, 0, 0], &eth0));
        table.commit(entry([10, 3, 0, 0], 24, [0, 0, 0, 0], &eth0));
        table.commit(entry([10, 4, 0, 0], 24, [0, 0, 0, 0], &eth1));

        assert_eq!(table.flush(&eth0), 2);
        assert_eq!(table.len(), 1);
        assert!(Arc::ptr_eq(&table.entries[0].iface, &eth1));
    }

    #[test]
    fn gateway_resolution_refuses_chaining() {
        let dev = eth("eth0", [10, 0, 0, 1]);
        let mut table = RouteTable::new();
        table.commit(entry([10, 0, 0, 0], 24, [0, 0, 0, 0], &dev));
        // 172.16/16 reachable through gateway 10.0.0.254
        table.commit(entry([172, 16, 0, 0], 16, [10, 0, 0, 254], &dev));

        // The gateway itself is on the directly attached network.
        let via = table.gateway_iface(Ipv4Address::new([10, 0, 0, 254]));
        assert!(via.map_or(false, |iface| Arc::ptr_eq(&iface, &dev)));

        // An address only covered by the gateway route is not a valid
        // gateway: the first matching entry is itself a gateway route.
        assert!(table.gateway_iface(Ipv4Address::new([172, 16, 0, 7])).is_none());

        // An address nothing covers is unreachable.
        assert!(table.gateway_iface(Ipv4Address::new([192, 168, 0, 1])).is_none());
    }

    #[test]
    fn broadcast_destination_selects_direct_route() {
        let dev = eth("eth0", [10, 0, 0, 1]);
        let mut table = RouteTable::new();
        // Host route only; the broadcast address does not match it by
        // network, only by the broadcast special case.
        table.commit(entry([10, 0, 0, 7], 32, [0, 0, 0, 0], &dev));

        let resolved = table
            .resolve_forwarding(Ipv4Address::new([10, 0, 0, 255]), false)
            .expect("broadcast reachable");
        assert!(Arc::ptr_eq(&resolved.route.iface, &dev));
    }
}
