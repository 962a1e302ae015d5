//! IPv4 addresses, network masks, and classful mask derivation.
//!
//! Masks here are always contiguous: a run of 1s followed by a run of 0s.
//! Raw values coming from outside the crate go through the checked
//! [`TryFrom`] conversions, so a [`Ipv4Mask`] in hand is always valid.

use std::fmt::{self, Display};
use std::net::Ipv4Addr;
use std::str::FromStr;

/// An IPv4 address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Ipv4Address([u8; 4]);

impl Ipv4Address {
    /// The address `0.0.0.0`, also used as "no gateway".
    pub const UNSPECIFIED: Self = Self([0u8, 0, 0, 0]);

    /// The address `127.0.0.1`.
    pub const LOCALHOST: Self = Self([127u8, 0, 0, 1]);

    /// The address `255.255.255.255`.
    pub const BROADCAST: Self = Self([255u8, 255, 255, 255]);

    /// Creates a new address from its four octets.
    pub const fn new(address: [u8; 4]) -> Self {
        Self(address)
    }

    /// Gets the address as a `u32`.
    pub fn to_u32(self) -> u32 {
        self.into()
    }

    /// Gets the address as a `[u8; 4]`.
    pub fn to_bytes(self) -> [u8; 4] {
        self.into()
    }

    /// Returns `true` for `0.0.0.0`.
    pub fn is_unspecified(self) -> bool {
        self == Self::UNSPECIFIED
    }

    /// Clears the host bits of the address, keeping the network portion
    /// selected by `mask`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use inet_route::ipv4::{Ipv4Address, Ipv4Mask};
    /// let addr = Ipv4Address::new([10, 0, 0, 5]);
    /// let net = addr.masked(Ipv4Mask::from_bitcount(24));
    /// assert_eq!(net, Ipv4Address::new([10, 0, 0, 0]));
    /// ```
    pub fn masked(self, mask: Ipv4Mask) -> Ipv4Address {
        Ipv4Address::from(self.to_u32() & mask.to_u32())
    }
}

impl Display for Ipv4Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0;
        write!(f, "{}.{}.{}.{}", bytes[0], bytes[1], bytes[2], bytes[3])
    }
}

impl From<u32> for Ipv4Address {
    fn from(n: u32) -> Self {
        Self(n.to_be_bytes())
    }
}

impl From<[u8; 4]> for Ipv4Address {
    fn from(n: [u8; 4]) -> Self {
        Self(n)
    }
}

impl From<Ipv4Address> for u32 {
    fn from(address: Ipv4Address) -> Self {
        u32::from_be_bytes(address.0)
    }
}

impl From<Ipv4Address> for [u8; 4] {
    fn from(address: Ipv4Address) -> Self {
        address.0
    }
}

/// An IPv4 network mask, a thin wrapper around a `u32`.
#[derive(Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Ipv4Mask(u32);

const fn clamp(num: u32, min: u32, max: u32) -> u32 {
    assert!(min <= max);
    if num < min {
        min
    } else if num > max {
        max
    } else {
        num
    }
}

impl Ipv4Mask {
    /// The empty mask, matching every address. Valid only for a
    /// default route.
    pub const ANY: Self = Self(0);

    /// The all-ones mask used by host routes.
    pub const HOST: Self = Self(0xFF_FF_FF_FF);

    /// Returns a mask of `size` 1s. `size` is clamped to the 0-32 range.
    ///
    /// # Examples
    ///
    /// ```
    /// # use inet_route::ipv4::Ipv4Mask;
    /// // 255.255.0.0
    /// let mask = Ipv4Mask::from_bitcount(16);
    /// assert_eq!(mask.to_u32(), 0xFF_FF_00_00);
    /// ```
    pub const fn from_bitcount(size: u32) -> Ipv4Mask {
        let size = clamp(size, 0, 32);
        if size == 0 {
            Ipv4Mask(0)
        } else if size == 32 {
            Ipv4Mask(0xFF_FF_FF_FF)
        } else {
            Ipv4Mask(((1 << size) - 1) << (32 - size))
        }
    }

    /// Returns the prefix length, i.e. the number of 1s in the mask.
    pub const fn count_ones(&self) -> u32 {
        self.0.count_ones()
    }

    /// Turns the mask into a `u32`.
    pub const fn to_u32(self) -> u32 {
        self.0
    }

    /// Turns the mask into the equivalent address, e.g. `255.255.255.0`.
    pub const fn to_address(self) -> Ipv4Address {
        Ipv4Address::new(self.0.to_be_bytes())
    }

    /// Returns `true` if `mask` selects a superset of the network bits
    /// this mask selects, i.e. this mask is at least as broad.
    pub const fn covered_by(self, mask: Ipv4Mask) -> bool {
        self.0 & mask.0 == self.0
    }
}

impl fmt::Debug for Ipv4Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Ipv4Mask").field(&self.to_address()).finish()
    }
}

impl Display for Ipv4Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.to_address(), f)
    }
}

impl From<Ipv4Mask> for u32 {
    fn from(mask: Ipv4Mask) -> u32 {
        mask.0
    }
}

impl TryFrom<u32> for Ipv4Mask {
    type Error = u32;

    /// Returns an `Ipv4Mask` based on the `u32`. If the value is not a
    /// valid mask (it has 0s between the 1s), it is handed back as the
    /// error.
    fn try_from(mask: u32) -> Result<Ipv4Mask, u32> {
        let result = Ipv4Mask::from_bitcount(mask.count_ones());
        if result.0 == mask {
            Ok(result)
        } else {
            Err(mask)
        }
    }
}

impl TryFrom<Ipv4Address> for Ipv4Mask {
    type Error = Ipv4Address;

    fn try_from(mask: Ipv4Address) -> Result<Ipv4Mask, Ipv4Address> {
        Ipv4Mask::try_from(mask.to_u32()).or(Err(mask))
    }
}

/// Returns the classful default mask for an address: /8 for class A,
/// /16 for class B, and /24 for everything else.
///
/// Used when a route is added without a mask for a destination off the
/// local network.
///
/// # Examples
///
/// ```
/// # use inet_route::ipv4::{classful_mask, Ipv4Address, Ipv4Mask};
/// let mask = classful_mask(Ipv4Address::new([10, 1, 2, 3]));
/// assert_eq!(mask, Ipv4Mask::from_bitcount(8));
/// let mask = classful_mask(Ipv4Address::new([172, 16, 0, 9]));
/// assert_eq!(mask, Ipv4Mask::from_bitcount(16));
/// ```
pub fn classful_mask(address: Ipv4Address) -> Ipv4Mask {
    match address.to_bytes()[0] {
        0..=127 => Ipv4Mask::from_bitcount(8),
        128..=191 => Ipv4Mask::from_bitcount(16),
        _ => Ipv4Mask::from_bitcount(24),
    }
}

/// Failed to parse a CIDR string.
#[derive(Clone, Debug, thiserror::Error)]
#[error("failed to parse CIDR string")]
pub enum CidrParseError {
    Ipv4,
    Mask(#[from] std::num::ParseIntError),
}

/// Turns a string in CIDR notation (`"10.0.0.0/24"`) into an address
/// and a mask.
///
/// # Examples
///
/// ```
/// # use inet_route::ipv4::{cidr_to_ip, Ipv4Address, Ipv4Mask};
/// let (ip, mask) = cidr_to_ip("10.0.0.0/24").unwrap();
/// assert_eq!(ip, Ipv4Address::new([10, 0, 0, 0]));
/// assert_eq!(mask, Ipv4Mask::from_bitcount(24));
/// ```
pub fn cidr_to_ip(cidr: &str) -> Result<(Ipv4Address, Ipv4Mask), CidrParseError> {
    let mut parts = cidr.split('/');
    let mut next = || parts.next().ok_or(CidrParseError::Ipv4);
    let ip_str = next()?;
    let mask_str = next()?;

    let ip = Ipv4Addr::from_str(ip_str)
        .or(Err(CidrParseError::Ipv4))?
        .octets()
        .into();
    let mask = Ipv4Mask::from_bitcount(u32::from_str(mask_str)?);
    Ok((ip, mask))
}
