//! Lookup address normalization
//!
//! Every lookup starts by turning the caller's input into a [`LookupAddress`]:
//! exactly 4 or 16 big-endian bytes. Anything else is rejected up front with
//! [`MmdbError::InvalidIpAddress`].

use crate::error::{MmdbError, Result};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// A normalized address ready for tree descent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupAddress {
    /// IPv4 address bytes
    V4([u8; 4]),
    /// IPv6 address bytes
    V6([u8; 16]),
}

impl LookupAddress {
    /// Big-endian address bytes
    pub fn octets(&self) -> &[u8] {
        match self {
            LookupAddress::V4(b) => b,
            LookupAddress::V6(b) => b,
        }
    }

    /// Number of address bits (32 or 128)
    pub fn bit_count(&self) -> usize {
        self.octets().len() * 8
    }

    /// Bit `index`, most significant first
    #[inline]
    pub fn bit(&self, index: usize) -> u8 {
        let bytes = self.octets();
        (bytes[index >> 3] >> (7 - (index & 7))) & 1
    }

    /// True for IPv4 addresses
    pub fn is_ipv4(&self) -> bool {
        matches!(self, LookupAddress::V4(_))
    }
}

impl From<LookupAddress> for IpAddr {
    fn from(addr: LookupAddress) -> Self {
        match addr {
            LookupAddress::V4(b) => IpAddr::V4(Ipv4Addr::from(b)),
            LookupAddress::V6(b) => IpAddr::V6(Ipv6Addr::from(b)),
        }
    }
}

impl fmt::Display for LookupAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        IpAddr::from(*self).fmt(f)
    }
}

/// Types that can be normalized into a [`LookupAddress`]
pub trait ToLookupAddress {
    /// Normalize, or fail with [`MmdbError::InvalidIpAddress`]
    fn to_lookup_address(&self) -> Result<LookupAddress>;
}

impl ToLookupAddress for LookupAddress {
    fn to_lookup_address(&self) -> Result<LookupAddress> {
        Ok(*self)
    }
}

impl ToLookupAddress for Ipv4Addr {
    fn to_lookup_address(&self) -> Result<LookupAddress> {
        Ok(LookupAddress::V4(self.octets()))
    }
}

impl ToLookupAddress for Ipv6Addr {
    fn to_lookup_address(&self) -> Result<LookupAddress> {
        Ok(LookupAddress::V6(self.octets()))
    }
}

impl ToLookupAddress for IpAddr {
    fn to_lookup_address(&self) -> Result<LookupAddress> {
        match self {
            IpAddr::V4(v4) => v4.to_lookup_address(),
            IpAddr::V6(v6) => v6.to_lookup_address(),
        }
    }
}

impl ToLookupAddress for str {
    fn to_lookup_address(&self) -> Result<LookupAddress> {
        self.trim()
            .parse::<IpAddr>()
            .map_err(|e| MmdbError::InvalidIpAddress(format!("{:?}: {}", self, e)))?
            .to_lookup_address()
    }
}

impl ToLookupAddress for String {
    fn to_lookup_address(&self) -> Result<LookupAddress> {
        self.as_str().to_lookup_address()
    }
}

impl ToLookupAddress for [u8] {
    fn to_lookup_address(&self) -> Result<LookupAddress> {
        if let Ok(v4) = <[u8; 4]>::try_from(self) {
            Ok(LookupAddress::V4(v4))
        } else if let Ok(v6) = <[u8; 16]>::try_from(self) {
            Ok(LookupAddress::V6(v6))
        } else {
            Err(MmdbError::InvalidIpAddress(format!(
                "expected 4 or 16 address bytes, got {}",
                self.len()
            )))
        }
    }
}

impl<const N: usize> ToLookupAddress for [u8; N] {
    fn to_lookup_address(&self) -> Result<LookupAddress> {
        self.as_slice().to_lookup_address()
    }
}

impl<T: ToLookupAddress + ?Sized> ToLookupAddress for &T {
    fn to_lookup_address(&self) -> Result<LookupAddress> {
        (**self).to_lookup_address()
    }
}
