//! MMDB format constants and small enumerations.

use crate::error::MmdbError;
use std::fmt;

/// MMDB metadata marker: "\xAB\xCD\xEFMaxMind.com"
pub const METADATA_MARKER: &[u8] = b"\xAB\xCD\xEFMaxMind.com";

/// The metadata block lives within this many bytes of the end of the file
pub const METADATA_MAX_SIZE: usize = 128 * 1024;

/// All-zero separator between the search tree and the data section
pub const DATA_SECTION_SEPARATOR_SIZE: usize = 16;

/// The only binary format major version this reader understands
pub const SUPPORTED_MAJOR_VERSION: u64 = 2;

/// Number of leading zero bits that embed IPv4 space in an IPv6 tree
pub const IPV4_SUBTREE_DEPTH: usize = 96;

/// IP version of the search tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpVersion {
    /// IPv4 only
    V4,
    /// IPv6 (IPv4 lives in the subtree at `::/96`)
    V6,
}

impl IpVersion {
    /// Parse the metadata `ip_version` field
    pub fn from_number(version: u64) -> Option<Self> {
        match version {
            4 => Some(IpVersion::V4),
            6 => Some(IpVersion::V6),
            _ => None,
        }
    }

    /// Numeric form as stored in metadata
    pub fn number(self) -> u8 {
        match self {
            IpVersion::V4 => 4,
            IpVersion::V6 => 6,
        }
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IPv{}", self.number())
    }
}

/// Record size in bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordSize {
    /// 24-bit records (3 bytes per record, 6 bytes per node)
    Bits24 = 24,
    /// 28-bit records (3.5 bytes per record, 7 bytes per node)
    Bits28 = 28,
    /// 32-bit records (4 bytes per record, 8 bytes per node)
    Bits32 = 32,
}

impl RecordSize {
    /// Get the size of a node (2 records) in bytes
    pub fn node_bytes(self) -> usize {
        2 * self.bits() as usize / 8
    }

    /// Width of one record in bits
    pub fn bits(self) -> u8 {
        self as u8
    }

    /// Create from bit size
    pub fn from_bits(bits: u64) -> Result<Self, MmdbError> {
        match bits {
            24 => Ok(RecordSize::Bits24),
            28 => Ok(RecordSize::Bits28),
            32 => Ok(RecordSize::Bits32),
            _ => Err(MmdbError::InvalidMetadata(format!(
                "Illegal metadata field record_size value {}",
                bits
            ))),
        }
    }
}
