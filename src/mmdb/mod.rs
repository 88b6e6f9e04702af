//! MaxMind DB (MMDB) file structure
//!
//! The MMDB format uses a binary search tree for IP address lookups.
//! Records are stored in the MMDB data section format, decoded by
//! `crate::data_section::Decoder`.
//!
//! ## Architecture
//!
//! - **types**: Format constants and small enumerations
//! - **format**: Metadata block location and validation
//! - **tree**: Tree geometry, descent and traversal

pub mod format;
pub mod tree;
pub mod types;

pub use format::{find_metadata_start, Metadata};
pub use tree::{SearchTree, Terminal, TreeEdge, TreeGeometry};
pub use types::{IpVersion, RecordSize, METADATA_MARKER};
