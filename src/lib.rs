//! Seismo MMDB - Read-only MaxMind DB reader
//!
//! Looks up IP addresses in MaxMind DB (MMDB) files such as GeoLite2 or
//! GeoIP2 databases. Files are memory-mapped and queried in place: the
//! search tree is walked bit by bit over the mapping, and only the record
//! that answers a query is decoded into owned values.
//!
//! # Quick Start
//!
//! ```no_run
//! use seismo_mmdb::{DataValue, Reader};
//!
//! let reader = Reader::open("GeoLite2-Country.mmdb")?;
//! println!("{} built at {}", reader.metadata().database_type, reader.metadata().build_epoch);
//!
//! match reader.get("1.1.1.1")? {
//!     Some(record) => {
//!         let iso = record
//!             .get("country")
//!             .and_then(|c| c.get("iso_code"))
//!             .and_then(DataValue::as_str);
//!         println!("country: {:?}", iso);
//!     }
//!     None => println!("not found"),
//! }
//! # Ok::<(), seismo_mmdb::MmdbError>(())
//! ```
//!
//! # Readers
//!
//! - [`Reader`]: lookups take `&self`, share it across threads freely
//! - [`SingleThreadedReader`]: lookups take `&mut self` and memoize map keys
//!   reached through pointers, which most real databases share across
//!   millions of records
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │  MMDB File Format                    │
//! ├──────────────────────────────────────┤
//! │  1. Search Tree (binary trie)        │
//! │  2. 16-byte zero separator           │
//! │  3. Data Section (encoded values)    │
//! │  4. Marker + Metadata map            │
//! └──────────────────────────────────────┘
//!          ↓ mmap()
//! ┌──────────────────────────────────────┐
//! │  ByteSource (read-only, shared)      │
//! │  bounded reads, 7-byte overread      │
//! └──────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Lookup address normalization
pub mod address;
/// Data section decoding
pub mod data_section;
/// Database readers
pub mod database;
/// Error types for MMDB operations
pub mod error;
pub mod mmap;
/// MMDB file structure: metadata, tree geometry, traversal
pub mod mmdb;

// Re-exports for Rust consumers

/// Readers and their options
pub use crate::database::{Reader, ReaderOptions, SingleThreadedReader};

/// Decoded value type
pub use crate::data_section::DataValue;

/// Error type and result alias
pub use crate::error::{MmdbError, Result};

/// Address normalization
pub use crate::address::{LookupAddress, ToLookupAddress};

/// Metadata and format enumerations
pub use crate::mmdb::{IpVersion, Metadata, RecordSize};
