//! Database readers
//!
//! Two readers share one lookup path (normalize the address, descend the
//! search tree, resolve the terminal record, decode the value) and differ
//! only in how they decode:
//!
//! - [`Reader`] builds a fresh stateless decoder for every call. It holds no
//!   mutable state, so one `Reader` can be shared by any number of threads.
//! - [`SingleThreadedReader`] keeps a cache of map keys reached through
//!   pointers across calls. Lookups take `&mut self`, so the compiler
//!   enforces single ownership.
//!
//! # Examples
//!
//! ```no_run
//! use seismo_mmdb::Reader;
//!
//! let reader = Reader::open("GeoLite2-City.mmdb")?;
//! if let Some(record) = reader.get("8.8.8.8")? {
//!     println!("{}", serde_json::to_string_pretty(&record).unwrap());
//! }
//! # Ok::<(), seismo_mmdb::MmdbError>(())
//! ```

use crate::address::{LookupAddress, ToLookupAddress};
use crate::data_section::{DataValue, Decoder, KeyCache, DEFAULT_MAX_DEPTH};
use crate::error::{MmdbError, Result};
use crate::mmap::ByteSource;
use crate::mmdb::{find_metadata_start, Metadata, SearchTree, TreeEdge, TreeGeometry, METADATA_MARKER};
use log::{debug, trace};
use std::path::Path;

/// Tunables applied when opening a database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Maximum nesting of containers plus followed pointers in one value.
    ///
    /// Values nested deeper fail with [`MmdbError::InvalidFormat`]. This also
    /// bounds cycles through maps or arrays in crafted files. Each level costs
    /// a few stack frames, so very large limits need a larger thread stack.
    pub max_decode_depth: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            max_decode_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ReaderOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set [`ReaderOptions::max_decode_depth`]
    pub fn max_decode_depth(mut self, depth: usize) -> Self {
        self.max_decode_depth = depth;
        self
    }
}

/// Thread-safe MMDB reader
///
/// Lookups take `&self`; wrap the reader in an `Arc` to share it.
#[derive(Debug)]
pub struct Reader {
    source: ByteSource,
    metadata: Metadata,
    metadata_offset: usize,
    geometry: TreeGeometry,
    options: ReaderOptions,
}

impl Reader {
    /// Open and memory-map a database file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, ReaderOptions::default())
    }

    /// Open a database file with explicit options
    pub fn open_with<P: AsRef<Path>>(path: P, options: ReaderOptions) -> Result<Self> {
        Self::from_source(ByteSource::open(path)?, options)
    }

    /// Read a database held in memory
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_bytes_with(data, ReaderOptions::default())
    }

    /// Read a database held in memory with explicit options
    pub fn from_bytes_with(data: Vec<u8>, options: ReaderOptions) -> Result<Self> {
        Self::from_source(ByteSource::from_bytes(data), options)
    }

    fn from_source(source: ByteSource, options: ReaderOptions) -> Result<Self> {
        let view = source.view();
        let metadata_offset = find_metadata_start(view, source.name())?;
        let metadata = Metadata::decode(view, metadata_offset, options.max_decode_depth)?;
        let geometry = TreeGeometry::new(&metadata, view)?;

        let marker_start = metadata_offset - METADATA_MARKER.len();
        if geometry.data_section_base > marker_start {
            return Err(MmdbError::InvalidFormat(format!(
                "Search tree of {} nodes ({} bytes) overlaps the metadata at offset {}",
                geometry.node_count, geometry.tree_byte_size, marker_start
            )));
        }

        debug!(
            "opened {}: {} {} nodes, {}-bit records, data section at {}",
            source.name(),
            metadata.ip_version,
            geometry.node_count,
            geometry.record_size.bits(),
            geometry.data_section_base
        );

        Ok(Self {
            source,
            metadata,
            metadata_offset,
            geometry,
            options,
        })
    }

    /// Validated metadata. Still available after [`Reader::close`].
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Offset just past the metadata marker
    pub fn metadata_offset(&self) -> usize {
        self.metadata_offset
    }

    /// Layout of the search tree
    pub fn geometry(&self) -> &TreeGeometry {
        &self.geometry
    }

    /// Options the reader was opened with
    pub fn options(&self) -> ReaderOptions {
        self.options
    }

    /// Size of the database file in bytes
    pub fn file_size(&self) -> usize {
        self.source.size()
    }

    /// Look up the record for an address.
    ///
    /// Returns `Ok(None)` when the address has no record.
    pub fn get<A: ToLookupAddress + ?Sized>(&self, addr: &A) -> Result<Option<DataValue>> {
        Ok(self.get_with_prefix_len(addr)?.0)
    }

    /// Look up the record for an address, also returning the prefix length
    /// of the network it belongs to
    pub fn get_with_prefix_len<A: ToLookupAddress + ?Sized>(
        &self,
        addr: &A,
    ) -> Result<(Option<DataValue>, u8)> {
        let (offset, prefix_len) = self.locate(addr)?;
        let value = match offset {
            Some(offset) => Some(self.decoder_at(offset).decode()?),
            None => None,
        };
        Ok((value, prefix_len))
    }

    /// Resolve an address to the absolute offset of its record
    fn locate<A: ToLookupAddress + ?Sized>(&self, addr: &A) -> Result<(Option<usize>, u8)> {
        let addr = self.check_address(addr)?;
        let tree = SearchTree::new(self.source.view(), &self.geometry);
        let terminal = tree.locate(&addr)?;
        trace!(
            "{} ended at record {} after {} bits",
            addr,
            terminal.record,
            terminal.depth
        );

        let offset = tree.resolve(terminal.record).map_err(|e| match e {
            MmdbError::InvalidFormat(msg) if terminal.record < self.geometry.node_count => {
                MmdbError::InvalidFormat(format!("IP {}: {}", addr, msg))
            }
            other => other,
        })?;
        Ok((offset, terminal.depth))
    }

    fn check_address<A: ToLookupAddress + ?Sized>(&self, addr: &A) -> Result<LookupAddress> {
        let addr = addr.to_lookup_address()?;
        if !addr.is_ipv4() && self.metadata.ipv4() {
            return Err(MmdbError::Ipv6InIpv4Database(addr.to_string()));
        }
        if self.source.is_closed() {
            return Err(MmdbError::Closed { offset: 0 });
        }
        Ok(addr)
    }

    /// Stateless decoder positioned at an absolute data section offset.
    ///
    /// Pointers are resolved against the data section base.
    pub fn decoder_at(&self, offset: usize) -> Decoder<'_> {
        Decoder::new(self.source.view(), self.geometry.data_section_base, offset)
            .max_depth(self.options.max_decode_depth)
    }

    /// Visit every edge of the search tree, depth first
    pub fn traverse<F>(&self, visit: F) -> Result<()>
    where
        F: FnMut(&TreeEdge),
    {
        if self.source.is_closed() {
            return Err(MmdbError::Closed { offset: 0 });
        }
        SearchTree::new(self.source.view(), &self.geometry).traverse(visit)
    }

    /// Release the mapping. Closing twice is a no-op.
    pub fn close(&mut self) {
        self.source.close();
    }

    /// Whether [`Reader::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.source.is_closed()
    }

    /// Convert into a reader that memoizes pointer-reached map keys
    pub fn single_threaded(self) -> SingleThreadedReader {
        SingleThreadedReader {
            reader: self,
            cache: KeyCache::new(),
        }
    }
}

/// High-throughput reader for a single owner
///
/// Map keys reached through pointers are decoded once and then served from
/// a cache keyed by pointer target. Use one per thread.
#[derive(Debug)]
pub struct SingleThreadedReader {
    reader: Reader,
    cache: KeyCache,
}

impl SingleThreadedReader {
    /// Open and memory-map a database file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Reader::open(path).map(Reader::single_threaded)
    }

    /// Open a database file with explicit options
    pub fn open_with<P: AsRef<Path>>(path: P, options: ReaderOptions) -> Result<Self> {
        Reader::open_with(path, options).map(Reader::single_threaded)
    }

    /// Read a database held in memory
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Reader::from_bytes(data).map(Reader::single_threaded)
    }

    /// Validated metadata. Still available after close.
    pub fn metadata(&self) -> &Metadata {
        self.reader.metadata()
    }

    /// Look up the record for an address
    pub fn get<A: ToLookupAddress + ?Sized>(&mut self, addr: &A) -> Result<Option<DataValue>> {
        Ok(self.get_with_prefix_len(addr)?.0)
    }

    /// Look up the record and prefix length for an address
    pub fn get_with_prefix_len<A: ToLookupAddress + ?Sized>(
        &mut self,
        addr: &A,
    ) -> Result<(Option<DataValue>, u8)> {
        let (offset, prefix_len) = self.reader.locate(addr)?;
        let Some(offset) = offset else {
            return Ok((None, prefix_len));
        };

        let reader = &self.reader;
        let value = Decoder::with_memo(
            reader.source.view(),
            reader.geometry.data_section_base,
            offset,
            &mut self.cache,
        )
        .max_depth(reader.options.max_decode_depth)
        .decode()?;
        Ok((Some(value), prefix_len))
    }

    /// Number of memoized map keys
    pub fn cached_keys(&self) -> usize {
        self.cache.len()
    }

    /// The underlying stateless reader
    pub fn reader(&self) -> &Reader {
        &self.reader
    }

    /// Release the mapping and drop the key cache. Closing twice is a no-op.
    pub fn close(&mut self) {
        self.reader.close();
        self.cache.clear();
    }

    /// Whether the database has been closed
    pub fn is_closed(&self) -> bool {
        self.reader.is_closed()
    }
}
