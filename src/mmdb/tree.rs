//! MMDB Search Tree Traversal
//!
//! The search tree is a binary trie of `node_count` nodes. Each node holds
//! two records (left for bit 0, right for bit 1) that point to either:
//! - Another node (`record < node_count`)
//! - The "no data" marker (`record == node_count`)
//! - A data section value (`record >= node_count + 16`)

use super::format::Metadata;
use super::types::{IpVersion, RecordSize, DATA_SECTION_SEPARATOR_SIZE, IPV4_SUBTREE_DEPTH};
use crate::address::LookupAddress;
use crate::error::{MmdbError, Result};
use crate::mmap::ByteView;
use rustc_hash::FxHashSet;

/// Layout constants derived from the metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeGeometry {
    /// Number of nodes in the tree
    pub node_count: u32,
    /// Bits per record
    pub record_size: RecordSize,
    /// Bytes per node (6, 7 or 8)
    pub node_byte_width: usize,
    /// Total bytes of the search tree
    pub tree_byte_size: usize,
    /// Absolute offset of the data section
    pub data_section_base: usize,
    /// Added to a terminal record to get its absolute data offset
    pub pointer_shift: usize,
    /// Node where IPv4 lookups start
    pub ipv4_root: u32,
}

impl TreeGeometry {
    /// Derive the geometry of a validated database
    pub fn new(metadata: &Metadata, view: ByteView<'_>) -> Result<Self> {
        Self::from_parts(
            metadata.node_count,
            metadata.record_size,
            metadata.ip_version,
            view,
        )
    }

    /// Derive the geometry from the three fields that define it
    pub fn from_parts(
        node_count: u32,
        record_size: RecordSize,
        ip_version: IpVersion,
        view: ByteView<'_>,
    ) -> Result<Self> {
        let node_byte_width = record_size.node_bytes();
        let tree_byte_size = node_count as usize * node_byte_width;

        let mut geometry = Self {
            node_count,
            record_size,
            node_byte_width,
            tree_byte_size,
            data_section_base: tree_byte_size + DATA_SECTION_SEPARATOR_SIZE,
            pointer_shift: tree_byte_size - node_count as usize,
            ipv4_root: 0,
        };

        if ip_version == IpVersion::V6 {
            geometry.ipv4_root = SearchTree::new(view, &geometry).find_ipv4_root()?;
        }

        Ok(geometry)
    }
}

/// Where a descent stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Terminal {
    /// Record value that ended the descent
    pub record: u32,
    /// Address bits consumed (the network prefix length)
    pub depth: u8,
}

/// One edge visited by [`SearchTree::traverse`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeEdge {
    /// Parent node
    pub node: u32,
    /// Branch taken (0 = left, 1 = right)
    pub bit: u8,
    /// Record stored in that branch
    pub child: u32,
    /// Address prefix leading to `child`, 16 bytes MSB first
    pub prefix: [u8; 16],
    /// Number of prefix bits that are meaningful
    pub depth: usize,
}

/// Search tree for IP address lookups
pub struct SearchTree<'a> {
    view: ByteView<'a>,
    geometry: &'a TreeGeometry,
}

impl<'a> SearchTree<'a> {
    /// Create a new search tree
    pub fn new(view: ByteView<'a>, geometry: &'a TreeGeometry) -> Self {
        Self { view, geometry }
    }

    /// Read the record for `bit` (0 = left, 1 = right) of `node`
    #[inline]
    pub fn read_branch(&self, node: u32, bit: u8) -> Result<u32> {
        let offset = node as usize * self.geometry.node_byte_width;
        let bit = bit as usize;

        match self.geometry.record_size {
            RecordSize::Bits24 => Ok(self.view.read_u32(offset + 3 * bit)? >> 8),
            RecordSize::Bits28 => {
                // The middle byte's high nibble extends the left record,
                // its low nibble the right record
                let v = self.view.read_u32(offset + 3 * bit)?;
                if bit == 0 {
                    Ok((v >> 8) | ((v & 0xF0) << 20))
                } else {
                    Ok(v & 0x0FFF_FFFF)
                }
            }
            RecordSize::Bits32 => self.view.read_u32(offset + 4 * bit),
        }
    }

    /// Descend the tree along `addr` until a non-node record is reached
    /// or the address bits run out
    pub fn locate(&self, addr: &LookupAddress) -> Result<Terminal> {
        let node_count = self.geometry.node_count;
        let bits = addr.bit_count();

        let mut node = if addr.is_ipv4() {
            self.geometry.ipv4_root
        } else {
            0
        };
        let mut depth = 0;
        while depth < bits && node < node_count {
            node = self.read_branch(node, addr.bit(depth))?;
            depth += 1;
        }

        Ok(Terminal {
            record: node,
            depth: depth as u8,
        })
    }

    /// Map a terminal record to an absolute data offset.
    ///
    /// Returns `None` for the "no data" marker.
    pub fn resolve(&self, record: u32) -> Result<Option<usize>> {
        let nodes = self.geometry.node_count as usize;
        let record = record as usize;

        if record >= nodes + DATA_SECTION_SEPARATOR_SIZE {
            Ok(Some(record + self.geometry.pointer_shift))
        } else if record > nodes {
            Err(MmdbError::InvalidFormat(format!(
                "Illegal record value {} in [{}, {}]",
                record,
                nodes + 1,
                nodes + DATA_SECTION_SEPARATOR_SIZE - 1
            )))
        } else if record == nodes {
            Ok(None)
        } else {
            Err(MmdbError::InvalidFormat(format!(
                "Address ended before reaching a tree leaf (node {})",
                record
            )))
        }
    }

    /// Visit every edge reachable from the root, depth first.
    ///
    /// Each node is expanded once. The left edge of a node and everything
    /// below it is visited before its right edge.
    pub fn traverse<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(&TreeEdge),
    {
        enum Step {
            Enter(u32, usize, [u8; 16]),
            Right(u32, usize, [u8; 16]),
        }

        let node_count = self.geometry.node_count;
        let mut visited = FxHashSet::default();
        let mut stack = vec![Step::Enter(0, 0, [0u8; 16])];

        while let Some(step) = stack.pop() {
            match step {
                Step::Enter(node, depth, prefix) => {
                    if node >= node_count || !visited.insert(node) {
                        continue;
                    }
                    if depth >= 128 {
                        return Err(MmdbError::InvalidFormat(format!(
                            "Search tree node {} is deeper than 128 bits",
                            node
                        )));
                    }

                    let child = self.read_branch(node, 0)?;
                    visit(&TreeEdge {
                        node,
                        bit: 0,
                        child,
                        prefix,
                        depth: depth + 1,
                    });
                    stack.push(Step::Right(node, depth, prefix));
                    stack.push(Step::Enter(child, depth + 1, prefix));
                }
                Step::Right(node, depth, mut prefix) => {
                    let child = self.read_branch(node, 1)?;
                    prefix[depth >> 3] |= 0x80 >> (depth & 7);
                    visit(&TreeEdge {
                        node,
                        bit: 1,
                        child,
                        prefix,
                        depth: depth + 1,
                    });
                    stack.push(Step::Enter(child, depth + 1, prefix));
                }
            }
        }

        Ok(())
    }

    fn find_ipv4_root(&self) -> Result<u32> {
        let mut node = 0u32;
        let mut depth = 0;
        while depth < IPV4_SUBTREE_DEPTH && node < self.geometry.node_count {
            node = self.read_branch(node, 0)?;
            depth += 1;
        }
        Ok(node)
    }
}
