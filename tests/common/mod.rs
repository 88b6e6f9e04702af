//! Test-only MMDB writer
//!
//! Builds small but complete databases: search tree, separator, data
//! section and metadata block, for every record size and both IP versions.

#![allow(dead_code)]

use seismo_mmdb::DataValue;
use std::collections::HashMap;
use std::io::Write;
use std::net::IpAddr;
use tempfile::NamedTempFile;

pub const METADATA_MARKER: &[u8] = b"\xAB\xCD\xEFMaxMind.com";

/// Shorthand for a string value
pub fn s(text: &str) -> DataValue {
    DataValue::String(text.to_string())
}

/// Shorthand for a map value
pub fn map(entries: &[(&str, DataValue)]) -> DataValue {
    DataValue::Map(
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect::<HashMap<_, _>>(),
    )
}

/// Encoder for data section values
#[derive(Default)]
pub struct DataWriter {
    buf: Vec<u8>,
}

impl DataWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset the next value will be written at
    pub fn offset(&self) -> usize {
        self.buf.len()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Append raw bytes
    pub fn raw(&mut self, bytes: &[u8]) -> usize {
        let offset = self.offset();
        self.buf.extend_from_slice(bytes);
        offset
    }

    /// Encode a value and return its offset.
    ///
    /// `DataValue::Pointer(n)` is written as a pointer to section offset `n`.
    /// Map keys are written in sorted order.
    pub fn write(&mut self, value: &DataValue) -> usize {
        let offset = self.offset();
        self.encode(value);
        offset
    }

    /// Encode a map whose keys may be pointers (`DataValue::Pointer`)
    pub fn write_map_raw(&mut self, entries: &[(DataValue, DataValue)]) -> usize {
        let offset = self.offset();
        self.control(7, entries.len());
        for (key, value) in entries {
            self.encode(key);
            self.encode(value);
        }
        offset
    }

    fn control(&mut self, type_id: u8, size: usize) {
        let (head, extended) = if type_id <= 7 {
            (type_id, None)
        } else {
            (0, Some(type_id - 7))
        };

        let (bits, extra): (u8, Vec<u8>) = if size < 29 {
            (size as u8, vec![])
        } else if size < 29 + 256 {
            (29, vec![(size - 29) as u8])
        } else if size < 285 + 65_536 {
            (30, ((size - 285) as u16).to_be_bytes().to_vec())
        } else {
            (31, ((size - 65_821) as u32).to_be_bytes()[1..].to_vec())
        };

        self.buf.push((head << 5) | bits);
        if let Some(ext) = extended {
            self.buf.push(ext);
        }
        self.buf.extend_from_slice(&extra);
    }

    fn uint(&mut self, type_id: u8, value: u128) {
        let bytes = value.to_be_bytes();
        let skip = bytes.iter().take_while(|&&b| b == 0).count();
        self.control(type_id, 16 - skip);
        self.buf.extend_from_slice(&bytes[skip..]);
    }

    fn pointer(&mut self, target: usize) {
        if target < 2048 {
            self.buf.push(0x20 | (target >> 8) as u8);
            self.buf.push(target as u8);
        } else if target < 526_336 {
            let v = target - 2048;
            self.buf.push(0x28 | (v >> 16) as u8);
            self.buf.extend_from_slice(&(v as u16).to_be_bytes());
        } else if target < 134_744_064 {
            let v = target - 526_336;
            self.buf.push(0x30 | (v >> 24) as u8);
            self.buf.extend_from_slice(&(v as u32).to_be_bytes()[1..]);
        } else {
            self.buf.push(0x38);
            self.buf.extend_from_slice(&(target as u32).to_be_bytes());
        }
    }

    fn encode(&mut self, value: &DataValue) {
        match value {
            DataValue::Pointer(target) => self.pointer(*target),
            DataValue::String(text) => {
                self.control(2, text.len());
                self.buf.extend_from_slice(text.as_bytes());
            }
            DataValue::Double(d) => {
                self.control(3, 8);
                self.buf.extend_from_slice(&d.to_be_bytes());
            }
            DataValue::Bytes(bytes) => {
                self.control(4, bytes.len());
                self.buf.extend_from_slice(bytes);
            }
            DataValue::Uint16(n) => self.uint(5, *n as u128),
            DataValue::Uint32(n) => self.uint(6, *n as u128),
            DataValue::Map(entries) => {
                let mut keys: Vec<_> = entries.keys().collect();
                keys.sort();
                self.control(7, keys.len());
                for key in keys {
                    self.encode(&DataValue::String(key.clone()));
                    self.encode(&entries[key]);
                }
            }
            DataValue::Int32(n) => {
                self.control(8, 4);
                self.buf.extend_from_slice(&n.to_be_bytes());
            }
            DataValue::Uint64(n) => self.uint(9, *n as u128),
            DataValue::Uint128(n) => self.uint(10, *n),
            DataValue::Array(items) => {
                self.control(11, items.len());
                for item in items {
                    self.encode(item);
                }
            }
            DataValue::Bool(b) => self.control(14, *b as usize),
            DataValue::Float(f) => {
                self.control(15, 4);
                self.buf.extend_from_slice(&f.to_be_bytes());
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Slot {
    Empty,
    Node(usize),
    Data(usize),
}

/// Builder for complete MMDB files
pub struct MmdbBuilder {
    ip_version: u8,
    record_size: u16,
    nodes: Vec<[Slot; 2]>,
    data: DataWriter,
    metadata: Vec<(String, DataValue)>,
}

impl MmdbBuilder {
    /// Start an empty database. `record_size` is 24, 28 or 32.
    pub fn new(ip_version: u8, record_size: u16) -> Self {
        let mut builder = Self {
            ip_version,
            record_size,
            nodes: vec![[Slot::Empty, Slot::Empty]],
            data: DataWriter::new(),
            metadata: Vec::new(),
        };
        builder
            .set_metadata("binary_format_major_version", DataValue::Uint16(2))
            .set_metadata("binary_format_minor_version", DataValue::Uint16(0))
            .set_metadata("ip_version", DataValue::Uint16(ip_version as u16))
            .set_metadata("record_size", DataValue::Uint16(record_size))
            .set_metadata("database_type", s("Seismo-Test"))
            .set_metadata("build_epoch", DataValue::Uint64(1_700_000_000))
            .set_metadata("languages", DataValue::Array(vec![s("en"), s("zh")]))
            .set_metadata(
                "description",
                map(&[("en", s("Test database")), ("zh", s("测试数据库"))]),
            );
        builder
    }

    /// Data section writer, for values shared through pointers
    pub fn data(&mut self) -> &mut DataWriter {
        &mut self.data
    }

    /// Set or replace a metadata field (`node_count` is always computed
    /// unless set here)
    pub fn set_metadata(&mut self, key: &str, value: DataValue) -> &mut Self {
        self.remove_metadata(key);
        self.metadata.push((key.to_string(), value));
        self
    }

    pub fn remove_metadata(&mut self, key: &str) -> &mut Self {
        self.metadata.retain(|(k, _)| k != key);
        self
    }

    /// Write `value` to the data section and map `cidr` to it
    pub fn insert_value(&mut self, cidr: &str, value: &DataValue) -> usize {
        let offset = self.data.write(value);
        self.insert(cidr, offset);
        offset
    }

    /// Map `cidr` to an existing data section offset.
    ///
    /// Insert wider networks before narrower ones they contain.
    pub fn insert(&mut self, cidr: &str, data_offset: usize) {
        let (addr, prefix_len) = cidr.split_once('/').expect("cidr has a prefix");
        let addr: IpAddr = addr.parse().expect("valid address");
        let mut prefix_len: usize = prefix_len.parse().expect("valid prefix");

        let bytes: Vec<u8> = match (addr, self.ip_version) {
            (IpAddr::V4(v4), 4) => v4.octets().to_vec(),
            (IpAddr::V4(v4), _) => {
                prefix_len += 96;
                let mut bytes = vec![0u8; 12];
                bytes.extend_from_slice(&v4.octets());
                bytes
            }
            (IpAddr::V6(v6), 6) => v6.octets().to_vec(),
            (IpAddr::V6(_), _) => panic!("IPv6 network in an IPv4 database"),
        };
        assert!(prefix_len >= 1 && prefix_len <= bytes.len() * 8);

        let bit = |i: usize| ((bytes[i >> 3] >> (7 - (i & 7))) & 1) as usize;
        let mut node = 0;
        for depth in 0..prefix_len - 1 {
            let b = bit(depth);
            node = match self.nodes[node][b] {
                Slot::Node(next) => next,
                other => {
                    // Split: the new node inherits Empty or the wider record
                    let inherited = match other {
                        Slot::Data(d) => Slot::Data(d),
                        _ => Slot::Empty,
                    };
                    self.nodes.push([inherited, inherited]);
                    let next = self.nodes.len() - 1;
                    self.nodes[node][b] = Slot::Node(next);
                    next
                }
            };
        }
        self.nodes[node][bit(prefix_len - 1)] = Slot::Data(data_offset);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn record(&self, slot: Slot) -> u32 {
        let n = self.nodes.len();
        match slot {
            Slot::Empty => n as u32,
            Slot::Node(i) => i as u32,
            Slot::Data(offset) => (n + 16 + offset) as u32,
        }
    }

    fn tree_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for slots in &self.nodes {
            let left = self.record(slots[0]);
            let right = self.record(slots[1]);
            match self.record_size {
                24 => {
                    out.extend_from_slice(&left.to_be_bytes()[1..]);
                    out.extend_from_slice(&right.to_be_bytes()[1..]);
                }
                28 => {
                    out.extend_from_slice(&left.to_be_bytes()[1..]);
                    out.push((((left >> 24) & 0x0F) << 4) as u8 | ((right >> 24) & 0x0F) as u8);
                    out.extend_from_slice(&right.to_be_bytes()[1..]);
                }
                32 => {
                    out.extend_from_slice(&left.to_be_bytes());
                    out.extend_from_slice(&right.to_be_bytes());
                }
                other => panic!("unsupported record size {}", other),
            }
        }
        out
    }

    /// Encoded metadata map (without the marker)
    pub fn metadata_bytes(&self) -> Vec<u8> {
        let mut fields = self.metadata.clone();
        if !fields.iter().any(|(k, _)| k == "node_count") {
            fields.push((
                "node_count".to_string(),
                DataValue::Uint32(self.nodes.len() as u32),
            ));
        }
        let entries: Vec<_> = fields.into_iter().map(|(k, v)| (s(&k), v)).collect();
        let mut writer = DataWriter::new();
        writer.write_map_raw(&entries);
        writer.into_bytes()
    }

    /// The complete database file
    pub fn build(&self) -> Vec<u8> {
        let mut out = self.tree_bytes();
        out.extend_from_slice(&[0u8; 16]);
        out.extend_from_slice(self.data.bytes());
        out.extend_from_slice(METADATA_MARKER);
        out.extend_from_slice(&self.metadata_bytes());
        out
    }

    pub fn write_to_tempfile(&self) -> NamedTempFile {
        write_tempfile(&self.build())
    }
}

pub fn write_tempfile(bytes: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}

/// IPv4 database with `1.1.1.2/31`, `1.1.1.4/30`, `1.1.1.8/29` and
/// `1.1.1.16/28`, each mapped to `{"ip": <network address>}`
pub fn ipv4_fixture(record_size: u16) -> MmdbBuilder {
    let mut builder = MmdbBuilder::new(4, record_size);
    for (network, prefix) in [("1.1.1.2", 31), ("1.1.1.4", 30), ("1.1.1.8", 29), ("1.1.1.16", 28)] {
        builder.insert_value(&format!("{}/{}", network, prefix), &map(&[("ip", s(network))]));
    }
    builder
}

/// IPv6 database holding the IPv4 fixture networks in `::/96` plus
/// `2001:db8::/32` and `2001:db8:1::/48`
pub fn ipv6_fixture(record_size: u16) -> MmdbBuilder {
    let mut builder = MmdbBuilder::new(6, record_size);
    for (network, prefix) in [("1.1.1.2", 31), ("1.1.1.4", 30), ("1.1.1.8", 29), ("1.1.1.16", 28)] {
        builder.insert_value(&format!("{}/{}", network, prefix), &map(&[("ip", s(network))]));
    }
    builder.insert_value("2001:db8::/32", &map(&[("ip", s("2001:db8::"))]));
    builder.insert_value("2001:db8:1::/48", &map(&[("ip", s("2001:db8:1::"))]));
    builder
}
