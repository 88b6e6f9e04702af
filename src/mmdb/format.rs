//! MMDB metadata block
//!
//! The metadata block is a single encoded map appended after the data
//! section. It is found by scanning the file tail backward for the marker,
//! decoded with pointers relative to the block start, and validated once.
//! Everything else in the file stays in the mapping.

use super::types::{
    IpVersion, RecordSize, METADATA_MARKER, METADATA_MAX_SIZE, SUPPORTED_MAJOR_VERSION,
};
use crate::data_section::{DataValue, Decoder};
use crate::error::{MmdbError, Result};
use crate::mmap::ByteView;
use memchr::memmem;
use std::collections::HashMap;

/// Locate the metadata block.
///
/// Returns the offset just past the last marker in the final
/// [`METADATA_MAX_SIZE`] bytes. `name` identifies the file in the error.
pub fn find_metadata_start(view: ByteView<'_>, name: &str) -> Result<usize> {
    let size = view.size();
    let lower = size.saturating_sub(METADATA_MAX_SIZE);
    let tail = view.read_bytes(lower, size - lower)?;

    match memmem::rfind(tail, METADATA_MARKER) {
        Some(pos) => Ok(lower + pos + METADATA_MARKER.len()),
        None => Err(MmdbError::MetadataNotFound {
            source: name.to_string(),
        }),
    }
}

/// Validated database metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    /// Binary format major version (always 2)
    pub binary_format_major_version: u16,
    /// Binary format minor version
    pub binary_format_minor_version: u16,
    /// Number of nodes in the search tree
    pub node_count: u32,
    /// Bits per record
    pub record_size: RecordSize,
    /// Address family of the search tree
    pub ip_version: IpVersion,
    /// Free-form database type, e.g. "GeoIP2-City"
    pub database_type: String,
    /// Build time as seconds since the Unix epoch
    pub build_epoch: u64,
    /// Locale codes the records may contain
    pub languages: Option<Vec<String>>,
    /// Description keyed by locale code
    pub description: Option<HashMap<String, String>>,
}

impl Metadata {
    /// Decode and validate the metadata map starting at `offset`
    pub fn decode(view: ByteView<'_>, offset: usize, max_depth: usize) -> Result<Self> {
        let value = Decoder::new(view, offset, offset)
            .max_depth(max_depth)
            .decode()?;
        match value {
            DataValue::Map(map) => Self::from_map(&map),
            other => Err(MmdbError::InvalidMetadata(format!(
                "Metadata is a {}, not a map",
                other.type_name()
            ))),
        }
    }

    /// Build from a decoded metadata map, checking every field
    pub fn from_map(map: &HashMap<String, DataValue>) -> Result<Self> {
        let (major, value) = unsigned(map, "binary_format_major_version")?;
        if major != SUPPORTED_MAJOR_VERSION {
            return Err(illegal("binary_format_major_version", value));
        }
        let (minor, value) = unsigned(map, "binary_format_minor_version")?;
        let minor = u16::try_from(minor)
            .map_err(|_| illegal("binary_format_minor_version", value))?;

        let node_count = match unsigned(map, "node_count")? {
            (n @ 1..=0xFFFF_FFFF, _) => n as u32,
            (_, value) => return Err(illegal("node_count", value)),
        };

        let record_size = RecordSize::from_bits(unsigned(map, "record_size")?.0)?;

        let (version, value) = unsigned(map, "ip_version")?;
        let ip_version =
            IpVersion::from_number(version).ok_or_else(|| illegal("ip_version", value))?;

        let database_type = match field(map, "database_type")? {
            DataValue::String(s) => s.clone(),
            other => return Err(illegal("database_type", other)),
        };

        let (build_epoch, _) = unsigned(map, "build_epoch")?;

        let languages = match map.get("languages") {
            None => None,
            Some(value @ DataValue::Array(items)) => Some(
                items
                    .iter()
                    .map(|item| {
                        item.as_str()
                            .map(str::to_string)
                            .ok_or_else(|| illegal("languages", value))
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
            Some(other) => return Err(illegal("languages", other)),
        };

        let description = match map.get("description") {
            None => None,
            Some(value @ DataValue::Map(entries)) => Some(
                entries
                    .iter()
                    .map(|(lang, text)| match text {
                        DataValue::String(s) => Ok((lang.clone(), s.clone())),
                        _ => Err(illegal("description", value)),
                    })
                    .collect::<Result<HashMap<_, _>>>()?,
            ),
            Some(other) => return Err(illegal("description", other)),
        };

        Ok(Self {
            binary_format_major_version: major as u16,
            binary_format_minor_version: minor,
            node_count,
            record_size,
            ip_version,
            database_type,
            build_epoch,
            languages,
            description,
        })
    }

    /// True for IPv4-only databases
    pub fn ipv4(&self) -> bool {
        self.ip_version == IpVersion::V4
    }

    /// True for databases with an IPv6 search tree
    pub fn ipv6(&self) -> bool {
        self.ip_version == IpVersion::V6
    }
}

fn field<'m>(map: &'m HashMap<String, DataValue>, name: &str) -> Result<&'m DataValue> {
    map.get(name)
        .ok_or_else(|| MmdbError::InvalidMetadata(format!("Missing metadata field {}", name)))
}

fn unsigned<'m>(map: &'m HashMap<String, DataValue>, name: &str) -> Result<(u64, &'m DataValue)> {
    let value = field(map, name)?;
    let n = value.as_u64().ok_or_else(|| illegal(name, value))?;
    Ok((n, value))
}

fn illegal(name: &str, value: &DataValue) -> MmdbError {
    let rendered = serde_json::to_string(value).unwrap_or_else(|_| value.type_name().to_string());
    MmdbError::InvalidMetadata(format!(
        "Illegal metadata field {} value {}",
        name, rendered
    ))
}
