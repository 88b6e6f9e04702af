//! Data section decoding for MaxMind DB files
//!
//! Implements the MaxMind DB data type specification: every value starts
//! with a control byte whose high 3 bits select the type and whose low
//! 5 bits carry the payload size.
//!
//! # Supported Types
//!
//! - **Pointer**: Reference to another data item, resolved transparently
//! - **String**: UTF-8 text data
//! - **Double**: 64-bit floating point (IEEE 754)
//! - **Bytes**: Raw byte arrays
//! - **Uint16** / **Uint32** / **Uint64** / **Uint128**: Unsigned integers
//! - **Map**: Key-value pairs (string keys)
//! - **Int32**: Signed 32-bit integers
//! - **Array**: Ordered lists of values
//! - **Bool**: Boolean values
//! - **Float**: 32-bit floating point (IEEE 754)
//!
//! # Decoders
//!
//! A single decoding algorithm is shared by two flavors of [`Decoder`]:
//!
//! - `Decoder<NoMemo>` keeps no state between values and is what
//!   [`crate::Reader`] builds for every lookup.
//! - `Decoder<KeyCache>` (or `Decoder<&mut KeyCache>`) memoizes map keys
//!   reached through pointers. Real databases share a small vocabulary of
//!   keys across millions of records, so the cache turns most key decodes
//!   into a hash lookup. It is used by [`crate::SingleThreadedReader`].
//!
//! See: https://maxmind.github.io/MaxMind-DB/

use crate::error::{MmdbError, Result};
use crate::mmap::ByteView;
use rustc_hash::FxHashMap;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;

/// Default ceiling on nested containers plus followed pointers
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Upper bound on speculative preallocation for corrupt length prefixes
const MAX_PREALLOC: usize = 1024;

// Resolved type numbers (extended types are 7 + the extended type byte)
const TYPE_EXTENDED: u16 = 0;
const TYPE_POINTER: u16 = 1;
const TYPE_STRING: u16 = 2;
const TYPE_DOUBLE: u16 = 3;
const TYPE_BYTES: u16 = 4;
const TYPE_UINT16: u16 = 5;
const TYPE_UINT32: u16 = 6;
const TYPE_MAP: u16 = 7;
const TYPE_INT32: u16 = 8;
const TYPE_UINT64: u16 = 9;
const TYPE_UINT128: u16 = 10;
const TYPE_ARRAY: u16 = 11;
const TYPE_CONTAINER: u16 = 12;
const TYPE_END_MARKER: u16 = 13;
const TYPE_BOOL: u16 = 14;
const TYPE_FLOAT: u16 = 15;

/// A decoded data section value
///
/// Pointers are resolved while decoding and never appear in results,
/// except when a decoder is told not to follow them.
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    /// Absolute file offset of an unfollowed pointer
    Pointer(usize),
    /// UTF-8 string
    String(String),
    /// IEEE 754 double precision float
    Double(f64),
    /// Raw byte array
    Bytes(Vec<u8>),
    /// Unsigned 16-bit integer
    Uint16(u16),
    /// Unsigned 32-bit integer
    Uint32(u32),
    /// Key-value map, keys are always strings
    Map(HashMap<String, DataValue>),
    /// Signed 32-bit integer
    Int32(i32),
    /// Unsigned 64-bit integer
    Uint64(u64),
    /// Unsigned 128-bit integer
    Uint128(u128),
    /// Array of values
    Array(Vec<DataValue>),
    /// Boolean value
    Bool(bool),
    /// IEEE 754 single precision float
    Float(f32),
}

impl DataValue {
    /// Name of the MMDB type, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            DataValue::Pointer(_) => "pointer",
            DataValue::String(_) => "utf8_string",
            DataValue::Double(_) => "double",
            DataValue::Bytes(_) => "bytes",
            DataValue::Uint16(_) => "uint16",
            DataValue::Uint32(_) => "uint32",
            DataValue::Map(_) => "map",
            DataValue::Int32(_) => "int32",
            DataValue::Uint64(_) => "uint64",
            DataValue::Uint128(_) => "uint128",
            DataValue::Array(_) => "array",
            DataValue::Bool(_) => "boolean",
            DataValue::Float(_) => "float",
        }
    }

    /// Borrow as text
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DataValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Any unsigned integer that fits in 64 bits
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            DataValue::Uint16(v) => Some(*v as u64),
            DataValue::Uint32(v) => Some(*v as u64),
            DataValue::Uint64(v) => Some(*v),
            DataValue::Uint128(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Borrow as a map
    pub fn as_map(&self) -> Option<&HashMap<String, DataValue>> {
        match self {
            DataValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Borrow as an array
    pub fn as_array(&self) -> Option<&[DataValue]> {
        match self {
            DataValue::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Look up `key` if this is a map
    pub fn get(&self, key: &str) -> Option<&DataValue> {
        self.as_map()?.get(key)
    }
}

impl Serialize for DataValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            DataValue::Pointer(p) => serializer.serialize_u64(*p as u64),
            DataValue::String(s) => serializer.serialize_str(s),
            DataValue::Double(d) => serializer.serialize_f64(*d),
            DataValue::Bytes(b) => b.serialize(serializer),
            DataValue::Uint16(n) => serializer.serialize_u16(*n),
            DataValue::Uint32(n) => serializer.serialize_u32(*n),
            DataValue::Map(m) => {
                let mut map = serializer.serialize_map(Some(m.len()))?;
                for (k, v) in m {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            DataValue::Int32(n) => serializer.serialize_i32(*n),
            DataValue::Uint64(n) => serializer.serialize_u64(*n),
            // JSON numbers cannot hold 128 bits
            DataValue::Uint128(n) => serializer.serialize_str(&n.to_string()),
            DataValue::Array(a) => a.serialize(serializer),
            DataValue::Bool(b) => serializer.serialize_bool(*b),
            DataValue::Float(f) => serializer.serialize_f32(*f),
        }
    }
}

/// Storage for map keys reached through pointers.
///
/// Keys are remembered by the absolute offset of their pointer target.
pub trait KeyMemo {
    /// Whether this memo stores anything at all
    const ACTIVE: bool;

    /// Previously decoded value at `target`
    fn recall(&self, target: usize) -> Option<&DataValue>;

    /// Remember the value decoded at `target`
    fn remember(&mut self, target: usize, value: &DataValue);
}

/// Memo that never stores anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMemo;

impl KeyMemo for NoMemo {
    const ACTIVE: bool = false;

    #[inline]
    fn recall(&self, _target: usize) -> Option<&DataValue> {
        None
    }

    #[inline]
    fn remember(&mut self, _target: usize, _value: &DataValue) {}
}

/// Pointer-target to decoded-key cache
#[derive(Debug, Default)]
pub struct KeyCache {
    entries: FxHashMap<usize, DataValue>,
}

impl KeyCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of memoized keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing has been memoized yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget every memoized key
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl KeyMemo for KeyCache {
    const ACTIVE: bool = true;

    #[inline]
    fn recall(&self, target: usize) -> Option<&DataValue> {
        self.entries.get(&target)
    }

    fn remember(&mut self, target: usize, value: &DataValue) {
        self.entries.insert(target, value.clone());
    }
}

impl<M: KeyMemo> KeyMemo for &mut M {
    const ACTIVE: bool = M::ACTIVE;

    #[inline]
    fn recall(&self, target: usize) -> Option<&DataValue> {
        (**self).recall(target)
    }

    fn remember(&mut self, target: usize, value: &DataValue) {
        (**self).remember(target, value)
    }
}

/// Data section decoder
///
/// Decodes one value at the cursor and advances past it. Pointers are
/// resolved relative to `pointer_base`: the data section start for records,
/// or the metadata start when decoding the metadata map.
pub struct Decoder<'a, M: KeyMemo = NoMemo> {
    view: ByteView<'a>,
    pointer_base: usize,
    cursor: usize,
    follow_pointers: bool,
    max_depth: usize,
    memo: M,
}

impl<'a> Decoder<'a, NoMemo> {
    /// Create a decoder without key memoization
    ///
    /// # Arguments
    /// * `view` - Bytes of the whole database
    /// * `pointer_base` - Offset added to every pointer
    /// * `offset` - Absolute offset of the first value to decode
    pub fn new(view: ByteView<'a>, pointer_base: usize, offset: usize) -> Self {
        Self::with_memo(view, pointer_base, offset, NoMemo)
    }
}

impl<'a, M: KeyMemo> Decoder<'a, M> {
    /// Create a decoder using `memo` for pointer-reached map keys
    pub fn with_memo(view: ByteView<'a>, pointer_base: usize, offset: usize, memo: M) -> Self {
        Self {
            view,
            pointer_base,
            cursor: offset,
            follow_pointers: true,
            max_depth: DEFAULT_MAX_DEPTH,
            memo,
        }
    }

    /// Return pointers as [`DataValue::Pointer`] instead of resolving them
    pub fn follow_pointers(mut self, follow: bool) -> Self {
        self.follow_pointers = follow;
        self
    }

    /// Limit on nested containers and followed pointers
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Current absolute decode offset
    pub fn offset(&self) -> usize {
        self.cursor
    }

    /// Decode the value at the cursor and advance past it
    pub fn decode(&mut self) -> Result<DataValue> {
        let mut cursor = self.cursor;
        let value = self.decode_at(&mut cursor, false, 0)?;
        self.cursor = cursor;
        Ok(value)
    }

    fn decode_at(&mut self, cursor: &mut usize, in_key: bool, depth: usize) -> Result<DataValue> {
        if depth > self.max_depth {
            return Err(MmdbError::InvalidFormat(format!(
                "Maximum decode depth {} exceeded at offset {}",
                self.max_depth, *cursor
            )));
        }

        let start = *cursor;
        let control = self.view.read_u8(*cursor)?;
        *cursor += 1;

        let mut type_id = (control >> 5) as u16;
        if type_id == TYPE_EXTENDED {
            type_id = 7 + self.view.read_u8(*cursor)? as u16;
            *cursor += 1;
        }

        let size_bits = control & 0x1F;
        if type_id == TYPE_POINTER {
            return self.decode_pointer(cursor, size_bits, in_key, depth);
        }
        let size = self.decode_size(cursor, size_bits)?;

        match type_id {
            TYPE_STRING => {
                let s = self.view.read_utf8(*cursor, size)?;
                *cursor += size;
                Ok(DataValue::String(s.to_string()))
            }
            TYPE_DOUBLE => {
                Self::check_size("double", size, 8, start)?;
                let d = self.view.read_f64(*cursor)?;
                *cursor += 8;
                Ok(DataValue::Double(d))
            }
            TYPE_BYTES => {
                let b = self.view.read_bytes(*cursor, size)?;
                *cursor += size;
                Ok(DataValue::Bytes(b.to_vec()))
            }
            TYPE_UINT16 => Ok(DataValue::Uint16(self.decode_uint(cursor, size, 2)? as u16)),
            TYPE_UINT32 => Ok(DataValue::Uint32(self.decode_uint(cursor, size, 4)? as u32)),
            TYPE_MAP => self.decode_map(cursor, size, depth),
            TYPE_INT32 => self.decode_int32(cursor, size),
            TYPE_UINT64 => Ok(DataValue::Uint64(self.decode_uint(cursor, size, 8)?)),
            TYPE_UINT128 => self.decode_uint128(cursor, size),
            TYPE_ARRAY => self.decode_array(cursor, size, depth),
            TYPE_CONTAINER => Err(MmdbError::InvalidFormat(format!(
                "Reserved data type 12 (container) at offset {}",
                start
            ))),
            TYPE_END_MARKER => Err(MmdbError::InvalidFormat(format!(
                "Reserved data type 13 (end marker) at offset {}",
                start
            ))),
            TYPE_BOOL => Ok(DataValue::Bool(size != 0)),
            TYPE_FLOAT => {
                Self::check_size("float", size, 4, start)?;
                let f = self.view.read_f32(*cursor)?;
                *cursor += 4;
                Ok(DataValue::Float(f))
            }
            _ => Err(MmdbError::InvalidFormat(format!(
                "Unknown type {} at offset {}",
                type_id, start
            ))),
        }
    }

    fn decode_size(&self, cursor: &mut usize, size_bits: u8) -> Result<usize> {
        match size_bits {
            0..=28 => Ok(size_bits as usize),
            29 => {
                let size = 29 + self.view.read_u8(*cursor)? as usize;
                *cursor += 1;
                Ok(size)
            }
            30 => {
                let size = 285 + self.view.read_u16(*cursor)? as usize;
                *cursor += 2;
                Ok(size)
            }
            _ => {
                // 3-byte size read as a word; the low byte belongs to the payload
                let size = 65_821 + (self.view.read_u32(*cursor)? >> 8) as usize;
                *cursor += 3;
                Ok(size)
            }
        }
    }

    fn decode_pointer(
        &mut self,
        cursor: &mut usize,
        size_bits: u8,
        in_key: bool,
        depth: usize,
    ) -> Result<DataValue> {
        let extra = (size_bits & 0x7) as usize;
        let relative = match size_bits >> 3 {
            0 => {
                let v = (extra << 8) | self.view.read_u8(*cursor)? as usize;
                *cursor += 1;
                v
            }
            1 => {
                let v = ((extra << 16) | self.view.read_u16(*cursor)? as usize) + 2048;
                *cursor += 2;
                v
            }
            2 => {
                let v = ((extra << 24) | (self.view.read_u32(*cursor)? >> 8) as usize) + 526_336;
                *cursor += 3;
                v
            }
            _ => {
                let v = self.view.read_u32(*cursor)? as usize;
                *cursor += 4;
                v
            }
        };
        let target = relative.checked_add(self.pointer_base).ok_or_else(|| {
            MmdbError::InvalidFormat(format!("Pointer {} overflows the address space", relative))
        })?;

        if !self.follow_pointers {
            return Ok(DataValue::Pointer(target));
        }

        let memoize = M::ACTIVE && in_key;
        if memoize {
            if let Some(value) = self.memo.recall(target) {
                return Ok(value.clone());
            }
        }

        // A pointer may not point at another pointer
        if (self.view.read_u8(target)? >> 5) as u16 == TYPE_POINTER {
            return Err(MmdbError::InvalidFormat(format!(
                "Pointer to offset {} targets another pointer",
                target
            )));
        }

        // The target is decoded on its own cursor; ours stays past the pointer
        let mut target_cursor = target;
        let value = self.decode_at(&mut target_cursor, in_key, depth + 1)?;
        if memoize {
            self.memo.remember(target, &value);
        }
        Ok(value)
    }

    fn decode_uint(&self, cursor: &mut usize, size: usize, width: usize) -> Result<u64> {
        if size > width {
            return Err(MmdbError::InvalidFormat(format!(
                "Invalid size {} for a {}-bit unsigned integer at offset {}",
                size,
                width * 8,
                *cursor
            )));
        }
        if size == 0 {
            return Ok(0);
        }

        // Read the full width and shift the overread bytes out
        let shift = (width - size) * 8;
        let value = match width {
            2 => (self.view.read_u16(*cursor)? >> shift) as u64,
            4 => (self.view.read_u32(*cursor)? >> shift) as u64,
            _ => self.view.read_u64(*cursor)? >> shift,
        };
        *cursor += size;
        Ok(value)
    }

    fn decode_uint128(&self, cursor: &mut usize, size: usize) -> Result<DataValue> {
        if size > 16 {
            return Err(MmdbError::InvalidFormat(format!(
                "Invalid size {} for a 128-bit unsigned integer at offset {}",
                size, *cursor
            )));
        }
        if size <= 8 {
            return Ok(DataValue::Uint128(self.decode_uint(cursor, size, 8)? as u128));
        }
        let high = self.decode_uint(cursor, size - 8, 8)? as u128;
        let low = self.decode_uint(cursor, 8, 8)? as u128;
        Ok(DataValue::Uint128((high << 64) | low))
    }

    fn decode_int32(&self, cursor: &mut usize, size: usize) -> Result<DataValue> {
        if size == 4 {
            let value = self.view.read_i32(*cursor)?;
            *cursor += 4;
            return Ok(DataValue::Int32(value));
        }
        // Shorter payloads are zero-extended, never sign-extended
        Ok(DataValue::Int32(self.decode_uint(cursor, size, 4)? as i32))
    }

    fn decode_map(&mut self, cursor: &mut usize, size: usize, depth: usize) -> Result<DataValue> {
        let mut map = HashMap::with_capacity(size.min(MAX_PREALLOC));

        for _ in 0..size {
            let key_offset = *cursor;
            let key = match self.decode_at(cursor, M::ACTIVE, depth + 1)? {
                DataValue::String(s) => s,
                other => {
                    return Err(MmdbError::InvalidFormat(format!(
                        "Map key at offset {} is a {}, not a string",
                        key_offset,
                        other.type_name()
                    )))
                }
            };

            let value = self.decode_at(cursor, false, depth + 1)?;
            map.insert(key, value);
        }

        Ok(DataValue::Map(map))
    }

    fn decode_array(&mut self, cursor: &mut usize, size: usize, depth: usize) -> Result<DataValue> {
        let mut array = Vec::with_capacity(size.min(MAX_PREALLOC));

        for _ in 0..size {
            array.push(self.decode_at(cursor, false, depth + 1)?);
        }

        Ok(DataValue::Array(array))
    }

    fn check_size(type_name: &str, size: usize, expected: usize, offset: usize) -> Result<()> {
        if size != expected {
            return Err(MmdbError::InvalidFormat(format!(
                "Invalid size {} for {} at offset {} (expected {})",
                size, type_name, offset, expected
            )));
        }
        Ok(())
    }
}
