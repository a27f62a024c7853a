//! HPACK header compression (RFC 7541).
//!
//! An [`Encoder`] owns the table for the direction this endpoint sends on and a
//! [`Decoder`] owns the table for the direction it receives on. Both tables must
//! evolve in exactly the order header blocks cross the wire, so each one is only
//! ever touched by a single task.

pub mod huffman;
pub mod table;

use crate::http::http2::frames::ErrorCode;
use crate::http::{Error, Result};
use std::fmt::{Display, Formatter};
pub use table::{DynamicTable, Match};

const INDEXED: u8 = 0x80;
const WITH_INDEXING: u8 = 0x40;
const SIZE_UPDATE: u8 = 0x20;
const NEVER_INDEXED: u8 = 0x10;
const WITHOUT_INDEXING: u8 = 0x00;
const HUFFMAN: u8 = 0x80;

/// Wire representation of one header field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    Indexed,
    WithIndexingIndexedName,
    WithIndexingNewName,
    WithoutIndexingIndexedName,
    WithoutIndexingNewName,
    NeverIndexedIndexedName,
    NeverIndexedNewName,
}

impl IndexType {
    fn literal(prefix: u8, indexed_name: bool) -> Self {
        match (prefix, indexed_name) {
            (WITH_INDEXING, true) => Self::WithIndexingIndexedName,
            (WITH_INDEXING, false) => Self::WithIndexingNewName,
            (NEVER_INDEXED, true) => Self::NeverIndexedIndexedName,
            (NEVER_INDEXED, false) => Self::NeverIndexedNewName,
            (_, true) => Self::WithoutIndexingIndexedName,
            (_, false) => Self::WithoutIndexingNewName,
        }
    }

    /// Leading bits and prefix width of the representation.
    fn pattern(self) -> (u8, u8) {
        match self {
            Self::Indexed => (INDEXED, 7),
            Self::WithIndexingIndexedName | Self::WithIndexingNewName => (WITH_INDEXING, 6),
            Self::WithoutIndexingIndexedName | Self::WithoutIndexingNewName => {
                (WITHOUT_INDEXING, 4)
            }
            Self::NeverIndexedIndexedName | Self::NeverIndexedNewName => (NEVER_INDEXED, 4),
        }
    }

    pub fn has_indexed_name(self) -> bool {
        matches!(
            self,
            Self::WithIndexingIndexedName
                | Self::WithoutIndexingIndexedName
                | Self::NeverIndexedIndexedName
        )
    }

    pub fn is_incremental(self) -> bool {
        matches!(
            self,
            Self::WithIndexingIndexedName | Self::WithIndexingNewName
        )
    }
}

impl Display for IndexType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Indexed => "INDEXED",
            Self::WithIndexingIndexedName => "WITH_INDEXING_INDEXED_NAME",
            Self::WithIndexingNewName => "WITH_INDEXING_NEW_NAME",
            Self::WithoutIndexingIndexedName => "WITHOUT_INDEXING_INDEXED_NAME",
            Self::WithoutIndexingNewName => "WITHOUT_INDEXING_NEW_NAME",
            Self::NeverIndexedIndexedName => "NEVER_INDEXED_INDEXED_NAME",
            Self::NeverIndexedNewName => "NEVER_INDEXED_NEW_NAME",
        };
        write!(f, "{name}")
    }
}

/// One header field together with how it was (or will be) represented.
/// For `Indexed` fields `name` and `value` come entirely from the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub kind: IndexType,
    pub index: usize,
    pub name: String,
    pub value: String,
    pub huffman_name: bool,
    pub huffman_value: bool,
}

impl HeaderField {
    pub fn indexed(index: usize) -> Self {
        Self {
            kind: IndexType::Indexed,
            index,
            name: String::new(),
            value: String::new(),
            huffman_name: false,
            huffman_value: false,
        }
    }

    /// A literal with a new name; Huffman use is chosen per string.
    pub fn literal(kind: IndexType, name: &str, value: &str) -> Self {
        Self {
            kind,
            index: 0,
            name: name.to_string(),
            value: value.to_string(),
            huffman_name: huffman::should_encode(name.as_bytes()),
            huffman_value: huffman::should_encode(value.as_bytes()),
        }
    }

    /// A literal whose name is taken from the table at `index`.
    pub fn literal_indexed_name(kind: IndexType, index: usize, name: &str, value: &str) -> Self {
        Self {
            kind,
            index,
            name: name.to_string(),
            value: value.to_string(),
            huffman_name: false,
            huffman_value: huffman::should_encode(value.as_bytes()),
        }
    }

    pub fn pair(&self) -> (&str, &str) {
        (&self.name, &self.value)
    }

    pub fn into_pair(self) -> (String, String) {
        (self.name, self.value)
    }
}

impl Display for HeaderField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "HeaderField {{ kind: {}, index: {}, name: {}, value: {}, huffman_name: {}, huffman_value: {} }}",
            self.kind, self.index, self.name, self.value, self.huffman_name, self.huffman_value
        )
    }
}

/// Writes `value` as an N-bit prefix integer; `flags` fills the bits above the prefix.
pub fn encode_integer(value: usize, prefix: u8, flags: u8, out: &mut Vec<u8>) {
    let max = (1usize << prefix) - 1;
    if value < max {
        out.push(flags | value as u8);
        return;
    }
    out.push(flags | max as u8);
    let mut rest = value - max;
    while rest >= 0x80 {
        out.push(0x80 | (rest & 0x7f) as u8);
        rest >>= 7;
    }
    out.push(rest as u8);
}

/// Reads an N-bit prefix integer starting at `*pos`, advancing it.
pub fn decode_integer(bytes: &[u8], pos: &mut usize, prefix: u8) -> Result<usize> {
    let first = *bytes
        .get(*pos)
        .ok_or_else(|| Error::compression("truncated integer"))?;
    *pos += 1;
    let max = (1u64 << prefix) - 1;
    let mut value = first as u64 & max;
    if value < max {
        return Ok(value as usize);
    }
    let mut shift = 0u32;
    loop {
        let byte = *bytes
            .get(*pos)
            .ok_or_else(|| Error::compression("truncated integer"))?;
        *pos += 1;
        value += ((byte & 0x7f) as u64) << shift;
        if value > u32::MAX as u64 {
            return Err(Error::compression("integer overflow"));
        }
        if byte & 0x80 == 0 {
            return Ok(value as usize);
        }
        shift += 7;
        if shift > 28 {
            return Err(Error::compression("integer overflow"));
        }
    }
}

pub fn encode_string(value: &str, huffman: bool, out: &mut Vec<u8>) {
    match huffman {
        true => {
            let coded = huffman::encode(value.as_bytes());
            encode_integer(coded.len(), 7, HUFFMAN, out);
            out.extend(coded);
        }
        false => {
            encode_integer(value.len(), 7, 0, out);
            out.extend_from_slice(value.as_bytes());
        }
    }
}

/// Reads a string literal, returning it with its Huffman flag.
pub fn decode_string(bytes: &[u8], pos: &mut usize) -> Result<(String, bool)> {
    let huffman = bytes
        .get(*pos)
        .map(|b| b & HUFFMAN != 0)
        .ok_or_else(|| Error::compression("truncated string"))?;
    let len = decode_integer(bytes, pos, 7)?;
    let end = pos
        .checked_add(len)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| Error::compression("truncated string"))?;
    let raw = &bytes[*pos..end];
    *pos = end;
    let raw = match huffman {
        true => huffman::decode(raw)?,
        false => raw.to_vec(),
    };

    Ok((String::from_utf8(raw)?, huffman))
}

/// Compresses header lists against the send-direction table.
#[derive(Debug, Clone, Default)]
pub struct Encoder {
    table: DynamicTable,
    size_update: Option<usize>,
}

impl Encoder {
    pub fn new(max_size: usize) -> Self {
        Self {
            table: DynamicTable::new(max_size),
            size_update: None,
        }
    }

    pub fn table(&self) -> &DynamicTable {
        &self.table
    }

    /// Resizes the table now and announces the new size at the start of the next block.
    pub fn set_max_size(&mut self, max_size: usize) {
        self.table.set_max_size(max_size);
        self.size_update = Some(max_size);
    }

    /// Writes a single representation exactly as described by `field`.
    /// Only incremental-indexing representations touch the table.
    pub fn pack_field(&mut self, field: &HeaderField, out: &mut Vec<u8>) -> usize {
        let start = out.len();
        let (flags, prefix) = field.kind.pattern();
        match field.kind {
            IndexType::Indexed => encode_integer(field.index, prefix, flags, out),
            kind if kind.has_indexed_name() => {
                encode_integer(field.index, prefix, flags, out);
                encode_string(&field.value, field.huffman_value, out);
            }
            _ => {
                encode_integer(0, prefix, flags, out);
                encode_string(&field.name, field.huffman_name, out);
                encode_string(&field.value, field.huffman_value, out);
            }
        }
        if field.kind.is_incremental() {
            self.table.update(&field.name, &field.value);
        }

        out.len() - start
    }

    /// Encodes a header list, always choosing incremental indexing for fields
    /// that are not already fully indexed. Returns the number of bytes written.
    pub fn pack<'a, I>(&mut self, headers: I, out: &mut Vec<u8>) -> usize
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let start = out.len();
        if let Some(size) = self.size_update.take() {
            encode_integer(size, 5, SIZE_UPDATE, out);
        }
        for (name, value) in headers {
            let field = match self.table.find_pair(name, value) {
                Some(Match { index, exact: true }) => HeaderField::indexed(index),
                Some(Match { index, .. }) => HeaderField::literal_indexed_name(
                    IndexType::WithIndexingIndexedName,
                    index,
                    name,
                    value,
                ),
                None => HeaderField::literal(IndexType::WithIndexingNewName, name, value),
            };
            self.pack_field(&field, out);
        }

        out.len() - start
    }

    pub fn encode<'a, I>(&mut self, headers: I) -> Vec<u8>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut out = Vec::new();
        self.pack(headers, &mut out);

        out
    }
}

/// Decompresses header blocks against the receive-direction table.
#[derive(Debug, Clone)]
pub struct Decoder {
    table: DynamicTable,
    max_size_limit: usize,
    max_list_size: usize,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(table::DEFAULT_MAX_SIZE)
    }
}

impl Decoder {
    /// `max_size_limit` is the header table size this endpoint advertised.
    pub fn new(max_size_limit: usize) -> Self {
        Self {
            table: DynamicTable::new(max_size_limit),
            max_size_limit,
            max_list_size: usize::MAX,
        }
    }

    pub fn table(&self) -> &DynamicTable {
        &self.table
    }

    pub fn set_max_size_limit(&mut self, limit: usize) {
        self.max_size_limit = limit;
        if self.table.max_size() > limit {
            self.table.set_max_size(limit);
        }
    }

    /// Largest decoded header list accepted, counted as name + value + 32
    /// per field.
    pub fn set_max_list_size(&mut self, limit: usize) {
        self.max_list_size = limit;
    }

    pub fn max_list_size(&self) -> usize {
        self.max_list_size
    }

    /// Decodes a complete header block, appending fields to `headers` and
    /// updating the table as each incremental-indexing field is read.
    /// Returns the number of bytes consumed.
    ///
    /// A list over the size limit is still decoded to the end so the table
    /// keeps up with the peer, but fields past the limit are dropped and an
    /// ENHANCE_YOUR_CALM stream error is returned.
    pub fn parse_into(&mut self, block: &[u8], headers: &mut Vec<HeaderField>) -> Result<usize> {
        let mut pos = 0;
        let mut leading = true;
        let mut list_size = 0usize;
        while pos < block.len() {
            let first = block[pos];
            let field = if first & INDEXED != 0 {
                let index = decode_integer(block, &mut pos, 7)?;
                let (name, value) = self.table.get_pair(index).ok_or_else(|| {
                    Error::compression(&format!("header index {index} out of range"))
                })?;
                HeaderField {
                    kind: IndexType::Indexed,
                    index,
                    name: name.to_string(),
                    value: value.to_string(),
                    huffman_name: false,
                    huffman_value: false,
                }
            } else if first & SIZE_UPDATE != 0 && first & WITH_INDEXING == 0 {
                if !leading {
                    return Err(Error::compression(
                        "table size update after the first header field",
                    ));
                }
                let size = decode_integer(block, &mut pos, 5)?;
                if size > self.max_size_limit {
                    return Err(Error::compression("table size update above the limit"));
                }
                self.table.set_max_size(size);
                continue;
            } else {
                let (flags, prefix) = match first {
                    b if b & WITH_INDEXING != 0 => (WITH_INDEXING, 6),
                    b if b & NEVER_INDEXED != 0 => (NEVER_INDEXED, 4),
                    _ => (WITHOUT_INDEXING, 4),
                };
                let index = decode_integer(block, &mut pos, prefix)?;
                let kind = IndexType::literal(flags, index > 0);
                let (name, huffman_name) = match index {
                    0 => decode_string(block, &mut pos)?,
                    i => (
                        self.table
                            .get_name(i)
                            .ok_or_else(|| {
                                Error::compression(&format!("header index {i} out of range"))
                            })?
                            .to_string(),
                        false,
                    ),
                };
                let (value, huffman_value) = decode_string(block, &mut pos)?;
                if kind.is_incremental() {
                    self.table.update(&name, &value);
                }
                HeaderField {
                    kind,
                    index,
                    name,
                    value,
                    huffman_name,
                    huffman_value,
                }
            };
            leading = false;
            list_size = list_size.saturating_add(table::entry_size(&field.name, &field.value));
            if list_size <= self.max_list_size {
                headers.push(field);
            }
        }
        if list_size > self.max_list_size {
            return Err(Error::stream(
                ErrorCode::EnhanceYourCalm,
                &format!(
                    "header list of {list_size} bytes exceeds the limit of {}",
                    self.max_list_size
                ),
            ));
        }

        Ok(pos)
    }

    pub fn parse(&mut self, block: &[u8]) -> Result<Vec<HeaderField>> {
        let mut headers = Vec::new();
        self.parse_into(block, &mut headers)?;

        Ok(headers)
    }

    pub fn decode(&mut self, block: &[u8]) -> Result<Vec<(String, String)>> {
        Ok(self
            .parse(block)?
            .into_iter()
            .map(HeaderField::into_pair)
            .collect())
    }
}
