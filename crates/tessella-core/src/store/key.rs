//! Order-preserving cell key encoding for the sled backend.
//!
//! Every cell is stored under one encoded key:
//!
//! `row \0 family \0 qualifier \0 visibility \0 [!timestamp, 8 bytes BE]`
//!
//! Row keys, column names, and visibility expressions are NUL-free by
//! construction, so the encoding is unambiguous. Big-endian encoding of
//! the complemented timestamp makes lexicographic order equal
//! (row, family, qualifier, visibility) ascending with versions newest
//! first, which is exactly the order rows are assembled in.

use crate::error::{Error, Result};
use tessella_model::RowKey;

/// Separator between key components.
const SEP: u8 = 0;

/// Size of the encoded timestamp suffix.
const TS_SIZE: usize = 8;

/// The coordinates of one stored cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellKey {
    /// Row key.
    pub row: String,
    /// Column family.
    pub family: String,
    /// Column qualifier.
    pub qualifier: String,
    /// Visibility expression source.
    pub visibility: String,
    /// Version timestamp in microseconds.
    pub timestamp: u64,
}

impl CellKey {
    /// Encode to the storage key format.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            self.row.len() + self.family.len() + self.qualifier.len() + self.visibility.len()
                + 4
                + TS_SIZE,
        );
        buf.extend_from_slice(self.row.as_bytes());
        buf.push(SEP);
        buf.extend_from_slice(self.family.as_bytes());
        buf.push(SEP);
        buf.extend_from_slice(self.qualifier.as_bytes());
        buf.push(SEP);
        buf.extend_from_slice(self.visibility.as_bytes());
        buf.push(SEP);
        // Complemented so newer versions sort before older ones.
        buf.extend_from_slice(&(!self.timestamp).to_be_bytes());
        buf
    }

    /// Decode a storage key.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < TS_SIZE {
            return Err(Error::InvalidCellKey);
        }
        let (head, ts_bytes) = bytes.split_at(bytes.len() - TS_SIZE);

        // head must be "row \0 family \0 qualifier \0 visibility \0".
        let mut parts = Vec::with_capacity(4);
        let mut rest = head;
        for _ in 0..4 {
            let sep = rest
                .iter()
                .position(|&b| b == SEP)
                .ok_or(Error::InvalidCellKey)?;
            parts.push(&rest[..sep]);
            rest = &rest[sep + 1..];
        }
        if !rest.is_empty() {
            return Err(Error::InvalidCellKey);
        }

        let mut ts = [0u8; TS_SIZE];
        ts.copy_from_slice(ts_bytes);

        let as_string = |part: &[u8]| -> Result<String> {
            String::from_utf8(part.to_vec()).map_err(|_| Error::InvalidCellKey)
        };

        Ok(Self {
            row: as_string(parts[0])?,
            family: as_string(parts[1])?,
            qualifier: as_string(parts[2])?,
            visibility: as_string(parts[3])?,
            timestamp: !u64::from_be_bytes(ts),
        })
    }

}

/// Prefix covering every cell of one row.
pub fn row_prefix(row: &RowKey) -> Vec<u8> {
    let mut buf = Vec::with_capacity(row.as_bytes().len() + 1);
    buf.extend_from_slice(row.as_bytes());
    buf.push(SEP);
    buf
}

/// Prefix covering every cell of one (row, family, qualifier) column.
pub fn column_prefix(row: &RowKey, family: &str, qualifier: &str) -> Vec<u8> {
    let mut buf = row_prefix(row);
    buf.extend_from_slice(family.as_bytes());
    buf.push(SEP);
    buf.extend_from_slice(qualifier.as_bytes());
    buf.push(SEP);
    buf
}
