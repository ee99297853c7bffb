// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Binary encoding of replicated-log records.
//!
//! Every record starts with a fixed header followed by the payload
//! (all integers big-endian, signed):
//!
//! ```text
//! ┌────────────┬──────────┬────────────────┬──────────────────┐
//! │ magic (2)  │ term (4) │ payload len (4)│ payload ...      │
//! │ 0xC0 0x7D  │ i32      │ i32            │ len bytes        │
//! └────────────┴──────────┴────────────────┴──────────────────┘
//! ```
//!
//! The magic marker lets a scanner detect garbled or misaligned data: a
//! mismatch is treated as the end of the valid journal, not as a fatal error
//! (see [`scan`]).

use crate::error::{JournalError, JournalResult};
use crate::metrics;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Magic marker opening every record.
pub const MAGIC: [u8; 2] = [0xC0, 0x7D];

const MAGIC_LEN: usize = MAGIC.len();
const TERM_LEN: usize = std::mem::size_of::<i32>();
const LENGTH_LEN: usize = std::mem::size_of::<i32>();

/// Header width derived from the field widths.
pub const HEADER_SIZE: usize = MAGIC_LEN + TERM_LEN + LENGTH_LEN;

/// One replicated-log record: the term it was proposed in and an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    term: i32,
    payload: Bytes,
}

impl JournalEntry {
    pub fn new(term: i32, payload: impl Into<Bytes>) -> Self {
        Self {
            term,
            payload: payload.into(),
        }
    }

    pub fn term(&self) -> i32 {
        self.term
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Total encoded size: header + payload.
    pub fn length(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encoder/decoder for [`JournalEntry`].
///
/// Stateless; all functions are associated so callers can size buffers with
/// [`JournalEntryCodec::header_size`] without an instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct JournalEntryCodec;

impl JournalEntryCodec {
    /// Fixed header width in bytes.
    pub const fn header_size() -> usize {
        HEADER_SIZE
    }

    /// Encode an entry into a fresh buffer.
    pub fn encode(entry: &JournalEntry) -> JournalResult<Bytes> {
        let mut buf = BytesMut::with_capacity(entry.length());
        Self::encode_into(entry, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Append an encoded entry to `dst`.
    ///
    /// Nothing is written if the entry cannot be encoded.
    pub fn encode_into(entry: &JournalEntry, dst: &mut BytesMut) -> JournalResult<()> {
        if entry.term < 0 {
            return Err(JournalError::Encoding(format!(
                "term must be non-negative, got {}",
                entry.term
            )));
        }
        let len = check_payload_len(entry.payload.len())?;

        dst.reserve(entry.length());
        dst.put_slice(&MAGIC);
        dst.put_i32(entry.term);
        dst.put_i32(len);
        dst.put_slice(&entry.payload);
        Ok(())
    }

    /// Decode the entry at the start of `src`.
    ///
    /// Trailing bytes after the entry are ignored; use [`JournalEntry::length`]
    /// to advance to the next record.
    pub fn decode(src: &[u8]) -> JournalResult<JournalEntry> {
        Self::decode_at(src, 0)
    }

    /// Like [`decode`](Self::decode), but reports `offset` in corruption errors.
    pub fn decode_at(src: &[u8], offset: usize) -> JournalResult<JournalEntry> {
        let result = decode_record(src, offset);
        if let Err(ref e) = result {
            metrics::record_journal_decode_error(e.kind());
        }
        result
    }
}

fn decode_record(src: &[u8], offset: usize) -> JournalResult<JournalEntry> {
    // Magic first: garbage must never be read as a length.
    let magic_available = src.len().min(MAGIC_LEN);
    if src[..magic_available] != MAGIC[..magic_available] {
        return Err(JournalError::Corrupt {
            offset,
            reason: format!("bad magic {:02X?}", &src[..magic_available]),
        });
    }
    if src.len() < HEADER_SIZE {
        return Err(JournalError::Truncated {
            expected: HEADER_SIZE,
            available: src.len(),
        });
    }

    let mut header = &src[MAGIC_LEN..HEADER_SIZE];
    let term = header.get_i32();
    let declared = header.get_i32();

    if term < 0 {
        return Err(JournalError::Corrupt {
            offset,
            reason: format!("negative term {}", term),
        });
    }
    if declared < 0 {
        return Err(JournalError::Corrupt {
            offset,
            reason: format!("negative payload length {}", declared),
        });
    }

    let total = HEADER_SIZE + declared as usize;
    if src.len() < total {
        return Err(JournalError::Truncated {
            expected: total,
            available: src.len(),
        });
    }

    Ok(JournalEntry {
        term,
        payload: Bytes::copy_from_slice(&src[HEADER_SIZE..total]),
    })
}

/// Payload length as the signed 32-bit header field.
fn check_payload_len(len: usize) -> JournalResult<i32> {
    i32::try_from(len).map_err(|_| {
        JournalError::Encoding(format!(
            "payload of {} bytes exceeds the {} byte limit",
            len,
            i32::MAX
        ))
    })
}

/// Result of scanning a buffer of back-to-back records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Decoded entries with the byte offset each one starts at.
    pub entries: Vec<(usize, JournalEntry)>,
    /// Length of the valid prefix (offset just past the last good entry).
    pub valid_len: usize,
    /// Why scanning stopped before the end of the buffer, if it did.
    pub stop: Option<JournalError>,
}

impl ScanOutcome {
    /// Whether the whole buffer decoded cleanly.
    pub fn is_clean(&self) -> bool {
        self.stop.is_none()
    }
}

/// Decode records from the start of `src` until the buffer ends or a record
/// fails to decode.
///
/// A bad magic marker or a truncated tail marks the corruption boundary:
/// everything before it is returned, nothing after it is interpreted.
pub fn scan(src: &[u8]) -> ScanOutcome {
    let mut entries = Vec::new();
    let mut offset = 0;
    let mut stop = None;

    while offset < src.len() {
        match JournalEntryCodec::decode_at(&src[offset..], offset) {
            Ok(entry) => {
                let len = entry.length();
                entries.push((offset, entry));
                offset += len;
            }
            Err(e) => {
                stop = Some(e);
                break;
            }
        }
    }

    metrics::record_journal_scan(entries.len(), offset, stop.is_none());
    ScanOutcome {
        entries,
        valid_len: offset,
        stop,
    }
}
