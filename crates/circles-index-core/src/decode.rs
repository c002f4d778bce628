//! ABI log decoding primitives.
//!
//! Ethereum logs carry indexed arguments in 32-byte topic slots and the rest
//! in an ABI-encoded data payload: fixed-width scalars at 32-byte-aligned
//! offsets, dynamic values (strings, byte arrays) via tail encoding — a
//! 32-byte offset pointer, then a 32-byte length, then the content padded to
//! a 32-byte boundary. These helpers implement exactly that; anything short
//! or garbled is an [`IndexError::Decode`], because by the time they run the
//! topic has already matched a registered schema.

use alloy_primitives::{Address, B256, U256};

use crate::error::IndexError;
use crate::types::LogEntry;

const WORD: usize = 32;

/// Reads the 32-byte word at `slot` of the data payload.
fn word<'a>(event: &str, data: &'a [u8], slot: usize) -> Result<&'a [u8], IndexError> {
    let start = slot * WORD;
    let end = start + WORD;
    if data.len() < end {
        return Err(IndexError::decode(
            event,
            format!("data too short: need {end} bytes, have {}", data.len()),
        ));
    }
    Ok(&data[start..end])
}

/// An address from topic slot `index` — the last 20 bytes of the 32-byte slot.
pub fn topic_address(event: &str, log: &LogEntry, index: usize) -> Result<Address, IndexError> {
    let topic = topic(event, log, index)?;
    Ok(Address::from_slice(&topic.as_slice()[12..]))
}

/// A big-endian unsigned integer from topic slot `index`.
pub fn topic_u256(event: &str, log: &LogEntry, index: usize) -> Result<U256, IndexError> {
    let topic = topic(event, log, index)?;
    Ok(U256::from_be_bytes(topic.0))
}

fn topic<'a>(event: &str, log: &'a LogEntry, index: usize) -> Result<&'a B256, IndexError> {
    log.topics.get(index).ok_or_else(|| {
        IndexError::decode(
            event,
            format!("missing topic slot {index} (have {})", log.topics.len()),
        )
    })
}

/// A big-endian unsigned integer at data slot `slot`.
pub fn data_u256(event: &str, data: &[u8], slot: usize) -> Result<U256, IndexError> {
    let bytes: [u8; WORD] = word(event, data, slot)?.try_into().unwrap_or([0; WORD]);
    Ok(U256::from_be_bytes(bytes))
}

/// An address at data slot `slot` — the last 20 bytes of the word.
pub fn data_address(event: &str, data: &[u8], slot: usize) -> Result<Address, IndexError> {
    let bytes = word(event, data, slot)?;
    Ok(Address::from_slice(&bytes[12..]))
}

/// A boolean at data slot `slot` (any non-zero word is `true`).
pub fn data_bool(event: &str, data: &[u8], slot: usize) -> Result<bool, IndexError> {
    Ok(data_u256(event, data, slot)? != U256::ZERO)
}

/// A dynamic byte array whose offset pointer sits at head slot `slot`.
pub fn dynamic_bytes(event: &str, data: &[u8], slot: usize) -> Result<Vec<u8>, IndexError> {
    let offset = to_usize(event, data_u256(event, data, slot)?)?;
    // Checked arithmetic: a hostile offset or length word must stay a decode
    // error, not wrap past the bounds check.
    let start = offset.checked_add(WORD).filter(|&s| data.len() >= s).ok_or_else(|| {
        IndexError::decode(event, format!("dynamic offset {offset} out of range"))
    })?;
    let length = to_usize(event, data_u256(event, &data[offset..], 0)?)?;
    let end = start.checked_add(length).filter(|&e| data.len() >= e).ok_or_else(|| {
        IndexError::decode(
            event,
            format!("dynamic value of length {length} at {start} out of range"),
        )
    })?;
    Ok(data[start..end].to_vec())
}

/// A dynamic UTF-8 string whose offset pointer sits at head slot `slot`.
/// Invalid byte sequences are replaced, never fatal.
pub fn dynamic_string(event: &str, data: &[u8], slot: usize) -> Result<String, IndexError> {
    let bytes = dynamic_bytes(event, data, slot)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// A dynamic `uint256[]` whose offset pointer sits at head slot `slot`.
pub fn dynamic_u256_array(event: &str, data: &[u8], slot: usize) -> Result<Vec<U256>, IndexError> {
    let offset = to_usize(event, data_u256(event, data, slot)?)?;
    if offset.checked_add(WORD).map_or(true, |end| data.len() < end) {
        return Err(IndexError::decode(
            event,
            format!("array offset {offset} out of range"),
        ));
    }
    let body = &data[offset..];
    let length = to_usize(event, data_u256(event, body, 0)?)?;
    let need = length
        .checked_add(1)
        .and_then(|words| words.checked_mul(WORD));
    if need.map_or(true, |need| body.len() < need) {
        return Err(IndexError::decode(
            event,
            format!("array of length {length} truncated"),
        ));
    }
    (0..length).map(|i| data_u256(event, body, i + 1)).collect()
}

/// Narrows a U256 to i64, failing on overflow.
pub fn u256_to_i64(event: &str, value: U256) -> Result<i64, IndexError> {
    i64::try_from(value)
        .map_err(|_| IndexError::decode(event, format!("integer {value} exceeds 64 bits")))
}

fn to_usize(event: &str, value: U256) -> Result<usize, IndexError> {
    usize::try_from(value)
        .map_err(|_| IndexError::decode(event, format!("offset/length {value} out of range")))
}

// ─── Test-only ABI encoders ──────────────────────────────────────────────────

/// Builders for ABI-encoded payloads, used by decoder round-trip tests.
#[cfg(test)]
pub(crate) mod encode {
    use super::*;

    pub fn word_u256(value: U256) -> [u8; 32] {
        value.to_be_bytes()
    }

    pub fn word_u64(value: u64) -> [u8; 32] {
        word_u256(U256::from(value))
    }

    pub fn topic_for_address(address: Address) -> B256 {
        let mut out = [0u8; 32];
        out[12..].copy_from_slice(address.as_slice());
        B256::from(out)
    }

    pub fn topic_for_u256(value: U256) -> B256 {
        B256::from(value.to_be_bytes())
    }

    pub fn word_address(address: Address) -> [u8; 32] {
        topic_for_address(address).0
    }

    /// Tail-encodes a set of head slots where `parts[i]` is either a fixed
    /// word or a dynamic value. Returns the full data payload.
    pub enum Part {
        Word([u8; 32]),
        Dynamic(Vec<u8>),
        Array(Vec<U256>),
    }

    pub fn payload(parts: Vec<Part>) -> Vec<u8> {
        let head_len = parts.len() * 32;
        let mut head = Vec::with_capacity(head_len);
        let mut tail = Vec::new();
        for part in &parts {
            match part {
                Part::Word(w) => head.extend_from_slice(w),
                Part::Dynamic(bytes) => {
                    head.extend_from_slice(&word_u64((head_len + tail.len()) as u64));
                    tail.extend_from_slice(&word_u64(bytes.len() as u64));
                    tail.extend_from_slice(bytes);
                    let pad = (32 - bytes.len() % 32) % 32;
                    tail.extend(std::iter::repeat(0u8).take(pad));
                }
                Part::Array(values) => {
                    head.extend_from_slice(&word_u64((head_len + tail.len()) as u64));
                    tail.extend_from_slice(&word_u64(values.len() as u64));
                    for value in values {
                        tail.extend_from_slice(&word_u256(*value));
                    }
                }
            }
        }
        head.extend_from_slice(&tail);
        head
    }
}
