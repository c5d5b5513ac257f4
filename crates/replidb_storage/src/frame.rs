//! Record framing shared by byte-oriented backends.
//!
//! ```text
//! | length (4, LE) | crc32 (4, LE) | payload (length) |
//! ```
//!
//! ## Recovery Policy
//!
//! - **Truncated frame** at the end of the data (header or payload cut
//!   short) is a crash mid-append: decoding stops there and reports the
//!   length of the valid prefix so the caller can discard the tail.
//! - **CRC mismatch** on a complete frame is corruption and is fatal.

use crate::error::{StorageError, StorageResult};

/// Size of the frame header: length (4) + crc32 (4).
pub const FRAME_HEADER_SIZE: usize = 8;

/// Result of decoding a byte buffer into frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrames {
    /// Payloads of every complete frame, in order.
    pub records: Vec<Vec<u8>>,
    /// Length in bytes of the prefix made of complete frames.
    pub valid_len: u64,
    /// Whether bytes after `valid_len` were discarded.
    pub truncated_tail: bool,
}

/// Wraps a payload in a frame.
///
/// # Errors
///
/// Returns an error if the payload does not fit a 4-byte length.
pub fn encode_frame(payload: &[u8]) -> StorageResult<Vec<u8>> {
    let len = u32::try_from(payload.len())
        .map_err(|_| StorageError::corrupted("record too large for frame"))?;
    let mut data = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    data.extend_from_slice(&len.to_le_bytes());
    data.extend_from_slice(&compute_crc32(payload).to_le_bytes());
    data.extend_from_slice(payload);
    Ok(data)
}

/// Splits a byte buffer into frame payloads.
///
/// # Errors
///
/// Returns [`StorageError::Corrupted`] on a CRC mismatch.
pub fn decode_frames(data: &[u8]) -> StorageResult<DecodedFrames> {
    let mut records = Vec::new();
    let mut pos = 0usize;

    while pos < data.len() {
        if data.len() - pos < FRAME_HEADER_SIZE {
            break;
        }
        let len = u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
            as usize;
        let stored_crc =
            u32::from_le_bytes([data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]]);
        let start = pos + FRAME_HEADER_SIZE;
        if data.len() - start < len {
            break;
        }
        let payload = &data[start..start + len];
        let actual = compute_crc32(payload);
        if actual != stored_crc {
            return Err(StorageError::corrupted(format!(
                "checksum mismatch at offset {pos}: expected {stored_crc:08x}, got {actual:08x}"
            )));
        }
        records.push(payload.to_vec());
        pos = start + len;
    }

    Ok(DecodedFrames {
        records,
        valid_len: pos as u64,
        truncated_tail: pos < data.len(),
    })
}

/// Computes the CRC32 (IEEE) checksum of the data.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}
