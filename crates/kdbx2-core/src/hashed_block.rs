//! The hashed-block framing layer: the decrypted content stream is a
//! sequence of `(index, sha256, length, data)` records terminated by a
//! zero-hash, zero-length block.

use byteorder::{ByteOrder, LittleEndian};
use log::debug;

use crate::crypto;
use crate::error::ErrorKind;

/// Block size used when encoding.
const BLOCK_SPLIT_SIZE: usize = 1024 * 1024;

/// Upper bound accepted when decoding, to keep a corrupt length field from
/// driving a pathological allocation.
const MAX_BLOCK_SIZE: usize = 16 * 1024 * 1024;

/// Decode a hashed-block stream, verifying each block's index and SHA-256.
pub(crate) fn decode(data: &[u8]) -> Result<Vec<u8>, ErrorKind> {
    let mut out = Vec::with_capacity(data.len());
    let mut pos = 0usize;
    let mut expected_index = 0u32;

    loop {
        if pos + 40 > data.len() {
            return Err(ErrorKind::CorruptBlock(
                "truncated block header".to_string(),
            ));
        }

        let index = LittleEndian::read_u32(&data[pos..pos + 4]);
        let hash = &data[pos + 4..pos + 36];
        let length = LittleEndian::read_u32(&data[pos + 36..pos + 40]) as usize;
        pos += 40;

        if length == 0 {
            if hash.iter().any(|&b| b != 0) {
                return Err(ErrorKind::CorruptBlock(
                    "terminator carries a hash".to_string(),
                ));
            }
            break;
        }

        if index != expected_index {
            return Err(ErrorKind::CorruptBlock(format!(
                "block index {index}, expected {expected_index}"
            )));
        }
        if length > MAX_BLOCK_SIZE {
            return Err(ErrorKind::CorruptBlock(format!(
                "block length {length} exceeds limit"
            )));
        }
        if pos + length > data.len() {
            return Err(ErrorKind::CorruptBlock("truncated block data".to_string()));
        }

        let block = &data[pos..pos + length];
        if crypto::sha256(&[block]) != *hash {
            return Err(ErrorKind::CorruptBlock(format!(
                "hash mismatch in block {index}"
            )));
        }

        out.extend_from_slice(block);
        pos += length;
        expected_index += 1;
    }

    debug!("decoded {expected_index} content blocks, {} bytes", out.len());
    Ok(out)
}

/// Encode `data` as a hashed-block stream with 1 MiB blocks and a trailing
/// terminator.
pub(crate) fn encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 80);
    let mut index = 0u32;

    for chunk in data.chunks(BLOCK_SPLIT_SIZE) {
        out.extend_from_slice(&index.to_le_bytes());
        out.extend_from_slice(&crypto::sha256(&[chunk]));
        out.extend_from_slice(&(chunk.len() as u32).to_le_bytes());
        out.extend_from_slice(chunk);
        index += 1;
    }

    out.extend_from_slice(&index.to_le_bytes());
    out.extend_from_slice(&[0u8; 32]);
    out.extend_from_slice(&0u32.to_le_bytes());

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_small() {
        let data = b"some payload".to_vec();
        assert_eq!(decode(&encode(&data)).unwrap(), data);
    }

    #[test]
    fn roundtrip_empty() {
        assert_eq!(decode(&encode(&[])).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn roundtrip_multiple_blocks() {
        let data: Vec<u8> = (0..BLOCK_SPLIT_SIZE + 1000).map(|i| i as u8).collect();
        let encoded = encode(&data);

        // One full block, one partial, one terminator.
        assert_eq!(decode(&encoded).unwrap(), data);
    }

    #[test]
    fn flipped_data_byte_is_corrupt_block() {
        let mut encoded = encode(b"block data under test");
        let last = encoded.len() - 45;
        encoded[last] ^= 0x01;

        let err = decode(&encoded).unwrap_err();
        assert!(matches!(err, ErrorKind::CorruptBlock(_)));
    }

    #[test]
    fn bad_index_is_corrupt_block() {
        let mut encoded = encode(b"block data under test");
        encoded[0] = 7;

        let err = decode(&encoded).unwrap_err();
        assert!(matches!(err, ErrorKind::CorruptBlock(_)));
    }

    #[test]
    fn truncated_stream_is_corrupt_block() {
        let encoded = encode(b"block data under test");

        let err = decode(&encoded[..encoded.len() - 1]).unwrap_err();
        assert!(matches!(err, ErrorKind::CorruptBlock(_)));
    }

    #[test]
    fn nonzero_terminator_hash_is_corrupt_block() {
        let mut encoded = encode(&[]);
        encoded[4] = 1;

        let err = decode(&encoded).unwrap_err();
        assert!(matches!(err, ErrorKind::CorruptBlock(_)));
    }
}
