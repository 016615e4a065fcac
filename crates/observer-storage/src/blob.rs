//! Embedding blob codec.
//!
//! Embeddings are stored as a raw little-endian `f32` sequence. Encoding is
//! bit-preserving: NaN payloads, infinities, and subnormals round-trip
//! exactly, which matters because vectors are compared bitwise in tests and
//! re-fed to the index unmodified.

use crate::StorageError;

pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

pub fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>, StorageError> {
    if bytes.len() % 4 != 0 {
        return Err(StorageError::MalformedBlob {
            message: format!("{} bytes is not a multiple of 4", bytes.len()),
        });
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
