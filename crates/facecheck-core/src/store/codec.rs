//! Binary record format for a stored feature vector.
//!
//! ```text
//! "FCFV" | version:u8 | dim:u32 LE | dim × f64 LE | sha256(all preceding bytes)
//! ```
//!
//! Values are stored as raw IEEE-754 bits, so a round trip is bit-exact.

use super::StoreError;
use crate::types::FeatureVector;
use sha2::{Digest, Sha256};

const MAGIC: &[u8; 4] = b"FCFV";
const FORMAT_VERSION: u8 = 1;
const HEADER_LEN: usize = 4 + 1 + 4;
const DIGEST_LEN: usize = 32;

pub fn encode(vector: &FeatureVector) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + vector.len() * 8 + DIGEST_LEN);
    buf.extend_from_slice(MAGIC);
    buf.push(FORMAT_VERSION);
    buf.extend_from_slice(&(vector.len() as u32).to_le_bytes());
    for v in &vector.values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    let digest = Sha256::digest(&buf);
    buf.extend_from_slice(&digest);
    buf
}

/// Decode a record, verifying its header and digest.
///
/// `user_id` is only used to label errors.
pub fn decode(user_id: &str, bytes: &[u8]) -> Result<FeatureVector, StoreError> {
    let corrupt = |reason: String| StoreError::Corrupt {
        user_id: user_id.to_string(),
        reason,
    };

    if bytes.len() < HEADER_LEN + DIGEST_LEN {
        return Err(corrupt(format!("record too short ({} bytes)", bytes.len())));
    }
    if &bytes[..4] != MAGIC {
        return Err(corrupt("bad magic".into()));
    }
    if bytes[4] != FORMAT_VERSION {
        return Err(corrupt(format!("unsupported format version {}", bytes[4])));
    }

    let dim = u32::from_le_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]) as usize;
    let expected = dim
        .checked_mul(8)
        .and_then(|body| body.checked_add(HEADER_LEN + DIGEST_LEN))
        .ok_or_else(|| corrupt(format!("dimension {dim} too large")))?;
    if bytes.len() != expected {
        return Err(corrupt(format!(
            "expected {expected} bytes for {dim} values, got {}",
            bytes.len()
        )));
    }

    let (body, stored_digest) = bytes.split_at(bytes.len() - DIGEST_LEN);
    if Sha256::digest(body).as_slice() != stored_digest {
        return Err(corrupt("checksum mismatch".into()));
    }

    let values = body[HEADER_LEN..]
        .chunks_exact(8)
        .map(|chunk| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            f64::from_le_bytes(raw)
        })
        .collect();

    Ok(FeatureVector::new(values))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FeatureVector {
        FeatureVector::new((0..300).map(|i| (i % 256) as f64 / 255.0).collect())
    }

    #[test]
    fn test_roundtrip_bit_exact() {
        let v = sample();
        let decoded = decode("u1", &encode(&v)).unwrap();
        assert_eq!(decoded.len(), v.len());
        assert!(decoded
            .values
            .iter()
            .zip(v.values.iter())
            .all(|(a, b)| a.to_bits() == b.to_bits()));
    }

    #[test]
    fn test_roundtrip_empty_vector() {
        let v = FeatureVector::new(Vec::new());
        assert_eq!(decode("u1", &encode(&v)).unwrap(), v);
    }

    #[test]
    fn test_encoded_length() {
        let v = sample();
        assert_eq!(encode(&v).len(), HEADER_LEN + 300 * 8 + DIGEST_LEN);
    }

    #[test]
    fn test_truncated_record_rejected() {
        let bytes = encode(&sample());
        let err = decode("u1", &bytes[..bytes.len() - 9]).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn test_flipped_bit_rejected() {
        let mut bytes = encode(&sample());
        bytes[HEADER_LEN + 17] ^= 0x01;
        let err = decode("u1", &bytes).unwrap_err();
        match err {
            StoreError::Corrupt { user_id, reason } => {
                assert_eq!(user_id, "u1");
                assert!(reason.contains("checksum"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = encode(&sample());
        bytes[0] = b'X';
        assert!(matches!(decode("u1", &bytes), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_oversized_dimension_rejected() {
        let mut bytes = encode(&sample());
        bytes[5..9].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(decode("u1", &bytes), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_short_garbage_rejected() {
        assert!(matches!(decode("u1", b"FCFV"), Err(StoreError::Corrupt { .. })));
    }
}
