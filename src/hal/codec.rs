// src/hal/codec.rs
//! Notification payload decoding

use crate::error::DecodeError;

/// Decode little-endian u16 pairs into amplitudes, dividing each by `scale`
pub fn decode_payload(bytes: &[u8], scale: f64) -> Result<Vec<f64>, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    if bytes.len() % 2 != 0 {
        return Err(DecodeError::OddLength(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]) as f64 / scale)
        .collect())
}

/// Inverse of `decode_payload`, used by the simulator. Values are clamped to the u16 range.
pub fn encode_payload(values: &[f64], scale: f64) -> Vec<u8> {
    values
        .iter()
        .flat_map(|v| {
            let raw = (v * scale).round().clamp(0.0, u16::MAX as f64) as u16;
            raw.to_le_bytes()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_little_endian() {
        // 1000 = 0x03E8, 2500 = 0x09C4
        let values = decode_payload(&[0xE8, 0x03, 0xC4, 0x09], 1000.0).unwrap();
        assert_eq!(values, vec![1.0, 2.5]);
    }

    #[test]
    fn test_decode_rejects_bad_lengths() {
        assert_eq!(decode_payload(&[], 1000.0), Err(DecodeError::Empty));
        assert_eq!(decode_payload(&[1, 2, 3], 1000.0), Err(DecodeError::OddLength(3)));
    }

    #[test]
    fn test_encode_clamps() {
        let bytes = encode_payload(&[-1.0, 70.0, 0.5], 1000.0);
        let values = decode_payload(&bytes, 1000.0).unwrap();
        assert_eq!(values, vec![0.0, 65.535, 0.5]);
    }
}
