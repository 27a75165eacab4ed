//! Transparent compression of large ResourceTracker/ApplicationRevision
//! payloads. The compression type is always recorded alongside the bytes so
//! a reader knows how to decompress without guessing.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression as GzLevel;

use vela_core::error::TrackerError;
use vela_core::revision::Compression;

pub fn compress(payload: &[u8], compression: Compression) -> Result<Vec<u8>, TrackerError> {
    match compression {
        Compression::None => Ok(payload.to_vec()),
        Compression::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), GzLevel::default());
            encoder
                .write_all(payload)
                .map_err(|e| compress_err(e.to_string()))?;
            encoder.finish().map_err(|e| compress_err(e.to_string()))
        }
        Compression::Zstd => {
            zstd::encode_all(payload, 0).map_err(|e| compress_err(e.to_string()))
        }
    }
}

pub fn decompress(payload: &[u8], compression: Compression) -> Result<Vec<u8>, TrackerError> {
    match compression {
        Compression::None => Ok(payload.to_vec()),
        Compression::Gzip => {
            let mut decoder = GzDecoder::new(payload);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| decompress_err(e.to_string()))?;
            Ok(out)
        }
        Compression::Zstd => {
            zstd::decode_all(payload).map_err(|e| decompress_err(e.to_string()))
        }
    }
}

fn compress_err(reason: String) -> TrackerError {
    TrackerError::CompressionRoundTrip {
        application: "<compress>".to_string(),
        reason,
    }
}

fn decompress_err(reason: String) -> TrackerError {
    TrackerError::CompressionRoundTrip {
        application: "<decompress>".to_string(),
        reason,
    }
}

/// `decompress(compress(x)) == x` for every compression mode (invariant I5).
pub fn round_trip(payload: &[u8], compression: Compression) -> Result<bool, TrackerError> {
    let compressed = compress(payload, compression)?;
    let restored = decompress(&compressed, compression)?;
    Ok(restored == payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_a_no_op() {
        assert!(round_trip(b"hello", Compression::None).unwrap());
    }

    #[test]
    fn gzip_round_trips() {
        assert!(round_trip(b"hello world, this is a payload", Compression::Gzip).unwrap());
    }

    #[test]
    fn zstd_round_trips() {
        assert!(round_trip(b"hello world, this is a payload", Compression::Zstd).unwrap());
    }

    #[test]
    fn gzip_actually_compresses_repetitive_data() {
        let payload = vec![b'a'; 10_000];
        let compressed = compress(&payload, Compression::Gzip).unwrap();
        assert!(compressed.len() < payload.len());
    }
}
