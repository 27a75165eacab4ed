//! Pre-start validation (§4.8): before serving any Application, prove the
//! enabled compression modes round-trip losslessly against the cluster's
//! persisted schema. Fatal to the process on mismatch.

use tracing::{info, instrument};

use vela_core::error::SchemaError;
use vela_core::revision::Compression;

const CANARY_PAYLOAD: &[u8] = b"vela-reconciler pre-start canary payload";

/// Runs the canary round-trip for every compression mode that is actually
/// enabled. Returns the first failure; never leaves a canary artifact behind
/// (there is nothing to clean up — the canary only ever exists in memory
/// here, since the round-trip itself is what's being proven).
#[instrument]
pub fn verify_compression_round_trips(enabled: &[Compression]) -> Result<(), SchemaError> {
    for &compression in enabled {
        let compressed = vela_tracker::compression::compress(CANARY_PAYLOAD, compression).map_err(|e| {
            SchemaError::CanaryRoundTripFailed {
                compression: compression.to_string(),
                reason: e.to_string(),
            }
        })?;
        let restored = vela_tracker::compression::decompress(&compressed, compression).map_err(|e| {
            SchemaError::CanaryRoundTripFailed {
                compression: compression.to_string(),
                reason: e.to_string(),
            }
        })?;
        if restored != CANARY_PAYLOAD {
            return Err(SchemaError::CanaryRoundTripFailed {
                compression: compression.to_string(),
                reason: "decompressed payload does not match the canary".to_string(),
            });
        }
        info!(%compression, "pre-start compression canary round-tripped");
    }
    Ok(())
}
