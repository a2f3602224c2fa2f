//! Compression of the JIT registration for build substitutions.
//!
//! JIT configurations regularly exceed the backend's per-substitution byte
//! cap. The blob is nested base64, so it compresses well: gzip at best
//! compression followed by standard base64 keeps it comfortably under the
//! limit.

use std::io::Write;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::write::GzEncoder;

use super::BuildError;

/// Compresses `input` with gzip at best compression and base64-encodes the
/// result.
pub fn compress_and_encode(input: &str) -> Result<String, BuildError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(input.as_bytes())
        .map_err(|err| BuildError::Codec(err.to_string()))?;
    let compressed = encoder
        .finish()
        .map_err(|err| BuildError::Codec(err.to_string()))?;

    Ok(STANDARD.encode(compressed))
}
