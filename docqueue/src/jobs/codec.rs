//! Payload encoding: JSON, zlib, then standard base64 text.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use thiserror::Error;

/// Payload codec errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// JSON (de)serialization failed.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// Compression failed.
    #[error("zlib: {0}")]
    Compression(#[from] std::io::Error),

    /// The text is not valid base64.
    #[error("base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Encode a job into payload text.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn encode_payload<T: Serialize>(value: &T) -> Result<String, CodecError> {
    let json = serde_json::to_vec(value)?;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    let compressed = encoder.finish()?;
    Ok(STANDARD.encode(compressed))
}

/// Decode payload text produced by [`encode_payload`].
///
/// # Errors
///
/// Returns an error if any stage of the pipeline rejects the input.
pub fn decode_payload<T: DeserializeOwned>(payload: &str) -> Result<T, CodecError> {
    let compressed = STANDARD.decode(payload.trim())?;
    let decoder = ZlibDecoder::new(compressed.as_slice());
    Ok(serde_json::from_reader(decoder)?)
}
