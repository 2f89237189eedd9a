//! Binary framing for everything that crosses the worker boundary.
//!
//! ```text
//! +------+----------------------+---------------------------+
//! | CLP1 | SHA-256 of the body  | body: gzip(JSON document) |
//! +------+----------------------+---------------------------+
//!   4 B           32 B                   variable
//! ```

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use tracing::trace;

use crate::error::{ChunkloopError, ErrorCode, ErrorExt, Result};

pub const MAGIC: &[u8; 4] = b"CLP1";
const DIGEST_LEN: usize = 32;
const HEADER_LEN: usize = MAGIC.len() + DIGEST_LEN;

/// Serialize, compress and frame `value`
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(value)
        .to_payload_error(ErrorCode::PAYLOAD_ENCODE_FAILED, "failed to serialize payload")?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&json)
        .to_payload_error(ErrorCode::PAYLOAD_ENCODE_FAILED, "failed to compress payload")?;
    let body = encoder
        .finish()
        .to_payload_error(ErrorCode::PAYLOAD_ENCODE_FAILED, "failed to compress payload")?;

    let digest = Sha256::digest(&body);
    let mut framed = Vec::with_capacity(HEADER_LEN + body.len());
    framed.extend_from_slice(MAGIC);
    framed.extend_from_slice(&digest);
    framed.extend_from_slice(&body);

    trace!(json = json.len(), framed = framed.len(), "encoded payload");
    Ok(framed)
}

/// Verify and unpack a payload produced by [`encode`]
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    if bytes.len() < HEADER_LEN || &bytes[..MAGIC.len()] != MAGIC {
        return Err(ChunkloopError::payload_with_code(
            ErrorCode::PAYLOAD_BAD_MAGIC,
            format!("not a chunkloop payload ({} bytes)", bytes.len()),
        ));
    }

    let (expected, body) = bytes[MAGIC.len()..].split_at(DIGEST_LEN);
    if Sha256::digest(body).as_slice() != expected {
        return Err(ChunkloopError::payload_with_code(
            ErrorCode::PAYLOAD_DIGEST_MISMATCH,
            "payload digest does not match its body",
        ));
    }

    let mut json = Vec::new();
    GzDecoder::new(body)
        .read_to_end(&mut json)
        .to_payload_error(ErrorCode::PAYLOAD_DECODE_FAILED, "failed to decompress payload")?;
    trace!(framed = bytes.len(), json = json.len(), "decoded payload");

    serde_json::from_slice(&json)
        .to_payload_error(ErrorCode::PAYLOAD_DECODE_FAILED, "failed to deserialize payload")
}
