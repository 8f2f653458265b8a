/*
[INPUT]:  Raw inbound frames (always gzip), outbound serializable payloads
[OUTPUT]: Decoded JSON values, encoded outbound bytes
[POS]:    WebSocket layer - frame decoding and payload encoding
[UPDATE]: When the compression scheme or payload encoding changes
*/

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::Serialize;

use crate::error::{HuobiError, Result};
use crate::ws::message::InboundMessage;

/// Upper bound on a single decompressed frame
pub const MAX_DECODED_FRAME: u64 = 16 * 1024 * 1024;

/// Gunzip a frame and parse it as JSON
pub fn decode_frame(frame: &[u8]) -> Result<InboundMessage> {
    decode_frame_within(frame, MAX_DECODED_FRAME)
}

fn decode_frame_within(frame: &[u8], limit: u64) -> Result<InboundMessage> {
    let mut decoder = GzDecoder::new(frame).take(limit + 1);
    let mut raw = Vec::new();
    decoder
        .read_to_end(&mut raw)
        .map_err(|err| HuobiError::Decode(format!("gunzip: {err}")))?;
    if raw.len() as u64 > limit {
        return Err(HuobiError::Decode(format!("frame exceeds {limit} bytes once decompressed")));
    }

    serde_json::from_slice(&raw).map_err(|err| HuobiError::Decode(format!("json: {err}")))
}

/// Encode an outbound payload as JSON bytes
pub fn encode_payload<T: Serialize + ?Sized>(payload: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(payload)?)
}

/// Gzip a payload the way the exchange frames it
pub fn compress_payload<T: Serialize + ?Sized>(payload: &T) -> Result<Vec<u8>> {
    let raw = encode_payload(payload)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw)?;
    Ok(encoder.finish()?)
}
