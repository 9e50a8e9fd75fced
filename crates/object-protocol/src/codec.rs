//! Length-prefixed JSON framing, shared by the client session and the
//! server's connection I/O loops.
//!
//! Each frame is a single JSON object preceded by a 4-byte big-endian
//! length prefix. This module is transport-agnostic (sans I/O): callers own
//! the byte buffer and the actual read/write calls, so the same decode loop
//! works whether the bytes arrive over a blocking `std::io::Read` or an
//! async `tokio::io::AsyncRead`.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::messages::TaggedFrame;

pub const LENGTH_PREFIX_BYTES: usize = 4;

/// Classifies why a frame body failed to decode into its type, per spec
/// §4.1/§7's three-way fail mode split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFailureKind {
    /// Not valid JSON, or JSON without a recognizable `type` tag.
    Malformed,
    /// Valid JSON with a `type` tag, but the tag isn't a known variant.
    UnknownType,
    /// Recognized `type`, but the remaining fields don't match its shape.
    BadPayload,
}

impl FrameFailureKind {
    /// The wire error code (`object_protocol::error_codes`) this failure
    /// should be reported with.
    #[must_use]
    pub fn error_code(self) -> &'static str {
        match self {
            FrameFailureKind::Malformed => crate::error_codes::MALFORMED,
            FrameFailureKind::UnknownType => crate::error_codes::UNKNOWN_TYPE,
            FrameFailureKind::BadPayload => crate::error_codes::BAD_PAYLOAD,
        }
    }
}

/// Encode a message into a length-prefixed frame ready to write to the wire.
pub fn encode_frame<T: Serialize>(msg: &T) -> Result<Vec<u8>, serde_json::Error> {
    let body = serde_json::to_vec(msg)?;
    let mut out = Vec::with_capacity(LENGTH_PREFIX_BYTES + body.len());
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Outcome of attempting to decode one frame out of an accumulating buffer.
#[derive(Debug)]
pub enum DecodeOutcome<T> {
    /// Not enough bytes buffered yet; caller should read more and retry.
    Incomplete,
    /// A full frame decoded successfully; `consumed` bytes should be
    /// drained from the front of the buffer.
    Frame { value: T, consumed: usize },
    /// A full frame's worth of bytes arrived but failed to parse as JSON,
    /// or the JSON didn't carry a recognized `type`/shape (spec §4.1's
    /// `malformed`/`unknown_type`/`bad_payload` fail modes). `consumed`
    /// bytes should still be drained — the frame boundary is known even
    /// though its content is invalid. `kind` tells which of the three fail
    /// modes this was, so callers can reply with the matching error code
    /// instead of collapsing everything to `malformed`.
    Malformed {
        reason: String,
        consumed: usize,
        kind: FrameFailureKind,
    },
}

/// Attempt to decode one frame from the front of `buf`. Never panics on
/// partial or garbage input; parsing faults are converted into
/// [`DecodeOutcome::Malformed`] rather than unwinding (spec §9 design note).
///
/// Classifies failures in three steps, matching spec §4.1/§7: parse the
/// body as JSON first (failure here is `Malformed`), then check whether its
/// `type` tag is one `T` recognizes (failure here is `UnknownType`), and
/// only then attempt the full typed deserialize (failure here is
/// `BadPayload`).
pub fn decode_frame<T: DeserializeOwned + TaggedFrame>(buf: &[u8]) -> DecodeOutcome<T> {
    if buf.len() < LENGTH_PREFIX_BYTES {
        return DecodeOutcome::Incomplete;
    }
    let len = u32::from_be_bytes(buf[..LENGTH_PREFIX_BYTES].try_into().unwrap()) as usize;
    let total = LENGTH_PREFIX_BYTES + len;
    if buf.len() < total {
        return DecodeOutcome::Incomplete;
    }
    let body = &buf[LENGTH_PREFIX_BYTES..total];

    let value: serde_json::Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => {
            return DecodeOutcome::Malformed {
                reason: e.to_string(),
                consumed: total,
                kind: FrameFailureKind::Malformed,
            };
        }
    };

    match value.get("type").and_then(serde_json::Value::as_str) {
        Some(tag) if T::is_recognized_type(tag) => {}
        Some(tag) => {
            return DecodeOutcome::Malformed {
                reason: format!("unrecognized type {tag:?}"),
                consumed: total,
                kind: FrameFailureKind::UnknownType,
            };
        }
        None => {
            return DecodeOutcome::Malformed {
                reason: "missing or non-string \"type\" field".to_string(),
                consumed: total,
                kind: FrameFailureKind::Malformed,
            };
        }
    }

    match serde_json::from_value::<T>(value) {
        Ok(value) => DecodeOutcome::Frame {
            value,
            consumed: total,
        },
        Err(e) => DecodeOutcome::Malformed {
            reason: e.to_string(),
            consumed: total,
            kind: FrameFailureKind::BadPayload,
        },
    }
}
