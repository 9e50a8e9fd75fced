//! Wire frame types and a sans-I/O codec for the object store's
//! client/server protocol (spec §4.1).
//!
//! This crate has no knowledge of sockets or async runtimes; it only knows
//! how to turn [`Request`]/[`Reply`] values into length-prefixed frames and
//! back. The transport lives in `store-client` and `services/server`.

mod codec;
mod messages;

pub use codec::{decode_frame, encode_frame, DecodeOutcome, FrameFailureKind, LENGTH_PREFIX_BYTES};
pub use messages::{error_codes, Reply, Request, TaggedFrame};
