//! # Socket Frames
//!
//! Decoding of inbound text frames. Only `frontHistory` frames carry
//! anything the engine needs; every other target is recognised and ignored.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::engine::model::{FrontChange, MemberId};

/// The target name of front change notifications.
pub const FRONT_HISTORY_TARGET: &str = "frontHistory";

/// Why a frame could not be turned into something usable.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Not JSON, or not the expected shape.
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    /// A `frontHistory` frame without a first result entry.
    #[error("front history frame has no results")]
    MissingResult,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A member started or stopped fronting.
    Front(FrontChange),
    /// Any other frame; carries its target if it had one.
    Other(Option<String>),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    results: Vec<Value>,
}

#[derive(Deserialize)]
struct FrontResult {
    content: FrontResultContent,
}

#[derive(Deserialize)]
struct FrontResultContent {
    member: MemberId,
    /// Absent means not live.
    #[serde(default)]
    live: bool,
}

/// Decodes one text frame.
///
/// Only the first result of a `frontHistory` frame is considered.
pub fn decode_frame(text: &str) -> Result<Frame, DecodeError> {
    let envelope: Envelope = serde_json::from_str(text)?;
    if envelope.target.as_deref() != Some(FRONT_HISTORY_TARGET) {
        return Ok(Frame::Other(envelope.target));
    }

    let first = envelope
        .results
        .into_iter()
        .next()
        .ok_or(DecodeError::MissingResult)?;
    let result: FrontResult = serde_json::from_value(first)?;

    Ok(Frame::Front(FrontChange {
        member: result.content.member,
        live: result.content.live,
    }))
}
