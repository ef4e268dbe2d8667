//! Wire format for one request/response unit crossing the task boundary.
//!
//! One request envelope goes out per call; zero or more reply envelopes come
//! back on the same correlation id, terminated by exactly one envelope with
//! `done` or `error` set. Routing matches on correlation id only.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::method::Method;
use super::payload::Payload;

/// Identifier linking a request to all of its replies.
///
/// Unique per outstanding call for the lifetime of one proxy; not globally
/// unique. The zero value is reserved for the bootstrap handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub u64);

impl CorrelationId {
    /// Reserved id carried by the bootstrap handshake envelope.
    pub const BOOTSTRAP: CorrelationId = CorrelationId(0);
}

/// Hands out fresh correlation ids, scoped to one proxy instance.
#[derive(Debug)]
pub struct CorrelationCounter {
    next: AtomicU64,
}

impl CorrelationCounter {
    pub fn new() -> Self {
        // 0 is the bootstrap sentinel; real calls start at 1.
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next(&self) -> CorrelationId {
        CorrelationId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for CorrelationCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// One transport-level message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub correlation: CorrelationId,
    pub method: Method,
    /// Call argument on the request leg, partial/final result on the reply leg.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    /// Present when the call or stream terminated abnormally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Marks the final envelope of a reply stream.
    #[serde(default)]
    pub done: bool,
}

impl Envelope {
    /// Build the request envelope for one call.
    pub fn request(correlation: CorrelationId, method: Method, payload: Option<Payload>) -> Self {
        Self {
            correlation,
            method,
            payload,
            error: None,
            done: false,
        }
    }

    /// The handshake envelope announcing worker readiness.
    pub fn bootstrap() -> Self {
        Self {
            correlation: CorrelationId::BOOTSTRAP,
            method: Method::Handshake,
            payload: None,
            error: None,
            done: true,
        }
    }

    /// A non-terminal reply carrying one stream element.
    ///
    /// Preserves correlation id and method so the worker stamps replies
    /// without re-deriving identity.
    pub fn reply(&self, payload: Payload) -> Self {
        Self {
            correlation: self.correlation,
            method: self.method.clone(),
            payload: Some(payload),
            error: None,
            done: false,
        }
    }

    /// The terminal reply of a single-result call.
    pub fn reply_value(&self, payload: Option<Payload>) -> Self {
        Self {
            correlation: self.correlation,
            method: self.method.clone(),
            payload,
            error: None,
            done: true,
        }
    }

    /// The terminal reply of a normally completed stream.
    pub fn reply_done(&self) -> Self {
        Self {
            correlation: self.correlation,
            method: self.method.clone(),
            payload: None,
            error: None,
            done: true,
        }
    }

    /// A terminal reply carrying a failure description.
    pub fn reply_error(&self, message: impl Into<String>) -> Self {
        Self {
            correlation: self.correlation,
            method: self.method.clone(),
            payload: None,
            error: Some(message.into()),
            done: false,
        }
    }

    /// True for the last envelope of a reply stream.
    pub fn is_terminal(&self) -> bool {
        self.done || self.error.is_some()
    }
}

/// Ceiling on a serialized envelope. Checked before parsing on decode.
const MAX_ENVELOPE_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("envelope too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Serialize an envelope for transports that carry bytes rather than values.
pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>, WireError> {
    let bytes = serde_json::to_vec(envelope)?;
    if bytes.len() > MAX_ENVELOPE_SIZE {
        return Err(WireError::TooLarge {
            size: bytes.len(),
            max: MAX_ENVELOPE_SIZE,
        });
    }
    Ok(bytes)
}

/// Decode an envelope from bytes. Size is checked before parsing.
pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope, WireError> {
    if bytes.len() > MAX_ENVELOPE_SIZE {
        return Err(WireError::TooLarge {
            size: bytes.len(),
            max: MAX_ENVELOPE_SIZE,
        });
    }
    Ok(serde_json::from_slice(bytes)?)
}
