//! Typed payload carried by envelopes.
//!
//! One envelope shape has to carry every argument and result type, so the
//! payload is a tagged sum over the known shapes rather than an opaque blob.
//! Construction is compile-time checked; extraction is checked at the
//! receiving end and a mismatch becomes an error reply, never a cast.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::{
    ChatMessage, EngineOptions, GenerationParams, GenerationState, PenaltyParams, RuntimeSpec,
    SamplerParams,
};

/// A payload variant other than the one the receiver expected.
#[derive(Debug, Error)]
#[error("unexpected payload: expected {expected}, got {got}")]
pub struct PayloadMismatch {
    pub expected: &'static str,
    pub got: &'static str,
}

/// Every argument/result shape the contract exchanges.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Payload {
    Options(EngineOptions),
    Runtime(RuntimeSpec),
    Path(PathBuf),
    Text(String),
    Vector(Vec<f32>),
    VectorPair { a: Vec<f32>, b: Vec<f32> },
    Score(f32),
    Fragment(String),
    History(Vec<ChatMessage>),
    Sampler(SamplerParams),
    Penalty(PenaltyParams),
    Generation(GenerationParams),
    State(GenerationState),
}

impl Payload {
    fn variant(&self) -> &'static str {
        match self {
            Payload::Options(_) => "options",
            Payload::Runtime(_) => "runtime",
            Payload::Path(_) => "path",
            Payload::Text(_) => "text",
            Payload::Vector(_) => "vector",
            Payload::VectorPair { .. } => "vector_pair",
            Payload::Score(_) => "score",
            Payload::Fragment(_) => "fragment",
            Payload::History(_) => "history",
            Payload::Sampler(_) => "sampler",
            Payload::Penalty(_) => "penalty",
            Payload::Generation(_) => "generation",
            Payload::State(_) => "state",
        }
    }

    fn mismatch(self, expected: &'static str) -> PayloadMismatch {
        PayloadMismatch {
            expected,
            got: self.variant(),
        }
    }

    pub fn into_options(self) -> Result<EngineOptions, PayloadMismatch> {
        match self {
            Payload::Options(options) => Ok(options),
            other => Err(other.mismatch("options")),
        }
    }

    pub fn into_runtime(self) -> Result<RuntimeSpec, PayloadMismatch> {
        match self {
            Payload::Runtime(spec) => Ok(spec),
            other => Err(other.mismatch("runtime")),
        }
    }

    pub fn into_path(self) -> Result<PathBuf, PayloadMismatch> {
        match self {
            Payload::Path(path) => Ok(path),
            other => Err(other.mismatch("path")),
        }
    }

    pub fn into_text(self) -> Result<String, PayloadMismatch> {
        match self {
            Payload::Text(text) => Ok(text),
            other => Err(other.mismatch("text")),
        }
    }

    pub fn into_vector(self) -> Result<Vec<f32>, PayloadMismatch> {
        match self {
            Payload::Vector(vector) => Ok(vector),
            other => Err(other.mismatch("vector")),
        }
    }

    pub fn into_vector_pair(self) -> Result<(Vec<f32>, Vec<f32>), PayloadMismatch> {
        match self {
            Payload::VectorPair { a, b } => Ok((a, b)),
            other => Err(other.mismatch("vector_pair")),
        }
    }

    pub fn into_score(self) -> Result<f32, PayloadMismatch> {
        match self {
            Payload::Score(score) => Ok(score),
            other => Err(other.mismatch("score")),
        }
    }

    pub fn into_fragment(self) -> Result<String, PayloadMismatch> {
        match self {
            Payload::Fragment(fragment) => Ok(fragment),
            other => Err(other.mismatch("fragment")),
        }
    }

    pub fn into_history(self) -> Result<Vec<ChatMessage>, PayloadMismatch> {
        match self {
            Payload::History(history) => Ok(history),
            other => Err(other.mismatch("history")),
        }
    }

    pub fn into_sampler(self) -> Result<SamplerParams, PayloadMismatch> {
        match self {
            Payload::Sampler(params) => Ok(params),
            other => Err(other.mismatch("sampler")),
        }
    }

    pub fn into_penalty(self) -> Result<PenaltyParams, PayloadMismatch> {
        match self {
            Payload::Penalty(params) => Ok(params),
            other => Err(other.mismatch("penalty")),
        }
    }

    pub fn into_generation(self) -> Result<GenerationParams, PayloadMismatch> {
        match self {
            Payload::Generation(params) => Ok(params),
            other => Err(other.mismatch("generation")),
        }
    }

    pub fn into_state(self) -> Result<GenerationState, PayloadMismatch> {
        match self {
            Payload::State(state) => Ok(state),
            other => Err(other.mismatch("state")),
        }
    }
}

/// Extract a required payload, naming the operation on failure.
pub(crate) fn required(payload: Option<Payload>, method: &str) -> Result<Payload, String> {
    payload.ok_or_else(|| format!("{method}: missing payload"))
}
