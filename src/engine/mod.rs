//! Service contract for local inference engines.
//!
//! `InferenceService` is the boundary both the real engine and its cross-task
//! proxy satisfy identically; call sites never need to know which one they
//! hold. The engine implementation itself lives outside this crate.

mod backend;
mod params;
mod stream;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

pub use backend::Backend;
pub use params::{
    ChatMessage, EngineOptions, GenerationParams, GenerationState, PenaltyParams, Role,
    RuntimeSpec, SamplerParams,
};
pub use stream::{FragmentSender, FragmentStream, StreamClosed};

/// Errors surfaced by the service contract.
///
/// Remote failures are flattened to a descriptive string on the wire and
/// re-raised on the caller side as [`EngineError::Remote`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("engine not ready: {0}")]
    NotReady(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("remote call failed: {0}")]
    Remote(String),

    #[error("bridge unavailable: {0}")]
    Disconnected(String),
}

/// The operations every inference engine (or proxy to one) exposes.
///
/// Single-result operations resolve once; `completion` and `chat` return a
/// [`FragmentStream`] that yields text incrementally. Which shape an operation
/// has is fixed by this contract, never inferred at runtime.
#[async_trait]
pub trait InferenceService: Send + Sync {
    /// Bring up the engine with the given options.
    async fn init(&self, options: EngineOptions) -> Result<(), EngineError>;

    /// Load a concrete model runtime (model weights, tokenizer, backend).
    async fn init_runtime(&self, spec: RuntimeSpec) -> Result<(), EngineError>;

    /// Load an embedding model from disk.
    async fn load_embedding(&self, path: PathBuf) -> Result<(), EngineError>;

    /// Embed text into a numeric vector.
    async fn embed(&self, text: String) -> Result<Vec<f32>, EngineError>;

    /// Similarity score between two embedding vectors.
    async fn similarity(&self, a: Vec<f32>, b: Vec<f32>) -> Result<f32, EngineError>;

    /// Stream a completion for a raw prompt.
    async fn completion(&self, prompt: String) -> Result<FragmentStream, EngineError>;

    /// Stream a chat response for an ordered message history.
    async fn chat(&self, history: Vec<ChatMessage>) -> Result<FragmentStream, EngineError>;

    async fn set_sampler_params(&self, params: SamplerParams) -> Result<(), EngineError>;

    async fn set_penalty_params(&self, params: PenaltyParams) -> Result<(), EngineError>;

    async fn set_generation_params(&self, params: GenerationParams) -> Result<(), EngineError>;

    /// Snapshot of the engine's current activity.
    async fn generation_state(&self) -> Result<GenerationState, EngineError>;

    /// Attach an image for multimodal input.
    async fn set_image(&self, path: PathBuf) -> Result<(), EngineError>;

    /// Attach an audio clip for multimodal input.
    async fn set_audio(&self, path: PathBuf) -> Result<(), EngineError>;

    /// Drop accumulated conversation/multimodal state.
    async fn clear_state(&self) -> Result<(), EngineError>;

    /// Ask the engine to halt in-flight generation.
    async fn stop(&self) -> Result<(), EngineError>;
}
