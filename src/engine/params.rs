//! Parameter and state records exchanged with the inference engine.
//!
//! These are plain immutable data carriers: the bridge moves them across the
//! task boundary without interpreting them. Validation mirrors what engines
//! reject anyway, so bad values fail before a request is ever enqueued.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::backend::Backend;
use super::EngineError;

/// Options applied when the engine itself is brought up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineOptions {
    /// Context window size in tokens.
    pub context_length: usize,
    /// Worker threads for the engine (0 = auto-detect).
    #[serde(default)]
    pub thread_count: usize,
    /// RNG seed. None = nondeterministic.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            context_length: 4096,
            thread_count: 0,
            seed: None,
        }
    }
}

/// Everything needed to bring up a concrete model runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSpec {
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub backend: Backend,
}

/// Sampling controls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: usize,
    #[serde(default)]
    pub min_p: f32,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SamplerParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
            min_p: 0.0,
            seed: None,
        }
    }
}

impl SamplerParams {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.temperature < 0.0 {
            return Err(EngineError::InvalidInput("temperature must be >= 0".into()));
        }
        if self.top_p <= 0.0 || self.top_p > 1.0 {
            return Err(EngineError::InvalidInput("top_p must be in (0, 1]".into()));
        }
        if self.min_p < 0.0 || self.min_p > 1.0 {
            return Err(EngineError::InvalidInput("min_p must be in [0, 1]".into()));
        }
        Ok(())
    }
}

/// Repetition penalty controls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PenaltyParams {
    pub repeat_penalty: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    /// How many trailing tokens the repeat penalty looks at.
    pub repeat_last_n: usize,
}

impl Default for PenaltyParams {
    fn default() -> Self {
        Self {
            repeat_penalty: 1.1,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            repeat_last_n: 64,
        }
    }
}

/// Generation-level controls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_tokens: usize,
    #[serde(default)]
    pub stop_sequences: Vec<String>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            stop_sequences: Vec::new(),
        }
    }
}

impl GenerationParams {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_tokens == 0 {
            return Err(EngineError::InvalidInput("max_tokens must be > 0".into()));
        }
        Ok(())
    }
}

/// Point-in-time snapshot of what the engine is doing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationState {
    pub busy: bool,
    /// Fraction of the current request completed, in [0, 1].
    pub progress: f32,
    /// Prompt processing speed, tokens/sec.
    pub prefill_speed: f32,
    /// Token generation speed, tokens/sec.
    pub decode_speed: f32,
    pub timestamp: DateTime<Utc>,
}

impl GenerationState {
    /// An idle snapshot stamped with the current time.
    pub fn idle() -> Self {
        Self {
            busy: false,
            progress: 0.0,
            prefill_speed: 0.0,
            decode_speed: 0.0,
            timestamp: Utc::now(),
        }
    }
}

/// Who said what in a chat history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of a chat history, ordered oldest first by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampler_defaults_are_valid() {
        assert!(SamplerParams::default().validate().is_ok());
    }

    #[test]
    fn sampler_rejects_negative_temperature() {
        let params = SamplerParams {
            temperature: -0.1,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn sampler_rejects_top_p_out_of_range() {
        let params = SamplerParams {
            top_p: 1.5,
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let params = SamplerParams {
            top_p: 0.0,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn generation_rejects_zero_max_tokens() {
        let params = GenerationParams {
            max_tokens: 0,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn engine_options_serde_defaults() {
        // Old callers omit thread_count and seed.
        let json = r#"{"context_length":2048}"#;
        let options: EngineOptions = serde_json::from_str(json).unwrap();
        assert_eq!(options.context_length, 2048);
        assert_eq!(options.thread_count, 0);
        assert!(options.seed.is_none());
    }

    #[test]
    fn chat_message_role_serde() {
        let msg = ChatMessage::new(Role::Assistant, "hi");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"assistant\""));
        let back: ChatMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.role, Role::Assistant);
    }

    #[test]
    fn idle_state_not_busy() {
        let state = GenerationState::idle();
        assert!(!state.busy);
        assert_eq!(state.progress, 0.0);
    }
}
