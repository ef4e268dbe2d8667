//! Operation identifiers shared by both endpoints.
//!
//! The closed enum is the single contract definition: the proxy encodes
//! requests from it and the worker's dispatch match is built over it, so the
//! two sides cannot disagree on an identifier. `Unknown` exists only as a
//! decode escape for peers speaking a newer contract; call sites never
//! construct it.

use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// How the result of an operation comes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Exactly one reply envelope.
    Single,
    /// Zero or more fragment envelopes, then a terminal one.
    Streaming,
    /// Protocol-level message, not dispatched to the service.
    Control,
}

/// Every operation both endpoints agree on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Init,
    InitRuntime,
    LoadEmbedding,
    Embed,
    Similarity,
    Completion,
    Chat,
    SetSamplerParams,
    SetPenaltyParams,
    SetGenerationParams,
    GenerationState,
    SetImage,
    SetAudio,
    ClearState,
    Stop,
    /// Bootstrap handshake; rides the reserved correlation id.
    Handshake,
    /// Cancels the stream with the envelope's correlation id.
    Cancel,
    /// An identifier this build does not know. Decode-only.
    Unknown(String),
}

impl Method {
    /// Stable wire name.
    pub fn name(&self) -> &str {
        match self {
            Method::Init => "init",
            Method::InitRuntime => "init_runtime",
            Method::LoadEmbedding => "load_embedding",
            Method::Embed => "embed",
            Method::Similarity => "similarity",
            Method::Completion => "completion",
            Method::Chat => "chat",
            Method::SetSamplerParams => "set_sampler_params",
            Method::SetPenaltyParams => "set_penalty_params",
            Method::SetGenerationParams => "set_generation_params",
            Method::GenerationState => "generation_state",
            Method::SetImage => "set_image",
            Method::SetAudio => "set_audio",
            Method::ClearState => "clear_state",
            Method::Stop => "stop",
            Method::Handshake => "handshake",
            Method::Cancel => "cancel",
            Method::Unknown(name) => name,
        }
    }

    /// Resolve a wire name. Unrecognized names come back as `Unknown` so the
    /// worker can answer with a method-not-found reply instead of dropping
    /// the envelope.
    pub fn from_name(name: &str) -> Method {
        match name {
            "init" => Method::Init,
            "init_runtime" => Method::InitRuntime,
            "load_embedding" => Method::LoadEmbedding,
            "embed" => Method::Embed,
            "similarity" => Method::Similarity,
            "completion" => Method::Completion,
            "chat" => Method::Chat,
            "set_sampler_params" => Method::SetSamplerParams,
            "set_penalty_params" => Method::SetPenaltyParams,
            "set_generation_params" => Method::SetGenerationParams,
            "generation_state" => Method::GenerationState,
            "set_image" => Method::SetImage,
            "set_audio" => Method::SetAudio,
            "clear_state" => Method::ClearState,
            "stop" => Method::Stop,
            "handshake" => Method::Handshake,
            "cancel" => Method::Cancel,
            other => Method::Unknown(other.to_string()),
        }
    }

    /// Result shape fixed by the contract.
    pub fn kind(&self) -> CallKind {
        match self {
            Method::Completion | Method::Chat => CallKind::Streaming,
            Method::Handshake | Method::Cancel => CallKind::Control,
            _ => CallKind::Single,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Method {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Method {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MethodVisitor;

        impl Visitor<'_> for MethodVisitor {
            type Value = Method;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a method name string")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Method, E> {
                Ok(Method::from_name(value))
            }
        }

        deserializer.deserialize_str(MethodVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Both endpoints derive identifiers from this enum; a drift between
    /// `name` and `from_name` would be a configuration error, so every
    /// operation is checked here.
    #[test]
    fn names_roundtrip_for_every_operation() {
        let all = [
            Method::Init,
            Method::InitRuntime,
            Method::LoadEmbedding,
            Method::Embed,
            Method::Similarity,
            Method::Completion,
            Method::Chat,
            Method::SetSamplerParams,
            Method::SetPenaltyParams,
            Method::SetGenerationParams,
            Method::GenerationState,
            Method::SetImage,
            Method::SetAudio,
            Method::ClearState,
            Method::Stop,
            Method::Handshake,
            Method::Cancel,
        ];
        for method in all {
            assert_eq!(Method::from_name(method.name()), method);
        }
    }

    #[test]
    fn unrecognized_name_decodes_to_unknown() {
        let method = Method::from_name("foo");
        assert_eq!(method, Method::Unknown("foo".into()));
        assert_eq!(method.name(), "foo");
    }

    #[test]
    fn kinds_match_the_contract() {
        assert_eq!(Method::Embed.kind(), CallKind::Single);
        assert_eq!(Method::Completion.kind(), CallKind::Streaming);
        assert_eq!(Method::Chat.kind(), CallKind::Streaming);
        assert_eq!(Method::Cancel.kind(), CallKind::Control);
        assert_eq!(Method::Handshake.kind(), CallKind::Control);
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&Method::SetSamplerParams).unwrap();
        assert_eq!(json, "\"set_sampler_params\"");
        let back: Method = serde_json::from_str("\"embed\"").unwrap();
        assert_eq!(back, Method::Embed);
        let unknown: Method = serde_json::from_str("\"frobnicate\"").unwrap();
        assert_eq!(unknown, Method::Unknown("frobnicate".into()));
    }
}
