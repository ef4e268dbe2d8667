//! Backend selection for the concrete model runtime.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::EngineError;

/// Closed set of supported inference backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Small-model runtime tuned for on-device LMs.
    SmallLm,
    /// General llama.cpp-style GGUF runtime.
    Llama,
    /// WebGPU-accelerated runtime.
    WebGpu,
    /// Qualcomm neural processing runtime.
    Qnn,
    /// CoreML / Apple Neural Engine runtime.
    CoreMl,
    /// Fallback runtime with no hardware assumptions.
    Generic,
}

impl Backend {
    /// Parse a free-form backend string.
    ///
    /// Matching is case-insensitive and by substring, so configuration values
    /// like `"LLaMA-v2"` or `"use webgpu please"` resolve to the intended
    /// backend. Probe order matters: more specific tokens are checked first.
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        let lowered = raw.to_lowercase();
        let probes: &[(&str, Backend)] = &[
            ("webgpu", Backend::WebGpu),
            ("web", Backend::WebGpu),
            ("qnn", Backend::Qnn),
            ("qualcomm", Backend::Qnn),
            ("coreml", Backend::CoreMl),
            ("apple", Backend::CoreMl),
            ("ane", Backend::CoreMl),
            ("smol", Backend::SmallLm),
            ("small", Backend::SmallLm),
            ("llama", Backend::Llama),
            ("generic", Backend::Generic),
            ("fallback", Backend::Generic),
        ];
        for (token, backend) in probes {
            if lowered.contains(token) {
                return Ok(*backend);
            }
        }
        Err(EngineError::Config(format!("unrecognized backend: {raw:?}")))
    }
}

impl FromStr for Backend {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Backend::parse(s)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Backend::SmallLm => "small_lm",
            Backend::Llama => "llama",
            Backend::WebGpu => "web_gpu",
            Backend::Qnn => "qnn",
            Backend::CoreMl => "core_ml",
            Backend::Generic => "generic",
        };
        f.write_str(name)
    }
}
