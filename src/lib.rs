//! tandem — in-process RPC bridge for local inference engines.
//!
//! A model runtime is a stateful, resource-heavy object: loading weights or
//! generating tokens can take seconds. This crate runs that object on its
//! own worker task and hands the caller a proxy with the exact same method
//! surface, so an event loop issuing `embed` or `completion` never blocks on
//! the engine's work.
//!
//! # Shape
//!
//! - [`engine::InferenceService`] — the contract both the real engine and
//!   the proxy implement identically.
//! - [`rpc::EngineProxy`] — spawns the worker, performs the bootstrap
//!   handshake, and translates calls into correlated envelope traffic.
//! - [`engine::FragmentStream`] — incremental results for `completion` and
//!   `chat`, with first-class cancellation.
//!
//! ```no_run
//! # use tandem::{config::BridgeConfig, engine::InferenceService, rpc::EngineProxy};
//! # async fn demo(engine: impl InferenceService + 'static) -> Result<(), Box<dyn std::error::Error>> {
//! let proxy = EngineProxy::connect(engine, &BridgeConfig::default()).await?;
//! let vector = proxy.embed("hello".into()).await?;
//! let mut stream = proxy.completion("Once upon".into()).await?;
//! while let Some(fragment) = stream.next().await {
//!     print!("{}", fragment?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod rpc;
pub mod telemetry;

pub use config::BridgeConfig;
pub use engine::{EngineError, FragmentStream, InferenceService};
pub use rpc::{BridgeError, EngineProxy};
