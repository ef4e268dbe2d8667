//! Proxy endpoint: the caller-facing face of a remote service.
//!
//! `EngineProxy` implements [`InferenceService`] itself, so call sites hold
//! the trait object and never learn whether it is the real engine or this
//! bridge — substitutability is the point of the whole crate.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::BridgeConfig;
use crate::engine::{
    ChatMessage, EngineError, EngineOptions, FragmentStream, GenerationParams, GenerationState,
    InferenceService, PenaltyParams, RuntimeSpec, SamplerParams,
};

use super::envelope::{CorrelationCounter, CorrelationId, Envelope};
use super::method::{CallKind, Method};
use super::payload::Payload;
use super::router::ReplyRouter;
use super::worker::{self, EnvelopeReceiver, EnvelopeSender};

/// Failures establishing the bridge. Fatal to initialization.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("worker handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    #[error("worker exited before completing the handshake")]
    WorkerExited,

    #[error("unexpected envelope during handshake: correlation {0}")]
    UnexpectedEnvelope(u64),
}

/// Cross-task proxy to an [`InferenceService`] running on its own worker task.
pub struct EngineProxy {
    requests: EnvelopeSender,
    router: Arc<ReplyRouter>,
    counter: CorrelationCounter,
}

impl EngineProxy {
    /// Spawn `service` onto its own worker task and perform the bootstrap
    /// handshake. Resolves once the worker announces readiness; a worker
    /// that never does surfaces as [`BridgeError::HandshakeTimeout`] rather
    /// than a hang.
    pub async fn connect<S>(service: S, config: &BridgeConfig) -> Result<Self, BridgeError>
    where
        S: InferenceService + 'static,
    {
        let (req_tx, req_rx) = mpsc::unbounded_channel();
        let (rep_tx, mut rep_rx) = mpsc::unbounded_channel();

        let _worker = worker::spawn(service, req_rx, rep_tx);
        await_bootstrap(&mut rep_rx, config.handshake_timeout).await?;
        debug!("worker handshake complete");

        let router = Arc::new(ReplyRouter::new());
        let fanout = router.clone();
        tokio::spawn(async move {
            while let Some(envelope) = rep_rx.recv().await {
                if envelope.correlation == CorrelationId::BOOTSTRAP {
                    // Re-ack from a repeated handshake; nothing subscribes to it.
                    debug!("worker re-acknowledged handshake");
                    continue;
                }
                fanout.route(envelope);
            }
            // Worker gone: wake every pending call instead of letting it hang.
            fanout.close_all();
        });

        Ok(Self {
            requests: req_tx,
            router,
            counter: CorrelationCounter::new(),
        })
    }

    /// Number of calls currently awaiting replies. The bridge itself applies
    /// no admission control; callers that care bound this themselves.
    pub fn in_flight(&self) -> usize {
        self.router.in_flight()
    }

    /// Repeat the bootstrap exchange on the reserved correlation id.
    ///
    /// Harmless if the worker is already up; the re-ack is absorbed by the
    /// reply fan-out without touching in-flight calls.
    pub fn resend_handshake(&self) -> Result<(), EngineError> {
        self.requests
            .send(Envelope::request(
                CorrelationId::BOOTSTRAP,
                Method::Handshake,
                None,
            ))
            .map_err(|_| disconnected())
    }

    /// Invoke a single-result operation by identifier.
    ///
    /// Escape hatch for diagnostics and forward-compat probing; typed call
    /// sites go through the [`InferenceService`] impl instead. Streaming and
    /// control methods are rejected up front: the worker answers them with a
    /// reply shape this entry point cannot represent (or, for control
    /// envelopes, with no correlated reply at all), so letting them through
    /// would strand the subscription.
    pub async fn call(
        &self,
        method: Method,
        payload: Option<Payload>,
    ) -> Result<Option<Payload>, EngineError> {
        match method.kind() {
            CallKind::Single => self.call_single(method, payload).await,
            kind => Err(EngineError::InvalidInput(format!(
                "{method} is a {kind:?} method, not callable as single-result"
            ))),
        }
    }

    async fn call_single(
        &self,
        method: Method,
        payload: Option<Payload>,
    ) -> Result<Option<Payload>, EngineError> {
        let id = self.counter.next();
        let mut replies = self.router.subscribe(id);

        if self
            .requests
            .send(Envelope::request(id, method, payload))
            .is_err()
        {
            self.router.discard(id);
            return Err(disconnected());
        }

        // Exactly one envelope answers a single-result call; the router
        // retires the subscription because that envelope is terminal.
        match replies.recv().await {
            None => Err(disconnected()),
            Some(envelope) => match envelope.error {
                Some(message) => Err(EngineError::Remote(message)),
                None => Ok(envelope.payload),
            },
        }
    }

    fn call_streaming(
        &self,
        method: Method,
        payload: Option<Payload>,
    ) -> Result<FragmentStream, EngineError> {
        let id = self.counter.next();
        let mut replies = self.router.subscribe(id);

        if self
            .requests
            .send(Envelope::request(id, method, payload))
            .is_err()
        {
            self.router.discard(id);
            return Err(disconnected());
        }

        let (sender, stream) = FragmentStream::channel();
        let requests = self.requests.clone();
        let router = self.router.clone();

        // Translate the correlated reply sub-sequence into stream events.
        // Consumer-side cancel becomes a first-class Cancel envelope; the
        // worker answers it with the terminal `done`.
        tokio::spawn(async move {
            let mut cancel_sent = false;
            loop {
                let received = tokio::select! {
                    _ = sender.cancelled(), if !cancel_sent => {
                        cancel_sent = true;
                        let _ = requests.send(Envelope::request(id, Method::Cancel, None));
                        continue;
                    }
                    received = replies.recv() => received,
                };

                let envelope = match received {
                    Some(envelope) => envelope,
                    None => {
                        sender.fail("bridge closed before stream completed");
                        return;
                    }
                };

                if let Some(message) = envelope.error {
                    sender.fail(message);
                    return;
                }
                if envelope.done {
                    sender.finish();
                    return;
                }
                match envelope.payload.map(Payload::into_fragment) {
                    Some(Ok(fragment)) => {
                        // A consumer that stopped listening without cancelling
                        // just discards the rest; production continues.
                        let _ = sender.send(fragment);
                    }
                    Some(Err(mismatch)) => {
                        warn!(correlation = id.0, %mismatch, "bad stream payload");
                        router.discard(id);
                        sender.fail(mismatch.to_string());
                        return;
                    }
                    None => {}
                }
            }
        });

        Ok(stream)
    }
}

fn disconnected() -> EngineError {
    EngineError::Disconnected("worker channel closed".into())
}

/// The reply a unit-result operation should not have carried a payload for.
fn expect_unit(reply: Option<Payload>) -> Result<(), EngineError> {
    // Workers answer unit operations with an empty terminal envelope; a
    // payload here is tolerated and dropped.
    let _ = reply;
    Ok(())
}

fn expect_payload(reply: Option<Payload>, method: Method) -> Result<Payload, EngineError> {
    reply.ok_or_else(|| EngineError::Execution(format!("{method}: reply missing payload")))
}

fn bad_shape(mismatch: super::payload::PayloadMismatch) -> EngineError {
    EngineError::Execution(mismatch.to_string())
}

#[async_trait]
impl InferenceService for EngineProxy {
    async fn init(&self, options: EngineOptions) -> Result<(), EngineError> {
        let reply = self
            .call_single(Method::Init, Some(Payload::Options(options)))
            .await?;
        expect_unit(reply)
    }

    async fn init_runtime(&self, spec: RuntimeSpec) -> Result<(), EngineError> {
        let reply = self
            .call_single(Method::InitRuntime, Some(Payload::Runtime(spec)))
            .await?;
        expect_unit(reply)
    }

    async fn load_embedding(&self, path: PathBuf) -> Result<(), EngineError> {
        let reply = self
            .call_single(Method::LoadEmbedding, Some(Payload::Path(path)))
            .await?;
        expect_unit(reply)
    }

    async fn embed(&self, text: String) -> Result<Vec<f32>, EngineError> {
        let reply = self
            .call_single(Method::Embed, Some(Payload::Text(text)))
            .await?;
        expect_payload(reply, Method::Embed)?
            .into_vector()
            .map_err(bad_shape)
    }

    async fn similarity(&self, a: Vec<f32>, b: Vec<f32>) -> Result<f32, EngineError> {
        let reply = self
            .call_single(Method::Similarity, Some(Payload::VectorPair { a, b }))
            .await?;
        expect_payload(reply, Method::Similarity)?
            .into_score()
            .map_err(bad_shape)
    }

    async fn completion(&self, prompt: String) -> Result<FragmentStream, EngineError> {
        self.call_streaming(Method::Completion, Some(Payload::Text(prompt)))
    }

    async fn chat(&self, history: Vec<ChatMessage>) -> Result<FragmentStream, EngineError> {
        self.call_streaming(Method::Chat, Some(Payload::History(history)))
    }

    async fn set_sampler_params(&self, params: SamplerParams) -> Result<(), EngineError> {
        let reply = self
            .call_single(Method::SetSamplerParams, Some(Payload::Sampler(params)))
            .await?;
        expect_unit(reply)
    }

    async fn set_penalty_params(&self, params: PenaltyParams) -> Result<(), EngineError> {
        let reply = self
            .call_single(Method::SetPenaltyParams, Some(Payload::Penalty(params)))
            .await?;
        expect_unit(reply)
    }

    async fn set_generation_params(&self, params: GenerationParams) -> Result<(), EngineError> {
        let reply = self
            .call_single(Method::SetGenerationParams, Some(Payload::Generation(params)))
            .await?;
        expect_unit(reply)
    }

    async fn generation_state(&self) -> Result<GenerationState, EngineError> {
        let reply = self.call_single(Method::GenerationState, None).await?;
        expect_payload(reply, Method::GenerationState)?
            .into_state()
            .map_err(bad_shape)
    }

    async fn set_image(&self, path: PathBuf) -> Result<(), EngineError> {
        let reply = self
            .call_single(Method::SetImage, Some(Payload::Path(path)))
            .await?;
        expect_unit(reply)
    }

    async fn set_audio(&self, path: PathBuf) -> Result<(), EngineError> {
        let reply = self
            .call_single(Method::SetAudio, Some(Payload::Path(path)))
            .await?;
        expect_unit(reply)
    }

    async fn clear_state(&self) -> Result<(), EngineError> {
        let reply = self.call_single(Method::ClearState, None).await?;
        expect_unit(reply)
    }

    async fn stop(&self) -> Result<(), EngineError> {
        let reply = self.call_single(Method::Stop, None).await?;
        expect_unit(reply)
    }
}

async fn await_bootstrap(
    replies: &mut EnvelopeReceiver,
    deadline: Duration,
) -> Result<(), BridgeError> {
    let first = timeout(deadline, replies.recv())
        .await
        .map_err(|_| BridgeError::HandshakeTimeout(deadline))?
        .ok_or(BridgeError::WorkerExited)?;
    if first.correlation != CorrelationId::BOOTSTRAP {
        return Err(BridgeError::UnexpectedEnvelope(first.correlation.0));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bootstrap_times_out_instead_of_hanging() {
        let (_tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
        let result = await_bootstrap(&mut rx, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(BridgeError::HandshakeTimeout(_))));
    }

    #[tokio::test]
    async fn bootstrap_detects_dead_worker() {
        let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
        drop(tx);
        let result = await_bootstrap(&mut rx, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(BridgeError::WorkerExited)));
    }

    #[tokio::test]
    async fn bootstrap_rejects_ordinary_envelope() {
        let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
        tx.send(Envelope::request(CorrelationId(9), Method::Stop, None))
            .unwrap();
        let result = await_bootstrap(&mut rx, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(BridgeError::UnexpectedEnvelope(9))));
    }

    #[tokio::test]
    async fn bootstrap_accepts_reserved_id() {
        let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
        tx.send(Envelope::bootstrap()).unwrap();
        assert!(await_bootstrap(&mut rx, Duration::from_millis(20))
            .await
            .is_ok());
    }
}
