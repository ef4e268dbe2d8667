//! Worker endpoint: owns the real service and answers envelopes.
//!
//! The loop has a single "listening" state and never suspends on a call:
//! every dispatch runs in its own task, so slow operations delay only their
//! own reply. Any failure a dispatch produces is converted into an
//! error-bearing reply envelope; nothing propagates out of the loop.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engine::InferenceService;

use super::envelope::{CorrelationId, Envelope};
use super::method::{CallKind, Method};
use super::payload::{required, Payload};

pub(crate) type EnvelopeSender = mpsc::UnboundedSender<Envelope>;
pub(crate) type EnvelopeReceiver = mpsc::UnboundedReceiver<Envelope>;

/// Spawn the worker task for one service instance.
///
/// The first envelope sent is the bootstrap handshake on the reserved
/// correlation id; the proxy suspends until it arrives.
pub(crate) fn spawn<S>(
    service: S,
    requests: EnvelopeReceiver,
    replies: EnvelopeSender,
) -> JoinHandle<()>
where
    S: InferenceService + 'static,
{
    tokio::spawn(listen(Arc::new(service), requests, replies))
}

async fn listen<S>(service: Arc<S>, mut requests: EnvelopeReceiver, replies: EnvelopeSender)
where
    S: InferenceService + 'static,
{
    // Streaming calls still producing, keyed by correlation id so a cancel
    // envelope can find them.
    let active_streams: Arc<DashMap<CorrelationId, CancellationToken>> = Arc::new(DashMap::new());

    if replies.send(Envelope::bootstrap()).is_err() {
        warn!("proxy gone before bootstrap handshake");
        return;
    }

    while let Some(envelope) = requests.recv().await {
        if let Method::Unknown(name) = &envelope.method {
            warn!(method = %name, correlation = envelope.correlation.0, "unknown method");
            let reply = envelope.reply_error(format!("method not found: {name}"));
            let _ = replies.send(reply);
            continue;
        }

        match envelope.method.kind() {
            CallKind::Control => match envelope.method {
                Method::Handshake => {
                    // Re-initialization attempt; the dispatch table is
                    // immutable, so only the ack needs repeating.
                    let _ = replies.send(Envelope::bootstrap());
                }
                Method::Cancel => {
                    if let Some((_, token)) = active_streams.remove(&envelope.correlation) {
                        debug!(correlation = envelope.correlation.0, "cancelling stream");
                        token.cancel();
                    }
                }
                _ => {}
            },
            CallKind::Single => {
                let service = service.clone();
                let replies = replies.clone();
                tokio::spawn(async move {
                    let reply = match single_call(service.as_ref(), &envelope).await {
                        Ok(payload) => envelope.reply_value(payload),
                        Err(message) => envelope.reply_error(message),
                    };
                    let _ = replies.send(reply);
                });
            }
            CallKind::Streaming => {
                let token = CancellationToken::new();
                active_streams.insert(envelope.correlation, token.clone());
                let service = service.clone();
                let replies = replies.clone();
                let active = active_streams.clone();
                tokio::spawn(async move {
                    pump_stream(service.as_ref(), &envelope, &replies, &token).await;
                    active.remove(&envelope.correlation);
                });
            }
        }
    }

    debug!("worker endpoint shutting down");
}

/// Decode, invoke, and encode one single-result operation.
///
/// This match is the method registry: built from the same closed contract
/// enum the proxy encodes requests with, so the two sides cannot drift.
async fn single_call<S: InferenceService>(
    service: &S,
    envelope: &Envelope,
) -> Result<Option<Payload>, String> {
    let name = envelope.method.name().to_string();
    let payload = envelope.payload.clone();
    let shape = |e: super::payload::PayloadMismatch| format!("{name}: {e}");
    let call = |e: crate::engine::EngineError| e.to_string();

    match envelope.method {
        Method::Init => {
            let options = required(payload, &name)?.into_options().map_err(shape)?;
            service.init(options).await.map_err(call)?;
            Ok(None)
        }
        Method::InitRuntime => {
            let spec = required(payload, &name)?.into_runtime().map_err(shape)?;
            service.init_runtime(spec).await.map_err(call)?;
            Ok(None)
        }
        Method::LoadEmbedding => {
            let path = required(payload, &name)?.into_path().map_err(shape)?;
            service.load_embedding(path).await.map_err(call)?;
            Ok(None)
        }
        Method::Embed => {
            let text = required(payload, &name)?.into_text().map_err(shape)?;
            let vector = service.embed(text).await.map_err(call)?;
            Ok(Some(Payload::Vector(vector)))
        }
        Method::Similarity => {
            let (a, b) = required(payload, &name)?.into_vector_pair().map_err(shape)?;
            let score = service.similarity(a, b).await.map_err(call)?;
            Ok(Some(Payload::Score(score)))
        }
        Method::SetSamplerParams => {
            let params = required(payload, &name)?.into_sampler().map_err(shape)?;
            service.set_sampler_params(params).await.map_err(call)?;
            Ok(None)
        }
        Method::SetPenaltyParams => {
            let params = required(payload, &name)?.into_penalty().map_err(shape)?;
            service.set_penalty_params(params).await.map_err(call)?;
            Ok(None)
        }
        Method::SetGenerationParams => {
            let params = required(payload, &name)?.into_generation().map_err(shape)?;
            service.set_generation_params(params).await.map_err(call)?;
            Ok(None)
        }
        Method::GenerationState => {
            let state = service.generation_state().await.map_err(call)?;
            Ok(Some(Payload::State(state)))
        }
        Method::SetImage => {
            let path = required(payload, &name)?.into_path().map_err(shape)?;
            service.set_image(path).await.map_err(call)?;
            Ok(None)
        }
        Method::SetAudio => {
            let path = required(payload, &name)?.into_path().map_err(shape)?;
            service.set_audio(path).await.map_err(call)?;
            Ok(None)
        }
        Method::ClearState => {
            service.clear_state().await.map_err(call)?;
            Ok(None)
        }
        Method::Stop => {
            service.stop().await.map_err(call)?;
            Ok(None)
        }
        // Streaming and control methods are routed before this match; a raw
        // caller can still only reach them through their own dispatch paths.
        _ => Err(format!("{name}: not a single-result operation")),
    }
}

/// Forward one streaming operation's elements as reply envelopes.
///
/// Exactly one terminal envelope is sent: `done` on normal completion or
/// cancellation, `error` on setup or stream failure.
async fn pump_stream<S: InferenceService>(
    service: &S,
    envelope: &Envelope,
    replies: &EnvelopeSender,
    cancel: &CancellationToken,
) {
    let name = envelope.method.name().to_string();
    let payload = envelope.payload.clone();

    let opened = match &envelope.method {
        Method::Completion => match required(payload, &name)
            .and_then(|p| p.into_text().map_err(|e| format!("{name}: {e}")))
        {
            Ok(prompt) => service.completion(prompt).await.map_err(|e| e.to_string()),
            Err(message) => Err(message),
        },
        Method::Chat => match required(payload, &name)
            .and_then(|p| p.into_history().map_err(|e| format!("{name}: {e}")))
        {
            Ok(history) => service.chat(history).await.map_err(|e| e.to_string()),
            Err(message) => Err(message),
        },
        other => Err(format!("{}: not a streaming operation", other.name())),
    };

    let mut stream = match opened {
        Ok(stream) => stream,
        Err(message) => {
            let _ = replies.send(envelope.reply_error(message));
            return;
        }
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                stream.cancel();
                let _ = replies.send(envelope.reply_done());
                return;
            }
            next = stream.next() => match next {
                Some(Ok(fragment)) => {
                    if replies.send(envelope.reply(Payload::Fragment(fragment))).is_err() {
                        return;
                    }
                }
                Some(Err(e)) => {
                    let _ = replies.send(envelope.reply_error(e.to_string()));
                    return;
                }
                None => {
                    let _ = replies.send(envelope.reply_done());
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::PathBuf;

    use async_trait::async_trait;

    use crate::engine::{
        ChatMessage, EngineError, EngineOptions, FragmentStream, GenerationParams, GenerationState,
        PenaltyParams, RuntimeSpec, SamplerParams,
    };

    struct FixedEngine;

    #[async_trait]
    impl InferenceService for FixedEngine {
        async fn init(&self, _options: EngineOptions) -> Result<(), EngineError> {
            Ok(())
        }
        async fn init_runtime(&self, _spec: RuntimeSpec) -> Result<(), EngineError> {
            Ok(())
        }
        async fn load_embedding(&self, _path: PathBuf) -> Result<(), EngineError> {
            Ok(())
        }
        async fn embed(&self, _text: String) -> Result<Vec<f32>, EngineError> {
            Ok(vec![1.0])
        }
        async fn similarity(&self, _a: Vec<f32>, _b: Vec<f32>) -> Result<f32, EngineError> {
            Ok(0.0)
        }
        async fn completion(&self, _prompt: String) -> Result<FragmentStream, EngineError> {
            let (sender, stream) = FragmentStream::channel();
            sender.finish();
            Ok(stream)
        }
        async fn chat(&self, _history: Vec<ChatMessage>) -> Result<FragmentStream, EngineError> {
            let (sender, stream) = FragmentStream::channel();
            sender.finish();
            Ok(stream)
        }
        async fn set_sampler_params(&self, _params: SamplerParams) -> Result<(), EngineError> {
            Ok(())
        }
        async fn set_penalty_params(&self, _params: PenaltyParams) -> Result<(), EngineError> {
            Ok(())
        }
        async fn set_generation_params(&self, _params: GenerationParams) -> Result<(), EngineError> {
            Ok(())
        }
        async fn generation_state(&self) -> Result<GenerationState, EngineError> {
            Ok(GenerationState::idle())
        }
        async fn set_image(&self, _path: PathBuf) -> Result<(), EngineError> {
            Ok(())
        }
        async fn set_audio(&self, _path: PathBuf) -> Result<(), EngineError> {
            Ok(())
        }
        async fn clear_state(&self) -> Result<(), EngineError> {
            Ok(())
        }
        async fn stop(&self) -> Result<(), EngineError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn single_result_calls_are_answered_by_exactly_one_envelope() {
        let (req_tx, req_rx) = mpsc::unbounded_channel();
        let (rep_tx, mut rep_rx) = mpsc::unbounded_channel();
        let _worker = spawn(FixedEngine, req_rx, rep_tx);

        let bootstrap = rep_rx.recv().await.unwrap();
        assert_eq!(bootstrap.correlation, CorrelationId::BOOTSTRAP);

        let embed = Envelope::request(
            CorrelationId(1),
            Method::Embed,
            Some(Payload::Text("x".into())),
        );
        let stop = Envelope::request(CorrelationId(2), Method::Stop, None);
        // Shape error case: the failure must also arrive as one terminal reply.
        let bad = Envelope::request(CorrelationId(3), Method::Embed, None);
        for request in [embed, stop, bad] {
            req_tx.send(request).unwrap();
        }

        let mut seen = Vec::new();
        for _ in 0..3 {
            let reply = rep_rx.recv().await.unwrap();
            assert!(reply.is_terminal(), "single-result reply must be terminal");
            if reply.correlation == CorrelationId(3) {
                assert!(reply.error.is_some());
            } else {
                assert!(reply.error.is_none());
            }
            seen.push(reply.correlation);
        }
        seen.sort_by_key(|id| id.0);
        assert_eq!(
            seen,
            vec![CorrelationId(1), CorrelationId(2), CorrelationId(3)]
        );

        // With the request side closed, the reply channel must drain without
        // any further envelope for those ids.
        drop(req_tx);
        assert!(rep_rx.recv().await.is_none());
    }
}
