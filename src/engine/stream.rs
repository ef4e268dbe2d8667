//! Incremental text output for streaming operations.
//!
//! `FragmentStream` is the caller-visible half: a lazy, finite, forward-only
//! sequence of text fragments ending in either normal completion or a single
//! failure. `FragmentSender` is the producer half used by engines (and by the
//! proxy when reconstructing a remote stream).

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::EngineError;

#[derive(Debug)]
enum FragmentEvent {
    Fragment(String),
    Done,
    Failed(String),
}

/// Producer half for pushing fragments into a stream.
#[derive(Debug, Clone)]
pub struct FragmentSender {
    tx: mpsc::UnboundedSender<FragmentEvent>,
    cancel: CancellationToken,
}

impl FragmentSender {
    /// Push one fragment. Fails once the consumer is gone.
    pub fn send(&self, fragment: impl Into<String>) -> Result<(), StreamClosed> {
        self.tx
            .send(FragmentEvent::Fragment(fragment.into()))
            .map_err(|_| StreamClosed)
    }

    /// Terminate the stream normally. No further events may follow.
    pub fn finish(self) {
        let _ = self.tx.send(FragmentEvent::Done);
    }

    /// Terminate the stream with a failure. No further events may follow.
    pub fn fail(self, message: impl Into<String>) {
        let _ = self.tx.send(FragmentEvent::Failed(message.into()));
    }

    /// True once the consumer has asked the producer to stop.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the consumer asks the producer to stop.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

/// Consumer half: yields fragments until a terminal event.
#[derive(Debug)]
pub struct FragmentStream {
    rx: mpsc::UnboundedReceiver<FragmentEvent>,
    cancel: CancellationToken,
    terminated: bool,
}

impl FragmentStream {
    /// Create a connected sender/stream pair.
    pub fn channel() -> (FragmentSender, FragmentStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let sender = FragmentSender {
            tx,
            cancel: cancel.clone(),
        };
        let stream = FragmentStream {
            rx,
            cancel,
            terminated: false,
        };
        (sender, stream)
    }

    /// Next fragment, or `None` once the stream has ended.
    ///
    /// A failure is yielded exactly once; afterwards the stream reports end.
    /// A producer that goes away without a terminal event counts as normal
    /// completion.
    pub async fn next(&mut self) -> Option<Result<String, EngineError>> {
        if self.terminated {
            return None;
        }
        match self.rx.recv().await {
            Some(FragmentEvent::Fragment(text)) => Some(Ok(text)),
            Some(FragmentEvent::Done) | None => {
                self.terminated = true;
                None
            }
            Some(FragmentEvent::Failed(message)) => {
                self.terminated = true;
                Some(Err(EngineError::Execution(message)))
            }
        }
    }

    /// Drain the stream, concatenating all fragments.
    pub async fn collect_text(mut self) -> Result<String, EngineError> {
        let mut text = String::new();
        while let Some(fragment) = self.next().await {
            text.push_str(&fragment?);
        }
        Ok(text)
    }

    /// Ask the producer to stop. Production already in flight may still land.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token observed by the producer side; fires on [`cancel`](Self::cancel).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl futures::Stream for FragmentStream {
    type Item = Result<String, EngineError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.terminated {
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(FragmentEvent::Fragment(text))) => Poll::Ready(Some(Ok(text))),
            Poll::Ready(Some(FragmentEvent::Done)) | Poll::Ready(None) => {
                this.terminated = true;
                Poll::Ready(None)
            }
            Poll::Ready(Some(FragmentEvent::Failed(message))) => {
                this.terminated = true;
                Poll::Ready(Some(Err(EngineError::Execution(message))))
            }
        }
    }
}

/// The consumer side of a stream has been dropped.
#[derive(Debug)]
pub struct StreamClosed;

impl std::fmt::Display for StreamClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stream closed")
    }
}

impl std::error::Error for StreamClosed {}
