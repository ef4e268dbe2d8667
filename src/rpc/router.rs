//! Correlation bookkeeping on the proxy side.
//!
//! One entry per outstanding call, created at call start and destroyed when
//! the reply stream terminates. Replies for one id never reach another id's
//! queue, whatever the arrival interleaving.

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::warn;

use super::envelope::{CorrelationId, Envelope};

/// Fans incoming reply envelopes out to per-call queues.
#[derive(Debug, Default)]
pub(crate) struct ReplyRouter {
    subscriptions: DashMap<CorrelationId, mpsc::UnboundedSender<Envelope>>,
}

impl ReplyRouter {
    pub(crate) fn new() -> Self {
        Self {
            subscriptions: DashMap::new(),
        }
    }

    /// Open the reply queue for a fresh correlation id.
    pub(crate) fn subscribe(&self, id: CorrelationId) -> mpsc::UnboundedReceiver<Envelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscriptions.insert(id, tx);
        rx
    }

    /// Deliver one incoming envelope to its call.
    ///
    /// Terminal envelopes retire the subscription. Envelopes with no
    /// subscriber (stale id, peer bug) are logged and dropped; other
    /// in-flight ids are unaffected.
    pub(crate) fn route(&self, envelope: Envelope) {
        let id = envelope.correlation;
        let terminal = envelope.is_terminal();
        let delivered = match self.subscriptions.get(&id) {
            Some(entry) => entry.value().send(envelope).is_ok(),
            None => {
                warn!(correlation = id.0, "dropping unroutable reply envelope");
                return;
            }
        };
        if terminal || !delivered {
            self.subscriptions.remove(&id);
        }
    }

    /// Drop a subscription without waiting for a terminal envelope.
    pub(crate) fn discard(&self, id: CorrelationId) {
        self.subscriptions.remove(&id);
    }

    /// Drop every subscription, waking all pending calls with channel
    /// closure. Used when the reply side of the transport goes away.
    pub(crate) fn close_all(&self) {
        self.subscriptions.clear();
    }

    /// Number of calls currently awaiting replies.
    pub(crate) fn in_flight(&self) -> usize {
        self.subscriptions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::method::Method;
    use crate::rpc::payload::Payload;

    fn fragment(id: u64, text: &str) -> Envelope {
        Envelope::request(CorrelationId(id), Method::Completion, None)
            .reply(Payload::Fragment(text.into()))
    }

    #[tokio::test]
    async fn routes_by_correlation_id() {
        let router = ReplyRouter::new();
        let mut rx1 = router.subscribe(CorrelationId(1));
        let mut rx2 = router.subscribe(CorrelationId(2));

        router.route(fragment(2, "for-two"));
        router.route(fragment(1, "for-one"));

        let got1 = rx1.recv().await.unwrap();
        let got2 = rx2.recv().await.unwrap();
        assert_eq!(got1.payload.unwrap().into_fragment().unwrap(), "for-one");
        assert_eq!(got2.payload.unwrap().into_fragment().unwrap(), "for-two");
    }

    #[tokio::test]
    async fn terminal_envelope_retires_subscription() {
        let router = ReplyRouter::new();
        let mut rx = router.subscribe(CorrelationId(5));
        assert_eq!(router.in_flight(), 1);

        let request = Envelope::request(CorrelationId(5), Method::Completion, None);
        router.route(request.reply_done());

        assert!(rx.recv().await.unwrap().is_terminal());
        assert_eq!(router.in_flight(), 0);
    }

    #[tokio::test]
    async fn unroutable_envelope_does_not_disturb_others() {
        let router = ReplyRouter::new();
        let mut rx = router.subscribe(CorrelationId(1));

        // No subscriber for id 99.
        router.route(fragment(99, "stray"));
        router.route(fragment(1, "mine"));

        let got = rx.recv().await.unwrap();
        assert_eq!(got.payload.unwrap().into_fragment().unwrap(), "mine");
    }

    #[tokio::test]
    async fn discard_removes_entry() {
        let router = ReplyRouter::new();
        let _rx = router.subscribe(CorrelationId(9));
        router.discard(CorrelationId(9));
        assert_eq!(router.in_flight(), 0);
    }
}
