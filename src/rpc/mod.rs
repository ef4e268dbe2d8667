//! Cross-task RPC multiplexing layer.
//!
//! Method invocations travel to the worker task as [`Envelope`] values over
//! an ordered, unbounded channel pair; replies are correlated back to their
//! calls by id, with any number of calls in flight. Single-shot and
//! streaming results share the transport, and remote failures come back as
//! error-bearing envelopes.

mod envelope;
mod method;
mod payload;
mod proxy;
mod router;
mod worker;

pub use envelope::{
    decode_envelope, encode_envelope, CorrelationCounter, CorrelationId, Envelope, WireError,
};
pub use method::{CallKind, Method};
pub use payload::{Payload, PayloadMismatch};
pub use proxy::{BridgeError, EngineProxy};
