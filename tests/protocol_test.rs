//! Wire-level tests for envelopes, methods, and payloads.

use tandem::engine::{ChatMessage, EngineOptions, Role, SamplerParams};
use tandem::rpc::{
    decode_envelope, encode_envelope, CorrelationCounter, CorrelationId, Envelope, Method, Payload,
};

#[test]
fn request_envelope_roundtrip() {
    let envelope = Envelope::request(
        CorrelationId(41),
        Method::Embed,
        Some(Payload::Text("hello".into())),
    );
    let bytes = encode_envelope(&envelope).unwrap();
    let back = decode_envelope(&bytes).unwrap();

    assert_eq!(back.correlation, CorrelationId(41));
    assert_eq!(back.method, Method::Embed);
    assert_eq!(back.payload.unwrap().into_text().unwrap(), "hello");
    assert!(!back.done);
    assert!(back.error.is_none());
}

#[test]
fn error_reply_roundtrip() {
    let request = Envelope::request(CorrelationId(1), Method::Init, None);
    let reply = request.reply_error("engine exploded");

    let back = decode_envelope(&encode_envelope(&reply).unwrap()).unwrap();
    assert_eq!(back.correlation, request.correlation);
    assert_eq!(back.error.as_deref(), Some("engine exploded"));
    assert!(back.is_terminal());
}

#[test]
fn stream_reply_sequence_shapes() {
    let request = Envelope::request(
        CorrelationId(2),
        Method::Completion,
        Some(Payload::Text("hi".into())),
    );

    let chunk = request.reply(Payload::Fragment("He".into()));
    assert!(!chunk.is_terminal());

    let done = request.reply_done();
    assert!(done.done);
    assert!(done.payload.is_none());
    assert!(done.error.is_none());
}

#[test]
fn bootstrap_envelope_roundtrip() {
    let back = decode_envelope(&encode_envelope(&Envelope::bootstrap()).unwrap()).unwrap();
    assert_eq!(back.correlation, CorrelationId::BOOTSTRAP);
    assert_eq!(back.method, Method::Handshake);
}

#[test]
fn unknown_method_survives_the_wire() {
    let envelope = Envelope::request(CorrelationId(3), Method::from_name("frob"), None);
    let back = decode_envelope(&encode_envelope(&envelope).unwrap()).unwrap();
    assert_eq!(back.method, Method::Unknown("frob".into()));
    assert_eq!(back.method.name(), "frob");
}

#[test]
fn structured_payloads_roundtrip() {
    let cases = vec![
        Payload::Options(EngineOptions::default()),
        Payload::Sampler(SamplerParams::default()),
        Payload::History(vec![
            ChatMessage::new(Role::System, "be brief"),
            ChatMessage::new(Role::User, "hi"),
        ]),
        Payload::Vector(vec![0.25, -1.5]),
        Payload::Score(0.75),
    ];
    for payload in cases {
        let envelope = Envelope::request(CorrelationId(4), Method::Init, Some(payload));
        let bytes = encode_envelope(&envelope).unwrap();
        let back = decode_envelope(&bytes).unwrap();
        assert!(back.payload.is_some());
    }
}

#[test]
fn history_payload_preserves_order_and_roles() {
    let payload = Payload::History(vec![
        ChatMessage::new(Role::User, "first"),
        ChatMessage::new(Role::Assistant, "second"),
    ]);
    let envelope = Envelope::request(CorrelationId(5), Method::Chat, Some(payload));
    let back = decode_envelope(&encode_envelope(&envelope).unwrap()).unwrap();

    let history = back.payload.unwrap().into_history().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].content, "first");
    assert_eq!(history[1].role, Role::Assistant);
}

#[test]
fn correlation_ids_are_unique_per_counter() {
    let counter = CorrelationCounter::new();
    let mut seen = std::collections::HashSet::new();
    for _ in 0..1000 {
        assert!(seen.insert(counter.next()));
    }
    assert!(!seen.contains(&CorrelationId::BOOTSTRAP));
}
