//! Tests for the validation rules and default validator.

use super::fixtures::{builder, clock, default_validator, query_message, strict_validator};
use crate::protocol::{
    domain::{Message, MessageId, MessageType, Payload, SessionId, ThreadId},
    error::ValidationError,
    ports::validator::{MessageValidator, ValidationConfig},
    validation::{rules, service::DefaultMessageValidator},
};
use chrono::DateTime;
use mockable::DefaultClock;
use rstest::rstest;
use uuid::Uuid;

#[rstest]
fn well_formed_message_passes(default_validator: DefaultMessageValidator, query_message: Message) {
    assert!(default_validator.validate(&query_message).is_ok());
}

#[rstest]
fn nil_id_is_rejected(query_message: Message) {
    let message = Message {
        id: MessageId::from_uuid(Uuid::nil()),
        ..query_message
    };
    assert_eq!(
        rules::validate_message_id(&message),
        Err(ValidationError::MissingMessageId)
    );
}

#[rstest]
fn nil_thread_is_rejected(query_message: Message) {
    let message = Message {
        context: crate::protocol::domain::ConversationContext::new(
            ThreadId::from_uuid(Uuid::nil()),
            SessionId::new("s1"),
        ),
        ..query_message
    };
    assert_eq!(
        rules::validate_thread_id(&message),
        Err(ValidationError::MissingThreadId)
    );
}

#[rstest]
#[case::epoch(0)]
#[case::before_epoch(-1_000)]
fn non_positive_timestamp_is_rejected(clock: DefaultClock, #[case] millis: i64) {
    let timestamp = DateTime::from_timestamp_millis(millis).expect("representable timestamp");
    let result = builder(MessageType::Inform, Payload::text("old"))
        .with_timestamp(timestamp)
        .build(&clock);

    assert_eq!(result, Err(ValidationError::InvalidTimestamp(millis)));
}

#[rstest]
fn empty_text_is_rejected_unless_lenient(
    clock: DefaultClock,
    default_validator: DefaultMessageValidator,
) {
    let message = builder(MessageType::Inform, Payload::text("   "))
        .build(&clock)
        .expect("structure is valid");

    assert!(matches!(
        default_validator.validate_limits(&message),
        Err(ValidationError::EmptyText)
    ));

    let lenient = DefaultMessageValidator::with_config(ValidationConfig::lenient());
    assert!(lenient.validate(&message).is_ok());
}

#[rstest]
fn strict_validator_rejects_long_text(
    clock: DefaultClock,
    strict_validator: DefaultMessageValidator,
) {
    let message = builder(MessageType::Inform, Payload::text("x".repeat(4_001)))
        .build(&clock)
        .expect("structure is valid");

    let error = strict_validator
        .validate(&message)
        .expect_err("text exceeds the strict limit");
    assert!(error.any(|e| matches!(e, ValidationError::TextTooLong { max: 4_000, .. })));
}

#[rstest]
fn oversized_message_is_rejected(clock: DefaultClock) {
    let validator = DefaultMessageValidator::with_config(ValidationConfig {
        max_message_size_bytes: 64,
        ..ValidationConfig::default()
    });
    let message = builder(MessageType::Inform, Payload::text("a reasonably long payload"))
        .build(&clock)
        .expect("structure is valid");

    assert!(matches!(
        validator.validate(&message),
        Err(ValidationError::MessageTooLarge {
            limit_bytes: 64,
            ..
        })
    ));
}

#[test]
fn multiple_with_single_error_unwraps() {
    let error = ValidationError::multiple(vec![ValidationError::MissingSender]);
    assert_eq!(error, ValidationError::MissingSender);
}

#[test]
fn multiple_flattens_nested_errors() {
    let nested = ValidationError::multiple(vec![
        ValidationError::MissingSender,
        ValidationError::MissingRecipient,
    ]);
    let error = ValidationError::multiple(vec![nested, ValidationError::MissingThreadId]);
    assert_eq!(error.errors().len(), 3);
}
