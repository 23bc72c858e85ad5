use super::*;

#[test]
fn loading_error_should_be_retryable() {
    let e: Error = StoreError::Loading {
        command: "HSET".to_string(),
        reason: "LOADING".to_string(),
    }
    .into();

    assert!(e.is_retryable());
    assert!(e.is_loading());
}

#[test]
fn protocol_error_should_not_be_retryable() {
    let e: Error = ProtocolError::InvalidOperation("PUT".to_string()).into();

    assert!(!e.is_retryable());
    assert!(!e.is_loading());
}

#[test]
fn connection_error_is_retryable_but_not_loading() {
    let e: Error = StoreError::Connection("closed".to_string()).into();

    assert!(e.is_retryable());
    assert!(!e.is_loading());
}

#[test]
fn loading_error_message_should_carry_command_and_reason() {
    let e: Error = StoreError::Loading {
        command: "PUBLISH".to_string(),
        reason: "LOADING dataset".to_string(),
    }
    .into();

    assert_eq!(e.to_string(), "PUBLISH failed, reason: LOADING dataset");
}
