//! Assertion helpers for access flow tests

use crate::errors::AccessError;
use std::fmt::Debug;

/// Assert that a Result is Ok and return the value
pub fn assert_ok<T, E: Debug>(result: Result<T, E>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => panic!("Expected Ok, got Err: {:?}", e),
    }
}

/// Assert that a Result is Err and return the error
pub fn assert_err<T: Debug, E>(result: Result<T, E>) -> E {
    match result {
        Ok(value) => panic!("Expected Err, got Ok: {:?}", value),
        Err(e) => e,
    }
}

/// Assert a validation failure with the given user-facing message
pub fn assert_validation_error<T: Debug>(result: Result<T, AccessError>, message: &str) {
    match assert_err(result) {
        AccessError::Validation(e) => assert_eq!(e.to_string(), message),
        other => panic!("Expected validation error {:?}, got {:?}", message, other),
    }
}

/// Assert an authentication failure
pub fn assert_authentication_failed<T: Debug>(result: Result<T, AccessError>) {
    let err = assert_err(result);
    if !matches!(err, AccessError::AuthenticationFailed { .. }) {
        panic!("Expected AuthenticationFailed, got {:?}", err);
    }
}

/// Assert progress fractions stay in range, never go backwards and end at 1.0
pub fn assert_progress_completes(fractions: &[f64]) {
    assert!(!fractions.is_empty(), "Expected at least one progress report");
    for window in fractions.windows(2) {
        if window[1] < window[0] {
            panic!("Progress went backwards: {:?}", fractions);
        }
    }
    if fractions.iter().any(|f| !(0.0..=1.0).contains(f)) {
        panic!("Progress out of range: {:?}", fractions);
    }
    assert_eq!(
        fractions.last().copied(),
        Some(1.0),
        "Progress did not finish: {:?}",
        fractions
    );
}
