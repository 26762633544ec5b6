//! Property-based checks over the pure decision functions: backoff shape,
//! status classification, and correlation id validation.

use std::time::Duration;

use proptest::prelude::*;
use switchboard_core::classification::{ClassifiedError, ErrorKind};
use switchboard_core::correlation::CorrelationId;
use switchboard_core::resilience::exponential_backoff;

proptest! {
    #[test]
    fn backoff_never_exceeds_cap(
        base_ms in 1u64..5_000,
        extra_ms in 0u64..120_000,
        attempt in 0u32..200,
    ) {
        let base = Duration::from_millis(base_ms);
        let cap = Duration::from_millis(base_ms + extra_ms);
        let delay = exponential_backoff(base, cap, attempt);
        prop_assert!(delay <= cap);
    }

    #[test]
    fn backoff_monotonically_non_decreasing(
        base_ms in 1u64..5_000,
        extra_ms in 0u64..120_000,
        attempt in 0u32..199,
    ) {
        let base = Duration::from_millis(base_ms);
        let cap = Duration::from_millis(base_ms + extra_ms);
        let current = exponential_backoff(base, cap, attempt);
        let next = exponential_backoff(base, cap, attempt + 1);
        prop_assert!(next >= current);
    }

    #[test]
    fn backoff_first_attempt_is_base_when_under_cap(
        base_ms in 1u64..5_000,
        extra_ms in 0u64..120_000,
    ) {
        let base = Duration::from_millis(base_ms);
        let cap = Duration::from_millis(base_ms + extra_ms);
        prop_assert_eq!(exponential_backoff(base, cap, 0), base.min(cap));
    }

    #[test]
    fn server_errors_always_retryable(status in 500u16..600) {
        let classified = ClassifiedError::from_status(status, None);
        prop_assert!(classified.is_retryable());
    }

    #[test]
    fn client_errors_permanent_except_timeout_and_throttle(status in 400u16..500) {
        let classified = ClassifiedError::from_status(status, None);
        match status {
            408 => prop_assert_eq!(classified.kind, ErrorKind::Timeout),
            429 => prop_assert_eq!(classified.kind, ErrorKind::Transient),
            _ => prop_assert_eq!(classified.kind, ErrorKind::Permanent),
        }
    }

    #[test]
    fn classification_is_total(status in 0u16..1000) {
        // Every status maps to some class without panicking
        let _ = ClassifiedError::from_status(status, None);
    }

    #[test]
    fn well_formed_inbound_ids_preserved(id in "[a-zA-Z0-9._-]{1,128}") {
        let accepted = CorrelationId::from_inbound(Some(&id));
        prop_assert_eq!(accepted.as_str(), id.as_str());
    }

    #[test]
    fn arbitrary_inbound_values_never_yield_invalid_ids(raw in ".{0,200}") {
        let id = CorrelationId::from_inbound(Some(&raw));
        prop_assert!(!id.as_str().is_empty());
        prop_assert!(id.as_str().len() <= 128);
        prop_assert!(id.as_str().chars().all(|c| c.is_ascii_graphic()));
    }
}
