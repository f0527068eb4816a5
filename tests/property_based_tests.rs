//! Property-based tests for payload construction and the completion barrier.

use interop_client::barrier::CompletionBarrier;
use interop_client::error::InteropError;
use interop_client::payload::{aggregate_size, response_parameters, verify_payload, zero_payload};
use interop_client::proto::testing::PayloadType;
use proptest::prelude::*;

proptest! {
    /// Property: payload bodies always have exactly the requested length
    #[test]
    fn zero_payload_has_requested_length(size in 0usize..100_000) {
        let payload = zero_payload(size);
        prop_assert_eq!(payload.body.len(), size);
        prop_assert!(verify_payload("p", Some(&payload), PayloadType::Compressable, size).is_ok());
    }

    /// Property: any length mismatch is an assertion failure
    #[test]
    fn length_mismatch_is_assertion(size in 0usize..10_000, delta in 1usize..100) {
        let payload = zero_payload(size + delta);
        let result = verify_payload("p", Some(&payload), PayloadType::Compressable, size);
        prop_assert!(result.as_ref().is_err_and(InteropError::is_assertion));
    }

    /// Property: the aggregate is the exact sum of the chunk sizes
    #[test]
    fn aggregate_is_exact_sum(sizes in prop::collection::vec(0usize..50_000, 0..16)) {
        let expected: usize = sizes.iter().sum();
        prop_assert_eq!(aggregate_size(&sizes), expected);
    }

    /// Property: response parameters keep their order and sizes
    #[test]
    fn response_parameters_are_positional(sizes in prop::collection::vec(0i32..100_000, 0..16)) {
        let params = response_parameters(&sizes);
        prop_assert_eq!(params.len(), sizes.len());
        for (param, size) in params.iter().zip(&sizes) {
            prop_assert_eq!(param.size, *size);
        }
    }

    /// Property: the barrier fires only on its last confirmation, and only once
    #[test]
    fn barrier_fires_exactly_at_arity(arity in 1usize..32, extra in 0usize..8) {
        let (barrier, wait) = CompletionBarrier::new(arity);
        for i in 0..arity - 1 {
            barrier.confirm(&format!("c{i}"));
            prop_assert!(!barrier.has_fired());
        }
        barrier.confirm("last");
        prop_assert!(barrier.has_fired());
        prop_assert_eq!(barrier.remaining(), 0);

        for _ in 0..extra {
            barrier.confirm("late");
            prop_assert_eq!(barrier.remaining(), 0);
        }
        // A late failure cannot replace the delivered success
        barrier.fail(InteropError::assertion("p", "late"));

        let result = tokio_test::block_on(wait.wait("p"));
        prop_assert!(result.is_ok());
    }
}
