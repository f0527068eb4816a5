//! # Call Payloads
//!
//! Payload construction and verification shared by the call pattern runners,
//! plus the fixed sizes the interop scenarios exchange.

use crate::error::{check, InteropError, InteropResult};
use crate::proto::testing::{Payload, PayloadType, ResponseParameters};

/// Request body size for `large_unary` and the auth scenarios.
pub const LARGE_REQUEST_SIZE: usize = 271_828;
/// Response body size for `large_unary` and the auth scenarios.
pub const LARGE_RESPONSE_SIZE: i32 = 314_159;

/// Chunk sizes written by the client-streaming and ping-pong runners.
pub const REQUEST_SIZES: [usize; 4] = [27_182, 8, 1_828, 45_904];
/// Response sizes requested by the server-streaming and ping-pong runners.
pub const RESPONSE_SIZES: [i32; 4] = [31_415, 9, 2_653, 58_979];

/// Build a payload of `size` zero bytes with the compressable type tag.
///
/// The body length always equals `size`.
pub fn zero_payload(size: usize) -> Payload {
    Payload {
        r#type: PayloadType::Compressable as i32,
        body: vec![0u8; size],
    }
}

/// Build the ordered response parameter list for the given sizes.
pub fn response_parameters(sizes: &[i32]) -> Vec<ResponseParameters> {
    sizes
        .iter()
        .map(|&size| ResponseParameters {
            size,
            interval_us: 0,
        })
        .collect()
}

/// Sum of the client-streaming chunk sizes, as reported by the server.
pub fn aggregate_size(sizes: &[usize]) -> usize {
    sizes.iter().sum()
}

/// Assert that a response payload carries the requested type and exactly `expected_len` bytes.
pub fn verify_payload(
    test_case: &str,
    payload: Option<&Payload>,
    expected_type: PayloadType,
    expected_len: usize,
) -> InteropResult<()> {
    let payload =
        payload.ok_or_else(|| InteropError::assertion(test_case, "response carried no payload"))?;

    check(payload.r#type == expected_type as i32, test_case, || {
        format!(
            "payload type {} does not match requested {}",
            PayloadType::try_from(payload.r#type)
                .map(|t| t.as_str_name().to_string())
                .unwrap_or_else(|_| payload.r#type.to_string()),
            expected_type.as_str_name()
        )
    })?;

    check(payload.body.len() == expected_len, test_case, || {
        format!(
            "payload length {} does not match requested {}",
            payload.body.len(),
            expected_len
        )
    })
}
