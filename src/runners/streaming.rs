//! Streaming call runners: client streaming, server streaming, ping-pong and
//! the empty bidirectional stream.

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use super::RunContext;
use crate::error::{check, InteropError, InteropResult};
use crate::payload::{
    aggregate_size, response_parameters, verify_payload, zero_payload, REQUEST_SIZES,
    RESPONSE_SIZES,
};
use crate::proto::testing::{PayloadType, StreamingInputCallRequest, StreamingOutputCallRequest};

/// Bidirectional request asking for one response of `response_size` bytes
pub fn duplex_request(request_size: usize, response_size: i32) -> StreamingOutputCallRequest {
    StreamingOutputCallRequest {
        response_type: PayloadType::Compressable as i32,
        response_parameters: response_parameters(&[response_size]),
        payload: Some(zero_payload(request_size)),
        ..Default::default()
    }
}

pub async fn client_streaming(ctx: &RunContext) -> InteropResult<()> {
    let mut client = ctx.client.standard(&ctx.test_case)?;

    let requests: Vec<StreamingInputCallRequest> = REQUEST_SIZES
        .iter()
        .map(|&size| StreamingInputCallRequest {
            payload: Some(zero_payload(size)),
        })
        .collect();

    let response = client
        .streaming_input_call(tokio_stream::iter(requests))
        .await?
        .into_inner();

    let expected = aggregate_size(&REQUEST_SIZES);
    check(
        usize::try_from(response.aggregated_payload_size).ok() == Some(expected),
        &ctx.test_case,
        || {
            format!(
                "aggregated payload size {} does not match {}",
                response.aggregated_payload_size, expected
            )
        },
    )?;

    info!(test_case = %ctx.test_case, aggregated = expected, "Client streaming completed");
    Ok(())
}

pub async fn server_streaming(ctx: &RunContext) -> InteropResult<()> {
    let mut client = ctx.client.standard(&ctx.test_case)?;

    let request = StreamingOutputCallRequest {
        response_type: PayloadType::Compressable as i32,
        response_parameters: response_parameters(&RESPONSE_SIZES),
        ..Default::default()
    };

    let mut stream = client.streaming_output_call(request).await?.into_inner();

    let mut received = 0usize;
    while let Some(response) = stream.message().await? {
        let expected = RESPONSE_SIZES.get(received).ok_or_else(|| {
            InteropError::assertion(
                &ctx.test_case,
                format!(
                    "received response {} but only {} were requested",
                    received + 1,
                    RESPONSE_SIZES.len()
                ),
            )
        })?;

        verify_payload(
            &ctx.test_case,
            response.payload.as_ref(),
            PayloadType::Compressable,
            *expected as usize,
        )?;

        debug!(index = received, size = expected, "Received streamed response");
        received += 1;
    }

    check(received == RESPONSE_SIZES.len(), &ctx.test_case, || {
        format!(
            "stream ended after {} of {} responses",
            received,
            RESPONSE_SIZES.len()
        )
    })?;

    info!(test_case = %ctx.test_case, responses = received, "Server streaming completed");
    Ok(())
}

pub async fn ping_pong(ctx: &RunContext) -> InteropResult<()> {
    let mut client = ctx.client.standard(&ctx.test_case)?;

    let (tx, rx) = mpsc::channel(1);
    tx.send(duplex_request(REQUEST_SIZES[0], RESPONSE_SIZES[0]))
        .await
        .map_err(|_| InteropError::assertion(&ctx.test_case, "request stream closed early"))?;

    let mut stream = client
        .full_duplex_call(ReceiverStream::new(rx))
        .await?
        .into_inner();

    for round in 0..REQUEST_SIZES.len() {
        if round > 0 {
            tx.send(duplex_request(REQUEST_SIZES[round], RESPONSE_SIZES[round]))
                .await
                .map_err(|_| {
                    InteropError::assertion(&ctx.test_case, "request stream closed early")
                })?;
        }

        let response = stream.message().await?.ok_or_else(|| {
            InteropError::assertion(
                &ctx.test_case,
                format!("stream ended before the response to round {}", round + 1),
            )
        })?;

        verify_payload(
            &ctx.test_case,
            response.payload.as_ref(),
            PayloadType::Compressable,
            RESPONSE_SIZES[round] as usize,
        )?;

        debug!(round = round + 1, "Ping-pong round completed");
    }

    drop(tx);

    let trailing = stream.message().await?;
    check(trailing.is_none(), &ctx.test_case, || {
        "received a response after the final round".to_string()
    })?;

    info!(test_case = %ctx.test_case, rounds = REQUEST_SIZES.len(), "Ping-pong completed");
    Ok(())
}

pub async fn empty_stream(ctx: &RunContext) -> InteropResult<()> {
    let mut client = ctx.client.standard(&ctx.test_case)?;

    let mut stream = client
        .full_duplex_call(tokio_stream::empty::<StreamingOutputCallRequest>())
        .await?
        .into_inner();

    let mut received = 0usize;
    while stream.message().await?.is_some() {
        received += 1;
    }

    check(received == 0, &ctx.test_case, || {
        format!("expected no responses, received {}", received)
    })?;

    info!(test_case = %ctx.test_case, "Empty stream completed");
    Ok(())
}
