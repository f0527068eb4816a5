//! Custom metadata echo runner.
//!
//! A unary and a bidirectional call each carry one text entry the server must
//! echo in its initial metadata and one binary entry it must echo in its
//! trailers. Five confirmations complete the scenario: the unary response,
//! and the initial and trailing echoes of both calls.
//!
//! tonic folds trailers into the response metadata of a unary call, so the
//! unary call goes through [`Grpc::server_streaming`] on the same method path
//! to keep the two phases apart.

use tokio::task::JoinHandle;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::metadata::{MetadataMap, MetadataValue};
use tonic::{Request, Status};
use tracing::{debug, info};

use super::streaming::duplex_request;
use super::unary::{large_unary_request, verify_large_response};
use super::RunContext;
use crate::barrier::CompletionBarrier;
use crate::client::{AuthChannel, StandardClient};
use crate::error::{check, InteropError, InteropResult};
use crate::payload::{verify_payload, LARGE_REQUEST_SIZE, LARGE_RESPONSE_SIZE};
use crate::proto::testing::{PayloadType, SimpleRequest, SimpleResponse};

pub const ECHO_INITIAL_KEY: &str = "x-grpc-test-echo-initial";
pub const ECHO_INITIAL_VALUE: &str = "test_initial_metadata_value";
pub const ECHO_TRAILING_KEY: &str = "x-grpc-test-echo-trailing-bin";
pub const ECHO_TRAILING_VALUE: [u8; 3] = [0xab, 0xab, 0xab];

const CONFIRMATIONS: usize = 5;

const UNARY_CALL_PATH: &str = "/grpc.testing.TestService/UnaryCall";

/// Attach both echo entries to `request`
pub fn attach_echo_metadata<T>(request: &mut Request<T>) {
    let metadata = request.metadata_mut();
    metadata.insert(
        ECHO_INITIAL_KEY,
        MetadataValue::from_static(ECHO_INITIAL_VALUE),
    );
    metadata.insert_bin(
        ECHO_TRAILING_KEY,
        MetadataValue::from_bytes(&ECHO_TRAILING_VALUE),
    );
}

/// Assert `metadata` carries the echoed text entry
pub fn verify_initial_echo(test_case: &str, metadata: &MetadataMap) -> InteropResult<()> {
    let value = metadata
        .get(ECHO_INITIAL_KEY)
        .ok_or_else(|| InteropError::assertion(test_case, "initial metadata echo missing"))?;
    let text = value.to_str().map_err(|e| {
        InteropError::assertion(test_case, format!("initial metadata echo not text: {}", e))
    })?;

    check(text == ECHO_INITIAL_VALUE, test_case, || {
        format!("initial metadata echo {:?} != {:?}", text, ECHO_INITIAL_VALUE)
    })
}

/// Assert `metadata` carries the echoed binary entry
pub fn verify_trailing_echo(test_case: &str, metadata: &MetadataMap) -> InteropResult<()> {
    let value = metadata
        .get_bin(ECHO_TRAILING_KEY)
        .ok_or_else(|| InteropError::assertion(test_case, "trailing metadata echo missing"))?;
    let bytes = value.to_bytes().map_err(|e| {
        InteropError::assertion(test_case, format!("trailing metadata echo undecodable: {}", e))
    })?;

    let encoded = hex::encode(&bytes);
    let expected = hex::encode(ECHO_TRAILING_VALUE);
    check(encoded == expected, test_case, || {
        format!("trailing metadata echo {} != {}", encoded, expected)
    })
}

/// Unary call issued through the raw client so headers and trailers stay apart
async fn unary_echo(
    channel: AuthChannel,
    test_case: String,
    barrier: CompletionBarrier,
) -> InteropResult<()> {
    let mut request = Request::new(large_unary_request());
    attach_echo_metadata(&mut request);

    let mut grpc = Grpc::new(channel);
    grpc.ready()
        .await
        .map_err(|e| Status::unknown(format!("Service was not ready: {}", e)))?;
    let codec = ProstCodec::<SimpleRequest, SimpleResponse>::default();
    let path = PathAndQuery::from_static(UNARY_CALL_PATH);

    let response = grpc.server_streaming(request, path, codec).await?;
    verify_initial_echo(&test_case, response.metadata())?;
    barrier.confirm("unary initial metadata");

    let mut stream = response.into_inner();
    let message = stream.message().await?.ok_or_else(|| {
        InteropError::assertion(&test_case, "unary call ended without a response")
    })?;
    check(stream.message().await?.is_none(), &test_case, || {
        "unary call returned more than one response".to_string()
    })?;
    verify_large_response(&test_case, &message)?;

    let trailers = stream.trailers().await?.ok_or_else(|| {
        InteropError::assertion(&test_case, "unary call ended without trailers")
    })?;
    verify_trailing_echo(&test_case, &trailers)?;
    barrier.confirm("unary trailing metadata");

    barrier.confirm("unary response");
    Ok(())
}

async fn streaming_echo(
    mut client: StandardClient,
    test_case: String,
    barrier: CompletionBarrier,
) -> InteropResult<()> {
    let requests = tokio_stream::iter(vec![duplex_request(
        LARGE_REQUEST_SIZE,
        LARGE_RESPONSE_SIZE,
    )]);
    let mut request = Request::new(requests);
    attach_echo_metadata(&mut request);

    let response = client.full_duplex_call(request).await?;
    verify_initial_echo(&test_case, response.metadata())?;
    barrier.confirm("streaming initial metadata");

    let mut stream = response.into_inner();
    while let Some(message) = stream.message().await? {
        verify_payload(
            &test_case,
            message.payload.as_ref(),
            PayloadType::Compressable,
            LARGE_RESPONSE_SIZE as usize,
        )?;
    }

    let trailers = stream.trailers().await?.ok_or_else(|| {
        InteropError::assertion(&test_case, "streaming call ended without trailers")
    })?;
    verify_trailing_echo(&test_case, &trailers)?;
    barrier.confirm("streaming trailing metadata");
    Ok(())
}

fn spawn_confirming<F>(barrier: CompletionBarrier, task: F) -> JoinHandle<()>
where
    F: std::future::Future<Output = InteropResult<()>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(error) = task.await {
            barrier.fail(error);
        }
    })
}

pub async fn custom_metadata(ctx: &RunContext) -> InteropResult<()> {
    let client = ctx.client.standard(&ctx.test_case)?;
    let channel = ctx.client.standard_channel(&ctx.test_case)?;
    let (barrier, wait) = CompletionBarrier::new(CONFIRMATIONS);

    let unary = spawn_confirming(
        barrier.clone(),
        unary_echo(channel, ctx.test_case.clone(), barrier.clone()),
    );
    let streaming = spawn_confirming(
        barrier.clone(),
        streaming_echo(client, ctx.test_case.clone(), barrier.clone()),
    );
    drop(barrier);

    let result = wait.wait(&ctx.test_case).await;
    unary.abort();
    streaming.abort();
    result?;

    debug!("All metadata confirmations received");
    info!(test_case = %ctx.test_case, "Custom metadata echoed");
    Ok(())
}
