//! Status code and message propagation runners.

use tonic::{Code, Status};
use tracing::info;

use super::RunContext;
use crate::client::StandardClient;
use crate::error::{InteropError, InteropResult};
use crate::proto::testing::{EchoStatus, SimpleRequest, StreamingOutputCallRequest};

/// Status code the server is asked to synthesize (UNKNOWN)
pub const TEST_STATUS_CODE: i32 = 2;
pub const TEST_STATUS_MESSAGE: &str = "test status message";
/// Message with control characters and characters outside the basic multilingual plane
pub const SPECIAL_STATUS_MESSAGE: &str =
    "\t\ntest with whitespace\r\nand Unicode BMP \u{263a} and non-BMP \u{1f608}\t\n";

fn echo_status(message: &str) -> EchoStatus {
    EchoStatus {
        code: TEST_STATUS_CODE,
        message: message.to_string(),
    }
}

/// Assert `result` failed with exactly `code` and `message`
pub fn verify_status<T>(
    test_case: &str,
    path: &str,
    result: Result<T, Status>,
    code: i32,
    message: &str,
) -> InteropResult<()> {
    let status = match result {
        Ok(_) => {
            return Err(InteropError::assertion(
                test_case,
                format!("{} call succeeded, expected status {}", path, code),
            ))
        }
        Err(status) => status,
    };

    if status.code() != Code::from_i32(code) {
        return Err(InteropError::assertion(
            test_case,
            format!(
                "{} call returned {:?}, expected {:?}",
                path,
                status.code(),
                Code::from_i32(code)
            ),
        ));
    }
    if status.message() != message {
        return Err(InteropError::assertion(
            test_case,
            format!(
                "{} call returned message {:?}, expected {:?}",
                path,
                status.message(),
                message
            ),
        ));
    }
    Ok(())
}

async fn unary_status(client: &mut StandardClient, message: &str) -> Result<(), Status> {
    let request = SimpleRequest {
        response_status: Some(echo_status(message)),
        ..Default::default()
    };
    client.unary_call(request).await.map(|_| ())
}

async fn streaming_status(client: &mut StandardClient, message: &str) -> Result<(), Status> {
    let request = StreamingOutputCallRequest {
        response_status: Some(echo_status(message)),
        ..Default::default()
    };
    let mut stream = client
        .full_duplex_call(tokio_stream::iter(vec![request]))
        .await?
        .into_inner();
    while stream.message().await?.is_some() {}
    Ok(())
}

pub async fn status_code_and_message(ctx: &RunContext) -> InteropResult<()> {
    let mut client = ctx.client.standard(&ctx.test_case)?;

    let unary = unary_status(&mut client, TEST_STATUS_MESSAGE).await;
    verify_status(
        &ctx.test_case,
        "unary",
        unary,
        TEST_STATUS_CODE,
        TEST_STATUS_MESSAGE,
    )?;

    let streaming = streaming_status(&mut client, TEST_STATUS_MESSAGE).await;
    verify_status(
        &ctx.test_case,
        "streaming",
        streaming,
        TEST_STATUS_CODE,
        TEST_STATUS_MESSAGE,
    )?;

    info!(test_case = %ctx.test_case, "Status code and message propagated");
    Ok(())
}

pub async fn special_status_message(ctx: &RunContext) -> InteropResult<()> {
    let mut client = ctx.client.standard(&ctx.test_case)?;

    let unary = unary_status(&mut client, SPECIAL_STATUS_MESSAGE).await;
    verify_status(
        &ctx.test_case,
        "unary",
        unary,
        TEST_STATUS_CODE,
        SPECIAL_STATUS_MESSAGE,
    )?;

    let streaming = streaming_status(&mut client, SPECIAL_STATUS_MESSAGE).await;
    verify_status(
        &ctx.test_case,
        "streaming",
        streaming,
        TEST_STATUS_CODE,
        SPECIAL_STATUS_MESSAGE,
    )?;

    info!(test_case = %ctx.test_case, "Special status message propagated");
    Ok(())
}
