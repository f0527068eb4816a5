//! Unimplemented method and unimplemented service runners.

use tonic::{Code, Status};
use tracing::info;

use super::RunContext;
use crate::error::{check, InteropError, InteropResult};
use crate::proto::testing::Empty;

fn expect_unimplemented<T>(test_case: &str, result: Result<T, Status>) -> InteropResult<()> {
    let status = result.err().ok_or_else(|| {
        InteropError::assertion(test_case, "call succeeded, expected UNIMPLEMENTED")
    })?;
    check(status.code() == Code::Unimplemented, test_case, || {
        format!(
            "expected UNIMPLEMENTED, got {:?}: {}",
            status.code(),
            status.message()
        )
    })
}

pub async fn unimplemented_method(ctx: &RunContext) -> InteropResult<()> {
    let mut client = ctx.client.standard(&ctx.test_case)?;

    let result = client.unimplemented_call(Empty {}).await;
    expect_unimplemented(&ctx.test_case, result)?;

    info!(test_case = %ctx.test_case, "Unimplemented method rejected");
    Ok(())
}

pub async fn unimplemented_service(ctx: &RunContext) -> InteropResult<()> {
    let mut client = ctx.client.unimplemented_endpoint(&ctx.test_case)?;

    let result = client.unimplemented_call(Empty {}).await;
    expect_unimplemented(&ctx.test_case, result)?;

    info!(test_case = %ctx.test_case, "Unimplemented service rejected");
    Ok(())
}
