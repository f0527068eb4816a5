//! Cancellation and deadline runners.
//!
//! Cancellation is an explicit token: [`CallCanceller::cancel`] flips a watch
//! channel, and every in-flight step of the call races against
//! [`CancelToken::cancelled`]. A cancelled step resolves to a `CANCELLED`
//! status and the call's futures are dropped, which resets the stream.
//!
//! Deadlines travel as `grpc-timeout` and are enforced below the harness:
//! tonic times out the response headers locally, and the server ends a
//! stream that outlives it. The runner only reads the status the call ends
//! with.

use std::error::Error as _;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinError;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tonic::{Code, Request, Status, TimeoutExpired};
use tracing::{debug, info, warn};

use super::streaming::duplex_request;
use super::RunContext;
use crate::client::StandardClient;
use crate::error::{check, InteropError, InteropResult};
use crate::payload::{verify_payload, zero_payload, REQUEST_SIZES, RESPONSE_SIZES};
use crate::proto::testing::{PayloadType, StreamingInputCallRequest, StreamingOutputCallRequest};

/// Deadline set on the call to the stalled server
pub const SLEEPING_SERVER_DEADLINE: Duration = Duration::from_millis(1);

/// How long past its deadline a call may run before the deadline counts as ignored
pub const DEADLINE_GRACE: Duration = Duration::from_secs(5);

/// Statuses a call past its deadline may end with: the deadline itself, or the
/// transport tearing the connection down first.
pub const DEADLINE_OUTCOMES: [Code; 2] = [Code::DeadlineExceeded, Code::Internal];

/// Sending half of a cancellation token
#[derive(Debug)]
pub struct CallCanceller {
    tx: watch::Sender<bool>,
}

/// Receiving half, checked by the in-flight call
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

/// Create a canceller and its token
pub fn cancellation() -> (CallCanceller, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CallCanceller { tx }, CancelToken { rx })
}

impl CallCanceller {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl CancelToken {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the call is cancelled; never resolves if the canceller is dropped unused
    pub async fn cancelled(&mut self) {
        loop {
            let cancelled = *self.rx.borrow_and_update();
            if cancelled {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Run one step of the call unless it is cancelled first
    pub async fn run<T, F>(&mut self, step: F) -> Result<T, Status>
    where
        F: Future<Output = Result<T, Status>>,
    {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(Status::cancelled("Cancelled by client")),
            result = step => result,
        }
    }
}

fn expect_cancelled<T>(test_case: &str, result: Result<T, Status>) -> InteropResult<()> {
    match result {
        Err(status) if status.code() == Code::Cancelled => Ok(()),
        Err(status) => Err(InteropError::assertion(
            test_case,
            format!(
                "expected CANCELLED, call ended with {:?}: {}",
                status.code(),
                status.message()
            ),
        )),
        Ok(_) => Err(InteropError::assertion(
            test_case,
            "expected CANCELLED, call completed successfully",
        )),
    }
}

/// Request stream that signals the first time the transport pulls from it.
///
/// The pull happens once the call's headers are on the wire, so the signal
/// marks the point where the call exists on the server's side as well.
#[derive(Debug)]
pub struct PullSignal<S> {
    inner: S,
    pulled: Option<oneshot::Sender<()>>,
}

impl<S> PullSignal<S> {
    pub fn new(inner: S) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let stream = Self {
            inner,
            pulled: Some(tx),
        };
        (stream, rx)
    }
}

impl<S: Stream + Unpin> Stream for PullSignal<S> {
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<S::Item>> {
        if let Some(pulled) = self.pulled.take() {
            let _ = pulled.send(());
        }
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Failure for a call that ended before it could be cancelled
fn unopened_call<T>(test_case: &str, joined: Result<Result<T, Status>, JoinError>) -> InteropError {
    match joined {
        Err(e) => InteropError::assertion(test_case, format!("call task failed: {}", e)),
        Ok(Err(status)) => status.into(),
        Ok(Ok(_)) => InteropError::assertion(test_case, "call completed before it was cancelled"),
    }
}

pub async fn cancel_after_begin(ctx: &RunContext) -> InteropResult<()> {
    let client = ctx.client.standard(&ctx.test_case)?;

    // Send side stays open so the server cannot complete the call on its own
    let (tx, rx) = mpsc::channel::<StreamingInputCallRequest>(1);
    let (requests, pulled) = PullSignal::new(ReceiverStream::new(rx));
    let (canceller, mut token) = cancellation();

    let mut call = tokio::spawn(async move {
        let mut client = client;
        token.run(client.streaming_input_call(requests)).await
    });

    // Cancel only once the call is open
    let opened = tokio::select! {
        pulled = pulled => pulled.is_ok(),
        joined = &mut call => return Err(unopened_call(&ctx.test_case, joined)),
    };
    if !opened {
        return Err(unopened_call(&ctx.test_case, call.await));
    }

    canceller.cancel();
    debug!("Cancelled client streaming call");

    let result = call.await.map_err(|e| {
        InteropError::assertion(&ctx.test_case, format!("call task failed: {}", e))
    })?;
    drop(tx);
    expect_cancelled(&ctx.test_case, result)?;

    info!(test_case = %ctx.test_case, "Cancel after begin completed");
    Ok(())
}

pub async fn cancel_after_first_response(ctx: &RunContext) -> InteropResult<()> {
    let mut client = ctx.client.standard(&ctx.test_case)?;

    let (tx, rx) = mpsc::channel(1);
    tx.send(duplex_request(REQUEST_SIZES[0], RESPONSE_SIZES[0]))
        .await
        .map_err(|_| InteropError::assertion(&ctx.test_case, "request stream closed early"))?;

    let (canceller, mut token) = cancellation();

    let mut stream = token
        .run(client.full_duplex_call(ReceiverStream::new(rx)))
        .await?
        .into_inner();

    let mut received = 0usize;
    let outcome = loop {
        match token.run(stream.message()).await {
            Ok(Some(response)) => {
                received += 1;
                check(received == 1, &ctx.test_case, || {
                    format!("received {} responses after cancelling", received - 1)
                })?;
                verify_payload(
                    &ctx.test_case,
                    response.payload.as_ref(),
                    PayloadType::Compressable,
                    RESPONSE_SIZES[0] as usize,
                )?;
                canceller.cancel();
                debug!("Cancelled bidirectional call after first response");
            }
            Ok(None) => break Ok(()),
            Err(status) => break Err(status),
        }
    };

    drop(stream);
    drop(tx);

    check(received == 1, &ctx.test_case, || {
        format!("expected exactly one response before cancelling, got {}", received)
    })?;
    expect_cancelled(&ctx.test_case, outcome)?;

    info!(test_case = %ctx.test_case, "Cancel after first response completed");
    Ok(())
}

/// How a call to the stalled server ended
#[derive(Debug)]
pub enum DeadlineOutcome {
    /// The call finished with OK
    Completed,
    /// The call ended with this status
    Failed(Status),
    /// Nothing ended the call within [`DEADLINE_GRACE`] of its deadline
    Unenforced,
}

/// Request carrying a payload and asking for nothing back
pub fn sleeping_request() -> StreamingOutputCallRequest {
    StreamingOutputCallRequest {
        response_type: PayloadType::Compressable as i32,
        payload: Some(zero_payload(REQUEST_SIZES[0])),
        ..Default::default()
    }
}

/// Write one request on a bidirectional call carrying `deadline` and wait for it to end
pub async fn call_sleeping_server(
    client: &mut StandardClient,
    deadline: Duration,
) -> DeadlineOutcome {
    // Send side stays open: only the deadline may end the call
    let (tx, rx) = mpsc::channel(1);
    if tx.send(sleeping_request()).await.is_err() {
        return DeadlineOutcome::Failed(Status::internal("request stream closed early"));
    }

    let mut request = Request::new(ReceiverStream::new(rx));
    request.set_timeout(deadline);

    let call = async {
        let mut stream = client.full_duplex_call(request).await?.into_inner();
        while stream.message().await?.is_some() {}
        Ok::<(), Status>(())
    };

    let outcome = match tokio::time::timeout(deadline + DEADLINE_GRACE, call).await {
        Err(_elapsed) => DeadlineOutcome::Unenforced,
        Ok(Ok(())) => DeadlineOutcome::Completed,
        Ok(Err(status)) => DeadlineOutcome::Failed(status),
    };
    drop(tx);
    outcome
}

/// Code `status` stands for once tonic's local timeout is read as the deadline.
///
/// tonic reports an elapsed `grpc-timeout` as `CANCELLED` with a
/// [`TimeoutExpired`] source.
pub fn deadline_code(status: &Status) -> Code {
    let mut source = status.source();
    while let Some(error) = source {
        if error.is::<TimeoutExpired>() {
            return Code::DeadlineExceeded;
        }
        source = error.source();
    }
    status.code()
}

/// Assert the call ended because its deadline passed
pub fn verify_deadline_outcome(test_case: &str, outcome: DeadlineOutcome) -> InteropResult<Code> {
    let status = match outcome {
        DeadlineOutcome::Failed(status) => status,
        DeadlineOutcome::Completed => {
            return Err(InteropError::assertion(
                test_case,
                "call completed before its deadline",
            ))
        }
        DeadlineOutcome::Unenforced => {
            return Err(InteropError::assertion(
                test_case,
                format!(
                    "call still running {:?} past its deadline; the deadline was not enforced",
                    DEADLINE_GRACE
                ),
            ))
        }
    };

    let code = deadline_code(&status);
    check(DEADLINE_OUTCOMES.contains(&code), test_case, || {
        format!(
            "expected DEADLINE_EXCEEDED or INTERNAL, got {:?}: {}",
            status.code(),
            status.message()
        )
    })?;
    Ok(code)
}

pub async fn timeout_on_sleeping_server(ctx: &RunContext) -> InteropResult<()> {
    let mut client = ctx.client.standard(&ctx.test_case)?;

    let outcome = call_sleeping_server(&mut client, SLEEPING_SERVER_DEADLINE).await;
    if matches!(outcome, DeadlineOutcome::Unenforced) {
        warn!(test_case = %ctx.test_case, "Deadline not enforced by the transport");
    }
    let code = verify_deadline_outcome(&ctx.test_case, outcome)?;

    info!(test_case = %ctx.test_case, code = ?code, "Deadline enforced");
    Ok(())
}
