//! In-process interop reference server.
//!
//! Implements `grpc.testing.TestService` the way the interop rules describe,
//! plus a handful of deliberate deviations used to show that the client's
//! assertions fire. `grpc.testing.UnimplementedService` is never registered.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tonic::body::BoxBody;
use tonic::server::NamedService;
use tonic::transport::Server;
use tonic::{Code, Request, Response, Status, Streaming};
use tower::Service;
use tracing::{debug, info};

use interop_client::proto::server::{TestService, TestServiceServer};
use interop_client::proto::testing::{
    EchoStatus, Empty, Payload, ResponseParameters, SimpleRequest, SimpleResponse,
    StreamingInputCallRequest, StreamingInputCallResponse, StreamingOutputCallRequest,
    StreamingOutputCallResponse,
};

const ECHO_INITIAL_KEY: &str = "x-grpc-test-echo-initial";
const ECHO_TRAILING_KEY: &str = "x-grpc-test-echo-trailing-bin";
const UNARY_CALL_PATH: &str = "/grpc.testing.TestService/UnaryCall";

/// How the reference server behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Follows the interop rules
    Conformant,
    /// Every response payload is one byte short
    ShortPayloads,
    /// Metadata is never echoed
    NoMetadataEcho,
    /// Synthesized status messages lose their surrounding whitespace
    TrimmedStatusMessage,
    /// Server streaming sends one response more than requested
    ExtraStreamResponse,
    /// Client streaming reports one byte more than received
    MiscountedAggregate,
    /// The unary call's initial metadata echo is sent in its trailers instead
    UnaryInitialEchoInTrailers,
    /// Statuses synthesized on bidirectional calls lose their last character
    AlteredStreamingStatus,
    /// Bidirectional calls end with OK after their first request, whatever the deadline
    CompletesSleepingCall,
}

/// Identity the server reports for authenticated calls
#[derive(Debug, Clone)]
pub struct ServerIdentity {
    pub token: String,
    pub username: String,
    pub oauth_scope: String,
}

#[derive(Debug, Clone)]
struct ReferenceTestService {
    behavior: Behavior,
    identity: ServerIdentity,
    streaming_input_calls: Arc<AtomicUsize>,
}

impl ReferenceTestService {
    fn payload(&self, response_type: i32, size: i32) -> Payload {
        let mut len = usize::try_from(size).unwrap_or(0);
        if self.behavior == Behavior::ShortPayloads {
            len = len.saturating_sub(1);
        }
        Payload {
            r#type: response_type,
            body: vec![0u8; len],
        }
    }

    fn requested_status(&self, status: Option<&EchoStatus>, streaming: bool) -> Option<Status> {
        let status = status.filter(|s| s.code != 0)?;
        let message = match self.behavior {
            Behavior::TrimmedStatusMessage => status.message.trim().to_string(),
            Behavior::AlteredStreamingStatus if streaming => {
                let mut message = status.message.clone();
                message.pop();
                message
            }
            _ => status.message.clone(),
        };
        Some(Status::new(Code::from_i32(status.code), message))
    }

    fn authenticate<T>(&self, request: &Request<T>) -> Result<bool, Status> {
        let Some(value) = request.metadata().get("authorization") else {
            return Ok(false);
        };
        let expected = format!("Bearer {}", self.identity.token);
        match value.to_str() {
            Ok(header) if header == expected => Ok(true),
            _ => Err(Status::unauthenticated("unrecognized bearer token")),
        }
    }
}

async fn send_responses(
    service: &ReferenceTestService,
    tx: &mpsc::Sender<Result<StreamingOutputCallResponse, Status>>,
    response_type: i32,
    parameters: &[ResponseParameters],
) -> bool {
    for parameter in parameters {
        if parameter.interval_us > 0 {
            tokio::time::sleep(Duration::from_micros(parameter.interval_us as u64)).await;
        }
        let response = StreamingOutputCallResponse {
            payload: Some(service.payload(response_type, parameter.size)),
        };
        if tx.send(Ok(response)).await.is_err() {
            return false;
        }
    }
    true
}

/// `grpc-timeout` carried by `request`, if any
fn request_timeout<T>(request: &Request<T>) -> Option<Duration> {
    let value = request.metadata().get("grpc-timeout")?.to_str().ok()?;
    let (amount, unit) = value.split_at(value.len().checked_sub(1)?);
    let amount: u64 = amount.parse().ok()?;
    let timeout = match unit {
        "H" => Duration::from_secs(amount * 3600),
        "M" => Duration::from_secs(amount * 60),
        "S" => Duration::from_secs(amount),
        "m" => Duration::from_millis(amount),
        "u" => Duration::from_micros(amount),
        "n" => Duration::from_nanos(amount),
        _ => return None,
    };
    Some(timeout)
}

async fn relay_duplex(
    service: &ReferenceTestService,
    inbound: &mut Streaming<StreamingOutputCallRequest>,
    tx: &mpsc::Sender<Result<StreamingOutputCallResponse, Status>>,
) {
    loop {
        let message = match inbound.message().await {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(status) => {
                debug!(code = ?status.code(), "Full duplex inbound ended");
                break;
            }
        };

        if let Some(status) = service.requested_status(message.response_status.as_ref(), true) {
            let _ = tx.send(Err(status)).await;
            break;
        }

        if !send_responses(service, tx, message.response_type, &message.response_parameters).await
        {
            break;
        }

        if service.behavior == Behavior::CompletesSleepingCall {
            break;
        }
    }
}

#[tonic::async_trait]
impl TestService for ReferenceTestService {
    type StreamingOutputCallStream = ReceiverStream<Result<StreamingOutputCallResponse, Status>>;
    type FullDuplexCallStream = ReceiverStream<Result<StreamingOutputCallResponse, Status>>;

    async fn empty_call(&self, _request: Request<Empty>) -> Result<Response<Empty>, Status> {
        Ok(Response::new(Empty {}))
    }

    async fn unary_call(
        &self,
        request: Request<SimpleRequest>,
    ) -> Result<Response<SimpleResponse>, Status> {
        let authenticated = self.authenticate(&request)?;
        let message = request.into_inner();

        if let Some(status) = self.requested_status(message.response_status.as_ref(), false) {
            return Err(status);
        }

        let mut response = SimpleResponse {
            payload: Some(self.payload(message.response_type, message.response_size)),
            ..Default::default()
        };
        if authenticated && message.fill_username {
            response.username = self.identity.username.clone();
        }
        if authenticated && message.fill_oauth_scope {
            response.oauth_scope = self.identity.oauth_scope.clone();
        }
        Ok(Response::new(response))
    }

    async fn streaming_output_call(
        &self,
        request: Request<StreamingOutputCallRequest>,
    ) -> Result<Response<Self::StreamingOutputCallStream>, Status> {
        let message = request.into_inner();
        let (tx, rx) = mpsc::channel(4);
        let service = self.clone();

        tokio::spawn(async move {
            let mut parameters = message.response_parameters.clone();
            if service.behavior == Behavior::ExtraStreamResponse {
                parameters.push(ResponseParameters {
                    size: 1,
                    interval_us: 0,
                });
            }
            send_responses(&service, &tx, message.response_type, &parameters).await;
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn streaming_input_call(
        &self,
        request: Request<Streaming<StreamingInputCallRequest>>,
    ) -> Result<Response<StreamingInputCallResponse>, Status> {
        self.streaming_input_calls.fetch_add(1, Ordering::SeqCst);
        let mut stream = request.into_inner();
        let mut total = 0usize;
        while let Some(message) = stream.message().await? {
            total += message.payload.map_or(0, |p| p.body.len());
        }
        if self.behavior == Behavior::MiscountedAggregate {
            total += 1;
        }
        Ok(Response::new(StreamingInputCallResponse {
            aggregated_payload_size: total as i32,
        }))
    }

    async fn full_duplex_call(
        &self,
        request: Request<Streaming<StreamingOutputCallRequest>>,
    ) -> Result<Response<Self::FullDuplexCallStream>, Status> {
        let deadline = request_timeout(&request)
            .filter(|_| self.behavior != Behavior::CompletesSleepingCall)
            .map(|timeout| tokio::time::Instant::now() + timeout);
        let mut inbound = request.into_inner();
        let (tx, rx) = mpsc::channel(4);
        let service = self.clone();

        tokio::spawn(async move {
            let relay = relay_duplex(&service, &mut inbound, &tx);
            let Some(deadline) = deadline else {
                relay.await;
                return;
            };
            if tokio::time::timeout_at(deadline, relay).await.is_err() {
                debug!("Full duplex call outlived its deadline");
                let _ = tx
                    .send(Err(Status::deadline_exceeded("Deadline exceeded")))
                    .await;
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn unimplemented_call(&self, _request: Request<Empty>) -> Result<Response<Empty>, Status> {
        Err(Status::unimplemented("UnimplementedCall is not implemented"))
    }
}

/// Echoes the interop metadata keys: the text key into response headers, the
/// binary key into trailers.
#[derive(Debug, Clone)]
struct EchoMetadata<S> {
    inner: S,
    behavior: Behavior,
}

impl<S: NamedService> NamedService for EchoMetadata<S> {
    const NAME: &'static str = S::NAME;
}

impl<S, B> Service<http::Request<B>> for EchoMetadata<S>
where
    S: Service<http::Request<B>, Response = http::Response<BoxBody>, Error = Infallible>
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    type Response = http::Response<BoxBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: http::Request<B>) -> Self::Future {
        let initial = request.headers().get(ECHO_INITIAL_KEY).cloned();
        let trailing = request.headers().get(ECHO_TRAILING_KEY).cloned();
        let initial_in_trailers = self.behavior == Behavior::UnaryInitialEchoInTrailers
            && request.uri().path() == UNARY_CALL_PATH;
        let response = self.inner.call(request);

        Box::pin(async move {
            let mut response = response.await?;
            let mut trailers = http::HeaderMap::new();
            if let Some(value) = initial {
                if initial_in_trailers {
                    trailers.insert(ECHO_INITIAL_KEY, value);
                } else {
                    response.headers_mut().insert(ECHO_INITIAL_KEY, value);
                }
            }
            if let Some(value) = trailing {
                trailers.insert(ECHO_TRAILING_KEY, value);
            }
            if trailers.is_empty() {
                return Ok(response);
            }
            Ok(response.map(|body| {
                tonic::body::boxed(MergeTrailers {
                    inner: body,
                    trailers: Some(trailers),
                })
            }))
        })
    }
}

/// Response body appending extra entries to the gRPC trailers frame
struct MergeTrailers {
    inner: BoxBody,
    trailers: Option<http::HeaderMap>,
}

impl Body for MergeTrailers {
    type Data = Bytes;
    type Error = Status;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Status>>> {
        let this = self.get_mut();
        let frame = match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => frame,
            other => return other,
        };
        let frame = match frame.into_trailers() {
            Ok(mut trailers) => {
                if let Some(extra) = this.trailers.take() {
                    trailers.extend(extra);
                }
                Frame::trailers(trailers)
            }
            Err(frame) => frame,
        };
        Poll::Ready(Some(Ok(frame)))
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Handle for a running reference server
#[derive(Debug)]
pub struct ReferenceServerHandle {
    addr: SocketAddr,
    streaming_input_calls: Arc<AtomicUsize>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

impl ReferenceServerHandle {
    /// `host:port` the server listens on
    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    /// Number of `StreamingInputCall` calls the server has accepted
    pub fn streaming_input_calls(&self) -> usize {
        self.streaming_input_calls.load(Ordering::SeqCst)
    }

    pub async fn stop(mut self) -> anyhow::Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.handle.await?;
        Ok(())
    }
}

/// Start a reference server on an ephemeral loopback port
pub async fn spawn_reference_server(
    behavior: Behavior,
    identity: ServerIdentity,
) -> anyhow::Result<ReferenceServerHandle> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let streaming_input_calls = Arc::new(AtomicUsize::new(0));
    let service = TestServiceServer::new(ReferenceTestService {
        behavior,
        identity,
        streaming_input_calls: streaming_input_calls.clone(),
    });
    let mut server = Server::builder();
    let router = if behavior == Behavior::NoMetadataEcho {
        server.add_service(service)
    } else {
        server.add_service(EchoMetadata {
            inner: service,
            behavior,
        })
    };

    let handle = tokio::spawn(async move {
        let shutdown = async {
            let _ = shutdown_rx.await;
        };
        if let Err(e) = router
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
            .await
        {
            tracing::error!(error = %e, "Reference server error");
        }
    });

    info!(address = %addr, behavior = ?behavior, "Reference server listening");

    Ok(ReferenceServerHandle {
        addr,
        streaming_input_calls,
        shutdown_tx: Some(shutdown_tx),
        handle,
    })
}
