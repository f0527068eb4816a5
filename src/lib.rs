#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # gRPC Interop Client
//!
//! Conformance client for the gRPC interop test suite: drives a fixed catalog
//! of named test cases against a reference server and asserts that every RPC
//! interaction shape behaves as the interop rules require.
//!
//! ## Architecture
//!
//! ```text
//! caller -> Orchestrator -> CredentialResolver (optional)
//!                        -> ClientFactory -> TestCatalog lookup
//!                        -> CallPatternRunner -> RPCs -> TestReport | InteropError
//! ```
//!
//! ## Module Organization
//!
//! - [`catalog`] - Test case name to descriptor registry
//! - [`runners`] - One runner per interaction shape and scenario
//! - [`orchestrator`] - Credential resolution, client construction and dispatch
//! - [`credentials`] - Channel and call credentials, identity token sources
//! - [`client`] - Channel and client stub construction
//! - [`barrier`] - Multi-confirmation completion barrier
//! - [`payload`] - Payload construction and verification
//! - [`config`] - Run configuration (file, environment, flags)
//! - [`logging`] - Tracing subscriber setup
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use interop_client::config::InteropConfig;
//! use interop_client::orchestrator::{Orchestrator, RunRequest};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = InteropConfig {
//!     test_case: "ping_pong".to_string(),
//!     ..Default::default()
//! };
//! let orchestrator = Orchestrator::from_config(&config);
//! let report = orchestrator.run_test(RunRequest::from_config(&config)?).await?;
//! println!("OK: {}", report.name);
//! # Ok(())
//! # }
//! ```

pub mod barrier;
pub mod catalog;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod payload;
pub mod proto;
pub mod runners;

pub use barrier::{BarrierWait, CompletionBarrier};
pub use catalog::{TestCaseDescriptor, TestCatalog};
pub use client::{ClientCapability, ClientFactory, InteropClient};
pub use config::InteropConfig;
pub use credentials::{
    CallCredential, ChannelCredential, CredentialResolver, GoogleIdentityProvider,
    IdentityProvider, StaticIdentityProvider,
};
pub use error::{InteropError, InteropResult};
pub use orchestrator::{Orchestrator, RunRequest, TestReport};
pub use runners::{CallPatternRunner, RunContext};
