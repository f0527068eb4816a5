//! Generated interop service types.
//!
//! Produced by `build.rs` from `proto/grpc/testing/*.proto`. The client stubs
//! are re-exported under [`client`]; server traits are exposed under
//! [`server`] for the reference server used by the integration tests.

#![allow(clippy::all, clippy::pedantic, missing_docs)]

/// Messages and stubs for the `grpc.testing` package.
pub mod testing {
    tonic::include_proto!("grpc.testing");
}

/// Client stubs.
pub mod client {
    pub use super::testing::test_service_client::TestServiceClient;
    pub use super::testing::unimplemented_service_client::UnimplementedServiceClient;
}

/// Server traits and service wrappers.
pub mod server {
    pub use super::testing::test_service_server::{TestService, TestServiceServer};
    pub use super::testing::unimplemented_service_server::{
        UnimplementedService, UnimplementedServiceServer,
    };
}
