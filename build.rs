//! Build script for the interop client.
//!
//! Compiles the interop Protocol Buffer definitions under `proto/grpc/testing/`.
//! Generated code is written to `$OUT_DIR/grpc.testing.rs` and included from
//! `src/proto.rs`.
//!
//! # Protocol Buffer Compiler
//!
//! This build script requires the `protoc` compiler to be installed on the system.
//! On macOS, install via: `brew install protobuf`

use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let manifest_dir = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR")?);
    let proto_root = manifest_dir.join("proto");

    if !proto_root.exists() {
        return Err(format!(
            "Proto directory not found at {:?}. Expected proto files at proto/grpc/testing/",
            proto_root
        )
        .into());
    }

    let proto_files = [
        "grpc/testing/empty.proto",
        "grpc/testing/messages.proto",
        "grpc/testing/test.proto",
    ];

    let mut proto_paths = Vec::with_capacity(proto_files.len());
    for file in &proto_files {
        let path = proto_root.join(file);
        if !path.exists() {
            return Err(format!("Proto file not found: {:?}", path).into());
        }
        proto_paths.push(path);
    }

    tonic_build::configure()
        // The reference server in tests/common implements the server traits
        .build_server(true)
        .build_client(true)
        .build_transport(true)
        .emit_rerun_if_changed(true)
        .compile_protos(&proto_paths, &[&proto_root])?;

    println!("cargo:rerun-if-changed={}", proto_root.display());
    for proto in &proto_files {
        println!(
            "cargo:rerun-if-changed={}",
            proto_root.join(proto).display()
        );
    }

    Ok(())
}
