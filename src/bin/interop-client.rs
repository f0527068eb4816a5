//! # Interop Client
//!
//! Runs one gRPC interop test case against a server and prints `OK: <test_case>`
//! on success. Any failure exits non-zero with the error.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use interop_client::logging::init_logging;
use interop_client::{InteropConfig, Orchestrator, RunRequest};

#[derive(Parser, Debug)]
#[command(name = "interop-client")]
#[command(about = "gRPC interop conformance client")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file path (default: ./interop-client.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server host to connect to
    #[arg(long = "server_host", alias = "server-host")]
    server_host: Option<String>,

    /// Server port to connect to
    #[arg(long = "server_port", alias = "server-port")]
    server_port: Option<u16>,

    /// Override for the TLS server name and default authority
    #[arg(long = "server_host_override", alias = "server-host-override")]
    server_host_override: Option<String>,

    /// Test case to run
    #[arg(long = "test_case", alias = "test-case")]
    test_case: Option<String>,

    /// Use TLS
    #[arg(
        long = "use_tls",
        alias = "use-tls",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    use_tls: Option<bool>,

    /// Trust the test CA instead of the native roots
    #[arg(
        long = "use_test_ca",
        alias = "use-test-ca",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    use_test_ca: Option<bool>,

    /// PEM file holding the test CA certificate
    #[arg(long = "test_ca_file", alias = "test-ca-file")]
    test_ca_file: Option<PathBuf>,

    /// Email of the GCE default service account
    #[arg(
        long = "default_service_account",
        alias = "default-service-account"
    )]
    default_service_account: Option<String>,

    /// OAuth scope requested by the auth test cases
    #[arg(long = "oauth_scope", alias = "oauth-scope")]
    oauth_scope: Option<String>,

    /// Path to a service account JSON key
    #[arg(
        long = "service_account_key_file",
        alias = "service-account-key-file"
    )]
    service_account_key_file: Option<PathBuf>,

    /// List the available test cases and exit
    #[arg(long)]
    list: bool,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn apply_to(self, config: &mut InteropConfig) {
        if let Some(host) = self.server_host {
            config.server_host = host;
        }
        if let Some(port) = self.server_port {
            config.server_port = port;
        }
        if let Some(host_override) = self.server_host_override {
            config.server_host_override = Some(host_override);
        }
        if let Some(test_case) = self.test_case {
            config.test_case = test_case;
        }
        if let Some(use_tls) = self.use_tls {
            config.use_tls = use_tls;
        }
        if let Some(use_test_ca) = self.use_test_ca {
            config.use_test_ca = use_test_ca;
        }
        if let Some(ca_file) = self.test_ca_file {
            config.test_ca_file = ca_file;
        }
        if let Some(account) = self.default_service_account {
            config.default_service_account = Some(account);
        }
        if let Some(scope) = self.oauth_scope {
            config.oauth_scope = Some(scope);
        }
        if let Some(key_file) = self.service_account_key_file {
            config.service_account_key_file = Some(key_file);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Precedence: flags > environment > config file > defaults
    let mut config = match &cli.config {
        Some(path) => InteropConfig::load_with_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => InteropConfig::load()?,
    };
    let list = cli.list;
    cli.apply_to(&mut config);

    let orchestrator = Orchestrator::from_config(&config);

    if list {
        for name in orchestrator.catalog().names() {
            println!("{name}");
        }
        return Ok(());
    }

    info!(
        endpoint = %config.address(),
        test_case = %config.test_case,
        tls = config.use_tls,
        "Interop client starting"
    );

    let request = RunRequest::from_config(&config)?;
    let report = orchestrator
        .run_test(request)
        .await
        .with_context(|| format!("test case {} failed", config.test_case))?;

    println!("OK: {}", report.name);
    Ok(())
}
