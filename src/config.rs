//! # Interop Client Configuration
//!
//! Configuration for a single interop run: which server to target, which test
//! case to drive and how to secure and authenticate the connection.
//!
//! Precedence (highest to lowest):
//! 1. Command-line flags (applied by the binary)
//! 2. Environment variables
//! 3. Config file (`--config` or `./interop-client.toml`)
//! 4. Default values

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{InteropError, InteropResult};

/// Server name the bundled test CA certificate is issued for.
pub const TEST_CA_SERVER_NAME: &str = "foo.test.google.fr";

/// Extra parameter key carrying the expected default service account.
pub const EXTRA_SERVICE_ACCOUNT: &str = "service_account";
/// Extra parameter key carrying the requested OAuth scope.
pub const EXTRA_OAUTH_SCOPE: &str = "oauth_scope";

/// Configuration for one interop client invocation
///
/// # Examples
///
/// ```rust
/// use interop_client::config::InteropConfig;
///
/// let config = InteropConfig::default();
/// assert_eq!(config.server_host, "localhost");
/// assert_eq!(config.server_port, 8080);
/// assert_eq!(config.test_case, "large_unary");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InteropConfig {
    /// Server host to connect to
    pub server_host: String,
    /// Server port to connect to
    pub server_port: u16,
    /// Override for the TLS server name and default authority
    pub server_host_override: Option<String>,
    /// Name of the test case to run
    pub test_case: String,
    /// Whether to use TLS
    pub use_tls: bool,
    /// Whether to pin the TLS connection to the test CA
    pub use_test_ca: bool,
    /// PEM file holding the test CA certificate
    pub test_ca_file: PathBuf,
    /// Email of the GCE default service account
    pub default_service_account: Option<String>,
    /// OAuth scope requested by the auth test cases
    pub oauth_scope: Option<String>,
    /// Path to a service account JSON key
    pub service_account_key_file: Option<PathBuf>,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
}

impl Default for InteropConfig {
    fn default() -> Self {
        Self {
            server_host: "localhost".to_string(),
            server_port: 8080,
            server_host_override: None,
            test_case: "large_unary".to_string(),
            use_tls: false,
            use_test_ca: false,
            test_ca_file: PathBuf::from("data/ca.pem"),
            default_service_account: None,
            oauth_scope: None,
            service_account_key_file: None,
            timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
        }
    }
}

impl InteropConfig {
    /// Load configuration from the default config file (if present) and environment
    pub fn load() -> InteropResult<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                debug!("Loading config from: {}", path.display());
                Self::load_from_file(&path)?
            }
            None => Self::default(),
        };

        config.apply_env_overrides();

        debug!("Loaded interop configuration: {:?}", config);
        Ok(config)
    }

    /// Load configuration from a specific file, then apply environment overrides
    pub fn load_with_file(path: &Path) -> InteropResult<Self> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific TOML file
    pub fn load_from_file(path: &Path) -> InteropResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            InteropError::config_error(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        toml::from_str(&content).map_err(|e| {
            InteropError::config_error(format!("Failed to parse config file: {}", e))
        })
    }

    fn find_config_file() -> Option<PathBuf> {
        let possible_paths = [
            Path::new("./interop-client.toml"),
            Path::new("./config/interop-client.toml"),
        ];

        possible_paths
            .iter()
            .find(|path| path.is_file())
            .map(|path| path.to_path_buf())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("INTEROP_SERVER_HOST") {
            self.server_host = host;
        }
        if let Some(port) = lookup("INTEROP_SERVER_PORT").and_then(|p| p.parse().ok()) {
            self.server_port = port;
        }
        if let Some(host_override) = lookup("INTEROP_SERVER_HOST_OVERRIDE") {
            self.server_host_override = Some(host_override);
        }
        if let Some(test_case) = lookup("INTEROP_TEST_CASE") {
            self.test_case = test_case;
        }
        if let Some(use_tls) = lookup("INTEROP_USE_TLS").and_then(|v| v.parse().ok()) {
            self.use_tls = use_tls;
        }
        if let Some(use_test_ca) = lookup("INTEROP_USE_TEST_CA").and_then(|v| v.parse().ok()) {
            self.use_test_ca = use_test_ca;
        }
        if let Some(ca_file) = lookup("INTEROP_TEST_CA_FILE") {
            self.test_ca_file = PathBuf::from(ca_file);
        }
        if let Some(account) = lookup("INTEROP_DEFAULT_SERVICE_ACCOUNT") {
            self.default_service_account = Some(account);
        }
        if let Some(scope) = lookup("INTEROP_OAUTH_SCOPE") {
            self.oauth_scope = Some(scope);
        }
        if let Some(key_file) = lookup("GOOGLE_APPLICATION_CREDENTIALS") {
            self.service_account_key_file = Some(PathBuf::from(key_file));
        }
    }

    /// Validate the configuration before a run
    pub fn validate(&self) -> InteropResult<()> {
        if self.server_host.trim().is_empty() {
            return Err(InteropError::config_error("server_host must not be empty"));
        }
        if self.server_port == 0 {
            return Err(InteropError::config_error("server_port must be non-zero"));
        }
        if self.use_test_ca && !self.use_tls {
            return Err(InteropError::config_error(
                "use_test_ca requires use_tls to be enabled",
            ));
        }
        if self.timeout_ms == 0 || self.connect_timeout_ms == 0 {
            return Err(InteropError::config_error("timeouts must be non-zero"));
        }
        if self.test_case.trim().is_empty() {
            return Err(InteropError::config_error("test_case must not be empty"));
        }
        Ok(())
    }

    /// Per-request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Connection timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// `host:port` of the target server
    pub fn address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// Server name override in effect, defaulting to the test CA name when it is used
    pub fn effective_host_override(&self) -> Option<String> {
        match (&self.server_host_override, self.use_test_ca) {
            (Some(host), _) => Some(host.clone()),
            (None, true) => Some(TEST_CA_SERVER_NAME.to_string()),
            (None, false) => None,
        }
    }

    /// Parameters handed to the runners alongside the client
    pub fn extra_params(&self) -> HashMap<String, String> {
        let mut params = HashMap::new();
        if let Some(account) = &self.default_service_account {
            params.insert(EXTRA_SERVICE_ACCOUNT.to_string(), account.clone());
        }
        if let Some(scope) = &self.oauth_scope {
            params.insert(EXTRA_OAUTH_SCOPE.to_string(), scope.clone());
        }
        params
    }
}
