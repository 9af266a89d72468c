//! Client configuration.

use std::fmt;
use std::time::Duration;

use url::Url;
use uuid::Uuid;

use crate::version::VersionRange;

/// Default per-request HTTP timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(100);

/// Network credentials sent alongside the API key.
#[derive(Clone)]
pub struct NetworkCredentials {
    /// Account name.
    pub username: String,
    /// Account password, if the account requires one.
    pub password: Option<String>,
}

impl fmt::Debug for NetworkCredentials {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("NetworkCredentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Settings used to build a [`crate::Session`].
#[derive(Clone)]
pub struct ClientConfig {
    /// Server address, with or without a trailing `/api`.
    pub server: Url,
    /// API key sent on every request.
    pub api_key: String,
    /// Optional network credentials.
    pub credentials: Option<NetworkCredentials>,
    /// Log every outbound request before it is sent.
    pub debug: bool,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// Correlation identifier sent as `x-request-id`.
    pub request_id: String,
    /// API schema versions accepted during session establishment.
    pub supported_versions: VersionRange,
}

impl ClientConfig {
    /// Configuration with defaults for everything but the server and API key.
    pub fn new(server: Url, api_key: impl Into<String>) -> Self {
        Self {
            server,
            api_key: api_key.into(),
            credentials: None,
            debug: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            request_id: Uuid::new_v4().to_string(),
            supported_versions: VersionRange::default(),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ClientConfig")
            .field("server", &self.server.as_str())
            .field("api_key", &"<redacted>")
            .field("credentials", &self.credentials)
            .field("debug", &self.debug)
            .field("request_timeout", &self.request_timeout)
            .field("request_id", &self.request_id)
            .field("supported_versions", &self.supported_versions)
            .finish()
    }
}
