//! Error types for client operations.
//!
//! # Design
//!
//! - One variant per failure kind so callers branch on [`ErrorKind`] instead of message text.
//! - Errors are `Clone` so a failed session establishment can be handed to every waiting caller.
//! - Server responses are embedded in the message: status, diagnostic text, and the attempted request.

use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::model::TaskReference;
use crate::version::ApiVersion;

/// Result alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Shared, type-erased error source.
pub type SharedSource = Arc<dyn StdError + Send + Sync>;

/// Errors raised by the session, transport, and deployment watcher.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// A caller-supplied precondition was violated before any request was made.
    #[error("{message}")]
    Usage {
        /// Human-readable description of the violated precondition.
        message: String,
    },
    /// The server declared an API version outside the supported range.
    #[error(
        "this server uses an API specification ({reported}) that this tool cannot handle \
         (supported: {min} to {max}); please check for updates"
    )]
    IncompatibleServer {
        /// Version string reported by the server; empty when missing.
        reported: String,
        /// Lowest supported version, inclusive.
        min: ApiVersion,
        /// Highest supported version, inclusive.
        max: ApiVersion,
    },
    /// The server answered with a non-success status.
    #[error(
        "server returned HTTP {status}: {message}\n\nThe request that caused the error was:\n{method} {target} ({uri})"
    )]
    Api {
        /// Numeric HTTP status code.
        status: u16,
        /// Logical verb of the attempted request.
        method: String,
        /// Path and query of the attempted request.
        target: String,
        /// Absolute URI of the attempted request.
        uri: Url,
        /// Preferred diagnostic text (error header, structured body, or raw body).
        message: String,
        /// Raw response body kept for diagnosis.
        body: String,
    },
    /// No response was obtained from the server.
    #[error("could not reach server for {method} {uri}")]
    Connectivity {
        /// Logical verb of the attempted request.
        method: String,
        /// Absolute URI of the attempted request.
        uri: Url,
        /// Underlying transport error.
        source: Arc<reqwest::Error>,
    },
    /// A create call succeeded without telling us where the resource lives.
    #[error("unexpected response from {uri}: missing Location header: {body}")]
    MissingLocation {
        /// URI the create request was sent to.
        uri: Url,
        /// Raw response body.
        body: String,
    },
    /// Serialising a request payload failed.
    #[error("failed to encode request payload for {uri}")]
    Encode {
        /// URI the payload was destined for.
        uri: Url,
        /// Underlying codec error.
        source: SharedSource,
    },
    /// A successful response could not be parsed into the requested type.
    #[error("unable to parse HTTP response from {uri}")]
    Decode {
        /// URI the response came from.
        uri: Url,
        /// Raw response body.
        body: String,
        /// Underlying codec error.
        source: SharedSource,
    },
    /// A path or link could not be turned into a URI.
    #[error("invalid URI '{value}'")]
    InvalidUri {
        /// Offending input.
        value: String,
        /// Underlying parse error.
        source: url::ParseError,
    },
    /// A resource did not carry the requested link relation.
    #[error("resource {resource} has no '{relation}' link")]
    MissingLink {
        /// Identifier of the resource (or a description when it has none).
        resource: String,
        /// Requested relation name.
        relation: String,
    },
    /// Watched deployments did not finish before the deadline.
    #[error("deployments did not complete within {timeout:?}; still pending: {pending}")]
    DeploymentTimeout {
        /// Deadline that elapsed.
        timeout: Duration,
        /// Tasks that were not terminal when the deadline passed.
        pending: TaskList,
        /// Most recent status-check failure, when the last rounds could not be collected.
        #[source]
        last_error: Option<Box<ClientError>>,
    },
    /// One or more watched deployments ended in a non-success state.
    #[error("one or more deployments did not succeed: {failed}")]
    DeploymentFailed {
        /// Tasks that ended without success, with their final state.
        failed: TaskList,
    },
}

/// Discriminant of [`ClientError`] used for branching and exit-code mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// See [`ClientError::Usage`].
    Usage,
    /// See [`ClientError::IncompatibleServer`].
    IncompatibleServer,
    /// See [`ClientError::Api`].
    Api,
    /// See [`ClientError::Connectivity`].
    Connectivity,
    /// Encoding, decoding, URI, link, and location contract failures.
    Protocol,
    /// See [`ClientError::DeploymentTimeout`].
    DeploymentTimeout,
    /// See [`ClientError::DeploymentFailed`].
    DeploymentFailed,
}

impl ClientError {
    /// Build a usage error.
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    /// Classify the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Usage { .. } => ErrorKind::Usage,
            Self::IncompatibleServer { .. } => ErrorKind::IncompatibleServer,
            Self::Api { .. } => ErrorKind::Api,
            Self::Connectivity { .. } => ErrorKind::Connectivity,
            Self::MissingLocation { .. }
            | Self::Encode { .. }
            | Self::Decode { .. }
            | Self::InvalidUri { .. }
            | Self::MissingLink { .. } => ErrorKind::Protocol,
            Self::DeploymentTimeout { .. } => ErrorKind::DeploymentTimeout,
            Self::DeploymentFailed { .. } => ErrorKind::DeploymentFailed,
        }
    }

    /// HTTP status for [`ClientError::Api`] errors.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether repeating the same request may succeed: connectivity failures, timeouts,
    /// throttling and server-side errors.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Connectivity { .. } => true,
            Self::Api { status, .. } => matches!(*status, 408 | 429 | 500..=599),
            _ => false,
        }
    }
}

/// Task list rendered as `label: State` pairs in error messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskList(pub Vec<TaskReference>);

impl TaskList {
    /// Tasks in the list.
    #[must_use]
    pub fn tasks(&self) -> &[TaskReference] {
        &self.0
    }
}

impl Display for TaskList {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return formatter.write_str("<none>");
        }
        for (index, task) in self.0.iter().enumerate() {
            if index > 0 {
                formatter.write_str(", ")?;
            }
            write!(formatter, "{}: {}", task.label, task.state)?;
        }
        Ok(())
    }
}
