//! Error types for the credential bridging flow.
//!
//! Every variant is terminal for the current invocation. Nothing in this crate
//! retries; callers decide whether and how to try again.

use thiserror::Error;

/// Flat classification of every failure the crate can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    IdentityUnavailable,
    InvalidName,
    NotFound,
    RemoteFailure,
    MalformedResponse,
    SigningFailure,
    IncompleteDescriptor,
    ClientConstructionFailed,
}

/// Failures talking to the identity provider (STS).
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("[{operation}] caller identity unavailable: {detail}")]
    IdentityUnavailable {
        operation: &'static str,
        detail: String,
    },

    #[error("[{operation}] failed to sign token request: {detail}")]
    SigningFailure {
        operation: &'static str,
        detail: String,
    },
}

impl AuthError {
    /// Build an `IdentityUnavailable` from any provider error.
    pub fn identity<E: std::fmt::Debug + std::fmt::Display>(
        operation: &'static str,
        err: E,
    ) -> Self {
        Self::IdentityUnavailable {
            operation,
            detail: provider_detail(&err),
        }
    }

    /// Build a `SigningFailure` from any provider error.
    pub fn signing<E: std::fmt::Debug + std::fmt::Display>(
        operation: &'static str,
        err: E,
    ) -> Self {
        Self::SigningFailure {
            operation,
            detail: provider_detail(&err),
        }
    }

    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::IdentityUnavailable { .. } => ErrorKind::IdentityUnavailable,
            Self::SigningFailure { .. } => ErrorKind::SigningFailure,
        }
    }
}

/// Failures loading the cluster descriptor from EKS.
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Cluster name cannot be empty")]
    InvalidName,

    #[error("Cluster not found: {0}")]
    NotFound(String),

    #[error("[eks::describe_cluster] {cluster}: {detail}")]
    RemoteFailure { cluster: String, detail: String },

    #[error("Malformed describe_cluster response for {cluster}: {field} {reason}")]
    MalformedResponse {
        cluster: String,
        field: &'static str,
        reason: String,
    },
}

impl ClusterError {
    /// Build a `RemoteFailure` from any provider error.
    pub fn remote<E: std::fmt::Debug + std::fmt::Display>(cluster: &str, err: E) -> Self {
        Self::RemoteFailure {
            cluster: cluster.to_string(),
            detail: provider_detail(&err),
        }
    }

    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidName => ErrorKind::InvalidName,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::RemoteFailure { .. } => ErrorKind::RemoteFailure,
            Self::MalformedResponse { .. } => ErrorKind::MalformedResponse,
        }
    }
}

/// Failures assembling the client configuration or the client itself.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cluster descriptor for {cluster} is incomplete: missing {field}")]
    IncompleteDescriptor {
        cluster: String,
        field: &'static str,
    },

    #[error("Failed to build Kubernetes client for context {context}: {detail}")]
    ClientConstructionFailed { context: String, detail: String },
}

impl ConfigError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::IncompleteDescriptor { .. } => ErrorKind::IncompleteDescriptor,
            Self::ClientConstructionFailed { .. } => ErrorKind::ClientConstructionFailed,
        }
    }
}

/// Any failure of the end-to-end client construction.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth(e) => e.kind(),
            Self::Cluster(e) => e.kind(),
            Self::Config(e) => e.kind(),
        }
    }
}

/// Reduce an AWS SDK error to a single meaningful line.
///
/// SDK service errors display as a bare "service error"; the useful text lives
/// in the `message` field of the Debug representation.
pub fn provider_detail<E: std::fmt::Debug + std::fmt::Display>(err: &E) -> String {
    extract_error_details(&format!("{err:?}"), &err.to_string())
}

fn extract_error_details(debug_str: &str, display_str: &str) -> String {
    // Pattern: message: Some("actual error message")
    if let Some(pos) = debug_str.find("message: Some(\"") {
        let rest = &debug_str[pos + "message: Some(\"".len()..];
        if let Some(end) = rest.find('"') {
            return rest[..end].to_string();
        }
    }

    if !display_str.to_lowercase().contains("service error") {
        return display_str.to_string();
    }

    "AWS API request failed".to_string()
}
