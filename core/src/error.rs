//! Error types for the override policy engine.
//!
//! Default policy: soft failure. Fetch and apply errors are logged and
//! swallowed by the engine so a broken network or a missing build field
//! never takes the host process down. Only [`AttestationBlocked`] is meant
//! to reach the caller.

use crate::profile::OverrideKey;
use std::time::Duration;
use thiserror::Error;

/// Error category for structured logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Config file or host properties malformed
    ConfigError,
    /// Certified profile could not be fetched or parsed
    FetchError,
    /// A single override could not be written to its target field
    ApplyError,
    /// Key attestation refused for the calling process
    AttestationBlocked,
}

impl ErrorCategory {
    /// Machine-readable code for logging
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConfigError => "CONFIG_ERROR",
            Self::FetchError => "FETCH_ERROR",
            Self::ApplyError => "APPLY_ERROR",
            Self::AttestationBlocked => "ATTESTATION_BLOCKED",
        }
    }

    /// Whether the engine recovers locally from this category
    pub fn recoverable(self) -> bool {
        matches!(self, Self::FetchError | Self::ApplyError)
    }
}

/// Failure while refreshing the certified profile.
///
/// Cloneable so the outcome of one fetch can be broadcast to every caller
/// waiting on it; transport and parse errors are flattened to messages.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("transport error fetching {url}: {message}")]
    Transport { url: String, message: String },

    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("invalid certified profile payload: {0}")]
    Parse(String),

    #[error("fetch cancelled before completion")]
    Cancelled,

    #[error("no fetch result within {0:?}")]
    WaitElapsed(Duration),

    #[error("fetch runtime unavailable: {0}")]
    Runtime(String),
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Failure applying one override.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApplyError {
    #[error("target field {field} for {key} does not exist")]
    TargetFieldMissing { key: OverrideKey, field: String },
}

/// Key attestation refused for the calling process.
///
/// Surfaced to the host as an "operation not supported" failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("key attestation is not supported for this caller (gms={gms}, finsky={finsky})")]
pub struct AttestationBlocked {
    pub gms: bool,
    pub finsky: bool,
}

/// Configuration loading failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level error for the crate.
#[derive(Debug, Error)]
pub enum PropsError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error(transparent)]
    AttestationBlocked(#[from] AttestationBlocked),
}

impl PropsError {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) => ErrorCategory::ConfigError,
            Self::Fetch(_) => ErrorCategory::FetchError,
            Self::Apply(_) => ErrorCategory::ApplyError,
            Self::AttestationBlocked(_) => ErrorCategory::AttestationBlocked,
        }
    }
}

/// Result type for fallible engine operations
pub type Result<T> = std::result::Result<T, PropsError>;
