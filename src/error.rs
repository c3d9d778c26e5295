//! Error types for nvd-search
//!
//! Every failure during a synchronization run is fatal for that run. The
//! taxonomy mirrors where the failure came from:
//! - [`TransportError`] - the feed could not be reached or answered with a non-200 status
//! - [`ParseError`] - a descriptor, digest, artifact or dataset could not be understood
//! - [`IntegrityError`] - downloaded content does not match what the feed published
//! - [`StorageError`] - the local store could not be created, read or written
//!
//! The orchestrator wraps the first failure of a phase in [`Error::PhaseFailed`]
//! so the diagnostic names both the phase and the artifact.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::{ArtifactId, SyncPhase};

/// Result type alias for nvd-search operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for nvd-search
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "feed.base_url")
        key: Option<String>,
    },

    /// Feed could not be reached or returned an unexpected status
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Malformed descriptor, digest, artifact body or dataset
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Downloaded content failed verification
    #[error("integrity error: {0}")]
    Integrity(#[from] IntegrityError),

    /// Local store I/O failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A synchronization phase aborted on the given error
    #[error("{phase} phase failed: {source}")]
    PhaseFailed {
        /// The phase that was running
        phase: SyncPhase,
        /// The first error reported in that phase
        #[source]
        source: Box<Error>,
    },

    /// The run was cancelled before it completed
    #[error("synchronization cancelled")]
    Cancelled,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Attach the phase that was running when this error surfaced.
    ///
    /// Cancellation and errors that already carry a phase are returned unchanged.
    pub fn in_phase(self, phase: SyncPhase) -> Self {
        match self {
            Error::Cancelled | Error::PhaseFailed { .. } => self,
            other => Error::PhaseFailed {
                phase,
                source: Box::new(other),
            },
        }
    }

    /// The phase in which this error surfaced, if known
    pub fn phase(&self) -> Option<SyncPhase> {
        match self {
            Error::PhaseFailed { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// The innermost error, with any phase wrapping removed
    pub fn root(&self) -> &Error {
        match self {
            Error::PhaseFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the run ended because it was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Error::Cancelled)
    }

    pub(crate) fn config(message: impl Into<String>, key: &str) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// Network-level failures while talking to the feed
#[derive(Debug, Error)]
pub enum TransportError {
    /// The HTTP request itself failed (DNS, connect, reset, body read)
    #[error("request for artifact {artifact} to {url} failed: {source}")]
    Request {
        /// Artifact being fetched
        artifact: ArtifactId,
        /// Requested URL
        url: String,
        /// Underlying client error
        #[source]
        source: reqwest::Error,
    },

    /// The request exceeded the configured timeout
    #[error("request for artifact {artifact} to {url} timed out after {timeout_secs}s")]
    Timeout {
        /// Artifact being fetched
        artifact: ArtifactId,
        /// Requested URL
        url: String,
        /// Configured per-request timeout
        timeout_secs: u64,
    },

    /// The feed answered with something other than 200 OK
    #[error("{url} returned HTTP {status} for artifact {artifact}")]
    Status {
        /// Artifact being fetched
        artifact: ArtifactId,
        /// Requested URL
        url: String,
        /// HTTP status code received
        status: u16,
    },

    /// The HTTP client could not be constructed
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Content that could not be understood
#[derive(Debug, Error)]
pub enum ParseError {
    /// A descriptor line has no `:` delimiter
    #[error("metadata for artifact {artifact}, line {line}: missing ':' delimiter in {content:?}")]
    MalformedLine {
        /// Artifact whose descriptor is malformed
        artifact: ArtifactId,
        /// 1-based line number within the descriptor
        line: usize,
        /// The offending line
        content: String,
    },

    /// A descriptor lacks a key the operation needs
    #[error("metadata for artifact {artifact} has no {key} entry")]
    MissingField {
        /// Artifact whose descriptor is incomplete
        artifact: ArtifactId,
        /// The missing key
        key: &'static str,
    },

    /// A descriptor value has the wrong shape (e.g. a non-numeric size)
    #[error("metadata for artifact {artifact} has invalid {key} value {value:?}")]
    InvalidField {
        /// Artifact whose descriptor is invalid
        artifact: ArtifactId,
        /// The key with the invalid value
        key: &'static str,
        /// The raw value
        value: String,
    },

    /// A published digest is not 64 hexadecimal characters
    #[error("metadata for artifact {artifact} has malformed sha256 {value:?}")]
    MalformedDigest {
        /// Artifact whose digest is malformed
        artifact: ArtifactId,
        /// The raw digest value
        value: String,
    },

    /// Text that is neither `modified` nor a four-digit year
    #[error("invalid artifact id {0:?}: expected \"modified\" or a four-digit year")]
    InvalidArtifactId(String),

    /// The decompressed artifact is not a usable feed document
    #[error("artifact {artifact} is not a valid feed document: {reason}")]
    Feed {
        /// Artifact whose content could not be decoded
        artifact: ArtifactId,
        /// Decoder or schema failure
        reason: String,
    },

    /// The merged dataset on disk could not be decoded
    #[error("dataset {path} could not be decoded: {reason}")]
    Dataset {
        /// Path to the dataset file
        path: PathBuf,
        /// Decoder failure
        reason: String,
    },
}

/// Verification failures. Never retried, never merged.
#[derive(Debug, Error)]
pub enum IntegrityError {
    /// Computed digest differs from the published one
    #[error("artifact {artifact} digest mismatch: feed published {expected}, downloaded content hashes to {actual}")]
    DigestMismatch {
        /// Artifact that failed verification
        artifact: ArtifactId,
        /// Published digest from the metadata descriptor
        expected: String,
        /// Digest computed over the downloaded content
        actual: String,
    },

    /// Downloaded content could not be decoded for hashing
    #[error("artifact {artifact} is corrupt: {reason}")]
    CorruptArtifact {
        /// Artifact whose content failed to decode
        artifact: ArtifactId,
        /// Decoder diagnostic
        reason: String,
    },

    /// A requested artifact produced no result in the fan-in
    #[error("no result was reported for artifact {artifact}")]
    MissingArtifact {
        /// Artifact with no result
        artifact: ArtifactId,
    },
}

/// Local store failures
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to create a directory
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        /// Directory that could not be created
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to read a file
    #[error("failed to read {path}: {source}")]
    Read {
        /// File that could not be read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to write, move or remove a file
    #[error("failed to write {path}: {source}")]
    Write {
        /// File that could not be written
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Not enough free space for the artifacts about to be downloaded
    #[error("insufficient disk space: need {required} bytes, have {available} bytes")]
    InsufficientSpace {
        /// Number of bytes required for the run
        required: u64,
        /// Number of bytes currently available on disk
        available: u64,
    },

    /// Free space could not be determined
    #[error("failed to check disk space for {path}: {source}")]
    DiskSpaceCheckFailed {
        /// Path that was queried
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Read {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Write {
            path: path.into(),
            source,
        }
    }
}
