//! Error types for the workload reconciler

use thiserror::Error;

use crate::resource::ObjectRef;

/// Result type alias using the reconciler's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types
#[derive(Error, Debug)]
pub enum Error {
    /// The addressed object does not exist
    #[error("{0} not found")]
    NotFound(ObjectRef),

    /// An object with the same identity is already stored
    #[error("{0} already exists")]
    AlreadyExists(ObjectRef),

    /// The submitted resourceVersion is no longer current
    #[error("Version conflict on {object}: {message}")]
    VersionConflict { object: ObjectRef, message: String },

    /// Every attempt of an update lost its race
    #[error("Gave up updating {object} after {attempts} conflicting attempt(s): {last}")]
    RetryExhausted {
        object: ObjectRef,
        attempts: u32,
        last: String,
    },

    /// The store refused the request for a reason other than identity or version
    #[error("Request for {object} rejected ({code}): {message}")]
    Rejected {
        object: ObjectRef,
        code: u16,
        message: String,
    },

    /// The store could not be reached or its response could not be read
    #[error("Transport error on {object}: {source}")]
    Transport {
        object: ObjectRef,
        #[source]
        source: kube::Error,
    },

    /// Kubeconfig could not be read or resolved
    #[error("Kubeconfig error: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Manifest parsing error
    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_yaml::Error),
}

/// Coarse classification used when reporting failures
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    VersionConflict,
    RetryExhausted,
    Rejected,
    Transport,
    Config,
    Validation,
    Serialization,
}

impl ErrorKind {
    /// Stable label for logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::VersionConflict => "version_conflict",
            ErrorKind::RetryExhausted => "retry_exhausted",
            ErrorKind::Rejected => "rejected",
            ErrorKind::Transport => "transport",
            ErrorKind::Config => "config",
            ErrorKind::Validation => "validation",
            ErrorKind::Serialization => "serialization",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Classify a failed Kubernetes API call made on behalf of `object`.
    ///
    /// Only API status responses are inspected; anything that never produced
    /// a status (connect, TLS, body decoding) is a transport failure.
    pub fn from_kube(err: kube::Error, object: ObjectRef) -> Self {
        match err {
            kube::Error::Api(response) => match (response.code, response.reason.as_str()) {
                (404, _) => Error::NotFound(object),
                (409, "AlreadyExists") => Error::AlreadyExists(object),
                (409, _) => Error::VersionConflict {
                    object,
                    message: response.message,
                },
                (code, _) => Error::Rejected {
                    object,
                    code,
                    message: response.message,
                },
            },
            other => Error::Transport {
                object,
                source: other,
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Error::VersionConflict { .. } => ErrorKind::VersionConflict,
            Error::RetryExhausted { .. } => ErrorKind::RetryExhausted,
            Error::Rejected { .. } => ErrorKind::Rejected,
            Error::Transport { .. } => ErrorKind::Transport,
            Error::Kubeconfig(_) | Error::Config(_) => ErrorKind::Config,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Serialization(_) | Error::Manifest(_) => ErrorKind::Serialization,
        }
    }

    /// Identity of the resource the failure concerns, if any
    pub fn object(&self) -> Option<&ObjectRef> {
        match self {
            Error::NotFound(object)
            | Error::AlreadyExists(object)
            | Error::VersionConflict { object, .. }
            | Error::RetryExhausted { object, .. }
            | Error::Rejected { object, .. }
            | Error::Transport { object, .. } => Some(object),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
