//! # Error Definitions
//!
//! The central ledger of broker failures.
//!
//! Decorators never inspect error *types*; they branch on `FailureKind`.
//! Wrapping variants (`Invocation`, `RetriesExhausted`) keep the original
//! error as their source so `root_kind` can see through them.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::id::BindingId;
use crate::id::ContractId;
use crate::transport::TransportError;

/// How the resilience decorators treat a failure.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// Propagates immediately.
    #[default]
    Fatal,
    /// Swallowed by the retry decorator until the budget runs out.
    Retryable,
    /// Triggers the degradation chain.
    Degradable,
}

/// A remote failure translated from a response code.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{class} ({code}) from {contract}/{implementation}@{implementation_version}: {message}")]
pub struct RemoteError {
    /// Name of the error class the code resolved to.
    pub class: String,
    pub code: i32,
    pub message: String,
    pub kind: FailureKind,
    pub contract: ContractId,
    pub implementation: String,
    pub implementation_version: String,
    /// Extension fields copied from the response.
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Blank identities, conflicting merges, bad registrations.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("contract {0} is not registered")]
    ContractNotFound(ContractId),

    #[error("binding {0} is not registered")]
    BindingNotFound(BindingId),

    #[error("no matching implementation for {contract}")]
    NoImplementation { contract: ContractId },

    #[error("too many implementations for {contract}: found {found}, expected exactly one")]
    TooManyImplementations { contract: ContractId, found: usize },

    /// Raised by the unicast guard.
    #[error("expected exactly one {candidate}, found {found}")]
    Arity { candidate: &'static str, found: usize },

    #[error("no target left for {binding} after load balancing")]
    TargetNotFound { binding: BindingId },

    #[error("target '{worker}' is unusable for {binding}: {reason}")]
    InvalidTarget { binding: BindingId, worker: String, reason: String },

    #[error("argument mismatch for {binding}: expected ({expected}), got ({actual})")]
    ArgumentMismatch { binding: BindingId, expected: String, actual: String },

    #[error("result mismatch for {binding}: expected {expected}, got {actual}")]
    ResultMismatch { binding: BindingId, expected: String, actual: String },

    #[error("{binding} has no in-process implementation")]
    NotHostedLocally { binding: BindingId },

    #[error("no transport client supports protocol '{protocol}'")]
    NoTransport { protocol: String },

    #[error("no serializer for format '{format}'")]
    NoSerializer { format: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("codec error: {0}")]
    Codec(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// A local implementation failed.
    #[error("local invocation of {binding} failed: {source}")]
    Invocation {
        binding: BindingId,
        #[source]
        source: Box<Error>,
    },

    #[error("{binding} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        binding: BindingId,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// A failure raised by an implementation, optionally with a response code.
    #[error("{message}")]
    Raised {
        kind: FailureKind,
        code: Option<i32>,
        message: String,
    },
}

impl Error {
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::raised(FailureKind::Fatal, None, message)
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        Self::raised(FailureKind::Retryable, None, message)
    }

    pub fn degradable(message: impl Into<String>) -> Self {
        Self::raised(FailureKind::Degradable, None, message)
    }

    pub fn raised(kind: FailureKind, code: Option<i32>, message: impl Into<String>) -> Self {
        Self::Raised {
            kind,
            code,
            message: message.into(),
        }
    }

    /// The kind carried by this error itself. Wrappers report `Fatal`.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Raised { kind, .. } => *kind,
            Self::Remote(remote) => remote.kind,
            Self::Transport(e) => e.kind(),
            _ => FailureKind::Fatal,
        }
    }

    /// The kind of the innermost wrapped error.
    pub fn root_kind(&self) -> FailureKind {
        self.root().kind()
    }

    /// Follows `Invocation` and `RetriesExhausted` down to the original failure.
    pub fn root(&self) -> &Error {
        let mut current = self;
        loop {
            match current {
                Self::Invocation { source, .. } | Self::RetriesExhausted { source, .. } => {
                    current = source;
                }
                _ => return current,
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == FailureKind::Retryable || self.root_kind() == FailureKind::Retryable
    }

    pub fn is_degradable(&self) -> bool {
        self.kind() == FailureKind::Degradable || self.root_kind() == FailureKind::Degradable
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Codec(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn binding() -> BindingId {
        BindingId::new(ContractId::new("svc", "1"), "impl", "1")
    }

    #[test]
    fn test_wrappers_expose_root_kind() {
        let wrapped = Error::Invocation {
            binding: binding(),
            source: Box::new(Error::retryable("busy")),
        };
        assert_eq!(wrapped.kind(), FailureKind::Fatal);
        assert_eq!(wrapped.root_kind(), FailureKind::Retryable);
        assert!(wrapped.is_retryable());
        assert!(!wrapped.is_degradable());
    }

    #[test]
    fn test_exhausted_retry_keeps_degradable_root() {
        let err = Error::RetriesExhausted {
            binding: binding(),
            attempts: 3,
            source: Box::new(Error::Invocation {
                binding: binding(),
                source: Box::new(Error::degradable("down")),
            }),
        };
        assert!(err.is_degradable());
        assert_eq!(err.root().to_string(), "down");
    }

    #[test]
    fn test_transport_timeout_is_retryable() {
        let err = Error::from(TransportError::Timeout);
        assert!(err.is_retryable());
    }
}
