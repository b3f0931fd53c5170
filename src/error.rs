//! Error taxonomy shared by every backend.
//!
//! Nothing below the handler boundary (git2, reqwest, serde) leaks out
//! untranslated: each failure is mapped onto one of the kinds here so the
//! caller can pick a response class without knowing which backend ran.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    /// Malformed or unsupported commit address. Always a client fault.
    #[error("{0}")]
    AddressParse(String),

    /// The address is valid but the commit, blob or path does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The remote API or a local git operation failed. The caller may retry.
    #[error("{0}")]
    UpstreamUnavailable(String),

    #[error("Invalid repository path: {repo_name} resolves to {}", resolved.display())]
    PathTraversalRejected { repo_name: String, resolved: PathBuf },

    /// Malformed unified diff text from an otherwise successful backend call.
    #[error("Malformed patch: {0}")]
    DiffParse(String),
}

pub type VcsResult<T> = Result<T, VcsError>;

impl VcsError {
    /// HTTP status class the web layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            VcsError::AddressParse(_) => 400,
            VcsError::PathTraversalRejected { .. } => 400,
            VcsError::NotFound(_) => 404,
            VcsError::UpstreamUnavailable(_) => 502,
            VcsError::DiffParse(_) => 502,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }

    /// Translate a git2 failure, keeping "object does not exist" distinct from
    /// everything else.
    pub fn from_git(context: &str, err: git2::Error) -> Self {
        match err.code() {
            git2::ErrorCode::NotFound => VcsError::NotFound(format!("{context}: {}", err.message())),
            _ => VcsError::UpstreamUnavailable(format!("{context}: {}", err.message())),
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            msg: self.to_string(),
        }
    }
}

/// JSON error payload, `{"msg": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub msg: String,
}
