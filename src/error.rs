//! Error taxonomy for the local CA engine.
//!
//! CA, issuance and inventory errors are terminal for the operation that raised
//! them. Trust store errors are collected per target by the installer and
//! reported next to the targets that succeeded.

use std::path::{Path, PathBuf};

use openssl::error::ErrorStack;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CaError>;

#[derive(Debug, Error)]
pub enum CaError {
    /// A required CA or certificate file is absent.
    #[error("{what} not found at {}", path.display())]
    NotFound { what: &'static str, path: PathBuf },

    /// Key generation, signing or chain verification failed.
    #[error("crypto failure while {context}: {reason}")]
    Crypto { context: String, reason: String },

    /// Malformed PEM or certificate content on disk.
    #[error("failed to parse {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    /// Filesystem read/write failure.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A required external certificate utility is not installed.
    #[error("required tool `{tool}` was not found on PATH")]
    ToolMissing { tool: String, instructions: String },

    /// A privileged operation was refused by the operating system.
    #[error("{message}")]
    Permission {
        message: String,
        manual_command: Option<String>,
    },

    /// The user declined a confirmation prompt.
    #[error("operation cancelled by user")]
    UserCancelled { manual_command: Option<String> },

    #[error("invalid domain {domain:?}: {reason}")]
    InvalidDomain { domain: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("licensing service unavailable: {0}")]
    LicenseUnavailable(String),

    /// Renewal stopped at `domain`; everything in `renewed` was already replaced.
    #[error("failed to renew {domain} (renewed before failure: {renewed:?}): {source}")]
    Renewal {
        renewed: Vec<String>,
        domain: String,
        #[source]
        source: Box<CaError>,
    },
}

impl CaError {
    /// The command a user could run by hand instead, when one is known.
    pub fn manual_command(&self) -> Option<&str> {
        match self {
            CaError::Permission { manual_command, .. }
            | CaError::UserCancelled { manual_command } => manual_command.as_deref(),
            CaError::ToolMissing { instructions, .. } => Some(instructions),
            CaError::Renewal { source, .. } => source.manual_command(),
            _ => None,
        }
    }

    pub(crate) fn parse(path: &Path, reason: impl ToString) -> Self {
        CaError::Parse {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

impl From<ErrorStack> for CaError {
    fn from(stack: ErrorStack) -> Self {
        CaError::Crypto {
            context: "running an openssl operation".to_string(),
            reason: stack.to_string(),
        }
    }
}

/// `map_err` adapter for openssl failures with a description of the step.
pub(crate) fn crypto(context: &'static str) -> impl FnOnce(ErrorStack) -> CaError {
    move |stack| CaError::Crypto {
        context: context.to_string(),
        reason: stack.to_string(),
    }
}

/// `map_err` adapter attaching the path an I/O error happened on.
pub(crate) fn io_at(path: &Path) -> impl FnOnce(std::io::Error) -> CaError {
    let path = path.to_path_buf();
    move |source| CaError::Io { path, source }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_error_exposes_manual_command() {
        let err = CaError::Permission {
            message: "`sudo update-ca-certificates` failed".to_string(),
            manual_command: Some("sudo update-ca-certificates".to_string()),
        };
        assert_eq!(err.manual_command(), Some("sudo update-ca-certificates"));
        assert!(err.to_string().contains("failed"));
    }

    #[test]
    fn renewal_error_reports_partial_success() {
        let err = CaError::Renewal {
            renewed: vec!["a.test".to_string()],
            domain: "b.test".to_string(),
            source: Box::new(CaError::Config("boom".to_string())),
        };
        let msg = err.to_string();
        assert!(msg.contains("b.test"), "message: {msg}");
        assert!(msg.contains("a.test"), "message: {msg}");
    }

    #[test]
    fn io_adapter_keeps_path() {
        let err = io_at(Path::new("/tmp/x"))(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(matches!(err, CaError::Io { ref path, .. } if path == Path::new("/tmp/x")));
    }
}
