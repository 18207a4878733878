//! Request-level errors.
//!
//! Each variant maps to one HTTP status in [`crate::report`].  The messages
//! are returned to the caller as-is: this is an internal deploy tool and
//! operators need the orchestrator's diagnostics.

use thiserror::Error;

use crate::manifest::ManifestError;
use crate::runtime::RuntimeError;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("missing parameter [{0}]")]
    MissingParameter(&'static str),

    #[error("Invalid service [{0}]")]
    UnknownService(String),

    #[error(transparent)]
    Manifest(ManifestError),

    #[error("Failed to reach orchestrator: {0}")]
    Unreachable(#[source] RuntimeError),

    #[error("Failed to inspect service: {0}")]
    Inspect(#[source] RuntimeError),

    #[error("Failed to update service: {0}")]
    Update(#[source] RuntimeError),

    #[error("Failed to run deploy command: {0}")]
    Command(#[source] RuntimeError),

    /// `output` is the command's raw combined output.
    #[error("Deploy failed: \n{}{}", String::from_utf8_lossy(.output), .status)]
    CommandFailed { output: Vec<u8>, status: String },

    #[error("Orchestrator self-test failed: \n{}{}", String::from_utf8_lossy(.output), .status)]
    SelfTestFailed { output: Vec<u8>, status: String },
}

impl From<ManifestError> for DeployError {
    fn from(err: ManifestError) -> Self {
        match err {
            ManifestError::UnknownService(name) => Self::UnknownService(name),
            other => Self::Manifest(other),
        }
    }
}

impl DeployError {
    /// Errors the caller can fix by changing the request.
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::Unauthorized
            | Self::MissingParameter(_)
            | Self::UnknownService(_) => true,
            Self::Manifest(err) => err.is_structural(),
            Self::Unreachable(_)
            | Self::Inspect(_)
            | Self::Update(_)
            | Self::Command(_)
            | Self::CommandFailed { .. }
            | Self::SelfTestFailed { .. } => false,
        }
    }
}
