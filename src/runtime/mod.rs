use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bollard::models::ServiceSpec;
use thiserror::Error;

use crate::types::RegistryAuth;

pub mod command;
pub mod docker;
#[cfg(test)]
pub(crate) mod testing;

pub use command::TokioCommandExecutor;
pub use docker::DockerRuntime;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("service {0} not found")]
    ServiceNotFound(String),

    #[error("engine is not a swarm manager")]
    NotSwarmManager,

    #[error("service {0} has no spec")]
    MissingSpec(String),

    #[error("service {0} has no version index")]
    MissingVersion(String),

    #[error(transparent)]
    Docker(#[from] bollard::errors::Error),

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {}s", timeout.as_secs())]
    Timeout { program: String, timeout: Duration },

    #[error("i/o error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// A service spec together with the version index it was read at.  The
/// same index must be handed back on update so the engine can reject a
/// write based on a stale read.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSnapshot {
    pub spec: ServiceSpec,
    pub version: u64,
}

/// Direct access to swarm services.
#[async_trait]
pub trait SwarmRuntime: Send + Sync {
    /// Confirms the engine is reachable and is a swarm manager.
    async fn ping(&self) -> Result<(), RuntimeError>;

    /// Returns [`RuntimeError::ServiceNotFound`] when the engine has no
    /// service with this name.
    async fn inspect_service(&self, name: &str) -> Result<ServiceSnapshot, RuntimeError>;

    /// Applies `snapshot.spec` at `snapshot.version` and returns any
    /// warnings the engine reported.
    async fn update_service(
        &self,
        name: &str,
        snapshot: ServiceSnapshot,
        auth: Option<RegistryAuth>,
    ) -> Result<Vec<String>, RuntimeError>;
}

/// A fully described external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl Invocation {
    /// Shell-like rendering for log lines.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Result of a finished command.  `combined` holds the raw bytes of stdout
/// and stderr in the order they arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub combined: Vec<u8>,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn status_text(&self) -> String {
        match self.exit_code {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs external commands.  Output is returned regardless of exit status;
/// only a failure to run the command at all is an error.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(
        &self,
        invocation: &Invocation,
        stdin: Option<Vec<u8>>,
    ) -> Result<CommandOutput, RuntimeError>;
}
