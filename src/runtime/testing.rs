//! In-memory stand-ins for the orchestrator traits.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{
    CommandExecutor, CommandOutput, Invocation, RuntimeError, ServiceSnapshot, SwarmRuntime,
};
use crate::types::RegistryAuth;

/// Records every invocation and answers with a canned output.
pub struct FakeExecutor {
    output: CommandOutput,
    pub calls: Mutex<Vec<(Invocation, Option<Vec<u8>>)>>,
}

impl FakeExecutor {
    pub fn exiting(code: i32, combined: &str) -> Self {
        Self {
            output: CommandOutput {
                combined: combined.as_bytes().to_vec(),
                exit_code: Some(code),
            },
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn last_stdin(&self) -> Option<String> {
        self.calls
            .lock()
            .unwrap()
            .last()
            .and_then(|(_, stdin)| stdin.clone())
            .map(|bytes| String::from_utf8(bytes).unwrap())
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CommandExecutor for FakeExecutor {
    async fn execute(
        &self,
        invocation: &Invocation,
        stdin: Option<Vec<u8>>,
    ) -> Result<CommandOutput, RuntimeError> {
        self.calls
            .lock()
            .unwrap()
            .push((invocation.clone(), stdin));
        Ok(self.output.clone())
    }
}

/// Lets a test keep a handle on the executor after handing it over.
#[async_trait]
impl CommandExecutor for Arc<FakeExecutor> {
    async fn execute(
        &self,
        invocation: &Invocation,
        stdin: Option<Vec<u8>>,
    ) -> Result<CommandOutput, RuntimeError> {
        <FakeExecutor as CommandExecutor>::execute(self, invocation, stdin).await
    }
}

/// A recorded `update_service` call.
pub struct UpdateCall {
    pub name: String,
    pub snapshot: ServiceSnapshot,
    pub auth: Option<RegistryAuth>,
}

#[derive(Default)]
pub struct FakeSwarm {
    /// Makes `ping` answer like an engine that is not a swarm manager.
    pub fail_ping: bool,
    pub services: HashMap<String, ServiceSnapshot>,
    pub warnings: Vec<String>,
    pub fail_inspect: Option<String>,
    pub fail_update: Option<String>,
    pub updates: Mutex<Vec<UpdateCall>>,
}

impl FakeSwarm {
    pub fn with_service(name: &str, snapshot: ServiceSnapshot) -> Self {
        let mut swarm = Self::default();
        swarm.services.insert(name.to_string(), snapshot);
        swarm
    }
}

fn engine_error(message: &str) -> RuntimeError {
    RuntimeError::Docker(bollard::errors::Error::DockerResponseServerError {
        status_code: 500,
        message: message.to_string(),
    })
}

#[async_trait]
impl SwarmRuntime for FakeSwarm {
    async fn ping(&self) -> Result<(), RuntimeError> {
        if self.fail_ping {
            return Err(RuntimeError::NotSwarmManager);
        }
        Ok(())
    }

    async fn inspect_service(&self, name: &str) -> Result<ServiceSnapshot, RuntimeError> {
        if let Some(message) = &self.fail_inspect {
            return Err(engine_error(message));
        }
        self.services
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::ServiceNotFound(name.to_string()))
    }

    async fn update_service(
        &self,
        name: &str,
        snapshot: ServiceSnapshot,
        auth: Option<RegistryAuth>,
    ) -> Result<Vec<String>, RuntimeError> {
        self.updates.lock().unwrap().push(UpdateCall {
            name: name.to_string(),
            snapshot,
            auth,
        });
        if let Some(message) = &self.fail_update {
            return Err(engine_error(message));
        }
        Ok(self.warnings.clone())
    }
}
