use async_trait::async_trait;
use bollard::errors::Error as BollardError;
use bollard::service::UpdateServiceOptions;
use bollard::Docker;
use log::{debug, info, warn};

use super::{RuntimeError, ServiceSnapshot, SwarmRuntime};
use crate::types::RegistryAuth;

/// Swarm runtime backed by the local Docker engine.
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the local Docker daemon using default settings
    /// (`DOCKER_HOST` or the unix socket on Linux).
    pub fn connect() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl SwarmRuntime for DockerRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        let swarm = self.docker.info().await?.swarm.unwrap_or_default();
        if swarm.control_available != Some(true) {
            return Err(RuntimeError::NotSwarmManager);
        }
        info!(
            "Connected to swarm manager {}",
            swarm.node_id.as_deref().unwrap_or("<unknown>")
        );
        Ok(())
    }

    async fn inspect_service(&self, name: &str) -> Result<ServiceSnapshot, RuntimeError> {
        let service = match self.docker.inspect_service(name, None).await {
            Ok(service) => service,
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => return Err(RuntimeError::ServiceNotFound(name.to_string())),
            Err(e) => return Err(e.into()),
        };

        let version = service
            .version
            .and_then(|v| v.index)
            .ok_or_else(|| RuntimeError::MissingVersion(name.to_string()))?;
        let spec = service
            .spec
            .ok_or_else(|| RuntimeError::MissingSpec(name.to_string()))?;
        debug!("Inspected service {} at version {}", name, version);

        Ok(ServiceSnapshot { spec, version })
    }

    async fn update_service(
        &self,
        name: &str,
        snapshot: ServiceSnapshot,
        auth: Option<RegistryAuth>,
    ) -> Result<Vec<String>, RuntimeError> {
        let options = UpdateServiceOptions {
            version: snapshot.version,
            ..Default::default()
        };
        let response = self
            .docker
            .update_service(
                name,
                snapshot.spec,
                options,
                auth.map(RegistryAuth::into_credentials),
            )
            .await?;

        let warnings = response.warnings.unwrap_or_default();
        for warning in &warnings {
            warn!("Engine warning while updating {}: {}", name, warning);
        }
        Ok(warnings)
    }
}
