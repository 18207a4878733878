use async_trait::async_trait;
use log::{info, warn};

use super::Deployer;
use crate::error::DeployError;
use crate::image::{ImageReference, PatchImage};
use crate::resolve::resolve_service;
use crate::runtime::SwarmRuntime;
use crate::types::{DeployOutcome, RegistryAuth, UpdateRequest};

/// Updates a swarm service through the engine API.
pub struct SwarmDeployer<R> {
    runtime: R,
    registry: String,
}

impl<R: SwarmRuntime> SwarmDeployer<R> {
    pub fn new(runtime: R, registry: impl Into<String>) -> Self {
        Self {
            runtime,
            registry: registry.into(),
        }
    }
}

#[async_trait]
impl<R: SwarmRuntime> Deployer for SwarmDeployer<R> {
    async fn self_test(&self) -> Result<(), DeployError> {
        self.runtime.ping().await.map_err(DeployError::Unreachable)
    }

    async fn deploy(&self, request: UpdateRequest) -> Result<DeployOutcome, DeployError> {
        let reference = ImageReference::new(&self.registry, &request.image, request.tag.as_deref());

        // The version read here is the one sent back with the update, so a
        // concurrent writer makes the engine reject ours instead of losing it.
        let mut snapshot = resolve_service(&self.runtime, &request.service).await?;
        snapshot.spec.set_image(&reference);

        let auth = request.registry_auth.as_deref().and_then(registry_credentials);
        let warnings = self
            .runtime
            .update_service(&request.service, snapshot, auth)
            .await
            .map_err(DeployError::Update)?;

        info!(
            "Update completed: service={} image={} warnings={}",
            request.service,
            reference,
            warnings.len()
        );
        Ok(DeployOutcome::ServiceUpdated { warnings })
    }
}

/// The engine API client takes typed credentials, so the header is decoded
/// here and encoded again on the way out.  A payload that does not decode
/// is dropped and the update goes ahead without credentials.
fn registry_credentials(header: &str) -> Option<RegistryAuth> {
    match RegistryAuth::decode(header) {
        Ok(auth) => auth,
        Err(err) => {
            warn!("Ignoring X-Registry-Auth header: {}", err);
            None
        }
    }
}
