//! Target resolution: find the unit a request deploys.

use std::path::Path;

use log::debug;

use crate::error::DeployError;
use crate::image::{ImageReference, PatchImage};
use crate::manifest::Manifest;
use crate::runtime::{RuntimeError, ServiceSnapshot, SwarmRuntime};

/// Looks up a swarm service.  A missing service is the caller's mistake;
/// any other engine failure is ours.
pub async fn resolve_service<R>(runtime: &R, name: &str) -> Result<ServiceSnapshot, DeployError>
where
    R: SwarmRuntime + ?Sized,
{
    match runtime.inspect_service(name).await {
        Ok(snapshot) => Ok(snapshot),
        Err(RuntimeError::ServiceNotFound(_)) => Err(DeployError::UnknownService(name.to_string())),
        Err(e) => Err(DeployError::Inspect(e)),
    }
}

/// A manifest together with the service entry a request targets.
#[derive(Debug)]
pub struct ManifestTarget {
    manifest: Manifest,
    service: String,
}

impl ManifestTarget {
    /// Rewrites the targeted entry's image.  Other entries are untouched.
    pub fn patch(&mut self, reference: &ImageReference) -> Result<(), DeployError> {
        self.manifest.service_mut(&self.service)?.set_image(reference);
        Ok(())
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }
}

/// Reads the manifest from disk and checks that `service` names a
/// mapping entry in its `services` section.
pub async fn resolve_manifest(path: &Path, service: &str) -> Result<ManifestTarget, DeployError> {
    let mut manifest = Manifest::load(path).await?;
    manifest.service_mut(service)?;
    debug!("Resolved service {} in {}", service, path.display());
    Ok(ManifestTarget {
        manifest,
        service: service.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestError;
    use crate::runtime::testing::FakeSwarm;
    use bollard::models::ServiceSpec;

    #[tokio::test]
    async fn missing_service_is_client_error() {
        let swarm = FakeSwarm::default();
        let err = resolve_service(&swarm, "cache").await.unwrap_err();
        assert!(matches!(err, DeployError::UnknownService(ref s) if s == "cache"));
    }

    #[tokio::test]
    async fn engine_failure_is_server_error() {
        let swarm = FakeSwarm {
            fail_inspect: Some("daemon unavailable".into()),
            ..Default::default()
        };
        let err = resolve_service(&swarm, "web").await.unwrap_err();
        assert!(matches!(err, DeployError::Inspect(_)));
        assert!(!err.is_client_error());
    }

    #[tokio::test]
    async fn service_snapshot_keeps_version() {
        let snapshot = ServiceSnapshot {
            spec: ServiceSpec::default(),
            version: 42,
        };
        let swarm = FakeSwarm::with_service("web", snapshot.clone());
        assert_eq!(resolve_service(&swarm, "web").await.unwrap(), snapshot);
    }

    #[tokio::test]
    async fn manifest_resolution_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack.yml");

        std::fs::write(&path, "services:\n  web:\n    image: old\n").unwrap();
        assert!(resolve_manifest(&path, "web").await.is_ok());
        assert!(matches!(
            resolve_manifest(&path, "cache").await,
            Err(DeployError::UnknownService(_))
        ));

        std::fs::write(&path, "networks: {}\n").unwrap();
        assert!(matches!(
            resolve_manifest(&path, "web").await,
            Err(DeployError::Manifest(ManifestError::MissingServices))
        ));

        std::fs::write(&path, "services: [oops\n").unwrap();
        let err = resolve_manifest(&path, "web").await.unwrap_err();
        assert!(matches!(err, DeployError::Manifest(ManifestError::Parse(_))));
        assert!(!err.is_client_error());
    }
}
