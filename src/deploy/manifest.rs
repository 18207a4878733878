use std::path::PathBuf;

use async_trait::async_trait;
use log::{debug, info};

use super::Deployer;
use crate::config::{Config, DeployMode};
use crate::error::DeployError;
use crate::image::ImageReference;
use crate::manifest::Manifest;
use crate::resolve::resolve_manifest;
use crate::runtime::{CommandExecutor, Invocation};
use crate::types::{DeployOutcome, UpdateRequest};

/// The part of [`Config`] the manifest strategy needs.
#[derive(Debug, Clone)]
pub struct ManifestSettings {
    pub mode: DeployMode,
    pub compose_file: PathBuf,
    pub working_dir: Option<PathBuf>,
    pub project: Option<String>,
    pub compose_binary: String,
    pub docker_binary: String,
}

impl ManifestSettings {
    /// `None` when the configured mode does not deploy a manifest.
    pub fn from_config(config: &Config) -> Option<Self> {
        if !config.mode.uses_manifest() {
            return None;
        }
        Some(Self {
            mode: config.mode,
            compose_file: config.compose_file.clone()?,
            working_dir: config.working_dir.clone(),
            project: config.project.clone().filter(|p| !p.is_empty()),
            compose_binary: config.compose_binary.clone(),
            docker_binary: config.docker_binary.clone(),
        })
    }

    fn invocation(&self, program: &str, args: Vec<String>) -> Invocation {
        Invocation {
            program: program.to_string(),
            args,
            working_dir: self.working_dir.clone(),
        }
    }

    fn project_args(&self) -> Vec<String> {
        match &self.project {
            Some(project) => vec!["-p".into(), project.clone()],
            None => Vec::new(),
        }
    }

    fn stack_name(&self) -> String {
        self.project.clone().unwrap_or_default()
    }

    /// Read-only command used as the startup self-test.
    pub fn test_command(&self) -> Invocation {
        match self.mode {
            DeployMode::Stack => self.invocation(
                &self.docker_binary,
                vec!["stack".into(), "ps".into(), self.stack_name()],
            ),
            _ => {
                let mut args: Vec<String> = vec![
                    "-f".into(),
                    self.compose_file.to_string_lossy().into_owned(),
                ];
                args.extend(self.project_args());
                args.push("ps".into());
                self.invocation(&self.compose_binary, args)
            }
        }
    }

    /// Redeploy command; the patched manifest arrives on stdin.
    pub fn deploy_command(&self) -> Invocation {
        match self.mode {
            DeployMode::Stack => self.invocation(
                &self.docker_binary,
                vec![
                    "stack".into(),
                    "deploy".into(),
                    "-c".into(),
                    "-".into(),
                    "--with-registry-auth".into(),
                    self.stack_name(),
                ],
            ),
            _ => {
                let mut args: Vec<String> = vec!["-f".into(), "-".into()];
                args.extend(self.project_args());
                args.push("up".into());
                args.push("-d".into());
                self.invocation(&self.compose_binary, args)
            }
        }
    }
}

/// Patches the manifest file and hands it to `docker-compose`/`docker stack`.
///
/// The file itself is never rewritten; the patched document only exists on
/// the command's stdin.
pub struct ManifestDeployer<E> {
    executor: E,
    registry: String,
    settings: ManifestSettings,
}

impl<E: CommandExecutor> ManifestDeployer<E> {
    pub fn new(executor: E, registry: impl Into<String>, settings: ManifestSettings) -> Self {
        Self {
            executor,
            registry: registry.into(),
            settings,
        }
    }
}

#[async_trait]
impl<E: CommandExecutor> Deployer for ManifestDeployer<E> {
    async fn self_test(&self) -> Result<(), DeployError> {
        Manifest::load(&self.settings.compose_file).await?.services()?;

        let invocation = self.settings.test_command();
        debug!("Running {} file test: {}", self.settings.mode, invocation.display());
        let output = self
            .executor
            .execute(&invocation, None)
            .await
            .map_err(DeployError::Command)?;
        if !output.success() {
            return Err(DeployError::SelfTestFailed {
                status: output.status_text(),
                output: output.combined,
            });
        }
        debug!("{} file test passed", self.settings.mode);
        Ok(())
    }

    async fn deploy(&self, request: UpdateRequest) -> Result<DeployOutcome, DeployError> {
        let reference = ImageReference::new(&self.registry, &request.image, request.tag.as_deref());

        let mut target = resolve_manifest(&self.settings.compose_file, &request.service).await?;
        target.patch(&reference)?;
        let document = target.manifest().to_yaml()?;

        let invocation = self.settings.deploy_command();
        let output = self
            .executor
            .execute(&invocation, Some(document.into_bytes()))
            .await
            .map_err(DeployError::Command)?;
        if !output.success() {
            return Err(DeployError::CommandFailed {
                status: output.status_text(),
                output: output.combined,
            });
        }

        info!(
            "Deploy completed: service={} image={}",
            request.service, reference
        );
        Ok(DeployOutcome::ManifestDeployed {
            output: output.combined,
        })
    }
}
