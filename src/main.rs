//! Deploy agent entry point.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::{debug, info};

use deploy_agent::auth::TokenAuthenticator;
use deploy_agent::config::{Cli, Config, DeployMode};
use deploy_agent::deploy::{Deployer, ManifestDeployer, ManifestSettings, SwarmDeployer};
use deploy_agent::runtime::{DockerRuntime, TokioCommandExecutor};
use deploy_agent::server::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Load configuration
    let cli = Cli::parse();
    let cfg = Config::load(&cli)?;
    info!("Starting deploy agent with config: {:?}", cfg);

    let deployer: Arc<dyn Deployer> = match cfg.mode {
        DeployMode::Service => {
            let runtime = DockerRuntime::connect().context("Failed to initialize docker client")?;
            Arc::new(SwarmDeployer::new(runtime, cfg.registry.clone()))
        }
        DeployMode::Compose | DeployMode::Stack => {
            let settings = ManifestSettings::from_config(&cfg)
                .context("manifest mode requires a compose file")?;
            let executor = TokioCommandExecutor::new(cfg.command_timeout());
            Arc::new(ManifestDeployer::new(executor, cfg.registry.clone(), settings))
        }
    };

    // Nothing is served until the orchestrator has answered once.
    debug!("Running {} self-test", cfg.mode);
    deployer
        .self_test()
        .await
        .context("Startup self-test failed")?;
    debug!("Self-test passed");

    let state = AppState::new(TokenAuthenticator::new(&cfg.token), deployer);
    server::serve(cfg.address, state).await
}
