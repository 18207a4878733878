use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MIN_TOKEN_LEN: usize = 16;
const ENV_PREFIX: &str = "DEPLOY_AGENT_";
const TOKEN_FILE_ENV: &str = "DEPLOY_AGENT_TOKEN_FILE";

/// Keys read from the environment as plain strings.  `Env` parses values,
/// which turns an all-digit token or project name into a number.
const STRING_ENV_KEYS: &[&str] = &[
    "registry",
    "token",
    "compose_file",
    "working_dir",
    "project",
    "compose_binary",
    "docker_binary",
];

/// How updates are applied.  Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DeployMode {
    /// Update a single swarm service through the engine API.
    Service,
    /// Redeploy a Compose file with `docker-compose up -d`.
    Compose,
    /// Redeploy a stack file with `docker stack deploy`.
    Stack,
}

impl DeployMode {
    pub fn uses_manifest(self) -> bool {
        matches!(self, Self::Compose | Self::Stack)
    }
}

impl fmt::Display for DeployMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Service => "service",
            Self::Compose => "compose",
            Self::Stack => "stack",
        })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("failed to read token file {}: {source}", path.display())]
    TokenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Registry url must not be empty")]
    MissingRegistry,

    #[error("Missing token argument")]
    MissingToken,

    #[error("Token must be at least 16 bytes")]
    TokenTooShort,

    #[error("Token must be alphanumeric")]
    TokenNotAlphanumeric,

    #[error("Missing option [compose-file] required by {0} mode")]
    MissingComposeFile(DeployMode),

    #[error("Missing option [project]: stack mode needs a stack name")]
    MissingStackName,

    #[error("Working directory [{}] doesn't exist", .0.display())]
    MissingWorkingDir(PathBuf),
}

/// Process configuration.  Built once in `main` and never mutated.
#[derive(Clone, Deserialize, Serialize)]
pub struct Config {
    pub address: SocketAddr,
    pub registry: String,
    pub token: String,
    pub mode: DeployMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compose_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    /// Compose project name, or the stack name in stack mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub compose_binary: String,
    pub docker_binary: String,
    /// Upper bound on a redeploy command.  Unset means wait indefinitely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,
}

// Hand-written so the token never ends up in a log line.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("address", &self.address)
            .field("registry", &self.registry)
            .field("token", &"<redacted>")
            .field("mode", &self.mode)
            .field("compose_file", &self.compose_file)
            .field("working_dir", &self.working_dir)
            .field("project", &self.project)
            .field("compose_binary", &self.compose_binary)
            .field("docker_binary", &self.docker_binary)
            .field("command_timeout_secs", &self.command_timeout_secs)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: SocketAddr::from(([0, 0, 0, 0], 8090)),
            registry: String::new(),
            token: String::new(),
            mode: DeployMode::Compose,
            compose_file: None,
            working_dir: None,
            project: None,
            compose_binary: "docker-compose".into(),
            docker_binary: "docker".into(),
            command_timeout_secs: None,
        }
    }
}

/// Command-line flags.  Every value also has a config-file key and a
/// `DEPLOY_AGENT_*` environment variable; flags win.
#[derive(Debug, Default, Parser, Serialize)]
#[command(name = "deploy-agent", version, about = "HTTP-triggered image deploys")]
pub struct Cli {
    /// Path to a TOML config file (a JSON file with the same stem is also read)
    #[arg(long, default_value = "deploy-agent.toml")]
    #[serde(skip)]
    pub config: PathBuf,

    /// Server listen address
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<SocketAddr>,

    /// Trusted registry, prefixed to every image
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,

    /// Shared bearer token (at least 16 alphanumeric characters)
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Deploy mode
    #[arg(long, value_enum)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<DeployMode>,

    /// Path to the Compose or stack file
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compose_file: Option<PathBuf>,

    /// Working directory for deploy commands
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    /// Project name (compose) or stack name (swarm)
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    /// Kill deploy commands after this many seconds
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,
}

impl Config {
    /// Layers: defaults, config files, environment, flags.
    pub fn figment(cli: &Cli) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(&cli.config))
            .merge(Json::file(cli.config.with_extension("json")))
            .merge(Env::prefixed(ENV_PREFIX).ignore(STRING_ENV_KEYS))
            .merge(string_env())
            .merge(Serialized::defaults(cli))
    }

    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment(cli))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let mut config: Config = figment.extract().map_err(Box::new)?;

        // Support Docker-style secrets
        if let Ok(token_file) = std::env::var(TOKEN_FILE_ENV) {
            let path = PathBuf::from(token_file);
            config.token = std::fs::read_to_string(&path)
                .map_err(|source| ConfigError::TokenFile { path, source })?
                .trim()
                .to_string();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.registry.is_empty() {
            return Err(ConfigError::MissingRegistry);
        }
        if self.token.is_empty() {
            return Err(ConfigError::MissingToken);
        }
        if self.token.len() < MIN_TOKEN_LEN {
            return Err(ConfigError::TokenTooShort);
        }
        if !self.token.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConfigError::TokenNotAlphanumeric);
        }
        if self.mode.uses_manifest() && self.compose_file.is_none() {
            return Err(ConfigError::MissingComposeFile(self.mode));
        }
        if self.mode == DeployMode::Stack && self.project.as_deref().unwrap_or("").is_empty() {
            return Err(ConfigError::MissingStackName);
        }
        if let Some(dir) = &self.working_dir {
            if !dir.is_dir() {
                return Err(ConfigError::MissingWorkingDir(dir.clone()));
            }
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

fn string_env() -> Figment {
    STRING_ENV_KEYS
        .iter()
        .fold(Figment::new(), |figment, key| {
            match std::env::var(format!("{ENV_PREFIX}{}", key.to_ascii_uppercase())) {
                Ok(value) => figment.merge(Serialized::default(key, value)),
                Err(_) => figment,
            }
        })
}
