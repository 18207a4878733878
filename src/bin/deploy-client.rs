//! CI-side client for the deploy agent.
//!
//! Sends one `POST /update` and prints whatever the agent answers.  Exits
//! non-zero when the agent reports a failure.

use anyhow::{bail, Context};
use bollard::auth::DockerCredentials;
use clap::Parser;

use deploy_agent::server::REGISTRY_AUTH_HEADER;
use deploy_agent::types::RegistryAuth;

#[derive(Debug, Parser)]
#[command(name = "deploy-client", version, about = "Trigger a deploy agent update")]
struct Args {
    /// Agent base url, e.g. https://deploy.example.com
    #[arg(long)]
    url: String,

    /// Service to update
    #[arg(long)]
    service: String,

    /// Image name, without the registry prefix
    #[arg(long)]
    image: String,

    /// Image tag
    #[arg(long, default_value = "")]
    tag: String,

    /// Registry username, forwarded to the orchestrator for private pulls
    #[arg(long, requires = "password")]
    username: Option<String>,

    /// Registry password
    #[arg(long, requires = "username")]
    password: Option<String>,

    /// Agent bearer token
    #[arg(long, env = "DEPLOY_TOKEN", hide_env_values = true)]
    token: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let registry_auth = match (&args.username, &args.password) {
        (Some(username), Some(password)) => Some(
            RegistryAuth::new(DockerCredentials {
                username: Some(username.clone()),
                password: Some(password.clone()),
                ..Default::default()
            })
            .encode()
            .context("failed to encode registry credentials")?,
        ),
        _ => None,
    };

    let endpoint = format!("{}/update", args.url.trim_end_matches('/'));
    log::debug!("Posting update for {} to {}", args.service, endpoint);

    let mut request = reqwest::Client::new()
        .post(&endpoint)
        .bearer_auth(&args.token)
        .form(&[
            ("service", args.service.as_str()),
            ("image", args.image.as_str()),
            ("tag", args.tag.as_str()),
        ]);
    if let Some(auth) = registry_auth {
        request = request.header(REGISTRY_AUTH_HEADER, auth);
    }

    let response = request
        .send()
        .await
        .with_context(|| format!("Request to {endpoint} failed"))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .context("failed to read response body")?;

    print!("{body}");
    if !status.is_success() {
        bail!("deploy agent answered {status}");
    }
    Ok(())
}
