//! HTTP front end.
//!
//! A single authenticated endpoint, `POST /update`, plus an
//! unauthenticated `GET /health` for container probes.  Handlers share only
//! immutable state; every request is handled independently.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::rejection::FormRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Form, Router};
use log::{error, info, warn};
use tokio::net::TcpListener;
use tokio::signal;

use crate::auth::TokenAuthenticator;
use crate::deploy::Deployer;
use crate::error::DeployError;
use crate::report::status_for;
use crate::types::{DeployOutcome, UpdateForm};

pub const REGISTRY_AUTH_HEADER: &str = "x-registry-auth";

#[derive(Clone)]
pub struct AppState {
    authenticator: Arc<TokenAuthenticator>,
    deployer: Arc<dyn Deployer>,
}

impl AppState {
    pub fn new(authenticator: TokenAuthenticator, deployer: Arc<dyn Deployer>) -> Self {
        Self {
            authenticator: Arc::new(authenticator),
            deployer,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/update", post(update))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<Vec<(String, String)>>, FormRejection>,
) -> Result<DeployOutcome, DeployError> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if !state.authenticator.authorize(authorization) {
        warn!("Rejected unauthorized update request");
        return Err(DeployError::Unauthorized);
    }

    // An undecodable body is handled like an empty one, so the caller is
    // told which field is missing.
    let form: UpdateForm = form
        .map(|Form(pairs)| pairs.into_iter().collect())
        .unwrap_or_default();
    let registry_auth = headers
        .get(REGISTRY_AUTH_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let result = match form.into_request(registry_auth) {
        Ok(request) => {
            info!(
                "Update requested: service={} image={} tag={}",
                request.service,
                request.image,
                request.tag.as_deref().unwrap_or("")
            );
            state.deployer.deploy(request).await
        }
        Err(err) => Err(err),
    };

    if let Err(err) = &result {
        if status_for(err).is_server_error() {
            error!("{}", err);
        } else {
            warn!("{}", err);
        }
    }
    result
}

/// Serves until Ctrl+C.
pub async fn serve(address: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    info!("Starting deploy agent at [{}]", address);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Shutdown complete.");
    Ok(())
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down..."),
        Err(err) => error!("Unable to listen for shutdown signal: {}", err),
    }
}
