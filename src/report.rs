//! Maps deploy outcomes and errors to HTTP responses.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::error::DeployError;
use crate::types::DeployOutcome;

pub fn status_for(err: &DeployError) -> StatusCode {
    match err {
        DeployError::Unauthorized => StatusCode::UNAUTHORIZED,
        err if err.is_client_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for DeployError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        match self {
            // Never say why.
            DeployError::Unauthorized => status.into_response(),
            DeployError::CommandFailed { output, status: exit } => {
                plain_text(status, relayed("Deploy failed: \n", output, &exit))
            }
            DeployError::SelfTestFailed { output, status: exit } => plain_text(
                status,
                relayed("Orchestrator self-test failed: \n", output, &exit),
            ),
            err => plain_text(status, err.to_string().into_bytes()),
        }
    }
}

impl IntoResponse for DeployOutcome {
    fn into_response(self) -> Response {
        plain_text(StatusCode::OK, self.body())
    }
}

/// Command output goes out byte for byte; it need not be UTF-8.
fn relayed(prefix: &str, output: Vec<u8>, exit: &str) -> Vec<u8> {
    let mut body = Vec::with_capacity(prefix.len() + output.len() + exit.len());
    body.extend_from_slice(prefix.as_bytes());
    body.extend(output);
    body.extend_from_slice(exit.as_bytes());
    body
}

fn plain_text(status: StatusCode, body: Vec<u8>) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}
