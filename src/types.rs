//! Data structures passed between the HTTP layer and the deployers.
//!
//! Everything here lives for a single request.  Nothing is shared
//! between requests apart from the immutable configuration.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use bollard::auth::DockerCredentials;
use serde_json::Value;
use thiserror::Error;

use crate::error::DeployError;

/// Form body of `POST /update`.  Fields are optional here so that a
/// missing field produces a message naming it instead of a generic
/// decoding error.
#[derive(Debug, Default)]
pub struct UpdateForm {
    pub service: Option<String>,
    pub image: Option<String>,
    pub tag: Option<String>,
}

/// Builds the form from decoded `key=value` pairs.  A repeated key keeps
/// its first value; unknown keys are ignored.
impl FromIterator<(String, String)> for UpdateForm {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(pairs: I) -> Self {
        let mut form = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "service" => &mut form.service,
                "image" => &mut form.image,
                "tag" => &mut form.tag,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        form
    }
}

impl UpdateForm {
    /// `registry_auth` is the raw `X-Registry-Auth` header, kept as sent.
    pub fn into_request(self, registry_auth: Option<String>) -> Result<UpdateRequest, DeployError> {
        let service = required(self.service, "service")?;
        let image = required(self.image, "image")?;
        Ok(UpdateRequest {
            service,
            image,
            tag: self.tag.filter(|t| !t.is_empty()),
            registry_auth: registry_auth.filter(|a| !a.trim().is_empty()),
        })
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, DeployError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(DeployError::MissingParameter(field))
}

/// A validated update request.
#[derive(Debug)]
pub struct UpdateRequest {
    pub service: String,
    pub image: String,
    pub tag: Option<String>,
    /// Opaque registry credentials.  Only the swarm strategy looks inside.
    pub registry_auth: Option<String>,
}

/// Result of a successful deploy, relayed to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    /// Direct service update.  Engine warnings are informational.
    ServiceUpdated { warnings: Vec<String> },
    /// Redeploy command finished; `output` is its combined output as raw
    /// bytes.
    ManifestDeployed { output: Vec<u8> },
}

impl DeployOutcome {
    pub fn body(self) -> Vec<u8> {
        match self {
            Self::ServiceUpdated { warnings } if warnings.is_empty() => Vec::new(),
            Self::ServiceUpdated { warnings } => {
                let mut body = String::from("Warnings:\n");
                for warning in warnings {
                    body.push_str(&warning);
                    body.push('\n');
                }
                body.into_bytes()
            }
            Self::ManifestDeployed { output } => output,
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryAuthError {
    #[error("not valid base64")]
    Base64,

    #[error("not a credentials object: {0}")]
    Json(#[from] serde_json::Error),
}

/// Registry credentials carried in `X-Registry-Auth`: base64 encoded JSON,
/// as produced by the Docker CLI.
#[derive(Debug, Clone)]
pub struct RegistryAuth(DockerCredentials);

impl RegistryAuth {
    pub fn new(credentials: DockerCredentials) -> Self {
        Self(credentials)
    }

    /// Decodes a header value.  An empty value means no credentials.
    /// Both the URL-safe and the standard alphabet are accepted, with or
    /// without padding.  Keys match case-insensitively, as the engine
    /// matches them (`Username` and `username` are the same field).
    pub fn decode(header: &str) -> Result<Option<Self>, RegistryAuthError> {
        let header = header.trim();
        if header.is_empty() {
            return Ok(None);
        }
        let bytes = [URL_SAFE, URL_SAFE_NO_PAD, STANDARD, STANDARD_NO_PAD]
            .iter()
            .find_map(|engine| engine.decode(header).ok())
            .ok_or(RegistryAuthError::Base64)?;
        let value = match serde_json::from_slice(&bytes)? {
            Value::Object(fields) => Value::Object(
                fields
                    .into_iter()
                    .map(|(key, value)| (key.to_ascii_lowercase(), value))
                    .collect(),
            ),
            other => other,
        };
        Ok(Some(Self(serde_json::from_value(value)?)))
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        Ok(URL_SAFE.encode(serde_json::to_vec(&self.0)?))
    }

    #[cfg(test)]
    pub(crate) fn credentials(&self) -> &DockerCredentials {
        &self.0
    }

    pub fn into_credentials(self) -> DockerCredentials {
        self.0
    }
}
