//! Deploy strategies.
//!
//! One strategy is picked at startup from
//! [`DeployMode`](crate::config::DeployMode):
//!
//! * [`SwarmDeployer`] updates a swarm service in place through the engine
//!   API, forwarding registry credentials and relaying engine warnings.
//! * [`ManifestDeployer`] patches a Compose/stack file in memory and pipes
//!   it into `docker-compose up` or `docker stack deploy`.

use async_trait::async_trait;

use crate::error::DeployError;
use crate::types::{DeployOutcome, UpdateRequest};

pub mod manifest;
pub mod swarm;

pub use manifest::{ManifestDeployer, ManifestSettings};
pub use swarm::SwarmDeployer;

#[async_trait]
pub trait Deployer: Send + Sync {
    /// One-time check run before the server accepts requests.  A failure
    /// here aborts startup.
    async fn self_test(&self) -> Result<(), DeployError>;

    /// Applies one update request.  Every failure is reported once; there
    /// are no retries.
    async fn deploy(&self, request: UpdateRequest) -> Result<DeployOutcome, DeployError>;
}
