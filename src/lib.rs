//! Deploy agent: updates a running swarm service, Compose project or stack
//! to a new image when an authenticated CI job asks it to.

pub mod auth;
pub mod config;
pub mod deploy;
pub mod error;
pub mod image;
pub mod manifest;
pub mod report;
pub mod resolve;
pub mod runtime;
pub mod server;
pub mod types;
