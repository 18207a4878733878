//! Compose/stack manifest documents.
//!
//! The document is kept as an untyped YAML tree so that fields this agent
//! does not know about survive a parse/serialize round trip.  Access to the
//! `services` section goes through fallible accessors that distinguish a
//! missing key from a value of the wrong shape.

use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};
use thiserror::Error;

const SERVICES_KEY: &str = "services";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error: {0}")]
    Parse(#[source] serde_yaml::Error),

    #[error("No services field found in compose file")]
    MissingServices,

    #[error("Invalid services structure")]
    InvalidServices,

    #[error("Invalid service item structure")]
    InvalidServiceItem,

    #[error("Invalid service [{0}]")]
    UnknownService(String),

    #[error("Yaml marshal failed: {0}")]
    Serialize(#[source] serde_yaml::Error),
}

impl ManifestError {
    /// Errors caused by the shape of the document or the requested service
    /// name, as opposed to I/O or codec failures.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::MissingServices
                | Self::InvalidServices
                | Self::InvalidServiceItem
                | Self::UnknownService(_)
        )
    }
}

/// A parsed manifest document.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    root: Value,
}

impl Manifest {
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        let root = serde_yaml::from_str(text).map_err(ManifestError::Parse)?;
        Ok(Self { root })
    }

    /// Reads and parses the file.  Called per request; the file on disk is
    /// the source of truth and is never cached.
    pub async fn load(path: &Path) -> Result<Self, ManifestError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ManifestError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse(&text)
    }

    pub fn services(&self) -> Result<&Mapping, ManifestError> {
        self.root
            .get(SERVICES_KEY)
            .ok_or(ManifestError::MissingServices)?
            .as_mapping()
            .ok_or(ManifestError::InvalidServices)
    }

    fn services_mut(&mut self) -> Result<&mut Mapping, ManifestError> {
        self.root
            .get_mut(SERVICES_KEY)
            .ok_or(ManifestError::MissingServices)?
            .as_mapping_mut()
            .ok_or(ManifestError::InvalidServices)
    }

    /// Resolves the service entry whose key is exactly `name`.
    pub fn service_mut(&mut self, name: &str) -> Result<&mut Mapping, ManifestError> {
        let entry = self
            .services_mut()?
            .iter_mut()
            .find(|(key, _)| key.as_str() == Some(name))
            .map(|(_, value)| value)
            .ok_or_else(|| ManifestError::UnknownService(name.to_string()))?;
        entry
            .as_mapping_mut()
            .ok_or(ManifestError::InvalidServiceItem)
    }

    pub fn to_yaml(&self) -> Result<String, ManifestError> {
        serde_yaml::to_string(&self.root).map_err(ManifestError::Serialize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{ImageReference, PatchImage};

    const COMPOSE: &str = r#"
version: "3.8"
services:
  web:
    image: old
    ports:
      - "80:8080"
    deploy:
      replicas: 2
  db:
    image: x
    environment:
      POSTGRES_DB: app
volumes:
  data: {}
"#;

    fn patch(manifest: &mut Manifest, service: &str) -> Result<(), ManifestError> {
        let reference = ImageReference::new("reg.example.com", "api", Some("v2"));
        manifest.service_mut(service)?.set_image(&reference);
        Ok(())
    }

    #[test]
    fn patches_only_requested_service() {
        let mut manifest = Manifest::parse("services: {web: {image: old}, db: {image: x}}").unwrap();
        patch(&mut manifest, "web").unwrap();

        let expected =
            Manifest::parse("services: {web: {image: reg.example.com/api:v2}, db: {image: x}}")
                .unwrap();
        assert_eq!(manifest, expected);
    }

    #[test]
    fn unknown_service_names_the_service() {
        let mut manifest = Manifest::parse("services: {web: {image: old}, db: {image: x}}").unwrap();
        let err = patch(&mut manifest, "cache").unwrap_err();
        assert!(matches!(err, ManifestError::UnknownService(ref s) if s == "cache"));
        assert!(err.to_string().contains("cache"));
    }

    #[test]
    fn round_trip_changes_only_target_image() {
        let original = Manifest::parse(COMPOSE).unwrap();
        let mut patched = original.clone();
        patch(&mut patched, "web").unwrap();

        let reparsed = Manifest::parse(&patched.to_yaml().unwrap()).unwrap();
        assert_eq!(reparsed, patched);

        let before = original.services().unwrap();
        let after = reparsed.services().unwrap();
        assert_eq!(before["db"], after["db"]);
        assert_eq!(before["web"]["ports"], after["web"]["ports"]);
        assert_eq!(before["web"]["deploy"], after["web"]["deploy"]);
        assert_eq!(after["web"]["image"], Value::from("reg.example.com/api:v2"));
        assert_eq!(original.root["volumes"], reparsed.root["volumes"]);
        assert_eq!(original.root["version"], reparsed.root["version"]);
    }

    #[test]
    fn missing_services_section() {
        let mut manifest = Manifest::parse("version: '3'\n").unwrap();
        assert!(matches!(
            patch(&mut manifest, "web"),
            Err(ManifestError::MissingServices)
        ));
    }

    #[test]
    fn services_must_be_a_mapping() {
        let mut manifest = Manifest::parse("services:\n  - web\n").unwrap();
        assert!(matches!(
            patch(&mut manifest, "web"),
            Err(ManifestError::InvalidServices)
        ));
    }

    #[test]
    fn service_entry_must_be_a_mapping() {
        let mut manifest = Manifest::parse("services:\n  web: nginx\n").unwrap();
        let err = patch(&mut manifest, "web").unwrap_err();
        assert!(matches!(err, ManifestError::InvalidServiceItem));
        assert!(err.is_structural());
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let err = Manifest::parse("services: [unclosed").unwrap_err();
        assert!(matches!(err, ManifestError::Parse(_)));
        assert!(!err.is_structural());
    }

    #[tokio::test]
    async fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Manifest::load(&dir.path().join("absent.yml")).await.unwrap_err();
        assert!(matches!(err, ManifestError::Read { .. }));
    }

    #[tokio::test]
    async fn load_reads_file_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docker-compose.yml");
        std::fs::write(&path, "services: {web: {image: a}}").unwrap();
        assert!(Manifest::load(&path).await.unwrap().services().unwrap().contains_key("web"));

        std::fs::write(&path, "services: {api: {image: b}}").unwrap();
        let services = Manifest::load(&path).await.unwrap();
        assert!(services.services().unwrap().contains_key("api"));
    }
}
