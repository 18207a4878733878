//! Image reference construction and patching.

use std::fmt;

use bollard::models::{ServiceSpec, TaskSpec, TaskSpecContainerSpec};
use serde_yaml::{Mapping, Value};

/// A fully qualified image reference: `registry/image[:tag]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference(String);

impl ImageReference {
    /// Builds the reference under the trusted registry.  An empty tag is
    /// treated the same as no tag.
    pub fn new(registry: &str, image: &str, tag: Option<&str>) -> Self {
        let mut reference = format!("{registry}/{image}");
        if let Some(tag) = tag.filter(|t| !t.is_empty()) {
            reference.push(':');
            reference.push_str(tag);
        }
        Self(reference)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A deploy target whose image field can be replaced in place.
///
/// Implementations touch only the image field.  Applying the same
/// reference twice leaves the target identical to applying it once.
pub trait PatchImage {
    fn set_image(&mut self, reference: &ImageReference);
}

/// Swarm service spec: `TaskTemplate.ContainerSpec.Image`.
impl PatchImage for ServiceSpec {
    fn set_image(&mut self, reference: &ImageReference) {
        let container = self
            .task_template
            .get_or_insert_with(TaskSpec::default)
            .container_spec
            .get_or_insert_with(TaskSpecContainerSpec::default);
        container.image = Some(reference.to_string());
    }
}

/// Compose/stack service entry.  An existing `image` key keeps its
/// position in the mapping.
impl PatchImage for Mapping {
    fn set_image(&mut self, reference: &ImageReference) {
        self.insert(
            Value::String("image".into()),
            Value::String(reference.to_string()),
        );
    }
}
