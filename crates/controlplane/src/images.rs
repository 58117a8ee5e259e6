//! Image reference resolution against an image vector file.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use trellis_core::{Error, KubernetesVersion, Result, Values};

/// Resolves image names to references and writes them under `images.<key>`.
pub trait ImageResolver: Send + Sync {
    /// `names` pairs a values key with the image name to look up.
    fn resolve(&self, values: Values, target: &KubernetesVersion, names: &[(&str, &str)]) -> Result<Values>;
}

/// One image vector entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSource {
    pub name: String,
    pub repository: String,
    /// Tagless entries follow the target Kubernetes version (`v<version>`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// `major.minor` versions this entry applies to; empty means all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub versions: Vec<String>,
}

impl ImageSource {
    fn applies_to(&self, target: &KubernetesVersion) -> bool {
        self.versions.is_empty() || self.versions.iter().any(|v| v.trim_start_matches('v') == target.major_minor())
    }

    pub fn reference(&self, target: &KubernetesVersion) -> String {
        match &self.tag {
            Some(tag) => format!("{}:{}", self.repository, tag),
            None => format!("{}:v{}", self.repository, target),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ImageVectorFile {
    images: Vec<ImageSource>,
}

/// Ordered list of image sources; the first applicable entry for a name wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageVector {
    images: Vec<ImageSource>,
}

impl ImageVector {
    pub fn new(images: Vec<ImageSource>) -> Self {
        Self { images }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading image vector {}: {}", path.display(), e)))?;
        let file: ImageVectorFile = serde_yaml::from_str(&text)
            .map_err(|e| Error::Config(format!("parsing image vector {}: {}", path.display(), e)))?;
        debug!(path = %path.display(), images = file.images.len(), "image vector loaded");
        Ok(Self::new(file.images))
    }

    pub fn find(&self, name: &str, target: &KubernetesVersion) -> Result<&ImageSource> {
        self.images.iter().find(|i| i.name == name && i.applies_to(target)).ok_or_else(|| Error::Image {
            name: name.to_string(),
            message: format!("no image vector entry for kubernetes {}", target),
        })
    }
}

impl ImageResolver for ImageVector {
    fn resolve(&self, mut values: Values, target: &KubernetesVersion, names: &[(&str, &str)]) -> Result<Values> {
        let mut images = match values.remove("images") {
            Some(Value::Object(m)) => m,
            _ => Values::new(),
        };
        for (key, name) in names {
            let reference = self.find(name, target)?.reference(target);
            images.insert((*key).to_string(), Value::String(reference));
        }
        values.insert("images".to_string(), Value::Object(images));
        Ok(values)
    }
}
