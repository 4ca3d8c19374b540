//! Image manifest: the durable output of a build.
//!
//! The manifest records the ordered layers (with their cache keys and parent
//! edges), the environment baked into the image, the working directory, the
//! declared network contract, and the migrate/serve commands the boot
//! sequencer replays. Layer order is part of the contract: dependency layers
//! precede the source layer, and that is inspectable here.

use crate::config::CommandSpec;
use crate::env::Environment;
use crate::errors::{ShipwrightError, ShipwrightResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One cacheable build layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerRecord {
    /// Step name that produced the layer (e.g. "install_dependencies").
    pub name: String,
    /// Cache key: sha256 over the parent key, the step name, and the step's
    /// input digest. The parent chain forms the cache-dependency edges.
    pub key: String,
    /// Key of the preceding layer; `None` for the first layer.
    pub parent: Option<String>,
    /// Whether this build reused the layer instead of re-running its step.
    pub cached: bool,
}

/// Build output consumed by the boot sequencer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageManifest {
    pub name: String,
    /// ULID of the build that produced this manifest.
    pub build_id: String,
    pub created_at: DateTime<Utc>,
    /// Layers in build order.
    pub layers: Vec<LayerRecord>,
    /// Environment record applied to every process started in the image.
    pub env: Environment,
    /// Working directory inside the image (`/usr/app`).
    pub workdir: PathBuf,
    /// Declared TCP port. Metadata only; nothing is bound at build time.
    pub exposed_port: u16,
    pub migrate: CommandSpec,
    pub serve: CommandSpec,
}

impl ImageManifest {
    pub fn save(&self, path: &Path) -> ShipwrightResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ShipwrightError::Internal(format!("manifest serialization: {}", e)))?;
        std::fs::write(path, json).map_err(|e| {
            ShipwrightError::Storage(format!(
                "failed to write manifest {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(())
    }

    pub fn load(path: &Path) -> ShipwrightResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ShipwrightError::Storage(format!(
                "failed to read manifest {}: {}",
                path.display(),
                e
            ))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            ShipwrightError::Config(format!("invalid manifest {}: {}", path.display(), e))
        })
    }

    /// Layer names in build order. Dependency layers appear before the
    /// source layer; callers may assert on this ordering.
    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.name.as_str()).collect()
    }

    pub fn layer(&self, name: &str) -> Option<&LayerRecord> {
        self.layers.iter().find(|l| l.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> ImageManifest {
        ImageManifest {
            name: "api".into(),
            build_id: "01J0000000000000000000000".into(),
            created_at: Utc::now(),
            layers: vec![
                LayerRecord {
                    name: "install_dependencies".into(),
                    key: "aa".into(),
                    parent: None,
                    cached: false,
                },
                LayerRecord {
                    name: "copy_source".into(),
                    key: "bb".into(),
                    parent: Some("aa".into()),
                    cached: false,
                },
            ],
            env: [("PYTHONUNBUFFERED", "1")].into_iter().collect(),
            workdir: PathBuf::from("/usr/app"),
            exposed_port: 8000,
            migrate: CommandSpec::new("alembic", ["upgrade", "head"]),
            serve: CommandSpec::new("uvicorn", ["app.main:app"]),
        }
    }

    #[test]
    fn manifest_round_trips_through_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.json");
        let manifest = sample();
        manifest.save(&path).unwrap();

        let loaded = ImageManifest::load(&path).unwrap();
        assert_eq!(loaded.layer_names(), manifest.layer_names());
        assert_eq!(loaded.exposed_port, 8000);
        assert_eq!(loaded.layers[1].parent.as_deref(), Some("aa"));
    }

    #[test]
    fn layer_lookup_by_name() {
        let manifest = sample();
        assert!(manifest.layer("copy_source").is_some());
        assert!(manifest.layer("missing").is_none());
    }
}
