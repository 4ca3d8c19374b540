//! Shared build pipeline context and cleanup guard.

use crate::config::BuildSpec;
use crate::env::Environment;
use crate::image::LayerRecord;
use crate::layout::{HomeLayout, ImageLayout};
use crate::manifest::{LockedManifest, hex_sha256};
use crate::runner::ToolRunner;
use crate::store::BuildStore;
use std::collections::HashMap;
use std::sync::Arc;

/// RAII guard for cleanup on build failure.
///
/// If dropped while armed, the partially staged image and its recorded layer
/// chain are removed and the build row is marked failed - a failed build
/// must not leave an image behind.
pub struct CleanupGuard {
    store: BuildStore,
    build_id: String,
    image_name: String,
    image: ImageLayout,
    armed: bool,
}

impl CleanupGuard {
    pub fn new(store: BuildStore, build_id: String, image_name: String, image: ImageLayout) -> Self {
        Self {
            store,
            build_id,
            image_name,
            image,
            armed: true,
        }
    }

    /// Disarm the guard (call on success).
    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        tracing::warn!(build_id = %self.build_id, image = %self.image_name, "build failed, cleaning up staged image");

        if let Err(e) = self.image.cleanup() {
            tracing::warn!("failed to remove staged image during cleanup: {}", e);
        }
        if let Err(e) = self.store.replace_layers(&self.image_name, &self.build_id, &[]) {
            tracing::warn!("failed to clear layer cache during cleanup: {}", e);
        }
        if let Err(e) = self.store.mark_build(&self.build_id, "failed") {
            tracing::warn!("failed to mark build as failed: {}", e);
        }
    }
}

/// Shared build pipeline context.
///
/// Steps read their inputs under the lock, do their work, and write their
/// layer record back.
pub struct BuildContext {
    pub spec: BuildSpec,
    pub build_id: String,
    pub home: HomeLayout,
    pub image: ImageLayout,
    pub runner: Arc<dyn ToolRunner>,
    pub store: BuildStore,
    /// Environment being assembled for the image; the toolchain step
    /// extends its `PATH`.
    pub env: Environment,
    /// Layer keys of the previous successful build of this image,
    /// empty when there is no usable prior staging.
    pub cached_keys: HashMap<String, String>,
    /// Layers produced so far, in build order.
    pub layers: Vec<LayerRecord>,
    /// Set by the dependencies step after lock validation.
    pub locked: Option<LockedManifest>,
    pub guard: CleanupGuard,
}

impl BuildContext {
    /// Cache key for the next layer: chained over the previous layer's key
    /// so editing any earlier input invalidates every later layer.
    pub fn next_layer_key(&self, step_name: &str, input_digest: &str) -> (String, Option<String>) {
        let parent = self.layers.last().map(|l| l.key.clone());
        let mut seed = String::new();
        if let Some(parent) = &parent {
            seed.push_str(parent);
        }
        seed.push('\n');
        seed.push_str(step_name);
        seed.push('\n');
        seed.push_str(input_digest);
        (hex_sha256(seed.as_bytes()), parent)
    }

    /// A layer may be reused only when its chained key matches the recorded
    /// one; a key match implies every ancestor layer matched too.
    pub fn layer_is_cached(&self, step_name: &str, key: &str) -> bool {
        self.cached_keys.get(step_name).map(String::as_str) == Some(key)
    }

    pub fn push_layer(&mut self, step_name: &str, key: String, parent: Option<String>, cached: bool) {
        self.layers.push(LayerRecord {
            name: step_name.to_string(),
            key,
            parent,
            cached,
        });
    }

    /// Staged path of the image working directory.
    pub fn staged_workdir(&self) -> std::path::PathBuf {
        self.image.staged_path(&self.spec.workdir)
    }

    /// Decide cache-or-run for one step. The caller runs the step's work on
    /// a miss, then records the slot with [`commit_layer`].
    pub fn resolve_layer(&self, step_name: &str, input_digest: &str) -> LayerSlot {
        let (key, parent) = self.next_layer_key(step_name, input_digest);
        let cached = self.layer_is_cached(step_name, &key);
        LayerSlot {
            key,
            parent,
            cached,
        }
    }
}

pub type BuildCtx = Arc<tokio::sync::Mutex<BuildContext>>;

/// Pending layer record for a step that has been resolved against the cache.
pub struct LayerSlot {
    pub key: String,
    pub parent: Option<String>,
    pub cached: bool,
}

/// Log and record a completed step's layer.
pub fn commit_layer(ctx: &mut BuildContext, step_name: &str, slot: LayerSlot) {
    if slot.cached {
        tracing::info!(step = step_name, "layer cache hit, step skipped");
    } else {
        tracing::info!(step = step_name, "layer built");
    }
    ctx.push_layer(step_name, slot.key, slot.parent, slot.cached);
}

