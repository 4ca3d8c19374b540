//! Image build orchestration.
//!
//! ## Architecture
//!
//! The build is table-driven, one step per operation of the build contract:
//!
//! ```text
//! 1. ProvisionRuntime      (system packages)
//! 2. Toolchain             (dependency manager install + PATH)
//! 3. Dependencies          (lock check, dependency-only install)
//! 4. SourceCopy            (full tree, after dependencies)
//! 5. RuntimeDirs           (idempotent directory provisioning)
//! 6. NetworkContract       (declared port, metadata only)
//! ```
//!
//! Each step yields a layer whose cache key chains over its parent's, so
//! the recorded chain encodes the cache-dependency edges: a changed input
//! re-runs its own step and every later one, never an earlier one.
//!
//! `CleanupGuard` provides RAII cleanup on failure - a failed build leaves
//! no staged image behind.

mod steps;
mod types;

pub use steps::{
    DependenciesStep, NetworkContractStep, ProvisionRuntimeStep, RuntimeDirsStep, SourceCopyStep,
    ToolchainStep,
};
pub use types::{BuildContext, BuildCtx, CleanupGuard};

use crate::config::{BuildProfile, BuildSpec};
use crate::errors::{ShipwrightError, ShipwrightResult};
use crate::image::ImageManifest;
use crate::layout::HomeLayout;
use crate::pipeline::{BoxedStep, ExecutionPlan, SequenceExecutor, SequenceMetrics};
use crate::runner::ToolRunner;
use crate::store::BuildStore;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use ulid::Ulid;

fn execution_plan() -> ExecutionPlan<BuildCtx> {
    let steps: Vec<BoxedStep<BuildCtx>> = vec![
        Box::new(ProvisionRuntimeStep),
        Box::new(ToolchainStep),
        Box::new(DependenciesStep),
        Box::new(SourceCopyStep),
        Box::new(RuntimeDirsStep),
        Box::new(NetworkContractStep),
    ];
    ExecutionPlan::new(steps)
}

/// Builds a runnable image from a `BuildSpec`.
pub struct ImageBuilder {
    home: HomeLayout,
    store: BuildStore,
    runner: Arc<dyn ToolRunner>,
}

impl ImageBuilder {
    pub fn new(home: HomeLayout, store: BuildStore, runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            home,
            store,
            runner,
        }
    }

    /// Run the whole build sequence and persist the image manifest.
    ///
    /// On any step failure the staged image and its layer cache are removed
    /// and the build is recorded as failed; the error of the first failing
    /// step propagates unchanged.
    pub async fn build(&self, spec: BuildSpec) -> ShipwrightResult<ImageManifest> {
        spec.sanitize()?;

        let build_id = Ulid::new().to_string();
        let image = self.home.image_layout(&spec.name);
        let profile = match spec.profile {
            BuildProfile::Production => "production",
            BuildProfile::Development => "development",
        };

        tracing::info!(build_id = %build_id, image = %spec.name, profile, "build starting");

        // Prior layer keys are only usable when the prior staging survives.
        let cached_keys = if image.manifest_path().exists() {
            self.store.cached_layer_keys(&spec.name)?
        } else {
            HashMap::new()
        };

        image.prepare()?;
        self.store
            .record_build_started(&build_id, &spec.name, profile)?;

        let guard = CleanupGuard::new(
            self.store.clone(),
            build_id.clone(),
            spec.name.clone(),
            image.clone(),
        );
        let env = spec.build_environment();
        let ctx = BuildContext {
            spec,
            build_id: build_id.clone(),
            home: self.home.clone(),
            image: image.clone(),
            runner: Arc::clone(&self.runner),
            store: self.store.clone(),
            env,
            cached_keys,
            layers: Vec::new(),
            locked: None,
            guard,
        };
        let ctx = Arc::new(Mutex::new(ctx));

        let metrics = SequenceExecutor::execute(execution_plan(), Arc::clone(&ctx)).await?;
        log_step_timings(&metrics);

        let mut ctx = ctx.lock().await;
        let manifest = assemble_manifest(&ctx, &build_id)?;
        manifest.save(&image.manifest_path())?;
        self.store
            .replace_layers(&manifest.name, &build_id, &manifest.layers)?;
        self.store.mark_build(&build_id, "succeeded")?;
        ctx.guard.disarm();

        tracing::info!(
            build_id = %build_id,
            image = %manifest.name,
            layers = manifest.layers.len(),
            total_ms = metrics.total_duration_ms,
            "build succeeded"
        );

        Ok(manifest)
    }
}

fn assemble_manifest(ctx: &BuildContext, build_id: &str) -> ShipwrightResult<ImageManifest> {
    if ctx.locked.is_none() {
        return Err(ShipwrightError::Internal(
            "dependencies step did not run".into(),
        ));
    }
    Ok(ImageManifest {
        name: ctx.spec.name.clone(),
        build_id: build_id.to_string(),
        created_at: Utc::now(),
        layers: ctx.layers.clone(),
        env: ctx.env.clone(),
        workdir: ctx.spec.workdir.clone(),
        exposed_port: ctx.spec.port,
        migrate: ctx.spec.boot.migrate.clone(),
        serve: ctx.spec.boot.serve.clone(),
    })
}

fn log_step_timings(metrics: &SequenceMetrics) {
    for step in &metrics.steps {
        tracing::debug!(step = %step.name, duration_ms = step.duration_ms, "step finished");
    }
}
