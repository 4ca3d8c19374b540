//! Step: resolve and install dependencies.
//!
//! Validates the manifest/lock pair first - an inconsistent or missing lock
//! fails here, deterministically, before the dependency tool is invoked.
//! On a cache miss the manifest and lock are staged into the image working
//! directory and the dependency-only install runs there.

use super::{log_step_error, step_start};
use crate::build::types::{BuildCtx, commit_layer};
use crate::config::CommandSpec;
use crate::errors::{ShipwrightError, ShipwrightResult, ToolExit};
use crate::manifest::LockedManifest;
use crate::pipeline::SequencerStep;
use crate::runner::Invocation;
use async_trait::async_trait;
use std::path::Path;

pub const STEP_NAME: &str = "install_dependencies";

pub struct DependenciesStep;

#[async_trait]
impl SequencerStep<BuildCtx> for DependenciesStep {
    async fn run(self: Box<Self>, ctx: BuildCtx) -> ShipwrightResult<()> {
        let step_name = self.name();
        let build_id = step_start(&ctx, step_name).await;

        let (locked, installs, slot, runner, workdir, manifest_src, lock_src, env) = {
            let ctx = ctx.lock().await;
            let deps = &ctx.spec.dependencies;
            let manifest_src = ctx.spec.source_dir.join(&deps.manifest);
            let lock_src = ctx.spec.source_dir.join(&deps.lockfile);

            // Lock consistency gates the whole step; a stale lock must never
            // silently re-resolve a different dependency set.
            let locked = LockedManifest::load(&manifest_src, &lock_src)
                .inspect_err(|e| log_step_error(&build_id, step_name, e))?;

            let mut installs = vec![deps.install.clone()];
            if ctx.spec.profile == crate::config::BuildProfile::Development
                && let Some(dev_install) = &deps.dev_install
            {
                installs.push(dev_install.clone());
            }

            let mut digest = locked.manifest_digest.clone();
            digest.push('\n');
            digest.push_str(&locked.lock_digest);
            for install in &installs {
                digest.push('\n');
                digest.push_str(&install.program);
                digest.push(' ');
                digest.push_str(&install.args.join(" "));
            }

            let slot = ctx.resolve_layer(step_name, &digest);
            (
                locked,
                installs,
                slot,
                ctx.runner.clone(),
                ctx.staged_workdir(),
                manifest_src,
                lock_src,
                ctx.env.clone(),
            )
        };

        if !slot.cached {
            stage_pair(&manifest_src, &lock_src, &workdir)
                .inspect_err(|e| log_step_error(&build_id, step_name, e))?;

            for install in &installs {
                let invocation = build_install_invocation(install, &workdir, &env);
                let code = runner
                    .run(&invocation)
                    .await
                    .inspect_err(|e| log_step_error(&build_id, step_name, e))?;
                if code != Some(0) {
                    let err =
                        ShipwrightError::Dependency(ToolExit::new(invocation.display_name(), code));
                    log_step_error(&build_id, step_name, &err);
                    return Err(err);
                }
            }
        }

        let mut ctx = ctx.lock().await;
        ctx.locked = Some(locked);
        commit_layer(&mut ctx, step_name, slot);
        Ok(())
    }

    fn name(&self) -> &str {
        STEP_NAME
    }
}

/// Copy the manifest/lock pair into the staged working directory so the
/// dependency tool sees exactly the validated files.
fn stage_pair(manifest_src: &Path, lock_src: &Path, workdir: &Path) -> ShipwrightResult<()> {
    std::fs::create_dir_all(workdir).map_err(|e| {
        ShipwrightError::Storage(format!(
            "failed to create staged workdir {}: {}",
            workdir.display(),
            e
        ))
    })?;
    for src in [manifest_src, lock_src] {
        let file_name = src
            .file_name()
            .ok_or_else(|| ShipwrightError::Config(format!("bad path {}", src.display())))?;
        std::fs::copy(src, workdir.join(file_name)).map_err(|e| {
            ShipwrightError::Storage(format!("failed to stage {}: {}", src.display(), e))
        })?;
    }
    Ok(())
}

fn build_install_invocation(
    install: &CommandSpec,
    workdir: &Path,
    env: &crate::env::Environment,
) -> Invocation {
    Invocation::new(&install.program)
        .args(install.args.iter().cloned())
        .env(env.clone())
        .cwd(workdir)
}
