//! Step: provision runtime directories.
//!
//! Ensures each declared directory exists under the image working directory.
//! Idempotent: directories that already exist (including ones the source
//! copy brought in) are not an error.

use super::{log_step_error, step_start};
use crate::build::types::{BuildCtx, commit_layer};
use crate::errors::{ShipwrightError, ShipwrightResult};
use crate::pipeline::SequencerStep;
use async_trait::async_trait;

pub const STEP_NAME: &str = "provision_runtime_dirs";

pub struct RuntimeDirsStep;

#[async_trait]
impl SequencerStep<BuildCtx> for RuntimeDirsStep {
    async fn run(self: Box<Self>, ctx: BuildCtx) -> ShipwrightResult<()> {
        let step_name = self.name();
        let build_id = step_start(&ctx, step_name).await;

        let (dirs, workdir, slot) = {
            let ctx = ctx.lock().await;
            let dirs = ctx.spec.profile_runtime_dirs();
            let digest = dirs
                .iter()
                .map(|d| d.to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("\n");
            let slot = ctx.resolve_layer(step_name, &digest);
            (dirs, ctx.staged_workdir(), slot)
        };

        // Always applied, cached or not: create_dir_all is idempotent and
        // the source swap may have removed directories a prior build made.
        for dir in &dirs {
            let target = workdir.join(dir);
            std::fs::create_dir_all(&target)
                .map_err(|e| {
                    ShipwrightError::Storage(format!(
                        "failed to create runtime directory {}: {}",
                        target.display(),
                        e
                    ))
                })
                .inspect_err(|e| log_step_error(&build_id, step_name, e))?;
        }

        let mut ctx = ctx.lock().await;
        commit_layer(&mut ctx, step_name, slot);
        Ok(())
    }

    fn name(&self) -> &str {
        STEP_NAME
    }
}
