//! Step: install the dependency manager.
//!
//! Runs the remote installer command, then extends the image environment's
//! `PATH` with the tool's bin directory so later steps can invoke it.
//! The `PATH` extension happens on cache hits too: it is part of the image
//! environment, not a side effect of running the installer.

use super::{log_step_error, step_start};
use crate::build::types::{BuildCtx, commit_layer};
use crate::errors::{ShipwrightError, ShipwrightResult, ToolExit};
use crate::pipeline::SequencerStep;
use crate::runner::Invocation;
use async_trait::async_trait;

pub const STEP_NAME: &str = "install_toolchain";

pub struct ToolchainStep;

#[async_trait]
impl SequencerStep<BuildCtx> for ToolchainStep {
    async fn run(self: Box<Self>, ctx: BuildCtx) -> ShipwrightResult<()> {
        let step_name = self.name();
        let build_id = step_start(&ctx, step_name).await;

        let (invocation, slot, runner, bin_dir) = {
            let ctx = ctx.lock().await;
            let toolchain = &ctx.spec.toolchain;

            let mut digest = toolchain.installer.program.clone();
            digest.push('\n');
            digest.push_str(&toolchain.installer.args.join(" "));
            digest.push('\n');
            digest.push_str(&toolchain.bin_dir.to_string_lossy());

            let slot = ctx.resolve_layer(step_name, &digest);
            let invocation = Invocation::new(&toolchain.installer.program)
                .args(toolchain.installer.args.iter().cloned())
                .env(ctx.env.clone());
            (invocation, slot, ctx.runner.clone(), toolchain.bin_dir.clone())
        };

        if !slot.cached {
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

        let mut ctx = ctx.lock().await;
        ctx.env.extend_path(bin_dir.to_string_lossy());
        commit_layer(&mut ctx, step_name, slot);
        Ok(())
    }

    fn name(&self) -> &str {
        STEP_NAME
    }
}
