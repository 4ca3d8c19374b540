//! Step: provision the base runtime.
//!
//! Installs the declared system packages (compiler toolchain, transfer
//! utility) via the package installer. A non-zero exit is fatal to the
//! build; nothing downstream can use a partially provisioned runtime.

use super::{log_step_error, step_start};
use crate::build::types::{BuildCtx, commit_layer};
use crate::errors::{ShipwrightError, ShipwrightResult, ToolExit};
use crate::pipeline::SequencerStep;
use crate::runner::Invocation;
use async_trait::async_trait;

pub const STEP_NAME: &str = "provision_runtime";

pub struct ProvisionRuntimeStep;

#[async_trait]
impl SequencerStep<BuildCtx> for ProvisionRuntimeStep {
    async fn run(self: Box<Self>, ctx: BuildCtx) -> ShipwrightResult<()> {
        let step_name = self.name();
        let build_id = step_start(&ctx, step_name).await;

        let (invocation, slot, runner) = {
            let ctx = ctx.lock().await;
            let packages = ctx.spec.provision_packages();
            let installer = &ctx.spec.provision.installer;

            let mut digest = installer.program.clone();
            digest.push('\n');
            digest.push_str(&installer.args.join(" "));
            digest.push('\n');
            digest.push_str(&packages.join(" "));

            let slot = ctx.resolve_layer(step_name, &digest);
            let invocation = Invocation::new(&installer.program)
                .args(installer.args.iter().cloned())
                .args(packages)
                .env(ctx.env.clone());
            (invocation, slot, ctx.runner.clone())
        };

        if !slot.cached {
            let code = runner
                .run(&invocation)
                .await
                .inspect_err(|e| log_step_error(&build_id, step_name, e))?;
            if code != Some(0) {
                let err =
                    ShipwrightError::Provision(ToolExit::new(invocation.display_name(), code));
                log_step_error(&build_id, step_name, &err);
                return Err(err);
            }
        }

        let mut ctx = ctx.lock().await;
        commit_layer(&mut ctx, step_name, slot);
        Ok(())
    }

    fn name(&self) -> &str {
        STEP_NAME
    }
}
