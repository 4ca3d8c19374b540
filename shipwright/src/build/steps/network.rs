//! Step: declare the network contract.
//!
//! Records the TCP port the service will accept connections on. Metadata
//! only - nothing is bound until the boot sequence launches the service.

use super::step_start;
use crate::build::types::{BuildCtx, commit_layer};
use crate::errors::ShipwrightResult;
use crate::pipeline::SequencerStep;
use async_trait::async_trait;

pub const STEP_NAME: &str = "declare_network";

pub struct NetworkContractStep;

#[async_trait]
impl SequencerStep<BuildCtx> for NetworkContractStep {
    async fn run(self: Box<Self>, ctx: BuildCtx) -> ShipwrightResult<()> {
        let step_name = self.name();
        let _build_id = step_start(&ctx, step_name).await;

        let mut ctx = ctx.lock().await;
        let slot = ctx.resolve_layer(step_name, &ctx.spec.port.to_string());
        tracing::info!(port = ctx.spec.port, "declared network contract");
        commit_layer(&mut ctx, step_name, slot);
        Ok(())
    }

    fn name(&self) -> &str {
        STEP_NAME
    }
}
