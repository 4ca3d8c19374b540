//! Generic step trait for sequence execution.

use crate::errors::ShipwrightResult;
use async_trait::async_trait;

/// One atomic unit of work in a sequence.
///
/// Steps run with a shared context, which is cloned per step.
#[async_trait]
pub trait SequencerStep<Ctx>: Send + Sync {
    /// Execute the step with the shared sequence context.
    async fn run(self: Box<Self>, ctx: Ctx) -> ShipwrightResult<()>;

    /// Human-readable step name for logging and metrics.
    fn name(&self) -> &str;
}

pub type BoxedStep<Ctx> = Box<dyn SequencerStep<Ctx>>;
