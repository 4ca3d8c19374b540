//! Sequence execution loop.

use super::metrics::{SequenceMetrics, StepMetrics};
use super::step::BoxedStep;
use crate::errors::ShipwrightResult;
use std::time::Instant;

/// An ordered list of steps. Order is the contract: later steps may depend
/// on the effects of earlier ones, and no step may run out of order or be
/// skipped silently.
pub struct ExecutionPlan<Ctx> {
    steps: Vec<BoxedStep<Ctx>>,
}

impl<Ctx> ExecutionPlan<Ctx> {
    pub fn new(steps: Vec<BoxedStep<Ctx>>) -> Self {
        Self { steps }
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.name()).collect()
    }
}

/// Sequence executor framework.
///
/// Runs steps strictly one at a time in declared order. The first failing
/// step aborts the remainder and its error propagates unchanged.
pub struct SequenceExecutor;

impl SequenceExecutor {
    pub async fn execute<Ctx>(
        plan: ExecutionPlan<Ctx>,
        ctx: Ctx,
    ) -> ShipwrightResult<SequenceMetrics>
    where
        Ctx: Clone,
    {
        let total_start = Instant::now();
        let mut step_metrics = Vec::new();

        for step in plan.steps {
            let name = step.name().to_string();
            let step_start = Instant::now();
            step.run(ctx.clone()).await?;
            step_metrics.push(StepMetrics {
                name,
                duration_ms: step_start.elapsed().as_millis(),
            });
        }

        Ok(SequenceMetrics {
            total_duration_ms: total_start.elapsed().as_millis(),
            steps: step_metrics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ShipwrightError;
    use crate::pipeline::SequencerStep;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    type Trace = Arc<Mutex<Vec<&'static str>>>;

    struct Record(&'static str);

    #[async_trait]
    impl SequencerStep<Trace> for Record {
        async fn run(self: Box<Self>, ctx: Trace) -> ShipwrightResult<()> {
            ctx.lock().await.push(self.0);
            Ok(())
        }

        fn name(&self) -> &str {
            self.0
        }
    }

    struct Fail(&'static str);

    #[async_trait]
    impl SequencerStep<Trace> for Fail {
        async fn run(self: Box<Self>, ctx: Trace) -> ShipwrightResult<()> {
            ctx.lock().await.push(self.0);
            Err(ShipwrightError::Internal("step failed".into()))
        }

        fn name(&self) -> &str {
            self.0
        }
    }

    #[tokio::test]
    async fn steps_run_in_declared_order() {
        let trace: Trace = Arc::new(Mutex::new(Vec::new()));
        let plan = ExecutionPlan::new(vec![
            Box::new(Record("a")) as _,
            Box::new(Record("b")) as _,
            Box::new(Record("c")) as _,
        ]);

        let metrics = SequenceExecutor::execute(plan, Arc::clone(&trace))
            .await
            .unwrap();

        assert_eq!(*trace.lock().await, vec!["a", "b", "c"]);
        assert_eq!(metrics.step_names(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn failure_aborts_remaining_steps() {
        let trace: Trace = Arc::new(Mutex::new(Vec::new()));
        let plan = ExecutionPlan::new(vec![
            Box::new(Record("a")) as _,
            Box::new(Fail("boom")) as _,
            Box::new(Record("never")) as _,
        ]);

        let err = SequenceExecutor::execute(plan, Arc::clone(&trace))
            .await
            .unwrap_err();

        assert!(matches!(err, ShipwrightError::Internal(_)));
        assert_eq!(*trace.lock().await, vec!["a", "boom"]);
    }

    #[tokio::test]
    async fn metrics_report_step_durations() {
        let trace: Trace = Arc::new(Mutex::new(Vec::new()));
        let plan = ExecutionPlan::new(vec![Box::new(Record("only")) as _]);

        let metrics = SequenceExecutor::execute(plan, trace).await.unwrap();

        assert!(metrics.step_duration_ms("only").is_some());
        assert!(metrics.step_duration_ms("missing").is_none());
    }
}
