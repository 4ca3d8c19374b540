//! Table-driven sequential step execution.
//!
//! Both the image build and the container boot are ordered sequences in
//! which every step must complete before the next may start and the first
//! failure aborts the remainder. This module provides the shared executor:
//!
//! ```text
//! ExecutionPlan → [Step, Step, ...] → SequenceExecutor
//! ```
//!
//! Steps share a context (use interior mutability for writes) and report
//! per-step timing metrics on success.

mod executor;
mod metrics;
mod step;

pub use executor::{ExecutionPlan, SequenceExecutor};
pub use metrics::{SequenceMetrics, StepMetrics};
pub use step::{BoxedStep, SequencerStep};
