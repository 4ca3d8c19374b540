//! Build steps.
//!
//! Each step is one operation of the build contract, in strict order:
//!
//! ```text
//! provision_runtime → install_toolchain → install_dependencies
//!     → copy_source → provision_runtime_dirs → declare_network
//! ```
//!
//! Dependencies deliberately precede source so the dependency layer caches
//! independently of source edits.

mod dependencies;
mod network;
mod provision;
mod runtime_dirs;
mod source_copy;
mod toolchain;

pub use dependencies::DependenciesStep;
pub use network::NetworkContractStep;
pub use provision::ProvisionRuntimeStep;
pub use runtime_dirs::RuntimeDirsStep;
pub use source_copy::SourceCopyStep;
pub use toolchain::ToolchainStep;

use super::types::BuildCtx;
use crate::errors::ShipwrightError;

/// Log step entry and return the build id for later log lines.
pub(super) async fn step_start(ctx: &BuildCtx, step_name: &str) -> String {
    let ctx = ctx.lock().await;
    tracing::info!(build_id = %ctx.build_id, step = step_name, "step starting");
    ctx.build_id.clone()
}

pub(super) fn log_step_error(build_id: &str, step_name: &str, err: &ShipwrightError) {
    tracing::error!(build_id = %build_id, step = step_name, error = %err, "step failed");
}
