//! Error types for shipwright.
//!
//! Every failure class maps to a stable process exit code so the host
//! orchestrator can tell which step of the sequence failed. When an external
//! tool produced its own exit code, that code wins.

use thiserror::Error;

pub type ShipwrightResult<T> = Result<T, ShipwrightError>;

/// Exit status of an external tool invocation that did not succeed.
#[derive(Debug, Clone)]
pub struct ToolExit {
    /// Human-readable tool name (e.g. "apt-get", "alembic").
    pub tool: String,
    /// Exit code of the tool, if it exited normally. `None` means the
    /// process was killed by a signal before producing a code.
    pub code: Option<i32>,
}

impl ToolExit {
    pub fn new(tool: impl Into<String>, code: Option<i32>) -> Self {
        Self {
            tool: tool.into(),
            code,
        }
    }
}

impl std::fmt::Display for ToolExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} exited with code {}", self.tool, code),
            None => write!(f, "{} terminated by signal", self.tool),
        }
    }
}

#[derive(Debug, Error)]
pub enum ShipwrightError {
    /// Build spec or image manifest is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Base runtime / system package provisioning failed (build-fatal).
    #[error("provisioning failed: {0}")]
    Provision(ToolExit),

    /// Dependency manager install or dependency resolution failed (build-fatal).
    #[error("dependency resolution failed: {0}")]
    Dependency(ToolExit),

    /// Lock file missing or inconsistent with the manifest. Raised before
    /// the dependency tool is invoked - never silently re-resolved.
    #[error("lock file inconsistent with manifest: {0}")]
    LockMismatch(String),

    /// Schema migration failed; the service must not be launched.
    #[error("migration failed: {0}")]
    Migration(ToolExit),

    /// Service process failed to start or never bound its port.
    #[error("service launch failed: {0}")]
    Launch(String),

    /// Service process exited after it was serving.
    #[error("service crashed: {0}")]
    Crashed(ToolExit),

    /// Termination request observed before the service was launched.
    #[error("boot interrupted before service launch")]
    Interrupted,

    /// Filesystem or staging error.
    #[error("storage error: {0}")]
    Storage(String),

    /// SQLite store error.
    #[error("database error: {0}")]
    Database(String),

    /// Operation not valid for the current lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ShipwrightError {
    /// Process exit code reflecting the first failing step.
    ///
    /// Tool failures propagate the tool's own exit code; otherwise each
    /// failure class has a fixed fallback so orchestrators can branch on it.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Provision(exit) => exit.code.unwrap_or(10),
            Self::Dependency(exit) => exit.code.unwrap_or(11),
            Self::LockMismatch(_) => 11,
            Self::Migration(exit) => exit.code.unwrap_or(12),
            Self::Launch(_) => 13,
            Self::Crashed(exit) => exit.code.unwrap_or(13),
            Self::Interrupted => 130,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_exit_code_wins() {
        let err = ShipwrightError::Migration(ToolExit::new("alembic", Some(7)));
        assert_eq!(err.exit_code(), 7);
    }

    #[test]
    fn signal_death_uses_class_fallback() {
        let err = ShipwrightError::Provision(ToolExit::new("apt-get", None));
        assert_eq!(err.exit_code(), 10);
    }

    #[test]
    fn lock_mismatch_is_a_dependency_failure() {
        let err = ShipwrightError::LockMismatch("content-hash differs".into());
        assert_eq!(err.exit_code(), 11);
    }

    #[test]
    fn interrupt_uses_conventional_code() {
        assert_eq!(ShipwrightError::Interrupted.exit_code(), 130);
    }
}
