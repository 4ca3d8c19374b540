//! Boot lifecycle status and state machine.

use crate::errors::{ShipwrightError, ShipwrightResult};
use serde::{Deserialize, Serialize};

/// Status of one container boot instance.
///
/// ```text
/// Created → Migrating → Serving → Stopped
///               │           └───→ Crashed
///               ├───→ Failed
///               └───→ Interrupted
/// ```
///
/// `Failed`, `Crashed`, `Interrupted`, and `Stopped` are terminal; there is
/// no retry. Restart policy belongs to the host orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BootStatus {
    /// Instance created, nothing executed yet.
    Created,
    /// Migration tool running; the service has not been launched.
    Migrating,
    /// Migrations applied, service process running and bound to its port.
    Serving,
    /// Migration exited non-zero; the service was never launched.
    Failed,
    /// Service process exited on its own.
    Crashed,
    /// Termination request observed before the service was launched.
    Interrupted,
    /// Service terminated on request.
    Stopped,
}

impl BootStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Migrating => "migrating",
            Self::Serving => "serving",
            Self::Failed => "failed",
            Self::Crashed => "crashed",
            Self::Interrupted => "interrupted",
            Self::Stopped => "stopped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Failed | Self::Crashed | Self::Interrupted | Self::Stopped
        )
    }

    fn may_become(&self, next: BootStatus) -> bool {
        use BootStatus::*;
        matches!(
            (self, next),
            (Created, Migrating)
                | (Migrating, Serving)
                | (Migrating, Failed)
                | (Migrating, Interrupted)
                | (Migrating, Crashed)
                | (Serving, Crashed)
                | (Serving, Stopped)
        )
    }
}

impl std::fmt::Display for BootStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable state of one boot instance.
#[derive(Debug, Clone)]
pub struct BootState {
    pub status: BootStatus,
    pub pid: Option<u32>,
    pub exit_code: Option<i32>,
}

impl BootState {
    pub fn new() -> Self {
        Self {
            status: BootStatus::Created,
            pid: None,
            exit_code: None,
        }
    }

    /// Transition to `next`, rejecting anything outside the state machine.
    pub fn transition(&mut self, next: BootStatus) -> ShipwrightResult<()> {
        if !self.status.may_become(next) {
            return Err(ShipwrightError::InvalidState(format!(
                "cannot transition boot from {} to {}",
                self.status, next
            )));
        }
        tracing::debug!(from = %self.status, to = %next, "boot state transition");
        self.status = next;
        Ok(())
    }
}

impl Default for BootState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        let mut state = BootState::new();
        state.transition(BootStatus::Migrating).unwrap();
        state.transition(BootStatus::Serving).unwrap();
        state.transition(BootStatus::Stopped).unwrap();
        assert!(state.status.is_terminal());
    }

    #[test]
    fn migration_failure_is_terminal() {
        let mut state = BootState::new();
        state.transition(BootStatus::Migrating).unwrap();
        state.transition(BootStatus::Failed).unwrap();
        assert!(state.transition(BootStatus::Serving).is_err());
    }

    #[test]
    fn serving_cannot_be_reached_from_created() {
        let mut state = BootState::new();
        assert!(state.transition(BootStatus::Serving).is_err());
    }

    #[test]
    fn interrupt_only_during_migration() {
        let mut state = BootState::new();
        assert!(state.transition(BootStatus::Interrupted).is_err());
        state.transition(BootStatus::Migrating).unwrap();
        state.transition(BootStatus::Interrupted).unwrap();
    }
}
