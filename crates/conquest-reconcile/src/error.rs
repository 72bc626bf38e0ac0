use thiserror::Error;

/// The animation timeline was cleared before this task started.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Error)]
#[error("animation task was cleared before it ran")]
pub struct TaskCancelled;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("replay interrupted: {0}")]
    Cancelled(#[from] TaskCancelled),
    #[error("reconciliation panicked: {0}")]
    Panicked(String),
}
