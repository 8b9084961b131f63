//! Progress notification port
//!
//! Defines the interface for reporting progress during a collaboration.

use quorum_domain::{ParticipantId, Phase};

/// Callback for progress updates during a collaboration session
///
/// Implementations live in outer layers and can surface progress in various
/// ways (log lines, metrics). Callbacks must not block.
pub trait ProgressNotifier: Send + Sync {
    /// Called when a phase starts
    fn on_phase_start(&self, phase: &Phase, total_tasks: usize);

    /// Called when a task completes within a phase
    fn on_task_complete(&self, phase: &Phase, participant: &ParticipantId, success: bool);

    /// Called when a phase completes
    fn on_phase_complete(&self, phase: &Phase);
}

/// No-op progress notifier for when progress reporting is not needed
pub struct NoProgress;

impl ProgressNotifier for NoProgress {
    fn on_phase_start(&self, _phase: &Phase, _total_tasks: usize) {}
    fn on_task_complete(&self, _phase: &Phase, _participant: &ParticipantId, _success: bool) {}
    fn on_phase_complete(&self, _phase: &Phase) {}
}
