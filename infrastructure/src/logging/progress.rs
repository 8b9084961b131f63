//! Progress reporting through `tracing`.

use quorum_application::ProgressNotifier;
use quorum_domain::{ParticipantId, Phase};
use tracing::{info, warn};

/// Progress notifier that turns phase events into log lines.
///
/// stdout carries the protocol, so progress can only go to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressNotifier for TracingProgress {
    fn on_phase_start(&self, phase: &Phase, total_tasks: usize) {
        info!("-> {} ({} tasks)", phase.display_name(), total_tasks);
    }

    fn on_task_complete(&self, phase: &Phase, participant: &ParticipantId, success: bool) {
        if success {
            info!("   {} [{}] done", participant, phase.as_str());
        } else {
            warn!("   {} [{}] failed", participant, phase.as_str());
        }
    }

    fn on_phase_complete(&self, phase: &Phase) {
        info!("   {} complete", phase.display_name());
    }
}
