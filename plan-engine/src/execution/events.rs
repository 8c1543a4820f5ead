// Execution Events
// Progress reporting channel for plan execution

use tokio::sync::mpsc;

use std::time::Duration;

/// Sender for execution progress events
pub type ProgressSender = mpsc::UnboundedSender<ExecutionEvent>;

/// Receiver for execution progress events
pub type ProgressReceiver = mpsc::UnboundedReceiver<ExecutionEvent>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Events emitted during plan execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    /// Plan accepted and scheduled into levels
    PlanStarted {
        plan_id: String,
        total_stages: usize,
        total_levels: usize,
    },

    /// A level's stages were dispatched concurrently
    LevelStarted {
        plan_id: String,
        level: usize,
        stage_ids: Vec<String>,
    },

    /// A stage attempt was dispatched to its plugin
    StageStarted {
        plan_id: String,
        stage_id: String,
        attempt: u32,
    },

    /// A failed attempt qualified for retry
    StageRetrying {
        plan_id: String,
        stage_id: String,
        attempt: u32,
        code: String,
    },

    /// A stage reached a terminal outcome
    StageCompleted {
        plan_id: String,
        stage_id: String,
        success: bool,
        duration: Duration,
    },

    /// Plan execution finished
    PlanCompleted {
        plan_id: String,
        success: bool,
        duration: Duration,
    },

    /// Plan was cancelled before completion
    PlanCancelled { plan_id: String },
}

impl ExecutionEvent {
    /// Create a plan started event
    pub fn plan_started(plan_id: impl Into<String>, total_stages: usize, total_levels: usize) -> Self {
        Self::PlanStarted {
            plan_id: plan_id.into(),
            total_stages,
            total_levels,
        }
    }

    /// Create a level started event
    pub fn level_started(plan_id: impl Into<String>, level: usize, stage_ids: Vec<String>) -> Self {
        Self::LevelStarted {
            plan_id: plan_id.into(),
            level,
            stage_ids,
        }
    }

    /// Create a stage started event
    pub fn stage_started(plan_id: impl Into<String>, stage_id: impl Into<String>, attempt: u32) -> Self {
        Self::StageStarted {
            plan_id: plan_id.into(),
            stage_id: stage_id.into(),
            attempt,
        }
    }

    /// Create a stage retrying event
    pub fn stage_retrying(
        plan_id: impl Into<String>,
        stage_id: impl Into<String>,
        attempt: u32,
        code: impl Into<String>,
    ) -> Self {
        Self::StageRetrying {
            plan_id: plan_id.into(),
            stage_id: stage_id.into(),
            attempt,
            code: code.into(),
        }
    }

    /// Create a stage completed event
    pub fn stage_completed(
        plan_id: impl Into<String>,
        stage_id: impl Into<String>,
        success: bool,
        duration: Duration,
    ) -> Self {
        Self::StageCompleted {
            plan_id: plan_id.into(),
            stage_id: stage_id.into(),
            success,
            duration,
        }
    }

    /// Create a plan completed event
    pub fn plan_completed(plan_id: impl Into<String>, success: bool, duration: Duration) -> Self {
        Self::PlanCompleted {
            plan_id: plan_id.into(),
            success,
            duration,
        }
    }
}

/// Helper trait for sending events, ignoring errors (fire-and-forget)
pub trait EventSender {
    fn send_event(&self, event: ExecutionEvent);
}

impl EventSender for ProgressSender {
    fn send_event(&self, event: ExecutionEvent) {
        let _ = self.send(event);
    }
}

impl EventSender for Option<ProgressSender> {
    fn send_event(&self, event: ExecutionEvent) {
        if let Some(sender) = self {
            let _ = sender.send(event);
        }
    }
}
