// Execution Engine Module
// Graph construction, level scheduling, stage execution, and state tracking

pub mod context;
pub mod engine;
pub mod events;
pub mod executor;
pub mod graph;
pub mod metrics;
pub mod state;

// Re-export key types
pub use context::{ExecutionContext, StageData};
pub use engine::{EngineConfig, PlanEngine, DEFAULT_STAGE_TIMEOUT_SECS};
pub use events::{
    progress_channel, EventSender, ExecutionEvent, ProgressReceiver, ProgressSender,
};
pub use executor::StageExecutor;
pub use graph::DependencyGraph;
pub use state::{ExecutionState, ExecutionTracker};
