// Execution State
// Per-plan bookkeeping while a plan is active, and the active-plan tracker

use crate::model::{Artifact, ExecutionPlan, ExecutionStage, ExecutionStatus, StageResult};

use tokio_util::sync::CancellationToken;

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Mutable bookkeeping for one active plan.
///
/// Created when `execute_plan` starts and discarded in a guaranteed
/// cleanup step when it returns; no state survives across separate
/// executions of the same plan id.
#[derive(Debug)]
pub struct ExecutionState {
    pub plan: ExecutionPlan,
    /// Results of successfully completed stages, keyed by stage id
    pub completed: HashMap<String, StageResult>,
    pub failed: HashSet<String>,
    pub running: HashSet<String>,
    /// Aggregate artifacts from all completed stages
    pub artifacts: Vec<Artifact>,
    /// Root cancellation token observed by compliant plugins
    pub cancel: CancellationToken,
}

impl ExecutionState {
    pub fn new(plan: ExecutionPlan) -> Self {
        Self {
            plan,
            completed: HashMap::new(),
            failed: HashSet::new(),
            running: HashSet::new(),
            artifacts: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Collect the artifacts produced by a stage's completed dependencies,
    /// in declaration order. Dependencies without a completed result
    /// contribute nothing.
    pub fn dependency_artifacts(&self, stage: &ExecutionStage) -> Vec<Artifact> {
        let mut artifacts = Vec::new();
        for dep in &stage.dependencies {
            if let Some(result) = self.completed.get(dep) {
                artifacts.extend(result.artifacts.iter().cloned());
            }
        }
        artifacts
    }

    /// Record a successful stage, folding its artifacts into the plan
    /// aggregate
    pub fn record_success(&mut self, stage_id: &str, result: StageResult) {
        self.artifacts.extend(result.artifacts.iter().cloned());
        self.completed.insert(stage_id.to_string(), result);
    }

    /// Record a terminally failed stage
    pub fn record_failure(&mut self, stage_id: &str) {
        self.failed.insert(stage_id.to_string());
    }

    /// Point-in-time snapshot for the status API
    pub fn status(&self) -> ExecutionStatus {
        ExecutionStatus {
            total_stages: self.plan.stages.len(),
            completed: self.completed.keys().cloned().collect(),
            failed: self.failed.iter().cloned().collect(),
            running: self.running.iter().cloned().collect(),
            artifacts: self.artifacts.clone(),
        }
    }
}

/// Tracker of active plans, owned by one engine instance.
///
/// The lock is held only for short non-await sections; each plan's state
/// is mutated exclusively from its own `execute_plan` control flow, while
/// the status API takes read snapshots.
pub struct ExecutionTracker {
    active: RwLock<HashMap<String, ExecutionState>>,
}

impl ExecutionTracker {
    pub fn new() -> Self {
        Self {
            active: RwLock::new(HashMap::new()),
        }
    }

    /// Register a plan as active, replacing any stale entry under the
    /// same id
    pub fn insert(&self, state: ExecutionState) {
        self.active
            .write()
            .expect("execution tracker lock poisoned")
            .insert(state.plan.id.clone(), state);
    }

    /// Remove a plan from the active registry, returning its final state
    pub fn remove(&self, plan_id: &str) -> Option<ExecutionState> {
        self.active
            .write()
            .expect("execution tracker lock poisoned")
            .remove(plan_id)
    }

    /// Whether the plan is still registered as active
    pub fn contains(&self, plan_id: &str) -> bool {
        self.active
            .read()
            .expect("execution tracker lock poisoned")
            .contains_key(plan_id)
    }

    /// Ids of all plans currently in progress
    pub fn active_ids(&self) -> Vec<String> {
        self.active
            .read()
            .expect("execution tracker lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Status snapshot of an active plan
    pub fn status(&self, plan_id: &str) -> Option<ExecutionStatus> {
        self.active
            .read()
            .expect("execution tracker lock poisoned")
            .get(plan_id)
            .map(ExecutionState::status)
    }

    /// Run a closure against a plan's mutable state; returns `None` if
    /// the plan is no longer active
    pub fn with_state<T>(
        &self,
        plan_id: &str,
        f: impl FnOnce(&mut ExecutionState) -> T,
    ) -> Option<T> {
        self.active
            .write()
            .expect("execution tracker lock poisoned")
            .get_mut(plan_id)
            .map(f)
    }

    /// Advisory cancellation: deregister the plan and signal its token.
    /// Stages already dispatched in the current level are not
    /// interrupted, but no later level will start and compliant plugins
    /// observe the cancelled token. Returns whether the plan was active.
    pub fn cancel(&self, plan_id: &str) -> bool {
        match self.remove(plan_id) {
            Some(state) => {
                state.cancel.cancel();
                true
            }
            None => false,
        }
    }
}

impl Default for ExecutionTracker {
    fn default() -> Self {
        Self::new()
    }
}
