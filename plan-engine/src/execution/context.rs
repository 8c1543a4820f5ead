// Execution Context
// Per-attempt working state handed to plugins

use crate::model::{Artifact, StageMetrics};

use serde_json::Value;

use std::collections::HashMap;
use std::time::Instant;

/// Input data routed to a stage from its completed dependencies
#[derive(Debug, Clone, Default)]
pub struct StageData {
    /// Artifacts produced by this stage's dependencies, in declaration
    /// order; empty for stages with no dependencies
    pub artifacts: Vec<Artifact>,
    /// Outputs of completed stages, keyed by stage id
    pub intermediate_results: HashMap<String, Value>,
}

/// Working state passed to a plugin for one stage attempt.
///
/// Constructed fresh for each attempt: cloned from the plan-level base
/// context, then specialized with the stage id, the attempt number, and
/// the artifacts collected from the stage's completed dependencies.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub plan_id: String,
    pub stage_id: String,
    /// 1-based attempt counter
    pub attempt: u32,
    pub started_at: Instant,
    pub data: StageData,
    pub metrics: StageMetrics,
}

impl ExecutionContext {
    /// Plan-level base context; stage contexts are derived from it
    pub fn base(plan_id: impl Into<String>) -> Self {
        Self {
            plan_id: plan_id.into(),
            stage_id: String::new(),
            attempt: 1,
            started_at: Instant::now(),
            data: StageData::default(),
            metrics: StageMetrics::default(),
        }
    }

    /// Specialize the base context for one stage attempt
    pub fn for_stage(
        &self,
        stage_id: impl Into<String>,
        attempt: u32,
        artifacts: Vec<Artifact>,
    ) -> Self {
        let mut ctx = self.clone();
        ctx.stage_id = stage_id.into();
        ctx.attempt = attempt;
        ctx.started_at = Instant::now();
        ctx.data.artifacts = artifacts;
        ctx
    }

    /// Record a completed stage's output for later levels
    pub fn record_intermediate(&mut self, stage_id: impl Into<String>, output: Value) {
        self.data.intermediate_results.insert(stage_id.into(), output);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stage_context_derivation() {
        let mut base = ExecutionContext::base("plan-1");
        base.record_intermediate("fetch", json!({"pages": 3}));

        let artifacts = vec![Artifact::new("a1", "web-page", json!({"url": "x"}))];
        let ctx = base.for_stage("analyze", 2, artifacts);

        assert_eq!(ctx.plan_id, "plan-1");
        assert_eq!(ctx.stage_id, "analyze");
        assert_eq!(ctx.attempt, 2);
        assert_eq!(ctx.data.artifacts.len(), 1);
        // Intermediate results carry over from the base context
        assert!(ctx.data.intermediate_results.contains_key("fetch"));
        // The base context is not affected by specialization
        assert!(base.data.artifacts.is_empty());
        assert!(base.stage_id.is_empty());
    }
}
