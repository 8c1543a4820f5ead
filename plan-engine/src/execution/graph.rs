// Dependency Graph
// Builds the stage adjacency map and derives concurrent execution levels

use crate::model::{ExecutionPlan, ExecutionStage, StageError};

use std::collections::{HashMap, HashSet};

/// DAG of one plan's stages
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Stage id -> dependency ids
    adjacency: HashMap<String, Vec<String>>,
    /// Stage id -> index into `stages`
    stage_indices: HashMap<String, usize>,
    stages: Vec<ExecutionStage>,
}

impl DependencyGraph {
    /// Build the adjacency map for a plan, validating that every declared
    /// dependency names a stage in the plan
    pub fn from_plan(plan: &ExecutionPlan) -> Result<Self, StageError> {
        let mut adjacency = HashMap::with_capacity(plan.stages.len());
        let mut stage_indices = HashMap::with_capacity(plan.stages.len());

        for (i, stage) in plan.stages.iter().enumerate() {
            adjacency.insert(stage.id.clone(), stage.dependencies.clone());
            stage_indices.insert(stage.id.clone(), i);
        }

        for stage in &plan.stages {
            for dep in &stage.dependencies {
                if !stage_indices.contains_key(dep) {
                    return Err(StageError::missing_dependency(&stage.id, dep));
                }
            }
        }

        Ok(Self {
            adjacency,
            stage_indices,
            stages: plan.stages.clone(),
        })
    }

    /// Dependencies of a stage, empty if unknown
    pub fn dependencies(&self, stage_id: &str) -> &[String] {
        self.adjacency
            .get(stage_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Group stages into ordered levels.
    ///
    /// A stage's level is one past the deepest level among its
    /// dependencies, so every stage lands in a strictly later level than
    /// all of its dependencies. Stages within a level have no edges
    /// between them and may run concurrently; order within a level is
    /// unspecified. A cycle is reported before any level is returned.
    pub fn levels(&self) -> Result<Vec<Vec<&ExecutionStage>>, StageError> {
        let mut assigned: HashMap<&str, usize> = HashMap::new();
        let mut visiting: HashSet<&str> = HashSet::new();
        let mut levels: Vec<Vec<&ExecutionStage>> = Vec::new();

        for stage in &self.stages {
            self.visit(&stage.id, &mut assigned, &mut visiting, &mut levels)?;
        }

        levels.retain(|level| !level.is_empty());
        Ok(levels)
    }

    fn visit<'a>(
        &'a self,
        id: &'a str,
        assigned: &mut HashMap<&'a str, usize>,
        visiting: &mut HashSet<&'a str>,
        levels: &mut Vec<Vec<&'a ExecutionStage>>,
    ) -> Result<usize, StageError> {
        if let Some(&level) = assigned.get(id) {
            return Ok(level);
        }
        // A revisit while still on the recursion stack means a cycle
        if !visiting.insert(id) {
            return Err(StageError::circular_dependency(id));
        }

        let mut level = 0;
        for dep in self.dependencies(id) {
            level = level.max(self.visit(dep, assigned, visiting, levels)? + 1);
        }

        visiting.remove(id);
        assigned.insert(id, level);

        if level >= levels.len() {
            levels.resize_with(level + 1, Vec::new);
        }
        if let Some(&idx) = self.stage_indices.get(id) {
            levels[level].push(&self.stages[idx]);
        }

        Ok(level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(id: &str, deps: &[&str]) -> ExecutionStage {
        ExecutionStage::new(id, "noop")
            .with_dependencies(deps.iter().map(|d| d.to_string()).collect())
    }

    fn plan(stages: Vec<ExecutionStage>) -> ExecutionPlan {
        ExecutionPlan::new("plan", stages)
    }

    fn level_ids(levels: &[Vec<&ExecutionStage>]) -> Vec<Vec<String>> {
        levels
            .iter()
            .map(|level| {
                let mut ids: Vec<String> = level.iter().map(|s| s.id.clone()).collect();
                ids.sort();
                ids
            })
            .collect()
    }

    #[test]
    fn test_fan_in_levels() {
        let graph = DependencyGraph::from_plan(&plan(vec![
            stage("a", &[]),
            stage("b", &[]),
            stage("c", &["a", "b"]),
        ]))
        .unwrap();

        let levels = graph.levels().unwrap();
        assert_eq!(level_ids(&levels), vec![vec!["a", "b"], vec!["c"]]);
    }

    #[test]
    fn test_diamond_levels() {
        let graph = DependencyGraph::from_plan(&plan(vec![
            stage("root", &[]),
            stage("left", &["root"]),
            stage("right", &["root"]),
            stage("join", &["left", "right"]),
        ]))
        .unwrap();

        let levels = graph.levels().unwrap();
        assert_eq!(
            level_ids(&levels),
            vec![vec!["root"], vec!["left", "right"], vec!["join"]]
        );
    }

    #[test]
    fn test_uneven_depths_respect_deepest_chain() {
        // "late" depends on both a root and the end of a longer chain, so
        // it must land after the chain even though one dependency is level 0
        let graph = DependencyGraph::from_plan(&plan(vec![
            stage("a", &[]),
            stage("b", &["a"]),
            stage("c", &["b"]),
            stage("late", &["a", "c"]),
        ]))
        .unwrap();

        let levels = graph.levels().unwrap();
        assert_eq!(
            level_ids(&levels),
            vec![vec!["a"], vec!["b"], vec!["c"], vec!["late"]]
        );
    }

    #[test]
    fn test_every_stage_after_its_dependencies() {
        let graph = DependencyGraph::from_plan(&plan(vec![
            stage("q", &[]),
            stage("scrape1", &["q"]),
            stage("scrape2", &["q"]),
            stage("nlp", &["scrape1", "scrape2"]),
            stage("report", &["nlp", "q"]),
        ]))
        .unwrap();

        let levels = graph.levels().unwrap();
        let mut level_of: HashMap<String, usize> = HashMap::new();
        for (i, level) in levels.iter().enumerate() {
            for s in level {
                level_of.insert(s.id.clone(), i);
            }
        }

        for level in &levels {
            for s in level {
                for dep in &s.dependencies {
                    assert!(level_of[dep] < level_of[&s.id]);
                }
            }
        }
    }

    #[test]
    fn test_cycle_detected() {
        let graph = DependencyGraph::from_plan(&plan(vec![
            stage("a", &["c"]),
            stage("b", &["a"]),
            stage("c", &["b"]),
        ]))
        .unwrap();

        let err = graph.levels().unwrap_err();
        assert_eq!(err.code(), "CIRCULAR_DEPENDENCY");
        assert!(!err.retryable);
    }

    #[test]
    fn test_self_cycle_detected() {
        let graph = DependencyGraph::from_plan(&plan(vec![stage("a", &["a"])])).unwrap();
        assert_eq!(graph.levels().unwrap_err().code(), "CIRCULAR_DEPENDENCY");
    }

    #[test]
    fn test_unknown_dependency_rejected_at_build() {
        let err = DependencyGraph::from_plan(&plan(vec![stage("a", &["ghost"])])).unwrap_err();
        assert_eq!(err.code(), "MISSING_DEPENDENCY");
        assert!(err.message.contains("ghost"));
    }

    #[test]
    fn test_empty_plan_has_no_levels() {
        let graph = DependencyGraph::from_plan(&plan(Vec::new())).unwrap();
        assert!(graph.levels().unwrap().is_empty());
    }
}
