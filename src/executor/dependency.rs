//! Task dependency graph and topological wave computation.
//!
//! Generalizes the donor's `src/dag/builder.rs` (`PhaseGraph`,
//! `validate_no_cycles`) from phase-level nodes to task-level nodes within
//! a single phase.

use crate::errors::PhaseExecutorError;
use crate::model::Task;
use std::collections::{HashMap, HashSet};

pub struct TaskGraph<'a> {
    tasks: &'a [Task],
    index_map: HashMap<String, usize>,
    forward_edges: Vec<Vec<usize>>,
    reverse_edges: Vec<Vec<usize>>,
}

impl<'a> TaskGraph<'a> {
    pub fn build(phase_id: &str, tasks: &'a [Task]) -> Result<Self, PhaseExecutorError> {
        let mut index_map = HashMap::new();
        for (i, task) in tasks.iter().enumerate() {
            index_map.insert(task.id.clone(), i);
        }

        let mut forward_edges = vec![Vec::new(); tasks.len()];
        let mut reverse_edges = vec![Vec::new(); tasks.len()];
        for (to_idx, task) in tasks.iter().enumerate() {
            for dep in &task.dependencies {
                let from_idx = *index_map.get(dep).ok_or_else(|| PhaseExecutorError::UnknownDependency {
                    task: task.id.clone(),
                    dependency: dep.clone(),
                })?;
                forward_edges[from_idx].push(to_idx);
                reverse_edges[to_idx].push(from_idx);
            }
        }

        let graph = Self {
            tasks,
            index_map,
            forward_edges,
            reverse_edges,
        };
        graph.validate_no_cycles(phase_id)?;
        Ok(graph)
    }

    fn validate_no_cycles(&self, phase_id: &str) -> Result<(), PhaseExecutorError> {
        let mut in_degree: Vec<usize> = self.reverse_edges.iter().map(|d| d.len()).collect();
        let mut queue: Vec<usize> = in_degree.iter().enumerate().filter(|&(_, d)| *d == 0).map(|(i, _)| i).collect();
        let mut processed = 0;
        while let Some(node) = queue.pop() {
            processed += 1;
            for &dependent in &self.forward_edges[node] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push(dependent);
                }
            }
        }
        if processed != self.tasks.len() {
            let cycle_ids: Vec<String> = in_degree
                .iter()
                .enumerate()
                .filter(|&(_, d)| *d > 0)
                .map(|(i, _)| self.tasks[i].id.clone())
                .collect();
            return Err(PhaseExecutorError::Cycle {
                phase_id: phase_id.to_string(),
                task_ids: cycle_ids,
            });
        }
        Ok(())
    }

    /// Computes execution waves: each wave is a list of task ids whose
    /// dependencies lie entirely in earlier waves.
    pub fn compute_waves(&self) -> Vec<Vec<String>> {
        let mut completed: HashSet<usize> = HashSet::new();
        let mut waves = Vec::new();
        while completed.len() < self.tasks.len() {
            let wave: Vec<usize> = (0..self.tasks.len())
                .filter(|i| !completed.contains(i))
                .filter(|i| self.reverse_edges[*i].iter().all(|d| completed.contains(d)))
                .collect();
            if wave.is_empty() {
                break;
            }
            waves.push(wave.iter().map(|&i| self.tasks[i].id.clone()).collect());
            completed.extend(wave);
        }
        waves
    }

    pub fn ready_tasks(&self, completed_or_skipped: &HashSet<String>) -> Vec<&'a Task> {
        self.tasks
            .iter()
            .filter(|t| !completed_or_skipped.contains(&t.id))
            .filter(|t| t.dependencies.iter().all(|d| completed_or_skipped.contains(d)))
            .collect()
    }

    pub fn task_index(&self, id: &str) -> Option<usize> {
        self.index_map.get(id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskKind;

    fn task(id: &str, deps: &[&str]) -> Task {
        Task::new(id, id, TaskKind::Analysis).with_dependencies(deps.iter().map(|s| s.to_string()))
    }

    #[test]
    fn wave_ordering_matches_scenario_s2() {
        let tasks = vec![task("a", &[]), task("b", &["a"]), task("c", &["a"]), task("d", &["b", "c"])];
        let graph = TaskGraph::build("phase-1", &tasks).unwrap();
        let waves = graph.compute_waves();
        assert_eq!(waves[0], vec!["a".to_string()]);
        assert!(waves[1].contains(&"b".to_string()) && waves[1].contains(&"c".to_string()));
        assert_eq!(waves[2], vec!["d".to_string()]);
    }

    #[test]
    fn cycle_is_detected_and_names_involved_tasks() {
        let tasks = vec![task("a", &["b"]), task("b", &["a"])];
        let err = TaskGraph::build("phase-1", &tasks).unwrap_err();
        match err {
            PhaseExecutorError::Cycle { task_ids, .. } => {
                assert_eq!(task_ids.len(), 2);
            }
            _ => panic!("expected Cycle"),
        }
    }

    #[test]
    fn unknown_dependency_is_named() {
        let tasks = vec![task("a", &["missing"])];
        let err = TaskGraph::build("phase-1", &tasks).unwrap_err();
        assert!(matches!(err, PhaseExecutorError::UnknownDependency { .. }));
    }
}
