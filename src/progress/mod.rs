//! Progress Tracker (C4): per-task/phase/project progress with ETA models.
//!
//! Grounded on
//! `examples/original_source/claude-code-builder/claude_code_builder/monitoring/progress_tracker.py`.
//! See SPEC_FULL.md §4.4.

mod eta;

pub use eta::{EtaEstimate, EtaModel};

use crate::errors::ProgressError;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

const TASK_HISTORY_CAP: usize = 10;
const PHASE_HISTORY_CAP: usize = 5;

#[derive(Debug, Clone)]
pub struct TaskProgress {
    pub percent: f64,
    pub weight: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Default for TaskProgress {
    fn default() -> Self {
        Self {
            percent: 0.0,
            weight: 1.0,
            started_at: None,
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PhaseProgress {
    pub percent: f64,
    pub explicit: bool,
    pub tasks: HashMap<String, TaskProgress>,
    pub completed_tasks: u64,
    pub samples: VecDeque<(DateTime<Utc>, f64)>,
}

struct Inner {
    phases: HashMap<String, PhaseProgress>,
    phase_order: Vec<String>,
    task_durations: HashMap<String, VecDeque<f64>>,
    phase_durations: HashMap<String, VecDeque<f64>>,
    started_at: DateTime<Utc>,
    estimated_total_duration_seconds: Option<f64>,
    completed_phases: u64,
}

/// Tracks progress for one execution across its full phase/task hierarchy.
pub struct ProgressTracker {
    inner: Mutex<Inner>,
}

impl ProgressTracker {
    pub fn start_project(phase_ids: Vec<String>, estimated_total_duration_seconds: Option<f64>) -> Self {
        let mut phases = HashMap::new();
        for id in &phase_ids {
            phases.insert(id.clone(), PhaseProgress::default());
        }
        Self {
            inner: Mutex::new(Inner {
                phases,
                phase_order: phase_ids,
                task_durations: HashMap::new(),
                phase_durations: HashMap::new(),
                started_at: Utc::now(),
                estimated_total_duration_seconds,
                completed_phases: 0,
            }),
        }
    }

    pub fn update_task(
        &self,
        phase_id: &str,
        task_id: &str,
        percent: f64,
        terminal_success: bool,
    ) -> Result<(), ProgressError> {
        self.update_task_weighted(phase_id, task_id, percent, 1.0, terminal_success)
    }

    /// As `update_task`, but records the task's weight so `update_phase`'s
    /// default branch can compute the same weight-weighted average as
    /// `Phase::progress` (SPEC_FULL §4.4/§8).
    pub fn update_task_weighted(
        &self,
        phase_id: &str,
        task_id: &str,
        percent: f64,
        weight: f64,
        terminal_success: bool,
    ) -> Result<(), ProgressError> {
        let mut inner = self.inner.lock().expect("progress tracker lock poisoned");
        let now = Utc::now();
        let phase = inner
            .phases
            .get_mut(phase_id)
            .ok_or_else(|| ProgressError::UnknownPhase(phase_id.to_string()))?;
        let task = phase.tasks.entry(task_id.to_string()).or_default();
        if task.started_at.is_none() {
            task.started_at = Some(now);
        }
        task.percent = percent.clamp(0.0, 100.0);
        task.weight = weight;
        if terminal_success && task.completed_at.is_none() {
            task.completed_at = Some(now);
            phase.completed_tasks += 1;
            if let Some(start) = task.started_at {
                let duration = (now - start).num_milliseconds() as f64 / 1000.0;
                let ring = inner.task_durations.entry(task_id.to_string()).or_default();
                ring.push_back(duration);
                if ring.len() > TASK_HISTORY_CAP {
                    ring.pop_front();
                }
            }
        }
        Ok(())
    }

    /// Phase progress, unless explicitly overridden, is the same
    /// weight-weighted average of completed-task weight over total weight
    /// that `Phase::progress` computes on the data model (SPEC_FULL §4.4/§8).
    pub fn update_phase(&self, phase_id: &str, percent: Option<f64>, terminal_success: bool) -> Result<(), ProgressError> {
        let mut inner = self.inner.lock().expect("progress tracker lock poisoned");
        let now = Utc::now();
        let started_at = inner.started_at;
        let phase = inner
            .phases
            .get_mut(phase_id)
            .ok_or_else(|| ProgressError::UnknownPhase(phase_id.to_string()))?;
        let computed = percent.unwrap_or_else(|| {
            if phase.tasks.is_empty() {
                0.0
            } else {
                let total_weight: f64 = phase.tasks.values().map(|t| t.weight).sum();
                if total_weight <= 0.0 {
                    0.0
                } else {
                    let done_weight: f64 = phase
                        .tasks
                        .values()
                        .filter(|t| t.completed_at.is_some())
                        .map(|t| t.weight)
                        .sum();
                    (done_weight / total_weight) * 100.0
                }
            }
        });
        phase.percent = computed;
        phase.explicit = percent.is_some();
        phase.samples.push_back((now, computed));
        if phase.samples.len() > 50 {
            phase.samples.pop_front();
        }
        if terminal_success {
            inner.completed_phases += 1;
            let elapsed = (now - started_at).num_milliseconds() as f64 / 1000.0;
            let ring = inner.phase_durations.entry(phase_id.to_string()).or_default();
            ring.push_back(elapsed);
            if ring.len() > PHASE_HISTORY_CAP {
                ring.pop_front();
            }
        }
        Ok(())
    }

    pub fn project_progress(&self) -> f64 {
        let inner = self.inner.lock().expect("progress tracker lock poisoned");
        if inner.phases.is_empty() {
            return 100.0;
        }
        inner.phases.values().map(|p| p.percent).sum::<f64>() / inner.phases.len() as f64
    }

    pub fn throughput_tasks_per_minute(&self) -> f64 {
        let inner = self.inner.lock().expect("progress tracker lock poisoned");
        let elapsed_minutes = (Utc::now() - inner.started_at).num_milliseconds() as f64 / 60_000.0;
        if elapsed_minutes <= 0.0 {
            return 0.0;
        }
        let completed: u64 = inner.phases.values().map(|p| p.completed_tasks).sum();
        completed as f64 / elapsed_minutes
    }

    pub fn throughput_phases_per_hour(&self) -> f64 {
        let inner = self.inner.lock().expect("progress tracker lock poisoned");
        let elapsed_hours = (Utc::now() - inner.started_at).num_milliseconds() as f64 / 3_600_000.0;
        if elapsed_hours <= 0.0 {
            return 0.0;
        }
        inner.completed_phases as f64 / elapsed_hours
    }

    /// Computes an ETA using the requested model, or auto-selects one
    /// (velocity if enough samples exist, else historical, else linear).
    pub fn eta(&self, model: Option<EtaModel>) -> EtaEstimate {
        let inner = self.inner.lock().expect("progress tracker lock poisoned");
        let progress = if inner.phases.is_empty() {
            100.0
        } else {
            inner.phases.values().map(|p| p.percent).sum::<f64>() / inner.phases.len() as f64
        };
        let elapsed = (Utc::now() - inner.started_at).num_milliseconds() as f64 / 1000.0;
        let samples: Vec<(DateTime<Utc>, f64)> = inner
            .phases
            .values()
            .flat_map(|p| p.samples.iter().cloned())
            .collect();
        eta::estimate(
            model,
            progress,
            elapsed,
            &samples,
            inner.estimated_total_duration_seconds,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_phase_list_yields_full_progress() {
        let tracker = ProgressTracker::start_project(vec![], None);
        assert_eq!(tracker.project_progress(), 100.0);
    }

    #[test]
    fn project_progress_is_mean_of_phase_percents() {
        let tracker = ProgressTracker::start_project(vec!["p1".into(), "p2".into()], None);
        tracker.update_phase("p1", Some(100.0), true).unwrap();
        tracker.update_phase("p2", Some(0.0), false).unwrap();
        assert_eq!(tracker.project_progress(), 50.0);
    }

    #[test]
    fn unknown_phase_is_an_error() {
        let tracker = ProgressTracker::start_project(vec!["p1".into()], None);
        assert!(tracker.update_task("missing", "t1", 10.0, false).is_err());
    }

    #[test]
    fn phase_percent_without_override_is_weight_weighted() {
        let tracker = ProgressTracker::start_project(vec!["p1".into()], None);
        tracker.update_task_weighted("p1", "t1", 50.0, 1.0, false).unwrap();
        tracker.update_task_weighted("p1", "t2", 100.0, 3.0, true).unwrap();
        tracker.update_phase("p1", None, false).unwrap();
        assert_eq!(tracker.project_progress(), 75.0);
    }
}
