//! Per-job execution history.
//!
//! Entries are kept in insertion order, which is also chronological order,
//! so "preceding" and "latest" are positional rather than timestamp based.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use famulus_core::{ExecutionState, JobExecution};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct HistoryStore {
    entries: Mutex<HashMap<Uuid, Vec<JobExecution>>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, execution: JobExecution) {
        let mut entries = self.lock();
        entries.entry(execution.job_id).or_default().push(execution);
    }

    /// All runs of a job, newest first.
    pub fn list(&self, job_id: Uuid) -> Vec<JobExecution> {
        self.lock()
            .get(&job_id)
            .map(|runs| runs.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get(&self, execution_id: Uuid) -> Option<JobExecution> {
        self.lock()
            .values()
            .flatten()
            .find(|execution| execution.id == execution_id)
            .cloned()
    }

    /// Mutate one run in place, returning the updated copy.
    pub fn update<F>(&self, execution_id: Uuid, apply: F) -> Option<JobExecution>
    where
        F: FnOnce(&mut JobExecution),
    {
        let mut entries = self.lock();
        for runs in entries.values_mut() {
            if let Some(execution) = runs.iter_mut().find(|e| e.id == execution_id) {
                apply(execution);
                return Some(execution.clone());
            }
        }
        None
    }

    /// Id of the queued run of a job, if one exists.
    pub fn waiting_execution(&self, job_id: Uuid) -> Option<Uuid> {
        self.lock().get(&job_id).and_then(|runs| {
            runs.iter()
                .find(|e| e.state == ExecutionState::Waiting)
                .map(|e| e.id)
        })
    }

    /// State of the most recent run that already ended.
    pub fn latest_terminal(&self, job_id: Uuid) -> Option<ExecutionState> {
        self.lock().get(&job_id).and_then(|runs| {
            runs.iter()
                .rev()
                .find(|e| e.is_terminal())
                .map(|e| e.state)
        })
    }

    /// Resolve a failed run of a job. Returns false when the run is
    /// unknown or not in the failed state.
    pub fn resolve(&self, job_id: Uuid, execution_id: Uuid) -> bool {
        let mut entries = self.lock();
        let Some(execution) = entries
            .get_mut(&job_id)
            .and_then(|runs| runs.iter_mut().find(|e| e.id == execution_id))
        else {
            return false;
        };
        if execution.state != ExecutionState::Failed {
            return false;
        }
        execution.mark_resolved();
        true
    }

    /// After a finished run, resolve the unbroken streak of failed runs
    /// right before it. Stops at the first older run that ended any other
    /// way. Returns how many runs were resolved.
    pub fn resolve_preceding_failures(&self, job_id: Uuid, finished_id: Uuid) -> usize {
        let mut entries = self.lock();
        let Some(runs) = entries.get_mut(&job_id) else {
            return 0;
        };
        let Some(position) = runs.iter().position(|e| e.id == finished_id) else {
            return 0;
        };
        let mut resolved = 0;
        for execution in runs[..position].iter_mut().rev() {
            match execution.state {
                ExecutionState::Failed => {
                    execution.mark_resolved();
                    resolved += 1;
                }
                // queued or running entries do not break the streak
                ExecutionState::Waiting | ExecutionState::Running => continue,
                _ => break,
            }
        }
        resolved
    }

    /// Drop finished and resolved runs beyond the newest `limit` of them.
    /// Unresolved failures and runs still in flight are never dropped.
    pub fn evict(&self, job_id: Uuid, limit: usize) {
        let mut entries = self.lock();
        let Some(runs) = entries.get_mut(&job_id) else {
            return;
        };
        let mut kept = 0;
        let mut stale = Vec::new();
        for index in (0..runs.len()).rev() {
            match runs[index].state {
                ExecutionState::Finished | ExecutionState::Resolved => {
                    kept += 1;
                    if kept > limit {
                        stale.push(index);
                    }
                }
                _ => {}
            }
        }
        // indices are descending, so removal does not shift later ones
        for index in stale {
            runs.remove(index);
        }
    }

    pub fn remove_job(&self, job_id: Uuid) {
        self.lock().remove(&job_id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Vec<JobExecution>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished(job_id: Uuid) -> JobExecution {
        let mut execution = JobExecution::waiting(job_id);
        execution.mark_running();
        execution.mark_finished();
        execution
    }

    fn failed(job_id: Uuid) -> JobExecution {
        let mut execution = JobExecution::waiting(job_id);
        execution.mark_running();
        execution.mark_failed("boom", Some("stage-1".to_string()));
        execution
    }

    #[test]
    fn test_list_is_newest_first() {
        let store = HistoryStore::new();
        let job_id = Uuid::new_v4();
        let first = finished(job_id);
        let second = finished(job_id);
        store.append(first.clone());
        store.append(second.clone());

        let listed = store.list(job_id);
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
    }

    #[test]
    fn test_latest_terminal_skips_live_runs() {
        let store = HistoryStore::new();
        let job_id = Uuid::new_v4();
        store.append(failed(job_id));
        let mut live = JobExecution::waiting(job_id);
        live.mark_running();
        store.append(live);

        assert_eq!(store.latest_terminal(job_id), Some(ExecutionState::Failed));
    }

    #[test]
    fn test_resolve_only_failed_runs() {
        let store = HistoryStore::new();
        let job_id = Uuid::new_v4();
        let done = finished(job_id);
        let broken = failed(job_id);
        store.append(done.clone());
        store.append(broken.clone());

        assert!(!store.resolve(job_id, done.id));
        // the job and execution ids must pair up
        assert!(!store.resolve(Uuid::new_v4(), broken.id));
        assert!(store.resolve(job_id, broken.id));
        assert_eq!(
            store.get(broken.id).map(|e| e.state),
            Some(ExecutionState::Resolved)
        );
        // a second resolve is a no-op
        assert!(!store.resolve(job_id, broken.id));
    }

    #[test]
    fn test_resolve_preceding_stops_at_finished() {
        let store = HistoryStore::new();
        let job_id = Uuid::new_v4();
        let old_failure = failed(job_id);
        let survivor = finished(job_id);
        let failure_a = failed(job_id);
        let failure_b = failed(job_id);
        let success = finished(job_id);
        for execution in [&old_failure, &survivor, &failure_a, &failure_b, &success] {
            store.append((*execution).clone());
        }

        let resolved = store.resolve_preceding_failures(job_id, success.id);
        assert_eq!(resolved, 2);
        assert_eq!(
            store.get(failure_a.id).map(|e| e.state),
            Some(ExecutionState::Resolved)
        );
        assert_eq!(
            store.get(failure_b.id).map(|e| e.state),
            Some(ExecutionState::Resolved)
        );
        // the failure behind the earlier finished run stays failed
        assert_eq!(
            store.get(old_failure.id).map(|e| e.state),
            Some(ExecutionState::Failed)
        );
    }

    #[test]
    fn test_evict_keeps_newest_and_pins_failures() {
        let store = HistoryStore::new();
        let job_id = Uuid::new_v4();
        let oldest = finished(job_id);
        let middle = finished(job_id);
        let pinned = failed(job_id);
        let newest = finished(job_id);
        for execution in [&oldest, &middle, &pinned, &newest] {
            store.append((*execution).clone());
        }

        store.evict(job_id, 2);

        let listed = store.list(job_id);
        assert_eq!(listed.len(), 3);
        assert!(store.get(oldest.id).is_none());
        assert!(store.get(middle.id).is_some());
        assert!(store.get(pinned.id).is_some());
        assert!(store.get(newest.id).is_some());
    }

    #[test]
    fn test_evict_keeps_runs_in_flight() {
        let store = HistoryStore::new();
        let job_id = Uuid::new_v4();
        let waiting = JobExecution::waiting(job_id);
        let waiting_id = waiting.id;
        store.append(finished(job_id));
        store.append(finished(job_id));
        store.append(waiting);

        store.evict(job_id, 1);

        assert!(store.get(waiting_id).is_some());
        assert_eq!(store.list(job_id).len(), 2);
    }

    #[test]
    fn test_update_mutates_in_place() {
        let store = HistoryStore::new();
        let job_id = Uuid::new_v4();
        let execution = JobExecution::waiting(job_id);
        let execution_id = execution.id;
        store.append(execution);

        let updated = store.update(execution_id, |e| e.mark_running());
        assert_eq!(updated.map(|e| e.state), Some(ExecutionState::Running));
        assert_eq!(
            store.get(execution_id).map(|e| e.state),
            Some(ExecutionState::Running)
        );
        assert!(store.update(Uuid::new_v4(), |_| {}).is_none());
    }

    #[test]
    fn test_waiting_execution_lookup() {
        let store = HistoryStore::new();
        let job_id = Uuid::new_v4();
        assert!(store.waiting_execution(job_id).is_none());
        let queued = JobExecution::waiting(job_id);
        let queued_id = queued.id;
        store.append(queued);
        assert_eq!(store.waiting_execution(job_id), Some(queued_id));
    }
}
