use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::{DatasetId, DatasetState};
use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetStatus {
    pub id: DatasetId,
    pub state: DatasetState,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WaitOutcome {
    pub statuses: Vec<DatasetStatus>,
}

impl WaitOutcome {
    pub fn failed(&self) -> Vec<&DatasetId> {
        self.statuses
            .iter()
            .filter(|status| !status.state.is_ok())
            .map(|status| &status.id)
            .collect()
    }

    pub fn all_ok(&self) -> bool {
        self.statuses.iter().all(|status| status.state.is_ok())
    }
}

/// Fixed-interval poller for output datasets.
///
/// A dataset is done only once it reports `ok`. There is no timeout: a
/// dataset that errors or pauses and never reaches `ok` keeps the waiter
/// polling until the process is killed.
#[derive(Debug, Clone, Copy)]
pub struct JobWaiter {
    interval: Duration,
}

impl JobWaiter {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Sleeps, checks every id in order, and repeats until none is pending.
    /// A final pass re-reads each state; anything not `ok` counts as failed.
    pub fn wait<F>(&self, ids: &[DatasetId], mut fetch: F, sink: &dyn ProgressSink) -> WaitOutcome
    where
        F: FnMut(&DatasetId) -> Result<DatasetState, PipelineError>,
    {
        let mut last_seen: HashMap<&DatasetId, DatasetState> = HashMap::new();
        if ids.is_empty() {
            return WaitOutcome::default();
        }

        loop {
            thread::sleep(self.interval);
            let mut pending = 0usize;
            for id in ids {
                match fetch(id) {
                    Ok(state) => {
                        let marker = if state.is_ok() { " (done)" } else { "" };
                        sink.event(ProgressEvent::info(format!("  Dataset {id}: {state}{marker}")));
                        if !state.is_ok() {
                            pending += 1;
                        }
                        last_seen.insert(id, state);
                    }
                    Err(err) => {
                        sink.event(ProgressEvent::warn(format!(
                            "  Dataset {id}: state unavailable ({err})"
                        )));
                        pending += 1;
                    }
                }
            }
            if pending == 0 {
                break;
            }
            sink.event(ProgressEvent::info(format!("{pending} job(s) still running...")));
        }

        let statuses = ids
            .iter()
            .map(|id| {
                let state = match fetch(id) {
                    Ok(state) => state,
                    Err(err) => {
                        sink.event(ProgressEvent::warn(format!(
                            "  Dataset {id}: final check failed ({err}); using last seen state"
                        )));
                        last_seen
                            .remove(id)
                            .unwrap_or_else(|| DatasetState::Other("unknown".to_string()))
                    }
                };
                DatasetStatus {
                    id: id.clone(),
                    state,
                }
            })
            .collect();
        WaitOutcome { statuses }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        lines: Mutex<Vec<String>>,
    }

    impl ProgressSink for Recorder {
        fn event(&self, event: ProgressEvent) {
            self.lines.lock().unwrap().push(event.message);
        }
    }

    fn scripted(
        script: Vec<(&'static str, Vec<&'static str>)>,
    ) -> RefCell<HashMap<DatasetId, VecDeque<&'static str>>> {
        RefCell::new(
            script
                .into_iter()
                .map(|(id, states)| (DatasetId::from(id), states.into_iter().collect()))
                .collect(),
        )
    }

    fn next_state(
        script: &RefCell<HashMap<DatasetId, VecDeque<&'static str>>>,
        id: &DatasetId,
    ) -> Result<DatasetState, PipelineError> {
        let mut script = script.borrow_mut();
        let queue = script.get_mut(id).unwrap();
        let state = if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue[0]
        };
        if state == "boom" {
            return Err(PipelineError::GalaxyHttp("connection reset".to_string()));
        }
        Ok(DatasetState::from(state.to_string()))
    }

    #[test]
    fn waits_until_every_dataset_is_ok() {
        let script = scripted(vec![
            ("a", vec!["queued", "running", "ok"]),
            ("b", vec!["running", "ok"]),
        ]);
        let sink = Recorder::default();
        let waiter = JobWaiter::new(Duration::ZERO);
        let ids = vec![DatasetId::from("a"), DatasetId::from("b")];

        let outcome = waiter.wait(&ids, |id| next_state(&script, id), &sink);

        assert!(outcome.all_ok());
        assert!(outcome.failed().is_empty());
        let lines = sink.lines.lock().unwrap();
        assert!(lines.iter().any(|line| line.contains("still running")));
    }

    #[test]
    fn error_state_does_not_end_polling() {
        let script = scripted(vec![("a", vec!["error", "error", "ok"]), ("b", vec!["ok"])]);
        let sink = Recorder::default();
        let ids = vec![DatasetId::from("a"), DatasetId::from("b")];

        let outcome = JobWaiter::new(Duration::ZERO).wait(&ids, |id| next_state(&script, id), &sink);

        assert!(outcome.all_ok());
        let lines = sink.lines.lock().unwrap();
        assert_eq!(
            lines.iter().filter(|line| line.contains("Dataset a: error")).count(),
            2
        );
    }

    #[test]
    fn final_pass_reports_state_changes_as_failed() {
        let script = scripted(vec![("a", vec!["ok", "error"]), ("b", vec!["ok"])]);
        let sink = Recorder::default();
        let ids = vec![DatasetId::from("a"), DatasetId::from("b")];

        let outcome = JobWaiter::new(Duration::ZERO).wait(&ids, |id| next_state(&script, id), &sink);

        assert_eq!(outcome.failed(), vec![&DatasetId::from("a")]);
        assert_eq!(outcome.statuses[1].state, DatasetState::Ok);
    }

    #[test]
    fn fetch_errors_keep_dataset_pending() {
        let script = scripted(vec![("a", vec!["boom", "ok"])]);
        let sink = Recorder::default();
        let ids = vec![DatasetId::from("a")];

        let outcome = JobWaiter::new(Duration::ZERO).wait(&ids, |id| next_state(&script, id), &sink);

        assert!(outcome.all_ok());
        let lines = sink.lines.lock().unwrap();
        assert!(lines.iter().any(|line| line.contains("state unavailable")));
    }

    #[test]
    fn never_returns_with_pending_dataset() {
        let script = scripted(vec![("a", vec!["new", "queued", "running", "paused", "ok"])]);
        let sink = Recorder::default();
        let ids = vec![DatasetId::from("a")];

        let outcome = JobWaiter::new(Duration::ZERO).wait(&ids, |id| next_state(&script, id), &sink);

        assert!(outcome.all_ok());
    }
}
