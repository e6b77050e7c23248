use std::sync::{Mutex, mpsc};
use std::time::Instant;

use crate::checkpoint::CheckpointId;

#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    TargetStarted {
        target: String,
        branch: String,
        resume_from: Option<String>,
    },
    NodeStarted {
        id: String,
        label: &'static str,
    },
    NodeSkipped {
        id: String,
    },
    NodeFailed {
        id: String,
        error: String,
    },
    MarkerDiscarded {
        id: String,
    },
    /// The marker could not be saved before `id` ran. A crash now would
    /// resume from an older point.
    MarkerWriteFailed {
        id: String,
        error: String,
    },
    Halted {
        id: String,
        remaining: i64,
    },
    TargetFinished {
        target: String,
        complete: bool,
        committed: bool,
        artifacts: usize,
    },
    RunDone {
        ok: bool,
        spent: i64,
        error: Option<String>,
    },
}

pub trait RunSink: Send + Sync {
    fn emit(&self, ev: RunEvent);
}

/// Prints one line per event and a summary block at the end.
#[derive(Default)]
pub struct StdoutSink {
    state: Mutex<StdoutSinkState>,
}

#[derive(Default)]
struct StdoutSinkState {
    started_at: Option<Instant>,
    targets: usize,
    complete: usize,
    nodes_run: usize,
    nodes_skipped: usize,
    nodes_failed: usize,
    failed_nodes: Vec<String>,
    marker_write_failures: usize,
    halted_at: Vec<String>,
}

impl StdoutSinkState {
    fn summary(&self, ok: bool, spent: i64, error: Option<&str>) -> String {
        let wall = self.started_at.map(|t| t.elapsed()).unwrap_or_default();
        let mut summary = String::new();
        summary.push_str("SUMMARY:\n");
        summary.push_str(&format!("  status: {}\n", if ok { "ok" } else { "failed" }));
        summary.push_str(&format!(
            "  targets: total={} complete={}\n",
            self.targets, self.complete
        ));
        summary.push_str(&format!(
            "  nodes: run={} skipped={} failed={}\n",
            self.nodes_run, self.nodes_skipped, self.nodes_failed
        ));
        summary.push_str(&format!("  budget_spent: {spent}\n"));
        if self.marker_write_failures > 0 {
            summary.push_str(&format!(
                "  marker_write_failures: {} (resume may repeat work)\n",
                self.marker_write_failures
            ));
        }
        summary.push_str(&format!("  elapsed: {}s\n", wall.as_secs()));
        if !self.halted_at.is_empty() {
            summary.push_str(&format!("  halted_at: {}\n", self.halted_at.join(", ")));
        }
        if !self.failed_nodes.is_empty() {
            summary.push_str(&format!(
                "  failed_nodes: {}\n",
                self.failed_nodes.join(", ")
            ));
        }
        if let Some(e) = error {
            summary.push_str(&format!("  error: {e}\n"));
        }
        summary
    }
}

impl RunSink for StdoutSink {
    fn emit(&self, ev: RunEvent) {
        let mut summary_print = None::<String>;
        match ev {
            RunEvent::TargetStarted {
                target,
                branch,
                resume_from,
            } => {
                if let Ok(mut s) = self.state.lock() {
                    s.targets = s.targets.saturating_add(1);
                    if s.started_at.is_none() {
                        s.started_at = Some(Instant::now());
                    }
                }
                match resume_from {
                    Some(m) => println!("TARGET: {target} on {branch} (resuming at {m})"),
                    None => println!("TARGET: {target} on {branch}"),
                }
            }
            RunEvent::NodeStarted { id, label } => {
                if let Ok(mut s) = self.state.lock() {
                    s.nodes_run = s.nodes_run.saturating_add(1);
                }
                println!("RUN: {id} ({label})");
            }
            RunEvent::NodeSkipped { id } => {
                if let Ok(mut s) = self.state.lock() {
                    s.nodes_skipped = s.nodes_skipped.saturating_add(1);
                }
                println!("SKIP: {id}");
            }
            RunEvent::NodeFailed { id, error } => {
                if let Ok(mut s) = self.state.lock() {
                    s.nodes_failed = s.nodes_failed.saturating_add(1);
                    s.failed_nodes.push(id.clone());
                }
                println!("FAIL: {id} {error}");
            }
            RunEvent::MarkerDiscarded { id } => {
                println!("WARN: resume point {id} no longer exists; continuing without it");
            }
            RunEvent::MarkerWriteFailed { id, error } => {
                if let Ok(mut s) = self.state.lock() {
                    s.marker_write_failures = s.marker_write_failures.saturating_add(1);
                }
                println!("WARN: failed to save resume point {id}: {error}");
            }
            RunEvent::Halted { id, remaining } => {
                if let Ok(mut s) = self.state.lock() {
                    s.halted_at.push(id.clone());
                }
                println!("HALT: {id} (budget {remaining})");
            }
            RunEvent::TargetFinished {
                target,
                complete,
                committed,
                artifacts,
            } => {
                if complete {
                    if let Ok(mut s) = self.state.lock() {
                        s.complete = s.complete.saturating_add(1);
                    }
                }
                println!(
                    "DONE: {target} {} artifacts={artifacts} committed={committed}",
                    if complete { "complete" } else { "incremental" }
                );
            }
            RunEvent::RunDone { ok, spent, error } => {
                if let Ok(mut s) = self.state.lock() {
                    let summary = s.summary(ok, spent, error.as_deref());
                    summary_print = Some(summary);
                    *s = StdoutSinkState::default();
                }
            }
        }
        if let Some(summary) = summary_print {
            print!("{summary}");
        }
    }
}

#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<RunEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<RunEvent>) -> Self {
        Self { tx }
    }
}

impl RunSink for ChannelSink {
    fn emit(&self, ev: RunEvent) {
        let _ = self.tx.send(ev);
    }
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl RunSink for NullSink {
    fn emit(&self, _ev: RunEvent) {}
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetOutcome {
    pub target: String,
    pub branch: String,
    pub complete: bool,
    pub committed: bool,
    pub artifacts: usize,
    /// Marker left for the next run, if any.
    pub resume_point: Option<CheckpointId>,
}

/// What happened during a run, in order.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Admitted steps, in execution order.
    pub executed: Vec<CheckpointId>,
    /// Admitted scopes. A scope is listed again when a resume passes through it.
    pub listed: Vec<CheckpointId>,
    pub skipped: Vec<CheckpointId>,
    pub failures: Vec<(CheckpointId, String)>,
    pub marker_write_failures: usize,
    pub discarded_markers: Vec<CheckpointId>,
    pub halted_at: Option<CheckpointId>,
    pub targets: Vec<TargetOutcome>,
    /// Fatal problems outside the traversal (commit, restore).
    pub errors: Vec<String>,
}

impl RunReport {
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn complete(&self) -> bool {
        self.halted_at.is_none() && self.targets.iter().all(|t| t.complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_sink_forwards_events_in_order() {
        let (tx, rx) = mpsc::channel();
        let sink = ChannelSink::new(tx);
        sink.emit(RunEvent::NodeStarted {
            id: "HOOKS".into(),
            label: "Hooks",
        });
        sink.emit(RunEvent::NodeSkipped { id: "INFO".into() });
        drop(sink);
        let got: Vec<RunEvent> = rx.iter().collect();
        assert_eq!(got.len(), 2);
        assert!(matches!(&got[1], RunEvent::NodeSkipped { id } if id == "INFO"));
    }

    #[test]
    fn summary_counts_marker_write_failures() {
        let sink = StdoutSink::default();
        let quiet = sink.state.lock().expect("lock").summary(true, 3, None);
        assert!(!quiet.contains("marker_write_failures"), "{quiet}");

        sink.emit(RunEvent::MarkerWriteFailed {
            id: "ISSUES/OPEN/1".into(),
            error: "read-only file system".into(),
        });
        sink.emit(RunEvent::MarkerWriteFailed {
            id: "ISSUES/OPEN/2".into(),
            error: "read-only file system".into(),
        });
        let summary = sink.state.lock().expect("lock").summary(true, 3, None);
        assert!(
            summary.contains("  marker_write_failures: 2 (resume may repeat work)\n"),
            "{summary}"
        );
        assert!(summary.contains("  budget_spent: 3\n"), "{summary}");
    }

    #[test]
    fn report_is_ok_without_fatal_errors() {
        let mut r = RunReport::default();
        r.failures.push(("HOOKS".parse().expect("id"), "boom".into()));
        assert!(r.ok());
        r.errors.push("commit failed".into());
        assert!(!r.ok());
    }
}
