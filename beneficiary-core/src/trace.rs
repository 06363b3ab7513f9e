//! Execution trace recorded by every pipeline run

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Started,
    Success,
    Partial,
    Error,
}

/// A finished pipeline stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub status: StageStatus,
    #[serde(default)]
    pub reasoning: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// In-flight stage; consumed by [`StageRecorder::finish`]
#[derive(Debug)]
pub struct StageRecorder {
    stage: Stage,
    started: Instant,
}

impl StageRecorder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            stage: Stage {
                name: name.into(),
                status: StageStatus::Started,
                reasoning: Vec::new(),
                decisions: Vec::new(),
                started_at: Utc::now(),
                duration_ms: 0,
            },
            started: Instant::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.stage.name
    }

    pub fn reason(&mut self, entry: impl Into<String>) {
        self.stage.reasoning.push(entry.into());
    }

    pub fn decide(&mut self, decision: impl Into<String>) {
        self.stage.decisions.push(decision.into());
    }

    pub fn finish(mut self, status: StageStatus) -> Stage {
        self.stage.status = status;
        self.stage.duration_ms = self.started.elapsed().as_millis() as u64;
        self.stage
    }
}

/// Ordered, append-only record of the stages of one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    stages: Vec<Stage>,
}

impl ExecutionTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_stage(&self, name: impl Into<String>) -> StageRecorder {
        StageRecorder::new(name)
    }

    pub fn push(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn error_count(&self) -> usize {
        self.stages
            .iter()
            .filter(|s| s.status == StageStatus::Error)
            .count()
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.stages.iter().map(|s| s.duration_ms).sum()
    }

    /// Copy of the trace with timing fields zeroed, for comparing runs
    pub fn without_timings(&self) -> Self {
        let epoch = DateTime::<Utc>::UNIX_EPOCH;
        Self {
            stages: self
                .stages
                .iter()
                .cloned()
                .map(|mut s| {
                    s.started_at = epoch;
                    s.duration_ms = 0;
                    s
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_appends_finished_stage() {
        let mut trace = ExecutionTrace::new();
        let mut stage = trace.start_stage("cache");
        stage.reason("looked up key acme");
        stage.decide("miss");
        trace.push(stage.finish(StageStatus::Partial));

        let mut stage = trace.start_stage("providers");
        stage.reason("all providers timed out");
        trace.push(stage.finish(StageStatus::Error));

        assert_eq!(trace.len(), 2);
        assert_eq!(trace.stages()[0].name, "cache");
        assert_eq!(trace.stages()[0].decisions, vec!["miss".to_string()]);
        assert_eq!(trace.error_count(), 1);
        assert!(trace.stage("providers").is_some());
    }

    #[test]
    fn test_without_timings_is_stable() {
        let mut a = ExecutionTrace::new();
        a.push(a.start_stage("cache").finish(StageStatus::Success));
        std::thread::sleep(std::time::Duration::from_millis(2));
        let mut b = ExecutionTrace::new();
        b.push(b.start_stage("cache").finish(StageStatus::Success));
        assert_eq!(a.without_timings(), b.without_timings());
    }
}
