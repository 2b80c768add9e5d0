//! Drives many concurrent appends against one issue, each worker with its own
//! database connection, the way independent ingest processes would.
use crate::CliError;
use crate::config::Config;
use ingest_store::{IssueAppend, IssueId, Store, StoreError};
use search_index::{AppendOutcome, IndexMaintainer};
use serde::Serialize;
use tokio::task::JoinSet;

const WORDS: &[&str] = &[
    "connection", "timeout", "refused", "database", "worker", "request", "handler", "queue",
    "socket", "payment", "checkout", "cache", "session", "token", "upload", "render",
];

#[derive(Debug, Default, PartialEq, Serialize)]
pub struct OutcomeCounts {
    pub appended: usize,
    pub truncated: usize,
    pub unchanged: usize,
    pub saturated: usize,
    pub oversized: usize,
    pub unreadable: usize,
}

impl OutcomeCounts {
    fn record(&mut self, result: &IssueAppend) {
        match result {
            IssueAppend::Applied(result) => match result.outcome {
                AppendOutcome::Appended => self.appended += 1,
                AppendOutcome::Truncated { .. } => self.truncated += 1,
                AppendOutcome::Unchanged => self.unchanged += 1,
                AppendOutcome::Saturated => self.saturated += 1,
                AppendOutcome::Oversized => self.oversized += 1,
            },
            IssueAppend::UnreadableVector => self.unreadable += 1,
        }
    }

    fn merge(&mut self, other: OutcomeCounts) {
        self.appended += other.appended;
        self.truncated += other.truncated;
        self.unchanged += other.unchanged;
        self.saturated += other.saturated;
        self.oversized += other.oversized;
        self.unreadable += other.unreadable;
    }

    fn total(&self) -> usize {
        self.appended
            + self.truncated
            + self.unchanged
            + self.saturated
            + self.oversized
            + self.unreadable
    }
}

#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub issue_id: IssueId,
    pub workers: usize,
    pub events: usize,
    pub outcomes: OutcomeCounts,
    pub lexemes: usize,
    pub bytes: usize,
}

/// Text for one synthetic event: a couple of common words plus a token that
/// is unique to the event, so the issue keeps growing.
fn event_text(worker: usize, event: usize) -> String {
    let first = WORDS[event % WORDS.len()];
    let second = WORDS[(event * 7 + worker) % WORDS.len()];
    format!("{first} {second} failed in module{worker}x{event}")
}

pub async fn simulate(
    config: &Config,
    issue_id: IssueId,
    workers: usize,
    events_per_worker: usize,
) -> Result<SimulationReport, CliError> {
    let mut join_set = JoinSet::new();

    for worker in 0..workers {
        let database = config.database.clone();
        let search = config.search_index;

        join_set.spawn_blocking(move || -> Result<OutcomeCounts, StoreError> {
            let store = Store::open(&database.path, &database.store)?;
            let maintainer = IndexMaintainer::new(search.limits);
            let mut counts = OutcomeCounts::default();

            for event in 0..events_per_worker {
                let result = store.append_issue_search_text(
                    issue_id,
                    &event_text(worker, event),
                    search.max_lexemes,
                    search.text_search_config,
                    &maintainer,
                )?;
                match result {
                    Some(result) => counts.record(&result),
                    None => {
                        tracing::warn!(issue_id, worker, "Issue disappeared, stopping worker");
                        break;
                    }
                }
            }

            tracing::debug!(worker, appends = counts.total(), "Worker finished");
            Ok(counts)
        });
    }

    let mut outcomes = OutcomeCounts::default();
    while let Some(joined) = join_set.join_next().await {
        outcomes.merge(joined??);
    }

    let store = Store::open(&config.database.path, &config.database.store)?;
    let vector = store
        .issue_search_vector(issue_id)?
        .ok_or(CliError::UnknownIssue(issue_id))?;

    Ok(SimulationReport {
        issue_id,
        workers,
        events: outcomes.total(),
        outcomes,
        lexemes: vector.len(),
        bytes: vector.byte_size(),
    })
}
