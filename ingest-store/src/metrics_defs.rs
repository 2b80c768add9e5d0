//! Metrics definitions for the ingest store.

use shared::metrics_defs::{MetricDef, MetricType};

pub const ISSUE_APPEND_DURATION: MetricDef = MetricDef {
    name: "ingest_store.issue_append.duration",
    metric_type: MetricType::Histogram,
    description: "Time to read, append to and write back an issue's search vector in seconds",
};

pub const ISSUE_VECTOR_UNREADABLE: MetricDef = MetricDef {
    name: "ingest_store.issue_vector.unreadable",
    metric_type: MetricType::Counter,
    description: "Appends skipped because the stored search vector could not be parsed",
};

pub const ISSUE_BATCH_SIZE: MetricDef = MetricDef {
    name: "ingest_store.issue_batch.size",
    metric_type: MetricType::Histogram,
    description: "Number of distinct issues updated by one batch",
};

pub const ALL_METRICS: &[MetricDef] = &[
    ISSUE_APPEND_DURATION,
    ISSUE_VECTOR_UNREADABLE,
    ISSUE_BATCH_SIZE,
];
