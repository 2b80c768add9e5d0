//! Metrics definitions for search index maintenance.

use shared::metrics_defs::{MetricDef, MetricType};

pub const APPEND_INPUT_CLAMPED: MetricDef = MetricDef {
    name: "search_index.append.input_clamped",
    metric_type: MetricType::Counter,
    description: "Appends whose input text was cut to the input byte limit",
};

pub const APPEND_SATURATED: MetricDef = MetricDef {
    name: "search_index.append.saturated",
    metric_type: MetricType::Counter,
    description: "Appends skipped because the existing vector was already over the byte ceiling",
};

pub const APPEND_TRUNCATED: MetricDef = MetricDef {
    name: "search_index.append.truncated",
    metric_type: MetricType::Counter,
    description: "Appends that evicted lexemes to stay within the lexeme budget",
};

pub const APPEND_OVERSIZED: MetricDef = MetricDef {
    name: "search_index.append.oversized",
    metric_type: MetricType::Counter,
    description: "Appends dropped because the result would exceed the byte ceiling",
};

pub const VECTOR_BYTES: MetricDef = MetricDef {
    name: "search_index.vector.bytes",
    metric_type: MetricType::Histogram,
    description: "Size in bytes of the vector produced by an append",
};

pub const ALL_METRICS: &[MetricDef] = &[
    APPEND_INPUT_CLAMPED,
    APPEND_SATURATED,
    APPEND_TRUNCATED,
    APPEND_OVERSIZED,
    VECTOR_BYTES,
];
