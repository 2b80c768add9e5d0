//! Metrics definitions for event authentication.

use shared::metrics_defs::{MetricDef, MetricType};

pub const NEGATIVE_CACHE_HIT: MetricDef = MetricDef {
    name: "event_auth.negative_cache.hit",
    metric_type: MetricType::Counter,
    description: "Number of authentications answered from the rejection cache",
};

pub const NEGATIVE_CACHE_MISS: MetricDef = MetricDef {
    name: "event_auth.negative_cache.miss",
    metric_type: MetricType::Counter,
    description: "Number of authentications that missed the rejection cache",
};

pub const EVENT_ACCEPTED: MetricDef = MetricDef {
    name: "event_auth.accepted",
    metric_type: MetricType::Counter,
    description: "Number of events accepted",
};

pub const EVENT_REJECTED: MetricDef = MetricDef {
    name: "event_auth.rejected",
    metric_type: MetricType::Counter,
    description: "Number of events rejected, tagged by reason",
};

pub const RESOLVE_DURATION: MetricDef = MetricDef {
    name: "event_auth.resolve.duration",
    metric_type: MetricType::Histogram,
    description: "Time spent resolving a project key against the auth source in seconds",
};

pub const ALL_METRICS: &[MetricDef] = &[
    NEGATIVE_CACHE_HIT,
    NEGATIVE_CACHE_MISS,
    EVENT_ACCEPTED,
    EVENT_REJECTED,
    RESOLVE_DURATION,
];
