//! Bounded full-text search vectors for issues.
//!
//! Every event appends a little text to its issue's vector. [`IndexMaintainer`]
//! keeps the result within a lexeme budget and a byte ceiling, so appends never
//! fail no matter how much text an issue accumulates.

pub mod analyzer;
pub mod config;
pub mod event_text;
pub mod maintainer;
pub mod metrics_defs;
pub mod vector;

pub use analyzer::{Language, TextSearchConfig, UnknownTextSearchConfig};
pub use config::{Config, IndexLimits, TruncationOrder};
pub use event_text::{EventSearchFields, search_text};
pub use maintainer::{AppendOutcome, AppendResult, IndexMaintainer};
pub use vector::{Position, SearchVector, VectorParseError, Weight};
