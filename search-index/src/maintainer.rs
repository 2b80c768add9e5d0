use crate::analyzer::TextSearchConfig;
use crate::config::{IndexLimits, TruncationOrder};
use crate::metrics_defs::{
    APPEND_INPUT_CLAMPED, APPEND_OVERSIZED, APPEND_SATURATED, APPEND_TRUNCATED, VECTOR_BYTES,
};
use crate::vector::SearchVector;
use shared::{counter, histogram};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The new text contributed nothing.
    Unchanged,
    Appended,
    /// Lexemes over the budget were evicted.
    Truncated { evicted: usize },
    /// The existing vector was already over the byte ceiling and was returned as is.
    Saturated,
    /// The result would not fit under the byte ceiling even without positions,
    /// so the existing vector was returned as is.
    Oversized,
}

impl AppendOutcome {
    /// Whether the returned vector differs from the existing one and has to
    /// be written back.
    pub fn changed(self) -> bool {
        matches!(self, AppendOutcome::Appended | AppendOutcome::Truncated { .. })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AppendResult {
    pub vector: SearchVector,
    pub outcome: AppendOutcome,
}

/// Folds new event text into an issue's search vector while keeping it under
/// the configured lexeme and byte limits.
///
/// The result depends only on the arguments, so callers may run appends for
/// different issues in parallel. Appends for the same issue have to be
/// serialized by the caller (the storage adapter does this with a write
/// transaction).
#[derive(Clone, Debug, Default)]
pub struct IndexMaintainer {
    limits: IndexLimits,
}

impl IndexMaintainer {
    pub fn new(limits: IndexLimits) -> Self {
        IndexMaintainer { limits }
    }

    pub fn limits(&self) -> &IndexLimits {
        &self.limits
    }

    pub fn append(
        &self,
        existing: Option<&SearchVector>,
        new_text: &str,
        max_lexemes: usize,
        config: TextSearchConfig,
    ) -> SearchVector {
        self.append_detailed(existing, new_text, max_lexemes, config)
            .vector
    }

    /// Same as [`IndexMaintainer::append`], but also reports what happened.
    /// Never fails: inputs that would overflow degrade to a partial update or
    /// to returning `existing` unchanged.
    pub fn append_detailed(
        &self,
        existing: Option<&SearchVector>,
        new_text: &str,
        max_lexemes: usize,
        config: TextSearchConfig,
    ) -> AppendResult {
        let empty = SearchVector::new();
        let existing = existing.unwrap_or(&empty);

        let text = clamp_to_bytes(new_text, self.limits.max_input_bytes);
        if text.len() < new_text.len() {
            counter!(APPEND_INPUT_CLAMPED).increment(1);
            tracing::debug!(
                input_bytes = new_text.len(),
                kept_bytes = text.len(),
                "Clamped search text"
            );
        }

        let existing_bytes = existing.byte_size();
        if existing_bytes > self.limits.max_vector_bytes {
            counter!(APPEND_SATURATED).increment(1);
            tracing::debug!(existing_bytes, "Search vector saturated, skipping append");
            return AppendResult {
                vector: existing.clone(),
                outcome: AppendOutcome::Saturated,
            };
        }

        let incoming = config.to_vector(text);
        let mut combined = match self.limits.truncation {
            // Recency is read from positions, so they must not clamp or overflow.
            TruncationOrder::Recent if !existing.concat_is_lossless(&incoming) => {
                existing.compact_positions().concat(&incoming)
            }
            _ => existing.concat(&incoming),
        };
        if combined.is_empty() {
            return AppendResult {
                vector: combined,
                outcome: AppendOutcome::Unchanged,
            };
        }

        let evicted = truncate(&mut combined, max_lexemes, self.limits.truncation);
        if evicted > 0 {
            counter!(APPEND_TRUNCATED).increment(1);
        }

        if combined.byte_size() > self.limits.max_vector_bytes {
            let stripped = combined.strip();
            if stripped.byte_size() > self.limits.max_vector_bytes {
                counter!(APPEND_OVERSIZED).increment(1);
                tracing::warn!(
                    lexemes = stripped.len(),
                    bytes = stripped.byte_size(),
                    "Search vector would exceed the byte ceiling, dropping append"
                );
                return AppendResult {
                    vector: existing.clone(),
                    outcome: AppendOutcome::Oversized,
                };
            }
            combined = stripped;
        }

        histogram!(VECTOR_BYTES).record(combined.byte_size() as f64);

        let outcome = if evicted > 0 {
            AppendOutcome::Truncated { evicted }
        } else if combined == *existing {
            AppendOutcome::Unchanged
        } else {
            AppendOutcome::Appended
        };

        AppendResult {
            vector: combined,
            outcome,
        }
    }
}

/// Cuts `text` to at most `max_bytes`, backing off to a char boundary.
fn clamp_to_bytes(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn truncate(vector: &mut SearchVector, max_lexemes: usize, order: TruncationOrder) -> usize {
    if vector.len() <= max_lexemes {
        return 0;
    }
    match order {
        TruncationOrder::Lexical => vector.retain_first(max_lexemes),
        TruncationOrder::Recent => {
            let evict: Vec<String> = {
                let mut ranked: Vec<(u16, &str)> = vector
                    .lexemes()
                    .map(|lexeme| {
                        let last = vector
                            .positions(lexeme)
                            .and_then(|p| p.last())
                            .map_or(0, |p| p.pos);
                        (last, lexeme)
                    })
                    .collect();
                ranked.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
                ranked[max_lexemes..]
                    .iter()
                    .map(|(_, lexeme)| lexeme.to_string())
                    .collect()
            };
            vector.delete(evict.iter().map(String::as_str))
        }
    }
}
