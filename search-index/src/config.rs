use crate::analyzer::TextSearchConfig;
use serde::Deserialize;

pub const DEFAULT_MAX_LEXEMES: usize = 3800;
pub const DEFAULT_MAX_INPUT_BYTES: usize = 250_000;
pub const DEFAULT_MAX_VECTOR_BYTES: usize = 1_040_000;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("max_lexemes must be greater than 0")]
    ZeroMaxLexemes,
    #[error("max_input_bytes must be greater than 0")]
    ZeroMaxInputBytes,
    #[error("max_vector_bytes must be greater than 0")]
    ZeroMaxVectorBytes,
}

/// Which lexemes survive when a vector goes over its lexeme budget.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TruncationOrder {
    /// Keep the first lexemes in native (lexicographic) order. This favours
    /// alphabetically early words over recent or frequent ones.
    #[default]
    Lexical,
    /// Keep the lexemes seen most recently, i.e. with the highest positions.
    /// Lexemes without positions rank last; ties fall back to native order.
    /// When an append would clamp positions or overflow a lexeme's position
    /// list, the existing positions are first compacted to one per lexeme.
    Recent,
}

/// Hard limits applied by every append.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexLimits {
    /// New text is cut to this many bytes before it is tokenized.
    pub max_input_bytes: usize,
    /// Ceiling on the stored representation, in bytes.
    pub max_vector_bytes: usize,
    pub truncation: TruncationOrder,
}

impl Default for IndexLimits {
    fn default() -> Self {
        IndexLimits {
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
            max_vector_bytes: DEFAULT_MAX_VECTOR_BYTES,
            truncation: TruncationOrder::default(),
        }
    }
}

/// The `search_index` configuration section.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub max_lexemes: usize,
    pub text_search_config: TextSearchConfig,
    #[serde(flatten)]
    pub limits: IndexLimits,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_lexemes: DEFAULT_MAX_LEXEMES,
            text_search_config: TextSearchConfig::default(),
            limits: IndexLimits::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_lexemes == 0 {
            return Err(ValidationError::ZeroMaxLexemes);
        }
        if self.limits.max_input_bytes == 0 {
            return Err(ValidationError::ZeroMaxInputBytes);
        }
        if self.limits.max_vector_bytes == 0 {
            return Err(ValidationError::ZeroMaxVectorBytes);
        }
        Ok(())
    }
}
