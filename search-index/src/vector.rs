//! In-memory model of an issue's full-text search representation.
//!
//! A [`SearchVector`] mirrors the relational engine's `tsvector`: a set of
//! lexemes kept in byte-wise lexicographic order, each with an optional list of
//! weighted positions. The engine's hard limits are reproduced here so that a
//! vector built in memory can always be written back without the engine
//! rejecting it.

use std::collections::BTreeMap;
use std::fmt;
use std::iter::Peekable;
use std::str::{Chars, FromStr};

/// Longest lexeme the engine will store, in bytes.
pub const MAX_LEXEME_BYTES: usize = 2047;
/// Largest position value. Larger positions are clamped to this value.
pub const MAX_POSITION: u16 = 16383;
/// Positions kept per lexeme. Extra positions are dropped.
pub const MAX_POSITIONS_PER_LEXEME: usize = 256;

// On-disk layout: varlena header + lexeme count, then one entry per lexeme.
const HEADER_BYTES: usize = 8;
const ENTRY_BYTES: usize = 4;
const POSITION_BYTES: usize = 2;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Weight {
    A,
    B,
    C,
    #[default]
    D,
}

impl Weight {
    fn label(self) -> Option<char> {
        match self {
            Weight::A => Some('A'),
            Weight::B => Some('B'),
            Weight::C => Some('C'),
            Weight::D => None,
        }
    }

    fn from_label(c: char) -> Option<Weight> {
        match c.to_ascii_uppercase() {
            'A' => Some(Weight::A),
            'B' => Some(Weight::B),
            'C' => Some(Weight::C),
            'D' => Some(Weight::D),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Position {
    pub pos: u16,
    pub weight: Weight,
}

impl Position {
    pub fn new(pos: u32) -> Self {
        Position {
            pos: clamp_position(pos),
            weight: Weight::D,
        }
    }

    pub fn with_weight(pos: u32, weight: Weight) -> Self {
        Position {
            pos: clamp_position(pos),
            weight,
        }
    }
}

fn clamp_position(pos: u32) -> u16 {
    pos.clamp(1, u32::from(MAX_POSITION)) as u16
}

/// Sorts by position, merges duplicates (the stronger weight wins) and caps
/// the list at [`MAX_POSITIONS_PER_LEXEME`].
fn normalize_positions(positions: &mut Vec<Position>) {
    positions.sort_by_key(|p| (p.pos, p.weight));
    positions.dedup_by_key(|p| p.pos);
    positions.truncate(MAX_POSITIONS_PER_LEXEME);
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum VectorParseError {
    #[error("unterminated quoted lexeme")]
    UnterminatedQuote,
    #[error("empty lexeme")]
    EmptyLexeme,
    #[error("lexeme is too long ({0} bytes, max 2047)")]
    LexemeTooLong(usize),
    #[error("invalid position list for lexeme '{0}'")]
    InvalidPositions(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchVector {
    entries: BTreeMap<String, Vec<Position>>,
}

impl SearchVector {
    pub fn new() -> Self {
        SearchVector::default()
    }

    /// Builds a vector from `(lexeme, position)` pairs as produced by an
    /// analyzer. Empty and over-long lexemes are skipped.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        let mut entries: BTreeMap<String, Vec<Position>> = BTreeMap::new();
        for (lexeme, pos) in tokens {
            let lexeme = lexeme.into();
            if lexeme.is_empty() || lexeme.len() > MAX_LEXEME_BYTES {
                continue;
            }
            entries.entry(lexeme).or_default().push(Position::new(pos));
        }
        for positions in entries.values_mut() {
            normalize_positions(positions);
        }
        SearchVector { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of unique lexemes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, lexeme: &str) -> bool {
        self.entries.contains_key(lexeme)
    }

    /// Lexemes in native (byte-wise lexicographic) order.
    pub fn lexemes(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn positions(&self, lexeme: &str) -> Option<&[Position]> {
        self.entries.get(lexeme).map(Vec::as_slice)
    }

    pub fn has_positions(&self) -> bool {
        self.entries.values().any(|p| !p.is_empty())
    }

    /// Highest position stored in the vector, 0 when there are none.
    pub fn max_position(&self) -> u16 {
        self.entries
            .values()
            .filter_map(|p| p.last())
            .map(|p| p.pos)
            .max()
            .unwrap_or(0)
    }

    /// Size of the stored representation in bytes, following the engine's
    /// tsvector layout. Lexemes with positions are 2-byte aligned and carry a
    /// position count.
    pub fn byte_size(&self) -> usize {
        let mut data = 0;
        for (lexeme, positions) in &self.entries {
            data += lexeme.len();
            if !positions.is_empty() {
                data += data % 2;
                data += POSITION_BYTES * (positions.len() + 1);
            }
        }
        HEADER_BYTES + ENTRY_BYTES * self.entries.len() + data
    }

    /// Concatenates two vectors. Positions of `other` are shifted past the
    /// highest position of `self`; shared lexemes merge their positions.
    pub fn concat(&self, other: &SearchVector) -> SearchVector {
        let shift = u32::from(self.max_position());
        let mut entries = self.entries.clone();
        for (lexeme, positions) in &other.entries {
            let slot = entries.entry(lexeme.clone()).or_default();
            slot.extend(
                positions
                    .iter()
                    .map(|p| Position::with_weight(u32::from(p.pos) + shift, p.weight)),
            );
            normalize_positions(slot);
        }
        SearchVector { entries }
    }

    /// Whether [`SearchVector::concat`] would keep every position of both
    /// operands: no shifted position clamps and no lexeme overflows its list.
    pub fn concat_is_lossless(&self, other: &SearchVector) -> bool {
        let top = u32::from(self.max_position()) + u32::from(other.max_position());
        if top > u32::from(MAX_POSITION) {
            return false;
        }
        other.entries.iter().all(|(lexeme, positions)| {
            self.entries.get(lexeme).map_or(0, Vec::len) + positions.len()
                <= MAX_POSITIONS_PER_LEXEME
        })
    }

    /// Keeps only the latest position of each lexeme and renumbers those
    /// densely from 1, preserving their order. Lexemes without positions stay
    /// without.
    pub fn compact_positions(&self) -> SearchVector {
        let mut latest: Vec<(u16, &str, Weight)> = self
            .entries
            .iter()
            .filter_map(|(lexeme, positions)| {
                positions.last().map(|p| (p.pos, lexeme.as_str(), p.weight))
            })
            .collect();
        latest.sort_by_key(|(pos, _, _)| *pos);

        let mut entries: BTreeMap<String, Vec<Position>> = self
            .entries
            .keys()
            .map(|lexeme| (lexeme.clone(), Vec::new()))
            .collect();
        let mut rank = 0;
        let mut previous = None;
        for (pos, lexeme, weight) in latest {
            if previous != Some(pos) {
                rank += 1;
                previous = Some(pos);
            }
            if let Some(slot) = entries.get_mut(lexeme) {
                slot.push(Position::with_weight(rank, weight));
            }
        }
        SearchVector { entries }
    }

    /// Returns a copy with every position removed.
    pub fn strip(&self) -> SearchVector {
        SearchVector {
            entries: self
                .entries
                .keys()
                .map(|lexeme| (lexeme.clone(), Vec::new()))
                .collect(),
        }
    }

    /// Removes the given lexemes, returning how many were present.
    pub fn delete<'a, I>(&mut self, lexemes: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        lexemes
            .into_iter()
            .filter(|lexeme| self.entries.remove(*lexeme).is_some())
            .count()
    }

    /// Keeps the first `n` lexemes in native order and drops the rest.
    /// Returns the number of evicted lexemes.
    pub fn retain_first(&mut self, n: usize) -> usize {
        let Some(cutoff) = self.entries.keys().nth(n).cloned() else {
            return 0;
        };
        self.entries.split_off(&cutoff).len()
    }
}

impl fmt::Display for SearchVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (lexeme, positions)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str("'")?;
            for c in lexeme.chars() {
                match c {
                    '\'' => f.write_str("''")?,
                    '\\' => f.write_str("\\\\")?,
                    c => write!(f, "{c}")?,
                }
            }
            f.write_str("'")?;
            for (j, position) in positions.iter().enumerate() {
                f.write_str(if j == 0 { ":" } else { "," })?;
                write!(f, "{}", position.pos)?;
                if let Some(label) = position.weight.label() {
                    write!(f, "{label}")?;
                }
            }
        }
        Ok(())
    }
}

impl FromStr for SearchVector {
    type Err = VectorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut entries: BTreeMap<String, Vec<Position>> = BTreeMap::new();
        let mut chars = s.chars().peekable();

        loop {
            while chars.next_if(|c| c.is_whitespace()).is_some() {}
            if chars.peek().is_none() {
                break;
            }

            let lexeme = if chars.next_if_eq(&'\'').is_some() {
                parse_quoted(&mut chars)?
            } else {
                parse_bare(&mut chars)
            };
            if lexeme.is_empty() {
                return Err(VectorParseError::EmptyLexeme);
            }
            if lexeme.len() > MAX_LEXEME_BYTES {
                return Err(VectorParseError::LexemeTooLong(lexeme.len()));
            }

            let positions = if chars.next_if_eq(&':').is_some() {
                parse_positions(&mut chars)
                    .ok_or_else(|| VectorParseError::InvalidPositions(lexeme.clone()))?
            } else {
                Vec::new()
            };
            if chars.peek().is_some_and(|c| !c.is_whitespace()) {
                return Err(VectorParseError::InvalidPositions(lexeme));
            }

            let slot = entries.entry(lexeme).or_default();
            slot.extend(positions);
            normalize_positions(slot);
        }

        Ok(SearchVector { entries })
    }
}

fn parse_quoted(chars: &mut Peekable<Chars<'_>>) -> Result<String, VectorParseError> {
    let mut lexeme = String::new();
    loop {
        match chars.next() {
            None => return Err(VectorParseError::UnterminatedQuote),
            Some('\\') => match chars.next() {
                Some(c) => lexeme.push(c),
                None => return Err(VectorParseError::UnterminatedQuote),
            },
            Some('\'') => {
                if chars.next_if_eq(&'\'').is_some() {
                    lexeme.push('\'');
                } else {
                    return Ok(lexeme);
                }
            }
            Some(c) => lexeme.push(c),
        }
    }
}

fn parse_bare(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut lexeme = String::new();
    while let Some(c) = chars.next_if(|c| !c.is_whitespace() && *c != ':') {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                lexeme.push(escaped);
            }
        } else {
            lexeme.push(c);
        }
    }
    lexeme
}

fn parse_positions(chars: &mut Peekable<Chars<'_>>) -> Option<Vec<Position>> {
    let mut positions = Vec::new();
    loop {
        let mut value: u32 = 0;
        let mut digits = 0;
        while let Some(d) = chars.next_if(char::is_ascii_digit) {
            value = value
                .saturating_mul(10)
                .saturating_add(d.to_digit(10).unwrap_or(0));
            digits += 1;
        }
        if digits == 0 || value == 0 {
            return None;
        }
        let weight = chars
            .next_if(|c| Weight::from_label(*c).is_some())
            .and_then(Weight::from_label)
            .unwrap_or_default();
        positions.push(Position::with_weight(value, weight));

        if chars.next_if_eq(&',').is_none() {
            return Some(positions);
        }
    }
}
