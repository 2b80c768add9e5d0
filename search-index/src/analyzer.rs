//! Text-search configurations: named profiles that turn raw text into
//! lexemes.
use crate::vector::{MAX_LEXEME_BYTES, SearchVector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tantivy::tokenizer::{
    Language as StemmerLanguage, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer,
    StopWordFilter, TextAnalyzer, TokenStream,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Language {
    Arabic,
    Danish,
    Dutch,
    English,
    Finnish,
    French,
    German,
    Greek,
    Hungarian,
    Italian,
    Norwegian,
    Portuguese,
    Romanian,
    Russian,
    Spanish,
    Swedish,
    Tamil,
    Turkish,
}

const LANGUAGES: &[(&str, Language)] = &[
    ("arabic", Language::Arabic),
    ("danish", Language::Danish),
    ("dutch", Language::Dutch),
    ("english", Language::English),
    ("finnish", Language::Finnish),
    ("french", Language::French),
    ("german", Language::German),
    ("greek", Language::Greek),
    ("hungarian", Language::Hungarian),
    ("italian", Language::Italian),
    ("norwegian", Language::Norwegian),
    ("portuguese", Language::Portuguese),
    ("romanian", Language::Romanian),
    ("russian", Language::Russian),
    ("spanish", Language::Spanish),
    ("swedish", Language::Swedish),
    ("tamil", Language::Tamil),
    ("turkish", Language::Turkish),
];

impl Language {
    pub fn name(self) -> &'static str {
        LANGUAGES
            .iter()
            .find(|(_, lang)| *lang == self)
            .map(|(name, _)| *name)
            .unwrap_or("english")
    }

    fn stemmer_language(self) -> StemmerLanguage {
        match self {
            Language::Arabic => StemmerLanguage::Arabic,
            Language::Danish => StemmerLanguage::Danish,
            Language::Dutch => StemmerLanguage::Dutch,
            Language::English => StemmerLanguage::English,
            Language::Finnish => StemmerLanguage::Finnish,
            Language::French => StemmerLanguage::French,
            Language::German => StemmerLanguage::German,
            Language::Greek => StemmerLanguage::Greek,
            Language::Hungarian => StemmerLanguage::Hungarian,
            Language::Italian => StemmerLanguage::Italian,
            Language::Norwegian => StemmerLanguage::Norwegian,
            Language::Portuguese => StemmerLanguage::Portuguese,
            Language::Romanian => StemmerLanguage::Romanian,
            Language::Russian => StemmerLanguage::Russian,
            Language::Spanish => StemmerLanguage::Spanish,
            Language::Swedish => StemmerLanguage::Swedish,
            Language::Tamil => StemmerLanguage::Tamil,
            Language::Turkish => StemmerLanguage::Turkish,
        }
    }
}

/// A named normalization profile, e.g. `english` or `simple`.
///
/// `simple` only splits and lowercases. A language profile additionally drops
/// that language's stop words and reduces every word to its Snowball stem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TextSearchConfig {
    Simple,
    Language(Language),
}

impl Default for TextSearchConfig {
    fn default() -> Self {
        TextSearchConfig::Language(Language::English)
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown text search configuration: {0}")]
pub struct UnknownTextSearchConfig(pub String);

impl FromStr for TextSearchConfig {
    type Err = UnknownTextSearchConfig;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        if name == "simple" {
            return Ok(TextSearchConfig::Simple);
        }
        LANGUAGES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, lang)| TextSearchConfig::Language(*lang))
            .ok_or_else(|| UnknownTextSearchConfig(s.to_string()))
    }
}

impl TryFrom<String> for TextSearchConfig {
    type Error = UnknownTextSearchConfig;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TextSearchConfig> for String {
    fn from(config: TextSearchConfig) -> Self {
        config.to_string()
    }
}

impl fmt::Display for TextSearchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextSearchConfig::Simple => f.write_str("simple"),
            TextSearchConfig::Language(lang) => f.write_str(lang.name()),
        }
    }
}

impl TextSearchConfig {
    pub fn analyzer(self) -> TextAnalyzer {
        let builder = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(MAX_LEXEME_BYTES + 1))
            .filter(LowerCaser);

        match self {
            TextSearchConfig::Simple => builder.build(),
            TextSearchConfig::Language(lang) => {
                let lang = lang.stemmer_language();
                // Not every stemmer language ships a stop word list.
                match StopWordFilter::new(lang) {
                    Some(stop_words) => builder
                        .filter(stop_words)
                        .filter(Stemmer::new(lang))
                        .build(),
                    None => builder.filter(Stemmer::new(lang)).build(),
                }
            }
        }
    }

    /// Normalizes `text` into a vector. Positions are 1-based token ordinals;
    /// removed stop words still consume a position.
    pub fn to_vector(self, text: &str) -> SearchVector {
        let mut analyzer = self.analyzer();
        let mut stream = analyzer.token_stream(text);

        let mut tokens = Vec::new();
        while stream.advance() {
            let token = stream.token();
            let position = u32::try_from(token.position + 1).unwrap_or(u32::MAX);
            tokens.push((token.text.clone(), position));
        }

        SearchVector::from_tokens(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_english_stems() {
        let v = TextSearchConfig::default().to_vector("connection timeout");
        assert_eq!(v.to_string(), "'connect':1 'timeout':2");
    }

    #[test]
    fn test_english_stop_words_keep_positions() {
        let v = TextSearchConfig::default().to_vector("The connection was refused");
        assert!(!v.contains("the"));
        assert!(!v.contains("was"));
        assert_eq!(v.positions("connect").unwrap()[0].pos, 2);
        assert_eq!(v.positions("refus").unwrap()[0].pos, 4);
    }

    #[test]
    fn test_simple_only_lowercases() {
        let v = TextSearchConfig::Simple.to_vector("The Connection, the TIMEOUT");
        assert_eq!(v.to_string(), "'connection':2 'the':1,3 'timeout':4");
    }

    #[test]
    fn test_empty_and_punctuation_only() {
        assert!(TextSearchConfig::default().to_vector("").is_empty());
        assert!(TextSearchConfig::default().to_vector(" -- ... !!").is_empty());
    }

    #[test]
    fn test_long_words_are_dropped() {
        let text = format!("{} short", "x".repeat(MAX_LEXEME_BYTES + 1));
        let v = TextSearchConfig::Simple.to_vector(&text);
        assert_eq!(v.lexemes().collect::<Vec<_>>(), vec!["short"]);
    }

    #[test]
    fn test_parse_config() {
        assert_eq!(
            "english".parse::<TextSearchConfig>().unwrap(),
            TextSearchConfig::Language(Language::English)
        );
        assert_eq!(
            " German ".parse::<TextSearchConfig>().unwrap(),
            TextSearchConfig::Language(Language::German)
        );
        assert_eq!(
            "simple".parse::<TextSearchConfig>().unwrap(),
            TextSearchConfig::Simple
        );
        assert!("klingon".parse::<TextSearchConfig>().is_err());

        for (name, lang) in LANGUAGES {
            let config = TextSearchConfig::Language(*lang);
            assert_eq!(config.to_string(), *name);
            // Every profile builds an analyzer.
            let _ = config.to_vector("hello world");
        }
    }

    #[test]
    fn test_config_serde() {
        let config: TextSearchConfig = serde_yaml::from_str("french").unwrap();
        assert_eq!(config, TextSearchConfig::Language(Language::French));
        assert!(serde_yaml::from_str::<TextSearchConfig>("klingon").is_err());
        assert_eq!(serde_yaml::to_string(&config).unwrap().trim(), "french");
    }
}
