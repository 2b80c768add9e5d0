//! Builds the short text that one event contributes to its issue's search
//! vector. Only a few high-signal fields are used and each is capped, so the
//! per-event text stays small no matter how large the payload is.
use serde::Deserialize;
use std::collections::BTreeSet;
use url::Url;

const MAX_PART_CHARS: usize = 250;
const MAX_FILENAME_CHARS: usize = 100;
const MAX_TOTAL_FILENAMES: usize = 5;
const MAX_FRAMES_PER_STACKTRACE: usize = 3;
const MAX_STACKTRACES: usize = 2;
const MAX_SEARCH_TEXT_BYTES: usize = 2048;

/// The subset of an event payload that feeds search.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EventSearchFields {
    pub title: Option<String>,
    pub transaction: Option<String>,
    pub request: Option<RequestFields>,
    pub exception: Option<ExceptionFields>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RequestFields {
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ExceptionFields {
    Values {
        #[serde(default)]
        values: Vec<ExceptionValue>,
    },
    List(Vec<ExceptionValue>),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExceptionValue {
    pub stacktrace: Option<Stacktrace>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Stacktrace {
    pub frames: Vec<Frame>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Frame {
    pub filename: Option<String>,
}

impl EventSearchFields {
    pub fn from_json(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    fn exception_values(&self) -> &[ExceptionValue] {
        match &self.exception {
            Some(ExceptionFields::Values { values }) => values,
            Some(ExceptionFields::List(values)) => values,
            None => &[],
        }
    }
}

/// Returns the sorted, de-duplicated, space separated search text for an
/// event, at most 2048 bytes long.
pub fn search_text(event: &EventSearchFields) -> String {
    let mut parts = BTreeSet::new();

    if let Some(title) = &event.title {
        parts.insert(truncate_chars(title, MAX_PART_CHARS).to_string());
    }
    if let Some(transaction) = &event.transaction {
        parts.insert(truncate_chars(transaction, MAX_PART_CHARS).to_string());
    }
    if let Some(url) = event.request.as_ref().and_then(|r| r.url.as_deref()) {
        parts.insert(simplify_url(url));
    }
    parts.extend(
        frame_basenames(event.exception_values())
            .into_iter()
            .take(MAX_TOTAL_FILENAMES),
    );
    parts.retain(|part| !part.is_empty());

    let joined = parts.into_iter().collect::<Vec<_>>().join(" ");
    cut_at_space(&joined, MAX_SEARCH_TEXT_BYTES).replace('\0', "")
}

fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Reduces a URL to `scheme://host[:port]/path`, dropping credentials, query
/// and fragment. Relative or unparsable URLs keep only their path part.
fn simplify_url(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let Ok(parsed) = Url::parse(url) else {
        return truncate_chars(without_query, MAX_PART_CHARS).to_string();
    };

    // The parser always reports "/" for a bare origin.
    let path = match parsed.path() {
        "/" if !without_query.ends_with('/') => "",
        path => truncate_chars(path, MAX_PART_CHARS),
    };
    let origin = match (parsed.host_str(), parsed.port()) {
        (Some(host), Some(port)) => format!("{}://{host}:{port}", parsed.scheme()),
        (Some(host), None) => format!("{}://{host}", parsed.scheme()),
        (None, _) => String::new(),
    };
    truncate_chars(&format!("{origin}{path}"), MAX_PART_CHARS).to_string()
}

/// File basenames of the innermost frames, a few per stacktrace.
fn frame_basenames(values: &[ExceptionValue]) -> Vec<String> {
    let mut names = Vec::new();
    let mut stacktraces = 0;

    for stacktrace in values.iter().filter_map(|v| v.stacktrace.as_ref()) {
        if stacktraces >= MAX_STACKTRACES {
            break;
        }
        let before = names.len();
        names.extend(
            stacktrace
                .frames
                .iter()
                .rev()
                .filter_map(|frame| frame.filename.as_deref())
                .map(|filename| filename.rsplit('/').next().unwrap_or(filename))
                .map(|basename| truncate_chars(basename, MAX_FILENAME_CHARS))
                .filter(|basename| !basename.is_empty())
                .take(MAX_FRAMES_PER_STACKTRACE)
                .map(str::to_string),
        );
        if names.len() > before {
            stacktraces += 1;
        }
    }

    names
}

/// Cuts `text` to `max_bytes`, preferring the last space before the limit so
/// that words are not split.
fn cut_at_space(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    if let Some(idx) = text.as_bytes()[..max_bytes].iter().rposition(|b| *b == b' ') {
        return &text[..idx];
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(json: &str) -> EventSearchFields {
        EventSearchFields::from_json(json.as_bytes()).unwrap()
    }

    #[test]
    fn test_search_text_from_event() {
        let event = fields(
            r#"{
                "title": "TypeError: x is undefined",
                "transaction": "/checkout",
                "request": {"url": "https://user:pw@shop.example.com:8443/cart/items?id=1#top"},
                "exception": {"values": [{
                    "type": "TypeError",
                    "stacktrace": {"frames": [
                        {"filename": "/app/node_modules/lib/a.js"},
                        {"filename": "/app/src/b.js"},
                        {"filename": null},
                        {"filename": "/app/src/c.js"},
                        {"filename": "/app/src/d.js"}
                    ]}
                }]},
                "extra": {"ignored": true}
            }"#,
        );

        assert_eq!(
            search_text(&event),
            "/checkout TypeError: x is undefined b.js c.js d.js \
             https://shop.example.com:8443/cart/items"
        );
    }

    #[test]
    fn test_exception_list_form_and_limits() {
        let frames = |prefix: &str| {
            (0..5)
                .map(|i| format!(r#"{{"filename": "src/{prefix}{i}.py"}}"#))
                .collect::<Vec<_>>()
                .join(",")
        };
        let json = format!(
            r#"{{"exception": [
                {{"stacktrace": {{"frames": [{}]}}}},
                {{"stacktrace": null}},
                {{"stacktrace": {{"frames": [{}]}}}},
                {{"stacktrace": {{"frames": [{}]}}}}
            ]}}"#,
            frames("a"),
            frames("b"),
            frames("c"),
        );
        let text = search_text(&fields(&json));

        // Last three frames of the first two stacktraces, capped at five names.
        assert_eq!(text, "a2.py a3.py a4.py b3.py b4.py");
    }

    #[test]
    fn test_duplicates_and_empty_parts() {
        let event = fields(r#"{"title": "same", "transaction": "same", "request": {"url": ""}}"#);
        assert_eq!(search_text(&event), "same");
        assert_eq!(search_text(&EventSearchFields::default()), "");
    }

    #[test]
    fn test_relative_url_keeps_path_only() {
        assert_eq!(simplify_url("/relative/path"), "/relative/path");
        assert_eq!(
            simplify_url("/checkout/pay?card_token=s3cr3t#step2"),
            "/checkout/pay"
        );
        assert_eq!(simplify_url("cart#items"), "cart");
        assert_eq!(simplify_url("?only=query"), "");
        let long = format!("/{}?q=1", "p".repeat(400));
        assert_eq!(simplify_url(&long).chars().count(), MAX_PART_CHARS);
    }

    #[test]
    fn test_bare_origin_has_no_trailing_slash() {
        assert_eq!(simplify_url("http://host.test"), "http://host.test");
        assert_eq!(simplify_url("http://host.test?q=1"), "http://host.test");
        assert_eq!(simplify_url("http://host.test/"), "http://host.test/");
        assert_eq!(simplify_url("https://host.test:8443/a?b=c"), "https://host.test:8443/a");

        let event = fields(r#"{"request": {"url": "/login?password=hunter2"}}"#);
        assert_eq!(search_text(&event), "/login");
    }

    #[test]
    fn test_long_text_is_cut_at_space() {
        let title = "a".repeat(240);
        let transaction = "b".repeat(240);
        let mut event = EventSearchFields {
            title: Some(title.clone()),
            transaction: Some(transaction),
            ..Default::default()
        };
        assert_eq!(search_text(&event).len(), 481);

        assert_eq!(cut_at_space("aaa bbb ccc", 9), "aaa bbb");
        assert_eq!(cut_at_space("aaaaaaaaaa", 4), "aaaa");
        assert_eq!(cut_at_space("ééééé", 3), "é");

        event.title = Some(format!("{title}\0nul"));
        assert!(!search_text(&event).contains('\0'));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 5), "abc");
    }
}
