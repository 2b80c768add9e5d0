//! Locating the public key in an ingest request.
//!
//! SDKs send the key either as a query parameter or inside an auth header of
//! the form `Sentry sentry_key=<key>, sentry_version=7, ...`. The query string
//! wins so that the body never has to be touched to authenticate.
use url::form_urlencoded;

const KEY_PARAMS: [&str; 2] = ["sentry_key", "glitchtip_key"];

/// Where an ingest request may carry its key.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestCredentials<'a> {
    pub query: Option<&'a str>,
    pub x_sentry_auth: Option<&'a str>,
    pub authorization: Option<&'a str>,
}

impl RequestCredentials<'_> {
    /// Returns the raw key. `X-Sentry-Auth` shadows `Authorization`.
    pub fn public_key(&self) -> Option<String> {
        if let Some(key) = self.query.and_then(key_from_query) {
            return Some(key);
        }
        self.x_sentry_auth
            .or(self.authorization)
            .and_then(key_from_auth_header)
    }
}

fn key_from_query(query: &str) -> Option<String> {
    form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
        .find(|(name, _)| KEY_PARAMS.iter().any(|param| *param == *name))
        .map(|(_, value)| value.into_owned())
}

fn key_from_auth_header(header: &str) -> Option<String> {
    let header = header.trim();
    // The scheme ("Sentry", "DSN") is optional.
    let params = match header.split_once(char::is_whitespace) {
        Some((scheme, rest)) if !scheme.contains('=') => rest,
        _ => header,
    };

    let pairs: Vec<(&str, &str)> = params
        .split(',')
        .filter_map(|item| item.split_once('='))
        .map(|(name, value)| (name.trim(), value.trim()))
        .collect();

    KEY_PARAMS.iter().find_map(|wanted| {
        pairs
            .iter()
            .find(|(name, _)| name == wanted)
            .map(|(_, value)| value.to_string())
    })
}
