//! Relay URL validation and normalization.

use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayUrlError {
    #[error("invalid URL: {0}")]
    Invalid(String),
    #[error("relay URL must start with wss:// or ws:// (input: {0}).")]
    NotRelay(String),
}

/// Check that `url` parses and uses the `ws` or `wss` scheme.
pub fn validate_relay_url(url: &str) -> Result<(), RelayUrlError> {
    if Url::parse(url).is_err() {
        return Err(RelayUrlError::Invalid(url.to_string()));
    }
    if !(url.starts_with("wss://") || url.starts_with("ws://")) {
        return Err(RelayUrlError::NotRelay(url.to_string()));
    }
    Ok(())
}

pub fn is_relay_url(url: &str) -> bool {
    validate_relay_url(url).is_ok()
}

/// Normalize a relay URL so equivalent spellings compare equal.
///
/// Duplicate slashes in the path collapse, a trailing slash is dropped (the
/// bare root keeps its single `/`), default ports and the fragment are removed
/// and query parameters are sorted by key.
pub fn normalize_relay_url(url: &str) -> Result<String, RelayUrlError> {
    validate_relay_url(url)?;
    let mut parsed = Url::parse(url).map_err(|_| RelayUrlError::Invalid(url.to_string()))?;

    let mut path = String::with_capacity(parsed.path().len());
    for c in parsed.path().chars() {
        if !(c == '/' && path.ends_with('/')) {
            path.push(c);
        }
    }
    let trimmed = path.trim_end_matches('/').to_string();
    parsed.set_path(&trimmed);

    let mut pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
    if pairs.is_empty() {
        parsed.set_query(None);
    } else {
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        parsed.query_pairs_mut().clear().extend_pairs(pairs);
    }
    parsed.set_fragment(None);

    Ok(parsed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(s: &str) -> String {
        normalize_relay_url(s).unwrap()
    }

    #[test]
    fn root_gains_trailing_slash() {
        assert_eq!(norm("wss://x.com"), "wss://x.com/");
        assert_eq!(norm("wss://x.com/"), "wss://x.com/");
        assert_eq!(norm("wss://x.com//"), "wss://x.com/");
    }

    #[test]
    fn sub_path_loses_trailing_slash() {
        assert_eq!(norm("wss://x.com/sub"), "wss://x.com/sub");
        assert_eq!(norm("wss://x.com/sub/"), "wss://x.com/sub");
        assert_ne!(norm("wss://x.com/sub"), norm("wss://x.com"));
    }

    #[test]
    fn idempotent() {
        for s in [
            "wss://x.com",
            "ws://x.com:8080/a//b/",
            "wss://X.COM:443/?b=2&a=1#frag",
        ] {
            let once = norm(s);
            assert_eq!(norm(&once), once);
        }
    }

    #[test]
    fn strips_default_port_fragment_and_sorts_query() {
        assert_eq!(norm("wss://X.com:443/#frag"), "wss://x.com/");
        assert_eq!(norm("ws://x.com:80"), "ws://x.com/");
        assert_eq!(norm("ws://x.com:7777"), "ws://x.com:7777/");
        assert_eq!(norm("wss://x.com/?b=2&a=1"), "wss://x.com/?a=1&b=2");
    }

    #[test]
    fn validation() {
        assert!(is_relay_url("wss://relay.example.com"));
        assert!(is_relay_url("ws://127.0.0.1:7777"));
        assert_eq!(
            validate_relay_url("not-a-url"),
            Err(RelayUrlError::Invalid("not-a-url".into()))
        );
        assert_eq!(
            validate_relay_url("https://example.com"),
            Err(RelayUrlError::NotRelay("https://example.com".into()))
        );
        assert!(normalize_relay_url("https://example.com").is_err());
    }
}
