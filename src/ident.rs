//! Normalization of event IDs and pubkeys given in any of the accepted forms
//! (64-char hex, NIP-19 bech32, or a `nostr:` URI wrapping the latter) into
//! canonical lowercase hex.

use thiserror::Error;

use crate::nip19::{self, Entity};

const NOSTR_URI_PREFIX: &str = "nostr:";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentError {
    #[error("invalid event ID specifier: {0}")]
    EventId(String),
    #[error("invalid pubkey specifier: {0}")]
    Pubkey(String),
}

/// Convert an event ID specifier (hex, `note`, `nevent`, optionally `nostr:`-prefixed) to hex.
pub fn to_hex_event_id(s: &str) -> Result<String, IdentError> {
    if is_hex32(s) {
        return Ok(s.to_string());
    }
    match nip19::decode(strip_nostr_uri(s)) {
        Ok(Entity::Note(id)) => Ok(hex::encode(id)),
        Ok(Entity::Event(ptr)) => Ok(hex::encode(ptr.id)),
        _ => Err(IdentError::EventId(s.to_string())),
    }
}

/// Convert a pubkey specifier (hex, `npub`, `nprofile`, optionally `nostr:`-prefixed) to hex.
pub fn to_hex_pubkey(s: &str) -> Result<String, IdentError> {
    if is_hex32(s) {
        return Ok(s.to_string());
    }
    match nip19::decode(strip_nostr_uri(s)) {
        Ok(Entity::Pubkey(pk)) => Ok(hex::encode(pk)),
        Ok(Entity::Profile(ptr)) => Ok(hex::encode(ptr.pubkey)),
        _ => Err(IdentError::Pubkey(s.to_string())),
    }
}

/// Run `normalize` over every value, returning either all results or every
/// failure message.
pub fn normalize_all<'a, I, F>(values: I, normalize: F) -> Result<Vec<String>, Vec<String>>
where
    I: IntoIterator<Item = &'a String>,
    F: Fn(&str) -> Result<String, IdentError>,
{
    let mut ok = vec![];
    let mut errs = vec![];
    for v in values {
        match normalize(v) {
            Ok(hex) => ok.push(hex),
            Err(e) => errs.push(e.to_string()),
        }
    }
    if errs.is_empty() {
        Ok(ok)
    } else {
        Err(errs)
    }
}

fn is_hex32(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn strip_nostr_uri(s: &str) -> &str {
    s.strip_prefix(NOSTR_URI_PREFIX).unwrap_or(s)
}
