//! In-memory relay aliases and relay sets backed by the config document.
//!
//! Every URL stored here is already normalized; the mutating operations
//! validate and normalize their input before touching the maps.

use std::collections::BTreeMap;

use indexmap::IndexSet;
use thiserror::Error;

use crate::relay_url::{normalize_relay_url, RelayUrlError};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("relay alias can contain only alphanumeric letters, '-' and '_' (input: {0}).")]
    InvalidAlias(String),
    #[error("name of relay set can contain only alphanumeric letters, '-' and '_' (input: {0}).")]
    InvalidSetName(String),
    #[error(transparent)]
    Url(#[from] RelayUrlError),
    #[error("{}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n"))]
    Urls(Vec<RelayUrlError>),
    #[error("destination relay set must be different from source relay set.")]
    SameCopyTarget,
    #[error("new relay set name must be different from the old one.")]
    SameRenameTarget,
    #[error("relay set \"{0}\" not found.")]
    SetNotFound(String),
}

/// Alias and set names: non-empty, ASCII letters, digits, `-` and `_`.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub fn validate_alias(alias: &str) -> Result<(), StoreError> {
    if is_valid_name(alias) {
        Ok(())
    } else {
        Err(StoreError::InvalidAlias(alias.to_string()))
    }
}

pub fn validate_set_name(name: &str) -> Result<(), StoreError> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(StoreError::InvalidSetName(name.to_string()))
    }
}

/// Normalize every URL, failing with all invalid ones at once.
fn normalize_all_urls(urls: &[String]) -> Result<Vec<String>, StoreError> {
    let mut ok = vec![];
    let mut errs = vec![];
    for url in urls {
        match normalize_relay_url(url) {
            Ok(u) => ok.push(u),
            Err(e) => errs.push(e),
        }
    }
    if errs.is_empty() {
        Ok(ok)
    } else {
        Err(StoreError::Urls(errs))
    }
}

/// Alias name to relay URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayAliases {
    aliases: BTreeMap<String, String>,
}

impl RelayAliases {
    /// Wrap already validated and normalized aliases.
    pub fn new(aliases: BTreeMap<String, String>) -> Self {
        Self { aliases }
    }

    /// Snapshot of all aliases.
    pub fn list(&self) -> BTreeMap<String, String> {
        self.aliases.clone()
    }

    pub fn get(&self, alias: &str) -> Option<&str> {
        self.aliases.get(alias).map(String::as_str)
    }

    pub fn has(&self, alias: &str) -> bool {
        self.aliases.contains_key(alias)
    }

    /// Set (or overwrite) an alias.
    pub fn set(&mut self, alias: &str, url: &str) -> Result<(), StoreError> {
        validate_alias(alias)?;
        let url = normalize_relay_url(url)?;
        self.aliases.insert(alias.to_string(), url);
        Ok(())
    }

    /// Returns `false` if the alias did not exist.
    pub fn unset(&mut self, alias: &str) -> bool {
        self.aliases.remove(alias).is_some()
    }

    pub(crate) fn as_map(&self) -> &BTreeMap<String, String> {
        &self.aliases
    }
}

/// Set name to an ordered, duplicate-free list of relay URLs. A set is never
/// empty; removing its last member deletes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelaySets {
    sets: BTreeMap<String, Vec<String>>,
}

impl RelaySets {
    /// Wrap already validated and normalized sets.
    pub fn new(sets: BTreeMap<String, Vec<String>>) -> Self {
        Self { sets }
    }

    /// Snapshot of all sets.
    pub fn list_all(&self) -> BTreeMap<String, Vec<String>> {
        self.sets.clone()
    }

    pub fn list_relays_of(&self, name: &str) -> Option<Vec<String>> {
        self.sets.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.sets.contains_key(name)
    }

    /// Add URLs to a set, creating it if needed. Returns whether any URL was new.
    pub fn add_relay_urls_to(&mut self, name: &str, urls: &[String]) -> Result<bool, StoreError> {
        validate_set_name(name)?;
        let urls = normalize_all_urls(urls)?;

        let current = self.sets.get(name).cloned().unwrap_or_default();
        let mut merged: IndexSet<String> = current.iter().cloned().collect();
        merged.extend(urls);
        if merged.len() == current.len() {
            return Ok(false);
        }
        self.sets.insert(name.to_string(), merged.into_iter().collect());
        Ok(true)
    }

    /// Remove URLs from a set. Returns whether anything changed.
    ///
    /// URLs are normalized before matching; ones that cannot be normalized
    /// match nothing.
    pub fn remove_relay_urls_from(&mut self, name: &str, urls: &[String]) -> bool {
        let Some(current) = self.sets.get(name) else {
            return false;
        };
        let removing: IndexSet<String> = urls
            .iter()
            .filter_map(|u| normalize_relay_url(u).ok())
            .collect();
        let remaining: Vec<String> = current
            .iter()
            .filter(|u| !removing.contains(*u))
            .cloned()
            .collect();
        if remaining.len() == current.len() {
            return false;
        }
        if remaining.is_empty() {
            self.sets.remove(name);
        } else {
            self.sets.insert(name.to_string(), remaining);
        }
        true
    }

    /// Copy `src` to `dst`, overwriting `dst`.
    pub fn copy(&mut self, src: &str, dst: &str) -> Result<(), StoreError> {
        if src == dst {
            return Err(StoreError::SameCopyTarget);
        }
        validate_set_name(dst)?;
        let relays = self
            .list_relays_of(src)
            .ok_or_else(|| StoreError::SetNotFound(src.to_string()))?;
        self.sets.insert(dst.to_string(), relays);
        Ok(())
    }

    /// Rename `old` to `new`, overwriting `new`.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<(), StoreError> {
        if old == new {
            return Err(StoreError::SameRenameTarget);
        }
        validate_set_name(new)?;
        let relays = self
            .sets
            .remove(old)
            .ok_or_else(|| StoreError::SetNotFound(old.to_string()))?;
        self.sets.insert(new.to_string(), relays);
        Ok(())
    }

    /// Returns `false` if the set did not exist.
    pub fn delete(&mut self, name: &str) -> bool {
        self.sets.remove(name).is_some()
    }

    pub(crate) fn as_map(&self) -> &BTreeMap<String, Vec<String>> {
        &self.sets
    }
}
