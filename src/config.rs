//! Persisted configuration: relay aliases and relay sets stored as TOML.
//!
//! Path resolution order:
//! 1. `--config <PATH>` (or the `NOSDUMP_CONFIG` environment variable)
//! 2. `<config dir>/nosdump/config.toml`

use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use directories::ProjectDirs;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{
    relay_store::{is_valid_name, RelayAliases, RelaySets},
    relay_url::{is_relay_url, normalize_relay_url},
};

/// Prefix marking a relay set reference in a relay specifier (`...<set>`).
pub const RELAY_SET_PREFIX: &str = "...";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine the config directory; pass --config")]
    NoConfigDir,
    #[error("failed to read config at {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error(
        "Config file validation error!\nPlease check and fix the config at: {}\n\n{}",
        path.display(),
        issues.iter().map(|i| format!("* {i}")).collect::<Vec<_>>().join("\n")
    )]
    Validation { path: PathBuf, issues: Vec<String> },
    #[error("failed to serialize config")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to write config to {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// On-disk shape of the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    pub relay: RelayDocument,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayDocument {
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub sets: BTreeMap<String, Vec<String>>,
}

/// Default location of the config file, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "nosdump").map(|dirs| dirs.config_dir().join("config.toml"))
}

pub fn resolve_config_path(explicit: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    explicit
        .or_else(default_config_path)
        .ok_or(ConfigError::NoConfigDir)
}

/// Relay aliases and sets loaded from (and savable to) a config document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigRepo {
    aliases: RelayAliases,
    sets: RelaySets,
}

impl ConfigRepo {
    /// Build a repo from a document without validating it. Meant for
    /// documents that are known to hold normalized values.
    pub fn from_document(doc: ConfigDocument) -> Self {
        Self {
            aliases: RelayAliases::new(doc.relay.aliases),
            sets: RelaySets::new(doc.relay.sets),
        }
    }

    /// Load the config at `path`. A missing file yields an empty config.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "config not found, starting empty");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::parse(&contents, path)
    }

    /// Parse and validate config text. `path` is only used for messages.
    pub fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let doc: toml::Table = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        validate_document(&doc).map_err(|issues| ConfigError::Validation {
            path: path.to_path_buf(),
            issues,
        })
    }

    pub fn to_document(&self) -> ConfigDocument {
        ConfigDocument {
            relay: RelayDocument {
                aliases: self.aliases.as_map().clone(),
                sets: self.sets.as_map().clone(),
            },
        }
    }

    /// Write the whole document to `path` atomically.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let data = toml::to_string_pretty(&self.to_document())?;
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(write_err)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(write_err)?;
        tmp.write_all(data.as_bytes()).map_err(write_err)?;
        tmp.persist(path).map_err(|e| write_err(e.error))?;
        debug!(path = %path.display(), "config saved");
        Ok(())
    }

    pub fn relay_aliases(&self) -> &RelayAliases {
        &self.aliases
    }

    pub fn relay_aliases_mut(&mut self) -> &mut RelayAliases {
        &mut self.aliases
    }

    pub fn relay_sets(&self) -> &RelaySets {
        &self.sets
    }

    pub fn relay_sets_mut(&mut self) -> &mut RelaySets {
        &mut self.sets
    }

    /// Resolve relay specifiers into a duplicate-free list of normalized URLs.
    ///
    /// A specifier is a relay URL, a relay alias, or `...<set>` naming a relay
    /// set. Every specifier that resolves to nothing yields one message.
    pub fn resolve_relay_specifiers(&self, specs: &[String]) -> Result<Vec<String>, Vec<String>> {
        let mut resolved = IndexSet::new();
        let mut errs = vec![];

        for spec in specs {
            if is_relay_url(spec) {
                if let Ok(url) = normalize_relay_url(spec) {
                    resolved.insert(url);
                    continue;
                }
            }
            if let Some(url) = self.aliases.get(spec) {
                resolved.insert(url.to_string());
                continue;
            }
            if let Some(members) = spec
                .strip_prefix(RELAY_SET_PREFIX)
                .and_then(|name| self.sets.list_relays_of(name))
            {
                resolved.extend(members);
                continue;
            }
            errs.push(format!("\"{spec}\" is not a valid relay URL or a relay alias."));
        }

        if errs.is_empty() {
            Ok(resolved.into_iter().collect())
        } else {
            Err(errs)
        }
    }
}

/// Check types, names and URLs of a parsed document, normalizing URLs and
/// deduplicating sets. Every violated field yields one issue. Empty sets are
/// dropped and unknown keys are ignored.
fn validate_document(doc: &toml::Table) -> Result<ConfigRepo, Vec<String>> {
    let mut issues = vec![];

    let relay = sub_table(doc, "relay", "relay", &mut issues);
    let alias_table = relay.and_then(|r| sub_table(r, "aliases", "relay.aliases", &mut issues));
    let set_table = relay.and_then(|r| sub_table(r, "sets", "relay.sets", &mut issues));

    let mut aliases = BTreeMap::new();
    for (alias, value) in alias_table.into_iter().flatten() {
        if !is_valid_name(alias) {
            issues.push(format!(
                "relay.aliases.{alias}: relay alias can contain only alphanumeric letters, '-' and '_'"
            ));
        }
        let Some(url) = value.as_str() else {
            issues.push(format!(
                "relay.aliases.{alias}: expected string, received {}",
                value.type_str()
            ));
            continue;
        };
        match normalize_relay_url(url) {
            Ok(url) => {
                aliases.insert(alias.clone(), url);
            }
            Err(e) => issues.push(format!("relay.aliases.{alias}: {e}")),
        }
    }

    let mut sets = BTreeMap::new();
    for (name, value) in set_table.into_iter().flatten() {
        if !is_valid_name(name) {
            issues.push(format!(
                "relay.sets.{name}: name of relay set can contain only alphanumeric letters, '-' and '_'"
            ));
        }
        let Some(urls) = value.as_array() else {
            issues.push(format!(
                "relay.sets.{name}: expected array, received {}",
                value.type_str()
            ));
            continue;
        };
        let mut members = IndexSet::new();
        for (i, url) in urls.iter().enumerate() {
            let Some(url) = url.as_str() else {
                issues.push(format!(
                    "relay.sets.{name}.{i}: expected string, received {}",
                    url.type_str()
                ));
                continue;
            };
            match normalize_relay_url(url) {
                Ok(url) => {
                    members.insert(url);
                }
                Err(e) => issues.push(format!("relay.sets.{name}.{i}: {e}")),
            }
        }
        if !members.is_empty() {
            sets.insert(name.clone(), members.into_iter().collect());
        }
    }

    if issues.is_empty() {
        Ok(ConfigRepo {
            aliases: RelayAliases::new(aliases),
            sets: RelaySets::new(sets),
        })
    } else {
        Err(issues)
    }
}

/// Look up an optional table. A present non-table value is an issue.
fn sub_table<'a>(
    parent: &'a toml::Table,
    key: &str,
    field: &str,
    issues: &mut Vec<String>,
) -> Option<&'a toml::Table> {
    let value = parent.get(key)?;
    let table = value.as_table();
    if table.is_none() {
        issues.push(format!("{field}: expected table, received {}", value.type_str()));
    }
    table
}
