//! `relay-alias` and `relay-set` subcommands.

use std::{io::Write, path::Path};

use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use tracing::warn;

use crate::{config::ConfigRepo, input::InputError};

/// Manage relay aliases.
///
/// Set aliases for relay URLs:
///   $ nosdump alias set foo wss://relay.foo.com/
///
/// then refer to relays by alias when dumping events:
///   $ nosdump --kinds 1 foo
///
/// Shorthands:
///   nosdump alias                     = nosdump alias list
///   nosdump alias <alias>             = nosdump alias get <alias>
///   nosdump alias <alias> <relay-URL> = nosdump alias set <alias> <relay-URL>
#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true, verbatim_doc_comment)]
pub struct RelayAliasArgs {
    #[command(subcommand)]
    pub action: Option<AliasAction>,
    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
    pub alias: Option<String>,
    #[arg(value_name = "RELAY_URL")]
    pub url: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum AliasAction {
    /// List all relay aliases.
    #[command(visible_alias = "ls")]
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Show the relay URL associated with an alias.
    Get { alias: String },
    /// Set a relay alias.
    Set {
        alias: String,
        #[arg(value_name = "RELAY_URL")]
        url: String,
    },
    /// Unset a relay alias.
    #[command(visible_alias = "rm")]
    Unset { alias: String },
}

impl RelayAliasArgs {
    fn into_action(self) -> AliasAction {
        match (self.action, self.alias, self.url) {
            (Some(action), _, _) => action,
            (None, None, _) => AliasAction::List { json: self.json },
            (None, Some(alias), None) => AliasAction::Get { alias },
            (None, Some(alias), Some(url)) => AliasAction::Set { alias, url },
        }
    }
}

/// Manage relay sets.
///
/// Add multiple relays to a relay set:
///   $ nosdump set add set1 wss://relay1-a.com wss://relay1-b.com
///
/// then target every relay in the set at once with "...<set>":
///   $ nosdump --kinds 1 ...set1
///
/// Shorthands:
///   nosdump set                   = nosdump set list-all
///   nosdump set <set>             = nosdump set list <set>
///   nosdump set <set> <relays...> = nosdump set add <set> <relays...>
#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true, verbatim_doc_comment)]
pub struct RelaySetArgs {
    #[command(subcommand)]
    pub action: Option<SetAction>,
    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
    #[arg(value_name = "SET")]
    pub name: Option<String>,
    pub relays: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum SetAction {
    /// List all relay sets.
    ListAll {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List relays in a relay set.
    #[command(visible_alias = "ls")]
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
        set: String,
    },
    /// Add relays to a relay set.
    Add {
        set: String,
        #[arg(required = true)]
        relays: Vec<String>,
    },
    /// Remove relays from a relay set.
    #[command(visible_alias = "rm")]
    Remove {
        set: String,
        #[arg(required = true)]
        relays: Vec<String>,
    },
    /// Copy a relay set.
    #[command(visible_alias = "cp")]
    Copy { src: String, dst: String },
    /// Rename a relay set.
    Rename { old: String, new: String },
    /// Delete a relay set.
    Delete { set: String },
}

impl RelaySetArgs {
    fn into_action(self) -> SetAction {
        match (self.action, self.name) {
            (Some(action), _) => action,
            (None, None) => SetAction::ListAll { json: self.json },
            (None, Some(set)) if self.relays.is_empty() => SetAction::List {
                json: self.json,
                set,
            },
            (None, Some(set)) => SetAction::Add {
                set,
                relays: self.relays,
            },
        }
    }
}

/// Load the config, run the alias command and save if anything changed.
pub fn relay_alias(args: RelayAliasArgs, config_path: &Path, out: &mut impl Write) -> Result<()> {
    let mut config = ConfigRepo::load(config_path)?;
    if run_alias(args.into_action(), &mut config, out)? {
        config.save(config_path)?;
    }
    Ok(())
}

/// Load the config, run the set command and save if anything changed.
pub fn relay_set(args: RelaySetArgs, config_path: &Path, out: &mut impl Write) -> Result<()> {
    let mut config = ConfigRepo::load(config_path)?;
    if run_set(args.into_action(), &mut config, out)? {
        config.save(config_path)?;
    }
    Ok(())
}

/// Returns whether the config was modified.
fn run_alias(action: AliasAction, config: &mut ConfigRepo, out: &mut impl Write) -> Result<bool> {
    let aliases = config.relay_aliases_mut();
    match action {
        AliasAction::List { json } => {
            let all = aliases.list();
            if json {
                writeln!(out, "{}", serde_json::to_string(&all)?)?;
            } else {
                let width = all.keys().map(|a| a.chars().count()).max().unwrap_or(0);
                for (alias, url) in &all {
                    writeln!(out, "{alias:<width$}  {url}")?;
                }
            }
            Ok(false)
        }
        AliasAction::Get { alias } => match aliases.get(&alias) {
            Some(url) => {
                writeln!(out, "{url}")?;
                Ok(false)
            }
            None => bail!("relay alias \"{alias}\" not found."),
        },
        AliasAction::Set { alias, url } => {
            if aliases.has(&alias) {
                warn!(%alias, "overwriting existing relay alias");
            }
            aliases.set(&alias, &url)?;
            Ok(true)
        }
        AliasAction::Unset { alias } => Ok(aliases.unset(&alias)),
    }
}

/// Returns whether the config was modified.
fn run_set(action: SetAction, config: &mut ConfigRepo, out: &mut impl Write) -> Result<bool> {
    match action {
        SetAction::ListAll { json } => {
            let all = config.relay_sets().list_all();
            if json {
                writeln!(out, "{}", serde_json::to_string(&all)?)?;
            } else {
                for (name, relays) in &all {
                    writeln!(out, "{name}:")?;
                    for relay in relays {
                        writeln!(out, "  {relay}")?;
                    }
                    writeln!(out)?;
                }
            }
            Ok(false)
        }
        SetAction::List { json, set } => {
            let Some(relays) = config.relay_sets().list_relays_of(&set) else {
                bail!("relay set \"{set}\" not found.");
            };
            if json {
                writeln!(out, "{}", serde_json::to_string(&relays)?)?;
            } else {
                for relay in &relays {
                    writeln!(out, "{relay}")?;
                }
            }
            Ok(false)
        }
        SetAction::Add { set, relays } => {
            let urls = config
                .resolve_relay_specifiers(&relays)
                .map_err(InputError::Relays)?;
            Ok(config.relay_sets_mut().add_relay_urls_to(&set, &urls)?)
        }
        SetAction::Remove { set, relays } => {
            let urls = config
                .resolve_relay_specifiers(&relays)
                .map_err(InputError::Relays)?;
            Ok(config.relay_sets_mut().remove_relay_urls_from(&set, &urls))
        }
        SetAction::Copy { src, dst } => {
            if config.relay_sets().has(&dst) && src != dst {
                warn!(set = %dst, "overwriting existing relay set");
            }
            config.relay_sets_mut().copy(&src, &dst)?;
            Ok(true)
        }
        SetAction::Rename { old, new } => {
            if config.relay_sets().has(&new) && old != new {
                warn!(set = %new, "overwriting existing relay set");
            }
            config.relay_sets_mut().rename(&old, &new)?;
            Ok(true)
        }
        SetAction::Delete { set } => Ok(config.relay_sets_mut().delete(&set)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn alias(config: &mut ConfigRepo, action: AliasAction) -> (bool, String) {
        let mut out = Vec::new();
        let changed = run_alias(action, config, &mut out).unwrap();
        (changed, String::from_utf8(out).unwrap())
    }

    fn set(config: &mut ConfigRepo, action: SetAction) -> (bool, String) {
        let mut out = Vec::new();
        let changed = run_set(action, config, &mut out).unwrap();
        (changed, String::from_utf8(out).unwrap())
    }

    #[test]
    fn alias_shorthands() {
        let args = |alias: Option<&str>, url: Option<&str>| RelayAliasArgs {
            action: None,
            json: true,
            alias: alias.map(Into::into),
            url: url.map(Into::into),
        };
        assert!(matches!(args(None, None).into_action(), AliasAction::List { json: true }));
        assert!(matches!(
            args(Some("foo"), None).into_action(),
            AliasAction::Get { alias } if alias == "foo"
        ));
        assert!(matches!(
            args(Some("foo"), Some("wss://x.com")).into_action(),
            AliasAction::Set { alias, url } if alias == "foo" && url == "wss://x.com"
        ));
    }

    #[test]
    fn set_shorthands() {
        let args = |name: Option<&str>, relays: &[&str]| RelaySetArgs {
            action: None,
            json: false,
            name: name.map(Into::into),
            relays: strings(relays),
        };
        assert!(matches!(args(None, &[]).into_action(), SetAction::ListAll { json: false }));
        assert!(matches!(
            args(Some("s"), &[]).into_action(),
            SetAction::List { set, .. } if set == "s"
        ));
        assert!(matches!(
            args(Some("s"), &["foo"]).into_action(),
            SetAction::Add { set, relays } if set == "s" && relays == vec!["foo"]
        ));
    }

    #[test]
    fn alias_commands() {
        let mut config = ConfigRepo::default();
        let (changed, _) = alias(
            &mut config,
            AliasAction::Set {
                alias: "foo".into(),
                url: "wss://foo.example.com".into(),
            },
        );
        assert!(changed);
        alias(
            &mut config,
            AliasAction::Set {
                alias: "longer-name".into(),
                url: "wss://bar.example.com".into(),
            },
        );

        let (_, out) = alias(&mut config, AliasAction::Get { alias: "foo".into() });
        assert_eq!(out, "wss://foo.example.com/\n");

        let (_, out) = alias(&mut config, AliasAction::List { json: false });
        assert_eq!(
            out,
            "foo          wss://foo.example.com/\nlonger-name  wss://bar.example.com/\n"
        );
        let (_, out) = alias(&mut config, AliasAction::List { json: true });
        assert_eq!(
            out,
            "{\"foo\":\"wss://foo.example.com/\",\"longer-name\":\"wss://bar.example.com/\"}\n"
        );

        let (changed, _) = alias(&mut config, AliasAction::Unset { alias: "foo".into() });
        assert!(changed);
        let (changed, _) = alias(&mut config, AliasAction::Unset { alias: "foo".into() });
        assert!(!changed);

        let err = run_alias(AliasAction::Get { alias: "foo".into() }, &mut config, &mut Vec::new())
            .unwrap_err();
        assert_eq!(err.to_string(), "relay alias \"foo\" not found.");
    }

    #[test]
    fn alias_set_rejects_bad_input() {
        let mut config = ConfigRepo::default();
        assert!(run_alias(
            AliasAction::Set {
                alias: "a b".into(),
                url: "wss://x.com".into()
            },
            &mut config,
            &mut Vec::new()
        )
        .is_err());
        assert!(config.relay_aliases().list().is_empty());
    }

    #[test]
    fn set_commands() {
        let mut config = ConfigRepo::default();
        config
            .relay_aliases_mut()
            .set("foo", "wss://foo.example.com")
            .unwrap();

        let (changed, _) = set(
            &mut config,
            SetAction::Add {
                set: "s".into(),
                relays: strings(&["foo", "wss://bar.example.com"]),
            },
        );
        assert!(changed);
        let (changed, _) = set(
            &mut config,
            SetAction::Add {
                set: "s".into(),
                relays: strings(&["wss://foo.example.com/"]),
            },
        );
        assert!(!changed);

        let (_, out) = set(
            &mut config,
            SetAction::List {
                json: false,
                set: "s".into(),
            },
        );
        assert_eq!(out, "wss://foo.example.com/\nwss://bar.example.com/\n");

        set(
            &mut config,
            SetAction::Copy {
                src: "s".into(),
                dst: "t".into(),
            },
        );
        let (_, out) = set(&mut config, SetAction::ListAll { json: true });
        assert_eq!(
            out,
            "{\"s\":[\"wss://foo.example.com/\",\"wss://bar.example.com/\"],\"t\":[\"wss://foo.example.com/\",\"wss://bar.example.com/\"]}\n"
        );

        set(
            &mut config,
            SetAction::Rename {
                old: "t".into(),
                new: "u".into(),
            },
        );
        let (changed, _) = set(
            &mut config,
            SetAction::Remove {
                set: "u".into(),
                relays: strings(&["foo", "wss://bar.example.com"]),
            },
        );
        assert!(changed);
        assert!(!config.relay_sets().has("u"));

        let (_, out) = set(&mut config, SetAction::ListAll { json: false });
        assert_eq!(
            out,
            "s:\n  wss://foo.example.com/\n  wss://bar.example.com/\n\n"
        );

        let (changed, _) = set(&mut config, SetAction::Delete { set: "s".into() });
        assert!(changed);
        let (changed, _) = set(&mut config, SetAction::Delete { set: "s".into() });
        assert!(!changed);
    }

    #[test]
    fn set_errors() {
        let mut config = ConfigRepo::default();
        let mut sink = Vec::new();
        let err = run_set(
            SetAction::Add {
                set: "s".into(),
                relays: strings(&["unknown"]),
            },
            &mut config,
            &mut sink,
        )
        .unwrap_err();
        assert!(err.to_string().starts_with("failed to resolve relay specifiers:"));

        let err = run_set(
            SetAction::List {
                json: false,
                set: "nope".into(),
            },
            &mut config,
            &mut sink,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "relay set \"nope\" not found.");

        let err = run_set(
            SetAction::Rename {
                old: "nope".into(),
                new: "x".into(),
            },
            &mut config,
            &mut sink,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "relay set \"nope\" not found.");
    }

    #[test]
    fn saves_only_on_change() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        relay_alias(
            RelayAliasArgs {
                action: Some(AliasAction::Unset { alias: "foo".into() }),
                json: false,
                alias: None,
                url: None,
            },
            &path,
            &mut Vec::new(),
        )
        .unwrap();
        assert!(!path.exists());

        relay_set(
            RelaySetArgs {
                action: None,
                json: false,
                name: Some("s".into()),
                relays: strings(&["wss://a.example.com"]),
            },
            &path,
            &mut Vec::new(),
        )
        .unwrap();
        let loaded = ConfigRepo::load(&path).unwrap();
        assert_eq!(
            loaded.relay_sets().list_relays_of("s").unwrap(),
            vec!["wss://a.example.com/"]
        );
    }
}
