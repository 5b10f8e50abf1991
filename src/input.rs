//! Resolution of everything the user handed us (command options, piped
//! filter JSON, relay specifiers) into one set of dump parameters.
//!
//! Errors are aggregated per category so a single run reports every mistake.

use clap::Args;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{
    config::ConfigRepo,
    fetch::FetchOptions,
    filter::{Filter, TimeRange},
    ident::{normalize_all, to_hex_event_id, to_hex_pubkey},
    tag::{merge_tag_specs, TagSpec},
    timestamp::resolve_timestamp,
};

/// Options of the dump command.
#[derive(Debug, Clone, Default, Args)]
pub struct DumpArgs {
    /// Just print parsed options instead of running actual dumping.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Comma separated list of target event ids.
    #[arg(long, value_name = "IDS", value_delimiter = ',', help_heading = "Filter options")]
    pub ids: Option<Vec<String>>,
    /// Comma separated list of target author's pubkeys.
    #[arg(long, value_name = "PUBKEYS", value_delimiter = ',', help_heading = "Filter options")]
    pub authors: Option<Vec<String>>,
    /// Comma separated list of target event kinds.
    #[arg(
        long,
        value_name = "KINDS",
        value_delimiter = ',',
        value_parser = parse_kind,
        help_heading = "Filter options"
    )]
    pub kinds: Option<Vec<u32>>,
    /// Tag query specifier. Syntax: <tag name>:<comma separated tag values>.
    /// You can specify multiple --tag options.
    #[arg(long = "tag", value_name = "TAG_SPEC", help_heading = "Filter options")]
    pub tag: Vec<TagSpec>,
    /// Shorthand for --tag e:<ids>.
    #[arg(short = 'e', value_name = "IDS", value_delimiter = ',', help_heading = "Filter options")]
    pub e: Vec<String>,
    /// Shorthand for --tag p:<pubkeys>.
    #[arg(short = 'p', value_name = "PUBKEYS", value_delimiter = ',', help_heading = "Filter options")]
    pub p: Vec<String>,
    /// Search query. Relays without NIP-50 support will return nothing.
    #[arg(long, value_name = "QUERY", help_heading = "Filter options")]
    pub search: Option<String>,
    /// Fetch only events newer than the timestamp.
    #[arg(long, value_name = "TIME_SPEC", help_heading = "Filter options")]
    pub since: Option<String>,
    /// Fetch only events older than the timestamp.
    #[arg(long, value_name = "TIME_SPEC", help_heading = "Filter options")]
    pub until: Option<String>,

    /// Skip event signature verification.
    #[arg(long, help_heading = "Fetch options")]
    pub skip_verification: bool,
    /// SOCKS5 proxy to connect through, e.g. 127.0.0.1:9050 for Tor.
    #[arg(long, value_name = "HOST:PORT", help_heading = "Fetch options")]
    pub proxy: Option<String>,

    /// Read stdin as a Nostr REQ message and extract the first filter from it.
    #[arg(short = 'R', long, help_heading = "Input options")]
    pub stdin_req: bool,
}

impl DumpArgs {
    /// `--tag` specs followed by the ones implied by `-e` and `-p`.
    fn tag_specs(&self) -> Vec<TagSpec> {
        let mut specs = self.tag.clone();
        if !self.e.is_empty() {
            specs.push(TagSpec::new('e', self.e.iter().cloned()));
        }
        if !self.p.is_empty() {
            specs.push(TagSpec::new('p', self.p.iter().cloned()));
        }
        specs
    }
}

fn parse_kind(s: &str) -> Result<u32, String> {
    s.parse()
        .map_err(|_| format!("must be non-negative integer, but got \"{s}\"."))
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("failed to parse stdin as filter:{}", bullets(.0))]
    Stdin(Vec<String>),
    #[error("failed to parse options:{}", bullets(.0))]
    Options(Vec<String>),
    #[error("failed to resolve relay specifiers:{}", bullets(.0))]
    Relays(Vec<String>),
}

fn bullets(msgs: &[String]) -> String {
    msgs.iter().map(|m| format!("\n  * {m}")).collect()
}

impl InputError {
    pub fn header(&self) -> &'static str {
        match self {
            InputError::Stdin(_) => "failed to parse stdin as filter",
            InputError::Options(_) => "failed to parse options",
            InputError::Relays(_) => "failed to resolve relay specifiers",
        }
    }

    pub fn messages(&self) -> &[String] {
        match self {
            InputError::Stdin(m) | InputError::Options(m) | InputError::Relays(m) => m,
        }
    }
}

/// What the fetcher needs to run a dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpParams {
    pub relay_urls: Vec<String>,
    pub fetch_filter: Filter,
    pub fetch_time_range: TimeRange,
    pub fetch_options: FetchOptions,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MiscOptions {
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedInput {
    pub params: DumpParams,
    pub misc: MiscOptions,
}

/// Resolve every input source into dump parameters.
///
/// Options override stdin field by field. Errors are reported by category in
/// a fixed order: stdin, then options, then relay specifiers.
pub fn parse_input(
    args: &DumpArgs,
    relay_specs: &[String],
    stdin: &str,
    now: u64,
    config: &ConfigRepo,
) -> Result<ParsedInput, InputError> {
    let (stdin_filter, stdin_range) =
        parse_filter_from_text(stdin, args.stdin_req).map_err(|e| InputError::Stdin(vec![e]))?;
    let (opt_filter, opt_range) =
        parse_filter_from_options(args, now).map_err(InputError::Options)?;
    let relay_urls = config
        .resolve_relay_specifiers(relay_specs)
        .map_err(InputError::Relays)?;

    Ok(ParsedInput {
        params: DumpParams {
            relay_urls,
            fetch_filter: stdin_filter.overridden_by(opt_filter),
            fetch_time_range: stdin_range.overridden_by(opt_range),
            fetch_options: FetchOptions {
                skip_verification: args.skip_verification,
                proxy: args.proxy.clone(),
            },
        },
        misc: MiscOptions {
            dry_run: args.dry_run,
        },
    })
}

const NON_TAG_KEYS: [&str; 6] = ["ids", "authors", "kinds", "since", "until", "search"];

/// Parse piped text as a filter, or as a `REQ` message when `extract_from_req`
/// is set. Blank text is an empty filter.
pub fn parse_filter_from_text(
    text: &str,
    extract_from_req: bool,
) -> Result<(Filter, TimeRange), String> {
    if text.trim().is_empty() {
        return Ok(Default::default());
    }
    let json: Value = serde_json::from_str(text).map_err(|e| format!("invalid JSON: {e}"))?;

    let raw = if extract_from_req {
        match json {
            Value::Array(mut items) if items.len() > 2 => items.swap_remove(2),
            _ => return Err("malformed REQ message!".into()),
        }
    } else {
        json
    };
    let obj = match raw {
        Value::Object(obj) => obj,
        other => {
            return Err(validation_error(&[format!(
                "Expected object, received {}",
                json_type(&other)
            )]))
        }
    };

    let mut issues = vec![];
    let (mut filter, range) = check_non_tag_fields(&obj, &mut issues);
    filter.tags = check_tag_queries(&obj, &mut issues);
    if !issues.is_empty() {
        return Err(validation_error(&issues));
    }
    Ok((filter, range))
}

fn check_non_tag_fields(obj: &Map<String, Value>, issues: &mut Vec<String>) -> (Filter, TimeRange) {
    let filter = Filter {
        ids: string_list(obj, "ids", issues),
        authors: string_list(obj, "authors", issues),
        kinds: obj.get("kinds").and_then(|v| {
            let kinds = v.as_array().and_then(|a| {
                a.iter()
                    .map(|k| k.as_u64().and_then(|n| u32::try_from(n).ok()))
                    .collect::<Option<Vec<_>>>()
            });
            if kinds.is_none() {
                issues.push("Expected array of non-negative integers at \"kinds\"".into());
            }
            kinds
        }),
        search: obj.get("search").and_then(|v| {
            if v.as_str().is_none() {
                issues.push("Expected string at \"search\"".into());
            }
            v.as_str().map(str::to_string)
        }),
        ..Default::default()
    };
    let range = TimeRange {
        since: timestamp(obj, "since", issues),
        until: timestamp(obj, "until", issues),
    };
    (filter, range)
}

/// Every key outside the known fields must be `#<single char>` mapping to
/// a list of strings.
fn check_tag_queries(
    obj: &Map<String, Value>,
    issues: &mut Vec<String>,
) -> std::collections::BTreeMap<String, Vec<String>> {
    let mut tags = std::collections::BTreeMap::new();
    for key in obj.keys().filter(|k| !NON_TAG_KEYS.contains(&k.as_str())) {
        if !(key.starts_with('#') && key.chars().count() == 2) {
            issues.push(format!(
                "Unrecognized key \"{key}\": tag queries must be \"#\" followed by a single letter"
            ));
            continue;
        }
        if let Some(values) = string_list(obj, key, issues) {
            tags.insert(key.clone(), values);
        }
    }
    tags
}

fn string_list(obj: &Map<String, Value>, key: &str, issues: &mut Vec<String>) -> Option<Vec<String>> {
    let value = obj.get(key)?;
    let list = value.as_array().and_then(|a| {
        a.iter()
            .map(|s| s.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
    });
    if list.is_none() {
        issues.push(format!("Expected array of strings at \"{key}\""));
    }
    list
}

/// Any JSON number is accepted. Fractions are floored and negatives clamp to 0.
fn timestamp(obj: &Map<String, Value>, key: &str, issues: &mut Vec<String>) -> Option<u64> {
    let value = obj.get(key)?;
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    match value.as_f64() {
        Some(f) => Some(f.floor().max(0.0) as u64),
        None => {
            issues.push(format!("Expected number at \"{key}\""));
            None
        }
    }
}

fn validation_error(issues: &[String]) -> String {
    format!("Validation error: {}", issues.join("; "))
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Build a filter from command options, reporting every bad value at once.
pub fn parse_filter_from_options(
    args: &DumpArgs,
    now: u64,
) -> Result<(Filter, TimeRange), Vec<String>> {
    let mut errs = vec![];
    let mut filter = Filter::default();
    let mut range = TimeRange::default();

    if let Some(ids) = &args.ids {
        match normalize_all(ids, to_hex_event_id) {
            Ok(ids) => filter.ids = Some(ids),
            Err(e) => errs.extend(e),
        }
    }
    if let Some(authors) = &args.authors {
        match normalize_all(authors, to_hex_pubkey) {
            Ok(authors) => filter.authors = Some(authors),
            Err(e) => errs.extend(e),
        }
    }
    let specs = args.tag_specs();
    if !specs.is_empty() {
        match merge_tag_specs(&specs) {
            Ok(tags) => filter.tags = tags,
            Err(e) => errs.extend(e),
        }
    }
    filter.kinds = args.kinds.clone();
    filter.search = args.search.clone();

    if let Some(since) = &args.since {
        match resolve_timestamp(since, now) {
            Ok(ts) => range.since = Some(ts),
            Err(e) => errs.push(e),
        }
    }
    if let Some(until) = &args.until {
        match resolve_timestamp(until, now) {
            Ok(ts) => range.until = Some(ts),
            Err(e) => errs.push(e),
        }
    }

    if errs.is_empty() {
        Ok((filter, range))
    } else {
        Err(errs)
    }
}
