//! Tag query specifiers (`--tag <name>:<v1>,<v2>,...`) and their merging into
//! `#<name>` filter entries.

use std::{collections::BTreeMap, str::FromStr};

use indexmap::{IndexMap, IndexSet};
use thiserror::Error;

use crate::ident::{normalize_all, to_hex_event_id, to_hex_pubkey};

/// One `--tag` occurrence: a single-letter tag name and its values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSpec {
    pub name: char,
    pub values: Vec<String>,
}

impl TagSpec {
    pub fn new(name: char, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name,
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Tag spec \"{0}\" is malformed. It must follow \"<tag name>:<comma separated list of tag values>\" format.")]
pub struct TagSpecError(String);

impl FromStr for TagSpec {
    type Err = TagSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || TagSpecError(s.to_string());
        if s.contains('\n') {
            return Err(malformed());
        }
        let mut chars = s.chars();
        let name = chars.next().ok_or_else(malformed)?;
        let values = chars.as_str().strip_prefix(':').ok_or_else(malformed)?;
        if values.is_empty() {
            return Err(malformed());
        }
        Ok(Self {
            name,
            values: values.split(',').map(|v| v.trim().to_string()).collect(),
        })
    }
}

/// Merge tag specs by name into `#<name>` entries.
///
/// Values of specs sharing a name are unioned. Values of `e` and `p` are
/// normalized into hex event IDs and pubkeys respectively; every
/// normalization failure is reported.
pub fn merge_tag_specs(specs: &[TagSpec]) -> Result<BTreeMap<String, Vec<String>>, Vec<String>> {
    let mut merged: IndexMap<char, IndexSet<String>> = IndexMap::new();
    for spec in specs {
        merged
            .entry(spec.name)
            .or_default()
            .extend(spec.values.iter().cloned());
    }

    let mut errs = vec![];
    let mut queries = BTreeMap::new();
    for (name, values) in merged {
        let normalized = match name {
            'e' => normalize_all(&values, to_hex_event_id),
            'p' => normalize_all(&values, to_hex_pubkey),
            _ => Ok(values.into_iter().collect()),
        };
        match normalized {
            Ok(vals) => {
                queries.insert(format!("#{name}"), dedup(vals));
            }
            Err(e) => errs.extend(e),
        }
    }

    if errs.is_empty() {
        Ok(queries)
    } else {
        Err(errs)
    }
}

/// Different encodings of one identifier collapse after normalization.
fn dedup(values: Vec<String>) -> Vec<String> {
    values.into_iter().collect::<IndexSet<_>>().into_iter().collect()
}
