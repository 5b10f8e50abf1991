//! Nostr filter and time range as handed to the fetcher.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

/// Filter on events, without the time range.
///
/// Absent fields are omitted on serialization. `Some(vec![])` is kept as is:
/// it is how an explicit empty list given on the command line survives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    /// Tag queries keyed by `#<single letter>`.
    #[serde(flatten)]
    pub tags: BTreeMap<String, Vec<String>>,
}

/// Bounds on `created_at`, both inclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>,
}

impl Filter {
    /// Shallow per-field override: every field present in `other` replaces
    /// the one in `self`. Tag queries are replaced per key, never unioned.
    pub fn overridden_by(mut self, other: Filter) -> Filter {
        if other.ids.is_some() {
            self.ids = other.ids;
        }
        if other.authors.is_some() {
            self.authors = other.authors;
        }
        if other.kinds.is_some() {
            self.kinds = other.kinds;
        }
        if other.search.is_some() {
            self.search = other.search;
        }
        self.tags.extend(other.tags);
        self
    }

    /// Render the filter as a `REQ` filter object bounded by `since`/`until`.
    pub fn to_req_json(
        &self,
        since: Option<u64>,
        until: Option<u64>,
        limit: Option<u32>,
    ) -> Map<String, Value> {
        let mut map = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        if let Some(since) = since {
            map.insert("since".into(), Value::Number(since.into()));
        }
        if let Some(until) = until {
            map.insert("until".into(), Value::Number(until.into()));
        }
        if let Some(limit) = limit {
            map.insert("limit".into(), Value::Number(limit.into()));
        }
        map
    }
}

impl TimeRange {
    pub fn overridden_by(self, other: TimeRange) -> TimeRange {
        TimeRange {
            since: other.since.or(self.since),
            until: other.until.or(self.until),
        }
    }
}
