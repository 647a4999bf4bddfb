//! Equality rules between a live request and a recorded one.
//!
//! # Design Decisions
//! - Query matching is one-directional: every live key must be recorded with
//!   the same ordered values, recorded-only keys are not checked
//! - Bodies compare as trimmed bytes first, then as decoded JSON with numbers
//!   kept as their literal text (`1` and `1.0` differ, big integers survive)
//! - A body that fails to decode is a mismatch, never a byte-compare fallback

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use http::Uri;
use serde_json::Value;

/// Decoded query string: key → values in the order they appeared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(BTreeMap<String, Vec<String>>);

impl QueryParams {
    pub fn parse(query: Option<&str>) -> Self {
        let mut params = BTreeMap::<String, Vec<String>>::new();
        if let Some(query) = query {
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()).into_owned() {
                params.entry(key).or_default().push(value);
            }
        }
        Self(params)
    }

    pub fn from_uri(uri: &Uri) -> Self {
        Self::parse(uri.query())
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.0.get(key).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for QueryParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, values) in self.iter() {
            for value in values {
                serializer.append_pair(key, value);
            }
        }
        f.write_str(&serializer.finish())
    }
}

/// Decides whether a live query key missing from a recording may be skipped.
pub trait QueryFilter: Send + Sync {
    fn ignore(&self, key: &str, values: &[String]) -> bool;
}

/// Skips nothing: every live key has to be recorded.
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreNothing;

impl QueryFilter for IgnoreNothing {
    fn ignore(&self, _key: &str, _values: &[String]) -> bool {
        false
    }
}

/// Skips a fixed set of keys (cache busters, timestamps, ...).
#[derive(Debug, Clone, Default)]
pub struct IgnoreKeys {
    keys: HashSet<String>,
}

impl IgnoreKeys {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

impl QueryFilter for IgnoreKeys {
    fn ignore(&self, key: &str, _values: &[String]) -> bool {
        self.keys.contains(key)
    }
}

/// True when every live key is recorded with the same values, in order.
pub fn query_equal(live: &QueryParams, recorded: &QueryParams, filter: &dyn QueryFilter) -> bool {
    live.iter().all(|(key, values)| match recorded.get(key) {
        Some(recorded_values) => values == recorded_values,
        None => filter.ignore(key, values),
    })
}

/// True when two request bodies carry the same content.
pub fn body_equal(live: &[u8], recorded: &[u8]) -> bool {
    let live = live.trim_ascii();
    let recorded = recorded.trim_ascii();
    if live == recorded {
        return true;
    }

    match (decode_json(live), decode_json(recorded)) {
        (Some(live), Some(recorded)) => live == recorded,
        _ => false,
    }
}

/// First JSON value in `bytes`; trailing bytes are not inspected.
fn decode_json(bytes: &[u8]) -> Option<Value> {
    match serde_json::Deserializer::from_slice(bytes)
        .into_iter::<Value>()
        .next()?
    {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(error = %e, "Body is not JSON");
            None
        }
    }
}
