//! Path and query string parsing

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single query parameter value.
///
/// `?a=1` gives `Str("1")`, a bare `?flag` gives `Bool(true)` and an
/// empty assignment `?a=` gives `Null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryValue {
    Str(String),
    Bool(bool),
    Null,
}

impl QueryValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Str(s) => !s.is_empty(),
            Self::Bool(b) => *b,
            Self::Null => false,
        }
    }
}

pub type QueryMap = BTreeMap<String, QueryValue>;

/// Split `"/a/b?x=1"` into `("/a/b", Some("x=1"))`.
pub fn split_path(path: &str) -> (&str, Option<&str>) {
    match path.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path, None),
    }
}

/// Non-empty path segments, ignoring leading, trailing and doubled slashes.
pub fn path_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Parse a raw query string (without the leading `?`). Later duplicates win.
pub fn parse_query(raw: &str) -> QueryMap {
    let mut query = QueryMap::new();
    for pair in raw.split('&').filter(|p| !p.is_empty()) {
        let (name, value) = match pair.split_once('=') {
            Some((name, "")) => (name, QueryValue::Null),
            Some((name, value)) => (name, QueryValue::Str(decode_component(value))),
            None => (pair, QueryValue::Bool(true)),
        };
        let name = decode_component(name);
        if name.is_empty() {
            continue;
        }
        query.insert(name, value);
    }
    query
}

/// Percent-decoding with `+` as space. Invalid escapes are kept verbatim.
fn decode_component(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi << 4) | lo);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
