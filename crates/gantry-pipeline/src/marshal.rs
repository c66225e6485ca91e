//! Inline-aware JSON object construction.
//!
//! A typed value with declared fields plus one inline mapping emits a
//! single flat object: declared fields (already filtered for emptiness by
//! the caller) merged with the inline entries, keys sorted
//! lexicographically. The inline mapping must not shadow a declared field.

use std::collections::BTreeMap;

use gantry_ordered::MapSA;

use crate::{Error, Result};

pub(crate) fn flat_object(
    declared: Vec<(&'static str, serde_json::Value)>,
    remaining: &MapSA,
) -> Result<serde_json::Value> {
    let mut entries: BTreeMap<String, serde_json::Value> = BTreeMap::new();
    for (key, value) in declared {
        entries.insert(key.to_string(), value);
    }
    for (key, value) in remaining.iter() {
        if entries.contains_key(key) {
            return Err(Error::DuplicateInlineKey(key.to_string()));
        }
        entries.insert(key.to_string(), value.to_json());
    }

    let mut obj = serde_json::Map::with_capacity(entries.len());
    for (key, value) in entries {
        obj.insert(key, value);
    }
    Ok(serde_json::Value::Object(obj))
}
