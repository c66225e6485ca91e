//! Field binding for typed decoding.
//!
//! [`Fields`] consumes an ordered mapping one declared field at a time;
//! whatever is left when the target's declared fields are exhausted spills
//! into the target's inline mapping via [`Fields::into_remaining`]. This is
//! the decoding half of the inline-field convention; the marshalling half
//! lives with the schema types.

use crate::{Error, MapSA, MapSS, Result, Value};

/// A cursor over a source mapping being decoded into a typed target.
#[derive(Debug)]
pub struct Fields {
    map: MapSA,
}

impl Fields {
    pub fn new(map: MapSA) -> Self {
        Fields { map }
    }

    /// Take the raw value for a key, if present.
    pub fn take(&mut self, key: &str) -> Option<Value> {
        self.map.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Take a scalar field in its natural string form. Null counts as
    /// absent; a composite value is a structural mismatch.
    pub fn take_string(&mut self, key: &str) -> Result<Option<String>> {
        match self.map.remove(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Seq(_)) | Some(Value::Map(_)) => Err(Error::IncompatibleTypes),
            Some(scalar) => Ok(Some(scalar.scalar_string()?)),
        }
    }

    /// Take the first non-empty value among several alias keys (e.g. `key`
    /// / `id` / `identifier`). All aliases are consumed.
    pub fn take_string_alias(&mut self, keys: &[&str]) -> Result<Option<String>> {
        let mut found = None;
        for key in keys {
            let value = self.take_string(key)?;
            if found.is_none() {
                if let Some(s) = value {
                    if !s.is_empty() {
                        found = Some(s);
                    }
                }
            }
        }
        Ok(found)
    }

    /// Take a field holding a scalar or a sequence of scalars as a string
    /// sequence. Null or absent is empty.
    pub fn take_string_seq(&mut self, key: &str) -> Result<Vec<String>> {
        match self.map.remove(key) {
            None => Ok(Vec::new()),
            Some(v) => v.string_seq(),
        }
    }

    /// Take a mapping field with scalar values as a string-to-string map.
    /// Null or absent is empty; scalar values are stringified; anything
    /// else is a structural mismatch.
    pub fn take_string_map(&mut self, key: &str) -> Result<MapSS> {
        match self.map.remove(key) {
            None | Some(Value::Null) => Ok(MapSS::new()),
            Some(Value::Map(m)) => {
                let mut out = MapSS::new();
                for (k, v) in m {
                    match v {
                        Value::Seq(_) | Value::Map(_) => return Err(Error::IncompatibleTypes),
                        scalar => out.set(k, scalar.scalar_string()?),
                    }
                }
                Ok(out)
            }
            Some(_) => Err(Error::IncompatibleTypes),
        }
    }

    /// Everything not consumed by a declared field.
    pub fn into_remaining(self) -> MapSA {
        self.map
    }
}
