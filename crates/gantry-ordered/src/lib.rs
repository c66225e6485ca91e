//! Order-preserving document values.
//!
//! Pipeline documents are YAML or JSON mappings whose key order carries
//! meaning for round-tripping: a parsed pipeline must serialize back with
//! its mappings in source order. [`Map`] is a string-keyed mapping that
//! keeps insertion order, and [`Value`] is the document tree built from it.
//!
//! Equality on a [`Map`] is pairwise in order: two maps with the same
//! entries in a different order are not equal.

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

pub mod decode;

pub use decode::Fields;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    /// The source node's structure cannot be decoded into the target shape
    /// (e.g. a mapping where a scalar or sequence is required).
    #[error("incompatible types for decoding")]
    IncompatibleTypes,

    /// The source node has a shape the decoder recognises, but an element
    /// inside it is unsupported (e.g. a mapping inside a sequence of
    /// scalars).
    #[error("unsupported source value")]
    UnsupportedSrc,
}

pub type Result<T> = std::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A document tree node: scalars, sequences, and ordered mappings.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Seq(Vec<Value>),
    Map(MapSA),
}

impl Value {
    /// True for the values that serialize to JSON `null` under
    /// canonicalisation: null itself, an empty mapping, or an empty
    /// sequence.
    pub fn is_logically_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Seq(s) => s.is_empty(),
            Value::Map(m) => m.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MapSA> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// The natural string form of a scalar: `42` becomes `"42"`, `true`
    /// becomes `"true"`. Sequences, mappings and null have none.
    pub fn scalar_string(&self) -> Result<String> {
        match self {
            Value::Bool(b) => Ok(b.to_string()),
            Value::Int(i) => Ok(i.to_string()),
            Value::Float(f) => Ok(f.to_string()),
            Value::String(s) => Ok(s.clone()),
            Value::Null | Value::Seq(_) | Value::Map(_) => Err(Error::UnsupportedSrc),
        }
    }

    /// Coerce into a sequence of strings.
    ///
    /// A scalar becomes a one-element sequence; sequence elements are
    /// stringified individually and must be scalars; null becomes empty.
    /// A mapping is structurally incompatible.
    pub fn string_seq(&self) -> Result<Vec<String>> {
        match self {
            Value::Null => Ok(Vec::new()),
            Value::Seq(items) => items.iter().map(Value::scalar_string).collect(),
            Value::Map(_) => Err(Error::IncompatibleTypes),
            scalar => Ok(vec![scalar.scalar_string()?]),
        }
    }

    /// Apply `f` to every string in the tree, mapping keys included.
    ///
    /// Key rewrites that collide with a later key overwrite in place, the
    /// same way [`Map::set`] does.
    pub fn try_map_strings<E>(
        &mut self,
        f: &mut impl FnMut(&str) -> std::result::Result<String, E>,
    ) -> std::result::Result<(), E> {
        match self {
            Value::String(s) => {
                *s = f(s)?;
            }
            Value::Seq(items) => {
                for item in items {
                    item.try_map_strings(f)?;
                }
            }
            Value::Map(m) => m.try_map_strings(f)?,
            Value::Null | Value::Bool(_) | Value::Int(_) | Value::Float(_) => {}
        }
        Ok(())
    }

    /// Convert into a `serde_json::Value`, preserving mapping order.
    /// Non-finite floats have no JSON form and become null.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Seq(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(m) => {
                let mut out = serde_json::Map::with_capacity(m.len());
                for (k, v) in m.iter() {
                    out.insert(k.to_string(), v.to_json());
                }
                serde_json::Value::Object(out)
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<MapSA> for Value {
    fn from(m: MapSA) -> Self {
        Value::Map(m)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Seq(items)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Seq(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(m) => m.serialize(serializer),
        }
    }
}

// ---------------------------------------------------------------------------
// Map
// ---------------------------------------------------------------------------

/// String-keyed mapping that preserves insertion order.
///
/// `set` on an existing key updates the value in place without moving the
/// entry; removal closes the gap. Backed by a vector of entries with a
/// hash index for O(1) lookup.
#[derive(Clone, Debug)]
pub struct Map<V> {
    entries: IndexMap<String, V>,
}

/// Mapping from string keys to arbitrary values.
pub type MapSA = Map<Value>;

/// Mapping from string keys to string values.
pub type MapSS = Map<String>;

impl<V> Map<V> {
    pub fn new() -> Self {
        Map {
            entries: IndexMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert at the end, or overwrite in place if the key already exists.
    pub fn set(&mut self, key: impl Into<String>, value: V) {
        self.entries.insert(key.into(), value);
    }

    /// Remove an entry, preserving the order of the remaining entries.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.entries.shift_remove(key)
    }

    /// Rewrite the entry at `old` to `(new_key, value)` without changing
    /// its position. If `new_key` already names another entry, the entry at
    /// `old` is dropped and the existing `new_key` entry is overwritten in
    /// place.
    pub fn replace(&mut self, old: &str, new_key: impl Into<String>, value: V) {
        let new_key = new_key.into();
        if old == new_key {
            self.entries.insert(new_key, value);
            return;
        }
        if self.entries.contains_key(&new_key) {
            self.entries.shift_remove(old);
            self.entries.insert(new_key, value);
            return;
        }
        match self.entries.shift_remove_full(old) {
            Some((index, _, _)) => {
                self.entries.shift_insert(index, new_key, value);
            }
            None => {
                self.entries.insert(new_key, value);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.entries.values_mut()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl MapSA {
    /// Apply `f` to every string key and every string leaf in order.
    pub fn try_map_strings<E>(
        &mut self,
        f: &mut impl FnMut(&str) -> std::result::Result<String, E>,
    ) -> std::result::Result<(), E> {
        let entries = std::mem::take(&mut self.entries);
        for (key, mut value) in entries {
            let key = f(&key)?;
            value.try_map_strings(f)?;
            self.entries.insert(key, value);
        }
        Ok(())
    }
}

impl MapSS {
    /// Apply `f` to every key and value in order.
    pub fn try_map_strings<E>(
        &mut self,
        f: &mut impl FnMut(&str) -> std::result::Result<String, E>,
    ) -> std::result::Result<(), E> {
        let entries = std::mem::take(&mut self.entries);
        for (key, value) in entries {
            self.entries.insert(f(&key)?, f(&value)?);
        }
        Ok(())
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut out = serde_json::Map::with_capacity(self.len());
        for (k, v) in self.iter() {
            out.insert(k.to_string(), serde_json::Value::String(v.clone()));
        }
        serde_json::Value::Object(out)
    }
}

impl<V> Default for Map<V> {
    fn default() -> Self {
        Map::new()
    }
}

// Order-sensitive: same entries in a different order are unequal.
impl<V: PartialEq> PartialEq for Map<V> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .zip(other.entries.iter())
                .all(|(a, b)| a == b)
    }
}

impl<V, K: Into<String>> FromIterator<(K, V)> for Map<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Map::new();
        for (k, v) in iter {
            map.set(k, v);
        }
        map
    }
}

impl<V> IntoIterator for Map<V> {
    type Item = (String, V);
    type IntoIter = indexmap::map::IntoIter<String, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<V: Serialize> Serialize for Map<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (k, v) in self.entries.iter() {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MapSA {
        [
            ("llama", Value::from("Kuzco")),
            ("alpaca", Value::Int(3)),
            ("emu", Value::Bool(true)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn set_preserves_insertion_order() {
        let m = sample();
        let keys: Vec<&str> = m.keys().collect();
        assert_eq!(keys, vec!["llama", "alpaca", "emu"]);
    }

    #[test]
    fn set_existing_updates_in_place() {
        let mut m = sample();
        m.set("alpaca", Value::Int(4));
        let keys: Vec<&str> = m.keys().collect();
        assert_eq!(keys, vec!["llama", "alpaca", "emu"]);
        assert_eq!(m.get("alpaca"), Some(&Value::Int(4)));
    }

    #[test]
    fn remove_closes_the_gap() {
        let mut m = sample();
        assert_eq!(m.remove("alpaca"), Some(Value::Int(3)));
        let keys: Vec<&str> = m.keys().collect();
        assert_eq!(keys, vec!["llama", "emu"]);
    }

    #[test]
    fn equality_is_order_sensitive() {
        let a: MapSA = [("x", Value::Int(1)), ("y", Value::Int(2))]
            .into_iter()
            .collect();
        let b: MapSA = [("y", Value::Int(2)), ("x", Value::Int(1))]
            .into_iter()
            .collect();
        assert_ne!(a, b);

        let c: MapSA = [("x", Value::Int(1)), ("y", Value::Int(2))]
            .into_iter()
            .collect();
        assert_eq!(a, c);
    }

    #[test]
    fn replace_renames_in_place() {
        let mut m: MapSS = [("a", "1"), ("b", "2"), ("c", "3")]
            .into_iter()
            .map(|(k, v)| (k, v.to_string()))
            .collect();
        m.replace("b", "bee", "two".to_string());
        let pairs: Vec<(&str, &String)> = m.iter().collect();
        assert_eq!(pairs[1].0, "bee");
        assert_eq!(pairs[1].1, "two");
        assert_eq!(m.len(), 3);
    }

    #[test]
    fn replace_collision_overwrites_existing_position() {
        let mut m: MapSS = [("a", "1"), ("b", "2"), ("c", "3")]
            .into_iter()
            .map(|(k, v)| (k, v.to_string()))
            .collect();
        // Renaming c to a drops the c entry and overwrites a in place.
        m.replace("c", "a", "three".to_string());
        let pairs: Vec<(&str, &str)> = m.iter().map(|(k, v)| (k, v.as_str())).collect();
        assert_eq!(pairs, vec![("a", "three"), ("b", "2")]);
    }

    #[test]
    fn scalar_string_forms() {
        assert_eq!(Value::Int(42).scalar_string().unwrap(), "42");
        assert_eq!(Value::Bool(true).scalar_string().unwrap(), "true");
        assert_eq!(Value::from("x").scalar_string().unwrap(), "x");
        assert_eq!(Value::Null.scalar_string(), Err(Error::UnsupportedSrc));
        assert_eq!(
            Value::Seq(vec![]).scalar_string(),
            Err(Error::UnsupportedSrc)
        );
    }

    #[test]
    fn string_seq_stringifies_scalars() {
        let v = Value::Seq(vec![Value::from("path"), Value::Int(42), Value::Bool(true)]);
        assert_eq!(v.string_seq().unwrap(), vec!["path", "42", "true"]);
    }

    #[test]
    fn string_seq_rejects_composite_elements() {
        let v = Value::Seq(vec![Value::from("ok"), Value::Seq(vec![Value::Int(1)])]);
        assert_eq!(v.string_seq(), Err(Error::UnsupportedSrc));

        let v = Value::Map(MapSA::new());
        assert_eq!(v.string_seq(), Err(Error::IncompatibleTypes));
    }

    #[test]
    fn try_map_strings_covers_keys_and_values() {
        let mut v = Value::Map(
            [
                ("greeting", Value::from("hello")),
                (
                    "nested",
                    Value::Map([("inner", Value::from("world"))].into_iter().collect()),
                ),
                ("list", Value::Seq(vec![Value::from("a"), Value::Int(1)])),
            ]
            .into_iter()
            .collect(),
        );

        v.try_map_strings::<std::convert::Infallible>(&mut |s| Ok(s.to_uppercase()))
            .unwrap();

        let m = v.as_map().unwrap();
        let keys: Vec<&str> = m.keys().collect();
        assert_eq!(keys, vec!["GREETING", "NESTED", "LIST"]);
        assert_eq!(m.get("GREETING"), Some(&Value::from("HELLO")));
        let nested = m.get("NESTED").unwrap().as_map().unwrap();
        assert_eq!(nested.get("INNER"), Some(&Value::from("WORLD")));
        assert_eq!(
            m.get("LIST"),
            Some(&Value::Seq(vec![Value::from("A"), Value::Int(1)]))
        );
    }

    #[test]
    fn to_json_preserves_map_order() {
        let v = Value::Map(
            [("zebra", Value::Int(1)), ("aardvark", Value::Int(2))]
                .into_iter()
                .collect(),
        );
        let json = serde_json::to_string(&v.to_json()).unwrap();
        assert_eq!(json, r#"{"zebra":1,"aardvark":2}"#);
    }

    #[test]
    fn is_logically_empty() {
        assert!(Value::Null.is_logically_empty());
        assert!(Value::Seq(vec![]).is_logically_empty());
        assert!(Value::Map(MapSA::new()).is_logically_empty());
        assert!(!Value::from("").is_logically_empty());
        assert!(!Value::Int(0).is_logically_empty());
    }
}
