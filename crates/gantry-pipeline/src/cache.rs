//! Step cache settings.

use gantry_ordered::{Fields, MapSA, Value};

use crate::interpolate::Transformer;
use crate::{marshal, Error, Result};

/// Cache settings for a step.
///
/// Authors write these as a single path, a list of paths, or a full
/// mapping; scalar paths take their natural string form (`42` is a valid
/// directory name).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cache {
    pub paths: Vec<String>,
    pub name: String,
    pub size: String,
    pub remaining: MapSA,
}

impl Cache {
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(path) => Ok(Cache {
                paths: vec![path],
                ..Cache::default()
            }),
            Value::Seq(_) => Ok(Cache {
                paths: value.string_seq()?,
                ..Cache::default()
            }),
            Value::Map(m) => {
                let mut fields = Fields::new(m);
                let paths = fields.take_string_seq("paths")?;
                let name = fields.take_string("name")?.unwrap_or_default();
                let size = fields.take_string("size")?.unwrap_or_default();
                Ok(Cache {
                    paths,
                    name,
                    size,
                    remaining: fields.into_remaining(),
                })
            }
            _ => Err(Error::UnsupportedCacheType),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty() && self.name.is_empty() && self.size.is_empty()
            && self.remaining.is_empty()
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        let mut declared = Vec::new();
        if !self.paths.is_empty() {
            declared.push((
                "paths",
                serde_json::Value::Array(
                    self.paths
                        .iter()
                        .map(|p| serde_json::Value::String(p.clone()))
                        .collect(),
                ),
            ));
        }
        if !self.name.is_empty() {
            declared.push(("name", serde_json::Value::String(self.name.clone())));
        }
        if !self.size.is_empty() {
            declared.push(("size", serde_json::Value::String(self.size.clone())));
        }
        marshal::flat_object(declared, &self.remaining)
    }

    pub fn to_value(&self) -> Value {
        let mut out = MapSA::new();
        if !self.paths.is_empty() {
            out.set(
                "paths",
                Value::Seq(self.paths.iter().cloned().map(Value::String).collect()),
            );
        }
        if !self.name.is_empty() {
            out.set("name", Value::String(self.name.clone()));
        }
        if !self.size.is_empty() {
            out.set("size", Value::String(self.size.clone()));
        }
        for (k, v) in self.remaining.iter() {
            out.set(k, v.clone());
        }
        Value::Map(out)
    }

    pub(crate) fn interpolate(&mut self, tf: &dyn Transformer) -> Result<()> {
        for path in &mut self.paths {
            *path = tf.transform(path)?;
        }
        self.name = tf.transform(&self.name)?;
        self.size = tf.transform(&self.size)?;
        self.remaining.try_map_strings(&mut |s| tf.transform(s))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_ordered::Error as DecodeError;

    #[test]
    fn from_scalar() {
        let c = Cache::from_value(Value::from("path/to/cache")).unwrap();
        assert_eq!(c.paths, vec!["path/to/cache"]);
    }

    #[test]
    fn from_sequence() {
        let c = Cache::from_value(Value::Seq(vec![
            Value::from("path/to/cache"),
            Value::from("another/path"),
        ]))
        .unwrap();
        assert_eq!(c.paths, vec!["path/to/cache", "another/path"]);
    }

    #[test]
    fn from_sequence_stringifies_scalars() {
        // 42 and true are valid directory names.
        let c = Cache::from_value(Value::Seq(vec![
            Value::from("path/to/cache"),
            Value::Int(42),
            Value::Bool(true),
        ]))
        .unwrap();
        assert_eq!(c.paths, vec!["path/to/cache", "42", "true"]);
    }

    #[test]
    fn from_sequence_rejects_composites() {
        let err = Cache::from_value(Value::Seq(vec![
            Value::from("ok"),
            Value::Seq(vec![Value::Int(1)]),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::Decode(DecodeError::UnsupportedSrc)));
    }

    #[test]
    fn from_full_mapping() {
        let c = Cache::from_value(Value::Map(
            [
                (
                    "paths",
                    Value::Seq(vec![Value::from("path/to/cache"), Value::from("another")]),
                ),
                ("name", Value::from("cache-name")),
                ("size", Value::from("25g")),
                ("extra", Value::from("field")),
            ]
            .into_iter()
            .collect(),
        ))
        .unwrap();
        assert_eq!(c.paths, vec!["path/to/cache", "another"]);
        assert_eq!(c.name, "cache-name");
        assert_eq!(c.size, "25g");
        assert_eq!(c.remaining.get("extra"), Some(&Value::from("field")));
    }

    #[test]
    fn from_mapping_rejects_nested_paths() {
        let err = Cache::from_value(Value::Map(
            [(
                "paths",
                Value::Map([("path", Value::from("x"))].into_iter().collect()),
            )]
            .into_iter()
            .collect(),
        ))
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Decode(DecodeError::IncompatibleTypes)
        ));
    }

    #[test]
    fn from_invalid_scalar() {
        assert!(matches!(
            Cache::from_value(Value::Int(42)),
            Err(Error::UnsupportedCacheType)
        ));
    }

    #[test]
    fn json_goldens() {
        let cases = [
            (
                Cache {
                    paths: vec!["path/to/cache".into()],
                    ..Cache::default()
                },
                r#"{"paths":["path/to/cache"]}"#,
            ),
            (Cache::default(), "{}"),
            (
                Cache {
                    paths: vec!["path/to/cache".into(), "another/path".into()],
                    name: "cache-name".into(),
                    size: "25g".into(),
                    remaining: [("extra", Value::from("field"))].into_iter().collect(),
                },
                r#"{"extra":"field","name":"cache-name","paths":["path/to/cache","another/path"],"size":"25g"}"#,
            ),
        ];
        for (cache, want) in cases {
            assert_eq!(
                serde_json::to_string(&cache.to_json().unwrap()).unwrap(),
                want
            );
        }
    }
}
