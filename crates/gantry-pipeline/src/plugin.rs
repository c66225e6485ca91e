//! Plugin references and their source normalization.

use gantry_ordered::{Error as DecodeError, MapSA, Value};

use crate::interpolate::Transformer;
use crate::{Error, Result};

/// A single plugin reference: where it comes from and its configuration.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Plugin {
    pub source: String,
    pub config: Option<Value>,
}

impl Plugin {
    pub fn new(source: impl Into<String>) -> Self {
        Plugin {
            source: source.into(),
            config: None,
        }
    }

    pub fn with_config(source: impl Into<String>, config: Value) -> Self {
        Plugin {
            source: source.into(),
            config: Some(config),
        }
    }

    /// The canonical form of the plugin source.
    ///
    /// Bare names resolve into the well-known plugin organisation;
    /// `org/name` resolves under github.com; anything that already looks
    /// like a URL, a path, a drive reference, or a VCS authority is
    /// returned verbatim. The transform is idempotent, so sources that are
    /// already canonical pass through unchanged.
    pub fn full_source(&self) -> String {
        let src = self.source.as_str();
        if src.is_empty() {
            return String::new();
        }
        if src.contains(':') || src.contains('\\') {
            return src.to_string();
        }
        if src.starts_with('/') || src.starts_with('.') {
            return src.to_string();
        }

        let (repo, tag) = match src.split_once('#') {
            Some((repo, tag)) => (repo, Some(tag)),
            None => (src, None),
        };
        let mut out = match repo.split('/').count() {
            1 => format!("github.com/buildkite-plugins/{repo}-buildkite-plugin"),
            2 => format!("github.com/{repo}-buildkite-plugin"),
            _ => repo.to_string(),
        };
        if let Some(tag) = tag {
            out.push('#');
            out.push_str(tag);
        }
        out
    }

    /// JSON form: a single-entry object keyed by the canonical source.
    /// Logically-empty configuration (null, `{}`, `[]`) marshals as null.
    pub fn to_json(&self) -> serde_json::Value {
        let config = match &self.config {
            Some(c) if !c.is_logically_empty() => c.to_json(),
            _ => serde_json::Value::Null,
        };
        let mut obj = serde_json::Map::with_capacity(1);
        obj.insert(self.full_source(), config);
        serde_json::Value::Object(obj)
    }

    pub fn to_value(&self) -> Value {
        let config = match &self.config {
            Some(c) if !c.is_logically_empty() => c.clone(),
            _ => Value::Null,
        };
        let mut map = MapSA::new();
        map.set(self.full_source(), config);
        Value::Map(map)
    }

    pub(crate) fn interpolate(&mut self, tf: &dyn Transformer) -> Result<()> {
        self.source = tf.transform(&self.source)?;
        if let Some(config) = &mut self.config {
            config.try_map_strings(&mut |s| tf.transform(s))?;
        }
        Ok(())
    }
}

/// The plugin list of a command step. Accepts a sequence of scalar
/// sources and single-entry mappings, or (the legacy form) one mapping
/// with a source per key; order is preserved either way.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Plugins(pub Vec<Plugin>);

impl Plugins {
    pub fn from_value(value: Value) -> Result<Self> {
        let mut plugins = Vec::new();
        match value {
            Value::Null => {}
            Value::Seq(items) => {
                for item in items {
                    match item {
                        Value::Map(m) => {
                            for (source, config) in m {
                                plugins.push(plugin_entry(source, config));
                            }
                        }
                        Value::Seq(_) => return Err(Error::Decode(DecodeError::UnsupportedSrc)),
                        scalar => plugins.push(Plugin::new(scalar.scalar_string()?)),
                    }
                }
            }
            Value::Map(m) => {
                for (source, config) in m {
                    plugins.push(plugin_entry(source, config));
                }
            }
            _ => return Err(Error::Decode(DecodeError::IncompatibleTypes)),
        }
        Ok(Plugins(plugins))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Plugin> {
        self.0.iter()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.0.iter().map(Plugin::to_json).collect())
    }

    pub fn to_value(&self) -> Value {
        Value::Seq(self.0.iter().map(Plugin::to_value).collect())
    }

    pub(crate) fn interpolate(&mut self, tf: &dyn Transformer) -> Result<()> {
        for plugin in &mut self.0 {
            plugin.interpolate(tf)?;
        }
        Ok(())
    }
}

fn plugin_entry(source: String, config: Value) -> Plugin {
    Plugin {
        source,
        config: match config {
            Value::Null => None,
            other => Some(other),
        },
    }
}

impl FromIterator<Plugin> for Plugins {
    fn from_iter<I: IntoIterator<Item = Plugin>>(iter: I) -> Self {
        Plugins(iter.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
