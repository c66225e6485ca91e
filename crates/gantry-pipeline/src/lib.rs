//! Typed, order-preserving model of CI pipeline documents.
//!
//! A pipeline arrives as YAML or JSON (JSON is parsed by the same YAML
//! path, since YAML 1.2 is a superset), is resolved for anchors and merge
//! keys, and is decoded into [`Pipeline`]: a tree of discriminated step
//! variants over the ordered mapping primitives of `gantry-ordered`.
//! Fields the schema doesn't model are carried in per-node `remaining`
//! mappings so a parse → transform → serialize cycle is lossless.
//!
//! Two passes mutate a parsed pipeline: environment interpolation
//! ([`Pipeline::interpolate`]) and, in `gantry-signature`, step signing.

pub mod cache;
pub mod env;
pub mod interpolate;
mod marshal;
pub mod matrix;
mod parser;
pub mod plugin;
pub mod signature;
pub mod step;
pub mod warning;

pub use cache::Cache;
pub use env::Env;
pub use gantry_ordered::{MapSA, MapSS, Value};
pub use matrix::{Matrix, MatrixPermutation};
pub use plugin::{Plugin, Plugins};
pub use signature::Signature;
pub use step::{CommandStep, GroupStep, InputStep, Step, TriggerStep, UnknownStep, WaitStep};
pub use warning::Warnings;

use interpolate::{EnvInterpolator, Transformer};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Syntactic failure from the YAML/JSON layer. The message carries the
    /// line and column of the offending token.
    #[error("parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A step node whose shape matches no known step type.
    #[error("unknown step type")]
    UnknownStepType,

    /// A step mapping with no structural cue and no `type` discriminator.
    #[error("cannot infer step type from step contents")]
    StepTypeInference,

    #[error(transparent)]
    Decode(#[from] gantry_ordered::Error),

    /// Cache settings were not a scalar, sequence, or mapping.
    #[error("unsupported type for cache")]
    UnsupportedCacheType,

    /// A `${VAR?message}` expansion referenced an unset variable.
    #[error("environment variable {name:?} is not set: {message}")]
    RequiredVariable { name: String, message: String },

    /// A `${...}` expansion the interpolator does not understand.
    #[error("invalid variable expansion: ${{{0}}}")]
    InvalidExpansion(String),

    /// An inline (remaining) field collides with a declared field during
    /// flat JSON marshalling.
    #[error("inline field {0:?} collides with a declared field")]
    DuplicateInlineKey(String),

    #[error("marshalling JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// A parsed pipeline: the `env` block, the step sequence, and any
/// top-level keys the schema does not model.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pipeline {
    pub env: Option<MapSS>,
    pub steps: Vec<Step>,
    pub remaining: MapSA,
}

/// The outcome of a parse: the pipeline plus any non-fatal warnings
/// (unknown step shapes, step-level decode mismatches).
#[derive(Debug)]
pub struct ParseResult {
    pub pipeline: Pipeline,
    pub warnings: Warnings,
}

/// Parse a pipeline document from YAML or JSON text.
///
/// The top level may be a mapping with a `steps` key or a bare sequence of
/// step nodes.
pub fn parse(input: &str) -> Result<ParseResult> {
    parser::parse_str(input)
}

impl Pipeline {
    /// Substitute environment variables throughout the pipeline.
    ///
    /// Phase one folds the pipeline `env` block into `runtime_env` in
    /// declaration order, interpolating both keys and values, rewriting
    /// the block in place, and never letting a pipeline entry override a
    /// runtime variable. Phase two rewrites every string leaf of every
    /// step with the merged environment. Step-level `env` blocks are
    /// rewritten like any other leaf but contribute no lookups.
    pub fn interpolate(&mut self, runtime_env: &Env) -> Result<()> {
        let mut merged = runtime_env.clone();

        if let Some(env_block) = &mut self.env {
            let entries: Vec<(String, String)> = env_block
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect();
            for (key, value) in entries {
                let int_key = interpolate::interpolate(&merged, &key)?;
                let int_value = interpolate::interpolate(&merged, &value)?;
                if runtime_env.contains(&int_key) {
                    // Runtime env wins; the pipeline entry is left as
                    // written and does not shadow the runtime value.
                    continue;
                }
                merged.set(&int_key, int_value.clone());
                env_block.replace(&key, int_key, int_value);
            }
        }

        let tf = EnvInterpolator::new(&merged);
        self.remaining.try_map_strings(&mut |s| tf.transform(s))?;
        for step in &mut self.steps {
            step.interpolate(&tf)?;
        }
        Ok(())
    }

    /// The pipeline as a JSON value: one flat object combining `env`,
    /// `steps`, and the remaining top-level fields, keys sorted.
    pub fn to_json_value(&self) -> Result<serde_json::Value> {
        let mut declared = Vec::new();
        if let Some(env) = &self.env {
            declared.push(("env", env.to_json()));
        }
        let steps: Vec<serde_json::Value> = self
            .steps
            .iter()
            .map(Step::to_json_value)
            .collect::<Result<_>>()?;
        declared.push(("steps", serde_json::Value::Array(steps)));
        marshal::flat_object(declared, &self.remaining)
    }

    /// Pretty-printed JSON with two-space indentation.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_json_value()?)?)
    }

    /// The pipeline as an ordered value tree, for YAML emission.
    pub fn to_value(&self) -> Value {
        let mut out = MapSA::new();
        if let Some(env) = &self.env {
            let mut env_map = MapSA::new();
            for (k, v) in env.iter() {
                env_map.set(k, Value::String(v.clone()));
            }
            out.set("env", Value::Map(env_map));
        }
        out.set(
            "steps",
            Value::Seq(self.steps.iter().map(Step::to_value).collect()),
        );
        for (k, v) in self.remaining.iter() {
            out.set(k, v.clone());
        }
        Value::Map(out)
    }

    /// Serialize to YAML in block style. Multiline strings come out as
    /// literal block scalars.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.to_value())?)
    }
}
