//! Document parsing: YAML (and JSON, via the same path) into a resolved,
//! ordered value tree, then into the typed pipeline.
//!
//! The YAML layer expands anchors and aliases by value, so resolved nodes
//! never share structure. Merge keys (`<<`) survive alias expansion as
//! ordinary entries and are folded here: explicit keys always win, and for
//! a sequence of merge sources, earlier sources beat later ones. Merged
//! keys that don't collide are appended after the explicit keys in source
//! order.

use gantry_ordered::{Error as DecodeError, Fields, MapSA, MapSS, Value};

use crate::step::steps_from_seq;
use crate::warning::Warnings;
use crate::{ParseResult, Pipeline, Result};

pub(crate) fn parse_str(input: &str) -> Result<ParseResult> {
    let doc: serde_yaml::Value = serde_yaml::from_str(input)?;
    let value = from_yaml(doc)?;

    let mut warnings = Warnings::new();
    let pipeline = pipeline_from_value(value, &mut warnings)?;
    tracing::debug!(
        steps = pipeline.steps.len(),
        warnings = warnings.len(),
        "parsed pipeline"
    );
    Ok(ParseResult { pipeline, warnings })
}

// ---------------------------------------------------------------------------
// YAML tree → ordered tree
// ---------------------------------------------------------------------------

const MERGE_KEY: &str = "<<";

fn from_yaml(v: serde_yaml::Value) -> Result<Value> {
    match v {
        serde_yaml::Value::Null => Ok(Value::Null),
        serde_yaml::Value::Bool(b) => Ok(Value::Bool(b)),
        serde_yaml::Value::Number(n) => Ok(number(n)),
        serde_yaml::Value::String(s) => Ok(Value::String(s)),
        serde_yaml::Value::Sequence(items) => Ok(Value::Seq(
            items.into_iter().map(from_yaml).collect::<Result<_>>()?,
        )),
        serde_yaml::Value::Mapping(m) => from_yaml_mapping(m),
        // Core-schema tags are resolved by the YAML layer itself;
        // application tags decode as their underlying value.
        serde_yaml::Value::Tagged(tagged) => from_yaml(tagged.value),
    }
}

fn number(n: serde_yaml::Number) -> Value {
    if let Some(i) = n.as_i64() {
        Value::Int(i)
    } else {
        Value::Float(n.as_f64().unwrap_or(f64::NAN))
    }
}

fn from_yaml_mapping(m: serde_yaml::Mapping) -> Result<Value> {
    let mut out = MapSA::new();
    let mut merge_sources: Vec<MapSA> = Vec::new();

    for (key, value) in m {
        if matches!(&key, serde_yaml::Value::String(s) if s == MERGE_KEY) {
            collect_merge_sources(value, &mut merge_sources)?;
            continue;
        }
        out.set(key_string(key)?, from_yaml(value)?);
    }

    // Explicit keys take precedence over merged keys; earlier sources over
    // later ones.
    for source in merge_sources {
        for (key, value) in source {
            if !out.contains_key(&key) {
                out.set(key, value);
            }
        }
    }
    Ok(Value::Map(out))
}

fn collect_merge_sources(value: serde_yaml::Value, out: &mut Vec<MapSA>) -> Result<()> {
    match value {
        serde_yaml::Value::Mapping(_) => {
            out.push(expect_map(from_yaml(value)?)?);
        }
        serde_yaml::Value::Sequence(items) => {
            for item in items {
                out.push(expect_map(from_yaml(item)?)?);
            }
        }
        _ => return Err(DecodeError::IncompatibleTypes.into()),
    }
    Ok(())
}

fn expect_map(v: Value) -> Result<MapSA> {
    match v {
        Value::Map(m) => Ok(m),
        _ => Err(DecodeError::IncompatibleTypes.into()),
    }
}

fn key_string(key: serde_yaml::Value) -> Result<String> {
    match key {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Tagged(tagged) => key_string(tagged.value),
        _ => Err(DecodeError::IncompatibleTypes.into()),
    }
}

// ---------------------------------------------------------------------------
// Ordered tree → pipeline
// ---------------------------------------------------------------------------

fn pipeline_from_value(value: Value, warnings: &mut Warnings) -> Result<Pipeline> {
    match value {
        Value::Null => Ok(Pipeline::default()),
        // A bare sequence of step nodes: synthesize an empty pipeline
        // around it.
        Value::Seq(items) => Ok(Pipeline {
            env: None,
            steps: steps_from_seq(items, warnings),
            remaining: MapSA::new(),
        }),
        Value::Map(m) => {
            let mut fields = Fields::new(m);
            let env = match fields.take("env") {
                None | Some(Value::Null) => None,
                Some(Value::Map(m)) => {
                    let mut env = MapSS::new();
                    for (k, v) in m {
                        match v {
                            Value::Seq(_) | Value::Map(_) => {
                                return Err(DecodeError::IncompatibleTypes.into())
                            }
                            scalar => env.set(k, scalar.scalar_string()?),
                        }
                    }
                    Some(env)
                }
                Some(_) => return Err(DecodeError::IncompatibleTypes.into()),
            };
            let steps = match fields.take("steps") {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Seq(items)) => steps_from_seq(items, warnings),
                Some(_) => return Err(DecodeError::IncompatibleTypes.into()),
            };
            Ok(Pipeline {
                env,
                steps,
                remaining: fields.into_remaining(),
            })
        }
        _ => Err(DecodeError::IncompatibleTypes.into()),
    }
}
