//! Step variants and step-type dispatch.
//!
//! A step node is classified by structural cues first (which keys it
//! carries, or which scalar it is), then by an explicit `type`
//! discriminator. Nodes that match nothing become [`UnknownStep`]s,
//! preserved verbatim and reported as warnings rather than errors, so one
//! unrecognised step doesn't sink the whole document.

use gantry_ordered::{Error as DecodeError, Fields, MapSA, MapSS, Value};

use crate::cache::Cache;
use crate::interpolate::Transformer;
use crate::matrix::Matrix;
use crate::plugin::Plugins;
use crate::signature::Signature;
use crate::warning::Warnings;
use crate::{marshal, Error, Result};

/// A single pipeline step.
#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    Command(CommandStep),
    Wait(WaitStep),
    Input(InputStep),
    Trigger(TriggerStep),
    Group(GroupStep),
    Unknown(UnknownStep),
}

/// A step that runs commands on an agent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommandStep {
    pub key: String,
    pub label: String,
    /// All scalar values found under `command` or `commands`, joined with
    /// newlines.
    pub command: String,
    pub depends_on: Vec<String>,
    pub env: MapSS,
    pub plugins: Plugins,
    pub matrix: Option<Matrix>,
    pub cache: Option<Cache>,
    pub signature: Option<Signature>,
    pub remaining: MapSA,
}

/// A wait step: either the scalar `wait` / `waiter`, or a mapping with a
/// `wait` key and arbitrary other contents.
#[derive(Clone, Debug, PartialEq)]
pub enum WaitStep {
    Scalar(String),
    Map(MapSA),
}

/// A block/input/manual step, scalar or mapping form.
#[derive(Clone, Debug, PartialEq)]
pub enum InputStep {
    Scalar(String),
    Map(MapSA),
}

/// A step that triggers another pipeline.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TriggerStep {
    pub contents: MapSA,
}

/// A group of steps with an optional label.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroupStep {
    pub key: String,
    pub group: Option<String>,
    pub steps: Vec<Step>,
    pub remaining: MapSA,
}

/// A step that could not be classified. Its raw contents are preserved so
/// it still round-trips.
#[derive(Clone, Debug, PartialEq)]
pub struct UnknownStep {
    pub contents: Value,
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

impl Step {
    /// Classify and decode one step node. Nodes that cannot be classified
    /// or typed-decoded degrade to [`Step::Unknown`] with the reason
    /// recorded in `warnings`.
    pub fn from_value(value: Value, warnings: &mut Warnings) -> Step {
        match value {
            Value::String(s) => match s.as_str() {
                "wait" | "waiter" => Step::Wait(WaitStep::Scalar(s)),
                "block" | "input" => Step::Input(InputStep::Scalar(s)),
                _ => {
                    warnings.push(Error::UnknownStepType);
                    Step::Unknown(UnknownStep {
                        contents: Value::String(s),
                    })
                }
            },
            Value::Map(m) => Step::from_map(m, warnings),
            other => {
                warnings.push(Error::UnknownStepType);
                Step::Unknown(UnknownStep { contents: other })
            }
        }
    }

    fn from_map(m: MapSA, warnings: &mut Warnings) -> Step {
        let kind = match classify(&m) {
            Ok(kind) => kind,
            Err(warning) => {
                warnings.push(warning);
                return Step::Unknown(UnknownStep {
                    contents: Value::Map(m),
                });
            }
        };

        let decoded = match kind {
            StepKind::Command => CommandStep::from_map(m.clone()).map(Step::Command),
            StepKind::Wait => Ok(Step::Wait(WaitStep::Map(m.clone()))),
            StepKind::Input => Ok(Step::Input(InputStep::Map(m.clone()))),
            StepKind::Trigger => Ok(Step::Trigger(TriggerStep {
                contents: m.clone(),
            })),
            StepKind::Group => GroupStep::from_map(m.clone(), warnings).map(Step::Group),
        };
        match decoded {
            Ok(step) => step,
            Err(err) => {
                warnings.push(err);
                Step::Unknown(UnknownStep {
                    contents: Value::Map(m),
                })
            }
        }
    }

    pub(crate) fn interpolate(&mut self, tf: &dyn Transformer) -> Result<()> {
        match self {
            Step::Command(step) => step.interpolate(tf),
            Step::Wait(WaitStep::Map(m)) | Step::Input(InputStep::Map(m)) => {
                m.try_map_strings(&mut |s| tf.transform(s))
            }
            Step::Wait(WaitStep::Scalar(_)) | Step::Input(InputStep::Scalar(_)) => Ok(()),
            Step::Trigger(step) => step.contents.try_map_strings(&mut |s| tf.transform(s)),
            Step::Group(step) => step.interpolate(tf),
            Step::Unknown(step) => step.contents.try_map_strings(&mut |s| tf.transform(s)),
        }
    }

    pub fn to_json_value(&self) -> Result<serde_json::Value> {
        match self {
            Step::Command(step) => step.to_json_value(),
            Step::Wait(WaitStep::Scalar(s)) | Step::Input(InputStep::Scalar(s)) => {
                Ok(serde_json::Value::String(s.clone()))
            }
            Step::Wait(WaitStep::Map(m)) | Step::Input(InputStep::Map(m)) => {
                Ok(Value::Map(m.clone()).to_json())
            }
            Step::Trigger(step) => Ok(Value::Map(step.contents.clone()).to_json()),
            Step::Group(step) => step.to_json_value(),
            Step::Unknown(step) => Ok(step.contents.to_json()),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Step::Command(step) => step.to_value(),
            Step::Wait(WaitStep::Scalar(s)) | Step::Input(InputStep::Scalar(s)) => {
                Value::String(s.clone())
            }
            Step::Wait(WaitStep::Map(m)) | Step::Input(InputStep::Map(m)) => {
                Value::Map(m.clone())
            }
            Step::Trigger(step) => Value::Map(step.contents.clone()),
            Step::Group(step) => step.to_value(),
            Step::Unknown(step) => step.contents.clone(),
        }
    }
}

enum StepKind {
    Command,
    Wait,
    Input,
    Trigger,
    Group,
}

fn classify(m: &MapSA) -> std::result::Result<StepKind, Error> {
    if m.contains_key("command") || m.contains_key("commands") {
        return Ok(StepKind::Command);
    }
    if m.contains_key("wait") || m.contains_key("waiter") {
        return Ok(StepKind::Wait);
    }
    if m.contains_key("block") || m.contains_key("input") {
        return Ok(StepKind::Input);
    }
    if m.contains_key("trigger") {
        return Ok(StepKind::Trigger);
    }
    if m.contains_key("group") || m.contains_key("steps") {
        return Ok(StepKind::Group);
    }
    match m.get("type") {
        Some(Value::String(t)) => match t.as_str() {
            "command" | "script" => Ok(StepKind::Command),
            "wait" | "waiter" => Ok(StepKind::Wait),
            "block" | "input" | "manual" => Ok(StepKind::Input),
            "trigger" => Ok(StepKind::Trigger),
            "group" => Ok(StepKind::Group),
            _ => Err(Error::UnknownStepType),
        },
        Some(_) => Err(Error::UnknownStepType),
        None => Err(Error::StepTypeInference),
    }
}

/// Decode a sequence of step nodes.
pub(crate) fn steps_from_seq(items: Vec<Value>, warnings: &mut Warnings) -> Vec<Step> {
    items
        .into_iter()
        .map(|item| Step::from_value(item, warnings))
        .collect()
}

// ---------------------------------------------------------------------------
// CommandStep
// ---------------------------------------------------------------------------

impl CommandStep {
    pub(crate) fn from_map(m: MapSA) -> Result<CommandStep> {
        // `command` and `commands` contribute to a single field, in the
        // order the keys appear in the source.
        let mut commands: Vec<String> = Vec::new();
        for (k, v) in m.iter() {
            if k != "command" && k != "commands" {
                continue;
            }
            match v {
                Value::Null => {}
                other => commands.extend(other.string_seq()?),
            }
        }

        let mut fields = Fields::new(m);
        let _ = fields.take("command");
        let _ = fields.take("commands");
        let key = fields
            .take_string_alias(&["key", "id", "identifier"])?
            .unwrap_or_default();
        let label = fields
            .take_string_alias(&["label", "name"])?
            .unwrap_or_default();
        let depends_on = fields.take_string_seq("depends_on")?;
        let env = fields.take_string_map("env")?;
        let plugins = match fields.take("plugins") {
            Some(v) => Plugins::from_value(v)?,
            None => Plugins::default(),
        };
        let matrix = match fields.take("matrix") {
            None | Some(Value::Null) => None,
            Some(v) => Some(Matrix::from_value(v)),
        };
        let cache = match fields.take("cache") {
            None | Some(Value::Null) => None,
            Some(v) => Some(Cache::from_value(v)?),
        };
        let signature = match fields.take("signature") {
            None | Some(Value::Null) => None,
            Some(v) => Some(Signature::from_value(v)?),
        };

        Ok(CommandStep {
            key,
            label,
            command: commands.join("\n"),
            depends_on,
            env,
            plugins,
            matrix,
            cache,
            signature,
            remaining: fields.into_remaining(),
        })
    }

    fn interpolate(&mut self, tf: &dyn Transformer) -> Result<()> {
        self.key = tf.transform(&self.key)?;
        self.label = tf.transform(&self.label)?;
        self.command = tf.transform(&self.command)?;
        for dep in &mut self.depends_on {
            *dep = tf.transform(dep)?;
        }
        // Step env is rewritten like any other leaf, but is never a lookup
        // source for interpolation.
        self.env.try_map_strings(&mut |s| tf.transform(s))?;
        self.plugins.interpolate(tf)?;
        if let Some(matrix) = &mut self.matrix {
            matrix.interpolate(tf)?;
        }
        if let Some(cache) = &mut self.cache {
            cache.interpolate(tf)?;
        }
        // The signature, if any, is sealed data.
        self.remaining.try_map_strings(&mut |s| tf.transform(s))
    }

    pub fn to_json_value(&self) -> Result<serde_json::Value> {
        let mut declared = Vec::new();
        if !self.command.is_empty() {
            declared.push(("command", serde_json::Value::String(self.command.clone())));
        }
        if !self.key.is_empty() {
            declared.push(("key", serde_json::Value::String(self.key.clone())));
        }
        if !self.label.is_empty() {
            declared.push(("label", serde_json::Value::String(self.label.clone())));
        }
        if !self.depends_on.is_empty() {
            declared.push((
                "depends_on",
                serde_json::Value::Array(
                    self.depends_on
                        .iter()
                        .map(|d| serde_json::Value::String(d.clone()))
                        .collect(),
                ),
            ));
        }
        if !self.env.is_empty() {
            declared.push(("env", self.env.to_json()));
        }
        if !self.plugins.is_empty() {
            declared.push(("plugins", self.plugins.to_json()));
        }
        if let Some(matrix) = &self.matrix {
            declared.push(("matrix", matrix.to_json()));
        }
        if let Some(cache) = &self.cache {
            declared.push(("cache", cache.to_json()?));
        }
        if let Some(signature) = &self.signature {
            declared.push(("signature", signature.to_json()));
        }
        marshal::flat_object(declared, &self.remaining)
    }

    pub fn to_value(&self) -> Value {
        let mut out = MapSA::new();
        if !self.key.is_empty() {
            out.set("key", Value::String(self.key.clone()));
        }
        if !self.label.is_empty() {
            out.set("label", Value::String(self.label.clone()));
        }
        if !self.command.is_empty() {
            out.set("command", Value::String(self.command.clone()));
        }
        if !self.depends_on.is_empty() {
            out.set(
                "depends_on",
                Value::Seq(self.depends_on.iter().cloned().map(Value::String).collect()),
            );
        }
        if !self.env.is_empty() {
            let mut env = MapSA::new();
            for (k, v) in self.env.iter() {
                env.set(k, Value::String(v.clone()));
            }
            out.set("env", Value::Map(env));
        }
        if !self.plugins.is_empty() {
            out.set("plugins", self.plugins.to_value());
        }
        if let Some(matrix) = &self.matrix {
            out.set("matrix", matrix.to_value());
        }
        if let Some(cache) = &self.cache {
            out.set("cache", cache.to_value());
        }
        if let Some(signature) = &self.signature {
            out.set("signature", signature.to_value());
        }
        for (k, v) in self.remaining.iter() {
            out.set(k, v.clone());
        }
        Value::Map(out)
    }
}

// ---------------------------------------------------------------------------
// GroupStep
// ---------------------------------------------------------------------------

impl GroupStep {
    fn from_map(m: MapSA, warnings: &mut Warnings) -> Result<GroupStep> {
        let mut fields = Fields::new(m);
        let group = match fields.take("group") {
            None | Some(Value::Null) => None,
            Some(Value::Seq(_)) | Some(Value::Map(_)) => {
                return Err(DecodeError::IncompatibleTypes.into())
            }
            Some(scalar) => Some(scalar.scalar_string().map_err(Error::Decode)?),
        };
        let key = fields
            .take_string_alias(&["key", "id", "identifier"])?
            .unwrap_or_default();
        let steps = match fields.take("steps") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Seq(items)) => steps_from_seq(items, warnings),
            Some(_) => return Err(DecodeError::IncompatibleTypes.into()),
        };
        Ok(GroupStep {
            key,
            group,
            steps,
            remaining: fields.into_remaining(),
        })
    }

    fn interpolate(&mut self, tf: &dyn Transformer) -> Result<()> {
        self.key = tf.transform(&self.key)?;
        if let Some(group) = &mut self.group {
            *group = tf.transform(group)?;
        }
        for step in &mut self.steps {
            step.interpolate(tf)?;
        }
        self.remaining.try_map_strings(&mut |s| tf.transform(s))
    }

    pub fn to_json_value(&self) -> Result<serde_json::Value> {
        let mut declared = Vec::new();
        // The group label is what identifies the step, so it is emitted
        // even when null.
        declared.push((
            "group",
            match &self.group {
                Some(g) => serde_json::Value::String(g.clone()),
                None => serde_json::Value::Null,
            },
        ));
        if !self.key.is_empty() {
            declared.push(("key", serde_json::Value::String(self.key.clone())));
        }
        let steps: Vec<serde_json::Value> = self
            .steps
            .iter()
            .map(Step::to_json_value)
            .collect::<Result<_>>()?;
        declared.push(("steps", serde_json::Value::Array(steps)));
        marshal::flat_object(declared, &self.remaining)
    }

    pub fn to_value(&self) -> Value {
        let mut out = MapSA::new();
        if !self.key.is_empty() {
            out.set("key", Value::String(self.key.clone()));
        }
        out.set(
            "group",
            match &self.group {
                Some(g) => Value::String(g.clone()),
                None => Value::Null,
            },
        );
        out.set(
            "steps",
            Value::Seq(self.steps.iter().map(Step::to_value).collect()),
        );
        for (k, v) in self.remaining.iter() {
            out.set(k, v.clone());
        }
        Value::Map(out)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
