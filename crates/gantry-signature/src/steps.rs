//! Signing pipeline steps.
//!
//! Command steps are signed individually; group steps recurse. A pipeline
//! containing an unclassified step is refused before any signature is
//! attached, so a failed signing pass never leaves the pipeline half
//! mutated.

use std::collections::BTreeMap;

use gantry_pipeline::{CommandStep, Pipeline, Step};

use crate::jwk::Jwk;
use crate::sign::{empty_to_nil, sign, SignOptions, SignedFielder, ENV_NAMESPACE_PREFIX};
use crate::{CancelToken, Error, Result};

/// A command step paired with the values that must not vary between
/// upload and execution, such as the repository the step runs against.
#[derive(Clone, Debug)]
pub struct CommandStepWithInvariants {
    pub step: CommandStep,
    pub repository_url: String,
}

const MANDATORY_FIELDS: &[&str] = &["command", "env", "matrix", "plugins", "repository_url"];

impl CommandStepWithInvariants {
    fn value_of(&self, field: &str) -> Option<serde_json::Value> {
        match field {
            "command" => Some(serde_json::Value::String(self.step.command.clone())),
            "env" => Some(empty_to_nil(self.step.env.to_json())),
            "plugins" => Some(empty_to_nil(self.step.plugins.to_json())),
            "matrix" => Some(match &self.step.matrix {
                Some(matrix) => empty_to_nil(matrix.to_json()),
                None => serde_json::Value::Null,
            }),
            "repository_url" => Some(serde_json::Value::String(self.repository_url.clone())),
            _ => None,
        }
    }
}

impl SignedFielder for CommandStepWithInvariants {
    fn signed_fields(&self) -> Result<BTreeMap<String, serde_json::Value>> {
        let mut out = BTreeMap::new();
        for field in MANDATORY_FIELDS {
            // value_of covers every mandatory field.
            if let Some(value) = self.value_of(field) {
                out.insert(field.to_string(), value);
            }
        }
        Ok(out)
    }

    fn values_for_fields(
        &self,
        fields: &[String],
    ) -> Result<BTreeMap<String, serde_json::Value>> {
        // A signature that doesn't cover the mandatory fields could be
        // hiding a command change; reject it outright.
        for mandatory in MANDATORY_FIELDS {
            if !fields.iter().any(|f| f == mandatory) {
                return Err(Error::MissingKey(mandatory.to_string()));
            }
        }

        let mut out = BTreeMap::new();
        for field in fields {
            match self.value_of(field) {
                Some(value) => {
                    out.insert(field.clone(), value);
                }
                // env:: fields are supplied by the verifier's environment.
                None if field.starts_with(ENV_NAMESPACE_PREFIX) => {}
                None => return Err(Error::UnknownField(field.clone())),
            }
        }
        Ok(out)
    }
}

/// Sign every command step in `steps`, recursing into groups. Signatures
/// are attached in place.
pub fn sign_steps(
    ctx: &CancelToken,
    steps: &mut [Step],
    key: &Jwk,
    repository_url: &str,
    opts: &SignOptions,
) -> Result<()> {
    // Scan before mutating: a refusal must leave every step untouched.
    ensure_signable(steps)?;
    sign_steps_inner(ctx, steps, key, repository_url, opts)
}

/// Sign every command step of a pipeline.
pub fn sign_pipeline(
    ctx: &CancelToken,
    pipeline: &mut Pipeline,
    key: &Jwk,
    repository_url: &str,
    opts: &SignOptions,
) -> Result<()> {
    sign_steps(ctx, &mut pipeline.steps, key, repository_url, opts)
}

fn ensure_signable(steps: &[Step]) -> Result<()> {
    for step in steps {
        match step {
            // An unknown step means some semantic information about the
            // pipeline is missing; something that needs signing might not
            // get signed.
            Step::Unknown(_) => return Err(Error::SigningRefusedUnknownStepType),
            Step::Group(group) => ensure_signable(&group.steps)?,
            _ => {}
        }
    }
    Ok(())
}

fn sign_steps_inner(
    ctx: &CancelToken,
    steps: &mut [Step],
    key: &Jwk,
    repository_url: &str,
    opts: &SignOptions,
) -> Result<()> {
    for step in steps {
        match step {
            Step::Command(command) => {
                let with_invariants = CommandStepWithInvariants {
                    step: command.clone(),
                    repository_url: repository_url.to_string(),
                };
                let signature = sign(ctx, key, &with_invariants, opts)?;
                command.signature = Some(signature);
            }
            Step::Group(group) => {
                sign_steps_inner(ctx, &mut group.steps, key, repository_url, opts)?;
            }
            _ => {}
        }
    }
    Ok(())
}
