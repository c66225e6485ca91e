//! Sign and verify field mappings.

use std::collections::BTreeMap;

use serde::Serialize;
use sha2::{Digest, Sha256};

use gantry_pipeline::Signature;

use crate::jwk::{Jwk, KeySet};
use crate::{jws, CancelToken, Error, Result};

/// Prefix for fields lifted out of the ambient environment, keeping them
/// from colliding with the object's own fields.
pub const ENV_NAMESPACE_PREFIX: &str = "env::";

/// Types that can be signed and have signatures verified.
///
/// Converting non-string fields into stable JSON values is the
/// implementer's job; the engine canonicalises whatever it is given.
pub trait SignedFielder {
    /// The default mapping of fields to sign. Called by [`sign`].
    fn signed_fields(&self) -> Result<BTreeMap<String, serde_json::Value>>;

    /// Look up values for the given fields. Called by [`verify`] with the
    /// field list sealed into the signature, which may differ from the
    /// default set (e.g. older signatures with fewer fields).
    /// Implementations must fail if a mandatory field is absent from the
    /// list, and may leave `env::` fields to the verifier's environment.
    fn values_for_fields(
        &self,
        fields: &[String],
    ) -> Result<BTreeMap<String, serde_json::Value>>;
}

/// Options shared by signing and verification.
#[derive(Clone, Debug, Default)]
pub struct SignOptions {
    /// The ambient (pipeline-level) environment to namespace into the
    /// signed values.
    pub env: BTreeMap<String, String>,
    /// Log the canonical payload and its checksum. Off by default: the
    /// payload may embed secrets from the environment.
    pub debug_signing: bool,
}

impl SignOptions {
    pub fn with_env<K, V, I>(env: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        SignOptions {
            env: env.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            ..SignOptions::default()
        }
    }
}

/// Compute a signature over the object's signed fields combined with the
/// namespaced environment.
pub fn sign(
    ctx: &CancelToken,
    key: &Jwk,
    sf: &dyn SignedFielder,
    opts: &SignOptions,
) -> Result<Signature> {
    ctx.check()?;

    let alg = key.algorithm().ok_or(Error::KeyMissingAlg)?;

    let mut values = sf.signed_fields()?;
    if values.is_empty() {
        return Err(Error::SignatureCoversNoFields);
    }

    add_namespaced_env(&mut values, opts);

    let fields: Vec<String> = values.keys().cloned().collect();
    let payload = canonical_payload(alg.as_str(), &values)?;

    tracing::debug!(
        thumbprint = hex::encode(key.public_key().thumbprint()),
        "signing with key"
    );
    if opts.debug_signing {
        tracing::debug!(
            payload = %String::from_utf8_lossy(&payload),
            checksum = hex::encode(Sha256::digest(&payload)),
            "signed step payload"
        );
    }

    let value = jws::sign_detached(key, &payload)?;
    Ok(Signature {
        algorithm: alg.as_str().to_string(),
        signed_fields: fields,
        value,
    })
}

/// Verify an existing signature against the object and environment,
/// trying each key in the set in order.
pub fn verify(
    ctx: &CancelToken,
    signature: &Signature,
    keys: &KeySet,
    sf: &dyn SignedFielder,
    opts: &SignOptions,
) -> Result<()> {
    ctx.check()?;

    let (payload, header) = verification_payload(signature, sf, opts)?;

    for key in keys.iter() {
        ctx.check()?;
        if !key_matches(key, &header) {
            continue;
        }
        tracing::debug!(
            thumbprint = hex::encode(key.thumbprint()),
            "trying verification key"
        );
        if jws::verify_detached(key, &signature.value, &payload).is_ok() {
            return Ok(());
        }
    }
    Err(Error::VerificationFailed)
}

/// Verify against a single key, skipping key-set matching.
pub fn verify_with_key(
    ctx: &CancelToken,
    signature: &Signature,
    key: &Jwk,
    sf: &dyn SignedFielder,
    opts: &SignOptions,
) -> Result<()> {
    ctx.check()?;
    let (payload, _) = verification_payload(signature, sf, opts)?;
    jws::verify_detached(key, &signature.value, &payload)
}

fn verification_payload(
    signature: &Signature,
    sf: &dyn SignedFielder,
    opts: &SignOptions,
) -> Result<(Vec<u8>, jws::Header)> {
    if signature.signed_fields.is_empty() {
        return Err(Error::SignatureCoversNoFields);
    }

    let mut values = sf.values_for_fields(&signature.signed_fields)?;
    add_namespaced_env(&mut values, opts);

    // Every signed field must resolve to a value. Signed env:: variables
    // missing from the verification environment fail here; extra ambient
    // variables are ignored (they vary for lots of reasons).
    let mut required = BTreeMap::new();
    for field in &signature.signed_fields {
        let value = values
            .get(field)
            .ok_or_else(|| Error::MissingKey(field.clone()))?;
        required.insert(field.clone(), value.clone());
    }

    let payload = canonical_payload(&signature.algorithm, &required)?;
    if opts.debug_signing {
        tracing::debug!(
            payload = %String::from_utf8_lossy(&payload),
            checksum = hex::encode(Sha256::digest(&payload)),
            "verification payload"
        );
    }
    let header = jws::parse_header(&signature.value)?;
    Ok((payload, header))
}

// Step env overrides pipeline and build env: a variable the object
// already carries in its own `env` mapping is not lifted from the ambient
// environment, so overriding it locally keeps it out of signature scope.
fn add_namespaced_env(values: &mut BTreeMap<String, serde_json::Value>, opts: &SignOptions) {
    let object_env: Option<&serde_json::Map<String, serde_json::Value>> =
        values.get("env").and_then(serde_json::Value::as_object);
    let mut namespaced = Vec::new();
    for (k, v) in &opts.env {
        if object_env.is_some_and(|env| env.contains_key(k)) {
            continue;
        }
        namespaced.push((
            format!("{ENV_NAMESPACE_PREFIX}{k}"),
            serde_json::Value::String(v.clone()),
        ));
    }
    values.extend(namespaced);
}

fn key_matches(key: &Jwk, header: &jws::Header) -> bool {
    if key.algorithm().map(|a| a.as_str()) != Some(header.alg.as_str()) {
        return false;
    }
    match (&header.kid, key.kid()) {
        (Some(want), Some(have)) => want == have,
        (Some(_), None) => false,
        (None, _) => true,
    }
}

/// Canonical signing bytes: `jcs({"alg": <alg>, "values": <values>})`.
///
/// JCS (RFC 8785) fixes key order, number formatting, and string escapes,
/// so the bytes are stable across implementations and resist
/// concatenation-style collisions between adjacent fields.
pub fn canonical_payload(
    alg: &str,
    values: &BTreeMap<String, serde_json::Value>,
) -> Result<Vec<u8>> {
    #[derive(Serialize)]
    struct Payload<'a> {
        alg: &'a str,
        values: &'a BTreeMap<String, serde_json::Value>,
    }
    Ok(serde_jcs::to_vec(&Payload { alg, values })?)
}

/// Canonicalise logically-empty values (null, `{}`, `[]`) to JSON null.
///
/// Sign and verify do not apply this automatically; signed-field
/// implementations opt in per field where nil and empty have no semantic
/// distinction. Null was chosen as the canonical value since it is what
/// an absent field decodes to.
pub fn empty_to_nil(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(m) if m.is_empty() => serde_json::Value::Null,
        serde_json::Value::Array(a) if a.is_empty() => serde_json::Value::Null,
        other => other,
    }
}
