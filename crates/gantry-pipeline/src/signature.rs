//! The signature attached to a signed command step.
//!
//! Construction and verification live in `gantry-signature`; this type is
//! only the serialized shape carried by the pipeline document.

use gantry_ordered::{Fields, MapSA, Value};

use crate::Result;

/// A detached signature over a step's signed fields.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Signature {
    /// JWA algorithm identifier, e.g. `EdDSA` or `PS512`.
    pub algorithm: String,
    /// The exact set of keys covered by the signature, sorted ascending
    /// and sealed at sign time.
    pub signed_fields: Vec<String>,
    /// Detached-payload JWS in compact form; the payload segment is empty.
    pub value: String,
}

impl Signature {
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Map(m) = value else {
            return Err(gantry_ordered::Error::IncompatibleTypes.into());
        };
        let mut fields = Fields::new(m);
        let algorithm = fields.take_string("algorithm")?.unwrap_or_default();
        let signed_fields = fields.take_string_seq("signed_fields")?;
        let value = fields.take_string("value")?.unwrap_or_default();
        Ok(Signature {
            algorithm,
            signed_fields,
            value,
        })
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::with_capacity(3);
        obj.insert(
            "algorithm".into(),
            serde_json::Value::String(self.algorithm.clone()),
        );
        obj.insert(
            "signed_fields".into(),
            serde_json::Value::Array(
                self.signed_fields
                    .iter()
                    .map(|f| serde_json::Value::String(f.clone()))
                    .collect(),
            ),
        );
        obj.insert("value".into(), serde_json::Value::String(self.value.clone()));
        serde_json::Value::Object(obj)
    }

    pub fn to_value(&self) -> Value {
        let mut out = MapSA::new();
        out.set("algorithm", Value::String(self.algorithm.clone()));
        out.set(
            "signed_fields",
            Value::Seq(
                self.signed_fields
                    .iter()
                    .cloned()
                    .map(Value::String)
                    .collect(),
            ),
        );
        out.set("value", Value::String(self.value.clone()));
        Value::Map(out)
    }
}
