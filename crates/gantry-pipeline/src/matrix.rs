//! Matrix build specifications.

use gantry_ordered::{MapSS, Value};

use crate::interpolate::Transformer;
use crate::Result;

/// One concrete assignment of matrix dimensions: dimension name → scalar
/// value. This is what `{{matrix.<dim>}}` tokens are substituted from.
pub type MatrixPermutation = MapSS;

/// The `matrix` field of a command step.
///
/// The shape authors write varies (a bare sequence for an anonymous
/// dimension, or a mapping with `setup`/`adjustments`); the structure
/// passes through unmodified, is interpolated like any other value tree,
/// and is covered by the step signature.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    pub contents: Value,
}

impl Matrix {
    pub fn from_value(value: Value) -> Self {
        Matrix { contents: value }
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_logically_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        self.contents.to_json()
    }

    pub fn to_value(&self) -> Value {
        self.contents.clone()
    }

    pub(crate) fn interpolate(&mut self, tf: &dyn Transformer) -> Result<()> {
        self.contents.try_map_strings(&mut |s| tf.transform(s))
    }
}
