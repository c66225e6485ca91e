//! String substitution engines.
//!
//! Two transformers share one interface: shell-style `${VAR}` expansion
//! against a case-aware [`Env`], and `{{matrix.<dim>}}` token substitution
//! against a matrix permutation. The pipeline and every step variant
//! accept any [`Transformer`], so the same traversal drives both passes.
//!
//! Supported variable syntax: `$VAR`, `${VAR}`, `${VAR:-default}` (unset
//! or empty), `${VAR-default}` (unset only), `${VAR?message}` (error when
//! unset), and the escapes `$$` and `\$` for a literal dollar sign.
//! Unresolved variables expand to the empty string.

use crate::env::Env;
use crate::matrix::MatrixPermutation;
use crate::{Error, Result};

/// A fallible rewrite applied to every string leaf of a pipeline.
pub trait Transformer {
    fn transform(&self, input: &str) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Environment interpolation
// ---------------------------------------------------------------------------

pub struct EnvInterpolator<'a> {
    env: &'a Env,
}

impl<'a> EnvInterpolator<'a> {
    pub fn new(env: &'a Env) -> Self {
        EnvInterpolator { env }
    }
}

impl Transformer for EnvInterpolator<'_> {
    fn transform(&self, input: &str) -> Result<String> {
        interpolate(self.env, input)
    }
}

/// Expand every variable reference in `input` against `env`.
pub fn interpolate(env: &Env, input: &str) -> Result<String> {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' if matches!(chars.get(i + 1), Some('$')) => {
                out.push('$');
                i += 2;
            }
            '$' => match chars.get(i + 1) {
                Some('$') => {
                    out.push('$');
                    i += 2;
                }
                Some('{') => {
                    let Some(off) = chars[i + 2..].iter().position(|&c| c == '}') else {
                        let rest: String = chars[i + 2..].iter().collect();
                        return Err(Error::InvalidExpansion(rest));
                    };
                    let inner: String = chars[i + 2..i + 2 + off].iter().collect();
                    out.push_str(&expand_braced(env, &inner)?);
                    i += off + 3;
                }
                Some(&c) if is_ident_start(c) => {
                    let mut j = i + 1;
                    while j < chars.len() && is_ident_char(chars[j]) {
                        j += 1;
                    }
                    let name: String = chars[i + 1..j].iter().collect();
                    out.push_str(env.get(&name).unwrap_or(""));
                    i = j;
                }
                _ => {
                    out.push('$');
                    i += 1;
                }
            },
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Ok(out)
}

fn expand_braced(env: &Env, inner: &str) -> Result<String> {
    let name_end = inner
        .char_indices()
        .find(|&(idx, c)| {
            if idx == 0 {
                !is_ident_start(c)
            } else {
                !is_ident_char(c)
            }
        })
        .map(|(idx, _)| idx)
        .unwrap_or(inner.len());
    let name = &inner[..name_end];
    if name.is_empty() {
        return Err(Error::InvalidExpansion(inner.to_string()));
    }

    let rest = &inner[name_end..];
    if rest.is_empty() {
        return Ok(env.get(name).unwrap_or("").to_string());
    }
    if let Some(default) = rest.strip_prefix(":-") {
        return Ok(match env.get(name) {
            Some(v) if !v.is_empty() => v.to_string(),
            _ => default.to_string(),
        });
    }
    if let Some(default) = rest.strip_prefix('-') {
        return Ok(match env.get(name) {
            Some(v) => v.to_string(),
            None => default.to_string(),
        });
    }
    if let Some(message) = rest.strip_prefix('?') {
        return match env.get(name) {
            Some(v) => Ok(v.to_string()),
            None => Err(Error::RequiredVariable {
                name: name.to_string(),
                message: message.to_string(),
            }),
        };
    }
    Err(Error::InvalidExpansion(inner.to_string()))
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

// ---------------------------------------------------------------------------
// Matrix interpolation
// ---------------------------------------------------------------------------

/// Replaces `{{matrix.<dimension>}}` tokens with the values of a single
/// matrix permutation. Tokens naming an unknown dimension (and text that
/// merely resembles a token) are left verbatim.
pub struct MatrixInterpolator<'a> {
    permutation: &'a MatrixPermutation,
}

impl<'a> MatrixInterpolator<'a> {
    pub fn new(permutation: &'a MatrixPermutation) -> Self {
        MatrixInterpolator { permutation }
    }
}

impl Transformer for MatrixInterpolator<'_> {
    fn transform(&self, input: &str) -> Result<String> {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(start) = rest.find("{{") {
            let Some(end) = rest[start + 2..].find("}}") else {
                break;
            };
            let token = &rest[start + 2..start + 2 + end];
            out.push_str(&rest[..start]);
            match token.trim().strip_prefix("matrix.") {
                Some(dim) => match self.permutation.get(dim) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push_str(&rest[start..start + end + 4]);
                    }
                },
                None => {
                    out.push_str(&rest[start..start + end + 4]);
                }
            }
            rest = &rest[start + end + 4..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Env {
        Env::from_map([("NAME", "llama"), ("EMPTY", "")], true)
    }

    #[test]
    fn plain_and_braced_references() {
        let e = env();
        assert_eq!(interpolate(&e, "hi $NAME!").unwrap(), "hi llama!");
        assert_eq!(interpolate(&e, "hi ${NAME}!").unwrap(), "hi llama!");
    }

    #[test]
    fn unresolved_expands_to_empty() {
        let e = env();
        assert_eq!(interpolate(&e, "hi ${MISSING}!").unwrap(), "hi !");
        assert_eq!(interpolate(&e, "hi $MISSING!").unwrap(), "hi !");
    }

    #[test]
    fn default_values() {
        let e = env();
        assert_eq!(interpolate(&e, "${MISSING:-alpaca}").unwrap(), "alpaca");
        assert_eq!(interpolate(&e, "${EMPTY:-alpaca}").unwrap(), "alpaca");
        assert_eq!(interpolate(&e, "${NAME:-alpaca}").unwrap(), "llama");
        // The colon-less form only applies when unset.
        assert_eq!(interpolate(&e, "${EMPTY-alpaca}").unwrap(), "");
        assert_eq!(interpolate(&e, "${MISSING-alpaca}").unwrap(), "alpaca");
    }

    #[test]
    fn required_variable_errors_when_unset() {
        let e = env();
        assert_eq!(interpolate(&e, "${NAME?need it}").unwrap(), "llama");
        let err = interpolate(&e, "${MISSING?need it}").unwrap_err();
        match err {
            Error::RequiredVariable { name, message } => {
                assert_eq!(name, "MISSING");
                assert_eq!(message, "need it");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn dollar_escapes() {
        let e = env();
        assert_eq!(interpolate(&e, "cost: $$5").unwrap(), "cost: $5");
        assert_eq!(interpolate(&e, r"regex \$/").unwrap(), "regex $/");
        // A dollar not starting a reference is literal.
        assert_eq!(interpolate(&e, "100%$ done$").unwrap(), "100%$ done$");
        // A backslash not escaping a dollar is literal.
        assert_eq!(interpolate(&e, r"C:\temp").unwrap(), r"C:\temp");
    }

    #[test]
    fn unterminated_expansion_is_an_error() {
        let e = env();
        assert!(matches!(
            interpolate(&e, "${NAME"),
            Err(Error::InvalidExpansion(_))
        ));
        assert!(matches!(
            interpolate(&e, "${}"),
            Err(Error::InvalidExpansion(_))
        ));
    }

    #[test]
    fn case_insensitive_lookup() {
        let e = Env::from_map([("FRIEND", "upper")], false);
        assert_eq!(interpolate(&e, "${friend}").unwrap(), "upper");
        let e = Env::from_map([("FRIEND", "upper")], true);
        assert_eq!(interpolate(&e, "${friend}").unwrap(), "");
    }

    #[test]
    fn matrix_tokens() {
        let perm: MatrixPermutation = [("docker_version", "4.5.6"), ("image", "alpine")]
            .into_iter()
            .map(|(k, v)| (k, v.to_string()))
            .collect();
        let tf = MatrixInterpolator::new(&perm);
        assert_eq!(
            tf.transform("docker#{{matrix.docker_version}}").unwrap(),
            "docker#4.5.6"
        );
        assert_eq!(tf.transform("{{ matrix.image }}").unwrap(), "alpine");
        // Unknown dimensions and non-matrix tokens pass through.
        assert_eq!(
            tf.transform("{{matrix.unknown}}").unwrap(),
            "{{matrix.unknown}}"
        );
        assert_eq!(tf.transform("{{other}}").unwrap(), "{{other}}");
    }
}
