//! Cryptographically verifiable signatures over pipeline command steps.
//!
//! A step advertises the mapping of fields it wants signed
//! ([`SignedFielder`]); the engine namespaces the ambient pipeline
//! environment into that mapping (`env::<NAME>`), canonicalises the whole
//! thing with RFC 8785 (JCS), and signs the canonical bytes as a
//! detached-payload JWS in compact form. Verification rebuilds the exact
//! payload from the sealed `signed_fields` list and checks the JWS against
//! a key set.
//!
//! The key-algorithm policy ([`jwk::validate`]) is deliberately separate
//! from the JWS wrapper: production callers validate keys (asymmetric
//! only), while tests sign with deterministic HMAC keys through the same
//! engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub mod jwk;
mod jws;
mod sign;
pub mod steps;

pub use jwk::{Jwk, KeySet, KeyType, SignatureAlgorithm};
pub use sign::{
    canonical_payload, empty_to_nil, sign, verify, verify_with_key, SignOptions, SignedFielder,
    ENV_NAMESPACE_PREFIX,
};
pub use steps::{sign_pipeline, sign_steps, CommandStepWithInvariants};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("key is missing algorithm")]
    KeyMissingAlg,

    #[error("invalid signing algorithm: {0:?}")]
    InvalidSigningAlgorithm(String),

    #[error("unsupported signing algorithm: {0}")]
    UnsupportedSigningAlgorithm(SignatureAlgorithm),

    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(KeyType),

    #[error("unsupported signing algorithm {alg} for key type {key_type}")]
    UnsupportedSigningAlgorithmForKeyType {
        alg: SignatureAlgorithm,
        key_type: KeyType,
    },

    #[error("key cannot be used for signing")]
    NotASigningKey,

    #[error("signature covers no fields")]
    SignatureCoversNoFields,

    #[error("missing key {0:?}")]
    MissingKey(String),

    #[error("unknown field {0:?}")]
    UnknownField(String),

    #[error("malformed signature value")]
    MalformedSignature,

    #[error("signature verification failed")]
    VerificationFailed,

    /// The pipeline contains a step that could not be classified. Signing
    /// something whose semantics are uncertain would defer the failure to
    /// job run time, so it is refused up front.
    #[error("refusing to sign pipeline containing a step of unknown type")]
    SigningRefusedUnknownStepType,

    #[error("operation cancelled")]
    Cancelled,

    #[error("canonicalising payload: {0}")]
    Canonicalise(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// A cancellation token threaded through signing and verification.
///
/// The engine itself performs no I/O, but key-set iteration (and any
/// future remote-backed signer) is bounded by checking the token between
/// steps. Cloning shares the underlying flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}
