//! In-memory JWK model and the key-algorithm policy.
//!
//! Key material follows the crypto stack this workspace actually carries:
//! Ed25519 (OKP) for asymmetric signing, and raw octet keys for the
//! deterministic HMAC signatures used in tests. The policy table names
//! the full RSA/EC/OKP matrix so validation rejects the right things by
//! name even where no local backend exists for the key type.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use sha2::{Digest, Sha256};

use crate::{Error, Result};

// ---------------------------------------------------------------------------
// Algorithms
// ---------------------------------------------------------------------------

/// JWA signature algorithm identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    HS256,
    HS384,
    HS512,
    RS256,
    RS384,
    RS512,
    PS256,
    PS384,
    PS512,
    ES256,
    ES384,
    ES512,
    EdDSA,
}

impl SignatureAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            SignatureAlgorithm::HS256 => "HS256",
            SignatureAlgorithm::HS384 => "HS384",
            SignatureAlgorithm::HS512 => "HS512",
            SignatureAlgorithm::RS256 => "RS256",
            SignatureAlgorithm::RS384 => "RS384",
            SignatureAlgorithm::RS512 => "RS512",
            SignatureAlgorithm::PS256 => "PS256",
            SignatureAlgorithm::PS384 => "PS384",
            SignatureAlgorithm::PS512 => "PS512",
            SignatureAlgorithm::ES256 => "ES256",
            SignatureAlgorithm::ES384 => "ES384",
            SignatureAlgorithm::ES512 => "ES512",
            SignatureAlgorithm::EdDSA => "EdDSA",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "HS256" => SignatureAlgorithm::HS256,
            "HS384" => SignatureAlgorithm::HS384,
            "HS512" => SignatureAlgorithm::HS512,
            "RS256" => SignatureAlgorithm::RS256,
            "RS384" => SignatureAlgorithm::RS384,
            "RS512" => SignatureAlgorithm::RS512,
            "PS256" => SignatureAlgorithm::PS256,
            "PS384" => SignatureAlgorithm::PS384,
            "PS512" => SignatureAlgorithm::PS512,
            "ES256" => SignatureAlgorithm::ES256,
            "ES384" => SignatureAlgorithm::ES384,
            "ES512" => SignatureAlgorithm::ES512,
            "EdDSA" => SignatureAlgorithm::EdDSA,
            other => return Err(Error::InvalidSigningAlgorithm(other.to_string())),
        })
    }

    /// HMAC-family algorithms: deterministic, symmetric, test-only.
    pub fn is_symmetric(self) -> bool {
        matches!(
            self,
            SignatureAlgorithm::HS256 | SignatureAlgorithm::HS384 | SignatureAlgorithm::HS512
        )
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JWK key types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyType {
    Rsa,
    Ec,
    Okp,
    Oct,
}

impl KeyType {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyType::Rsa => "RSA",
            KeyType::Ec => "EC",
            KeyType::Okp => "OKP",
            KeyType::Oct => "oct",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

#[derive(Clone)]
enum KeyMaterial {
    OkpSigning(ed25519_dalek::SigningKey),
    OkpVerifying(ed25519_dalek::VerifyingKey),
    Oct(Vec<u8>),
}

// Key material never renders its bytes.
impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMaterial::OkpSigning(_) => f.write_str("OkpSigning(..)"),
            KeyMaterial::OkpVerifying(_) => f.write_str("OkpVerifying(..)"),
            KeyMaterial::Oct(_) => f.write_str("Oct(..)"),
        }
    }
}

/// An in-memory JSON Web Key.
#[derive(Clone, Debug)]
pub struct Jwk {
    kid: Option<String>,
    alg: Option<SignatureAlgorithm>,
    material: KeyMaterial,
}

impl Jwk {
    /// Generate a fresh Ed25519 signing key with `alg: EdDSA`.
    pub fn generate_okp(kid: impl Into<String>) -> Self {
        let signing = ed25519_dalek::SigningKey::generate(&mut rand_core::OsRng);
        Jwk {
            kid: Some(kid.into()),
            alg: Some(SignatureAlgorithm::EdDSA),
            material: KeyMaterial::OkpSigning(signing),
        }
    }

    /// An Ed25519 signing key from a fixed seed, for deterministic tests.
    pub fn okp_from_seed(kid: impl Into<String>, seed: &[u8; 32]) -> Self {
        Jwk {
            kid: Some(kid.into()),
            alg: Some(SignatureAlgorithm::EdDSA),
            material: KeyMaterial::OkpSigning(ed25519_dalek::SigningKey::from_bytes(seed)),
        }
    }

    /// A symmetric signer/verifier pair derived from a passphrase.
    ///
    /// HMAC signatures are deterministic, which makes them useful for
    /// golden-output tests; the validation policy refuses them for
    /// production signing.
    pub fn symmetric_from_string(
        kid: impl Into<String>,
        secret: &str,
        alg: SignatureAlgorithm,
    ) -> Result<(KeySet, KeySet)> {
        if !alg.is_symmetric() {
            return Err(Error::UnsupportedSigningAlgorithmForKeyType {
                alg,
                key_type: KeyType::Oct,
            });
        }
        let key = Jwk {
            kid: Some(kid.into()),
            alg: Some(alg),
            material: KeyMaterial::Oct(secret.as_bytes().to_vec()),
        };
        let mut signer = KeySet::new();
        signer.add(key.clone());
        let mut verifier = KeySet::new();
        verifier.add(key);
        Ok((signer, verifier))
    }

    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    pub fn algorithm(&self) -> Option<SignatureAlgorithm> {
        self.alg
    }

    /// Clear the algorithm, for exercising the missing-alg failure path.
    pub fn without_algorithm(mut self) -> Self {
        self.alg = None;
        self
    }

    pub fn key_type(&self) -> KeyType {
        match self.material {
            KeyMaterial::OkpSigning(_) | KeyMaterial::OkpVerifying(_) => KeyType::Okp,
            KeyMaterial::Oct(_) => KeyType::Oct,
        }
    }

    /// The verification half of this key. Symmetric keys are their own
    /// verification half.
    pub fn public_key(&self) -> Jwk {
        let material = match &self.material {
            KeyMaterial::OkpSigning(sk) => KeyMaterial::OkpVerifying(sk.verifying_key()),
            other => other.clone(),
        };
        Jwk {
            kid: self.kid.clone(),
            alg: self.alg,
            material,
        }
    }

    /// RFC 7638 thumbprint: SHA-256 over the required members of the key,
    /// serialized in lexicographic order with no whitespace.
    pub fn thumbprint(&self) -> [u8; 32] {
        let members = match &self.material {
            KeyMaterial::OkpSigning(sk) => okp_members(&sk.verifying_key()),
            KeyMaterial::OkpVerifying(vk) => okp_members(vk),
            KeyMaterial::Oct(secret) => {
                format!(r#"{{"k":"{}","kty":"oct"}}"#, URL_SAFE_NO_PAD.encode(secret))
            }
        };
        Sha256::digest(members.as_bytes()).into()
    }

    pub(crate) fn sign_raw(&self, alg: SignatureAlgorithm, input: &[u8]) -> Result<Vec<u8>> {
        use ed25519_dalek::Signer as _;
        use hmac::Mac as _;

        match (&self.material, alg) {
            (KeyMaterial::Oct(secret), SignatureAlgorithm::HS256) => {
                let mut mac = hmac::Hmac::<Sha256>::new_from_slice(secret)
                    .map_err(|_| Error::NotASigningKey)?;
                mac.update(input);
                Ok(mac.finalize().into_bytes().to_vec())
            }
            (KeyMaterial::Oct(secret), SignatureAlgorithm::HS384) => {
                let mut mac = hmac::Hmac::<sha2::Sha384>::new_from_slice(secret)
                    .map_err(|_| Error::NotASigningKey)?;
                mac.update(input);
                Ok(mac.finalize().into_bytes().to_vec())
            }
            (KeyMaterial::Oct(secret), SignatureAlgorithm::HS512) => {
                let mut mac = hmac::Hmac::<sha2::Sha512>::new_from_slice(secret)
                    .map_err(|_| Error::NotASigningKey)?;
                mac.update(input);
                Ok(mac.finalize().into_bytes().to_vec())
            }
            (KeyMaterial::OkpSigning(sk), SignatureAlgorithm::EdDSA) => {
                Ok(sk.sign(input).to_bytes().to_vec())
            }
            (KeyMaterial::OkpVerifying(_), SignatureAlgorithm::EdDSA) => Err(Error::NotASigningKey),
            _ => Err(Error::UnsupportedSigningAlgorithmForKeyType {
                alg,
                key_type: self.key_type(),
            }),
        }
    }

    pub(crate) fn verify_raw(
        &self,
        alg: SignatureAlgorithm,
        input: &[u8],
        signature: &[u8],
    ) -> Result<()> {
        use ed25519_dalek::Verifier as _;

        match (&self.material, alg) {
            (KeyMaterial::Oct(_), a) if a.is_symmetric() => {
                // Recompute and compare without early exit.
                let expected = self.sign_raw(alg, input)?;
                if expected.len() == signature.len() && subtle_eq(&expected, signature) {
                    Ok(())
                } else {
                    Err(Error::VerificationFailed)
                }
            }
            (KeyMaterial::OkpVerifying(vk), SignatureAlgorithm::EdDSA) => {
                let sig = ed25519_dalek::Signature::from_slice(signature)
                    .map_err(|_| Error::VerificationFailed)?;
                vk.verify(input, &sig).map_err(|_| Error::VerificationFailed)
            }
            (KeyMaterial::OkpSigning(sk), SignatureAlgorithm::EdDSA) => {
                let sig = ed25519_dalek::Signature::from_slice(signature)
                    .map_err(|_| Error::VerificationFailed)?;
                sk.verifying_key()
                    .verify(input, &sig)
                    .map_err(|_| Error::VerificationFailed)
            }
            _ => Err(Error::UnsupportedSigningAlgorithmForKeyType {
                alg,
                key_type: self.key_type(),
            }),
        }
    }
}

fn okp_members(vk: &ed25519_dalek::VerifyingKey) -> String {
    format!(
        r#"{{"crv":"Ed25519","kty":"OKP","x":"{}"}}"#,
        URL_SAFE_NO_PAD.encode(vk.to_bytes())
    )
}

// Byte comparison without early exit; the length is checked by the caller.
fn subtle_eq(a: &[u8], b: &[u8]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ---------------------------------------------------------------------------
// Key sets
// ---------------------------------------------------------------------------

/// An ordered collection of keys, tried in order during verification.
#[derive(Clone, Debug, Default)]
pub struct KeySet(Vec<Jwk>);

impl KeySet {
    pub fn new() -> Self {
        KeySet::default()
    }

    pub fn add(&mut self, key: Jwk) {
        self.0.push(key);
    }

    pub fn key(&self, index: usize) -> Option<&Jwk> {
        self.0.get(index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Jwk> {
        self.0.iter()
    }
}

impl FromIterator<Jwk> for KeySet {
    fn from_iter<I: IntoIterator<Item = Jwk>>(iter: I) -> Self {
        KeySet(iter.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

pub const VALID_RSA_ALGORITHMS: &[SignatureAlgorithm] = &[SignatureAlgorithm::PS512];
pub const VALID_EC_ALGORITHMS: &[SignatureAlgorithm] = &[SignatureAlgorithm::ES512];
pub const VALID_OKP_ALGORITHMS: &[SignatureAlgorithm] = &[SignatureAlgorithm::EdDSA];

pub const VALID_SIGNING_ALGORITHMS: &[SignatureAlgorithm] = &[
    SignatureAlgorithm::PS512,
    SignatureAlgorithm::ES512,
    SignatureAlgorithm::EdDSA,
];

/// Disallowed outright: HMAC-SHA because symmetric signatures are wrong
/// for the job-signing use case, and RSA-PKCS1v1.5 in favour of RSA-PSS.
pub const INVALID_ALGORITHMS: &[SignatureAlgorithm] = &[
    SignatureAlgorithm::HS256,
    SignatureAlgorithm::HS384,
    SignatureAlgorithm::HS512,
    SignatureAlgorithm::RS256,
    SignatureAlgorithm::RS384,
    SignatureAlgorithm::RS512,
];

pub fn valid_algorithms_for(key_type: KeyType) -> &'static [SignatureAlgorithm] {
    match key_type {
        KeyType::Rsa => VALID_RSA_ALGORITHMS,
        KeyType::Ec => VALID_EC_ALGORITHMS,
        KeyType::Okp => VALID_OKP_ALGORITHMS,
        KeyType::Oct => &[],
    }
}

/// Check that a key is suitable for production signing and verification:
/// it must carry an algorithm, the algorithm must be one of the permitted
/// asymmetric ones, and it must match the key's type.
pub fn validate(key: &Jwk) -> Result<()> {
    let Some(alg) = key.algorithm() else {
        return Err(Error::KeyMissingAlg);
    };

    if !VALID_SIGNING_ALGORITHMS.contains(&alg) {
        return Err(Error::UnsupportedSigningAlgorithm(alg));
    }

    let key_type = key.key_type();
    if !valid_algorithms_for(key_type).contains(&alg) {
        return Err(Error::UnsupportedSigningAlgorithmForKeyType { alg, key_type });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
