//! Detached-payload JWS, compact serialization.
//!
//! The signing input is `BASE64URL(header) || '.' || BASE64URL(payload)`;
//! the compact form carries an empty payload segment
//! (`header..signature`), with the payload known to both sides
//! out-of-band (RFC 7515 appendix F).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::jwk::{Jwk, SignatureAlgorithm};
use crate::{Error, Result};

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Header {
    pub alg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

impl Header {
    pub fn algorithm(&self) -> Result<SignatureAlgorithm> {
        SignatureAlgorithm::from_str(&self.alg)
    }
}

/// Sign `payload` with `key`, producing `header..signature`.
pub(crate) fn sign_detached(key: &Jwk, payload: &[u8]) -> Result<String> {
    let alg = key.algorithm().ok_or(Error::KeyMissingAlg)?;
    let header = Header {
        alg: alg.as_str().to_string(),
        kid: key.kid().map(str::to_string),
    };
    let header_b64 =
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).map_err(Error::Canonicalise)?);
    let signing_input = format!("{header_b64}.{}", URL_SAFE_NO_PAD.encode(payload));
    let signature = key.sign_raw(alg, signing_input.as_bytes())?;
    Ok(format!("{header_b64}..{}", URL_SAFE_NO_PAD.encode(signature)))
}

/// Verify a `header..signature` compact form against `payload`.
pub(crate) fn verify_detached(key: &Jwk, compact: &str, payload: &[u8]) -> Result<()> {
    let (header_b64, signature_b64) = split_compact(compact)?;
    let header = decode_header(header_b64)?;
    let alg = header.algorithm()?;
    let signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| Error::MalformedSignature)?;
    let signing_input = format!("{header_b64}.{}", URL_SAFE_NO_PAD.encode(payload));
    key.verify_raw(alg, signing_input.as_bytes(), &signature)
}

/// The protected header of a compact detached JWS.
pub(crate) fn parse_header(compact: &str) -> Result<Header> {
    let (header_b64, _) = split_compact(compact)?;
    decode_header(header_b64)
}

fn split_compact(compact: &str) -> Result<(&str, &str)> {
    let mut parts = compact.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(""), Some(signature), None) if !header.is_empty() => {
            Ok((header, signature))
        }
        _ => Err(Error::MalformedSignature),
    }
}

fn decode_header(header_b64: &str) -> Result<Header> {
    let raw = URL_SAFE_NO_PAD
        .decode(header_b64)
        .map_err(|_| Error::MalformedSignature)?;
    serde_json::from_slice(&raw).map_err(|_| Error::MalformedSignature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwk::KeyType;

    #[test]
    fn header_segment_matches_rfc7515_encoding() {
        let (signer, _) =
            Jwk::symmetric_from_string("chartreuse", "alpacas", SignatureAlgorithm::HS256)
                .unwrap();
        let compact = sign_detached(signer.key(0).unwrap(), b"payload").unwrap();
        assert!(
            compact.starts_with("eyJhbGciOiJIUzI1NiIsImtpZCI6ImNoYXJ0cmV1c2UifQ.."),
            "compact was: {compact}"
        );
    }

    #[test]
    fn sign_verify_roundtrip_hmac() {
        let (signer, verifier) =
            Jwk::symmetric_from_string("kid", "alpacas", SignatureAlgorithm::HS512).unwrap();
        let compact = sign_detached(signer.key(0).unwrap(), b"llamas").unwrap();
        verify_detached(verifier.key(0).unwrap(), &compact, b"llamas").unwrap();
        assert!(matches!(
            verify_detached(verifier.key(0).unwrap(), &compact, b"alpacas"),
            Err(Error::VerificationFailed)
        ));
    }

    #[test]
    fn sign_verify_roundtrip_eddsa() {
        let key = Jwk::okp_from_seed("kid", &[42u8; 32]);
        let compact = sign_detached(&key, b"llamas").unwrap();
        verify_detached(&key.public_key(), &compact, b"llamas").unwrap();

        let other = Jwk::okp_from_seed("kid", &[43u8; 32]);
        assert!(matches!(
            verify_detached(&other.public_key(), &compact, b"llamas"),
            Err(Error::VerificationFailed)
        ));
    }

    #[test]
    fn public_half_cannot_sign() {
        let key = Jwk::okp_from_seed("kid", &[42u8; 32]).public_key();
        assert!(matches!(
            sign_detached(&key, b"llamas"),
            Err(Error::NotASigningKey)
        ));
    }

    #[test]
    fn middle_segment_must_be_empty() {
        let key = Jwk::okp_from_seed("kid", &[42u8; 32]);
        assert!(matches!(
            verify_detached(&key, "aGVhZGVy.cGF5bG9hZA.c2ln", b"x"),
            Err(Error::MalformedSignature)
        ));
        assert!(matches!(
            verify_detached(&key, "not-a-jws", b"x"),
            Err(Error::MalformedSignature)
        ));
    }

    #[test]
    fn alg_material_mismatch_is_rejected() {
        let key = Jwk::okp_from_seed("kid", &[42u8; 32]);
        assert!(matches!(
            key.sign_raw(SignatureAlgorithm::HS256, b"x"),
            Err(Error::UnsupportedSigningAlgorithmForKeyType {
                alg: SignatureAlgorithm::HS256,
                key_type: KeyType::Okp,
            })
        ));
    }
}
