//! ECDSA P-256 payload verification.
//!
//! The caller signs the raw request body: SHA-256 over the exact bytes, then
//! an ECDSA signature encoded as ASN.1 DER and transported as standard base64.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use der::asn1::IntRef;
use der::{Decode, Reader, SliceReader};
use p256::FieldBytes;
use p256::ecdsa::signature::hazmat::PrehashVerifier;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::pkcs8::DecodePublicKey;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::keys::KeyError;

/// Structural problems with a signature, as opposed to a plain mismatch.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("signature header is missing")]
    Missing,
    #[error("signature is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("signature is not a DER encoded (r, s) pair: {0}")]
    Der(#[from] der::Error),
}

/// Verifies payload signatures against one trusted public key.
#[derive(Debug, Clone)]
pub struct PayloadVerifier {
    key: VerifyingKey,
}

impl PayloadVerifier {
    pub fn new(key: VerifyingKey) -> Self {
        Self { key }
    }

    /// Build a verifier from a SubjectPublicKeyInfo PEM block.
    pub fn from_public_key_pem(pem: &str) -> Result<Self, KeyError> {
        let key = VerifyingKey::from_public_key_pem(pem.trim())
            .map_err(|err| KeyError::Pem(err.to_string()))?;
        Ok(Self::new(key))
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.key
    }

    /// Check `signature` against the SHA-256 digest of `payload`.
    ///
    /// Returns `Ok(false)` when the signature decodes but does not match, and
    /// an error when it cannot be decoded at all. A well-formed pair whose
    /// integers fall outside [1, n-1] is a mismatch, not a decode failure.
    /// The payload is hashed as given; no normalisation happens before
    /// hashing.
    pub fn verify(&self, payload: &[u8], signature: &str) -> Result<bool, SignatureError> {
        let der = STANDARD.decode(signature)?;
        let (r, s) = decode_pair(&der)?;
        let (Some(r), Some(s)) = (scalar_bytes(r), scalar_bytes(s)) else {
            return Ok(false);
        };
        let Ok(signature) = Signature::from_scalars(r, s) else {
            return Ok(false);
        };
        let digest = Sha256::digest(payload);
        Ok(self.key.verify_prehash(&digest, &signature).is_ok())
    }
}

/// Parse `SEQUENCE { r INTEGER, s INTEGER }` with nothing after it.
fn decode_pair(der: &[u8]) -> der::Result<(IntRef<'_>, IntRef<'_>)> {
    let mut reader = SliceReader::new(der)?;
    let pair = reader.sequence(|seq| Ok((IntRef::decode(seq)?, IntRef::decode(seq)?)))?;
    reader.finish(pair)
}

/// Big-endian 32 byte form of a non-negative integer, or `None` when it is
/// negative or does not fit.
fn scalar_bytes(int: IntRef<'_>) -> Option<FieldBytes> {
    let bytes = int.as_bytes();
    if bytes.first().is_some_and(|byte| byte & 0x80 != 0) {
        return None;
    }
    let start = bytes.iter().position(|byte| *byte != 0).unwrap_or(bytes.len());
    let digits = &bytes[start..];
    let mut out = FieldBytes::default();
    let offset = out.len().checked_sub(digits.len())?;
    out[offset..].copy_from_slice(digits);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::SigningKey;
    use p256::ecdsa::signature::Signer;
    use p256::pkcs8::{EncodePublicKey, LineEnding};

    fn signing_key() -> SigningKey {
        SigningKey::from_slice(&[7u8; 32]).expect("key")
    }

    fn sign(key: &SigningKey, payload: &[u8]) -> String {
        let signature: Signature = key.sign(payload);
        STANDARD.encode(signature.to_der().as_bytes())
    }

    #[test]
    fn accepts_matching_signature() {
        let key = signing_key();
        let verifier = PayloadVerifier::new(*key.verifying_key());
        let payload = br#"{"messages":[]}"#;
        assert!(verifier.verify(payload, &sign(&key, payload)).expect("verify"));
    }

    #[test]
    fn rejects_signature_over_other_bytes() {
        let key = signing_key();
        let verifier = PayloadVerifier::new(*key.verifying_key());
        let signature = sign(&key, b"original");
        assert!(!verifier.verify(b"original ", &signature).expect("verify"));
    }

    #[test]
    fn rejects_signature_from_other_key() {
        let key = signing_key();
        let other = SigningKey::from_slice(&[9u8; 32]).expect("key");
        let verifier = PayloadVerifier::new(*key.verifying_key());
        let signature = sign(&other, b"payload");
        assert!(!verifier.verify(b"payload", &signature).expect("verify"));
    }

    #[test]
    fn invalid_base64_is_structural() {
        let verifier = PayloadVerifier::new(*signing_key().verifying_key());
        let err = verifier.verify(b"payload", "not base64!!").unwrap_err();
        assert!(matches!(err, SignatureError::Base64(_)));
    }

    #[test]
    fn non_der_bytes_are_structural() {
        let verifier = PayloadVerifier::new(*signing_key().verifying_key());
        let err = verifier
            .verify(b"payload", &STANDARD.encode(b"garbage"))
            .unwrap_err();
        assert!(matches!(err, SignatureError::Der(_)));
    }

    #[test]
    fn trailing_bytes_after_der_are_rejected() {
        let key = signing_key();
        let verifier = PayloadVerifier::new(*key.verifying_key());
        let signature: Signature = key.sign(b"payload");
        let mut der = signature.to_der().as_bytes().to_vec();
        der.push(0);
        let err = verifier
            .verify(b"payload", &STANDARD.encode(der))
            .unwrap_err();
        assert!(matches!(err, SignatureError::Der(_)));
    }

    fn verify_raw(der: &[u8]) -> Result<bool, SignatureError> {
        let verifier = PayloadVerifier::new(*signing_key().verifying_key());
        verifier.verify(b"payload", &STANDARD.encode(der))
    }

    #[test]
    fn zero_scalar_is_a_mismatch() {
        // SEQUENCE { INTEGER 0, INTEGER 1 }
        let der = [0x30, 0x06, 0x02, 0x01, 0x00, 0x02, 0x01, 0x01];
        assert!(!verify_raw(&der).expect("verify"));
    }

    #[test]
    fn oversized_scalar_is_a_mismatch() {
        // SEQUENCE { INTEGER 2^256, INTEGER 1 }
        let mut der = vec![0x30, 0x26, 0x02, 0x21, 0x01];
        der.extend_from_slice(&[0u8; 32]);
        der.extend_from_slice(&[0x02, 0x01, 0x01]);
        assert!(!verify_raw(&der).expect("verify"));
    }

    #[test]
    fn group_order_is_a_mismatch() {
        let order =
            hex_bytes("ffffffff00000000ffffffffffffffffbce6faada7179e84f3b9cac2fc632551");
        let mut der = vec![0x30, 0x26, 0x02, 0x21, 0x00];
        der.extend_from_slice(&order);
        der.extend_from_slice(&[0x02, 0x01, 0x01]);
        assert!(!verify_raw(&der).expect("verify"));
    }

    #[test]
    fn negative_scalar_is_a_mismatch() {
        // SEQUENCE { INTEGER -1, INTEGER 1 }
        let der = [0x30, 0x06, 0x02, 0x01, 0xff, 0x02, 0x01, 0x01];
        assert!(!verify_raw(&der).expect("verify"));
    }

    #[test]
    fn sequence_with_one_integer_is_structural() {
        let der = [0x30, 0x03, 0x02, 0x01, 0x01];
        assert!(matches!(
            verify_raw(&der).unwrap_err(),
            SignatureError::Der(_)
        ));
    }

    fn hex_bytes(hex: &str) -> Vec<u8> {
        (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).expect("hex"))
            .collect()
    }

    #[test]
    fn loads_key_from_pem() {
        let key = signing_key();
        let pem = key
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .expect("pem");
        let verifier = PayloadVerifier::from_public_key_pem(&pem).expect("verifier");
        assert_eq!(verifier.verifying_key(), key.verifying_key());
    }

    #[test]
    fn rejects_garbage_pem() {
        let err = PayloadVerifier::from_public_key_pem("not a key").unwrap_err();
        assert!(matches!(err, KeyError::Pem(_)));
    }
}
