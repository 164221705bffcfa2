use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use p256::pkcs8::{EncodePublicKey, LineEnding};
use rag_gateway_core::PayloadVerifier;

/// Deterministic P-256 key that signs payloads the way the platform does.
#[derive(Debug, Clone)]
pub struct TestSigner {
    key: SigningKey,
}

impl TestSigner {
    /// Key derived from a fixed scalar; different seeds give different keys.
    ///
    /// The seed fills the low byte of the scalar, so every `u8` maps to a
    /// scalar in [1, 255], well below the group order. Seed 0 maps to 1.
    pub fn new(seed: u8) -> Self {
        let mut scalar = [0u8; 32];
        scalar[31] = seed.max(1);
        Self {
            key: SigningKey::from_slice(&scalar).expect("valid scalar"),
        }
    }

    /// Base64 DER signature over `payload`.
    pub fn sign(&self, payload: &[u8]) -> String {
        let signature: Signature = self.key.sign(payload);
        STANDARD.encode(signature.to_der().as_bytes())
    }

    pub fn verifier(&self) -> PayloadVerifier {
        PayloadVerifier::new(*self.key.verifying_key())
    }

    pub fn public_key_pem(&self) -> String {
        self.key
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .expect("pem")
    }
}

impl Default for TestSigner {
    fn default() -> Self {
        Self::new(7)
    }
}
