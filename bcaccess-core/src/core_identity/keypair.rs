//! Keypair module
//!
//! Key material bound to an alias. Ed25519 is used for the alias
//! registration signature; the public half is what the ledger records.
//!
//! Security: the secret half is zeroized on drop and redacted from `Debug`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

/// Size of an Ed25519 public key in bytes
pub const PUBLIC_KEY_LEN: usize = 32;

/// Size of an Ed25519 secret seed in bytes
pub const SECRET_KEY_LEN: usize = 32;

/// Keypair structure holding public and secret keys
#[derive(Clone, Serialize, Deserialize)]
pub struct Keypair {
    /// Public key bytes (32 bytes)
    public: Vec<u8>,
    /// Secret seed bytes (32 bytes, encrypted at rest by the keystore)
    secret: Vec<u8>,
}

impl Keypair {
    /// Generate a fresh keypair from the OS RNG
    pub fn generate() -> Self {
        let mut seed = [0u8; SECRET_KEY_LEN];
        rand::rng().fill_bytes(&mut seed);

        let signing_key = SigningKey::from_bytes(&seed);
        seed.zeroize();

        Keypair {
            public: signing_key.verifying_key().to_bytes().to_vec(),
            secret: signing_key.to_bytes().to_vec(),
        }
    }

    fn signing_key(&self) -> Result<SigningKey, String> {
        let seed: [u8; SECRET_KEY_LEN] = self
            .secret
            .as_slice()
            .try_into()
            .map_err(|_| format!("Secret key must be {} bytes", SECRET_KEY_LEN))?;
        Ok(SigningKey::from_bytes(&seed))
    }

    /// Sign a message, returning a 64-byte signature
    pub fn sign(&self, msg: &[u8]) -> Result<Vec<u8>, String> {
        let signing_key = self.signing_key()?;
        Ok(signing_key.sign(msg).to_bytes().to_vec())
    }

    /// Verify a signature against a raw public key
    pub fn verify(pubkey: &[u8], msg: &[u8], sig: &[u8]) -> bool {
        let Ok(pubkey) = <[u8; PUBLIC_KEY_LEN]>::try_from(pubkey) else {
            return false;
        };
        let Ok(verifying_key) = VerifyingKey::from_bytes(&pubkey) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(sig) else {
            return false;
        };
        verifying_key.verify(msg, &signature).is_ok()
    }

    /// Serialize to bytes (suitable for keystore)
    pub fn serialize(&self) -> Result<Vec<u8>, String> {
        bincode::serialize(self).map_err(|e| format!("Failed to serialize keypair: {}", e))
    }

    /// Deserialize from bytes, checking that the halves belong together
    pub fn deserialize(bytes: &[u8]) -> Result<Self, String> {
        let kp: Keypair =
            bincode::deserialize(bytes).map_err(|e| format!("Failed to deserialize: {}", e))?;
        let derived = kp.signing_key()?.verifying_key().to_bytes();
        if derived.as_slice() != kp.public.as_slice() {
            return Err("Public key does not match secret key".to_string());
        }
        Ok(kp)
    }

    /// Get reference to public key
    pub fn public_key(&self) -> &[u8] {
        &self.public
    }

    /// Public key as unpadded base64url, the form shown to users
    pub fn public_key_base64(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.public)
    }
}

impl PartialEq for Keypair {
    fn eq(&self, other: &Self) -> bool {
        self.public == other.public
    }
}

impl Eq for Keypair {}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &hex::encode(&self.public))
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl Drop for Keypair {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}
