//! Access-code sealing for key transfer
//!
//! Transfer Format:
//! ```text
//! [Nonce: 12 bytes]
//! [AES-256-GCM(seal_key, password envelope) + tag]
//! ```
//!
//! `seal_key` and the host-side `access_digest` are both derived from the
//! access code with BLAKE3 under distinct contexts, so the host can check a
//! code without being able to open the share.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

const SEAL_CONTEXT: &str = "bcaccess key-share seal v1";
const DIGEST_CONTEXT: &str = "bcaccess access-code digest v1";

/// Random bytes behind an access code
const ACCESS_CODE_BYTES: usize = 16;

const NONCE_LEN: usize = 12;

/// Bearer token authorizing one retrieval of exported key material
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct AccessCode(String);

impl AccessCode {
    /// Fresh 128-bit code, base64url without padding
    pub fn generate() -> Self {
        let mut bytes = [0u8; ACCESS_CODE_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        let code = URL_SAFE_NO_PAD.encode(bytes);
        bytes.zeroize();
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Digest the host stores and compares against
    pub fn digest(&self) -> [u8; 32] {
        blake3::derive_key(DIGEST_CONTEXT, self.0.as_bytes())
    }

    fn seal_key(&self) -> [u8; 32] {
        blake3::derive_key(SEAL_CONTEXT, self.0.as_bytes())
    }
}

impl From<&str> for AccessCode {
    fn from(code: &str) -> Self {
        Self(code.to_string())
    }
}

impl From<String> for AccessCode {
    fn from(code: String) -> Self {
        Self(code)
    }
}

/// Shown to the user
impl fmt::Display for AccessCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for AccessCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessCode([REDACTED])")
    }
}

/// Seal a password envelope under `code`
pub fn seal(code: &AccessCode, envelope: &[u8]) -> Result<Vec<u8>, String> {
    let mut key = code.seal_key();
    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|e| format!("Invalid key: {}", e));
    key.zeroize();

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let ciphertext = cipher?
        .encrypt(Nonce::from_slice(&nonce_bytes), envelope)
        .map_err(|e| format!("Encryption failed: {}", e))?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Recover the password envelope sealed under `code`
pub fn open(code: &AccessCode, sealed: &[u8]) -> Result<Vec<u8>, String> {
    if sealed.len() <= NONCE_LEN {
        return Err("Sealed key too short".to_string());
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);

    let mut key = code.seal_key();
    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|e| format!("Invalid key: {}", e));
    key.zeroize();

    cipher?
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| "Access code does not open this key".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_codes() {
        let a = AccessCode::generate();
        let b = AccessCode::generate();
        assert_ne!(a, b);
        // 16 bytes -> 22 base64url chars
        assert_eq!(a.as_str().len(), 22);
        assert!(a
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_seal_open() {
        let code = AccessCode::generate();
        let sealed = seal(&code, b"envelope bytes").unwrap();
        assert_eq!(open(&code, &sealed).unwrap(), b"envelope bytes");
    }

    #[test]
    fn test_wrong_code_fails() {
        let sealed = seal(&AccessCode::generate(), b"envelope bytes").unwrap();
        assert!(open(&AccessCode::generate(), &sealed).is_err());
        assert!(open(&AccessCode::generate(), &[0u8; 4]).is_err());
    }

    #[test]
    fn test_digest_differs_from_seal_key() {
        let code = AccessCode::from("fixed-code");
        assert_eq!(code.digest(), AccessCode::from("fixed-code").digest());
        assert_ne!(code.digest(), code.seal_key());
    }

    #[test]
    fn test_debug_redacted() {
        let code = AccessCode::from("secret-code");
        assert!(!format!("{:?}", code).contains("secret-code"));
        assert_eq!(code.to_string(), "secret-code");
    }
}
