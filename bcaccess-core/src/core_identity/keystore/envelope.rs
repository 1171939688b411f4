//! Encrypted key envelope
//!
//! Envelope Format:
//! ```text
//! [Magic: 8 bytes "BCKS0001"]
//! [Version: 1 byte]
//! [Argon2 memory KiB: 4 bytes LE]
//! [Argon2 iterations: 4 bytes LE]
//! [Public key: 32 bytes]
//! [Salt: 16 bytes]
//! [Nonce: 12 bytes]
//! [Ciphertext + AEAD tag: variable]
//! ```
//!
//! The KDF cost travels with the envelope so a key exported from one
//! machine opens on another configured with different parameters. The
//! header is authenticated as associated data, so the public key can be
//! read without the password but not altered without detection.

use super::KeystoreError;
use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use argon2::{Argon2, Params};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Magic header for encrypted key envelopes
const MAGIC_HEADER: &[u8; 8] = b"BCKS0001";

/// Current envelope format version
const FORMAT_VERSION: u8 = 1;

const PUBLIC_KEY_LEN: usize = 32;

const SALT_LEN: usize = 16;

const NONCE_LEN: usize = 12;

/// AES-GCM tag length
const TAG_LEN: usize = 16;

const PUBLIC_KEY_OFFSET: usize = 17;

const SALT_OFFSET: usize = PUBLIC_KEY_OFFSET + PUBLIC_KEY_LEN;

const NONCE_OFFSET: usize = SALT_OFFSET + SALT_LEN;

/// magic(8) + version(1) + memory(4) + iterations(4) + public key(32) + salt(16) + nonce(12)
pub(crate) const HEADER_SIZE: usize = NONCE_OFFSET + NONCE_LEN;

/// Upper bound on KDF memory accepted from an envelope header (1 GiB)
const MAX_MEMORY_KIB: u32 = 1024 * 1024;

/// Upper bound on KDF iterations accepted from an envelope header
const MAX_ITERATIONS: u32 = 64;

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Number of passes
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024, // 19 MiB
            iterations: 2,
        }
    }
}

impl KdfParams {
    /// Reject costs argon2 cannot run or that an envelope must not demand
    pub fn validate(&self) -> Result<(), KeystoreError> {
        if self.memory_kib < 8 || self.memory_kib > MAX_MEMORY_KIB {
            return Err(KeystoreError::Encryption(format!(
                "Argon2 memory out of range: {} KiB",
                self.memory_kib
            )));
        }
        if self.iterations == 0 || self.iterations > MAX_ITERATIONS {
            return Err(KeystoreError::Encryption(format!(
                "Argon2 iterations out of range: {}",
                self.iterations
            )));
        }
        Ok(())
    }
}

/// Encrypt `data` under `password`, recording `public_key` in the clear
pub fn seal(
    password: &[u8],
    params: KdfParams,
    public_key: &[u8],
    data: &[u8],
) -> Result<Vec<u8>, KeystoreError> {
    params.validate()?;
    if public_key.len() != PUBLIC_KEY_LEN {
        return Err(KeystoreError::Encryption(format!(
            "Public key must be {} bytes",
            PUBLIC_KEY_LEN
        )));
    }

    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce_bytes);

    let mut result = Vec::with_capacity(HEADER_SIZE + data.len() + TAG_LEN);
    result.extend_from_slice(MAGIC_HEADER);
    result.push(FORMAT_VERSION);
    result.extend_from_slice(&params.memory_kib.to_le_bytes());
    result.extend_from_slice(&params.iterations.to_le_bytes());
    result.extend_from_slice(public_key);
    result.extend_from_slice(&salt);
    result.extend_from_slice(&nonce_bytes);

    let mut key = derive_key_from_password(password, &salt, params)?;
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| KeystoreError::Encryption(format!("Invalid key: {}", e)));
    key.zeroize();

    let payload = Payload {
        msg: data,
        aad: &result,
    };
    let ciphertext = cipher?
        .encrypt(Nonce::from_slice(&nonce_bytes), payload)
        .map_err(|e| KeystoreError::Encryption(format!("Encryption failed: {}", e)))?;
    result.extend_from_slice(&ciphertext);

    Ok(result)
}

/// Check framing without decrypting, returning the KDF cost it declares
pub fn check_header(data: &[u8]) -> Result<KdfParams, KeystoreError> {
    if data.len() < 9 {
        return Err(KeystoreError::Decryption("File too short".to_string()));
    }
    if &data[0..8] != MAGIC_HEADER {
        return Err(KeystoreError::Decryption(
            "Invalid magic header".to_string(),
        ));
    }
    let version = data[8];
    if version != FORMAT_VERSION {
        return Err(KeystoreError::Decryption(format!(
            "Unsupported version: {}",
            version
        )));
    }
    if data.len() < HEADER_SIZE + TAG_LEN {
        return Err(KeystoreError::Decryption("Truncated file".to_string()));
    }

    let params = KdfParams {
        memory_kib: u32::from_le_bytes([data[9], data[10], data[11], data[12]]),
        iterations: u32::from_le_bytes([data[13], data[14], data[15], data[16]]),
    };
    params
        .validate()
        .map_err(|_| KeystoreError::Decryption("Unsupported KDF parameters".to_string()))?;
    Ok(params)
}

/// Public key recorded in the header
pub fn public_key(data: &[u8]) -> Result<Vec<u8>, KeystoreError> {
    check_header(data)?;
    Ok(data[PUBLIC_KEY_OFFSET..SALT_OFFSET].to_vec())
}

/// Decrypt an envelope. A tag mismatch reports `InvalidPassword`.
pub fn open(password: &[u8], data: &[u8]) -> Result<Vec<u8>, KeystoreError> {
    let params = check_header(data)?;

    let salt = &data[SALT_OFFSET..NONCE_OFFSET];
    let nonce = Nonce::from_slice(&data[NONCE_OFFSET..HEADER_SIZE]);
    let payload = Payload {
        msg: &data[HEADER_SIZE..],
        aad: &data[..HEADER_SIZE],
    };

    let mut key = derive_key_from_password(password, salt, params)?;
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| KeystoreError::Decryption(format!("Invalid key: {}", e)));
    key.zeroize();

    // AEAD tag mismatch = wrong password, altered header or corrupted body
    cipher?
        .decrypt(nonce, payload)
        .map_err(|_| KeystoreError::InvalidPassword)
}

/// Derive 256-bit encryption key from password using Argon2id
fn derive_key_from_password(
    password: &[u8],
    salt: &[u8],
    params: KdfParams,
) -> Result<[u8; 32], KeystoreError> {
    let params = Params::new(params.memory_kib, params.iterations, 1, Some(32))
        .map_err(|e| KeystoreError::Encryption(format!("Invalid Argon2 params: {}", e)))?;

    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut key = [0u8; 32];
    argon2
        .hash_password_into(password, salt, &mut key)
        .map_err(|e| KeystoreError::Encryption(format!("Key derivation failed: {}", e)))?;

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUBLIC: [u8; PUBLIC_KEY_LEN] = [7u8; PUBLIC_KEY_LEN];

    fn fast() -> KdfParams {
        KdfParams {
            memory_kib: 64,
            iterations: 1,
        }
    }

    fn sealed(password: &[u8], data: &[u8]) -> Vec<u8> {
        seal(password, fast(), &PUBLIC, data).unwrap()
    }

    #[test]
    fn test_seal_and_open() {
        let sealed = sealed(b"password123", b"secret key");
        assert_eq!(open(b"password123", &sealed).unwrap(), b"secret key");
    }

    #[test]
    fn test_wrong_password() {
        let sealed = sealed(b"correct_password", b"secret key");
        assert!(matches!(
            open(b"wrong_password", &sealed),
            Err(KeystoreError::InvalidPassword)
        ));
    }

    #[test]
    fn test_corrupted_aead_tag() {
        let mut sealed = sealed(b"password123", b"secret key");
        let len = sealed.len();
        sealed[len - 1] ^= 0xFF;
        assert!(matches!(
            open(b"password123", &sealed),
            Err(KeystoreError::InvalidPassword)
        ));
    }

    #[test]
    fn test_public_key_readable_without_password() {
        let sealed = sealed(b"password123", b"secret key");
        assert_eq!(public_key(&sealed).unwrap(), PUBLIC.to_vec());
    }

    #[test]
    fn test_altered_public_key_fails_to_open() {
        let mut sealed = sealed(b"password123", b"secret key");
        sealed[PUBLIC_KEY_OFFSET] ^= 0x01;
        assert!(matches!(
            open(b"password123", &sealed),
            Err(KeystoreError::InvalidPassword)
        ));
    }

    #[test]
    fn test_seal_rejects_short_public_key() {
        let result = seal(b"password123", fast(), &[1u8; 3], b"secret key");
        assert!(matches!(result, Err(KeystoreError::Encryption(_))));
    }

    #[test]
    fn test_header_carries_kdf_params() {
        let params = KdfParams {
            memory_kib: 128,
            iterations: 2,
        };
        let sealed = seal(b"password123", params, &PUBLIC, b"secret key").unwrap();
        assert_eq!(check_header(&sealed).unwrap(), params);
    }

    #[test]
    fn test_invalid_magic_header() {
        let mut sealed = sealed(b"password123", b"secret key");
        sealed[0] = b'X';
        match open(b"password123", &sealed) {
            Err(KeystoreError::Decryption(msg)) => assert!(msg.contains("magic")),
            other => panic!("Expected Decryption error for invalid magic, got {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_version() {
        let mut sealed = sealed(b"password123", b"secret key");
        sealed[8] = 99;
        match open(b"password123", &sealed) {
            Err(KeystoreError::Decryption(msg)) => assert!(msg.contains("version")),
            other => panic!("Expected Decryption error for version, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_envelope() {
        let sealed = sealed(b"password123", b"secret key");
        match open(b"password123", &sealed[0..20]) {
            Err(KeystoreError::Decryption(msg)) => assert!(msg.contains("Truncated")),
            other => panic!("Expected Decryption error for truncation, got {:?}", other),
        }
    }

    #[test]
    fn test_hostile_kdf_params_rejected() {
        let mut sealed = sealed(b"password123", b"secret key");
        sealed[9..13].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            check_header(&sealed),
            Err(KeystoreError::Decryption(_))
        ));
    }

    #[test]
    fn test_salt_and_nonce_uniqueness() {
        let a = sealed(b"password123", b"data");
        let b = sealed(b"password123", b"data");
        assert_ne!(&a[SALT_OFFSET..HEADER_SIZE], &b[SALT_OFFSET..HEADER_SIZE]);
        assert_ne!(a, b);
    }
}
