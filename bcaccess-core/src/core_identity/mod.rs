//! Identity primitives
//!
//! - `Keypair`: the key material bound to an alias
//! - `Keystore`: per-alias encrypted storage (`FileKeystore`, `MemoryKeystore`)
//! - `validation`: alias, password and access code checks

pub mod keypair;
pub mod keystore;
pub mod validation;

pub use keypair::Keypair;
pub use keystore::{FileKeystore, KdfParams, Keystore, KeystoreError, MemoryKeystore};
pub use validation::{Password, ValidationError, MIN_PASSWORD_LENGTH};
