//! File-based keystore with encryption at rest
//!
//! One envelope per alias under `<root>/keys/<alias>.key`. Aliases are
//! validated before they are turned into file names.

use super::envelope::{self, KdfParams};
use super::{check_replaceable, open_keypair, seal_keypair, Keystore, KeystoreError};
use crate::core_identity::keypair::Keypair;
use crate::core_identity::validation::{validate_alias, Password};
use rand::RngCore;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// Name of the key directory inside a root directory
pub const KEY_DIRECTORY: &str = "keys";

/// Extension of envelope files
const KEY_EXTENSION: &str = "key";

/// Resolve the key directory for a root directory
pub fn key_directory(root: &Path) -> PathBuf {
    root.join(KEY_DIRECTORY)
}

/// File-based encrypted keystore
#[derive(Debug, Clone)]
pub struct FileKeystore {
    /// Directory where keys are stored
    base_path: PathBuf,
    /// KDF cost for newly written envelopes
    kdf: KdfParams,
}

impl FileKeystore {
    /// Open (creating if needed) the key directory under `root`
    pub fn open(root: &Path, kdf: KdfParams) -> Result<Self, KeystoreError> {
        kdf.validate()?;
        let base_path = key_directory(root);
        fs::create_dir_all(&base_path)?;
        Ok(FileKeystore { base_path, kdf })
    }

    /// Directory holding the envelopes
    pub fn path(&self) -> &Path {
        &self.base_path
    }

    fn key_path(&self, alias: &str) -> Result<PathBuf, KeystoreError> {
        validate_alias(alias).map_err(|e| KeystoreError::Other(e.to_string()))?;
        Ok(self.base_path.join(format!("{}.{}", alias, KEY_EXTENSION)))
    }

    fn temp_path(&self, alias: &str) -> PathBuf {
        let mut suffix = [0u8; 8];
        rand::rng().fill_bytes(&mut suffix);
        self.base_path.join(format!(".{}.{}.tmp", alias, hex::encode(suffix)))
    }

    fn read_sealed(&self, alias: &str) -> Result<Vec<u8>, KeystoreError> {
        let path = self.key_path(alias)?;
        if !path.exists() {
            return Err(KeystoreError::NotFound(alias.to_string()));
        }
        Ok(fs::read(&path)?)
    }

    /// Write file atomically (write to temp, then rename)
    fn write_atomic(&self, alias: &str, data: &[u8]) -> Result<(), KeystoreError> {
        let path = self.key_path(alias)?;
        let temp_path = self.temp_path(alias);
        fs::write(&temp_path, data)?;
        fs::rename(temp_path, path)?;
        Ok(())
    }

    /// Write file atomically, failing if the alias already has a key.
    ///
    /// The hard link is the commit point: it fails if the target exists.
    fn write_exclusive(&self, alias: &str, data: &[u8]) -> Result<(), KeystoreError> {
        let path = self.key_path(alias)?;
        let temp_path = self.temp_path(alias);
        fs::write(&temp_path, data)?;
        let linked = fs::hard_link(&temp_path, &path);
        let _ = fs::remove_file(&temp_path);
        match linked {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(KeystoreError::AlreadyExists(alias.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Keystore for FileKeystore {
    fn load(&self, alias: &str, password: &Password) -> Result<Keypair, KeystoreError> {
        let sealed = self.read_sealed(alias)?;
        open_keypair(&sealed, password)
    }

    fn create(&self, alias: &str, password: &Password) -> Result<Keypair, KeystoreError> {
        if self.key_path(alias)?.exists() {
            return Err(KeystoreError::AlreadyExists(alias.to_string()));
        }
        let kp = Keypair::generate();
        let sealed = seal_keypair(&kp, password, self.kdf)?;
        self.write_exclusive(alias, &sealed)?;
        debug!(alias, "Created key");
        Ok(kp)
    }

    fn list(&self) -> Result<Vec<String>, KeystoreError> {
        let mut aliases: Vec<(SystemTime, String)> = Vec::new();

        for entry in fs::read_dir(&self.base_path)? {
            let entry = entry?;
            let filename = entry.file_name();
            let filename_str = filename.to_string_lossy();

            let Some(alias) = filename_str.strip_suffix(".key") else {
                continue;
            };
            if alias.starts_with('.') || validate_alias(alias).is_err() {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            aliases.push((modified, alias.to_string()));
        }

        aliases.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        Ok(aliases.into_iter().map(|(_, alias)| alias).collect())
    }

    fn export_sealed(&self, alias: &str) -> Result<Vec<u8>, KeystoreError> {
        let sealed = self.read_sealed(alias)?;
        envelope::check_header(&sealed)?;
        Ok(sealed)
    }

    fn import_sealed(&self, alias: &str, sealed: &[u8]) -> Result<(), KeystoreError> {
        envelope::check_header(sealed)?;
        let existing = match self.read_sealed(alias) {
            Ok(existing) => Some(existing),
            Err(KeystoreError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
        check_replaceable(alias, existing.as_deref(), sealed)?;
        self.write_atomic(alias, sealed)?;
        debug!(alias, "Imported key");
        Ok(())
    }

    fn delete(&self, alias: &str) -> Result<(), KeystoreError> {
        let path = self.key_path(alias)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(KeystoreError::NotFound(alias.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn contains(&self, alias: &str) -> Result<bool, KeystoreError> {
        Ok(self.key_path(alias)?.exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fast() -> KdfParams {
        KdfParams {
            memory_kib: 64,
            iterations: 1,
        }
    }

    fn keystore(dir: &TempDir) -> FileKeystore {
        FileKeystore::open(dir.path(), fast()).unwrap()
    }

    #[test]
    fn test_open_creates_key_directory() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("nested").join("root");
        let keystore = FileKeystore::open(&root, fast()).unwrap();
        assert!(keystore.path().is_dir());
        assert_eq!(keystore.path(), key_directory(&root));
    }

    #[test]
    fn test_open_fails_when_root_is_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("occupied");
        fs::write(&file, b"not a directory").unwrap();
        assert!(matches!(
            FileKeystore::open(&file, fast()),
            Err(KeystoreError::Io(_))
        ));
    }

    #[test]
    fn test_create_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let keystore = keystore(&temp_dir);

        let kp = keystore.create("alice", &Password::from("password123")).unwrap();
        let loaded = keystore.load("alice", &Password::from("password123")).unwrap();
        assert_eq!(kp.public_key(), loaded.public_key());
    }

    #[test]
    fn test_wrong_password() {
        let temp_dir = TempDir::new().unwrap();
        let keystore = keystore(&temp_dir);
        keystore.create("alice", &Password::from("correct_password")).unwrap();

        let result = keystore.load("alice", &Password::from("wrong_password"));
        assert!(matches!(result, Err(KeystoreError::InvalidPassword)));
    }

    #[test]
    fn test_not_found_error() {
        let temp_dir = TempDir::new().unwrap();
        let keystore = keystore(&temp_dir);
        let result = keystore.load("nobody", &Password::from("password123"));
        assert!(matches!(result, Err(KeystoreError::NotFound(_))));
    }

    #[test]
    fn test_create_never_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let keystore = keystore(&temp_dir);
        let first = keystore.create("alice", &Password::from("password123")).unwrap();

        let second = keystore.create("alice", &Password::from("other_password"));
        assert!(matches!(second, Err(KeystoreError::AlreadyExists(_))));

        let loaded = keystore.load("alice", &Password::from("password123")).unwrap();
        assert_eq!(first.public_key(), loaded.public_key());
    }

    #[test]
    fn test_list_ignores_foreign_files() {
        let temp_dir = TempDir::new().unwrap();
        let keystore = keystore(&temp_dir);
        keystore.create("alice", &Password::from("password123")).unwrap();
        keystore.create("bob", &Password::from("password123")).unwrap();
        fs::write(keystore.path().join("notes.txt"), b"hello").unwrap();
        fs::write(keystore.path().join(".alice.0011.tmp"), b"partial").unwrap();

        let mut aliases = keystore.list().unwrap();
        aliases.sort();
        assert_eq!(aliases, vec!["alice".to_string(), "bob".to_string()]);
    }

    #[test]
    fn test_export_import_roundtrip_keeps_password() {
        let source_dir = TempDir::new().unwrap();
        let target_dir = TempDir::new().unwrap();
        let source = keystore(&source_dir);
        let target = keystore(&target_dir);

        let kp = source.create("alice", &Password::from("password123")).unwrap();
        let sealed = source.export_sealed("alice").unwrap();
        target.import_sealed("alice", &sealed).unwrap();

        let loaded = target.load("alice", &Password::from("password123")).unwrap();
        assert_eq!(kp.public_key(), loaded.public_key());
    }

    #[test]
    fn test_import_rejects_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let keystore = keystore(&temp_dir);
        let result = keystore.import_sealed("alice", b"definitely not an envelope at all");
        assert!(matches!(result, Err(KeystoreError::Decryption(_))));
        assert!(!keystore.contains("alice").unwrap());
    }

    #[test]
    fn test_delete() {
        let temp_dir = TempDir::new().unwrap();
        let keystore = keystore(&temp_dir);
        keystore.create("alice", &Password::from("password123")).unwrap();
        keystore.delete("alice").unwrap();
        assert!(!keystore.contains("alice").unwrap());
        assert!(matches!(
            keystore.delete("alice"),
            Err(KeystoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_import_never_replaces_a_different_key() {
        let source_dir = TempDir::new().unwrap();
        let target_dir = TempDir::new().unwrap();
        let source = keystore(&source_dir);
        let target = keystore(&target_dir);

        source.create("alice", &Password::from("password123")).unwrap();
        let original = target.create("alice", &Password::from("password456")).unwrap();
        let foreign = source.export_sealed("alice").unwrap();

        let result = target.import_sealed("alice", &foreign);
        assert!(matches!(result, Err(KeystoreError::AlreadyExists(_))));
        let loaded = target.load("alice", &Password::from("password456")).unwrap();
        assert_eq!(loaded.public_key(), original.public_key());

        // Re-importing the same key is allowed
        let own = target.export_sealed("alice").unwrap();
        target.import_sealed("alice", &own).unwrap();
    }

    #[test]
    fn test_public_key_without_password() {
        let temp_dir = TempDir::new().unwrap();
        let keystore = keystore(&temp_dir);
        let kp = keystore.create("alice", &Password::from("password123")).unwrap();

        assert_eq!(keystore.public_key("alice").unwrap(), kp.public_key());
        assert!(matches!(
            keystore.public_key("bob"),
            Err(KeystoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_path_traversal_alias_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let keystore = keystore(&temp_dir);
        let result = keystore.create("../escape", &Password::from("password123"));
        assert!(matches!(result, Err(KeystoreError::Other(_))));
    }
}
