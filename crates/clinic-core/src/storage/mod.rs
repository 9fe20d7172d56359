//! Content-addressed object storage for uploaded files.
//!
//! Objects are keyed by the SHA-256 of their bytes, so storing the same scan
//! twice yields the same key.

mod fs;
mod memory;

pub use fs::FsObjectStore;
pub use memory::MemoryObjectStore;

use std::path::PathBuf;

use thiserror::Error;

/// Storage errors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid object key: {0:?}")]
    InvalidKey(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Store lock poisoned")]
    Poisoned,
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Blob storage for lab results, expense receipts and similar uploads.
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` and return their key.
    fn put(&self, bytes: &[u8], content_type: &str) -> StorageResult<String>;

    fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Content type recorded when the object was stored.
    fn content_type(&self, key: &str) -> StorageResult<Option<String>>;

    /// Returns whether an object was removed.
    fn delete(&self, key: &str) -> StorageResult<bool>;

    fn exists(&self, key: &str) -> StorageResult<bool>;
}

/// Key of `bytes`: lowercase hex SHA-256.
pub fn object_key(bytes: &[u8]) -> String {
    crate::ledger::hash_data(bytes)
}

/// Keys are exactly 64 lowercase hex characters, which keeps them from
/// naming anything outside the store.
pub fn validate_key(key: &str) -> StorageResult<()> {
    let valid = key.len() == 64
        && key
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_is_sha256_hex() {
        assert_eq!(
            object_key(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key(&object_key(b"x")).is_ok());
        assert!(validate_key("../../etc/passwd").is_err());
        assert!(validate_key(&"A".repeat(64)).is_err());
        assert!(validate_key(&"a".repeat(63)).is_err());
        assert!(validate_key("").is_err());
    }
}
