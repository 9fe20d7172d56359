//! Filesystem object store.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{object_key, validate_key, ObjectStore, StorageError, StorageResult};

/// Objects live at `root/ab/cdef…` where `abcdef…` is the key.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl FsObjectStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open<P: AsRef<Path>>(root: P) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(io_error(&root))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(&key[..2]).join(&key[2..]))
    }

    fn type_path(object: &Path) -> PathBuf {
        object.with_extension("type")
    }
}

impl ObjectStore for FsObjectStore {
    fn put(&self, bytes: &[u8], content_type: &str) -> StorageResult<String> {
        let key = object_key(bytes);
        let path = self.object_path(&key)?;
        if path.exists() {
            return Ok(key);
        }

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(io_error(dir))?;
        }
        // Written under a temporary name, then renamed into place
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes).map_err(io_error(&tmp))?;
        fs::rename(&tmp, &path).map_err(io_error(&path))?;

        let type_path = Self::type_path(&path);
        fs::write(&type_path, content_type).map_err(io_error(&type_path))?;

        debug!(%key, size = bytes.len(), content_type, "stored object");
        Ok(key)
    }

    fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.object_path(key)?;
        fs::read(&path).map_err(|source| match source.kind() {
            ErrorKind::NotFound => StorageError::NotFound(key.to_string()),
            _ => StorageError::Io { path, source },
        })
    }

    fn content_type(&self, key: &str) -> StorageResult<Option<String>> {
        let path = Self::type_path(&self.object_path(key)?);
        match fs::read_to_string(&path) {
            Ok(content_type) => Ok(Some(content_type)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        let path = self.object_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                let _ = fs::remove_file(Self::type_path(&path));
                debug!(%key, "deleted object");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }

    fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.object_path(key)?.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path().join("objects")).unwrap();

        let key = store.put(b"%PDF-1.4 lab report", "application/pdf").unwrap();
        let expected = dir.path().join("objects").join(&key[..2]).join(&key[2..]);
        assert!(expected.is_file());

        assert_eq!(store.get(&key).unwrap(), b"%PDF-1.4 lab report");
        assert_eq!(
            store.content_type(&key).unwrap(),
            Some("application/pdf".into())
        );
        assert!(store.exists(&key).unwrap());
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let key = {
            let store = FsObjectStore::open(dir.path()).unwrap();
            store.put(b"receipt scan", "image/jpeg").unwrap()
        };
        let store = FsObjectStore::open(dir.path()).unwrap();
        assert_eq!(store.get(&key).unwrap(), b"receipt scan");
    }

    #[test]
    fn test_delete_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path()).unwrap();
        let key = store.put(b"temp", "text/plain").unwrap();

        assert!(store.delete(&key).unwrap());
        assert!(!store.exists(&key).unwrap());
        assert!(!store.delete(&key).unwrap());
        assert!(matches!(store.get(&key), Err(StorageError::NotFound(_))));
        assert_eq!(store.content_type(&key).unwrap(), None);
    }

    #[test]
    fn test_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.get("../../etc/passwd"),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(store.exists(".."), Err(StorageError::InvalidKey(_))));
    }
}
