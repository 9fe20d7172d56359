//! In-memory object store.

use std::collections::HashMap;
use std::sync::Mutex;

use super::{object_key, validate_key, ObjectStore, StorageError, StorageResult};

/// Object store held in a map; contents vanish with the value.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, (String, Vec<u8>)>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectStore for MemoryObjectStore {
    fn put(&self, bytes: &[u8], content_type: &str) -> StorageResult<String> {
        let key = object_key(bytes);
        let mut objects = self.objects.lock().map_err(|_| StorageError::Poisoned)?;
        objects
            .entry(key.clone())
            .or_insert_with(|| (content_type.to_string(), bytes.to_vec()));
        Ok(key)
    }

    fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        validate_key(key)?;
        let objects = self.objects.lock().map_err(|_| StorageError::Poisoned)?;
        objects
            .get(key)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn content_type(&self, key: &str) -> StorageResult<Option<String>> {
        validate_key(key)?;
        let objects = self.objects.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(objects.get(key).map(|(content_type, _)| content_type.clone()))
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        let mut objects = self.objects.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(objects.remove(key).is_some())
    }

    fn exists(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        let objects = self.objects.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(objects.contains_key(key))
    }
}
