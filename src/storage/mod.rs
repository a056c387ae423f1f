use anyhow::{anyhow, Result};
use opendal::Operator;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};
use tracing::{debug, warn};
use url::Url;

use crate::error::PersistenceError;

pub const SETTINGS_NAMESPACE: &str = "customization";
pub const NOTES_NAMESPACE: &str = "notes";
pub const PROGRESS_NAMESPACE: &str = "progress";

static MEMORY_OPERATORS: OnceLock<Mutex<HashMap<String, Operator>>> = OnceLock::new();

fn memory_cache() -> &'static Mutex<HashMap<String, Operator>> {
    MEMORY_OPERATORS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Creates an OpenDAL Operator from a URI string.
///
/// Supported schemes:
/// - file:///path/to/dir -> local filesystem
/// - memory://name -> in-memory, shared by every open of the same URI
pub fn operator_from_uri(uri: &str) -> Result<Operator> {
    if uri.starts_with("memory://") {
        let mut cache = memory_cache()
            .lock()
            .map_err(|_| anyhow!("memory operator cache lock poisoned"))?;
        if let Some(op) = cache.get(uri) {
            return Ok(op.clone());
        }
        let op = Operator::new(opendal::services::Memory::default())?.finish();
        cache.insert(uri.to_string(), op.clone());
        return Ok(op);
    }

    let url = Url::parse(uri).map_err(|e| anyhow!("Invalid storage URI: {}", e))?;
    match url.scheme() {
        "file" => {
            let builder = opendal::services::Fs::default().root(url.path());
            Ok(Operator::new(builder)?.finish())
        }
        other => Err(anyhow!("Unsupported storage scheme: {}", other)),
    }
}

/// JSON documents stored under one namespace of a durable store.
#[derive(Clone, Debug)]
pub struct KeyValueStore {
    op: Operator,
    namespace: String,
}

impl KeyValueStore {
    pub fn new(op: Operator, namespace: &str) -> Self {
        Self {
            op,
            namespace: namespace.to_string(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn path(&self, key: &str) -> String {
        format!("{}/{}.json", self.namespace, key)
    }

    pub async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        let path = self.path(key);
        if !self.op.exists(&path).await? {
            return Ok(None);
        }
        let bytes = self.op.read(&path).await?;
        Ok(Some(bytes.to_vec()))
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, PersistenceError> {
        match self.get_raw(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), PersistenceError> {
        let bytes = serde_json::to_vec(value)?;
        self.op.write(&self.path(key), bytes).await?;
        Ok(())
    }

    /// Writes `value`, logging instead of returning a failure. In-memory state
    /// stays authoritative when the store rejects a write.
    pub async fn put_logged<T: Serialize>(&self, key: &str, value: &T) {
        match self.put(key, value).await {
            Ok(()) => debug!(namespace = %self.namespace, key, "persisted"),
            Err(err) => warn!(namespace = %self.namespace, key, error = %err, "failed to persist"),
        }
    }

    pub async fn delete(&self, key: &str) -> Result<(), PersistenceError> {
        self.op.delete(&self.path(key)).await?;
        Ok(())
    }
}
