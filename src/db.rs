//! Document storage, with JSON snapshots on disk
//!
//! Collections hold schemaless JSON documents keyed by UUID. The typed
//! [`Database`] facade converts them to and from the model structs.

use std::{
    collections::{BTreeMap, HashMap},
    fs::{self, create_dir_all, File},
    io::{self, ErrorKind::NotFound},
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("Malformed document: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Document {id} already exists in {collection}")]
    Duplicate { collection: String, id: Uuid },
}

/// Query over the fields of a document.
#[derive(Debug, Clone)]
pub enum Filter {
    All,
    Eq(&'static str, Value),
    /// Case-insensitive substring match on a string field.
    Contains(&'static str, String),
    /// Inclusive range on an RFC 3339 timestamp field.
    DateRange {
        field: &'static str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: &'static str, value: impl Serialize) -> Self {
        Filter::Eq(field, serde_json::to_value(value).unwrap_or(Value::Null))
    }

    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(field, expected) => doc.get(*field).unwrap_or(&Value::Null) == expected,
            Filter::Contains(field, needle) => doc
                .get(*field)
                .and_then(Value::as_str)
                .map(|s| s.to_lowercase().contains(&needle.to_lowercase()))
                .unwrap_or(false),
            Filter::DateRange { field, from, to } => doc
                .get(*field)
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|date| {
                    let date = date.with_timezone(&Utc);
                    *from <= date && date <= *to
                })
                .unwrap_or(false),
            Filter::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(doc)),
        }
    }
}

/// Generic persistence gateway over named collections.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fails with [`StoreError::Duplicate`] if the id is taken.
    async fn insert(&self, collection: &str, id: Uuid, doc: Value) -> Result<(), StoreError>;

    async fn get(&self, collection: &str, id: Uuid) -> Result<Option<Value>, StoreError>;

    /// Returns false when there is nothing to replace.
    async fn replace(&self, collection: &str, id: Uuid, doc: Value) -> Result<bool, StoreError>;

    /// Returns false when there is nothing to remove.
    async fn remove(&self, collection: &str, id: Uuid) -> Result<bool, StoreError>;

    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>, StoreError>;

    async fn count(&self, collection: &str, filter: &Filter) -> Result<usize, StoreError> {
        Ok(self.find(collection, filter).await?.len())
    }
}

type Collections = HashMap<String, BTreeMap<Uuid, Value>>;

/// In-memory collections, written back to a JSON file after every change.
///
/// A change whose snapshot cannot be written is undone before the error is
/// returned, so memory never holds what the file lacks.
#[derive(Default)]
pub struct JsonFileStore {
    path: Option<PathBuf>,
    collections: RwLock<Collections>,
}

fn write_snapshot(path: &Path, snapshot: &[u8]) -> Result<(), io::Error> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            create_dir_all(parent)?;
        }
    }
    fs::write(path, snapshot)
}

impl JsonFileStore {
    /// Store that never touches the disk.
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn open(path: PathBuf) -> Result<Self, io::Error> {
        match File::open(&path) {
            Ok(f) => {
                let collections: Collections = serde_json::from_reader(f)?;
                Ok(Self {
                    path: Some(path),
                    collections: RwLock::new(collections),
                })
            }

            Err(not_found) if not_found.kind() == NotFound => {
                info!("DB file not found, creating new empty DB");
                // Fail at startup rather than on the first write
                write_snapshot(&path, &serde_json::to_vec_pretty(&Collections::default())?)?;
                Ok(Self {
                    path: Some(path),
                    collections: RwLock::default(),
                })
            }

            Err(other) => Err(other),
        }
    }

    /// Writes `collections` to the snapshot file off the async workers.
    async fn save(&self, collections: &Collections) -> Result<(), StoreError> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        let snapshot = serde_json::to_vec_pretty(collections)?;
        tokio::task::spawn_blocking(move || write_snapshot(&path, &snapshot))
            .await
            .map_err(io::Error::other)??;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn insert(&self, collection: &str, id: Uuid, doc: Value) -> Result<(), StoreError> {
        let mut db = self.collections.write().await;
        let docs = db.entry(collection.to_string()).or_default();
        if docs.contains_key(&id) {
            return Err(StoreError::Duplicate {
                collection: collection.to_string(),
                id,
            });
        }
        docs.insert(id, doc);

        if let Err(e) = self.save(&db).await {
            if let Some(docs) = db.get_mut(collection) {
                docs.remove(&id);
            }
            return Err(e);
        }
        Ok(())
    }

    async fn get(&self, collection: &str, id: Uuid) -> Result<Option<Value>, StoreError> {
        let db = self.collections.read().await;
        Ok(db.get(collection).and_then(|docs| docs.get(&id)).cloned())
    }

    async fn replace(&self, collection: &str, id: Uuid, doc: Value) -> Result<bool, StoreError> {
        let mut db = self.collections.write().await;
        let Some(slot) = db.get_mut(collection).and_then(|docs| docs.get_mut(&id)) else {
            return Ok(false);
        };
        let previous = std::mem::replace(slot, doc);

        if let Err(e) = self.save(&db).await {
            if let Some(slot) = db.get_mut(collection).and_then(|docs| docs.get_mut(&id)) {
                *slot = previous;
            }
            return Err(e);
        }
        Ok(true)
    }

    async fn remove(&self, collection: &str, id: Uuid) -> Result<bool, StoreError> {
        let mut db = self.collections.write().await;
        let Some(removed) = db.get_mut(collection).and_then(|docs| docs.remove(&id)) else {
            return Ok(false);
        };

        if let Err(e) = self.save(&db).await {
            if let Some(docs) = db.get_mut(collection) {
                docs.insert(id, removed);
            }
            return Err(e);
        }
        Ok(true)
    }

    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>, StoreError> {
        let db = self.collections.read().await;
        Ok(db
            .get(collection)
            .map(|docs| docs.values().filter(|doc| filter.matches(doc)).cloned().collect())
            .unwrap_or_default())
    }
}

/// A model type stored in its own collection.
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: &'static str;

    fn key(&self) -> Uuid;
}

/// Typed access to the document store.
#[derive(Clone)]
pub struct Database {
    store: Arc<dyn DocumentStore>,
}

impl Database {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn memory() -> Self {
        Self::new(Arc::new(JsonFileStore::memory()))
    }

    pub async fn insert<T: Document>(&self, doc: &T) -> Result<(), StoreError> {
        self.store
            .insert(T::COLLECTION, doc.key(), serde_json::to_value(doc)?)
            .await
    }

    pub async fn get<T: Document>(&self, id: impl Into<Uuid>) -> Result<Option<T>, StoreError> {
        match self.store.get(T::COLLECTION, id.into()).await? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    /// Overwrites the stored version of `doc`.
    pub async fn save<T: Document>(&self, doc: &T) -> Result<bool, StoreError> {
        self.store
            .replace(T::COLLECTION, doc.key(), serde_json::to_value(doc)?)
            .await
    }

    pub async fn delete<T: Document>(&self, id: impl Into<Uuid>) -> Result<bool, StoreError> {
        self.store.remove(T::COLLECTION, id.into()).await
    }

    pub async fn find<T: Document>(&self, filter: &Filter) -> Result<Vec<T>, StoreError> {
        self.store
            .find(T::COLLECTION, filter)
            .await?
            .into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(StoreError::from))
            .collect()
    }

    pub async fn find_one<T: Document>(&self, filter: &Filter) -> Result<Option<T>, StoreError> {
        Ok(self.find(filter).await?.into_iter().next())
    }

    pub async fn count<T: Document>(&self, filter: &Filter) -> Result<usize, StoreError> {
        self.store.count(T::COLLECTION, filter).await
    }
}
