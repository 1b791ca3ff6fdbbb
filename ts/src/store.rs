//! Store - append-only JSONL collections with a rebuildable in-memory index

use std::any::Any;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use tracing::debug;

use crate::record::{Filter, IndexValue, Record};

/// One collection's in-memory index: id -> indexed fields, plus the record
/// itself kept for fast `get`.
struct CollectionIndex<T> {
    records: HashMap<String, T>,
    fields: HashMap<String, HashMap<String, IndexValue>>,
}

impl<T> Default for CollectionIndex<T> {
    fn default() -> Self {
        Self {
            records: HashMap::new(),
            fields: HashMap::new(),
        }
    }
}

/// Generic persistent store. One JSONL file per `Record` collection; an
/// in-memory index is rebuilt from it via `rebuild_indexes`.
pub struct Store {
    base_path: PathBuf,
    indexes: HashMap<&'static str, Box<dyn Any + Send + Sync>>,
}

impl Store {
    /// Open (creating if absent) a store rooted at `base_path`.
    pub fn open(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path).context("creating store directory")?;
        debug!(?base_path, "Store::open");
        Ok(Self {
            base_path,
            indexes: HashMap::new(),
        })
    }

    fn collection_file(&self, collection: &str) -> PathBuf {
        self.base_path.join(format!("{collection}.jsonl"))
    }

    /// Append a record to its collection's JSONL log.
    pub fn save<T: Record>(&mut self, record: &T) -> Result<()> {
        let path = self.collection_file(T::collection_name());
        let line = serde_json::to_string(record)? + "\n";
        let mut file = fs::OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        debug!(collection = T::collection_name(), id = record.id(), "Store::save");
        Ok(())
    }

    /// Replay a collection's JSONL log, keeping only the latest line per id
    /// (by file order, ties broken by `updated_at`). Returns the record
    /// count after dedup.
    pub fn rebuild_indexes<T: Record>(&mut self) -> Result<usize> {
        let mut index = CollectionIndex::<T>::default();
        let path = self.collection_file(T::collection_name());

        if path.exists() {
            let content = fs::read_to_string(&path).context("reading collection log")?;
            for line in content.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                let record: T = match serde_json::from_str(line) {
                    Ok(r) => r,
                    Err(_) => continue,
                };
                let replace = match index.records.get(record.id()) {
                    Some(existing) => record.updated_at() >= existing.updated_at(),
                    None => true,
                };
                if replace {
                    let fields = record.indexed_fields();
                    index.fields.insert(record.id().to_string(), fields);
                    index.records.insert(record.id().to_string(), record);
                }
            }
        }

        let count = index.records.len();
        self.indexes.insert(T::collection_name(), Box::new(index));
        debug!(collection = T::collection_name(), count, "Store::rebuild_indexes");
        Ok(count)
    }

    /// Fetch one record by id. Requires `rebuild_indexes::<T>()` to have run
    /// at least once this process.
    pub fn get<T: Record>(&self, id: &str) -> Option<T> {
        self.index_ref::<T>()?.records.get(id).cloned()
    }

    /// List records matching every filter (AND semantics).
    pub fn list<T: Record>(&self, filters: &[Filter]) -> Vec<T> {
        let Some(index) = self.index_ref::<T>() else {
            return Vec::new();
        };
        index
            .records
            .values()
            .filter(|r| {
                let fields = index.fields.get(r.id()).cloned().unwrap_or_default();
                filters.iter().all(|f| f.matches(&fields))
            })
            .cloned()
            .collect()
    }

    fn index_ref<T: Record>(&self) -> Option<&CollectionIndex<T>> {
        self.indexes
            .get(T::collection_name())
            .and_then(|b| b.downcast_ref::<CollectionIndex<T>>())
    }
}
