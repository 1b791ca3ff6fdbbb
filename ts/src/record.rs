//! Record trait and the filter/index vocabulary a `Store` indexes records by.

use std::collections::HashMap;

/// A value a record exposes for indexing and filtering.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum IndexValue {
    String(String),
    Number(f64),
    Bool(bool),
}

/// A type that can be persisted in a `Store` collection.
///
/// Implementors are plain serde types; the trait only adds what the store
/// needs to index and deduplicate them.
pub trait Record: serde::Serialize + serde::de::DeserializeOwned + Clone + Send + Sync + 'static {
    /// Stable identifier. The store keeps only the latest record per id.
    fn id(&self) -> &str;

    /// Last-modified timestamp (Unix ms), used to break ties on rebuild.
    fn updated_at(&self) -> i64;

    /// JSONL file name (without extension) this record type lives in.
    fn collection_name() -> &'static str;

    /// Field name -> value map used to build the in-memory index.
    fn indexed_fields(&self) -> HashMap<String, IndexValue>;
}

/// Comparison applied by a `Filter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
}

/// A single indexed-field predicate passed to `Store::list`.
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: IndexValue,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: IndexValue) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Eq,
            value,
        }
    }

    pub fn matches(&self, fields: &HashMap<String, IndexValue>) -> bool {
        let actual = fields.get(&self.field);
        match self.op {
            FilterOp::Eq => actual == Some(&self.value),
            FilterOp::Ne => actual != Some(&self.value),
        }
    }
}
