//! Per-run file set tracking.
//!
//! Three disjoint-by-semantics sets: `filesRead`, `filesModified`,
//! `filesCreated`. A path may sit in `read` plus at most one of the other
//! two — writing to a path moves it out of whichever other write-set it
//! was in, it never appears in both.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileSet {
    pub read: HashSet<String>,
    pub modified: HashSet<String>,
    pub created: HashSet<String>,
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_read(&mut self, path: impl Into<String>) {
        self.read.insert(path.into());
    }

    pub fn mark_modified(&mut self, path: impl Into<String>) {
        let path = path.into();
        self.created.remove(&path);
        self.modified.insert(path);
    }

    pub fn mark_created(&mut self, path: impl Into<String>) {
        let path = path.into();
        self.modified.remove(&path);
        self.created.insert(path);
    }

    pub fn is_written(&self, path: &str) -> bool {
        self.modified.contains(path) || self.created.contains(path)
    }

    /// Fold another file set's entries into this one, used to roll up a
    /// subtask's touched files into its orchestrator's aggregate view.
    pub fn merge(&mut self, other: &FileSet) {
        self.read.extend(other.read.iter().cloned());
        for path in &other.created {
            self.mark_created(path.clone());
        }
        for path in &other.modified {
            self.mark_modified(path.clone());
        }
    }
}
