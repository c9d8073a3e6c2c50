//! Memo of related records for relations flagged reusable.
//!
//! Entries are keyed by a structural fingerprint of the referenced model,
//! the merged find parameters and the retrieve method. Collections are kept
//! as buffered snapshots so every hit hands out an independent cursor.

use crate::records::RelationRecords;
use modelql_core::{ModelsManager, Result};
use modelql_query::{ResultRow, Resultset, ResultsetSnapshot};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
enum Entry {
    One(Option<ResultRow>),
    Many(ResultsetSnapshot),
    Count(i64),
}

#[derive(Debug, Default)]
pub(crate) struct ReusableStore {
    entries: Mutex<HashMap<u64, Entry>>,
}

impl ReusableStore {
    pub(crate) fn get(&self, key: u64, manager: Arc<dyn ModelsManager>) -> Option<RelationRecords> {
        let entry = self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .cloned()?;
        Some(match entry {
            Entry::One(row) => RelationRecords::One(row),
            Entry::Many(snapshot) => {
                RelationRecords::Many(Resultset::from_snapshot(snapshot, Some(manager)))
            }
            Entry::Count(count) => RelationRecords::Count(count),
        })
    }

    /// Store `records` under `key`. A collection is buffered in place.
    pub(crate) fn set(&self, key: u64, records: &mut RelationRecords) -> Result<()> {
        let entry = match records {
            RelationRecords::One(row) => Entry::One(row.clone()),
            RelationRecords::Many(resultset) => Entry::Many(resultset.snapshot()?),
            RelationRecords::Count(count) => Entry::Count(*count),
        };
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, entry);
        Ok(())
    }

    pub(crate) fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
