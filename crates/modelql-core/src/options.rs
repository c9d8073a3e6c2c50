//! Global ORM settings.

use crate::Result;
use serde::{Deserialize, Serialize};

/// Settings read by the compiler, the executor and the resultsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrmOptions {
    /// Synthesize join conditions from declared relations
    pub enable_implicit_joins: bool,
    /// Map attribute names to physical columns through the column map
    pub column_renaming: bool,
    /// Buffer results with at most this many rows (0 = always stream)
    pub resultset_prefetch_records: usize,
    /// Raise on failed metadata/cache writes instead of logging a warning
    pub exception_on_failed_metadata_save: bool,
    /// Cast fetched values using the model's data types
    pub cast_on_hydrate: bool,
}

impl Default for OrmOptions {
    fn default() -> Self {
        Self {
            enable_implicit_joins: true,
            column_renaming: true,
            resultset_prefetch_records: 0,
            exception_on_failed_metadata_save: true,
            cast_on_hydrate: false,
        }
    }
}

impl OrmOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable_implicit_joins(mut self, enabled: bool) -> Self {
        self.enable_implicit_joins = enabled;
        self
    }

    pub fn column_renaming(mut self, enabled: bool) -> Self {
        self.column_renaming = enabled;
        self
    }

    pub fn resultset_prefetch_records(mut self, records: usize) -> Self {
        self.resultset_prefetch_records = records;
        self
    }

    pub fn exception_on_failed_metadata_save(mut self, enabled: bool) -> Self {
        self.exception_on_failed_metadata_save = enabled;
        self
    }

    pub fn cast_on_hydrate(mut self, enabled: bool) -> Self {
        self.cast_on_hydrate = enabled;
        self
    }

    /// Load settings from JSON; missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = OrmOptions::default();
        assert!(options.enable_implicit_joins);
        assert!(options.column_renaming);
        assert_eq!(options.resultset_prefetch_records, 0);
    }

    #[test]
    fn from_json_keeps_unset_defaults() {
        let options =
            OrmOptions::from_json(r#"{"resultset_prefetch_records": 100, "cast_on_hydrate": true}"#)
                .unwrap();
        assert_eq!(options.resultset_prefetch_records, 100);
        assert!(options.cast_on_hydrate);
        assert!(options.enable_implicit_joins);
    }

    #[test]
    fn from_json_rejects_bad_types() {
        assert!(OrmOptions::from_json(r#"{"column_renaming": "yes"}"#).is_err());
    }
}
