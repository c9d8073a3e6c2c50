//! Name-resolution state of one SELECT nesting level.

use indexmap::IndexMap;
use std::collections::HashSet;

/// Models, aliases and column aliases visible while compiling one level of
/// a statement.
///
/// A subquery compiles against [`CompilationScope::child`]: it sees every
/// model and alias of the enclosing levels, but not their column aliases.
#[derive(Debug, Clone, Default)]
pub struct CompilationScope {
    nesting_level: usize,
    /// Model name -> table reference its columns are qualified with
    pub(crate) models: IndexMap<String, String>,
    /// Alias (or model name) -> table reference used in SQL
    pub(crate) sql_aliases: IndexMap<String, String>,
    /// Alias (or model name) -> model name
    pub(crate) sql_aliases_models: IndexMap<String, String>,
    /// Model name -> alias (or model name)
    pub(crate) sql_models_aliases: IndexMap<String, String>,
    /// Column aliases declared in this level's select list
    pub(crate) column_aliases: HashSet<String>,
}

impl CompilationScope {
    pub fn root() -> Self {
        Self::default()
    }

    /// Scope for a subquery of this level.
    pub fn child(&self) -> Self {
        Self {
            nesting_level: self.nesting_level + 1,
            models: self.models.clone(),
            sql_aliases: self.sql_aliases.clone(),
            sql_aliases_models: self.sql_aliases_models.clone(),
            sql_models_aliases: self.sql_models_aliases.clone(),
            column_aliases: HashSet::new(),
        }
    }

    pub fn nesting_level(&self) -> usize {
        self.nesting_level
    }

    /// Register a model under `alias`, referenced as `reference` in SQL.
    pub(crate) fn register(&mut self, model: &str, alias: &str, reference: &str) {
        self.sql_aliases
            .insert(alias.to_string(), reference.to_string());
        self.sql_aliases_models
            .insert(alias.to_string(), model.to_string());
        self.sql_models_aliases
            .insert(model.to_string(), alias.to_string());
        self.models.insert(model.to_string(), reference.to_string());
    }

    pub fn has_alias(&self, alias: &str) -> bool {
        self.sql_aliases.contains_key(alias)
    }

    pub fn model_of(&self, alias: &str) -> Option<&str> {
        self.sql_aliases_models.get(alias).map(String::as_str)
    }
}
