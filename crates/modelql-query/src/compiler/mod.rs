//! Statement compiler.
//!
//! Lowers a parsed [`Statement`] into the dialect-independent fragment tree:
//! model names become table sources, attribute names become physical
//! columns qualified with their table alias, and joins without conditions
//! are completed from the declared relations.

mod expr;
mod joins;
mod mutate;
mod scope;
mod select;

pub use scope::CompilationScope;

use modelql_core::error::CompileErrorKind;
use modelql_core::fragment::Intermediate;
use modelql_core::ir::{Statement, TableRef};
use modelql_core::{
    BindParams, BindTypes, Error, MetaData, ModelBinding, ModelsManager, OrmOptions, Result,
    TableSource,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Output of a compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct Compiled {
    pub intermediate: Intermediate,
    /// Bind types declared by typed placeholders (`{name:int}`)
    pub bind_types: BindTypes,
    /// Placeholders declared as arrays, rendered as `:name0, :name1, ...`
    pub array_placeholders: HashSet<String>,
}

/// Compiles one statement.
///
/// A compiler is single-use: it accumulates the bind types declared by
/// typed placeholders and caches the model bindings it loads.
pub struct Compiler<'a> {
    manager: &'a dyn ModelsManager,
    meta_data: Arc<dyn MetaData>,
    options: OrmOptions,
    binds: &'a BindParams,
    bind_types: BindTypes,
    array_placeholders: HashSet<String>,
    bindings: HashMap<String, ModelBinding>,
}

impl<'a> Compiler<'a> {
    /// `binds` are consulted for array placeholders, whose expansion depends
    /// on the bound array's length.
    pub fn new(manager: &'a dyn ModelsManager, binds: &'a BindParams) -> Self {
        Self {
            manager,
            meta_data: manager.meta_data(),
            options: manager.options(),
            binds,
            bind_types: BindTypes::new(),
            array_placeholders: HashSet::new(),
            bindings: HashMap::new(),
        }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(kind = ?statement.kind()))]
    pub fn compile(mut self, statement: &Statement) -> Result<Compiled> {
        let intermediate = match statement {
            Statement::Select(select) => {
                let mut scope = CompilationScope::root();
                Intermediate::Select(self.prepare_select(select, &mut scope)?)
            }
            Statement::Insert(insert) => Intermediate::Insert(self.prepare_insert(insert)?),
            Statement::Update(update) => Intermediate::Update(self.prepare_update(update)?),
            Statement::Delete(delete) => Intermediate::Delete(self.prepare_delete(delete)?),
        };
        tracing::trace!(bind_types = self.bind_types.len(), "statement compiled");
        Ok(Compiled {
            intermediate,
            bind_types: self.bind_types,
            array_placeholders: self.array_placeholders,
        })
    }

    /// Load a model, initializing it on first use.
    fn load(&mut self, model: &str) -> Result<ModelBinding> {
        if let Some(binding) = self.bindings.get(model) {
            return Ok(binding.clone());
        }
        let binding = self.manager.binding(model)?;
        self.bindings.insert(model.to_string(), binding.clone());
        Ok(binding)
    }

    /// Register a FROM/UPDATE/DELETE table in `scope`.
    ///
    /// Returns the model name and its table source. `declared` collects the
    /// explicit aliases of the current statement level.
    fn register_table(
        &mut self,
        table: &TableRef,
        scope: &mut CompilationScope,
        declared: &mut HashSet<String>,
    ) -> Result<(String, TableSource)> {
        let binding = self.load(&table.model)?;
        let model = binding.name.clone();
        let mut source = binding.table();
        match &table.alias {
            Some(alias) => {
                if !declared.insert(alias.clone()) {
                    return Err(Error::compile(
                        CompileErrorKind::DuplicateAlias,
                        format!("Alias '{}' is used more than once", alias),
                    ));
                }
                scope.register(&model, alias, alias);
                source = source.alias(alias.clone());
            }
            None => scope.register(&model, &model, &binding.source),
        }
        Ok((model, source))
    }
}

/// Lowercase the first character of a model's short name.
pub(crate) fn lcfirst(model: &str) -> String {
    let short = model.rsplit('\\').next().unwrap_or(model);
    let mut chars = short.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn corrupted(statement: &str) -> Error {
    Error::compile(
        CompileErrorKind::CorruptedIr,
        format!("Corrupted {} AST", statement),
    )
}
