//! INSERT, UPDATE and DELETE compilation.

use super::{CompilationScope, Compiler, corrupted};
use modelql_core::error::CompileErrorKind;
use modelql_core::fragment::{DeleteFragment, InsertFragment, UpdateFragment, ValueSpec};
use modelql_core::ir::{DeleteStatement, Expr, InsertStatement, Literal, UpdateStatement};
use modelql_core::{Error, Result, Value};
use std::collections::HashSet;

impl Compiler<'_> {
    pub(crate) fn prepare_insert(&mut self, insert: &InsertStatement) -> Result<InsertFragment> {
        if insert.values.is_empty() {
            return Err(corrupted("INSERT"));
        }

        let binding = self.load(&insert.model)?;
        let model = binding.name.clone();
        let mut scope = CompilationScope::root();
        scope.register(&model, &model, &binding.source);

        for field in &insert.fields {
            if !self.meta_data.has_attribute(&model, field) {
                return Err(Error::compile(
                    CompileErrorKind::UnknownAttribute,
                    format!("The model '{}' doesn't have the attribute '{}'", model, field),
                ));
            }
        }

        let values = insert
            .values
            .iter()
            .map(|value| self.value_spec(value, &scope))
            .collect::<Result<Vec<_>>>()?;

        Ok(InsertFragment {
            model,
            table: binding.table(),
            fields: (!insert.fields.is_empty()).then(|| insert.fields.clone()),
            values,
        })
    }

    pub(crate) fn prepare_update(&mut self, update: &UpdateStatement) -> Result<UpdateFragment> {
        if update.tables.is_empty() || update.values.is_empty() {
            return Err(corrupted("UPDATE"));
        }

        let mut scope = CompilationScope::root();
        let mut declared = HashSet::new();
        let mut models = Vec::with_capacity(update.tables.len());
        let mut tables = Vec::with_capacity(update.tables.len());
        for table in &update.tables {
            let (model, source) = self.register_table(table, &mut scope, &mut declared)?;
            models.push(model);
            tables.push(source);
        }

        let mut fields = Vec::with_capacity(update.values.len());
        let mut values = Vec::with_capacity(update.values.len());
        for assignment in &update.values {
            let Expr::Column { name, domain } = &assignment.column else {
                return Err(corrupted("UPDATE"));
            };
            // Validates the target; the record is assigned by attribute name.
            self.get_qualified(name, domain.as_deref(), &scope)?;
            fields.push(name.clone());
            values.push(self.value_spec(&assignment.value, &scope)?);
        }

        let where_ = match &update.where_ {
            Some(expr) => Some(self.get_expression(expr, &scope)?),
            None => None,
        };
        let limit = match &update.limit {
            Some(limit) => Some(self.get_limit(limit, &scope)?),
            None => None,
        };

        Ok(UpdateFragment {
            models,
            tables,
            fields,
            values,
            where_,
            limit,
        })
    }

    pub(crate) fn prepare_delete(&mut self, delete: &DeleteStatement) -> Result<DeleteFragment> {
        if delete.tables.is_empty() {
            return Err(corrupted("DELETE"));
        }

        let mut scope = CompilationScope::root();
        let mut declared = HashSet::new();
        let mut models = Vec::with_capacity(delete.tables.len());
        let mut tables = Vec::with_capacity(delete.tables.len());
        for table in &delete.tables {
            let (model, source) = self.register_table(table, &mut scope, &mut declared)?;
            models.push(model);
            tables.push(source);
        }

        let where_ = match &delete.where_ {
            Some(expr) => Some(self.get_expression(expr, &scope)?),
            None => None,
        };
        let limit = match &delete.limit {
            Some(limit) => Some(self.get_limit(limit, &scope)?),
            None => None,
        };

        Ok(DeleteFragment {
            models,
            tables,
            where_,
            limit,
        })
    }

    /// A value written by INSERT or UPDATE.
    fn value_spec(&mut self, expr: &Expr, scope: &CompilationScope) -> Result<ValueSpec> {
        Ok(match expr {
            Expr::Literal(Literal::String(s)) => ValueSpec::Literal(Value::Text(s.clone())),
            Expr::Literal(Literal::Integer(i)) => ValueSpec::Literal(Value::Int(*i)),
            Expr::Literal(Literal::Double(f)) => ValueSpec::Literal(Value::Double(*f)),
            Expr::Literal(Literal::Bool(b)) => ValueSpec::Literal(Value::Bool(*b)),
            Expr::Literal(Literal::Null) => ValueSpec::Null,
            Expr::Placeholder(placeholder) => {
                self.get_placeholder(placeholder)?;
                ValueSpec::Placeholder(placeholder.name())
            }
            other => ValueSpec::Expr(self.get_expression(other, scope)?),
        })
    }
}
