//! Statement execution.
//!
//! A [`Query`] compiles its statement for every execution (array
//! placeholders expand according to the bound values), picks the
//! connections of the models involved and runs it:
//!
//! - SELECT renders the fragment through the connection's dialect and wraps
//!   the result handle in a [`Resultset`], optionally served from a cache.
//! - INSERT builds a record from the resolved values and persists it.
//! - UPDATE and DELETE select the affected records first and then update or
//!   delete them one by one inside a transaction, so model events and
//!   validation run for every record.

use crate::bind::process_binds;
use crate::compiler::{Compiled, Compiler, lcfirst};
use crate::resultset::{ComplexColumn, ResultRow, ResultShape, Resultset, ResultsetFactory, ResultsetSnapshot};
use crate::status::Status;
use crate::transaction::Transaction;
use indexmap::IndexMap;
use modelql_core::cache::{DEFAULT_CACHE_LIFETIME, DEFAULT_CACHE_SERVICE};
use modelql_core::error::{BindErrorKind, CompileErrorKind};
use modelql_core::fragment::{
    DeleteFragment, InsertFragment, LimitFragment, RenderColumn, RenderSelect, UpdateFragment,
    ValueSpec,
};
use modelql_core::ir::StatementKind;
use modelql_core::{
    BindParams, BindTypes, CacheOptions, ColumnSpec, Connection, Dialect, Error, Intermediate,
    ModelsManager, Record, Result, ResultsetErrorKind, SelectFragment, SqlExpr, Statement,
    TableSource, Value,
};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

const CONTAINER_REQUIRED: &str =
    "A dependency injection container is required to access the services related to the ORM";

/// Looks up the resultset factory registered for a model.
pub type ResultsetResolver = Arc<dyn Fn(&str) -> Option<Arc<dyn ResultsetFactory>> + Send + Sync>;

/// Outcome of [`Query::execute`].
#[derive(Debug)]
pub enum QueryResult {
    /// Rows of a SELECT
    Resultset(Resultset),
    /// First row of a SELECT executed with a unique row
    Row(Option<ResultRow>),
    /// Outcome of an INSERT, UPDATE or DELETE
    Status(Status),
}

impl QueryResult {
    pub fn into_resultset(self) -> Option<Resultset> {
        match self {
            QueryResult::Resultset(resultset) => Some(resultset),
            _ => None,
        }
    }

    pub fn into_row(self) -> Option<ResultRow> {
        match self {
            QueryResult::Row(row) => row,
            _ => None,
        }
    }

    pub fn into_status(self) -> Option<Status> {
        match self {
            QueryResult::Status(status) => Some(status),
            _ => None,
        }
    }
}

/// SQL generated for a SELECT, with the binds it would be sent with.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub bind: BindParams,
    pub bind_types: BindTypes,
}

struct PreparedSelect {
    connection: Arc<dyn Connection>,
    shape: ResultShape,
    sql: String,
    binds: BindParams,
    types: BindTypes,
}

/// A statement bound to a models manager.
pub struct Query {
    manager: Arc<dyn ModelsManager>,
    statement: Option<Statement>,
    intermediate: Option<Intermediate>,
    bind_params: BindParams,
    bind_types: BindTypes,
    unique_row: bool,
    shared_lock: bool,
    cache_options: Option<CacheOptions>,
    transaction: Option<Arc<Transaction>>,
    resultset_resolver: Option<ResultsetResolver>,
}

impl Query {
    pub fn new(manager: Arc<dyn ModelsManager>, statement: Statement) -> Self {
        Self {
            statement: Some(statement),
            ..Self::bare(manager)
        }
    }

    /// A query over an already compiled statement.
    pub fn from_intermediate(manager: Arc<dyn ModelsManager>, intermediate: Intermediate) -> Self {
        Self {
            intermediate: Some(intermediate),
            ..Self::bare(manager)
        }
    }

    fn bare(manager: Arc<dyn ModelsManager>) -> Self {
        Self {
            manager,
            statement: None,
            intermediate: None,
            bind_params: BindParams::new(),
            bind_types: BindTypes::new(),
            unique_row: false,
            shared_lock: false,
            cache_options: None,
            transaction: None,
            resultset_resolver: None,
        }
    }

    pub fn manager(&self) -> &Arc<dyn ModelsManager> {
        &self.manager
    }

    pub fn get_statement(&self) -> Option<&Statement> {
        self.statement.as_ref()
    }

    /// Kind of statement this query runs.
    pub fn kind(&self) -> Option<StatementKind> {
        match (&self.intermediate, &self.statement) {
            (Some(intermediate), _) => Some(intermediate.kind()),
            (None, Some(statement)) => Some(statement.kind()),
            (None, None) => None,
        }
    }

    /// Default bind parameters. With `merge`, `params` are added to the
    /// current ones, replacing values under the same name.
    pub fn set_bind_params(&mut self, params: BindParams, merge: bool) -> &mut Self {
        if merge {
            self.bind_params.extend(params);
        } else {
            self.bind_params = params;
        }
        self
    }

    pub fn get_bind_params(&self) -> &BindParams {
        &self.bind_params
    }

    pub fn set_bind_types(&mut self, types: BindTypes, merge: bool) -> &mut Self {
        if merge {
            self.bind_types.extend(types);
        } else {
            self.bind_types = types;
        }
        self
    }

    pub fn get_bind_types(&self) -> &BindTypes {
        &self.bind_types
    }

    /// Return only the first row of a SELECT.
    pub fn set_unique_row(&mut self, unique_row: bool) -> &mut Self {
        self.unique_row = unique_row;
        self
    }

    pub fn get_unique_row(&self) -> bool {
        self.unique_row
    }

    pub fn set_shared_lock(&mut self, shared_lock: bool) -> &mut Self {
        self.shared_lock = shared_lock;
        self
    }

    /// Run on the connection of `transaction` while it is active.
    ///
    /// Once the transaction is committed or rolled back, later executions
    /// fall back to the models manager's read and write connections, and
    /// UPDATE and DELETE batches open their own transaction again.
    pub fn set_transaction(&mut self, transaction: Arc<Transaction>) -> &mut Self {
        self.transaction = Some(transaction);
        self
    }

    pub fn get_transaction(&self) -> Option<&Arc<Transaction>> {
        self.transaction.as_ref()
    }

    /// Use `intermediate` instead of compiling the statement.
    pub fn set_intermediate(&mut self, intermediate: Intermediate) -> &mut Self {
        self.intermediate = Some(intermediate);
        self
    }

    pub fn get_intermediate(&self) -> Option<&Intermediate> {
        self.intermediate.as_ref()
    }

    pub fn set_resultset_resolver(&mut self, resolver: ResultsetResolver) -> &mut Self {
        self.resultset_resolver = Some(resolver);
        self
    }

    /// Cache the resultsets of this query.
    pub fn cache(&mut self, options: CacheOptions) -> &mut Self {
        self.cache_options = Some(options);
        self
    }

    pub fn get_cache_options(&self) -> Option<&CacheOptions> {
        self.cache_options.as_ref()
    }

    /// Compile with the default bind parameters.
    pub fn parse(&self) -> Result<Compiled> {
        self.compile(&self.bind_params)
    }

    fn compile(&self, binds: &BindParams) -> Result<Compiled> {
        if let Some(intermediate) = &self.intermediate {
            return Ok(Compiled {
                array_placeholders: intermediate.array_placeholders(),
                intermediate: intermediate.clone(),
                bind_types: BindTypes::new(),
            });
        }
        let statement = self
            .statement
            .as_ref()
            .ok_or_else(|| Error::compile(CompileErrorKind::CorruptedIr, "Corrupted AST"))?;
        Compiler::new(self.manager.as_ref(), binds).compile(statement)
    }

    fn merge_binds(&self, binds: &BindParams) -> BindParams {
        let mut merged = self.bind_params.clone();
        merged.extend(binds.iter().map(|(name, value)| (name.clone(), value.clone())));
        merged
    }

    fn merge_types(&self, compiled: BindTypes, types: &BindTypes) -> BindTypes {
        let mut merged = compiled;
        merged.extend(self.bind_types.iter().map(|(name, ty)| (name.clone(), *ty)));
        merged.extend(types.iter().map(|(name, ty)| (name.clone(), *ty)));
        merged
    }

    /// SQL of a SELECT, rendered with the default bind parameters.
    pub fn get_sql(&self) -> Result<SqlStatement> {
        let compiled = self.compile(&self.bind_params)?;
        let types = self.merge_types(compiled.bind_types, &BindTypes::new());
        match &compiled.intermediate {
            Intermediate::Select(select) => {
                let prepared = self.prepare_select(
                    select,
                    &self.bind_params,
                    &types,
                    &compiled.array_placeholders,
                )?;
                Ok(SqlStatement {
                    sql: prepared.sql,
                    bind: prepared.binds,
                    bind_types: prepared.types,
                })
            }
            _ => Err(Error::compile(
                CompileErrorKind::NotSupported,
                "This type of statement generates multiple SQL statements",
            )),
        }
    }

    /// Execute with `binds` and `types` added to the defaults.
    #[tracing::instrument(level = "debug", skip_all, fields(kind = ?self.kind()))]
    pub fn execute(&self, binds: &BindParams, types: &BindTypes) -> Result<QueryResult> {
        let cache = match &self.cache_options {
            Some(options) => {
                if self.kind() != Some(StatementKind::Select) {
                    return Err(Error::cache(
                        "Only PHQL statements that return resultsets can be cached",
                    ));
                }
                let key = options.key.clone().ok_or_else(|| {
                    Error::cache(
                        "A cache key must be provided to identify the cached resultset in the cache backend",
                    )
                })?;
                let lifetime = options.lifetime.unwrap_or(DEFAULT_CACHE_LIFETIME);
                let service = options.service.as_deref().unwrap_or(DEFAULT_CACHE_SERVICE);
                let container = self
                    .manager
                    .container()
                    .ok_or_else(|| Error::config(CONTAINER_REQUIRED))?;
                let cache = container.get_cache(service)?;

                if let Some(cached) = cache.get(&key, Some(lifetime)) {
                    let snapshot: ResultsetSnapshot = serde_json::from_value(cached).map_err(|_| {
                        Error::resultset(
                            ResultsetErrorKind::InvalidSnapshot,
                            "Cache didn't return a valid resultset",
                        )
                    })?;
                    tracing::debug!(key = %key, "resultset served from cache");
                    let mut resultset =
                        Resultset::from_snapshot(snapshot, Some(Arc::clone(&self.manager)));
                    resultset.set_is_fresh(false);
                    return self.finish(resultset);
                }
                Some((cache, key, lifetime))
            }
            None => None,
        };

        let merged = self.merge_binds(binds);
        let compiled = self.compile(&merged)?;
        let merged_types = self.merge_types(compiled.bind_types, types);

        let status = match &compiled.intermediate {
            Intermediate::Select(select) => {
                let mut resultset =
                    self.execute_select(select, &merged, &merged_types, &compiled.array_placeholders)?;
                if let Some((cache, key, lifetime)) = cache {
                    let snapshot = serde_json::to_value(resultset.snapshot()?)?;
                    if let Err(err) = cache.save(&key, snapshot, lifetime) {
                        if self.manager.options().exception_on_failed_metadata_save {
                            return Err(err);
                        }
                        tracing::warn!(key = %key, error = %err, "failed to cache resultset");
                    }
                }
                return self.finish(resultset);
            }
            Intermediate::Insert(insert) => self.execute_insert(insert, &merged)?,
            Intermediate::Update(update) => self.execute_update(update, &merged, &merged_types)?,
            Intermediate::Delete(delete) => self.execute_delete(delete, &merged, &merged_types)?,
        };
        Ok(QueryResult::Status(status))
    }

    fn finish(&self, mut resultset: Resultset) -> Result<QueryResult> {
        if self.unique_row {
            return Ok(QueryResult::Row(resultset.get_first()?));
        }
        Ok(QueryResult::Resultset(resultset))
    }

    /// First row of the result, whether or not a unique row was requested.
    pub fn get_single_result(&self, binds: &BindParams, types: &BindTypes) -> Result<Option<ResultRow>> {
        match self.execute(binds, types)? {
            QueryResult::Row(row) => Ok(row),
            QueryResult::Resultset(mut resultset) => resultset.get_first(),
            QueryResult::Status(_) => Err(Error::compile(
                CompileErrorKind::NotSupported,
                "Only SELECT statements return rows",
            )),
        }
    }

    fn read_connection(&self, model: &str, binds: &BindParams) -> Result<Arc<dyn Connection>> {
        match &self.transaction {
            Some(transaction) if transaction.is_valid() => transaction.get_connection(),
            _ => self.manager.read_connection(model, binds),
        }
    }

    fn write_connection(&self, model: &str, binds: &BindParams) -> Result<Arc<dyn Connection>> {
        match &self.transaction {
            Some(transaction) if transaction.is_valid() => transaction.get_connection(),
            _ => self.manager.write_connection(model, binds),
        }
    }

    fn in_transaction(&self) -> bool {
        self.transaction
            .as_ref()
            .is_some_and(|transaction| transaction.is_valid())
    }

    fn prepare_select(
        &self,
        select: &SelectFragment,
        binds: &BindParams,
        types: &BindTypes,
        array_placeholders: &HashSet<String>,
    ) -> Result<PreparedSelect> {
        let mut connection: Option<Arc<dyn Connection>> = None;
        for model in &select.models {
            let candidate = self.read_connection(model, binds)?;
            match &connection {
                None => connection = Some(candidate),
                Some(first) if first.db_type() != candidate.db_type() => {
                    return Err(Error::compile(
                        CompileErrorKind::MixedDatabaseSystems,
                        "Cannot use models of different database systems in the same query",
                    ));
                }
                Some(_) => {}
            }
        }
        let connection = connection
            .ok_or_else(|| Error::compile(CompileErrorKind::CorruptedIr, "Corrupted SELECT AST"))?;

        let have_objects = select.columns.values().any(ColumnSpec::is_object);
        let have_scalars = select.columns.values().any(|spec| !spec.is_object());
        let is_complex = select
            .columns
            .values()
            .any(|spec| !spec.is_object() && spec.balias().is_none())
            || (have_objects && (have_scalars || select.columns.len() > 1));

        let meta = self.manager.meta_data();
        let options = self.manager.options();
        let mut render = Vec::new();
        let mut complex = Vec::new();
        let mut simple_model = None;

        for (position, (key, spec)) in select.columns.iter().enumerate() {
            match spec {
                ColumnSpec::Object { model, column, .. } => {
                    let attributes = meta.get_attributes(model);
                    if !is_complex {
                        render.extend(attributes.iter().map(|attribute| RenderColumn {
                            expr: SqlExpr::qualified(column.clone(), attribute.clone()),
                            alias: None,
                        }));
                        simple_model = Some(model.clone());
                        continue;
                    }
                    render.extend(attributes.iter().map(|attribute| RenderColumn {
                        expr: SqlExpr::qualified(column.clone(), attribute.clone()),
                        alias: Some(format!("_{}_{}", column, attribute)),
                    }));
                    complex.push(ComplexColumn::Object {
                        name: key.clone(),
                        model: model.clone(),
                        source: column.clone(),
                        attributes,
                        column_map: if options.column_renaming {
                            meta.get_column_map(model)
                        } else {
                            None
                        },
                        data_types: options.cast_on_hydrate.then(|| meta.get_data_types(model)),
                        keep_snapshots: self.manager.binding(model)?.keep_snapshots,
                    });
                }
                ColumnSpec::Scalar { column, balias, .. } => {
                    render.push(RenderColumn {
                        expr: column.clone(),
                        alias: Some(key.clone()),
                    });
                    if is_complex {
                        complex.push(ComplexColumn::Scalar {
                            name: balias.clone().unwrap_or_else(|| position.to_string()),
                            key: key.clone(),
                        });
                    }
                }
            }
        }

        let shape = match simple_model {
            _ if is_complex => ResultShape::Complex { columns: complex },
            Some(model) => ResultShape::Simple {
                column_map: if options.column_renaming {
                    meta.get_column_map(&model)
                } else {
                    None
                },
                data_types: options.cast_on_hydrate.then(|| meta.get_data_types(&model)),
                keep_snapshots: self.manager.binding(&model)?.keep_snapshots,
                model,
            },
            None => ResultShape::Std,
        };

        let dialect = connection.dialect();
        let mut sql = dialect.select(&RenderSelect {
            fragment: select,
            columns: &render,
        })?;
        if self.shared_lock {
            sql = dialect.shared_lock(&sql);
        }
        let (binds, types) = process_binds(binds, types, array_placeholders);

        Ok(PreparedSelect {
            connection,
            shape,
            sql,
            binds,
            types,
        })
    }

    fn execute_select(
        &self,
        select: &SelectFragment,
        binds: &BindParams,
        types: &BindTypes,
        array_placeholders: &HashSet<String>,
    ) -> Result<Resultset> {
        let prepared = self.prepare_select(select, binds, types, array_placeholders)?;
        tracing::debug!(sql = %prepared.sql, binds = prepared.binds.len(), "executing select");
        let handle = prepared
            .connection
            .query(&prepared.sql, &prepared.binds, &prepared.types)?;
        let resultset = Resultset::new(
            prepared.shape,
            handle,
            self.manager.options().resultset_prefetch_records,
        )?
        .with_manager(Arc::clone(&self.manager));

        let model = resultset.shape().model().map(str::to_string);
        if let (Some(resolver), Some(model)) = (&self.resultset_resolver, model) {
            if let Some(factory) = resolver(&model) {
                return Ok(factory.create(&model, resultset));
            }
        }
        Ok(resultset)
    }

    fn execute_insert(&self, insert: &InsertFragment, binds: &BindParams) -> Result<Status> {
        let connection = self.write_connection(&insert.model, binds)?;
        let meta = self.manager.meta_data();

        let (fields, column_map) = match &insert.fields {
            Some(fields) => (fields.clone(), None),
            None => {
                let column_map = if self.manager.options().column_renaming {
                    meta.get_column_map(&insert.model)
                } else {
                    None
                };
                (meta.get_attributes(&insert.model), column_map)
            }
        };
        if fields.len() != insert.values.len() {
            return Err(Error::compile(
                CompileErrorKind::FieldCount,
                "The column count does not match the values count",
            ));
        }

        let mut values = IndexMap::with_capacity(fields.len());
        for (field, spec) in fields.iter().zip(&insert.values) {
            let attribute = match &column_map {
                Some(map) => map.get(field).cloned().ok_or_else(|| {
                    Error::compile(
                        CompileErrorKind::UnknownAttribute,
                        format!("Column '{}' isn't part of the column map", field),
                    )
                })?,
                None => field.clone(),
            };
            values.insert(attribute, resolve_value(spec, binds, connection.dialect())?);
        }

        let mut record = Record::new(insert.model.clone());
        record.assign(values);
        let created =
            self.manager
                .persister()
                .create(self.manager.as_ref(), &mut record, connection.as_ref())?;
        tracing::debug!(model = %insert.model, created, "insert executed");
        Ok(Status::new(created, Some(record)))
    }

    fn execute_update(&self, update: &UpdateFragment, binds: &BindParams, types: &BindTypes) -> Result<Status> {
        if update.models.len() > 1 {
            return Err(Error::compile(
                CompileErrorKind::NotSupported,
                "Updating several models at the same time is still not supported",
            ));
        }
        let model = update
            .models
            .first()
            .ok_or_else(|| Error::compile(CompileErrorKind::CorruptedIr, "Corrupted UPDATE AST"))?;
        let connection = self.write_connection(model, binds)?;

        // Placeholders of the SET list are not sent with the internal select.
        let mut select_binds = binds.clone();
        let mut select_types = types.clone();
        let mut values = IndexMap::with_capacity(update.fields.len());
        for (field, spec) in update.fields.iter().zip(&update.values) {
            if let ValueSpec::Placeholder(name) = spec {
                select_binds.shift_remove(name);
                select_types.shift_remove(name);
            }
            values.insert(field.clone(), resolve_value(spec, binds, connection.dialect())?);
        }

        let records = self.related_records(
            model,
            &update.tables,
            update.where_.clone(),
            update.limit.clone(),
            &select_binds,
            &select_types,
        )?;
        self.run_batch(connection, records, |manager, record, connection| {
            record.assign(values.iter().map(|(name, value)| (name.clone(), value.clone())));
            manager.persister().update(manager, record, connection)
        })
    }

    fn execute_delete(&self, delete: &DeleteFragment, binds: &BindParams, types: &BindTypes) -> Result<Status> {
        if delete.models.len() > 1 {
            return Err(Error::compile(
                CompileErrorKind::NotSupported,
                "Delete from several models at the same time is still not supported",
            ));
        }
        let model = delete
            .models
            .first()
            .ok_or_else(|| Error::compile(CompileErrorKind::CorruptedIr, "Corrupted DELETE AST"))?;
        let connection = self.write_connection(model, binds)?;

        let records = self.related_records(
            model,
            &delete.tables,
            delete.where_.clone(),
            delete.limit.clone(),
            binds,
            types,
        )?;
        self.run_batch(connection, records, |manager, record, connection| {
            manager.persister().delete(manager, record, connection)
        })
    }

    /// Records affected by an UPDATE or DELETE.
    fn related_records(
        &self,
        model: &str,
        tables: &[TableSource],
        where_: Option<SqlExpr>,
        limit: Option<LimitFragment>,
        binds: &BindParams,
        types: &BindTypes,
    ) -> Result<Resultset> {
        let table = tables
            .first()
            .ok_or_else(|| Error::compile(CompileErrorKind::CorruptedIr, "Corrupted AST"))?;
        let balias = lcfirst(model);
        let mut columns = IndexMap::new();
        columns.insert(
            balias.clone(),
            ColumnSpec::Object {
                model: model.to_string(),
                column: table.reference_name().to_string(),
                balias,
                eager: None,
            },
        );
        let select = SelectFragment {
            models: vec![model.to_string()],
            tables: tables.to_vec(),
            columns,
            where_,
            limit,
            ..SelectFragment::default()
        };

        let mut query = Query::from_intermediate(Arc::clone(&self.manager), Intermediate::Select(select));
        if let Some(transaction) = &self.transaction {
            query.set_transaction(Arc::clone(transaction));
        }
        match query.execute(binds, types)? {
            QueryResult::Resultset(resultset) => Ok(resultset),
            _ => Err(Error::compile(CompileErrorKind::CorruptedIr, "Corrupted AST")),
        }
    }

    /// Apply `mutation` to every record, stopping at the first failure.
    ///
    /// Without an active attached transaction the batch runs in its own
    /// transaction on `connection`, rolled back on failure.
    fn run_batch<M>(&self, connection: Arc<dyn Connection>, mut records: Resultset, mut mutation: M) -> Result<Status>
    where
        M: FnMut(&dyn ModelsManager, &mut Record, &dyn Connection) -> Result<bool>,
    {
        if records.is_empty() {
            return Ok(Status::new(true, None));
        }
        let own_transaction = !self.in_transaction();
        if own_transaction {
            connection.begin()?;
        }
        let rollback = |connection: &dyn Connection| {
            if own_transaction {
                if let Err(err) = connection.rollback() {
                    tracing::warn!(error = %err, "rollback after failed batch failed");
                }
            }
        };

        records.rewind()?;
        while records.valid() {
            let Some(row) = records.current()? else {
                break;
            };
            let Some(mut record) = row.into_record() else {
                rollback(connection.as_ref());
                return Err(Error::resultset(
                    ResultsetErrorKind::InvalidRecord,
                    "The returned record is not valid",
                ));
            };
            match mutation(self.manager.as_ref(), &mut record, connection.as_ref()) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(model = record.model(), "batch statement failed on a record");
                    if own_transaction {
                        connection.rollback()?;
                    }
                    return Ok(Status::new(false, Some(record)));
                }
                Err(err) => {
                    rollback(connection.as_ref());
                    return Err(err);
                }
            }
            records.next()?;
        }

        if own_transaction {
            connection.commit()?;
        }
        Ok(Status::new(true, None))
    }
}

/// Value of an INSERT or UPDATE expression.
fn resolve_value(spec: &ValueSpec, binds: &BindParams, dialect: &dyn Dialect) -> Result<Value> {
    Ok(match spec {
        ValueSpec::Literal(value) => value.clone(),
        ValueSpec::Null => Value::Null,
        ValueSpec::Placeholder(name) => binds.get(name).cloned().ok_or_else(|| {
            Error::bind(
                BindErrorKind::Missing,
                name.clone(),
                format!(
                    "Bound parameter '{}' cannot be replaced because it isn't in the placeholders list",
                    name
                ),
            )
        })?,
        ValueSpec::Expr(expr) => Value::Raw(dialect.sql_expression(expr)?),
    })
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("kind", &self.kind())
            .field("bind_params", &self.bind_params)
            .field("unique_row", &self.unique_row)
            .field("shared_lock", &self.shared_lock)
            .field("cache_options", &self.cache_options)
            .field("transaction", &self.transaction)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockConnection, MockManager};
    use modelql_core::ir::{
        Assignment, BinaryOp, DeleteStatement, Expr, InsertStatement, SelectColumn, SelectStatement,
        TableRef, UpdateStatement,
    };
    use modelql_core::{BindType, Container, HydrateMode, MemoryCache, Row};

    fn row(pairs: &[(&str, Value)]) -> Row {
        Row::new(
            pairs.iter().map(|(name, _)| (*name).to_string()).collect(),
            pairs.iter().map(|(_, value)| value.clone()).collect(),
        )
    }

    fn robot(id: i64, name: &str) -> Row {
        row(&[
            ("id", Value::Int(id)),
            ("name", Value::Text(name.to_string())),
            ("type", Value::Text("mechanical".to_string())),
            ("year", Value::Int(1952)),
        ])
    }

    fn robots_select() -> Statement {
        Statement::Select(
            SelectStatement::new()
                .column(SelectColumn::AllOf("r".to_string()))
                .from(TableRef::new("Robots").alias("r"))
                .filter(Expr::binary(BinaryOp::Gt, Expr::qualified("r", "year"), Expr::named("year"))),
        )
    }

    fn binds(pairs: &[(&str, Value)]) -> BindParams {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn simple_select_hydrates_records() {
        let manager = MockManager::with_robots();
        let connection = manager.connection();
        connection.push_rows(vec![robot(1, "Robotina"), robot(2, "Astro Boy")]);
        let state = connection.state();

        let query = Query::new(Arc::new(manager), robots_select());
        let mut resultset = query
            .execute(&binds(&[("year", Value::Int(1900))]), &BindTypes::new())
            .unwrap()
            .into_resultset()
            .unwrap();

        assert!(matches!(resultset.shape(), ResultShape::Simple { model, .. } if model == "Robots"));
        assert_eq!(resultset.count(), 2);
        let first = resultset.get_first().unwrap().unwrap();
        assert_eq!(first.as_record().map(Record::model), Some("Robots"));
        assert_eq!(first.get("name"), Some(Value::Text("Robotina".to_string())));

        let state = state.lock().unwrap();
        assert_eq!(
            state.queries[0].0,
            "SELECT \"r\".\"id\", \"r\".\"name\", \"r\".\"type\", \"r\".\"year\" FROM \"robots\" AS \"r\" WHERE \"r\".\"year\" > :year"
        );
        assert_eq!(state.queries[0].1.get("year"), Some(&Value::Int(1900)));
    }

    #[test]
    fn scalar_and_object_columns_make_complex_rows() {
        let manager = MockManager::with_cars();
        let connection = manager.connection();
        connection.push_rows(vec![row(&[
            ("taxes", Value::Double(16.0)),
            ("_c_id", Value::Int(1)),
            ("_c_name", Value::Text("Beetle".to_string())),
            ("_c_price", Value::Double(100.0)),
        ])]);
        let state = connection.state();

        let statement = Statement::Select(
            SelectStatement::new()
                .column(SelectColumn::aliased(
                    Expr::binary(BinaryOp::Mul, Expr::qualified("c", "price"), Expr::double(0.16)),
                    "taxes",
                ))
                .column(SelectColumn::AllOf("c".to_string()))
                .from(TableRef::new("Cars").alias("c")),
        );
        let mut resultset = Query::new(Arc::new(manager), statement)
            .execute(&BindParams::new(), &BindTypes::new())
            .unwrap()
            .into_resultset()
            .unwrap();

        assert!(!resultset.shape().is_simple());
        let first = resultset.get_first().unwrap().unwrap();
        assert_eq!(first.get("taxes"), Some(Value::Double(16.0)));
        let car = first.item("c").and_then(|item| item.as_record()).unwrap();
        assert_eq!(car.get("name"), Some(&Value::Text("Beetle".to_string())));

        let state = state.lock().unwrap();
        let sql = &state.queries[0].0;
        assert!(sql.contains("AS \"taxes\""));
        assert!(sql.contains("\"c\".\"id\" AS \"_c_id\""));
        assert!(sql.contains("\"c\".\"price\" AS \"_c_price\""));
    }

    #[test]
    fn scalar_columns_only_make_plain_rows() {
        let manager = MockManager::with_robots();
        manager
            .connection()
            .push_rows(vec![row(&[("name", Value::Text("Robotina".to_string()))])]);
        let statement = Statement::Select(
            SelectStatement::new()
                .column(SelectColumn::expr(Expr::qualified("r", "name")))
                .from(TableRef::new("Robots").alias("r")),
        );
        let mut resultset = Query::new(Arc::new(manager), statement)
            .execute(&BindParams::new(), &BindTypes::new())
            .unwrap()
            .into_resultset()
            .unwrap();

        assert_eq!(resultset.shape(), &ResultShape::Std);
        let first = resultset.get_first().unwrap().unwrap();
        assert!(matches!(first, ResultRow::Row(_)));
        assert_eq!(first.get("name"), Some(Value::Text("Robotina".to_string())));
    }

    #[test]
    fn unique_row_returns_first_row() {
        let manager = MockManager::with_robots();
        manager.connection().push_rows(vec![robot(3, "Terminator")]);
        let mut query = Query::new(Arc::new(manager), robots_select());
        query.set_bind_params(binds(&[("year", Value::Int(1900))]), false);
        query.set_unique_row(true);

        let row = query
            .execute(&BindParams::new(), &BindTypes::new())
            .unwrap()
            .into_row()
            .unwrap();
        assert_eq!(row.get("id"), Some(Value::Int(3)));
    }

    #[test]
    fn passed_binds_override_defaults() {
        let manager = MockManager::with_robots();
        let state = manager.connection().state();
        let mut query = Query::new(Arc::new(manager), robots_select());
        query.set_bind_params(binds(&[("year", Value::Int(1900))]), false);

        query
            .execute(&binds(&[("year", Value::Int(2000))]), &BindTypes::new())
            .unwrap();
        assert_eq!(state.lock().unwrap().queries[0].1.get("year"), Some(&Value::Int(2000)));
    }

    #[test]
    fn models_of_different_database_systems_cannot_mix() {
        let manager = MockManager::with_cars()
            .with_connection_for("Cars", MockConnection::new().with_db_type("mysql"));
        let statement = Statement::Select(
            SelectStatement::new()
                .column(SelectColumn::All)
                .from(TableRef::new("Robots"))
                .from(TableRef::new("Cars")),
        );
        let err = Query::new(Arc::new(manager), statement)
            .execute(&BindParams::new(), &BindTypes::new())
            .unwrap_err();
        assert_eq!(err.compile_kind(), Some(CompileErrorKind::MixedDatabaseSystems));
        assert_eq!(
            err.message(),
            "Cannot use models of different database systems in the same query"
        );
    }

    #[test]
    fn get_sql_expands_array_placeholders() {
        let manager = MockManager::with_robots();
        let statement = Statement::Select(
            SelectStatement::new()
                .column(SelectColumn::AllOf("r".to_string()))
                .from(TableRef::new("Robots").alias("r"))
                .filter(Expr::binary(
                    BinaryOp::In,
                    Expr::qualified("r", "id"),
                    Expr::typed("ids", "array-int"),
                )),
        );
        let mut query = Query::new(Arc::new(manager), statement);
        query.set_bind_params(binds(&[("ids", Value::from(vec![1_i64, 2]))]), false);

        let sql = query.get_sql().unwrap();
        assert!(sql.sql.ends_with("WHERE \"r\".\"id\" IN (:ids0, :ids1)"));
        assert_eq!(sql.bind.get("ids0"), Some(&Value::Int(1)));
        assert_eq!(sql.bind.get("ids1"), Some(&Value::Int(2)));
        assert_eq!(sql.bind_types.get("ids0"), Some(&BindType::Int));
    }

    #[test]
    fn arrays_bound_to_plain_placeholders_are_not_expanded() {
        let manager = MockManager::with_robots();
        let statement = Statement::Select(
            SelectStatement::new()
                .column(SelectColumn::AllOf("r".to_string()))
                .from(TableRef::new("Robots").alias("r"))
                .filter(Expr::qualified("r", "type").equals(Expr::named("types"))),
        );
        let mut query = Query::new(Arc::new(manager), statement);
        query.set_bind_params(binds(&[("types", Value::from(vec![1_i64, 2]))]), false);

        let sql = query.get_sql().unwrap();
        assert!(sql.sql.ends_with("WHERE \"r\".\"type\" = :types"));
        assert_eq!(sql.bind.get("types"), Some(&Value::from(vec![1_i64, 2])));
        assert!(!sql.bind.contains_key("types0"));
    }

    #[test]
    fn get_sql_rejects_write_statements() {
        let manager = MockManager::with_robots();
        let statement = Statement::Delete(DeleteStatement {
            tables: vec![TableRef::new("Robots")],
            where_: None,
            limit: None,
        });
        let err = Query::new(Arc::new(manager), statement).get_sql().unwrap_err();
        assert_eq!(
            err.message(),
            "This type of statement generates multiple SQL statements"
        );
    }

    #[test]
    fn insert_persists_a_new_record() {
        let manager = MockManager::with_robots();
        let state = manager.connection().state();
        let statement = Statement::Insert(InsertStatement {
            model: "Robots".to_string(),
            fields: vec!["name".to_string(), "year".to_string()],
            values: vec![Expr::string("Astro Boy"), Expr::named("year")],
        });

        let status = Query::new(Arc::new(manager), statement)
            .execute(&binds(&[("year", Value::Int(1952))]), &BindTypes::new())
            .unwrap()
            .into_status()
            .unwrap();
        assert!(status.success());
        assert_eq!(
            status.record().and_then(|record| record.get("name")),
            Some(&Value::Text("Astro Boy".to_string()))
        );

        let state = state.lock().unwrap();
        assert_eq!(state.inserted.len(), 1);
        assert_eq!(state.inserted[0].1.get("year"), Some(&Value::Int(1952)));
    }

    #[test]
    fn insert_with_missing_placeholder_fails() {
        let manager = MockManager::with_robots();
        let statement = Statement::Insert(InsertStatement {
            model: "Robots".to_string(),
            fields: vec!["name".to_string()],
            values: vec![Expr::named("name")],
        });
        let err = Query::new(Arc::new(manager), statement)
            .execute(&BindParams::new(), &BindTypes::new())
            .unwrap_err();
        assert_eq!(err.bind_kind(), Some(BindErrorKind::Missing));
        assert_eq!(
            err.message(),
            "Bound parameter 'name' cannot be replaced because it isn't in the placeholders list"
        );
    }

    #[test]
    fn insert_without_fields_uses_renamed_attributes() {
        let manager = MockManager::with_renamed_robots();
        let statement = Statement::Insert(InsertStatement {
            model: "Robots".to_string(),
            fields: Vec::new(),
            values: vec![
                Expr::int(7),
                Expr::string("Bender"),
                Expr::string("industrial"),
                Expr::int(2999),
            ],
        });
        let status = Query::new(Arc::new(manager), statement)
            .execute(&BindParams::new(), &BindTypes::new())
            .unwrap()
            .into_status()
            .unwrap();
        let record = status.record().unwrap();
        assert_eq!(record.get("code"), Some(&Value::Int(7)));
        assert_eq!(record.get("title"), Some(&Value::Text("Bender".to_string())));

        let short = Statement::Insert(InsertStatement {
            model: "Robots".to_string(),
            fields: Vec::new(),
            values: vec![Expr::int(7)],
        });
        let err = Query::new(Arc::new(MockManager::with_robots()), short)
            .execute(&BindParams::new(), &BindTypes::new())
            .unwrap_err();
        assert_eq!(err.compile_kind(), Some(CompileErrorKind::FieldCount));
    }

    fn update_robots() -> Statement {
        Statement::Update(UpdateStatement {
            tables: vec![TableRef::new("Robots")],
            values: vec![Assignment {
                column: Expr::column("type"),
                value: Expr::named("type"),
            }],
            where_: Some(Expr::binary(BinaryOp::Gt, Expr::column("year"), Expr::named("year"))),
            limit: None,
        })
    }

    #[test]
    fn update_runs_per_record_in_one_transaction() {
        let manager = MockManager::with_robots();
        let connection = manager.connection();
        connection.push_rows(vec![robot(1, "Robotina"), robot(2, "Astro Boy")]);
        let state = connection.state();

        let status = Query::new(Arc::new(manager), update_robots())
            .execute(
                &binds(&[("type", Value::Text("virtual".to_string())), ("year", Value::Int(1900))]),
                &BindTypes::new(),
            )
            .unwrap()
            .into_status()
            .unwrap();
        assert!(status.success());
        assert!(status.record().is_none());

        let state = state.lock().unwrap();
        let (sql, select_binds) = &state.queries[0];
        assert_eq!(
            sql,
            "SELECT \"robots\".\"id\", \"robots\".\"name\", \"robots\".\"type\", \"robots\".\"year\" FROM \"robots\" WHERE \"robots\".\"year\" > :year"
        );
        assert!(select_binds.contains_key("year"));
        assert!(!select_binds.contains_key("type"));
        assert_eq!(state.updated.len(), 2);
        assert_eq!((state.begins, state.commits, state.rollbacks), (1, 1, 0));
    }

    #[test]
    fn update_stops_and_rolls_back_on_first_failure() {
        let manager = MockManager::with_robots();
        manager.persister_fails_on(2);
        let connection = manager.connection();
        connection.push_rows(vec![robot(1, "Robotina"), robot(2, "Astro Boy"), robot(3, "Terminator")]);
        let state = connection.state();

        let status = Query::new(Arc::new(manager), update_robots())
            .execute(
                &binds(&[("type", Value::Text("virtual".to_string())), ("year", Value::Int(1900))]),
                &BindTypes::new(),
            )
            .unwrap()
            .into_status()
            .unwrap();
        assert!(!status.success());
        assert_eq!(status.record().and_then(|r| r.get("id")), Some(&Value::Int(2)));
        assert_eq!(status.get_messages()[0].message, "Record 2 refused the operation");

        let state = state.lock().unwrap();
        assert_eq!(state.updated.len(), 1);
        assert_eq!((state.begins, state.commits, state.rollbacks), (1, 0, 1));
    }

    #[test]
    fn update_without_matches_succeeds_without_transaction() {
        let manager = MockManager::with_robots();
        let state = manager.connection().state();
        let status = Query::new(Arc::new(manager), update_robots())
            .execute(
                &binds(&[("type", Value::Text("virtual".to_string())), ("year", Value::Int(3000))]),
                &BindTypes::new(),
            )
            .unwrap()
            .into_status()
            .unwrap();
        assert!(status.success());
        assert_eq!(state.lock().unwrap().begins, 0);
    }

    #[test]
    fn delete_of_several_models_is_not_supported() {
        let statement = Statement::Delete(DeleteStatement {
            tables: vec![TableRef::new("Robots"), TableRef::new("Cars")],
            where_: None,
            limit: None,
        });
        let err = Query::new(Arc::new(MockManager::with_cars()), statement)
            .execute(&BindParams::new(), &BindTypes::new())
            .unwrap_err();
        assert_eq!(err.compile_kind(), Some(CompileErrorKind::NotSupported));
        assert_eq!(
            err.message(),
            "Delete from several models at the same time is still not supported"
        );
    }

    #[test]
    fn delete_inside_attached_transaction_leaves_it_open() {
        let manager = MockManager::with_robots();
        let connection = manager.connection();
        connection.push_rows(vec![robot(1, "Robotina"), robot(2, "Astro Boy")]);
        let state = connection.state();
        let transaction = Arc::new(Transaction::new(Arc::new(connection), true).unwrap());

        let statement = Statement::Delete(DeleteStatement {
            tables: vec![TableRef::new("Robots")],
            where_: None,
            limit: None,
        });
        let mut query = Query::new(Arc::new(manager), statement);
        query.set_transaction(Arc::clone(&transaction));
        let status = query
            .execute(&BindParams::new(), &BindTypes::new())
            .unwrap()
            .into_status()
            .unwrap();

        assert!(status.success());
        assert!(transaction.is_valid());
        let state = state.lock().unwrap();
        assert_eq!(state.deleted.len(), 2);
        assert_eq!((state.begins, state.commits), (1, 0));
    }

    #[test]
    fn finished_transactions_are_not_reused() {
        let manager = MockManager::with_robots();
        let connection = manager.connection();
        connection.push_rows(vec![robot(1, "Robotina")]);
        let state = connection.state();
        let transaction = Arc::new(Transaction::new(Arc::new(connection), true).unwrap());
        transaction.commit().unwrap();

        let statement = Statement::Delete(DeleteStatement {
            tables: vec![TableRef::new("Robots")],
            where_: None,
            limit: None,
        });
        let mut query = Query::new(Arc::new(manager), statement);
        query.set_transaction(Arc::clone(&transaction));
        let status = query
            .execute(&BindParams::new(), &BindTypes::new())
            .unwrap()
            .into_status()
            .unwrap();

        assert!(status.success());
        assert!(!transaction.is_valid());
        let state = state.lock().unwrap();
        assert_eq!(state.deleted.len(), 1);
        assert_eq!((state.begins, state.commits), (2, 2));
    }

    #[test]
    fn delete_selects_with_expanded_array_placeholders() {
        let manager = MockManager::with_robots();
        let connection = manager.connection();
        connection.push_rows(vec![robot(1, "Robotina"), robot(2, "Astro Boy")]);

        let statement = Statement::Delete(DeleteStatement {
            tables: vec![TableRef::new("Robots")],
            where_: Some(Expr::binary(
                BinaryOp::In,
                Expr::column("id"),
                Expr::typed("ids", "array-int"),
            )),
            limit: None,
        });
        Query::new(Arc::new(manager), statement)
            .execute(&binds(&[("ids", Value::from(vec![1_i64, 2]))]), &BindTypes::new())
            .unwrap();

        let (sql, sent) = connection.state().lock().unwrap().queries[0].clone();
        assert!(sql.ends_with("IN (:ids0, :ids1)"));
        assert_eq!(sent.get("ids0"), Some(&Value::Int(1)));
        assert!(!sent.contains_key("ids"));
        assert_eq!(connection.state().lock().unwrap().deleted.len(), 2);
    }

    fn cached_manager() -> MockManager {
        let container = Container::new();
        container.set_cache("modelsCache", Arc::new(MemoryCache::new()));
        MockManager::with_robots().with_container(Arc::new(container))
    }

    #[test]
    fn cached_select_is_served_from_the_cache() {
        let manager = cached_manager();
        let connection = manager.connection();
        connection.push_rows(vec![robot(1, "Robotina")]);
        let state = connection.state();

        let mut query = Query::new(Arc::new(manager), robots_select());
        query.set_bind_params(binds(&[("year", Value::Int(1900))]), false);
        query.cache(CacheOptions::key("robots-after-1900"));

        let mut fresh = query
            .execute(&BindParams::new(), &BindTypes::new())
            .unwrap()
            .into_resultset()
            .unwrap();
        assert!(fresh.is_fresh());
        assert_eq!(fresh.count(), 1);

        let mut cached = query
            .execute(&BindParams::new(), &BindTypes::new())
            .unwrap()
            .into_resultset()
            .unwrap();
        assert!(!cached.is_fresh());
        assert_eq!(cached.count(), 1);
        assert_eq!(
            cached.get_first().unwrap().and_then(|row| row.get("name")),
            Some(Value::Text("Robotina".to_string()))
        );
        assert_eq!(state.lock().unwrap().queries.len(), 1);
    }

    #[test]
    fn only_selects_can_be_cached() {
        let manager = cached_manager();
        let mut query = Query::new(Arc::new(manager), update_robots());
        query.cache(CacheOptions::key("robots"));
        let err = query.execute(&BindParams::new(), &BindTypes::new()).unwrap_err();
        assert_eq!(
            err.message(),
            "Only PHQL statements that return resultsets can be cached"
        );

        let mut query = Query::new(Arc::new(cached_manager()), robots_select());
        query.cache(CacheOptions::default());
        let err = query.execute(&BindParams::new(), &BindTypes::new()).unwrap_err();
        assert_eq!(
            err.message(),
            "A cache key must be provided to identify the cached resultset in the cache backend"
        );
    }

    struct ArraysFactory;

    impl ResultsetFactory for ArraysFactory {
        fn create(&self, _model: &str, mut resultset: Resultset) -> Resultset {
            resultset.set_hydrate_mode(HydrateMode::Arrays);
            resultset
        }
    }

    #[test]
    fn resultset_factory_wraps_simple_results() {
        let manager = MockManager::with_robots();
        manager.connection().push_rows(vec![robot(1, "Robotina")]);
        let mut query = Query::new(Arc::new(manager), robots_select());
        query.set_bind_params(binds(&[("year", Value::Int(1900))]), false);
        query.set_resultset_resolver(Arc::new(|model: &str| {
            (model == "Robots").then(|| Arc::new(ArraysFactory) as Arc<dyn ResultsetFactory>)
        }));

        let mut resultset = query
            .execute(&BindParams::new(), &BindTypes::new())
            .unwrap()
            .into_resultset()
            .unwrap();
        assert_eq!(resultset.hydrate_mode(), HydrateMode::Arrays);
        assert!(matches!(resultset.get_first().unwrap(), Some(ResultRow::Array(_))));
    }
}
