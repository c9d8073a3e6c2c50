//! Programmatic SELECT construction.
//!
//! The builder covers what model finders and relation fetches need: FROM
//! models, joins, conditions with bound values, ordering, grouping and
//! paging. [`QueryBuilder::get_query`] turns it into a ready [`Query`].

use crate::query::Query;
use modelql_core::ir::{
    BinaryOp, Expr, Join, Limit, OrderItem, SelectColumn, SelectStatement, TableRef,
};
use modelql_core::{
    BindParams, BindType, BindTypes, CacheOptions, Error, FindParameters, HydrateMode,
    ModelsManager, Result, Statement, Value,
};
use std::sync::Arc;

/// Prefix of the placeholders generated by [`QueryBuilder::in_where`].
const HIDDEN_PARAM_PREFIX: &str = "AP";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryBuilder {
    tables: Vec<TableRef>,
    columns: Option<Vec<SelectColumn>>,
    joins: Vec<Join>,
    conditions: Option<Expr>,
    group: Vec<Expr>,
    having: Option<Expr>,
    order: Vec<OrderItem>,
    limit: Option<u64>,
    offset: Option<u64>,
    distinct: bool,
    for_update: bool,
    shared_lock: bool,
    bind: BindParams,
    bind_types: BindTypes,
    cache: Option<CacheOptions>,
    hydration: Option<HydrateMode>,
    hidden_params: usize,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder selecting from `model` with the criteria of `params`.
    pub fn from_params(model: impl Into<String>, params: &FindParameters) -> Self {
        let mut builder = Self::new().from(TableRef::new(model));
        builder.conditions = params.conditions.clone();
        builder.bind = params.bind.clone();
        builder.bind_types = params.bind_types.clone();
        builder.columns = params.columns.clone();
        builder.order = params.order.clone();
        builder.group = params.group.clone();
        builder.having = params.having.clone();
        builder.limit = params.limit;
        builder.offset = params.offset;
        builder.for_update = params.for_update;
        builder.shared_lock = params.shared_lock;
        builder.cache = params.cache.clone();
        builder.hydration = params.hydration;
        builder
    }

    /// Add a model to the FROM list.
    pub fn from(mut self, table: TableRef) -> Self {
        self.tables.push(table);
        self
    }

    pub fn columns(mut self, columns: Vec<SelectColumn>) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    /// INNER JOIN `model`; without `on` the condition comes from the
    /// declared relations.
    pub fn inner_join(self, model: impl Into<String>, on: Option<Expr>) -> Self {
        let join = Join::inner(model);
        self.join(match on {
            Some(conditions) => join.on(conditions),
            None => join,
        })
    }

    pub fn left_join(self, model: impl Into<String>, on: Option<Expr>) -> Self {
        let join = Join::left(model);
        self.join(match on {
            Some(conditions) => join.on(conditions),
            None => join,
        })
    }

    /// Replace the conditions.
    pub fn where_(mut self, conditions: Expr) -> Self {
        self.conditions = Some(conditions);
        self
    }

    /// AND `conditions` with the current ones, each side parenthesized.
    pub fn and_where(mut self, conditions: Expr) -> Self {
        self.conditions = Some(match self.conditions.take() {
            Some(current) => current.paren().and(conditions.paren()),
            None => conditions,
        });
        self
    }

    pub fn or_where(mut self, conditions: Expr) -> Self {
        self.conditions = Some(match self.conditions.take() {
            Some(current) => current.paren().or(conditions.paren()),
            None => conditions,
        });
        self
    }

    /// AND `expr IN (values)`, binding each value to a generated placeholder.
    ///
    /// An empty list matches nothing.
    pub fn in_where(self, expr: Expr, values: Vec<Value>) -> Self {
        if values.is_empty() {
            let never = Expr::binary(BinaryOp::NotEq, expr.clone(), expr);
            return self.and_where(never);
        }
        self.list_condition(BinaryOp::In, expr, values)
    }

    /// AND `expr NOT IN (values)`. An empty list adds no condition.
    pub fn not_in_where(self, expr: Expr, values: Vec<Value>) -> Self {
        if values.is_empty() {
            return self;
        }
        self.list_condition(BinaryOp::NotIn, expr, values)
    }

    fn list_condition(mut self, op: BinaryOp, expr: Expr, values: Vec<Value>) -> Self {
        let mut placeholders = Vec::with_capacity(values.len());
        for value in values {
            let name = format!("{}{}", HIDDEN_PARAM_PREFIX, self.hidden_params);
            self.hidden_params += 1;
            placeholders.push(Expr::named(name.clone()));
            self.bind.insert(name, value);
        }
        self.and_where(Expr::binary(op, expr, Expr::List(placeholders)))
    }

    pub fn order_by(mut self, item: OrderItem) -> Self {
        self.order.push(item);
        self
    }

    pub fn group_by(mut self, expr: Expr) -> Self {
        self.group.push(expr);
        self
    }

    pub fn having(mut self, conditions: Expr) -> Self {
        self.having = Some(conditions);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Rows to skip; only used together with a limit.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    pub fn for_update(mut self, for_update: bool) -> Self {
        self.for_update = for_update;
        self
    }

    pub fn shared_lock(mut self, shared_lock: bool) -> Self {
        self.shared_lock = shared_lock;
        self
    }

    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.bind.insert(name.into(), value.into());
        self
    }

    pub fn bind_type(mut self, name: impl Into<String>, bind_type: BindType) -> Self {
        self.bind_types.insert(name.into(), bind_type);
        self
    }

    pub fn cache(mut self, options: CacheOptions) -> Self {
        self.cache = Some(options);
        self
    }

    pub fn hydration(mut self, mode: HydrateMode) -> Self {
        self.hydration = Some(mode);
        self
    }

    pub fn get_bind_params(&self) -> &BindParams {
        &self.bind
    }

    pub fn get_hydration(&self) -> Option<HydrateMode> {
        self.hydration
    }

    /// The SELECT described by the builder.
    ///
    /// Without explicit columns every FROM model is selected whole.
    pub fn get_statement(&self) -> Result<Statement> {
        if self.tables.is_empty() {
            return Err(Error::config("At least one model is required to build the query"));
        }
        let columns = match &self.columns {
            Some(columns) if !columns.is_empty() => columns.clone(),
            _ => self
                .tables
                .iter()
                .map(|table| SelectColumn::AllOf(table.alias.clone().unwrap_or_else(|| table.model.clone())))
                .collect(),
        };
        let limit = self.limit.map(|number| {
            let limit = Limit::new(to_i64(number));
            match self.offset {
                Some(offset) => limit.offset(to_i64(offset)),
                None => limit,
            }
        });

        Ok(Statement::Select(SelectStatement {
            distinct: self.distinct,
            columns,
            tables: self.tables.clone(),
            joins: self.joins.clone(),
            where_: self.conditions.clone(),
            group_by: self.group.clone(),
            having: self.having.clone(),
            order_by: self.order.clone(),
            limit,
            for_update: self.for_update,
        }))
    }

    /// A query over the built statement, carrying the builder's binds, lock
    /// and cache settings.
    pub fn get_query(&self, manager: Arc<dyn ModelsManager>) -> Result<Query> {
        let mut query = Query::new(manager, self.get_statement()?);
        query
            .set_bind_params(self.bind.clone(), false)
            .set_bind_types(self.bind_types.clone(), false)
            .set_shared_lock(self.shared_lock);
        if let Some(cache) = &self.cache {
            query.cache(cache.clone());
        }
        Ok(query)
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
