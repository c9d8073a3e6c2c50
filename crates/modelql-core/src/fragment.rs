//! Dialect-independent SQL fragment tree.
//!
//! The compiler lowers a [`Statement`](crate::ir::Statement) into one of the
//! [`Intermediate`] variants. Column references are fully resolved to
//! `(sql alias, physical column)` pairs; the only SQL text inside the tree is
//! in literal leaves.

use crate::ir::{BinaryOp, JoinKind, SortDirection, StatementKind, UnaryOp};
use crate::relation::RelationKind;
use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A compiled statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Intermediate {
    Select(SelectFragment),
    Insert(InsertFragment),
    Update(UpdateFragment),
    Delete(DeleteFragment),
}

impl Intermediate {
    pub const fn kind(&self) -> StatementKind {
        match self {
            Intermediate::Select(_) => StatementKind::Select,
            Intermediate::Insert(_) => StatementKind::Insert,
            Intermediate::Update(_) => StatementKind::Update,
            Intermediate::Delete(_) => StatementKind::Delete,
        }
    }

    /// Names of the array placeholders (`{name:array}`) anywhere in the tree.
    pub fn array_placeholders(&self) -> HashSet<String> {
        let mut names = HashSet::new();
        match self {
            Intermediate::Select(select) => select.collect_array_placeholders(&mut names),
            Intermediate::Insert(insert) => {
                collect_values(&insert.values, &mut names);
            }
            Intermediate::Update(update) => {
                collect_values(&update.values, &mut names);
                collect_filter(update.where_.as_ref(), update.limit.as_ref(), &mut names);
            }
            Intermediate::Delete(delete) => {
                collect_filter(delete.where_.as_ref(), delete.limit.as_ref(), &mut names);
            }
        }
        names
    }
}

fn collect_values(values: &[ValueSpec], names: &mut HashSet<String>) {
    for value in values {
        if let ValueSpec::Expr(expr) = value {
            expr.collect_array_placeholders(names);
        }
    }
}

fn collect_filter(where_: Option<&SqlExpr>, limit: Option<&LimitFragment>, names: &mut HashSet<String>) {
    if let Some(where_) = where_ {
        where_.collect_array_placeholders(names);
    }
    if let Some(limit) = limit {
        limit.number.collect_array_placeholders(names);
        if let Some(offset) = &limit.offset {
            offset.collect_array_placeholders(names);
        }
    }
}

/// `source`, `schema.source` or `schema.source AS alias`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableSource {
    pub source: String,
    pub schema: Option<String>,
    pub alias: Option<String>,
}

impl TableSource {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            schema: None,
            alias: None,
        }
    }

    pub fn schema(mut self, schema: Option<String>) -> Self {
        self.schema = schema;
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Name the table is referenced by inside the statement.
    pub fn reference_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.source)
    }
}

/// Marks a column that exists only to eager-load a relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EagerTag {
    /// Alias of the model the relation starts from
    pub parent: String,
    pub kind: RelationKind,
}

/// A selected column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnSpec {
    /// A whole model, hydrated into a record
    Object {
        model: String,
        /// SQL alias of the table the attributes are read from
        column: String,
        balias: String,
        eager: Option<EagerTag>,
    },
    /// A single value
    Scalar {
        column: SqlExpr,
        balias: Option<String>,
        sql_alias: Option<String>,
        eager: Option<EagerTag>,
    },
}

impl ColumnSpec {
    pub fn is_object(&self) -> bool {
        matches!(self, ColumnSpec::Object { .. })
    }

    pub fn balias(&self) -> Option<&str> {
        match self {
            ColumnSpec::Object { balias, .. } => Some(balias),
            ColumnSpec::Scalar { balias, .. } => balias.as_deref(),
        }
    }

    pub fn eager(&self) -> Option<&EagerTag> {
        match self {
            ColumnSpec::Object { eager, .. } | ColumnSpec::Scalar { eager, .. } => eager.as_ref(),
        }
    }
}

/// Resolved expression nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlExpr {
    /// `domain.name`, or a bare column alias when `domain` is `None`
    Qualified { domain: Option<String>, name: String },
    /// Already-quoted literal text (`'abc'`, `12`, `NULL`, `TRUE`)
    Literal(String),
    /// Bound parameter; `times` is set for array placeholders and makes the
    /// dialect render `:name0, :name1, ...`
    Placeholder { name: String, times: Option<usize> },
    Binary {
        op: BinaryOp,
        left: Box<SqlExpr>,
        right: Box<SqlExpr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<SqlExpr>,
    },
    Between {
        expr: Box<SqlExpr>,
        low: Box<SqlExpr>,
        high: Box<SqlExpr>,
        negated: bool,
    },
    Function {
        name: String,
        args: Vec<SqlExpr>,
        distinct: bool,
    },
    List(Vec<SqlExpr>),
    Cast {
        expr: Box<SqlExpr>,
        ty: String,
    },
    Convert {
        expr: Box<SqlExpr>,
        charset: String,
    },
    Case {
        operand: Option<Box<SqlExpr>>,
        whens: Vec<(SqlExpr, SqlExpr)>,
        else_: Option<Box<SqlExpr>>,
    },
    Select(Box<SelectFragment>),
    Exists(Box<SelectFragment>),
    All(Box<SelectFragment>),
    Any(Box<SelectFragment>),
    Parentheses(Box<SqlExpr>),
    /// `*` or `domain.*`
    AllColumns(Option<String>),
}

impl SqlExpr {
    pub fn qualified(domain: impl Into<String>, name: impl Into<String>) -> Self {
        SqlExpr::Qualified {
            domain: Some(domain.into()),
            name: name.into(),
        }
    }

    pub fn equals(left: SqlExpr, right: SqlExpr) -> Self {
        SqlExpr::Binary {
            op: BinaryOp::Eq,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Add the names of array placeholders in this expression, subqueries
    /// included, to `names`.
    pub fn collect_array_placeholders(&self, names: &mut HashSet<String>) {
        match self {
            SqlExpr::Placeholder {
                name,
                times: Some(_),
            } => {
                names.insert(name.clone());
            }
            SqlExpr::Qualified { .. }
            | SqlExpr::Literal(_)
            | SqlExpr::Placeholder { .. }
            | SqlExpr::AllColumns(_) => {}
            SqlExpr::Binary { left, right, .. } => {
                left.collect_array_placeholders(names);
                right.collect_array_placeholders(names);
            }
            SqlExpr::Between { expr, low, high, .. } => {
                expr.collect_array_placeholders(names);
                low.collect_array_placeholders(names);
                high.collect_array_placeholders(names);
            }
            SqlExpr::Function { args, .. } | SqlExpr::List(args) => {
                for arg in args {
                    arg.collect_array_placeholders(names);
                }
            }
            SqlExpr::Unary { operand: expr, .. }
            | SqlExpr::Cast { expr, .. }
            | SqlExpr::Convert { expr, .. }
            | SqlExpr::Parentheses(expr) => expr.collect_array_placeholders(names),
            SqlExpr::Case {
                operand,
                whens,
                else_,
            } => {
                for expr in operand.iter().chain(else_.iter()) {
                    expr.collect_array_placeholders(names);
                }
                for (when, then) in whens {
                    when.collect_array_placeholders(names);
                    then.collect_array_placeholders(names);
                }
            }
            SqlExpr::Select(select)
            | SqlExpr::Exists(select)
            | SqlExpr::All(select)
            | SqlExpr::Any(select) => select.collect_array_placeholders(names),
        }
    }
}

impl SelectFragment {
    fn collect_array_placeholders(&self, names: &mut HashSet<String>) {
        for column in self.columns.values() {
            if let ColumnSpec::Scalar { column, .. } = column {
                column.collect_array_placeholders(names);
            }
        }
        for join in &self.joins {
            for condition in &join.conditions {
                condition.collect_array_placeholders(names);
            }
        }
        for expr in self.group.iter().chain(self.having.iter()) {
            expr.collect_array_placeholders(names);
        }
        for order in &self.order {
            order.expr.collect_array_placeholders(names);
        }
        collect_filter(self.where_.as_ref(), self.limit.as_ref(), names);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinFragment {
    pub kind: JoinKind,
    pub source: TableSource,
    /// AND-combined; empty for a join without conditions
    pub conditions: Vec<SqlExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFragment {
    pub expr: SqlExpr,
    pub direction: Option<SortDirection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitFragment {
    pub number: SqlExpr,
    pub offset: Option<SqlExpr>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectFragment {
    pub models: Vec<String>,
    pub tables: Vec<TableSource>,
    pub columns: IndexMap<String, ColumnSpec>,
    pub joins: Vec<JoinFragment>,
    pub where_: Option<SqlExpr>,
    pub group: Vec<SqlExpr>,
    pub having: Option<SqlExpr>,
    pub order: Vec<OrderFragment>,
    pub limit: Option<LimitFragment>,
    pub distinct: bool,
    pub for_update: bool,
}

/// A value of an INSERT or UPDATE, resolved at execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueSpec {
    /// String, integer, double or boolean literal
    Literal(Value),
    Null,
    /// Taken from the bound parameters under this name
    Placeholder(String),
    /// Any other expression, sent to the adapter as raw SQL
    Expr(SqlExpr),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertFragment {
    pub model: String,
    pub table: TableSource,
    /// `None` when the statement listed no fields
    pub fields: Option<Vec<String>>,
    pub values: Vec<ValueSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateFragment {
    pub models: Vec<String>,
    pub tables: Vec<TableSource>,
    /// Attribute names, parallel to `values`
    pub fields: Vec<String>,
    pub values: Vec<ValueSpec>,
    pub where_: Option<SqlExpr>,
    pub limit: Option<LimitFragment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteFragment {
    pub models: Vec<String>,
    pub tables: Vec<TableSource>,
    pub where_: Option<SqlExpr>,
    pub limit: Option<LimitFragment>,
}

/// One entry of the rendered select list.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderColumn {
    pub expr: SqlExpr,
    pub alias: Option<String>,
}

/// What a dialect receives to render a SELECT: the fragment plus the select
/// list expanded to physical columns.
#[derive(Debug, Clone, Copy)]
pub struct RenderSelect<'a> {
    pub fragment: &'a SelectFragment,
    pub columns: &'a [RenderColumn],
}
