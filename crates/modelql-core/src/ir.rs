//! Statement IR produced by the query-language parser.
//!
//! Every operator, literal and placeholder kind has its own variant, so the
//! compiler dispatches with exhaustive matches. The IR is serde-friendly to
//! let an external parser hand statements over as JSON.

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// A parsed statement.
#[derive(Debug, Clone, PartialEq, Hash, Serialize, Deserialize)]
pub enum Statement {
    Select(SelectStatement),
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
}

impl Statement {
    pub const fn kind(&self) -> StatementKind {
        match self {
            Statement::Select(_) => StatementKind::Select,
            Statement::Insert(_) => StatementKind::Insert,
            Statement::Update(_) => StatementKind::Update,
            Statement::Delete(_) => StatementKind::Delete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

/// `SELECT ... FROM ...`
#[derive(Debug, Clone, Default, PartialEq, Hash, Serialize, Deserialize)]
pub struct SelectStatement {
    pub distinct: bool,
    pub columns: Vec<SelectColumn>,
    pub tables: Vec<TableRef>,
    pub joins: Vec<Join>,
    pub where_: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<Limit>,
    pub for_update: bool,
}

impl SelectStatement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column(mut self, column: SelectColumn) -> Self {
        self.columns.push(column);
        self
    }

    pub fn from(mut self, table: TableRef) -> Self {
        self.tables.push(table);
        self
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    pub fn filter(mut self, expr: Expr) -> Self {
        self.where_ = Some(expr);
        self
    }

    pub fn group_by(mut self, expr: Expr) -> Self {
        self.group_by.push(expr);
        self
    }

    pub fn having(mut self, expr: Expr) -> Self {
        self.having = Some(expr);
        self
    }

    pub fn order_by(mut self, item: OrderItem) -> Self {
        self.order_by.push(item);
        self
    }

    pub fn limit(mut self, limit: Limit) -> Self {
        self.limit = Some(limit);
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
}

/// A model in the FROM list, optionally aliased and with eager-load names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub model: String,
    pub alias: Option<String>,
    pub with: Vec<String>,
}

impl TableRef {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            alias: None,
            with: Vec::new(),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Eager-load a relation (alias or referenced model name).
    pub fn with(mut self, relation: impl Into<String>) -> Self {
        self.with.push(relation.into());
        self
    }
}

/// One entry of the select list.
#[derive(Debug, Clone, PartialEq, Hash, Serialize, Deserialize)]
pub enum SelectColumn {
    /// `*`
    All,
    /// `alias.*`
    AllOf(String),
    /// A scalar expression, optionally aliased
    Expr { expr: Expr, alias: Option<String> },
}

impl SelectColumn {
    pub fn expr(expr: Expr) -> Self {
        SelectColumn::Expr { expr, alias: None }
    }

    pub fn aliased(expr: Expr, alias: impl Into<String>) -> Self {
        SelectColumn::Expr {
            expr,
            alias: Some(alias.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Cross,
    FullOuter,
}

impl JoinKind {
    pub const fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Cross => "CROSS JOIN",
            JoinKind::FullOuter => "FULL OUTER JOIN",
        }
    }
}

/// An explicit JOIN clause. A join without `conditions` is a candidate for
/// implicit condition synthesis from declared relations.
#[derive(Debug, Clone, PartialEq, Hash, Serialize, Deserialize)]
pub struct Join {
    pub kind: JoinKind,
    pub model: String,
    pub alias: Option<String>,
    pub conditions: Option<Expr>,
}

impl Join {
    pub fn new(kind: JoinKind, model: impl Into<String>) -> Self {
        Self {
            kind,
            model: model.into(),
            alias: None,
            conditions: None,
        }
    }

    pub fn inner(model: impl Into<String>) -> Self {
        Self::new(JoinKind::Inner, model)
    }

    pub fn left(model: impl Into<String>) -> Self {
        Self::new(JoinKind::Left, model)
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn on(mut self, conditions: Expr) -> Self {
        self.conditions = Some(conditions);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Hash, Serialize, Deserialize)]
pub struct OrderItem {
    pub expr: Expr,
    pub direction: Option<SortDirection>,
}

impl OrderItem {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            direction: Some(SortDirection::Asc),
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            direction: Some(SortDirection::Desc),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Hash, Serialize, Deserialize)]
pub struct Limit {
    pub number: Expr,
    pub offset: Option<Expr>,
}

impl Limit {
    pub fn new(number: i64) -> Self {
        Self {
            number: Expr::int(number),
            offset: None,
        }
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(Expr::int(offset));
        self
    }
}

/// `INSERT INTO Model (fields) VALUES (values)`
#[derive(Debug, Clone, PartialEq, Hash, Serialize, Deserialize)]
pub struct InsertStatement {
    pub model: String,
    /// Empty means every attribute of the model, in metadata order
    pub fields: Vec<String>,
    pub values: Vec<Expr>,
}

/// `UPDATE Model SET column = value, ... [WHERE] [LIMIT]`
#[derive(Debug, Clone, PartialEq, Hash, Serialize, Deserialize)]
pub struct UpdateStatement {
    pub tables: Vec<TableRef>,
    pub values: Vec<Assignment>,
    pub where_: Option<Expr>,
    pub limit: Option<Limit>,
}

#[derive(Debug, Clone, PartialEq, Hash, Serialize, Deserialize)]
pub struct Assignment {
    pub column: Expr,
    pub value: Expr,
}

/// `DELETE FROM Model [WHERE] [LIMIT]`
#[derive(Debug, Clone, PartialEq, Hash, Serialize, Deserialize)]
pub struct DeleteStatement {
    pub tables: Vec<TableRef>,
    pub where_: Option<Expr>,
    pub limit: Option<Limit>,
}

/// Literal values as written in the statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    String(String),
    Integer(i64),
    Double(f64),
    Bool(bool),
    Null,
}

impl Hash for Literal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Literal::String(s) => s.hash(state),
            Literal::Integer(i) => i.hash(state),
            Literal::Double(f) => f.to_bits().hash(state),
            Literal::Bool(b) => b.hash(state),
            Literal::Null => {}
        }
    }
}

/// Placeholder forms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Placeholder {
    /// `?0`
    Numeric(usize),
    /// `:name:`
    Named(String),
    /// `{name}` or `{name:type}`; the type is validated at compile time
    Typed { name: String, bind_type: Option<String> },
}

impl Placeholder {
    /// Key under which the value is bound.
    pub fn name(&self) -> String {
        match self {
            Placeholder::Numeric(n) => n.to_string(),
            Placeholder::Named(name) | Placeholder::Typed { name, .. } => name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Like,
    NotLike,
    ILike,
    NotILike,
    In,
    NotIn,
    Against,
}

impl BinaryOp {
    pub const fn as_sql(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Like => "LIKE",
            BinaryOp::NotLike => "NOT LIKE",
            BinaryOp::ILike => "ILIKE",
            BinaryOp::NotILike => "NOT ILIKE",
            BinaryOp::In => "IN",
            BinaryOp::NotIn => "NOT IN",
            BinaryOp::Against => "AGAINST",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Minus,
    BitNot,
    IsNull,
    IsNotNull,
}

/// Expression nodes.
#[derive(Debug, Clone, PartialEq, Hash, Serialize, Deserialize)]
pub enum Expr {
    /// Column reference, `name` or `domain.name`
    Column {
        name: String,
        domain: Option<String>,
    },
    Literal(Literal),
    Placeholder(Placeholder),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    Function {
        name: String,
        args: Vec<Expr>,
        distinct: bool,
    },
    Cast {
        expr: Box<Expr>,
        ty: String,
    },
    Convert {
        expr: Box<Expr>,
        charset: String,
    },
    Case {
        operand: Option<Box<Expr>>,
        whens: Vec<(Expr, Expr)>,
        else_: Option<Box<Expr>>,
    },
    List(Vec<Expr>),
    Subquery(Box<SelectStatement>),
    Exists(Box<SelectStatement>),
    All(Box<SelectStatement>),
    Any(Box<SelectStatement>),
    Parentheses(Box<Expr>),
    /// `*` inside a function call, e.g. `COUNT(*)`
    Star,
}

impl Expr {
    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column {
            name: name.into(),
            domain: None,
        }
    }

    pub fn qualified(domain: impl Into<String>, name: impl Into<String>) -> Self {
        Expr::Column {
            name: name.into(),
            domain: Some(domain.into()),
        }
    }

    pub fn int(value: i64) -> Self {
        Expr::Literal(Literal::Integer(value))
    }

    pub fn double(value: f64) -> Self {
        Expr::Literal(Literal::Double(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expr::Literal(Literal::String(value.into()))
    }

    pub fn boolean(value: bool) -> Self {
        Expr::Literal(Literal::Bool(value))
    }

    pub fn null() -> Self {
        Expr::Literal(Literal::Null)
    }

    /// `:name:`
    pub fn named(name: impl Into<String>) -> Self {
        Expr::Placeholder(Placeholder::Named(name.into()))
    }

    /// `?n`
    pub fn numeric(n: usize) -> Self {
        Expr::Placeholder(Placeholder::Numeric(n))
    }

    /// `{name:type}`
    pub fn typed(name: impl Into<String>, bind_type: impl Into<String>) -> Self {
        Expr::Placeholder(Placeholder::Typed {
            name: name.into(),
            bind_type: Some(bind_type.into()),
        })
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn equals(self, other: Expr) -> Self {
        Expr::binary(BinaryOp::Eq, self, other)
    }

    pub fn and(self, other: Expr) -> Self {
        Expr::binary(BinaryOp::And, self, other)
    }

    pub fn or(self, other: Expr) -> Self {
        Expr::binary(BinaryOp::Or, self, other)
    }

    pub fn func(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Function {
            name: name.into(),
            args,
            distinct: false,
        }
    }

    pub fn paren(self) -> Self {
        Expr::Parentheses(Box::new(self))
    }

    pub fn subquery(select: SelectStatement) -> Self {
        Expr::Subquery(Box::new(select))
    }
}
