//! Error types for ModelQL operations.
//!
//! Compilation, configuration and bind-shape problems are always surfaced as
//! an [`Error`]. Data-level mutation failures (a record refusing to update or
//! delete) are not errors; they travel as `Status` values or boolean results
//! carrying the offending record's messages.

use crate::record::Record;
use std::fmt;

/// The primary error type for all ModelQL operations.
#[derive(Debug)]
pub enum Error {
    /// Missing container/service, invalid injected service, unknown model class
    Config(ConfigError),
    /// Invalid relation declaration
    Relation(RelationError),
    /// Statement compilation failed
    Compile(CompileError),
    /// Bound parameters do not fit their placeholders
    Bind(BindError),
    /// Driver-level query failure
    Query(QueryError),
    /// Transaction state errors
    Transaction(TransactionError),
    /// A transaction was rolled back and asked to raise
    TransactionFailed(TransactionFailed),
    /// Resultset access errors
    Resultset(ResultsetError),
    /// Cache backend errors
    Cache(CacheError),
    /// Type conversion errors
    Type(TypeError),
    /// Metadata read/write errors
    MetaData(String),
    /// Serialization/deserialization errors
    Serde(String),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone)]
pub struct RelationError {
    pub kind: RelationErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationErrorKind {
    /// Compound key cardinalities differ
    FieldCount,
    /// Alias option is not a usable string
    InvalidAlias,
    /// The intermediate triple was set twice
    IntermediateAlreadySet,
    /// Relation shape the fetcher cannot express
    NotSupported,
    /// Relation referenced by name does not exist
    NotFound,
}

#[derive(Debug, Clone)]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    /// A required IR section is missing or malformed
    CorruptedIr,
    /// Domain does not name a model or alias in scope
    UnknownAlias,
    /// Column cannot be attributed to any model
    UnknownColumn,
    /// Column matches more than one model
    AmbiguousColumn,
    /// Alias declared twice in the same statement
    DuplicateAlias,
    /// More than one relation between two joined models
    AmbiguousRelation,
    /// Eager-load target has no relation
    MissingRelation,
    /// Compound key cardinalities differ in a join
    FieldCount,
    /// Shape the compiler cannot express
    NotSupported,
    /// Attribute not part of the target model
    UnknownAttribute,
    /// Models from different database systems mixed in one statement
    MixedDatabaseSystems,
    /// Statement kind the executor cannot handle
    UnknownStatement,
}

#[derive(Debug, Clone)]
pub struct BindError {
    pub kind: BindErrorKind,
    pub placeholder: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindErrorKind {
    /// No value was bound for a placeholder that requires one
    Missing,
    /// Array placeholder bound to a scalar
    NotArray,
    /// Array placeholder bound to an empty array
    EmptyArray,
    /// Typed placeholder with an unknown type name
    UnknownType,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Connection lost or unusable
    Connection,
    /// Other database error
    Database,
}

#[derive(Debug, Clone)]
pub struct TransactionError {
    pub kind: TransactionErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionErrorKind {
    /// Commit or rollback without an active transaction
    NotActive,
    /// Nested transaction not supported by the connection
    NestedNotSupported,
}

/// Raised by a transaction configured to throw on rollback.
#[derive(Debug, Clone)]
pub struct TransactionFailed {
    pub message: String,
    pub record: Option<Box<Record>>,
}

#[derive(Debug, Clone)]
pub struct ResultsetError {
    pub kind: ResultsetErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultsetErrorKind {
    /// Index outside `[0, count)`
    OutOfRange,
    /// Write through the array-like interface
    Immutable,
    /// Current row is not a model record
    InvalidRecord,
    /// Snapshot could not be restored
    InvalidSnapshot,
}

#[derive(Debug, Clone)]
pub struct CacheError {
    pub message: String,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            message: message.into(),
            source: None,
        })
    }

    pub fn relation(kind: RelationErrorKind, message: impl Into<String>) -> Self {
        Error::Relation(RelationError {
            kind,
            message: message.into(),
        })
    }

    pub fn compile(kind: CompileErrorKind, message: impl Into<String>) -> Self {
        Error::Compile(CompileError {
            kind,
            message: message.into(),
        })
    }

    pub fn bind(
        kind: BindErrorKind,
        placeholder: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Bind(BindError {
            kind,
            placeholder: placeholder.into(),
            message: message.into(),
        })
    }

    pub fn resultset(kind: ResultsetErrorKind, message: impl Into<String>) -> Self {
        Error::Resultset(ResultsetError {
            kind,
            message: message.into(),
        })
    }

    pub fn transaction(kind: TransactionErrorKind, message: impl Into<String>) -> Self {
        Error::Transaction(TransactionError {
            kind,
            message: message.into(),
        })
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Error::Cache(CacheError {
            message: message.into(),
        })
    }

    /// Kind of a compilation error, if this is one.
    pub fn compile_kind(&self) -> Option<CompileErrorKind> {
        match self {
            Error::Compile(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Kind of a relation declaration error, if this is one.
    pub fn relation_kind(&self) -> Option<RelationErrorKind> {
        match self {
            Error::Relation(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Kind of a bind error, if this is one.
    pub fn bind_kind(&self) -> Option<BindErrorKind> {
        match self {
            Error::Bind(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }

    /// The bare message, without the category prefix used by `Display`.
    pub fn message(&self) -> String {
        match self {
            Error::Config(e) => e.message.clone(),
            Error::Relation(e) => e.message.clone(),
            Error::Compile(e) => e.message.clone(),
            Error::Bind(e) => e.message.clone(),
            Error::Query(e) => e.message.clone(),
            Error::Transaction(e) => e.message.clone(),
            Error::TransactionFailed(e) => e.message.clone(),
            Error::Resultset(e) => e.message.clone(),
            Error::Cache(e) => e.message.clone(),
            Error::Type(e) => e.to_string(),
            Error::MetaData(msg) | Error::Serde(msg) | Error::Custom(msg) => msg.clone(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Relation(e) => write!(f, "Relation error: {}", e.message),
            Error::Compile(e) => write!(f, "Compilation error: {}", e.message),
            Error::Bind(e) => write!(f, "Bind error: {}", e.message),
            Error::Query(e) => write!(f, "Query error: {}", e.message),
            Error::Transaction(e) => write!(f, "Transaction error: {}", e.message),
            Error::TransactionFailed(e) => write!(f, "Transaction failed: {}", e.message),
            Error::Resultset(e) => write!(f, "Resultset error: {}", e.message),
            Error::Cache(e) => write!(f, "Cache error: {}", e.message),
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::MetaData(msg) => write!(f, "Metadata error: {}", msg),
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<TransactionFailed> for Error {
    fn from(err: TransactionFailed) -> Self {
        Error::TransactionFailed(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

/// Result type alias for ModelQL operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_category() {
        let err = Error::compile(
            CompileErrorKind::AmbiguousColumn,
            "The column 'name' is ambiguous",
        );
        assert_eq!(
            err.to_string(),
            "Compilation error: The column 'name' is ambiguous"
        );
        assert_eq!(err.message(), "The column 'name' is ambiguous");
        assert_eq!(err.compile_kind(), Some(CompileErrorKind::AmbiguousColumn));
    }

    #[test]
    fn kind_accessors_only_match_their_category() {
        let err = Error::bind(BindErrorKind::EmptyArray, "ids", "empty");
        assert_eq!(err.bind_kind(), Some(BindErrorKind::EmptyArray));
        assert_eq!(err.compile_kind(), None);
        assert_eq!(err.relation_kind(), None);
    }

    #[test]
    fn query_error_exposes_sql() {
        let err = Error::Query(QueryError {
            kind: QueryErrorKind::Syntax,
            sql: Some("SELECT".to_string()),
            message: "syntax error".to_string(),
            source: None,
        });
        assert_eq!(err.sql(), Some("SELECT"));
    }
}
