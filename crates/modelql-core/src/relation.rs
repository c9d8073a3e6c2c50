//! Relation metadata between model classes.
//!
//! A [`Relation`] is an immutable value registered once by the relation
//! manager and shared as `Arc<Relation>` by the compiler (implicit joins,
//! eager loading) and the relation fetcher. The only state that may be
//! filled in after construction is the intermediate triple of a through
//! relation, and only once.

use crate::Result;
use crate::error::{Error, RelationErrorKind};
use crate::params::FindParameters;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// The type of association between two models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    /// Many-to-one: a `RobotsParts` row belongs to one `Robots` row.
    BelongsTo,
    /// One-to-one from the referenced side.
    HasOne,
    /// One-to-many: a `Customers` row has many `Invoices`.
    HasMany,
    /// One-to-one through an intermediate model.
    HasOneThrough,
    /// Many-to-many through an intermediate model.
    HasManyThrough,
}

impl RelationKind {
    pub const fn is_through(self) -> bool {
        matches!(self, RelationKind::HasOneThrough | RelationKind::HasManyThrough)
    }

    pub const fn name(self) -> &'static str {
        match self {
            RelationKind::BelongsTo => "belongsTo",
            RelationKind::HasOne => "hasOne",
            RelationKind::HasMany => "hasMany",
            RelationKind::HasOneThrough => "hasOneThrough",
            RelationKind::HasManyThrough => "hasManyToMany",
        }
    }
}

/// A single field or an ordered compound key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Fields {
    Single(String),
    Compound(Vec<String>),
}

impl Fields {
    pub fn len(&self) -> usize {
        match self {
            Fields::Single(_) => 1,
            Fields::Compound(fields) => fields.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_compound(&self) -> bool {
        matches!(self, Fields::Compound(_))
    }

    /// The field name when this is not a compound key.
    pub fn single(&self) -> Option<&str> {
        match self {
            Fields::Single(field) => Some(field),
            Fields::Compound(_) => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let slice: &[String] = match self {
            Fields::Single(field) => std::slice::from_ref(field),
            Fields::Compound(fields) => fields,
        };
        slice.iter().map(String::as_str)
    }

    pub fn get(&self, position: usize) -> Option<&str> {
        self.iter().nth(position)
    }
}

impl From<&str> for Fields {
    fn from(field: &str) -> Self {
        Fields::Single(field.to_string())
    }
}

impl From<String> for Fields {
    fn from(field: String) -> Self {
        Fields::Single(field)
    }
}

impl From<Vec<String>> for Fields {
    fn from(fields: Vec<String>) -> Self {
        Fields::Compound(fields)
    }
}

impl From<Vec<&str>> for Fields {
    fn from(fields: Vec<&str>) -> Self {
        Fields::Compound(fields.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Fields {
    fn from(fields: [&str; N]) -> Self {
        Fields::Compound(fields.iter().map(|f| (*f).to_string()).collect())
    }
}

impl fmt::Display for Fields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fields::Single(field) => f.write_str(field),
            Fields::Compound(fields) => write!(f, "[{}]", fields.join(", ")),
        }
    }
}

/// What the database does to dependents of a deleted row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForeignKeyAction {
    #[default]
    Restrict,
    Cascade,
    None,
}

/// Virtual foreign key settings of a relation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub message: Option<String>,
    pub allow_nulls: bool,
    pub action: ForeignKeyAction,
}

/// Extra find parameters always applied when fetching through a relation.
#[derive(Clone)]
pub enum RelationParams {
    Static(FindParameters),
    Dynamic(Arc<dyn Fn() -> FindParameters + Send + Sync>),
}

impl RelationParams {
    pub fn resolve(&self) -> FindParameters {
        match self {
            RelationParams::Static(params) => params.clone(),
            RelationParams::Dynamic(f) => f(),
        }
    }
}

impl fmt::Debug for RelationParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationParams::Static(params) => f.debug_tuple("Static").field(params).finish(),
            RelationParams::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// Options given when a relation is declared.
#[derive(Debug, Clone, Default)]
pub struct RelationOptions {
    pub alias: Option<String>,
    pub reusable: bool,
    pub foreign_key: Option<ForeignKey>,
    pub params: Option<RelationParams>,
    /// Options this crate does not interpret
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RelationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn reusable(mut self, reusable: bool) -> Self {
        self.reusable = reusable;
        self
    }

    pub fn foreign_key(mut self, foreign_key: ForeignKey) -> Self {
        self.foreign_key = Some(foreign_key);
        self
    }

    pub fn params(mut self, params: FindParameters) -> Self {
        self.params = Some(RelationParams::Static(params));
        self
    }

    pub fn params_with<F>(mut self, f: F) -> Self
    where
        F: Fn() -> FindParameters + Send + Sync + 'static,
    {
        self.params = Some(RelationParams::Dynamic(Arc::new(f)));
        self
    }

    /// Read options from a JSON object.
    ///
    /// `alias` must be a string, `reusable` a boolean, and `foreignKey`
    /// either `true` or an object with `message`, `allowNulls` and `action`.
    /// Unknown keys are kept in `extra`; `params` is read as find parameters.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let Some(map) = value.as_object() else {
            return Ok(Self::default());
        };
        let mut options = Self::default();
        for (key, value) in map {
            match key.as_str() {
                "alias" => match value {
                    serde_json::Value::String(alias) => options.alias = Some(alias.clone()),
                    _ => {
                        return Err(Error::relation(
                            RelationErrorKind::InvalidAlias,
                            "Relation alias must be a string",
                        ));
                    }
                },
                "reusable" => options.reusable = value.as_bool().unwrap_or(false),
                "foreignKey" => {
                    options.foreign_key = match value {
                        serde_json::Value::Bool(true) => Some(ForeignKey::default()),
                        serde_json::Value::Object(fk) => Some(ForeignKey {
                            message: fk
                                .get("message")
                                .and_then(|m| m.as_str())
                                .map(str::to_string),
                            allow_nulls: fk
                                .get("allowNulls")
                                .and_then(serde_json::Value::as_bool)
                                .unwrap_or(false),
                            action: match fk.get("action").and_then(serde_json::Value::as_i64) {
                                Some(2) => ForeignKeyAction::Cascade,
                                Some(0) => ForeignKeyAction::None,
                                _ => ForeignKeyAction::Restrict,
                            },
                        }),
                        _ => None,
                    };
                }
                "params" => {
                    let params: FindParameters = serde_json::from_value(value.clone())?;
                    options.params = Some(RelationParams::Static(params));
                }
                _ => {
                    options.extra.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(options)
    }
}

/// The model and keys a through relation passes through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intermediate {
    pub model: String,
    pub fields: Fields,
    pub referenced_fields: Fields,
}

/// A declared association from one model to another.
#[derive(Debug)]
pub struct Relation {
    kind: RelationKind,
    referenced_model: String,
    fields: Fields,
    referenced_fields: Fields,
    options: RelationOptions,
    intermediate: OnceLock<Intermediate>,
}

impl Relation {
    pub fn new(
        kind: RelationKind,
        referenced_model: impl Into<String>,
        fields: Fields,
        referenced_fields: Fields,
        options: RelationOptions,
    ) -> Self {
        Self {
            kind,
            referenced_model: referenced_model.into(),
            fields,
            referenced_fields,
            options,
            intermediate: OnceLock::new(),
        }
    }

    /// Set the intermediate model of a through relation. Fails if it was
    /// already set.
    pub fn set_intermediate_relation(
        &self,
        model: impl Into<String>,
        fields: Fields,
        referenced_fields: Fields,
    ) -> Result<()> {
        self.intermediate
            .set(Intermediate {
                model: model.into(),
                fields,
                referenced_fields,
            })
            .map_err(|_| {
                Error::relation(
                    RelationErrorKind::IntermediateAlreadySet,
                    "The intermediate relation was already set",
                )
            })
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    pub fn referenced_model(&self) -> &str {
        &self.referenced_model
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn referenced_fields(&self) -> &Fields {
        &self.referenced_fields
    }

    pub fn options(&self) -> &RelationOptions {
        &self.options
    }

    /// A single option by its declared name.
    pub fn option(&self, name: &str) -> Option<serde_json::Value> {
        match name {
            "alias" => self.options.alias.clone().map(serde_json::Value::String),
            "reusable" => Some(serde_json::Value::Bool(self.options.reusable)),
            "foreignKey" => self
                .options
                .foreign_key
                .as_ref()
                .and_then(|fk| serde_json::to_value(fk).ok()),
            _ => self.options.extra.get(name).cloned(),
        }
    }

    pub fn alias(&self) -> Option<&str> {
        self.options.alias.as_deref()
    }

    pub fn is_reusable(&self) -> bool {
        self.options.reusable
    }

    pub fn is_through(&self) -> bool {
        self.kind.is_through()
    }

    pub fn is_foreign_key(&self) -> bool {
        self.options.foreign_key.is_some()
    }

    pub fn foreign_key(&self) -> Option<&ForeignKey> {
        self.options.foreign_key.as_ref()
    }

    /// Extra find parameters, evaluating a closure if one was given.
    pub fn params(&self) -> Option<FindParameters> {
        self.options.params.as_ref().map(RelationParams::resolve)
    }

    pub fn intermediate(&self) -> Option<&Intermediate> {
        self.intermediate.get()
    }

    pub fn intermediate_model(&self) -> Option<&str> {
        self.intermediate.get().map(|i| i.model.as_str())
    }

    pub fn intermediate_fields(&self) -> Option<&Fields> {
        self.intermediate.get().map(|i| &i.fields)
    }

    pub fn intermediate_referenced_fields(&self) -> Option<&Fields> {
        self.intermediate.get().map(|i| &i.referenced_fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Expr;

    #[test]
    fn intermediate_is_set_once() {
        let relation = Relation::new(
            RelationKind::HasManyThrough,
            "Parts",
            "id".into(),
            "id".into(),
            RelationOptions::new(),
        );
        relation
            .set_intermediate_relation("RobotsParts", "robots_id".into(), "parts_id".into())
            .unwrap();
        assert_eq!(relation.intermediate_model(), Some("RobotsParts"));
        let err = relation
            .set_intermediate_relation("Other", "a".into(), "b".into())
            .unwrap_err();
        assert_eq!(
            err.relation_kind(),
            Some(RelationErrorKind::IntermediateAlreadySet)
        );
        assert_eq!(relation.intermediate_model(), Some("RobotsParts"));
    }

    #[test]
    fn options_from_json() {
        let options = RelationOptions::from_json(&serde_json::json!({
            "alias": "parts",
            "reusable": true,
            "foreignKey": {"message": "missing part", "action": 2},
            "custom": 5
        }))
        .unwrap();
        assert_eq!(options.alias.as_deref(), Some("parts"));
        assert!(options.reusable);
        let fk = options.foreign_key.unwrap();
        assert_eq!(fk.action, ForeignKeyAction::Cascade);
        assert_eq!(options.extra.get("custom"), Some(&serde_json::json!(5)));
    }

    #[test]
    fn non_string_alias_is_rejected() {
        let err = RelationOptions::from_json(&serde_json::json!({"alias": 10})).unwrap_err();
        assert_eq!(err.message(), "Relation alias must be a string");
    }

    #[test]
    fn dynamic_params_are_evaluated_on_access() {
        let relation = Relation::new(
            RelationKind::HasMany,
            "Invoices",
            "id".into(),
            "cst_id".into(),
            RelationOptions::new()
                .params_with(|| FindParameters::conditions(Expr::column("status").equals(Expr::string("A")))),
        );
        let params = relation.params().unwrap();
        assert!(params.conditions.is_some());
        assert_eq!(relation.option("reusable"), Some(serde_json::Value::Bool(false)));
    }

    #[test]
    fn compound_fields() {
        let fields: Fields = ["a", "b"].into();
        assert!(fields.is_compound());
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.get(1), Some("b"));
        assert_eq!(fields.to_string(), "[a, b]");
    }
}
