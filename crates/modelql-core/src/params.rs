//! Find parameters and bound-parameter maps.

use crate::cache::CacheOptions;
use crate::ir::{Expr, OrderItem, SelectColumn};
use crate::value::{BindType, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Bound parameter values keyed by placeholder name (`"0"` for `?0`).
pub type BindParams = IndexMap<String, Value>;

/// Bind types keyed by placeholder name.
pub type BindTypes = IndexMap<String, BindType>;

/// How resultset rows are materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HydrateMode {
    /// Model records (plain rows for non-model selects)
    #[default]
    Records,
    /// Ordered attribute maps
    Arrays,
    /// JSON objects
    Objects,
}

/// Criteria for a `find`, `find_first` or `count`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindParameters {
    pub conditions: Option<Expr>,
    pub bind: BindParams,
    pub bind_types: BindTypes,
    pub columns: Option<Vec<SelectColumn>>,
    pub order: Vec<OrderItem>,
    pub group: Vec<Expr>,
    pub having: Option<Expr>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub for_update: bool,
    pub shared_lock: bool,
    pub cache: Option<CacheOptions>,
    pub hydration: Option<HydrateMode>,
}

impl FindParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameters holding only a condition.
    pub fn conditions(expr: Expr) -> Self {
        Self {
            conditions: Some(expr),
            ..Self::default()
        }
    }

    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.bind.insert(name.into(), value.into());
        self
    }

    pub fn bind_type(mut self, name: impl Into<String>, bind_type: BindType) -> Self {
        self.bind_types.insert(name.into(), bind_type);
        self
    }

    pub fn order(mut self, item: OrderItem) -> Self {
        self.order.push(item);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn hydration(mut self, mode: HydrateMode) -> Self {
        self.hydration = Some(mode);
        self
    }

    /// Conjunction-merge `other` into `self`.
    ///
    /// Conditions of both sides are AND-combined with each side wrapped in
    /// parentheses, bind values and bind types are merged key by key with
    /// `other` winning on collisions, and every other setting of `other`
    /// overrides `self` when present.
    pub fn merge(mut self, other: FindParameters) -> FindParameters {
        self.conditions = match (self.conditions.take(), other.conditions) {
            (Some(a), Some(b)) => Some(a.paren().and(b.paren())),
            (Some(a), None) => Some(a),
            (None, b) => b,
        };
        self.bind.extend(other.bind);
        self.bind_types.extend(other.bind_types);
        if other.columns.is_some() {
            self.columns = other.columns;
        }
        if !other.order.is_empty() {
            self.order = other.order;
        }
        if !other.group.is_empty() {
            self.group = other.group;
        }
        if other.having.is_some() {
            self.having = other.having;
        }
        if other.limit.is_some() {
            self.limit = other.limit;
        }
        if other.offset.is_some() {
            self.offset = other.offset;
        }
        if other.for_update {
            self.for_update = true;
        }
        if other.shared_lock {
            self.shared_lock = true;
        }
        if other.cache.is_some() {
            self.cache = other.cache;
        }
        if other.hydration.is_some() {
            self.hydration = other.hydration;
        }
        self
    }

    /// Feed a structural hash of the parameters into `hasher`.
    pub fn hash_into(&self, hasher: &mut impl Hasher) {
        self.conditions.hash(hasher);
        self.bind.len().hash(hasher);
        for (name, value) in &self.bind {
            name.hash(hasher);
            value.hash_into(hasher);
        }
        self.bind_types.len().hash(hasher);
        for (name, bind_type) in &self.bind_types {
            name.hash(hasher);
            bind_type.code().hash(hasher);
        }
        self.columns.hash(hasher);
        self.order.hash(hasher);
        self.group.hash(hasher);
        self.having.hash(hasher);
        self.limit.hash(hasher);
        self.offset.hash(hasher);
        self.for_update.hash(hasher);
        self.shared_lock.hash(hasher);
        self.hydration.hash(hasher);
    }

    /// Structural fingerprint of `(model, parameters, method)`.
    pub fn fingerprint(&self, model: &str, method: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        model.to_lowercase().hash(&mut hasher);
        self.hash_into(&mut hasher);
        method.hash(&mut hasher);
        hasher.finish()
    }
}

impl From<Expr> for FindParameters {
    fn from(expr: Expr) -> Self {
        FindParameters::conditions(expr)
    }
}
