//! Fetching the records on the other side of a relation.

use crate::finder::{count_columns, row_count};
use crate::manager::RelationManager;
use modelql_core::ir::Expr;
use modelql_core::{
    BindParams, BindTypes, Error, FindParameters, Record, Relation, RelationErrorKind,
    RelationKind, Result,
};
use modelql_query::{QueryBuilder, ResultRow, Resultset};
use tracing::debug;

/// Prefix of the placeholders bound to the owner's field values.
const RELATION_PARAM_PREFIX: &str = "APR";

/// Which finder method loads the related records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetrieveMethod {
    FindFirst,
    Find,
    Count,
}

impl RetrieveMethod {
    pub const fn name(self) -> &'static str {
        match self {
            RetrieveMethod::FindFirst => "findFirst",
            RetrieveMethod::Find => "find",
            RetrieveMethod::Count => "count",
        }
    }

    /// Method used when the caller does not pick one.
    pub const fn for_kind(kind: RelationKind) -> Self {
        match kind {
            RelationKind::BelongsTo | RelationKind::HasOne | RelationKind::HasOneThrough => {
                RetrieveMethod::FindFirst
            }
            RelationKind::HasMany | RelationKind::HasManyThrough => RetrieveMethod::Find,
        }
    }
}

/// Related records, in the form the retrieve method produces.
#[derive(Debug)]
pub enum RelationRecords {
    One(Option<ResultRow>),
    Many(Resultset),
    Count(i64),
}

impl RelationRecords {
    pub fn into_one(self) -> Option<ResultRow> {
        match self {
            RelationRecords::One(row) => row,
            _ => None,
        }
    }

    pub fn into_many(self) -> Option<Resultset> {
        match self {
            RelationRecords::Many(resultset) => Some(resultset),
            _ => None,
        }
    }

    pub fn count(&self) -> Option<i64> {
        match self {
            RelationRecords::Count(count) => Some(*count),
            _ => None,
        }
    }
}

impl RelationManager {
    /// Records related to `owner` through `relation`.
    ///
    /// Direct relations go through the model finder, with the relation's own
    /// parameters AND-combined with the caller's. Through relations are
    /// fetched with a join over the intermediate model and only support
    /// single-field keys.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(owner = owner.model(), referenced = relation.referenced_model(), kind = relation.kind().name())
    )]
    pub fn get_relation_records(
        &self,
        relation: &Relation,
        owner: &Record,
        params: Option<FindParameters>,
        method: Option<RetrieveMethod>,
    ) -> Result<RelationRecords> {
        let params = params.unwrap_or_default();
        let method = method.unwrap_or_else(|| RetrieveMethod::for_kind(relation.kind()));
        if relation.is_through() {
            return self.through_records(relation, owner, params, method);
        }

        let mut conditions: Option<Expr> = None;
        let mut bind = BindParams::new();
        for (position, (field, referenced)) in relation
            .fields()
            .iter()
            .zip(relation.referenced_fields().iter())
            .enumerate()
        {
            let placeholder = format!("{}{}", RELATION_PARAM_PREFIX, position);
            let condition = Expr::column(referenced).equals(Expr::named(placeholder.clone()));
            conditions = Some(match conditions {
                Some(current) => current.and(condition),
                None => condition,
            });
            bind.insert(placeholder, owner.read_attribute(field));
        }

        let own = FindParameters {
            conditions,
            bind,
            ..FindParameters::default()
        };
        let mut merged = self.merge_find_parameters(own, params);
        if let Some(extra) = relation.params() {
            merged = self.merge_find_parameters(extra, merged);
        }

        let referenced = relation.referenced_model();
        let key = relation
            .is_reusable()
            .then(|| merged.fingerprint(referenced, method.name()));
        if let Some(key) = key {
            if let Some(records) = self.get_reusable_records(referenced, key) {
                debug!(method = method.name(), "related records served from memo");
                return Ok(records);
            }
        }

        let finder = self.model_finder();
        let mut records = match method {
            RetrieveMethod::FindFirst => RelationRecords::One(finder.find_first(self, referenced, merged)?),
            RetrieveMethod::Find => RelationRecords::Many(finder.find(self, referenced, merged)?),
            RetrieveMethod::Count => RelationRecords::Count(finder.count(self, referenced, merged)?),
        };
        if let Some(key) = key {
            self.set_reusable_records(referenced, key, &mut records)?;
        }
        Ok(records)
    }

    fn through_records(
        &self,
        relation: &Relation,
        owner: &Record,
        params: FindParameters,
        method: RetrieveMethod,
    ) -> Result<RelationRecords> {
        let not_supported = || Error::relation(RelationErrorKind::NotSupported, "Not supported");
        let intermediate = relation.intermediate().ok_or_else(not_supported)?;
        let (Some(field), Some(intermediate_field), Some(intermediate_referenced), Some(referenced_field)) = (
            relation.fields().single(),
            intermediate.fields.single(),
            intermediate.referenced_fields.single(),
            relation.referenced_fields().single(),
        ) else {
            return Err(not_supported());
        };

        let referenced = relation.referenced_model();
        let mut merged = params;
        if let Some(extra) = relation.params() {
            merged = self.merge_find_parameters(extra, merged);
        }

        let placeholder = format!("{}0", RELATION_PARAM_PREFIX);
        let mut builder = QueryBuilder::from_params(referenced, &merged)
            .inner_join(
                intermediate.model.clone(),
                Some(
                    Expr::qualified(intermediate.model.clone(), intermediate_referenced)
                        .equals(Expr::qualified(referenced, referenced_field)),
                ),
            )
            .and_where(
                Expr::qualified(intermediate.model.clone(), intermediate_field)
                    .equals(Expr::named(placeholder.clone())),
            )
            .bind(placeholder, owner.read_attribute(field));

        let (binds, types) = (BindParams::new(), BindTypes::new());
        match method {
            RetrieveMethod::Count => {
                builder = count_columns(builder);
                let row = self
                    .query_from_builder(&builder)?
                    .get_single_result(&binds, &types)?;
                Ok(RelationRecords::Count(row_count(row.as_ref())))
            }
            RetrieveMethod::FindFirst => {
                let mut query = self.query_from_builder(&builder.limit(1))?;
                query.set_unique_row(true);
                Ok(RelationRecords::One(query.get_single_result(&binds, &types)?))
            }
            RetrieveMethod::Find => {
                let hydration = builder.get_hydration();
                let mut resultset = self
                    .query_from_builder(&builder)?
                    .execute(&binds, &types)?
                    .into_resultset()
                    .ok_or_else(|| Error::config("The query did not return a resultset"))?;
                if let Some(mode) = hydration {
                    resultset.set_hydrate_mode(mode);
                }
                Ok(RelationRecords::Many(resultset))
            }
        }
    }
}
