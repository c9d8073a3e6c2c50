//! SELECT compilation.

use super::{CompilationScope, Compiler, corrupted, lcfirst};
use modelql_core::error::CompileErrorKind;
use modelql_core::fragment::{
    ColumnSpec, EagerTag, LimitFragment, OrderFragment, SelectFragment,
};
use modelql_core::ir::{Expr, Join, Limit, SelectColumn, SelectStatement};
use modelql_core::relation::Relation;
use modelql_core::{Error, Result};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;

/// An entry of the select list before resolution.
enum PendingColumn<'s> {
    User(&'s SelectColumn),
    /// Hidden `AAn.*` column of an eager-loaded relation
    Eager {
        domain: String,
        balias: String,
        tag: EagerTag,
    },
}

impl Compiler<'_> {
    pub(crate) fn prepare_select(
        &mut self,
        select: &SelectStatement,
        scope: &mut CompilationScope,
    ) -> Result<SelectFragment> {
        if select.tables.is_empty() || select.columns.is_empty() {
            return Err(corrupted("SELECT"));
        }

        let mut pending: Vec<PendingColumn<'_>> =
            select.columns.iter().map(PendingColumn::User).collect();
        let mut declared = HashSet::new();
        let mut models = Vec::with_capacity(select.tables.len());
        let mut tables = Vec::with_capacity(select.tables.len());
        let mut automatic_joins = Vec::new();
        let mut eager_number = 0;

        for table in &select.tables {
            let (model, source) = self.register_table(table, scope, &mut declared)?;
            let parent = source.reference_name().to_string();

            for with in &table.with {
                let relation = self.eager_relation(&model, with)?;
                let join_alias = format!("AA{}", eager_number);
                eager_number += 1;

                pending.push(PendingColumn::Eager {
                    domain: join_alias.clone(),
                    balias: relation.alias().unwrap_or(with).to_string(),
                    tag: EagerTag {
                        parent: parent.clone(),
                        kind: relation.kind(),
                    },
                });
                automatic_joins.push(Join::inner(relation.referenced_model()).alias(join_alias));
            }

            models.push(model);
            tables.push(source);
        }

        let joins = if select.joins.is_empty() && automatic_joins.is_empty() {
            Vec::new()
        } else {
            let all: Vec<Join> = select
                .joins
                .iter()
                .cloned()
                .chain(automatic_joins)
                .collect();
            self.get_joins(&models, &all, scope, &declared)?
        };

        let mut columns = IndexMap::new();
        let mut column_aliases = HashSet::new();
        let mut position = 0;
        for column in &pending {
            let user_alias = match column {
                PendingColumn::User(SelectColumn::Expr { alias, .. }) => alias.clone(),
                _ => None,
            };
            for spec in self.get_select_column(column, scope)? {
                let key = match &user_alias {
                    Some(alias) => {
                        column_aliases.insert(alias.clone());
                        alias.clone()
                    }
                    None => match spec.balias() {
                        Some(balias) => balias.to_string(),
                        None => format!("_{}", position),
                    },
                };
                let spec = match (spec, &user_alias) {
                    (ColumnSpec::Scalar { column, eager, .. }, Some(alias)) => ColumnSpec::Scalar {
                        column,
                        balias: Some(alias.clone()),
                        sql_alias: Some(alias.clone()),
                        eager,
                    },
                    (spec, _) => spec,
                };
                columns.insert(key, spec);
                position += 1;
            }
        }
        scope.column_aliases = column_aliases;

        let where_ = match &select.where_ {
            Some(expr) => Some(self.get_expression(expr, scope)?),
            None => None,
        };
        let group = select
            .group_by
            .iter()
            .map(|expr| self.get_expression(expr, scope))
            .collect::<Result<Vec<_>>>()?;
        let having = match &select.having {
            Some(expr) => Some(self.get_expression(expr, scope)?),
            None => None,
        };
        let mut order = Vec::with_capacity(select.order_by.len());
        for item in &select.order_by {
            order.push(OrderFragment {
                expr: self.get_expression(&item.expr, scope)?,
                direction: item.direction,
            });
        }
        let limit = match &select.limit {
            Some(limit) => Some(self.get_limit(limit, scope)?),
            None => None,
        };

        Ok(SelectFragment {
            models,
            tables,
            columns,
            joins,
            where_,
            group,
            having,
            order,
            limit,
            distinct: select.distinct,
            for_update: select.for_update,
        })
    }

    pub(crate) fn get_limit(&mut self, limit: &Limit, scope: &CompilationScope) -> Result<LimitFragment> {
        let number = self.get_expression(&limit.number, scope)?;
        let offset = match &limit.offset {
            Some(offset) => Some(self.get_expression(offset, scope)?),
            None => None,
        };
        Ok(LimitFragment { number, offset })
    }

    /// The relation an eager-load name refers to: a relation alias first,
    /// then the only relation towards a model of that name.
    fn eager_relation(&self, model: &str, with: &str) -> Result<Arc<Relation>> {
        if let Some(relation) = self.manager.relation_by_alias(model, with) {
            return Ok(relation);
        }
        self.manager
            .relations_between(model, with)
            .and_then(|relations| relations.into_iter().next())
            .ok_or_else(|| {
                Error::compile(
                    CompileErrorKind::MissingRelation,
                    format!("Can't find a relationship between '{}' and '{}'", model, with),
                )
            })
    }

    fn get_select_column(
        &mut self,
        column: &PendingColumn<'_>,
        scope: &CompilationScope,
    ) -> Result<Vec<ColumnSpec>> {
        match column {
            PendingColumn::User(SelectColumn::All) => Ok(scope
                .models
                .iter()
                .map(|(model, reference)| ColumnSpec::Object {
                    model: model.clone(),
                    column: reference.clone(),
                    balias: lcfirst(model),
                    eager: None,
                })
                .collect()),

            PendingColumn::User(SelectColumn::AllOf(domain)) => {
                Ok(vec![self.object_column(domain, None, None, scope)?])
            }

            PendingColumn::Eager {
                domain,
                balias,
                tag,
            } => Ok(vec![self.object_column(
                domain,
                Some(balias.clone()),
                Some(tag.clone()),
                scope,
            )?]),

            PendingColumn::User(SelectColumn::Expr { expr, .. }) => {
                let (column, balias) = match expr {
                    Expr::Column { name, domain } => {
                        let qualified = self.get_qualified(name, domain.as_deref(), scope)?;
                        let balias = qualified.balias.clone();
                        (qualified.into_expr(), balias)
                    }
                    other => (self.get_expression(other, scope)?, None),
                };
                Ok(vec![ColumnSpec::Scalar {
                    column,
                    sql_alias: balias.clone(),
                    balias,
                    eager: None,
                }])
            }
        }
    }

    /// `domain.*`
    fn object_column(
        &self,
        domain: &str,
        balias: Option<String>,
        eager: Option<EagerTag>,
        scope: &CompilationScope,
    ) -> Result<ColumnSpec> {
        let (Some(model), Some(reference)) = (scope.model_of(domain), scope.sql_aliases.get(domain))
        else {
            return Err(Error::compile(
                CompileErrorKind::UnknownAlias,
                format!("Unknown model or alias '{}'", domain),
            ));
        };
        let balias = balias.unwrap_or_else(|| {
            if domain == model {
                lcfirst(model)
            } else {
                domain.to_string()
            }
        });
        Ok(ColumnSpec::Object {
            model: model.to_string(),
            column: reference.clone(),
            balias,
            eager,
        })
    }
}
