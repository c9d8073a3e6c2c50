//! JOIN compilation and implicit join conditions.

use super::{CompilationScope, Compiler};
use modelql_core::error::CompileErrorKind;
use modelql_core::fragment::{JoinFragment, SqlExpr, TableSource};
use modelql_core::ir::{Join, JoinKind};
use modelql_core::relation::Relation;
use modelql_core::{Error, Result};
use std::collections::HashSet;
use std::sync::Arc;

/// A join registered in the scope, waiting for its conditions.
struct PreparedJoin {
    kind: JoinKind,
    model: String,
    alias: String,
    source: TableSource,
    condition: Option<SqlExpr>,
}

impl Compiler<'_> {
    /// Compile the joins of one SELECT level.
    ///
    /// `from_models` are the models of the FROM list; `declared` holds the
    /// explicit FROM aliases, which a join may not reuse.
    pub(crate) fn get_joins(
        &mut self,
        from_models: &[String],
        joins: &[Join],
        scope: &mut CompilationScope,
        declared: &HashSet<String>,
    ) -> Result<Vec<JoinFragment>> {
        let mut used = HashSet::new();
        let mut prepared = Vec::with_capacity(joins.len());

        for join in joins {
            let binding = self.load(&join.model)?;
            let model = binding.name.clone();
            let alias = join.alias.clone().unwrap_or_else(|| model.clone());
            if declared.contains(&alias) || !used.insert(alias.clone()) {
                return Err(Error::compile(
                    CompileErrorKind::DuplicateAlias,
                    format!(
                        "Cannot use '{}' as join alias because it was already used",
                        alias
                    ),
                ));
            }

            let mut source = binding.table();
            if join.alias.is_some() {
                scope.register(&model, &alias, &alias);
                source = source.alias(alias.clone());
            } else {
                scope.register(&model, &model, &binding.source);
            }
            prepared.push(PreparedJoin {
                kind: join.kind,
                model,
                alias,
                source,
                condition: None,
            });
        }

        // Conditions are compiled once every joined model is in scope.
        for (join, prepared) in joins.iter().zip(prepared.iter_mut()) {
            if let Some(conditions) = &join.conditions {
                prepared.condition = Some(self.get_expression(conditions, scope)?);
            }
        }

        let mut fragments = Vec::with_capacity(prepared.len());
        for join in prepared {
            if join.condition.is_some() || !self.options.enable_implicit_joins {
                fragments.push(JoinFragment {
                    kind: join.kind,
                    source: join.source,
                    conditions: join.condition.into_iter().collect(),
                });
                continue;
            }

            let mut related = None;
            for from_model in from_models {
                if let Some(relation) = self.join_relation(from_model, &join.model)? {
                    related = Some((from_model, relation));
                    break;
                }
            }

            match related {
                Some((from_model, relation)) => {
                    let model_alias = scope
                        .sql_models_aliases
                        .get(from_model)
                        .cloned()
                        .unwrap_or_else(|| from_model.clone());
                    if relation.is_through() {
                        fragments.extend(self.get_multi_join(&join, &model_alias, &relation, scope)?);
                    } else {
                        fragments.push(self.get_single_join(join, &model_alias, &relation, scope)?);
                    }
                }
                None => fragments.push(JoinFragment {
                    kind: join.kind,
                    source: join.source,
                    conditions: Vec::new(),
                }),
            }
        }

        Ok(fragments)
    }

    /// The relation implied by joining `joined` to `from_model`.
    fn join_relation(&self, from_model: &str, joined: &str) -> Result<Option<Arc<Relation>>> {
        if let Some(relation) = self.manager.relation_by_alias(from_model, joined) {
            return Ok(Some(relation));
        }
        let Some(mut relations) = self.manager.relations_between(from_model, joined) else {
            return Ok(None);
        };
        if relations.len() > 1 {
            return Err(Error::compile(
                CompileErrorKind::AmbiguousRelation,
                format!(
                    "There is more than one relation between models '{}' and '{}', the join must be done using an alias",
                    from_model, joined
                ),
            ));
        }
        Ok(relations.pop())
    }

    /// One join with a per-field equality on the relation's keys.
    fn get_single_join(
        &self,
        join: PreparedJoin,
        model_alias: &str,
        relation: &Relation,
        scope: &CompilationScope,
    ) -> Result<JoinFragment> {
        let fields = relation.fields();
        let referenced = relation.referenced_fields();
        if fields.len() != referenced.len() {
            return Err(Error::compile(
                CompileErrorKind::FieldCount,
                format!(
                    "The number of fields must be equal to the number of referenced fields in join {}-{}",
                    model_alias, join.alias
                ),
            ));
        }

        let mut conditions = Vec::with_capacity(fields.len());
        for (field, referenced_field) in fields.iter().zip(referenced.iter()) {
            let left = self.get_qualified(field, Some(model_alias), scope)?;
            let right = self.get_qualified(referenced_field, Some(&join.alias), scope)?;
            conditions.push(SqlExpr::equals(left.into_expr(), right.into_expr()));
        }

        Ok(JoinFragment {
            kind: join.kind,
            source: join.source,
            conditions,
        })
    }

    /// Two joins through the intermediate model of a through relation.
    fn get_multi_join(
        &mut self,
        join: &PreparedJoin,
        model_alias: &str,
        relation: &Relation,
        scope: &mut CompilationScope,
    ) -> Result<Vec<JoinFragment>> {
        let not_supported = || Error::compile(CompileErrorKind::NotSupported, "Not supported");
        let intermediate = relation.intermediate().ok_or_else(not_supported)?;
        let (Some(field), Some(referenced_field), Some(intermediate_field), Some(intermediate_referenced)) = (
            relation.fields().single(),
            relation.referenced_fields().single(),
            intermediate.fields.single(),
            intermediate.referenced_fields.single(),
        ) else {
            return Err(not_supported());
        };

        let binding = self.load(&intermediate.model)?;
        let intermediate_model = binding.name.clone();
        scope
            .sql_aliases
            .insert(intermediate_model.clone(), binding.source.clone());
        scope
            .sql_aliases_models
            .insert(intermediate_model.clone(), intermediate_model.clone());

        let first = SqlExpr::equals(
            self.get_qualified(field, Some(model_alias), scope)?.into_expr(),
            self.get_qualified(intermediate_field, Some(&intermediate_model), scope)?
                .into_expr(),
        );
        let second = SqlExpr::equals(
            self.get_qualified(intermediate_referenced, Some(&intermediate_model), scope)?
                .into_expr(),
            self.get_qualified(referenced_field, Some(&join.alias), scope)?
                .into_expr(),
        );

        Ok(vec![
            JoinFragment {
                kind: join.kind,
                source: binding.table(),
                conditions: vec![first],
            },
            JoinFragment {
                kind: join.kind,
                source: join.source.clone(),
                conditions: vec![second],
            },
        ])
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::Compiler;
    use crate::testing::MockManager;
    use modelql_core::error::CompileErrorKind;
    use modelql_core::fragment::{Intermediate, SelectFragment, SqlExpr};
    use modelql_core::ir::{Expr, Join, SelectColumn, SelectStatement, Statement, TableRef};
    use modelql_core::{BindParams, OrmOptions};

    fn compile(manager: &MockManager, select: SelectStatement) -> modelql_core::Result<SelectFragment> {
        let binds = BindParams::new();
        match Compiler::new(manager, &binds)
            .compile(&Statement::Select(select))?
            .intermediate
        {
            Intermediate::Select(fragment) => Ok(fragment),
            other => panic!("unexpected {:?}", other.kind()),
        }
    }

    fn robots_with(join: Join) -> SelectStatement {
        SelectStatement::new()
            .column(SelectColumn::AllOf("r".to_string()))
            .from(TableRef::new("Robots").alias("r"))
            .join(join)
    }

    #[test]
    fn implicit_join_from_relation() {
        let manager = MockManager::with_robots();
        let fragment = compile(&manager, robots_with(Join::inner("RobotsParts").alias("p"))).unwrap();
        assert_eq!(fragment.joins.len(), 1);
        assert_eq!(
            fragment.joins[0].conditions,
            vec![SqlExpr::equals(
                SqlExpr::qualified("r", "id"),
                SqlExpr::qualified("p", "robots_id")
            )]
        );
    }

    #[test]
    fn explicit_conditions_win() {
        let manager = MockManager::with_robots();
        let join = Join::left("RobotsParts")
            .alias("p")
            .on(Expr::qualified("p", "parts_id").equals(Expr::int(3)));
        let fragment = compile(&manager, robots_with(join)).unwrap();
        assert_eq!(
            fragment.joins[0].conditions,
            vec![SqlExpr::equals(
                SqlExpr::qualified("p", "parts_id"),
                SqlExpr::Literal("3".to_string())
            )]
        );
    }

    #[test]
    fn implicit_joins_can_be_disabled() {
        let manager =
            MockManager::with_robots().options(OrmOptions::default().enable_implicit_joins(false));
        let fragment = compile(&manager, robots_with(Join::inner("RobotsParts"))).unwrap();
        assert!(fragment.joins[0].conditions.is_empty());
    }

    #[test]
    fn unrelated_join_has_no_conditions() {
        let manager = MockManager::with_robots();
        let fragment = compile(&manager, robots_with(Join::inner("Cars"))).unwrap();
        assert!(fragment.joins[0].conditions.is_empty());
    }

    #[test]
    fn join_alias_must_be_unique() {
        let manager = MockManager::with_robots();
        let select = robots_with(Join::inner("RobotsParts").alias("p"))
            .join(Join::inner("Parts").alias("p"));
        let err = compile(&manager, select).unwrap_err();
        assert_eq!(err.compile_kind(), Some(CompileErrorKind::DuplicateAlias));
        assert_eq!(
            err.message(),
            "Cannot use 'p' as join alias because it was already used"
        );

        let err = compile(&manager, robots_with(Join::inner("Parts").alias("r"))).unwrap_err();
        assert_eq!(err.compile_kind(), Some(CompileErrorKind::DuplicateAlias));
    }

    #[test]
    fn ambiguous_relation_requires_alias() {
        let manager = MockManager::with_robots();
        let select = SelectStatement::new()
            .column(SelectColumn::All)
            .from(TableRef::new("Parts"))
            .join(Join::inner("Robots"));
        let err = compile(&manager, select).unwrap_err();
        assert_eq!(err.compile_kind(), Some(CompileErrorKind::AmbiguousRelation));
        assert_eq!(
            err.message(),
            "There is more than one relation between models 'Parts' and 'Robots', the join must be done using an alias"
        );
    }

    #[test]
    fn through_relation_joins_the_intermediate() {
        let manager = MockManager::with_robots();
        let fragment = compile(&manager, robots_with(Join::inner("Parts").alias("pt"))).unwrap();
        assert_eq!(fragment.joins.len(), 2);
        assert_eq!(fragment.joins[0].source.source, "robots_parts");
        assert_eq!(
            fragment.joins[0].conditions,
            vec![SqlExpr::equals(
                SqlExpr::qualified("r", "id"),
                SqlExpr::qualified("robots_parts", "robots_id")
            )]
        );
        assert_eq!(fragment.joins[1].source.alias.as_deref(), Some("pt"));
        assert_eq!(
            fragment.joins[1].conditions,
            vec![SqlExpr::equals(
                SqlExpr::qualified("robots_parts", "parts_id"),
                SqlExpr::qualified("pt", "id")
            )]
        );
    }
}
