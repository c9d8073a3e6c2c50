//! A general-purpose SQL renderer for fragment trees.
//!
//! Adapters that do not need anything exotic can return a [`GenericDialect`]
//! from [`Connection::dialect`](modelql_core::Connection::dialect). Bound
//! parameters are rendered as `:name` and array placeholders expand to
//! `:name0, :name1, ...`, matching the names produced by bind processing.

use modelql_core::Result;
use modelql_core::connection::Dialect;
use modelql_core::fragment::{
    ColumnSpec, JoinFragment, RenderColumn, RenderSelect, SelectFragment, SqlExpr, TableSource,
};
use modelql_core::ir::{BinaryOp, SortDirection, UnaryOp};

/// Identifier quoting and lock syntax family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Flavor {
    #[default]
    Postgres,
    Sqlite,
    Mysql,
}

impl Flavor {
    /// Quote an identifier, doubling embedded quote characters.
    pub fn quote_identifier(self, name: &str) -> String {
        match self {
            Flavor::Postgres | Flavor::Sqlite => {
                let escaped = name.replace('"', "\"\"");
                format!("\"{}\"", escaped)
            }
            Flavor::Mysql => {
                let escaped = name.replace('`', "``");
                format!("`{}`", escaped)
            }
        }
    }

    pub const fn supports_ilike(self) -> bool {
        matches!(self, Flavor::Postgres)
    }
}

/// Renders fragments as ANSI-style SQL with named placeholders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenericDialect {
    flavor: Flavor,
}

impl GenericDialect {
    pub const fn new(flavor: Flavor) -> Self {
        Self { flavor }
    }

    pub const fn flavor(&self) -> Flavor {
        self.flavor
    }

    fn quote(&self, name: &str) -> String {
        self.flavor.quote_identifier(name)
    }

    fn table(&self, table: &TableSource) -> String {
        let mut sql = match &table.schema {
            Some(schema) => format!("{}.{}", self.quote(schema), self.quote(&table.source)),
            None => self.quote(&table.source),
        };
        if let Some(alias) = &table.alias {
            sql.push_str(" AS ");
            sql.push_str(&self.quote(alias));
        }
        sql
    }

    fn join(&self, join: &JoinFragment) -> Result<String> {
        let mut sql = format!("{} {}", join.kind.as_sql(), self.table(&join.source));
        if !join.conditions.is_empty() {
            let conditions = join
                .conditions
                .iter()
                .map(|condition| self.expression(condition))
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(" ON ");
            sql.push_str(&conditions.join(" AND "));
        }
        Ok(sql)
    }

    fn render_column(&self, column: &RenderColumn) -> Result<String> {
        let expr = self.expression(&column.expr)?;
        Ok(match &column.alias {
            Some(alias) => format!("{expr} AS {}", self.quote(alias)),
            None => expr,
        })
    }

    fn column_spec(&self, column: &ColumnSpec) -> Result<String> {
        match column {
            ColumnSpec::Object { column, .. } => Ok(format!("{}.*", self.quote(column))),
            ColumnSpec::Scalar {
                column, sql_alias, ..
            } => {
                let expr = self.expression(column)?;
                Ok(match sql_alias {
                    Some(alias) => format!("{expr} AS {}", self.quote(alias)),
                    None => expr,
                })
            }
        }
    }

    /// Render a SELECT. `columns` overrides the fragment's own select list;
    /// subqueries are rendered from their column specs.
    fn fragment(&self, select: &SelectFragment, columns: Option<&[RenderColumn]>) -> Result<String> {
        let mut sql = String::from("SELECT ");
        if select.distinct {
            sql.push_str("DISTINCT ");
        }

        let list = match columns {
            Some(columns) => columns
                .iter()
                .map(|column| self.render_column(column))
                .collect::<Result<Vec<_>>>()?,
            None => select
                .columns
                .values()
                .map(|column| self.column_spec(column))
                .collect::<Result<Vec<_>>>()?,
        };
        sql.push_str(&list.join(", "));

        let tables: Vec<_> = select.tables.iter().map(|table| self.table(table)).collect();
        sql.push_str(" FROM ");
        sql.push_str(&tables.join(", "));

        for join in &select.joins {
            sql.push(' ');
            sql.push_str(&self.join(join)?);
        }

        if let Some(where_) = &select.where_ {
            sql.push_str(" WHERE ");
            sql.push_str(&self.expression(where_)?);
        }

        if !select.group.is_empty() {
            let group = select
                .group
                .iter()
                .map(|expr| self.expression(expr))
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(" GROUP BY ");
            sql.push_str(&group.join(", "));
        }

        if let Some(having) = &select.having {
            sql.push_str(" HAVING ");
            sql.push_str(&self.expression(having)?);
        }

        if !select.order.is_empty() {
            let mut items = Vec::with_capacity(select.order.len());
            for item in &select.order {
                let expr = self.expression(&item.expr)?;
                items.push(match item.direction {
                    Some(SortDirection::Asc) => format!("{expr} ASC"),
                    Some(SortDirection::Desc) => format!("{expr} DESC"),
                    None => expr,
                });
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&items.join(", "));
        }

        if let Some(limit) = &select.limit {
            sql.push_str(" LIMIT ");
            sql.push_str(&self.expression(&limit.number)?);
            if let Some(offset) = &limit.offset {
                sql.push_str(" OFFSET ");
                sql.push_str(&self.expression(offset)?);
            }
        }

        Ok(sql)
    }

    fn expression(&self, expr: &SqlExpr) -> Result<String> {
        Ok(match expr {
            SqlExpr::Qualified { domain, name } => match domain {
                Some(domain) => format!("{}.{}", self.quote(domain), self.quote(name)),
                None => self.quote(name),
            },

            SqlExpr::Literal(text) => text.clone(),

            SqlExpr::Placeholder { name, times } => match times {
                Some(times) => (0..*times)
                    .map(|position| format!(":{name}{position}"))
                    .collect::<Vec<_>>()
                    .join(", "),
                None => format!(":{name}"),
            },

            SqlExpr::Binary { op, left, right } => {
                let left_sql = self.expression(left)?;
                match op {
                    BinaryOp::In | BinaryOp::NotIn => {
                        let inner = match right.as_ref() {
                            SqlExpr::List(items) => self.list(items)?,
                            SqlExpr::Select(select) => self.fragment(select, None)?,
                            SqlExpr::Parentheses(inner) => self.expression(inner)?,
                            other => self.expression(other)?,
                        };
                        format!("{left_sql} {} ({inner})", op.as_sql())
                    }
                    BinaryOp::ILike | BinaryOp::NotILike if !self.flavor.supports_ilike() => {
                        let right_sql = self.expression(right)?;
                        let like = if *op == BinaryOp::ILike {
                            "LIKE"
                        } else {
                            "NOT LIKE"
                        };
                        format!("LOWER({left_sql}) {like} LOWER({right_sql})")
                    }
                    _ => {
                        let right_sql = self.expression(right)?;
                        format!("{left_sql} {} {right_sql}", op.as_sql())
                    }
                }
            }

            SqlExpr::Unary { op, operand } => {
                let operand_sql = self.expression(operand)?;
                match op {
                    UnaryOp::Not => format!("NOT {operand_sql}"),
                    UnaryOp::Minus => format!("-{operand_sql}"),
                    UnaryOp::BitNot => format!("~{operand_sql}"),
                    UnaryOp::IsNull => format!("{operand_sql} IS NULL"),
                    UnaryOp::IsNotNull => format!("{operand_sql} IS NOT NULL"),
                }
            }

            SqlExpr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let not = if *negated { "NOT " } else { "" };
                format!(
                    "{} {not}BETWEEN {} AND {}",
                    self.expression(expr)?,
                    self.expression(low)?,
                    self.expression(high)?
                )
            }

            SqlExpr::Function {
                name,
                args,
                distinct,
            } => {
                let args = args
                    .iter()
                    .map(|arg| self.expression(arg))
                    .collect::<Result<Vec<_>>>()?;
                let distinct = if *distinct { "DISTINCT " } else { "" };
                format!("{name}({distinct}{})", args.join(", "))
            }

            SqlExpr::List(items) => format!("({})", self.list(items)?),

            SqlExpr::Cast { expr, ty } => format!("CAST({} AS {ty})", self.expression(expr)?),

            SqlExpr::Convert { expr, charset } => {
                format!("CONVERT({} USING {charset})", self.expression(expr)?)
            }

            SqlExpr::Case {
                operand,
                whens,
                else_,
            } => {
                let mut sql = String::from("CASE");
                if let Some(operand) = operand {
                    sql.push(' ');
                    sql.push_str(&self.expression(operand)?);
                }
                for (condition, result) in whens {
                    let cond_sql = self.expression(condition)?;
                    let result_sql = self.expression(result)?;
                    sql.push_str(&format!(" WHEN {cond_sql} THEN {result_sql}"));
                }
                if let Some(else_expr) = else_ {
                    sql.push_str(&format!(" ELSE {}", self.expression(else_expr)?));
                }
                sql.push_str(" END");
                sql
            }

            SqlExpr::Select(select) => format!("({})", self.fragment(select, None)?),
            SqlExpr::Exists(select) => format!("EXISTS ({})", self.fragment(select, None)?),
            SqlExpr::All(select) => format!("ALL ({})", self.fragment(select, None)?),
            SqlExpr::Any(select) => format!("ANY ({})", self.fragment(select, None)?),

            SqlExpr::Parentheses(inner) => format!("({})", self.expression(inner)?),

            SqlExpr::AllColumns(domain) => match domain {
                Some(domain) => format!("{}.*", self.quote(domain)),
                None => "*".to_string(),
            },
        })
    }

    fn list(&self, items: &[SqlExpr]) -> Result<String> {
        Ok(items
            .iter()
            .map(|item| self.expression(item))
            .collect::<Result<Vec<_>>>()?
            .join(", "))
    }
}

impl Dialect for GenericDialect {
    fn select(&self, select: &RenderSelect<'_>) -> Result<String> {
        let sql = self.fragment(select.fragment, Some(select.columns))?;
        if select.fragment.for_update {
            Ok(self.for_update(&sql))
        } else {
            Ok(sql)
        }
    }

    fn shared_lock(&self, sql: &str) -> String {
        match self.flavor {
            Flavor::Postgres => format!("{sql} FOR SHARE"),
            Flavor::Mysql => format!("{sql} LOCK IN SHARE MODE"),
            Flavor::Sqlite => sql.to_string(),
        }
    }

    fn for_update(&self, sql: &str) -> String {
        match self.flavor {
            Flavor::Postgres | Flavor::Mysql => format!("{sql} FOR UPDATE"),
            Flavor::Sqlite => sql.to_string(),
        }
    }

    fn sql_expression(&self, expr: &SqlExpr) -> Result<String> {
        self.expression(expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelql_core::fragment::{LimitFragment, OrderFragment};
    use modelql_core::ir::JoinKind;

    fn robots() -> SelectFragment {
        SelectFragment {
            models: vec!["Robots".to_string()],
            tables: vec![TableSource::new("robots").alias("r")],
            ..SelectFragment::default()
        }
    }

    #[test]
    fn quote_identifier_escapes() {
        assert_eq!(Flavor::Postgres.quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(Flavor::Mysql.quote_identifier("a`b"), "`a``b`");
    }

    #[test]
    fn renders_full_select() {
        let mut fragment = robots();
        fragment.joins.push(JoinFragment {
            kind: JoinKind::Inner,
            source: TableSource::new("robots_parts"),
            conditions: vec![SqlExpr::equals(
                SqlExpr::qualified("r", "id"),
                SqlExpr::qualified("robots_parts", "robots_id"),
            )],
        });
        fragment.where_ = Some(SqlExpr::Binary {
            op: BinaryOp::Gt,
            left: Box::new(SqlExpr::qualified("r", "year")),
            right: Box::new(SqlExpr::Placeholder {
                name: "year".to_string(),
                times: None,
            }),
        });
        fragment.order.push(OrderFragment {
            expr: SqlExpr::qualified("r", "name"),
            direction: Some(SortDirection::Desc),
        });
        fragment.limit = Some(LimitFragment {
            number: SqlExpr::Literal("10".to_string()),
            offset: Some(SqlExpr::Literal("5".to_string())),
        });
        let columns = vec![
            RenderColumn {
                expr: SqlExpr::qualified("r", "id"),
                alias: None,
            },
            RenderColumn {
                expr: SqlExpr::qualified("r", "name"),
                alias: Some("label".to_string()),
            },
        ];
        let sql = GenericDialect::default()
            .select(&RenderSelect {
                fragment: &fragment,
                columns: &columns,
            })
            .unwrap();
        assert_eq!(
            sql,
            "SELECT \"r\".\"id\", \"r\".\"name\" AS \"label\" FROM \"robots\" AS \"r\" \
             INNER JOIN \"robots_parts\" ON \"r\".\"id\" = \"robots_parts\".\"robots_id\" \
             WHERE \"r\".\"year\" > :year ORDER BY \"r\".\"name\" DESC LIMIT 10 OFFSET 5"
        );
    }

    #[test]
    fn array_placeholder_expands_inside_in() {
        let expr = SqlExpr::Binary {
            op: BinaryOp::In,
            left: Box::new(SqlExpr::qualified("r", "id")),
            right: Box::new(SqlExpr::Placeholder {
                name: "ids".to_string(),
                times: Some(3),
            }),
        };
        let sql = GenericDialect::default().sql_expression(&expr).unwrap();
        assert_eq!(sql, "\"r\".\"id\" IN (:ids0, :ids1, :ids2)");
    }

    #[test]
    fn ilike_falls_back_to_lower() {
        let expr = SqlExpr::Binary {
            op: BinaryOp::ILike,
            left: Box::new(SqlExpr::qualified("r", "name")),
            right: Box::new(SqlExpr::Literal("'a%'".to_string())),
        };
        let sql = GenericDialect::new(Flavor::Sqlite)
            .sql_expression(&expr)
            .unwrap();
        assert_eq!(sql, "LOWER(\"r\".\"name\") LIKE LOWER('a%')");
    }

    #[test]
    fn locks_follow_flavor() {
        let fragment = SelectFragment {
            for_update: true,
            ..robots()
        };
        let columns = vec![RenderColumn {
            expr: SqlExpr::AllColumns(None),
            alias: None,
        }];
        let select = RenderSelect {
            fragment: &fragment,
            columns: &columns,
        };
        let mysql = GenericDialect::new(Flavor::Mysql);
        assert!(mysql.select(&select).unwrap().ends_with("FOR UPDATE"));
        assert!(
            GenericDialect::new(Flavor::Sqlite)
                .select(&select)
                .unwrap()
                .ends_with("AS \"r\"")
        );
        assert_eq!(mysql.shared_lock("SELECT 1"), "SELECT 1 LOCK IN SHARE MODE");
    }

    #[test]
    fn subquery_renders_from_column_specs() {
        let mut inner = robots();
        inner.columns.insert(
            "id".to_string(),
            ColumnSpec::Scalar {
                column: SqlExpr::qualified("r", "id"),
                balias: Some("id".to_string()),
                sql_alias: None,
                eager: None,
            },
        );
        let expr = SqlExpr::Exists(Box::new(inner));
        let sql = GenericDialect::default().sql_expression(&expr).unwrap();
        assert_eq!(sql, "EXISTS (SELECT \"r\".\"id\" FROM \"robots\" AS \"r\")");
    }
}
