//! Model finders used to fetch related records.

use crate::manager::RelationManager;
use modelql_core::ir::{Expr, SelectColumn};
use modelql_core::{BindParams, BindTypes, Error, FindParameters, Result, Value};
use modelql_query::{QueryBuilder, ResultRow, Resultset};

/// Column alias of the generated `COUNT(*)`.
pub const ROWCOUNT_ALIAS: &str = "rowcount";

/// Static `find`, `find_first` and `count` of a model class.
///
/// Relation fetches go through this seam, so tests and applications can
/// observe or replace how related records are loaded.
pub trait ModelFinder: Send + Sync {
    fn find(&self, manager: &RelationManager, model: &str, params: FindParameters) -> Result<Resultset>;

    fn find_first(
        &self,
        manager: &RelationManager,
        model: &str,
        params: FindParameters,
    ) -> Result<Option<ResultRow>>;

    fn count(&self, manager: &RelationManager, model: &str, params: FindParameters) -> Result<i64>;
}

/// Finder compiling the parameters into a query over the manager.
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryFinder;

impl ModelFinder for QueryFinder {
    fn find(&self, manager: &RelationManager, model: &str, params: FindParameters) -> Result<Resultset> {
        let hydration = params.hydration;
        let builder = QueryBuilder::from_params(model, &params);
        let query = manager.query_from_builder(&builder)?;
        let mut resultset = query
            .execute(&BindParams::new(), &BindTypes::new())?
            .into_resultset()
            .ok_or_else(|| Error::config("The query did not return a resultset"))?;
        if let Some(mode) = hydration {
            resultset.set_hydrate_mode(mode);
        }
        Ok(resultset)
    }

    fn find_first(
        &self,
        manager: &RelationManager,
        model: &str,
        params: FindParameters,
    ) -> Result<Option<ResultRow>> {
        let builder = QueryBuilder::from_params(model, &params.limit(1));
        let mut query = manager.query_from_builder(&builder)?;
        query.set_unique_row(true);
        query.get_single_result(&BindParams::new(), &BindTypes::new())
    }

    fn count(&self, manager: &RelationManager, model: &str, params: FindParameters) -> Result<i64> {
        let builder = count_columns(QueryBuilder::from_params(model, &params));
        let query = manager.query_from_builder(&builder)?;
        let row = query.get_single_result(&BindParams::new(), &BindTypes::new())?;
        Ok(row_count(row.as_ref()))
    }
}

/// Select `COUNT(*) AS rowcount` instead of the builder's columns.
pub(crate) fn count_columns(builder: QueryBuilder) -> QueryBuilder {
    builder.columns(vec![SelectColumn::aliased(
        Expr::func("COUNT", vec![Expr::Star]),
        ROWCOUNT_ALIAS,
    )])
}

pub(crate) fn row_count(row: Option<&ResultRow>) -> i64 {
    row.and_then(|row| row.get(ROWCOUNT_ALIAS))
        .as_ref()
        .and_then(Value::as_i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockConnection, manager_with};
    use indexmap::IndexMap;
    use modelql_core::Row;

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| (*name).to_string()).collect()
    }

    #[test]
    fn find_first_limits_to_one_row() {
        let connection = MockConnection::new();
        let manager = manager_with(&connection);
        connection.push_rows(vec![Row::new(
            names(&["id", "name", "year"]),
            vec![Value::Int(1), Value::from("Astro Boy"), Value::Int(1952)],
        )]);

        let params = FindParameters::conditions(Expr::column("year").equals(Expr::named("year")))
            .bind("year", 1952);
        let row = QueryFinder
            .find_first(&manager, "Robots", params)
            .unwrap()
            .unwrap();
        assert_eq!(
            row.as_record().and_then(|record| record.get("name")),
            Some(&Value::from("Astro Boy"))
        );

        let state = connection.state();
        let state = state.lock().unwrap();
        let (sql, binds) = &state.queries[0];
        assert!(sql.ends_with("WHERE \"robots\".\"year\" = :year LIMIT 1"));
        assert_eq!(binds.get("year"), Some(&Value::Int(1952)));
    }

    #[test]
    fn find_applies_the_hydration_mode() {
        let connection = MockConnection::new();
        let manager = manager_with(&connection);
        connection.push_rows(vec![Row::new(
            names(&["id", "name", "year"]),
            vec![Value::Int(1), Value::from("Astro Boy"), Value::Int(1952)],
        )]);

        let params = FindParameters::new().hydration(modelql_core::HydrateMode::Arrays);
        let mut robots = QueryFinder.find(&manager, "Robots", params).unwrap();
        assert_eq!(robots.count(), 1);
        assert!(matches!(robots.get_first().unwrap(), Some(ResultRow::Array(_))));
    }

    #[test]
    fn count_selects_rowcount() {
        let connection = MockConnection::new();
        let manager = manager_with(&connection);
        connection.push_rows(vec![Row::new(names(&[ROWCOUNT_ALIAS]), vec![Value::Int(4)])]);

        assert_eq!(QueryFinder.count(&manager, "Invoices", FindParameters::new()).unwrap(), 4);
        let state = connection.state();
        let state = state.lock().unwrap();
        let sql = &state.queries[0].0;
        assert!(sql.starts_with("SELECT COUNT(*) AS "));
        assert!(sql.ends_with("FROM \"invoices\""));
    }

    #[test]
    fn row_count_reads_the_alias() {
        let mut map = IndexMap::new();
        map.insert(ROWCOUNT_ALIAS.to_string(), Value::Text("12".to_string()));
        assert_eq!(row_count(Some(&ResultRow::Row(map))), 12);
        assert_eq!(row_count(None), 0);
    }
}
