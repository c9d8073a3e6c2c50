//! Relation declaration, implicit joins and related-record fetching.

mod common;

use common::{MockConnection, binds, load_all, manager, row};
use modelql::prelude::*;
use modelql::{CompileErrorKind, RelationErrorKind, RelationKind};

#[test]
fn relations_are_declared_when_models_load() {
    let connection = MockConnection::new();
    let manager = manager(&connection);
    assert!(manager.get_relation_by_alias("Parts", "maker").is_none());

    manager.load("Parts").unwrap();
    assert!(manager.is_initialized("Parts"));
    let relations = manager.get_relations_between("Parts", "Robots").unwrap();
    assert_eq!(relations.len(), 2);
    assert!(relations.iter().all(|r| r.kind() == RelationKind::BelongsTo));
}

#[test]
fn aliases_are_case_insensitive() {
    let connection = MockConnection::new();
    let manager = manager(&connection);
    load_all(&manager);

    let relation = manager.get_relation_by_alias("Robots", "ROBOTSPARTS").unwrap();
    assert_eq!(relation.referenced_model(), "RobotsParts");
    let through = manager.get_relation_by_alias("robots", "Parts").unwrap();
    assert!(through.is_through());
    assert_eq!(through.intermediate_model(), Some("RobotsParts"));
}

#[test]
fn a_redeclared_alias_replaces_the_lookup_only() {
    let connection = MockConnection::new();
    let manager = manager(&connection);
    load_all(&manager);

    manager
        .add_has_one("Robots", "id", "Cars", "id", RelationOptions::new().alias("RobotsParts"))
        .unwrap();
    let relation = manager.get_relation_by_alias("Robots", "robotsparts").unwrap();
    assert_eq!(relation.referenced_model(), "Cars");
    assert_eq!(manager.get_has_many("Robots").len(), 1);
}

#[test]
fn invalid_relations_are_rejected() {
    let connection = MockConnection::new();
    let manager = manager(&connection);

    let err = manager
        .add_has_many("Customers", "id", "Invoices", "cst_id", RelationOptions::new().alias(""))
        .unwrap_err();
    assert_eq!(err.relation_kind(), Some(RelationErrorKind::InvalidAlias));

    let err = manager
        .add_belongs_to(
            "Invoices",
            "cst_id",
            "Customers",
            vec!["id", "region"],
            RelationOptions::new(),
        )
        .unwrap_err();
    assert_eq!(err.message(), "Number of referenced fields are not the same");
}

#[test]
fn implicit_joins_follow_the_single_relation() {
    let connection = MockConnection::new();
    let manager = manager(&connection);

    let statement = Statement::Select(
        SelectStatement::new()
            .column(SelectColumn::AllOf("r".to_string()))
            .from(TableRef::new("Robots").alias("r"))
            .join(Join::inner("RobotsParts")),
    );
    manager
        .execute_query(statement, &BindParams::new(), &BindTypes::new())
        .unwrap();
    assert!(
        connection
            .last_sql()
            .ends_with("FROM \"robots\" AS \"r\" INNER JOIN \"robots_parts\" ON \"r\".\"id\" = \"robots_parts\".\"robots_id\"")
    );
}

#[test]
fn ambiguous_implicit_joins_need_an_alias() {
    let connection = MockConnection::new();
    let manager = manager(&connection);

    let statement = Statement::Select(
        SelectStatement::new()
            .column(SelectColumn::AllOf("p".to_string()))
            .from(TableRef::new("Parts").alias("p"))
            .join(Join::inner("Robots")),
    );
    let err = manager
        .execute_query(statement, &BindParams::new(), &BindTypes::new())
        .err()
        .unwrap();
    assert_eq!(err.compile_kind(), Some(CompileErrorKind::AmbiguousRelation));
    assert_eq!(
        err.message(),
        "There is more than one relation between models 'Parts' and 'Robots', the join must be done using an alias"
    );
    assert_eq!(connection.query_count(), 0);
}

#[test]
fn explicit_join_conditions_resolve_ambiguity() {
    let connection = MockConnection::new();
    let manager = manager(&connection);

    let statement = Statement::Select(
        SelectStatement::new()
            .column(SelectColumn::AllOf("p".to_string()))
            .from(TableRef::new("Parts").alias("p"))
            .join(
                Join::inner("Robots")
                    .alias("m")
                    .on(Expr::qualified("p", "maker_id").equals(Expr::qualified("m", "id"))),
            ),
    );
    manager
        .execute_query(statement, &BindParams::new(), &BindTypes::new())
        .unwrap();
    assert!(
        connection
            .last_sql()
            .ends_with("INNER JOIN \"robots\" AS \"m\" ON \"p\".\"maker_id\" = \"m\".\"id\"")
    );
}

fn customer(id: i64) -> Record {
    let mut record = Record::new("Customers");
    record.set("id", id).set("name", "ACME");
    record
}

#[test]
fn has_many_records_are_selected_by_the_owner_key() {
    let connection = MockConnection::new();
    let manager = manager(&connection);
    load_all(&manager);
    connection.push_rows(vec![
        row(&[("id", Value::Int(1)), ("cst_id", Value::Int(7)), ("total", Value::Decimal("10.50".into()))]),
        row(&[("id", Value::Int(2)), ("cst_id", Value::Int(7)), ("total", Value::Decimal("3.00".into()))]),
    ]);

    let invoices = manager
        .get_has_many_records("Customers", "Invoices", &customer(7), None, None)
        .unwrap()
        .unwrap()
        .into_many()
        .unwrap();
    assert_eq!(invoices.count(), 2);

    let state = connection.state();
    let state = state.lock().unwrap();
    let (sql, sent) = &state.queries[0];
    assert!(sql.contains("FROM \"invoices\""));
    assert!(sql.contains("\"invoices\".\"cst_id\" = :APR0"));
    assert_eq!(sent, &binds(&[("APR0", Value::Int(7))]));
}

#[test]
fn relation_counts_read_the_rowcount_column() {
    let connection = MockConnection::new();
    let manager = manager(&connection);
    load_all(&manager);
    connection.push_rows(vec![row(&[("rowcount", Value::Int(2))])]);

    let records = manager
        .get_has_many_records(
            "Customers",
            "Invoices",
            &customer(7),
            None,
            Some(RetrieveMethod::Count),
        )
        .unwrap()
        .unwrap();
    assert_eq!(records.count(), Some(2));
    assert!(connection.last_sql().starts_with("SELECT COUNT(*) AS \"rowcount\""));
}

#[test]
fn undeclared_relations_have_no_records() {
    let connection = MockConnection::new();
    let manager = manager(&connection);
    load_all(&manager);

    let records = manager
        .get_has_one_records("Customers", "Robots", &customer(7), None, None)
        .unwrap();
    assert!(records.is_none());
    assert_eq!(connection.query_count(), 0);
}

#[test]
fn many_to_many_records_join_the_intermediate_model() {
    let connection = MockConnection::new();
    let manager = manager(&connection);
    load_all(&manager);
    connection.push_rows(vec![row(&[
        ("id", Value::Int(10)),
        ("name", Value::from("Wheel")),
        ("maker_id", Value::Int(1)),
        ("tester_id", Value::Int(2)),
    ])]);

    let mut robot = Record::new("Robots");
    robot.set("id", 1).set("name", "Robotina");
    let mut parts = manager
        .get_has_many_to_many_records("Robots", "Parts", &robot, None, None)
        .unwrap()
        .unwrap()
        .into_many()
        .unwrap();

    let first = parts.get_first().unwrap().unwrap();
    assert_eq!(first.get("name"), Some(Value::from("Wheel")));
    let sql = connection.last_sql();
    assert!(sql.contains("INNER JOIN \"robots_parts\" ON \"robots_parts\".\"parts_id\" = \"parts\".\"id\""));
    assert!(sql.ends_with("WHERE \"robots_parts\".\"robots_id\" = :APR0"));
}

#[test]
fn reusable_relations_query_once() {
    let connection = MockConnection::new();
    let manager = manager(&connection);
    load_all(&manager);
    connection.push_rows(vec![row(&[("id", Value::Int(7)), ("name", Value::from("ACME"))])]);

    let mut invoice = Record::new("Invoices");
    invoice.set("id", 1).set("cst_id", 7);

    for _ in 0..2 {
        let owner = manager
            .get_belongs_to_records("Invoices", "Customers", &invoice, None, None)
            .unwrap()
            .unwrap()
            .into_one()
            .unwrap();
        assert_eq!(owner.get("name"), Some(Value::from("ACME")));
    }
    assert_eq!(connection.query_count(), 1);

    manager.clear_reusable_objects();
    let owner = manager
        .get_belongs_to_records("Invoices", "Customers", &invoice, None, None)
        .unwrap()
        .unwrap()
        .into_one();
    assert!(owner.is_none());
    assert_eq!(connection.query_count(), 2);
}
