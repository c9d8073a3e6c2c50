//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use modelql::prelude::*;
use modelql::Row;

pub use modelql_query::testing::{MockConnection, row};

pub fn robot(id: i64, name: &str, year: i64) -> Row {
    row(&[
        ("id", Value::Int(id)),
        ("name", Value::from(name)),
        ("type", Value::from("mechanical")),
        ("year", Value::Int(year)),
    ])
}

fn meta() -> MemoryMetaData {
    MemoryMetaData::new()
        .with_model(
            "Robots",
            ModelDescriptor::new()
                .column("id", BindType::Int)
                .column("name", BindType::Str)
                .column("type", BindType::Str)
                .column("year", BindType::Int)
                .primary_key(["id"])
                .identity("id"),
        )
        .with_model(
            "RobotsParts",
            ModelDescriptor::new()
                .column("id", BindType::Int)
                .column("robots_id", BindType::Int)
                .column("parts_id", BindType::Int)
                .primary_key(["id"])
                .identity("id"),
        )
        .with_model(
            "Parts",
            ModelDescriptor::new()
                .column("id", BindType::Int)
                .column("name", BindType::Str)
                .column("maker_id", BindType::Int)
                .column("tester_id", BindType::Int)
                .primary_key(["id"])
                .identity("id"),
        )
        .with_model(
            "Cars",
            ModelDescriptor::new()
                .column("id", BindType::Int)
                .column("name", BindType::Str)
                .column("price", BindType::Decimal)
                .primary_key(["id"])
                .identity("id"),
        )
        .with_model(
            "Customers",
            ModelDescriptor::new()
                .column("id", BindType::Int)
                .column("name", BindType::Str)
                .primary_key(["id"])
                .identity("id"),
        )
        .with_model(
            "Invoices",
            ModelDescriptor::new()
                .column("id", BindType::Int)
                .column("cst_id", BindType::Int)
                .column("total", BindType::Decimal)
                .primary_key(["id"])
                .identity("id"),
        )
}

/// The model classes, each declaring its relations when initialized.
///
/// `Robots` has many `RobotsParts` (`robotsParts`) and many `Parts` through
/// them (`parts`). `Parts` belongs to `Robots` twice, as `maker` and
/// `tester`. `Customers` has many `Invoices` (`invoices`); each invoice
/// belongs to its customer through a reusable relation.
fn register_models(manager: &RelationManager) {
    manager.register(Arc::new(ClosureModel::new("Robots", |manager: &RelationManager| {
        manager.add_has_many(
            "Robots",
            "id",
            "RobotsParts",
            "robots_id",
            RelationOptions::new().alias("robotsParts"),
        )?;
        manager.add_has_many_to_many(
            "Robots",
            "id",
            "RobotsParts",
            "robots_id",
            "parts_id",
            "Parts",
            "id",
            RelationOptions::new().alias("parts"),
        )?;
        Ok(())
    })));
    manager.register(Arc::new(NamedModel::new("RobotsParts")));
    manager.register(Arc::new(ClosureModel::new("Parts", |manager: &RelationManager| {
        manager.add_belongs_to("Parts", "maker_id", "Robots", "id", RelationOptions::new().alias("maker"))?;
        manager.add_belongs_to("Parts", "tester_id", "Robots", "id", RelationOptions::new().alias("tester"))?;
        Ok(())
    })));
    manager.register(Arc::new(NamedModel::new("Cars")));
    manager.register(Arc::new(ClosureModel::new("Customers", |manager: &RelationManager| {
        manager.add_has_many(
            "Customers",
            "id",
            "Invoices",
            "cst_id",
            RelationOptions::new().alias("invoices"),
        )?;
        Ok(())
    })));
    manager.register(Arc::new(ClosureModel::new("Invoices", |manager: &RelationManager| {
        manager.add_belongs_to(
            "Invoices",
            "cst_id",
            "Customers",
            "id",
            RelationOptions::new().alias("customer").reusable(true),
        )?;
        Ok(())
    })));
}

/// A manager over the fixture models, reading and writing through
/// `connection` as the `db` service.
pub fn manager(connection: &MockConnection) -> RelationManager {
    let container = Container::new();
    container.set_connection("db", Arc::new(connection.clone()));
    let manager = RelationManager::new(Arc::new(meta())).with_container(Arc::new(container));
    register_models(&manager);
    manager
}

/// Load every fixture model so their relations are declared.
pub fn load_all(manager: &RelationManager) {
    for name in ["Robots", "RobotsParts", "Parts", "Cars", "Customers", "Invoices"] {
        manager.load(name).unwrap();
    }
}

pub fn binds(values: &[(&str, Value)]) -> BindParams {
    values
        .iter()
        .map(|(name, value)| ((*name).to_string(), value.clone()))
        .collect()
}
