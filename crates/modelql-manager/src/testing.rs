//! In-memory collaborators for unit tests.

use crate::finder::ModelFinder;
use crate::manager::RelationManager;
use crate::model::NamedModel;
use modelql_core::{BindType, Container, FindParameters, MemoryMetaData, ModelDescriptor, Result};
use modelql_query::{ResultRow, ResultShape, Resultset};
use std::sync::{Arc, Mutex};

pub use modelql_query::testing::MockConnection;

/// One call seen by a [`RecordingFinder`].
#[derive(Debug, Clone, PartialEq)]
pub struct FinderCall {
    pub method: &'static str,
    pub model: String,
    pub params: FindParameters,
}

/// Finder recording its calls and returning empty results.
#[derive(Debug, Default)]
pub struct RecordingFinder {
    pub calls: Mutex<Vec<FinderCall>>,
}

impl RecordingFinder {
    fn record(&self, method: &'static str, model: &str, params: FindParameters) {
        self.calls.lock().unwrap().push(FinderCall {
            method,
            model: model.to_string(),
            params,
        });
    }

    pub fn calls(&self) -> Vec<FinderCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl ModelFinder for RecordingFinder {
    fn find(&self, _manager: &RelationManager, model: &str, params: FindParameters) -> Result<Resultset> {
        self.record("find", model, params);
        Ok(Resultset::from_rows(ResultShape::Std, Vec::new()))
    }

    fn find_first(
        &self,
        _manager: &RelationManager,
        model: &str,
        params: FindParameters,
    ) -> Result<Option<ResultRow>> {
        self.record("findFirst", model, params);
        Ok(None)
    }

    fn count(&self, _manager: &RelationManager, model: &str, params: FindParameters) -> Result<i64> {
        self.record("count", model, params);
        Ok(3)
    }
}

fn descriptor(columns: &[&str]) -> ModelDescriptor {
    let mut descriptor = ModelDescriptor::new();
    for column in columns {
        let bind_type = if *column == "name" { BindType::Str } else { BindType::Int };
        descriptor = descriptor.column(*column, bind_type);
    }
    descriptor.primary_key(["id"]).identity("id")
}

/// A manager over `Robots`, `RobotsParts`, `Parts`, `Customers` and
/// `Invoices`, reading from `connection` through the `db` service.
pub fn manager_with(connection: &MockConnection) -> RelationManager {
    let meta = MemoryMetaData::new()
        .with_model("Robots", descriptor(&["id", "name", "year"]))
        .with_model("RobotsParts", descriptor(&["id", "robots_id", "parts_id"]))
        .with_model("Parts", descriptor(&["id", "name"]))
        .with_model("Customers", descriptor(&["id", "name"]))
        .with_model("Invoices", descriptor(&["id", "cst_id", "total"]));

    let container = Container::new();
    container.set_connection("db", Arc::new(connection.clone()));

    let manager = RelationManager::new(Arc::new(meta)).with_container(Arc::new(container));
    for name in ["Robots", "RobotsParts", "Parts", "Customers", "Invoices"] {
        manager.register(Arc::new(NamedModel::new(name)));
    }
    manager
}
