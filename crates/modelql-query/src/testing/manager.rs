//! Models manager and persister doubles for this crate's unit tests.

use super::MockConnection;
use indexmap::IndexMap;
use modelql_core::relation::{Fields, Relation, RelationKind, RelationOptions};
use modelql_core::{
    BindParams, BindType, Connection, Container, MemoryMetaData, Message, MetaData, ModelBinding,
    ModelDescriptor, ModelsManager, OrmOptions, Persister, Record, Result, TableSource, Value,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Persister that refuses records whose `id` is listed.
#[derive(Default)]
pub struct MockPersister {
    failing: Mutex<Vec<i64>>,
}

impl MockPersister {
    fn refuses(&self, record: &mut Record) -> bool {
        let id = record.get("id").and_then(Value::as_i64);
        let refused = id.is_some_and(|id| self.failing.lock().unwrap().contains(&id));
        if let (true, Some(id)) = (refused, id) {
            record.append_message(Message::new(format!("Record {} refused the operation", id)));
        }
        refused
    }

    fn table(manager: &dyn ModelsManager, record: &Record) -> Result<TableSource> {
        Ok(manager.binding(record.model())?.table())
    }

    fn key(record: &Record) -> IndexMap<String, Value> {
        let mut key = IndexMap::new();
        key.insert("id".to_string(), record.read_attribute("id"));
        key
    }
}

impl Persister for MockPersister {
    fn create(&self, manager: &dyn ModelsManager, record: &mut Record, connection: &dyn Connection) -> Result<bool> {
        if self.refuses(record) {
            return Ok(false);
        }
        let table = Self::table(manager, record)?;
        connection.insert(&table, record.attributes())?;
        Ok(true)
    }

    fn update(&self, manager: &dyn ModelsManager, record: &mut Record, connection: &dyn Connection) -> Result<bool> {
        if self.refuses(record) {
            return Ok(false);
        }
        let table = Self::table(manager, record)?;
        connection.update(&table, record.attributes(), &Self::key(record))?;
        Ok(true)
    }

    fn delete(&self, manager: &dyn ModelsManager, record: &mut Record, connection: &dyn Connection) -> Result<bool> {
        if self.refuses(record) {
            return Ok(false);
        }
        let table = Self::table(manager, record)?;
        connection.delete(&table, &Self::key(record))?;
        Ok(true)
    }
}

/// A models manager over a fixed set of models.
///
/// Models: `Robots`, `RobotsParts`, `Parts` and `Cars`. `Robots` has many
/// `RobotsParts` (alias `robotsParts`) and many `Parts` through it (alias
/// `parts`). `Parts` belongs to `Robots` twice (aliases `maker` and
/// `tester`), so joining `Robots` from `Parts` is ambiguous.
pub struct MockManager {
    meta: Arc<MemoryMetaData>,
    options: OrmOptions,
    bindings: HashMap<String, ModelBinding>,
    relations: Vec<(String, Arc<Relation>)>,
    connection: MockConnection,
    connections: HashMap<String, MockConnection>,
    persister: Arc<MockPersister>,
    container: Option<Arc<Container>>,
}

impl MockManager {
    pub fn with_robots() -> Self {
        Self::fixture(robots())
    }

    /// The default fixture, which includes `Cars`.
    pub fn with_cars() -> Self {
        Self::with_robots()
    }

    /// `Robots` with columns renamed: `id` → `code`, `name` → `title`.
    pub fn with_renamed_robots() -> Self {
        Self::fixture(
            robots()
                .rename("id", "code")
                .rename("name", "title")
                .rename("type", "type")
                .rename("year", "year"),
        )
    }

    fn fixture(robots: ModelDescriptor) -> Self {
        let meta = MemoryMetaData::new()
            .with_model("Robots", robots)
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
            );

        let mut bindings = HashMap::new();
        for (name, source) in [
            ("Robots", "robots"),
            ("RobotsParts", "robots_parts"),
            ("Parts", "parts"),
            ("Cars", "cars"),
        ] {
            bindings.insert(
                name.to_lowercase(),
                ModelBinding {
                    name: name.to_string(),
                    source: source.to_string(),
                    schema: None,
                    read_connection_service: "db".to_string(),
                    write_connection_service: "db".to_string(),
                    keep_snapshots: false,
                    dynamic_update: false,
                },
            );
        }

        let many_parts = Relation::new(
            RelationKind::HasManyThrough,
            "Parts",
            Fields::from("id"),
            Fields::from("id"),
            RelationOptions::new().alias("parts"),
        );
        many_parts
            .set_intermediate_relation("RobotsParts", Fields::from("robots_id"), Fields::from("parts_id"))
            .unwrap();

        let relations = vec![
            (
                "Robots".to_string(),
                Arc::new(Relation::new(
                    RelationKind::HasMany,
                    "RobotsParts",
                    Fields::from("id"),
                    Fields::from("robots_id"),
                    RelationOptions::new().alias("robotsParts"),
                )),
            ),
            ("Robots".to_string(), Arc::new(many_parts)),
            (
                "Parts".to_string(),
                Arc::new(Relation::new(
                    RelationKind::BelongsTo,
                    "Robots",
                    Fields::from("maker_id"),
                    Fields::from("id"),
                    RelationOptions::new().alias("maker"),
                )),
            ),
            (
                "Parts".to_string(),
                Arc::new(Relation::new(
                    RelationKind::BelongsTo,
                    "Robots",
                    Fields::from("tester_id"),
                    Fields::from("id"),
                    RelationOptions::new().alias("tester"),
                )),
            ),
        ];

        Self {
            meta: Arc::new(meta),
            options: OrmOptions::default(),
            bindings,
            relations,
            connection: MockConnection::new(),
            connections: HashMap::new(),
            persister: Arc::new(MockPersister::default()),
            container: None,
        }
    }

    pub fn options(mut self, options: OrmOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_container(mut self, container: Arc<Container>) -> Self {
        self.container = Some(container);
        self
    }

    /// Serve `model` from its own connection.
    pub fn with_connection_for(mut self, model: &str, connection: MockConnection) -> Self {
        self.connections.insert(model.to_lowercase(), connection);
        self
    }

    /// The default connection, sharing its state with the manager's.
    pub fn connection(&self) -> MockConnection {
        self.connection.clone()
    }

    pub fn persister_fails_on(&self, id: i64) {
        self.persister.failing.lock().unwrap().push(id);
    }

    fn connection_for(&self, model: &str) -> Arc<dyn Connection> {
        let connection = self
            .connections
            .get(&model.to_lowercase())
            .unwrap_or(&self.connection);
        Arc::new(connection.clone())
    }
}

fn robots() -> ModelDescriptor {
    ModelDescriptor::new()
        .column("id", BindType::Int)
        .column("name", BindType::Str)
        .column("type", BindType::Str)
        .column("year", BindType::Int)
        .primary_key(["id"])
        .identity("id")
}

impl ModelsManager for MockManager {
    fn options(&self) -> OrmOptions {
        self.options
    }

    fn meta_data(&self) -> Arc<dyn MetaData> {
        self.meta.clone()
    }

    fn container(&self) -> Option<Arc<Container>> {
        self.container.clone()
    }

    fn binding(&self, model: &str) -> Result<ModelBinding> {
        self.bindings
            .get(&model.to_lowercase())
            .cloned()
            .ok_or_else(|| modelql_core::Error::config(format!("Model '{}' could not be loaded", model)))
    }

    fn relation_by_alias(&self, model: &str, alias: &str) -> Option<Arc<Relation>> {
        self.relations
            .iter()
            .find(|(owner, relation)| {
                owner.eq_ignore_ascii_case(model)
                    && relation.alias().is_some_and(|a| a.eq_ignore_ascii_case(alias))
            })
            .map(|(_, relation)| Arc::clone(relation))
    }

    fn relations_between(&self, first: &str, second: &str) -> Option<Vec<Arc<Relation>>> {
        let found: Vec<_> = self
            .relations
            .iter()
            .filter(|(owner, relation)| {
                owner.eq_ignore_ascii_case(first) && relation.referenced_model().eq_ignore_ascii_case(second)
            })
            .map(|(_, relation)| Arc::clone(relation))
            .collect();
        (!found.is_empty()).then_some(found)
    }

    fn read_connection(&self, model: &str, _binds: &BindParams) -> Result<Arc<dyn Connection>> {
        Ok(self.connection_for(model))
    }

    fn write_connection(&self, model: &str, _binds: &BindParams) -> Result<Arc<dyn Connection>> {
        Ok(self.connection_for(model))
    }

    fn persister(&self) -> Arc<dyn Persister> {
        self.persister.clone()
    }

    fn notify_event(&self, _event: &str, _record: &mut Record) -> bool {
        true
    }
}
