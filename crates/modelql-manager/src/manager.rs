//! The relation manager.
//!
//! [`RelationManager`] is the registry every other part of ModelQL consults:
//! model classes and their initialization, per-model bindings (table,
//! schema, connection services, snapshot flags), the relation graph,
//! behaviors and events managers, and the memo of reusable related records.
//! It implements [`ModelsManager`], so queries compile and execute against
//! it directly.
//!
//! The manager is a cheap handle over shared state. Cloning it shares the
//! registries; every registry sits behind its own lock, and no lock is held
//! while a model's initialize hook runs, so hooks may call back into the
//! manager (including initializing other models).

use crate::finder::{ModelFinder, QueryFinder};
use crate::graph::RelationGraph;
use crate::model::{ModelClass, ModelId, default_source, short_name};
use crate::persister::TablePersister;
use crate::records::{RelationRecords, RetrieveMethod};
use crate::reusable::ReusableStore;
use modelql_core::{
    Behavior, BindParams, BindTypes, Connection, Container, Error, EventsManager, Fields,
    FindParameters, MemoryMetaData, MetaData, ModelBinding, ModelsManager, OrmOptions, Persister,
    Record, Relation, RelationErrorKind, RelationKind, RelationOptions, Result, Statement, Value,
};
use modelql_query::{Query, QueryBuilder, QueryResult, ResultsetResolver};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// Connection service used when a model names none.
pub const DEFAULT_CONNECTION_SERVICE: &str = "db";

/// Event fired after a model's initialize hook ran.
pub const AFTER_INITIALIZE_EVENT: &str = "modelsManager:afterInitialize";

const CONTAINER_REQUIRED: &str =
    "A dependency injection container is required to access the services related to the ORM";

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Clone, Default)]
struct BindingState {
    source: Option<String>,
    schema: Option<String>,
    read_service: Option<String>,
    write_service: Option<String>,
    keep_snapshots: bool,
    dynamic_update: bool,
}

struct Inner {
    options: RwLock<OrmOptions>,
    meta_data: RwLock<Arc<dyn MetaData>>,
    container: RwLock<Option<Arc<Container>>>,
    classes: RwLock<HashMap<ModelId, Arc<dyn ModelClass>>>,
    initialized: RwLock<HashSet<ModelId>>,
    last_initialized: RwLock<Option<String>>,
    graph: RwLock<RelationGraph>,
    bindings: RwLock<HashMap<ModelId, BindingState>>,
    behaviors: RwLock<HashMap<ModelId, Vec<Arc<dyn Behavior>>>>,
    events_manager: RwLock<Option<Arc<dyn EventsManager>>>,
    custom_events: RwLock<HashMap<ModelId, Arc<dyn EventsManager>>>,
    finder: RwLock<Arc<dyn ModelFinder>>,
    persister: RwLock<Arc<dyn Persister>>,
    reusable: ReusableStore,
}

/// Registry of models, relations and their bindings.
#[derive(Clone)]
pub struct RelationManager {
    inner: Arc<Inner>,
}

impl Default for RelationManager {
    fn default() -> Self {
        Self::new(Arc::new(MemoryMetaData::new()))
    }
}

impl fmt::Debug for RelationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationManager")
            .field("models", &read(&self.inner.classes).len())
            .field("initialized", &read(&self.inner.initialized).len())
            .field("reusable", &self.inner.reusable.len())
            .finish_non_exhaustive()
    }
}

impl RelationManager {
    pub fn new(meta_data: Arc<dyn MetaData>) -> Self {
        Self {
            inner: Arc::new(Inner {
                options: RwLock::new(OrmOptions::default()),
                meta_data: RwLock::new(meta_data),
                container: RwLock::new(None),
                classes: RwLock::new(HashMap::new()),
                initialized: RwLock::new(HashSet::new()),
                last_initialized: RwLock::new(None),
                graph: RwLock::new(RelationGraph::new()),
                bindings: RwLock::new(HashMap::new()),
                behaviors: RwLock::new(HashMap::new()),
                events_manager: RwLock::new(None),
                custom_events: RwLock::new(HashMap::new()),
                finder: RwLock::new(Arc::new(QueryFinder)),
                persister: RwLock::new(Arc::new(TablePersister)),
                reusable: ReusableStore::default(),
            }),
        }
    }

    pub fn with_options(self, options: OrmOptions) -> Self {
        self.set_options(options);
        self
    }

    pub fn with_container(self, container: Arc<Container>) -> Self {
        self.set_container(container);
        self
    }

    pub fn set_options(&self, options: OrmOptions) {
        *write(&self.inner.options) = options;
    }

    pub fn set_container(&self, container: Arc<Container>) {
        *write(&self.inner.container) = Some(container);
    }

    pub fn get_container(&self) -> Option<Arc<Container>> {
        read(&self.inner.container).clone()
    }

    pub fn set_meta_data(&self, meta_data: Arc<dyn MetaData>) {
        *write(&self.inner.meta_data) = meta_data;
    }

    /// Replace the finder used to load related records.
    pub fn set_model_finder(&self, finder: Arc<dyn ModelFinder>) {
        *write(&self.inner.finder) = finder;
    }

    pub fn model_finder(&self) -> Arc<dyn ModelFinder> {
        Arc::clone(&read(&self.inner.finder))
    }

    pub fn set_persister(&self, persister: Arc<dyn Persister>) {
        *write(&self.inner.persister) = persister;
    }

    /// The manager as the trait object queries hold.
    pub fn as_models_manager(&self) -> Arc<dyn ModelsManager> {
        Arc::new(self.clone())
    }

    // ==================== Lifecycle ====================

    /// Make a model class known without initializing it.
    pub fn register(&self, class: Arc<dyn ModelClass>) {
        let id = ModelId::new(class.name());
        debug!(model = %id, "model registered");
        write(&self.inner.classes).insert(id, class);
    }

    pub fn model_class(&self, name: &str) -> Option<Arc<dyn ModelClass>> {
        read(&self.inner.classes).get(&ModelId::new(name)).cloned()
    }

    /// Run a model's initialize hook unless it already ran.
    ///
    /// The model counts as initialized before its hook runs, so models that
    /// initialize each other terminate. Returns `Ok(false)` when the model
    /// was already initialized.
    #[tracing::instrument(level = "debug", skip_all, fields(model = model.name()))]
    pub fn initialize(&self, model: &dyn ModelClass) -> Result<bool> {
        if !write(&self.inner.initialized).insert(ModelId::new(model.name())) {
            return Ok(false);
        }

        model.initialize(self)?;
        *write(&self.inner.last_initialized) = Some(model.name().to_string());

        let events = read(&self.inner.events_manager).clone();
        if let Some(events) = events {
            events.fire(AFTER_INITIALIZE_EVENT, model.name(), None);
        }
        info!(model = model.name(), "model initialized");
        Ok(true)
    }

    pub fn is_initialized(&self, name: &str) -> bool {
        read(&self.inner.initialized).contains(&ModelId::new(name))
    }

    /// Name of the model whose initialization finished last.
    pub fn last_initialized(&self) -> Option<String> {
        read(&self.inner.last_initialized).clone()
    }

    /// The registered class of `name`, initialized.
    pub fn load(&self, name: &str) -> Result<Arc<dyn ModelClass>> {
        let class = self
            .model_class(name)
            .ok_or_else(|| Error::config(format!("Model '{}' could not be loaded", name)))?;
        self.initialize(class.as_ref())?;
        Ok(class)
    }

    // ==================== Bindings ====================

    fn binding_state(&self, model: &str) -> BindingState {
        read(&self.inner.bindings)
            .get(&ModelId::new(model))
            .cloned()
            .unwrap_or_default()
    }

    fn update_binding(&self, model: &str, update: impl FnOnce(&mut BindingState)) {
        update(write(&self.inner.bindings).entry(ModelId::new(model)).or_default());
    }

    pub fn set_model_source(&self, model: &str, source: impl Into<String>) {
        let source = source.into();
        self.update_binding(model, |state| state.source = Some(source));
    }

    /// Table of `model`, derived from its class name unless set.
    pub fn get_model_source(&self, model: &str) -> String {
        self.binding_state(model)
            .source
            .unwrap_or_else(|| default_source(model))
    }

    pub fn set_model_schema(&self, model: &str, schema: impl Into<String>) {
        let schema = schema.into();
        self.update_binding(model, |state| state.schema = Some(schema));
    }

    pub fn get_model_schema(&self, model: &str) -> Option<String> {
        self.binding_state(model).schema
    }

    /// Use `service` for both reads and writes of `model`.
    pub fn set_connection_service(&self, model: &str, service: impl Into<String>) {
        let service = service.into();
        self.update_binding(model, |state| {
            state.read_service = Some(service.clone());
            state.write_service = Some(service);
        });
    }

    pub fn set_read_connection_service(&self, model: &str, service: impl Into<String>) {
        let service = service.into();
        self.update_binding(model, |state| state.read_service = Some(service));
    }

    pub fn set_write_connection_service(&self, model: &str, service: impl Into<String>) {
        let service = service.into();
        self.update_binding(model, |state| state.write_service = Some(service));
    }

    pub fn get_read_connection_service(&self, model: &str) -> String {
        self.binding_state(model)
            .read_service
            .unwrap_or_else(|| DEFAULT_CONNECTION_SERVICE.to_string())
    }

    pub fn get_write_connection_service(&self, model: &str) -> String {
        self.binding_state(model)
            .write_service
            .unwrap_or_else(|| DEFAULT_CONNECTION_SERVICE.to_string())
    }

    pub fn keep_snapshots(&self, model: &str, keep: bool) {
        self.update_binding(model, |state| state.keep_snapshots = keep);
    }

    pub fn is_keeping_snapshots(&self, model: &str) -> bool {
        self.binding_state(model).keep_snapshots
    }

    /// Update only changed attributes. Enabling it also keeps snapshots.
    pub fn use_dynamic_update(&self, model: &str, dynamic_update: bool) {
        self.update_binding(model, |state| {
            state.dynamic_update = dynamic_update;
            if dynamic_update {
                state.keep_snapshots = true;
            }
        });
    }

    pub fn is_using_dynamic_update(&self, model: &str) -> bool {
        self.binding_state(model).dynamic_update
    }

    // ==================== Connections ====================

    fn service_connection(&self, service: &str) -> Result<Arc<dyn Connection>> {
        let container = self
            .get_container()
            .ok_or_else(|| Error::config(CONTAINER_REQUIRED))?;
        container.get_connection(service)
    }

    pub fn get_read_connection(&self, model: &str) -> Result<Arc<dyn Connection>> {
        self.service_connection(&self.get_read_connection_service(model))
    }

    pub fn get_write_connection(&self, model: &str) -> Result<Arc<dyn Connection>> {
        self.service_connection(&self.get_write_connection_service(model))
    }

    // ==================== Relations ====================

    fn add_direct(
        &self,
        kind: RelationKind,
        model: &str,
        fields: Fields,
        referenced_model: &str,
        referenced_fields: Fields,
        options: RelationOptions,
    ) -> Result<Arc<Relation>> {
        check_field_count(&fields, &referenced_fields)?;
        let alias = relation_alias(&options, referenced_model)?;
        let relation = Arc::new(Relation::new(
            kind,
            referenced_model,
            fields,
            referenced_fields,
            options,
        ));
        self.insert_relation(model, &alias, relation)
    }

    #[allow(clippy::too_many_arguments)]
    fn add_through(
        &self,
        kind: RelationKind,
        model: &str,
        fields: Fields,
        intermediate_model: &str,
        intermediate_fields: Fields,
        intermediate_referenced_fields: Fields,
        referenced_model: &str,
        referenced_fields: Fields,
        options: RelationOptions,
    ) -> Result<Arc<Relation>> {
        check_field_count(&fields, &intermediate_fields)?;
        check_field_count(&intermediate_referenced_fields, &referenced_fields)?;
        let alias = relation_alias(&options, referenced_model)?;
        let relation = Relation::new(kind, referenced_model, fields, referenced_fields, options);
        relation.set_intermediate_relation(
            intermediate_model,
            intermediate_fields,
            intermediate_referenced_fields,
        )?;
        self.insert_relation(model, &alias, Arc::new(relation))
    }

    fn insert_relation(&self, model: &str, alias: &str, relation: Arc<Relation>) -> Result<Arc<Relation>> {
        debug!(
            model,
            alias,
            kind = relation.kind().name(),
            referenced = relation.referenced_model(),
            "relation added"
        );
        write(&self.inner.graph).insert(&ModelId::new(model), alias, Arc::clone(&relation));
        Ok(relation)
    }

    /// `model` holds `fields` pointing at `referenced_fields` of
    /// `referenced_model`.
    pub fn add_belongs_to(
        &self,
        model: &str,
        fields: impl Into<Fields>,
        referenced_model: &str,
        referenced_fields: impl Into<Fields>,
        options: RelationOptions,
    ) -> Result<Arc<Relation>> {
        self.add_direct(
            RelationKind::BelongsTo,
            model,
            fields.into(),
            referenced_model,
            referenced_fields.into(),
            options,
        )
    }

    pub fn add_has_one(
        &self,
        model: &str,
        fields: impl Into<Fields>,
        referenced_model: &str,
        referenced_fields: impl Into<Fields>,
        options: RelationOptions,
    ) -> Result<Arc<Relation>> {
        self.add_direct(
            RelationKind::HasOne,
            model,
            fields.into(),
            referenced_model,
            referenced_fields.into(),
            options,
        )
    }

    pub fn add_has_many(
        &self,
        model: &str,
        fields: impl Into<Fields>,
        referenced_model: &str,
        referenced_fields: impl Into<Fields>,
        options: RelationOptions,
    ) -> Result<Arc<Relation>> {
        self.add_direct(
            RelationKind::HasMany,
            model,
            fields.into(),
            referenced_model,
            referenced_fields.into(),
            options,
        )
    }

    /// `model` reaches many `referenced_model` rows through the rows of
    /// `intermediate_model`.
    #[allow(clippy::too_many_arguments)]
    pub fn add_has_many_to_many(
        &self,
        model: &str,
        fields: impl Into<Fields>,
        intermediate_model: &str,
        intermediate_fields: impl Into<Fields>,
        intermediate_referenced_fields: impl Into<Fields>,
        referenced_model: &str,
        referenced_fields: impl Into<Fields>,
        options: RelationOptions,
    ) -> Result<Arc<Relation>> {
        self.add_through(
            RelationKind::HasManyThrough,
            model,
            fields.into(),
            intermediate_model,
            intermediate_fields.into(),
            intermediate_referenced_fields.into(),
            referenced_model,
            referenced_fields.into(),
            options,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_has_one_through(
        &self,
        model: &str,
        fields: impl Into<Fields>,
        intermediate_model: &str,
        intermediate_fields: impl Into<Fields>,
        intermediate_referenced_fields: impl Into<Fields>,
        referenced_model: &str,
        referenced_fields: impl Into<Fields>,
        options: RelationOptions,
    ) -> Result<Arc<Relation>> {
        self.add_through(
            RelationKind::HasOneThrough,
            model,
            fields.into(),
            intermediate_model,
            intermediate_fields.into(),
            intermediate_referenced_fields.into(),
            referenced_model,
            referenced_fields.into(),
            options,
        )
    }

    /// Case-insensitive lookup of a relation declared by `model`.
    pub fn get_relation_by_alias(&self, model: &str, alias: &str) -> Option<Arc<Relation>> {
        read(&self.inner.graph).by_alias(&ModelId::new(model), alias)
    }

    /// Relations from `first` to `second` of the first kind that has any, in
    /// the order belongs-to, has-many, has-one, has-one-through,
    /// has-many-to-many.
    pub fn get_relations_between(&self, first: &str, second: &str) -> Option<Vec<Arc<Relation>>> {
        read(&self.inner.graph).between(&ModelId::new(first), &ModelId::new(second))
    }

    /// Every relation declared by `model`.
    pub fn get_relations(&self, model: &str) -> Vec<Arc<Relation>> {
        read(&self.inner.graph).all(&ModelId::new(model))
    }

    fn of_model(&self, kind: RelationKind, model: &str) -> Vec<Arc<Relation>> {
        read(&self.inner.graph)
            .of_model(kind, &ModelId::new(model))
            .to_vec()
    }

    fn of_pair(&self, kind: RelationKind, model: &str, related: &str) -> Vec<Arc<Relation>> {
        read(&self.inner.graph)
            .of_pair(kind, &ModelId::new(model), &ModelId::new(related))
            .to_vec()
    }

    pub fn get_belongs_to(&self, model: &str) -> Vec<Arc<Relation>> {
        self.of_model(RelationKind::BelongsTo, model)
    }

    pub fn get_has_many(&self, model: &str) -> Vec<Arc<Relation>> {
        self.of_model(RelationKind::HasMany, model)
    }

    pub fn get_has_one(&self, model: &str) -> Vec<Arc<Relation>> {
        self.of_model(RelationKind::HasOne, model)
    }

    pub fn get_has_one_through(&self, model: &str) -> Vec<Arc<Relation>> {
        self.of_model(RelationKind::HasOneThrough, model)
    }

    pub fn get_has_many_to_many(&self, model: &str) -> Vec<Arc<Relation>> {
        self.of_model(RelationKind::HasManyThrough, model)
    }

    /// Has-one relations followed by has-many relations of `model`.
    pub fn get_has_one_and_has_many(&self, model: &str) -> Vec<Arc<Relation>> {
        let mut relations = self.get_has_one(model);
        relations.extend(self.get_has_many(model));
        relations
    }

    pub fn exists_belongs_to(&self, model: &str, related: &str) -> bool {
        !self.of_pair(RelationKind::BelongsTo, model, related).is_empty()
    }

    pub fn exists_has_many(&self, model: &str, related: &str) -> bool {
        !self.of_pair(RelationKind::HasMany, model, related).is_empty()
    }

    pub fn exists_has_one(&self, model: &str, related: &str) -> bool {
        !self.of_pair(RelationKind::HasOne, model, related).is_empty()
    }

    pub fn exists_has_one_through(&self, model: &str, related: &str) -> bool {
        !self.of_pair(RelationKind::HasOneThrough, model, related).is_empty()
    }

    pub fn exists_has_many_to_many(&self, model: &str, related: &str) -> bool {
        !self.of_pair(RelationKind::HasManyThrough, model, related).is_empty()
    }

    fn records_of_kind(
        &self,
        kind: RelationKind,
        model: &str,
        related: &str,
        owner: &Record,
        params: Option<FindParameters>,
        method: Option<RetrieveMethod>,
    ) -> Result<Option<RelationRecords>> {
        let Some(relation) = self.of_pair(kind, model, related).into_iter().next() else {
            return Ok(None);
        };
        self.get_relation_records(&relation, owner, params, method)
            .map(Some)
    }

    /// Records of `related` that `owner` (a `model` record) belongs to.
    /// `None` when no such relation is declared.
    pub fn get_belongs_to_records(
        &self,
        model: &str,
        related: &str,
        owner: &Record,
        params: Option<FindParameters>,
        method: Option<RetrieveMethod>,
    ) -> Result<Option<RelationRecords>> {
        self.records_of_kind(RelationKind::BelongsTo, model, related, owner, params, method)
    }

    pub fn get_has_many_records(
        &self,
        model: &str,
        related: &str,
        owner: &Record,
        params: Option<FindParameters>,
        method: Option<RetrieveMethod>,
    ) -> Result<Option<RelationRecords>> {
        self.records_of_kind(RelationKind::HasMany, model, related, owner, params, method)
    }

    pub fn get_has_one_records(
        &self,
        model: &str,
        related: &str,
        owner: &Record,
        params: Option<FindParameters>,
        method: Option<RetrieveMethod>,
    ) -> Result<Option<RelationRecords>> {
        self.records_of_kind(RelationKind::HasOne, model, related, owner, params, method)
    }

    pub fn get_has_one_through_records(
        &self,
        model: &str,
        related: &str,
        owner: &Record,
        params: Option<FindParameters>,
        method: Option<RetrieveMethod>,
    ) -> Result<Option<RelationRecords>> {
        self.records_of_kind(RelationKind::HasOneThrough, model, related, owner, params, method)
    }

    pub fn get_has_many_to_many_records(
        &self,
        model: &str,
        related: &str,
        owner: &Record,
        params: Option<FindParameters>,
        method: Option<RetrieveMethod>,
    ) -> Result<Option<RelationRecords>> {
        self.records_of_kind(RelationKind::HasManyThrough, model, related, owner, params, method)
    }

    /// AND-combine the conditions of `a` and `b`; every other setting of `b`
    /// overrides `a`.
    pub fn merge_find_parameters(&self, a: FindParameters, b: FindParameters) -> FindParameters {
        a.merge(b)
    }

    // ==================== Reusable records ====================

    pub fn get_reusable_records(&self, model: &str, key: u64) -> Option<RelationRecords> {
        let records = self.inner.reusable.get(key, self.as_models_manager());
        if records.is_some() {
            debug!(model, key, "reusable records hit");
        }
        records
    }

    /// Memoize `records`. A resultset is buffered in place.
    pub fn set_reusable_records(&self, model: &str, key: u64, records: &mut RelationRecords) -> Result<()> {
        debug!(model, key, "reusable records stored");
        self.inner.reusable.set(key, records)
    }

    pub fn clear_reusable_objects(&self) {
        self.inner.reusable.clear();
    }

    // ==================== Events ====================

    pub fn add_behavior(&self, model: &str, behavior: Arc<dyn Behavior>) {
        write(&self.inner.behaviors)
            .entry(ModelId::new(model))
            .or_default()
            .push(behavior);
    }

    fn behaviors_of(&self, model: &str) -> Vec<Arc<dyn Behavior>> {
        read(&self.inner.behaviors)
            .get(&ModelId::new(model))
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_events_manager(&self, events: Arc<dyn EventsManager>) {
        *write(&self.inner.events_manager) = Some(events);
    }

    pub fn get_events_manager(&self) -> Option<Arc<dyn EventsManager>> {
        read(&self.inner.events_manager).clone()
    }

    /// Events manager receiving only the events of `model`.
    pub fn set_custom_events_manager(&self, model: &str, events: Arc<dyn EventsManager>) {
        write(&self.inner.custom_events).insert(ModelId::new(model), events);
    }

    pub fn get_custom_events_manager(&self, model: &str) -> Option<Arc<dyn EventsManager>> {
        read(&self.inner.custom_events).get(&ModelId::new(model)).cloned()
    }

    /// Dispatch a method `record`'s model does not implement to its
    /// behaviors; the first answer wins.
    pub fn missing_method(&self, record: &mut Record, method: &str, args: &[Value]) -> Option<Value> {
        let model = record.model().to_string();
        self.behaviors_of(&model)
            .iter()
            .find_map(|behavior| behavior.missing_method(record, method, args))
    }

    // ==================== Queries ====================

    fn resultset_resolver(&self) -> ResultsetResolver {
        let manager = self.clone();
        Arc::new(move |model: &str| {
            manager
                .model_class(model)
                .and_then(|class| class.resultset_factory())
        })
    }

    /// A query over `statement`, with model resultset factories applied.
    pub fn create_query(&self, statement: Statement) -> Query {
        let mut query = Query::new(self.as_models_manager(), statement);
        query.set_resultset_resolver(self.resultset_resolver());
        query
    }

    /// A builder selecting from `model` with the criteria of `params`.
    pub fn create_builder(&self, model: &str, params: Option<&FindParameters>) -> QueryBuilder {
        match params {
            Some(params) => QueryBuilder::from_params(model, params),
            None => QueryBuilder::from_params(model, &FindParameters::default()),
        }
    }

    pub fn query_from_builder(&self, builder: &QueryBuilder) -> Result<Query> {
        let mut query = builder.get_query(self.as_models_manager())?;
        query.set_resultset_resolver(self.resultset_resolver());
        Ok(query)
    }

    pub fn execute_query(&self, statement: Statement, binds: &BindParams, types: &BindTypes) -> Result<QueryResult> {
        self.create_query(statement).execute(binds, types)
    }
}

fn check_field_count(fields: &Fields, referenced_fields: &Fields) -> Result<()> {
    if referenced_fields.is_compound() && referenced_fields.len() != fields.len() {
        return Err(Error::relation(
            RelationErrorKind::FieldCount,
            "Number of referenced fields are not the same",
        ));
    }
    Ok(())
}

fn relation_alias(options: &RelationOptions, referenced_model: &str) -> Result<String> {
    match options.alias.as_deref() {
        Some("") => Err(Error::relation(
            RelationErrorKind::InvalidAlias,
            "Relation alias must be a non-empty string",
        )),
        Some(alias) => Ok(alias.to_string()),
        None => Ok(short_name(referenced_model).to_lowercase()),
    }
}

impl ModelsManager for RelationManager {
    fn options(&self) -> OrmOptions {
        *read(&self.inner.options)
    }

    fn meta_data(&self) -> Arc<dyn MetaData> {
        Arc::clone(&read(&self.inner.meta_data))
    }

    fn container(&self) -> Option<Arc<Container>> {
        self.get_container()
    }

    fn binding(&self, model: &str) -> Result<ModelBinding> {
        let class = self.load(model)?;
        let name = class.name();
        let state = self.binding_state(name);
        Ok(ModelBinding {
            name: name.to_string(),
            source: state.source.unwrap_or_else(|| default_source(name)),
            schema: state.schema,
            read_connection_service: state
                .read_service
                .unwrap_or_else(|| DEFAULT_CONNECTION_SERVICE.to_string()),
            write_connection_service: state
                .write_service
                .unwrap_or_else(|| DEFAULT_CONNECTION_SERVICE.to_string()),
            keep_snapshots: state.keep_snapshots,
            dynamic_update: state.dynamic_update,
        })
    }

    fn relation_by_alias(&self, model: &str, alias: &str) -> Option<Arc<Relation>> {
        self.get_relation_by_alias(model, alias)
    }

    fn relations_between(&self, first: &str, second: &str) -> Option<Vec<Arc<Relation>>> {
        self.get_relations_between(first, second)
    }

    fn read_connection(&self, model: &str, binds: &BindParams) -> Result<Arc<dyn Connection>> {
        if let Some(connection) = self
            .model_class(model)
            .and_then(|class| class.select_read_connection(binds))
        {
            return Ok(connection);
        }
        self.get_read_connection(model)
    }

    fn write_connection(&self, model: &str, binds: &BindParams) -> Result<Arc<dyn Connection>> {
        if let Some(connection) = self
            .model_class(model)
            .and_then(|class| class.select_write_connection(binds))
        {
            return Ok(connection);
        }
        self.get_write_connection(model)
    }

    fn persister(&self) -> Arc<dyn Persister> {
        Arc::clone(&read(&self.inner.persister))
    }

    /// Behaviors first, then the global events manager as `model:<event>`,
    /// then the model's own events manager. The first `false` cancels.
    fn notify_event(&self, event: &str, record: &mut Record) -> bool {
        let model = record.model().to_string();
        for behavior in self.behaviors_of(&model) {
            if !behavior.notify(event, record) {
                return false;
            }
        }

        let qualified = format!("model:{}", event);
        let managers = [self.get_events_manager(), self.get_custom_events_manager(&model)];
        for events in managers.into_iter().flatten() {
            if !events.fire(&qualified, &model, Some(record)) {
                return false;
            }
        }
        true
    }
}
