//! Single-record writes over a connection's table primitives.

use indexmap::IndexMap;
use modelql_core::{
    Connection, DirtyState, Error, MetaData, ModelsManager, Persister, Record, Result, Value,
};
use tracing::{debug, trace};

/// Persists records through [`Connection::insert`], [`Connection::update`]
/// and [`Connection::delete`], firing the model events around each write.
///
/// Column maps are honored in both directions. The identity value returned
/// by an insert is written back to the record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TablePersister;

struct Columns {
    map: Option<IndexMap<String, String>>,
}

impl Columns {
    fn of(meta: &dyn MetaData, model: &str) -> Self {
        Self {
            map: meta.get_column_map(model),
        }
    }

    fn attribute<'a>(&'a self, column: &'a str) -> &'a str {
        self.map
            .as_ref()
            .and_then(|map| map.get(column))
            .map_or(column, String::as_str)
    }
}

fn fire(manager: &dyn ModelsManager, events: &[&str], record: &mut Record) -> bool {
    for event in events {
        if !manager.notify_event(event, record) {
            debug!(event = *event, model = record.model(), "operation cancelled by event");
            return false;
        }
    }
    true
}

fn key_conditions(meta: &dyn MetaData, columns: &Columns, record: &Record) -> Result<IndexMap<String, Value>> {
    let primary = meta.get_primary_key_attributes(record.model());
    if primary.is_empty() {
        return Err(Error::config(format!(
            "A primary key must be defined in the model '{}' in order to perform the operation",
            record.model()
        )));
    }
    Ok(primary
        .into_iter()
        .map(|column| {
            let value = record.read_attribute(columns.attribute(&column));
            (column, value)
        })
        .collect())
}

impl Persister for TablePersister {
    fn create(&self, manager: &dyn ModelsManager, record: &mut Record, connection: &dyn Connection) -> Result<bool> {
        if !fire(manager, &["beforeSave", "beforeCreate"], record) {
            return Ok(false);
        }
        let binding = manager.binding(record.model())?;
        let meta = manager.meta_data();
        let columns = Columns::of(meta.as_ref(), record.model());
        let identity = meta.get_identity_field(record.model());

        let mut values = IndexMap::new();
        for column in meta.get_attributes(record.model()) {
            let value = record.read_attribute(columns.attribute(&column));
            if identity.as_deref() == Some(column.as_str()) && matches!(value, Value::Null) {
                continue;
            }
            values.insert(column, value);
        }

        let generated = connection.insert(&binding.table(), &values)?;
        if let (Some(identity), Some(id)) = (identity, generated) {
            let attribute = columns.attribute(&identity).to_string();
            record.set(attribute, id);
        }
        record.set_dirty_state(DirtyState::Persistent);
        if binding.keep_snapshots {
            record.take_snapshot();
        }
        trace!(model = record.model(), "record created");
        fire(manager, &["afterCreate", "afterSave"], record);
        Ok(true)
    }

    fn update(&self, manager: &dyn ModelsManager, record: &mut Record, connection: &dyn Connection) -> Result<bool> {
        if !fire(manager, &["beforeSave", "beforeUpdate"], record) {
            return Ok(false);
        }
        let binding = manager.binding(record.model())?;
        let meta = manager.meta_data();
        let columns = Columns::of(meta.as_ref(), record.model());
        let conditions = key_conditions(meta.as_ref(), &columns, record)?;

        let changed = (binding.dynamic_update && record.has_snapshot()).then(|| record.changed_fields());
        let mut values = IndexMap::new();
        for column in meta.get_non_primary_key_attributes(record.model()) {
            let attribute = columns.attribute(&column);
            if changed
                .as_ref()
                .is_some_and(|changed| !changed.iter().any(|name| name == attribute))
            {
                continue;
            }
            let value = record.read_attribute(attribute);
            values.insert(column, value);
        }

        if values.is_empty() {
            trace!(model = record.model(), "nothing to update");
        } else {
            connection.update(&binding.table(), &values, &conditions)?;
        }
        if binding.keep_snapshots {
            record.take_snapshot();
        }
        fire(manager, &["afterUpdate", "afterSave"], record);
        Ok(true)
    }

    fn delete(&self, manager: &dyn ModelsManager, record: &mut Record, connection: &dyn Connection) -> Result<bool> {
        if !fire(manager, &["beforeDelete"], record) {
            return Ok(false);
        }
        let binding = manager.binding(record.model())?;
        let meta = manager.meta_data();
        let columns = Columns::of(meta.as_ref(), record.model());
        let conditions = key_conditions(meta.as_ref(), &columns, record)?;

        connection.delete(&binding.table(), &conditions)?;
        record.set_dirty_state(DirtyState::Detached);
        fire(manager, &["afterDelete"], record);
        Ok(true)
    }
}
