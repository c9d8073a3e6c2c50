//! A minimal service locator.
//!
//! Connections and caches are resolved by service name (`"db"`,
//! `"modelsCache"`, ...) at the moment they are needed, so applications can
//! swap them per request.

use crate::Result;
use crate::cache::Cache;
use crate::connection::Connection;
use crate::error::Error;
use crate::events::EventsManager;
use crate::metadata::MetaData;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// A registered service.
#[derive(Clone)]
pub enum Service {
    Connection(Arc<dyn Connection>),
    Cache(Arc<dyn Cache>),
    MetaData(Arc<dyn MetaData>),
    EventsManager(Arc<dyn EventsManager>),
    /// Plain configuration value
    Value(serde_json::Value),
}

impl Service {
    fn kind(&self) -> &'static str {
        match self {
            Service::Connection(_) => "connection",
            Service::Cache(_) => "cache",
            Service::MetaData(_) => "metadata",
            Service::EventsManager(_) => "events manager",
            Service::Value(_) => "value",
        }
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Service({})", self.kind())
    }
}

/// Services keyed by name.
#[derive(Debug, Default)]
pub struct Container {
    services: RwLock<HashMap<String, Service>>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: impl Into<String>, service: Service) {
        self.services
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.into(), service);
    }

    pub fn set_connection(&self, name: impl Into<String>, connection: Arc<dyn Connection>) {
        self.set(name, Service::Connection(connection));
    }

    pub fn set_cache(&self, name: impl Into<String>, cache: Arc<dyn Cache>) {
        self.set(name, Service::Cache(cache));
    }

    pub fn get(&self, name: &str) -> Option<Service> {
        self.services
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.services
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(name)
    }

    pub fn remove(&self, name: &str) -> Option<Service> {
        self.services
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name)
    }

    fn require(&self, name: &str) -> Result<Service> {
        self.get(name).ok_or_else(|| {
            Error::config(format!(
                "Service '{}' wasn't found in the dependency injection container",
                name
            ))
        })
    }

    /// Resolve a connection service.
    pub fn get_connection(&self, name: &str) -> Result<Arc<dyn Connection>> {
        match self.require(name)? {
            Service::Connection(connection) => Ok(connection),
            other => {
                tracing::debug!(service = %name, kind = other.kind(), "service is not a connection");
                Err(Error::config("Invalid injected connection service"))
            }
        }
    }

    /// Resolve a cache service.
    pub fn get_cache(&self, name: &str) -> Result<Arc<dyn Cache>> {
        match self.require(name)? {
            Service::Cache(cache) => Ok(cache),
            _ => Err(Error::config("Cache service must be an object")),
        }
    }

    pub fn get_meta_data(&self, name: &str) -> Option<Arc<dyn MetaData>> {
        match self.get(name) {
            Some(Service::MetaData(meta)) => Some(meta),
            _ => None,
        }
    }

    pub fn get_events_manager(&self, name: &str) -> Option<Arc<dyn EventsManager>> {
        match self.get(name) {
            Some(Service::EventsManager(events)) => Some(events),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    #[test]
    fn missing_service_is_a_config_error() {
        let container = Container::new();
        let err = container.get_connection("db").err().unwrap();
        assert!(err.message().contains("'db'"));
    }

    #[test]
    fn wrong_service_kind_is_rejected() {
        let container = Container::new();
        container.set("db", Service::Value(serde_json::json!("sqlite://")));
        let err = container.get_connection("db").err().unwrap();
        assert_eq!(err.message(), "Invalid injected connection service");
    }

    #[test]
    fn cache_service_resolves() {
        let container = Container::new();
        container.set_cache("modelsCache", Arc::new(MemoryCache::new()));
        assert!(container.has("modelsCache"));
        assert!(container.get_cache("modelsCache").is_ok());
        assert!(container.remove("modelsCache").is_some());
    }
}
