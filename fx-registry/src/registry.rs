//! The generic, thread-safe keyed [`Registry`] of [`AsEntity`] values.
//!
//! All reads take a shared lock; all writes take an exclusive lock.
//! Iteration operations ([`Registry::list`], [`Registry::search`], ...)
//! snapshot the map under the shared lock and return an owned `Vec`, so
//! callers never hold a lock while iterating.
//!
//! Persistence is best-effort: a save/delete failure is logged via
//! [`HealthState::record_error`] and otherwise swallowed, never propagated
//! past `register`/`unregister`. Validation and not-found failures *are*
//! propagated, since they affect the caller's view of the outcome.

use std::{collections::HashMap, sync::RwLock};

use fx_common::AsEntity;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::{
    cache::TtlCache,
    error::RegistryError,
    health::HealthState,
    metrics::RegistryMetrics,
    observer::{Observer, RegistryEvent},
    persistence::Persistence,
    validator::{NoopValidator, Validator},
};

pub struct RegistryBuilder<E: AsEntity> {
    validator: Box<dyn Validator<E>>,
    cache: Option<TtlCache<E>>,
    persistence: Option<Box<dyn Persistence<E>>>,
    max_entities: Option<usize>,
    namespace: String,
}

impl<E: AsEntity + Serialize + DeserializeOwned> RegistryBuilder<E> {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            validator: Box::new(NoopValidator),
            cache: None,
            persistence: None,
            max_entities: None,
            namespace: namespace.into(),
        }
    }

    pub fn validator(mut self, validator: impl Validator<E> + 'static) -> Self {
        self.validator = Box::new(validator);
        self
    }

    pub fn cache(mut self, ttl: Option<std::time::Duration>) -> Self {
        self.cache = Some(TtlCache::new(ttl));
        self
    }

    pub fn persistence(mut self, persistence: impl Persistence<E> + 'static) -> Self {
        self.persistence = Some(Box::new(persistence));
        self
    }

    pub fn max_entities(mut self, max: usize) -> Self {
        self.max_entities = Some(max);
        self
    }

    pub fn build(self) -> Registry<E> {
        Registry {
            entities: RwLock::new(HashMap::new()),
            observers: RwLock::new(Vec::new()),
            validator: self.validator,
            cache: self.cache,
            persistence: self.persistence,
            max_entities: self.max_entities,
            metrics: RegistryMetrics::unregistered(&self.namespace),
            health: HealthState::new(),
        }
    }
}

/// A generic, thread-safe keyed store of [`AsEntity`] values.
pub struct Registry<E: AsEntity> {
    entities: RwLock<HashMap<String, E>>,
    observers: RwLock<Vec<Box<dyn Observer>>>,
    validator: Box<dyn Validator<E>>,
    cache: Option<TtlCache<E>>,
    persistence: Option<Box<dyn Persistence<E>>>,
    max_entities: Option<usize>,
    pub metrics: RegistryMetrics,
    pub health: HealthState,
}

impl<E> Registry<E>
where
    E: AsEntity + Serialize + DeserializeOwned,
{
    pub fn builder(namespace: impl Into<String>) -> RegistryBuilder<E> {
        RegistryBuilder::new(namespace)
    }

    pub fn add_observer(&self, observer: impl Observer + 'static) {
        self.observers.write().unwrap().push(Box::new(observer));
    }

    fn notify(&self, event: RegistryEvent) {
        for observer in self.observers.read().unwrap().iter() {
            observer.on_event(&event);
        }
    }

    /// Best-effort persists the full entity snapshot. Failures are logged
    /// and never surfaced to the caller.
    async fn persist_snapshot(&self) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        let snapshot = self.list();
        if let Err(e) = persistence.save_all(&snapshot).await {
            warn!(error = %e, "registry: persistence save failed");
            self.health.record_error(format!("save_all: {e:#}"));
        } else {
            self.health.record_success();
        }
    }

    async fn persist_delete(&self, id: &str) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        if let Err(e) = persistence.delete(id).await {
            warn!(error = %e, id, "registry: persistence delete failed");
            self.health.record_error(format!("delete: {e:#}"));
        } else {
            self.health.record_success();
        }
    }

    fn update_gauges(&self) {
        let entities = self.entities.read().unwrap();
        self.metrics.entity_count.set(entities.len() as i64);
        let active = entities.values().filter(|e| e.entity().active()).count();
        self.metrics.active_count.set(active as i64);
    }

    /// Loads the full entity set from the persistence backend into memory
    /// and the cache (if configured). Call once at startup.
    pub async fn load_from_persistence(&self) -> anyhow::Result<()> {
        let Some(persistence) = &self.persistence else {
            return Ok(());
        };
        let loaded = persistence.load_all().await?;
        let mut entities = self.entities.write().unwrap();
        for entity in loaded {
            if let Some(cache) = &self.cache {
                cache.put(entity.id().to_string(), entity.clone());
            }
            entities.insert(entity.id().to_string(), entity);
        }
        drop(entities);
        self.update_gauges();
        Ok(())
    }

    /// Registers `entity`, replacing any existing entry with the same id.
    pub async fn register(&self, entity: E) -> Result<(), RegistryError> {
        self.validator.validate(&entity)?;

        let id = entity.id().to_string();
        let existed = {
            let mut entities = self.entities.write().unwrap();
            if !entities.contains_key(&id) {
                if let Some(max) = self.max_entities {
                    if entities.len() >= max {
                        self.metrics.errors.inc();
                        return Err(RegistryError::CapacityExceeded { max });
                    }
                }
            }
            let existed = entities.insert(id.clone(), entity.clone()).is_some();
            existed
        };

        if let Some(cache) = &self.cache {
            cache.put(id.clone(), entity);
        }

        self.metrics.registrations.inc();
        self.update_gauges();
        self.notify(if existed {
            RegistryEvent::Updated { id: id.clone() }
        } else {
            RegistryEvent::Registered { id: id.clone() }
        });

        self.persist_snapshot().await;
        debug!(id, existed, "registry: registered entity");
        Ok(())
    }

    /// Returns the entity with id `id`, consulting the cache first.
    pub fn get(&self, id: &str) -> Result<E, RegistryError> {
        self.metrics.lookups.inc();
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(id) {
                return Ok(cached);
            }
        }
        let entities = self.entities.read().unwrap();
        let entity = entities
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        if let Some(cache) = &self.cache {
            cache.put(id.to_string(), entity.clone());
        }
        Ok(entity)
    }

    pub async fn unregister(&self, id: &str) -> Result<(), RegistryError> {
        let removed = self.entities.write().unwrap().remove(id);
        if removed.is_none() {
            self.metrics.errors.inc();
            return Err(RegistryError::NotFound(id.to_string()));
        }
        if let Some(cache) = &self.cache {
            cache.evict(id);
        }
        self.metrics.unregistrations.inc();
        self.update_gauges();
        self.notify(RegistryEvent::Unregistered { id: id.to_string() });
        self.persist_delete(id).await;
        Ok(())
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.entities.read().unwrap().contains_key(id)
    }

    pub fn list(&self) -> Vec<E> {
        self.entities.read().unwrap().values().cloned().collect()
    }

    pub fn list_active(&self) -> Vec<E> {
        self.entities
            .read()
            .unwrap()
            .values()
            .filter(|e| e.entity().active())
            .cloned()
            .collect()
    }

    pub fn list_by_metadata(&self, key: &str, value: &str) -> Vec<E> {
        self.entities
            .read()
            .unwrap()
            .values()
            .filter(|e| e.entity().get_metadata(key) == Some(value))
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.entities.read().unwrap().len()
    }

    pub fn count_active(&self) -> usize {
        self.list_active().len()
    }

    pub fn get_metadata(&self, id: &str, key: &str) -> Result<Option<String>, RegistryError> {
        let entity = self.get(id)?;
        Ok(entity.entity().get_metadata(key).map(str::to_string))
    }

    async fn mutate<F>(&self, id: &str, f: F) -> Result<(), RegistryError>
    where
        F: FnOnce(&mut E),
    {
        self.mutate_silent(id, f).await?;
        self.notify(RegistryEvent::Updated { id: id.to_string() });
        Ok(())
    }

    /// Like [`Self::mutate`] but does not emit `RegistryEvent::Updated` --
    /// for callers that emit their own, more specific event instead (e.g.
    /// `activate`/`deactivate`).
    async fn mutate_silent<F>(&self, id: &str, f: F) -> Result<(), RegistryError>
    where
        F: FnOnce(&mut E),
    {
        let mut entity = {
            let entities = self.entities.read().unwrap();
            entities
                .get(id)
                .cloned()
                .ok_or_else(|| RegistryError::NotFound(id.to_string()))?
        };
        f(&mut entity);
        self.validator.validate(&entity)?;

        self.entities
            .write()
            .unwrap()
            .insert(id.to_string(), entity.clone());
        if let Some(cache) = &self.cache {
            cache.put(id.to_string(), entity);
        }
        self.update_gauges();
        self.persist_snapshot().await;
        Ok(())
    }

    pub async fn set_metadata(
        &self,
        id: &str,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), RegistryError> {
        let (key, value) = (key.into(), value.into());
        self.mutate(id, |e| e.entity_mut().set_metadata(key, value))
            .await
    }

    pub async fn remove_metadata(&self, id: &str, key: &str) -> Result<(), RegistryError> {
        self.mutate(id, |e| {
            e.entity_mut().delete_metadata(key);
        })
        .await
    }

    pub async fn activate(&self, id: &str) -> Result<(), RegistryError> {
        self.mutate_silent(id, |e| e.entity_mut().set_active(true)).await?;
        self.notify(RegistryEvent::Activated { id: id.to_string() });
        Ok(())
    }

    pub async fn deactivate(&self, id: &str) -> Result<(), RegistryError> {
        self.mutate_silent(id, |e| e.entity_mut().set_active(false)).await?;
        self.notify(RegistryEvent::Deactivated { id: id.to_string() });
        Ok(())
    }

    /// Entities whose name contains `query` (case-insensitive substring).
    pub fn search(&self, query: &str) -> Vec<E> {
        let query = query.to_lowercase();
        self.entities
            .read()
            .unwrap()
            .values()
            .filter(|e| e.entity().name().to_lowercase().contains(&query))
            .cloned()
            .collect()
    }

    /// Entities whose metadata is a superset of `filter`.
    pub fn search_by_metadata(&self, filter: &HashMap<String, String>) -> Vec<E> {
        self.entities
            .read()
            .unwrap()
            .values()
            .filter(|e| {
                let metadata = e.entity().metadata();
                filter
                    .iter()
                    .all(|(k, v)| metadata.get(k).map(|mv| mv == v).unwrap_or(false))
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use fx_common::Entity;

    use super::*;
    use crate::validator::MetadataValidator;

    fn registry() -> Registry<Entity> {
        Registry::builder("test").build()
    }

    #[tokio::test]
    async fn register_then_get() {
        let registry = registry();
        let entity = Entity::new("id", "name").unwrap();
        registry.register(entity).await.unwrap();
        let fetched = registry.get("id").unwrap();
        assert_eq!(fetched.id(), "id");
    }

    #[tokio::test]
    async fn get_not_found() {
        let registry = registry();
        assert!(matches!(
            registry.get("missing").unwrap_err(),
            RegistryError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn unregister_removes_entity() {
        let registry = registry();
        registry
            .register(Entity::new("id", "name").unwrap())
            .await
            .unwrap();
        registry.unregister("id").await.unwrap();
        assert!(!registry.is_registered("id"));
    }

    #[tokio::test]
    async fn list_entities_are_all_registered() {
        let registry = registry();
        registry
            .register(Entity::new("a", "Alpha").unwrap())
            .await
            .unwrap();
        registry
            .register(Entity::new("b", "Beta").unwrap())
            .await
            .unwrap();
        for e in registry.list() {
            assert!(registry.is_registered(e.id()));
        }
    }

    #[tokio::test]
    async fn metadata_read_is_a_defensive_copy() {
        let registry = registry();
        let mut entity = Entity::new("id", "name").unwrap();
        entity.set_metadata("k", "v1");
        registry.register(entity).await.unwrap();

        let mut copy = registry.get("id").unwrap().metadata();
        copy.insert("k".to_string(), "v2".to_string());

        assert_eq!(registry.get_metadata("id", "k").unwrap().as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn capacity_exceeded() {
        let registry: Registry<Entity> = Registry::builder("test").max_entities(1).build();
        registry
            .register(Entity::new("a", "A").unwrap())
            .await
            .unwrap();
        let err = registry
            .register(Entity::new("b", "B").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::CapacityExceeded { max: 1 }));
    }

    #[tokio::test]
    async fn validator_rejects_invalid_entity() {
        let registry: Registry<Entity> = Registry::builder("test")
            .validator(MetadataValidator::new().require_key("owner"))
            .build();
        let err = registry
            .register(Entity::new("id", "name").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn search_matches_case_insensitive_substring() {
        let registry = registry();
        registry
            .register(Entity::new("id", "Hello World").unwrap())
            .await
            .unwrap();
        assert_eq!(registry.search("world").len(), 1);
        assert_eq!(registry.search("xyz").len(), 0);
    }

    #[tokio::test]
    async fn search_by_metadata_requires_superset() {
        let registry = registry();
        let mut entity = Entity::new("id", "name").unwrap();
        entity.set_metadata("source", "test");
        entity.set_metadata("from", "USD");
        registry.register(entity).await.unwrap();

        let mut filter = HashMap::new();
        filter.insert("source".to_string(), "test".to_string());
        assert_eq!(registry.search_by_metadata(&filter).len(), 1);

        filter.insert("from".to_string(), "EUR".to_string());
        assert_eq!(registry.search_by_metadata(&filter).len(), 0);
    }

    #[tokio::test]
    async fn activate_deactivate_flip_active_flag() {
        let registry = registry();
        registry
            .register(Entity::new("id", "name").unwrap())
            .await
            .unwrap();
        registry.deactivate("id").await.unwrap();
        assert!(!registry.get("id").unwrap().active());
        registry.activate("id").await.unwrap();
        assert!(registry.get("id").unwrap().active());
    }

    #[tokio::test]
    async fn observer_receives_events_in_order() {
        use std::sync::{Arc, Mutex};

        let registry = registry();
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        registry.add_observer(move |event: &RegistryEvent| {
            let label = match event {
                RegistryEvent::Registered { id } => format!("registered:{id}"),
                RegistryEvent::Updated { id } => format!("updated:{id}"),
                RegistryEvent::Unregistered { id } => format!("unregistered:{id}"),
                RegistryEvent::Activated { id } => format!("activated:{id}"),
                RegistryEvent::Deactivated { id } => format!("deactivated:{id}"),
            };
            seen_clone.lock().unwrap().push(label);
        });

        registry
            .register(Entity::new("id", "name").unwrap())
            .await
            .unwrap();
        registry.deactivate("id").await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.as_slice(), ["registered:id", "deactivated:id"]);
    }
}
