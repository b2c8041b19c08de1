//! [`Entity`]: the keyed, named record with metadata and lifecycle timestamps
//! that every registry (rate cache entries, checkout sessions, ...) stores.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::time::TimestampMs;

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum EntityError {
    #[error("entity id must not be empty")]
    EmptyId,
    #[error("entity name must not be empty")]
    EmptyName,
}

/// A keyed, named record with metadata and lifecycle timestamps.
///
/// `id` and `name` are immutable from the outside except via [`Self::rename`],
/// which (like every other mutator) bumps `updated_at`. `created_at` never
/// changes after construction. Reads of `metadata` always return a defensive
/// copy -- see [`Self::metadata`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    id: String,
    name: String,
    active: bool,
    metadata: HashMap<String, String>,
    created_at: TimestampMs,
    updated_at: TimestampMs,
}

impl Entity {
    /// Constructs a new, active `Entity` with the current time as both
    /// `created_at` and `updated_at`.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Result<Self, EntityError> {
        let id = id.into();
        let name = name.into();
        if id.is_empty() {
            return Err(EntityError::EmptyId);
        }
        if name.is_empty() {
            return Err(EntityError::EmptyName);
        }
        let now = TimestampMs::now();
        Ok(Self {
            id,
            name,
            active: true,
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn created_at(&self) -> TimestampMs {
        self.created_at
    }

    pub fn updated_at(&self) -> TimestampMs {
        self.updated_at
    }

    /// Returns a defensive copy of this entity's metadata. Mutating the
    /// returned map never mutates subsequent reads of `self`.
    pub fn metadata(&self) -> HashMap<String, String> {
        self.metadata.clone()
    }

    pub fn get_metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
        self.touch();
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
        self.touch();
    }

    pub fn delete_metadata(&mut self, key: &str) -> Option<String> {
        let removed = self.metadata.remove(key);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    pub fn clear_metadata(&mut self) {
        if !self.metadata.is_empty() {
            self.metadata.clear();
            self.touch();
        }
    }

    /// Renames this entity. The only externally-visible way to mutate `name`.
    pub fn rename(&mut self, name: impl Into<String>) -> Result<(), EntityError> {
        let name = name.into();
        if name.is_empty() {
            return Err(EntityError::EmptyName);
        }
        self.name = name;
        self.touch();
        Ok(())
    }

    /// Bumps `updated_at` to the current time. Called by every mutator.
    pub fn touch(&mut self) {
        self.updated_at = TimestampMs::now();
    }
}

/// Implemented by every type embedding an [`Entity`], so a single generic
/// [`fx_registry::Registry<E>`] can store rate-cache entries, checkout
/// sessions, or any other entity kind without runtime type checks.
///
/// [`fx_registry::Registry<E>`]: ../../fx_registry/struct.Registry.html
pub trait AsEntity: Clone + Send + Sync + 'static {
    fn entity(&self) -> &Entity;
    fn entity_mut(&mut self) -> &mut Entity;

    fn id(&self) -> &str {
        self.entity().id()
    }
}

impl AsEntity for Entity {
    fn entity(&self) -> &Entity {
        self
    }

    fn entity_mut(&mut self) -> &mut Entity {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_id_or_name() {
        assert_eq!(Entity::new("", "name").unwrap_err(), EntityError::EmptyId);
        assert_eq!(Entity::new("id", "").unwrap_err(), EntityError::EmptyName);
    }

    #[test]
    fn metadata_reads_are_defensive_copies() {
        let mut e = Entity::new("id", "name").unwrap();
        e.set_metadata("k", "v1");
        let mut copy = e.metadata();
        copy.insert("k".to_string(), "v2".to_string());
        assert_eq!(e.get_metadata("k"), Some("v1"));
    }

    #[test]
    fn mutations_bump_updated_at() {
        let mut e = Entity::new("id", "name").unwrap();
        let created = e.created_at();
        std::thread::sleep(std::time::Duration::from_millis(5));
        e.set_active(false);
        assert!(e.updated_at() > created);
        assert_eq!(e.created_at(), created);
    }

    #[test]
    fn json_roundtrip_preserves_fields() {
        let mut e = Entity::new("id", "name").unwrap();
        e.set_metadata("k", "v");
        let json = serde_json::to_string(&e).unwrap();
        let back: Entity = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id(), e.id());
        assert_eq!(back.name(), e.name());
        assert_eq!(back.active(), e.active());
        assert_eq!(back.metadata(), e.metadata());
        assert_eq!(back.created_at(), e.created_at());
        assert_eq!(back.updated_at(), e.updated_at());
    }
}
