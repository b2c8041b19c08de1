//! Pluggable entity validation, run before every mutation the [`crate::Registry`]
//! applies.

use std::collections::HashMap;

use fx_common::AsEntity;

use crate::error::RegistryError;

/// A validator checked before `register`, `set_metadata`, and friends.
/// Implementations should be fast and side-effect free.
pub trait Validator<E: AsEntity>: Send + Sync {
    fn validate(&self, entity: &E) -> Result<(), RegistryError>;
}

/// A no-op validator, the default for registries that don't need one.
pub struct NoopValidator;

impl<E: AsEntity> Validator<E> for NoopValidator {
    fn validate(&self, _entity: &E) -> Result<(), RegistryError> {
        Ok(())
    }
}

/// A composable validator driven by required/forbidden metadata keys plus
/// per-key predicates, matching the enrichment-hook description in the
/// registry's operation table.
#[derive(Default)]
pub struct MetadataValidator {
    required_keys: Vec<String>,
    forbidden_keys: Vec<String>,
    predicates: HashMap<String, Box<dyn Fn(&str) -> bool + Send + Sync>>,
}

impl MetadataValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require_key(mut self, key: impl Into<String>) -> Self {
        self.required_keys.push(key.into());
        self
    }

    pub fn forbid_key(mut self, key: impl Into<String>) -> Self {
        self.forbidden_keys.push(key.into());
        self
    }

    pub fn with_predicate(
        mut self,
        key: impl Into<String>,
        predicate: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.predicates.insert(key.into(), Box::new(predicate));
        self
    }
}

impl<E: AsEntity> Validator<E> for MetadataValidator {
    fn validate(&self, entity: &E) -> Result<(), RegistryError> {
        let metadata = entity.entity().metadata();

        for key in &self.required_keys {
            if !metadata.contains_key(key) {
                return Err(RegistryError::ValidationFailed(format!(
                    "missing required metadata key '{key}'"
                )));
            }
        }

        for key in &self.forbidden_keys {
            if metadata.contains_key(key) {
                return Err(RegistryError::ValidationFailed(format!(
                    "forbidden metadata key '{key}' present"
                )));
            }
        }

        for (key, predicate) in &self.predicates {
            if let Some(value) = metadata.get(key) {
                if !predicate(value) {
                    return Err(RegistryError::ValidationFailed(format!(
                        "metadata key '{key}' failed validation predicate"
                    )));
                }
            }
        }

        Ok(())
    }
}
