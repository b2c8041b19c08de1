//! Health reporting: last error, healthy flag, and a free-form status map,
//! updated as a side effect of registry operations.

use std::{
    collections::HashMap,
    sync::RwLock,
};

#[derive(Debug, Default)]
pub struct HealthState {
    healthy: RwLock<bool>,
    last_error: RwLock<Option<String>>,
    status: RwLock<HashMap<String, String>>,
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            healthy: RwLock::new(true),
            last_error: RwLock::new(None),
            status: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_healthy(&self) -> bool {
        *self.healthy.read().unwrap()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().unwrap().clone()
    }

    pub fn status(&self) -> HashMap<String, String> {
        self.status.read().unwrap().clone()
    }

    pub fn record_error(&self, error: impl std::fmt::Display) {
        *self.healthy.write().unwrap() = false;
        *self.last_error.write().unwrap() = Some(error.to_string());
    }

    pub fn record_success(&self) {
        *self.healthy.write().unwrap() = true;
    }

    pub fn set_status(&self, key: impl Into<String>, value: impl Into<String>) {
        self.status.write().unwrap().insert(key.into(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_healthy() {
        let health = HealthState::new();
        assert!(health.is_healthy());
        assert!(health.last_error().is_none());
    }

    #[test]
    fn record_error_marks_unhealthy() {
        let health = HealthState::new();
        health.record_error("boom");
        assert!(!health.is_healthy());
        assert_eq!(health.last_error().as_deref(), Some("boom"));
        health.record_success();
        assert!(health.is_healthy());
    }
}
