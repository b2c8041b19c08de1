//! A bounded, TTL-based in-memory cache sitting in front of the registry's
//! authoritative store.

use std::{
    collections::HashMap,
    sync::RwLock,
    time::{Duration, Instant},
};

use fx_common::AsEntity;

struct CacheEntry<E> {
    value: E,
    expires_at: Option<Instant>,
}

/// An in-memory TTL cache. `ttl = None` means entries never expire, the
/// idiomatic equivalent of the "-1 means never expires" sentinel.
pub struct TtlCache<E> {
    ttl: Option<Duration>,
    entries: RwLock<HashMap<String, CacheEntry<E>>>,
}

impl<E: AsEntity> TtlCache<E> {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, id: &str) -> Option<E> {
        let entries = self.entries.read().unwrap();
        let entry = entries.get(id)?;
        if let Some(expires_at) = entry.expires_at {
            if Instant::now() >= expires_at {
                return None;
            }
        }
        Some(entry.value.clone())
    }

    pub fn put(&self, id: String, value: E) {
        let expires_at = self.ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .write()
            .unwrap()
            .insert(id, CacheEntry { value, expires_at });
    }

    pub fn evict(&self, id: &str) {
        self.entries.write().unwrap().remove(id);
    }

    pub fn clear(&self) {
        self.entries.write().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use fx_common::Entity;

    use super::*;

    #[test]
    fn never_expires_when_ttl_none() {
        let cache = TtlCache::<Entity>::new(None);
        let e = Entity::new("id", "name").unwrap();
        cache.put("id".to_string(), e);
        assert!(cache.get("id").is_some());
    }

    #[test]
    fn expires_after_ttl() {
        let cache = TtlCache::<Entity>::new(Some(Duration::from_millis(10)));
        let e = Entity::new("id", "name").unwrap();
        cache.put("id".to_string(), e);
        assert!(cache.get("id").is_some());
        std::thread::sleep(Duration::from_millis(30));
        assert!(cache.get("id").is_none());
    }

    #[test]
    fn evict_removes_entry() {
        let cache = TtlCache::<Entity>::new(None);
        let e = Entity::new("id", "name").unwrap();
        cache.put("id".to_string(), e);
        cache.evict("id");
        assert!(cache.get("id").is_none());
    }
}
