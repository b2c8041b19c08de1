//! The registry's persistence boundary: `save_all` / `load_all` / `delete` /
//! `clear`, plus two concrete adapters (file JSON, Redis key-per-entity).
//!
//! Persistence is best-effort from the registry's point of view: write
//! failures are logged by the caller, never propagated past `register` or
//! `unregister` (see [`crate::registry::Registry`]'s module docs).

use std::path::PathBuf;

use async_trait::async_trait;
use fx_common::AsEntity;
use serde::{de::DeserializeOwned, Serialize};

/// Abstract persistence boundary consumed by [`crate::registry::Registry`].
#[async_trait]
pub trait Persistence<E>: Send + Sync {
    async fn save_all(&self, entities: &[E]) -> anyhow::Result<()>;
    async fn load_all(&self) -> anyhow::Result<Vec<E>>;
    async fn delete(&self, id: &str) -> anyhow::Result<()>;
    async fn clear(&self) -> anyhow::Result<()>;
}

/// A persistence adapter that writes the whole entity set as a single JSON
/// array to a file, following the "persisted state layout" contract.
pub struct FilePersistence {
    path: PathBuf,
}

impl FilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl<E> Persistence<E> for FilePersistence
where
    E: Serialize + DeserializeOwned + AsEntity,
{
    async fn save_all(&self, entities: &[E]) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(entities)?;
        // Write to a temp file then rename, so a crash mid-write never
        // leaves a truncated/corrupt file behind.
        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    async fn load_all(&self) -> anyhow::Result<Vec<E>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, id: &str) -> anyhow::Result<()> {
        let mut entities: Vec<E> = self.load_all().await?;
        entities.retain(|e| e.id() != id);
        self.save_all(&entities).await
    }

    async fn clear(&self) -> anyhow::Result<()> {
        let empty: Vec<E> = Vec::new();
        self.save_all(&empty).await
    }
}

/// A persistence adapter storing one Redis key per entity, JSON-encoded,
/// under `<key_prefix><entity_id>`.
pub struct RedisPersistence {
    client: redis::Client,
    key_prefix: String,
    ttl: Option<std::time::Duration>,
}

impl RedisPersistence {
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
            ttl: None,
        }
    }

    pub fn with_ttl(mut self, ttl: std::time::Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    fn key(&self, id: &str) -> String {
        format!("{}{}", self.key_prefix, id)
    }

    async fn connection(&self) -> anyhow::Result<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl<E> Persistence<E> for RedisPersistence
where
    E: Serialize + DeserializeOwned + AsEntity,
{
    async fn save_all(&self, entities: &[E]) -> anyhow::Result<()> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        for entity in entities {
            let json = serde_json::to_string(entity)?;
            let key = self.key(entity.id());
            match self.ttl {
                Some(ttl) => {
                    let _: () = conn.set_ex(&key, json, ttl.as_secs().max(1)).await?;
                }
                None => {
                    let _: () = conn.set(&key, json).await?;
                }
            }
        }
        Ok(())
    }

    async fn load_all(&self) -> anyhow::Result<Vec<E>> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        let pattern = format!("{}*", self.key_prefix);
        let keys: Vec<String> = conn.keys(&pattern).await?;
        let mut entities = Vec::with_capacity(keys.len());
        for key in keys {
            let json: Option<String> = conn.get(&key).await?;
            if let Some(json) = json {
                entities.push(serde_json::from_str(&json)?);
            }
        }
        Ok(entities)
    }

    async fn delete(&self, id: &str) -> anyhow::Result<()> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        let _: () = conn.del(self.key(id)).await?;
        Ok(())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        let pattern = format!("{}*", self.key_prefix);
        let keys: Vec<String> = conn.keys(&pattern).await?;
        if !keys.is_empty() {
            let _: () = conn.del(keys).await?;
        }
        Ok(())
    }
}
