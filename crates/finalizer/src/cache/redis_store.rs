use async_trait::async_trait;
use redis::{Client, aio::ConnectionManager};
use tokio::sync::RwLock;
use tracing::info;

use super::store::{CacheStore, closed};
use crate::error::{Error, Result};

pub struct RedisStore {
    manager: RwLock<Option<ConnectionManager>>,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url).map_err(Error::redis)?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(Error::redis)?;
        info!("connected to redis");

        Ok(Self {
            manager: RwLock::new(Some(manager)),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        self.manager.read().await.clone().ok_or_else(closed)
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut self.connection().await?)
            .await
            .map_err(Error::redis)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async::<_, ()>(&mut self.connection().await?)
            .await
            .map_err(Error::redis)
    }

    async fn set_many(&self, entries: &[(String, String)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut cmd = redis::cmd("MSET");
        for (key, value) in entries {
            cmd.arg(key).arg(value);
        }
        cmd.query_async::<_, ()>(&mut self.connection().await?)
            .await
            .map_err(Error::redis)
    }

    async fn close(&self) -> Result<()> {
        if self.manager.write().await.take().is_some() {
            info!("closed redis connection");
        }
        Ok(())
    }
}
