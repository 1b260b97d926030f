//! Connection setup for the Redis store backend.

use fred::prelude::*;
use tracing::debug;

use storelock_core::store::{StoreError, StoreResult};

use crate::store::RedisStore;

/// Builder for a connected [`RedisStore`].
pub struct RedisStoreBuilder {
    url: Option<String>,
    client: Option<RedisClient>,
}

impl RedisStoreBuilder {
    pub fn new() -> Self {
        Self {
            url: None,
            client: None,
        }
    }

    /// Sets the Redis server URL to connect to.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Uses an existing client instead of connecting from a URL.
    pub fn client(mut self, client: RedisClient) -> Self {
        self.client = Some(client);
        self
    }

    /// Builds the store, connecting if a URL was given.
    pub async fn build(self) -> StoreResult<RedisStore> {
        if let Some(client) = self.client {
            return Ok(RedisStore::from_client(client));
        }

        let Some(url) = self.url else {
            return Err(StoreError::new(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "no Redis client or URL provided",
            )));
        };

        let config = RedisConfig::from_url(&url).map_err(|e| {
            StoreError::new(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid Redis URL: {}", e),
            ))
        })?;

        let client = RedisClient::new(config, None, None, None);
        client.connect();
        client.wait_for_connect().await.map_err(|e| {
            StoreError::new(std::io::Error::other(format!(
                "failed to connect to Redis: {}",
                e
            )))
        })?;
        debug!(url = %url, "connected to Redis lock store");

        Ok(RedisStore::from_client(client))
    }
}

impl Default for RedisStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}
