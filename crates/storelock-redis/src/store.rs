//! Redis implementation of the store contract.

use std::time::Duration;

use fred::prelude::*;
use fred::types::CustomCommand;

use storelock_core::store::{LockStore, StoreError, StoreResult};

use crate::scripts;

/// Grace margin added to the fair-queue TTL beyond the lease. Live
/// waiters re-stamp the TTL on every attempt; the margin only bounds
/// how long a crashed waiter's entry can linger.
const QUEUE_GRACE_MILLIS: i64 = 30_000;

pub(crate) fn backend_err(op: &str, err: RedisError) -> StoreError {
    StoreError::new(std::io::Error::other(format!(
        "redis {} failed: {}",
        op, err
    )))
}

/// [`LockStore`] over a single Redis server.
///
/// Plain acquisition is one `SET NX PX`; every other multi-step
/// operation runs as a Lua script from [`scripts`], so each store call
/// is one indivisible round trip.
#[derive(Clone)]
pub struct RedisStore {
    client: RedisClient,
}

impl RedisStore {
    /// Wraps an already-connected client.
    pub fn from_client(client: RedisClient) -> Self {
        Self { client }
    }

    /// Connects to the given Redis URL.
    pub async fn connect(url: impl Into<String>) -> StoreResult<Self> {
        crate::client::RedisStoreBuilder::new().url(url).build().await
    }

    pub fn client(&self) -> &RedisClient {
        &self.client
    }

    async fn eval(
        &self,
        op: &'static str,
        script: &'static str,
        keys: &[&str],
        argv: Vec<RedisValue>,
    ) -> StoreResult<i64> {
        let mut args: Vec<RedisValue> = Vec::with_capacity(2 + keys.len() + argv.len());
        args.push(script.into());
        args.push((keys.len() as i64).into());
        for key in keys {
            args.push((*key).into());
        }
        args.extend(argv);

        let cmd = CustomCommand::new_static("EVAL", None, false);
        self.client
            .custom(cmd, args)
            .await
            .map_err(|e| backend_err(op, e))
    }
}

impl LockStore for RedisStore {
    async fn acquire(&self, key: &str, token: &str, lease: Duration) -> StoreResult<bool> {
        let lease_millis = lease.as_millis() as i64;

        // SET NX PX is atomic on its own: set-if-absent and lease in one
        // command. The reply is the value on success, nil when held.
        let result: Option<String> = self
            .client
            .set(
                key,
                token,
                Some(Expiration::PX(lease_millis)),
                Some(SetOptions::NX),
                false,
            )
            .await
            .map_err(|e| backend_err("SET NX", e))?;

        Ok(result.is_some())
    }

    async fn release(&self, key: &str, token: &str) -> StoreResult<bool> {
        let result = self
            .eval("EVAL (release)", scripts::RELEASE, &[key], vec![token.into()])
            .await?;
        Ok(result == 1)
    }

    async fn renew(&self, key: &str, token: &str, lease: Duration) -> StoreResult<bool> {
        let lease_millis = lease.as_millis() as i64;
        let result = self
            .eval(
                "EVAL (renew)",
                scripts::RENEW,
                &[key],
                vec![token.into(), lease_millis.into()],
            )
            .await?;
        Ok(result == 1)
    }

    async fn reentrant_acquire(
        &self,
        key: &str,
        identity: &str,
        lease: Duration,
    ) -> StoreResult<bool> {
        let lease_millis = lease.as_millis() as i64;
        let result = self
            .eval(
                "EVAL (reentrant acquire)",
                scripts::REENTRANT_ACQUIRE,
                &[key],
                vec![identity.into(), lease_millis.into()],
            )
            .await?;
        Ok(result == 1)
    }

    async fn reentrant_release(&self, key: &str, identity: &str) -> StoreResult<bool> {
        let result = self
            .eval(
                "EVAL (reentrant release)",
                scripts::REENTRANT_RELEASE,
                &[key],
                vec![identity.into()],
            )
            .await?;
        Ok(result == 1)
    }

    async fn reentrant_renew(
        &self,
        key: &str,
        identity: &str,
        lease: Duration,
    ) -> StoreResult<bool> {
        let lease_millis = lease.as_millis() as i64;
        let result = self
            .eval(
                "EVAL (reentrant renew)",
                scripts::REENTRANT_RENEW,
                &[key],
                vec![identity.into(), lease_millis.into()],
            )
            .await?;
        Ok(result == 1)
    }

    async fn fair_acquire(
        &self,
        key: &str,
        queue_key: &str,
        token: &str,
        lease: Duration,
    ) -> StoreResult<bool> {
        let lease_millis = lease.as_millis() as i64;
        let result = self
            .eval(
                "EVAL (fair acquire)",
                scripts::FAIR_ACQUIRE,
                &[key, queue_key],
                vec![
                    token.into(),
                    lease_millis.into(),
                    (lease_millis + QUEUE_GRACE_MILLIS).into(),
                ],
            )
            .await?;
        Ok(result == 1)
    }

    async fn fair_abandon(&self, queue_key: &str, token: &str) -> StoreResult<()> {
        let _: i64 = self
            .client
            .lrem(queue_key, 0, token)
            .await
            .map_err(|e| backend_err("LREM", e))?;
        Ok(())
    }

    async fn read_acquire(
        &self,
        read_key: &str,
        write_key: &str,
        token: &str,
        lease: Duration,
    ) -> StoreResult<bool> {
        let lease_millis = lease.as_millis() as i64;
        let result = self
            .eval(
                "EVAL (read acquire)",
                scripts::READ_ACQUIRE,
                &[read_key, write_key],
                vec![token.into(), lease_millis.into()],
            )
            .await?;
        Ok(result == 1)
    }

    async fn read_release(&self, read_key: &str, token: &str) -> StoreResult<bool> {
        let result = self
            .eval(
                "EVAL (read release)",
                scripts::READ_RELEASE,
                &[read_key],
                vec![token.into()],
            )
            .await?;
        Ok(result == 1)
    }

    async fn read_renew(&self, read_key: &str, token: &str, lease: Duration) -> StoreResult<bool> {
        let lease_millis = lease.as_millis() as i64;
        let result = self
            .eval(
                "EVAL (read renew)",
                scripts::READ_RENEW,
                &[read_key],
                vec![token.into(), lease_millis.into()],
            )
            .await?;
        Ok(result == 1)
    }

    async fn write_acquire(
        &self,
        write_key: &str,
        read_key: &str,
        token: &str,
        lease: Duration,
    ) -> StoreResult<bool> {
        let lease_millis = lease.as_millis() as i64;
        let result = self
            .eval(
                "EVAL (write acquire)",
                scripts::WRITE_ACQUIRE,
                &[write_key, read_key],
                vec![token.into(), lease_millis.into()],
            )
            .await?;
        Ok(result == 1)
    }
}
