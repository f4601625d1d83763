//! Redis-backed cart store with WATCH/MULTI/EXEC optimistic concurrency.
//!
//! One key per user: `cart:{user_id}`, JSON-serialized, TTL refreshed on
//! every successful write. A write carries the version the caller last
//! observed; if the stored version has moved on, the write is rejected
//! without ever taking effect, and the caller is expected to refetch and
//! retry — the same contract the teacher's Redis stores use for their own
//! atomic check-and-record operations, generalized here to a full
//! read-check-mutate-write cycle via `WATCH`.

use crate::error::CartError;
use crate::types::{Cart, CART_TTL};
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

/// Outcome of a version-gated write attempt.
pub enum WriteOutcome {
    /// The write was applied; carries the resulting cart.
    Applied(Cart),
    /// `expected_version` didn't match what was stored (or the key didn't
    /// exist and `expected_version` wasn't 0). No mutation took effect.
    Conflict,
}

/// Redis-backed store for per-user carts.
#[derive(Clone)]
pub struct RedisCartStore {
    conn_manager: ConnectionManager,
}

impl RedisCartStore {
    /// Connect to Redis at `redis_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the client can't be constructed or the initial
    /// connection fails.
    pub async fn new(redis_url: &str) -> Result<Self, CartError> {
        let client = Client::open(redis_url)?;
        let conn_manager = ConnectionManager::new(client).await?;
        Ok(Self { conn_manager })
    }

    fn cart_key(user_id: &str) -> String {
        format!("cart:{user_id}")
    }

    /// Fetch the current cart for `user_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if Redis is unreachable or the stored value fails
    /// to deserialize.
    pub async fn get(&self, user_id: &str) -> Result<Option<Cart>, CartError> {
        let mut conn = self.conn_manager.clone();
        let bytes: Option<Vec<u8>> = conn.get(Self::cart_key(user_id)).await?;
        bytes.map(|bytes| serde_json::from_slice(&bytes).map_err(CartError::from)).transpose()
    }

    /// Run the optimistic-concurrency write protocol: `WATCH` the key, read
    /// and version-check the current value, apply `mutate` to produce the
    /// next cart, then `SET` it with a refreshed TTL inside `MULTI`/`EXEC`.
    ///
    /// `mutate` receives the current cart (`None` if the key is absent) and
    /// must return the cart to persist. It is only ever invoked once the
    /// version check has already passed.
    ///
    /// # Errors
    ///
    /// Returns an error if Redis is unreachable or the stored value is
    /// corrupt. A version mismatch is reported as `Ok(WriteOutcome::Conflict)`,
    /// not an error — the transaction detected the conflict cleanly, it
    /// didn't fail.
    pub async fn write<F>(
        &self,
        user_id: &str,
        expected_version: u64,
        mutate: F,
    ) -> Result<WriteOutcome, CartError>
    where
        F: FnOnce(Option<Cart>) -> Cart,
    {
        let key = Self::cart_key(user_id);
        let mut conn = self.conn_manager.clone();

        redis::cmd("WATCH").arg(&key).query_async::<_, ()>(&mut conn).await?;

        let current_bytes: Option<Vec<u8>> = conn.get(&key).await?;
        let current: Option<Cart> = current_bytes
            .as_deref()
            .map(serde_json::from_slice)
            .transpose()
            .map_err(CartError::from)?;

        let stored_version = current.as_ref().map_or(0, |cart| cart.version);
        if stored_version != expected_version {
            redis::cmd("UNWATCH").query_async::<_, ()>(&mut conn).await?;
            return Ok(WriteOutcome::Conflict);
        }

        let now = Utc::now();
        let mut next = mutate(current);
        next.version = stored_version + 1;
        next.updated_at = now;
        next.expires_at = now + CART_TTL;

        let payload = serde_json::to_vec(&next)?;
        #[allow(clippy::cast_possible_truncation)]
        let ttl_seconds = CART_TTL.num_seconds() as u64;

        let result: redis::Value = redis::pipe()
            .atomic()
            .set_ex(&key, payload, ttl_seconds)
            .query_async(&mut conn)
            .await?;

        // EXEC returns a nil reply (not an empty array) when the MULTI block
        // was aborted because a watched key changed between WATCH and EXEC.
        if matches!(result, redis::Value::Nil) {
            return Ok(WriteOutcome::Conflict);
        }

        Ok(WriteOutcome::Applied(next))
    }

    /// Delete a user's cart outright. Idempotent: deleting an already-absent
    /// cart is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if Redis is unreachable.
    pub async fn clear(&self, user_id: &str) -> Result<(), CartError> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn.del(Self::cart_key(user_id)).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // These tests exercise a live Redis instance and are skipped by default.
    // Run with: docker run -d -p 6379:6379 redis:7-alpine
    const REDIS_URL: &str = "redis://127.0.0.1:6379";

    #[tokio::test]
    #[ignore]
    async fn first_write_succeeds_only_at_expected_version_zero() {
        let store = RedisCartStore::new(REDIS_URL).await.unwrap();
        let user_id = format!("test:{}", uuid::Uuid::new_v4());

        let rejected = store.write(&user_id, 1, |current| current.unwrap_or_else(|| Cart::empty(user_id.clone(), "USD", Utc::now()))).await.unwrap();
        assert!(matches!(rejected, WriteOutcome::Conflict));

        let applied = store.write(&user_id, 0, |current| current.unwrap_or_else(|| Cart::empty(user_id.clone(), "USD", Utc::now()))).await.unwrap();
        assert!(matches!(applied, WriteOutcome::Applied(cart) if cart.version == 1));

        store.clear(&user_id).await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn stale_version_is_rejected_without_mutating() {
        let store = RedisCartStore::new(REDIS_URL).await.unwrap();
        let user_id = format!("test:{}", uuid::Uuid::new_v4());

        store.write(&user_id, 0, |_| Cart::empty(user_id.clone(), "USD", Utc::now())).await.unwrap();
        let second = store.write(&user_id, 0, |_| Cart::empty(user_id.clone(), "USD", Utc::now())).await.unwrap();
        assert!(matches!(second, WriteOutcome::Conflict));

        let current = store.get(&user_id).await.unwrap().unwrap();
        assert_eq!(current.version, 1);

        store.clear(&user_id).await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn ttl_is_refreshed_on_every_write() {
        let store = RedisCartStore::new(REDIS_URL).await.unwrap();
        let user_id = format!("test:{}", uuid::Uuid::new_v4());

        store.write(&user_id, 0, |_| Cart::empty(user_id.clone(), "USD", Utc::now())).await.unwrap();
        let first = store.get(&user_id).await.unwrap().unwrap();

        store.write(&user_id, 1, |current| current.unwrap()).await.unwrap();
        let second = store.get(&user_id).await.unwrap().unwrap();

        assert!(second.expires_at >= first.expires_at);
        store.clear(&user_id).await.unwrap();
    }
}
