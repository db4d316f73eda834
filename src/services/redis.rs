//! Redis service for refresh-token sessions

use std::sync::Arc;

use redis::{aio::ConnectionManager, AsyncCommands, Client};
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;

use crate::error::{AppError, AppResult};

/// Clones share one reconnecting connection, opened on first use
#[derive(Clone)]
pub struct RedisService {
    client: Client,
    manager: Arc<OnceCell<ConnectionManager>>,
}

/// Session keys hold a SHA-256 digest of the token id, never the id itself
fn session_key(jti: &str) -> String {
    let digest = Sha256::digest(jti.as_bytes());
    format!("session:{}", hex::encode(digest))
}

fn user_sessions_key(user_id: i32) -> String {
    format!("sessions:user:{}", user_id)
}

impl RedisService {
    /// Create a client without connecting
    pub fn open(url: &str) -> AppResult<Self> {
        let client = Client::open(url)
            .map_err(|e| AppError::Internal(format!("Failed to create Redis client: {}", e)))?;
        Ok(Self {
            client,
            manager: Arc::new(OnceCell::new()),
        })
    }

    /// Create a new Redis service and check the server answers
    pub async fn new(url: &str) -> AppResult<Self> {
        let service = Self::open(url)?;
        service.ping().await?;
        Ok(service)
    }

    async fn connection(&self) -> AppResult<ConnectionManager> {
        let manager = self
            .manager
            .get_or_try_init(|| self.client.get_connection_manager())
            .await?;
        Ok(manager.clone())
    }

    pub async fn ping(&self) -> AppResult<()> {
        let mut conn = self.connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }

    /// Record a refresh session for `ttl_secs`
    pub async fn store_session(&self, user_id: i32, jti: &str, ttl_secs: u64) -> AppResult<()> {
        let mut conn = self.connection().await?;
        let key = session_key(jti);
        let index = user_sessions_key(user_id);

        redis::pipe()
            .atomic()
            .set_ex(&key, user_id, ttl_secs)
            .ignore()
            .sadd(&index, &key)
            .ignore()
            .expire(&index, ttl_secs as i64)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;

        Ok(())
    }

    /// Consume a session: returns its user id and deletes it, so a refresh
    /// token can be exchanged only once.
    pub async fn take_session(&self, jti: &str) -> AppResult<Option<i32>> {
        let mut conn = self.connection().await?;
        let key = session_key(jti);

        let user_id: Option<i32> = redis::cmd("GETDEL").arg(&key).query_async(&mut conn).await?;
        if let Some(user_id) = user_id {
            conn.srem::<_, _, ()>(user_sessions_key(user_id), &key).await?;
        }
        Ok(user_id)
    }

    /// Revoke one session; unknown sessions are ignored
    pub async fn revoke_session(&self, jti: &str) -> AppResult<()> {
        self.take_session(jti).await?;
        Ok(())
    }

    /// Revoke every session of a user
    pub async fn revoke_user_sessions(&self, user_id: i32) -> AppResult<usize> {
        let mut conn = self.connection().await?;
        let index = user_sessions_key(user_id);

        let keys: Vec<String> = conn.smembers(&index).await?;
        if !keys.is_empty() {
            conn.del::<_, ()>(&keys).await?;
        }
        conn.del::<_, ()>(&index).await?;

        Ok(keys.len())
    }
}
