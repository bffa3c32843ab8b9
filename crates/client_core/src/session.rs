//! Persistent pseudo-random client identity.
//!
//! The identifier is self-reported and unauthenticated; it only lets the
//! backend group votes by browser profile.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::domain::SessionId;
use storage::LocalStore;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

pub const SESSION_STORAGE_KEY: &str = "workshop-session";
const SESSION_SUFFIX_LEN: usize = 9;
const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// A single durable key/value slot owned by the local profile.
#[async_trait]
pub trait KeyValueSlot: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<String>>;
    async fn store(&self, key: &str, value: &str) -> Result<()>;
}

#[async_trait]
impl KeyValueSlot for LocalStore {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        self.get_value(key).await
    }

    async fn store(&self, key: &str, value: &str) -> Result<()> {
        self.put_value(key, value).await
    }
}

/// Process-local slot; the identity it hands out dies with the process.
#[derive(Default)]
pub struct MemorySlot {
    values: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl KeyValueSlot for MemorySlot {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn store(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

pub async fn get_or_create_session_id(slot: &dyn KeyValueSlot) -> Result<SessionId> {
    if let Some(existing) = slot.load(SESSION_STORAGE_KEY).await? {
        if !existing.trim().is_empty() {
            return Ok(SessionId(existing));
        }
    }

    let session = generate_session_id(Utc::now());
    slot.store(SESSION_STORAGE_KEY, session.as_str()).await?;
    info!("session: created new session id={session}");
    Ok(session)
}

/// `user-<unix millis>-<9 base36 chars>`.
pub fn generate_session_id(now: DateTime<Utc>) -> SessionId {
    let mut entropy = Uuid::new_v4().as_u128();
    let mut suffix = String::with_capacity(SESSION_SUFFIX_LEN);
    for _ in 0..SESSION_SUFFIX_LEN {
        suffix.push(BASE36[(entropy % 36) as usize] as char);
        entropy /= 36;
    }
    SessionId(format!("user-{}-{suffix}", now.timestamp_millis()))
}
