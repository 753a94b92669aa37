//! Boundary to the hosted services this gateway delegates to.
//!
//! Identity, profiles, records and files live in a hosted backend reached
//! through [`hosted::HostedBackend`]; transactional mail goes through
//! [`sendgrid::SendGridMailer`]. Handlers only see the traits below.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BackendError;

pub mod hosted;
#[cfg(test)]
pub mod memory;
pub mod sendgrid;

pub type Record = Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: Identity,
}

fn active_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub role: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Search {
    pub columns: Vec<String>,
    pub term: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// Equality filters, free-text search, ordering and paging for a select.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordQuery {
    pub filters: Vec<(String, String)>,
    pub search: Option<Search>,
    pub order: Option<Order>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl RecordQuery {
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredObject {
    pub name: String,
    pub created_at: Option<String>,
    pub size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateMessage {
    pub to: String,
    pub from: String,
    pub reply_to: Option<String>,
    pub template_id: String,
    pub data: Value,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, BackendError>;

    async fn refresh(&self, refresh_token: &str) -> Result<Session, BackendError>;

    /// Resolve an access token to the identity it was issued for.
    async fn verify(&self, access_token: &str) -> Result<Identity, BackendError>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn profile(&self, user_id: &str) -> Result<Option<Profile>, BackendError>;
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn select(&self, table: &str, query: &RecordQuery) -> Result<Vec<Record>, BackendError>;

    async fn get(&self, table: &str, id: &str) -> Result<Option<Record>, BackendError>;

    async fn insert(&self, table: &str, record: Record) -> Result<Record, BackendError>;

    /// `Ok(None)` when no row has that id.
    async fn update(&self, table: &str, id: &str, patch: Record)
    -> Result<Option<Record>, BackendError>;

    /// `Ok(false)` when no row has that id.
    async fn delete(&self, table: &str, id: &str) -> Result<bool, BackendError>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` at `path` and return its public URL.
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, BackendError>;

    async fn list(
        &self,
        folder: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<StoredObject>, BackendError>;

    /// `Ok(false)` when nothing was stored at `path`.
    async fn remove(&self, path: &str) -> Result<bool, BackendError>;

    fn public_url(&self, path: &str) -> String;

    fn bucket(&self) -> &str;
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_template(&self, message: &TemplateMessage) -> Result<(), BackendError>;
}
