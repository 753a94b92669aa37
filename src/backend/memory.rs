// In-process stand-ins for the hosted services, used by handler tests

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use super::{
    EmailSender, Identity, IdentityProvider, ObjectStore, Profile, ProfileStore, Record,
    RecordQuery, RecordStore, Session, StoredObject, TemplateMessage,
};
use crate::error::BackendError;

struct Account {
    email: String,
    password: String,
    session: Session,
}

#[derive(Default)]
pub struct MemoryBackend {
    accounts: Mutex<Vec<Account>>,
    profiles: Mutex<HashMap<String, Profile>>,
    tables: Mutex<HashMap<String, Vec<Record>>>,
    objects: Mutex<BTreeMap<String, usize>>,
    next_id: AtomicU64,
}

fn rejected(service: &'static str, status: u16, message: &str) -> BackendError {
    BackendError::Rejected {
        service,
        status,
        message: message.to_string(),
    }
}

fn field_text(record: &Record, column: &str) -> Option<String> {
    match record.get(column)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

impl MemoryBackend {
    /// Register an account whose access token is `token-<id>`.
    pub fn with_user(self, id: &str, email: &str, password: &str, role: &str) -> Self {
        self.accounts.lock().unwrap().push(Account {
            email: email.to_string(),
            password: password.to_string(),
            session: Session {
                access_token: format!("token-{id}"),
                refresh_token: format!("refresh-{id}"),
                expires_at: Some(1_900_000_000),
                user: Identity {
                    id: id.to_string(),
                    email: Some(email.to_string()),
                },
            },
        });
        self.profiles.lock().unwrap().insert(
            id.to_string(),
            Profile {
                role: role.to_string(),
                username: Some(format!("{role}-user")),
                is_active: true,
            },
        );
        self
    }

    /// Register an account without a profile row.
    pub fn with_account_only(self, id: &str, email: &str, password: &str) -> Self {
        let backend = self.with_user(id, email, password, "viewer");
        backend.profiles.lock().unwrap().remove(id);
        backend
    }

    pub fn with_record(self, table: &str, record: Record) -> Self {
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(record);
        self
    }

    pub fn with_object(self, path: &str) -> Self {
        self.objects.lock().unwrap().insert(path.to_string(), 3);
        self
    }

    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_object(&self, path: &str) -> bool {
        self.objects.lock().unwrap().contains_key(path)
    }
}

#[async_trait]
impl IdentityProvider for MemoryBackend {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        self.accounts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.email == email && a.password == password)
            .map(|a| a.session.clone())
            .ok_or_else(|| rejected("auth", 400, "Invalid login credentials"))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, BackendError> {
        self.accounts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.session.refresh_token == refresh_token)
            .map(|a| a.session.clone())
            .ok_or_else(|| rejected("auth", 400, "Invalid Refresh Token"))
    }

    async fn verify(&self, access_token: &str) -> Result<Identity, BackendError> {
        self.accounts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.session.access_token == access_token)
            .map(|a| a.session.user.clone())
            .ok_or_else(|| rejected("auth", 401, "invalid JWT"))
    }
}

#[async_trait]
impl ProfileStore for MemoryBackend {
    async fn profile(&self, user_id: &str) -> Result<Option<Profile>, BackendError> {
        Ok(self.profiles.lock().unwrap().get(user_id).cloned())
    }
}

#[async_trait]
impl RecordStore for MemoryBackend {
    async fn select(&self, table: &str, query: &RecordQuery) -> Result<Vec<Record>, BackendError> {
        let mut rows: Vec<Record> = self
            .rows(table)
            .into_iter()
            .filter(|row| {
                query
                    .filters
                    .iter()
                    .all(|(column, value)| field_text(row, column).as_deref() == Some(value))
            })
            .filter(|row| match &query.search {
                Some(search) => {
                    let term = search.term.to_lowercase();
                    search.columns.iter().any(|column| {
                        field_text(row, column)
                            .map(|text| text.to_lowercase().contains(&term))
                            .unwrap_or(false)
                    })
                }
                None => true,
            })
            .collect();

        if let Some(order) = &query.order {
            rows.sort_by_key(|row| field_text(row, &order.column));
            if !order.ascending {
                rows.reverse();
            }
        }

        let offset = query.offset.unwrap_or(0) as usize;
        let limit = query.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn get(&self, table: &str, id: &str) -> Result<Option<Record>, BackendError> {
        Ok(self
            .rows(table)
            .into_iter()
            .find(|row| field_text(row, "id").as_deref() == Some(id)))
    }

    async fn insert(&self, table: &str, mut record: Record) -> Result<Record, BackendError> {
        let Some(object) = record.as_object_mut() else {
            return Err(rejected("rest", 400, "record must be an object"));
        };
        if !object.contains_key("id") {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
            object.insert("id".to_string(), Value::String(format!("gen-{id}")));
        }

        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        table: &str,
        id: &str,
        patch: Record,
    ) -> Result<Option<Record>, BackendError> {
        let mut tables = self.tables.lock().unwrap();
        let Some(row) = tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|row| field_text(row, "id").as_deref() == Some(id)))
        else {
            return Ok(None);
        };

        if let (Some(target), Some(changes)) = (row.as_object_mut(), patch.as_object()) {
            for (key, value) in changes {
                target.insert(key.clone(), value.clone());
            }
        }
        Ok(Some(row.clone()))
    }

    async fn delete(&self, table: &str, id: &str) -> Result<bool, BackendError> {
        let mut tables = self.tables.lock().unwrap();
        let Some(rows) = tables.get_mut(table) else {
            return Ok(false);
        };
        let before = rows.len();
        rows.retain(|row| field_text(row, "id").as_deref() != Some(id));
        Ok(rows.len() != before)
    }
}

#[async_trait]
impl ObjectStore for MemoryBackend {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, BackendError> {
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(path) {
            return Err(rejected("storage", 409, "The resource already exists"));
        }
        objects.insert(path.to_string(), bytes.len());
        Ok(self.public_url(path))
    }

    async fn list(
        &self,
        folder: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<StoredObject>, BackendError> {
        let prefix = format!("{folder}/");
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(path, size)| {
                path.strip_prefix(&prefix).map(|name| StoredObject {
                    name: name.to_string(),
                    created_at: None,
                    size: Some(*size as u64),
                })
            })
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn remove(&self, path: &str) -> Result<bool, BackendError> {
        Ok(self.objects.lock().unwrap().remove(path).is_some())
    }

    fn public_url(&self, path: &str) -> String {
        format!("https://storage.test/storage/v1/object/public/media/{path}")
    }

    fn bucket(&self) -> &str {
        "media"
    }
}

#[derive(Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<TemplateMessage>>,
}

impl MemoryMailer {
    pub fn sent(&self) -> Vec<TemplateMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailSender for MemoryMailer {
    async fn send_template(&self, message: &TemplateMessage) -> Result<(), BackendError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}
