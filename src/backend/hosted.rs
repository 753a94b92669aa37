//! REST client for the hosted backend: `/auth/v1` for identity,
//! `/rest/v1` for tables and `/storage/v1` for files.

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use super::{
    Identity, IdentityProvider, ObjectStore, Profile, ProfileStore, Record, RecordQuery,
    RecordStore, Session, StoredObject,
};
use crate::error::BackendError;

const AUTH: &str = "auth";
const REST: &str = "rest";
const STORAGE: &str = "storage";

const PROFILES_TABLE: &str = "admin_profiles";

#[derive(Debug, Clone)]
pub struct HostedSettings {
    pub base_url: String,
    pub anon_key: String,
    pub service_key: String,
    pub bucket: String,
}

pub struct HostedBackend {
    client: reqwest::Client,
    settings: HostedSettings,
}

#[derive(Deserialize)]
struct ListedObject {
    name: String,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    metadata: Option<Value>,
}

impl HostedBackend {
    pub fn new(client: reqwest::Client, settings: HostedSettings) -> Self {
        Self { client, settings }
    }

    fn url(&self, service: &'static str, path: &str) -> Result<Url, BackendError> {
        Url::parse(&format!("{}{}", self.settings.base_url, path)).map_err(|e| {
            BackendError::Decode {
                service,
                message: format!("invalid url: {e}"),
            }
        })
    }

    fn table_url(&self, table: &str) -> Result<Url, BackendError> {
        self.url(REST, &format!("/rest/v1/{table}"))
    }

    fn as_anon(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.settings.anon_key)
            .bearer_auth(&self.settings.anon_key)
    }

    fn as_service(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.settings.service_key)
            .bearer_auth(&self.settings.service_key)
    }

    async fn token(&self, grant_type: &str, body: Value) -> Result<Session, BackendError> {
        let mut url = self.url(AUTH, "/auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);

        let response = self.as_anon(self.client.post(url)).json(&body).send().await;
        read_json(AUTH, response).await
    }
}

/// Map transport failures and non-2xx statuses to `BackendError`, then decode.
async fn read_json<T: DeserializeOwned>(
    service: &'static str,
    response: Result<Response, reqwest::Error>,
) -> Result<T, BackendError> {
    let response = ensure_success(service, response).await?;
    response.json::<T>().await.map_err(|e| BackendError::Decode {
        service,
        message: e.to_string(),
    })
}

pub(crate) async fn ensure_success(
    service: &'static str,
    response: Result<Response, reqwest::Error>,
) -> Result<Response, BackendError> {
    let response = response.map_err(|source| BackendError::Transport { service, source })?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Rejected {
        service,
        status: status.as_u16(),
        message: error_message(&body),
    })
}

// Hosted services report errors under different keys depending on the API
fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };
    ["message", "msg", "error_description", "error"]
        .iter()
        .find_map(|key| value.get(key).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}

fn eq_filter(url: &mut Url, column: &str, value: &str) {
    url.query_pairs_mut()
        .append_pair(column, &format!("eq.{value}"));
}

fn apply_query(url: &mut Url, query: &RecordQuery) {
    let mut pairs = url.query_pairs_mut();
    pairs.append_pair("select", "*");

    for (column, value) in &query.filters {
        pairs.append_pair(column, &format!("eq.{value}"));
    }

    if let Some(search) = &query.search {
        let term: String = search
            .term
            .chars()
            .filter(|c| !matches!(c, '"' | '\\'))
            .collect();
        let conditions: Vec<String> = search
            .columns
            .iter()
            .map(|column| format!("{column}.ilike.\"%{term}%\""))
            .collect();
        pairs.append_pair("or", &format!("({})", conditions.join(",")));
    }

    if let Some(order) = &query.order {
        let direction = if order.ascending { "asc" } else { "desc" };
        pairs.append_pair("order", &format!("{}.{direction}", order.column));
    }
    if let Some(limit) = query.limit {
        pairs.append_pair("limit", &limit.to_string());
    }
    if let Some(offset) = query.offset {
        pairs.append_pair("offset", &offset.to_string());
    }
}

fn first_row(rows: Vec<Record>) -> Option<Record> {
    rows.into_iter().next()
}

#[async_trait]
impl IdentityProvider for HostedBackend {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        self.token("password", json!({ "email": email, "password": password }))
            .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, BackendError> {
        self.token("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
    }

    async fn verify(&self, access_token: &str) -> Result<Identity, BackendError> {
        let url = self.url(AUTH, "/auth/v1/user")?;
        let response = self
            .client
            .get(url)
            .header("apikey", &self.settings.anon_key)
            .bearer_auth(access_token)
            .send()
            .await;
        read_json(AUTH, response).await
    }
}

#[async_trait]
impl ProfileStore for HostedBackend {
    async fn profile(&self, user_id: &str) -> Result<Option<Profile>, BackendError> {
        let mut url = self.table_url(PROFILES_TABLE)?;
        url.query_pairs_mut()
            .append_pair("select", "role,username,is_active");
        eq_filter(&mut url, "user_id", user_id);
        url.query_pairs_mut().append_pair("limit", "1");

        let response = self.as_service(self.client.get(url)).send().await;
        let profiles: Vec<Profile> = read_json(REST, response).await?;
        Ok(profiles.into_iter().next())
    }
}

#[async_trait]
impl RecordStore for HostedBackend {
    async fn select(&self, table: &str, query: &RecordQuery) -> Result<Vec<Record>, BackendError> {
        let mut url = self.table_url(table)?;
        apply_query(&mut url, query);
        debug!(table, url = %url, "Selecting records");

        let response = self.as_anon(self.client.get(url)).send().await;
        read_json(REST, response).await
    }

    async fn get(&self, table: &str, id: &str) -> Result<Option<Record>, BackendError> {
        let query = RecordQuery {
            limit: Some(1),
            ..RecordQuery::default()
        }
        .eq("id", id);
        Ok(first_row(self.select(table, &query).await?))
    }

    async fn insert(&self, table: &str, record: Record) -> Result<Record, BackendError> {
        let url = self.table_url(table)?;
        let response = self
            .as_service(self.client.post(url))
            .header("Prefer", "return=representation")
            .json(&[record])
            .send()
            .await;

        let rows: Vec<Record> = read_json(REST, response).await?;
        first_row(rows).ok_or_else(|| BackendError::Decode {
            service: REST,
            message: format!("insert into {table} returned no row"),
        })
    }

    async fn update(
        &self,
        table: &str,
        id: &str,
        patch: Record,
    ) -> Result<Option<Record>, BackendError> {
        let mut url = self.table_url(table)?;
        eq_filter(&mut url, "id", id);

        let response = self
            .as_service(self.client.patch(url))
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await;

        let rows: Vec<Record> = read_json(REST, response).await?;
        Ok(first_row(rows))
    }

    async fn delete(&self, table: &str, id: &str) -> Result<bool, BackendError> {
        let mut url = self.table_url(table)?;
        eq_filter(&mut url, "id", id);

        let response = self
            .as_service(self.client.delete(url))
            .header("Prefer", "return=representation")
            .send()
            .await;

        let rows: Vec<Record> = read_json(REST, response).await?;
        Ok(!rows.is_empty())
    }
}

#[async_trait]
impl ObjectStore for HostedBackend {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, BackendError> {
        let url = self.url(
            STORAGE,
            &format!("/storage/v1/object/{}/{path}", self.settings.bucket),
        )?;

        let response = self
            .as_service(self.client.post(url))
            .header("Content-Type", content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await;
        ensure_success(STORAGE, response).await?;

        Ok(self.public_url(path))
    }

    async fn list(
        &self,
        folder: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<StoredObject>, BackendError> {
        let url = self.url(
            STORAGE,
            &format!("/storage/v1/object/list/{}", self.settings.bucket),
        )?;
        let body = json!({
            "prefix": folder,
            "limit": limit,
            "offset": offset,
            "sortBy": { "column": "created_at", "order": "desc" },
        });

        let response = self
            .as_service(self.client.post(url))
            .json(&body)
            .send()
            .await;
        let listed: Vec<ListedObject> = read_json(STORAGE, response).await?;

        Ok(listed
            .into_iter()
            .map(|object| StoredObject {
                size: object
                    .metadata
                    .as_ref()
                    .and_then(|m| m.get("size"))
                    .and_then(Value::as_u64),
                name: object.name,
                created_at: object.created_at,
            })
            .collect())
    }

    async fn remove(&self, path: &str) -> Result<bool, BackendError> {
        let url = self.url(
            STORAGE,
            &format!("/storage/v1/object/{}", self.settings.bucket),
        )?;

        let response = self
            .as_service(self.client.delete(url))
            .json(&json!({ "prefixes": [path] }))
            .send()
            .await;
        let removed: Vec<Value> = read_json(STORAGE, response).await?;
        Ok(!removed.is_empty())
    }

    fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{path}",
            self.settings.base_url, self.settings.bucket
        )
    }

    fn bucket(&self) -> &str {
        &self.settings.bucket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Order, Search};

    fn backend() -> HostedBackend {
        HostedBackend::new(
            reqwest::Client::new(),
            HostedSettings {
                base_url: "https://project.example.co".to_string(),
                anon_key: "anon".to_string(),
                service_key: "service".to_string(),
                bucket: "media".to_string(),
            },
        )
    }

    #[test]
    fn test_select_query_string() {
        let backend = backend();
        let mut url = backend.table_url("posts").unwrap();
        let query = RecordQuery {
            search: Some(Search {
                columns: vec!["title".into(), "content".into()],
                term: "rust\"".into(),
            }),
            order: Some(Order {
                column: "created_at".into(),
                ascending: false,
            }),
            limit: Some(10),
            offset: Some(20),
            ..RecordQuery::default()
        }
        .eq("category_id", "3");

        apply_query(&mut url, &query);

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(url.path(), "/rest/v1/posts");
        assert_eq!(
            pairs,
            vec![
                ("select".to_string(), "*".to_string()),
                ("category_id".to_string(), "eq.3".to_string()),
                (
                    "or".to_string(),
                    "(title.ilike.\"%rust%\",content.ilike.\"%rust%\")".to_string()
                ),
                ("order".to_string(), "created_at.desc".to_string()),
                ("limit".to_string(), "10".to_string()),
                ("offset".to_string(), "20".to_string()),
            ]
        );
    }

    #[test]
    fn test_public_url() {
        assert_eq!(
            backend().public_url("posts/1-a.png"),
            "https://project.example.co/storage/v1/object/public/media/posts/1-a.png"
        );
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"msg":"Invalid login credentials"}"#), "Invalid login credentials");
        assert_eq!(error_message(r#"{"message":"duplicate key"}"#), "duplicate key");
        assert_eq!(error_message("  plain failure "), "plain failure");
    }
}
