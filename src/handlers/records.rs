//! CRUD endpoints for the record-backed resources.
//!
//! Each [`Resource`] names its table, the columns a client may write, the
//! list filters it understands and the role each operation requires. The
//! handlers themselves are shared.

use std::collections::HashMap;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::get,
};
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::auth::require_role;
use crate::authz::{Role, RoleRequirement};
use crate::backend::{Order, Record, RecordQuery, Search};
use crate::error::AppError;
use crate::extract::JsonBody;
use crate::middleware::{apply_status_headers, check_scoped};
use crate::models::ApiResponse;
use crate::rate_limit::RateLimitPolicy;
use crate::state::{AppState, SharedState};

const USERS_TABLE: &str = "users";
const UNPAGED_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Posts,
    Categories,
    Consultations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    List,
    Read,
    Create,
    Update,
    Delete,
}

impl Resource {
    pub fn table(self) -> &'static str {
        match self {
            Resource::Posts => "posts",
            Resource::Categories => "categories",
            Resource::Consultations => "consultations",
        }
    }

    fn writable_columns(self) -> &'static [&'static str] {
        match self {
            Resource::Posts => &["title", "content", "author_id", "category_id", "image_url"],
            Resource::Categories => &["name", "description"],
            Resource::Consultations => &[
                "dni_or_id",
                "email",
                "consultation_reason",
                "status",
                "first_name",
                "last_name",
                "phone_number",
                "nationality",
            ],
        }
    }

    fn search_columns(self) -> &'static [&'static str] {
        match self {
            Resource::Posts => &["title", "content"],
            Resource::Categories => &["name", "description"],
            Resource::Consultations => &["consultation_reason", "first_name", "email"],
        }
    }

    /// (query parameter, column) pairs applied as equality filters.
    fn list_filters(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Resource::Posts => &[("author_id", "author_id"), ("category_id", "category_id")],
            Resource::Categories => &[],
            Resource::Consultations => &[
                ("user_email", "email"),
                ("user_dni", "dni_or_id"),
                ("status", "status"),
            ],
        }
    }

    fn default_order(self) -> &'static str {
        match self {
            Resource::Categories => "name ASC",
            Resource::Posts | Resource::Consultations => "created_at DESC",
        }
    }

    /// Role needed for `op`; `None` means the operation is public.
    pub fn requirement(self, op: Operation) -> Option<RoleRequirement> {
        use Operation::*;
        match (self, op) {
            (Resource::Posts | Resource::Categories, List | Read) => None,
            (Resource::Posts, Create | Update | Delete) => Some(RoleRequirement::single(Role::Editor)),
            (Resource::Categories, Create | Update | Delete) => {
                Some(RoleRequirement::single(Role::Admin))
            }
            (Resource::Consultations, Create) => None,
            (Resource::Consultations, List | Read | Update) => {
                Some(RoleRequirement::single(Role::Moderator))
            }
            (Resource::Consultations, Delete) => Some(RoleRequirement::single(Role::Admin)),
        }
    }
}

async fn guard(
    state: &AppState,
    headers: &HeaderMap,
    resource: Resource,
    op: Operation,
) -> Result<(), AppError> {
    if let Some(required) = resource.requirement(op) {
        require_role(state, headers, &required).await?;
    }
    Ok(())
}

fn parse_number(params: &HashMap<String, String>, name: &str) -> Result<Option<u32>, AppError> {
    params
        .get(name)
        .filter(|v| !v.is_empty())
        .map(|v| {
            v.parse::<u32>()
                .map_err(|_| AppError::BadRequest(format!("{name} must be a non-negative integer")))
        })
        .transpose()
}

fn parse_order(spec: &str) -> Result<Order, AppError> {
    let mut parts = spec.split_whitespace();
    let column = parts.next().unwrap_or_default();
    if column.is_empty() || !column.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(AppError::BadRequest(format!("invalid orderBy column '{column}'")));
    }
    let ascending = !parts
        .next()
        .is_some_and(|direction| direction.eq_ignore_ascii_case("desc"));

    Ok(Order {
        column: column.to_string(),
        ascending,
    })
}

/// Translate list query parameters into a store query.
pub fn list_query(
    resource: Resource,
    params: &HashMap<String, String>,
) -> Result<RecordQuery, AppError> {
    let mut query = RecordQuery::default();

    for (param, column) in resource.list_filters() {
        if let Some(value) = params.get(*param).filter(|v| !v.is_empty()) {
            query = query.eq(*column, value.as_str());
        }
    }

    if let Some(term) = params.get("search").filter(|t| !t.trim().is_empty()) {
        query.search = Some(Search {
            columns: resource
                .search_columns()
                .iter()
                .map(|c| c.to_string())
                .collect(),
            term: term.trim().to_string(),
        });
    }

    let order = params
        .get("orderBy")
        .map(String::as_str)
        .filter(|o| !o.trim().is_empty())
        .unwrap_or(resource.default_order());
    query.order = Some(parse_order(order)?);

    query.limit = parse_number(params, "limit")?;
    query.offset = parse_number(params, "offset")?;
    if query.offset.is_some() && query.limit.is_none() {
        query.limit = Some(UNPAGED_LIMIT);
    }

    Ok(query)
}

/// Keep only the columns a client may write. Errors when nothing is left.
fn writable_fields(resource: Resource, body: Value) -> Result<Record, AppError> {
    let Value::Object(fields) = body else {
        return Err(AppError::BadRequest("body must be a JSON object".to_string()));
    };

    let allowed = resource.writable_columns();
    let kept: Map<String, Value> = fields
        .into_iter()
        .filter(|(key, _)| allowed.contains(&key.as_str()))
        .collect();

    if kept.is_empty() {
        return Err(AppError::BadRequest(format!(
            "no writable fields, expected any of: {}",
            allowed.join(", ")
        )));
    }
    Ok(Value::Object(kept))
}

async fn list(
    resource: Resource,
    state: SharedState,
    headers: HeaderMap,
    params: HashMap<String, String>,
) -> Result<Json<ApiResponse<Vec<Record>>>, AppError> {
    guard(&state, &headers, resource, Operation::List).await?;
    let query = list_query(resource, &params)?;

    let rows = state.records.select(resource.table(), &query).await?;
    debug!(table = resource.table(), count = rows.len(), "Listed records");
    Ok(Json(ApiResponse::ok(rows)))
}

async fn read(
    resource: Resource,
    state: SharedState,
    headers: HeaderMap,
    id: String,
) -> Result<Json<ApiResponse<Record>>, AppError> {
    guard(&state, &headers, resource, Operation::Read).await?;

    match state.records.get(resource.table(), &id).await {
        Ok(Some(row)) => Ok(Json(ApiResponse::ok(row))),
        Ok(None) => Err(AppError::not_found()),
        Err(e) => {
            warn!(table = resource.table(), id = %id, error = %e, "Record lookup failed");
            Err(AppError::not_found())
        }
    }
}

async fn create(
    resource: Resource,
    state: SharedState,
    headers: HeaderMap,
    body: Value,
) -> Result<(StatusCode, HeaderMap, Json<ApiResponse<Record>>), AppError> {
    let mut response_headers = HeaderMap::new();
    if resource == Resource::Consultations {
        // public and side-effecting, so it gets the strict policy
        let status = check_scoped(&state, &headers, "consultations", &RateLimitPolicy::strict())?;
        apply_status_headers(&mut response_headers, &status);
    }
    guard(&state, &headers, resource, Operation::Create).await?;

    let record = writable_fields(resource, body)?;
    if resource == Resource::Consultations {
        ensure_user(&state, &record).await;
    }

    let row = state
        .records
        .insert(resource.table(), record)
        .await
        .map_err(|e| {
            warn!(table = resource.table(), error = %e, "Insert failed");
            AppError::BadRequest(e.to_string())
        })?;

    let id = row.get("id").cloned().unwrap_or_default();
    info!(table = resource.table(), id = %id, "Record created");
    Ok((StatusCode::CREATED, response_headers, Json(ApiResponse::ok(row))))
}

async fn update(
    resource: Resource,
    state: SharedState,
    headers: HeaderMap,
    id: String,
    body: Value,
) -> Result<Json<ApiResponse<Record>>, AppError> {
    guard(&state, &headers, resource, Operation::Update).await?;
    let patch = writable_fields(resource, body)?;

    match state.records.update(resource.table(), &id, patch).await {
        Ok(Some(row)) => Ok(Json(ApiResponse::ok(row))),
        Ok(None) => Err(AppError::not_found()),
        Err(e) => {
            warn!(table = resource.table(), id = %id, error = %e, "Update failed");
            Err(AppError::not_found())
        }
    }
}

async fn delete(
    resource: Resource,
    state: SharedState,
    headers: HeaderMap,
    id: String,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    guard(&state, &headers, resource, Operation::Delete).await?;

    if !state.records.delete(resource.table(), &id).await? {
        return Err(AppError::not_found());
    }
    info!(table = resource.table(), id = %id, "Record deleted");
    Ok(Json(ApiResponse::ok(json!({ "id": id }))))
}

fn text<'a>(record: &'a Record, column: &str) -> Option<&'a str> {
    record
        .get(column)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

// Find-or-create the person behind a consultation, keyed by (dni, email).
// Failures are logged and never block the consultation itself.
async fn ensure_user(state: &AppState, consultation: &Record) {
    let (Some(dni), Some(email)) = (text(consultation, "dni_or_id"), text(consultation, "email"))
    else {
        return;
    };

    let existing = state
        .records
        .select(USERS_TABLE, &RecordQuery::default().eq("dni", dni).eq("email", email))
        .await;
    match existing {
        Ok(rows) if !rows.is_empty() => return,
        Ok(_) => {}
        Err(e) => {
            warn!(error = %e, "User lookup failed, skipping user creation");
            return;
        }
    }

    let name = match (text(consultation, "first_name"), text(consultation, "last_name")) {
        (Some(first), Some(last)) => format!("{first} {last}"),
        (Some(first), None) => first.to_string(),
        (None, Some(last)) => last.to_string(),
        (None, None) => String::new(),
    };
    let user = json!({
        "dni": dni,
        "email": email,
        "name": name,
        "phone": text(consultation, "phone_number"),
    });

    match state.records.insert(USERS_TABLE, user).await {
        Ok(_) => info!("Created user from consultation"),
        Err(e) => warn!(error = %e, "Could not create user from consultation"),
    }
}

pub fn routes(resource: Resource) -> Router<SharedState> {
    let collection = format!("/{}", resource.table());
    let item = format!("/{}/{{id}}", resource.table());

    Router::new()
        .route(
            &collection,
            get(
                move |State(state): State<SharedState>,
                      headers: HeaderMap,
                      Query(params): Query<HashMap<String, String>>| {
                    list(resource, state, headers, params)
                },
            )
            .post(
                move |State(state): State<SharedState>,
                      headers: HeaderMap,
                      JsonBody(body): JsonBody<Value>| { create(resource, state, headers, body) },
            ),
        )
        .route(
            &item,
            get(
                move |State(state): State<SharedState>,
                      headers: HeaderMap,
                      Path(id): Path<String>| { read(resource, state, headers, id) },
            )
            .put(
                move |State(state): State<SharedState>,
                      headers: HeaderMap,
                      Path(id): Path<String>,
                      JsonBody(body): JsonBody<Value>| {
                    update(resource, state, headers, id, body)
                },
            )
            .delete(
                move |State(state): State<SharedState>,
                      headers: HeaderMap,
                      Path(id): Path<String>| { delete(resource, state, headers, id) },
            ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_list_query_defaults() {
        let query = list_query(Resource::Posts, &HashMap::new()).unwrap();

        assert_eq!(
            query.order,
            Some(Order {
                column: "created_at".to_string(),
                ascending: false
            })
        );
        assert!(query.filters.is_empty());
        assert_eq!(query.limit, None);
    }

    #[test]
    fn test_list_query_maps_filters_and_search() {
        let query = list_query(
            Resource::Consultations,
            &params(&[("user_dni", "123"), ("status", "open"), ("search", " visa ")]),
        )
        .unwrap();

        assert!(query.filters.contains(&("dni_or_id".to_string(), "123".to_string())));
        assert!(query.filters.contains(&("status".to_string(), "open".to_string())));
        let search = query.search.unwrap();
        assert_eq!(search.term, "visa");
        assert_eq!(search.columns, vec!["consultation_reason", "first_name", "email"]);
    }

    #[test]
    fn test_offset_without_limit_pages_by_hundred() {
        let query = list_query(Resource::Posts, &params(&[("offset", "20")])).unwrap();
        assert_eq!(query.offset, Some(20));
        assert_eq!(query.limit, Some(UNPAGED_LIMIT));
    }

    #[test]
    fn test_bad_paging_and_order_are_rejected() {
        assert!(matches!(
            list_query(Resource::Posts, &params(&[("limit", "-1")])),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            list_query(Resource::Posts, &params(&[("orderBy", "title;drop DESC")])),
            Err(AppError::BadRequest(_))
        ));

        let query = list_query(Resource::Posts, &params(&[("orderBy", "title asc")])).unwrap();
        assert_eq!(
            query.order,
            Some(Order {
                column: "title".to_string(),
                ascending: true
            })
        );
    }

    #[test]
    fn test_writable_fields_drops_unknown_columns() {
        let record = writable_fields(
            Resource::Categories,
            json!({ "name": "News", "id": 9, "created_at": "x" }),
        )
        .unwrap();
        assert_eq!(record, json!({ "name": "News" }));

        assert!(writable_fields(Resource::Categories, json!({ "id": 9 })).is_err());
        assert!(writable_fields(Resource::Categories, json!(["name"])).is_err());
    }

    #[test]
    fn test_access_table() {
        assert_eq!(Resource::Posts.requirement(Operation::List), None);
        assert_eq!(Resource::Consultations.requirement(Operation::Create), None);
        assert_eq!(
            Resource::Categories.requirement(Operation::Delete),
            Some(RoleRequirement::single(Role::Admin))
        );
        assert_eq!(
            Resource::Consultations.requirement(Operation::Update),
            Some(RoleRequirement::single(Role::Moderator))
        );
    }
}
