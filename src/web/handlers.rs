//! Route handlers

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::api::{ApiError, StrategyReport};
use crate::catalog::Domain;
use crate::models::{FieldSelection, RecordPage};

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::UnknownDomain(_)
            | ApiError::UnknownEntity { .. }
            | ApiError::RecordNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::UpstreamRejected { .. } => StatusCode::FORBIDDEN,
            ApiError::Auth(_)
            | ApiError::Upstream { .. }
            | ApiError::Transport { .. }
            | ApiError::Decode { .. } => StatusCode::BAD_GATEWAY,
            ApiError::InvalidUrl(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::debug!("{}", self);
        }
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    auth_error: Option<String>,
    base_url: String,
    partition_id: String,
    domains: usize,
    entities: usize,
    version: &'static str,
}

/// Reports whether a token can be obtained right now. Always 200; the
/// body says whether the upstream side is usable.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let client = &state.client;
    let auth = client.tokens().get_token().await;
    let catalog = client.catalog();
    Json(HealthResponse {
        status: if auth.is_ok() { "ok" } else { "degraded" },
        authenticated: auth.is_ok(),
        auth_error: auth.err().map(|e| e.to_string()),
        base_url: client.base_url().to_string(),
        partition_id: client.partition_id().to_string(),
        domains: catalog.domains.len(),
        entities: catalog.entity_count(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct DomainSummary {
    name: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon: Option<String>,
    entity_count: usize,
}

pub async fn list_domains(State(state): State<AppState>) -> Json<Vec<DomainSummary>> {
    let domains = state
        .client
        .catalog()
        .domains
        .iter()
        .map(|d| DomainSummary {
            name: d.name.clone(),
            description: d.description.clone(),
            icon: d.icon.clone(),
            entity_count: d.entities.len(),
        })
        .collect();
    Json(domains)
}

pub async fn get_domain(
    State(state): State<AppState>,
    Path(domain): Path<String>,
) -> Result<Json<Domain>, ApiError> {
    state
        .client
        .catalog()
        .domain(&domain)
        .cloned()
        .map(Json)
        .ok_or(ApiError::UnknownDomain(domain))
}

#[derive(Debug, Deserialize)]
pub struct EntitySearch {
    #[serde(default)]
    q: String,
}

pub async fn search_entities(
    State(state): State<AppState>,
    Query(params): Query<EntitySearch>,
) -> Response {
    Json(state.client.catalog().search(params.q.trim())).into_response()
}

#[derive(Debug, Deserialize)]
pub struct RecordsParams {
    limit: Option<u32>,
    #[serde(default)]
    offset: u32,
    #[serde(default)]
    fields: String,
}

#[derive(Serialize)]
pub struct RecordsResponse {
    domain: String,
    entity: String,
    #[serde(flatten)]
    page: RecordPage,
}

pub async fn list_records(
    State(state): State<AppState>,
    Path((domain, entity)): Path<(String, String)>,
    Query(params): Query<RecordsParams>,
) -> Result<Json<RecordsResponse>, ApiError> {
    let fields: FieldSelection = match params.fields.parse() {
        Ok(fields) => fields,
        Err(never) => match never {},
    };
    let page = state
        .client
        .list_records(&domain, &entity, params.limit, params.offset, &fields)
        .await?;
    Ok(Json(RecordsResponse {
        domain,
        entity,
        page,
    }))
}

pub async fn get_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let record = state.client.get_record(&id).await?;
    Ok(Json(record).into_response())
}

/// Which search strategies work for an entity on this platform.
pub async fn diagnose_search(
    State(state): State<AppState>,
    Path((domain, entity)): Path<(String, String)>,
) -> Result<Json<StrategyReport>, ApiError> {
    state.client.diagnose_search(&domain, &entity).await.map(Json)
}

pub async fn diagnose_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StrategyReport>, ApiError> {
    state.client.diagnose_record(&id).await.map(Json)
}
