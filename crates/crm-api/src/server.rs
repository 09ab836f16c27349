//! Axum server and routes.

use crate::auth::{AuthUser, Origin};
use crate::error::{ApiError, ApiResult};
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use crm_service::{Crm, RecordService};
use crm_types::validate::parse_timestamp;
use crm_types::{
    ActivityAction, ActivityFilter, ActivityModule, ActivityView, ApiResponse, Contact,
    DashboardStats, Deal, DealsReport, Lead, PageRequest, Record, RecordFilter, Resolved,
    UserSummary, DEFAULT_ACTIVITY_LIMIT, DEFAULT_LIST_LIMIT, DEFAULT_RECORD_ACTIVITY_LIMIT,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub crm: Crm,
}

impl AppState {
    pub fn new(crm: Crm) -> Self {
        Self { crm }
    }
}

/// Record kinds served under `/api/<collection>`.
pub trait Routed: Record {
    /// Response key for a single record (`lead`, `contact`, `deal`).
    const SINGULAR: &'static str;

    fn service(crm: &Crm) -> &RecordService<Self>;
}

impl Routed for Lead {
    const SINGULAR: &'static str = "lead";

    fn service(crm: &Crm) -> &RecordService<Self> {
        &crm.leads
    }
}

impl Routed for Contact {
    const SINGULAR: &'static str = "contact";

    fn service(crm: &Crm) -> &RecordService<Self> {
        &crm.contacts
    }
}

impl Routed for Deal {
    const SINGULAR: &'static str = "deal";

    fn service(crm: &Crm) -> &RecordService<Self> {
        &crm.deals
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(handle_health))
        .route("/api/auth/users", get(handle_list_users))
        .nest("/api/leads", record_routes::<Lead>())
        .nest("/api/contacts", record_routes::<Contact>())
        .nest("/api/deals", record_routes::<Deal>())
        .route("/api/reports/deals", get(handle_deals_report))
        .route("/api/reports/dashboard", get(handle_dashboard))
        .route("/api/activity-logs", get(handle_activity_list))
        .route(
            "/api/activity-logs/record/:module/:record_id",
            get(handle_record_activity),
        )
        .route("/api/activity-logs/user/:user_id", get(handle_user_activity))
        .fallback(handle_not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn record_routes<R>() -> Router<Arc<AppState>>
where
    R: Routed,
    R::Input: DeserializeOwned,
{
    Router::new()
        .route("/", get(handle_list::<R>).post(handle_create::<R>))
        .route(
            "/:id",
            get(handle_get::<R>)
                .put(handle_update::<R>)
                .delete(handle_delete::<R>),
        )
}

/// Wraps a payload as `{key: value}` inside `data`.
fn keyed<T>(key: &'static str, value: T) -> BTreeMap<&'static str, T> {
    BTreeMap::from([(key, value)])
}

type Keyed<T> = Json<ApiResponse<BTreeMap<&'static str, T>>>;

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "success",
        "message": "CRM API is running",
        "timestamp": chrono::Utc::now(),
    }))
}

async fn handle_not_found() -> ApiError {
    ApiError::NotFound("Route not found".to_string())
}

async fn handle_list_users(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> ApiResult<Keyed<Vec<UserSummary>>> {
    let users: Vec<UserSummary> = state
        .crm
        .users
        .list()
        .await?
        .iter()
        .map(|u| u.summary())
        .collect();
    let count = users.len();
    Ok(Json(ApiResponse {
        count: Some(count),
        ..ApiResponse::success(keyed("users", users))
    }))
}

// ---------------------------------------------------------------------------
// Records

/// List query. Attribute filters not exposed by a kind are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    pub source: Option<String>,
    #[serde(rename = "type")]
    pub contact_type: Option<String>,
    pub stage: Option<String>,
    pub assigned_to: Option<String>,
    pub contact: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ListQuery {
    fn attribute(&self, field: &str) -> Option<&String> {
        match field {
            "status" => self.status.as_ref(),
            "source" => self.source.as_ref(),
            "type" => self.contact_type.as_ref(),
            "stage" => self.stage.as_ref(),
            "assignedTo" => self.assigned_to.as_ref(),
            "contact" => self.contact.as_ref(),
            _ => None,
        }
    }

    fn filter<R: Record>(&self) -> RecordFilter {
        R::FILTER_FIELDS
            .iter()
            .filter_map(|&f| self.attribute(f).map(|v| (f, v.trim())))
            .filter(|(_, v)| !v.is_empty())
            .fold(RecordFilter::new().search(self.search.clone()), |filter, (f, v)| {
                filter.with(f, v)
            })
    }
}

async fn handle_list<R>(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Keyed<Vec<Resolved<R>>>>
where
    R: Routed,
    R::Input: DeserializeOwned,
{
    let Query(q) = query?;
    let page = PageRequest::new(q.page, q.limit, DEFAULT_LIST_LIMIT)?;
    let res = R::service(&state.crm).list(&q.filter::<R>(), page).await?;
    let count = res.items.len();
    Ok(Json(ApiResponse::page(
        keyed(R::KIND.collection(), res.items),
        count,
        res.pagination,
    )))
}

async fn handle_get<R>(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Keyed<Resolved<R>>>
where
    R: Routed,
    R::Input: DeserializeOwned,
{
    let record = R::service(&state.crm).get(&id).await?;
    Ok(Json(ApiResponse::success(keyed(R::SINGULAR, record))))
}

async fn handle_create<R>(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Origin(origin): Origin,
    body: Result<Json<R::Input>, JsonRejection>,
) -> ApiResult<(StatusCode, Keyed<Resolved<R>>)>
where
    R: Routed,
    R::Input: DeserializeOwned,
{
    let Json(input) = body?;
    let record = R::service(&state.crm)
        .create(input, &user.actor(origin))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(keyed(R::SINGULAR, record))),
    ))
}

async fn handle_update<R>(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Origin(origin): Origin,
    Path(id): Path<String>,
    body: Result<Json<R::Input>, JsonRejection>,
) -> ApiResult<Keyed<Resolved<R>>>
where
    R: Routed,
    R::Input: DeserializeOwned,
{
    let Json(input) = body?;
    let record = R::service(&state.crm)
        .update(&id, input, &user.actor(origin))
        .await?;
    Ok(Json(ApiResponse::success(keyed(R::SINGULAR, record))))
}

async fn handle_delete<R>(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Origin(origin): Origin,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<()>>>
where
    R: Routed,
    R::Input: DeserializeOwned,
{
    R::service(&state.crm)
        .delete(&id, &user.actor(origin))
        .await?;
    Ok(Json(ApiResponse::message(format!(
        "{} deleted successfully",
        R::KIND
    ))))
}

// ---------------------------------------------------------------------------
// Reports

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

fn date_bound(name: &str, raw: Option<&str>) -> ApiResult<Option<chrono::DateTime<chrono::Utc>>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => parse_timestamp(s)
            .map(Some)
            .ok_or_else(|| ApiError::validation(format!("Invalid {}: {}", name, s))),
        None => Ok(None),
    }
}

async fn handle_deals_report(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    query: Result<Query<ReportQuery>, QueryRejection>,
) -> ApiResult<Json<ApiResponse<DealsReport>>> {
    let Query(q) = query?;
    let start = date_bound("startDate", q.start_date.as_deref())?;
    let end = date_bound("endDate", q.end_date.as_deref())?;
    let report = state.crm.reports.deals_report(start, end).await?;
    Ok(Json(ApiResponse::success(report)))
}

async fn handle_dashboard(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> ApiResult<Json<ApiResponse<DashboardStats>>> {
    let stats = state.crm.reports.dashboard_stats().await?;
    Ok(Json(ApiResponse::success(stats)))
}

// ---------------------------------------------------------------------------
// Activity logs

#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    pub module: Option<ActivityModule>,
    pub action: Option<ActivityAction>,
    /// Acting user id.
    pub user: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

async fn activity_page(
    state: &AppState,
    filter: ActivityFilter,
    page: PageRequest,
) -> ApiResult<Keyed<Vec<ActivityView>>> {
    let res = state.crm.activity.query(&filter, page).await?;
    let count = res.items.len();
    Ok(Json(ApiResponse::page(
        keyed("activityLogs", res.items),
        count,
        res.pagination,
    )))
}

async fn handle_activity_list(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    query: Result<Query<ActivityQuery>, QueryRejection>,
) -> ApiResult<Keyed<Vec<ActivityView>>> {
    let Query(q) = query?;
    let page = PageRequest::new(q.page, q.limit, DEFAULT_ACTIVITY_LIMIT)?;
    let filter = ActivityFilter {
        module: q.module,
        action: q.action,
        user_id: q.user.filter(|u| !u.trim().is_empty()),
        record_id: None,
    };
    activity_page(&state, filter, page).await
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

async fn handle_record_activity(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    path: Result<Path<(ActivityModule, String)>, PathRejection>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<Keyed<Vec<ActivityView>>> {
    let Path((module, record_id)) = path?;
    let Query(q) = query?;
    let page = PageRequest::new(q.page, q.limit, DEFAULT_RECORD_ACTIVITY_LIMIT)?;
    let filter = ActivityFilter {
        module: Some(module),
        record_id: Some(record_id),
        ..Default::default()
    };
    activity_page(&state, filter, page).await
}

async fn handle_user_activity(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(user_id): Path<String>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<Keyed<Vec<ActivityView>>> {
    let Query(q) = query?;
    let page = PageRequest::new(q.page, q.limit, DEFAULT_ACTIVITY_LIMIT)?;
    let filter = ActivityFilter {
        user_id: Some(user_id),
        ..Default::default()
    };
    activity_page(&state, filter, page).await
}
