//! HTTP API over the catalog.
//!
//! Handlers are thin: they lock the shared catalog connection, call into the
//! library modules and translate errors into status codes. Scans run on a
//! blocking thread with their own connection so listings stay responsive.

use axum::{
    body::Body,
    extract::{Path, Query, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::archive::move_to_archive;
use crate::config::Config;
use crate::db::media::MediaEntry;
use crate::db::{Database, MediaQuery, SortKey, SortOrder, Tag};
use crate::error::{CatalogError, PathAccessError, ScanError};
use crate::filter::MediaFilter;
use crate::library::resolve_media_path;
use crate::scanner::{MediaKind, ScanOptions, ScanSummary, Scanner, ThumbnailManager};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub db_path: PathBuf,
    pub scanner: Arc<Scanner>,
    pub thumbnails: Arc<ThumbnailManager>,
    pub archive_path: Option<PathBuf>,
    /// Listing filter, shared by every client.
    pub filter: Arc<RwLock<Option<MediaFilter>>>,
}

impl AppState {
    pub fn new(config: &Config) -> Result<Self, CatalogError> {
        let db = Database::open(&config.db_path)?;
        db.initialize()?;

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: config.db_path.clone(),
            scanner: Arc::new(Scanner::new(&config.library)),
            thumbnails: Arc::new(ThumbnailManager::new(&config.thumbnails)),
            archive_path: config.library.archive_path.clone(),
            filter: Arc::new(RwLock::new(None)),
        })
    }

    fn catalog(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn current_filter(&self) -> Option<MediaFilter> {
        self.filter
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_filter(&self, filter: Option<MediaFilter>) {
        *self
            .filter
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = filter;
    }
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::BadRequest(m)
            | ApiError::Forbidden(m)
            | ApiError::NotFound(m)
            | ApiError::Conflict(m)
            | ApiError::Internal(m) => m,
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<CatalogError> for ApiError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::InvalidTagName(_) => ApiError::BadRequest(e.to_string()),
            other => {
                error!("Catalog error: {}", other);
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl From<ScanError> for ApiError {
    fn from(e: ScanError) -> Self {
        match e {
            ScanError::AlreadyRunning => ApiError::Conflict(e.to_string()),
            ScanError::Catalog(inner) => ApiError::Internal(inner.to_string()),
        }
    }
}

impl From<PathAccessError> for ApiError {
    fn from(e: PathAccessError) -> Self {
        match e {
            PathAccessError::OutsideLibraries(_) => ApiError::Forbidden(e.to_string()),
            PathAccessError::Missing(_) => ApiError::NotFound(e.to_string()),
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/scan/trigger", post(trigger_scan))
        .route("/api/media", get(list_media))
        .route(
            "/api/media/filter_config",
            post(save_filter).delete(clear_filter),
        )
        .route("/api/media/delete_selected", post(delete_selected))
        .route("/api/media/:id/tags", post(add_media_tags))
        .route("/api/media/:id/tags/:name", delete(remove_media_tag))
        .route("/api/media/file/:id", get(media_file))
        .route("/api/media/thumbnail/:id", get(media_thumbnail))
        .route("/api/tags", get(list_tags).post(create_tag))
        .route("/api/tags/:id", delete(delete_tag))
        .route("/api/org_paths", get(org_paths))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until the process is stopped.
pub async fn serve(config: &Config) -> anyhow::Result<()> {
    let state = AppState::new(config)?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.server.bind.as_str()).await?;
    info!("Starting HTTP server on {}", config.server.bind);
    axum::serve(listener, app).await?;
    Ok(())
}

fn not_found(what: &str, id: i64) -> ApiError {
    ApiError::NotFound(format!("{} {} not found", what, id))
}

// ============================================================================
// Scanning
// ============================================================================

async fn trigger_scan(
    State(state): State<AppState>,
    Query(options): Query<ScanOptions>,
) -> ApiResult<Json<ScanSummary>> {
    info!("Scan triggered (force_rescan={})", options.force_rescan);
    let scanner = state.scanner.clone();
    let db_path = state.db_path.clone();

    let summary = tokio::task::spawn_blocking(move || -> Result<ScanSummary, ScanError> {
        let db = Database::open(&db_path)?;
        db.initialize()?;
        scanner.scan_libraries(&db, options, None)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("scan task failed: {}", e)))??;

    Ok(Json(summary))
}

// ============================================================================
// Listing and filter
// ============================================================================

/// Raw query values. Malformed numbers fall back to the defaults instead of
/// rejecting the request.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    page: Option<String>,
    per_page: Option<String>,
    sort_by: Option<String>,
    sort_order: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MediaListResponse {
    media: Vec<MediaEntry>,
    total_pages: usize,
    current_page: usize,
    total_items: usize,
}

async fn list_media(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<MediaListResponse>> {
    let defaults = MediaQuery::default();
    let query = MediaQuery {
        sort: params.sort_by.as_deref().map(SortKey::parse).unwrap_or_default(),
        order: params.sort_order.as_deref().map(SortOrder::parse).unwrap_or_default(),
        page: int_param(params.page.as_deref()).unwrap_or(defaults.page),
        per_page: int_param(params.per_page.as_deref()).unwrap_or(defaults.per_page),
    };
    let filter = state.current_filter();

    let page = state.catalog().query_media(&query, filter.as_ref())?;
    Ok(Json(MediaListResponse {
        media: page.items,
        total_pages: page.total_pages,
        current_page: page.current_page,
        total_items: page.total_items,
    }))
}

fn int_param(raw: Option<&str>) -> Option<usize> {
    raw?.trim().parse().ok()
}

async fn save_filter(
    State(state): State<AppState>,
    Json(filter): Json<MediaFilter>,
) -> Json<Value> {
    info!("Saving media filter: {:?}", filter);
    state.set_filter(Some(filter));
    Json(json!({ "message": "Filter configuration saved." }))
}

async fn clear_filter(State(state): State<AppState>) -> Json<Value> {
    state.set_filter(None);
    Json(json!({ "message": "Filter configuration cleared." }))
}

// ============================================================================
// Archive-and-remove
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    media_ids: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct DeleteFailure {
    id: Value,
    reason: String,
}

const NOT_FOUND_REASON: &str = "Not found in catalog";
const INVALID_ID_REASON: &str = "Invalid ID format";

/// Move each selected item into the archive, then drop the moved ones from
/// the catalog. Returns the per-id failures and the number removed.
fn archive_selected(
    db: &Database,
    media_ids: &[Value],
    archive_dir: &std::path::Path,
) -> Result<(Vec<DeleteFailure>, usize), CatalogError> {
    let mut failures = Vec::new();
    let mut archived = Vec::new();

    for raw in media_ids {
        let Some(id) = raw.as_i64() else {
            warn!("Invalid media ID format received: {}", raw);
            failures.push(DeleteFailure {
                id: raw.clone(),
                reason: INVALID_ID_REASON.to_string(),
            });
            continue;
        };
        let Some(record) = db.get_media(id)? else {
            warn!("Media item {} not found for deletion", id);
            failures.push(DeleteFailure {
                id: raw.clone(),
                reason: NOT_FOUND_REASON.to_string(),
            });
            continue;
        };
        match move_to_archive(&record.path, archive_dir) {
            Ok(new_path) => {
                info!("Archived media {} to {}", id, new_path.display());
                archived.push(id);
            }
            Err(e) => {
                error!("Failed to archive media {} ({}): {}", id, record.path.display(), e);
                failures.push(DeleteFailure {
                    id: raw.clone(),
                    reason: format!("File move failed: {}", e),
                });
            }
        }
    }

    let mut success_count = 0;
    if !archived.is_empty() {
        match db.delete_media(&archived) {
            Ok(_) => success_count = archived.len(),
            Err(e) => {
                error!("Error removing archived items from catalog: {}", e);
                failures.extend(archived.iter().map(|id| DeleteFailure {
                    id: json!(id),
                    reason: "Catalog removal failed after move".to_string(),
                }));
            }
        }
    }

    Ok((failures, success_count))
}

async fn delete_selected(
    State(state): State<AppState>,
    Json(request): Json<DeleteRequest>,
) -> ApiResult<Response> {
    if request.media_ids.is_empty() {
        return Ok(Json(json!({ "message": "No media IDs provided for deletion." })).into_response());
    }

    let archive_dir = match &state.archive_path {
        Some(path) if path.is_absolute() => path.clone(),
        _ => {
            error!("Archive path not configured or not absolute: {:?}", state.archive_path);
            return Err(ApiError::Internal("Archive path not configured correctly.".to_string()));
        }
    };

    let ids = request.media_ids.clone();
    let (failures, success_count) = tokio::task::spawn_blocking(move || {
        archive_selected(&state.catalog(), &ids, &archive_dir)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("archive task failed: {}", e)))??;

    let status = if failures.is_empty() {
        StatusCode::OK
    } else if success_count > 0 {
        StatusCode::MULTI_STATUS
    } else if failures.iter().any(|f| f.reason == INVALID_ID_REASON) {
        StatusCode::BAD_REQUEST
    } else if failures.len() == request.media_ids.len()
        && failures.iter().all(|f| f.reason == NOT_FOUND_REASON)
    {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    let message = format!(
        "Delete complete. Success: {}. Fail: {}.",
        success_count,
        failures.len()
    );
    info!("{}", message);

    Ok((
        status,
        Json(json!({
            "message": message,
            "success_count": success_count,
            "failures": failures,
        })),
    )
        .into_response())
}

// ============================================================================
// Tags
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateTagRequest {
    name: String,
}

#[derive(Debug, Deserialize)]
pub struct TagNamesRequest {
    tag_names: Vec<String>,
}

async fn list_tags(State(state): State<AppState>) -> ApiResult<Json<Vec<Tag>>> {
    Ok(Json(state.catalog().list_tags()?))
}

async fn create_tag(
    State(state): State<AppState>,
    Json(request): Json<CreateTagRequest>,
) -> ApiResult<Json<Tag>> {
    let tag = state.catalog().create_tag(&request.name)?;
    info!("Tag '{}' (id {}) processed", tag.name, tag.id);
    Ok(Json(tag))
}

async fn delete_tag(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let db = state.catalog();
    let tag = db.get_tag(id)?.ok_or_else(|| not_found("Tag", id))?;
    db.delete_tag(id)?;
    info!("Tag '{}' deleted", tag.name);
    Ok(Json(json!({ "message": format!("Tag '{}' deleted.", tag.name) })))
}

fn tag_names(tags: Vec<Tag>) -> Vec<String> {
    tags.into_iter().map(|t| t.name).collect()
}

async fn add_media_tags(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<TagNamesRequest>,
) -> ApiResult<Json<Value>> {
    let db = state.catalog();
    db.get_media(id)?.ok_or_else(|| not_found("Media", id))?;

    if !request.tag_names.is_empty() && request.tag_names.iter().all(|n| n.trim().is_empty()) {
        return Err(ApiError::BadRequest(
            "Tags cannot be empty or whitespace only.".to_string(),
        ));
    }

    db.add_tags_to_media(id, &request.tag_names)?;
    let tags = tag_names(db.tags_for_media(id)?);
    Ok(Json(json!({ "message": "Tags added.", "media_id": id, "tags": tags })))
}

async fn remove_media_tag(
    State(state): State<AppState>,
    Path((id, name)): Path<(i64, String)>,
) -> ApiResult<Json<Value>> {
    let db = state.catalog();
    db.get_media(id)?.ok_or_else(|| not_found("Media", id))?;
    if db.find_tag(&name)?.is_none() {
        return Err(ApiError::NotFound(format!("Tag '{}' not found.", name)));
    }

    let removed = db.remove_tags_from_media(id, &[name.clone()])?;
    let tags = tag_names(db.tags_for_media(id)?);
    let message = if removed > 0 {
        format!("Tag '{}' removed from media item {}.", name, id)
    } else {
        format!("Tag '{}' was not associated with media item {}.", name, id)
    };
    Ok(Json(json!({ "message": message, "media_id": id, "tags": tags })))
}

async fn org_paths(State(state): State<AppState>) -> Json<Vec<PathBuf>> {
    Json(state.scanner.roots().to_vec())
}

// ============================================================================
// Files and thumbnails
// ============================================================================

async fn serve_file(path: PathBuf, request: Request) -> Response {
    match ServeFile::new(path).oneshot(request).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    }
}

async fn media_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    request: Request,
) -> ApiResult<Response> {
    let record = state
        .catalog()
        .get_media(id)?
        .ok_or_else(|| not_found("Media", id))?;
    let resolved = resolve_media_path(&record.path, state.scanner.roots())?;
    Ok(serve_file(resolved, request).await)
}

async fn media_thumbnail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    request: Request,
) -> ApiResult<Response> {
    let record = state
        .catalog()
        .get_media(id)?
        .ok_or_else(|| not_found("Media", id))?;
    if record.kind != MediaKind::Image {
        return Err(ApiError::NotFound(
            "Thumbnails are only available for images.".to_string(),
        ));
    }

    let cached = state.thumbnails.cache_path(id);
    if !cached.exists() {
        let source = resolve_media_path(&record.path, state.scanner.roots())?;
        let thumbnails = state.thumbnails.clone();
        tokio::task::spawn_blocking(move || thumbnails.get_or_create(&record, &source, false))
            .await
            .map_err(|e| ApiError::Internal(format!("thumbnail task failed: {}", e)))?
            .map_err(|e| ApiError::Internal(format!("Thumbnail generation failed: {:#}", e)))?;
    }

    Ok(serve_file(cached, request).await)
}
