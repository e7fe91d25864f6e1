//! HTTP request handlers.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check
//! - `GET|POST /profiles` - List or create profiles
//! - `GET /profiles/{profile_id}/template` - Active template as JSON
//! - `POST /profiles/{profile_id}/template/import` - Import an XML template
//! - `POST /profiles/{profile_id}/template/validate` - Validate an XML upload
//! - `GET /profiles/{profile_id}/template/export/{format}` - Download an export
//! - `POST /template-properties/mappings` - Batch mapping update
//! - `GET /slides` - Persisted slide records
//! - `POST /slides/{slide_name}/report` - Create a slide report
//! - `GET /dzi/{slide_name}.dzi` - Deep Zoom descriptor
//! - `GET|HEAD /tiles/{slide_name}/{level}/{col}_{row}.jpeg` - Tile
//! - `GET /metadata/{slide_name}` - Slide metadata with report narrative
//!
//! Store and template work is synchronous and runs on the blocking pool.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::error::{MappingUpdateError, ReportError, StoreError, TemplateError, TileError};
use crate::report::{self, NewSlideReport, Report};
use crate::slide::{PyramidOpener, SlideOpener, SlideRecord};
use crate::store::{self, Database};
use crate::template::{self, export, ActivationPolicy, ImportOptions, Profile};
use crate::tile::{parse_tile_filename, SlideMetadata, TileService};

/// Default `Cache-Control` max-age for tiles and descriptors, in seconds.
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

const DZI_SUFFIX: &str = ".dzi";

const TILE_CACHE_HIT_HEADER: HeaderName = HeaderName::from_static("x-tile-cache-hit");

// =============================================================================
// Application State
// =============================================================================

/// Shared context handed to every handler.
pub struct AppState<O: PyramidOpener = SlideOpener> {
    pub db: Arc<Database>,

    pub tiles: Arc<TileService<O>>,

    /// Deadline for a single template import
    pub import_timeout: Option<Duration>,

    /// What an import does to earlier active versions
    pub activation: ActivationPolicy,

    pub cache_max_age: u32,
}

impl<O: PyramidOpener> AppState<O> {
    pub fn new(db: Arc<Database>, tiles: TileService<O>) -> Self {
        Self {
            db,
            tiles: Arc::new(tiles),
            import_timeout: None,
            activation: ActivationPolicy::default(),
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
        }
    }

    pub fn with_import_timeout(mut self, timeout: Duration) -> Self {
        self.import_timeout = Some(timeout);
        self
    }

    pub fn with_activation(mut self, activation: ActivationPolicy) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    fn cache_control(&self) -> String {
        format!("public, max-age={}", self.cache_max_age)
    }
}

impl<O: PyramidOpener> Clone for AppState<O> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            tiles: Arc::clone(&self.tiles),
            import_timeout: self.import_timeout,
            activation: self.activation,
            cache_max_age: self.cache_max_age,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Path parameters for tile requests.
///
/// Extracted from: `/tiles/{slide_name}/{level}/{filename}`
/// where filename is `{col}_{row}.jpeg` or `{col}_{row}.jpg`
#[derive(Debug, Deserialize)]
pub struct TilePathParams {
    pub slide_name: String,

    /// Deep Zoom level (0 = 1x1 pixel)
    pub level: u32,

    pub filename: String,
}

impl TilePathParams {
    fn col_row(&self) -> Result<(u32, u32), ApiError> {
        parse_tile_filename(&self.filename).ok_or_else(|| {
            ApiError::BadRequest(format!("Invalid tile filename: {}", self.filename))
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ImportQueryParams {
    /// Version label; defaults to "v1"
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateProfileRequest {
    pub name: String,
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "invalid_coordinates")
    pub error: String,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub status: String,
    pub version: String,
    pub version_id: i64,
    pub groups: usize,
    pub properties: usize,
}

#[derive(Debug, Serialize)]
pub struct ValidationResponse {
    pub valid: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SlidesResponse {
    pub slides: Vec<SlideRecord>,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Log by severity and build the JSON error body.
fn error_response(status: StatusCode, error_type: &str, message: String) -> Response {
    if status.is_server_error() {
        error!(
            error_type = error_type,
            status = status.as_u16(),
            "Server error: {}",
            message
        );
    } else if status == StatusCode::NOT_FOUND {
        debug!(
            error_type = error_type,
            status = status.as_u16(),
            "Resource not found: {}",
            message
        );
    } else {
        warn!(
            error_type = error_type,
            status = status.as_u16(),
            "Client error: {}",
            message
        );
    }

    let body = ErrorResponse::with_status(error_type, message, status);
    (status, Json(body)).into_response()
}

fn store_error_parts(err: &StoreError) -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "persistence_error",
        format!("A database error occurred: {}", err),
    )
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = store_error_parts(&self);
        error_response(status, error_type, message)
    }
}

impl IntoResponse for TemplateError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            TemplateError::Parse(_) => (StatusCode::BAD_REQUEST, "parse_error", self.to_string()),
            TemplateError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            TemplateError::Invalid(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            TemplateError::Timeout { .. } => {
                (StatusCode::GATEWAY_TIMEOUT, "timeout", self.to_string())
            }
            TemplateError::Export(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "export_error",
                self.to_string(),
            ),
            TemplateError::Persistence(err) => store_error_parts(err),
        };
        error_response(status, error_type, message)
    }
}

impl IntoResponse for MappingUpdateError {
    fn into_response(self) -> Response {
        match self {
            MappingUpdateError::Rejected(errors) => {
                warn!(errors = errors.len(), "Mapping update rejected");
                let body = json!({ "status": "error", "errors": errors });
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
            MappingUpdateError::InvalidPayload => error_response(
                StatusCode::BAD_REQUEST,
                "invalid_payload",
                self.to_string(),
            ),
            MappingUpdateError::Persistence(err) => err.into_response(),
        }
    }
}

impl IntoResponse for ReportError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            ReportError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            ReportError::InvalidValue { .. } => {
                (StatusCode::BAD_REQUEST, "invalid_value", self.to_string())
            }
            ReportError::Persistence(err) => store_error_parts(err),
        };
        error_response(status, error_type, message)
    }
}

impl IntoResponse for TileError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            // 404 Not Found
            TileError::SlideNotFound { .. } => {
                (StatusCode::NOT_FOUND, "not_found", self.to_string())
            }

            // 400 Bad Request
            TileError::InvalidCoordinates { .. } => (
                StatusCode::BAD_REQUEST,
                "invalid_coordinates",
                self.to_string(),
            ),

            // 415 Unsupported Media Type
            TileError::UnsupportedSlide { .. } => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "unsupported_format",
                self.to_string(),
            ),
            TileError::Reader(crate::error::ReaderError::Unsupported { .. }) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "unsupported_format",
                self.to_string(),
            ),

            // 500 Internal Server Error
            TileError::Reader(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "reader_error",
                self.to_string(),
            ),
            TileError::Encode { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "encode_error",
                self.to_string(),
            ),
            TileError::Worker { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "worker_error",
                self.to_string(),
            ),
            TileError::Store(err) => store_error_parts(err),
        };
        error_response(status, error_type, message)
    }
}

/// Error returned by every handler.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Mapping(#[from] MappingUpdateError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error(transparent)]
    Tile(#[from] TileError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Malformed request not covered by a domain error
    #[error("{0}")]
    BadRequest(String),

    /// A blocking task panicked or was cancelled
    #[error("Worker failed: {0}")]
    Worker(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Template(err) => err.into_response(),
            ApiError::Mapping(err) => err.into_response(),
            ApiError::Report(err) => err.into_response(),
            ApiError::Tile(err) => err.into_response(),
            ApiError::Store(err) => err.into_response(),
            ApiError::BadRequest(message) => {
                error_response(StatusCode::BAD_REQUEST, "invalid_request", message)
            }
            ApiError::Worker(message) => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "worker_error",
                message,
            ),
        }
    }
}

/// Run store work on the blocking pool.
async fn blocking<T, E, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(Into::into),
        Err(e) => Err(ApiError::Worker(e.to_string())),
    }
}

// =============================================================================
// Health and Profiles
// =============================================================================

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn list_profiles_handler<O: PyramidOpener + 'static>(
    State(state): State<AppState<O>>,
) -> Result<Json<Vec<Profile>>, ApiError> {
    let db = Arc::clone(&state.db);
    let profiles = blocking(move || template::list_profiles(&db)).await?;
    Ok(Json(profiles))
}

pub async fn create_profile_handler<O: PyramidOpener + 'static>(
    State(state): State<AppState<O>>,
    Json(request): Json<CreateProfileRequest>,
) -> Result<(StatusCode, Json<Profile>), ApiError> {
    let db = Arc::clone(&state.db);
    let profile = blocking(move || template::create_profile(&db, &request.name)).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

// =============================================================================
// Templates
// =============================================================================

/// Active template version, in the JSON export shape.
pub async fn active_template_handler<O: PyramidOpener + 'static>(
    State(state): State<AppState<O>>,
    Path(profile_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let db = Arc::clone(&state.db);
    let document = blocking(move || {
        let version = template::active_version(&db, &profile_id)?;
        export::to_json_value(&version)
    })
    .await?;
    Ok(Json(document))
}

pub async fn import_template_handler<O: PyramidOpener + 'static>(
    State(state): State<AppState<O>>,
    Path(profile_id): Path<String>,
    Query(query): Query<ImportQueryParams>,
    body: String,
) -> Result<(StatusCode, Json<ImportResponse>), ApiError> {
    let mut options = ImportOptions::default().with_activation(state.activation);
    if let Some(label) = query.version {
        options = options.with_version_label(label);
    }
    if let Some(timeout) = state.import_timeout {
        options = options.with_timeout(timeout);
    }

    let db = Arc::clone(&state.db);
    let version =
        blocking(move || template::import_template(&db, &body, &profile_id, &options)).await?;

    Ok((
        StatusCode::CREATED,
        Json(ImportResponse {
            status: "success".to_string(),
            groups: version.groups.len(),
            properties: version.property_count(),
            version_id: version.id,
            version: version.version,
        }),
    ))
}

pub async fn validate_template_handler<O: PyramidOpener + 'static>(
    State(state): State<AppState<O>>,
    Path(profile_id): Path<String>,
    body: String,
) -> Result<Json<ValidationResponse>, ApiError> {
    let db = Arc::clone(&state.db);
    let errors =
        blocking(move || template::validate_template(&db, &body, &profile_id)).await?;

    Ok(Json(ValidationResponse {
        valid: errors.is_empty(),
        errors,
    }))
}

pub async fn export_template_handler<O: PyramidOpener + 'static>(
    State(state): State<AppState<O>>,
    Path((profile_id, format)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let format: export::ExportFormat = format.parse()?;

    let db = Arc::clone(&state.db);
    let file = blocking(move || export::export_template(&db, &profile_id, format)).await?;

    Ok((
        [
            (header::CONTENT_TYPE, file.content_type.to_string()),
            (header::CONTENT_DISPOSITION, file.content_disposition()),
        ],
        file.body,
    )
        .into_response())
}

pub async fn update_mappings_handler<O: PyramidOpener + 'static>(
    State(state): State<AppState<O>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let db = Arc::clone(&state.db);
    let updated = blocking(move || template::update_mappings(&db, &body)).await?;
    Ok(Json(json!({ "status": "success", "updated": updated })))
}

// =============================================================================
// Slides and Reports
// =============================================================================

pub async fn slides_handler<O: PyramidOpener + 'static>(
    State(state): State<AppState<O>>,
) -> Result<Json<SlidesResponse>, ApiError> {
    let db = Arc::clone(&state.db);
    let slides = blocking(move || db.with_conn(store::slides::list_slides)).await?;
    Ok(Json(SlidesResponse { slides }))
}

pub async fn create_report_handler<O: PyramidOpener + 'static>(
    State(state): State<AppState<O>>,
    Path(slide_name): Path<String>,
    Json(input): Json<NewSlideReport>,
) -> Result<(StatusCode, Json<Report>), ApiError> {
    let db = Arc::clone(&state.db);
    let report = blocking(move || report::create_slide_report(&db, &slide_name, &input)).await?;
    info!(report_id = %report.id, values = report.values.len(), "Created slide report");
    Ok((StatusCode::CREATED, Json(report)))
}

// =============================================================================
// Deep Zoom
// =============================================================================

pub async fn dzi_handler<O: PyramidOpener + 'static>(
    State(state): State<AppState<O>>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let slide_name = filename
        .strip_suffix(DZI_SUFFIX)
        .ok_or_else(|| TileError::SlideNotFound {
            slide: filename.clone(),
        })?;

    let xml = state.tiles.dzi(slide_name).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/xml".to_string()),
            (header::CACHE_CONTROL, state.cache_control()),
        ],
        xml,
    )
        .into_response())
}

pub async fn tile_handler<O: PyramidOpener + 'static>(
    State(state): State<AppState<O>>,
    Path(params): Path<TilePathParams>,
) -> Result<Response, ApiError> {
    let (col, row) = params.col_row()?;

    let response = state
        .tiles
        .get_tile(&params.slide_name, params.level, col, row)
        .await?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg".to_string()),
            (header::CACHE_CONTROL, state.cache_control()),
            (TILE_CACHE_HIT_HEADER, response.cache_hit.to_string()),
        ],
        Body::from(response.data),
    )
        .into_response())
}

/// Same validation as [`tile_handler`], without rendering the tile.
pub async fn tile_head_handler<O: PyramidOpener + 'static>(
    State(state): State<AppState<O>>,
    Path(params): Path<TilePathParams>,
) -> Result<Response, ApiError> {
    let (col, row) = params.col_row()?;

    state
        .tiles
        .check_tile(&params.slide_name, params.level, col, row)
        .await?;

    Ok(([(header::CONTENT_TYPE, "image/jpeg")], Body::empty()).into_response())
}

pub async fn metadata_handler<O: PyramidOpener + 'static>(
    State(state): State<AppState<O>>,
    Path(slide_name): Path<String>,
) -> Result<Json<SlideMetadata>, ApiError> {
    Ok(Json(state.tiles.metadata(&slide_name).await?))
}

// =============================================================================
// Tests
// =============================================================================
