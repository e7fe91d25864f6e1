//! Router configuration.
//!
//! # Route Structure
//!
//! ```text
//! /health                                          - Health check
//! /profiles                                        - List / create profiles
//! /profiles/{profile_id}/template                  - Active template (JSON)
//! /profiles/{profile_id}/template/import           - Import XML
//! /profiles/{profile_id}/template/validate         - Validate XML
//! /profiles/{profile_id}/template/export/{format}  - xml | json | hl7v2
//! /template-properties/mappings                    - Batch mapping update
//! /slides                                          - Slide records
//! /slides/{slide_name}/report                      - Create slide report
//! /dzi/{slide_name}.dzi                            - Deep Zoom descriptor
//! /tiles/{slide_name}/{level}/{col}_{row}.jpeg     - Tile (GET, HEAD)
//! /metadata/{slide_name}                           - Slide metadata
//! ```

use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use http::header::CONTENT_TYPE;
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    active_template_handler, create_profile_handler, create_report_handler, dzi_handler,
    export_template_handler, health_handler, import_template_handler, list_profiles_handler,
    metadata_handler, slides_handler, tile_handler, tile_head_handler, update_mappings_handler,
    validate_template_handler, AppState, DEFAULT_CACHE_MAX_AGE,
};
use crate::slide::PyramidOpener;

// =============================================================================
// Router Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins; `None` allows any origin
    pub cors_origins: Option<Vec<String>>,

    pub cache_max_age: u32,

    pub enable_tracing: bool,
}

impl RouterConfig {
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            enable_tracing: true,
        }
    }

    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Router Builder
// =============================================================================

pub fn create_router<O>(state: AppState<O>, config: RouterConfig) -> Router
where
    O: PyramidOpener + 'static,
{
    let state = state.with_cache_max_age(config.cache_max_age);
    let cors = build_cors_layer(&config);

    let router = Router::new()
        .route("/health", get(health_handler))
        .route(
            "/profiles",
            get(list_profiles_handler::<O>).post(create_profile_handler::<O>),
        )
        .route(
            "/profiles/{profile_id}/template",
            get(active_template_handler::<O>),
        )
        .route(
            "/profiles/{profile_id}/template/import",
            post(import_template_handler::<O>),
        )
        .route(
            "/profiles/{profile_id}/template/validate",
            post(validate_template_handler::<O>),
        )
        .route(
            "/profiles/{profile_id}/template/export/{format}",
            get(export_template_handler::<O>),
        )
        .route(
            "/template-properties/mappings",
            post(update_mappings_handler::<O>),
        )
        .route("/slides", get(slides_handler::<O>))
        .route(
            "/slides/{slide_name}/report",
            post(create_report_handler::<O>),
        )
        // {filename} captures "{slide_name}.dzi"
        .route("/dzi/{filename}", get(dzi_handler::<O>))
        // {filename} captures "{col}_{row}.jpeg" and "{col}_{row}.jpg"
        .route(
            "/tiles/{slide_name}/{level}/{filename}",
            get(tile_handler::<O>).head(tile_head_handler::<O>),
        )
        .route("/metadata/{slide_name}", get(metadata_handler::<O>))
        .with_state(state)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        // No origins allowed
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
