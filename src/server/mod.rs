//! HTTP server layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │   /profiles/..   /template-properties/..   /dzi /tiles /metadata│
//! │                                                                 │
//! │  ┌──────────────────────────────┐  ┌─────────────────────────┐  │
//! │  │          handlers            │  │        routes           │  │
//! │  │ (AppState, error mapping)    │  │  (router config, CORS)  │  │
//! │  └──────────────────────────────┘  └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//!            │                     │                     │
//!            ▼                     ▼                     ▼
//!        template               report                 tile
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    health_handler, metadata_handler, tile_handler, ApiError, AppState, ErrorResponse,
    HealthResponse, ImportResponse, SlidesResponse, TilePathParams, ValidationResponse,
    DEFAULT_CACHE_MAX_AGE,
};
pub use routes::{create_router, RouterConfig};
