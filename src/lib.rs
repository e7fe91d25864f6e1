//! # Pathway
//!
//! Pathology report templates and Deep Zoom slide tiles over HTTP.
//!
//! ## Features
//!
//! - **Template pipeline**: import XML report templates into versioned groups
//!   of typed properties, validate uploads against the active version, and
//!   export it as XML, JSON or an HL7v2-style message
//! - **Path mappings**: per-property JSON, XML, FHIR, HL7v2 and DICOM
//!   addresses, editable in all-or-nothing batches
//! - **Slide registry**: discover slide files and folders on disk and keep one
//!   database record per name
//! - **Deep Zoom**: DZI descriptors, 256px tiles with 1px overlap, and slide
//!   metadata enriched with report narrative
//!
//! ## Architecture
//!
//! - [`store`] - SQLite persistence
//! - [`template`] - Import, validation, export and mapping edits
//! - [`report`] - Slide reports and narrative fields
//! - [`slide`] - Slide discovery, resolution and pyramid readers
//! - [`tile`] - Deep Zoom geometry, tile rendering and caching
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use pathway::{create_router, AppState, Database, SlideOpener, RouterConfig, SlideRegistry, TileService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Arc::new(Database::open("pathway.db".as_ref())?);
//!     let tiles = TileService::new("slides", SlideRegistry::new(SlideOpener), Arc::clone(&db));
//!     let router = create_router(AppState::new(db, tiles), RouterConfig::new());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod report;
pub mod server;
pub mod slide;
pub mod store;
pub mod template;
pub mod tile;

// Re-export commonly used types
pub use config::{CheckConfig, Cli, Command, ScanConfig, ServeConfig, StorageArgs};
pub use error::{
    MappingUpdateError, ReaderError, ReportError, ScanError, StoreError, TemplateError, TiffError,
    TileError,
};
pub use report::{
    create_slide_report, narrative_for_slide, Narrative, NewSlideReport, PropertyValue, Report,
    ReportType,
};
pub use server::{create_router, ApiError, AppState, ErrorResponse, RouterConfig};
pub use slide::{
    locate_slide, reconcile_slides, LevelInfo, PyramidOpener, PyramidReader, SlideOpener,
    SlideLocation, SlideRecord, SlideRegistry,
};
pub use store::Database;
pub use template::export::{export_template, ExportFile, ExportFormat};
pub use template::{
    active_version, create_profile, import_template, list_profiles, update_mappings,
    validate_template, ActivationPolicy, ImportOptions, Profile, TemplateVersion,
};
pub use tile::{DeepZoomGrid, SlideMetadata, TileCache, TileService};
