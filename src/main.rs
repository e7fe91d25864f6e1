//! Pathway - pathology report templates and Deep Zoom slide tiles.
//!
//! This binary opens the database, reconciles the slides directory and
//! starts the HTTP server.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pathway::{
    config::{CheckConfig, Cli, Command, ScanConfig, ServeConfig},
    server::{create_router, AppState, RouterConfig},
    slide::{discover_slides, reconcile_slides, SlideOpener, SlideRegistry},
    store::Database,
    tile::TileService,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Scan(config) => run_scan(config).await,
        Command::Check(config) => run_check(config),
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Pathway v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Slides directory: {}", config.storage.slides_dir.display());
    info!("  Database: {}", config.storage.database.display());
    info!(
        "  Cache: {} slides, {}MB tiles",
        config.cache_slides,
        config.cache_tiles / (1024 * 1024)
    );
    info!(
        "  Tiles: quality {}, {} worker(s)",
        config.jpeg_quality, config.tile_workers
    );
    info!(
        "  Import: {}s timeout, {:?}",
        config.import_timeout,
        config.activation_policy()
    );

    let db = match Database::open(&config.storage.database) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to open database: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Startup reconciliation; the server still starts if the directory is unreadable
    match scan_blocking(Arc::clone(&db), config.storage.slides_dir.clone()).await {
        Ok((discovered, inserted)) => {
            info!("  Slides: {} found, {} new", discovered, inserted);
        }
        Err(e) => {
            warn!("  Slide scan failed: {}", e);
        }
    }

    let registry = SlideRegistry::with_capacity(SlideOpener, config.cache_slides);
    let tiles = TileService::new(&config.storage.slides_dir, registry, Arc::clone(&db))
        .with_cache_capacity(config.cache_tiles)
        .with_jpeg_quality(config.jpeg_quality)
        .with_workers(config.tile_workers);

    let state = AppState::new(db, tiles)
        .with_import_timeout(config.import_timeout())
        .with_activation(config.activation_policy());

    let router = create_router(state, build_router_config(&config));

    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!("    curl http://{}/slides", addr);
    info!("    curl http://{}/dzi/<slide_name>.dzi", addr);
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Server stopped");
    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "pathway=debug,tower_http=debug"
    } else {
        "pathway=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new().with_cache_max_age(config.cache_max_age);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config.with_tracing(!config.no_tracing)
}

/// Run the reconciliation on the blocking pool, returning `(discovered, inserted)`.
async fn scan_blocking(
    db: Arc<Database>,
    slides_dir: std::path::PathBuf,
) -> Result<(usize, usize), String> {
    tokio::task::spawn_blocking(move || reconcile_slides(&db, &slides_dir))
        .await
        .map_err(|e| e.to_string())?
        .map(|report| (report.discovered, report.inserted))
        .map_err(|e| e.to_string())
}

// =============================================================================
// Scan Command
// =============================================================================

async fn run_scan(config: ScanConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.storage.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let db = match Database::open(&config.storage.database) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to open database: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match scan_blocking(db, config.storage.slides_dir.clone()).await {
        Ok((discovered, inserted)) => {
            println!("Discovered: {}", discovered);
            println!("Inserted:   {}", inserted);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Slide scan failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Check Command
// =============================================================================

fn run_check(config: CheckConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    println!("Pathway Configuration Check");
    println!("═════════════════════════════════");
    println!();

    if let Err(e) = config.storage.validate() {
        println!("✗ Configuration: {}", e);
        return ExitCode::FAILURE;
    }

    match Database::open(&config.storage.database) {
        Ok(_) => println!("✓ Database: {}", config.storage.database.display()),
        Err(e) => {
            println!("✗ Database: {}", e);
            return ExitCode::FAILURE;
        }
    }

    let slides = match discover_slides(&config.storage.slides_dir) {
        Ok(slides) => {
            println!(
                "✓ Slides directory: {} ({} slide(s))",
                config.storage.slides_dir.display(),
                slides.len()
            );
            slides
        }
        Err(e) => {
            println!("✗ Slides directory: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if config.list_slides {
        println!();
        println!("Slides:");
        println!("─────────────────");
        if slides.is_empty() {
            println!("  (no slides found)");
        } else {
            for slide in &slides {
                println!("  {}", slide);
            }
        }
    }

    println!();
    println!("═════════════════════════════════");
    println!("✓ All checks passed!");

    ExitCode::SUCCESS
}
