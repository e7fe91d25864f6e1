//! Configuration management.
//!
//! Options come from command-line arguments or from environment variables
//! with the `PATHWAY_` prefix, with defaults for everything optional.
//!
//! # Commands
//!
//! - `pathway [serve]` - Run the HTTP server (default)
//! - `pathway scan` - Reconcile the slides directory into the database once
//! - `pathway check` - Validate paths and list discoverable slides
//!
//! # Environment Variables
//!
//! - `PATHWAY_HOST` - Server bind address (default: 0.0.0.0)
//! - `PATHWAY_PORT` - Server port (default: 3000)
//! - `PATHWAY_SLIDES_DIR` - Directory of slide files and folders (default: slides)
//! - `PATHWAY_DATABASE` - SQLite database file (default: pathway.db)
//! - `PATHWAY_CACHE_SLIDES` - Max open slides to cache (default: 16)
//! - `PATHWAY_CACHE_TILES` - Tile cache size in bytes (default: 64MB)
//! - `PATHWAY_JPEG_QUALITY` - Tile JPEG quality (default: 75)
//! - `PATHWAY_TILE_WORKERS` - Tiles rendered concurrently (default: 4)
//! - `PATHWAY_IMPORT_TIMEOUT` - Template import deadline in seconds (default: 30)
//! - `PATHWAY_DEACTIVATE_PREVIOUS` - Deactivate earlier versions on import (default: false)
//! - `PATHWAY_CORS_ORIGINS` - Comma-separated allowed origins (default: any)
//! - `PATHWAY_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::server::DEFAULT_CACHE_MAX_AGE;
use crate::slide::DEFAULT_SLIDE_CACHE_CAPACITY;
use crate::template::ActivationPolicy;
use crate::tile::{
    DEFAULT_JPEG_QUALITY, DEFAULT_TILE_CACHE_CAPACITY, DEFAULT_TILE_WORKERS, MAX_JPEG_QUALITY,
    MIN_JPEG_QUALITY,
};

// =============================================================================
// Default Values
// =============================================================================

pub const DEFAULT_HOST: &str = "0.0.0.0";

pub const DEFAULT_PORT: u16 = 3000;

pub const DEFAULT_SLIDES_DIR: &str = "slides";

pub const DEFAULT_DATABASE: &str = "pathway.db";

/// Default deadline for one template import, in seconds.
pub const DEFAULT_IMPORT_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// CLI
// =============================================================================

#[derive(Parser, Debug, Clone)]
#[command(name = "pathway")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Server options when no subcommand is given
    #[command(flatten)]
    pub serve: ServeConfig,
}

impl Cli {
    /// The selected command; `serve` when none was named.
    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Serve(self.serve))
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP server
    Serve(ServeConfig),

    /// Reconcile the slides directory into the database and exit
    Scan(ScanConfig),

    /// Validate configuration and list discoverable slides
    Check(CheckConfig),
}

/// Filesystem locations shared by every command.
#[derive(Args, Debug, Clone)]
pub struct StorageArgs {
    /// Directory holding slide files and slide folders
    #[arg(long, default_value = DEFAULT_SLIDES_DIR, env = "PATHWAY_SLIDES_DIR")]
    pub slides_dir: PathBuf,

    /// SQLite database file, created if missing
    #[arg(long, default_value = DEFAULT_DATABASE, env = "PATHWAY_DATABASE")]
    pub database: PathBuf,
}

impl StorageArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.slides_dir.as_os_str().is_empty() {
            return Err("slides_dir must not be empty".to_string());
        }
        if self.database.as_os_str().is_empty() {
            return Err("database must not be empty".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Serve
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    #[arg(long, default_value = DEFAULT_HOST, env = "PATHWAY_HOST")]
    pub host: String,

    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "PATHWAY_PORT")]
    pub port: u16,

    #[command(flatten)]
    pub storage: StorageArgs,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Maximum number of open slides kept in memory
    #[arg(long, default_value_t = DEFAULT_SLIDE_CACHE_CAPACITY, env = "PATHWAY_CACHE_SLIDES")]
    pub cache_slides: usize,

    /// Tile cache size in bytes
    #[arg(long, default_value_t = DEFAULT_TILE_CACHE_CAPACITY, env = "PATHWAY_CACHE_TILES")]
    pub cache_tiles: usize,

    // =========================================================================
    // Tile Configuration
    // =========================================================================
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "PATHWAY_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// Tiles rendered concurrently
    #[arg(long, default_value_t = DEFAULT_TILE_WORKERS, env = "PATHWAY_TILE_WORKERS")]
    pub tile_workers: usize,

    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "PATHWAY_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    // =========================================================================
    // Template Configuration
    // =========================================================================
    /// Seconds before a template import is aborted and rolled back
    #[arg(long, default_value_t = DEFAULT_IMPORT_TIMEOUT_SECS, env = "PATHWAY_IMPORT_TIMEOUT")]
    pub import_timeout: u64,

    /// Clear the active flag on earlier versions when importing
    #[arg(long, default_value_t = false, env = "PATHWAY_DEACTIVATE_PREVIOUS")]
    pub deactivate_previous: bool,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    #[arg(long, env = "PATHWAY_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable per-request HTTP tracing
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.storage.validate()?;

        if self.cache_slides == 0 {
            return Err("cache_slides must be greater than 0".to_string());
        }
        if self.cache_tiles == 0 {
            return Err("cache_tiles must be greater than 0".to_string());
        }
        if self.tile_workers == 0 {
            return Err("tile_workers must be greater than 0".to_string());
        }

        if !(MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&self.jpeg_quality) {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }

        if self.import_timeout == 0 {
            return Err("import_timeout must be greater than 0".to_string());
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn import_timeout(&self) -> Duration {
        Duration::from_secs(self.import_timeout)
    }

    pub fn activation_policy(&self) -> ActivationPolicy {
        if self.deactivate_previous {
            ActivationPolicy::DeactivatePrevious
        } else {
            ActivationPolicy::KeepExisting
        }
    }
}

// =============================================================================
// Scan and Check
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct ScanConfig {
    #[command(flatten)]
    pub storage: StorageArgs,

    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CheckConfig {
    #[command(flatten)]
    pub storage: StorageArgs,

    /// Print every discoverable slide
    #[arg(long, default_value_t = false)]
    pub list_slides: bool,

    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ServeConfig {
        ServeConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            storage: StorageArgs {
                slides_dir: PathBuf::from("/data/slides"),
                database: PathBuf::from("/data/pathway.db"),
            },
            cache_slides: 8,
            cache_tiles: 1024 * 1024,
            jpeg_quality: 85,
            tile_workers: 2,
            cache_max_age: 7200,
            import_timeout: 10,
            deactivate_previous: false,
            cors_origins: None,
            verbose: false,
            no_tracing: false,
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_invalid_cache_sizes() {
        let mut config = test_config();
        config.cache_slides = 0;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.cache_tiles = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_workers_and_timeout() {
        let mut config = test_config();
        config.tile_workers = 0;
        assert!(config.validate().unwrap_err().contains("tile_workers"));

        let mut config = test_config();
        config.import_timeout = 0;
        assert!(config.validate().unwrap_err().contains("import_timeout"));
    }

    #[test]
    fn test_invalid_jpeg_quality() {
        let mut config = test_config();
        config.jpeg_quality = 0;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.jpeg_quality = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_slides_dir() {
        let mut config = test_config();
        config.storage.slides_dir = PathBuf::new();
        assert!(config.validate().unwrap_err().contains("slides_dir"));
    }

    #[test]
    fn test_bind_address_and_helpers() {
        let mut config = test_config();
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
        assert_eq!(config.import_timeout(), Duration::from_secs(10));
        assert_eq!(config.activation_policy(), ActivationPolicy::KeepExisting);

        config.deactivate_previous = true;
        assert_eq!(
            config.activation_policy(),
            ActivationPolicy::DeactivatePrevious
        );
    }

    #[test]
    fn test_cli_defaults_to_serve() {
        let cli = Cli::try_parse_from(["pathway", "--port", "9000"]).unwrap();
        match cli.into_command() {
            Command::Serve(config) => {
                assert_eq!(config.port, 9000);
                assert_eq!(config.storage.slides_dir, PathBuf::from(DEFAULT_SLIDES_DIR));
            }
            other => panic!("expected serve, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_subcommands() {
        let cli =
            Cli::try_parse_from(["pathway", "scan", "--slides-dir", "/tmp/slides"]).unwrap();
        match cli.into_command() {
            Command::Scan(config) => {
                assert_eq!(config.storage.slides_dir, PathBuf::from("/tmp/slides"))
            }
            other => panic!("expected scan, got {other:?}"),
        }

        let cli = Cli::try_parse_from(["pathway", "check", "--list-slides"]).unwrap();
        assert!(matches!(
            cli.into_command(),
            Command::Check(CheckConfig {
                list_slides: true,
                ..
            })
        ));
    }
}
