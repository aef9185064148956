//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The
//! `.env.local` and `.env` files are used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Settings for the external PDF rasterizer.
#[derive(Clone, Debug)]
pub struct RasterConfig {
    pub binary: PathBuf,
    pub density: u32,
    pub width: u32,
    pub height: u32,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub cors_origin: String,
    pub upload_dir: PathBuf,
    pub raster: RasterConfig,
    pub restore_dir: PathBuf,
    pub export_dir: PathBuf,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for `.env.local` and then `.env` in the current directory for
    /// development, but this is skipped in test environments to keep tests hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from dotenv files in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::from_filename(".env.local").ok();
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin = std::env::var("CORS_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        // --- Load Storage Locations ---
        let upload_dir = path_var("UPLOAD_DIR", "./public/uploads");
        let restore_dir = path_var("RESTORE_DIR", ".");
        let export_dir = path_var("EXPORT_DIR", ".");

        // --- Load Rasterizer Settings ---
        let raster = RasterConfig {
            binary: path_var("PDFTOPPM_PATH", "pdftoppm"),
            density: parsed_var("RASTER_DENSITY", 150)?,
            width: parsed_var("RASTER_WIDTH", 1200)?,
            height: parsed_var("RASTER_HEIGHT", 1600)?,
        };

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            cors_origin,
            upload_dir,
            raster,
            restore_dir,
            export_dir,
        })
    }

    /// Installs the global `tracing` subscriber at the configured level.
    pub fn init_tracing(&self) {
        tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::new(self.log_level.to_string()))
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn path_var(name: &str, default: &str) -> PathBuf {
    std::env::var(name)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

fn parsed_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}
