//! services/api/src/adapters/rasterizer.rs
//!
//! This module contains the adapter for the external PDF rasterizer.
//! It implements the `PageRasterizer` port from the `core` crate by running
//! poppler's `pdftoppm` and renaming its output to `page.<n>.jpg`.

use async_trait::async_trait;
use regex::Regex;
use scriptorium_core::ports::{PageRasterizer, PortError, PortResult};
use std::path::Path;
use std::sync::OnceLock;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::RasterConfig;

/// Prefix `pdftoppm` writes before each page number.
const OUTPUT_ROOT: &str = "page";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `PageRasterizer` using the `pdftoppm` binary.
#[derive(Clone)]
pub struct PdftoppmRasterizer {
    config: RasterConfig,
}

impl PdftoppmRasterizer {
    /// Creates a new `PdftoppmRasterizer`.
    pub fn new(config: RasterConfig) -> Self {
        Self { config }
    }
}

/// Maps a `pdftoppm` output name (`page-7.jpg`, `page-007.jpg`) to its page number.
pub fn raw_page_number(file_name: &str) -> Option<i32> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| Regex::new(&format!(r"^{}-0*(\d+)\.jpg$", OUTPUT_ROOT)).ok())
        .as_ref()?;
    pattern
        .captures(file_name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

//=========================================================================================
// `PageRasterizer` Trait Implementation
//=========================================================================================

#[async_trait]
impl PageRasterizer for PdftoppmRasterizer {
    /// Renders each page at the configured density, scaled to fit the configured box.
    async fn rasterize(&self, pdf: &Path, out_dir: &Path) -> PortResult<usize> {
        info!("Rasterizing {}...", pdf.display());
        let output = Command::new(&self.config.binary)
            .arg("-jpeg")
            .arg("-r")
            .arg(self.config.density.to_string())
            .arg("-scale-to-x")
            .arg(self.config.width.to_string())
            .arg("-scale-to-y")
            .arg(self.config.height.to_string())
            .arg(pdf)
            .arg(out_dir.join(OUTPUT_ROOT))
            .output()
            .await
            .map_err(|e| PortError::Unexpected(format!("Failed to run pdftoppm: {}", e)))?;

        if !output.status.success() {
            return Err(PortError::Unexpected(format!(
                "pdftoppm exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let mut entries = tokio::fs::read_dir(out_dir)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let mut pages = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?
        {
            let file_name = entry.file_name();
            let Some(number) = file_name.to_str().and_then(raw_page_number) else {
                continue;
            };
            let target = out_dir.join(format!("{}.{}.jpg", OUTPUT_ROOT, number));
            debug!("Renaming {:?} to {}", file_name, target.display());
            tokio::fs::rename(entry.path(), &target)
                .await
                .map_err(|e| PortError::Unexpected(e.to_string()))?;
            pages += 1;
        }

        Ok(pages)
    }
}
