//! services/api/src/bin/export_content.rs
//!
//! Writes the text of every transcribed page to
//! `EXPORT_DIR/exported_content_<millis>.txt`.

use api_lib::{adapters::db::DbAdapter, config::Config, error::ApiError, export::export_content};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    let config = Config::from_env()?;
    config.init_tracing();

    info!("Connecting to database...");
    let db_adapter = DbAdapter::connect(&config.database_url, 2).await?;

    let (path, pages) = export_content(&db_adapter, &config.export_dir).await?;
    info!("Exported {} pages to {}", pages, path.display());
    Ok(())
}
