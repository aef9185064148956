//! services/api/src/bin/restore.rs
//!
//! Rebuilds the library from the raw dumps (`files.json`, `backups.json`,
//! `messages.json`) found in `RESTORE_DIR`. Takes no arguments; exits with
//! status 1 on a fatal error.

use api_lib::{
    adapters::db::DbAdapter,
    config::Config,
    error::ApiError,
    restore::{run_restore, RestoreReport, RestoreSources},
};
use tracing::{error, info, warn};

async fn restore(config: &Config) -> Result<RestoreReport, ApiError> {
    info!("Connecting to database...");
    let db_adapter = DbAdapter::connect(&config.database_url, 5).await?;
    db_adapter.run_migrations().await?;

    let sources = RestoreSources::load(&config.restore_dir).await;
    Ok(run_restore(&db_adapter, &sources).await?)
}

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Restore failed: {}", e);
            std::process::exit(1);
        }
    };
    config.init_tracing();

    match restore(&config).await {
        Ok(report) => {
            info!(
                "Restore complete: {} users, {} books, {} pages ({} completed), {} messages",
                report.users, report.books, report.pages, report.completed_pages, report.messages
            );
            if report.dropped_page_entries + report.dropped_contents > 0 {
                warn!(
                    "Dropped {} page metadata entries and {} content files for unknown books",
                    report.dropped_page_entries, report.dropped_contents
                );
            }
            if report.fallback_claimants > 0 {
                warn!(
                    "{} pages were reassigned to the fallback user",
                    report.fallback_claimants
                );
            }
            if report.dropped_messages + report.dropped_replies > 0 {
                warn!(
                    "Dropped {} messages and {} replies with unknown users",
                    report.dropped_messages, report.dropped_replies
                );
            }
            if report.unlinked_recipients > 0 {
                warn!(
                    "{} messages lost their unknown recipient",
                    report.unlinked_recipients
                );
            }
        }
        Err(e) => {
            error!("Restore failed: {}", e);
            std::process::exit(1);
        }
    }
}
