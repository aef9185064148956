//! services/api/src/export.rs
//!
//! Writes every transcribed page into a single plain-text file, ordered by
//! book and page number.

use futures::TryStreamExt;
use scriptorium_core::domain::ExportedPage;
use scriptorium_core::ports::LibraryStore;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::info;

use crate::error::ApiError;

const RULE_WIDTH: usize = 50;
const RIGHT_COLUMN_DEFAULT: &str = "טור ימין";
const LEFT_COLUMN_DEFAULT: &str = "טור שמאל";

/// Renders one page block: header, text, and the gap before the next page.
pub fn render_page(page: &ExportedPage) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = format!(
        "{rule}\n📚 ספר: {} | עמוד: {}\n{rule}\n\n",
        page.book_name, page.page_number
    );

    let text = &page.text;
    if text.is_two_columns {
        let right_name = text.right_column_name.as_deref().unwrap_or(RIGHT_COLUMN_DEFAULT);
        let left_name = text.left_column_name.as_deref().unwrap_or(LEFT_COLUMN_DEFAULT);
        if !text.right_column.is_empty() {
            out.push_str(&format!("[--- {} ---]\n{}\n\n", right_name, text.right_column));
        }
        if !text.left_column.is_empty() {
            out.push_str(&format!("[--- {} ---]\n{}\n\n", left_name, text.left_column));
        }
    } else if !text.content.is_empty() {
        out.push_str(&text.content);
        out.push_str("\n\n");
    }

    out.push_str("\n\n");
    out
}

/// Streams all pages with text into `exported_content_<millis>.txt` under
/// `dir` and returns the path written with the number of pages.
pub async fn export_content(store: &dyn LibraryStore, dir: &Path) -> Result<(PathBuf, usize), ApiError> {
    let path = dir.join(format!(
        "exported_content_{}.txt",
        chrono::Utc::now().timestamp_millis()
    ));
    info!("Writing export to {}...", path.display());

    let file = tokio::fs::File::create(&path).await?;
    let mut writer = BufWriter::new(file);
    let mut pages = store.pages_with_text();
    let mut written = 0;
    while let Some(page) = pages.try_next().await? {
        writer.write_all(render_page(&page).as_bytes()).await?;
        written += 1;
    }
    writer.flush().await?;

    Ok((path, written))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptorium_core::domain::PageText;

    #[test]
    fn renders_single_column_pages() {
        let page = ExportedPage {
            book_name: "ספר".to_string(),
            page_number: 4,
            text: PageText {
                content: "line".to_string(),
                ..Default::default()
            },
        };
        let rule = "=".repeat(50);
        assert_eq!(
            render_page(&page),
            format!("{rule}\n📚 ספר: ספר | עמוד: 4\n{rule}\n\nline\n\n\n\n")
        );
    }

    #[test]
    fn renders_two_columns_with_default_names() {
        let page = ExportedPage {
            book_name: "Book".to_string(),
            page_number: 1,
            text: PageText {
                is_two_columns: true,
                right_column: "right text".to_string(),
                left_column: String::new(),
                left_column_name: Some("unused".to_string()),
                ..Default::default()
            },
        };
        let rendered = render_page(&page);
        assert!(rendered.contains("[--- טור ימין ---]\nright text\n\n"));
        assert!(!rendered.contains("unused"));
    }
}
