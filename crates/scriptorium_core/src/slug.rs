//! crates/scriptorium_core/src/slug.rs
//!
//! URL-safe identifiers derived from book names, and the on-disk naming
//! convention for rasterized page images.

use chrono::{DateTime, Utc};

/// Characters removed before transliteration.
const STRIPPED: &[char] = &['*', '+', '~', '.', '(', ')', '\'', '"', '!', ':', '@'];

/// Used when a name has no character that survives normalization.
const EMPTY_SLUG: &str = "untitled";

/// Derives a deterministic slug: punctuation stripped, transliterated to
/// ASCII, lowercased, separators collapsed to single dashes.
pub fn slugify(name: &str) -> String {
    let stripped: String = name.chars().filter(|c| !STRIPPED.contains(c)).collect();
    let ascii = deunicode::deunicode(&stripped);

    let mut slug = String::with_capacity(ascii.len());
    let mut pending_dash = false;
    for c in ascii.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        EMPTY_SLUG.to_string()
    } else {
        slug
    }
}

/// Slug used for a freshly uploaded book, made unique with the upload time.
pub fn upload_slug(name: &str, now: DateTime<Utc>) -> String {
    format!("{}-{}", slugify(name), now.timestamp_millis())
}

/// Web path of the folder holding a book's page images.
pub fn book_folder_path(slug: &str) -> String {
    format!("/uploads/books/{}", slug)
}

/// Web path of a single page image (`page.<n>.jpg`).
pub fn page_image_path(slug: &str, page_number: i32) -> String {
    format!("{}/page.{}.jpg", book_folder_path(slug), page_number)
}
