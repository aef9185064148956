//! services/api/src/restore/content.rs
//!
//! Maps page text files back to their book. Content files are named
//! `<book name>_page_<n>.txt`, where the book name is percent-encoded with
//! `_` standing in for `%`.

use percent_encoding::percent_decode_str;
use scriptorium_core::slug::page_image_path;
use serde::Deserialize;
use tracing::debug;

use super::extjson::parse_int_prefix;
use super::identity::{BookRef, IdentityMap};
use super::merge::PageMerger;
use super::DumpEntry;

/// Prefix of dump paths holding page text.
pub const CONTENT_PREFIX: &str = "data/content/";

const PAGE_MARKER: &str = "_page_";

#[derive(Debug, Default, Deserialize)]
struct RawContent {
    content: Option<String>,
}

/// Reverses the `_` → `%` escaping and percent-decodes the result.
/// Returns `None` for malformed escapes or bytes that are not UTF-8.
pub fn decode_file_name(encoded: &str) -> Option<String> {
    let escaped = encoded.replace('_', "%");
    if !escapes_are_well_formed(&escaped) {
        return None;
    }
    percent_decode_str(&escaped)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}

fn escapes_are_well_formed(escaped: &str) -> bool {
    let bytes = escaped.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    true
}

/// Splits a content file stem into the decoded book name and page number.
///
/// The whole stem is decoded first; when that fails the stem is split at the
/// last `_page_` marker and only the book part is decoded, keeping it raw if
/// it does not decode either.
pub fn split_content_name(stem: &str) -> Option<(String, i32)> {
    let (book_part, number_part) = match decode_file_name(stem) {
        Some(decoded) => {
            let (book, number) = decoded.rsplit_once(PAGE_MARKER)?;
            (book.to_string(), number.to_string())
        }
        None => {
            let (book, number) = stem.rsplit_once(PAGE_MARKER)?;
            let book = decode_file_name(book).unwrap_or_else(|| book.to_string());
            (book, number.to_string())
        }
    };
    let number = i32::try_from(parse_int_prefix(&number_part)?).ok()?;
    Some((book_part.trim().to_string(), number))
}

/// Finds the book a decoded name refers to: exact name first, then the
/// variant with underscores turned into spaces.
pub fn resolve_book<'a>(books: &'a IdentityMap, name: &str) -> Option<&'a BookRef> {
    books
        .book(name)
        .or_else(|| books.book(&name.replace('_', " ")))
}

/// Attaches every resolvable content file to its merged page. Returns the
/// number of files that could not be associated with a book.
pub fn attach_contents(entries: &[DumpEntry], books: &IdentityMap, merger: &mut PageMerger) -> usize {
    let mut dropped = 0;
    for entry in entries.iter().filter(|e| e.path.starts_with(CONTENT_PREFIX)) {
        let file = entry.path.rsplit('/').next().unwrap_or(&entry.path);
        let stem = file.strip_suffix(".txt").unwrap_or(file);

        let resolved = split_content_name(stem)
            .and_then(|(name, number)| resolve_book(books, &name).map(|book| (book, number)));
        let Some((book, number)) = resolved else {
            debug!("No book found for content file {}", entry.path);
            dropped += 1;
            continue;
        };

        let raw: RawContent = serde_json::from_value(entry.data.clone()).unwrap_or_default();
        merger.attach_content(
            (book.id, number),
            page_image_path(&book.slug, number),
            raw.content.unwrap_or_default(),
        );
    }
    dropped
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn library(names: &[&str]) -> IdentityMap {
        let mut map = IdentityMap::default();
        for name in names {
            map.map_book(*name, BookRef { id: Uuid::new_v4(), slug: format!("slug-{}", name.len()) });
        }
        map
    }

    #[test]
    fn decodes_underscore_escapes() {
        assert_eq!(decode_file_name("_D7_A1_D7_A4_D7_A8").as_deref(), Some("ספר"));
        assert_eq!(decode_file_name("plain"), Some("plain".to_string()));
        assert_eq!(decode_file_name("bad_zz"), None);
        assert_eq!(decode_file_name("_FF"), None);
    }

    #[test]
    fn splits_plain_unicode_names() {
        assert_eq!(split_content_name("ספר_page_5"), Some(("ספר".to_string(), 5)));
    }

    #[test]
    fn splits_encoded_names() {
        assert_eq!(
            split_content_name("_D7_A1_D7_A4_D7_A8_page_12"),
            Some(("ספר".to_string(), 12))
        );
    }

    #[test]
    fn splits_at_the_last_marker() {
        assert_eq!(
            split_content_name("my_page_book_page_2"),
            Some(("my_page_book".to_string(), 2))
        );
    }

    #[test]
    fn names_without_marker_or_number_are_rejected() {
        assert_eq!(split_content_name("no-marker"), None);
        assert_eq!(split_content_name("book_page_x"), None);
        assert_eq!(split_content_name("book_page_4294967297"), None);
    }

    #[test]
    fn resolves_through_space_variant() {
        let books = library(&["Old Book"]);
        assert!(resolve_book(&books, "Old_Book").is_some());
        assert!(resolve_book(&books, "Other").is_none());
    }

    #[test]
    fn attaches_known_content_and_drops_unknown() {
        let books = library(&["ספר"]);
        let book_id = books.book("ספר").unwrap().id;
        let entries = vec![
            DumpEntry {
                path: "data/content/ספר_page_5.txt".to_string(),
                data: json!({"content": "שלום"}),
            },
            DumpEntry {
                path: "data/content/unknown_page_1.txt".to_string(),
                data: json!({"content": "lost"}),
            },
        ];

        let mut merger = PageMerger::default();
        let dropped = attach_contents(&entries, &books, &mut merger);

        assert_eq!(dropped, 1);
        let drafts = merger.into_drafts();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[&(book_id, 5)].content.as_deref(), Some("שלום"));
    }
}
