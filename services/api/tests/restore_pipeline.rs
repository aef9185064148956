mod common;

use api_lib::export::export_content;
use api_lib::restore::{run_restore, RestoreSources};
use common::MemoryStore;
use scriptorium_core::domain::{PageStatus, Role};
use scriptorium_core::ports::LibraryStore;
use serde_json::{json, Value};

fn files_dump() -> Vec<Value> {
    vec![
        json!({"path": "data/users.json", "data": [
            {"id": "u1", "name": "Alice", "email": "alice@example.com", "password": "hash-a", "role": "admin", "points": 3},
            {"_id": {"$oid": "u2"}, "name": "Bob", "email": "bob@example.com", "password": "hash-b", "points": {"$numberInt": "1"}},
            {"id": "u3", "name": "No Email"}
        ]}),
        json!({"path": "data/books.json", "data": [
            {"name": "ספר", "totalPages": 3, "category": "תורה"},
            {"name": "Other Book", "totalPages": "2"}
        ]}),
        json!({"path": "data/pages/ספר.json", "data": [
            {"number": 1, "status": "completed", "claimedById": "u2"},
            {"number": 2, "status": "in-progress", "claimedById": "u1"}
        ]}),
        json!({"path": "data/pages/Missing.json", "data": [{"number": 1, "status": "completed"}]}),
        json!({"path": "data/content/ספר_page_1.txt", "data": {"content": "שלום"}}),
        json!({"path": "data/content/_D7_A1_D7_A4_D7_A8_page_3.txt", "data": {"content": "עולם"}}),
        json!({"path": "data/content/Other_Book_page_2.txt", "data": {"content": "second"}}),
        json!({"path": "data/content/Unknown_page_1.txt", "data": {"content": "lost"}}),
    ]
}

fn backups_dump() -> Vec<Value> {
    vec![
        json!({"path": "data/pages/ספר.json", "data": [
            {"number": 1, "claimedAt": "2024-01-02T00:00:00Z"},
            {"number": 2, "status": "completed", "completedAt": {"$date": "2024-01-03T00:00:00Z"}}
        ]}),
        json!({"path": "data/pages/Other Book.json", "data": [
            {"number": 1, "status": "in-progress", "claimedById": "ghost"}
        ]}),
    ]
}

fn messages_dump() -> Vec<Value> {
    vec![
        json!({"senderId": "u2", "message": "hi", "readAt": "2024-01-01T00:00:00Z", "replies": [
            {"senderId": "u1", "message": "hello"},
            {"senderId": "ghost", "message": "?"}
        ]}),
        json!({"senderId": "ghost", "message": "lost"}),
        json!({"senderId": "u1", "recipientId": "ghost", "message": "to nobody"}),
    ]
}

fn sources() -> RestoreSources {
    RestoreSources {
        files: files_dump(),
        backups: backups_dump(),
        messages: messages_dump(),
    }
}

#[tokio::test]
async fn restores_users_books_pages_and_messages() {
    let store = MemoryStore::default();
    let report = run_restore(&store, &sources()).await.unwrap();

    assert_eq!(report.users, 2);
    assert_eq!(report.books, 2);
    assert_eq!(report.pages, 5);
    assert_eq!(report.completed_pages, 2);
    assert_eq!(report.dropped_page_entries, 1);
    assert_eq!(report.dropped_contents, 1);
    assert_eq!(report.fallback_claimants, 1);
    assert_eq!(report.messages, 2);
    assert_eq!(report.dropped_messages, 1);
    assert_eq!(report.dropped_replies, 1);
    assert_eq!(report.unlinked_recipients, 1);

    let users = store.users();
    let alice = users.iter().find(|u| u.email == "alice@example.com").unwrap();
    let bob = users.iter().find(|u| u.email == "bob@example.com").unwrap();
    assert_eq!(alice.role, Role::Admin);
    assert_eq!(bob.role, Role::User);
    assert_eq!(bob.points, 1);

    let book = store.find_book("ספר").await.unwrap();
    assert_eq!(book.total_pages, 3);
    assert_eq!(book.category, "תורה");
    let other = store.find_book("Other Book").await.unwrap();
    assert_eq!(other.category, "כללי");
    assert_eq!(other.total_pages, 2);

    // Both dumps contribute fields to the same page.
    let first = store.get_page(book.id, 1).await.unwrap();
    assert_eq!(first.status, PageStatus::Completed);
    assert_eq!(first.claimed_by, Some(bob.id));
    assert!(first.claimed_at.is_some());
    assert_eq!(first.text.content, "שלום");

    let second = store.get_page(book.id, 2).await.unwrap();
    assert_eq!(second.status, PageStatus::Completed);
    assert_eq!(second.claimed_by, Some(alice.id));
    assert!(second.completed_at.is_some());

    // Content alone creates an available placeholder.
    let third = store.get_page(book.id, 3).await.unwrap();
    assert_eq!(third.status, PageStatus::Available);
    assert_eq!(third.text.content, "עולם");
    assert_eq!(third.image_path, format!("/uploads/books/{}/page.3.jpg", book.slug));

    // Unknown claimants fall back to the first imported user.
    let orphan = store.get_page(other.id, 1).await.unwrap();
    assert_eq!(orphan.claimed_by, Some(alice.id));
    let underscored = store.get_page(other.id, 2).await.unwrap();
    assert_eq!(underscored.text.content, "second");

    let messages = store.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].sender_id, bob.id);
    assert_eq!(messages[0].subject, "ללא נושא");
    assert!(messages[0].is_read);
    assert_eq!(messages[0].replies.len(), 1);
    assert_eq!(messages[0].replies[0].sender_id, alice.id);

    // An unknown recipient is cleared, the message itself survives.
    assert_eq!(messages[1].sender_id, alice.id);
    assert_eq!(messages[1].recipient_id, None);
    assert_eq!(messages[1].content, "to nobody");
}

#[tokio::test]
async fn book_counters_match_completed_pages() {
    let store = MemoryStore::default();
    run_restore(&store, &sources()).await.unwrap();
    assert_counters_match_pages(&store);
}

fn assert_counters_match_pages(store: &MemoryStore) {
    for book in store.books() {
        let completed = store
            .pages()
            .iter()
            .filter(|p| p.book_id == book.id && p.status == PageStatus::Completed)
            .count() as i32;
        assert_eq!(book.completed_pages, completed, "book {}", book.name);
    }
}

#[tokio::test]
async fn counters_survive_a_rerun_without_pages() {
    let store = MemoryStore::default();
    run_restore(&store, &sources()).await.unwrap();

    let identities_only = RestoreSources {
        files: files_dump()
            .into_iter()
            .filter(|record| matches!(record["path"].as_str(), Some("data/users.json" | "data/books.json")))
            .collect(),
        ..Default::default()
    };
    let report = run_restore(&store, &identities_only).await.unwrap();

    assert_eq!(report.books, 2);
    assert_eq!(report.pages, 0);
    assert_eq!(store.pages().len(), 5);
    assert_eq!(store.find_book("ספר").await.unwrap().completed_pages, 2);
    assert_counters_match_pages(&store);
}

#[tokio::test]
async fn reimported_books_take_the_new_category() {
    let store = MemoryStore::default();
    run_restore(&store, &sources()).await.unwrap();
    let before = store.find_book("ספר").await.unwrap();

    let books_only = RestoreSources {
        files: vec![json!({"path": "data/books.json", "data": [
            {"name": "ספר", "totalPages": 3, "category": "נביאים"}
        ]})],
        ..Default::default()
    };
    run_restore(&store, &books_only).await.unwrap();

    let after = store.find_book("ספר").await.unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(after.category, "נביאים");
    assert_eq!(after.completed_pages, 2);
}

#[tokio::test]
async fn inserts_pages_in_bounded_batches() {
    let pages: Vec<Value> = (1..=1001)
        .map(|n| {
            let status = if n % 2 == 0 { "completed" } else { "available" };
            json!({"number": n, "status": status})
        })
        .collect();
    let sources = RestoreSources {
        files: vec![
            json!({"path": "data/books.json", "data": [{"name": "Big", "totalPages": 1001}]}),
            json!({"path": "data/pages/Big.json", "data": pages}),
        ],
        ..Default::default()
    };
    let store = MemoryStore::default();

    let report = run_restore(&store, &sources).await.unwrap();

    assert_eq!(store.insert_batches(), vec![500, 500, 1]);
    assert_eq!(report.pages, 1001);
    assert_eq!(store.pages().len(), 1001);
    assert_eq!(store.find_book("Big").await.unwrap().completed_pages, 500);
}

#[tokio::test]
async fn rerunning_restore_is_idempotent() {
    let store = MemoryStore::default();
    run_restore(&store, &sources()).await.unwrap();
    let first_ids: Vec<_> = store.users().iter().map(|u| u.id).collect();

    run_restore(&store, &sources()).await.unwrap();

    let second_ids: Vec<_> = store.users().iter().map(|u| u.id).collect();
    assert_eq!(first_ids, second_ids);
    assert_eq!(store.books().len(), 2);
    assert_eq!(store.pages().len(), 5);
    assert_eq!(store.messages().len(), 2);
}

#[tokio::test]
async fn existing_email_keeps_its_id() {
    let store = MemoryStore::default();
    let existing = store
        .create_user("Alice", "alice@example.com", "old-hash")
        .await
        .unwrap();

    run_restore(&store, &sources()).await.unwrap();

    let users = store.users();
    assert_eq!(users.len(), 2);
    let alice = users.iter().find(|u| u.email == "alice@example.com").unwrap();
    assert_eq!(alice.id, existing.id);
    assert_eq!(alice.role, Role::Admin);

    let book = store.find_book("ספר").await.unwrap();
    let page = store.get_page(book.id, 2).await.unwrap();
    assert_eq!(page.claimed_by, Some(existing.id));
}

#[tokio::test]
async fn empty_dumps_leave_existing_pages_alone() {
    let store = MemoryStore::default();
    run_restore(&store, &sources()).await.unwrap();

    let report = run_restore(&store, &RestoreSources::default()).await.unwrap();

    assert_eq!(report.pages, 0);
    assert_eq!(store.pages().len(), 5);
    assert_eq!(store.messages().len(), 2);
}

#[tokio::test]
async fn loads_dumps_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let files: String = files_dump()
        .iter()
        .map(|record| format!("{}\n", record))
        .collect();
    std::fs::write(dir.path().join("files.json"), files).unwrap();
    std::fs::write(
        dir.path().join("backups.json"),
        serde_json::to_string(&backups_dump()).unwrap(),
    )
    .unwrap();

    let sources = RestoreSources::load(dir.path()).await;
    assert_eq!(sources.files.len(), 8);
    assert_eq!(sources.backups.len(), 2);
    assert!(sources.messages.is_empty());

    let store = MemoryStore::default();
    let report = run_restore(&store, &sources).await.unwrap();
    assert_eq!(report.pages, 5);
    assert_eq!(report.messages, 0);
}

#[tokio::test]
async fn exports_restored_text_in_book_order() {
    let store = MemoryStore::default();
    run_restore(&store, &sources()).await.unwrap();
    let dir = tempfile::tempdir().unwrap();

    let (path, pages) = export_content(&store, dir.path()).await.unwrap();

    assert_eq!(pages, 3);
    let text = std::fs::read_to_string(path).unwrap();
    let other = text.find("📚 ספר: Other Book | עמוד: 2").unwrap();
    let first = text.find("📚 ספר: ספר | עמוד: 1").unwrap();
    let third = text.find("📚 ספר: ספר | עמוד: 3").unwrap();
    assert!(other < first && first < third);
    assert!(text.contains("עולם"));
}
