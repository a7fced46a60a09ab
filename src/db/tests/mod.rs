//! Store and service tests against real SQLite databases

mod sync;

use tempfile::tempdir;

use super::{Database, DocumentRow, SchemaCreateResult};

pub(crate) fn test_db() -> Database {
    Database::open_in_memory().expect("in-memory store")
}

pub(crate) fn doc(id: &str, doc_type: &str, title: &str, content: &str) -> DocumentRow {
    DocumentRow {
        id: id.to_string(),
        doc_type: doc_type.to_string(),
        title: title.to_string(),
        content: content.to_string(),
        tags: Vec::new(),
        author: None,
        created_at: 1_700_000_000_000,
        updated_at: 1_700_000_000_000,
    }
}

#[test]
fn test_open_creates_schema_on_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.db");

    let (db, result) = Database::open(&path, 1000).unwrap();
    assert_eq!(result, SchemaCreateResult::Ok);
    assert_eq!(db.reference_count().unwrap(), 0);
    assert_eq!(db.tag_count().unwrap(), 0);
    assert_eq!(db.document_count().unwrap(), 0);
    assert_eq!(
        db.schema_version().unwrap(),
        i64::from(super::CURRENT_SCHEMA_VERSION)
    );
}

#[test]
fn test_reopen_preserves_data() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.db");

    {
        let (db, _) = Database::open(&path, 1000).unwrap();
        db.rebuild_documents(&[doc("d1", "note", "Title", "body")])
            .unwrap();
    }

    let (db, result) = Database::open(&path, 1000).unwrap();
    assert_eq!(result, SchemaCreateResult::Ok);
    assert_eq!(db.document_count().unwrap(), 1);
    assert_eq!(db.get_document("d1").unwrap().unwrap().title, "Title");
}
