//! Document repository — the index writer's view of `scanned_documents`.
//!
//! Records are created exactly once per indexed document and never updated
//! or deleted by the pipeline.

use rusqlite::{params, Row};
use serde::Serialize;

use super::error::classify_sqlite_error;
use super::{Database, DatabaseError};

/// A persisted row for an indexed document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannedDocument {
    pub id: i64,
    pub client_name: String,
    pub account_number: String,
    pub filename: String,
    pub filepath: String,
    pub indexed_at: String,
}

impl ScannedDocument {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            client_name: row.get("client_name")?,
            account_number: row.get("account_number")?,
            filename: row.get("filename")?,
            filepath: row.get("filepath")?,
            indexed_at: row.get("indexed_at")?,
        })
    }
}

/// Inserts a record for an indexed document and returns its id.
///
/// Idempotence guard: an existing record with the same `filepath`
/// short-circuits to that record's id without inserting, so reprocessing
/// an already-indexed file never duplicates its record. A UNIQUE collision
/// on `filename` maps to [`DatabaseError::Duplicate`].
pub fn insert_document(
    db: &Database,
    client_name: &str,
    account_number: &str,
    filename: &str,
    filepath: &str,
) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        if let Some(existing) = find_id_by_filepath(conn, filepath)? {
            log::debug!("Record for '{}' already indexed (id {})", filename, existing);
            return Ok(existing);
        }

        conn.execute(
            "INSERT INTO scanned_documents (client_name, account_number, filename, filepath, indexed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                client_name,
                account_number,
                filename,
                filepath,
                chrono::Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| classify_sqlite_error(e, filename))?;

        Ok(conn.last_insert_rowid())
    })
}

fn find_id_by_filepath(
    conn: &rusqlite::Connection,
    filepath: &str,
) -> Result<Option<i64>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT id FROM scanned_documents WHERE filepath = ?1")?;
    let mut rows = stmt.query_map(params![filepath], |r| r.get(0))?;
    match rows.next() {
        Some(Ok(id)) => Ok(Some(id)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

/// Finds a record by its unique filename.
pub fn find_by_filename(
    db: &Database,
    filename: &str,
) -> Result<Option<ScannedDocument>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM scanned_documents WHERE filename = ?1")?;
        let mut rows = stmt.query_map(params![filename], ScannedDocument::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Case-insensitive substring search over client name or account number,
/// most recently indexed first. The term is matched literally: `%` and `_`
/// are ordinary characters, not LIKE wildcards.
pub fn search(db: &Database, term: &str) -> Result<Vec<ScannedDocument>, DatabaseError> {
    let term = escape_like(term);
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM scanned_documents
             WHERE client_name LIKE '%' || ?1 || '%' ESCAPE '\\'
                OR account_number LIKE '%' || ?1 || '%' ESCAPE '\\'
             ORDER BY indexed_at DESC, id DESC",
        )?;
        let rows: Vec<ScannedDocument> = stmt
            .query_map(params![term], ScannedDocument::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Prefixes LIKE metacharacters in a search term so SQLite matches them
/// as literal text under `ESCAPE '\'`.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Total number of indexed records.
pub fn count_documents(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM scanned_documents", [], |r| {
            r.get(0)
        })?;
        Ok(count)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        let id = insert_document(&db, "Jane Doe", "00012345", "scan1.pdf", "/out/scan1.pdf")
            .unwrap();
        assert!(id > 0);

        let found = find_by_filename(&db, "scan1.pdf").unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.client_name, "Jane Doe");
        assert_eq!(found.account_number, "00012345");
        assert_eq!(found.filepath, "/out/scan1.pdf");
        assert!(!found.indexed_at.is_empty());
    }

    #[test]
    fn test_find_nonexistent() {
        let db = test_db();
        assert!(find_by_filename(&db, "missing.pdf").unwrap().is_none());
    }

    #[test]
    fn test_insert_same_filepath_is_idempotent() {
        let db = test_db();
        let first = insert_document(&db, "Jane Doe", "00012345", "scan1.pdf", "/out/scan1.pdf")
            .unwrap();
        let second = insert_document(&db, "Jane Doe", "00012345", "scan1.pdf", "/out/scan1.pdf")
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(count_documents(&db).unwrap(), 1);
    }

    #[test]
    fn test_duplicate_filename_is_rejected() {
        let db = test_db();
        insert_document(&db, "A", "11111", "same.pdf", "/out/same.pdf").unwrap();
        let result = insert_document(&db, "B", "22222", "same.pdf", "/elsewhere/same.pdf");

        match result {
            Err(DatabaseError::Duplicate(name)) => assert_eq!(name, "same.pdf"),
            other => panic!("expected Duplicate, got {other:?}"),
        }
        assert_eq!(count_documents(&db).unwrap(), 1);
    }

    #[test]
    fn test_empty_client_name_is_stored() {
        // Partially indexed documents persist missing fields as "".
        let db = test_db();
        insert_document(&db, "", "00012345", "partial.pdf", "/out/partial.pdf").unwrap();

        let found = find_by_filename(&db, "partial.pdf").unwrap().unwrap();
        assert_eq!(found.client_name, "");
        assert_eq!(found.account_number, "00012345");
    }

    #[test]
    fn test_search_by_name_and_account() {
        let db = test_db();
        insert_document(&db, "Jane Doe", "00012345", "a.pdf", "/out/a.pdf").unwrap();
        insert_document(&db, "John Smith", "99988877", "b.pdf", "/out/b.pdf").unwrap();
        insert_document(&db, "Erika Mustermann", "00054321", "c.pdf", "/out/c.pdf").unwrap();

        let by_name = search(&db, "jane").unwrap();
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].filename, "a.pdf");

        let by_account = search(&db, "000").unwrap();
        assert_eq!(by_account.len(), 2);

        let nothing = search(&db, "zzz").unwrap();
        assert!(nothing.is_empty());
    }

    #[test]
    fn test_search_matches_each_record_once() {
        // A record matching on both columns still appears once.
        let db = test_db();
        insert_document(&db, "Agent 12345", "12345678", "dual.pdf", "/out/dual.pdf").unwrap();

        let results = search(&db, "12345").unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_search_wildcards_match_literally() {
        let db = test_db();
        insert_document(&db, "Jane Doe", "00012345", "a.pdf", "/out/a.pdf").unwrap();
        insert_document(&db, "100% Cotton", "99988877", "b.pdf", "/out/b.pdf").unwrap();
        insert_document(&db, "Smith_Jones", "55544333", "c.pdf", "/out/c.pdf").unwrap();

        // '%' finds only the record containing a literal percent sign.
        let percent = search(&db, "%").unwrap();
        assert_eq!(percent.len(), 1);
        assert_eq!(percent[0].filename, "b.pdf");

        // '_' is not a match-any-single-character wildcard.
        let underscore = search(&db, "h_J").unwrap();
        assert_eq!(underscore.len(), 1);
        assert_eq!(underscore[0].filename, "c.pdf");

        // "1_3" must not match "123" inside the first account number.
        assert!(search(&db, "1_3").unwrap().is_empty());
    }

    #[test]
    fn test_search_escape_character_matches_itself() {
        let db = test_db();
        insert_document(&db, r"ACME\Nord", "11122333", "d.pdf", "/out/d.pdf").unwrap();

        let results = search(&db, r"E\N").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].filename, "d.pdf");
    }

    #[test]
    fn test_search_newest_first() {
        let db = test_db();
        for i in 0..3 {
            db.with_conn(|conn| {
                conn.execute(
                    "INSERT INTO scanned_documents
                     (client_name, account_number, filename, filepath, indexed_at)
                     VALUES ('Jane', '11111', ?1, ?2, ?3)",
                    params![
                        format!("doc{i}.pdf"),
                        format!("/out/doc{i}.pdf"),
                        format!("2026-08-{:02}T00:00:00Z", i + 1),
                    ],
                )?;
                Ok(())
            })
            .unwrap();
        }

        let results = search(&db, "Jane").unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].filename, "doc2.pdf");
        assert_eq!(results[2].filename, "doc0.pdf");
    }

    #[test]
    fn test_count_documents() {
        let db = test_db();
        assert_eq!(count_documents(&db).unwrap(), 0);
        insert_document(&db, "A", "11111", "a.pdf", "/out/a.pdf").unwrap();
        insert_document(&db, "B", "22222", "b.pdf", "/out/b.pdf").unwrap();
        assert_eq!(count_documents(&db).unwrap(), 2);
    }
}
