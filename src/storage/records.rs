//! Relational store for document and report records.

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::documents::{DocumentRecord, DocumentStatus, ReportRecord};

/// Errors returned by the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying sqlite operation failed.
    #[error("database failure: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A persisted value could not be interpreted.
    #[error("corrupt record: {0}")]
    CorruptRecord(String),
}

/// Sqlite-backed store owning the `document` and `report` tables.
///
/// Mutations used by the lifecycle saga are single transactions; status
/// changes are compare-and-set so concurrent transitions cannot interleave.
/// Clones share one connection.
#[derive(Clone)]
pub struct RecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl RecordStore {
    /// Create or open the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Create an in-memory database, used by tests and local experiments.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA foreign_keys=ON;

            CREATE TABLE IF NOT EXISTS document (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                status TEXT NOT NULL,
                storage_key TEXT NOT NULL UNIQUE,
                content_type TEXT NOT NULL,
                report_id INTEGER REFERENCES report(id)
            );

            CREATE TABLE IF NOT EXISTS report (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id INTEGER NOT NULL UNIQUE REFERENCES document(id),
                storage_key TEXT NOT NULL UNIQUE
            );

            CREATE INDEX IF NOT EXISTS idx_document_owner ON document(owner_id);
            "#,
        )?;
        Ok(())
    }

    /// Insert a freshly uploaded document in `Uploaded` state.
    pub fn insert_document(
        &self,
        owner_id: i64,
        name: &str,
        storage_key: &str,
        content_type: &str,
    ) -> Result<DocumentRecord, StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO document (owner_id, name, status, storage_key, content_type, report_id)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL)",
            params![
                owner_id,
                name,
                DocumentStatus::Uploaded.as_str(),
                storage_key,
                content_type
            ],
        )?;
        let id = conn.last_insert_rowid();
        Ok(DocumentRecord {
            id,
            owner_id,
            name: name.to_string(),
            status: DocumentStatus::Uploaded,
            storage_key: storage_key.to_string(),
            content_type: content_type.to_string(),
            report_id: None,
        })
    }

    /// Fetch one document by identifier.
    pub fn fetch_document(&self, id: i64) -> Result<Option<DocumentRecord>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, owner_id, name, status, storage_key, content_type, report_id
                 FROM document WHERE id = ?1",
                params![id],
                raw_document,
            )
            .optional()?;
        row.map(RawDocument::into_record).transpose()
    }

    /// Compare-and-set status transition.
    ///
    /// Returns `false` when the row was not in `from` anymore, in which case
    /// nothing was written and the caller lost the race.
    pub fn transition_status(
        &self,
        id: i64,
        from: DocumentStatus,
        to: DocumentStatus,
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE document SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![to.as_str(), id, from.as_str()],
        )?;
        Ok(changed == 1)
    }

    /// Create the report record and link it to its document as one unit.
    ///
    /// Called only after the artifact bytes are safely in the blob store.
    pub fn create_report(
        &self,
        document_id: i64,
        storage_key: &str,
    ) -> Result<ReportRecord, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO report (document_id, storage_key) VALUES (?1, ?2)",
            params![document_id, storage_key],
        )?;
        let report_id = tx.last_insert_rowid();
        tx.execute(
            "UPDATE document SET report_id = ?1 WHERE id = ?2",
            params![report_id, document_id],
        )?;
        tx.commit()?;
        Ok(ReportRecord {
            id: report_id,
            document_id,
            storage_key: storage_key.to_string(),
        })
    }

    /// Fetch one report by identifier.
    pub fn fetch_report(&self, id: i64) -> Result<Option<ReportRecord>, StoreError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, document_id, storage_key FROM report WHERE id = ?1",
            params![id],
            |row| {
                Ok(ReportRecord {
                    id: row.get(0)?,
                    document_id: row.get(1)?,
                    storage_key: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(StoreError::from)
    }

    /// Unlink and remove a document's report as one unit.
    pub fn clear_report(&self, document_id: i64) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE document SET report_id = NULL WHERE id = ?1",
            params![document_id],
        )?;
        tx.execute(
            "DELETE FROM report WHERE document_id = ?1",
            params![document_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Remove a document row.
    pub fn delete_document(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM document WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Page through one owner's documents, oldest first.
    ///
    /// Returns the owner's total document count alongside the requested page.
    pub fn list_documents(
        &self,
        owner_id: i64,
        page: usize,
        page_size: usize,
    ) -> Result<(usize, Vec<DocumentRecord>), StoreError> {
        let conn = self.conn.lock();
        let total: usize = conn.query_row(
            "SELECT COUNT(*) FROM document WHERE owner_id = ?1",
            params![owner_id],
            |row| row.get::<_, i64>(0),
        )? as usize;

        let offset = page.saturating_sub(1) * page_size;
        let mut statement = conn.prepare(
            "SELECT id, owner_id, name, status, storage_key, content_type, report_id
             FROM document WHERE owner_id = ?1 ORDER BY id LIMIT ?2 OFFSET ?3",
        )?;
        let rows = statement.query_map(
            params![owner_id, page_size as i64, offset as i64],
            raw_document,
        )?;

        let mut documents = Vec::new();
        for row in rows {
            documents.push(row?.into_record()?);
        }
        Ok((total, documents))
    }
}

struct RawDocument {
    id: i64,
    owner_id: i64,
    name: String,
    status: String,
    storage_key: String,
    content_type: String,
    report_id: Option<i64>,
}

fn raw_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawDocument> {
    Ok(RawDocument {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        status: row.get(3)?,
        storage_key: row.get(4)?,
        content_type: row.get(5)?,
        report_id: row.get(6)?,
    })
}

impl RawDocument {
    fn into_record(self) -> Result<DocumentRecord, StoreError> {
        let status = DocumentStatus::parse(&self.status).ok_or_else(|| {
            StoreError::CorruptRecord(format!(
                "document {} has unknown status '{}'",
                self.id, self.status
            ))
        })?;
        Ok(DocumentRecord {
            id: self.id,
            owner_id: self.owner_id,
            name: self.name,
            status,
            storage_key: self.storage_key,
            content_type: self.content_type,
            report_id: self.report_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_fetch_round_trip() {
        let store = RecordStore::in_memory().expect("store");
        let inserted = store
            .insert_document(7, "thesis", "key-1", "pdf")
            .expect("insert");
        let fetched = store
            .fetch_document(inserted.id)
            .expect("fetch")
            .expect("present");
        assert_eq!(fetched.owner_id, 7);
        assert_eq!(fetched.name, "thesis");
        assert_eq!(fetched.status, DocumentStatus::Uploaded);
        assert!(fetched.report_id.is_none());
    }

    #[test]
    fn storage_keys_are_unique() {
        let store = RecordStore::in_memory().expect("store");
        store
            .insert_document(7, "a", "dup-key", "pdf")
            .expect("first insert");
        assert!(store.insert_document(7, "b", "dup-key", "pdf").is_err());
    }

    #[test]
    fn transition_is_compare_and_set() {
        let store = RecordStore::in_memory().expect("store");
        let document = store
            .insert_document(7, "a", "key-1", "pdf")
            .expect("insert");

        assert!(
            store
                .transition_status(
                    document.id,
                    DocumentStatus::Uploaded,
                    DocumentStatus::Processing
                )
                .expect("cas")
        );
        // The row is no longer Uploaded, so the same transition loses.
        assert!(
            !store
                .transition_status(
                    document.id,
                    DocumentStatus::Uploaded,
                    DocumentStatus::Processing
                )
                .expect("cas")
        );

        let fetched = store
            .fetch_document(document.id)
            .expect("fetch")
            .expect("present");
        assert_eq!(fetched.status, DocumentStatus::Processing);
    }

    #[test]
    fn create_report_links_document() {
        let store = RecordStore::in_memory().expect("store");
        let document = store
            .insert_document(7, "a", "key-1", "pdf")
            .expect("insert");
        let report = store
            .create_report(document.id, "report-key")
            .expect("create report");

        let fetched = store
            .fetch_document(document.id)
            .expect("fetch")
            .expect("present");
        assert_eq!(fetched.report_id, Some(report.id));
        let stored = store
            .fetch_report(report.id)
            .expect("fetch report")
            .expect("present");
        assert_eq!(stored.document_id, document.id);
    }

    #[test]
    fn clear_report_unlinks_and_deletes() {
        let store = RecordStore::in_memory().expect("store");
        let document = store
            .insert_document(7, "a", "key-1", "pdf")
            .expect("insert");
        let report = store
            .create_report(document.id, "report-key")
            .expect("create report");

        store.clear_report(document.id).expect("clear");
        let fetched = store
            .fetch_document(document.id)
            .expect("fetch")
            .expect("present");
        assert!(fetched.report_id.is_none());
        assert!(store.fetch_report(report.id).expect("fetch").is_none());
    }

    #[test]
    fn listing_pages_and_counts() {
        let store = RecordStore::in_memory().expect("store");
        for index in 0..5 {
            store
                .insert_document(7, &format!("doc-{index}"), &format!("key-{index}"), "pdf")
                .expect("insert");
        }
        store
            .insert_document(8, "other", "key-other", "pdf")
            .expect("insert");

        let (total, page) = store.list_documents(7, 1, 2).expect("list");
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].name, "doc-0");

        let (_, page3) = store.list_documents(7, 3, 2).expect("list");
        assert_eq!(page3.len(), 1);
        assert_eq!(page3[0].name, "doc-4");
    }
}
