//! Captured responses stored under a generation.
//!
//! Entries are only ever inserted (as part of an install) and read. There is
//! no update path: a changed resource needs a new generation.

use super::connection::CacheDb;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A response captured at install time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// Origin-relative request key (path plus query).
    pub path: String,
    pub status: u16,
    pub content_type: Option<String>,
    /// Header name/value pairs in the order the origin sent them.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub stored_at: String,
}

impl CacheDb {
    /// Look up the entry for `path` in a generation.
    ///
    /// Returns None on a miss.
    pub async fn match_entry(&self, generation_id: &str, path: &str) -> Result<Option<CachedResponse>, Error> {
        let generation_id = generation_id.to_string();
        let path = path.to_string();
        self.conn
            .call(move |conn| -> Result<Option<CachedResponse>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT path, status, content_type, headers_json, body, stored_at
                     FROM entries WHERE generation_id = ?1 AND path = ?2",
                )?;

                let row = stmt.query_row(params![generation_id, path], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Vec<u8>>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                });

                match row {
                    Ok((path, status, content_type, headers_json, body, stored_at)) => {
                        let status = u16::try_from(status)
                            .map_err(|_| Error::CorruptEntry(format!("{path}: status {status} out of range")))?;
                        let headers = serde_json::from_str(&headers_json)?;
                        Ok(Some(CachedResponse { path, status, content_type, headers, body, stored_at }))
                    }
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Paths stored under a generation, in asset-set order.
    pub async fn entry_paths(&self, generation_id: &str) -> Result<Vec<String>, Error> {
        let generation_id = generation_id.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT path FROM entries WHERE generation_id = ?1 ORDER BY position")?;
                let paths = stmt
                    .query_map(params![generation_id], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(paths)
            })
            .await
            .map_err(Error::from)
    }

    /// Total number of stored entries across every generation.
    pub async fn total_entries(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

/// Insert entries for a generation inside an open transaction.
///
/// Plain INSERT: hitting an existing (generation, path) pair is an error.
pub(crate) fn insert_entries(
    tx: &rusqlite::Transaction<'_>, generation_id: &str, entries: &[CachedResponse],
) -> Result<(), Error> {
    let mut stmt = tx.prepare(
        "INSERT INTO entries (generation_id, path, position, status, content_type, headers_json, body, stored_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;

    for (position, entry) in entries.iter().enumerate() {
        let headers_json = serde_json::to_string(&entry.headers)?;
        stmt.execute(params![
            generation_id,
            &entry.path,
            position as i64,
            entry.status as i64,
            &entry.content_type,
            headers_json,
            &entry.body,
            &entry.stored_at,
        ])?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_entry(path: &str, body: &str) -> CachedResponse {
        CachedResponse {
            path: path.to_string(),
            status: 200,
            content_type: Some("text/css".to_string()),
            headers: vec![("content-type".into(), "text/css".into()), ("etag".into(), "\"abc\"".into())],
            body: body.as_bytes().to_vec(),
            stored_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    #[tokio::test]
    async fn test_match_entry_returns_stored_bytes() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let entry = make_entry("/style.css", "body { color: red }");
        db.install_generation("v1", "digest", vec![entry.clone()]).await.unwrap();

        let found = db.match_entry("v1", "/style.css").await.unwrap().unwrap();
        assert_eq!(found, entry);
    }

    #[tokio::test]
    async fn test_match_entry_miss() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.install_generation("v1", "digest", vec![make_entry("/style.css", "x")])
            .await
            .unwrap();

        assert!(db.match_entry("v1", "/app.js").await.unwrap().is_none());
        assert!(db.match_entry("v2", "/style.css").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_entry_paths_keep_manifest_order() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let entries = vec![make_entry("/", "a"), make_entry("/index.html", "b"), make_entry("/style.css", "c")];
        db.install_generation("v1", "digest", entries).await.unwrap();

        let paths = db.entry_paths("v1").await.unwrap();
        assert_eq!(paths, vec!["/", "/index.html", "/style.css"]);
        assert_eq!(db.total_entries().await.unwrap(), 3);
    }
}
