//! Generation records: install, enumerate, activate.
//!
//! A generation is written in one transaction together with all of its
//! entries, so a failed install never leaves a partial shell behind.
//! Activation is the only place stale generations are deleted.

use super::connection::CacheDb;
use super::entries::{CachedResponse, insert_entries};
use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// Persistent state of a stored generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationState {
    /// Fully populated, not yet authoritative.
    Installed,
    /// The one generation requests are served from.
    Active,
}

impl GenerationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Installed => "installed",
            Self::Active => "active",
        }
    }

    fn parse(s: &str) -> Result<Self, Error> {
        match s {
            "installed" => Ok(Self::Installed),
            "active" => Ok(Self::Active),
            other => Err(Error::CorruptEntry(format!("unknown generation state: {other}"))),
        }
    }
}

impl fmt::Display for GenerationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored cache generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    pub id: String,
    pub manifest_digest: String,
    pub state: GenerationState,
    pub asset_count: u64,
    pub created_at: String,
    pub activated_at: Option<String>,
}

const GENERATION_COLUMNS: &str = "id, manifest_digest, state, asset_count, created_at, activated_at";

type GenerationRow = (String, String, String, i64, String, Option<String>);

fn read_generation(row: &rusqlite::Row<'_>) -> rusqlite::Result<GenerationRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
}

fn into_generation(raw: GenerationRow) -> Result<Generation, Error> {
    let (id, manifest_digest, state, asset_count, created_at, activated_at) = raw;
    Ok(Generation {
        id,
        manifest_digest,
        state: GenerationState::parse(&state)?,
        asset_count: asset_count as u64,
        created_at,
        activated_at,
    })
}

impl CacheDb {
    /// Store a fully fetched generation and its entries atomically.
    ///
    /// # Errors
    ///
    /// Returns `Error::GenerationExists` if the id is already stored, or a
    /// database error if any entry fails to write. In both cases nothing is
    /// committed.
    pub async fn install_generation(
        &self, id: &str, manifest_digest: &str, entries: Vec<CachedResponse>,
    ) -> Result<Generation, Error> {
        let id = id.to_string();
        let manifest_digest = manifest_digest.to_string();
        self.conn
            .call(move |conn| -> Result<Generation, Error> {
                let tx = conn.transaction()?;

                let exists: bool =
                    tx.query_row("SELECT EXISTS(SELECT 1 FROM generations WHERE id = ?1)", params![id], |row| {
                        row.get(0)
                    })?;
                if exists {
                    return Err(Error::GenerationExists(id));
                }

                let created_at = chrono::Utc::now().to_rfc3339();
                tx.execute(
                    "INSERT INTO generations (id, manifest_digest, state, asset_count, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        id,
                        manifest_digest,
                        GenerationState::Installed.as_str(),
                        entries.len() as i64,
                        created_at
                    ],
                )?;
                insert_entries(&tx, &id, &entries)?;
                tx.commit()?;

                Ok(Generation {
                    id,
                    manifest_digest,
                    state: GenerationState::Installed,
                    asset_count: entries.len() as u64,
                    created_at,
                    activated_at: None,
                })
            })
            .await
            .map_err(Error::from)
    }

    /// Get a generation by id.
    pub async fn get_generation(&self, id: &str) -> Result<Option<Generation>, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<Option<Generation>, Error> {
                let sql = format!("SELECT {GENERATION_COLUMNS} FROM generations WHERE id = ?1");
                match conn.query_row(&sql, params![id], read_generation) {
                    Ok(raw) => Ok(Some(into_generation(raw)?)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// The currently authoritative generation, if any.
    pub async fn active_generation(&self) -> Result<Option<Generation>, Error> {
        self.conn
            .call(|conn| -> Result<Option<Generation>, Error> {
                let sql = format!("SELECT {GENERATION_COLUMNS} FROM generations WHERE state = 'active'");
                match conn.query_row(&sql, [], read_generation) {
                    Ok(raw) => Ok(Some(into_generation(raw)?)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Every stored generation id, oldest first.
    pub async fn generation_ids(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT id FROM generations ORDER BY created_at, id")?;
                let ids = stmt.query_map([], |row| row.get(0))?.collect::<Result<Vec<String>, _>>()?;
                Ok(ids)
            })
            .await
            .map_err(Error::from)
    }

    /// Make `id` the authoritative generation and delete every other one.
    ///
    /// Enumeration, deletion and promotion run in a single transaction, so
    /// readers see either the old layout or the new one. Returns the ids that
    /// were purged.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotInstalled` if `id` is not stored; nothing is deleted.
    pub async fn activate_generation(&self, id: &str) -> Result<Vec<String>, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let tx = conn.transaction()?;

                let exists: bool =
                    tx.query_row("SELECT EXISTS(SELECT 1 FROM generations WHERE id = ?1)", params![id], |row| {
                        row.get(0)
                    })?;
                if !exists {
                    return Err(Error::NotInstalled(id));
                }

                let stale = {
                    let mut stmt = tx.prepare("SELECT id FROM generations WHERE id != ?1 ORDER BY created_at, id")?;
                    stmt.query_map(params![id], |row| row.get(0))?.collect::<Result<Vec<String>, _>>()?
                };

                tx.execute("DELETE FROM entries WHERE generation_id != ?1", params![id])?;
                tx.execute("DELETE FROM generations WHERE id != ?1", params![id])?;
                tx.execute(
                    "UPDATE generations SET state = 'active', activated_at = COALESCE(activated_at, ?2) WHERE id = ?1",
                    params![id, chrono::Utc::now().to_rfc3339()],
                )?;
                tx.commit()?;

                Ok(stale)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_entries(paths: &[&str], tag: &str) -> Vec<CachedResponse> {
        paths
            .iter()
            .map(|p| CachedResponse {
                path: p.to_string(),
                status: 200,
                content_type: Some("text/html".into()),
                headers: vec![],
                body: format!("{tag}:{p}").into_bytes(),
                stored_at: chrono::Utc::now().to_rfc3339(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_install_and_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let generation = db
            .install_generation("ems-pwa-cache-v1", "d1", make_entries(&["/", "/index.html"], "v1"))
            .await
            .unwrap();

        assert_eq!(generation.state, GenerationState::Installed);
        assert_eq!(generation.asset_count, 2);

        let stored = db.get_generation("ems-pwa-cache-v1").await.unwrap().unwrap();
        assert_eq!(stored, generation);
        assert!(db.active_generation().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_install_existing_id_rejected() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.install_generation("v1", "d1", make_entries(&["/"], "a")).await.unwrap();

        let result = db.install_generation("v1", "d1", make_entries(&["/"], "b")).await;
        assert!(matches!(result, Err(Error::GenerationExists(id)) if id == "v1"));

        let body = db.match_entry("v1", "/").await.unwrap().unwrap().body;
        assert_eq!(body, b"a:/".to_vec());
    }

    #[tokio::test]
    async fn test_install_duplicate_paths_commits_nothing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let result = db.install_generation("v1", "d1", make_entries(&["/app.js", "/app.js"], "v1")).await;

        assert!(matches!(result, Err(Error::Database(_))));
        assert!(db.get_generation("v1").await.unwrap().is_none());
        assert_eq!(db.total_entries().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_activate_purges_other_generations() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.install_generation("v1", "d1", make_entries(&["/", "/style.css"], "v1")).await.unwrap();
        db.activate_generation("v1").await.unwrap();
        db.install_generation("v2", "d2", make_entries(&["/", "/style.css", "/app.js"], "v2"))
            .await
            .unwrap();

        assert_eq!(db.generation_ids().await.unwrap().len(), 2);

        let purged = db.activate_generation("v2").await.unwrap();
        assert_eq!(purged, vec!["v1".to_string()]);

        assert_eq!(db.generation_ids().await.unwrap(), vec!["v2".to_string()]);
        assert!(db.match_entry("v1", "/style.css").await.unwrap().is_none());
        assert_eq!(db.total_entries().await.unwrap(), 3);

        let active = db.active_generation().await.unwrap().unwrap();
        assert_eq!(active.id, "v2");
        assert_eq!(active.state, GenerationState::Active);
        assert!(active.activated_at.is_some());
    }

    #[tokio::test]
    async fn test_activate_unknown_generation_keeps_store() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.install_generation("v1", "d1", make_entries(&["/"], "v1")).await.unwrap();
        db.activate_generation("v1").await.unwrap();

        let result = db.activate_generation("v9").await;
        assert!(matches!(result, Err(Error::NotInstalled(id)) if id == "v9"));
        assert_eq!(db.active_generation().await.unwrap().unwrap().id, "v1");
        assert_eq!(db.total_entries().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reactivate_is_idempotent() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.install_generation("v1", "d1", make_entries(&["/"], "v1")).await.unwrap();
        db.activate_generation("v1").await.unwrap();
        let first = db.active_generation().await.unwrap().unwrap();

        let purged = db.activate_generation("v1").await.unwrap();
        assert!(purged.is_empty());
        assert_eq!(db.active_generation().await.unwrap().unwrap(), first);
    }
}
