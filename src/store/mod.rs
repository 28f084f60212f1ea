//! Persisted page records with a pending → processed/failed lifecycle.
//!
//! Pages are keyed by URL. The crawler upserts records (which always resets
//! them to pending); only the ingestion pipeline flips them to processed or
//! failed. Records are never deleted.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::Connection;

use crate::types::RagError;

/// Lifecycle state of a crawled page.
///
/// Transitions are monotone: pending → processed or pending → failed. A
/// fresh upsert is the only way back to pending.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    Pending,
    Processed,
    Failed,
}

impl PageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PageStatus::Pending => "pending",
            PageStatus::Processed => "processed",
            PageStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, RagError> {
        match raw {
            "pending" => Ok(PageStatus::Pending),
            "processed" => Ok(PageStatus::Processed),
            "failed" => Ok(PageStatus::Failed),
            other => Err(RagError::Storage(format!("unknown page status '{other}'"))),
        }
    }
}

/// A stored page record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PageRecord {
    pub url: String,
    pub title: String,
    pub content: String,
    pub status: PageStatus,
    pub scraped_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// SQLite-backed page store.
#[derive(Clone)]
pub struct SqlitePageStore {
    conn: Connection,
}

impl SqlitePageStore {
    /// Opens (creating if needed) the page database at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, RagError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let conn = Connection::open(path).await.map_err(storage_err)?;
        conn.call(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS pages (
                     url          TEXT PRIMARY KEY,
                     title        TEXT NOT NULL,
                     content      TEXT NOT NULL,
                     status       TEXT NOT NULL DEFAULT 'pending',
                     scraped_at   TEXT NOT NULL,
                     processed_at TEXT
                 );
                 CREATE INDEX IF NOT EXISTS idx_pages_status ON pages(status);",
            )
            .map_err(tokio_rusqlite::Error::Rusqlite)?;
            Ok(())
        })
        .await
        .map_err(storage_err)?;
        Ok(Self { conn })
    }

    /// Inserts or refreshes a page record, resetting it to pending and
    /// clearing its processed timestamp. Returns `true` when the URL was
    /// new.
    pub async fn upsert(&self, url: &str, title: &str, content: &str) -> Result<bool, RagError> {
        let url = url.to_string();
        let title = title.to_string();
        let content = content.to_string();
        let scraped_at = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| {
                let existed = conn
                    .query_row(
                        "SELECT EXISTS(SELECT 1 FROM pages WHERE url = ?1)",
                        [&url],
                        |row| row.get::<_, i64>(0),
                    )
                    .map(|flag| flag != 0)
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                conn.execute(
                    "INSERT INTO pages (url, title, content, status, scraped_at, processed_at)
                     VALUES (?1, ?2, ?3, 'pending', ?4, NULL)
                     ON CONFLICT(url) DO UPDATE SET
                         title = excluded.title,
                         content = excluded.content,
                         status = 'pending',
                         scraped_at = excluded.scraped_at,
                         processed_at = NULL",
                    (&url, &title, &content, &scraped_at),
                )
                .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(!existed)
            })
            .await
            .map_err(storage_err)
    }

    /// Every URL ever stored, used to seed the crawler's visited set.
    pub async fn all_urls(&self) -> Result<HashSet<String>, RagError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn
                    .prepare("SELECT url FROM pages")
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let rows = stmt
                    .query_map([], |row| row.get::<_, String>(0))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let mut urls = HashSet::new();
                for row in rows {
                    urls.insert(row.map_err(tokio_rusqlite::Error::Rusqlite)?);
                }
                Ok(urls)
            })
            .await
            .map_err(storage_err)
    }

    /// All pending pages, in stable URL order — the ingestion batch.
    pub async fn pending(&self) -> Result<Vec<PageRecord>, RagError> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT url, title, content, status, scraped_at, processed_at
                         FROM pages WHERE status = 'pending' ORDER BY url",
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let mapped = stmt
                    .query_map([], |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                        ))
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let mut raw = Vec::new();
                for row in mapped {
                    raw.push(row.map_err(tokio_rusqlite::Error::Rusqlite)?);
                }
                Ok(raw)
            })
            .await
            .map_err(storage_err)?;
        rows.into_iter().map(raw_to_record).collect()
    }

    /// Fetches a single record by URL.
    pub async fn get(&self, url: &str) -> Result<Option<PageRecord>, RagError> {
        let url = url.to_string();
        let row = self
            .conn
            .call(move |conn| {
                use tokio_rusqlite::OptionalExtension;
                conn.query_row(
                    "SELECT url, title, content, status, scraped_at, processed_at
                     FROM pages WHERE url = ?1",
                    [&url],
                    |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                        ))
                    },
                )
                .optional()
                .map_err(tokio_rusqlite::Error::Rusqlite)
            })
            .await
            .map_err(storage_err)?;
        row.map(raw_to_record).transpose()
    }

    /// Flips the given URLs to processed, stamping `at` as their
    /// processing time. One transaction for the whole set.
    pub async fn mark_processed(
        &self,
        urls: &[String],
        at: DateTime<Utc>,
    ) -> Result<(), RagError> {
        self.set_status(urls, PageStatus::Processed, Some(at)).await
    }

    /// Flips the given URLs to failed.
    pub async fn mark_failed(&self, urls: &[String]) -> Result<(), RagError> {
        self.set_status(urls, PageStatus::Failed, None).await
    }

    /// Number of records currently in `status`.
    pub async fn count_by_status(&self, status: PageStatus) -> Result<usize, RagError> {
        let status = status.as_str();
        self.conn
            .call(move |conn| {
                let count: i64 = conn
                    .query_row(
                        "SELECT COUNT(*) FROM pages WHERE status = ?1",
                        [status],
                        |row| row.get(0),
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(count as usize)
            })
            .await
            .map_err(storage_err)
    }

    async fn set_status(
        &self,
        urls: &[String],
        status: PageStatus,
        processed_at: Option<DateTime<Utc>>,
    ) -> Result<(), RagError> {
        if urls.is_empty() {
            return Ok(());
        }
        let urls = urls.to_vec();
        let status = status.as_str();
        let processed_at = processed_at.map(|at| at.to_rfc3339());
        self.conn
            .call(move |conn| {
                let tx = conn
                    .transaction()
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                {
                    let mut stmt = tx
                        .prepare(
                            "UPDATE pages SET status = ?1, processed_at = ?2 WHERE url = ?3",
                        )
                        .map_err(tokio_rusqlite::Error::Rusqlite)?;
                    for url in &urls {
                        stmt.execute((status, &processed_at, url))
                            .map_err(tokio_rusqlite::Error::Rusqlite)?;
                    }
                }
                tx.commit().map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }
}

type RawRow = (String, String, String, String, String, Option<String>);

fn raw_to_record(raw: RawRow) -> Result<PageRecord, RagError> {
    let (url, title, content, status, scraped_at, processed_at) = raw;
    Ok(PageRecord {
        url,
        title,
        content,
        status: PageStatus::parse(&status)?,
        scraped_at: parse_timestamp(&scraped_at)?,
        processed_at: processed_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RagError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|stamp| stamp.with_timezone(&Utc))
        .map_err(|err| RagError::Storage(format!("invalid timestamp '{raw}': {err}")))
}

fn storage_err(err: impl std::fmt::Display) -> RagError {
    RagError::Storage(err.to_string())
}
