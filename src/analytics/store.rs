//! Append-only download event log

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
#[cfg(test)]
use mockall::automock;
use rusqlite::{Connection, params};
use thiserror::Error;
use tracing::{debug, info};

use crate::analytics::{AnalyticsEvent, DownloadIdentity, DownloadSummary, TokenVersion};
use crate::catalog::ModuleId;
use crate::db::ReadPool;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,
}

/// Persistence for download events
///
/// Events are only ever appended; every count is derived by aggregation.
#[cfg_attr(test, automock)]
pub trait AnalyticsStore: Send + Sync + 'static {
    /// Append a batch of events atomically
    fn append_events(&self, events: &[AnalyticsEvent]) -> Result<(), AnalyticsError>;

    fn count_downloads(&self, identity: &DownloadIdentity) -> Result<u64, AnalyticsError>;

    /// Counts over the 7, 30 and 365 days before `now`, plus all time
    fn download_summary(
        &self,
        module: &ModuleId,
        now: DateTime<Utc>,
    ) -> Result<DownloadSummary, AnalyticsError>;

    /// Latest download per analytics token, ordered by token
    fn token_versions(
        &self,
        module: &ModuleId,
    ) -> Result<IndexMap<String, TokenVersion>, AnalyticsError>;

    fn total_downloads(&self) -> Result<u64, AnalyticsError>;

    /// Modules ranked by downloads at or after `since`, most downloaded first
    fn most_downloaded_since(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<(ModuleId, u64)>, AnalyticsError>;
}

/// Appends go through one writer connection; reads use the pool
pub struct SqliteAnalyticsStore {
    conn: Mutex<Connection>,
    readers: ReadPool,
}

impl SqliteAnalyticsStore {
    pub fn new(db_path: &Path) -> Result<Self, AnalyticsError> {
        info!("Initializing analytics database at {:?}", db_path);

        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS download_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                namespace TEXT NOT NULL,
                name TEXT NOT NULL,
                target TEXT NOT NULL,
                version TEXT NOT NULL,
                downloaded_at INTEGER NOT NULL,
                analytics_token TEXT,
                terraform_version TEXT,
                user_agent TEXT
            )
            "#,
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_download_events_module
             ON download_events(namespace, name, target, downloaded_at)",
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            readers: ReadPool::new(db_path),
        })
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, AnalyticsError> {
        self.conn.lock().map_err(|_| AnalyticsError::LockPoisoned)
    }
}

impl AnalyticsStore for SqliteAnalyticsStore {
    fn append_events(&self, events: &[AnalyticsEvent]) -> Result<(), AnalyticsError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO download_events
                 (namespace, name, target, version, downloaded_at,
                  analytics_token, terraform_version, user_agent)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for event in events {
                let module = &event.identity.module;
                stmt.execute(params![
                    module.namespace,
                    module.name,
                    module.target,
                    event.identity.version,
                    event.timestamp.timestamp_millis(),
                    event.caller.analytics_token,
                    event.caller.terraform_version,
                    event.caller.user_agent,
                ])?;
            }
        }
        tx.commit()?;

        debug!("Appended {} download events", events.len());
        Ok(())
    }

    fn count_downloads(&self, identity: &DownloadIdentity) -> Result<u64, AnalyticsError> {
        let module = &identity.module;
        let count: i64 = self.readers.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM download_events
                 WHERE namespace = ?1 AND name = ?2 AND target = ?3 AND version = ?4",
                params![module.namespace, module.name, module.target, identity.version],
                |row| row.get(0),
            )
        })?;
        Ok(count as u64)
    }

    fn download_summary(
        &self,
        module: &ModuleId,
        now: DateTime<Utc>,
    ) -> Result<DownloadSummary, AnalyticsError> {
        let days_ago = |days: i64| (now - Duration::days(days)).timestamp_millis();
        self.readers.with_conn(|conn| {
            // One statement so every window sees the same events
            let (week, month, year, total): (i64, i64, i64, i64) = conn.query_row(
                "SELECT
                    COALESCE(SUM(downloaded_at >= ?4), 0),
                    COALESCE(SUM(downloaded_at >= ?5), 0),
                    COALESCE(SUM(downloaded_at >= ?6), 0),
                    COUNT(*)
                 FROM download_events
                 WHERE namespace = ?1 AND name = ?2 AND target = ?3",
                params![
                    module.namespace,
                    module.name,
                    module.target,
                    days_ago(7),
                    days_ago(30),
                    days_ago(365)
                ],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;
            Ok(DownloadSummary {
                week: week as u64,
                month: month as u64,
                year: year as u64,
                total: total as u64,
            })
        })
    }

    fn token_versions(
        &self,
        module: &ModuleId,
    ) -> Result<IndexMap<String, TokenVersion>, AnalyticsError> {
        self.readers.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT analytics_token, version, terraform_version FROM download_events
                 WHERE namespace = ?1 AND name = ?2 AND target = ?3
                   AND analytics_token IS NOT NULL
                 ORDER BY downloaded_at ASC, id ASC",
            )?;

            let rows = stmt.query_map(
                params![module.namespace, module.name, module.target],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        TokenVersion {
                            module_version: row.get(1)?,
                            terraform_version: row.get(2)?,
                        },
                    ))
                },
            )?;

            // Later rows overwrite earlier ones, leaving the latest per token
            let mut versions = IndexMap::new();
            for row in rows {
                let (token, version) = row?;
                versions.insert(token, version);
            }
            versions.sort_keys();

            Ok(versions)
        })
    }

    fn total_downloads(&self) -> Result<u64, AnalyticsError> {
        let count: i64 = self.readers.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM download_events", [], |row| row.get(0))
        })?;
        Ok(count as u64)
    }

    fn most_downloaded_since(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<(ModuleId, u64)>, AnalyticsError> {
        self.readers.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT namespace, name, target, COUNT(*) AS downloads FROM download_events
                 WHERE downloaded_at >= ?1
                 GROUP BY namespace, name, target
                 ORDER BY downloads DESC, MAX(downloaded_at) DESC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(
                params![since.timestamp_millis(), limit as i64],
                |row| {
                    Ok((
                        ModuleId::new(
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                        ),
                        row.get::<_, i64>(3)? as u64,
                    ))
                },
            )?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }
}
