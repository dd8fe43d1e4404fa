//! Read-only SQLite connections shared by the catalog and analytics stores
//!
//! Writers keep a single connection behind a mutex. Reads check out their own
//! read-only connection, so under WAL they run in parallel with each other and
//! with an open write transaction.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{Connection, OpenFlags};
use tracing::debug;

/// Idle connections kept for reuse; extra ones are closed on return
const MAX_IDLE_READERS: usize = 8;

pub(crate) struct ReadPool {
    path: PathBuf,
    idle: Mutex<Vec<Connection>>,
}

impl ReadPool {
    pub(crate) fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Run `f` on a read-only connection
    ///
    /// The pool lock is held only to check a connection out and back in,
    /// never while a query runs.
    pub(crate) fn with_conn<T, E>(&self, f: impl FnOnce(&Connection) -> Result<T, E>) -> Result<T, E>
    where
        E: From<rusqlite::Error>,
    {
        let idle = self.checkout();
        let conn = match idle {
            Some(conn) => conn,
            None => self.open()?,
        };

        let result = f(&conn);
        self.checkin(conn);
        result
    }

    fn checkout(&self) -> Option<Connection> {
        // A poisoned list of idle connections is still a valid list
        let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        idle.pop()
    }

    fn checkin(&self, conn: Connection) {
        let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        if idle.len() < MAX_IDLE_READERS {
            idle.push(conn);
        }
    }

    fn open(&self) -> Result<Connection, rusqlite::Error> {
        debug!("Opening read connection to {:?}", self.path);
        Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
    }

    #[cfg(test)]
    pub(crate) fn idle_connections(&self) -> usize {
        self.idle.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
