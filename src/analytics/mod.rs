//! Download accounting
//!
//! Downloads are recorded as events on a bounded queue and persisted in
//! batches by a background writer, so recording never blocks or fails the
//! request that triggered it. Counts are always aggregated from the
//! append-only event log.
//!
//! # Modules
//!
//! - [`store`]: Event log persistence and aggregate queries
//! - [`counter`]: Queue, background writer and flush barrier

pub mod counter;
pub mod store;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::catalog::ModuleId;

pub use counter::{AnalyticsCounter, CounterOptions};
pub use store::{AnalyticsError, AnalyticsStore, SqliteAnalyticsStore};

/// Which version of which module was downloaded
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DownloadIdentity {
    pub module: ModuleId,
    pub version: String,
}

impl DownloadIdentity {
    pub fn new(module: ModuleId, version: impl Into<String>) -> Self {
        Self {
            module,
            version: version.into(),
        }
    }
}

/// Caller details captured alongside a download
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerContext {
    pub analytics_token: Option<String>,
    pub terraform_version: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyticsEvent {
    pub identity: DownloadIdentity,
    pub timestamp: DateTime<Utc>,
    pub caller: CallerContext,
}

/// Download counts for a module over rolling windows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DownloadSummary {
    pub week: u64,
    pub month: u64,
    pub year: u64,
    pub total: u64,
}

/// Most recent download seen for an analytics token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenVersion {
    pub module_version: String,
    pub terraform_version: Option<String>,
}
