//! Non-blocking download counter with a batching background writer

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::analytics::store::{AnalyticsError, AnalyticsStore};
use crate::analytics::{
    AnalyticsEvent, CallerContext, DownloadIdentity, DownloadSummary, TokenVersion,
};
use crate::catalog::ModuleId;
use crate::config::AnalyticsConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterOptions {
    pub queue_capacity: usize,
    pub batch_size: usize,
}

impl From<&AnalyticsConfig> for CounterOptions {
    fn from(config: &AnalyticsConfig) -> Self {
        Self {
            queue_capacity: config.queue_capacity.max(1),
            batch_size: config.batch_size.max(1),
        }
    }
}

enum Command {
    Record(AnalyticsEvent),
    Flush(oneshot::Sender<()>),
}

/// Handle for recording downloads; cheap to clone
#[derive(Clone)]
pub struct AnalyticsCounter {
    sender: mpsc::Sender<Command>,
    store: Arc<dyn AnalyticsStore>,
    dropped: Arc<AtomicU64>,
}

impl AnalyticsCounter {
    /// Create the counter and start its writer on the current runtime
    pub fn spawn(store: Arc<dyn AnalyticsStore>, options: CounterOptions) -> (Self, JoinHandle<()>) {
        let (counter, receiver) = Self::unstarted(store, options);
        let writer = tokio::spawn(run_writer(
            receiver,
            counter.store.clone(),
            options.batch_size.max(1),
        ));
        (counter, writer)
    }

    fn unstarted(
        store: Arc<dyn AnalyticsStore>,
        options: CounterOptions,
    ) -> (Self, mpsc::Receiver<Command>) {
        let (sender, receiver) = mpsc::channel(options.queue_capacity.max(1));
        (
            Self {
                sender,
                store,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            receiver,
        )
    }

    /// Record one download
    ///
    /// Never blocks and never fails the caller. When the queue is full or the
    /// writer has stopped the event is dropped and counted.
    pub fn record(
        &self,
        identity: DownloadIdentity,
        timestamp: DateTime<Utc>,
        caller: CallerContext,
    ) {
        let event = AnalyticsEvent {
            identity,
            timestamp,
            caller,
        };

        match self.sender.try_send(Command::Record(event)) {
            Ok(()) => {}
            Err(TrySendError::Full(Command::Record(event))) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    module = %event.identity.module,
                    version = %event.identity.version,
                    "Analytics queue full, dropping download event"
                );
            }
            Err(TrySendError::Closed(_)) | Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Analytics writer stopped, dropping download event");
            }
        }
    }

    /// Wait until every event recorded before this call has been persisted
    /// (or dropped by a failed write)
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.sender.send(Command::Flush(done)).await.is_err() {
            warn!("Analytics writer stopped, nothing to flush");
            return;
        }
        let _ = wait.await;
    }

    /// Number of events dropped because the queue was full or closed
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn total_downloads(&self, identity: &DownloadIdentity) -> Result<u64, AnalyticsError> {
        self.store.count_downloads(identity)
    }

    pub fn module_download_summary(
        &self,
        module: &ModuleId,
    ) -> Result<DownloadSummary, AnalyticsError> {
        self.store.download_summary(module, Utc::now())
    }

    pub fn token_versions(
        &self,
        module: &ModuleId,
    ) -> Result<IndexMap<String, TokenVersion>, AnalyticsError> {
        self.store.token_versions(module)
    }

    pub fn global_total_downloads(&self) -> Result<u64, AnalyticsError> {
        self.store.total_downloads()
    }

    /// Modules ranked by downloads over the last `days` days
    pub fn most_downloaded(
        &self,
        days: i64,
        limit: usize,
    ) -> Result<Vec<(ModuleId, u64)>, AnalyticsError> {
        self.store
            .most_downloaded_since(Utc::now() - chrono::Duration::days(days), limit)
    }
}

/// Drain the queue in batches until every sender is gone
async fn run_writer(
    mut receiver: mpsc::Receiver<Command>,
    store: Arc<dyn AnalyticsStore>,
    batch_size: usize,
) {
    info!("Analytics writer started");

    while let Some(first) = receiver.recv().await {
        let mut batch = Vec::new();
        let mut waiters = Vec::new();

        let mut next = Some(first);
        while let Some(command) = next.take() {
            match command {
                Command::Record(event) => batch.push(event),
                Command::Flush(done) => waiters.push(done),
            }
            if batch.len() < batch_size {
                next = receiver.try_recv().ok();
            }
        }

        if !batch.is_empty() {
            let count = batch.len();
            let store = store.clone();
            match tokio::task::spawn_blocking(move || store.append_events(&batch)).await {
                Ok(Ok(())) => debug!("Persisted {} download events", count),
                Ok(Err(e)) => error!("Failed to persist {} download events: {}", count, e),
                Err(e) => error!("Analytics write task failed: {}", e),
            }
        }

        for done in waiters {
            let _ = done.send(());
        }
    }

    info!("Analytics writer stopped");
}
