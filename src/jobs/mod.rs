//! # Batch Jobs
//!
//! Out-of-band jobs run against the store and the remote search API. Each job
//! reports incremental progress through a [`JobStatus`] and returns a summary
//! when it completes.

pub mod maintenance;
pub mod search_warmer;

use std::future::Future;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info};

use crate::storage::MemoryStore;

pub use maintenance::{remove_song_url_prefixes, MaintenanceSummary};
pub use search_warmer::{ConsolidationSummary, SearchCacheWarmer, WarmSummary};

/// Progress reporter for a running job.
///
/// Messages always go to the log. When a sender is attached they are also
/// forwarded to whoever collects progress; a closed receiver is ignored.
#[derive(Debug, Clone)]
pub struct JobStatus {
    job: &'static str,
    sender: Option<UnboundedSender<String>>,
}

impl JobStatus {
    pub fn new(job: &'static str) -> Self {
        Self { job, sender: None }
    }

    pub fn with_sender(job: &'static str, sender: UnboundedSender<String>) -> Self {
        Self {
            job,
            sender: Some(sender),
        }
    }

    pub fn job(&self) -> &'static str {
        self.job
    }

    pub fn message(&self, message: impl Into<String>) {
        let message = message.into();
        info!("⚙️ [{}] {}", self.job, message);

        if let Some(sender) = &self.sender {
            let _ = sender.send(message);
        }
    }
}

/// Runs `job` and writes the store snapshot whatever the outcome, so
/// records persisted before a failure survive. A job error wins over a save
/// error.
pub async fn run_then_save<T>(
    store: &MemoryStore,
    job: impl Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    let outcome = job.await;
    if let Err(e) = &outcome {
        error!("❌ Job fallido, guardando lo ya persistido: {:#}", e);
    }

    let saved = store.save().await;
    let value = outcome?;
    saved?;
    Ok(value)
}
