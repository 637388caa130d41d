use crate::error::{IndexError, Result};
use crate::plan::{CompleteCallback, RefreshPlan};
use async_trait::async_trait;
use sidekick_protocol::{ArtifactId, IndexingStatus, ProgressUpdate, Tag};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Reports an artifact's progress into the orchestrator's stream, rescaled
/// into the `[base, base + span]` slice of the overall run so fractions
/// stay monotonic across artifacts and directories.
#[derive(Clone)]
pub struct ProgressReporter {
    tx: mpsc::Sender<ProgressUpdate>,
    base: f64,
    span: f64,
}

impl ProgressReporter {
    pub fn new(tx: mpsc::Sender<ProgressUpdate>, base: f64, span: f64) -> Self {
        Self { tx, base, span }
    }

    /// `fraction` is this artifact's local progress in `[0, 1]`.
    pub async fn report(&self, fraction: f64, desc: impl Into<String>) {
        let update = ProgressUpdate::new(
            (self.base + self.span * fraction.clamp(0.0, 1.0)).min(1.0),
            desc,
            IndexingStatus::Indexing,
        );
        // A dropped receiver only means the consumer stopped listening.
        let _ = self.tx.send(update).await;
    }
}

/// One derived index over file contents. Implementations process a plan's
/// items in the fixed order compute → add_tag → remove_tag → del, call
/// `complete` after each item's side effects are durable, emit proportional
/// progress, and poll `cancel` between items.
#[async_trait]
pub trait ArtifactIndex: Send + Sync {
    fn artifact_id(&self) -> ArtifactId;

    async fn update(
        &self,
        tag: &Tag,
        plan: &RefreshPlan,
        complete: &CompleteCallback,
        repo_name: Option<&str>,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// Shared per-item loop bookkeeping: cancellation poll plus proportional
/// progress keyed off the item's position in the batch.
pub(crate) async fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(IndexError::Cancelled);
    }
    // Cooperative suspension point between plan items.
    tokio::task::yield_now().await;
    Ok(())
}

pub(crate) fn item_fraction(position: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        (position + 1) as f64 / total as f64
    }
}
