use serde::Serialize;
use uuid::Uuid;

use crate::clock::DynClock;
use crate::plugins::metrics::MetricsPlugin;

use super::error::StoreError;
use super::store::DynStoryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepPass {
    Mark,
    Delete,
}

impl SweepPass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SweepPass::Mark => "mark",
            SweepPass::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Candidates selected at the start of the pass.
    pub found: usize,
    /// Candidates this pass flagged or removed, or found already handled.
    pub processed: usize,
    pub failed_ids: Vec<Uuid>,
}

/// Background passes over the story store. Holds no state between runs:
/// every pass re-selects from what is currently persisted, so an interrupted
/// run is finished by the next tick.
#[derive(Clone)]
pub struct ExpirationSweeper {
    store: DynStoryStore,
    clock: DynClock,
    metrics: Option<MetricsPlugin>,
}

impl ExpirationSweeper {
    pub fn new(store: DynStoryStore, clock: DynClock) -> Self {
        Self { store, clock, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: MetricsPlugin) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Flags stories whose deadline has passed. Records keep existing.
    pub async fn mark_expired(&self) -> Result<SweepReport, StoreError> {
        let now = self.clock.now();
        let candidates = self.store.due_for_marking(now).await?;
        let mut report = SweepReport { found: candidates.len(), ..SweepReport::default() };

        for candidate in candidates {
            match self.store.mark_expired(candidate.id).await {
                Ok(_) => report.processed += 1,
                Err(e) => {
                    tracing::error!(story_id = %candidate.id, error = %e, "failed to mark story as expired");
                    report.failed_ids.push(candidate.id);
                }
            }
        }

        if report.found > 0 {
            tracing::info!(marked = report.processed, found = report.found, "marked stories as expired");
        }
        self.record(SweepPass::Mark, &report);
        Ok(report)
    }

    /// Hard-deletes every effectively expired story. A record that vanished
    /// between selection and delete counts as processed.
    pub async fn delete_expired(&self) -> Result<SweepReport, StoreError> {
        let now = self.clock.now();
        let candidates = self.store.due_for_deletion(now).await?;
        let mut report = SweepReport { found: candidates.len(), ..SweepReport::default() };

        if candidates.is_empty() {
            tracing::debug!("no expired stories found");
            self.record(SweepPass::Delete, &report);
            return Ok(report);
        }

        for candidate in candidates {
            match self.store.delete(candidate.id).await {
                Ok(removed) => {
                    report.processed += 1;
                    if removed {
                        tracing::debug!(story_id = %candidate.id, expires_at = %candidate.expires_at, "deleted expired story");
                    }
                }
                Err(e) => {
                    tracing::error!(story_id = %candidate.id, error = %e, "failed to delete expired story");
                    report.failed_ids.push(candidate.id);
                }
            }
        }

        tracing::info!(
            deleted = report.processed,
            found = report.found,
            cleanup_time = %now,
            "story cleanup completed"
        );
        self.record(SweepPass::Delete, &report);
        Ok(report)
    }

    fn record(&self, pass: SweepPass, report: &SweepReport) {
        if let Some(m) = &self.metrics {
            m.record_sweep(pass.as_str(), "processed", report.processed as u64);
            m.record_sweep(pass.as_str(), "failed", report.failed_ids.len() as u64);
        }
    }
}
