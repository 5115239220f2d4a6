//! Fixed-interval execution of the expiration sweeps.
//!
//! ```text
//! CronScheduler (every 15 min) ──► MarkExpiredTask ──► ExpirationSweeper::mark_expired
//! CronScheduler (hourly)       ──► DeleteExpiredTask ─► ExpirationSweeper::delete_expired
//! ```
//!
//! Rules use the six-field cron syntax (seconds first) and are evaluated in UTC.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};

use super::sweeper::ExpirationSweeper;

#[async_trait]
pub trait ScheduledTask: Send + Sync + 'static {
    fn name(&self) -> &'static str;
    async fn run(&self);
}

/// Something that fires tasks on a recurring rule.
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn schedule(&self, rule: &str, task: Arc<dyn ScheduledTask>) -> anyhow::Result<()>;
    async fn start(&self) -> anyhow::Result<()>;
    async fn shutdown(&self) -> anyhow::Result<()>;
}

pub struct CronScheduler {
    inner: JobScheduler,
}

impl CronScheduler {
    pub async fn new() -> anyhow::Result<Self> {
        Ok(Self { inner: JobScheduler::new().await? })
    }
}

#[async_trait]
impl Scheduler for CronScheduler {
    async fn schedule(&self, rule: &str, task: Arc<dyn ScheduledTask>) -> anyhow::Result<()> {
        let name = task.name();
        let job = Job::new_async(rule, move |_uuid, _lock| {
            let task = task.clone();
            Box::pin(async move {
                tracing::debug!(task = task.name(), "scheduled task firing");
                task.run().await;
            })
        })?;
        self.inner.add(job).await?;
        tracing::info!(task = name, rule, "scheduled task registered");
        Ok(())
    }

    async fn start(&self) -> anyhow::Result<()> {
        self.inner.start().await?;
        Ok(())
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        let mut inner = self.inner.clone();
        inner.shutdown().await?;
        Ok(())
    }
}

pub struct MarkExpiredTask(pub Arc<ExpirationSweeper>);

#[async_trait]
impl ScheduledTask for MarkExpiredTask {
    fn name(&self) -> &'static str {
        "mark-expired-stories"
    }

    async fn run(&self) {
        if let Err(e) = self.0.mark_expired().await {
            tracing::error!(error = %e, "error marking stories as expired");
        }
    }
}

pub struct DeleteExpiredTask(pub Arc<ExpirationSweeper>);

#[async_trait]
impl ScheduledTask for DeleteExpiredTask {
    fn name(&self) -> &'static str {
        "cleanup-expired-stories"
    }

    async fn run(&self) {
        if let Err(e) = self.0.delete_expired().await {
            tracing::error!(error = %e, "story cleanup failed");
        }
    }
}

/// Registers both sweep passes on `scheduler`. Starting it is left to the caller.
pub async fn register_sweeps(
    scheduler: &dyn Scheduler,
    sweeper: Arc<ExpirationSweeper>,
    mark_rule: &str,
    delete_rule: &str,
) -> anyhow::Result<()> {
    scheduler.schedule(mark_rule, Arc::new(MarkExpiredTask(sweeper.clone()))).await?;
    scheduler.schedule(delete_rule, Arc::new(DeleteExpiredTask(sweeper))).await?;
    Ok(())
}
