use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::config::{format_interval, ScheduleConfig};
use crate::pubsub::PubSub;
use crate::store::Store;

/// A job re-run every `every` until shut down.
struct RecurringTask {
    name: &'static str,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl RecurringTask {
    fn spawn<F, Fut>(name: &'static str, every: Duration, run_on_start: bool, job: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut timer = tokio::time::interval(every);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            if !run_on_start {
                timer.tick().await; // Skip the first immediate tick
            }

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = timer.tick() => {
                        debug!("Running scheduled {}", name);
                        job().await;
                    }
                }
            }
        });

        Self {
            name,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }

    fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Lets a job already in progress finish, then stops.
    async fn shutdown(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Scheduled {} task failed: {}", self.name, e);
            }
        }
    }
}

/// Owns the recurring subscription renewal and cleanup sweeps.
pub struct Scheduler {
    tasks: Vec<RecurringTask>,
}

impl Scheduler {
    pub fn start<S: Store + Send + Sync + 'static>(
        pubsub: Arc<PubSub<S>>,
        config: &ScheduleConfig,
    ) -> Self {
        info!(
            "Scheduler started (renew every {}, clean every {})",
            format_interval(config.renew_every.as_secs()),
            format_interval(config.clean_every.as_secs())
        );

        let renew_pubsub = pubsub.clone();
        let renew = RecurringTask::spawn(
            "renewal",
            config.renew_every.as_std(),
            config.run_on_start,
            move || {
                let pubsub = renew_pubsub.clone();
                async move {
                    if let Err(e) = pubsub.renew_expiring().await {
                        error!("Subscription renewal failed: {}", e);
                    }
                }
            },
        );

        let clean = RecurringTask::spawn(
            "cleanup",
            config.clean_every.as_std(),
            config.run_on_start,
            move || {
                let pubsub = pubsub.clone();
                async move {
                    if let Err(e) = pubsub.clean().await {
                        error!("Feed cleanup failed: {}", e);
                    }
                }
            },
        );

        Self {
            tasks: vec![renew, clean],
        }
    }

    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(RecurringTask::is_running)
    }

    pub async fn shutdown(&mut self) {
        for task in &mut self.tasks {
            task.shutdown().await;
        }
        info!("Scheduler stopped");
    }
}
