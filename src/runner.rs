//! Orchestration: spawn workers under a shared cancellation scope, wait for
//! drain, and always produce a final report.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::Config;
use crate::credentials::CredentialPool;
use crate::error::Error;
use crate::metrics::{self, Collector};
use crate::report::Reporter;
use crate::scenario::Scenario;
use crate::worker::Worker;

#[derive(Debug)]
pub struct Runner {
    config: Config,
    scenario: Arc<Scenario>,
    credentials: Option<Arc<CredentialPool>>,
    collector: Arc<Collector>,
}

impl Runner {
    /// Load the scenario and optional credentials. Everything fatal
    /// surfaces here, before a single worker exists.
    pub fn new(config: Config) -> Result<Self, Error> {
        let scenario = Arc::new(Scenario::load(&config.script)?);

        let credentials = config
            .credentials
            .as_deref()
            .map(CredentialPool::load)
            .transpose()?
            .map(Arc::new);

        if let Some(pool) = &credentials {
            if (pool.len() as u32) < config.users {
                warn!(
                    users = config.users,
                    credentials = pool.len(),
                    "fewer credentials than users; assigning round-robin"
                );
            } else {
                info!(credentials = pool.len(), "credentials loaded");
            }
        }

        Ok(Runner {
            config,
            scenario,
            credentials,
            collector: Arc::new(Collector::new()),
        })
    }

    /// Execute the load test. Returns once all workers have stopped, the
    /// metric channel has drained, and the report is out. The same path runs
    /// whether the deadline expired or the operator interrupted.
    pub async fn run(&self) -> Result<(), Error> {
        info!(
            users = self.config.users,
            rps = self.config.rps,
            duration = %humantime::format_duration(self.config.duration),
            actions = self.scenario.actions.len(),
            "starting load test"
        );

        let (sink, rx) = metrics::sink(metrics::SINK_CAPACITY);
        let drain = {
            let collector = Arc::clone(&self.collector);
            tokio::spawn(async move { collector.drain(rx).await })
        };

        let cancel = CancellationToken::new();
        spawn_deadline(cancel.clone(), self.config.duration);

        let reporter = Reporter::new(Arc::clone(&self.collector), self.config.verbose);
        let progress = reporter.spawn_progress(cancel.clone());

        let mut workers = JoinSet::new();
        for id in 1..=u64::from(self.config.users) {
            let worker = Worker::new(
                id,
                &self.config,
                Arc::clone(&self.scenario),
                self.credentials.as_deref().map(|p| p.for_user(id).clone()),
                sink.clone(),
            )?;
            let cancel = cancel.clone();
            let login_url = self.config.login_url.clone();
            workers.spawn(async move {
                // A worker abort (failed login) takes down this user only.
                if let Err(err) = worker.run(cancel, login_url.as_deref()).await {
                    warn!(worker = id, error = %err, "worker aborted");
                }
            });
        }
        // Only worker clones keep the sink alive now; the channel closes
        // when the last of them returns.
        drop(sink);

        while workers.join_next().await.is_some() {}
        info!("workers finished, draining metrics");

        drain.await.expect("aggregator task panicked");
        if let Some(progress) = progress {
            progress.abort();
        }

        reporter.print_final();
        if let Some(path) = &self.config.out {
            reporter.save(path)?;
        }
        Ok(())
    }
}

/// Cancel the token when the test duration elapses or on operator
/// interrupt, whichever comes first.
fn spawn_deadline(cancel: CancellationToken, duration: std::time::Duration) {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {
                info!("test duration reached");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
            }
        }
        cancel.cancel();
    });
}
