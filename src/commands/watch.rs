use crate::api::Mode;
use crate::args::WatchArgs;
use crate::client::Client;
use crate::commands::Out;
use crate::connectivity::Transition;
use crate::reconcile::DrainReport;
use crate::{Config, Result};
use serde::Serialize;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchSummary {
    /// Drain passes that sent at least one request.
    pub passes: usize,
    pub confirmed: usize,
    /// Entries that failed in the most recent pass.
    pub failed: usize,
}

impl WatchSummary {
    fn record(&mut self, report: &DrainReport) {
        match report {
            DrainReport::Complete { .. } | DrainReport::Partial { .. } => {
                info!("{}", report.message());
                self.passes += 1;
                self.confirmed += report.confirmed().len();
                self.failed = report.failed().len();
            }
            _ => debug!("{}", report.message()),
        }
    }
}

/// Keeps a session open until Ctrl-C. The connection is probed every `interval_secs`; when it
/// comes back, or while transactions are pending, the outbox is drained.
pub async fn watch(config: Config, mode: Mode, args: WatchArgs) -> Result<Out<WatchSummary>> {
    let client = Client::new(config, mode).await?;
    let interval = Duration::from_secs(args.interval_secs.max(1));
    info!("Watching the connection every {}s, press Ctrl-C to stop", interval.as_secs());
    let summary = run(&client, interval, until_signal(tokio::signal::ctrl_c())).await?;
    Ok(Out::new(
        format!(
            "Stopped watching after syncing {} transaction(s)",
            summary.confirmed
        ),
        summary,
    ))
}

/// Resolves once `signal` fires. When the handler cannot be installed the watch stops right away.
async fn until_signal(signal: impl Future<Output = io::Result<()>>) {
    if let Err(e) = signal.await {
        warn!("Unable to listen for Ctrl-C, stopping: {e}");
    }
}

pub(crate) async fn run(
    client: &Client,
    interval: Duration,
    shutdown: impl Future<Output = ()>,
) -> Result<WatchSummary> {
    let mut summary = WatchSummary::default();
    let mut events = client.monitor().subscribe();
    let reconciler = client.reconciler();

    if !client.outbox().is_empty().await? {
        summary.record(&reconciler.on_recovered().await?);
    }

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            event = events.recv() => match event {
                Ok(Transition::Online) => summary.record(&reconciler.on_recovered().await?),
                Ok(Transition::Offline) => {}
                Err(RecvError::Lagged(missed)) => debug!("Missed {missed} connectivity events"),
                Err(RecvError::Closed) => break,
            },
            _ = ticker.tick() => {
                // Retry leftovers while stably online; the minimum interval paces this
                if client.monitor().probe().await && !client.outbox().is_empty().await? {
                    summary.record(&reconciler.on_recovered().await?);
                }
            }
        }
    }
    Ok(summary)
}
