use crate::api::Mode;
use crate::client::Client;
use crate::commands::Out;
use crate::connectivity::ConnectivityState;
use crate::reconcile::DrainReport;
use crate::{Config, Result};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub connectivity: ConnectivityState,
    pub pending: usize,
    pub sync: DrainReport,
}

/// Checks the connection by hand. When the API is reachable, pending transactions are synced;
/// with nothing pending the recovery is simply acknowledged.
pub async fn status(config: Config, mode: Mode) -> Result<Out<Status>> {
    let client = Client::new(config, mode).await?;
    let sync = client.sync().await?;
    let status = Status {
        connectivity: client.monitor().state(),
        pending: client.outbox().len().await?,
        sync,
    };
    let message = if !status.connectivity.is_online {
        format!("Offline, {} transaction(s) pending", status.pending)
    } else if status.pending == 0 {
        format!("Online, {}", status.sync.message().to_lowercase())
    } else {
        format!(
            "Online, {}, {} transaction(s) still pending",
            status.sync.message().to_lowercase(),
            status.pending
        )
    };
    Ok(Out::new(message, status))
}
