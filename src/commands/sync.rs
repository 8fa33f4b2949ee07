use crate::api::Mode;
use crate::client::Client;
use crate::commands::Out;
use crate::reconcile::DrainReport;
use crate::{Config, Result};

/// Sends every pending transaction to the API now, in the order they were added.
///
/// Entries that fail stay in the outbox. A partial sync is reported in the message, it is not an
/// error.
pub async fn sync(config: Config, mode: Mode) -> Result<Out<DrainReport>> {
    let client = Client::new(config, mode).await?;
    let report = client.sync().await?;
    let mut message = report.message();
    for failed in report.failed() {
        message.push_str(&format!(
            "\n  {} '{}': {}",
            failed.temp_id, failed.description, failed.message
        ));
    }
    Ok(Out::new(message, report))
}
