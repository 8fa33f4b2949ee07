use crate::commands::Out;
use crate::model::PendingTransaction;
use crate::{Config, Result};

/// Lists the outbox, oldest first. This never touches the network.
pub async fn pending(config: Config) -> Result<Out<Vec<PendingTransaction>>> {
    let entries = config.outbox().all().await?;
    if entries.is_empty() {
        return Ok(Out::new("No transactions waiting to sync", entries));
    }
    let mut message = format!("{} transaction(s) waiting to sync:", entries.len());
    for p in &entries {
        message.push_str(&format!(
            "\n  {}  {}  {:<7}  {:>12}  {}",
            p.temp_id,
            p.payload.date,
            p.payload.r#type.to_string(),
            p.payload.amount.to_string(),
            p.payload.description
        ));
    }
    Ok(Out::new(message, entries))
}
