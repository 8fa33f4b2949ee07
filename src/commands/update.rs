use crate::api::Mode;
use crate::args::UpdateArgs;
use crate::client::Client;
use crate::commands::Out;
use crate::model::{Transaction, TransactionPatch};
use crate::{Config, Result};

/// Changes the given fields of a confirmed transaction. Requires the API to be reachable.
pub async fn update(config: Config, mode: Mode, args: UpdateArgs) -> Result<Out<Transaction>> {
    let patch = TransactionPatch {
        description: args.description,
        amount: args.amount,
        category_id: args.category_id,
        r#type: args.kind,
        date: args.date,
    };
    let client = Client::new(config, mode).await?;
    let transaction = client.update(&args.id, &patch).await?;
    Ok(Out::new(
        format!("Updated transaction {}", transaction.id),
        transaction,
    ))
}
