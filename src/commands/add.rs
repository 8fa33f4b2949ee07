use crate::api::Mode;
use crate::args::AddArgs;
use crate::client::Client;
use crate::commands::Out;
use crate::model::NewTransaction;
use crate::submit::Submission;
use crate::{Config, Result};
use chrono::Local;

/// Records a new transaction. When the API cannot be reached the transaction is saved to the
/// outbox and the command still succeeds. A transaction the API rejects is an error.
pub async fn add(config: Config, mode: Mode, args: AddArgs) -> Result<Out<Submission>> {
    let client = Client::new(config, mode).await?;
    let payload = NewTransaction {
        description: args.description,
        amount: args.amount,
        category_id: args.category_id,
        r#type: args.kind,
        date: args.date.unwrap_or_else(|| Local::now().date_naive()),
        user_id: client.config().user_id().to_string(),
    };
    let submission = client.submit(payload).await?;
    Ok(Out::new(submission.message(), submission))
}
