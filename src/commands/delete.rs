use crate::api::Mode;
use crate::args::DeleteArgs;
use crate::client::Client;
use crate::commands::Out;
use crate::{Config, Result};

/// Deletes a confirmed transaction. Requires the API to be reachable.
pub async fn delete(config: Config, mode: Mode, args: DeleteArgs) -> Result<Out<String>> {
    let client = Client::new(config, mode).await?;
    client.delete(&args.id).await?;
    Ok(Out::new(format!("Deleted transaction {}", args.id), args.id))
}
