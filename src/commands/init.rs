use crate::commands::Out;
use crate::{Config, Result};
use anyhow::Context;
use std::path::Path;

/// Creates the data directory, its subdirectories and:
/// - Creates an initial `config.json` file using `api_url` and `user_id`
/// - Moves `token_file`, if given, into its default location in the data dir
/// - Creates the local database that holds the outbox
///
/// # Errors
/// - Returns an error if the directory already holds a database or any file operations fail.
pub async fn init(
    moneytalk_home: &Path,
    api_url: &str,
    user_id: &str,
    token_file: Option<&Path>,
) -> Result<Out<()>> {
    let config = Config::create(moneytalk_home, api_url, user_id, token_file)
        .await
        .context("Unable to create the data directory and configs")?;
    Ok(format!(
        "Successfully created the moneytalk directory at {}",
        config.root().display()
    )
    .into())
}
