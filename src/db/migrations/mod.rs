//! Schema migrations for the local database.
//!
//! Each migration is a pair of embedded SQL files:
//! - `migration_NN_up.sql` moves the schema from version `NN-1` to `NN`
//! - `migration_NN_down.sql` moves the schema from version `NN` back to `NN-1`

use anyhow::{bail, Context};
use sqlx::{Executor, SqlitePool};
use tracing::debug;

use crate::Result;

/// The schema version that this build of the app expects.
pub(crate) const CURRENT_VERSION: i32 = 2;

struct Migration {
    version: i32,
    up_sql: &'static str,
    down_sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        up_sql: include_str!("migration_01_up.sql"),
        down_sql: include_str!("migration_01_down.sql"),
    },
    Migration {
        version: 2,
        up_sql: include_str!("migration_02_up.sql"),
        down_sql: include_str!("migration_02_down.sql"),
    },
];

/// One SQL script and the version recorded once it has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Step {
    sql: &'static str,
    resulting_version: i32,
}

/// Moves the schema from `from` to `to`, up or down. Every step commits together with its
/// `schema_version` row, so an interrupted run leaves the database at a known version.
pub(crate) async fn run(pool: &SqlitePool, from: i32, to: i32) -> Result<()> {
    let steps = plan(from, to)?;
    if steps.is_empty() {
        debug!("Schema already at version {to}");
        return Ok(());
    }
    for step in steps {
        debug!("Migrating schema to version {:02}", step.resulting_version);
        apply(pool, step).await?;
    }
    debug!("Schema now at version {to}");
    Ok(())
}

/// Resolves the ordered steps between two versions. Fails before anything runs if a migration
/// in the range is missing.
fn plan(from: i32, to: i32) -> Result<Vec<Step>> {
    let find = |version: i32| {
        MIGRATIONS
            .iter()
            .find(|m| m.version == version)
            .with_context(|| {
                format!("Migration {version} is required to go from version {from} to {to}")
            })
    };

    let mut steps = Vec::new();
    if from < to {
        for version in (from + 1)..=to {
            steps.push(Step {
                sql: find(version)?.up_sql,
                resulting_version: version,
            });
        }
    } else if from > to {
        if to < 0 {
            bail!("Cannot migrate to negative schema version {to}");
        }
        for version in ((to + 1)..=from).rev() {
            steps.push(Step {
                sql: find(version)?.down_sql,
                resulting_version: version - 1,
            });
        }
    }
    Ok(steps)
}

async fn apply(pool: &SqlitePool, step: Step) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .context("Failed to begin migration transaction")?;

    tx.execute(step.sql)
        .await
        .with_context(|| format!("Failed to migrate to version {}", step.resulting_version))?;

    sqlx::query("DELETE FROM schema_version")
        .execute(&mut *tx)
        .await
        .context("Failed to clear schema_version")?;
    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(step.resulting_version)
        .execute(&mut *tx)
        .await
        .context("Failed to record schema_version")?;

    tx.commit()
        .await
        .context("Failed to commit migration transaction")
}
