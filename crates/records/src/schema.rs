//! Schema definition and forward-only evolution of the `comparisons` table.
//!
//! The table is created with the columns it originally shipped with. Columns
//! introduced since are listed in [`EVOLVED_COLUMNS`] and added to whatever
//! table is found on disk, after asking SQLite which columns it already has.
//! Nothing is ever dropped or rewritten, so no migration can lose rows.

use exn::ResultExt;
use sqlx::SqlitePool;
use std::collections::HashSet;
use tracing::instrument;

use crate::error::{ErrorKind, Result};

const TABLE: &str = "comparisons";

/// A column added to the table after it first shipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: &'static str,
    /// SQL literal used for existing rows. `None` means they get `NULL`.
    pub default: Option<&'static str>,
}
impl Column {
    pub const fn nullable(name: &'static str, sql_type: &'static str) -> Self {
        Self { name, sql_type, default: None }
    }

    fn definition(&self) -> String {
        match self.default {
            Some(default) => format!("{} {} DEFAULT {}", self.name, self.sql_type, default),
            None => format!("{} {}", self.name, self.sql_type),
        }
    }
}

/// Columns that databases written by older versions may be missing, in the
/// order they were introduced.
pub const EVOLVED_COLUMNS: &[Column] = &[
    // Cached file locations, so the vault can show the files themselves and
    // not only their digests.
    Column::nullable("file1_path", "TEXT"),
    Column::nullable("file2_path", "TEXT"),
];

/// What [`ensure()`] had to do.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SchemaReport {
    /// The table didn't exist and was created.
    pub created: bool,
    /// Columns that were missing and have been added.
    pub added: Vec<&'static str>,
}
impl SchemaReport {
    pub fn is_unchanged(&self) -> bool {
        !self.created && self.added.is_empty()
    }
}

#[instrument("ensuring comparison schema", skip_all)]
pub(crate) async fn ensure(pool: &SqlitePool) -> Result<SchemaReport> {
    let existed: bool = sqlx::query_scalar(include_str!("../queries/table_exists.sql"))
        .fetch_one(pool)
        .await
        .or_raise(|| ErrorKind::Migration)?;
    sqlx::query(include_str!("../queries/create_comparisons.sql"))
        .execute(pool)
        .await
        .or_raise(|| ErrorKind::Migration)?;

    let present: HashSet<String> = columns(pool).await?.into_iter().collect();
    let mut report = SchemaReport { created: !existed, added: Vec::new() };
    for column in EVOLVED_COLUMNS.iter().filter(|c| !present.contains(c.name)) {
        if add_column(pool, column).await? {
            tracing::info!(table = TABLE, column = column.name, "added missing column");
            report.added.push(column.name);
        }
    }

    sqlx::query(include_str!("../queries/create_ordering_index.sql"))
        .execute(pool)
        .await
        .or_raise(|| ErrorKind::Migration)?;
    Ok(report)
}

/// Add a single column. Returns `false` if it turned out somebody else added
/// it between introspection and now.
async fn add_column(pool: &SqlitePool, column: &Column) -> Result<bool> {
    let statement = format!("ALTER TABLE {TABLE} ADD COLUMN {}", column.definition());
    match sqlx::query(&statement).execute(pool).await {
        Ok(_) => Ok(true),
        // SQLite has no ADD COLUMN IF NOT EXISTS. Another process starting
        // up against the same file can win the race; re-check before failing.
        Err(e) => match columns(pool).await?.iter().any(|c| c == column.name) {
            true => {
                tracing::debug!(table = TABLE, column = column.name, "column appeared concurrently");
                Ok(false)
            },
            false => Err(e).or_raise(|| ErrorKind::Migration),
        },
    }
}

pub(crate) async fn columns(pool: &SqlitePool) -> Result<Vec<String>> {
    sqlx::query_scalar(include_str!("../queries/table_columns.sql"))
        .fetch_all(pool)
        .await
        .or_raise(|| ErrorKind::Database)
}
