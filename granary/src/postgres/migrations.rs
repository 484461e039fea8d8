//! Versioned schema setup.
//!
//! Migrations are an append-only list applied in order. The runner reads the
//! highest applied version from `store_migrations` (bootstrapping the table
//! on first contact), applies every later entry whose condition holds, and
//! records each one. Re-running is a no-op.

use tokio_postgres::error::SqlState;
use tokio_postgres::Client;

use crate::error::StoreError;

/// Store facts a migration may depend on.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MigrationContext {
    /// Embedding dimensions when semantic indexing is configured.
    pub dims: Option<usize>,
}

/// One schema migration. `sql` may contain `{name}` placeholders resolved
/// from `params` against the [`MigrationContext`] just before execution.
pub(crate) struct Migration {
    sql: &'static str,
    condition: Option<fn(&MigrationContext) -> bool>,
    params: &'static [(&'static str, fn(&MigrationContext) -> String)],
}

impl Migration {
    const fn literal(sql: &'static str) -> Self {
        Self {
            sql,
            condition: None,
            params: &[],
        }
    }

    const fn conditional(
        sql: &'static str,
        condition: fn(&MigrationContext) -> bool,
        params: &'static [(&'static str, fn(&MigrationContext) -> String)],
    ) -> Self {
        Self {
            sql,
            condition: Some(condition),
            params,
        }
    }
}

fn indexing_enabled(ctx: &MigrationContext) -> bool {
    ctx.dims.is_some()
}

fn dims_param(ctx: &MigrationContext) -> String {
    ctx.dims.unwrap_or_default().to_string()
}

pub(crate) const MIGRATIONS: &[Migration] = &[
    Migration::literal(
        "CREATE TABLE IF NOT EXISTS store (
            prefix TEXT NOT NULL,
            key TEXT NOT NULL,
            value JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            PRIMARY KEY (prefix, key)
        )",
    ),
    Migration::literal(
        "CREATE INDEX IF NOT EXISTS store_prefix_idx \
         ON store USING btree (prefix text_pattern_ops)",
    ),
    Migration::conditional("CREATE EXTENSION IF NOT EXISTS vector", indexing_enabled, &[]),
    Migration::conditional(
        "CREATE TABLE IF NOT EXISTS store_vectors (
            prefix TEXT NOT NULL,
            key TEXT NOT NULL,
            field_name TEXT NOT NULL,
            embedding VECTOR({dims}),
            PRIMARY KEY (prefix, key, field_name),
            FOREIGN KEY (prefix, key) REFERENCES store (prefix, key) ON DELETE CASCADE
        )",
        indexing_enabled,
        &[("dims", dims_param)],
    ),
    Migration::conditional(
        "CREATE INDEX IF NOT EXISTS store_vectors_prefix_idx \
         ON store_vectors USING btree (prefix text_pattern_ops)",
        indexing_enabled,
        &[],
    ),
];

/// Substitutes `{name}` placeholders from the migration's param table.
fn render_sql(migration: &Migration, ctx: &MigrationContext) -> String {
    let mut sql = migration.sql.to_string();
    for (name, resolve) in migration.params {
        sql = sql.replace(&format!("{{{}}}", name), &resolve(ctx));
    }
    sql
}

/// Applies every pending migration. Must run before the first batch against
/// a fresh database.
pub(crate) async fn run_migrations(
    client: &Client,
    ctx: &MigrationContext,
) -> Result<(), StoreError> {
    let version: i64 = match client
        .query_opt("SELECT v FROM store_migrations ORDER BY v DESC LIMIT 1", &[])
        .await
    {
        Ok(Some(row)) => row.try_get::<_, i32>(0)? as i64,
        Ok(None) => -1,
        Err(e) if e.code() == Some(&SqlState::UNDEFINED_TABLE) => {
            client
                .batch_execute("CREATE TABLE IF NOT EXISTS store_migrations (v INTEGER PRIMARY KEY)")
                .await?;
            -1
        }
        Err(e) => return Err(e.into()),
    };

    for (v, migration) in MIGRATIONS
        .iter()
        .enumerate()
        .skip((version + 1).max(0) as usize)
    {
        if let Some(condition) = migration.condition {
            if !condition(ctx) {
                continue;
            }
        }
        let sql = render_sql(migration, ctx);
        tracing::debug!(version = v, "applying store migration");
        client
            .batch_execute(&sql)
            .await
            .map_err(|e| StoreError::Migration { version: v, source: e })?;
        client
            .execute("INSERT INTO store_migrations (v) VALUES ($1)", &[&(v as i32)])
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_migrations_are_conditional() {
        let without = MigrationContext { dims: None };
        let with = MigrationContext { dims: Some(1536) };
        let conditional: Vec<&Migration> = MIGRATIONS
            .iter()
            .filter(|m| m.condition.is_some())
            .collect();
        assert_eq!(conditional.len(), 3);
        for migration in conditional {
            let condition = migration.condition.unwrap();
            assert!(!condition(&without));
            assert!(condition(&with));
        }
    }

    /// **Scenario**: `{dims}` in the vector table DDL renders to the
    /// configured dimension count.
    #[test]
    fn dims_placeholder_renders() {
        let ctx = MigrationContext { dims: Some(384) };
        let vector_table = MIGRATIONS
            .iter()
            .find(|m| m.sql.contains("{dims}"))
            .expect("vector table migration present");
        let sql = render_sql(vector_table, &ctx);
        assert!(sql.contains("VECTOR(384)"), "{}", sql);
        assert!(!sql.contains("{dims}"));
    }

    #[test]
    fn literal_migrations_render_unchanged() {
        let ctx = MigrationContext { dims: None };
        assert_eq!(render_sql(&MIGRATIONS[0], &ctx), MIGRATIONS[0].sql);
    }
}
