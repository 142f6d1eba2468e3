use std::collections::BTreeSet;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::Connection;

struct Migration {
    version: &'static str,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "001",
        name: "initial",
        sql: include_str!("migrations/001_initial.sql"),
    },
    Migration {
        version: "002",
        name: "owner_index",
        sql: include_str!("migrations/002_owner_index.sql"),
    },
];

/// Bring `conn` up to the latest schema. Already-applied versions are skipped.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
    )
    .context("creating schema_migrations")?;

    let applied = applied_versions(conn)?;
    MIGRATIONS
        .iter()
        .filter(|m| !applied.contains(m.version))
        .try_for_each(|m| apply_migration(conn, m))
}

fn applied_versions(conn: &Connection) -> Result<BTreeSet<String>> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations")?;
    let versions = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<BTreeSet<String>>>()?;
    Ok(versions)
}

/// Run one migration and record it, both in a single transaction.
fn apply_migration(conn: &Connection, migration: &Migration) -> Result<()> {
    let label = format!("{}_{}", migration.version, migration.name);

    conn.execute_batch("BEGIN")?;
    let applied = conn.execute_batch(migration.sql).and_then(|()| {
        conn.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?, ?, ?)",
            (migration.version, migration.name, Utc::now().to_rfc3339()),
        )
    });
    match applied {
        Ok(_) => conn.execute_batch("COMMIT")?,
        Err(e) => {
            conn.execute_batch("ROLLBACK")?;
            return Err(e).with_context(|| format!("applying migration {label}"));
        }
    }

    tracing::info!(migration = %label, "schema migrated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
                [name],
                |row| row.get(0),
            )
            .unwrap();
        count == 1
    }

    #[test]
    fn test_migrations_run_on_fresh_db() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        assert!(table_exists(&conn, "dataplane_nodes"));
        assert!(table_exists(&conn, "external_computes"));

        let versions: Vec<_> = applied_versions(&conn).unwrap().into_iter().collect();
        assert_eq!(versions, vec!["001", "002"]);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let versions: Vec<_> = applied_versions(&conn).unwrap().into_iter().collect();
        assert_eq!(versions, vec!["001", "002"]);
    }

    #[test]
    fn test_owner_index_backfills_controller_uid() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE schema_migrations (version TEXT PRIMARY KEY, name TEXT NOT NULL, applied_at TEXT NOT NULL);",
        )
        .unwrap();
        apply_migration(&conn, &MIGRATIONS[0]).unwrap();

        conn.execute(
            "INSERT INTO external_computes
             (namespace, name, uid, resource_version, labels, owner_references, spec, status, created_at)
             VALUES ('ns', 'edpm-0', 'u-1', 1, '{}', ?, '{}', '{}', '2024-01-01T00:00:00Z')",
            [r#"[{"apiVersion":"v1","kind":"Node","name":"edpm-0","uid":"owner-1","controller":true}]"#],
        )
        .unwrap();

        run_migrations(&conn).unwrap();

        let controller: Option<String> = conn
            .query_row(
                "SELECT controller_uid FROM external_computes WHERE name = 'edpm-0'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(controller.as_deref(), Some("owner-1"));
    }

    #[test]
    fn test_failed_migration_is_not_recorded() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        let broken = Migration {
            version: "999",
            name: "broken",
            sql: "CREATE TABLE half_done (id INTEGER); SELECT * FROM no_such_table;",
        };

        assert!(apply_migration(&conn, &broken).is_err());

        assert!(!table_exists(&conn, "half_done"));
        assert!(!applied_versions(&conn).unwrap().contains("999"));
    }
}
