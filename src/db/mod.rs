mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, ErrorCode, OptionalExtension};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::*;
use crate::store::{check_cancelled, ObjectStore, StoreError};

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("org", "openstack", "dataplane-compute")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        let db_path = dirs.data_dir().join("dataplane.db");
        Self::open(db_path)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        schema::run_migrations(&conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    // ============================================================
    // Node operations
    // ============================================================

    pub fn create_node(&self, input: CreateNodeInput) -> Result<DataPlaneNode> {
        let conn = self.lock()?;
        let uid = Uuid::new_v4();
        let now = Utc::now();
        let status = DataPlaneStatus::default();

        let inserted = conn.execute(
            "INSERT INTO dataplane_nodes (namespace, name, uid, resource_version, labels, status, created_at)
             VALUES (?, ?, ?, 1, '{}', ?, ?)",
            (
                &input.namespace,
                &input.name,
                uid.to_string(),
                serde_json::to_string(&status)?,
                now.to_rfc3339(),
            ),
        );
        match inserted {
            Ok(_) => {}
            Err(e) if constraint_violation(&e) => {
                return Err(
                    StoreError::AlreadyExists(ObjectKey::new(input.namespace, input.name)).into(),
                );
            }
            Err(e) => return Err(e.into()),
        }

        Ok(DataPlaneNode {
            metadata: ObjectMeta {
                uid: Some(uid),
                resource_version: 1,
                creation_timestamp: Some(now),
                ..ObjectMeta::new(input.namespace, input.name)
            },
            status,
        })
    }

    pub fn get_node(&self, key: &ObjectKey) -> Result<Option<DataPlaneNode>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT namespace, name, uid, resource_version, labels, status, created_at
                 FROM dataplane_nodes WHERE namespace = ? AND name = ?",
                (&key.namespace, &key.name),
                NodeRow::from_row,
            )
            .optional()?;

        Ok(row.map(NodeRow::into_node).transpose()?)
    }

    pub fn list_nodes(&self) -> Result<Vec<DataPlaneNode>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT namespace, name, uid, resource_version, labels, status, created_at
             FROM dataplane_nodes ORDER BY namespace, name",
        )?;

        let rows = stmt
            .query_map([], NodeRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .map(NodeRow::into_node)
            .collect::<Result<Vec<_>, _>>()?)
    }

    /// Replace a node's status if it is still at `expected_version`.
    pub fn update_node_status(
        &self,
        key: &ObjectKey,
        status: &DataPlaneStatus,
        expected_version: u64,
    ) -> Result<DataPlaneNode> {
        {
            let conn = self.lock()?;
            let rows = conn.execute(
                "UPDATE dataplane_nodes SET status = ?, resource_version = resource_version + 1
                 WHERE namespace = ? AND name = ? AND resource_version = ?",
                (
                    serde_json::to_string(status)?,
                    &key.namespace,
                    &key.name,
                    expected_version as i64,
                ),
            )?;

            if rows == 0 {
                let found = current_version(&conn, "dataplane_nodes", key)?;
                return Err(StoreError::Conflict {
                    key: key.clone(),
                    expected: expected_version,
                    found,
                }
                .into());
            }
        }

        self.get_node(key)?
            .ok_or_else(|| StoreError::NotFound(key.clone()).into())
    }

    /// Delete a node together with every compute record it controls.
    ///
    /// Returns the number of dependents removed, or `None` if the node does not exist.
    pub fn delete_node(&self, key: &ObjectKey) -> Result<Option<usize>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let uid: Option<String> = tx
            .query_row(
                "SELECT uid FROM dataplane_nodes WHERE namespace = ? AND name = ?",
                (&key.namespace, &key.name),
                |row| row.get(0),
            )
            .optional()?;
        let Some(uid) = uid else {
            return Ok(None);
        };

        let dependents = tx.execute(
            "DELETE FROM external_computes WHERE controller_uid = ?",
            [&uid],
        )?;
        tx.execute(
            "DELETE FROM dataplane_nodes WHERE namespace = ? AND name = ?",
            (&key.namespace, &key.name),
        )?;
        tx.commit()?;

        tracing::info!(node = %key, dependents, "deleted node");
        Ok(Some(dependents))
    }

    // ============================================================
    // ExternalCompute operations
    // ============================================================

    pub fn get_external_compute(
        &self,
        key: &ObjectKey,
    ) -> Result<Option<ExternalCompute>, StoreError> {
        let conn = self.lock()?;
        select_compute(&conn, key)
    }

    pub fn list_external_computes(&self) -> Result<Vec<ExternalCompute>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("{COMPUTE_COLUMNS} ORDER BY namespace, name"))?;

        let rows = stmt
            .query_map([], ComputeRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(ComputeRow::into_compute).collect()
    }

    /// Compute records whose controller is the object with `owner_uid`.
    pub fn list_owned_by(&self, owner_uid: Uuid) -> Result<Vec<ExternalCompute>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{COMPUTE_COLUMNS} WHERE controller_uid = ? ORDER BY namespace, name"
        ))?;

        let rows = stmt
            .query_map([owner_uid.to_string()], ComputeRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(ComputeRow::into_compute).collect()
    }

    /// Replace the status of a compute record if it is still at `expected_version`.
    pub fn update_external_compute_status(
        &self,
        key: &ObjectKey,
        status: &ExternalComputeStatus,
        expected_version: u64,
    ) -> Result<ExternalCompute, StoreError> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE external_computes SET status = ?, resource_version = resource_version + 1
             WHERE namespace = ? AND name = ? AND resource_version = ?",
            (
                serde_json::to_string(status)?,
                &key.namespace,
                &key.name,
                expected_version as i64,
            ),
        )?;

        if rows == 0 {
            return Err(match current_version(&conn, "external_computes", key)? {
                None => StoreError::NotFound(key.clone()),
                found => StoreError::Conflict {
                    key: key.clone(),
                    expected: expected_version,
                    found,
                },
            });
        }

        select_compute(&conn, key)?.ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    /// Create or compare-and-swap a compute record, returning the row as stored.
    ///
    /// The read-back happens under the same lock as the write.
    fn write_external_compute(
        &self,
        record: &ExternalCompute,
    ) -> Result<ExternalCompute, StoreError> {
        let conn = self.lock()?;
        let meta = &record.metadata;
        let key = meta.key();
        let labels = serde_json::to_string(&meta.labels)?;
        let owner_references = serde_json::to_string(&meta.owner_references)?;
        let controller_uid = meta.controller().map(|r| r.uid.to_string());
        let spec = serde_json::to_string(&record.spec)?;

        if meta.resource_version == 0 {
            let status = serde_json::to_string(&ExternalComputeStatus::default())?;
            let inserted = conn.execute(
                "INSERT INTO external_computes
                 (namespace, name, uid, resource_version, labels, owner_references, controller_uid, spec, status, created_at)
                 VALUES (?, ?, ?, 1, ?, ?, ?, ?, ?, ?)",
                (
                    &meta.namespace,
                    &meta.name,
                    Uuid::new_v4().to_string(),
                    &labels,
                    &owner_references,
                    &controller_uid,
                    &spec,
                    &status,
                    Utc::now().to_rfc3339(),
                ),
            );
            match inserted {
                Ok(_) => {}
                Err(e) if constraint_violation(&e) => return Err(StoreError::AlreadyExists(key)),
                Err(e) => return Err(e.into()),
            }
        } else {
            let rows = conn.execute(
                "UPDATE external_computes
                 SET labels = ?, owner_references = ?, controller_uid = ?, spec = ?,
                     resource_version = resource_version + 1
                 WHERE namespace = ? AND name = ? AND resource_version = ?",
                (
                    &labels,
                    &owner_references,
                    &controller_uid,
                    &spec,
                    &meta.namespace,
                    &meta.name,
                    meta.resource_version as i64,
                ),
            )?;

            if rows == 0 {
                let found = current_version(&conn, "external_computes", &key)?;
                return Err(StoreError::Conflict {
                    key,
                    expected: meta.resource_version,
                    found,
                });
            }
        }

        select_compute(&conn, &key)?.ok_or(StoreError::NotFound(key))
    }
}

#[async_trait]
impl ObjectStore for Database {
    async fn fetch(
        &self,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<Option<ExternalCompute>, StoreError> {
        check_cancelled(cancel)?;
        self.get_external_compute(key)
    }

    async fn write(
        &self,
        record: ExternalCompute,
        cancel: &CancellationToken,
    ) -> Result<ExternalCompute, StoreError> {
        check_cancelled(cancel)?;
        self.write_external_compute(&record)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

const COMPUTE_COLUMNS: &str =
    "SELECT namespace, name, uid, resource_version, labels, owner_references, spec, status, created_at
     FROM external_computes";

struct NodeRow {
    namespace: String,
    name: String,
    uid: String,
    resource_version: i64,
    labels: String,
    status: String,
    created_at: String,
}

impl NodeRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            namespace: row.get(0)?,
            name: row.get(1)?,
            uid: row.get(2)?,
            resource_version: row.get(3)?,
            labels: row.get(4)?,
            status: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn into_node(self) -> Result<DataPlaneNode, StoreError> {
        Ok(DataPlaneNode {
            metadata: ObjectMeta {
                name: self.name,
                namespace: self.namespace,
                uid: Some(parse_uuid(self.uid)),
                resource_version: self.resource_version as u64,
                labels: serde_json::from_str(&self.labels)?,
                owner_references: Vec::new(),
                creation_timestamp: Some(parse_datetime(self.created_at)),
            },
            status: serde_json::from_str(&self.status)?,
        })
    }
}

struct ComputeRow {
    namespace: String,
    name: String,
    uid: String,
    resource_version: i64,
    labels: String,
    owner_references: String,
    spec: String,
    status: String,
    created_at: String,
}

impl ComputeRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            namespace: row.get(0)?,
            name: row.get(1)?,
            uid: row.get(2)?,
            resource_version: row.get(3)?,
            labels: row.get(4)?,
            owner_references: row.get(5)?,
            spec: row.get(6)?,
            status: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn into_compute(self) -> Result<ExternalCompute, StoreError> {
        Ok(ExternalCompute {
            metadata: ObjectMeta {
                name: self.name,
                namespace: self.namespace,
                uid: Some(parse_uuid(self.uid)),
                resource_version: self.resource_version as u64,
                labels: serde_json::from_str(&self.labels)?,
                owner_references: serde_json::from_str(&self.owner_references)?,
                creation_timestamp: Some(parse_datetime(self.created_at)),
            },
            spec: serde_json::from_str(&self.spec)?,
            status: serde_json::from_str(&self.status)?,
        })
    }
}

fn select_compute(
    conn: &Connection,
    key: &ObjectKey,
) -> Result<Option<ExternalCompute>, StoreError> {
    let row = conn
        .query_row(
            &format!("{COMPUTE_COLUMNS} WHERE namespace = ? AND name = ?"),
            (&key.namespace, &key.name),
            ComputeRow::from_row,
        )
        .optional()?;

    row.map(ComputeRow::into_compute).transpose()
}

fn current_version(
    conn: &Connection,
    table: &str,
    key: &ObjectKey,
) -> Result<Option<u64>, StoreError> {
    let version: Option<i64> = conn
        .query_row(
            &format!("SELECT resource_version FROM {table} WHERE namespace = ? AND name = ?"),
            (&key.namespace, &key.name),
            |row| row.get(0),
        )
        .optional()?;
    Ok(version.map(|v| v as u64))
}

fn constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
