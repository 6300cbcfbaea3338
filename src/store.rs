//! Tenant-keyed snapshot persistence.
//!
//! Every read and write names a tenant explicitly. Callers get a `TenantId`
//! only from an authenticated session, so one account's classes and
//! students are never addressed by another's requests.

use crate::model::{SchoolClass, SchoolSettings, Student};
use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub type Snapshot = serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(username: &str) -> Self {
        TenantId(username.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    Classes,
    Students,
    Settings,
}

impl SnapshotKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotKind::Classes => "classes",
            SnapshotKind::Students => "students",
            SnapshotKind::Settings => "settings",
        }
    }
}

pub trait SnapshotStore {
    fn get(&self, tenant: &TenantId, kind: SnapshotKind) -> anyhow::Result<Option<Snapshot>>;
    fn put(&self, tenant: &TenantId, kind: SnapshotKind, snapshot: &Snapshot)
        -> anyhow::Result<()>;
    /// Drops every snapshot of the tenant. Returns the number removed.
    fn delete_tenant(&self, tenant: &TenantId) -> anyhow::Result<usize>;
}

pub struct SqliteStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl SnapshotStore for SqliteStore<'_> {
    fn get(&self, tenant: &TenantId, kind: SnapshotKind) -> anyhow::Result<Option<Snapshot>> {
        let body: Option<String> = self
            .conn
            .query_row(
                "SELECT body FROM snapshots WHERE tenant_id = ? AND kind = ?",
                (tenant.as_str(), kind.as_str()),
                |r| r.get(0),
            )
            .optional()
            .context("failed to read snapshot")?;
        match body {
            Some(text) => {
                let v = serde_json::from_str(&text).with_context(|| {
                    format!("stored {} snapshot is invalid JSON", kind.as_str())
                })?;
                Ok(Some(v))
            }
            None => Ok(None),
        }
    }

    fn put(
        &self,
        tenant: &TenantId,
        kind: SnapshotKind,
        snapshot: &Snapshot,
    ) -> anyhow::Result<()> {
        let body = serde_json::to_string(snapshot).context("failed to serialize snapshot")?;
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO snapshots(tenant_id, kind, body, updated_at)
                 VALUES(?, ?, ?, ?)
                 ON CONFLICT(tenant_id, kind) DO UPDATE SET
                   body = excluded.body,
                   updated_at = excluded.updated_at",
                (tenant.as_str(), kind.as_str(), &body, &now),
            )
            .with_context(|| format!("failed to write {} snapshot", kind.as_str()))?;
        Ok(())
    }

    fn delete_tenant(&self, tenant: &TenantId) -> anyhow::Result<usize> {
        let n = self
            .conn
            .execute("DELETE FROM snapshots WHERE tenant_id = ?", [tenant.as_str()])
            .context("failed to delete tenant snapshots")?;
        Ok(n)
    }
}

fn load<T>(store: &dyn SnapshotStore, tenant: &TenantId, kind: SnapshotKind) -> anyhow::Result<T>
where
    T: DeserializeOwned + Default,
{
    match store.get(tenant, kind)? {
        Some(v) => serde_json::from_value(v)
            .with_context(|| format!("stored {} snapshot has an unexpected shape", kind.as_str())),
        None => Ok(T::default()),
    }
}

fn save<T: Serialize>(
    store: &dyn SnapshotStore,
    tenant: &TenantId,
    kind: SnapshotKind,
    value: &T,
) -> anyhow::Result<()> {
    let v = serde_json::to_value(value).context("failed to serialize snapshot")?;
    store.put(tenant, kind, &v)
}

pub fn load_classes(store: &dyn SnapshotStore, tenant: &TenantId) -> anyhow::Result<Vec<SchoolClass>> {
    load(store, tenant, SnapshotKind::Classes)
}

pub fn save_classes(
    store: &dyn SnapshotStore,
    tenant: &TenantId,
    classes: &[SchoolClass],
) -> anyhow::Result<()> {
    save(store, tenant, SnapshotKind::Classes, &classes)
}

pub fn load_students(store: &dyn SnapshotStore, tenant: &TenantId) -> anyhow::Result<Vec<Student>> {
    load(store, tenant, SnapshotKind::Students)
}

pub fn save_students(
    store: &dyn SnapshotStore,
    tenant: &TenantId,
    students: &[Student],
) -> anyhow::Result<()> {
    save(store, tenant, SnapshotKind::Students, &students)
}

pub fn load_settings(store: &dyn SnapshotStore, tenant: &TenantId) -> anyhow::Result<SchoolSettings> {
    load(store, tenant, SnapshotKind::Settings)
}

pub fn save_settings(
    store: &dyn SnapshotStore,
    tenant: &TenantId,
    settings: &SchoolSettings,
) -> anyhow::Result<()> {
    save(store, tenant, SnapshotKind::Settings, settings)
}

/// Replaces a tenant's classes and students (and settings, when given) in
/// one transaction. Either every snapshot is written or none is.
pub fn replace_roster(
    conn: &Connection,
    tenant: &TenantId,
    classes: &[SchoolClass],
    students: &[Student],
    settings: Option<&SchoolSettings>,
) -> anyhow::Result<()> {
    let tx = conn
        .unchecked_transaction()
        .context("failed to begin roster transaction")?;
    {
        let st = SqliteStore::new(&tx);
        save_students(&st, tenant, students)?;
        save_classes(&st, tenant, classes)?;
        if let Some(settings) = settings {
            save_settings(&st, tenant, settings)?;
        }
    }
    tx.commit().context("failed to commit roster")?;
    Ok(())
}
