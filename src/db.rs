use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "gradebook.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            username TEXT PRIMARY KEY,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL,
            is_active INTEGER NOT NULL,
            school_name TEXT,
            max_classes INTEGER NOT NULL,
            max_students_per_class INTEGER NOT NULL,
            expiry_date TEXT NOT NULL,
            created_at TEXT
        )",
        [],
    )?;

    // Not tied to users by a foreign key: deleting an account removes its
    // snapshots explicitly (see auth::delete_user).
    conn.execute(
        "CREATE TABLE IF NOT EXISTS snapshots(
            tenant_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            body TEXT NOT NULL,
            updated_at TEXT,
            PRIMARY KEY(tenant_id, kind)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_snapshots_tenant ON snapshots(tenant_id)",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent() {
        let conn = Connection::open_in_memory().expect("open memory db");
        init_schema(&conn).expect("first init");
        init_schema(&conn).expect("second init");
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('users', 'snapshots')",
                [],
                |r| r.get(0),
            )
            .expect("count tables");
        assert_eq!(n, 2);
    }
}
