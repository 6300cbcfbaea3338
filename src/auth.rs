use crate::store::{SnapshotStore, SqliteStore, TenantId};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Months, NaiveDate};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DEFAULT_MAX_CLASSES: u32 = 5;
pub const DEFAULT_MAX_STUDENTS_PER_CLASS: u32 = 100;
const ADMIN_LIMIT: u32 = 9999;
const ADMIN_EXPIRY: &str = "2099-12-31";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    fn parse(s: &str) -> Role {
        if s == "admin" {
            Role::Admin
        } else {
            Role::User
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionLimits {
    pub max_classes: u32,
    pub max_students_per_class: u32,
    pub expiry_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub username: String,
    pub role: Role,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub school_name: Option<String>,
    pub limits: SubscriptionLimits,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn tenant(&self) -> TenantId {
        TenantId::new(&self.username)
    }

    /// Admins are unlimited.
    pub fn may_hold_classes(&self, count: usize) -> bool {
        self.is_admin() || count <= self.limits.max_classes as usize
    }

    pub fn may_hold_students(&self, count: usize) -> bool {
        self.is_admin() || count <= self.limits.max_students_per_class as usize
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub school_name: Option<String>,
    pub expiry_date: Option<String>,
    pub max_classes: Option<u32>,
    pub max_students_per_class: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct AuthError {
    pub code: &'static str,
    pub message: String,
}

impl AuthError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for AuthError {
    fn from(e: rusqlite::Error) -> Self {
        AuthError::new("db_query_failed", e.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(e: anyhow::Error) -> Self {
        AuthError::new("db_query_failed", format!("{e:#}"))
    }
}

pub fn parse_date(s: &str) -> Result<NaiveDate, AuthError> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|_| AuthError::new("bad_params", format!("invalid date (want YYYY-MM-DD): {}", s)))
}

pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn one_year_after(d: NaiveDate) -> NaiveDate {
    d.checked_add_months(Months::new(12)).unwrap_or(d)
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthError::new("hash_failed", e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

const USER_COLUMNS: &str =
    "username, role, is_active, school_name, max_classes, max_students_per_class, expiry_date";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let role: String = row.get(1)?;
    let active: i64 = row.get(2)?;
    let max_classes: i64 = row.get(4)?;
    let max_students: i64 = row.get(5)?;
    Ok(User {
        username: row.get(0)?,
        role: Role::parse(&role),
        is_active: active != 0,
        school_name: row.get(3)?,
        limits: SubscriptionLimits {
            max_classes: max_classes.max(0) as u32,
            max_students_per_class: max_students.max(0) as u32,
            expiry_date: row.get(6)?,
        },
    })
}

pub fn get_user(conn: &Connection, username: &str) -> Result<Option<User>, AuthError> {
    let sql = format!("SELECT {} FROM users WHERE username = ?", USER_COLUMNS);
    Ok(conn
        .query_row(&sql, [username], user_from_row)
        .optional()?)
}

fn require_user(conn: &Connection, username: &str) -> Result<User, AuthError> {
    get_user(conn, username)?
        .ok_or_else(|| AuthError::new("not_found", format!("user not found: {}", username)))
}

pub fn list_users(conn: &Connection) -> Result<Vec<User>, AuthError> {
    let sql = format!("SELECT {} FROM users ORDER BY username", USER_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let users = stmt
        .query_map([], user_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

fn insert_user(conn: &Connection, user: &User, password: &str) -> Result<(), AuthError> {
    let hash = hash_password(password)?;
    conn.execute(
        "INSERT INTO users(username, password_hash, role, is_active, school_name,
                           max_classes, max_students_per_class, expiry_date, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &user.username,
            &hash,
            user.role.as_str(),
            if user.is_active { 1 } else { 0 },
            &user.school_name,
            user.limits.max_classes as i64,
            user.limits.max_students_per_class as i64,
            &user.limits.expiry_date,
            chrono::Utc::now().to_rfc3339(),
        ),
    )?;
    Ok(())
}

/// Provision a subscriber account.
pub fn create_user(conn: &Connection, new: NewUser, today: NaiveDate) -> Result<User, AuthError> {
    let username = new.username.trim().to_string();
    if username.is_empty() {
        return Err(AuthError::new("bad_params", "username must not be empty"));
    }
    if new.password.is_empty() {
        return Err(AuthError::new("bad_params", "password must not be empty"));
    }
    if get_user(conn, &username)?.is_some() {
        return Err(AuthError::new(
            "duplicate_username",
            format!("username already exists: {}", username),
        ));
    }

    let expiry = match new.expiry_date.as_deref() {
        Some(s) if !s.trim().is_empty() => parse_date(s)?,
        _ => one_year_after(today),
    };

    let user = User {
        username,
        role: Role::User,
        is_active: true,
        school_name: new
            .school_name
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        limits: SubscriptionLimits {
            max_classes: new.max_classes.unwrap_or(DEFAULT_MAX_CLASSES),
            max_students_per_class: new
                .max_students_per_class
                .unwrap_or(DEFAULT_MAX_STUDENTS_PER_CLASS),
            expiry_date: expiry.format(DATE_FORMAT).to_string(),
        },
    };
    insert_user(conn, &user, &new.password)?;
    Ok(user)
}

/// Create the configured admin account if it does not exist yet. An
/// existing account keeps its password. Returns true when created.
pub fn ensure_admin(conn: &Connection, username: &str, password: &str) -> Result<bool, AuthError> {
    if get_user(conn, username)?.is_some() {
        return Ok(false);
    }
    let admin = User {
        username: username.to_string(),
        role: Role::Admin,
        is_active: true,
        school_name: None,
        limits: SubscriptionLimits {
            max_classes: ADMIN_LIMIT,
            max_students_per_class: ADMIN_LIMIT,
            expiry_date: ADMIN_EXPIRY.to_string(),
        },
    };
    insert_user(conn, &admin, password)?;
    Ok(true)
}

/// Check credentials, then account state. A subscription is valid through
/// its expiry date and lapses the day after.
pub fn login(
    conn: &Connection,
    username: &str,
    password: &str,
    today: NaiveDate,
) -> Result<User, AuthError> {
    let invalid = || AuthError::new("invalid_credentials", "wrong username or password");

    let hash: Option<String> = conn
        .query_row(
            "SELECT password_hash FROM users WHERE username = ?",
            [username],
            |r| r.get(0),
        )
        .optional()?;
    let Some(hash) = hash else {
        return Err(invalid());
    };
    if !verify_password(password, &hash) {
        return Err(invalid());
    }

    let user = require_user(conn, username)?;
    if !user.is_active {
        return Err(AuthError::new("account_disabled", "this account has been disabled"));
    }
    if !user.is_admin() {
        let expiry = parse_date(&user.limits.expiry_date)?;
        if expiry < today {
            return Err(AuthError::new(
                "subscription_expired",
                format!("subscription expired on {}", user.limits.expiry_date),
            ));
        }
    }
    Ok(user)
}

/// Remove the account and every snapshot it owns.
pub fn delete_user(conn: &Connection, username: &str) -> Result<usize, AuthError> {
    let user = require_user(conn, username)?;
    let tx = conn.unchecked_transaction()?;
    let removed = SqliteStore::new(&tx).delete_tenant(&user.tenant())?;
    tx.execute("DELETE FROM users WHERE username = ?", [username])?;
    tx.commit()?;
    Ok(removed)
}

pub fn toggle_active(conn: &Connection, username: &str) -> Result<User, AuthError> {
    let user = require_user(conn, username)?;
    conn.execute(
        "UPDATE users SET is_active = ? WHERE username = ?",
        (if user.is_active { 0 } else { 1 }, username),
    )?;
    require_user(conn, username)
}

pub fn extend_subscription(
    conn: &Connection,
    username: &str,
    expiry_date: &str,
) -> Result<User, AuthError> {
    let expiry = parse_date(expiry_date)?;
    require_user(conn, username)?;
    conn.execute(
        "UPDATE users SET expiry_date = ? WHERE username = ?",
        (expiry.format(DATE_FORMAT).to_string(), username),
    )?;
    require_user(conn, username)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::store::SnapshotKind;
    use serde_json::json;

    fn memory_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open memory db");
        db::init_schema(&conn).expect("init schema");
        conn
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).expect("date")
    }

    fn new_user(name: &str, expiry: Option<&str>) -> NewUser {
        NewUser {
            username: name.into(),
            password: "secret".into(),
            expiry_date: expiry.map(|s| s.to_string()),
            ..NewUser::default()
        }
    }

    #[test]
    fn password_hash_verifies() {
        let h = hash_password("pw").expect("hash");
        assert!(h.starts_with("$argon2"));
        assert!(verify_password("pw", &h));
        assert!(!verify_password("nope", &h));
        assert!(!verify_password("pw", "not-a-hash"));
    }

    #[test]
    fn create_applies_defaults_and_rejects_duplicates() {
        let conn = memory_conn();
        let u = create_user(&conn, new_user("huda", None), day("2024-02-29")).expect("create");
        assert_eq!(u.role, Role::User);
        assert!(u.is_active);
        assert_eq!(u.limits.max_classes, DEFAULT_MAX_CLASSES);
        assert_eq!(u.limits.max_students_per_class, DEFAULT_MAX_STUDENTS_PER_CLASS);
        assert_eq!(u.limits.expiry_date, "2025-02-28");

        let dup = create_user(&conn, new_user("huda", None), day("2024-01-01")).unwrap_err();
        assert_eq!(dup.code, "duplicate_username");

        let bad = create_user(&conn, new_user("x", Some("31/12/2030")), day("2024-01-01"))
            .unwrap_err();
        assert_eq!(bad.code, "bad_params");
    }

    #[test]
    fn login_checks_password_status_and_expiry() {
        let conn = memory_conn();
        create_user(&conn, new_user("huda", Some("2025-06-30")), day("2025-01-01")).expect("create");

        assert_eq!(
            login(&conn, "huda", "wrong", day("2025-01-01")).unwrap_err().code,
            "invalid_credentials"
        );
        assert_eq!(
            login(&conn, "nobody", "secret", day("2025-01-01")).unwrap_err().code,
            "invalid_credentials"
        );
        assert!(login(&conn, "huda", "secret", day("2025-06-30")).is_ok());
        assert_eq!(
            login(&conn, "huda", "secret", day("2025-07-01")).unwrap_err().code,
            "subscription_expired"
        );

        toggle_active(&conn, "huda").expect("disable");
        assert_eq!(
            login(&conn, "huda", "secret", day("2025-01-01")).unwrap_err().code,
            "account_disabled"
        );

        toggle_active(&conn, "huda").expect("enable");
        extend_subscription(&conn, "huda", "2026-06-30").expect("extend");
        assert!(login(&conn, "huda", "secret", day("2026-01-01")).is_ok());
    }

    #[test]
    fn bootstrap_admin_is_created_once() {
        let conn = memory_conn();
        assert!(ensure_admin(&conn, "root", "pw1").expect("first"));
        assert!(!ensure_admin(&conn, "root", "pw2").expect("second"));
        let admin = login(&conn, "root", "pw1", day("2100-06-01")).expect("admin login");
        assert!(admin.is_admin());
        assert!(admin.may_hold_classes(100_000));
    }

    #[test]
    fn delete_removes_tenant_snapshots() {
        let conn = memory_conn();
        let u = create_user(&conn, new_user("huda", None), day("2025-01-01")).expect("create");
        let store = SqliteStore::new(&conn);
        store
            .put(&u.tenant(), SnapshotKind::Classes, &json!([]))
            .expect("put");
        store
            .put(&u.tenant(), SnapshotKind::Students, &json!([]))
            .expect("put");

        assert_eq!(delete_user(&conn, "huda").expect("delete"), 2);
        assert!(get_user(&conn, "huda").expect("get").is_none());
        assert_eq!(delete_user(&conn, "huda").unwrap_err().code, "not_found");
    }

    #[test]
    fn limits_apply_to_plain_users() {
        let conn = memory_conn();
        let mut n = new_user("huda", None);
        n.max_classes = Some(2);
        n.max_students_per_class = Some(3);
        let u = create_user(&conn, n, day("2025-01-01")).expect("create");
        assert!(u.may_hold_classes(2));
        assert!(!u.may_hold_classes(3));
        assert!(u.may_hold_students(3));
        assert!(!u.may_hold_students(4));
    }
}
