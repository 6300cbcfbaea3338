use crate::auth::Role;
use crate::config::Config;
use crate::store::TenantId;
use rusqlite::Connection;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// The logged-in account. One session at a time per sidecar.
#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub role: Role,
}

impl Session {
    pub fn tenant(&self) -> TenantId {
        TenantId::new(&self.username)
    }
}

pub struct AppState {
    pub config: Config,
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub session: Option<Session>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            workspace: None,
            db: None,
            session: None,
        }
    }
}
