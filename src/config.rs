use std::path::PathBuf;

pub const ENV_WORKSPACE: &str = "GRADEBOOKD_WORKSPACE";
pub const ENV_ADMIN_USER: &str = "GRADEBOOKD_ADMIN_USER";
pub const ENV_ADMIN_PASSWORD: &str = "GRADEBOOKD_ADMIN_PASSWORD";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

/// Start-up configuration, read once from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Workspace opened before the first request, if any.
    pub workspace: Option<PathBuf>,
    /// Admin account ensured on every workspace open.
    pub bootstrap_admin: Option<AdminCredentials>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());

        let workspace = non_empty(ENV_WORKSPACE).map(PathBuf::from);
        let bootstrap_admin = match (non_empty(ENV_ADMIN_USER), non_empty(ENV_ADMIN_PASSWORD)) {
            (Some(username), Some(password)) => Some(AdminCredentials {
                username: username.trim().to_string(),
                password,
            }),
            (Some(_), None) => {
                log::warn!(
                    "{} is set without {}; no admin account will be bootstrapped",
                    ENV_ADMIN_USER,
                    ENV_ADMIN_PASSWORD
                );
                None
            }
            _ => None,
        };

        Config {
            workspace,
            bootstrap_admin,
        }
    }
}
