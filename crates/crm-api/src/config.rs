//! Environment configuration and store wiring.
//!
//! | Variable | Default |
//! |---|---|
//! | `CRM_LISTEN` | `0.0.0.0:5000` |
//! | `CRM_STORE` | `memory` (`sqlite` needs the `sqlite` feature) |
//! | `CRM_SQLITE_PATH` | `crm.db` |
//! | `CRM_ACTIVITY_LOG` | unset: activity kept in the record store backend |
//! | `CRM_USERS_FILE` | unset: a single built-in administrator |

use crm_service::CrmStores;
use crm_store::{InMemoryUserDirectory, JsonlActivityStore};
use crm_types::{StoreError, User, UserDirectory, UserRole};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub listen: SocketAddr,
    pub store: StoreBackend,
    pub sqlite_path: PathBuf,
    pub activity_log: Option<PathBuf>,
    pub users_file: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid CRM_LISTEN address {0:?}")]
    Listen(String),
    #[error("unknown CRM_STORE backend {0:?} (expected memory or sqlite)")]
    Backend(String),
    #[error("CRM_STORE=sqlite requires building with the sqlite feature")]
    SqliteDisabled,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let listen_raw = var("CRM_LISTEN").unwrap_or_else(|| "0.0.0.0:5000".to_string());
        let listen = listen_raw
            .parse()
            .map_err(|_| ConfigError::Listen(listen_raw.clone()))?;
        let store = match var("CRM_STORE").map(|s| s.to_ascii_lowercase()).as_deref() {
            None | Some("memory") => StoreBackend::Memory,
            Some("sqlite") => StoreBackend::Sqlite,
            Some(other) => return Err(ConfigError::Backend(other.to_string())),
        };
        Ok(Self {
            listen,
            store,
            sqlite_path: var("CRM_SQLITE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("crm.db")),
            activity_log: var("CRM_ACTIVITY_LOG").map(PathBuf::from),
            users_file: var("CRM_USERS_FILE").map(PathBuf::from),
        })
    }

    /// Opens the configured backends.
    pub fn build_stores(&self) -> Result<CrmStores, ConfigError> {
        let users: Arc<dyn UserDirectory> = match &self.users_file {
            Some(path) => Arc::new(InMemoryUserDirectory::from_json_file(path)?),
            None => Arc::new(InMemoryUserDirectory::new([default_admin()])),
        };
        let mut stores = match self.store {
            StoreBackend::Memory => CrmStores::in_memory(users),
            StoreBackend::Sqlite => self.sqlite_stores(users)?,
        };
        if let Some(path) = &self.activity_log {
            stores.activity = Arc::new(JsonlActivityStore::new(path));
        }
        Ok(stores)
    }

    #[cfg(feature = "sqlite")]
    fn sqlite_stores(&self, users: Arc<dyn UserDirectory>) -> Result<CrmStores, ConfigError> {
        let db = Arc::new(crm_store::SqliteStore::new(&self.sqlite_path)?);
        Ok(CrmStores {
            users,
            activity: db.clone(),
            leads: db.clone(),
            contacts: db.clone(),
            deals: db,
        })
    }

    #[cfg(not(feature = "sqlite"))]
    fn sqlite_stores(&self, _users: Arc<dyn UserDirectory>) -> Result<CrmStores, ConfigError> {
        Err(ConfigError::SqliteDisabled)
    }
}

fn default_admin() -> User {
    User {
        id: "admin".to_string(),
        name: "Administrator".to_string(),
        email: "admin@crm.local".to_string(),
        role: UserRole::Admin,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults() {
        let cfg = ApiConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.listen, "0.0.0.0:5000".parse::<SocketAddr>().unwrap());
        assert_eq!(cfg.store, StoreBackend::Memory);
        assert!(cfg.activity_log.is_none());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            ApiConfig::from_lookup(lookup(&[("CRM_LISTEN", "nowhere")])),
            Err(ConfigError::Listen(_))
        ));
        assert!(matches!(
            ApiConfig::from_lookup(lookup(&[("CRM_STORE", "mongo")])),
            Err(ConfigError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn users_file_and_activity_log_are_wired() {
        let dir = tempfile::tempdir().unwrap();
        let users_path = dir.path().join("users.json");
        std::fs::write(
            &users_path,
            r#"[{"id":"u7","name":"Sam","email":"sam@x.io","role":"Agent"}]"#,
        )
        .unwrap();
        let log_path = dir.path().join("activity.jsonl");
        let cfg = ApiConfig::from_lookup(lookup(&[
            ("CRM_USERS_FILE", users_path.to_str().unwrap()),
            ("CRM_ACTIVITY_LOG", log_path.to_str().unwrap()),
        ]))
        .unwrap();
        let stores = cfg.build_stores().unwrap();
        let sam = stores.users.get("u7").await.unwrap().unwrap();
        assert_eq!(sam.role, UserRole::Agent);
        assert!(stores.users.get("admin").await.unwrap().is_none());

        let entry = crm_types::NewActivity::new(
            "u7",
            crm_types::ActivityAction::Login,
            crm_types::ActivityModule::Auth,
        )
        .into_entry("a1".to_string(), chrono::Utc::now());
        stores.activity.append(entry).await.unwrap();
        assert!(log_path.exists());
    }
}
