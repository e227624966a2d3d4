use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;

use al_core::core::{ApiKey, AuthService, UserId, UserInfo};
use al_store::SqliteAnnotationStore;
use anyhow::{ensure, Context};

use crate::config::AppConfig;

const LOG_FORMATS: [&str; 2] = ["json", "pretty"];

// ---------------------------------------------------------------------------
// StorageTarget: where the annotation database lives
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageTarget {
    Memory,
    File(PathBuf),
}

impl StorageTarget {
    fn parse(path: &str) -> Self {
        if path == ":memory:" {
            Self::Memory
        } else {
            Self::File(PathBuf::from(path))
        }
    }

    /// Opens the store and applies the schema.
    pub fn open(&self) -> Result<SqliteAnnotationStore, anyhow::Error> {
        let store = match self {
            Self::Memory => SqliteAnnotationStore::new_in_memory()?,
            Self::File(path) => SqliteAnnotationStore::new(path)
                .with_context(|| format!("opening database {}", path.display()))?,
        };
        store.init()?;
        Ok(store)
    }
}

// ---------------------------------------------------------------------------
// RuntimeConfig: fully validated runtime configuration
// ---------------------------------------------------------------------------

pub struct RuntimeConfig {
    pub auth_service: AuthService,
    pub listen_addr: SocketAddr,
    pub storage: StorageTarget,
    pub seed: Option<u64>,
    pub log_level: String,
    pub log_format: String,
}

// ---------------------------------------------------------------------------
// into_runtime: converts raw AppConfig into validated RuntimeConfig
// ---------------------------------------------------------------------------

pub fn into_runtime(config: AppConfig) -> Result<RuntimeConfig, anyhow::Error> {
    ensure!(!config.users.is_empty(), "at least one user required");

    let mut seen_users = HashSet::with_capacity(config.users.len());
    let mut seen_keys = HashSet::with_capacity(config.users.len());
    for user in &config.users {
        ensure!(!user.id.is_empty(), "user id must not be empty");
        ensure!(
            !user.api_key.is_empty(),
            "user {} has an empty api_key",
            user.id
        );
        ensure!(seen_users.insert(&user.id), "duplicate user id: {}", user.id);
        ensure!(
            seen_keys.insert(&user.api_key),
            "duplicate api_key for user {}",
            user.id
        );
    }

    let listen_addr: SocketAddr = config
        .server
        .listen
        .parse()
        .with_context(|| format!("invalid listen address: {}", config.server.listen))?;

    ensure!(
        LOG_FORMATS.contains(&config.logging.format.as_str()),
        "unknown log format: {} (expected json or pretty)",
        config.logging.format
    );

    let entries: Vec<(ApiKey, UserInfo)> = config
        .users
        .into_iter()
        .map(|u| {
            let info = UserInfo {
                id: UserId::new(u.id),
                admin: u.admin,
            };
            (ApiKey::new(u.api_key), info)
        })
        .collect();

    Ok(RuntimeConfig {
        auth_service: AuthService::new(entries),
        listen_addr,
        storage: StorageTarget::parse(&config.storage.path),
        seed: config.models.seed,
        log_level: config.logging.level,
        log_format: config.logging.format,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
