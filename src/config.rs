//! Server configuration from environment variables.
//!
//! The storage backend is part of configuration: a file path for normal
//! operation, or in-memory for throwaway instances. There is no
//! hardcoded development flag.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;

#[derive(Debug, Clone)]
pub enum StorageBackend {
    File(PathBuf),
    InMemory,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub storage: StorageBackend,
    pub token_secret: String,
    pub token_ttl_secs: i64,
    pub busy_timeout_ms: u64,
}

const DEFAULT_BIND: &str = "127.0.0.1:8080";
const DEFAULT_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

impl ServerConfig {
    /// Environment variables: `SAFE_BIND`, `SAFE_STORAGE`
    /// (`memory` or a database file path), `SAFE_TOKEN_SECRET`,
    /// `SAFE_TOKEN_TTL_SECS`, `SAFE_BUSY_TIMEOUT_MS`.
    pub fn from_env() -> Self {
        let bind_addr = env::var("SAFE_BIND")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| DEFAULT_BIND.parse().expect("default bind address"));

        let storage = match env::var("SAFE_STORAGE").ok().as_deref() {
            Some("memory") => StorageBackend::InMemory,
            Some(path) => StorageBackend::File(PathBuf::from(path)),
            None => StorageBackend::File(default_db_path()),
        };

        let token_secret = env::var("SAFE_TOKEN_SECRET").unwrap_or_else(|_| {
            tracing::warn!(
                "SAFE_TOKEN_SECRET not set; using a random secret, sessions will not survive a restart"
            );
            random_secret()
        });

        let token_ttl_secs = env::var("SAFE_TOKEN_TTL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TOKEN_TTL_SECS);

        let busy_timeout_ms = env::var("SAFE_BUSY_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_BUSY_TIMEOUT_MS);

        Self {
            bind_addr,
            storage,
            token_secret,
            token_ttl_secs,
            busy_timeout_ms,
        }
    }

    /// In-memory storage with a fixed secret, for tests.
    pub fn for_tests() -> Self {
        Self {
            bind_addr: DEFAULT_BIND.parse().expect("default bind address"),
            storage: StorageBackend::InMemory,
            token_secret: "test-secret".into(),
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("safe-health")
        .join("safe.db")
}

fn random_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_secrets_differ() {
        assert_ne!(random_secret(), random_secret());
    }

    #[test]
    fn test_config_is_in_memory() {
        let config = ServerConfig::for_tests();
        assert!(matches!(config.storage, StorageBackend::InMemory));
        assert_eq!(config.busy_timeout_ms, 5000);
    }
}
