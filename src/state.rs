use std::sync::Arc;

use sqlx::SqlitePool;

use crate::auth::{jwt::JwtKeys, password::Hasher};
use crate::config::AppConfig;
use crate::db;

/// Process-wide dependencies, built once at startup and read-only afterwards.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<AppConfig>,
    pub keys: JwtKeys,
    pub hasher: Hasher,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;
        let db = db::connect(&config.database_url).await?;
        Self::from_parts(db, config)
    }

    pub fn from_parts(db: SqlitePool, config: AppConfig) -> anyhow::Result<Self> {
        let keys = JwtKeys::new(&config.jwt);
        let hasher = Hasher::new(&config.password)?;
        Ok(Self {
            db,
            config: Arc::new(config),
            keys,
            hasher,
        })
    }

    /// In-memory state with cheap hashing for tests.
    #[cfg(test)]
    pub async fn fake() -> Self {
        use crate::config::{AdminSeed, JwtConfig, PasswordConfig};

        let config = AppConfig {
            host: "127.0.0.1".into(),
            port: 0,
            database_url: "sqlite::memory:".into(),
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
            },
            password: PasswordConfig {
                memory_kib: 1024,
                iterations: 1,
                parallelism: 1,
            },
            admin: AdminSeed {
                email: "admin@local".into(),
                password: Some("adminpass".into()),
            },
        };
        Self::from_parts(db::memory().await, config).expect("fake state")
    }
}
