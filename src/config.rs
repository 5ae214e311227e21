use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Argon2 cost parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

/// Credentials for the admin account seeded on first boot.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminSeed {
    pub email: String,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub jwt: JwtConfig,
    pub password: PasswordConfig,
    pub admin: AdminSeed,
}

/// One year.
const MAX_TTL_MINUTES: i64 = 60 * 24 * 365;

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars<F>(var: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt = JwtConfig {
            secret: var("JWT_SECRET")
                .filter(|s| !s.is_empty())
                .context("JWT_SECRET must be set")?,
            issuer: var("JWT_ISSUER").unwrap_or_else(|| "authcore".into()),
            audience: var("JWT_AUDIENCE").unwrap_or_else(|| "authcore-users".into()),
            ttl_minutes: parsed(&var, "JWT_TTL_MINUTES").unwrap_or(60 * 8),
        };
        anyhow::ensure!(
            (1..=MAX_TTL_MINUTES).contains(&jwt.ttl_minutes),
            "JWT_TTL_MINUTES must be between 1 and {MAX_TTL_MINUTES}, got {}",
            jwt.ttl_minutes
        );
        let password = PasswordConfig {
            memory_kib: parsed(&var, "PASSWORD_HASH_MEMORY_KIB").unwrap_or(19 * 1024),
            iterations: parsed(&var, "PASSWORD_HASH_ITERATIONS").unwrap_or(2),
            parallelism: parsed(&var, "PASSWORD_HASH_PARALLELISM").unwrap_or(1),
        };
        let admin = AdminSeed {
            email: var("ADMIN_EMAIL").unwrap_or_else(|| "admin@local".into()),
            password: var("ADMIN_PASSWORD").filter(|s| !s.is_empty()),
        };

        Ok(Self {
            host: var("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed(&var, "APP_PORT").unwrap_or(3000),
            database_url: var("DATABASE_URL").unwrap_or_else(|| "sqlite://database.sqlite".into()),
            jwt,
            password,
            admin,
        })
    }
}

fn parsed<F, T>(var: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    var(key).and_then(|v| v.parse().ok())
}
