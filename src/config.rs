use std::time::Duration;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub op_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    pub rate_limit_rps: u32,
    pub rate_limit_burst: u32,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db: DbConfig,
    pub storage: StorageConfig,
    pub http: HttpConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; every setting has a default.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let port: u16 = var("DB_PORT", "5432")
            .parse()
            .context("DB_PORT must be a port number")?;
        let url = match lookup("DATABASE_URL") {
            Some(url) => url,
            None => format!(
                "postgres://{}:{}@{}:{}/{}",
                var("DB_USER", "admin"),
                var("DB_PASS", "admin"),
                var("DB_HOST", "localhost"),
                port,
                var("DB_NAME", "database"),
            ),
        };
        let db = DbConfig {
            url,
            max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            op_timeout: Duration::from_secs(parse_or(&lookup, "DB_OP_TIMEOUT_SECS", 10)?),
        };

        let storage = StorageConfig {
            endpoint: with_scheme(&var("MINIO_ENDPOINT", "localhost:9000")),
            access_key: var("MINIO_ACCESS_KEY", "minioadmin"),
            secret_key: var("MINIO_SECRET_KEY", "minioadmin"),
            bucket: var("MINIO_BUCKET", "users"),
            region: var("MINIO_REGION", "us-east-1"),
        };

        let http = HttpConfig {
            host: var("APP_HOST", "0.0.0.0"),
            port: parse_or(&lookup, "APP_PORT", 8080)?,
            rate_limit_rps: parse_or(&lookup, "RATE_LIMIT_RPS", 1000)?,
            rate_limit_burst: parse_or(&lookup, "RATE_LIMIT_BURST", 5000)?,
        };

        Ok(Self { db, storage, http })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}

// MinIO endpoints are commonly given as bare host:port and served over plain http.
fn with_scheme(endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}
