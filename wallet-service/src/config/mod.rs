use anyhow::Result;
use dotenvy::dotenv;
use serde::Deserialize;
use service_core::config::CommonConfig;
use std::env;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub common: CommonConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub epos: EposConfig,
    pub service_name: String,
    pub log_level: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Deserialize, Clone, Debug)]
pub struct SecurityConfig {
    pub admin_api_key: String,
    pub allowed_origins: Vec<String>,
}

/// External ePOS system integration. The callback is best-effort: when
/// `callback_url` is unset, notifications are skipped entirely.
#[derive(Deserialize, Clone, Debug)]
pub struct EposConfig {
    pub callback_url: Option<String>,
    pub callback_timeout_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        // WALLET_SERVICE_PORT overrides the shared loader; tests pass 0 for a
        // random port.
        let common = match env::var("WALLET_SERVICE_PORT") {
            Ok(port) => CommonConfig { port: port.parse()? },
            Err(_) => CommonConfig::load().map_err(|e| anyhow::anyhow!("{}", e))?,
        };

        let db_url = env::var("WALLET_DATABASE_URL").expect("WALLET_DATABASE_URL must be set");
        let max_connections = env::var("WALLET_DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()?;
        let min_connections = env::var("WALLET_DATABASE_MIN_CONNECTIONS")
            .unwrap_or_else(|_| "1".to_string())
            .parse()?;

        let admin_api_key =
            env::var("WALLET_ADMIN_API_KEY").unwrap_or_else(|_| "dev-admin-key".to_string());
        let allowed_origins = env::var("WALLET_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let callback_url = env::var("EPOS_CALLBACK_URL").ok().filter(|s| !s.is_empty());
        let callback_timeout_ms = env::var("EPOS_CALLBACK_TIMEOUT_MS")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()?;

        let log_level = env::var("WALLET_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            common,
            database: DatabaseConfig {
                url: db_url,
                max_connections,
                min_connections,
            },
            security: SecurityConfig {
                admin_api_key,
                allowed_origins,
            },
            epos: EposConfig {
                callback_url,
                callback_timeout_ms,
            },
            service_name: "wallet-service".to_string(),
            log_level,
        })
    }
}
