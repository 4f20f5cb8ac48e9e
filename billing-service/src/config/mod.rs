use anyhow::Result;
use dotenvy::dotenv;
use secrecy::Secret;
use serde::Deserialize;
use std::env;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jobs: JobsConfig,
    pub policy: PolicyConfig,
    pub service_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub db_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct JobsConfig {
    /// Interval of the background overdue sweep. `None` disables the job;
    /// the sweep endpoint still works.
    pub sweep_interval_secs: Option<u64>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct PolicyConfig {
    /// When set, a failed income-record write turns a bulk payment override
    /// into an error response instead of a logged warning.
    pub strict_bookkeeping: bool,
    /// Absolute stored-vs-computed debt difference tolerated before a resync
    /// rewrites the figure.
    pub drift_tolerance: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("BILLING_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("BILLING_SERVICE_PORT")
            .unwrap_or_else(|_| "3010".to_string())
            .parse()?;

        let db_url = env::var("BILLING_DATABASE_URL").expect("BILLING_DATABASE_URL must be set");
        let db_name =
            env::var("BILLING_DATABASE_NAME").unwrap_or_else(|_| "billing_db".to_string());

        let sweep_interval_secs = match env::var("BILLING_SWEEP_INTERVAL_SECS") {
            Ok(value) => Some(value.parse()?),
            Err(_) => None,
        };

        let strict_bookkeeping = env::var("BILLING_STRICT_BOOKKEEPING")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);
        let drift_tolerance = env::var("BILLING_DRIFT_TOLERANCE")
            .unwrap_or_else(|_| "0".to_string())
            .parse()
            .unwrap_or(0);

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: Secret::new(db_url),
                db_name,
            },
            jobs: JobsConfig {
                sweep_interval_secs,
            },
            policy: PolicyConfig {
                strict_bookkeeping,
                drift_tolerance,
            },
            service_name: "billing-service".to_string(),
        })
    }
}
