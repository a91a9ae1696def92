//! Process configuration, read once at startup from the environment.

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub log_level: String,
    pub mapping_endpoint: String,
    pub odds_endpoint: String,
    pub odds_polling_interval_ms: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4000),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned()),
            mapping_endpoint: std::env::var("MAPPING_ENDPOINT")
                .unwrap_or_else(|_| "http://127.0.0.0:3000/api/mappings".to_owned()),
            odds_endpoint: std::env::var("ODDS_ENDPOINT")
                .unwrap_or_else(|_| "http://127.0.0.1:3000/api/state".to_owned()),
            odds_polling_interval_ms: std::env::var("ODDS_POLLING_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
        }
    }
}
