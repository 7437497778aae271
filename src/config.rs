use std::env;

pub struct Config {
    pub port: u16,
    pub database_url: String,
}

impl Config {
    pub fn load() -> Self {
        Self {
            port: env_or("PORTAL_PORT", "3000").parse().unwrap_or_else(|e| {
                log::warn!("Invalid PORTAL_PORT value ({}), falling back to 3000", e);
                3000
            }),
            database_url: env_or("DATABASE_URL", "sqlite:portal.db"),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| {
        log::info!("{} not set, using default: {}", key, default);
        default.to_string()
    })
}
