use std::{env, path::PathBuf};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub upload_dir: PathBuf,
}

impl Config {
    /// Reads `.env` (if present) and the process environment, with defaults
    /// suitable for local development.
    pub fn from_env() -> Config {
        let _ = dotenv::dotenv();
        Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://fleamarket.db?mode=rwc".to_owned()),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned()),
            upload_dir: env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_owned()).into(),
        }
    }
}
