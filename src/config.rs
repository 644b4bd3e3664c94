use crate::error::{Error, Result};
use std::env;
use std::path::PathBuf;

const DEFAULT_PORT: u16 = 4001;
const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
const DEFAULT_DISTRICTS_PATH: &str = "data/districts.json";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bind_addr: String,
    pub port: u16,
    pub districts_path: PathBuf,
}

impl Config {
    /// Reads the configuration from the process environment. Call
    /// `dotenvy::dotenv()` first if a `.env` file should be honoured.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match lookup("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| {
                    Error::Config(format!("PORT must be a port number, got '{}': {}", raw, e))
                })?,
            None => DEFAULT_PORT,
        };

        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let districts_path = lookup("DISTRICTS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DISTRICTS_PATH));

        Ok(Self {
            bind_addr,
            port,
            districts_path,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}
