use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, ServerError};

/// Server configuration options.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP port to listen on. Port 0 binds an ephemeral port.
    pub port: u16,
    /// Address to bind, combined with `port`.
    pub bind_addr: String,
    /// Data directory for the WAL.
    pub data_dir: PathBuf,
    /// Live connections at or above this cap are accepted and closed
    /// immediately, with no response.
    pub max_connections: usize,
    /// Worker threads for the I/O executor.
    pub worker_threads: usize,
    /// Cap on pairs returned by a single SCAN.
    pub scan_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_addr: "0.0.0.0".to_string(),
            data_dir: PathBuf::from("./data"),
            max_connections: 50_000,
            worker_threads: 8,
            scan_limit: corsac_core::txn::DEFAULT_SCAN_LIMIT,
        }
    }
}

impl ServerConfig {
    /// Load config from TOML and environment variables.
    ///
    /// Environment variables use the `CORSAC__` prefix with `__` separators,
    /// e.g. `CORSAC__MAX_CONNECTIONS=100`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        } else {
            builder = builder.add_source(config::File::with_name("corsac").required(false));
        }
        builder = builder.add_source(config::Environment::with_prefix("CORSAC").separator("__"));
        let config: ServerConfig = builder
            .build()
            .map_err(|err| ServerError::InvalidConfig(err.to_string()))?
            .try_deserialize()
            .map_err(|err| ServerError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate config invariants.
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(ServerError::InvalidConfig(
                "max_connections must be greater than 0".into(),
            ));
        }
        if self.worker_threads == 0 {
            return Err(ServerError::InvalidConfig(
                "worker_threads must be greater than 0".into(),
            ));
        }
        if self.scan_limit == 0 {
            return Err(ServerError::InvalidConfig(
                "scan_limit must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// The socket address string handed to the listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}
