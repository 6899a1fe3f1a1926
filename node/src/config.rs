// Node Configuration
// CLI args plus the TOML config file every deployment ships with

use clap::Parser;
use raida_core::bytes::hex2bin;
use raida_core::record::An;
use raida_core::RAIDA_COUNT;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_BACKUP_FREQ_SECS: u64 = 4;
const DEFAULT_INTEGRITY_FREQ_SECS: u64 = 3600;
const DEFAULT_UDP_PAYLOAD: usize = 1440;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "RAIDA authentication server", long_about = None)]
pub struct Cli {
    /// Path to config.toml (defaults to the executable's directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory holding Data/, coins/ and Keys/
    #[arg(long, default_value = ".")]
    pub data_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Resolve the config path: explicit flag or next to the executable
    pub fn config_path(&self) -> PathBuf {
        if let Some(path) = &self.config {
            return path.clone();
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    server: ServerSection,
}

#[derive(Debug, Deserialize)]
struct ServerSection {
    raida_id: u8,
    coin_id: u16,
    port: u16,
    proxy_key: String,
    admin_key: String,
    raida_servers: Vec<String>,
    threads: Option<usize>,
    backup_freq: Option<u64>,
    integrity_freq: Option<u64>,
    synchronization_enabled: Option<bool>,
    udp_effective_payload: Option<usize>,
    proxy_addr: Option<String>,
    proxy_port: Option<u16>,
    btc_confirmations: Option<u32>,
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub raida_id: u8,
    pub coin_id: u16,
    pub port: u16,
    pub proxy_key: An,
    pub admin_key: An,
    pub raida_servers: Vec<String>,
    pub threads: usize,
    pub backup_freq: Duration,
    pub integrity_freq: Duration,
    pub synchronization_enabled: bool,
    pub udp_effective_payload: usize,
    pub proxy_addr: Option<String>,
    pub proxy_port: Option<u16>,
    pub btc_confirmations: u32,
    pub data_dir: PathBuf,
}

impl Config {
    /// Read and validate the config file
    pub fn load(path: &Path, data_dir: PathBuf) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let file: ConfigFile = toml::from_str(&text)?;
        Config::from_sections(file.server, data_dir)
    }

    fn from_sections(server: ServerSection, data_dir: PathBuf) -> Result<Config, ConfigError> {
        if server.raida_id as usize >= RAIDA_COUNT {
            return Err(ConfigError::Invalid(format!(
                "raida_id {} outside 0..{}",
                server.raida_id,
                RAIDA_COUNT - 1
            )));
        }
        if server.raida_servers.len() != RAIDA_COUNT {
            return Err(ConfigError::Invalid(format!(
                "raida_servers must list {} entries, found {}",
                RAIDA_COUNT,
                server.raida_servers.len()
            )));
        }

        // The server refuses to start without an admin key
        let mut admin_key = [0u8; 16];
        hex2bin(&server.admin_key, &mut admin_key)
            .map_err(|_| ConfigError::Invalid("admin_key must be 32 hex characters".into()))?;
        let mut proxy_key = [0u8; 16];
        hex2bin(&server.proxy_key, &mut proxy_key)
            .map_err(|_| ConfigError::Invalid("proxy_key must be 32 hex characters".into()))?;

        let threads = server
            .threads
            .filter(|&t| t > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|p| p.get())
                    .unwrap_or(4)
            });

        Ok(Config {
            raida_id: server.raida_id,
            coin_id: server.coin_id,
            port: server.port,
            proxy_key,
            admin_key,
            raida_servers: server.raida_servers,
            threads,
            backup_freq: Duration::from_secs(
                server.backup_freq.unwrap_or(DEFAULT_BACKUP_FREQ_SECS).max(1),
            ),
            integrity_freq: Duration::from_secs(
                server
                    .integrity_freq
                    .unwrap_or(DEFAULT_INTEGRITY_FREQ_SECS)
                    .max(1),
            ),
            synchronization_enabled: server.synchronization_enabled.unwrap_or(false),
            udp_effective_payload: server.udp_effective_payload.unwrap_or(DEFAULT_UDP_PAYLOAD),
            proxy_addr: server.proxy_addr,
            proxy_port: server.proxy_port,
            btc_confirmations: server.btc_confirmations.unwrap_or(2),
            data_dir,
        })
    }
}
