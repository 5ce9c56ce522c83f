//! CLI argument definitions for the Kaï application.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use kai_core::config::KaiConfig;

/// Kaï, a streaming chat backend with cached replies and session memory.
#[derive(Parser, Debug)]
#[command(name = "kai", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// API server port.
    #[arg(short = 'p', long = "port", global = true)]
    pub port: Option<u16>,

    /// Data directory for the SQLite store.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Send one message to a running server and print the reply.
    Ask {
        /// The message to send.
        message: String,
        /// Continue an existing session.
        #[arg(short = 's', long = "session")]
        session: Option<String>,
        /// Server origin; defaults to the local server on the resolved port.
        #[arg(short = 'u', long = "url")]
        url: Option<String>,
    },
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > KAI_CONFIG env var > ~/.kai/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("KAI_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the API server port.
    ///
    /// Priority: --port flag > KAI_PORT env var > config file value > 5000.
    pub fn resolve_port(&self, config_port: u16) -> u16 {
        if let Some(p) = self.port {
            return p;
        }
        if let Ok(val) = std::env::var("KAI_PORT") {
            if let Ok(p) = val.parse::<u16>() {
                return p;
            }
        }
        if config_port != 0 {
            return config_port;
        }
        5000
    }

    /// Resolve the log level.
    pub fn resolve_log_level(&self, config: &KaiConfig) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config.general.log_level.clone())
    }

    /// Resolve the database file.
    ///
    /// Priority: KAI_DB_PATH env var > (--data-dir flag or config data dir)
    /// joined with the configured file name.
    pub fn resolve_db_path(&self, config: &KaiConfig) -> PathBuf {
        if let Ok(p) = std::env::var("KAI_DB_PATH") {
            return PathBuf::from(p);
        }
        let data_dir = match self.data_dir {
            Some(ref dir) => dir.clone(),
            None => expand_home(&config.general.data_dir),
        };
        data_dir.join(&config.storage.db_file)
    }

    /// Resolve the Gemini API key.
    ///
    /// Priority: GEMINI_API_KEY env var > config file value.
    pub fn resolve_api_key(&self, config: &KaiConfig) -> Option<String> {
        std::env::var("GEMINI_API_KEY")
            .ok()
            .or_else(|| config.gemini.api_key.clone())
            .filter(|k| !k.trim().is_empty())
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => home_dir().join(rest),
        None => PathBuf::from(path),
    }
}

fn home_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    let home = std::env::var("USERPROFILE");
    #[cfg(not(target_os = "windows"))]
    let home = std::env::var("HOME");
    home.map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."))
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    home_dir().join(".kai").join("config.toml")
}
