//! Server configuration: a TOML file layered under `CUEMS_`-prefixed
//! environment variables via `figment`, with a `clap` CLI able to override
//! the bind address and config path. Field set is the Rust-native
//! ambient-stack addition this system's original shell-script bootstrap
//! (`original_source/` ships no config file at all — ports/paths are
//! hardcoded in `CuemsWsServer.py`'s `__main__`) never had to specify.

use std::path::PathBuf;

use clap::Parser;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

fn default_dispatcher_workers_per_session() -> usize {
    3
}

fn default_engine_queue_capacity() -> usize {
    64
}

fn default_engine_rpc_timeout_ms() -> u64 {
    10_000
}

fn default_engine_rpc_poll_interval_ms() -> u64 {
    250
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub library_path: PathBuf,
    pub tmp_upload_path: PathBuf,
    pub database_path: PathBuf,
    pub bind_host: String,
    pub bind_port: u16,

    #[serde(default = "default_dispatcher_workers_per_session")]
    pub dispatcher_workers_per_session: usize,
    #[serde(default = "default_engine_queue_capacity")]
    pub engine_request_queue_capacity: usize,
    #[serde(default = "default_engine_queue_capacity")]
    pub engine_response_queue_capacity: usize,
    #[serde(default = "default_engine_rpc_timeout_ms")]
    pub engine_rpc_timeout_ms: u64,
    #[serde(default = "default_engine_rpc_poll_interval_ms")]
    pub engine_rpc_poll_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            library_path: PathBuf::from("./library"),
            tmp_upload_path: PathBuf::from("./library/tmp_upload"),
            database_path: PathBuf::from("./library/cuems.db"),
            bind_host: "0.0.0.0".to_string(),
            bind_port: 9092,
            dispatcher_workers_per_session: default_dispatcher_workers_per_session(),
            engine_request_queue_capacity: default_engine_queue_capacity(),
            engine_response_queue_capacity: default_engine_queue_capacity(),
            engine_rpc_timeout_ms: default_engine_rpc_timeout_ms(),
            engine_rpc_poll_interval_ms: default_engine_rpc_poll_interval_ms(),
        }
    }
}

/// CLI overrides layered on top of the file/env settings. Every field is
/// optional so an unset flag leaves the lower layer's value untouched.
#[derive(Debug, Parser)]
#[command(name = "cuems-server", about = "Cuems collaboration WebSocket server")]
pub struct Cli {
    /// Path to a TOML config file. Defaults to `cuems.toml` in the
    /// working directory if present.
    #[arg(long, env = "CUEMS_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "CUEMS_BIND_HOST")]
    pub bind_host: Option<String>,

    #[arg(long, env = "CUEMS_BIND_PORT")]
    pub bind_port: Option<u16>,

    #[arg(long, env = "CUEMS_LIBRARY_PATH")]
    pub library_path: Option<PathBuf>,
}

impl Settings {
    /// Layering order, lowest to highest precedence: built-in defaults,
    /// the TOML file (if any), `CUEMS_`-prefixed env vars, then explicit
    /// CLI flags.
    pub fn load(cli: &Cli) -> Result<Self, figment::Error> {
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from("cuems.toml"));

        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        if config_path.exists() {
            figment = figment.merge(Toml::file(config_path));
        }
        figment = figment.merge(Env::prefixed("CUEMS_"));

        let mut settings: Settings = figment.extract()?;

        if let Some(host) = &cli.bind_host {
            settings.bind_host = host.clone();
        }
        if let Some(port) = cli.bind_port {
            settings.bind_port = port;
        }
        if let Some(path) = &cli.library_path {
            settings.library_path = path.clone();
        }

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_self_consistent() {
        let settings = Settings::default();
        assert_eq!(settings.dispatcher_workers_per_session, 3);
        assert_eq!(settings.engine_rpc_timeout_ms, 10_000);
    }

    #[test]
    fn cli_flags_override_defaults() {
        let cli = Cli {
            config: None,
            bind_host: Some("127.0.0.1".to_string()),
            bind_port: Some(4242),
            library_path: None,
        };
        let settings = Settings::load(&cli).unwrap();
        assert_eq!(settings.bind_host, "127.0.0.1");
        assert_eq!(settings.bind_port, 4242);
    }
}
