//! Load config from file and environment.

use serde::Deserialize;
use spur_core::{EngineConfig, ReincludePolicy, ShortAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Daemon configuration. File: ~/.config/spur/config.toml or /etc/spur/config.toml.
/// Env overrides: SPUR_GATEWAY_ADDRESS, SPUR_ADAPTOR_PORT, SPUR_BACKEND_PORT, SPUR_STATE_PATH.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Gateway short address on the radio network (default 0x0000).
    #[serde(default)]
    pub gateway_address: u16,
    /// UDP port the radio adaptor talks to (default 45680).
    #[serde(default = "default_adaptor_port")]
    pub adaptor_port: u16,
    /// TCP port the backend connects to (default 45681).
    #[serde(default = "default_backend_port")]
    pub backend_port: u16,
    /// Node table snapshot file.
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    /// Fast ticks between beacons (default 6).
    #[serde(default = "default_beacon_every")]
    pub beacon_every: u32,
    /// Backend liveness interval in seconds (default 1800).
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    #[serde(default)]
    pub reinclude: ReincludePolicy,
    #[serde(default)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn default_adaptor_port() -> u16 {
    45680
}
fn default_backend_port() -> u16 {
    45681
}
fn default_state_path() -> PathBuf {
    PathBuf::from("/var/lib/spur/spur.state")
}
fn default_beacon_every() -> u32 {
    spur_core::protocol::DEFAULT_BEACON_EVERY
}
fn default_check_interval_secs() -> u64 {
    spur_core::protocol::CHECK_INTERVAL.as_secs()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway_address: 0,
            adaptor_port: default_adaptor_port(),
            backend_port: default_backend_port(),
            state_path: default_state_path(),
            beacon_every: default_beacon_every(),
            check_interval_secs: default_check_interval_secs(),
            reinclude: ReincludePolicy::default(),
            log_format: LogFormat::default(),
        }
    }
}

impl Config {
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            address: ShortAddr(self.gateway_address),
            beacon_every: self.beacon_every,
            reinclude: self.reinclude,
        }
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(1))
    }
}

/// Load config: merge default, then config file (explicit path, else the first
/// one present), then env vars. Problems are returned as warnings for the caller
/// to log once tracing is up.
pub fn load(explicit: Option<&Path>) -> (Config, Vec<String>) {
    let mut warnings = Vec::new();
    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => config_paths().into_iter().find(|p| p.exists()),
    };
    let mut c = match path {
        Some(p) => load_file(&p).unwrap_or_else(|e| {
            warnings.push(format!("problem reading config {}: {e}", p.display()));
            Config::default()
        }),
        None => Config::default(),
    };
    warnings.extend(apply_env(&mut c, |k| std::env::var(k).ok()));
    (c, warnings)
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/spur/config.toml"));
    }
    out.push(PathBuf::from("/etc/spur/config.toml"));
    out
}

fn load_file(path: &Path) -> anyhow::Result<Config> {
    let s = std::fs::read_to_string(path)?;
    Ok(toml::from_str::<Config>(&s)?)
}

fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) -> Vec<String> {
    let mut warnings = Vec::new();
    if let Some(s) = var("SPUR_GATEWAY_ADDRESS") {
        match parse_hex_u16(&s) {
            Some(a) => c.gateway_address = a,
            None => warnings.push(format!("ignoring SPUR_GATEWAY_ADDRESS={s}")),
        }
    }
    for (key, port) in [
        ("SPUR_ADAPTOR_PORT", &mut c.adaptor_port),
        ("SPUR_BACKEND_PORT", &mut c.backend_port),
    ] {
        if let Some(s) = var(key) {
            match s.parse::<u16>() {
                Ok(p) => *port = p,
                Err(_) => warnings.push(format!("ignoring {key}={s}")),
            }
        }
    }
    if let Some(s) = var("SPUR_STATE_PATH") {
        c.state_path = PathBuf::from(s);
    }
    warnings
}

fn parse_hex_u16(s: &str) -> Option<u16> {
    let s = s.trim();
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u16::from_str_radix(digits, 16).ok()
}
