use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::audio::BackendKind;
use crate::extract::{DEFAULT_BARS, DEFAULT_DECIMATION, DEFAULT_STALL_TIMEOUT};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub waveform: WaveformConfig,
    #[serde(default)]
    pub decoder: DecoderConfig,
}

#[derive(Debug, Deserialize)]
pub struct WaveformConfig {
    #[serde(default = "default_bars")]
    pub bars: u32,
    #[serde(default = "default_decimation")]
    pub decimation: u32,
    #[serde(default)]
    pub normalize: bool,
}

#[derive(Debug, Deserialize)]
pub struct DecoderConfig {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default = "default_stall_timeout_ms")]
    pub stall_timeout_ms: u64,
}

impl Default for WaveformConfig {
    fn default() -> Self {
        Self {
            bars: default_bars(),
            decimation: default_decimation(),
            normalize: false,
        }
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            stall_timeout_ms: default_stall_timeout_ms(),
        }
    }
}

fn default_bars() -> u32 { DEFAULT_BARS }
fn default_decimation() -> u32 { DEFAULT_DECIMATION }
fn default_stall_timeout_ms() -> u64 { DEFAULT_STALL_TIMEOUT.as_millis() as u64 }

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}

/// `wavebars.toml` in the working directory, then the user config locations.
pub fn find_config() -> Option<PathBuf> {
    let local = PathBuf::from("wavebars.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("wavebars").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("wavebars").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}
