//! Configuration for wlwire
//!
//! Read from `$WLWIRE_CONFIG`, or `~/.config/wlwire/config.toml` when that is
//! unset. A missing file is replaced by the defaults on first run.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::transport::DEFAULT_BUFFER_SIZE;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "WLWIRE_CONFIG";

const HEADER: &str = "# wlwire configuration\n# Missing keys fall back to their defaults.\n\n";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub transport: TransportConfig,
    pub protocols: ProtocolConfig,
}

impl Config {
    /// Load from [`Config::path`]
    pub fn load() -> Result<Self> {
        let path = Self::path().context("No config location: set WLWIRE_CONFIG or HOME")?;
        Self::load_from(&path)
    }

    /// Load from `path`; a missing file yields the defaults, which are then
    /// written back so the user has something to edit
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No config at {:?}, writing defaults", path);
                let config = Self::default();
                if let Err(e) = config.save(path) {
                    warn!("Could not write default config: {:#}", e);
                }
                return Ok(config);
            }
            Err(e) => return Err(e).with_context(|| format!("Reading {}", path.display())),
        };

        let config: Config =
            toml::from_str(&content).with_context(|| format!("Parsing {}", path.display()))?;
        debug!("Config from {:?}: {:?}", path, config);
        Ok(config)
    }

    /// Config file location: `$WLWIRE_CONFIG` if set, else under the user
    /// config dir
    pub fn path() -> Option<PathBuf> {
        match std::env::var_os(CONFIG_ENV) {
            Some(explicit) if !explicit.is_empty() => Some(PathBuf::from(explicit)),
            _ => dirs::config_dir().map(|dir| dir.join("wlwire").join("config.toml")),
        }
    }

    /// Write this configuration to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Creating {}", parent.display()))?;
        }

        let body = toml::to_string_pretty(self).context("Serializing config")?;
        fs::write(path, format!("{HEADER}{body}"))
            .with_context(|| format!("Writing {}", path.display()))?;
        info!("Wrote config to {:?}", path);
        Ok(())
    }
}

/// Compositor connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Receive buffer capacity in bytes
    pub buffer_size: usize,
    /// Display name or absolute socket path (falls back to `WAYLAND_DISPLAY`)
    pub display: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            display: None,
        }
    }
}

impl TransportConfig {
    pub fn socket_path(&self) -> PathBuf {
        wlwire_proto::socket_path(self.display.as_deref())
    }
}

/// Where protocol documents are discovered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolSource {
    #[default]
    Local,
    Remote,
}

/// Protocol document discovery and schema output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub source: ProtocolSource,
    /// Directories searched recursively for local documents
    pub local_dirs: Vec<PathBuf>,
    /// Document file extension, without the dot
    pub extension: String,
    /// Strip descriptions and signatures from the cached schema
    pub minimise: bool,
    /// Where the compiled schema is written (defaults to the user cache dir)
    pub cache_path: Option<PathBuf>,
    pub remote: RemoteConfig,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            source: ProtocolSource::Local,
            local_dirs: vec![
                PathBuf::from("/usr/share/wayland"),
                PathBuf::from("/usr/share/wayland-protocols"),
            ],
            extension: "xml".to_string(),
            minimise: true,
            cache_path: None,
            remote: RemoteConfig::default(),
        }
    }
}

impl ProtocolConfig {
    /// Configured cache path, or `<cache dir>/wlwire/protocols.json`
    pub fn cache_path(&self) -> Option<PathBuf> {
        self.cache_path
            .clone()
            .or_else(|| dirs::cache_dir().map(|dir| dir.join("wlwire").join("protocols.json")))
    }
}

/// Remote repository listing API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Repository API root; `/tree` and `/blobs/<id>/raw` are appended
    pub api_base: String,
    /// Top-level repository paths to list
    pub paths: Vec<String>,
    pub per_page: u32,
    /// Core protocol document, always listed first
    pub canonical_uri: String,
    pub listing_timeout_secs: u64,
    pub document_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_base: "https://gitlab.freedesktop.org/api/v4/projects/wayland%2Fwayland-protocols/repository"
                .to_string(),
            paths: vec!["staging".to_string(), "stable".to_string()],
            per_page: 100,
            canonical_uri:
                "https://gitlab.freedesktop.org/wayland/wayland/-/raw/main/protocol/wayland.xml"
                    .to_string(),
            listing_timeout_secs: 30,
            document_timeout_secs: 20,
        }
    }
}
