//! Configuration file (`sheetprobe.toml`)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::backend::BackendKind;
use crate::error::ExtractError;

/// File looked up in the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "sheetprobe.toml";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

impl ProbeConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: ProbeConfig = toml::from_str(&content)
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Explicit path if given, else `sheetprobe.toml` in the working directory, else defaults
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Self::from_file(DEFAULT_CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(engine) = &self.extract.engine {
            BackendKind::parse(engine)?;
        }
        if self.extract.format != "json" && self.extract.format != "text" {
            anyhow::bail!(
                "Configuration error: unknown output format '{}' (expected json or text)",
                self.extract.format
            );
        }
        Ok(())
    }

    /// Configured engine, or the platform default
    pub fn engine(&self) -> Result<BackendKind> {
        match &self.extract.engine {
            Some(engine) => BackendKind::parse(engine),
            None => Ok(BackendKind::platform_default()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// `file` or `live`
    #[serde(default)]
    pub engine: Option<String>,
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            engine: None,
            format: default_format(),
        }
    }
}

fn default_format() -> String {
    "json".to_string()
}

/// How the live backend's automation bridge is launched
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_bridge_program")]
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Show the application window while extracting
    #[serde(default)]
    pub visible: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            program: default_bridge_program(),
            args: Vec::new(),
            visible: false,
        }
    }
}

fn default_bridge_program() -> String {
    "excel-bridge".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
    #[serde(default)]
    pub ndjson: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            out_dir: default_out_dir(),
            ndjson: false,
        }
    }
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("exports")
}

impl BackendKind {
    /// Parse an engine name as written in the config file
    pub fn parse(engine: &str) -> Result<Self> {
        match engine.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(BackendKind::File),
            "live" => Ok(BackendKind::Live),
            _ => Err(ExtractError::UnsupportedEngine(engine.to_string()).into()),
        }
    }

    /// The live application is only expected to exist on Windows
    pub fn platform_default() -> Self {
        if cfg!(windows) {
            BackendKind::Live
        } else {
            BackendKind::File
        }
    }
}
