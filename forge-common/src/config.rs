//! Configuration loading and root folder resolution
//!
//! Configuration is built once at startup and handed to every component that
//! needs it. Sources, highest priority first:
//! 1. Command-line arguments (`--root-folder`, `--port`, `--config`)
//! 2. TOML override file (non-empty credential values only)
//! 3. Environment variables
//! 4. Built-in defaults

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Default HTTP port for the model generation service
pub const DEFAULT_PORT: u16 = 5731;

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "FORGE_ROOT_FOLDER";

/// Environment variable naming the TOML override file
pub const CONFIG_FILE_ENV: &str = "FORGE_CONFIG";

/// Default external conversion tool
pub const DEFAULT_CONVERTER_BINARY: &str = "assimp";

/// Default wall-clock budget for one conversion
pub const DEFAULT_CONVERTER_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Credentials
// ============================================================================

/// Third-party API credential identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential {
    Meshy,
    Tripo,
    Rodin,
    Replicate,
    OpenRouter,
    Roblox,
}

impl Credential {
    /// All credentials, in display order
    pub const ALL: [Credential; 6] = [
        Credential::Meshy,
        Credential::Tripo,
        Credential::Rodin,
        Credential::Replicate,
        Credential::OpenRouter,
        Credential::Roblox,
    ];

    /// Environment variable holding this credential
    pub fn env_var(self) -> &'static str {
        match self {
            Credential::Meshy => "MESHY_API_KEY",
            Credential::Tripo => "TRIPO_API_KEY",
            Credential::Rodin => "RODIN_API_KEY",
            Credential::Replicate => "REPLICATE_API_KEY",
            Credential::OpenRouter => "OPENROUTER_API_KEY",
            Credential::Roblox => "ROBLOX_API_KEY",
        }
    }
}

/// API keys for every external collaborator
///
/// A `None` value means "not configured"; callers surface that as a
/// configuration error naming [`Credential::env_var`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub meshy: Option<String>,
    pub tripo: Option<String>,
    pub rodin: Option<String>,
    pub replicate: Option<String>,
    pub openrouter: Option<String>,
    pub roblox: Option<String>,
}

impl Credentials {
    /// Read credentials from environment variables
    pub fn from_env() -> Self {
        let mut credentials = Self::default();
        for credential in Credential::ALL {
            let value = std::env::var(credential.env_var()).ok();
            credentials.set(credential, value);
        }
        credentials
    }

    /// Configured value for a credential, if any
    pub fn get(&self, credential: Credential) -> Option<&str> {
        let slot = match credential {
            Credential::Meshy => &self.meshy,
            Credential::Tripo => &self.tripo,
            Credential::Rodin => &self.rodin,
            Credential::Replicate => &self.replicate,
            Credential::OpenRouter => &self.openrouter,
            Credential::Roblox => &self.roblox,
        };
        slot.as_deref()
    }

    /// Store a credential; unconfigured or placeholder values clear the slot
    pub fn set(&mut self, credential: Credential, value: Option<String>) {
        let value = value
            .map(|v| v.trim().to_string())
            .filter(|v| is_configured(v));
        let slot = match credential {
            Credential::Meshy => &mut self.meshy,
            Credential::Tripo => &mut self.tripo,
            Credential::Rodin => &mut self.rodin,
            Credential::Replicate => &mut self.replicate,
            Credential::OpenRouter => &mut self.openrouter,
            Credential::Roblox => &mut self.roblox,
        };
        *slot = value;
    }

    /// Apply non-empty values from the override file on top of these
    fn apply_overrides(&mut self, overrides: &CredentialOverrides) {
        for credential in Credential::ALL {
            let Some(value) = overrides.get(credential) else {
                continue;
            };
            if !is_configured(value) {
                continue;
            }
            if self.get(credential).is_some() {
                warn!(
                    credential = credential.env_var(),
                    "Credential set in both environment and override file; using override file"
                );
            }
            self.set(credential, Some(value.to_string()));
        }
    }
}

/// Check whether a value is a real key rather than an empty or template value
pub fn is_configured(value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() {
        return false;
    }
    if value.contains("your_") && value.contains("_here") {
        return false;
    }
    true
}

// ============================================================================
// TOML override file
// ============================================================================

/// Contents of the optional TOML override file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Root folder for database and materialized assets
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP bind address (`host:port`)
    #[serde(default)]
    pub bind_address: Option<String>,

    /// Log filter (trace, debug, info, warn, error or an EnvFilter directive)
    #[serde(default)]
    pub log_level: Option<String>,

    #[serde(default)]
    pub converter: Option<ConverterOverrides>,

    #[serde(default)]
    pub credentials: CredentialOverrides,
}

/// `[converter]` table of the override file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConverterOverrides {
    pub binary: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// `[credentials]` table of the override file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialOverrides {
    pub meshy_api_key: Option<String>,
    pub tripo_api_key: Option<String>,
    pub rodin_api_key: Option<String>,
    pub replicate_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub roblox_api_key: Option<String>,
}

impl CredentialOverrides {
    fn get(&self, credential: Credential) -> Option<&str> {
        let slot = match credential {
            Credential::Meshy => &self.meshy_api_key,
            Credential::Tripo => &self.tripo_api_key,
            Credential::Rodin => &self.rodin_api_key,
            Credential::Replicate => &self.replicate_api_key,
            Credential::OpenRouter => &self.openrouter_api_key,
            Credential::Roblox => &self.roblox_api_key,
        };
        slot.as_deref()
    }
}

/// Read and parse a TOML override file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))
}

/// Default override file location (`<config dir>/forge/forge.toml`)
fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("forge").join("forge.toml"))
}

// ============================================================================
// Service configuration
// ============================================================================

/// External conversion tool settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverterConfig {
    /// Program name or path of the conversion CLI
    pub binary: String,
    /// Wall-clock budget for one conversion
    pub timeout: Duration,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            binary: DEFAULT_CONVERTER_BINARY.to_string(),
            timeout: Duration::from_secs(DEFAULT_CONVERTER_TIMEOUT_SECS),
        }
    }
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub root_folder: Option<PathBuf>,
    pub port: Option<u16>,
    pub config_file: Option<PathBuf>,
}

/// Runtime configuration, constructed once at startup
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind
    pub bind_address: String,
    /// Root folder holding the database and the storage directory
    pub root_folder: PathBuf,
    /// `tracing` filter string
    pub log_level: String,
    pub converter: ConverterConfig,
    pub credentials: Credentials,
}

impl Config {
    /// Build configuration from CLI values, the override file and the environment
    pub fn load(cli: &CliOverrides) -> Result<Self> {
        let toml_config = match resolve_config_file(cli.config_file.as_deref()) {
            Some(path) => {
                info!("Loading override file: {}", path.display());
                load_toml_config(&path)?
            }
            None => TomlConfig::default(),
        };

        Ok(Self::from_sources(cli, &toml_config))
    }

    /// Combine already-loaded sources (no file access)
    pub fn from_sources(cli: &CliOverrides, toml_config: &TomlConfig) -> Self {
        let root_folder = resolve_root_folder(
            cli.root_folder.as_deref(),
            ROOT_FOLDER_ENV,
            toml_config.root_folder.as_deref(),
        );

        let mut bind_address = toml_config
            .bind_address
            .clone()
            .or_else(|| std::env::var("FORGE_BIND").ok())
            .unwrap_or_else(|| format!("127.0.0.1:{}", DEFAULT_PORT));
        if let Some(port) = cli.port {
            bind_address = replace_port(&bind_address, port);
        }

        let log_level = toml_config
            .log_level
            .clone()
            .or_else(|| std::env::var("FORGE_LOG").ok())
            .unwrap_or_else(|| "info".to_string());

        let mut converter = ConverterConfig::default();
        if let Ok(binary) = std::env::var("FORGE_CONVERTER_BIN") {
            if !binary.trim().is_empty() {
                converter.binary = binary;
            }
        }
        if let Some(overrides) = &toml_config.converter {
            if let Some(binary) = &overrides.binary {
                converter.binary = binary.clone();
            }
            if let Some(secs) = overrides.timeout_secs {
                converter.timeout = Duration::from_secs(secs);
            }
        }

        let mut credentials = Credentials::from_env();
        credentials.apply_overrides(&toml_config.credentials);

        Self {
            bind_address,
            root_folder,
            log_level,
            converter,
            credentials,
        }
    }

    /// SQLite database file inside the root folder
    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join("forge.db")
    }

    /// Directory receiving materialized models and thumbnails
    pub fn storage_dir(&self) -> PathBuf {
        self.root_folder.join("storage")
    }

    /// Create the root folder and storage directory if missing
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root_folder)?;
        std::fs::create_dir_all(self.storage_dir())?;
        Ok(())
    }
}

fn resolve_config_file(cli_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    default_config_file().filter(|p| p.exists())
}

fn replace_port(bind_address: &str, port: u16) -> String {
    match bind_address.rsplit_once(':') {
        Some((host, _)) => format!("{}:{}", host, port),
        None => format!("{}:{}", bind_address, port),
    }
}

/// Root folder resolution, priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent default (fallback)
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_value: Option<&Path>,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = toml_value {
        return path.to_path_buf();
    }

    get_default_root_folder()
}

/// Get OS-dependent default root folder path
fn get_default_root_folder() -> PathBuf {
    if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("forge"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\forge"))
    } else {
        dirs::data_local_dir()
            .map(|d| d.join("forge"))
            .unwrap_or_else(|| PathBuf::from("./forge_data"))
    }
}
