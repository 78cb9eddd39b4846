use serde::Deserialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{CaError, Result};

/// Environment variable overriding the storage root.
pub const HOME_ENV_VAR: &str = "LOCALTLS_HOME";
pub const MIN_RSA_KEY_BITS: u32 = 2048;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ca: CaConfig,
    #[serde(default)]
    pub leaf: LeafConfig,
    #[serde(default)]
    pub renewal: RenewalConfig,
    #[serde(default)]
    pub trust: TrustConfig,
    #[serde(default)]
    pub license: LicenseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    pub root: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaConfig {
    #[serde(default = "default_ca_common_name")]
    pub common_name: String,
    #[serde(default = "default_ca_organization")]
    pub organization: String,
    #[serde(default = "default_ca_country")]
    pub country: String,
    #[serde(default = "default_ca_validity")]
    pub validity_days: u32,
    #[serde(default = "default_key_bits")]
    pub key_bits: u32,
}

impl Default for CaConfig {
    fn default() -> Self {
        Self {
            common_name: default_ca_common_name(),
            organization: default_ca_organization(),
            country: default_ca_country(),
            validity_days: default_ca_validity(),
            key_bits: default_key_bits(),
        }
    }
}

fn default_ca_common_name() -> String {
    "localtls Local Development CA".to_string()
}

fn default_ca_organization() -> String {
    "localtls Local CA".to_string()
}

fn default_ca_country() -> String {
    "US".to_string()
}

fn default_ca_validity() -> u32 {
    3650 // 10 years
}

fn default_key_bits() -> u32 {
    2048
}

#[derive(Debug, Deserialize, Clone)]
pub struct LeafConfig {
    #[serde(default = "default_leaf_organization")]
    pub organization: String,
    #[serde(default = "default_leaf_validity")]
    pub validity_days: u32,
    #[serde(default = "default_key_bits")]
    pub key_bits: u32,
}

impl Default for LeafConfig {
    fn default() -> Self {
        Self {
            organization: default_leaf_organization(),
            validity_days: default_leaf_validity(),
            key_bits: default_key_bits(),
        }
    }
}

fn default_leaf_organization() -> String {
    "localtls".to_string()
}

fn default_leaf_validity() -> u32 {
    365
}

#[derive(Debug, Deserialize, Clone)]
pub struct RenewalConfig {
    #[serde(default = "default_threshold_days")]
    pub threshold_days: u32,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            threshold_days: default_threshold_days(),
        }
    }
}

fn default_threshold_days() -> u32 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrustConfig {
    /// Nickname of the CA entry in NSS databases.
    #[serde(default = "default_nss_nickname")]
    pub nss_nickname: String,
    #[serde(default = "default_linux_anchor_path")]
    pub linux_anchor_path: PathBuf,
    #[serde(default = "default_macos_keychain")]
    pub macos_keychain: PathBuf,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            nss_nickname: default_nss_nickname(),
            linux_anchor_path: default_linux_anchor_path(),
            macos_keychain: default_macos_keychain(),
        }
    }
}

fn default_nss_nickname() -> String {
    "localtls Local CA".to_string()
}

fn default_linux_anchor_path() -> PathBuf {
    PathBuf::from("/usr/local/share/ca-certificates/localtls.crt")
}

fn default_macos_keychain() -> PathBuf {
    PathBuf::from("/Library/Keychains/System.keychain")
}

#[derive(Debug, Deserialize, Clone)]
pub struct LicenseConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_plan")]
    pub plan: String,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            token: None,
            plan: default_plan(),
        }
    }
}

fn default_api_base_url() -> String {
    "http://localhost:8081".to_string()
}

fn default_plan() -> String {
    "free".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `text` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = fs::read_to_string(path).map_err(|e| {
            CaError::Config(format!("failed to read config file {}: {}", path.display(), e))
        })?;

        let config: AppConfig = toml::from_str(&config_str).map_err(|e| {
            CaError::Config(format!("failed to parse config file {}: {}", path.display(), e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load `path`, falling back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Location of `config.toml` in the platform config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("localtls").join("config.toml"))
    }

    fn validate(&self) -> Result<()> {
        for (what, bits) in [("ca", self.ca.key_bits), ("leaf", self.leaf.key_bits)] {
            if bits < MIN_RSA_KEY_BITS {
                return Err(CaError::Config(format!(
                    "[{}] key_bits = {} is below the {}-bit minimum",
                    what, bits, MIN_RSA_KEY_BITS
                )));
            }
        }
        if self.ca.validity_days == 0 || self.leaf.validity_days == 0 {
            return Err(CaError::Config("validity_days must be positive".to_string()));
        }
        Ok(())
    }
}

/// On-disk layout rooted at the private application directory.
///
/// ```text
/// <root>/ca/ca.crt
/// <root>/ca/ca.key
/// <root>/certs/<sanitized-identifier>/cert.pem
/// <root>/certs/<sanitized-identifier>/key.pem
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub root: PathBuf,
    pub ca_dir: PathBuf,
    pub ca_cert: PathBuf,
    pub ca_key: PathBuf,
    pub certs_dir: PathBuf,
}

impl Paths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let ca_dir = root.join("ca");
        Self {
            ca_cert: ca_dir.join("ca.crt"),
            ca_key: ca_dir.join("ca.key"),
            certs_dir: root.join("certs"),
            ca_dir,
            root,
        }
    }

    /// Resolve the storage root: explicit flag, then the `LOCALTLS_HOME`
    /// value, then `[storage] root`, then `~/.localtls`.
    pub fn resolve(
        flag: Option<PathBuf>,
        env_value: Option<OsString>,
        config: &AppConfig,
    ) -> Result<Self> {
        if let Some(root) = flag {
            return Ok(Self::new(root));
        }
        if let Some(root) = env_value.filter(|v| !v.is_empty()) {
            return Ok(Self::new(root));
        }
        if let Some(root) = &config.storage.root {
            return Ok(Self::new(root.clone()));
        }
        let home = dirs::home_dir()
            .ok_or_else(|| CaError::Config("could not determine home directory".to_string()))?;
        Ok(Self::new(home.join(".localtls")))
    }
}
