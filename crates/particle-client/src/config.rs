//! Device configuration loading
//!
//! Resolves the device identity, credentials and API base URL from the two
//! JSON files Particle's Linux tooling writes on a provisioned device:
//!
//! - the device config file (`access_token`, `username`, `deviceID`/`deviceId`,
//!   `productId`, `api_base_url`)
//! - the distro versions file (`{distro: {...}, src: {...}}`)
//!
//! When either file is missing the SDK switches to emulation mode and uses the
//! fixed mock values below, so it can run on a development host.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ParticleError, Result};

/// Default Particle cloud API base URL
pub const DEFAULT_API_BASE_URL: &str = "https://api.particle.io/v1";
/// Default location of the device config file
pub const DEFAULT_CONFIG_PATH: &str = "/home/particle/.particle/particle.config.json";
/// Default location of the distro versions file
pub const DEFAULT_DISTRO_VERSIONS_PATH: &str = "/etc/particle/distro_versions.json";
/// Environment variable overriding [`DEFAULT_CONFIG_PATH`]
pub const CONFIG_PATH_ENV: &str = "CONFIG_PATH";
/// Environment variable overriding [`DEFAULT_DISTRO_VERSIONS_PATH`]
pub const DISTRO_VERSIONS_PATH_ENV: &str = "DISTRO_VERSIONS_PATH";

const UNKNOWN: &str = "Unknown";

/// Locations of the two files the SDK reads at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    pub config_path: PathBuf,
    pub distro_versions_path: PathBuf,
}

impl ConfigPaths {
    pub fn new(config_path: impl Into<PathBuf>, distro_versions_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            distro_versions_path: distro_versions_path.into(),
        }
    }

    /// Resolve paths from `CONFIG_PATH` / `DISTRO_VERSIONS_PATH`, falling back
    /// to the on-device defaults
    pub fn from_env() -> Self {
        let config_path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        let distro_versions_path = std::env::var_os(DISTRO_VERSIONS_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DISTRO_VERSIONS_PATH));

        Self {
            config_path,
            distro_versions_path,
        }
    }
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIG_PATH, DEFAULT_DISTRO_VERSIONS_PATH)
    }
}

/// Device identity and credentials
///
/// Immutable after load. Empty strings and nulls in the file are treated as
/// absent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawDeviceConfig")]
pub struct DeviceConfig {
    pub access_token: Option<String>,
    pub username: String,
    pub device_id: Option<String>,
    pub product_id: Option<String>,
    pub api_base_url: String,
}

/// The config file as written; both spellings of the device id key occur
#[derive(Deserialize)]
struct RawDeviceConfig {
    #[serde(default, deserialize_with = "non_empty_string")]
    access_token: Option<String>,
    #[serde(default, deserialize_with = "non_empty_string")]
    username: Option<String>,
    #[serde(default, rename = "deviceId", deserialize_with = "non_empty_string")]
    device_id: Option<String>,
    #[serde(default, rename = "deviceID", deserialize_with = "non_empty_string")]
    legacy_device_id: Option<String>,
    #[serde(default, rename = "productId", deserialize_with = "non_empty_string")]
    product_id: Option<String>,
    #[serde(default, deserialize_with = "non_empty_string")]
    api_base_url: Option<String>,
}

impl From<RawDeviceConfig> for DeviceConfig {
    fn from(raw: RawDeviceConfig) -> Self {
        Self {
            access_token: raw.access_token,
            username: raw.username.unwrap_or_else(unknown_username),
            device_id: raw.device_id.or(raw.legacy_device_id),
            product_id: raw.product_id,
            api_base_url: raw.api_base_url.unwrap_or_else(default_api_base_url),
        }
    }
}

impl DeviceConfig {
    /// The fixed configuration used in emulation mode
    pub fn emulated() -> Self {
        Self {
            access_token: Some("mock_access_token".to_string()),
            username: "emulated_user@particle.io".to_string(),
            device_id: Some("mock_device_id".to_string()),
            product_id: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
        }
    }

    /// Parse a device config document
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            username: unknown_username(),
            device_id: None,
            product_id: None,
            api_base_url: default_api_base_url(),
        }
    }
}

fn unknown_username() -> String {
    UNKNOWN.to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

/// Accepts a string or a number (product ids are numeric in the cloud API)
fn non_empty_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Local OS and firmware version metadata
///
/// Any JSON document is accepted; lookups that miss simply return `None`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct DistroVersions(Value);

impl DistroVersions {
    pub fn new(document: Value) -> Self {
        Self(document)
    }

    /// The empty document used when the file is unreadable
    pub fn empty() -> Self {
        Self(Value::Object(Default::default()))
    }

    /// The fixed document used in emulation mode
    pub fn emulated() -> Self {
        Self(serde_json::json!({
            "distro": {
                "stack": "emulated-stack",
                "version": "0.0.1-emulated",
                "variant": "emulated"
            },
            "src": {
                "ubuntu_20_04": "mock-image",
                "quectel_bp_fw": "mock-fw",
                "syscon_firmware": "mock-syscon"
            }
        }))
    }

    /// Look up `section.key`, e.g. `get("distro", "stack")`
    pub fn get(&self, section: &str, key: &str) -> Option<&Value> {
        self.0.get(section)?.get(key)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// Result of resolving configuration at startup
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub device: DeviceConfig,
    pub distro: DistroVersions,
    /// Set when either file was missing and mock values were substituted
    pub emulated: bool,
}

impl LoadedConfig {
    /// A configuration in emulation mode with the mock values
    pub fn emulated() -> Self {
        Self {
            device: DeviceConfig::emulated(),
            distro: DistroVersions::emulated(),
            emulated: true,
        }
    }
}

/// Load configuration from the given paths
///
/// A missing file selects emulation mode. An unreadable or malformed config
/// file is fatal; an unreadable or malformed distro file yields an empty
/// document.
pub fn load(paths: &ConfigPaths) -> Result<LoadedConfig> {
    let config_present = paths.config_path.exists();
    let distro_present = paths.distro_versions_path.exists();

    if !(config_present && distro_present) {
        warn!(
            config_path = %paths.config_path.display(),
            config_present,
            distro_path = %paths.distro_versions_path.display(),
            distro_present,
            "Running in EMULATION mode: config and distro files are missing"
        );
        log_directory_listing(&paths.config_path);
        log_directory_listing(&paths.distro_versions_path);
        return Ok(LoadedConfig::emulated());
    }

    let device = load_device_config(&paths.config_path)?;
    let distro = load_distro_versions(&paths.distro_versions_path);
    debug!(
        device_id = ?device.device_id,
        product_id = ?device.product_id,
        api_base_url = %device.api_base_url,
        "Loaded device configuration"
    );

    Ok(LoadedConfig {
        device,
        distro,
        emulated: false,
    })
}

fn load_device_config(path: &Path) -> Result<DeviceConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ParticleError::config_load(path, e.to_string()))?;
    DeviceConfig::from_json(&content).map_err(|e| ParticleError::config_load(path, e.to_string()))
}

fn load_distro_versions(path: &Path) -> DistroVersions {
    let parsed = std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|content| serde_json::from_str::<Value>(&content).map_err(|e| e.to_string()));

    match parsed {
        Ok(document) => DistroVersions::new(document),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable distro versions file");
            DistroVersions::empty()
        }
    }
}

/// Log what is present next to a missing file, to help diagnose provisioning
fn log_directory_listing(file: &Path) {
    let Some(dir) = file.parent() else {
        return;
    };

    match std::fs::read_dir(dir) {
        Ok(entries) => {
            let names: Vec<String> = entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect();
            debug!(dir = %dir.display(), entries = ?names, "Directory contents");
        }
        Err(e) => debug!(dir = %dir.display(), error = %e, "Directory not readable"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_full_config() {
        let config = DeviceConfig::from_json(
            r#"{
                "access_token": "tok",
                "username": "dev@example.com",
                "deviceID": "abc123",
                "productId": 4242,
                "api_base_url": "https://api.example.com/v1"
            }"#,
        )
        .unwrap();

        assert_eq!(config.access_token.as_deref(), Some("tok"));
        assert_eq!(config.username, "dev@example.com");
        assert_eq!(config.device_id.as_deref(), Some("abc123"));
        assert_eq!(config.product_id.as_deref(), Some("4242"));
        assert_eq!(config.api_base_url, "https://api.example.com/v1");
    }

    #[test]
    fn test_defaults_for_absent_fields() {
        let config = DeviceConfig::from_json("{}").unwrap();
        assert_eq!(config, DeviceConfig::default());
        assert_eq!(config.username, "Unknown");
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
    }

    #[test]
    fn test_device_id_camel_case_and_empty() {
        let config = DeviceConfig::from_json(r#"{"deviceId": "xyz"}"#).unwrap();
        assert_eq!(config.device_id.as_deref(), Some("xyz"));

        let config = DeviceConfig::from_json(r#"{"deviceId": "", "productId": null}"#).unwrap();
        assert_eq!(config.device_id, None);
        assert_eq!(config.product_id, None);
    }

    #[test]
    fn test_both_device_id_keys_prefer_camel_case() {
        let config =
            DeviceConfig::from_json(r#"{"deviceID": "legacy", "deviceId": "current"}"#).unwrap();
        assert_eq!(config.device_id.as_deref(), Some("current"));

        let config =
            DeviceConfig::from_json(r#"{"deviceID": "legacy", "deviceId": ""}"#).unwrap();
        assert_eq!(config.device_id.as_deref(), Some("legacy"));
    }

    #[test]
    fn test_null_fields_fall_back_to_defaults() {
        let config =
            DeviceConfig::from_json(r#"{"username": null, "api_base_url": null}"#).unwrap();
        assert_eq!(config.username, "Unknown");
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
    }

    #[test]
    fn test_distro_lookup() {
        let distro = DistroVersions::emulated();
        assert_eq!(
            distro.get("distro", "stack").and_then(Value::as_str),
            Some("emulated-stack")
        );
        assert!(distro.get("src", "missing").is_none());
        assert!(DistroVersions::empty().get("distro", "stack").is_none());

        // Non-object sections behave like missing ones
        let odd = DistroVersions::new(serde_json::json!({"distro": "flat"}));
        assert!(odd.get("distro", "stack").is_none());
    }

    #[test]
    fn test_default_paths() {
        let paths = ConfigPaths::default();
        assert_eq!(paths.config_path, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert_eq!(
            paths.distro_versions_path,
            PathBuf::from(DEFAULT_DISTRO_VERSIONS_PATH)
        );
    }
}
