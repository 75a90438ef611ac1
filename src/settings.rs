use crate::error::BootstrapError;
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SETTINGS_VERSION: u32 = 1;
pub const DEFAULT_RUNTIME_URL: &str = "http://127.0.0.1:16688";
pub const DEFAULT_API_PREFIX: &str = "/aog/v0.3";
pub const DEFAULT_CONSENT_PORT: u16 = 5000;
pub const DEFAULT_DOWNLOAD_URL: &str = "http://120.232.136.73:31619/aogdev/aog.exe";
pub const DEFAULT_INSTALL_FOLDER: &str = "~/AOG";
pub const DEFAULT_CONFIG_FILE_NAME: &str = ".aog";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub version: u32,
    pub runtime: RuntimeSettings,
    pub consent: ConsentSettings,
    pub install: InstallSettings,
    pub launch: LaunchSettings,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeSettings {
    pub base_url: String,
    pub api_prefix: String,
    pub probe_timeout_ms: u64,
    /// Empty means the platform default (`aog.exe` on Windows, `aog` elsewhere).
    pub executable_name: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConsentMode {
    Browser,
    Terminal,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConsentSettings {
    pub port: u16,
    pub timeout_sec: u64,
    pub mode: ConsentMode,
    pub open_browser: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct InstallSettings {
    pub download_url: String,
    pub folder: String,
    pub download_timeout_sec: u64,
    pub register_search_path: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LaunchSettings {
    pub ready_timeout_sec: u64,
    pub poll_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            runtime: RuntimeSettings::default(),
            consent: ConsentSettings::default(),
            install: InstallSettings::default(),
            launch: LaunchSettings::default(),
        }
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_RUNTIME_URL.to_string(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            probe_timeout_ms: 3_000,
            executable_name: String::new(),
        }
    }
}

impl Default for ConsentSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_CONSENT_PORT,
            timeout_sec: 300,
            mode: ConsentMode::Browser,
            open_browser: true,
        }
    }
}

impl Default for InstallSettings {
    fn default() -> Self {
        Self {
            download_url: DEFAULT_DOWNLOAD_URL.to_string(),
            folder: DEFAULT_INSTALL_FOLDER.to_string(),
            download_timeout_sec: 600,
            register_search_path: true,
        }
    }
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            ready_timeout_sec: 3,
            poll_interval_ms: 250,
        }
    }
}

impl RuntimeSettings {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn executable_file_name(&self) -> String {
        if self.executable_name.trim().is_empty() {
            format!("aog{}", env::consts::EXE_SUFFIX)
        } else {
            self.executable_name.trim().to_string()
        }
    }
}

impl ConsentSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_sec)
    }
}

impl LaunchSettings {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_sec)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Base URL and API prefix of the local runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEndpoint {
    base_url: String,
    api_prefix: String,
}

impl RuntimeEndpoint {
    pub fn new(base_url: &str, api_prefix: &str) -> Self {
        let prefix = api_prefix.trim().trim_end_matches('/');
        let api_prefix = if prefix.is_empty() || prefix.starts_with('/') {
            prefix.to_string()
        } else {
            format!("/{prefix}")
        };
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            api_prefix,
        }
    }

    pub fn from_settings(settings: &RuntimeSettings) -> Self {
        Self::new(&settings.base_url, &settings.api_prefix)
    }

    pub fn root_url(&self) -> String {
        format!("{}/", self.base_url)
    }

    pub fn service_provider_url(&self) -> String {
        format!("{}{}/service_provider", self.base_url, self.api_prefix)
    }
}

/// Folder the runtime is installed into and the executable inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLocation {
    pub folder: PathBuf,
    pub executable: PathBuf,
}

impl InstallLocation {
    pub fn from_settings(settings: &Settings) -> Result<Self, BootstrapError> {
        let folder = expand_home_path(&settings.install.folder, "install.folder")?;
        let executable = folder.join(settings.runtime.executable_file_name());
        Ok(Self { folder, executable })
    }

    pub fn partial_download_path(&self) -> PathBuf {
        let mut name = self
            .executable
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".part");
        self.folder.join(name)
    }
}

pub fn resolve_settings_path(override_path: Option<&PathBuf>) -> PathBuf {
    if let Some(path) = override_path {
        return path.clone();
    }
    if let Ok(path) = env::var("AOG_CHECKER_CONFIG") {
        return PathBuf::from(path);
    }
    let mut base = default_settings_dir();
    base.push("config.yaml");
    base
}

fn default_settings_dir() -> PathBuf {
    if let Ok(path) = env::var("AOG_CHECKER_CONFIG_DIR") {
        return PathBuf::from(path);
    }
    let mut base = home_dir().unwrap_or_else(|| PathBuf::from("."));
    base.push(".config");
    base.push("aog-checker");
    base
}

/// `<cwd>/.aog`, the conventional service provider file.
pub fn default_config_file() -> Result<PathBuf, BootstrapError> {
    Ok(env::current_dir()?.join(DEFAULT_CONFIG_FILE_NAME))
}

pub fn expand_home_path(input: &str, field: &str) -> Result<PathBuf, BootstrapError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(BootstrapError::Config(format!("{field} must not be empty")));
    }
    if trimmed == "~" || trimmed.starts_with("~/") {
        let home = home_dir().ok_or_else(|| {
            BootstrapError::Config(format!(
                "{field} uses '~' but the home directory could not be determined"
            ))
        })?;
        if trimmed == "~" {
            return Ok(home);
        }
        return Ok(home.join(&trimmed[2..]));
    }
    Ok(PathBuf::from(trimmed))
}

pub fn read_settings_from_str(content: &str) -> Result<Settings, BootstrapError> {
    let settings: Settings = serde_yaml::from_str(content)?;
    if settings.version != SETTINGS_VERSION {
        return Err(BootstrapError::Config(format!(
            "unsupported config version {}",
            settings.version
        )));
    }
    validate_settings(&settings)?;
    Ok(settings)
}

pub fn read_settings(path: &Path) -> Result<Settings, BootstrapError> {
    let content = fs::read_to_string(path)?;
    read_settings_from_str(&content)
}

/// Reads the settings file, falling back to defaults when it does not exist.
pub fn load_settings(path: &Path) -> Result<Settings, BootstrapError> {
    if path.exists() {
        read_settings(path)
    } else {
        Ok(Settings::default())
    }
}

pub fn build_default_settings_yaml() -> Result<String, BootstrapError> {
    Ok(serde_yaml::to_string(&Settings::default())?)
}

pub fn validate_settings(settings: &Settings) -> Result<(), BootstrapError> {
    validate_http_url(&settings.runtime.base_url, "runtime.base_url")?;
    validate_http_url(&settings.install.download_url, "install.download_url")?;
    if settings.runtime.probe_timeout_ms == 0 {
        return Err(BootstrapError::Config(
            "runtime.probe_timeout_ms must be greater than 0".to_string(),
        ));
    }
    if settings.consent.timeout_sec == 0 {
        return Err(BootstrapError::Config(
            "consent.timeout_sec must be greater than 0".to_string(),
        ));
    }
    if settings.install.download_timeout_sec == 0 {
        return Err(BootstrapError::Config(
            "install.download_timeout_sec must be greater than 0".to_string(),
        ));
    }
    if settings.launch.poll_interval_ms == 0 {
        return Err(BootstrapError::Config(
            "launch.poll_interval_ms must be greater than 0".to_string(),
        ));
    }
    let name = settings.runtime.executable_name.trim();
    if name.contains('/') || name.contains('\\') {
        return Err(BootstrapError::Config(
            "runtime.executable_name must be a file name, not a path".to_string(),
        ));
    }
    let _ = expand_home_path(&settings.install.folder, "install.folder")?;
    Ok(())
}

fn validate_http_url(value: &str, field: &str) -> Result<(), BootstrapError> {
    let url = reqwest::Url::parse(value.trim())
        .map_err(|err| BootstrapError::Config(format!("{field} is not a valid URL: {err}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(BootstrapError::Config(format!(
            "{field} must use http or https, got '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_for_minimal_file() {
        let settings = read_settings_from_str("version: 1").expect("settings");
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.runtime.base_url, "http://127.0.0.1:16688");
        assert_eq!(settings.consent.port, 5000);
        assert_eq!(settings.consent.timeout_sec, 300);
        assert_eq!(settings.runtime.probe_timeout(), Duration::from_secs(3));
        assert_eq!(settings.launch.ready_timeout(), Duration::from_secs(3));
        assert_eq!(settings.consent.mode, ConsentMode::Browser);
    }

    #[test]
    fn unknown_field_errors() {
        let yaml = "version: 1\nconsent:\n  port: 5001\n  retries: 3\n";
        assert!(read_settings_from_str(yaml).is_err());
    }

    #[test]
    fn unsupported_version_errors() {
        let err = read_settings_from_str("version: 7").expect_err("version 7 should fail");
        assert!(err.to_string().contains("unsupported config version 7"));
    }

    #[test]
    fn zero_consent_timeout_is_rejected() {
        let yaml = "version: 1\nconsent:\n  timeout_sec: 0\n";
        let err = read_settings_from_str(yaml).expect_err("zero timeout should fail");
        assert!(err.to_string().contains("consent.timeout_sec"));
    }

    #[test]
    fn non_http_download_url_is_rejected() {
        let yaml = "version: 1\ninstall:\n  download_url: ftp://example.com/aog\n";
        let err = read_settings_from_str(yaml).expect_err("ftp should fail");
        assert!(err.to_string().contains("install.download_url"));
    }

    #[test]
    fn consent_mode_parses_snake_case() {
        let yaml = "version: 1\nconsent:\n  mode: terminal\n  open_browser: false\n";
        let settings = read_settings_from_str(yaml).expect("settings");
        assert_eq!(settings.consent.mode, ConsentMode::Terminal);
        assert!(!settings.consent.open_browser);
    }

    #[test]
    fn default_yaml_round_trips() {
        let yaml = build_default_settings_yaml().expect("yaml");
        let settings = read_settings_from_str(&yaml).expect("settings");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn endpoint_normalizes_slashes() {
        let endpoint = RuntimeEndpoint::new("http://127.0.0.1:16688/", "aog/v0.2/");
        assert_eq!(endpoint.root_url(), "http://127.0.0.1:16688/");
        assert_eq!(
            endpoint.service_provider_url(),
            "http://127.0.0.1:16688/aog/v0.2/service_provider"
        );
    }

    #[test]
    fn default_endpoint_probes_v03_service_provider() {
        let endpoint = RuntimeEndpoint::from_settings(&Settings::default().runtime);
        assert_eq!(
            endpoint.service_provider_url(),
            "http://127.0.0.1:16688/aog/v0.3/service_provider"
        );
    }

    #[test]
    fn install_location_uses_executable_name() {
        let mut settings = Settings::default();
        settings.install.folder = "/opt/aog-test".to_string();
        settings.runtime.executable_name = "aog-runtime".to_string();
        let location = InstallLocation::from_settings(&settings).expect("location");
        assert_eq!(location.folder, PathBuf::from("/opt/aog-test"));
        assert_eq!(
            location.executable,
            PathBuf::from("/opt/aog-test/aog-runtime")
        );
        assert_eq!(
            location.partial_download_path(),
            PathBuf::from("/opt/aog-test/aog-runtime.part")
        );
    }

    #[test]
    fn expand_tilde_works() {
        let expanded = expand_home_path("~/AOG", "install.folder").expect("expand");
        assert!(!expanded.starts_with("~"));
        assert!(expanded.ends_with("AOG"));
    }
}
