//! Tool settings: package names, thresholds and pacing

use crate::utils::error::{NvsetupError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Placeholder in [`Settings::keyring_url`] replaced by the distro codename
pub const CODENAME_PLACEHOLDER: &str = "{codename}";

/// Runtime settings, loadable from TOML
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Maximum number of retained log lines
    #[serde(default = "default_max_log_lines")]
    pub max_log_lines: usize,
    /// Pause between probe steps, purely cosmetic (0 disables)
    #[serde(default = "default_probe_delay_ms")]
    pub probe_delay_ms: u64,
    /// Host pinged before mutating the system
    #[serde(default = "default_connectivity_host")]
    pub connectivity_host: String,
    /// Free space on / below which a warning is logged (KiB)
    #[serde(default = "default_min_free_kb")]
    pub min_free_kb: u64,
    /// Packages installed before any vendor repository is added
    #[serde(default = "default_prerequisites")]
    pub prerequisites: Vec<String>,
    /// Driver meta-package from the vendor repository
    #[serde(default = "default_driver_package")]
    pub driver_package: String,
    /// CUDA toolkit package
    #[serde(default = "default_cuda_package")]
    pub cuda_package: String,
    /// Keyring package URL; must contain `{codename}`
    #[serde(default = "default_keyring_url")]
    pub keyring_url: String,
    /// File name the keyring package is downloaded to
    #[serde(default = "default_keyring_file")]
    pub keyring_file: String,
    /// System-wide shell profile fragment receiving the CUDA paths
    #[serde(default = "default_cuda_profile")]
    pub cuda_profile: String,
    /// CUDA installation prefix
    #[serde(default = "default_cuda_home")]
    pub cuda_home: String,
    /// Kill a mutating step after this many seconds (None = wait forever)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_timeout_secs: Option<u64>,
}

fn default_max_log_lines() -> usize {
    1000
}

fn default_probe_delay_ms() -> u64 {
    500
}

fn default_connectivity_host() -> String {
    "8.8.8.8".to_string()
}

fn default_min_free_kb() -> u64 {
    2_000_000
}

fn default_prerequisites() -> Vec<String> {
    [
        "software-properties-common",
        "apt-transport-https",
        "ca-certificates",
        "curl",
        "wget",
        "gnupg",
        "lsb-release",
        "build-essential",
        "dkms",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_driver_package() -> String {
    "cuda-drivers".to_string()
}

fn default_cuda_package() -> String {
    "cuda-toolkit-12-6".to_string()
}

fn default_keyring_url() -> String {
    "https://developer.download.nvidia.com/compute/cuda/repos/{codename}/x86_64/cuda-keyring_1.1-1_all.deb"
        .to_string()
}

fn default_keyring_file() -> String {
    "cuda-keyring_1.1-1_all.deb".to_string()
}

fn default_cuda_profile() -> String {
    "/etc/profile.d/cuda.sh".to_string()
}

fn default_cuda_home() -> String {
    "/usr/local/cuda".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_log_lines: default_max_log_lines(),
            probe_delay_ms: default_probe_delay_ms(),
            connectivity_host: default_connectivity_host(),
            min_free_kb: default_min_free_kb(),
            prerequisites: default_prerequisites(),
            driver_package: default_driver_package(),
            cuda_package: default_cuda_package(),
            keyring_url: default_keyring_url(),
            keyring_file: default_keyring_file(),
            cuda_profile: default_cuda_profile(),
            cuda_home: default_cuda_home(),
            step_timeout_secs: None,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Write these settings to `path` as TOML
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load from `path` when given, defaults otherwise
    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    /// Sample configuration written by `generate-config`
    pub fn sample() -> Self {
        Self {
            step_timeout_secs: Some(3600),
            ..Self::default()
        }
    }

    pub fn probe_delay(&self) -> Duration {
        Duration::from_millis(self.probe_delay_ms)
    }

    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_secs.map(Duration::from_secs)
    }

    /// Keyring download URL for a distro codename
    pub fn keyring_url_for(&self, codename: &str) -> String {
        self.keyring_url.replace(CODENAME_PLACEHOLDER, codename)
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        if self.max_log_lines == 0 {
            return Err(NvsetupError::ValidationError(
                "max_log_lines must be at least 1".to_string(),
            ));
        }

        if self.connectivity_host.trim().is_empty() {
            return Err(NvsetupError::ValidationError(
                "connectivity_host cannot be empty".to_string(),
            ));
        }

        for (name, value) in [
            ("driver_package", &self.driver_package),
            ("cuda_package", &self.cuda_package),
            ("keyring_file", &self.keyring_file),
            ("cuda_profile", &self.cuda_profile),
            ("cuda_home", &self.cuda_home),
        ] {
            if value.trim().is_empty() {
                return Err(NvsetupError::ValidationError(format!(
                    "{} cannot be empty",
                    name
                )));
            }
        }

        if self.prerequisites.iter().any(|p| p.trim().is_empty()) {
            return Err(NvsetupError::ValidationError(
                "prerequisites cannot contain empty package names".to_string(),
            ));
        }

        if !self.keyring_url.contains(CODENAME_PLACEHOLDER) {
            return Err(NvsetupError::ValidationError(format!(
                "keyring_url must contain {}",
                CODENAME_PLACEHOLDER
            )));
        }

        if self.step_timeout_secs == Some(0) {
            return Err(NvsetupError::ConfigError(
                "step_timeout_secs must be positive; omit it to disable the timeout".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.max_log_lines, 1000);
        assert_eq!(settings.min_free_kb, 2_000_000);
        assert_eq!(settings.step_timeout(), None);
    }

    #[test]
    fn keyring_url_substitutes_codename() {
        let settings = Settings::default();
        assert_eq!(
            settings.keyring_url_for("jammy"),
            "https://developer.download.nvidia.com/compute/cuda/repos/jammy/x86_64/cuda-keyring_1.1-1_all.deb"
        );
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_log_lines = 50\ncuda_package = \"cuda-toolkit-12-4\"").unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.max_log_lines, 50);
        assert_eq!(settings.cuda_package, "cuda-toolkit-12-4");
        assert_eq!(settings.driver_package, "cuda-drivers");
        assert_eq!(settings.probe_delay(), Duration::from_millis(500));
    }

    #[test]
    fn written_sample_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nvsetup.toml");

        let sample = Settings::sample();
        sample.write_to(&path).unwrap();
        let parsed = Settings::from_file(&path).unwrap();

        assert_eq!(parsed, sample);
        assert_eq!(parsed.step_timeout(), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn write_to_missing_directory_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("nvsetup.toml");
        assert!(matches!(Settings::sample().write_to(&path), Err(NvsetupError::Io(_))));
    }

    #[test]
    fn rejects_zero_log_cap() {
        let settings = Settings {
            max_log_lines: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_url_without_codename() {
        let settings = Settings {
            keyring_url: "https://example.invalid/keyring.deb".to_string(),
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(NvsetupError::ValidationError(_))));
    }

    #[test]
    fn rejects_zero_timeout() {
        let settings = Settings {
            step_timeout_secs: Some(0),
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(NvsetupError::ConfigError(_))));
    }
}
