//! System detection: GPU, driver, CUDA toolkit and distribution

pub mod distro;
pub mod host;

use crate::events::Reporter;
use crate::utils::command::{CommandResult, ProcessRunner};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::thread;
use std::time::Duration;
use tracing::info;

pub use distro::{DistroSupport, UNKNOWN_CODENAME};
pub use host::HostChecks;

pub const CODENAME_QUERY: &str = "lsb_release -cs";
pub const GPU_QUERY: &str = "lspci";
pub const DRIVER_QUERY: &str =
    "nvidia-smi --query-gpu=driver_version --format=csv,noheader,nounits";
pub const CUDA_QUERY: &str = "nvcc --version";

pub const NO_GPU: &str = "No NVIDIA GPU detected";
pub const NOT_INSTALLED: &str = "Not installed";
pub const UNKNOWN: &str = "Unknown";

static CUDA_RELEASE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"release\s+(\d+(?:\.\d+)*)").expect("static regex"));

/// Snapshot of the host produced by one probe run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemInfo {
    pub gpu_detected: bool,
    pub gpu_description: String,
    pub driver_installed: bool,
    pub driver_description: String,
    pub cuda_installed: bool,
    pub cuda_description: String,
    pub distro_codename: String,
}

impl Default for SystemInfo {
    /// State before any probe has run
    fn default() -> Self {
        Self {
            gpu_detected: false,
            gpu_description: UNKNOWN.to_string(),
            driver_installed: false,
            driver_description: UNKNOWN.to_string(),
            cuda_installed: false,
            cuda_description: UNKNOWN.to_string(),
            distro_codename: UNKNOWN_CODENAME.to_string(),
        }
    }
}

impl SystemInfo {
    pub fn distro_support(&self) -> DistroSupport {
        DistroSupport::classify(&self.distro_codename)
    }
}

/// Codename from `lsb_release -cs`
pub fn parse_codename(result: &CommandResult) -> Option<String> {
    result
        .non_empty_output()
        .and_then(|out| out.lines().next())
        .map(|line| line.trim().to_lowercase())
}

/// NVIDIA lines from `lspci`, trimmed and joined
pub fn parse_gpu(result: &CommandResult) -> Option<String> {
    if !result.success() {
        return None;
    }
    let lines: Vec<&str> = result
        .output
        .lines()
        .map(str::trim)
        .filter(|l| l.to_lowercase().contains("nvidia"))
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("; "))
    }
}

/// Driver version from `nvidia-smi` (first GPU on multi-GPU hosts)
pub fn parse_driver_version(result: &CommandResult) -> Option<String> {
    result
        .non_empty_output()
        .and_then(|out| out.lines().next())
        .map(|line| line.trim().to_string())
}

/// Toolkit version from `nvcc --version`.
///
/// `Some(None)` means nvcc answered but the release line was not recognised.
pub fn parse_cuda_version(result: &CommandResult) -> Option<Option<String>> {
    let out = result.non_empty_output()?;
    Some(
        CUDA_RELEASE
            .captures(out)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string()),
    )
}

/// Runs the fixed detection battery
pub struct Prober<'a> {
    runner: &'a dyn ProcessRunner,
    delay: Duration,
}

impl<'a> Prober<'a> {
    pub fn new(runner: &'a dyn ProcessRunner) -> Self {
        Self {
            runner,
            delay: Duration::ZERO,
        }
    }

    /// Pause between steps so progress stays readable
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Run every check in order and return a fresh snapshot
    pub fn probe(&self, reporter: &Reporter) -> SystemInfo {
        info!("Starting system probe");
        reporter.info("Detecting system components...");

        reporter.info("Detecting Linux distribution...");
        let distro_codename = match parse_codename(&self.runner.query(CODENAME_QUERY)) {
            Some(codename) => {
                reporter.success(format!("Distribution codename: {}", codename));
                codename
            }
            None => {
                reporter.warning("Unable to detect distribution codename");
                UNKNOWN_CODENAME.to_string()
            }
        };
        self.pause();

        reporter.info("Checking for NVIDIA GPU...");
        let (gpu_detected, gpu_description) = match parse_gpu(&self.runner.query(GPU_QUERY)) {
            Some(lines) => {
                let description = format!("Detected: {}", lines);
                reporter.success(description.clone());
                (true, description)
            }
            None => {
                reporter.error(NO_GPU);
                (false, NO_GPU.to_string())
            }
        };
        self.pause();

        reporter.info("Checking driver status...");
        let (driver_installed, driver_description) =
            match parse_driver_version(&self.runner.query(DRIVER_QUERY)) {
                Some(version) => {
                    let description = format!("Installed: Version {}", version);
                    reporter.success(format!("NVIDIA driver {}", description.to_lowercase()));
                    (true, description)
                }
                None => {
                    reporter.warning("NVIDIA driver not installed");
                    (false, NOT_INSTALLED.to_string())
                }
            };
        self.pause();

        reporter.info("Checking CUDA status...");
        let (cuda_installed, cuda_description) =
            match parse_cuda_version(&self.runner.query(CUDA_QUERY)) {
                Some(version) => {
                    let description = match version {
                        Some(v) => format!("Installed: CUDA {}", v),
                        None => "Installed: CUDA (unknown version)".to_string(),
                    };
                    reporter.success(description.clone());
                    (true, description)
                }
                None => {
                    reporter.warning("CUDA toolkit not installed");
                    (false, NOT_INSTALLED.to_string())
                }
            };

        reporter.info("System detection completed.");

        SystemInfo {
            gpu_detected,
            gpu_description,
            driver_installed,
            driver_description,
            cuda_installed,
            cuda_description,
            distro_codename,
        }
    }

    fn pause(&self) {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
    }
}
