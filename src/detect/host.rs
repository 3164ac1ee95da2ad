//! Host environment checks used before an install run
//!
//! Each check is one read-only command whose output is interpreted by a pure
//! function, so the interpretation can be tested without the real tools.

use crate::utils::command::{CommandResult, ProcessRunner};
use tracing::debug;

pub const WSL_CHECK: &str = "cat /proc/version";
pub const FREE_SPACE_CHECK: &str = "df -Pk /";
pub const SECURE_BOOT_CHECK: &str = "mokutil --sb-state";

/// WSL kernels carry "microsoft" in their version string
pub fn is_wsl_kernel(proc_version: &CommandResult) -> bool {
    proc_version.success() && proc_version.output.to_lowercase().contains("microsoft")
}

/// Available KiB from `df -Pk /` (fourth column of the last line)
pub fn parse_free_kb(df: &CommandResult) -> Option<u64> {
    if !df.success() {
        return None;
    }
    df.output
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())?
        .split_whitespace()
        .nth(3)?
        .parse()
        .ok()
}

pub fn is_secure_boot_enabled(sb_state: &CommandResult) -> bool {
    sb_state.success() && sb_state.output.to_lowercase().contains("enabled")
}

pub fn connectivity_check(host: &str) -> String {
    format!("ping -c 1 -W 5 {} >/dev/null 2>&1", host)
}

/// Read-only host checks run through a [`ProcessRunner`]
pub struct HostChecks<'a> {
    runner: &'a dyn ProcessRunner,
}

impl<'a> HostChecks<'a> {
    pub fn new(runner: &'a dyn ProcessRunner) -> Self {
        Self { runner }
    }

    pub fn is_wsl(&self) -> bool {
        let wsl = is_wsl_kernel(&self.runner.query(WSL_CHECK));
        debug!("WSL kernel: {}", wsl);
        wsl
    }

    pub fn free_kb(&self) -> Option<u64> {
        parse_free_kb(&self.runner.query(FREE_SPACE_CHECK))
    }

    pub fn secure_boot_enabled(&self) -> bool {
        is_secure_boot_enabled(&self.runner.query(SECURE_BOOT_CHECK))
    }

    pub fn has_connectivity(&self, host: &str) -> bool {
        self.runner.query(&connectivity_check(host)).success()
    }
}
