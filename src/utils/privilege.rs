//! Proof of privilege for install runs
//!
//! The password is piped to `sudo` once to refresh its credential cache and
//! dropped immediately afterwards. Privileged steps then run through
//! `sudo -n`, which fails instead of prompting when the cache has expired.

use crate::utils::error::{NvsetupError, Result};
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Root,
    Sudo,
    Simulated,
}

/// Evidence that privileged commands can be run.
///
/// Only obtainable through [`Elevation::verify`], [`Elevation::current_root`]
/// or, for dry runs, [`Elevation::simulated`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Elevation {
    mode: Mode,
}

impl Elevation {
    /// Succeeds when the process already runs with euid 0
    pub fn current_root() -> Option<Self> {
        nix::unistd::geteuid().is_root().then_some(Self { mode: Mode::Root })
    }

    /// Check the password against `sudo` and prime its credential cache
    pub fn verify(password: String) -> Result<Self> {
        debug!("Verifying sudo access");

        let mut child = Command::new("sudo")
            .args(["-S", "-v", "-p", ""])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    NvsetupError::CommandNotFound("sudo".to_string())
                } else {
                    NvsetupError::Io(e)
                }
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A failed write means sudo already exited; its status decides
            let _ = stdin.write_all(password.as_bytes());
            let _ = stdin.write_all(b"\n");
        }
        drop(password);

        let status = child.wait()?;
        if !status.success() {
            return Err(NvsetupError::PrivilegeDenied);
        }

        info!("sudo access verified");
        Ok(Self { mode: Mode::Sudo })
    }

    /// Stand-in for dry runs, where nothing privileged is executed
    pub fn simulated() -> Self {
        Self {
            mode: Mode::Simulated,
        }
    }

    pub fn is_simulated(&self) -> bool {
        self.mode == Mode::Simulated
    }

    pub fn is_root(&self) -> bool {
        self.mode == Mode::Root
    }

    /// Prefix for privileged commands
    pub fn prefix(&self) -> &'static str {
        match self.mode {
            Mode::Root => "",
            Mode::Sudo | Mode::Simulated => "sudo -n ",
        }
    }

    /// Wrap a single program invocation so it runs privileged
    pub fn wrap(&self, command: &str) -> String {
        format!("{}{}", self.prefix(), command)
    }
}
