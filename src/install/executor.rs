//! Install run executor: gates, advisories, steps and cleanup

use super::outcome::{AbortReason, RunOutcome, RunState};
use super::plan::{
    artifact_cleanup_command, plan_steps, remediation_command, InstallRequest, InstallStep,
};
use crate::config::Settings;
use crate::detect::{DistroSupport, HostChecks, SystemInfo};
use crate::events::Reporter;
use crate::utils::command::{ProcessRunner, TIMED_OUT};
use crate::utils::privilege::Elevation;
use crate::utils::signal::CancelToken;
use tracing::{debug, info, warn};

/// Runs the cleanup commands when an install run ends, whichever way it ends.
///
/// The remediation only runs once armed by a failure; neither command's
/// result affects the outcome.
struct CleanupGuard<'a> {
    runner: &'a dyn ProcessRunner,
    reporter: Reporter,
    artifact_cleanup: String,
    remediation: String,
    remediate: bool,
}

impl<'a> CleanupGuard<'a> {
    fn arm(&mut self) {
        self.remediate = true;
    }
}

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        if self.remediate {
            self.reporter.info("Cleaning up partial installation...");
            let result = self.runner.execute(&self.remediation);
            debug!("Remediation exited with {}", result.status);
        }
        let result = self.runner.execute(&self.artifact_cleanup);
        debug!("Artifact cleanup exited with {}", result.status);
    }
}

/// Executes one install run
pub struct Installer<'a> {
    runner: &'a dyn ProcessRunner,
    settings: &'a Settings,
    elevation: &'a Elevation,
    cancel: CancelToken,
    state: RunState,
}

impl<'a> Installer<'a> {
    pub fn new(
        runner: &'a dyn ProcessRunner,
        settings: &'a Settings,
        elevation: &'a Elevation,
    ) -> Self {
        Self {
            runner,
            settings,
            elevation,
            cancel: CancelToken::new(),
            state: RunState::Idle,
        }
    }

    /// Stop between steps once `cancel` fires
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Run the whole installation and return its terminal outcome.
    ///
    /// An installer runs once; calling this again after a terminal state
    /// returns the same abort without touching the system.
    pub fn run(
        &mut self,
        request: &InstallRequest,
        system: &SystemInfo,
        reporter: &mut Reporter,
    ) -> RunOutcome {
        if self.state != RunState::Idle {
            warn!("Installer reused after reaching {:?}", self.state);
            return self.outcome_of_state();
        }

        info!("Starting installation of {}", request);
        reporter.info("Starting installation process...");
        self.transition(RunState::Gating);

        if let Some(reason) = self.check_gates(request, system, reporter) {
            reporter.error(reason.to_string());
            self.transition(RunState::Aborted(reason.clone()));
            return RunOutcome::Aborted(reason);
        }

        let steps = plan_steps(request, &system.distro_codename, self.settings, self.elevation);
        self.execute_steps(&steps, reporter)
    }

    fn execute_steps(&mut self, steps: &[InstallStep], reporter: &mut Reporter) -> RunOutcome {
        let mut guard = CleanupGuard {
            runner: self.runner,
            reporter: reporter.clone(),
            artifact_cleanup: artifact_cleanup_command(self.settings),
            remediation: remediation_command(self.elevation),
            remediate: false,
        };

        let mut done = 0.0;
        for (index, step) in steps.iter().enumerate() {
            if self.cancel.is_cancelled() {
                let reason = AbortReason::Cancelled {
                    completed_steps: index,
                };
                reporter.warning(reason.to_string());
                if index > 0 {
                    guard.arm();
                }
                self.transition(RunState::Aborted(reason.clone()));
                return RunOutcome::Aborted(reason);
            }

            self.transition(RunState::Executing(index));
            info!("[Step {}/{}] {}", index + 1, steps.len(), step.description);
            reporter.progress(done, step.description.clone());
            reporter.info(format!("Running: {}", step.command));

            let result = self.runner.execute(&step.command);
            if !result.success() {
                if result.status == TIMED_OUT {
                    reporter.error(format!(
                        "Command timed out after {} seconds",
                        self.settings.step_timeout_secs.unwrap_or_default()
                    ));
                }
                reporter.error(format!("Command failed with exit code {}", result.status));
                warn!(
                    "Step '{}' failed with status {}: {}",
                    step.id,
                    result.status,
                    result.output.trim()
                );
                guard.arm();
                self.transition(RunState::Failed(step.description.clone()));
                return RunOutcome::Failed {
                    step: step.description.clone(),
                    status: result.status,
                };
            }

            done += step.progress_weight;
            reporter.success("Command completed successfully");
            reporter.progress(done, step.description.clone());
        }

        reporter.progress(100.0, "Installation completed successfully!");
        reporter.success("Installation completed successfully!");
        self.transition(RunState::Succeeded);
        RunOutcome::Succeeded
    }

    /// Hard preconditions; the first failing gate aborts the run
    fn check_gates(
        &self,
        request: &InstallRequest,
        system: &SystemInfo,
        reporter: &Reporter,
    ) -> Option<AbortReason> {
        let host = HostChecks::new(self.runner);

        if host.is_wsl() {
            reporter.info(
                "This tool is designed for live boot Linux systems or native installations.",
            );
            reporter.info("To use this tool:");
            reporter.info("1. Create a live USB with Ubuntu/Debian");
            reporter.info("2. Boot from the USB on the target system");
            reporter.info("3. Run this tool on the live system");
            return Some(AbortReason::Wsl);
        }

        if !system.gpu_detected {
            return Some(AbortReason::NoGpu);
        }

        if request.validate().is_err() {
            return Some(AbortReason::EmptySelection);
        }

        self.log_advisories(&host, system, reporter);

        if !host.has_connectivity(&self.settings.connectivity_host) {
            return Some(AbortReason::NoConnectivity);
        }

        None
    }

    /// Conditions worth a warning that never stop the run
    fn log_advisories(&self, host: &HostChecks<'_>, system: &SystemInfo, reporter: &Reporter) {
        if self.elevation.is_root() {
            reporter.warning("Running as root. This is not recommended for security reasons.");
        }

        if let Some(free_kb) = host.free_kb() {
            if free_kb < self.settings.min_free_kb {
                reporter.warning(format!(
                    "Low disk space detected ({} KB free). Installation may fail.",
                    free_kb
                ));
            }
        }

        if host.secure_boot_enabled() {
            reporter.warning(
                "Secure Boot is enabled. Driver installation may require additional steps.",
            );
        }

        match system.distro_support() {
            DistroSupport::Supported => {}
            DistroSupport::EndOfLife => reporter.warning(format!(
                "{} is end of life. Upgrade recommended.",
                system.distro_codename
            )),
            DistroSupport::Unsupported => reporter.warning(format!(
                "Unsupported distro ({}). Installation may fail.",
                system.distro_codename
            )),
        }
    }

    fn transition(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_advance_to(&next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!("Install state: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn outcome_of_state(&self) -> RunOutcome {
        match &self.state {
            RunState::Succeeded => RunOutcome::Succeeded,
            RunState::Aborted(reason) => RunOutcome::Aborted(reason.clone()),
            RunState::Failed(step) => RunOutcome::Failed {
                step: step.clone(),
                status: -1,
            },
            _ => RunOutcome::Aborted(AbortReason::Cancelled { completed_steps: 0 }),
        }
    }
}
