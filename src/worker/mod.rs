//! Background worker orchestration
//!
//! At most one probe or install run is in flight. Each run gets everything it
//! needs moved into its thread at spawn time and reports back exclusively
//! through the progress channel.

use crate::config::Settings;
use crate::detect::{Prober, SystemInfo};
use crate::events::{progress_channel, ProgressReceiver, ProgressSender, Reporter, WorkerMessage};
use crate::install::{InstallRequest, Installer};
use crate::utils::command::ProcessRunner;
use crate::utils::error::{NvsetupError, Result};
use crate::utils::privilege::Elevation;
use crate::utils::signal::CancelToken;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Read-only state shared by every run
pub struct RunContext {
    pub runner: Arc<dyn ProcessRunner>,
    pub settings: Settings,
    /// Whether `runner` skips mutating commands
    pub dry_run: bool,
    /// Let SIGINT/SIGTERM cancel install runs
    pub follow_signals: bool,
}

/// Clears the busy flag when the worker body ends, including by panic
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Starts probe and install runs on a background thread
pub struct Orchestrator {
    context: Arc<RunContext>,
    sender: ProgressSender,
    busy: Arc<AtomicBool>,
    cancel: CancelToken,
    worker: Option<JoinHandle<()>>,
}

impl Orchestrator {
    /// Create the orchestrator and the receiving end of its progress channel
    pub fn new(context: RunContext) -> (Self, ProgressReceiver) {
        let (sender, receiver) = progress_channel();
        let orchestrator = Self {
            context: Arc::new(context),
            sender,
            busy: Arc::new(AtomicBool::new(false)),
            cancel: CancelToken::new(),
            worker: None,
        };
        (orchestrator, receiver)
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Whether the last spawned worker thread is still executing.
    ///
    /// Once this is false every message of that run is already queued.
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Start a probe run; `ProbeFinished` arrives when it completes
    pub fn start_probe(&mut self) -> Result<()> {
        self.claim()?;

        let context = Arc::clone(&self.context);
        let sender = self.sender.clone();
        let busy = BusyGuard(Arc::clone(&self.busy));

        self.spawn("nvsetup-probe", move || {
            let info = {
                let _busy = busy;
                let reporter = Reporter::new(sender.clone());
                Prober::new(context.runner.as_ref())
                    .with_delay(context.settings.probe_delay())
                    .probe(&reporter)
            };
            sender.send(WorkerMessage::ProbeFinished(info));
        })
    }

    /// Start an install run for `request` against the snapshot `system`.
    ///
    /// Rejected synchronously for an empty selection, a simulated elevation
    /// outside dry-run mode, or while another run is active.
    pub fn start_install(
        &mut self,
        request: InstallRequest,
        system: SystemInfo,
        elevation: Elevation,
    ) -> Result<()> {
        request.validate()?;
        if elevation.is_simulated() && !self.context.dry_run {
            return Err(NvsetupError::PrivilegeDenied);
        }
        self.claim()?;

        self.cancel = if self.context.follow_signals {
            CancelToken::with_signals()
        } else {
            CancelToken::new()
        };

        let context = Arc::clone(&self.context);
        let sender = self.sender.clone();
        let cancel = self.cancel.clone();
        let busy = BusyGuard(Arc::clone(&self.busy));

        self.spawn("nvsetup-install", move || {
            let outcome = {
                let _busy = busy;
                let mut reporter = Reporter::new(sender.clone());
                Installer::new(context.runner.as_ref(), &context.settings, &elevation)
                    .with_cancel(cancel)
                    .run(&request, &system, &mut reporter)
            };
            info!("Install run finished: {}", outcome);
            sender.send(WorkerMessage::InstallFinished(outcome));
        })
    }

    /// Ask the active install run to stop before its next step
    pub fn cancel(&self) {
        if self.is_busy() {
            info!("Cancellation requested");
        }
        self.cancel.cancel();
    }

    /// Wait for the outstanding worker, if any
    pub fn shutdown(&mut self) -> Result<()> {
        if let Some(handle) = self.worker.take() {
            debug!("Joining worker thread");
            handle.join().map_err(|_| NvsetupError::WorkerPanicked)?;
        }
        Ok(())
    }

    fn claim(&mut self) -> Result<()> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(NvsetupError::Busy);
        }
        // The previous worker has already cleared the flag and at most has
        // its final message left to send
        if let Err(e) = self.shutdown() {
            warn!("Previous worker ended abnormally: {}", e);
        }
        Ok(())
    }

    fn spawn<F>(&mut self, name: &str, body: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        match thread::Builder::new().name(name.to_string()).spawn(body) {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                // body (and its BusyGuard) was dropped with the failed spawn
                self.busy.store(false, Ordering::SeqCst);
                Err(NvsetupError::Io(e))
            }
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Worker thread ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::host::WSL_CHECK;
    use crate::install::{AbortReason, RunOutcome};
    use crate::utils::command::testing::ScriptedRunner;
    use crate::utils::command::CommandResult;
    use std::sync::mpsc::{channel, Receiver, Sender};
    use std::sync::Mutex;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    fn context(runner: Arc<dyn ProcessRunner>, dry_run: bool) -> RunContext {
        RunContext {
            runner,
            settings: Settings {
                probe_delay_ms: 0,
                ..Settings::default()
            },
            dry_run,
            follow_signals: false,
        }
    }

    /// Blocks every query until the test releases it
    struct HeldRunner {
        release: Mutex<Receiver<()>>,
    }

    impl HeldRunner {
        fn new() -> (Self, Sender<()>) {
            let (tx, rx) = channel();
            (
                Self {
                    release: Mutex::new(rx),
                },
                tx,
            )
        }
    }

    impl ProcessRunner for HeldRunner {
        fn query(&self, _command: &str) -> CommandResult {
            if let Ok(rx) = self.release.lock() {
                let _ = rx.recv_timeout(WAIT);
            }
            CommandResult::default()
        }

        fn execute(&self, command: &str) -> CommandResult {
            self.query(command)
        }
    }

    fn wait_for_terminal(rx: &ProgressReceiver) -> WorkerMessage {
        loop {
            match rx.recv_timeout(WAIT) {
                Some(WorkerMessage::Event(_)) => continue,
                Some(terminal) => return terminal,
                None => panic!("worker never finished"),
            }
        }
    }

    #[test]
    fn detection_delivers_snapshot_after_its_events() {
        let runner =
            Arc::new(ScriptedRunner::new().on("lspci", 0, "01:00.0 VGA: NVIDIA Corporation GA102"));
        let (mut orchestrator, rx) = Orchestrator::new(context(runner, false));

        orchestrator.start_probe().unwrap();
        match wait_for_terminal(&rx) {
            WorkerMessage::ProbeFinished(info) => assert!(info.gpu_detected),
            other => panic!("unexpected {:?}", other),
        }
        orchestrator.shutdown().unwrap();
        assert!(!orchestrator.is_busy());
    }

    #[test]
    fn second_start_while_busy_is_rejected() {
        let (held, release) = HeldRunner::new();
        let (mut orchestrator, rx) = Orchestrator::new(context(Arc::new(held), false));

        orchestrator.start_probe().unwrap();
        assert!(orchestrator.is_busy());
        assert!(matches!(orchestrator.start_probe(), Err(NvsetupError::Busy)));

        for _ in 0..4 {
            release.send(()).unwrap();
        }
        assert!(matches!(wait_for_terminal(&rx), WorkerMessage::ProbeFinished(_)));

        // the rejected start left nothing queued behind the finished run
        orchestrator.shutdown().unwrap();
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn empty_selection_is_rejected_without_a_worker() {
        let runner = Arc::new(ScriptedRunner::new());
        let (mut orchestrator, rx) = Orchestrator::new(context(runner.clone(), true));

        let result = orchestrator.start_install(
            InstallRequest::new(false, false),
            SystemInfo::default(),
            Elevation::simulated(),
        );
        assert!(matches!(result, Err(NvsetupError::EmptySelection)));
        assert!(!orchestrator.is_busy());
        assert!(runner.calls().is_empty());
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn simulated_elevation_requires_dry_run() {
        let runner = Arc::new(ScriptedRunner::new());
        let (mut orchestrator, _rx) = Orchestrator::new(context(runner, false));

        let result = orchestrator.start_install(
            InstallRequest::new(true, false),
            SystemInfo::default(),
            Elevation::simulated(),
        );
        assert!(matches!(result, Err(NvsetupError::PrivilegeDenied)));
    }

    #[test]
    fn install_run_reports_outcome() {
        let runner = Arc::new(ScriptedRunner::new().on(WSL_CHECK, 0, "Linux version 6.8.0"));
        let (mut orchestrator, rx) = Orchestrator::new(context(runner, true));
        let system = SystemInfo {
            gpu_detected: true,
            distro_codename: "noble".to_string(),
            ..SystemInfo::default()
        };

        orchestrator
            .start_install(InstallRequest::new(false, true), system, Elevation::simulated())
            .unwrap();
        match wait_for_terminal(&rx) {
            WorkerMessage::InstallFinished(outcome) => assert_eq!(outcome, RunOutcome::Succeeded),
            other => panic!("unexpected {:?}", other),
        }

        // a new run starts fresh on the same channel
        orchestrator.start_probe().unwrap();
        assert!(matches!(wait_for_terminal(&rx), WorkerMessage::ProbeFinished(_)));
    }

    #[test]
    fn cancel_stops_an_in_flight_install() {
        let (held, release) = HeldRunner::new();
        let (mut orchestrator, rx) = Orchestrator::new(context(Arc::new(held), true));
        let system = SystemInfo {
            gpu_detected: true,
            distro_codename: "jammy".to_string(),
            ..SystemInfo::default()
        };

        orchestrator
            .start_install(InstallRequest::new(true, false), system, Elevation::simulated())
            .unwrap();
        // the worker is parked on its first gate check
        assert!(orchestrator.is_running());
        orchestrator.cancel();

        // four gate checks plus the artifact cleanup
        for _ in 0..5 {
            release.send(()).unwrap();
        }
        match wait_for_terminal(&rx) {
            WorkerMessage::InstallFinished(outcome) => assert_eq!(
                outcome,
                RunOutcome::Aborted(AbortReason::Cancelled { completed_steps: 0 })
            ),
            other => panic!("unexpected {:?}", other),
        }

        orchestrator.shutdown().unwrap();
        assert!(!orchestrator.is_running());
        assert!(!orchestrator.is_busy());
    }
}
