//! Terminal rendering of worker messages
//!
//! Apart from asking whether the worker thread is still running, the console
//! only reads from the progress channel.

use crate::detect::{DistroSupport, SystemInfo};
use crate::events::log::LogBuffer;
use crate::events::{EventKind, ProgressEvent, ProgressReceiver, Severity, WorkerMessage};
use colored::Colorize;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Progress bar plus the bounded scroll-back of log lines
pub struct Console {
    bar: ProgressBar,
    log: LogBuffer,
    echo: bool,
}

impl Console {
    /// `echo` controls whether events are drawn at all; the log is kept either way
    pub fn new(max_log_lines: usize, echo: bool) -> Self {
        let bar = if echo {
            let pb = ProgressBar::new(100);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            {
                pb.set_style(style.progress_chars("█▓░"));
            }
            pb.enable_steady_tick(POLL_INTERVAL);
            pb
        } else {
            ProgressBar::hidden()
        };

        Self {
            bar,
            log: LogBuffer::new(max_log_lines),
            echo,
        }
    }

    pub fn log(&self) -> &LogBuffer {
        &self.log
    }

    /// Render events until a terminal message arrives.
    ///
    /// `worker_running` must only turn false once the worker thread has
    /// exited, so that everything it sent is already queued. Returns `None`
    /// if the worker exited without delivering a terminal message.
    pub fn follow(
        &mut self,
        rx: &ProgressReceiver,
        worker_running: impl Fn() -> bool,
    ) -> Option<WorkerMessage> {
        self.bar.reset();
        loop {
            match rx.recv_timeout(POLL_INTERVAL) {
                Some(message) => {
                    if let Some(terminal) = self.handle(message) {
                        return Some(terminal);
                    }
                }
                None if worker_running() => continue,
                None => {
                    for message in rx.drain() {
                        if let Some(terminal) = self.handle(message) {
                            return Some(terminal);
                        }
                    }
                    self.bar.abandon();
                    return None;
                }
            }
        }
    }

    /// Show an event, or hand back a terminal message
    fn handle(&mut self, message: WorkerMessage) -> Option<WorkerMessage> {
        match message {
            WorkerMessage::Event(event) => {
                self.show(&event);
                None
            }
            terminal => {
                self.bar.finish_and_clear();
                Some(terminal)
            }
        }
    }

    fn show(&mut self, event: &ProgressEvent) {
        match event.kind {
            EventKind::Progress => {
                self.bar.set_position(event.fraction.round() as u64);
                self.bar.set_message(event.message.clone());
            }
            EventKind::Log => {
                let line = self.log.push(event.severity, &event.message);
                if self.echo {
                    self.bar.println(styled(event.severity, line));
                }
            }
        }
    }
}

/// Colour a formatted log line by severity
pub fn styled(severity: Severity, line: &str) -> String {
    match severity {
        Severity::Info => line.to_string(),
        Severity::Success => style(line).green().to_string(),
        Severity::Warning => style(line).yellow().to_string(),
        Severity::Error => style(line).red().bold().to_string(),
    }
}

fn marker(ok: bool) -> String {
    if ok {
        "✓".green().bold().to_string()
    } else {
        "✗".red().bold().to_string()
    }
}

/// Print the detection summary cards
pub fn print_system_info(info: &SystemInfo) {
    println!();
    println!("{}", "System Status".bold().underline());
    println!("  {} {:<8} {}", marker(info.gpu_detected), "GPU", info.gpu_description);
    println!(
        "  {} {:<8} {}",
        marker(info.driver_installed),
        "Driver",
        info.driver_description
    );
    println!("  {} {:<8} {}", marker(info.cuda_installed), "CUDA", info.cuda_description);

    let support = info.distro_support();
    let distro = match support {
        DistroSupport::Supported => info.distro_codename.normal(),
        DistroSupport::EndOfLife => info.distro_codename.yellow(),
        DistroSupport::Unsupported => info.distro_codename.red(),
    };
    println!(
        "  {} {:<8} {} ({})",
        marker(support == DistroSupport::Supported),
        "Distro",
        distro,
        support
    );
    println!();
}
