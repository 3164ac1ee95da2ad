//! nvsetup - NVIDIA driver and CUDA toolkit installer
//!
//! Detects the GPU and installed NVIDIA software, then installs the driver
//! and/or CUDA toolkit from the vendor apt repository.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use nvsetup::events::{ProgressReceiver, WorkerMessage};
use nvsetup::ui::{self, Console};
use nvsetup::utils::command::ShellRunner;
use nvsetup::utils::privilege::Elevation;
use nvsetup::utils::{prompt, signal};
use nvsetup::{InstallRequest, NvsetupError, Orchestrator, RunContext, Settings, SystemInfo};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "nvsetup")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Dry run mode - show what would be done without making changes
    #[arg(short = 'n', long, global = true)]
    dry_run: bool,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "NVSETUP_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect GPU, driver, CUDA and distribution
    Detect {
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Install the NVIDIA driver and/or CUDA toolkit
    Install {
        /// Install the NVIDIA driver
        #[arg(long)]
        driver: bool,

        /// Install the CUDA toolkit
        #[arg(long)]
        cuda: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file
        path: String,
    },

    /// Generate a sample configuration file
    GenerateConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "nvsetup.toml")]
        output: String,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let dry_run = cli.dry_run;
    if dry_run {
        info!("Running in dry-run mode - no changes will be made");
    }

    match cli.command {
        Some(Commands::Detect { json }) => {
            cmd_detect(cli.config.as_deref(), json)?;
        }
        Some(Commands::Install { driver, cuda, yes }) => {
            cmd_install(cli.config.as_deref(), driver, cuda, yes, dry_run)?;
        }
        Some(Commands::Validate { path }) => {
            cmd_validate(&path)?;
        }
        Some(Commands::GenerateConfig { output }) => {
            cmd_generate_config(&output)?;
        }
        None => {
            cmd_detect(cli.config.as_deref(), false)?;
        }
    }

    Ok(())
}

fn load_settings(config_path: Option<&str>) -> Result<Settings> {
    let settings = Settings::load(config_path)?;
    settings.validate()?;
    Ok(settings)
}

fn orchestrator(settings: &Settings, dry_run: bool) -> (Orchestrator, ProgressReceiver) {
    let runner = ShellRunner::new(dry_run).with_timeout(settings.step_timeout());
    Orchestrator::new(RunContext {
        runner: Arc::new(runner),
        settings: settings.clone(),
        dry_run,
        follow_signals: true,
    })
}

/// Run a probe and wait for its snapshot
fn probe(
    orchestrator: &mut Orchestrator,
    rx: &ProgressReceiver,
    console: &mut Console,
) -> Result<SystemInfo> {
    orchestrator.start_probe()?;
    match console.follow(rx, || orchestrator.is_running()) {
        Some(WorkerMessage::ProbeFinished(info)) => Ok(info),
        _ => Err(NvsetupError::WorkerPanicked.into()),
    }
}

fn cmd_detect(config_path: Option<&str>, json: bool) -> Result<()> {
    let settings = load_settings(config_path)?;
    let (mut orchestrator, rx) = orchestrator(&settings, false);
    let mut console = Console::new(settings.max_log_lines, !json);

    let info = probe(&mut orchestrator, &rx, &mut console)?;
    orchestrator.shutdown()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        ui::print_system_info(&info);
    }
    Ok(())
}

fn cmd_install(
    config_path: Option<&str>,
    driver: bool,
    cuda: bool,
    yes: bool,
    dry_run: bool,
) -> Result<()> {
    let settings = load_settings(config_path)?;

    // Neither flag given means both
    let request = if driver || cuda {
        InstallRequest::new(driver, cuda)
    } else {
        InstallRequest::new(true, true)
    };
    request.validate()?;

    signal::install_signal_handlers();
    let (mut orchestrator, rx) = orchestrator(&settings, dry_run);
    let mut console = Console::new(settings.max_log_lines, true);

    let info = probe(&mut orchestrator, &rx, &mut console)?;
    ui::print_system_info(&info);

    if !yes {
        let warning = format!("This will install the {} and modify system packages.", request);
        if !prompt::warn_confirm(&warning)? {
            println!("Installation cancelled.");
            return Ok(());
        }
    }

    let elevation = obtain_elevation(dry_run)?;

    orchestrator.start_install(request, info, elevation)?;
    let outcome = match console.follow(&rx, || orchestrator.is_running()) {
        Some(WorkerMessage::InstallFinished(outcome)) => outcome,
        _ => return Err(NvsetupError::WorkerPanicked.into()),
    };
    orchestrator.shutdown()?;

    if signal::is_interrupted() {
        signal::reraise();
    }

    if !outcome.is_success() {
        bail!("{}", outcome);
    }

    println!("✓ {}", outcome);
    println!("  Reboot to load the new driver, then open a new shell to pick up CUDA paths.");
    Ok(())
}

fn obtain_elevation(dry_run: bool) -> Result<Elevation> {
    if dry_run {
        return Ok(Elevation::simulated());
    }
    if let Some(root) = Elevation::current_root() {
        return Ok(root);
    }

    let password = prompt::prompt_password("Password for sudo")?;
    Ok(Elevation::verify(password)?)
}

fn cmd_validate(config_path: &str) -> Result<()> {
    let settings = Settings::from_file(config_path)?;
    settings.validate()?;
    println!("✓ Configuration is valid");
    Ok(())
}

fn cmd_generate_config(output: &str) -> Result<()> {
    Settings::sample().write_to(output)?;
    println!("✓ Sample configuration written to {}", output);
    Ok(())
}
