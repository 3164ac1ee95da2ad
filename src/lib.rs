//! nvsetup library - NVIDIA driver and CUDA toolkit installation core

pub mod config;
pub mod detect;
pub mod events;
pub mod install;
pub mod ui;
pub mod utils;
pub mod worker;

pub use config::Settings;
pub use detect::SystemInfo;
pub use install::{InstallRequest, RunOutcome};
pub use utils::error::NvsetupError;
pub use worker::{Orchestrator, RunContext};
