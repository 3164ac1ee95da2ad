//! Shared utilities

pub mod command;
pub mod error;
pub mod privilege;
pub mod prompt;
pub mod signal;
