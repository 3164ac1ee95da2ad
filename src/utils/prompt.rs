//! User prompt utilities using dialoguer

use crate::utils::error::{NvsetupError, Result};
use dialoguer::{theme::ColorfulTheme, Confirm, Password};

/// Prompt for password (hidden input)
pub fn prompt_password(prompt: &str) -> Result<String> {
    let theme = ColorfulTheme::default();
    Password::with_theme(&theme)
        .with_prompt(prompt)
        .allow_empty_password(true)
        .interact()
        .map_err(|_| NvsetupError::UserCancelled)
}

/// Prompt for yes/no confirmation
pub fn prompt_confirm(prompt: &str, default: bool) -> Result<bool> {
    let theme = ColorfulTheme::default();
    Confirm::with_theme(&theme)
        .with_prompt(prompt)
        .default(default)
        .interact_opt()
        .map_err(|e| NvsetupError::Io(std::io::Error::other(e.to_string())))?
        .ok_or(NvsetupError::UserCancelled)
}

/// Display a warning and ask for confirmation
pub fn warn_confirm(warning: &str) -> Result<bool> {
    println!("\n⚠️  WARNING: {}\n", warning);
    prompt_confirm("Continue?", false)
}
