//! Distribution codename support table

use std::fmt;

/// Codenames the vendor repository is known to serve
pub const SUPPORTED_CODENAMES: &[&str] = &["bookworm", "jammy", "noble"];

/// Codenames that still work but are past end of life
pub const EOL_CODENAMES: &[&str] = &["bullseye"];

pub const UNKNOWN_CODENAME: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistroSupport {
    Supported,
    EndOfLife,
    Unsupported,
}

impl DistroSupport {
    pub fn classify(codename: &str) -> Self {
        if SUPPORTED_CODENAMES.contains(&codename) {
            Self::Supported
        } else if EOL_CODENAMES.contains(&codename) {
            Self::EndOfLife
        } else {
            Self::Unsupported
        }
    }
}

impl fmt::Display for DistroSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Supported => write!(f, "supported"),
            Self::EndOfLife => write!(f, "end of life"),
            Self::Unsupported => write!(f, "unsupported"),
        }
    }
}
