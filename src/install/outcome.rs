//! Terminal results and per-run state of an install run

use std::fmt;

/// Why a run stopped before or between steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// Running under WSL, which has no access to the GPU for drivers
    Wsl,
    /// The last probe found no NVIDIA GPU
    NoGpu,
    /// Neither the driver nor CUDA was selected
    EmptySelection,
    /// The connectivity probe failed
    NoConnectivity,
    /// Cancellation was requested; `completed_steps` steps had finished
    Cancelled { completed_steps: usize },
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wsl => write!(
                f,
                "Running in WSL. NVIDIA driver installation requires native Linux"
            ),
            Self::NoGpu => write!(f, "No NVIDIA GPU detected. Installation cannot proceed"),
            Self::EmptySelection => {
                write!(f, "Please select at least one installation option")
            }
            Self::NoConnectivity => write!(
                f,
                "No internet connection detected. Installation requires internet access"
            ),
            Self::Cancelled { completed_steps } => write!(
                f,
                "Installation cancelled after {} completed step(s)",
                completed_steps
            ),
        }
    }
}

/// Terminal result handed to the presentation side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    Aborted(AbortReason),
    Failed {
        /// Description of the step that failed
        step: String,
        /// Its exit status, verbatim
        status: i32,
    },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "Installation completed successfully"),
            Self::Aborted(reason) => write!(f, "Installation aborted: {}", reason),
            Self::Failed { step, status } => write!(
                f,
                "Installation failed at \"{}\" (exit status {})",
                step, status
            ),
        }
    }
}

/// Lifecycle of one run: `Idle -> Gating -> Executing(i) -> terminal`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Gating,
    /// Index of the step currently running
    Executing(usize),
    Succeeded,
    Aborted(AbortReason),
    Failed(String),
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Aborted(_) | Self::Failed(_))
    }

    /// Whether `next` is a legal successor of `self`
    pub fn can_advance_to(&self, next: &RunState) -> bool {
        match (self, next) {
            (Self::Idle, Self::Gating) => true,
            (Self::Gating, Self::Executing(0)) => true,
            (Self::Gating, Self::Aborted(_)) => true,
            (Self::Executing(i), Self::Executing(j)) => *j == i + 1,
            (Self::Executing(_), next) => next.is_terminal(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_final() {
        let terminal = [
            RunState::Succeeded,
            RunState::Aborted(AbortReason::NoGpu),
            RunState::Failed("x".to_string()),
        ];
        for state in &terminal {
            assert!(state.is_terminal());
            assert!(!state.can_advance_to(&RunState::Gating));
            assert!(!state.can_advance_to(&RunState::Executing(0)));
        }
    }

    #[test]
    fn executing_only_moves_forward_by_one() {
        assert!(RunState::Executing(2).can_advance_to(&RunState::Executing(3)));
        assert!(!RunState::Executing(2).can_advance_to(&RunState::Executing(2)));
        assert!(!RunState::Executing(2).can_advance_to(&RunState::Gating));
        assert!(RunState::Executing(2).can_advance_to(&RunState::Succeeded));
    }

    #[test]
    fn failure_outcome_names_step_and_status() {
        let outcome = RunOutcome::Failed {
            step: "Installing NVIDIA driver...".to_string(),
            status: 100,
        };
        assert!(!outcome.is_success());
        assert_eq!(
            outcome.to_string(),
            "Installation failed at \"Installing NVIDIA driver...\" (exit status 100)"
        );
    }
}
