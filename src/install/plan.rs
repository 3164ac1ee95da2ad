//! Install request validation and step planning

use crate::config::Settings;
use crate::utils::error::{NvsetupError, Result};
use crate::utils::privilege::Elevation;
use std::fmt;

/// Which components to install
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallRequest {
    pub install_driver: bool,
    pub install_cuda: bool,
}

impl InstallRequest {
    pub fn new(install_driver: bool, install_cuda: bool) -> Self {
        Self {
            install_driver,
            install_cuda,
        }
    }

    /// At least one component must be selected
    pub fn validate(&self) -> Result<()> {
        if !self.install_driver && !self.install_cuda {
            return Err(NvsetupError::EmptySelection);
        }
        Ok(())
    }

    /// 2 shared steps plus 4 per selected component
    pub fn total_steps(&self) -> usize {
        2 + 4 * usize::from(self.install_driver) + 4 * usize::from(self.install_cuda)
    }
}

impl fmt::Display for InstallRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.install_driver, self.install_cuda) {
            (true, true) => write!(f, "NVIDIA driver + CUDA toolkit"),
            (true, false) => write!(f, "NVIDIA driver"),
            (false, true) => write!(f, "CUDA toolkit"),
            (false, false) => write!(f, "nothing"),
        }
    }
}

/// One external command within an install run
#[derive(Debug, Clone, PartialEq)]
pub struct InstallStep {
    /// Short stable identifier
    pub id: &'static str,
    /// Human-readable description shown while the step runs
    pub description: String,
    /// Shell command line
    pub command: String,
    /// Share of overall progress, `100 / total_steps`
    pub progress_weight: f64,
}

/// Build the ordered step list for a request.
///
/// The list is empty for an empty selection.
pub fn plan_steps(
    request: &InstallRequest,
    codename: &str,
    settings: &Settings,
    elevation: &Elevation,
) -> Vec<InstallStep> {
    if request.validate().is_err() {
        return Vec::new();
    }

    let mut steps: Vec<(&'static str, String, String)> = Vec::new();
    let apt_update = || elevation.wrap("apt-get update");

    steps.push(("update", "Updating package lists...".to_string(), apt_update()));
    steps.push((
        "prereqs",
        "Installing prerequisites...".to_string(),
        elevation.wrap(&format!(
            "apt-get install -y {}",
            settings.prerequisites.join(" ")
        )),
    ));

    if request.install_driver {
        steps.push((
            "add-keyring",
            "Adding NVIDIA repository...".to_string(),
            format!(
                "wget -q -O {} {}",
                settings.keyring_file,
                settings.keyring_url_for(codename)
            ),
        ));
        steps.push((
            "dpkg-keyring",
            "Installing NVIDIA repository keyring...".to_string(),
            elevation.wrap(&format!("dpkg -i {}", settings.keyring_file)),
        ));
        steps.push((
            "update",
            "Updating package lists with NVIDIA repository...".to_string(),
            apt_update(),
        ));
        steps.push((
            "install-driver",
            "Installing NVIDIA driver...".to_string(),
            elevation.wrap(&format!("apt-get install -y {}", settings.driver_package)),
        ));
    }

    if request.install_cuda {
        steps.push((
            "update",
            "Verifying CUDA repository...".to_string(),
            apt_update(),
        ));
        steps.push((
            "install-cuda",
            "Installing CUDA toolkit...".to_string(),
            elevation.wrap(&format!("apt-get install -y {}", settings.cuda_package)),
        ));
        steps.push((
            "cuda-path",
            "Adding CUDA to PATH...".to_string(),
            format!(
                "echo 'export PATH={}/bin${{PATH:+:$PATH}}' | {} >/dev/null",
                settings.cuda_home,
                elevation.wrap(&format!("tee {}", settings.cuda_profile))
            ),
        ));
        steps.push((
            "cuda-ld-path",
            "Adding CUDA libraries to LD_LIBRARY_PATH...".to_string(),
            format!(
                "echo 'export LD_LIBRARY_PATH={}/lib64${{LD_LIBRARY_PATH:+:$LD_LIBRARY_PATH}}' | {} >/dev/null",
                settings.cuda_home,
                elevation.wrap(&format!("tee -a {}", settings.cuda_profile))
            ),
        ));
    }

    let weight = 100.0 / steps.len() as f64;
    steps
        .into_iter()
        .map(|(id, description, command)| InstallStep {
            id,
            description,
            command,
            progress_weight: weight,
        })
        .collect()
}

/// Command removing the downloaded keyring package
pub fn artifact_cleanup_command(settings: &Settings) -> String {
    format!("rm -f {}", settings.keyring_file)
}

/// Command removing orphaned packages after a failed run
pub fn remediation_command(elevation: &Elevation) -> String {
    elevation.wrap("apt-get autoremove -y")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(driver: bool, cuda: bool) -> Vec<InstallStep> {
        plan_steps(
            &InstallRequest::new(driver, cuda),
            "jammy",
            &Settings::default(),
            &Elevation::simulated(),
        )
    }

    #[test]
    fn step_count_matches_formula_and_weights_sum_to_100() {
        for (driver, cuda) in [(true, false), (false, true), (true, true)] {
            let request = InstallRequest::new(driver, cuda);
            let steps = plan(driver, cuda);
            assert_eq!(steps.len(), request.total_steps());
            let total: f64 = steps.iter().map(|s| s.progress_weight).sum();
            assert!((total - 100.0).abs() < 1e-9, "sum was {}", total);
        }
    }

    #[test]
    fn driver_only_plan() {
        let steps = plan(true, false);
        let ids: Vec<&str> = steps.iter().map(|s| s.id).collect();
        assert_eq!(
            ids,
            vec!["update", "prereqs", "add-keyring", "dpkg-keyring", "update", "install-driver"]
        );
        assert!((steps[0].progress_weight - 16.666_666).abs() < 1e-3);
        assert_eq!(steps[5].description, "Installing NVIDIA driver...");
        assert_eq!(steps[5].command, "sudo -n apt-get install -y cuda-drivers");
        assert!(steps[2].command.contains("/repos/jammy/x86_64/"));
    }

    #[test]
    fn cuda_only_plan_skips_keyring() {
        let ids: Vec<&str> = plan(false, true).iter().map(|s| s.id).collect();
        assert_eq!(
            ids,
            vec!["update", "prereqs", "update", "install-cuda", "cuda-path", "cuda-ld-path"]
        );
    }

    #[test]
    fn driver_steps_precede_cuda_steps() {
        let ids: Vec<&str> = plan(true, true).iter().map(|s| s.id).collect();
        let driver = ids.iter().position(|id| *id == "install-driver").unwrap();
        let cuda = ids.iter().position(|id| *id == "install-cuda").unwrap();
        assert!(driver < cuda);
        assert_eq!(ids.len(), 10);
    }

    #[test]
    fn profile_fragment_is_written_then_appended() {
        let steps = plan(false, true);
        assert!(steps[4].command.contains("| sudo -n tee /etc/profile.d/cuda.sh"));
        assert!(steps[4].command.contains("export PATH=/usr/local/cuda/bin${PATH:+:$PATH}"));
        assert!(steps[5].command.contains("| sudo -n tee -a /etc/profile.d/cuda.sh"));
    }

    #[test]
    fn empty_selection_is_rejected() {
        let request = InstallRequest::new(false, false);
        assert!(matches!(request.validate(), Err(NvsetupError::EmptySelection)));
        assert!(plan(false, false).is_empty());
        assert_eq!(request.total_steps(), 2);
    }
}
