//! Clap-free settings for a convergence run.

use camino::Utf8PathBuf;
use converge_backends::{BackendSet, BackupPolicy};

/// Settings for one run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Root the declared paths are interpreted beneath. `/` for real
    /// provisioning; anything else re-homes the run for staging and tests.
    pub root: Utf8PathBuf,

    /// Compute and report diffs without applying or notifying.
    pub dry_run: bool,

    /// Backup retention for managed files.
    pub backups: BackupPolicy,

    /// Init-system command for the live service manager.
    pub service_manager: String,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            root: Utf8PathBuf::from("/"),
            dry_run: false,
            backups: BackupPolicy::default(),
            service_manager: "systemctl".to_string(),
        }
    }
}

impl RunSettings {
    /// Live adapters configured from these settings.
    pub fn live_backends(&self) -> BackendSet {
        BackendSet::live(
            self.root.clone(),
            self.backups.clone(),
            &self.service_manager,
        )
    }
}
