//! Configuration file loading for converge.
//!
//! Discovers and loads `converge.toml` from the working directory. The
//! config covers environment policy (backup retention, init-system command);
//! run-shaping flags stay on the CLI.

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use converge_core::BackupPolicy;
use fs_err as fs;
use serde::Deserialize;
use tracing::debug;

/// The config file name to search for.
pub const CONFIG_FILE_NAME: &str = "converge.toml";

/// Top-level configuration from converge.toml.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConvergeConfig {
    /// Backup settings for managed files.
    pub backups: BackupsConfig,

    /// Service-manager settings.
    pub service: ServiceConfig,
}

/// Backups section of the config.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackupsConfig {
    /// Prior versions to keep when overwriting a managed file. 0 disables
    /// backups.
    pub keep: u32,

    /// Directory for backups. Unset keeps them next to the managed file.
    pub dir: Option<Utf8PathBuf>,
}

impl Default for BackupsConfig {
    fn default() -> Self {
        Self { keep: 5, dir: None }
    }
}

/// Service section of the config.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Init-system command used for service control.
    pub manager: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            manager: "systemctl".to_string(),
        }
    }
}

impl ConvergeConfig {
    pub fn backup_policy(&self) -> BackupPolicy {
        BackupPolicy {
            keep: self.backups.keep,
            dir: self.backups.dir.clone(),
        }
    }
}

/// Discover the converge.toml config file in the given directory.
pub fn discover_config(dir: &Utf8Path) -> Option<Utf8PathBuf> {
    let config_path = dir.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        debug!("found config file at {}", config_path);
        Some(config_path)
    } else {
        debug!("no config file found at {}", config_path);
        None
    }
}

/// Load and parse a converge.toml config file.
pub fn load_config(path: &Utf8Path) -> anyhow::Result<ConvergeConfig> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read config file {}", path))?;
    parse_config(&contents).with_context(|| format!("parse config file {}", path))
}

/// Parse a config file from a string.
pub fn parse_config(contents: &str) -> anyhow::Result<ConvergeConfig> {
    let config: ConvergeConfig = toml::from_str(contents).context("invalid TOML")?;
    Ok(config)
}

/// Load config from the working directory, or return defaults if not found.
pub fn load_or_default(dir: &Utf8Path) -> anyhow::Result<ConvergeConfig> {
    match discover_config(dir) {
        Some(path) => load_config(&path),
        None => Ok(ConvergeConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_keep_five_backups_and_use_systemctl() {
        let config = ConvergeConfig::default();
        assert_eq!(config.backups.keep, 5);
        assert_eq!(config.backups.dir, None);
        assert_eq!(config.service.manager, "systemctl");
    }

    #[test]
    fn parses_partial_config() {
        let config = parse_config(
            r#"
[backups]
keep = 2
dir = "/var/backups/converge"
"#,
        )
        .expect("parse");
        assert_eq!(config.backups.keep, 2);
        assert_eq!(
            config.backups.dir.as_deref().map(Utf8Path::as_str),
            Some("/var/backups/converge")
        );
        assert_eq!(config.service.manager, "systemctl");
    }

    #[test]
    fn parses_service_manager_override() {
        let config = parse_config(
            r#"
[service]
manager = "service"
"#,
        )
        .expect("parse");
        assert_eq!(config.service.manager, "service");
    }

    #[test]
    fn rejects_invalid_toml() {
        assert!(parse_config("backups = nonsense [").is_err());
    }

    #[test]
    fn load_or_default_without_file_uses_defaults() {
        let temp = tempfile::TempDir::new().expect("temp dir");
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8");
        let config = load_or_default(&dir).expect("load");
        assert_eq!(config.backups.keep, 5);
    }

    #[test]
    fn load_or_default_reads_discovered_file() {
        let temp = tempfile::TempDir::new().expect("temp dir");
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8");
        std::fs::write(dir.join(CONFIG_FILE_NAME), "[backups]\nkeep = 0\n").expect("write");
        let config = load_or_default(&dir).expect("load");
        assert_eq!(config.backups.keep, 0);
    }
}
