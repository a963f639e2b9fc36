//! Port traits abstracting all I/O away from the backends.

use camino::Utf8Path;
use converge_types::decl::FileMode;

/// Observed metadata for a managed file. `None` fields mean the adapter
/// could not determine the value; the diff treats unknown as out of step
/// rather than guessing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileMeta {
    pub mode: Option<FileMode>,
    pub owner: Option<String>,
    pub group: Option<String>,
}

/// Filesystem access for managed files, templates, and backups.
pub trait FileStore {
    fn exists(&self, path: &Utf8Path) -> bool;

    fn read(&self, path: &Utf8Path) -> anyhow::Result<Vec<u8>>;

    /// Write contents, creating parent directories as needed.
    fn write(&self, path: &Utf8Path, contents: &[u8]) -> anyhow::Result<()>;

    fn copy(&self, from: &Utf8Path, to: &Utf8Path) -> anyhow::Result<()>;

    /// Rename, replacing the destination if it exists.
    fn rename(&self, from: &Utf8Path, to: &Utf8Path) -> anyhow::Result<()>;

    fn remove(&self, path: &Utf8Path) -> anyhow::Result<()>;

    fn meta(&self, path: &Utf8Path) -> anyhow::Result<FileMeta>;

    fn set_mode(&self, path: &Utf8Path, mode: FileMode) -> anyhow::Result<()>;

    fn set_owner(
        &self,
        path: &Utf8Path,
        owner: Option<&str>,
        group: Option<&str>,
    ) -> anyhow::Result<()>;
}

/// Resolves a content-source URI to bytes. The real artifact cache is an
/// external collaborator; this port only fetches what it is pointed at.
pub trait ArtifactSource {
    fn fetch(&self, uri: &str) -> anyhow::Result<Vec<u8>>;
}

/// Init-system view of one service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceStatus {
    pub running: bool,
    pub enabled: bool,
}

/// Abstract service manager. The engine only ever calls this interface;
/// which init system sits behind it is an adapter concern.
pub trait ServiceManager {
    fn status(&self, name: &str) -> anyhow::Result<ServiceStatus>;

    fn enable(&self, name: &str) -> anyhow::Result<()>;

    fn start(&self, name: &str) -> anyhow::Result<()>;

    fn restart(&self, name: &str) -> anyhow::Result<()>;
}
