//! Default port implementations: live filesystem/init-system adapters and
//! in-memory adapters for tests and embedding.

use std::collections::BTreeMap;
use std::process::Command;
use std::sync::Mutex;

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use converge_types::decl::FileMode;
use fs_err as fs;
use tracing::debug;

use crate::ports::{ArtifactSource, FileMeta, FileStore, ServiceManager, ServiceStatus};

/// Live filesystem store. Declared paths are interpreted beneath `root`;
/// with the default root `/` they are used verbatim, which is the normal
/// provisioning case. A non-`/` root re-homes absolute paths for staging
/// and test runs.
#[derive(Debug, Clone)]
pub struct LiveFileStore {
    root: Utf8PathBuf,
}

impl Default for LiveFileStore {
    fn default() -> Self {
        Self::new(Utf8PathBuf::from("/"))
    }
}

impl LiveFileStore {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    fn target(&self, path: &Utf8Path) -> Utf8PathBuf {
        if self.root.as_str() == "/" {
            return path.to_path_buf();
        }
        match path.strip_prefix("/") {
            Ok(rel) => self.root.join(rel),
            Err(_) => self.root.join(path),
        }
    }
}

/// Owner and group names via `stat`, best effort: `None` when the command
/// is unavailable or fails.
fn stat_owner(path: &Utf8Path) -> (Option<String>, Option<String>) {
    let output = Command::new("stat")
        .args(["-c", "%U %G"])
        .arg(path.as_str())
        .output();
    match output {
        Ok(out) if out.status.success() => {
            let text = String::from_utf8_lossy(&out.stdout);
            let mut parts = text.split_whitespace();
            (
                parts.next().map(str::to_string),
                parts.next().map(str::to_string),
            )
        }
        _ => (None, None),
    }
}

impl FileStore for LiveFileStore {
    fn exists(&self, path: &Utf8Path) -> bool {
        self.target(path).exists()
    }

    fn read(&self, path: &Utf8Path) -> anyhow::Result<Vec<u8>> {
        let target = self.target(path);
        fs::read(&target).with_context(|| format!("read {}", target))
    }

    fn write(&self, path: &Utf8Path, contents: &[u8]) -> anyhow::Result<()> {
        let target = self.target(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create parent dir for {}", target))?;
        }
        fs::write(&target, contents).with_context(|| format!("write {}", target))
    }

    fn copy(&self, from: &Utf8Path, to: &Utf8Path) -> anyhow::Result<()> {
        let from = self.target(from);
        let to = self.target(to);
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create parent dir for {}", to))?;
        }
        fs::copy(&from, &to).with_context(|| format!("copy {} to {}", from, to))?;
        Ok(())
    }

    fn rename(&self, from: &Utf8Path, to: &Utf8Path) -> anyhow::Result<()> {
        let from = self.target(from);
        let to = self.target(to);
        fs::rename(&from, &to).with_context(|| format!("rename {} to {}", from, to))
    }

    fn remove(&self, path: &Utf8Path) -> anyhow::Result<()> {
        let target = self.target(path);
        fs::remove_file(&target).with_context(|| format!("remove {}", target))
    }

    fn meta(&self, path: &Utf8Path) -> anyhow::Result<FileMeta> {
        use std::os::unix::fs::PermissionsExt;

        let target = self.target(path);
        let md = fs::metadata(&target).with_context(|| format!("stat {}", target))?;
        let mode = FileMode(md.permissions().mode() & 0o7777);
        let (owner, group) = stat_owner(&target);
        Ok(FileMeta {
            mode: Some(mode),
            owner,
            group,
        })
    }

    fn set_mode(&self, path: &Utf8Path, mode: FileMode) -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let target = self.target(path);
        let perms = std::fs::Permissions::from_mode(mode.0);
        std::fs::set_permissions(&target, perms)
            .with_context(|| format!("set mode {} on {}", mode, target))
    }

    fn set_owner(
        &self,
        path: &Utf8Path,
        owner: Option<&str>,
        group: Option<&str>,
    ) -> anyhow::Result<()> {
        let spec = match (owner, group) {
            (None, None) => return Ok(()),
            (Some(o), None) => o.to_string(),
            (None, Some(g)) => format!(":{g}"),
            (Some(o), Some(g)) => format!("{o}:{g}"),
        };
        let target = self.target(path);
        let out = Command::new("chown")
            .arg(&spec)
            .arg(target.as_str())
            .output()
            .with_context(|| format!("run chown {} {}", spec, target))?;
        if !out.status.success() {
            anyhow::bail!(
                "chown {} {} failed: {}",
                spec,
                target,
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }
        Ok(())
    }
}

/// Resolves `file://` URIs and bare paths against the local filesystem.
/// Remote schemes belong to the external artifact cache, not to this tool.
#[derive(Debug, Clone, Default)]
pub struct LiveArtifactSource;

impl ArtifactSource for LiveArtifactSource {
    fn fetch(&self, uri: &str) -> anyhow::Result<Vec<u8>> {
        let path = if let Some(stripped) = uri.strip_prefix("file://") {
            stripped
        } else if uri.contains("://") {
            anyhow::bail!("unsupported artifact source scheme in `{uri}`");
        } else {
            uri
        };
        fs::read(path).with_context(|| format!("fetch {}", uri))
    }
}

/// Service control by shelling out to systemctl (or a compatible command).
#[derive(Debug, Clone)]
pub struct SystemctlManager {
    command: String,
}

impl Default for SystemctlManager {
    fn default() -> Self {
        Self::new("systemctl")
    }
}

impl SystemctlManager {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Exit status of a query subcommand; `Err` only when the command
    /// itself cannot be run.
    fn query(&self, args: &[&str]) -> anyhow::Result<bool> {
        let status = Command::new(&self.command)
            .args(args)
            .status()
            .with_context(|| format!("run {} {}", self.command, args.join(" ")))?;
        Ok(status.success())
    }

    fn control(&self, args: &[&str]) -> anyhow::Result<()> {
        let out = Command::new(&self.command)
            .args(args)
            .output()
            .with_context(|| format!("run {} {}", self.command, args.join(" ")))?;
        if !out.status.success() {
            anyhow::bail!(
                "{} {} failed: {}",
                self.command,
                args.join(" "),
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }
        Ok(())
    }
}

impl ServiceManager for SystemctlManager {
    fn status(&self, name: &str) -> anyhow::Result<ServiceStatus> {
        let running = self.query(&["is-active", "--quiet", name])?;
        let enabled = self.query(&["is-enabled", "--quiet", name])?;
        Ok(ServiceStatus { running, enabled })
    }

    fn enable(&self, name: &str) -> anyhow::Result<()> {
        self.control(&["enable", name])
    }

    fn start(&self, name: &str) -> anyhow::Result<()> {
        self.control(&["start", name])
    }

    fn restart(&self, name: &str) -> anyhow::Result<()> {
        self.control(&["restart", name])
    }
}

#[derive(Debug, Clone, Default)]
struct MemFile {
    contents: Vec<u8>,
    meta: FileMeta,
}

/// In-memory file store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemFileStore {
    files: Mutex<BTreeMap<Utf8PathBuf, MemFile>>,
}

impl MemFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<Utf8PathBuf>, contents: &[u8]) {
        self.files.lock().expect("lock files").insert(
            path.into(),
            MemFile {
                contents: contents.to_vec(),
                meta: FileMeta::default(),
            },
        );
    }

    pub fn insert_with_meta(&self, path: impl Into<Utf8PathBuf>, contents: &[u8], meta: FileMeta) {
        self.files.lock().expect("lock files").insert(
            path.into(),
            MemFile {
                contents: contents.to_vec(),
                meta,
            },
        );
    }

    pub fn contents(&self, path: &Utf8Path) -> Option<Vec<u8>> {
        self.files
            .lock()
            .expect("lock files")
            .get(path)
            .map(|f| f.contents.clone())
    }

    pub fn meta_of(&self, path: &Utf8Path) -> Option<FileMeta> {
        self.files
            .lock()
            .expect("lock files")
            .get(path)
            .map(|f| f.meta.clone())
    }

    pub fn paths(&self) -> Vec<Utf8PathBuf> {
        self.files.lock().expect("lock files").keys().cloned().collect()
    }
}

impl FileStore for MemFileStore {
    fn exists(&self, path: &Utf8Path) -> bool {
        self.files.lock().expect("lock files").contains_key(path)
    }

    fn read(&self, path: &Utf8Path) -> anyhow::Result<Vec<u8>> {
        self.contents(path)
            .ok_or_else(|| anyhow::anyhow!("read {}: no such file", path))
    }

    fn write(&self, path: &Utf8Path, contents: &[u8]) -> anyhow::Result<()> {
        let mut files = self.files.lock().expect("lock files");
        // Overwrites keep existing metadata, like a real filesystem.
        let entry = files.entry(path.to_path_buf()).or_default();
        entry.contents = contents.to_vec();
        Ok(())
    }

    fn copy(&self, from: &Utf8Path, to: &Utf8Path) -> anyhow::Result<()> {
        let mut files = self.files.lock().expect("lock files");
        let file = files
            .get(from)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("copy {}: no such file", from))?;
        files.insert(to.to_path_buf(), file);
        Ok(())
    }

    fn rename(&self, from: &Utf8Path, to: &Utf8Path) -> anyhow::Result<()> {
        let mut files = self.files.lock().expect("lock files");
        let file = files
            .remove(from)
            .ok_or_else(|| anyhow::anyhow!("rename {}: no such file", from))?;
        files.insert(to.to_path_buf(), file);
        Ok(())
    }

    fn remove(&self, path: &Utf8Path) -> anyhow::Result<()> {
        self.files
            .lock()
            .expect("lock files")
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| anyhow::anyhow!("remove {}: no such file", path))
    }

    fn meta(&self, path: &Utf8Path) -> anyhow::Result<FileMeta> {
        self.meta_of(path)
            .ok_or_else(|| anyhow::anyhow!("stat {}: no such file", path))
    }

    fn set_mode(&self, path: &Utf8Path, mode: FileMode) -> anyhow::Result<()> {
        let mut files = self.files.lock().expect("lock files");
        let file = files
            .get_mut(path)
            .ok_or_else(|| anyhow::anyhow!("set mode on {}: no such file", path))?;
        file.meta.mode = Some(mode);
        Ok(())
    }

    fn set_owner(
        &self,
        path: &Utf8Path,
        owner: Option<&str>,
        group: Option<&str>,
    ) -> anyhow::Result<()> {
        let mut files = self.files.lock().expect("lock files");
        let file = files
            .get_mut(path)
            .ok_or_else(|| anyhow::anyhow!("set owner on {}: no such file", path))?;
        if let Some(owner) = owner {
            file.meta.owner = Some(owner.to_string());
        }
        if let Some(group) = group {
            file.meta.group = Some(group.to_string());
        }
        Ok(())
    }
}

/// In-memory artifact source keyed by URI.
#[derive(Debug, Clone, Default)]
pub struct MemArtifactSource {
    artifacts: BTreeMap<String, Vec<u8>>,
}

impl MemArtifactSource {
    pub fn new(artifacts: Vec<(String, Vec<u8>)>) -> Self {
        Self {
            artifacts: artifacts.into_iter().collect(),
        }
    }
}

impl ArtifactSource for MemArtifactSource {
    fn fetch(&self, uri: &str) -> anyhow::Result<Vec<u8>> {
        self.artifacts
            .get(uri)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown artifact `{uri}`"))
    }
}

/// In-memory service manager recording every control action, so tests can
/// assert restart counts and ordering.
#[derive(Debug, Default)]
pub struct MemServiceManager {
    states: Mutex<BTreeMap<String, ServiceStatus>>,
    log: Mutex<Vec<String>>,
}

impl MemServiceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(self, name: &str, status: ServiceStatus) -> Self {
        self.states
            .lock()
            .expect("lock states")
            .insert(name.to_string(), status);
        self
    }

    pub fn status_of(&self, name: &str) -> Option<ServiceStatus> {
        self.states.lock().expect("lock states").get(name).copied()
    }

    /// Control actions issued so far, as `"<action> <name>"` strings.
    pub fn actions(&self) -> Vec<String> {
        self.log.lock().expect("lock log").clone()
    }

    fn with_known(
        &self,
        name: &str,
        action: &str,
        f: impl FnOnce(&mut ServiceStatus),
    ) -> anyhow::Result<()> {
        let mut states = self.states.lock().expect("lock states");
        let status = states
            .get_mut(name)
            .ok_or_else(|| anyhow::anyhow!("unknown service `{name}`"))?;
        f(status);
        self.log
            .lock()
            .expect("lock log")
            .push(format!("{action} {name}"));
        debug!(service = name, action, "mem service action");
        Ok(())
    }
}

impl ServiceManager for MemServiceManager {
    fn status(&self, name: &str) -> anyhow::Result<ServiceStatus> {
        self.status_of(name)
            .ok_or_else(|| anyhow::anyhow!("unknown service `{name}`"))
    }

    fn enable(&self, name: &str) -> anyhow::Result<()> {
        self.with_known(name, "enable", |s| s.enabled = true)
    }

    fn start(&self, name: &str) -> anyhow::Result<()> {
        self.with_known(name, "start", |s| s.running = true)
    }

    fn restart(&self, name: &str) -> anyhow::Result<()> {
        self.with_known(name, "restart", |s| s.running = true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, LiveFileStore) {
        let temp = tempfile::TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8");
        (temp, LiveFileStore::new(root))
    }

    #[test]
    fn live_store_rehomes_absolute_paths_under_root() {
        let (temp, store) = temp_store();
        store
            .write(Utf8Path::new("/etc/app/service.yml"), b"listen: 8080\n")
            .expect("write");
        let on_disk = temp.path().join("etc/app/service.yml");
        assert_eq!(std::fs::read(on_disk).expect("read back"), b"listen: 8080\n");
        assert!(store.exists(Utf8Path::new("/etc/app/service.yml")));
    }

    #[test]
    fn live_store_round_trips_mode() {
        let (_temp, store) = temp_store();
        let path = Utf8Path::new("/app.conf");
        store.write(path, b"x").expect("write");
        store.set_mode(path, FileMode(0o600)).expect("set mode");
        let meta = store.meta(path).expect("meta");
        assert_eq!(meta.mode, Some(FileMode(0o600)));
    }

    #[test]
    fn live_store_rename_replaces_destination() {
        let (_temp, store) = temp_store();
        store.write(Utf8Path::new("/a"), b"old").expect("write a");
        store.write(Utf8Path::new("/b"), b"new").expect("write b");
        store
            .rename(Utf8Path::new("/b"), Utf8Path::new("/a"))
            .expect("rename");
        assert_eq!(store.read(Utf8Path::new("/a")).expect("read"), b"new");
        assert!(!store.exists(Utf8Path::new("/b")));
    }

    #[test]
    fn live_artifact_source_reads_file_uris() {
        let temp = tempfile::TempDir::new().expect("temp dir");
        let jar = temp.path().join("app.jar");
        std::fs::write(&jar, b"jar bytes").expect("write jar");

        let source = LiveArtifactSource;
        let uri = format!("file://{}", jar.display());
        assert_eq!(source.fetch(&uri).expect("fetch"), b"jar bytes");
        assert_eq!(
            source.fetch(&jar.display().to_string()).expect("fetch bare"),
            b"jar bytes"
        );
    }

    #[test]
    fn live_artifact_source_rejects_remote_schemes() {
        let err = LiveArtifactSource
            .fetch("https://repo.example.com/app.jar")
            .unwrap_err();
        assert!(err.to_string().contains("unsupported artifact source scheme"));
    }

    #[test]
    fn mem_store_write_keeps_existing_meta() {
        let store = MemFileStore::new();
        let path = Utf8Path::new("/etc/app.conf");
        store.insert_with_meta(
            path,
            b"v1",
            FileMeta {
                mode: Some(FileMode(0o640)),
                owner: Some("root".to_string()),
                group: Some("root".to_string()),
            },
        );
        store.write(path, b"v2").expect("write");
        let meta = store.meta(path).expect("meta");
        assert_eq!(meta.mode, Some(FileMode(0o640)));
        assert_eq!(store.contents(path).expect("contents"), b"v2");
    }

    #[test]
    fn mem_store_errors_on_missing_files() {
        let store = MemFileStore::new();
        assert!(store.read(Utf8Path::new("/nope")).is_err());
        assert!(store.meta(Utf8Path::new("/nope")).is_err());
        assert!(store.remove(Utf8Path::new("/nope")).is_err());
    }

    #[test]
    fn mem_service_manager_tracks_state_and_log() {
        let mgr = MemServiceManager::new().with_service("app", ServiceStatus::default());
        mgr.enable("app").expect("enable");
        mgr.start("app").expect("start");
        assert_eq!(
            mgr.status("app").expect("status"),
            ServiceStatus {
                running: true,
                enabled: true
            }
        );
        assert_eq!(mgr.actions(), vec!["enable app", "start app"]);
    }

    #[test]
    fn mem_service_manager_rejects_unknown_unit() {
        let mgr = MemServiceManager::new();
        assert!(mgr.status("ghost").is_err());
        assert!(mgr.restart("ghost").is_err());
    }
}
