//! The uniform backend contract and the shared managed-file machinery used
//! by the file and template backends.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use converge_types::decl::{FileMode, Identity, ResourceDecl, ResourceKind, ServiceAction};
use sha2::{Digest, Sha256};

use crate::adapters::{LiveArtifactSource, LiveFileStore, SystemctlManager};
use crate::error::ApplyError;
use crate::ports::FileStore;

mod file;
mod service;
mod template;

pub use file::FileBackend;
pub use service::ServiceBackend;
pub use template::TemplateBackend;

/// How far a resource is from its declared state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Unchanged,
    Create,
    Update,
}

/// Diff between declared and actual state, computed by a backend and handed
/// back to the same backend for apply.
#[derive(Debug, Clone)]
pub struct ResourceDiff {
    pub change: ChangeKind,

    /// Human fragments, e.g. `content`, `mode 0600 -> 0644`, `enable`.
    pub detail: Vec<String>,

    /// Previous and desired text, when the content is textual; used for the
    /// unified diff preview. `None` for binary content and services.
    pub before: Option<String>,
    pub after: Option<String>,

    /// Exact bytes to write on apply (file and template backends).
    pub payload: Option<Vec<u8>>,

    /// Control actions to issue on apply (service backend).
    pub actions: Vec<ServiceAction>,

    pub content_changed: bool,
}

impl ResourceDiff {
    pub fn unchanged() -> Self {
        Self {
            change: ChangeKind::Unchanged,
            detail: vec![],
            before: None,
            after: None,
            payload: None,
            actions: vec![],
            content_changed: false,
        }
    }

    pub fn is_change(&self) -> bool {
        !matches!(self.change, ChangeKind::Unchanged)
    }
}

/// Uniform per-kind applier contract.
pub trait ResourceBackend {
    /// Query current state and compute the diff against the declaration.
    fn diff(&self, decl: &ResourceDecl) -> Result<ResourceDiff, ApplyError>;

    /// Apply a diff previously computed by this backend for `decl`.
    fn apply(&self, decl: &ResourceDecl, diff: &ResourceDiff) -> Result<(), ApplyError>;

    /// React to an upstream change (service restart).
    fn notify(&self, decl: &ResourceDecl) -> Result<(), ApplyError>;
}

/// Backup retention for managed files. A declaration-level `backup` count
/// overrides `keep`; `keep` 0 disables backups.
#[derive(Debug, Clone)]
pub struct BackupPolicy {
    pub keep: u32,
    pub dir: Option<Utf8PathBuf>,
}

impl Default for BackupPolicy {
    fn default() -> Self {
        Self { keep: 5, dir: None }
    }
}

/// One backend per resource kind, dispatched by the engine.
pub struct BackendSet {
    file: Box<dyn ResourceBackend>,
    template: Box<dyn ResourceBackend>,
    service: Box<dyn ResourceBackend>,
}

impl BackendSet {
    pub fn new(
        file: Box<dyn ResourceBackend>,
        template: Box<dyn ResourceBackend>,
        service: Box<dyn ResourceBackend>,
    ) -> Self {
        Self {
            file,
            template,
            service,
        }
    }

    /// Live adapters: std::fs beneath `root`, `file://` artifact fetches,
    /// and the given init-system command.
    pub fn live(root: Utf8PathBuf, backups: BackupPolicy, service_manager: &str) -> Self {
        let store = Arc::new(LiveFileStore::new(root));
        Self::new(
            Box::new(FileBackend::new(
                store.clone(),
                Arc::new(LiveArtifactSource),
                backups.clone(),
            )),
            Box::new(TemplateBackend::new(store, backups)),
            Box::new(ServiceBackend::new(Arc::new(SystemctlManager::new(
                service_manager,
            )))),
        )
    }

    pub fn for_kind(&self, kind: ResourceKind) -> &dyn ResourceBackend {
        match kind {
            ResourceKind::File => self.file.as_ref(),
            ResourceKind::Template => self.template.as_ref(),
            ResourceKind::Service => self.service.as_ref(),
        }
    }
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn text_of(bytes: &[u8]) -> Option<String> {
    std::str::from_utf8(bytes).ok().map(str::to_string)
}

/// Declared attributes of a managed file, shared by the file and template
/// backends.
#[derive(Clone, Copy)]
pub(crate) struct Managed<'a> {
    pub path: &'a Utf8Path,
    pub owner: Option<&'a str>,
    pub group: Option<&'a str>,
    pub mode: Option<FileMode>,
    /// Effective backup count (declaration override already applied).
    pub keep: u32,
    pub backup_dir: Option<&'a Utf8Path>,
}

/// Diff a managed file (content plus ownership and mode) against desired
/// bytes.
pub(crate) fn diff_managed(
    store: &dyn FileStore,
    identity: &Identity,
    managed: &Managed<'_>,
    desired: Vec<u8>,
) -> Result<ResourceDiff, ApplyError> {
    let Managed {
        path, owner, group, mode, ..
    } = *managed;
    if !store.exists(path) {
        let after = text_of(&desired);
        return Ok(ResourceDiff {
            change: ChangeKind::Create,
            detail: vec!["create".to_string()],
            before: Some(String::new()),
            after,
            payload: Some(desired),
            actions: vec![],
            content_changed: true,
        });
    }

    let current = store
        .read(path)
        .map_err(|e| ApplyError::io(identity, e))?;
    let meta = store
        .meta(path)
        .map_err(|e| ApplyError::io(identity, e))?;

    let mut detail = Vec::new();
    let content_changed = sha256_hex(&current) != sha256_hex(&desired);
    if content_changed {
        detail.push("content".to_string());
    }
    if let Some(want) = mode {
        if meta.mode != Some(want) {
            detail.push(match meta.mode {
                Some(have) => format!("mode {have} -> {want}"),
                None => format!("mode -> {want}"),
            });
        }
    }
    if let Some(want) = owner {
        if meta.owner.as_deref() != Some(want) {
            detail.push(format!("owner -> {want}"));
        }
    }
    if let Some(want) = group {
        if meta.group.as_deref() != Some(want) {
            detail.push(format!("group -> {want}"));
        }
    }

    if detail.is_empty() {
        return Ok(ResourceDiff::unchanged());
    }

    let (before, after) = if content_changed {
        (text_of(&current), text_of(&desired))
    } else {
        (None, None)
    };
    Ok(ResourceDiff {
        change: ChangeKind::Update,
        detail,
        before,
        after,
        payload: Some(desired),
        actions: vec![],
        content_changed,
    })
}

/// Apply a managed-file diff: rotate backups, write content, then bring
/// mode and ownership in line.
pub(crate) fn apply_managed(
    store: &dyn FileStore,
    identity: &Identity,
    managed: &Managed<'_>,
    diff: &ResourceDiff,
) -> Result<(), ApplyError> {
    let Managed {
        path,
        owner,
        group,
        mode,
        keep,
        backup_dir,
    } = *managed;
    if diff.content_changed {
        if keep > 0 && store.exists(path) {
            rotate_backups(store, identity, path, keep, backup_dir)?;
        }
        if let Some(bytes) = diff.payload.as_deref() {
            store
                .write(path, bytes)
                .map_err(|e| ApplyError::io(identity, e))?;
        }
    }
    if let Some(mode) = mode {
        store
            .set_mode(path, mode)
            .map_err(|e| ApplyError::io(identity, e))?;
    }
    if owner.is_some() || group.is_some() {
        store
            .set_owner(path, owner, group)
            .map_err(|e| ApplyError::io(identity, e))?;
    }
    Ok(())
}

fn backup_path(path: &Utf8Path, dir: Option<&Utf8Path>, index: u32) -> Utf8PathBuf {
    match dir {
        None => Utf8PathBuf::from(format!("{path}.converge.bak.{index}")),
        Some(dir) => {
            let flat = path.as_str().trim_start_matches('/').replace('/', "_");
            dir.join(format!("{flat}.{index}"))
        }
    }
}

/// Shift numbered backups up by one and save the current version at index 0.
/// At most `keep` prior versions survive; the oldest falls off the end.
fn rotate_backups(
    store: &dyn FileStore,
    identity: &Identity,
    path: &Utf8Path,
    keep: u32,
    dir: Option<&Utf8Path>,
) -> Result<(), ApplyError> {
    for index in (0..keep.saturating_sub(1)).rev() {
        let from = backup_path(path, dir, index);
        if store.exists(&from) {
            store
                .rename(&from, &backup_path(path, dir, index + 1))
                .map_err(|e| ApplyError::io(identity, e))?;
        }
    }
    store
        .copy(path, &backup_path(path, dir, 0))
        .map_err(|e| ApplyError::io(identity, e))?;
    Ok(())
}
