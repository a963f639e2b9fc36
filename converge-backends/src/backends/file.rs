//! File resources: a managed file whose content comes from an artifact URI.

use std::sync::Arc;

use converge_types::decl::{FileSpec, ResourceDecl, ResourceSpec};
use tracing::debug;

use crate::backends::{
    apply_managed, diff_managed, BackupPolicy, Managed, ResourceBackend, ResourceDiff,
};
use crate::error::ApplyError;
use crate::ports::{ArtifactSource, FileStore};

pub struct FileBackend {
    store: Arc<dyn FileStore>,
    source: Arc<dyn ArtifactSource>,
    backups: BackupPolicy,
}

impl FileBackend {
    pub fn new(
        store: Arc<dyn FileStore>,
        source: Arc<dyn ArtifactSource>,
        backups: BackupPolicy,
    ) -> Self {
        Self {
            store,
            source,
            backups,
        }
    }

    fn spec<'a>(&self, decl: &'a ResourceDecl) -> Result<&'a FileSpec, ApplyError> {
        match &decl.spec {
            ResourceSpec::File(spec) => Ok(spec),
            _ => Err(ApplyError::io(
                &decl.identity(),
                anyhow::anyhow!("file backend received a {} declaration", decl.kind().as_str()),
            )),
        }
    }

    fn fetch(&self, decl: &ResourceDecl, spec: &FileSpec) -> Result<Vec<u8>, ApplyError> {
        self.source
            .fetch(&spec.source)
            .map_err(|e| ApplyError::SourceUnavailable {
                identity: decl.identity(),
                uri: spec.source.clone(),
                reason: format!("{e:#}"),
            })
    }

    fn managed<'a>(&'a self, spec: &'a FileSpec) -> Managed<'a> {
        Managed {
            path: &spec.path,
            owner: spec.owner.as_deref(),
            group: spec.group.as_deref(),
            mode: spec.mode,
            keep: spec.backup.unwrap_or(self.backups.keep),
            backup_dir: self.backups.dir.as_deref(),
        }
    }
}

impl ResourceBackend for FileBackend {
    fn diff(&self, decl: &ResourceDecl) -> Result<ResourceDiff, ApplyError> {
        let spec = self.spec(decl)?;
        let desired = self.fetch(decl, spec)?;
        debug!(path = %spec.path, bytes = desired.len(), "fetched file source");
        diff_managed(
            self.store.as_ref(),
            &decl.identity(),
            &self.managed(spec),
            desired,
        )
    }

    fn apply(&self, decl: &ResourceDecl, diff: &ResourceDiff) -> Result<(), ApplyError> {
        let spec = self.spec(decl)?;
        apply_managed(
            self.store.as_ref(),
            &decl.identity(),
            &self.managed(spec),
            diff,
        )
    }

    fn notify(&self, decl: &ResourceDecl) -> Result<(), ApplyError> {
        Err(ApplyError::io(
            &decl.identity(),
            anyhow::anyhow!("file resources accept no notifications"),
        ))
    }
}
