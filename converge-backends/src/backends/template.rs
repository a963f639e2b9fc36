//! Template resources: a managed file whose content is rendered from a
//! template and a flat variable map.

use std::sync::Arc;

use converge_types::decl::{ResourceDecl, ResourceSpec, TemplateSpec};
use tracing::debug;

use crate::backends::{
    apply_managed, diff_managed, BackupPolicy, Managed, ResourceBackend, ResourceDiff,
};
use crate::error::ApplyError;
use crate::ports::FileStore;
use crate::render;

pub struct TemplateBackend {
    store: Arc<dyn FileStore>,
    backups: BackupPolicy,
}

impl TemplateBackend {
    pub fn new(store: Arc<dyn FileStore>, backups: BackupPolicy) -> Self {
        Self { store, backups }
    }

    fn spec<'a>(&self, decl: &'a ResourceDecl) -> Result<&'a TemplateSpec, ApplyError> {
        match &decl.spec {
            ResourceSpec::Template(spec) => Ok(spec),
            _ => Err(ApplyError::io(
                &decl.identity(),
                anyhow::anyhow!(
                    "template backend received a {} declaration",
                    decl.kind().as_str()
                ),
            )),
        }
    }

    /// Render the declaration's template with its resolved variables.
    fn rendered(&self, decl: &ResourceDecl, spec: &TemplateSpec) -> Result<Vec<u8>, ApplyError> {
        let raw = self
            .store
            .read(&spec.template)
            .map_err(|e| ApplyError::SourceUnavailable {
                identity: decl.identity(),
                uri: spec.template.to_string(),
                reason: format!("{e:#}"),
            })?;
        let text = String::from_utf8(raw).map_err(|_| ApplyError::SourceUnavailable {
            identity: decl.identity(),
            uri: spec.template.to_string(),
            reason: "template is not valid UTF-8".to_string(),
        })?;
        let out = render::render(&text, &spec.variables).map_err(|reason| ApplyError::Render {
            identity: decl.identity(),
            reason,
        })?;
        debug!(template = %spec.template, path = %spec.path, "rendered template");
        Ok(out.into_bytes())
    }

    fn managed<'a>(&'a self, spec: &'a TemplateSpec) -> Managed<'a> {
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

impl ResourceBackend for TemplateBackend {
    fn diff(&self, decl: &ResourceDecl) -> Result<ResourceDiff, ApplyError> {
        let spec = self.spec(decl)?;
        let desired = self.rendered(decl, spec)?;
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
            anyhow::anyhow!("template resources accept no notifications"),
        ))
    }
}
