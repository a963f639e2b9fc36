//! Service resources: keep an OS service enabled and running through the
//! abstract service-manager port.

use std::sync::Arc;

use converge_types::decl::{ResourceDecl, ResourceSpec, ServiceAction, ServiceSpec};
use tracing::debug;

use crate::backends::{ChangeKind, ResourceBackend, ResourceDiff};
use crate::error::ApplyError;
use crate::ports::{ServiceManager, ServiceStatus};

pub struct ServiceBackend {
    manager: Arc<dyn ServiceManager>,
}

impl ServiceBackend {
    pub fn new(manager: Arc<dyn ServiceManager>) -> Self {
        Self { manager }
    }

    fn spec<'a>(&self, decl: &'a ResourceDecl) -> Result<&'a ServiceSpec, ApplyError> {
        match &decl.spec {
            ResourceSpec::Service(spec) => Ok(spec),
            _ => Err(ApplyError::io(
                &decl.identity(),
                anyhow::anyhow!(
                    "service backend received a {} declaration",
                    decl.kind().as_str()
                ),
            )),
        }
    }

    fn control_err(
        &self,
        decl: &ResourceDecl,
        operation: &str,
        err: anyhow::Error,
    ) -> ApplyError {
        ApplyError::ServiceControl {
            identity: decl.identity(),
            operation: operation.to_string(),
            reason: format!("{err:#}"),
        }
    }
}

/// Actions still needed to satisfy the declaration, in declared order.
///
/// A declared `restart` is satisfied by a running service: unconditional
/// restarts are the notification mechanism's job, and treating them as
/// ensure-running is what keeps a converged plan idempotent.
fn needed_actions(spec: &ServiceSpec, status: ServiceStatus) -> Vec<ServiceAction> {
    let mut needed = Vec::new();
    let mut run_pending = false;
    for action in &spec.actions {
        match action {
            ServiceAction::Enable => {
                if !status.enabled && !needed.contains(&ServiceAction::Enable) {
                    needed.push(ServiceAction::Enable);
                }
            }
            ServiceAction::Start | ServiceAction::Restart => {
                if !status.running && !run_pending {
                    needed.push(*action);
                    run_pending = true;
                }
            }
        }
    }
    needed
}

impl ResourceBackend for ServiceBackend {
    fn diff(&self, decl: &ResourceDecl) -> Result<ResourceDiff, ApplyError> {
        let spec = self.spec(decl)?;
        let status = self
            .manager
            .status(&spec.name)
            .map_err(|e| self.control_err(decl, "status", e))?;
        debug!(
            service = %spec.name,
            running = status.running,
            enabled = status.enabled,
            "queried service status"
        );

        let actions = needed_actions(spec, status);
        if actions.is_empty() {
            return Ok(ResourceDiff::unchanged());
        }

        // A service that is neither running nor enabled is being brought up
        // from scratch; anything else is an adjustment.
        let change = if !status.running && !status.enabled {
            ChangeKind::Create
        } else {
            ChangeKind::Update
        };
        let detail = actions.iter().map(|a| a.to_string()).collect();
        Ok(ResourceDiff {
            change,
            detail,
            before: None,
            after: None,
            payload: None,
            actions,
            content_changed: false,
        })
    }

    fn apply(&self, decl: &ResourceDecl, diff: &ResourceDiff) -> Result<(), ApplyError> {
        let spec = self.spec(decl)?;
        for action in &diff.actions {
            let result = match action {
                ServiceAction::Enable => self.manager.enable(&spec.name),
                ServiceAction::Start => self.manager.start(&spec.name),
                ServiceAction::Restart => self.manager.restart(&spec.name),
            };
            result.map_err(|e| self.control_err(decl, action.as_str(), e))?;
        }
        Ok(())
    }

    fn notify(&self, decl: &ResourceDecl) -> Result<(), ApplyError> {
        let spec = self.spec(decl)?;
        debug!(service = %spec.name, "restart notification");
        self.manager
            .restart(&spec.name)
            .map_err(|e| self.control_err(decl, "restart", e))
    }
}
