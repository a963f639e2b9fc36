use serde::{Deserialize, Serialize};

use crate::decl::{Identity, ResourceDecl};

fn default_plan_schema() -> String {
    crate::schema::CONVERGE_PLAN_V1.to_string()
}

/// Plan document as written on disk (YAML or JSON): an unordered set of
/// resource declarations. Ordering and validation happen at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDoc {
    #[serde(default = "default_plan_schema")]
    pub schema: String,

    #[serde(default)]
    pub resources: Vec<ResourceDecl>,
}

/// Validated run plan: resources in a deterministic apply order.
///
/// Invariants (enforced by `converge-graph::load`):
/// - no dependency cycles;
/// - each identity appears at most once;
/// - every resource follows all of its `requires` predecessors;
/// - ties broken by declaration insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunPlan {
    pub schema: String,
    pub resources: Vec<ResourceDecl>,
}

impl RunPlan {
    /// Plan position of the resource with the given identity.
    pub fn position(&self, identity: &Identity) -> Option<usize> {
        self.resources.iter().position(|r| &r.identity() == identity)
    }

    pub fn get(&self, identity: &Identity) -> Option<&ResourceDecl> {
        self.resources.iter().find(|r| &r.identity() == identity)
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }
}
