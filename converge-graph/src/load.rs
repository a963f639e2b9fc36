use std::collections::{BTreeSet, HashMap};

use anyhow::Context;
use camino::Utf8Path;
use converge_types::decl::{Identity, ResourceKind};
use converge_types::plan::{PlanDoc, RunPlan};
use fs_err as fs;
use tracing::debug;

use crate::error::PlanError;

/// Read a plan document from disk. YAML and JSON are both accepted (the
/// YAML parser handles either).
pub fn read_plan(path: &Utf8Path) -> anyhow::Result<PlanDoc> {
    let contents = fs::read_to_string(path).with_context(|| format!("read plan {}", path))?;
    let doc: PlanDoc =
        serde_yaml::from_str(&contents).with_context(|| format!("parse plan {}", path))?;
    debug!(plan = %path, resources = doc.resources.len(), "loaded plan document");
    Ok(doc)
}

/// Validate a plan document and produce the run plan.
///
/// Fails closed with [`PlanError`] on duplicate identities, references to
/// undeclared resources, notification targets that are not services, or
/// dependency cycles. The returned order is the unique smallest topological
/// order under declaration insertion order, so an unchanged document always
/// yields the same sequence.
pub fn load(doc: PlanDoc) -> Result<RunPlan, PlanError> {
    let identities: Vec<Identity> = doc.resources.iter().map(|r| r.identity()).collect();

    let mut index: HashMap<&Identity, usize> = HashMap::new();
    for (pos, identity) in identities.iter().enumerate() {
        if index.insert(identity, pos).is_some() {
            return Err(PlanError::DuplicateIdentity {
                identity: identity.clone(),
            });
        }
    }

    // Every reference must name a declared resource; notification targets
    // must be services (the only kind with a re-apply action).
    for (pos, decl) in doc.resources.iter().enumerate() {
        for required in &decl.requires {
            if !index.contains_key(required) {
                return Err(PlanError::UnknownReference {
                    identity: required.clone(),
                    referenced_by: identities[pos].clone(),
                });
            }
        }
        for target in &decl.notifies {
            if !index.contains_key(target) {
                return Err(PlanError::UnknownReference {
                    identity: target.clone(),
                    referenced_by: identities[pos].clone(),
                });
            }
            if target.kind != ResourceKind::Service {
                return Err(PlanError::NotifyTarget {
                    target: target.clone(),
                    referenced_by: identities[pos].clone(),
                });
            }
        }
    }

    // Kahn's algorithm over `requires` edges. The ready set is keyed by
    // insertion position, so ties always resolve to the earliest declaration.
    let n = doc.resources.len();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut indegree: Vec<usize> = vec![0; n];
    for (pos, decl) in doc.resources.iter().enumerate() {
        for required in &decl.requires {
            let pred = index[required];
            dependents[pred].push(pos);
            indegree[pos] += 1;
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&pos| indegree[pos] == 0).collect();
    let mut order: Vec<usize> = Vec::with_capacity(n);
    while let Some(pos) = ready.pop_first() {
        order.push(pos);
        for &dep in &dependents[pos] {
            indegree[dep] -= 1;
            if indegree[dep] == 0 {
                ready.insert(dep);
            }
        }
    }

    if order.len() < n {
        let stuck: Vec<Identity> = (0..n)
            .filter(|pos| indegree[*pos] > 0)
            .map(|pos| identities[pos].clone())
            .collect();
        return Err(PlanError::Cycle { identities: stuck });
    }

    let ordered: Vec<_> = order.iter().map(|&pos| doc.resources[pos].clone()).collect();

    debug!(resources = ordered.len(), "plan ordered");
    Ok(RunPlan {
        schema: doc.schema,
        resources: ordered,
    })
}
