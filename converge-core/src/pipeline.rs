//! The convergence walk: diff each resource in plan order, apply what is out
//! of step, stop fail-fast on the first failure, then fire pending
//! notifications exactly once each.

use std::collections::BTreeSet;

use chrono::Utc;
use converge_backends::{ApplyError, BackendSet, ChangeKind, ResourceDiff};
use converge_types::decl::Identity;
use converge_types::plan::RunPlan;
use converge_types::report::{ResourceStatus, RunReport};
use diffy::PatchFormatter;
use tracing::{debug, info};

use crate::settings::RunSettings;

/// Outcome of one convergence run.
pub struct RunOutcome {
    pub report: RunReport,

    /// Unified diff of every textual content change (or would-be change, on
    /// dry-run).
    pub patch: String,

    /// Plan position of the resource that stopped the run, if any.
    pub failed: Option<usize>,
}

/// Converge a validated plan.
///
/// Resources are processed strictly in plan order. The first backend
/// failure stops the walk: earlier resources stay converged, later ones are
/// never attempted, and the partial report is returned. After the walk (or
/// the fail-fast stop) pending notifications fire exactly once per target,
/// in plan order, deduplicated.
///
/// Running twice with no external state change in between yields
/// `unchanged` for every resource on the second run.
pub fn run(plan: &RunPlan, backends: &BackendSet, settings: &RunSettings) -> RunOutcome {
    let mut report = RunReport::new(settings.dry_run);
    let mut patch = String::new();
    let mut failed = None;
    let mut pending: BTreeSet<Identity> = BTreeSet::new();

    for (pos, decl) in plan.resources.iter().enumerate() {
        let identity = decl.identity();
        let backend = backends.for_kind(decl.kind());

        let diff = match backend.diff(decl) {
            Ok(diff) => diff,
            Err(err) => {
                record_failure(&mut report, identity, &err);
                failed = Some(pos);
                break;
            }
        };

        if !diff.is_change() {
            debug!(resource = %identity, "unchanged");
            report.push_result(identity, ResourceStatus::Unchanged, None);
            continue;
        }

        patch.push_str(&patch_fragment(&identity, &diff));

        if !settings.dry_run {
            if let Err(err) = backend.apply(decl, &diff) {
                record_failure(&mut report, identity, &err);
                failed = Some(pos);
                break;
            }
        }

        let status = if matches!(diff.change, ChangeKind::Create) {
            ResourceStatus::Created
        } else {
            ResourceStatus::Updated
        };
        let detail = diff.detail.join(", ");
        info!(resource = %identity, status = status.label(), detail = %detail);
        report.push_result(identity, status, Some(detail));

        for target in &decl.notifies {
            pending.insert(target.clone());
        }
    }

    // Pending notifications fire after the walk, in plan order, once per
    // target no matter how many upstream changes requested it.
    for decl in &plan.resources {
        let identity = decl.identity();
        if !pending.contains(&identity) {
            continue;
        }
        report.notifications.push(identity.clone());
        if settings.dry_run {
            continue;
        }
        debug!(target = %identity, "firing notification");
        if let Err(err) = backends.for_kind(decl.kind()).notify(decl) {
            mark_notify_failure(&mut report, &identity, &err);
            if failed.is_none() {
                failed = plan.position(&identity);
            }
            break;
        }
    }

    report.summary.notifications = report.notifications.len() as u64;
    report.run.ended_at = Some(Utc::now());
    RunOutcome {
        report,
        patch,
        failed,
    }
}

fn record_failure(report: &mut RunReport, identity: Identity, err: &ApplyError) {
    let message = err.to_string();
    report.errors.push(message.clone());
    report.push_result(identity, ResourceStatus::Failed, Some(message));
}

/// A failed notification turns its target's outcome into a failure and
/// stops further notifications from firing.
fn mark_notify_failure(report: &mut RunReport, identity: &Identity, err: &ApplyError) {
    let message = err.to_string();
    report.errors.push(message.clone());

    if let Some(row) = report.results.iter_mut().find(|r| &r.identity == identity) {
        match row.status {
            ResourceStatus::Unchanged => report.summary.unchanged -= 1,
            ResourceStatus::Created => report.summary.created -= 1,
            ResourceStatus::Updated => report.summary.updated -= 1,
            ResourceStatus::Failed => return,
        }
        report.summary.failed += 1;
        row.status = ResourceStatus::Failed;
        row.message = Some(message);
    } else {
        report.push_result(identity.clone(), ResourceStatus::Failed, Some(message));
    }
}

fn patch_fragment(identity: &Identity, diff: &ResourceDiff) -> String {
    let (Some(before), Some(after)) = (&diff.before, &diff.after) else {
        return String::new();
    };
    if before == after {
        return String::new();
    }

    let path = &identity.key;
    let mut out = String::new();
    out.push_str(&format!("diff --git a{0} b{0}\n", path));
    out.push_str(&format!("--- a{0}\n+++ b{0}\n", path));
    let patch = diffy::create_patch(before, after);
    out.push_str(&PatchFormatter::new().fmt_patch(&patch).to_string());
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}
