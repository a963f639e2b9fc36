//! Rendering helpers (markdown) for human-readable run output.

use converge_types::plan::RunPlan;
use converge_types::report::RunReport;

pub fn render_report_md(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str(if report.dry_run {
        "# converge run (dry-run)\n\n"
    } else {
        "# converge run\n\n"
    });
    out.push_str(&format!("- Run id: {}\n", report.run.run_id));
    out.push_str(&format!(
        "- Unchanged: {}\n- Created: {}\n- Updated: {}\n- Failed: {}\n- Notifications: {}\n\n",
        report.summary.unchanged,
        report.summary.created,
        report.summary.updated,
        report.summary.failed,
        report.summary.notifications
    ));

    out.push_str("## Resources\n\n");
    if report.results.is_empty() {
        out.push_str("_No resources processed._\n");
    }
    for (i, r) in report.results.iter().enumerate() {
        out.push_str(&format!("### {}. {}\n\n", i + 1, r.identity));
        out.push_str(&format!("- Status: `{}`\n", r.status.label()));
        if let Some(msg) = &r.message {
            out.push_str(&format!("- Detail: {}\n", msg));
        }
        out.push('\n');
    }

    if !report.notifications.is_empty() {
        out.push_str(if report.dry_run {
            "## Notifications (would fire)\n\n"
        } else {
            "## Notifications\n\n"
        });
        for target in &report.notifications {
            out.push_str(&format!("- {}\n", target));
        }
        out.push('\n');
    }

    if !report.errors.is_empty() {
        out.push_str("## Errors\n\n");
        for err in &report.errors {
            out.push_str(&format!("- {}\n", err));
        }
        out.push('\n');
    }

    out
}

pub fn render_order(plan: &RunPlan) -> String {
    let mut out = String::new();
    out.push_str("Apply order:\n");
    for (i, decl) in plan.resources.iter().enumerate() {
        out.push_str(&format!("  {}. {}\n", i + 1, decl.identity()));
    }
    out
}
