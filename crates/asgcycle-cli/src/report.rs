//! Human-readable run summary.

use asgcycle_rollout::CycleReport;

pub fn format_report(report: &CycleReport) -> String {
    let mut out = String::new();

    out.push_str(&format!("Group:                {}\n", report.group));
    if let Some(lc) = &report.launch_config {
        out.push_str(&format!("Launch configuration: {lc}\n"));
    }
    out.push('\n');

    if report.dry_run {
        if report.eligible.is_empty() {
            out.push_str("Dry run: no instances need cycling.\n");
        } else {
            out.push_str(&format!(
                "Dry run: {} instance(s) would be cycled:\n",
                report.eligible.len()
            ));
            for id in &report.eligible {
                out.push_str(&format!("  • {id}\n"));
            }
        }
        return out;
    }

    if report.rounds.is_empty() {
        out.push_str("No instances needed cycling.\n");
        return out;
    }

    for round in &report.rounds {
        out.push_str(&format!(
            "Round {}: {} of {} eligible\n",
            round.round, round.step_size, round.eligible
        ));
        for id in &round.retired {
            out.push_str(&format!("  - retired     {id}\n"));
        }
        for failure in &round.retire_failures {
            out.push_str(&format!(
                "  ! not retired {} ({})\n",
                failure.instance_id, failure.reason
            ));
        }
        for id in &round.replacements {
            out.push_str(&format!("  + replacement {id}\n"));
        }
    }

    let failures = report.retire_failures();
    out.push('\n');
    out.push_str(&format!(
        "Replaced {} instance(s) in {} round(s)",
        report.retired().len(),
        report.rounds.len()
    ));
    if failures.is_empty() {
        out.push_str(".\n");
    } else {
        out.push_str(&format!("; {} termination(s) failed.\n", failures.len()));
    }

    out
}
