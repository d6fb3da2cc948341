//! Snapshot display formatting
//!
//! Formats the snapshot catalog and dry-run plans for terminal output.

use chrono::NaiveDateTime;

use crate::backup::{RunPlan, SnapshotCatalog};

/// Format the snapshots of a destination as a table
///
/// `now` is used to compute each snapshot's age.
pub fn format_snapshot_list(catalog: &SnapshotCatalog, now: NaiveDateTime) -> String {
    if catalog.is_empty() {
        return format!("No snapshots found in {}.", catalog.root().display());
    }

    let rows: Vec<(String, String, String)> = catalog
        .snapshots()
        .iter()
        .map(|snapshot| {
            let age = format_duration(now.signed_duration_since(snapshot.name.datetime()));
            let sources = snapshot.source_dirs().join(", ");
            (snapshot.name.to_string(), age, sources)
        })
        .collect();

    let age_width = rows.iter().map(|r| r.1.len()).max().unwrap_or(3).max(3);

    let mut output = String::new();
    output.push_str(&format!(
        "{:<19}  {:>age_width$}  {}\n",
        "Snapshot",
        "Age",
        "Sources",
        age_width = age_width,
    ));
    output.push_str(&format!(
        "{:-<19}  {:->age_width$}  {:-<7}\n",
        "",
        "",
        "",
        age_width = age_width,
    ));

    for (name, age, sources) in &rows {
        output.push_str(&format!(
            "{:<19}  {:>age_width$}  {}\n",
            name,
            age,
            sources,
            age_width = age_width,
        ));
    }

    output.push_str(&format!("\nTotal: {} snapshot(s)\n", rows.len()));
    output
}

/// Format a dry-run plan
pub fn format_plan(plan: &RunPlan) -> String {
    let mut output = String::new();

    output.push_str(&format!("Backup plan for {}\n", plan.run));
    output.push_str(&format!("{}\n\n", "=".repeat(16 + plan.run.as_str().len())));

    output.push_str("Retention:\n");
    match plan.decision.effective_keep {
        None => output.push_str("  Keeping all snapshots\n"),
        Some(keep) => output.push_str(&format!("  Keeping {} committed snapshot(s)\n", keep)),
    }
    if plan.decision.resumes_staging {
        output.push_str("  Continuing unfinished backup\n");
    }
    for snapshot in &plan.decision.to_delete {
        output.push_str(&format!("  Delete   {}\n", snapshot.name));
    }
    if let Some(recycled) = &plan.decision.recycle {
        output.push_str(&format!("  Recycle  {}\n", recycled.name));
    }
    if plan.decision.is_noop() && !plan.decision.resumes_staging {
        output.push_str("  Creating new staging directory\n");
    }
    output.push('\n');

    match &plan.links.reference {
        Some(reference) => output.push_str(&format!("Link reference: {}\n\n", reference)),
        None => output.push_str("Link reference: none (full copy)\n\n"),
    }

    let label_width = plan
        .sources
        .iter()
        .map(|s| s.label.len())
        .max()
        .unwrap_or(6)
        .max(6);

    output.push_str(&format!(
        "{:<label_width$}  {:<30}  {}\n",
        "Source",
        "Path",
        "Link destination",
        label_width = label_width,
    ));
    output.push_str(&format!(
        "{:-<label_width$}  {:-<30}  {:-<16}\n",
        "",
        "",
        "",
        label_width = label_width,
    ));

    for source in &plan.sources {
        let link = source
            .link_dest
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        output.push_str(&format!(
            "{:<label_width$}  {:<30}  {}\n",
            source.label,
            source.root.display().to_string(),
            link,
            label_width = label_width,
        ));
    }

    output
}

/// Format a duration in human-readable form
fn format_duration(duration: chrono::Duration) -> String {
    let total_seconds = duration.num_seconds();

    if total_seconds < 60 {
        return format!("{}s", total_seconds);
    }

    let minutes = total_seconds / 60;
    if minutes < 60 {
        return format!("{}m", minutes);
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h", hours);
    }

    let days = hours / 24;
    if days < 30 {
        return format!("{}d", days);
    }

    let months = days / 30;
    format!("{}mo", months)
}
