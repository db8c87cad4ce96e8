//! Markdown summary generation
//!
//! This module renders a run summary as a human-readable markdown report.

use crate::output::{OutputResult, RunSummary};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes the markdown report of a run
///
/// # Arguments
///
/// * `summary` - The run summary
/// * `output_path` - Path where the markdown file should be written
pub fn generate_markdown_summary(summary: &RunSummary, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_summary(summary);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a run summary as markdown
pub fn format_markdown_summary(summary: &RunSummary) -> String {
    let mut md = String::new();

    md.push_str("# Nutri-Harvest Run Summary\n\n");

    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Mode**: {}\n", summary.mode));
    if let Some((start, end)) = summary.range {
        md.push_str(&format!("- **Range**: {}-{}\n", start, end));
    }
    md.push_str(&format!("- **Started**: {}\n", summary.started_at.to_rfc3339()));
    if let Some(finished) = &summary.finished_at {
        md.push_str(&format!("- **Finished**: {}\n", finished.to_rfc3339()));
    }
    if let Some(duration) = summary.duration_seconds() {
        md.push_str(&format!(
            "- **Duration**: {} seconds ({:.2} minutes)\n",
            duration,
            duration as f64 / 60.0
        ));
    }
    md.push_str(&format!("- **Config Hash**: {}\n\n", summary.config_hash));

    md.push_str("## Results\n\n");
    md.push_str("| Metric | Count |\n");
    md.push_str("|--------|-------|\n");
    md.push_str(&format!("| Units | {} |\n", summary.units_total));
    md.push_str(&format!("| Succeeded | {} |\n", summary.units_succeeded));
    md.push_str(&format!("| Failed | {} |\n", summary.units_failed));
    if summary.units_resumed > 0 {
        md.push_str(&format!("| Carried over | {} |\n", summary.units_resumed));
    }
    if let Some(rows) = summary.rows_written {
        md.push_str(&format!("| Rows written | {} |\n", rows));
    }
    md.push_str(&format!(
        "\n**Success Rate**: {:.2}%\n\n",
        summary.success_rate()
    ));

    if !summary.failure_reasons.is_empty() {
        md.push_str("## Failures\n\n");
        md.push_str("| Reason | Units |\n");
        md.push_str("|--------|-------|\n");
        let mut reasons: Vec<_> = summary.failure_reasons.iter().collect();
        reasons.sort_by(|a, b| b.1.cmp(a.1));
        for (reason, count) in reasons {
            md.push_str(&format!("| {} | {} |\n", reason.replace('|', "\\|"), count));
        }
        md.push('\n');
    }

    if !summary.outputs.is_empty() {
        md.push_str("## Output Files\n\n");
        for path in &summary.outputs {
            md.push_str(&format!("- `{}`\n", path.display()));
        }
        md.push('\n');
    }

    md.push_str("---\n\n");
    md.push_str(&format!(
        "*Generated by Nutri-Harvest v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    md
}
