//! Output formatters for embed reports

use anyhow::Result;
use colored::*;
use sheetimg_core::{EmbedOutcome, EmbedReport};
use std::path::Path;

/// Print the report in human-readable format with colors
pub fn print_human(file_path: &Path, report: &EmbedReport) {
    println!("{}", format!("Embedding into: {}", file_path.display()).bold());
    println!("{} {}", "Worksheet:".bold(), report.worksheet.cyan());
    println!();

    if report.outcomes.is_empty() {
        println!("{}", "No image rows found.".yellow().bold());
    }

    for outcome in &report.outcomes {
        match outcome {
            EmbedOutcome::Embedded {
                cell,
                source,
                media_name,
                image,
                ..
            } => {
                println!(
                    "  {} {} {} {}",
                    "OK".green().bold(),
                    cell.yellow(),
                    source,
                    format!("-> media/{} [{}]", media_name, image.image_id).bright_black()
                );
            }
            EmbedOutcome::Skipped {
                row,
                source,
                reason,
            } => {
                let source = if source.is_empty() { "(empty)" } else { source.as_str() };
                println!(
                    "  {} row {} {} {}",
                    "SKIP".yellow().bold(),
                    row,
                    source,
                    format!("({})", reason).bright_black()
                );
            }
        }
    }
    println!();

    println!("{}", "Summary:".bold().underline());
    println!("  {} {}", "Embedded:".green().bold(), report.embedded_count());
    if report.skipped_count() > 0 {
        println!("  {} {}", "Skipped:".yellow().bold(), report.skipped_count());
    }
    match &report.output {
        Some(output) => println!("  {} {}", "Output:".bold(), output.display()),
        None => println!("  {}", "[DRY RUN] no output written".blue().bold()),
    }
    if let Some(work_dir) = &report.work_dir {
        println!("  {} {}", "Working directory:".bold(), work_dir.display());
    }
}

/// Print the report in JSON format
pub fn print_json(file_path: &Path, report: &EmbedReport) -> Result<()> {
    let output = serde_json::json!({
        "file": file_path.display().to_string(),
        "report": report,
        "summary": {
            "total": report.outcomes.len(),
            "embedded": report.embedded_count(),
            "skipped": report.skipped_count(),
        }
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
