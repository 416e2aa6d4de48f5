use anyhow::{Context, Result};
use mutimg_core::run::{RunReport, VariantStatus};
use serde::Serialize;

use crate::image_digest;

#[derive(Debug, Serialize)]
pub struct VariantSummary {
    pub program: String,
    pub output: String,
    pub entries: usize,
    #[serde(flatten)]
    pub status: VariantStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub started_at: String,
    pub finished_at: String,
    pub merged: usize,
    pub variants: Vec<VariantSummary>,
}

/// Flatten a run report, hashing every merged image.
pub fn summarize(report: &RunReport) -> Result<RunSummary> {
    let mut variants = Vec::new();
    for program in &report.programs {
        for variant in &program.variants {
            let sha256 = match variant.status {
                VariantStatus::Merged { .. } => Some(image_digest(&variant.output)?),
                _ => None,
            };
            variants.push(VariantSummary {
                program: program.program.display().to_string(),
                output: variant.output.display().to_string(),
                entries: variant.entries,
                status: variant.status.clone(),
                sha256,
            });
        }
    }

    Ok(RunSummary {
        started_at: report.started_at.clone(),
        finished_at: report.finished_at.clone(),
        merged: report.merged_count(),
        variants,
    })
}

pub fn print_report(report: &RunReport, json: bool) -> Result<()> {
    let summary = summarize(report)?;

    if json {
        let serialized = serde_json::to_string_pretty(&summary)
            .context("Failed to serialize run summary to JSON")?;
        println!("{}", serialized);
        return Ok(());
    }

    println!("Mutated images ({} of {} merged):", summary.merged, summary.variants.len());
    for variant in &summary.variants {
        match (&variant.status, &variant.sha256) {
            (VariantStatus::Merged { image_len, written_bytes }, Some(hash)) => println!(
                "  - {} [{} entries, {} of {} bytes patched] sha256={}",
                variant.output, variant.entries, written_bytes, image_len, hash
            ),
            (VariantStatus::Empty, _) => {
                println!("  - {} [no instructions captured]", variant.output)
            }
            (VariantStatus::WriteFailed { error }, _) => {
                println!("  - {} [skipped: {}]", variant.output, error)
            }
            (status, _) => println!("  - {} [{:?}]", variant.output, status),
        }
    }

    Ok(())
}
