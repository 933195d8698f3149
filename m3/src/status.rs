// m3/src/status.rs
//! Terminal reporting for completion streams.
use std::time::Duration;

use colored::*;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use m3_common::pipeline::{FetchCompletion, FetchSummary};
use m3_core::ReconcileReport;
use m3_net::fetch::FetchBatch;

pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.blue.bold} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn create_bar(len: usize, label: &str) -> ProgressBar {
    let pb = ProgressBar::with_draw_target(Some(len as u64), ProgressDrawTarget::stderr());
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb.set_prefix(label.to_string());
    pb
}

/// Drains `batch`, printing one line per finished file, and returns the
/// tally. `total` is the number of declared items, used to derive how many
/// were already present.
pub async fn track(label: &str, total: usize, mut batch: FetchBatch) -> FetchSummary {
    let mut summary = FetchSummary {
        local: total.saturating_sub(batch.submitted),
        ..Default::default()
    };

    if batch.submitted == 0 {
        println!("{} {} found. Nothing to download.", total, label);
        return summary;
    }

    println!(
        "{} {} {}... ({} found locally)",
        "==>".bold().blue(),
        "Downloading".bold(),
        format!("{} {}", batch.submitted, label).bold(),
        summary.local
    );

    let pb = create_bar(batch.submitted, label);
    while let Some(completion) = batch.completions.recv().await {
        pb.println(completion_line(&completion));
        summary.record(&completion);
        pb.inc(1);
    }
    pb.finish_and_clear();

    println!("{}", summary_line(label, &summary));
    summary
}

fn completion_line(completion: &FetchCompletion) -> String {
    match &completion.error {
        None => format!(
            "  {} {} {}",
            "✓".green(),
            completion.filename,
            format_size(completion.bytes_transferred).dimmed()
        ),
        Some(e) => format!("  {} {} - {}", "✗".red().bold(), completion.filename, e),
    }
}

pub fn summary_line(label: &str, summary: &FetchSummary) -> String {
    let counts = format!(
        "({} local, {} remote, {} failed)",
        summary.local,
        summary.fetched,
        summary.failed.len()
    );
    if summary.is_clean() {
        format!("{} {} {}", "✓".green().bold(), label, counts)
    } else {
        format!("{} {} {}", "✗".red().bold(), label, counts.red())
    }
}

pub fn print_reconcile(report: &ReconcileReport) {
    for name in &report.purged {
        println!("  {} {} (checksum mismatch)", "removed".yellow(), name);
    }
    for name in &report.enabled {
        println!("  {} {}", "enabled".cyan(), name);
    }
    for name in &report.disabled {
        println!("  {} {}", "disabled".dimmed(), name);
    }
    for name in &report.preserved {
        println!(
            "  {} {} (checksum mismatch, left in place)",
            "kept".yellow(),
            name
        );
    }
    for (name, e) in &report.failures {
        eprintln!("  {} {}: {}", "error".red().bold(), name, e);
    }
}

fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    let value = bytes as f64;
    if value >= MB {
        format!("{:.1} MB", value / MB)
    } else if value >= KB {
        format!("{:.1} KB", value / KB)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts() {
        colored::control::set_override(false);
        let summary = FetchSummary {
            local: 2,
            fetched: 3,
            failed: vec!["x.jar".into()],
        };
        assert_eq!(
            summary_line("mods", &summary),
            "✗ mods (2 local, 3 remote, 1 failed)"
        );
    }

    #[test]
    fn sizes() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }
}
