//! CLI output formatting utilities.

use crate::pipeline::{DocumentResult, JobFailure};
use crate::planner::{PlanEntry, StudyPlan};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print a list item.
    pub fn list_item(msg: &str) {
        println!("  {} {}", style("*").cyan(), msg);
    }

    /// Print a processed document.
    pub fn document_result(result: &DocumentResult) {
        println!(
            "\n{} {}",
            style(">>").green(),
            style(result.document_id.as_str()).bold()
        );
        if result.keywords.is_empty() {
            println!("   {}", style("no keywords").dim());
        } else {
            println!("   {} {}", style("Keywords:").dim(), result.keywords.join(", "));
        }
        println!("   {}", content_preview(&result.summary, 600));
    }

    /// Print a document whose job failed.
    pub fn document_failure(document: &str, failure: &JobFailure) {
        println!(
            "\n{} {} {}",
            style(">>").red(),
            style(document).bold(),
            style(format!("(failed while {})", failure.stage)).dim()
        );
        println!("   {}", failure.message);
    }

    /// Print a study plan.
    pub fn plan(plan: &StudyPlan) {
        for entry in &plan.entries {
            Self::plan_entry(entry);
        }
        if !plan.failures.is_empty() {
            println!("\n{}", style("Not included").bold());
            for failure in &plan.failures {
                println!("  {} {}: {}", style("✗").red(), failure.document, failure.reason);
            }
        }
    }

    fn plan_entry(entry: &PlanEntry) {
        println!("\n{}", style(&entry.document).bold());
        for (title, items) in [
            ("Background concepts", &entry.background_concepts),
            ("Key concepts", &entry.key_concepts),
            ("Further reading", &entry.further_reading),
        ] {
            if items.is_empty() {
                continue;
            }
            println!("  {}", style(title).cyan());
            for item in items {
                println!("    {} {}", style("*").dim(), item);
            }
        }
    }

    /// Create a progress bar.
    pub fn progress_bar(len: u64, msg: &str) -> ProgressBar {
        let pb = ProgressBar::new(len);
        if let Ok(bar_style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(bar_style.progress_chars("#>-"));
        }
        pb.set_message(msg.to_string());
        pb
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(spinner_style) =
            ProgressStyle::default_spinner().template("{spinner:.green} {msg}")
        {
            pb.set_style(spinner_style);
        }
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// Collapse newlines and truncate on a character boundary.
fn content_preview(content: &str, max_chars: usize) -> String {
    let content = content.replace('\n', " ");
    if content.chars().count() <= max_chars {
        content
    } else {
        let truncated: String = content.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// Format a byte count in human-readable form.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_preview_respects_chars() {
        assert_eq!(content_preview("a\nb", 10), "a b");
        assert_eq!(content_preview("ééééé", 3), "ééé...");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(500), "500 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1024 * 1024), "1.0 MB");
        assert_eq!(format_size(1024 * 1024 * 1024), "1.0 GB");
    }
}
