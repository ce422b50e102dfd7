//! Doctor command - verify system requirements and configuration.

use crate::cli::output::format_size;
use crate::cli::Output;
use crate::config::{ReferenceProvider, Settings};
use crate::reference::ReferenceIndex;
use console::style;
use std::process::Command;

/// Check result for a single item.
#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckResult {
    fn ok(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: message.to_string(),
            hint: None,
        }
    }

    fn warning(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn error(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn print(&self) {
        let icon = match self.status {
            CheckStatus::Ok => style("✓").green(),
            CheckStatus::Warning => style("!").yellow(),
            CheckStatus::Error => style("✗").red(),
        };

        println!("  {} {} - {}", icon, style(&self.name).bold(), self.message);

        if let Some(hint) = &self.hint {
            println!("    {} {}", style("→").dim(), style(hint).dim());
        }
    }
}

/// Run all diagnostic checks.
pub async fn run_doctor(settings: &Settings) -> anyhow::Result<()> {
    Output::header("Rabbithole Doctor");
    println!();

    let mut checks = Vec::new();

    println!("{}", style("External Tools").bold());
    // Only needed for some inputs, so a missing tool is a warning.
    for check in [
        check_tool("ffmpeg", "-version", "needed for audio and video", install_hint("ffmpeg")),
        check_tool("tesseract", "--version", "needed for images", install_hint("tesseract")),
    ] {
        check.print();
        checks.push(check);
    }
    println!();

    println!("{}", style("API Configuration").bold());
    let api_check = check_openai_api_key();
    api_check.print();
    checks.push(api_check);
    println!();

    println!("{}", style("Reference Index").bold());
    let index_check = check_reference_index(settings).await;
    index_check.print();
    checks.push(index_check);
    println!();

    println!("{}", style("Configuration").bold());
    let config_check = check_config_file();
    config_check.print();
    checks.push(config_check);
    println!();

    let errors = checks.iter().filter(|c| c.status == CheckStatus::Error).count();
    let warnings = checks.iter().filter(|c| c.status == CheckStatus::Warning).count();

    if errors > 0 {
        Output::error(&format!(
            "{} error(s) found. Please fix them before using Rabbithole.",
            errors
        ));
        std::process::exit(1);
    } else if warnings > 0 {
        Output::warning(&format!("All checks passed with {} warning(s).", warnings));
    } else {
        Output::success("All checks passed! Rabbithole is ready to use.");
    }

    Ok(())
}

/// Check if an optional external tool is available.
fn check_tool(name: &str, version_arg: &str, purpose: &str, hint: &str) -> CheckResult {
    match Command::new(name).arg(version_arg).output() {
        Ok(output) if output.status.success() => {
            // tesseract prints its version on stderr
            let text = if output.stdout.is_empty() { &output.stderr } else { &output.stdout };
            let version: String = String::from_utf8_lossy(text)
                .lines()
                .next()
                .unwrap_or("installed")
                .trim()
                .chars()
                .take(50)
                .collect();
            CheckResult::ok(name, &version)
        }
        Ok(_) => CheckResult::warning(name, "installed but not working", hint),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            CheckResult::warning(name, &format!("not found ({})", purpose), hint)
        }
        Err(e) => CheckResult::warning(name, &format!("error: {}", e), hint),
    }
}

/// Check if OpenAI API key is configured.
fn check_openai_api_key() -> CheckResult {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if key.starts_with("sk-") && key.len() > 20 => {
            let masked = format!("{}...{}", &key[..7], &key[key.len() - 4..]);
            CheckResult::ok("OPENAI_API_KEY", &format!("configured ({})", masked))
        }
        Ok(key) if key.is_empty() => CheckResult::error(
            "OPENAI_API_KEY",
            "empty",
            "Set with: export OPENAI_API_KEY='sk-...'",
        ),
        Ok(_) => CheckResult::warning(
            "OPENAI_API_KEY",
            "set but format looks unusual",
            "Expected format: sk-... (OpenAI API key)",
        ),
        Err(_) => CheckResult::error(
            "OPENAI_API_KEY",
            "not set",
            "Set with: export OPENAI_API_KEY='sk-...'",
        ),
    }
}

/// Check that the reference index opens and holds topics.
async fn check_reference_index(settings: &Settings) -> CheckResult {
    let name = "Topics";
    if settings.reference.provider == ReferenceProvider::Memory {
        return CheckResult::warning(
            name,
            "memory provider (empty on every run)",
            "Set reference.provider = \"sqlite\" to keep imported topics",
        );
    }

    let path = settings.reference_path();
    let count = match ReferenceIndex::open(settings) {
        Ok(index) => index.store().count().await,
        Err(e) => Err(e),
    };

    match count {
        Ok(0) => CheckResult::warning(
            name,
            &format!("{} is empty", path.display()),
            "Import topics with: rabbithole reference import <file.jsonl>",
        ),
        Ok(n) => {
            let size = std::fs::metadata(&path)
                .map(|m| format_size(m.len()))
                .unwrap_or_else(|_| "unknown size".to_string());
            CheckResult::ok(name, &format!("{} topics in {} ({})", n, path.display(), size))
        }
        Err(e) => CheckResult::error(
            name,
            &format!("cannot open {}: {}", path.display(), e),
            "Check reference.sqlite_path in the config file",
        ),
    }
}

/// Check if config file exists.
fn check_config_file() -> CheckResult {
    let config_path = Settings::default_config_path();
    if config_path.exists() {
        CheckResult::ok("Config file", &format!("{}", config_path.display()))
    } else {
        CheckResult::warning(
            "Config file",
            "using defaults",
            "Create with: rabbithole config init",
        )
    }
}

/// Platform-specific install hint.
fn install_hint(tool: &str) -> &'static str {
    match tool {
        "ffmpeg" if cfg!(target_os = "macos") => "Install with: brew install ffmpeg",
        "ffmpeg" if cfg!(target_os = "linux") => {
            "Install with: sudo apt install ffmpeg (or your package manager)"
        }
        "ffmpeg" => "Install from: https://ffmpeg.org/download.html",
        _ if cfg!(target_os = "macos") => "Install with: brew install tesseract",
        _ if cfg!(target_os = "linux") => {
            "Install with: sudo apt install tesseract-ocr (or your package manager)"
        }
        _ => "Install from: https://github.com/tesseract-ocr/tesseract",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_result_ok() {
        let result = CheckResult::ok("test", "passed");
        assert_eq!(result.status, CheckStatus::Ok);
        assert!(result.hint.is_none());
    }

    #[test]
    fn test_missing_tool_is_warning() {
        let result = check_tool("rabbithole-no-such-tool", "--version", "testing", "n/a");
        assert_eq!(result.status, CheckStatus::Warning);
        assert_eq!(result.hint.as_deref(), Some("n/a"));
    }

    #[tokio::test]
    async fn test_empty_sqlite_index_is_warning() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.reference.sqlite_path = dir.path().join("ref.db").display().to_string();

        let result = check_reference_index(&settings).await;
        assert_eq!(result.status, CheckStatus::Warning);
    }
}
