//! Chat command - follow-up questions about a saved run.

use crate::chat::{StudyContext, StudySession};
use crate::cli::preflight::{self, Requirements};
use crate::cli::Output;
use crate::config::{Prompts, Settings};
use crate::llm::OpenAIChat;
use crate::retry::RetryPolicy;
use anyhow::{Context, Result};
use console::style;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;

/// Run the interactive chat command.
pub async fn run_chat(results: &Path, settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Requirements::default()) {
        Output::error(&format!("{}", e));
        Output::info("Run 'rabbithole doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let context = StudyContext::load(results)
        .await
        .with_context(|| format!("Failed to load {}", results.display()))?;
    if context.report.succeeded().next().is_none() {
        Output::warning("No document in this run was processed successfully.");
    }

    let prompts = Prompts::load(
        settings.prompts.custom_dir.as_deref(),
        Some(&settings.prompts.variables),
    )?;
    let chat = OpenAIChat::new(&settings.planner.model, settings.planner.temperature)?;
    let mut session = StudySession::new(Arc::new(chat), &prompts, &context)
        .with_retry(RetryPolicy::from(&settings.pipeline));

    println!("\n{}", style("Rabbithole Chat").bold().cyan());
    println!(
        "{}\n",
        style("Type your questions, or 'exit' to quit. Use 'clear' to reset conversation.").dim()
    );
    println!("{} {}\n", style("Tutor:").cyan().bold(), session.greeting());

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("{} ", style("You:").green().bold());
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }

        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            Output::info("Goodbye!");
            break;
        }

        if input.eq_ignore_ascii_case("clear") {
            session.clear();
            Output::info("Conversation history cleared.");
            continue;
        }

        let spinner = Output::spinner("Thinking...");
        let answer = session.ask(input).await;
        spinner.finish_and_clear();

        match answer {
            Ok(answer) => println!("\n{} {}\n", style("Tutor:").cyan().bold(), answer),
            Err(e) => Output::error(&format!("Error: {}", e)),
        }
    }

    Ok(())
}
