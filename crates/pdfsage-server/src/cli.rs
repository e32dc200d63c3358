//! Terminal chat over a single PDF.
//!
//! Loads the document once, then answers questions read from stdin,
//! streaming each answer to stdout through the same relay the HTTP API uses.
//! Ctrl-C stops the current answer; at the prompt it leaves the session.

use std::io::{self, Write};
use std::path::Path;

use pdfsage_chat::{prompt, OllamaClient, RelayOutcome, StreamRelay, WriteSink};
use pdfsage_core::PdfSageConfig;
use pdfsage_ingest::extract_pdf_text;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

pub async fn run_chat(
    config: PdfSageConfig,
    pdf_path: &Path,
    model: Option<String>,
) -> anyhow::Result<()> {
    println!("Reading PDF...");
    let path = pdf_path.to_path_buf();
    let context = tokio::task::spawn_blocking(move || extract_pdf_text(&path)).await??;

    let client = OllamaClient::new(&config.ollama);
    let model = model.unwrap_or_else(|| config.ollama.default_model.clone());

    println!("PDF loaded. You can now ask questions (type 'exit' to quit).");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("You: ");
        io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if is_exit_command(question) {
            break;
        }

        let messages = prompt::build_messages(question, &context);
        let upstream = match client.chat_stream(&model, &messages).await {
            Ok(s) => s,
            Err(e) => {
                eprintln!("{}", e);
                continue;
            }
        };

        let cancel = CancellationToken::new();
        let interrupt = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        print!("Bot: ");
        io::stdout().flush()?;

        let mut sink = WriteSink::new(io::stdout());
        let report = StreamRelay::new(cancel).run(upstream, &mut sink).await;
        interrupt.abort();
        println!();

        match report.outcome {
            RelayOutcome::Errored(e) => eprintln!("Answer interrupted: {}", e),
            RelayOutcome::Cancelled => println!("(stopped)"),
            _ => {}
        }
    }

    Ok(())
}

fn is_exit_command(input: &str) -> bool {
    matches!(input.to_lowercase().as_str(), "exit" | "quit")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_commands() {
        assert!(is_exit_command("exit"));
        assert!(is_exit_command("QUIT"));
        assert!(!is_exit_command("exit now"));
        assert!(!is_exit_command("what is the exit fee?"));
    }
}
