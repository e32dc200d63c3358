//! PdfSage — ask questions about PDF documents using a local Ollama model.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pdfsage_core::PdfSageConfig;
use pdfsage_server::{cli, routes, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so terminal chat output stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config = PdfSageConfig::from_env()?;

    if args.len() > 1 {
        match args[1].as_str() {
            "serve" => {}
            "chat" => {
                if args.len() < 3 {
                    eprintln!("Usage: pdfsage chat <pdf-path> [model]");
                    std::process::exit(1);
                }
                let model = args.get(3).cloned();
                return cli::run_chat(config, Path::new(&args[2]), model).await;
            }
            "--help" | "-h" | "help" => {
                println!("PdfSage — ask questions about PDF documents");
                println!();
                println!("Usage: pdfsage [command]");
                println!();
                println!("Commands:");
                println!("  (none) | serve           Start the HTTP server");
                println!("  chat <pdf> [model]       Chat with a PDF in the terminal");
                println!("  help                     Show this help message");
                println!();
                println!("Environment:");
                println!("  HOST, PORT               Bind address (default 0.0.0.0:8000)");
                println!("  PDF_FOLDER               Folder with servable PDFs (default ./pdfs)");
                println!("  OLLAMA_HOST              Ollama URL (default http://localhost:11434)");
                println!("  PDFSAGE_DEFAULT_MODEL    Model when a request names none");
                println!("  PDFSAGE_THINK            Let models think first (trace logged, not streamed)");
                println!("  PDFSAGE_YIELD_MS         Pause after each streamed fragment");
                return Ok(());
            }
            _ => {
                eprintln!("Unknown command: {}. Use 'pdfsage help' for usage.", args[1]);
                std::process::exit(1);
            }
        }
    }

    serve(config).await
}

async fn serve(config: PdfSageConfig) -> anyhow::Result<()> {
    if !config.pdf_folder.is_dir() {
        warn!("PDF folder {} does not exist", config.pdf_folder.display());
    }
    info!("PDF folder: {}", config.pdf_folder.display());
    info!(
        "Ollama: {} (default model {})",
        config.ollama.base_url, config.ollama.default_model
    );

    let addr = config.bind_addr();
    let state = Arc::new(AppState::new(config));
    let app = routes::build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("PdfSage server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.shutdown.clone()))
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C after cancelling every in-flight relay.
async fn shutdown_signal(token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        // Without a signal handler there is nothing to wait for.
        std::future::pending::<()>().await;
    }
    info!("Shutting down, cancelling active streams");
    token.cancel();
}
