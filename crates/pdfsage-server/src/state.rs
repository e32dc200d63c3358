//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use pdfsage_chat::{OllamaClient, StreamRelay};
use pdfsage_core::{Error, PdfSageConfig, Result};
use pdfsage_ingest::{resolve_document_path, PdfTextExtractor, TextExtractor};
use tokio_util::sync::CancellationToken;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: PdfSageConfig,
    pub ollama: OllamaClient,
    pub extractor: Arc<dyn TextExtractor>,
    /// Cancelled on server shutdown; every relay runs on a child token.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: PdfSageConfig) -> Self {
        Self::with_extractor(config, Arc::new(PdfTextExtractor))
    }

    pub fn with_extractor(config: PdfSageConfig, extractor: Arc<dyn TextExtractor>) -> Self {
        let ollama = OllamaClient::new(&config.ollama);
        Self {
            config,
            ollama,
            extractor,
            shutdown: CancellationToken::new(),
        }
    }

    /// Model named by the request, or the configured default.
    pub fn resolve_model(&self, requested: Option<&str>) -> String {
        requested
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(self.config.ollama.default_model.as_str())
            .to_string()
    }

    /// Relay for one answer stream, tied to server shutdown.
    pub fn relay(&self) -> StreamRelay {
        StreamRelay::new(self.shutdown.child_token())
            .with_pause(Duration::from_millis(self.config.yield_delay_ms))
    }

    /// Resolve a document name and extract its text off the async runtime.
    pub async fn load_document_text(&self, filename: &str) -> Result<String> {
        let path = resolve_document_path(&self.config.pdf_folder, filename)?;
        let extractor = self.extractor.clone();

        tokio::task::spawn_blocking(move || extractor.extract(&path))
            .await
            .map_err(|e| Error::Internal(format!("Extraction task failed: {}", e)))?
    }
}
