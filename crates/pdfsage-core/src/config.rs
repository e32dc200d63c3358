//! Configuration loaded from the environment.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PDF_FOLDER: &str = "./pdfs";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "qwen3:0.6b";

/// Connection settings for the Ollama backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaSettings {
    /// Base URL, e.g. `http://localhost:11434`.
    pub base_url: String,
    /// Model used when a request does not name one.
    pub default_model: String,
    /// Whether reasoning models think before answering. The trace itself is
    /// only logged at `trace` level; answers carry just the final text.
    pub think: bool,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.into(),
            default_model: DEFAULT_MODEL.into(),
            think: false,
        }
    }
}

/// Top-level PdfSage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfSageConfig {
    /// Bind address for the HTTP server.
    pub host: String,
    /// HTTP server port.
    pub port: u16,
    /// Folder the `filename` request field is resolved against.
    pub pdf_folder: PathBuf,
    pub ollama: OllamaSettings,
    /// Extra pause after each relayed fragment, in milliseconds.
    /// Zero means a plain scheduler yield.
    pub yield_delay_ms: u64,
}

impl Default for PdfSageConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            pdf_folder: PathBuf::from(DEFAULT_PDF_FOLDER),
            ollama: OllamaSettings::default(),
            yield_delay_ms: 0,
        }
    }
}

impl PdfSageConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = match lookup("PORT") {
            Some(p) => p
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("invalid PORT: {}", p)))?,
            None => defaults.port,
        };

        let yield_delay_ms = match lookup("PDFSAGE_YIELD_MS") {
            Some(v) => v
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("invalid PDFSAGE_YIELD_MS: {}", v)))?,
            None => 0,
        };

        let think = lookup("PDFSAGE_THINK")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);

        let base_url = lookup("OLLAMA_HOST")
            .map(|h| normalize_base_url(&h))
            .unwrap_or(defaults.ollama.base_url);

        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port,
            pdf_folder: lookup("PDF_FOLDER")
                .map(PathBuf::from)
                .unwrap_or(defaults.pdf_folder),
            ollama: OllamaSettings {
                base_url,
                default_model: lookup("PDFSAGE_DEFAULT_MODEL")
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or(defaults.ollama.default_model),
                think,
            },
            yield_delay_ms,
        })
    }

    /// `host:port` string for binding the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Ollama accepts `OLLAMA_HOST` without a scheme (`127.0.0.1:11434`).
fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}
