//! PdfSage Core — configuration and the shared error type.

pub mod config;
pub mod error;

pub use config::{OllamaSettings, PdfSageConfig};
pub use error::{Error, Result};
