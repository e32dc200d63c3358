//! PdfSage Ingest — document path resolution and PDF text extraction.

pub mod file;
pub mod pdf;

pub use file::resolve_document_path;
pub use pdf::{extract_pdf_text, PdfTextExtractor, TextExtractor};
