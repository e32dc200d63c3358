//! PDF text extraction.
//!
//! The `TextExtractor` trait is the seam the server depends on; the
//! production implementation wraps the `pdf-extract` crate.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use pdfsage_core::{Error, Result};

/// Trait for document text extraction backends.
pub trait TextExtractor: Send + Sync {
    /// Extract all readable text from the document at `path`.
    ///
    /// Fails with `Error::UnreadableDocument` when the file cannot be parsed
    /// or contains no text.
    fn extract(&self, path: &Path) -> Result<String>;
}

/// `pdf-extract` backed extractor.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract(&self, path: &Path) -> Result<String> {
        extract_pdf_text(path)
    }
}

/// Returns true if the buffer starts with the PDF magic bytes.
pub fn is_pdf(head: &[u8]) -> bool {
    head.starts_with(b"%PDF-")
}

/// Extract the text of every page of a PDF file, one trailing newline per page.
pub fn extract_pdf_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .map_err(|e| Error::UnreadableDocument(e.to_string()))?;

    if !is_pdf(&bytes) {
        return Err(Error::UnreadableDocument(
            "not a PDF file".into(),
        ));
    }

    // pdf-extract panics on some malformed inputs.
    let pages = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(&bytes)
    }))
    .map_err(|_| Error::UnreadableDocument("parser crashed".into()))?
    .map_err(|e| Error::UnreadableDocument(e.to_string()))?;

    tracing::debug!("Extracted {} pages from {}", pages.len(), path.display());

    join_pages(pages)
}

/// Concatenate page texts, skipping empty pages, and reject text-free documents.
pub fn join_pages<I>(pages: I) -> Result<String>
where
    I: IntoIterator<Item = String>,
{
    let mut text = String::new();
    for page in pages {
        if !page.is_empty() {
            text.push_str(&page);
            text.push('\n');
        }
    }

    if text.trim().is_empty() {
        return Err(Error::UnreadableDocument(
            "no readable text".into(),
        ));
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_pages() {
        let text = join_pages(vec!["Page one".to_string(), String::new(), "Page two".to_string()])
            .unwrap();
        assert_eq!(text, "Page one\nPage two\n");
    }

    #[test]
    fn test_join_pages_whitespace_only() {
        let err = join_pages(vec!["  ".to_string(), "\n\t".to_string()]).unwrap_err();
        match err {
            Error::UnreadableDocument(msg) => assert_eq!(msg, "no readable text"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_join_pages_empty_document() {
        assert!(join_pages(Vec::<String>::new()).is_err());
    }

    #[test]
    fn test_is_pdf() {
        assert!(is_pdf(b"%PDF-1.7\n..."));
        assert!(!is_pdf(b"<html>"));
        assert!(!is_pdf(b""));
    }

    #[test]
    fn test_non_pdf_file_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.pdf");
        std::fs::write(&path, b"just some plain text").unwrap();

        let err = PdfTextExtractor.extract(&path).unwrap_err();
        assert!(matches!(err, Error::UnreadableDocument(_)));
    }

    #[test]
    fn test_corrupt_pdf_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"%PDF-1.4\nthis is not really a pdf").unwrap();

        let err = extract_pdf_text(&path).unwrap_err();
        assert!(matches!(err, Error::UnreadableDocument(_)));
    }
}
