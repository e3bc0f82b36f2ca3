//! PDF document parser using pdf-extract
//!
//! Extracts text content from PDF files and yields one document per page,
//! so every chunk can point back to the page it came from.

use std::path::Path;

use assistant_core::{Document, DocumentMetadata};

use crate::{DocumentParser, FileType, ParserError, Result};

/// Page break emitted by pdf-extract between pages
const FORM_FEED: char = '\x0C';

/// PDF document parser
pub struct PdfParser {
    /// Keep pages that contain no text
    pub keep_empty_pages: bool,
}

impl PdfParser {
    /// Create a new PDF parser with default settings
    pub fn new() -> Self {
        Self {
            keep_empty_pages: false,
        }
    }

    /// Keep or drop pages without text
    pub fn with_empty_pages(mut self, keep: bool) -> Self {
        self.keep_empty_pages = keep;
        self
    }

    /// Extract text from a PDF file
    fn extract_text(&self, path: &Path) -> Result<String> {
        let bytes = std::fs::read(path).map_err(|e| ParserError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        pdf_extract::extract_text_from_mem(&bytes).map_err(|e| ParserError::PdfError(e.to_string()))
    }

    /// Split extracted text into per-page documents (pages are 1-based)
    fn split_pages(&self, text: &str, source: &str) -> Vec<Document> {
        let title = text
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .filter(|line| line.len() < 200)
            .map(str::to_string);

        text.split(FORM_FEED)
            .enumerate()
            .filter(|(_, page)| self.keep_empty_pages || !page.trim().is_empty())
            .map(|(index, page)| {
                let mut metadata = DocumentMetadata::new(source).with_page(index as u32 + 1);
                if let Some(title) = &title {
                    metadata = metadata.with_extra("title", title.clone());
                }
                Document::new(page.trim(), metadata)
            })
            .collect()
    }
}

impl Default for PdfParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentParser for PdfParser {
    fn parse(&self, path: &Path) -> Result<Vec<Document>> {
        let text = self.extract_text(path)?;
        let pages = self.split_pages(&text, &path.display().to_string());

        tracing::debug!(path = %path.display(), pages = pages.len(), "Parsed PDF");
        Ok(pages)
    }

    fn supported_types(&self) -> &[FileType] {
        &[FileType::Pdf]
    }
}
