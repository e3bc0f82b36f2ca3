//! Assistant Parser - Document loading and chunking
//!
//! Supports loading of:
//! - HTML pages
//! - PDF documents (one document per page)
//! - Markdown and plain text files
//!
//! Each parser implements the `DocumentParser` trait and produces
//! `Document` values that the chunker splits into overlapping,
//! independently retrievable chunks.

use std::path::Path;

use assistant_core::{AssistantError, Document, DocumentMetadata};
use thiserror::Error;

pub mod chunk;
pub mod html;
pub mod loader;
pub mod pdf;

pub use chunk::{split, Chunker};
pub use html::HtmlParser;
pub use loader::DirectoryLoader;
pub use pdf::PdfParser;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while loading documents
#[derive(Error, Debug)]
pub enum ParserError {
    /// File format is not supported
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// IO error while reading the file
    #[error("IO error reading file: {path}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Path given to a directory loader is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// PDF parsing error
    #[error("PDF parsing error: {0}")]
    PdfError(String),
}

pub type Result<T> = std::result::Result<T, ParserError>;

impl From<ParserError> for AssistantError {
    fn from(err: ParserError) -> Self {
        match err {
            ParserError::IoError { .. } | ParserError::NotADirectory(_) => {
                AssistantError::StorageError(err.to_string())
            }
            other => AssistantError::Other(anyhow::Error::new(other)),
        }
    }
}

// ============================================================================
// File Types
// ============================================================================

/// Supported file types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Pdf,
    Markdown,
    PlainText,
    Html,
    Unknown,
}

impl FileType {
    /// Detect file type from extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "md" | "markdown" => Self::Markdown,
            "txt" => Self::PlainText,
            "html" | "htm" => Self::Html,
            _ => Self::Unknown,
        }
    }

    /// Detect file type from path
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unknown)
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pdf => write!(f, "pdf"),
            Self::Markdown => write!(f, "markdown"),
            Self::PlainText => write!(f, "text"),
            Self::Html => write!(f, "html"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

// ============================================================================
// Parser Trait
// ============================================================================

/// Trait for document loaders
pub trait DocumentParser: Send + Sync {
    /// Load one file. Paged formats may yield one document per page.
    fn parse(&self, path: &Path) -> Result<Vec<Document>>;

    /// Get supported file types
    fn supported_types(&self) -> &[FileType];

    /// Check if this parser can handle a file type
    fn can_parse(&self, file_type: FileType) -> bool {
        self.supported_types().contains(&file_type)
    }
}

pub(crate) fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| ParserError::IoError {
        path: path.display().to_string(),
        source: e,
    })
}

// ============================================================================
// Parser Registry
// ============================================================================

/// Registry of available parsers, keyed by file type
pub struct ParserRegistry {
    parsers: Vec<Box<dyn DocumentParser>>,
}

impl ParserRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    /// Registry with the HTML, PDF and plain text parsers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(HtmlParser::new());
        registry.register(PdfParser::new());
        registry.register(PlainTextParser);
        registry
    }

    /// Register a parser
    pub fn register<P: DocumentParser + 'static>(&mut self, parser: P) {
        self.parsers.push(Box::new(parser));
    }

    /// Find a parser for a file type
    pub fn find_parser(&self, file_type: FileType) -> Option<&dyn DocumentParser> {
        self.parsers
            .iter()
            .find(|p| p.can_parse(file_type))
            .map(|p| p.as_ref())
    }

    /// Parse a file using the appropriate parser
    pub fn parse(&self, path: &Path) -> Result<Vec<Document>> {
        let file_type = FileType::from_path(path);

        if file_type == FileType::Unknown {
            return Err(ParserError::UnsupportedFormat(
                path.extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("none")
                    .to_string(),
            ));
        }

        let parser = self
            .find_parser(file_type)
            .ok_or_else(|| ParserError::UnsupportedFormat(file_type.to_string()))?;

        parser.parse(path)
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ============================================================================
// Plain Text
// ============================================================================

/// Plain text and markdown parser
pub struct PlainTextParser;

impl DocumentParser for PlainTextParser {
    fn parse(&self, path: &Path) -> Result<Vec<Document>> {
        let content = read_file(path)?;

        Ok(vec![Document::new(
            content,
            DocumentMetadata::new(path.display().to_string()),
        )])
    }

    fn supported_types(&self) -> &[FileType] {
        &[FileType::PlainText, FileType::Markdown]
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_detection() {
        assert_eq!(FileType::from_extension("pdf"), FileType::Pdf);
        assert_eq!(FileType::from_extension("PDF"), FileType::Pdf);
        assert_eq!(FileType::from_extension("html"), FileType::Html);
        assert_eq!(FileType::from_extension("htm"), FileType::Html);
        assert_eq!(FileType::from_extension("md"), FileType::Markdown);
        assert_eq!(FileType::from_extension("docx"), FileType::Unknown);
    }

    #[test]
    fn test_registry_rejects_unknown_extension() {
        let registry = ParserRegistry::with_defaults();
        let err = registry.parse(Path::new("notes.xyz")).unwrap_err();
        assert!(matches!(err, ParserError::UnsupportedFormat(ext) if ext == "xyz"));
    }

    #[test]
    fn test_plain_text_parser() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "Pit stop strategy.").unwrap();

        let docs = ParserRegistry::with_defaults().parse(&path).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].text, "Pit stop strategy.");
        assert_eq!(docs[0].source(), path.display().to_string());
    }

    #[test]
    fn test_io_error_maps_to_storage_error() {
        let err = PlainTextParser.parse(Path::new("/nonexistent/file.txt")).unwrap_err();
        let err: AssistantError = err.into();
        assert!(matches!(err, AssistantError::StorageError(_)));
    }
}
