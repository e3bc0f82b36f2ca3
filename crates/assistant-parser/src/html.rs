//! HTML document parser using scraper
//!
//! Extracts the visible text of a page (script and style contents are
//! skipped) and keeps the page title as metadata.

use std::path::Path;

use assistant_core::{Document, DocumentMetadata};
use scraper::{Html, Node, Selector};

use crate::{read_file, DocumentParser, FileType, Result};

/// Elements whose text never reaches the reader
const HIDDEN_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

/// HTML document parser
pub struct HtmlParser {
    body: Selector,
    title: Selector,
}

impl HtmlParser {
    /// Create a new HTML parser
    pub fn new() -> Self {
        Self {
            body: Selector::parse("body").expect("body selector"),
            title: Selector::parse("title").expect("title selector"),
        }
    }

    /// Parse HTML source into a document attributed to `source`
    pub fn parse_html(&self, html: &str, source: impl Into<String>) -> Document {
        let document = Html::parse_document(html);
        let root = document
            .select(&self.body)
            .next()
            .unwrap_or_else(|| document.root_element());

        let mut raw = String::new();
        for node in root.descendants() {
            let Node::Text(text) = node.value() else {
                continue;
            };
            let hidden = node
                .parent()
                .and_then(|parent| parent.value().as_element().map(|el| el.name()))
                .is_some_and(|name| HIDDEN_ELEMENTS.contains(&name));
            if !hidden {
                raw.push_str(text);
            }
        }

        let text = collapse_whitespace(&raw);

        let mut metadata = DocumentMetadata::new(source);
        if let Some(title) = document.select(&self.title).next() {
            let title = title
                .text()
                .flat_map(str::split_whitespace)
                .collect::<Vec<_>>()
                .join(" ");
            if !title.is_empty() {
                metadata = metadata.with_extra("title", title);
            }
        }

        Document::new(text, metadata)
    }
}

impl Default for HtmlParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentParser for HtmlParser {
    fn parse(&self, path: &Path) -> Result<Vec<Document>> {
        let html = read_file(path)?;
        Ok(vec![self.parse_html(&html, path.display().to_string())])
    }

    fn supported_types(&self) -> &[FileType] {
        &[FileType::Html]
    }
}

/// Collapse runs of spaces within lines and drop blank lines
fn collapse_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
