//! Overlapping character-window chunking
//!
//! Windows are measured in characters, not bytes. Consecutive windows share
//! exactly `overlap` characters, and each window prefers to end right after
//! a paragraph, line or word break when one is available in its second half.

use assistant_core::{AssistantError, Chunk, ChunkMetadata, Document, Result};

/// Separators tried in order when looking for a window boundary
const SEPARATORS: [&[char]; 3] = [&['\n', '\n'], &['\n'], &[' ']];

/// Splits documents into overlapping chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Create a chunker. Fails unless `overlap < chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(AssistantError::ConfigError(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if overlap >= chunk_size {
            return Err(AssistantError::ConfigError(format!(
                "chunk overlap ({overlap}) must be smaller than chunk size ({chunk_size})"
            )));
        }

        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split every document, in order
    pub fn split(&self, documents: &[Document]) -> Vec<Chunk> {
        let chunks: Vec<Chunk> = documents
            .iter()
            .flat_map(|doc| self.split_document(doc))
            .collect();

        tracing::debug!(
            documents = documents.len(),
            chunks = chunks.len(),
            "Split documents into chunks"
        );

        chunks
    }

    /// Split a single document
    pub fn split_document(&self, document: &Document) -> Vec<Chunk> {
        self.split_text(&document.text)
            .into_iter()
            .map(|(start_index, text)| {
                Chunk::new(
                    text,
                    ChunkMetadata::from_document(&document.metadata, start_index),
                )
            })
            .collect()
    }

    /// Split text into `(start_index, window)` pairs
    pub fn split_text(&self, text: &str) -> Vec<(usize, String)> {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        let mut windows = Vec::new();

        let mut start = 0;
        while start < len {
            let hard_end = (start + self.chunk_size).min(len);
            let end = if hard_end == len {
                len
            } else {
                // The boundary must lie past the overlap so the next window
                // starts strictly after this one.
                let lower = (start + self.overlap + 1).max(start + self.chunk_size / 2);
                find_break_point(&chars, lower, hard_end)
            };

            windows.push((start, chars[start..end].iter().collect()));

            if end == len {
                break;
            }
            start = end - self.overlap;
        }

        windows
    }
}

/// Split documents into chunks of at most `chunk_size` characters sharing
/// `overlap` characters between neighbours.
pub fn split(documents: &[Document], chunk_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    Ok(Chunker::new(chunk_size, overlap)?.split(documents))
}

/// Find the last position in `lower..=upper` that directly follows a separator
fn find_break_point(chars: &[char], lower: usize, upper: usize) -> usize {
    for separator in SEPARATORS {
        let width = separator.len();
        let found = (lower.max(width)..=upper)
            .rev()
            .find(|&pos| chars[pos - width..pos] == *separator);
        if let Some(pos) = found {
            return pos;
        }
    }

    // Fall back to the hard limit
    upper
}

#[cfg(test)]
mod tests {
    use super::*;
    use assistant_core::DocumentMetadata;
    use proptest::prelude::*;

    fn doc(text: &str) -> Document {
        Document::new(text, DocumentMetadata::new("doc1.html"))
    }

    fn reconstruct(chunks: &[Chunk], overlap: usize) -> String {
        let mut text = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            let skip = if i == 0 { 0 } else { overlap };
            text.extend(chunk.text.chars().skip(skip));
        }
        text
    }

    #[test]
    fn test_rejects_overlap_not_smaller_than_size() {
        assert!(matches!(
            Chunker::new(100, 100),
            Err(AssistantError::ConfigError(_))
        ));
        assert!(matches!(
            Chunker::new(100, 150),
            Err(AssistantError::ConfigError(_))
        ));
        assert!(matches!(Chunker::new(0, 0), Err(AssistantError::ConfigError(_))));
        assert!(split(&[doc("text")], 10, 10).is_err());
    }

    #[test]
    fn test_short_document_single_chunk() {
        let chunks = split(&[doc("Eichler built the Nürburgring in 1927.")], 1000, 200).unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Eichler built the Nürburgring in 1927.");
        assert_eq!(chunks[0].metadata.start_index, 0);
        assert_eq!(chunks[0].metadata.source, "doc1.html");
    }

    #[test]
    fn test_empty_document_yields_nothing() {
        assert!(split(&[doc("")], 10, 2).unwrap().is_empty());
    }

    #[test]
    fn test_windows_share_overlap() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let chunker = Chunker::new(10, 3).unwrap();
        let windows = chunker.split_text(text);

        assert_eq!(windows[0], (0, "abcdefghij".to_string()));
        assert_eq!(windows[1], (7, "hijklmnopq".to_string()));
        for pair in windows.windows(2) {
            let prev: Vec<char> = pair[0].1.chars().collect();
            let next: Vec<char> = pair[1].1.chars().collect();
            assert_eq!(prev[prev.len() - 3..], next[..3]);
        }
    }

    #[test]
    fn test_prefers_word_boundaries() {
        let chunker = Chunker::new(12, 2).unwrap();
        let windows = chunker.split_text("alpha beta gamma delta");

        assert_eq!(windows[0].1, "alpha beta ");
        assert!(windows.iter().all(|(_, w)| w.chars().count() <= 12));
    }

    #[test]
    fn test_prefers_paragraph_over_word_boundary() {
        let chunker = Chunker::new(20, 0).unwrap();
        let windows = chunker.split_text("first para\n\nsecond para here");

        assert_eq!(windows[0].1, "first para\n\n");
        assert_eq!(windows[1].0, 12);
    }

    #[test]
    fn test_metadata_inherited() {
        let document = Document::new(
            "x".repeat(25),
            DocumentMetadata::new("rules.pdf")
                .with_page(4)
                .with_extra("title", "Rules"),
        );
        let chunks = split(&[document], 10, 0).unwrap();

        assert_eq!(chunks.len(), 3);
        let starts: Vec<usize> = chunks.iter().map(|c| c.metadata.start_index).collect();
        assert_eq!(starts, vec![0, 10, 20]);
        for chunk in &chunks {
            assert_eq!(chunk.metadata.page, Some(4));
            assert_eq!(chunk.metadata.extra["title"], "Rules");
        }

        // Distinct offsets give distinct ids
        assert_ne!(chunks[0].id, chunks[1].id);
    }

    #[test]
    fn test_deterministic() {
        let text = "Lap one. Lap two.\n\nLap three and a long straight.".repeat(5);
        let first = split(&[doc(&text)], 40, 10).unwrap();
        let second = split(&[doc(&text)], 40, 10).unwrap();
        assert_eq!(first, second);
    }

    proptest! {
        #[test]
        fn prop_chunks_reconstruct_document(
            text in "[a-zü \n]{0,400}",
            (chunk_size, overlap) in (1usize..64).prop_flat_map(|size| (Just(size), 0..size)),
        ) {
            let chunks = split(&[doc(&text)], chunk_size, overlap).unwrap();

            prop_assert_eq!(reconstruct(&chunks, overlap), text.clone());

            let chars: Vec<char> = text.chars().collect();
            for chunk in &chunks {
                let len = chunk.text.chars().count();
                prop_assert!(len <= chunk_size);
                prop_assert!(len > 0);
                let start = chunk.metadata.start_index;
                let expected: String = chars[start..start + len].iter().collect();
                prop_assert_eq!(&chunk.text, &expected);
            }
        }
    }
}
