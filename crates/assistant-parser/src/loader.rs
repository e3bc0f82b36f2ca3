//! Directory loader
//!
//! Walks a directory and loads every file whose extension is selected,
//! dispatching to the parser registered for its file type.

use std::path::{Path, PathBuf};

use assistant_core::Document;

use crate::{ParserError, ParserRegistry, Result};

/// Loads all matching documents below a root directory
pub struct DirectoryLoader {
    root: PathBuf,
    extensions: Vec<String>,
    recursive: bool,
    registry: ParserRegistry,
}

impl DirectoryLoader {
    /// Loader for `*.html` files, descending into subdirectories
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: vec!["html".to_string()],
            recursive: true,
            registry: ParserRegistry::with_defaults(),
        }
    }

    /// Select the file extensions to load (case-insensitive, without dot)
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    /// Descend into subdirectories or not
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Use a custom parser registry
    pub fn with_registry(mut self, registry: ParserRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Matching file paths, sorted
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Err(ParserError::NotADirectory(self.root.display().to_string()));
        }

        let mut files = Vec::new();
        self.collect(&self.root, &mut files)?;
        files.sort();
        Ok(files)
    }

    /// Load every matching file
    pub fn load(&self) -> Result<Vec<Document>> {
        let files = self.files()?;
        let mut documents = Vec::with_capacity(files.len());

        for path in &files {
            let loaded = self.registry.parse(path)?;
            tracing::debug!(path = %path.display(), documents = loaded.len(), "Loaded file");
            documents.extend(loaded);
        }

        tracing::info!(
            root = %self.root.display(),
            files = files.len(),
            documents = documents.len(),
            "Loaded documents"
        );

        Ok(documents)
    }

    fn collect(&self, dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
        let entries = std::fs::read_dir(dir).map_err(|e| io_error(dir, e))?;

        for entry in entries {
            let path = entry.map_err(|e| io_error(dir, e))?.path();
            if path.is_dir() {
                if self.recursive {
                    self.collect(&path, files)?;
                }
            } else if self.matches(&path) {
                files.push(path);
            }
        }

        Ok(())
    }

    fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> ParserError {
    ParserError::IoError {
        path: path.display().to_string(),
        source,
    }
}
