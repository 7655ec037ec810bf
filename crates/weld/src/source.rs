//! Source loading
//!
//! A `SourceDocument` is read once, fully, and never modified. Lines keep
//! their terminators so that any contiguous line range concatenates back to
//! the exact original text.

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::{debug, trace};

use crate::error::{Result, WeldError};

/// Immutable line-indexed source text with its logical origin
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Logical name of the module this document belongs to
    module: String,
    /// Path the document was loaded from
    origin: PathBuf,
    text: String,
    /// Byte offset where each line starts; one extra entry at `text.len()`
    line_starts: Vec<usize>,
}

impl SourceDocument {
    /// Build a document from in-memory text
    pub fn from_text(module: impl Into<String>, origin: impl Into<PathBuf>, text: String) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            text.match_indices('\n')
                .map(|(idx, _)| idx + 1)
                .filter(|&idx| idx < text.len()),
        );
        line_starts.push(text.len());
        Self {
            module: module.into(),
            origin: origin.into(),
            text,
            line_starts,
        }
    }

    /// Load the first existing candidate path
    ///
    /// Candidates are tried in order: the preferred location first, then the
    /// fallbacks. Relative candidates are resolved against `root`.
    pub fn load(module: &str, root: &Path, candidates: &[PathBuf]) -> Result<Self> {
        let resolved: Vec<PathBuf> = candidates
            .iter()
            .map(|candidate| {
                if candidate.is_absolute() {
                    candidate.clone()
                } else {
                    root.join(candidate)
                }
            })
            .collect();

        let Some(path) = resolved.iter().find(|path| path.is_file()) else {
            return Err(WeldError::MissingInput {
                module: module.to_owned(),
                tried: resolved,
            });
        };
        for skipped in resolved.iter().take_while(|p| *p != path) {
            trace!("Candidate for {module} not found: {}", skipped.display());
        }

        let text = fs::read_to_string(path).map_err(|e| WeldError::io(path, e))?;
        let document = Self::from_text(module, path.clone(), text);
        debug!(
            "Loaded {module} from {} ({} lines, {} chars)",
            path.display(),
            document.line_count(),
            document.text.len()
        );
        Ok(document)
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn origin(&self) -> &Path {
        &self.origin
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len() - 1
    }

    /// Line `index` (0-based) including its terminator
    pub fn line(&self, index: usize) -> &str {
        &self.text[self.line_starts[index]..self.line_starts[index + 1]]
    }

    /// Line `index` without its terminator
    pub fn line_content(&self, index: usize) -> &str {
        self.line(index).trim_end_matches(['\n', '\r'])
    }

    /// Lines `start..=end` concatenated, terminators included
    pub fn slice_lines(&self, start: usize, end: usize) -> &str {
        &self.text[self.line_starts[start]..self.line_starts[end + 1]]
    }

    /// Line index (0-based) containing byte `offset`
    pub fn line_of_offset(&self, offset: usize) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(index) => index.min(self.line_count().saturating_sub(1)),
            Err(insert_at) => insert_at - 1,
        }
    }

    pub fn lines(&self) -> impl Iterator<Item = (usize, &str)> {
        (0..self.line_count()).map(|i| (i, self.line_content(i)))
    }
}
