//! Segment extraction
//!
//! Segments are located either by markers (a line or regex pattern) or by
//! brace-depth scanning from a declaration line. Brace depth is computed
//! from tokens, so braces inside strings, template text, regex literals and
//! comments never move the counter.

mod braces;
mod markers;
mod run;

pub use braces::{BraceTracker, LineBraces, TrackState, declared_function, line_braces};
pub use markers::Marker;
pub use run::RunExtraction;

use crate::{
    config::{CaptureSpec, ConstantSpec, LibrarySpec, RunSpec},
    error::Result,
    source::SourceDocument,
    types::SegmentKind,
};

/// A contiguous region of one source document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedSegment {
    pub kind: SegmentKind,
    /// Module the segment was extracted from
    pub module: String,
    pub name: String,
    /// First line of the region (0-based)
    pub start_line: usize,
    /// Last line of the region (0-based, inclusive)
    pub end_line: usize,
    pub text: String,
}

impl ExtractedSegment {
    /// `module::name`
    pub fn qualified_name(&self) -> String {
        format!("{}::{}", self.module, self.name)
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    pub fn line_count(&self) -> usize {
        self.text.lines().count()
    }
}

/// Extracts segments from one source document
#[derive(Debug, Clone, Copy)]
pub struct Extractor<'a> {
    doc: &'a SourceDocument,
}

impl<'a> Extractor<'a> {
    pub fn new(doc: &'a SourceDocument) -> Self {
        Self { doc }
    }

    /// The single line declaring constant `spec.name`
    pub fn constant(&self, spec: &ConstantSpec) -> Result<ExtractedSegment> {
        markers::extract_constant(self.doc, &spec.name)
    }

    /// The first capture group of `spec.pattern`
    pub fn capture(&self, spec: &CaptureSpec) -> Result<ExtractedSegment> {
        markers::extract_capture(self.doc, spec)
    }

    /// A head-level `<script>` block recognized by its token
    pub fn library(&self, spec: &LibrarySpec) -> Result<ExtractedSegment> {
        markers::extract_library(self.doc, spec)
    }

    /// The smallest well-formed function declaration named `name`
    pub fn function(&self, name: &str) -> Result<ExtractedSegment> {
        braces::extract_function(self.doc, name)
    }

    /// The run of declarations between `spec.start` and `spec.stop`, minus skipped functions
    pub fn run(&self, spec: &RunSpec) -> Result<RunExtraction> {
        run::extract_run(self.doc, spec)
    }
}
