//! Artifact emission and build diagnostics

use std::{
    fmt, fs,
    io::Write,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::{
    error::{Result, WeldError},
    extractor::ExtractedSegment,
    types::SegmentKind,
};

/// Size diagnostics for one extracted segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentReport {
    pub name: String,
    pub kind: SegmentKind,
    pub chars: usize,
    pub lines: usize,
    /// A short critical segment aborts the build instead of warning
    pub critical: bool,
    pub min_chars: usize,
}

impl SegmentReport {
    pub fn new(segment: &ExtractedSegment, critical: bool, min_chars: usize) -> Self {
        Self {
            name: segment.qualified_name(),
            kind: segment.kind,
            chars: segment.char_count(),
            lines: segment.line_count(),
            critical,
            min_chars,
        }
    }

    /// Empty segments are always short
    pub fn is_short(&self) -> bool {
        self.chars < self.min_chars.max(1)
    }
}

#[derive(Debug, Clone)]
pub struct BuildReport {
    pub output: PathBuf,
    pub segments: Vec<SegmentReport>,
    pub bytes: usize,
    pub lines: usize,
    /// Hex SHA-256 of the written artifact
    pub sha256: String,
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            writeln!(
                f,
                "  {:<32} {:<15} {:>10} chars {:>7} lines",
                segment.name,
                segment.kind.to_string(),
                segment.chars,
                segment.lines
            )?;
        }
        write!(
            f,
            "Built {}: {} bytes, {} lines, sha256 {}",
            self.output.display(),
            self.bytes,
            self.lines,
            self.sha256
        )
    }
}

#[derive(Debug, Clone)]
pub struct Emitter {
    destination: PathBuf,
}

impl Emitter {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
        }
    }

    /// Fail on the first short critical segment, warn on short optional ones
    pub fn check(segments: &[SegmentReport]) -> Result<()> {
        for segment in segments {
            if !segment.is_short() {
                continue;
            }
            if segment.critical {
                return Err(WeldError::TruncatedSegment {
                    segment: segment.name.clone(),
                    chars: segment.chars,
                    min: segment.min_chars.max(1),
                });
            }
            warn!(
                "Segment {} is only {} chars (expected at least {})",
                segment.name, segment.chars, segment.min_chars
            );
        }
        Ok(())
    }

    /// Check the diagnostics, then replace the destination in one step
    pub fn emit(&self, artifact: &str, segments: Vec<SegmentReport>) -> Result<BuildReport> {
        Self::check(&segments)?;

        let directory = self
            .destination
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(directory).map_err(|e| WeldError::io(directory, e))?;

        let mut staged = NamedTempFile::new_in(directory).map_err(|e| WeldError::io(directory, e))?;
        debug!("Staging artifact at {}", staged.path().display());
        staged
            .write_all(artifact.as_bytes())
            .and_then(|()| staged.as_file().sync_all())
            .map_err(|e| WeldError::io(staged.path(), e))?;
        staged
            .persist(&self.destination)
            .map_err(|e| WeldError::io(&self.destination, e.error))?;

        let sha256 = format!("{:x}", Sha256::digest(artifact.as_bytes()));
        info!(
            "Wrote {} ({} bytes)",
            self.destination.display(),
            artifact.len()
        );
        Ok(BuildReport {
            output: self.destination.clone(),
            segments,
            bytes: artifact.len(),
            lines: artifact.lines().count(),
            sha256,
        })
    }
}
