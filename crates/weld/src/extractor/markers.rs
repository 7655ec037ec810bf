use cow_utils::CowUtils;
use log::{debug, trace};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    config::{CaptureSpec, LibrarySpec},
    error::{Result, WeldError},
    extractor::ExtractedSegment,
    lexer::{self, is_ident_continue},
    source::SourceDocument,
    types::SegmentKind,
};

static SCRIPT_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<script(?:\s[^>]*)?>(.*?)</script>").expect("script block regex is valid")
});

/// A whitespace-insensitive line marker
///
/// `const COL = {` and `const COL={` are the same marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    normalized: String,
    /// Code token texts of the marker
    tokens: Vec<String>,
}

impl Marker {
    pub fn new(raw: &str) -> Self {
        Self {
            normalized: normalize(raw),
            tokens: lexer::tokenize(raw)
                .into_iter()
                .filter(|token| !token.kind.is_trivia())
                .map(|token| token.text(raw).to_owned())
                .collect(),
        }
    }

    /// The line, ignoring whitespace, begins with the marker
    pub fn starts(&self, line: &str) -> bool {
        normalize(line).starts_with(&self.normalized)
    }

    /// The marker's tokens appear as one contiguous run of the line's code tokens
    ///
    /// A string literal is a single token, so text inside strings and
    /// comments never matches.
    pub fn in_code(&self, line: &[&str]) -> bool {
        !self.tokens.is_empty()
            && line.windows(self.tokens.len()).any(|window| {
                window
                    .iter()
                    .copied()
                    .eq(self.tokens.iter().map(String::as_str))
            })
    }
}

fn normalize(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Does `line` declare constant `name`?
fn declares_constant(line: &str, name: &str) -> bool {
    let Some(rest) = line.trim_start().strip_prefix("const") else {
        return false;
    };
    let rest = rest.trim_start();
    if rest.len() == line.trim_start().len() - "const".len() {
        // `const` must be followed by whitespace
        return false;
    }
    rest.strip_prefix(name)
        .and_then(|after| after.bytes().next())
        .is_some_and(|b| !is_ident_continue(b))
}

pub(super) fn extract_constant(doc: &SourceDocument, name: &str) -> Result<ExtractedSegment> {
    let (index, content) = doc
        .lines()
        .find(|(_, content)| declares_constant(content, name))
        .ok_or_else(|| WeldError::missing_marker(doc.module(), name, format!("const {name}")))?;
    let text = content.trim().to_owned();
    debug!("{}::{name}: constant on line {}", doc.module(), index + 1);
    Ok(ExtractedSegment {
        kind: SegmentKind::DataBlob,
        module: doc.module().to_owned(),
        name: name.to_owned(),
        start_line: index,
        end_line: index,
        text,
    })
}

pub(super) fn extract_capture(doc: &SourceDocument, spec: &CaptureSpec) -> Result<ExtractedSegment> {
    let regex = Regex::new(&spec.pattern)
        .map_err(|e| WeldError::config(format!("capture `{}` pattern: {e}", spec.name)))?;
    let group = regex
        .captures(doc.text())
        .and_then(|captures| captures.get(1))
        .ok_or_else(|| WeldError::missing_marker(doc.module(), &spec.name, spec.pattern.clone()))?;
    Ok(ExtractedSegment {
        kind: SegmentKind::DataBlob,
        module: doc.module().to_owned(),
        name: spec.name.clone(),
        start_line: doc.line_of_offset(group.start()),
        end_line: doc.line_of_offset(group.end().saturating_sub(1).max(group.start())),
        text: group.as_str().to_owned(),
    })
}

/// The first `window` characters of `text`
fn leading_window(text: &str, window: usize) -> &str {
    text.char_indices()
        .nth(window)
        .map_or(text, |(offset, _)| &text[..offset])
}

fn library_matches(block: &str, spec: &LibrarySpec) -> bool {
    let head = leading_window(block, spec.window);
    let lowered = head.cow_to_ascii_lowercase();
    let has_token = if spec.case_insensitive {
        lowered.contains(spec.token.cow_to_ascii_lowercase().as_ref())
    } else {
        head.contains(&spec.token)
    };
    let excluded = spec
        .exclude
        .as_ref()
        .is_some_and(|exclude| lowered.contains(exclude.cow_to_ascii_lowercase().as_ref()));
    has_token && !excluded
}

pub(super) fn extract_library(doc: &SourceDocument, spec: &LibrarySpec) -> Result<ExtractedSegment> {
    let text = doc.text();
    let head_end = text.find(&spec.head_boundary).unwrap_or_else(|| {
        debug!(
            "{}: head boundary `{}` not found, searching the whole document",
            doc.module(),
            spec.head_boundary
        );
        text.len()
    });

    for captures in SCRIPT_BLOCK.captures_iter(&text[..head_end]) {
        let Some(body) = captures.get(1) else {
            continue;
        };
        let trimmed = body.as_str().trim();
        trace!(
            "{}: head script block at byte {} ({} chars)",
            doc.module(),
            body.start(),
            trimmed.len()
        );
        if trimmed.is_empty() || !library_matches(trimmed, spec) {
            continue;
        }
        let leading = body.as_str().len() - body.as_str().trim_start().len();
        let start = body.start() + leading;
        return Ok(ExtractedSegment {
            kind: SegmentKind::LibraryBlock,
            module: doc.module().to_owned(),
            name: spec.name.clone(),
            start_line: doc.line_of_offset(start),
            end_line: doc.line_of_offset(start + trimmed.len().saturating_sub(1)),
            text: trimmed.to_owned(),
        });
    }

    Err(WeldError::missing_marker(
        doc.module(),
        &spec.name,
        format!("<script> block mentioning `{}`", spec.token),
    ))
}
