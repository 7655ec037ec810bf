use log::trace;

use crate::{
    error::{Result, WeldError},
    extractor::ExtractedSegment,
    lexer::{self, TokenKind},
    source::SourceDocument,
    types::SegmentKind,
};

/// Code braces on one line
///
/// `peak` and `trough` are the highest and lowest running depth reached on
/// the line, relative to the depth at its start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineBraces {
    pub opens: usize,
    pub closes: usize,
    pub delta: isize,
    pub peak: isize,
    pub trough: isize,
}

/// Per-line code brace counts for `text`, which must start in code context
pub fn line_braces(text: &str) -> Vec<LineBraces> {
    let mut lines = vec![LineBraces::default(); text.split_inclusive('\n').count()];
    let mut line = 0;
    for token in lexer::tokenize(text) {
        let piece = token.text(text);
        if token.kind == TokenKind::Punct
            && let Some(entry) = lines.get_mut(line)
        {
            match piece {
                "{" => {
                    entry.opens += 1;
                    entry.delta += 1;
                    entry.peak = entry.peak.max(entry.delta);
                }
                "}" => {
                    entry.closes += 1;
                    entry.delta -= 1;
                    entry.trough = entry.trough.min(entry.delta);
                }
                _ => {}
            }
        }
        line += piece.bytes().filter(|&b| b == b'\n').count();
    }
    lines
}

/// Code token texts of `text`, grouped by the line each token starts on
///
/// Whitespace and comments are dropped; a string or template literal stays
/// one token.
pub fn line_tokens(text: &str) -> Vec<Vec<&str>> {
    let mut lines = vec![Vec::new(); text.split_inclusive('\n').count()];
    let mut line = 0;
    for token in lexer::tokenize(text) {
        let piece = token.text(text);
        if !token.kind.is_trivia()
            && let Some(entry) = lines.get_mut(line)
        {
            entry.push(piece);
        }
        line += piece.bytes().filter(|&b| b == b'\n').count();
    }
    lines
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    /// No brace opened yet
    Pending,
    Open,
    /// Depth returned to zero after having been positive
    Closed,
}

/// Running brace depth across the lines of one segment
#[derive(Debug, Clone, Copy, Default)]
pub struct BraceTracker {
    depth: isize,
    opened: bool,
}

impl BraceTracker {
    /// Advance by one line; fails if the depth drops below zero
    pub fn feed(&mut self, line: LineBraces) -> std::result::Result<TrackState, String> {
        if self.depth + line.trough < 0 {
            return Err(if self.opened {
                "more closing than opening braces".to_owned()
            } else {
                "closing brace before any opening brace".to_owned()
            });
        }
        if self.depth + line.peak > 0 {
            self.opened = true;
        }
        self.depth += line.delta;
        Ok(match (self.opened, self.depth) {
            (false, _) => TrackState::Pending,
            (true, 0) => TrackState::Closed,
            (true, _) => TrackState::Open,
        })
    }

    pub fn depth(&self) -> isize {
        self.depth
    }
}

/// Name of the function declared at the start of `line`, if any
///
/// Recognizes `function name(`, `async function name(` and generator forms.
pub fn declared_function(line: &str) -> Option<&str> {
    let tokens = lexer::tokenize(line);
    let mut significant = tokens.iter().filter(|t| !t.kind.is_trivia());
    let mut token = significant.next()?;
    if token.is_ident(line, "async") {
        token = significant.next()?;
    }
    if !token.is_ident(line, "function") {
        return None;
    }
    token = significant.next()?;
    if token.is_punct(line, "*") {
        token = significant.next()?;
    }
    if token.kind != TokenKind::Ident {
        return None;
    }
    let name = token.text(line);
    significant
        .next()
        .filter(|paren| paren.is_punct(line, "("))
        .map(|_| name)
}

/// Last line a segment starting at `start` may extend to: the closing script tag
pub(super) fn script_boundary(doc: &SourceDocument, start: usize) -> usize {
    (start + 1..doc.line_count())
        .find(|&i| doc.line_content(i).contains("</script>"))
        .unwrap_or_else(|| doc.line_count().saturating_sub(1))
}

pub(super) fn extract_function(doc: &SourceDocument, name: &str) -> Result<ExtractedSegment> {
    let start = doc
        .lines()
        .find(|(_, content)| declared_function(content) == Some(name))
        .map(|(index, _)| index)
        .ok_or_else(|| WeldError::missing_marker(doc.module(), name, format!("function {name}(")))?;

    let boundary = script_boundary(doc, start);
    let region = doc.slice_lines(start, boundary);
    let mut tracker = BraceTracker::default();
    for (offset, braces) in line_braces(region).into_iter().enumerate() {
        let line = start + offset;
        let state = tracker.feed(braces).map_err(|reason| {
            WeldError::structural(doc.module(), name, start + 1, format!("{reason} on line {}", line + 1))
        })?;
        trace!("{}::{name} line {}: {state:?} depth {}", doc.module(), line + 1, tracker.depth());
        if state == TrackState::Closed {
            return Ok(ExtractedSegment {
                kind: SegmentKind::SingleFunction,
                module: doc.module().to_owned(),
                name: name.to_owned(),
                start_line: start,
                end_line: line,
                text: doc.slice_lines(start, line).to_owned(),
            });
        }
    }

    Err(WeldError::structural(
        doc.module(),
        name,
        start + 1,
        format!(
            "brace depth never returned to zero before line {}",
            boundary + 1
        ),
    ))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn doc(text: &str) -> SourceDocument {
        SourceDocument::from_text("story", "story.html", text.to_owned())
    }

    #[test]
    fn test_line_braces_peak_and_trough() {
        let braces = line_braces("a { b }\n} else {\n");
        assert_eq!(braces.len(), 2);
        assert_eq!(
            braces[0],
            LineBraces {
                opens: 1,
                closes: 1,
                delta: 0,
                peak: 1,
                trough: 0
            }
        );
        assert_eq!(braces[1].delta, 0);
        assert_eq!(braces[1].trough, -1);
    }

    #[test]
    fn test_multiline_template_braces_are_ignored() {
        let braces = line_braces("x = `{\n}}}\n${ {a:1}.a }`;\n");
        assert!(braces.iter().all(|b| b.delta == 0));
        assert_eq!(braces[2].opens, 1);
    }

    #[test]
    fn test_line_tokens_skip_comments() {
        let lines = line_tokens("a('x // y'); // z\n/* {\n} */ b\n");
        assert_eq!(
            lines,
            vec![vec!["a", "(", "'x // y'", ")", ";"], vec![], vec!["b"]]
        );
    }

    #[test]
    fn test_declared_function() {
        assert_eq!(declared_function("  function viz2(rk) {"), Some("viz2"));
        assert_eq!(declared_function("async function load(){"), Some("load"));
        assert_eq!(declared_function("function* gen() {"), Some("gen"));
        assert_eq!(declared_function("// function viz2("), None);
        assert_eq!(declared_function("const f = function () {"), None);
        assert_eq!(declared_function("functional(1)"), None);
    }

    #[test]
    fn test_extract_one_line_function() -> Result<()> {
        let doc = doc("<script>\nfunction viz2(){ return 1; }\nfunction viz3(){}\n</script>\n");
        let segment = doc_extract(&doc, "viz2")?;
        assert_eq!(segment.text, "function viz2(){ return 1; }\n");
        assert_eq!((segment.start_line, segment.end_line), (1, 1));
        assert_eq!(segment.kind, SegmentKind::SingleFunction);
        Ok(())
    }

    #[test]
    fn test_brace_inside_string_does_not_end_capture() -> Result<()> {
        let source = "function label(k) {\n  const open = '{';\n  const close = \"}\";\n  return `}${k}{`;\n}\nfunction after() {}\n";
        let segment = doc_extract(&doc(source), "label")?;
        assert_eq!(segment.end_line, 4);
        assert!(segment.text.ends_with("return `}${k}{`;\n}\n"));
        Ok(())
    }

    #[test]
    fn test_brace_inside_comment_does_not_end_capture() -> Result<()> {
        let source = "function f() {\n  // }\n  /* } */\n  return 1;\n}\n";
        let segment = doc_extract(&doc(source), "f")?;
        assert_eq!(segment.end_line, 4);
        Ok(())
    }

    #[test]
    fn test_extraction_is_idempotent() -> Result<()> {
        let source = "function a() {\n  if (x) {\n    y();\n  }\n}\nfunction b() {}\n";
        let doc = doc(source);
        let first = doc_extract(&doc, "a")?;
        let second = doc_extract(&doc, "a")?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn test_unclosed_function_is_structural_mismatch() {
        let source = "<script>\nfunction broken() {\n  if (x) {\n}\n</script>\n<p>after</p>\n";
        let err = doc_extract(&doc(source), "broken").expect_err("never closes");
        match err {
            WeldError::StructuralMismatch { segment, line, reason, .. } => {
                assert_eq!(segment, "broken");
                assert_eq!(line, 2);
                assert!(reason.contains("never returned to zero"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_close_before_open_is_structural_mismatch() {
        let err = doc_extract(&doc("function odd() }\n{\n"), "odd").expect_err("closes first");
        assert!(matches!(err, WeldError::StructuralMismatch { .. }));
    }

    #[test]
    fn test_missing_function_is_missing_marker() {
        let err = doc_extract(&doc("function other() {}\n"), "viz2").expect_err("absent");
        assert!(matches!(err, WeldError::MissingMarker { marker, .. } if marker == "function viz2("));
    }

    fn doc_extract(doc: &SourceDocument, name: &str) -> Result<ExtractedSegment> {
        extract_function(doc, name)
    }
}
