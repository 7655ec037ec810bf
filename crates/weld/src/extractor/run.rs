use log::{debug, trace, warn};
use rustc_hash::FxHashSet;

use crate::{
    config::RunSpec,
    error::{Result, WeldError},
    extractor::{
        ExtractedSegment,
        braces::{
            BraceTracker, TrackState, declared_function, line_braces, line_tokens, script_boundary,
        },
        markers::Marker,
    },
    source::SourceDocument,
    types::SegmentKind,
};

/// A function run with the skipped declarations removed
#[derive(Debug, Clone)]
pub struct RunExtraction {
    pub segment: ExtractedSegment,
    /// Skipped function names, in source order
    pub skipped: Vec<String>,
    /// Top-level function declarations seen in the run, skipped ones included
    pub functions: usize,
}

impl RunExtraction {
    /// Functions left in the segment
    pub fn kept(&self) -> usize {
        self.functions - self.skipped.len()
    }
}

struct Skipping {
    name: String,
    tracker: BraceTracker,
    from: usize,
}

pub(super) fn extract_run(doc: &SourceDocument, spec: &RunSpec) -> Result<RunExtraction> {
    let starts: Vec<Marker> = spec.start.iter().map(|m| Marker::new(m)).collect();
    let stops: Vec<Marker> = spec.stop.iter().map(|m| Marker::new(m)).collect();
    let skip: FxHashSet<&str> = spec.skip.iter().map(String::as_str).collect();
    let module = doc.module();

    let start = doc
        .lines()
        .find(|(_, content)| starts.iter().any(|marker| marker.starts(content)))
        .map(|(index, _)| index)
        .ok_or_else(|| WeldError::missing_marker(module, &spec.name, spec.start.join(" | ")))?;
    let boundary = script_boundary(doc, start);
    debug!(
        "{module}::{}: run starts on line {}, script ends on line {}",
        spec.name,
        start + 1,
        boundary + 1
    );

    let structural = |line: usize, reason: String| {
        WeldError::structural(module, &spec.name, start + 1, format!("{reason} on line {}", line + 1))
    };

    let mut depth = BraceTracker::default();
    let mut skipping: Option<Skipping> = None;
    let mut skipped = Vec::new();
    let mut functions = 0;
    let mut stop = None;
    let mut text = String::new();

    let region = doc.slice_lines(start, boundary);
    let code = line_tokens(region);
    for (offset, braces) in line_braces(region).into_iter().enumerate() {
        let line = start + offset;
        let content = doc.line_content(line);
        let tokens = code.get(offset).map_or(&[][..], Vec::as_slice);

        if depth.depth() == 0 && skipping.is_none() {
            if offset > 0 && stops.iter().any(|marker| marker.in_code(tokens)) {
                stop = Some(line);
                break;
            }
            if let Some(name) = declared_function(content) {
                functions += 1;
                if skip.contains(name) {
                    skipping = Some(Skipping {
                        name: name.to_owned(),
                        tracker: BraceTracker::default(),
                        from: line,
                    });
                }
            }
        }

        depth.feed(braces).map_err(|reason| structural(line, reason))?;

        if let Some(active) = &mut skipping {
            let state = active
                .tracker
                .feed(braces)
                .map_err(|reason| structural(line, reason))?;
            if state == TrackState::Closed {
                trace!(
                    "{module}::{}: skipped `{}` on lines {}-{}",
                    spec.name,
                    active.name,
                    active.from + 1,
                    line + 1
                );
                skipped.push(std::mem::take(&mut active.name));
                skipping = None;
            }
            continue;
        }
        text.push_str(doc.line(line));
    }

    if let Some(active) = skipping {
        return Err(structural(
            active.from,
            format!("skipped function `{}` never closes", active.name),
        ));
    }
    let stop = stop.ok_or_else(|| WeldError::missing_marker(module, &spec.name, spec.stop.join(" | ")))?;

    for name in &spec.skip {
        if !skipped.contains(name) {
            warn!("{module}::{}: skip entry `{name}` matched no function", spec.name);
        }
    }
    debug!(
        "{module}::{}: lines {}-{}, {} functions, {} skipped",
        spec.name,
        start + 1,
        stop,
        functions,
        skipped.len()
    );

    Ok(RunExtraction {
        segment: ExtractedSegment {
            kind: SegmentKind::FunctionGroup,
            module: module.to_owned(),
            name: spec.name.clone(),
            start_line: start,
            end_line: stop - 1,
            text,
        },
        skipped,
        functions,
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn doc(text: &str) -> SourceDocument {
        SourceDocument::from_text("hourly", "grid_story.html", text.to_owned())
    }

    fn spec(start: &str, stop: &[&str], skip: &[&str]) -> RunSpec {
        RunSpec {
            name: "story".to_owned(),
            start: vec![start.to_owned()],
            stop: stop.iter().map(|s| (*s).to_owned()).collect(),
            skip: skip.iter().map(|s| (*s).to_owned()).collect(),
        }
    }

    const SOURCE: &str = "<script>
const COL = {
  solar: '#f5b700',
};
function rateColor(v) {
  return v > 1 ? COL.solar : '#ccc';
}
function buildMap() {
  const label = '}';
  document.getElementById('map').innerHTML = label;
}
function buildStory(rk) {
  document.addEventListener('DOMContentLoaded', () => {});
  return rateColor(RDATA[rk]);
}
function goToStep(n) { curStep = n; }
function fmt(x) {
  return `${x}}`;
}
window.addEventListener('scroll', onScroll);
document.addEventListener('DOMContentLoaded', buildMap);
</script>
";

    #[test]
    fn test_skipped_functions_are_removed() -> Result<()> {
        let spec = spec(
            "const COL = {",
            &["window.addEventListener('scroll'", "document.addEventListener('DOMContentLoaded'"],
            &["buildMap", "goToStep"],
        );
        let run = extract_run(&doc(SOURCE), &spec)?;

        assert_eq!(run.functions, 5);
        assert_eq!(run.skipped, vec!["buildMap".to_owned(), "goToStep".to_owned()]);
        assert_eq!(run.kept(), 3);
        assert_eq!(run.segment.kind, SegmentKind::FunctionGroup);
        assert_eq!((run.segment.start_line, run.segment.end_line), (1, 18));

        let text = &run.segment.text;
        assert!(text.starts_with("const COL = {\n"));
        assert!(text.contains("function rateColor(v) {"));
        assert!(text.contains("function buildStory(rk) {"));
        assert!(text.ends_with("  return `${x}}`;\n}\n"));
        assert!(!text.contains("function buildMap("));
        assert!(!text.contains("function goToStep("));
        assert!(!text.contains("innerHTML"));
        assert!(!text.contains("onScroll"));
        Ok(())
    }

    #[test]
    fn test_nested_stop_marker_is_ignored() -> Result<()> {
        let run = extract_run(
            &doc(SOURCE),
            &spec("const COL = {", &["document.addEventListener('DOMContentLoaded'"], &[]),
        )?;
        assert!(run.segment.text.contains("document.addEventListener('DOMContentLoaded', () => {});"));
        assert!(run.segment.text.contains("window.addEventListener('scroll', onScroll);"));
        assert_eq!(run.functions, 5);
        Ok(())
    }

    #[test]
    fn test_stop_marker_in_comment_or_string_does_not_stop() -> Result<()> {
        let source = "const COL = {};
// attach after document.addEventListener('DOMContentLoaded' fires
function a() {}
const note = \"window.addEventListener('scroll'\";
function b() {}
window.addEventListener('scroll', onScroll);
";
        let stops = ["window.addEventListener('scroll'", "document.addEventListener('DOMContentLoaded'"];
        let run = extract_run(&doc(source), &spec("const COL = {", &stops, &[]))?;
        assert_eq!(run.segment.end_line, 4);
        assert_eq!(run.functions, 2);
        assert!(run.segment.text.ends_with("function b() {}\n"));
        Ok(())
    }

    #[test]
    fn test_marker_whitespace_is_normalized() -> Result<()> {
        let run = extract_run(&doc(SOURCE), &spec("const COL={", &["window.addEventListener( 'scroll'"], &[]))?;
        assert_eq!(run.segment.start_line, 1);
        Ok(())
    }

    #[test]
    fn test_missing_start_marker() {
        let err = extract_run(&doc(SOURCE), &spec("function viz2(", &["DOMContentLoaded"], &[]))
            .expect_err("no viz2");
        assert!(matches!(err, WeldError::MissingMarker { marker, .. } if marker == "function viz2("));
    }

    #[test]
    fn test_missing_stop_marker() {
        let err = extract_run(&doc(SOURCE), &spec("const COL = {", &["function sliderStep("], &[]))
            .expect_err("no stop");
        assert!(matches!(err, WeldError::MissingMarker { marker, .. } if marker == "function sliderStep("));
    }

    #[test]
    fn test_unclosed_skipped_function() {
        let source = "function keep() {}\nfunction drop() {\n  if (x) {\n}\nfunction stop() {}\n";
        let err = extract_run(&doc(source), &spec("function keep(", &["function stop("], &["drop"]))
            .expect_err("drop never closes");
        match err {
            WeldError::StructuralMismatch { reason, .. } => assert!(reason.contains("`drop`")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
