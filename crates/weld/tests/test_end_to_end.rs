#![allow(clippy::disallowed_methods)]

use std::{fs, path::Path};

use pretty_assertions::assert_eq;
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use weld::{Config, Pipeline, WeldError, composer::FragmentKind};

const HISTORIC: &str = r#"<!DOCTYPE html>
<html>
<head>
<style>body { margin: 0; }</style>
</head>
<body>
<script>
const INLINE_DATA = {"annual":{"CAL":[31,29,40]},"monthly":{"CAL":[]}};
const T={"CAL":{"vb":"0 0 10 10","d":"M0 0L10 10Z"},"TEX":{"vb":"0 0 8 8","d":"M0 0L8 8Z"}};
function setupCanvas(id) {
  return document.getElementById(id);
}
function viz2(key) {
  const row = DATA.annual[key] || [];
  const el = setupCanvas('viz2');
  el.innerHTML = '<input type="range" oninput="onSlider2(this.value)">';
  return row.length;
}
function onSlider2(value) {
  return viz2(value);
}
function sliderStep() {}
</script>
</body>
</html>
"#;

const HOURLY: &str = r#"<!DOCTYPE html>
<html>
<head>
<script>/* Highcharts JS v11 */ var Highcharts = { chart: function () { return {}; } };</script>
<script>/* Highcharts Sankey module */ Highcharts.sankey = {};</script>
<style>body { margin: 0; }</style>
</head>
<body>
<script>
const RDATA = {"CAL":{"hours":[1,2,3,4]},"TEX":{"hours":[5,6]}};
const COL = {y: 2};
const REGIONS = {CAL: {n: 'California', d: 'CAISO'}};
let selReg = null;
function buildMap() {}
function rateColor(v) {
  return v > 1 ? COL.y : 0;
}
function buildStory(key) {
  const r = REGIONS[key];
  selReg = key;
  return r.n + ' ' + r.d + ' { ' + rateColor(RDATA[key].hours.length);
}
window.addEventListener('scroll', () => {});
</script>
</body>
</html>
"#;

const CONFIG: &str = r#"
[output]
path = "dist/index.html"
title = "Grid Explorer"

[primary]
name = "historic"
mode = "historic"
label = "Historic Grid Mix"
sources = ["historic/grid-story.html", "a.html"]
entry = "gsViz2"
constants = [{ name = "INLINE_DATA" }]
captures = [{ name = "tiles", pattern = 'const T=(\{[^;]+\});', emit_as = "TILE_PATHS" }]
functions = ["setupCanvas"]

[primary.run]
name = "viz"
start = ["function viz2("]
stop = ["function sliderStep("]

[[primary.renames]]
scope = "historic"
old = "viz2"
new = "gsViz2"

[[primary.renames]]
scope = "historic"
old = "setupCanvas"
new = "gsSetupCanvas"

[[primary.renames]]
scope = "historic"
old = "DATA"
new = "GS_DATA"
mode = "dotted-property"
fields = ["annual", "monthly"]

[[primary.renames]]
scope = "historic"
old = "onSlider2"
new = "gsOnSlider2"
in_strings = true

[isolated]
name = "hourly"
mode = "hourly"
label = "How This Grid Works"
sources = ["b.html"]
entry = "buildStory"
constants = [{ name = "RDATA", min_chars = 32 }]
libraries = [
  { name = "highcharts", token = "Highcharts", exclude = "sankey" },
  { name = "sankey", token = "sankey", case_insensitive = true, window = 300 },
]

[isolated.run]
name = "story"
start = ["const COL = {"]
stop = ["window.addEventListener('scroll'", "document.addEventListener('DOMContentLoaded'"]
skip = ["buildMap", "selectRegion"]

[isolation]
export = "hvInit"
guard = "RDATA"
omit = ["REGIONS", "RCOL", "ACTIVE", "selReg"]
prelude = ["let selReg = null, curStep = 0, animFrames = {};"]

[isolation.namespace]
entity = "REGIONS"
fields = [
  { canonical = "name", host = "name", local = "n" },
  { canonical = "desc", host = "desc", local = "d" },
]

[shared]
entity = "REGIONS"
order = "TILE_ORDER"
sequence = ["TEX", "CAL"]
tiles = "TILE_PATHS"
aliases = [{ name = "GS_DATA", value = "INLINE_DATA" }]

[shared.records.CAL]
name = "California"
desc = "CAISO / Western"

[shared.records.TEX]
name = "Texas"
desc = "ERCOT Interconnection"
"#;

struct Project {
    dir: TempDir,
}

impl Project {
    fn new(historic: &str, hourly: &str) -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.html"), historic).unwrap();
        fs::write(dir.path().join("b.html"), hourly).unwrap();
        Self { dir }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn output(&self) -> std::path::PathBuf {
        self.root().join("dist").join("index.html")
    }

    fn build(&self, config: &str) -> weld::Result<weld::BuildReport> {
        let config = Config::from_toml(config)?;
        Pipeline::new(&config, self.root()).run()
    }
}

fn position(haystack: &str, needle: &str) -> usize {
    haystack
        .find(needle)
        .unwrap_or_else(|| panic!("`{needle}` missing from artifact"))
}

#[test]
fn test_merges_both_modules_into_one_page() {
    let project = Project::new(HISTORIC, HOURLY);
    let report = project.build(CONFIG).unwrap();
    let page = fs::read_to_string(project.output()).unwrap();

    // Primary code renamed into the host scope
    assert!(page.contains("function gsViz2(key) {"));
    assert!(page.contains("function gsSetupCanvas(id) {"));
    assert!(page.contains("const row = GS_DATA.annual[key] || [];"));
    assert!(page.contains("oninput=\"gsOnSlider2(this.value)\""));
    assert!(!page.contains("function viz2("));

    // Data blobs verbatim, captures re-emitted under their new name
    assert!(page.contains(
        r#"const INLINE_DATA = {"annual":{"CAL":[31,29,40]},"monthly":{"CAL":[]}};"#
    ));
    assert!(page.contains(r#"const RDATA = {"CAL":{"hours":[1,2,3,4]},"TEX":{"hours":[5,6]}};"#));
    assert!(page.contains(r#"const TILE_PATHS = {"CAL":{"vb":"0 0 10 10""#));
    assert!(page.contains("var GS_DATA = INLINE_DATA;"));
    assert!(page.contains("const TILE_ORDER = ['TEX', 'CAL'];"));
    assert!(page.contains("  CAL: { name: 'California', desc: 'CAISO / Western' },"));

    // The isolated module lives inside the wrapper
    let open = position(&page, "(function (hostREGIONS) {");
    let close = position(&page, "})(REGIONS);");
    for inner in [
        "const COL = {y: 2};",
        "function rateColor(v) {",
        "function buildStory(key) {",
        "let selReg = null, curStep = 0, animFrames = {};",
        "REGIONS[k] = { n: v.name, d: v.desc };",
    ] {
        let at = position(&page, inner);
        assert!(open < at && at < close, "`{inner}` escaped the wrapper");
    }
    assert!(page.contains("    if (!RDATA[key]) return;\n    return buildStory(key);"));

    // Host-owned declarations are not duplicated from the isolated module
    assert!(!page.contains("function buildMap() {}"));
    assert_eq!(page.matches("function buildMap(").count(), 1);
    assert!(!page.contains("let selReg = null;"));
    assert!(!page.contains("{n: 'California', d: 'CAISO'}"));

    // Libraries once each, ahead of the main script
    assert_eq!(page.matches("var Highcharts = ").count(), 1);
    assert_eq!(page.matches("Highcharts.sankey = {};").count(), 1);
    assert!(position(&page, "var Highcharts = ") < position(&page, "const INLINE_DATA"));

    // Bootstrap registers both entries after everything they need
    let bootstrap = position(
        &page,
        "modeDispatcher.register(createController('hourly', (key) => hvInit(key)));",
    );
    assert!(position(&page, "var hvInit;") < bootstrap);
    assert!(position(&page, "function gsViz2(") < bootstrap);
    assert!(page.contains("onclick=\"setMode(&#39;hourly&#39;)\">How This Grid Works</button>"));
    assert!(page.ends_with("</body>\n</html>\n"));

    assert_eq!(report.output, project.output());
    assert_eq!(report.bytes, page.len());
    assert_eq!(report.sha256, format!("{:x}", Sha256::digest(page.as_bytes())));
    let segments: Vec<&str> = report.segments.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        segments,
        vec![
            "historic::INLINE_DATA",
            "historic::tiles",
            "historic::setupCanvas",
            "historic::viz",
            "hourly::RDATA",
            "hourly::highcharts",
            "hourly::sankey",
            "hourly::story",
        ]
    );
}

#[test]
fn test_no_fragment_uses_a_later_declaration() {
    let project = Project::new(HISTORIC, HOURLY);
    let config = Config::from_toml(CONFIG).unwrap();
    let composition = Pipeline::new(&config, project.root()).compose().unwrap();
    let artifact = &composition.artifact;

    for (index, fragment) in artifact.fragments().iter().enumerate() {
        for name in &fragment.references {
            if let Some(declared) = artifact.position(name) {
                assert!(
                    declared <= index,
                    "`{}` uses `{name}` declared later",
                    fragment.label
                );
            }
        }
    }
    for pair in [
        ("INLINE_DATA", "GS_DATA"),
        ("GS_DATA", "gsViz2"),
        ("RDATA", "hvInit"),
        ("REGIONS", "hvInit"),
        ("buildMap", "hvInit"),
    ] {
        assert!(artifact.position(pair.0) < artifact.position(pair.1), "{pair:?}");
    }
}

#[test]
fn test_isolated_module_exposes_only_its_export() {
    let project = Project::new(HISTORIC, HOURLY);
    let config = Config::from_toml(CONFIG).unwrap();
    let composition = Pipeline::new(&config, project.root()).compose().unwrap();

    let isolated = composition
        .artifact
        .fragments()
        .iter()
        .find(|fragment| fragment.label == "hourly (isolated)")
        .unwrap();
    assert_eq!(isolated.kind, FragmentKind::Script);
    assert_eq!(
        isolated.declares.iter().map(String::as_str).collect::<Vec<_>>(),
        vec!["hvInit"]
    );
    assert_eq!(
        composition
            .isolated
            .internal
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>(),
        vec!["COL", "rateColor", "buildStory"]
    );
    assert_eq!(composition.isolated.omitted, vec!["REGIONS", "selReg"]);
    assert_eq!(
        composition
            .isolated
            .consumed_fields
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>(),
        vec!["n", "d"]
    );
}

#[test]
fn test_builds_are_deterministic() {
    let project = Project::new(HISTORIC, HOURLY);
    let first = project.build(CONFIG).unwrap();
    let second = project.build(CONFIG).unwrap();
    assert_eq!(first.sha256, second.sha256);
}

#[test]
fn test_missing_input() {
    let project = Project::new(HISTORIC, HOURLY);
    let config = CONFIG.replace(r#"sources = ["b.html"]"#, r#"sources = ["hourly/b.html"]"#);
    let err = project.build(&config).unwrap_err();
    match err {
        WeldError::MissingInput { module, tried } => {
            assert_eq!(module, "hourly");
            assert_eq!(tried, vec![project.root().join("hourly/b.html")]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!project.output().exists());
}

#[test]
fn test_missing_stop_marker() {
    let project = Project::new(&HISTORIC.replace("function sliderStep() {}\n", ""), HOURLY);
    let err = project.build(CONFIG).unwrap_err();
    assert!(
        matches!(&err, WeldError::MissingMarker { module, segment, .. } if module == "historic" && segment == "viz"),
        "{err}"
    );
    assert!(!project.output().exists());
}

#[test]
fn test_unmapped_field() {
    let project = Project::new(HISTORIC, &HOURLY.replace("r.d +", "r.color +"));
    let err = project.build(CONFIG).unwrap_err();
    match err {
        WeldError::UnmappedField {
            module,
            entity,
            field,
        } => {
            assert_eq!((module.as_str(), entity.as_str()), ("hourly", "REGIONS"));
            assert_eq!(field, "color");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_omitted_name_still_read_must_come_from_the_host() {
    let hourly = HOURLY
        .replace(
            "const COL = {y: 2};\n",
            "const COL = {y: 2};\nconst RCOL = {CAL: '#2372B9'};\n",
        )
        .replace("COL.y : 0", "RCOL.CAL : COL.y");
    let project = Project::new(HISTORIC, &hourly);
    let err = project.build(CONFIG).unwrap_err();
    match err {
        WeldError::UnresolvedSymbol { section, name } => {
            assert_eq!(section, "hourly (isolated)");
            assert_eq!(name, "RCOL");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!project.output().exists());

    let config = CONFIG.replace(
        r#"aliases = [{ name = "GS_DATA", value = "INLINE_DATA" }]"#,
        r#"aliases = [{ name = "GS_DATA", value = "INLINE_DATA" }, { name = "RCOL", value = "{CAL: '#2372B9'}" }]"#,
    );
    project.build(&config).unwrap();
    let page = fs::read_to_string(project.output()).unwrap();
    assert!(page.contains("var RCOL = {CAL: '#2372B9'};"));
    assert!(!page.contains("const RCOL"));
    assert!(position(&page, "var RCOL = ") < position(&page, "var hvInit;"));
}

#[test]
fn test_destructured_field_must_be_mapped() {
    let hourly = HOURLY.replace(
        "const r = REGIONS[key];",
        "const { n, color } = REGIONS[key];\n  const r = { n, d: color };",
    );
    let project = Project::new(HISTORIC, &hourly);
    let err = project.build(CONFIG).unwrap_err();
    assert!(
        matches!(&err, WeldError::UnmappedField { field, .. } if field == "color"),
        "{err}"
    );
    assert!(!project.output().exists());
}

#[test]
fn test_truncated_critical_blob_leaves_no_artifact() {
    let hourly = HOURLY.replace(
        r#"const RDATA = {"CAL":{"hours":[1,2,3,4]},"TEX":{"hours":[5,6]}};"#,
        "const RDATA = {};",
    );
    let project = Project::new(HISTORIC, &hourly);
    let err = project.build(CONFIG).unwrap_err();
    assert!(
        matches!(&err, WeldError::TruncatedSegment { segment, min: 32, .. } if segment == "hourly::RDATA"),
        "{err}"
    );
    assert!(!project.output().exists());
}

#[test]
fn test_isolated_module_cannot_declare_host_routines() {
    let hourly = HOURLY.replace(
        "function rateColor(v) {",
        "function setMode(m) {\n  return m;\n}\nfunction rateColor(v) {",
    );
    let project = Project::new(HISTORIC, &hourly);
    let err = project.build(CONFIG).unwrap_err();
    assert!(
        matches!(&err, WeldError::BindingCollision { module, name } if module == "hourly" && name == "setMode"),
        "{err}"
    );
}

#[test]
fn test_rename_target_already_present() {
    let historic = HISTORIC.replace(
        "function onSlider2(value) {",
        "function gsSetupCanvas() {}\nfunction onSlider2(value) {",
    );
    let project = Project::new(&historic, HOURLY);
    let err = project.build(CONFIG).unwrap_err();
    assert!(
        matches!(&err, WeldError::RenameCollision { name, .. } if name == "gsSetupCanvas"),
        "{err}"
    );
}

#[test]
fn test_primary_code_calling_the_export_is_a_forward_reference() {
    let historic = HISTORIC.replace("return viz2(value);", "return hvInit(value);");
    let project = Project::new(&historic, HOURLY);
    let err = project.build(CONFIG).unwrap_err();
    match err {
        WeldError::ForwardReference {
            section,
            name,
            declared_in,
        } => {
            assert_eq!(section, "historic");
            assert_eq!(name, "hvInit");
            assert_eq!(declared_in, "hourly (isolated)");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_unclosed_function_is_a_structural_mismatch() {
    let historic = HISTORIC.replace("  return document.getElementById(id);\n}\n", "  return document.getElementById(id);\n");
    let project = Project::new(&historic, HOURLY);
    let err = project.build(CONFIG).unwrap_err();
    assert!(matches!(err, WeldError::StructuralMismatch { .. }), "{err}");
}
