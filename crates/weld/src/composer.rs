//! Artifact composition
//!
//! Fragments are placed in a fixed section order and checked against a
//! dependency graph built from what each script fragment declares at its top
//! level and which free names it uses. Every edge must run from an earlier
//! fragment to a later one.

use std::fmt;

use log::{debug, info, trace};
use petgraph::{
    graph::{DiGraph, NodeIndex},
    visit::EdgeRef,
};
use rustc_hash::FxHashMap;

use crate::{
    error::{Result, WeldError},
    symbols::SymbolTable,
    types::FxIndexSet,
};

/// Logical sections of the artifact, in output order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Section {
    Head,
    Libraries,
    Markup,
    Data,
    SharedState,
    SharedRoutines,
    Isolated,
    Bootstrap,
    Closing,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Head => "head",
            Self::Libraries => "libraries",
            Self::Markup => "markup",
            Self::Data => "data",
            Self::SharedState => "shared-state",
            Self::SharedRoutines => "shared-routines",
            Self::Isolated => "isolated",
            Self::Bootstrap => "bootstrap",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    /// Emitted verbatim
    Markup,
    /// Opaque script in its own `<script>` element; never scanned
    Library,
    /// Script sharing the main `<script>` element with its neighbours
    Script,
}

#[derive(Debug, Clone)]
pub struct Fragment {
    pub section: Section,
    pub label: String,
    pub kind: FragmentKind,
    pub text: String,
    pub declares: FxIndexSet<String>,
    pub references: FxIndexSet<String>,
    /// Names that must be declared by an earlier fragment
    pub requires: Vec<String>,
}

impl Fragment {
    fn opaque(section: Section, label: impl Into<String>, kind: FragmentKind, text: String) -> Self {
        Self {
            section,
            label: label.into(),
            kind,
            text,
            declares: FxIndexSet::default(),
            references: FxIndexSet::default(),
            requires: Vec::new(),
        }
    }

    pub fn markup(section: Section, label: impl Into<String>, text: String) -> Self {
        Self::opaque(section, label, FragmentKind::Markup, text)
    }

    pub fn library(label: impl Into<String>, text: String) -> Self {
        Self::opaque(Section::Libraries, label, FragmentKind::Library, text)
    }

    pub fn script(section: Section, label: impl Into<String>, text: String) -> Self {
        let table = SymbolTable::scan(&text);
        Self {
            section,
            label: label.into(),
            kind: FragmentKind::Script,
            declares: table.top_level().map(str::to_owned).collect(),
            references: table.references,
            requires: Vec::new(),
            text,
        }
    }

    #[must_use]
    pub fn requiring<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires.extend(names.into_iter().map(Into::into));
        self
    }
}

#[derive(Debug, Default)]
pub struct Composer {
    fragments: Vec<Fragment>,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: Fragment) {
        trace!(
            "Fragment `{}` in {}: declares {:?}",
            fragment.label, fragment.section, fragment.declares
        );
        self.fragments.push(fragment);
    }

    /// Order the fragments and verify that nothing is used before it is declared
    pub fn compose(mut self) -> Result<ComposedArtifact> {
        self.fragments.sort_by_key(|fragment| fragment.section);

        let mut declared_at: FxHashMap<&str, usize> = FxHashMap::default();
        for (index, fragment) in self.fragments.iter().enumerate() {
            for name in &fragment.declares {
                if declared_at.insert(name.as_str(), index).is_some() {
                    return Err(WeldError::BindingCollision {
                        module: fragment.label.clone(),
                        name: name.clone(),
                    });
                }
            }
        }

        let mut graph: DiGraph<usize, &str> = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..self.fragments.len()).map(|i| graph.add_node(i)).collect();
        for (index, fragment) in self.fragments.iter().enumerate() {
            let uses = fragment
                .references
                .iter()
                .chain(&fragment.requires)
                .filter(|name| !fragment.declares.contains(*name));
            for name in uses {
                match declared_at.get(name.as_str()) {
                    Some(&declared) => {
                        graph.add_edge(nodes[declared], nodes[index], name.as_str());
                    }
                    None if fragment.requires.contains(name) => {
                        return Err(WeldError::UnresolvedSymbol {
                            section: fragment.label.clone(),
                            name: name.clone(),
                        });
                    }
                    None => {}
                }
            }
        }

        for edge in graph.edge_references() {
            let declared = graph[edge.source()];
            let used = graph[edge.target()];
            if declared > used {
                return Err(WeldError::ForwardReference {
                    section: self.fragments[used].label.clone(),
                    name: (*edge.weight()).to_owned(),
                    declared_in: self.fragments[declared].label.clone(),
                });
            }
        }
        debug!(
            "Composed {} fragments with {} cross-fragment dependencies",
            self.fragments.len(),
            graph.edge_count()
        );

        Ok(ComposedArtifact {
            fragments: self.fragments,
        })
    }
}

/// The ordered, checked fragments of the output document
#[derive(Debug, Clone)]
pub struct ComposedArtifact {
    fragments: Vec<Fragment>,
}

impl ComposedArtifact {
    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Index of the fragment declaring `name` at its top level
    pub fn position(&self, name: &str) -> Option<usize> {
        self.fragments
            .iter()
            .position(|fragment| fragment.declares.contains(name))
    }

    pub fn render(&self) -> String {
        let capacity = self.fragments.iter().map(|f| f.text.len() + 64).sum();
        let mut out = String::with_capacity(capacity);
        let mut in_script = false;
        for fragment in &self.fragments {
            match fragment.kind {
                FragmentKind::Script => {
                    if !in_script {
                        out.push_str("<script>\n");
                        in_script = true;
                    }
                    out.push_str("// ");
                    out.push_str(&fragment.label);
                    out.push('\n');
                    push_line_terminated(&mut out, &fragment.text);
                    out.push('\n');
                }
                FragmentKind::Library => {
                    close_script(&mut out, &mut in_script);
                    out.push_str("<script>");
                    out.push_str(&fragment.text);
                    out.push_str("</script>\n");
                }
                FragmentKind::Markup => {
                    close_script(&mut out, &mut in_script);
                    out.push_str(&fragment.text);
                }
            }
        }
        close_script(&mut out, &mut in_script);
        info!("Rendered artifact: {} bytes", out.len());
        out
    }
}

fn push_line_terminated(out: &mut String, text: &str) {
    out.push_str(text);
    if !text.ends_with('\n') {
        out.push('\n');
    }
}

fn close_script(out: &mut String, in_script: &mut bool) {
    if *in_script {
        out.push_str("</script>\n");
        *in_script = false;
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn script(section: Section, label: &str, text: &str) -> Fragment {
        Fragment::script(section, label, text.to_owned())
    }

    #[test]
    fn test_sections_are_ordered_and_scripts_grouped() -> Result<()> {
        let mut composer = Composer::new();
        composer.push(script(Section::Bootstrap, "bootstrap", "start(DATA);"));
        composer.push(Fragment::markup(Section::Closing, "closing", "</body>\n".to_owned()));
        composer.push(script(Section::SharedRoutines, "routines", "function start(d) { return d; }"));
        composer.push(Fragment::library("chart", "var Chart={};".to_owned()));
        composer.push(script(Section::Data, "data", "const DATA = {x:1};"));
        composer.push(Fragment::markup(Section::Head, "head", "<html>\n".to_owned()));

        let artifact = composer.compose()?;
        let labels: Vec<&str> = artifact.fragments().iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, vec!["head", "chart", "data", "routines", "bootstrap", "closing"]);
        assert_eq!(artifact.position("DATA"), Some(2));
        assert_eq!(
            artifact.render(),
            "<html>\n<script>var Chart={};</script>\n<script>\n// data\nconst DATA = {x:1};\n\n// routines\nfunction start(d) { return d; }\n\n// bootstrap\nstart(DATA);\n\n</script>\n</body>\n"
        );
        Ok(())
    }

    #[test]
    fn test_forward_reference_is_rejected() {
        let mut composer = Composer::new();
        composer.push(script(Section::SharedRoutines, "routines", "function go(k) { return hvInit(k); }"));
        composer.push(script(Section::Isolated, "isolated", "var hvInit;"));
        let err = composer.compose().expect_err("hvInit is declared later");
        match err {
            WeldError::ForwardReference {
                section,
                name,
                declared_in,
            } => {
                assert_eq!(section, "routines");
                assert_eq!(name, "hvInit");
                assert_eq!(declared_in, "isolated");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unmet_requirement() {
        let mut composer = Composer::new();
        composer.push(script(Section::Bootstrap, "bootstrap", "run();").requiring(["gsViz2"]));
        let err = composer.compose().expect_err("nothing declares gsViz2");
        assert!(matches!(err, WeldError::UnresolvedSymbol { name, .. } if name == "gsViz2"));
    }

    #[test]
    fn test_requirement_declared_later_is_forward() {
        let mut composer = Composer::new();
        composer.push(script(Section::SharedState, "state", "const a = 1;").requiring(["hvInit"]));
        composer.push(script(Section::Isolated, "isolated", "var hvInit;"));
        let err = composer.compose().expect_err("declared after use");
        assert!(matches!(err, WeldError::ForwardReference { .. }));
    }

    #[test]
    fn test_duplicate_top_level_declaration() {
        let mut composer = Composer::new();
        composer.push(script(Section::SharedRoutines, "historic", "function buildMap() {}"));
        composer.push(script(Section::SharedRoutines, "host", "function buildMap() {}"));
        let err = composer.compose().expect_err("declared twice");
        assert!(matches!(err, WeldError::BindingCollision { module, .. } if module == "host"));
    }

    #[test]
    fn test_undeclared_globals_are_ignored() -> Result<()> {
        let mut composer = Composer::new();
        composer.push(script(Section::Bootstrap, "bootstrap", "document.addEventListener('x', f);"));
        composer.compose()?;
        Ok(())
    }
}
