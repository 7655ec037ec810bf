//! Build pipeline runner
//!
//! Runs the stages in order: load both documents, extract their segments,
//! rename the primary module into the host scope, wrap the isolated module,
//! compose the artifact and emit it. Any stage error aborts the build before
//! the destination is touched.

use std::path::Path;

use log::{debug, info};

use crate::{
    composer::{ComposedArtifact, Composer, Fragment, Section},
    config::{Config, ModuleConfig},
    emitter::{BuildReport, Emitter, SegmentReport},
    error::{Result, WeldError},
    extractor::{ExtractedSegment, Extractor},
    isolator::{IsolatedModule, ScopeIsolator},
    namespace_map::NamespaceMap,
    renamer::Renamer,
    shell::{self, ModeView, Shell},
    source::SourceDocument,
};

/// Everything extracted from one module
#[derive(Debug, Clone)]
pub struct ModuleSegments {
    /// Verbatim constant lines
    pub constants: Vec<ExtractedSegment>,
    /// Captured regions paired with the constant name they are emitted under
    pub captures: Vec<(String, ExtractedSegment)>,
    pub libraries: Vec<ExtractedSegment>,
    /// Named functions first, then the run
    pub code: Vec<ExtractedSegment>,
    /// Functions dropped from the run
    pub skipped: Vec<String>,
    pub reports: Vec<SegmentReport>,
}

impl ModuleSegments {
    /// Extract every segment the module profile names
    pub fn extract(doc: &SourceDocument, config: &ModuleConfig) -> Result<Self> {
        let extractor = Extractor::new(doc);
        let mut segments = Self {
            constants: Vec::new(),
            captures: Vec::new(),
            libraries: Vec::new(),
            code: Vec::new(),
            skipped: Vec::new(),
            reports: Vec::new(),
        };

        for spec in &config.constants {
            let segment = extractor.constant(spec)?;
            segments
                .reports
                .push(SegmentReport::new(&segment, spec.critical, spec.min_chars));
            segments.constants.push(segment);
        }
        for spec in &config.captures {
            let segment = extractor.capture(spec)?;
            segments
                .reports
                .push(SegmentReport::new(&segment, spec.critical, spec.min_chars));
            segments
                .captures
                .push((spec.emitted_name().to_owned(), segment));
        }
        for spec in &config.libraries {
            let segment = extractor.library(spec)?;
            segments
                .reports
                .push(SegmentReport::new(&segment, false, spec.min_chars));
            segments.libraries.push(segment);
        }
        for name in &config.functions {
            let segment = extractor.function(name)?;
            segments.reports.push(SegmentReport::new(&segment, true, 1));
            segments.code.push(segment);
        }
        if let Some(spec) = &config.run {
            let run = extractor.run(spec)?;
            segments.reports.push(SegmentReport::new(&run.segment, true, 1));
            segments.skipped = run.skipped;
            segments.code.push(run.segment);
        }

        debug!(
            "Extracted {} from {}: {} constants, {} captures, {} libraries, {} code segments",
            config.name,
            doc.origin().display(),
            segments.constants.len(),
            segments.captures.len(),
            segments.libraries.len(),
            segments.code.len()
        );
        Ok(segments)
    }
}

/// The result of running every stage except emission
#[derive(Debug, Clone)]
pub struct Composition {
    pub artifact: ComposedArtifact,
    pub isolated: IsolatedModule,
    pub reports: Vec<SegmentReport>,
}

/// Drives one build rooted at a project directory
#[derive(Debug, Clone, Copy)]
pub struct Pipeline<'a> {
    config: &'a Config,
    root: &'a Path,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a Config, root: &'a Path) -> Self {
        Self { config, root }
    }

    /// Run every stage and write the artifact
    pub fn run(&self) -> Result<BuildReport> {
        let composition = self.compose()?;
        info!("Emitting artifact");
        let rendered = composition.artifact.render();
        Emitter::new(self.root.join(&self.config.output.path)).emit(&rendered, composition.reports)
    }

    /// Run every stage up to, but not including, emission
    pub fn compose(&self) -> Result<Composition> {
        let config = self.config;
        config.validate()?;
        info!("Starting build in {}", self.root.display());

        // Stage 1: Load both documents
        debug!("Stage 1: Loading sources");
        let primary_doc =
            SourceDocument::load(&config.primary.name, self.root, &config.primary.sources)?;
        let isolated_doc =
            SourceDocument::load(&config.isolated.name, self.root, &config.isolated.sources)?;

        // Stage 2: Extract segments
        debug!("Stage 2: Extracting segments");
        let primary = ModuleSegments::extract(&primary_doc, &config.primary)?;
        let isolated = ModuleSegments::extract(&isolated_doc, &config.isolated)?;

        // Stage 3: Rename code into its target scope
        debug!("Stage 3: Renaming");
        let primary_code =
            Renamer::new(&config.primary.renames).rename_all(&config.primary.name, &primary.code)?;
        let isolated_code = Renamer::new(&config.isolated.renames)
            .rename_all(&config.isolated.name, &isolated.code)?;

        // Stage 4: Wrap the isolated module
        debug!("Stage 4: Isolating {}", config.isolated.name);
        let mut namespace_config = config.isolation.namespace.clone();
        if namespace_config.entity.is_empty() {
            namespace_config.entity.clone_from(&config.shared.entity);
        }
        let namespace = NamespaceMap::from_config(&namespace_config)?;
        let isolated_module =
            ScopeIsolator::new(&config.isolated.name, &config.isolation, &namespace)
                .reserve(isolated.skipped.iter().cloned())
                .reserve(shell::HOST_ROUTINES.iter().copied())
                .reserve(shell::HOST_STATE.iter().copied())
                .isolate(&isolated_code, &config.isolated.entry)?;

        // Stage 5: Compose
        debug!("Stage 5: Composing");
        let artifact = self.assemble(&namespace, &primary, &isolated, &primary_code, &isolated_module)?;

        let mut reports = primary.reports;
        reports.extend(isolated.reports);
        info!(
            "Composed {} fragments from {} and {}",
            artifact.fragments().len(),
            config.primary.name,
            config.isolated.name
        );
        Ok(Composition {
            artifact,
            isolated: isolated_module,
            reports,
        })
    }

    /// Place every fragment in its section and check the result
    fn assemble(
        &self,
        namespace: &NamespaceMap,
        primary: &ModuleSegments,
        isolated: &ModuleSegments,
        primary_code: &[ExtractedSegment],
        isolated_module: &IsolatedModule,
    ) -> Result<ComposedArtifact> {
        let config = self.config;
        let shell = self.shell(namespace, primary, isolated)?;
        let mut composer = Composer::new();

        composer.push(Fragment::markup(Section::Head, "head", shell.head()));
        for segment in primary.libraries.iter().chain(&isolated.libraries) {
            composer.push(Fragment::library(segment.qualified_name(), segment.text.clone()));
        }
        composer.push(Fragment::markup(Section::Markup, "markup", shell.markup()));
        for module in [primary, isolated] {
            for segment in &module.constants {
                composer.push(Fragment::script(
                    Section::Data,
                    segment.qualified_name(),
                    segment.text.clone(),
                ));
            }
            for (name, segment) in &module.captures {
                composer.push(Fragment::script(
                    Section::Data,
                    segment.qualified_name(),
                    format!("const {name} = {};", segment.text),
                ));
            }
        }

        let table = namespace.render_host_table(&config.shared.records)?;
        composer.push(Fragment::script(
            Section::SharedState,
            "shared state",
            shell.shared_state(&table, &config.shared.aliases),
        ));
        composer.push(Fragment::script(
            Section::SharedRoutines,
            "host routines",
            shell.host_routines(),
        ));
        if !primary_code.is_empty() {
            let text = primary_code
                .iter()
                .map(|segment| segment.text.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            composer.push(Fragment::script(
                Section::SharedRoutines,
                config.primary.name.clone(),
                text,
            ));
        }
        composer.push(
            Fragment::script(
                Section::Isolated,
                format!("{} (isolated)", config.isolated.name),
                isolated_module.text.clone(),
            )
            .requiring(config.isolation.guard.iter().cloned())
            .requiring([config.shared.entity.clone()])
            .requiring(isolated_module.requires.iter().cloned()),
        );
        composer.push(
            Fragment::script(Section::Bootstrap, "bootstrap", shell.bootstrap())
                .requiring([config.primary.entry.clone(), isolated_module.export.clone()]),
        );
        composer.push(Fragment::markup(Section::Closing, "closing", shell.closing()));
        composer.compose()
    }

    fn shell<'s>(
        &'s self,
        namespace: &'s NamespaceMap,
        primary: &ModuleSegments,
        isolated: &ModuleSegments,
    ) -> Result<Shell<'s>> {
        let config = self.config;
        let tiles = match &config.shared.tiles {
            None => None,
            Some(tiles) => {
                let known = primary
                    .captures
                    .iter()
                    .chain(&isolated.captures)
                    .any(|(name, _)| name == tiles);
                if !known {
                    return Err(WeldError::config(format!(
                        "shared.tiles names `{tiles}`, which no capture emits"
                    )));
                }
                Some(tiles.as_str())
            }
        };
        let sequence = if config.shared.sequence.is_empty() {
            config.shared.records.keys().map(String::as_str).collect()
        } else {
            config.shared.sequence.iter().map(String::as_str).collect()
        };
        let fields = namespace.fields();

        Ok(Shell {
            title: &config.output.title,
            entity: &config.shared.entity,
            order: &config.shared.order,
            sequence,
            tiles,
            label_field: fields.first().map(|field| field.host.as_str()),
            detail_field: fields.get(1).map(|field| field.host.as_str()),
            modes: vec![
                mode_view(&config.primary, &config.primary.entry),
                mode_view(&config.isolated, &config.isolation.export),
            ],
        })
    }
}

fn mode_view<'a>(module: &'a ModuleConfig, entry: &'a str) -> ModeView<'a> {
    let mode = if module.mode.is_empty() {
        module.name.as_str()
    } else {
        module.mode.as_str()
    };
    let label = if module.label.is_empty() { mode } else { module.label.as_str() };
    ModeView { mode, label, entry }
}
