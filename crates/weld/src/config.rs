//! Build configuration
//!
//! Configuration is read from TOML. The lookup order is an explicit path,
//! `<root>/weld.toml`, then the user configuration directory, and finally
//! the built-in default, which declares no modules and therefore fails
//! validation with a pointer to the missing file.

use std::{
    fs,
    path::{Path, PathBuf},
};

use etcetera::BaseStrategy;
use indexmap::IndexMap;
use log::debug;
use regex::Regex;
use rustc_hash::FxHashSet;
use serde::Deserialize;

use crate::{
    error::{Result, WeldError},
    renamer::RenameRule,
};

/// File name looked up in the project root and the user config directory
pub const CONFIG_FILE_NAME: &str = "weld.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub output: OutputConfig,
    /// Module A: its code is renamed into the host scope
    pub primary: ModuleConfig,
    /// Module B: its code is wrapped in the isolation boundary
    pub isolated: ModuleConfig,
    pub isolation: IsolationConfig,
    pub shared: SharedConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub path: PathBuf,
    pub title: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("index.html"),
            title: "Explorer".to_owned(),
        }
    }
}

/// Profile of one input module
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModuleConfig {
    pub name: String,
    /// Runtime mode key the dispatcher uses for this module
    pub mode: String,
    /// Text of the mode toggle button
    pub label: String,
    /// Preferred path first, then fallbacks
    pub sources: Vec<PathBuf>,
    pub constants: Vec<ConstantSpec>,
    pub captures: Vec<CaptureSpec>,
    pub libraries: Vec<LibrarySpec>,
    pub run: Option<RunSpec>,
    /// Individual functions extracted by name
    pub functions: Vec<String>,
    pub renames: Vec<RenameRule>,
    /// Entry function as named after renaming
    pub entry: String,
}

/// A single-line named constant (`const NAME = ...`)
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConstantSpec {
    pub name: String,
    #[serde(default = "default_true")]
    pub critical: bool,
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
}

/// A pattern-delimited region re-emitted as a constant
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaptureSpec {
    pub name: String,
    /// Regex with exactly one capture group
    pub pattern: String,
    /// Constant name used when the capture is emitted; defaults to `name`
    pub emit_as: Option<String>,
    #[serde(default)]
    pub critical: bool,
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
}

impl CaptureSpec {
    pub fn emitted_name(&self) -> &str {
        self.emit_as.as_deref().unwrap_or(&self.name)
    }
}

/// A head-level library `<script>` block recognized by a token
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LibrarySpec {
    pub name: String,
    pub token: String,
    /// Blocks containing this token (case-insensitive) within the window are rejected
    pub exclude: Option<String>,
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default)]
    pub case_insensitive: bool,
    #[serde(default = "default_head_boundary")]
    pub head_boundary: String,
    #[serde(default)]
    pub min_chars: usize,
}

/// A run of function declarations between a start marker and a stop marker
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunSpec {
    pub name: String,
    pub start: Vec<String>,
    pub stop: Vec<String>,
    /// Functions dropped from the run because the host supplies them
    pub skip: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IsolationConfig {
    /// The one host-visible symbol
    pub export: String,
    /// Data constant that must hold the requested key before entry runs
    pub guard: Option<String>,
    /// Declarations the host supplies; dropped from the wrapped text
    pub omit: Vec<String>,
    /// Module-private state lines injected after the adapter
    pub prelude: Vec<String>,
    pub namespace: NamespaceConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NamespaceConfig {
    pub entity: String,
    pub fields: Vec<FieldAliasConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldAliasConfig {
    pub canonical: String,
    pub host: String,
    pub local: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SharedConfig {
    /// Name of the shared entity table, e.g. `REGIONS`
    pub entity: String,
    /// Name of the constant listing entity keys in display order
    pub order: String,
    /// Entity keys in display order; defaults to record order
    pub sequence: Vec<String>,
    /// Capture holding per-key tile geometry for the selector
    pub tiles: Option<String>,
    /// Canonical records: entity key -> canonical field -> value
    pub records: IndexMap<String, IndexMap<String, String>>,
    /// Host variables bound to data blobs
    pub aliases: Vec<DataAlias>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataAlias {
    pub name: String,
    pub value: String,
}

fn default_true() -> bool {
    true
}

fn default_min_chars() -> usize {
    16
}

fn default_window() -> usize {
    200
}

fn default_head_boundary() -> String {
    "<style>".to_owned()
}

impl Config {
    /// Parse configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| WeldError::config(e.to_string()))
    }

    /// Locate and load the configuration for a build rooted at `root`
    pub fn load(root: &Path, explicit: Option<&Path>) -> Result<Self> {
        let Some(path) = Self::locate(root, explicit)? else {
            debug!("No {CONFIG_FILE_NAME} found, using built-in defaults");
            return Ok(Self::default());
        };
        debug!("Loading configuration from {}", path.display());
        let text = fs::read_to_string(&path).map_err(|e| WeldError::io(&path, e))?;
        Self::from_toml(&text)
    }

    fn locate(root: &Path, explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(WeldError::config(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            return Ok(Some(path.to_path_buf()));
        }

        let project = root.join(CONFIG_FILE_NAME);
        if project.is_file() {
            return Ok(Some(project));
        }

        if let Ok(strategy) = etcetera::choose_base_strategy() {
            let user = strategy.config_dir().join("weld").join(CONFIG_FILE_NAME);
            if user.is_file() {
                return Ok(Some(user));
            }
        }
        Ok(None)
    }

    /// Check the configuration before any file is read
    pub fn validate(&self) -> Result<()> {
        if self.primary.sources.is_empty() && self.isolated.sources.is_empty() {
            return Err(WeldError::config(format!(
                "no modules configured; create {CONFIG_FILE_NAME} in the project root"
            )));
        }
        for module in [&self.primary, &self.isolated] {
            module.validate()?;
        }
        if self.isolation.export.is_empty() {
            return Err(WeldError::config("isolation.export must name the exported symbol"));
        }
        if self.shared.entity.is_empty() || self.shared.order.is_empty() {
            return Err(WeldError::config("shared.entity and shared.order must be set"));
        }
        let namespace = &self.isolation.namespace;
        if !namespace.fields.is_empty() && namespace.entity != self.shared.entity {
            return Err(WeldError::config(format!(
                "isolation.namespace.entity `{}` does not match shared.entity `{}`",
                namespace.entity, self.shared.entity
            )));
        }
        self.validate_namespace()?;
        self.validate_records()
    }

    fn validate_namespace(&self) -> Result<()> {
        let mut host = FxHashSet::default();
        let mut local = FxHashSet::default();
        let mut canonical = FxHashSet::default();
        for field in &self.isolation.namespace.fields {
            if !canonical.insert(field.canonical.as_str())
                || !host.insert(field.host.as_str())
                || !local.insert(field.local.as_str())
            {
                return Err(WeldError::config(format!(
                    "namespace map for `{}` is not a bijection at field `{}`",
                    self.isolation.namespace.entity, field.canonical
                )));
            }
        }
        Ok(())
    }

    fn validate_records(&self) -> Result<()> {
        if let Some(key) = self
            .shared
            .sequence
            .iter()
            .find(|key| !self.shared.records.contains_key(*key))
        {
            return Err(WeldError::config(format!(
                "shared sequence lists `{key}`, which has no record"
            )));
        }
        for (key, record) in &self.shared.records {
            for field in &self.isolation.namespace.fields {
                if !record.contains_key(&field.canonical) {
                    return Err(WeldError::config(format!(
                        "shared record `{key}` has no value for field `{}`",
                        field.canonical
                    )));
                }
            }
        }
        Ok(())
    }
}

impl ModuleConfig {
    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(WeldError::config("every module needs a name"));
        }
        if self.sources.is_empty() {
            return Err(WeldError::config(format!(
                "module `{}` lists no source paths",
                self.name
            )));
        }
        if self.entry.is_empty() {
            return Err(WeldError::config(format!(
                "module `{}` has no entry function",
                self.name
            )));
        }
        for capture in &self.captures {
            let regex = Regex::new(&capture.pattern).map_err(|e| {
                WeldError::config(format!("capture `{}` pattern: {e}", capture.name))
            })?;
            if regex.captures_len() != 2 {
                return Err(WeldError::config(format!(
                    "capture `{}` pattern must have exactly one group",
                    capture.name
                )));
            }
        }
        let mut seen = FxHashSet::default();
        for rule in &self.renames {
            if !seen.insert((rule.scope.as_str(), rule.old.as_str())) {
                return Err(WeldError::config(format!(
                    "module `{}` renames `{}` twice in scope `{}`",
                    self.name, rule.old, rule.scope
                )));
            }
        }
        Ok(())
    }
}
