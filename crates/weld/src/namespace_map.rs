//! Field naming conventions for the shared entity
//!
//! One canonical record shape, two views: the host view used by the shared
//! table and the host routines, and the local view the isolated module was
//! written against. The map is a bijection on both sides.

use indexmap::IndexMap;
use rustc_hash::FxHashSet;

use crate::{
    config::NamespaceConfig,
    error::{Result, WeldError},
    lexer::{is_ident_continue, is_ident_start},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldAlias {
    pub canonical: String,
    pub host: String,
    pub local: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceMap {
    entity: String,
    fields: Vec<FieldAlias>,
}

impl NamespaceMap {
    pub fn new(entity: impl Into<String>, fields: Vec<FieldAlias>) -> Result<Self> {
        let entity = entity.into();
        let mut seen = [
            FxHashSet::default(),
            FxHashSet::default(),
            FxHashSet::default(),
        ];
        for field in &fields {
            let sides = [&field.canonical, &field.host, &field.local];
            for (names, name) in seen.iter_mut().zip(sides) {
                if !is_identifier(name) || !names.insert(name.clone()) {
                    return Err(WeldError::config(format!(
                        "namespace map for `{entity}`: `{name}` is not a unique identifier"
                    )));
                }
            }
        }
        Ok(Self { entity, fields })
    }

    pub fn from_config(config: &NamespaceConfig) -> Result<Self> {
        Self::new(
            config.entity.clone(),
            config
                .fields
                .iter()
                .map(|field| FieldAlias {
                    canonical: field.canonical.clone(),
                    host: field.host.clone(),
                    local: field.local.clone(),
                })
                .collect(),
        )
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn fields(&self) -> &[FieldAlias] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.entity.is_empty() || self.fields.is_empty()
    }

    pub fn by_local(&self, local: &str) -> Option<&FieldAlias> {
        self.fields.iter().find(|field| field.local == local)
    }

    /// Adapter statement rebuilding the entity under the local convention
    ///
    /// Reads the host table through `source` and binds the result to the
    /// entity name, shadowing the host table inside the isolation boundary.
    pub fn render_adapter(&self, source: &str, indent: &str) -> String {
        let entries = self
            .fields
            .iter()
            .map(|field| format!("{}: v.{}", field.local, field.host))
            .collect::<Vec<_>>()
            .join(", ");
        let entity = &self.entity;
        format!(
            "{indent}const {entity} = {{}};\n\
             {indent}Object.entries({source} || {{}}).forEach(([k, v]) => {{\n\
             {indent}  {entity}[k] = {{ {entries} }};\n\
             {indent}}});\n"
        )
    }

    /// The shared entity table under the host convention
    pub fn render_host_table(
        &self,
        records: &IndexMap<String, IndexMap<String, String>>,
    ) -> Result<String> {
        let mut out = format!("const {} = {{\n", self.entity);
        for (key, record) in records {
            let mut entries = Vec::with_capacity(self.fields.len());
            for field in &self.fields {
                let value = record.get(&field.canonical).ok_or_else(|| {
                    WeldError::config(format!(
                        "record `{key}` has no value for `{}.{}`",
                        self.entity, field.canonical
                    ))
                })?;
                entries.push(format!("{}: {}", field.host, js_string(value)));
            }
            out.push_str(&format!("  {}: {{ {} }},\n", js_key(key), entries.join(", ")));
        }
        out.push_str("};\n");
        Ok(out)
    }
}

fn is_identifier(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.first().is_some_and(|&b| is_ident_start(b)) && bytes.iter().all(|&b| is_ident_continue(b))
}

/// Single-quoted script string literal
pub fn js_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '<' => out.push_str("\\x3C"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Object literal key, quoted only when it is not an identifier
pub fn js_key(key: &str) -> String {
    if is_identifier(key) {
        key.to_owned()
    } else {
        js_string(key)
    }
}
