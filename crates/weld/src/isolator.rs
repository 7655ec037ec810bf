//! Scope isolation
//!
//! The absorbed module is wrapped in an immediately invoked function. The
//! host entity table is passed in as an argument and rebuilt under the
//! module's own field names by the namespace adapter; declarations the host
//! already supplies are dropped from the wrapped text. A single `var`
//! outside the wrapper receives the exported entry.

use log::{debug, info, warn};
use rustc_hash::FxHashSet;

use crate::{
    config::IsolationConfig,
    error::{Result, WeldError},
    extractor::ExtractedSegment,
    lexer::{self, Token, TokenKind},
    namespace_map::NamespaceMap,
    symbols::SymbolTable,
    types::FxIndexSet,
};

/// The wrapped module, ready to be placed after the host routines
#[derive(Debug, Clone)]
pub struct IsolatedModule {
    pub module: String,
    /// The one host-visible binding
    pub export: String,
    /// Function the export delegates to
    pub entry: String,
    pub text: String,
    /// Declarations dropped because the host supplies them
    pub omitted: Vec<String>,
    /// Omitted names the wrapped code still reads; the host must declare them
    pub requires: Vec<String>,
    /// Top-level names of the wrapped code, all private to the boundary
    pub internal: FxIndexSet<String>,
    /// Local field names the wrapped code reads from the entity
    pub consumed_fields: FxIndexSet<String>,
}

#[derive(Debug)]
pub struct ScopeIsolator<'a> {
    module: &'a str,
    config: &'a IsolationConfig,
    namespace: &'a NamespaceMap,
    /// Host-level names the wrapped code must not declare
    reserved: FxHashSet<String>,
}

impl<'a> ScopeIsolator<'a> {
    pub fn new(module: &'a str, config: &'a IsolationConfig, namespace: &'a NamespaceMap) -> Self {
        Self {
            module,
            config,
            namespace,
            reserved: FxHashSet::default(),
        }
    }

    /// Add host-owned names, such as skipped lifecycle functions
    #[must_use]
    pub fn reserve<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn isolate(&self, segments: &[ExtractedSegment], entry: &str) -> Result<IsolatedModule> {
        let mut body = String::new();
        for segment in segments {
            body.push_str(&segment.text);
            if !segment.text.ends_with('\n') {
                body.push('\n');
            }
        }

        let (body, omitted) = self.omit(&body);
        let table = SymbolTable::scan(&body);
        let internal: FxIndexSet<String> = table.top_level().map(str::to_owned).collect();

        if !internal.contains(entry) {
            return Err(WeldError::UnresolvedSymbol {
                section: self.module.to_owned(),
                name: entry.to_owned(),
            });
        }
        let wrapper = self.wrapper_bindings();
        self.check_bindings(&internal, &wrapper)?;
        let consumed_fields = self.check_fields(&body)?;

        let requires: Vec<String> = self
            .config
            .omit
            .iter()
            .filter(|name| omitted.contains(name))
            .filter(|name| !wrapper.contains(*name) && table.references.contains(*name))
            .cloned()
            .collect();
        if !requires.is_empty() {
            debug!("{}: host must declare {:?}", self.module, requires);
        }

        let text = self.render(&body, entry);
        info!(
            "Isolated {}: {} private declarations, {} omitted, export `{}`",
            self.module,
            internal.len(),
            omitted.len(),
            self.config.export
        );
        Ok(IsolatedModule {
            module: self.module.to_owned(),
            export: self.config.export.clone(),
            entry: entry.to_owned(),
            text,
            omitted,
            requires,
            internal,
            consumed_fields,
        })
    }

    /// Drop top-level statements declaring host-supplied names
    fn omit(&self, body: &str) -> (String, Vec<String>) {
        if self.config.omit.is_empty() {
            return (body.to_owned(), Vec::new());
        }
        let omit: FxHashSet<&str> = self.config.omit.iter().map(String::as_str).collect();
        let table = SymbolTable::scan(body);

        let mut kept = String::with_capacity(body.len());
        let mut omitted = Vec::new();
        let mut last = 0;
        for declaration in &table.declarations {
            if !declaration.names.iter().any(|name| omit.contains(name.as_str())) {
                continue;
            }
            let (dropped, others): (Vec<_>, Vec<_>) = declaration
                .names
                .iter()
                .partition(|name| omit.contains(name.as_str()));
            if !others.is_empty() {
                warn!(
                    "{}: omitting {:?} also drops {:?} declared in the same statement",
                    self.module, dropped, others
                );
            }
            debug!("{}: omitting declaration of {:?}", self.module, dropped);
            kept.push_str(&body[last..declaration.span.start]);
            last = declaration.span.end;
            omitted.extend(dropped.into_iter().cloned());
        }
        kept.push_str(&body[last..]);

        for name in &self.config.omit {
            if !omitted.contains(name) {
                debug!("{}: nothing declares `{name}`, nothing to omit", self.module);
            }
        }
        (kept, omitted)
    }

    /// Names the wrapper declares around the body: the rebuilt entity table,
    /// its host parameter and the prelude state
    fn wrapper_bindings(&self) -> FxHashSet<String> {
        let prelude = SymbolTable::scan(&self.config.prelude.join("\n"));
        let mut names: FxHashSet<String> = prelude.top_level().map(str::to_owned).collect();
        if !self.namespace.is_empty() {
            let entity = self.namespace.entity();
            names.insert(entity.to_owned());
            names.insert(format!("host{entity}"));
        }
        names
    }

    fn check_bindings(
        &self,
        internal: &FxIndexSet<String>,
        wrapper: &FxHashSet<String>,
    ) -> Result<()> {
        for name in internal {
            if *name == self.config.export
                || self.reserved.contains(name)
                || wrapper.contains(name)
            {
                return Err(WeldError::BindingCollision {
                    module: self.module.to_owned(),
                    name: name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Every field read from the entity must have a local alias
    fn check_fields(&self, body: &str) -> Result<FxIndexSet<String>> {
        if self.namespace.is_empty() {
            return Ok(FxIndexSet::default());
        }
        let consumed = field_accesses(body, self.namespace.entity());
        for field in &consumed {
            if self.namespace.by_local(field).is_none() {
                return Err(WeldError::UnmappedField {
                    module: self.module.to_owned(),
                    entity: self.namespace.entity().to_owned(),
                    field: field.clone(),
                });
            }
        }
        debug!(
            "{}: reads {:?} from `{}`",
            self.module,
            consumed,
            self.namespace.entity()
        );
        Ok(consumed)
    }

    fn render(&self, body: &str, entry: &str) -> String {
        let export = &self.config.export;
        let entity = self.namespace.entity();
        let (parameter, argument) = if self.namespace.is_empty() {
            (String::new(), String::new())
        } else {
            (format!("host{entity}"), entity.to_owned())
        };

        let mut out = format!("var {export};\n(function ({parameter}) {{\n");
        if !self.namespace.is_empty() {
            out.push_str(&self.namespace.render_adapter(&parameter, "  "));
            out.push('\n');
        }
        for line in &self.config.prelude {
            out.push_str("  ");
            out.push_str(line.trim());
            out.push('\n');
        }
        if !self.config.prelude.is_empty() {
            out.push('\n');
        }
        out.push_str(body);
        out.push_str(&format!("\n  {export} = function (key) {{\n"));
        if let Some(guard) = &self.config.guard {
            out.push_str(&format!("    if (!{guard}[key]) return;\n"));
        }
        out.push_str(&format!("    return {entry}(key);\n  }};\n}})({argument});\n"));
        out
    }
}

fn significant_tokens(text: &str) -> Vec<Token> {
    lexer::tokenize(text)
        .into_iter()
        .filter(|token| !token.kind.is_trivia())
        .collect()
}

const BRACES: (&str, &str) = ("{", "}");
const BRACKETS: (&str, &str) = ("[", "]");

/// Array methods whose callback receives one record at a time
const ITERATORS: &[&str] = &[
    "every", "filter", "find", "findIndex", "flatMap", "forEach", "map", "some",
];

#[derive(Debug, Clone, Copy)]
enum Collection {
    Values,
    Entries,
}

/// How one mention of the entity reaches its records
#[derive(Debug)]
enum RecordUse<'a> {
    /// `ENTITY[key].field`
    Field(&'a str),
    /// A record destructured into its fields
    Fields(Vec<&'a str>),
    /// A record bound to a name
    Alias(&'a str),
    Other,
}

struct FieldScan<'a> {
    text: &'a str,
    tokens: Vec<Token>,
}

impl<'a> FieldScan<'a> {
    fn punct(&self, i: usize, p: &str) -> bool {
        self.tokens.get(i).is_some_and(|t| t.is_punct(self.text, p))
    }

    fn ident(&self, i: usize) -> Option<&'a str> {
        self.tokens
            .get(i)
            .filter(|t| t.kind == TokenKind::Ident)
            .map(|t| t.text(self.text))
    }

    /// `.field` or `?.field` after token `i`
    fn member(&self, i: usize) -> Option<&'a str> {
        if self.punct(i + 1, "?") && self.punct(i + 2, ".") {
            self.ident(i + 3)
        } else if self.punct(i + 1, ".") {
            self.ident(i + 2)
        } else {
            None
        }
    }

    fn closing(&self, open: usize, (left, right): (&str, &str)) -> Option<usize> {
        let mut depth = 0isize;
        for index in open..self.tokens.len() {
            if self.punct(index, left) {
                depth += 1;
            } else if self.punct(index, right) {
                depth -= 1;
                if depth == 0 {
                    return Some(index);
                }
            }
        }
        None
    }

    fn opening(&self, close: usize, (left, right): (&str, &str)) -> Option<usize> {
        let mut depth = 0isize;
        for index in (0..=close).rev() {
            if self.punct(index, right) {
                depth += 1;
            } else if self.punct(index, left) {
                depth -= 1;
                if depth == 0 {
                    return Some(index);
                }
            }
        }
        None
    }

    /// Keys of the object pattern `{ a, b: x, c = 1, ...rest }` at its outer level
    fn pattern_keys(&self, open: usize, close: usize) -> Vec<&'a str> {
        let mut keys = Vec::new();
        let mut nested = 0isize;
        for index in open + 1..close {
            if nested == 0
                && (index == open + 1 || self.punct(index - 1, ","))
                && let Some(key) = self.ident(index)
            {
                keys.push(key);
            }
            if ["{", "[", "("].iter().any(|p| self.punct(index, p)) {
                nested += 1;
            } else if ["}", "]", ")"].iter().any(|p| self.punct(index, p)) {
                nested -= 1;
            }
        }
        keys
    }

    /// A name or an object pattern starting at `start`
    fn binding(&self, start: usize) -> RecordUse<'a> {
        if let Some(name) = self.ident(start) {
            return RecordUse::Alias(name);
        }
        if self.punct(start, "{")
            && let Some(close) = self.closing(start, BRACES)
        {
            return RecordUse::Fields(self.pattern_keys(start, close));
        }
        RecordUse::Other
    }

    /// The value half of a `[key, value]` pattern starting at `start`
    fn entry_value(&self, start: usize) -> RecordUse<'a> {
        if !self.punct(start, "[") {
            return RecordUse::Other;
        }
        if self.punct(start + 1, ",") {
            self.binding(start + 2)
        } else if self.ident(start + 1).is_some() && self.punct(start + 2, ",") {
            self.binding(start + 3)
        } else {
            RecordUse::Other
        }
    }

    /// First parameter of the callback starting at token `start`
    fn callback_parameter(&self, start: usize) -> Option<usize> {
        let mut open = start;
        if self.ident(open) == Some("function") {
            open += 1;
            if self.ident(open).is_some() {
                open += 1;
            }
        } else if self.ident(open).is_some()
            && self.punct(open + 1, "=")
            && self.punct(open + 2, ">")
        {
            return Some(open);
        }
        self.punct(open, "(").then_some(open + 1)
    }

    /// `Object.values(ENTITY)` or `Object.entries(ENTITY)` around token `i`
    fn collection(&self, i: usize) -> Option<Collection> {
        if i < 4
            || !self.punct(i - 1, "(")
            || !self.punct(i + 1, ")")
            || !self.punct(i - 3, ".")
            || self.ident(i - 4) != Some("Object")
        {
            return None;
        }
        match self.ident(i - 2)? {
            "values" => Some(Collection::Values),
            "entries" => Some(Collection::Entries),
            _ => None,
        }
    }

    /// Records handed out by iterating the entity
    fn iteration(&self, i: usize, collection: Collection) -> RecordUse<'a> {
        let start = if i >= 6 && self.ident(i - 5) == Some("of") {
            // for (const pattern of Object.values(ENTITY))
            let end = i - 6;
            if self.punct(end, "}") {
                self.opening(end, BRACES)
            } else if self.punct(end, "]") {
                self.opening(end, BRACKETS)
            } else {
                Some(end)
            }
        } else if self.punct(i + 2, ".")
            && self.ident(i + 3).is_some_and(|method| ITERATORS.contains(&method))
            && self.punct(i + 4, "(")
        {
            self.callback_parameter(i + 5)
        } else {
            None
        };
        match (start, collection) {
            (Some(start), Collection::Values) => self.binding(start),
            (Some(start), Collection::Entries) => self.entry_value(start),
            (None, _) => RecordUse::Other,
        }
    }

    /// What the entity mention at token `i` does with its records
    fn record_use(&self, i: usize) -> RecordUse<'a> {
        if let Some(collection) = self.collection(i) {
            return self.iteration(i, collection);
        }
        let record = if self.punct(i + 1, "[") {
            self.closing(i + 1, BRACKETS)
        } else if self.punct(i + 1, ".") && self.ident(i + 2).is_some() {
            Some(i + 2)
        } else {
            None
        };
        let Some(record) = record else {
            return RecordUse::Other;
        };
        if let Some(field) = self.member(record) {
            return RecordUse::Field(field);
        }
        if self.punct(record + 1, "[")
            || self.punct(record + 1, "(")
            || i < 2
            || !self.punct(i - 1, "=")
        {
            return RecordUse::Other;
        }
        if let Some(alias) = self.ident(i - 2) {
            return RecordUse::Alias(alias);
        }
        if self.punct(i - 2, "}")
            && let Some(open) = self.opening(i - 2, BRACES)
        {
            return RecordUse::Fields(self.pattern_keys(open, i - 2));
        }
        RecordUse::Other
    }
}

/// Fields read from records of `entity`
///
/// Recognizes `ENTITY[key].field` and `ENTITY.KEY.field`, destructuring
/// (`const { a, b } = ENTITY[key]`), iteration through `Object.values` or
/// `Object.entries` with a callback or `for...of`, and a record bound to a
/// name (`const r = ENTITY[key]`) then read as `r.field` within the same
/// block.
pub fn field_accesses(text: &str, entity: &str) -> FxIndexSet<String> {
    let scan = FieldScan {
        text,
        tokens: significant_tokens(text),
    };

    let mut fields = FxIndexSet::default();
    let mut aliases: Vec<(&str, isize)> = Vec::new();
    let mut depth = 0isize;
    for i in 0..scan.tokens.len() {
        if scan.punct(i, "{") {
            depth += 1;
        } else if scan.punct(i, "}") {
            depth -= 1;
            aliases.retain(|&(_, level)| level <= depth);
        }
        let Some(name) = scan.ident(i) else {
            continue;
        };
        if i > 0 && scan.punct(i - 1, ".") {
            continue;
        }

        if name == entity {
            match scan.record_use(i) {
                RecordUse::Field(field) => {
                    fields.insert(field.to_owned());
                }
                RecordUse::Fields(keys) => fields.extend(keys.into_iter().map(str::to_owned)),
                RecordUse::Alias(alias) => aliases.push((alias, depth)),
                RecordUse::Other => {}
            }
        } else if aliases.iter().any(|&(alias, _)| alias == name)
            && let Some(field) = scan.member(i)
        {
            fields.insert(field.to_owned());
        }
    }
    fields
}
