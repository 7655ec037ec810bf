//! Identifier renaming over tokens
//!
//! Rules are applied in a single pass over the token stream of one segment,
//! so chains such as `a -> b, b -> c` never compound. Identifiers are only
//! rewritten at token boundaries; text inside strings, template text and
//! comments is left alone unless a rule opts in with `in_strings`, in which
//! case the literal text is rewritten at identifier boundaries.

use std::borrow::Cow;

use log::{debug, trace, warn};
use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::{
    error::{Result, WeldError},
    extractor::ExtractedSegment,
    lexer::{self, Token, TokenKind, is_ident_continue},
};

/// How a rename rule matches its target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenameMode {
    /// Every identifier token equal to the old name
    #[default]
    WholeIdentifier,

    /// Only where the old name is the object of a property access (`OLD.field`)
    DottedProperty,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenameRule {
    /// Module name or qualified segment name (`module::segment`) the rule applies to
    pub scope: String,
    pub old: String,
    pub new: String,
    #[serde(default)]
    pub mode: RenameMode,
    /// For dotted-property rules: restrict matches to these fields
    #[serde(default)]
    pub fields: Vec<String>,
    /// Also rewrite identifier-boundary matches inside string and template text
    #[serde(default)]
    pub in_strings: bool,
}

impl RenameRule {
    pub fn whole(scope: &str, old: &str, new: &str) -> Self {
        Self {
            scope: scope.to_owned(),
            old: old.to_owned(),
            new: new.to_owned(),
            mode: RenameMode::WholeIdentifier,
            fields: Vec::new(),
            in_strings: false,
        }
    }

    pub fn dotted(scope: &str, old: &str, new: &str) -> Self {
        Self {
            mode: RenameMode::DottedProperty,
            ..Self::whole(scope, old, new)
        }
    }

    /// Check whether the rule applies to a segment
    pub fn applies_to(&self, segment: &ExtractedSegment) -> bool {
        self.scope == segment.module || self.scope == segment.qualified_name()
    }

    fn accepts_field(&self, field: &str) -> bool {
        self.fields.is_empty() || self.fields.iter().any(|f| f == field)
    }
}

/// Result of renaming one segment
#[derive(Debug, Clone)]
pub struct RenameOutcome {
    pub text: String,
    /// Number of replacements made by each applicable rule, keyed by old name
    pub replacements: FxHashMap<String, usize>,
}

/// Applies rename rules to segment text
#[derive(Debug)]
pub struct Renamer<'a> {
    rules: &'a [RenameRule],
}

impl<'a> Renamer<'a> {
    pub fn new(rules: &'a [RenameRule]) -> Self {
        Self { rules }
    }

    /// Rename every segment of a module
    ///
    /// Unmatched rules are reported once for the whole set rather than per
    /// segment, since a module-scoped rule usually targets only one of them.
    pub fn rename_all(&self, module: &str, segments: &[ExtractedSegment]) -> Result<Vec<ExtractedSegment>> {
        let mut counts = FxHashMap::default();
        let renamed = segments
            .iter()
            .map(|segment| self.apply(segment, &mut counts))
            .collect::<Result<Vec<_>>>()?;
        self.report(&counts, module);
        Ok(renamed)
    }

    /// Rename one segment, accumulating per-rule counts keyed by rule index
    fn apply(
        &self,
        segment: &ExtractedSegment,
        counts: &mut FxHashMap<usize, usize>,
    ) -> Result<ExtractedSegment> {
        let applicable: Vec<(usize, &RenameRule)> = self
            .rules
            .iter()
            .enumerate()
            .filter(|(_, rule)| rule.applies_to(segment))
            .collect();
        if applicable.is_empty() {
            return Ok(segment.clone());
        }
        let rules: Vec<&RenameRule> = applicable.iter().map(|(_, rule)| *rule).collect();
        let outcome = rename_text(&segment.qualified_name(), &segment.text, &rules)?;
        for (index, rule) in applicable {
            *counts.entry(index).or_default() +=
                outcome.replacements.get(&rule.old).copied().unwrap_or(0);
        }
        Ok(ExtractedSegment {
            text: outcome.text,
            ..segment.clone()
        })
    }

    fn report(&self, counts: &FxHashMap<usize, usize>, scope: &str) {
        for (index, rule) in self.rules.iter().enumerate() {
            match counts.get(&index) {
                None => {}
                Some(0) => warn!(
                    "Rename rule `{}` -> `{}` matched nothing in {scope}",
                    rule.old, rule.new
                ),
                Some(count) => debug!(
                    "Renamed {count} occurrence(s) of `{}` to `{}` in {scope}",
                    rule.old, rule.new
                ),
            }
        }
    }
}

/// Rename identifiers in `text` according to `rules`
///
/// Fails if any rule's new name already occurs as an identifier token in the
/// text, since the rename would then merge two distinct bindings.
pub fn rename_text(scope: &str, text: &str, rules: &[&RenameRule]) -> Result<RenameOutcome> {
    let tokens = lexer::tokenize(text);

    let mut by_old: FxHashMap<&str, &RenameRule> = FxHashMap::default();
    for rule in rules {
        by_old.insert(rule.old.as_str(), rule);
    }
    for token in tokens.iter().filter(|t| t.kind == TokenKind::Ident) {
        let ident = token.text(text);
        if rules.iter().any(|r| r.new == ident && r.mode == RenameMode::WholeIdentifier) {
            return Err(WeldError::RenameCollision {
                scope: scope.to_owned(),
                name: ident.to_owned(),
            });
        }
    }

    let significant = lexer::significant(&tokens);
    let mut position = vec![usize::MAX; tokens.len()];
    for (pos, &idx) in significant.iter().enumerate() {
        position[idx] = pos;
    }

    let mut output = String::with_capacity(text.len() + text.len() / 16);
    let mut replacements: FxHashMap<String, usize> = FxHashMap::default();

    for (idx, token) in tokens.iter().enumerate() {
        let piece = token.text(text);
        match token.kind {
            TokenKind::Ident => {
                let replaced = by_old.get(piece).and_then(|rule| {
                    let accepted = match rule.mode {
                        RenameMode::WholeIdentifier => true,
                        RenameMode::DottedProperty => {
                            is_property_object(text, &tokens, &significant, position[idx], rule)
                        }
                    };
                    accepted.then_some(*rule)
                });
                if let Some(rule) = replaced {
                    trace!("{scope}: `{}` -> `{}` at byte {}", rule.old, rule.new, token.start);
                    *replacements.entry(rule.old.clone()).or_default() += 1;
                    output.push_str(&rule.new);
                } else {
                    output.push_str(piece);
                }
            }
            TokenKind::Str | TokenKind::TemplateChunk => {
                let mut current = Cow::Borrowed(piece);
                for rule in rules.iter().filter(|r| r.in_strings) {
                    let (next, count) = replace_word(
                        &current,
                        &rule.old,
                        &rule.new,
                        rule.mode == RenameMode::DottedProperty,
                    );
                    if count > 0 {
                        *replacements.entry(rule.old.clone()).or_default() += count;
                        current = Cow::Owned(next.into_owned());
                    }
                }
                output.push_str(&current);
            }
            _ => output.push_str(piece),
        }
    }

    Ok(RenameOutcome {
        text: output,
        replacements,
    })
}

/// `OLD` followed by `.field` and not itself a property of something else
fn is_property_object(
    text: &str,
    tokens: &[Token],
    significant: &[usize],
    pos: usize,
    rule: &RenameRule,
) -> bool {
    let token_at = |p: usize| significant.get(p).map(|&i| tokens[i]);
    if pos > 0 && token_at(pos - 1).is_some_and(|t| t.is_punct(text, ".")) {
        return false;
    }
    let Some(dot) = token_at(pos + 1) else {
        return false;
    };
    if !dot.is_punct(text, ".") {
        return false;
    }
    token_at(pos + 2)
        .is_some_and(|field| field.kind == TokenKind::Ident && rule.accepts_field(field.text(text)))
}

/// Replace `old` with `new` in free text where it stands as a whole word
///
/// With `require_dot`, a match must be followed by `.`.
fn replace_word<'t>(text: &'t str, old: &str, new: &str, require_dot: bool) -> (Cow<'t, str>, usize) {
    let bytes = text.as_bytes();
    let mut result = String::new();
    let mut last = 0;
    let mut count = 0;
    for (start, _) in text.match_indices(old) {
        let end = start + old.len();
        let before_ok = start == 0 || !is_ident_continue(bytes[start - 1]);
        let after_ok = bytes.get(end).is_none_or(|&b| !is_ident_continue(b));
        let dot_ok = !require_dot || bytes.get(end) == Some(&b'.');
        if before_ok && after_ok && dot_ok && start >= last {
            result.push_str(&text[last..start]);
            result.push_str(new);
            last = end;
            count += 1;
        }
    }
    if count == 0 {
        return (Cow::Borrowed(text), 0);
    }
    result.push_str(&text[last..]);
    (Cow::Owned(result), count)
}
