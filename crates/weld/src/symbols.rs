//! Declaration and reference collection
//!
//! A light, token-based view of which names a fragment of script binds and
//! which free names it uses. Top-level declarations keep the byte span of
//! their whole statement so they can be dropped from a segment. Scope
//! analysis is deliberately flat: a name bound anywhere in the text is
//! treated as bound everywhere in it.

use std::ops::Range;

use rustc_hash::FxHashSet;

use crate::{
    lexer::{self, Token, TokenKind},
    types::FxIndexSet,
};

const KEYWORDS: &[&str] = &[
    "arguments", "async", "await", "break", "case", "catch", "class", "const", "continue",
    "debugger", "default", "delete", "do", "else", "export", "extends", "false", "finally", "for",
    "function", "if", "import", "in", "instanceof", "let", "new", "null", "of", "return", "static",
    "super", "switch", "this", "throw", "true", "try", "typeof", "undefined", "var", "void",
    "while", "with", "yield",
];

fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    Function,
    Class,
    Const,
    Let,
    Var,
}

impl DeclarationKind {
    fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "function" => Some(Self::Function),
            "class" => Some(Self::Class),
            "const" => Some(Self::Const),
            "let" => Some(Self::Let),
            "var" => Some(Self::Var),
            _ => None,
        }
    }

    fn is_variable(self) -> bool {
        matches!(self, Self::Const | Self::Let | Self::Var)
    }
}

/// One top-level declaration statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub kind: DeclarationKind,
    /// Every name the statement binds (`let a = 1, b = 2` binds two)
    pub names: Vec<String>,
    /// The whole statement, with leading indentation and the trailing line break
    pub span: Range<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    pub declarations: Vec<Declaration>,
    /// Every name bound anywhere in the text: declarations at any depth and parameters
    pub bindings: FxHashSet<String>,
    /// Free names in first-use order, excluding property names and object keys
    pub references: FxIndexSet<String>,
}

impl SymbolTable {
    pub fn scan(text: &str) -> Self {
        let stream = Stream::new(text);
        let declarations = stream.top_level_declarations();
        let bindings = stream.bindings();
        let references = stream.references(&bindings);
        Self {
            declarations,
            bindings,
            references,
        }
    }

    /// Names declared at the top level, in source order
    pub fn top_level(&self) -> impl Iterator<Item = &str> {
        self.declarations
            .iter()
            .flat_map(|declaration| declaration.names.iter().map(String::as_str))
    }

    pub fn declares(&self, name: &str) -> bool {
        self.top_level().any(|declared| declared == name)
    }
}

/// Significant tokens of one text
struct Stream<'a> {
    text: &'a str,
    tokens: Vec<Token>,
}

impl<'a> Stream<'a> {
    fn new(text: &'a str) -> Self {
        let tokens = lexer::tokenize(text)
            .into_iter()
            .filter(|token| !token.kind.is_trivia())
            .collect();
        Self { text, tokens }
    }

    fn len(&self) -> usize {
        self.tokens.len()
    }

    fn text_at(&self, index: usize) -> &'a str {
        self.tokens.get(index).map_or("", |token| token.text(self.text))
    }

    fn kind_at(&self, index: usize) -> Option<TokenKind> {
        self.tokens.get(index).map(|token| token.kind)
    }

    fn is_punct(&self, index: usize, punct: &str) -> bool {
        self.tokens
            .get(index)
            .is_some_and(|token| token.is_punct(self.text, punct))
    }

    fn is_ident(&self, index: usize) -> bool {
        self.kind_at(index) == Some(TokenKind::Ident)
    }

    /// `=>` is lexed as two adjacent tokens
    fn is_arrow(&self, index: usize) -> bool {
        self.is_punct(index, "=")
            && self.is_punct(index + 1, ">")
            && self.tokens[index].end == self.tokens[index + 1].start
    }

    fn after_dot(&self, index: usize) -> bool {
        index > 0 && self.is_punct(index - 1, ".")
    }

    fn bracket_delta(&self, index: usize) -> isize {
        if self.kind_at(index) != Some(TokenKind::Punct) {
            return 0;
        }
        match self.text_at(index) {
            "{" | "(" | "[" => 1,
            "}" | ")" | "]" => -1,
            _ => 0,
        }
    }

    fn newline_before(&self, index: usize) -> bool {
        index > 0 && self.text[self.tokens[index - 1].end..self.tokens[index].start].contains('\n')
    }

    fn ends_expression(&self, index: usize) -> bool {
        match self.kind_at(index) {
            Some(TokenKind::Ident | TokenKind::Number | TokenKind::Str | TokenKind::Regex) => true,
            Some(TokenKind::TemplateChunk) => self.text_at(index).ends_with('`'),
            Some(TokenKind::Punct) => matches!(self.text_at(index), ")" | "]" | "}"),
            _ => false,
        }
    }

    fn top_level_declarations(&self) -> Vec<Declaration> {
        let mut declarations = Vec::new();
        let mut depth = 0isize;
        let mut index = 0;
        while index < self.len() {
            if depth == 0 && self.is_ident(index) && !self.after_dot(index) {
                let keyword = if self.text_at(index) == "async" && self.text_at(index + 1) == "function" {
                    index + 1
                } else {
                    index
                };
                if let Some(kind) = DeclarationKind::from_keyword(self.text_at(keyword)) {
                    let (names, end) = if kind.is_variable() {
                        self.variable_statement(keyword)
                    } else {
                        self.function_like(keyword)
                    };
                    if !names.is_empty() {
                        declarations.push(Declaration {
                            kind,
                            names,
                            span: self.statement_span(index, end),
                        });
                        index = end + 1;
                        continue;
                    }
                }
            }
            depth += self.bracket_delta(index);
            index += 1;
        }
        declarations
    }

    /// `function name(...) {...}` or `class Name ... {...}` starting at the keyword
    fn function_like(&self, keyword: usize) -> (Vec<String>, usize) {
        let mut next = keyword + 1;
        if self.is_punct(next, "*") {
            next += 1;
        }
        let mut names = Vec::new();
        if self.is_ident(next) && self.text_at(next) != "extends" {
            names.push(self.text_at(next).to_owned());
        }

        let mut depth = 0isize;
        let mut opened = false;
        for index in next..self.len() {
            if depth == 0 && self.is_punct(index, "{") {
                opened = true;
            }
            depth += self.bracket_delta(index);
            if opened && depth == 0 {
                return (names, index);
            }
        }
        (names, self.len().saturating_sub(1))
    }

    /// `const|let|var` declarator list starting at the keyword
    fn variable_statement(&self, keyword: usize) -> (Vec<String>, usize) {
        let mut names = Vec::new();
        self.collect_binding(keyword + 1, &mut names);

        let mut depth = 0isize;
        for index in keyword + 1..self.len() {
            if depth == 0 && index > keyword + 1 {
                if self.newline_before(index)
                    && self.ends_expression(index - 1)
                    && self.is_ident(index)
                    && !matches!(self.text_at(index), "in" | "of" | "instanceof")
                {
                    return (names, index - 1);
                }
                if self.is_ident(index)
                    && DeclarationKind::from_keyword(self.text_at(index))
                        .is_some_and(DeclarationKind::is_variable)
                {
                    return (names, index - 1);
                }
                if self.is_punct(index, ";") {
                    return (names, index);
                }
                if self.is_punct(index, ",") {
                    self.collect_binding(index + 1, &mut names);
                }
            }
            depth += self.bracket_delta(index);
            if depth < 0 {
                return (names, index - 1);
            }
        }
        (names, self.len().saturating_sub(1))
    }

    /// A binding target: a name or a destructuring pattern
    fn collect_binding(&self, index: usize, names: &mut Vec<String>) {
        if self.is_ident(index) {
            names.push(self.text_at(index).to_owned());
            return;
        }
        if !(self.is_punct(index, "{") || self.is_punct(index, "[")) {
            return;
        }
        let mut depth = 0isize;
        for inner in index..self.len() {
            depth += self.bracket_delta(inner);
            if depth == 0 {
                break;
            }
            if self.is_ident(inner)
                && !self.is_punct(inner + 1, ":")
                && !(inner > index && self.is_punct(inner - 1, "="))
            {
                names.push(self.text_at(inner).to_owned());
            }
        }
    }

    /// Statement token range widened to whole lines where it owns them
    fn statement_span(&self, first: usize, last: usize) -> Range<usize> {
        let bytes = self.text.as_bytes();
        let mut start = self.tokens[first].start;
        let line_start = self.text[..start].rfind('\n').map_or(0, |i| i + 1);
        if self.text[line_start..start].bytes().all(|b| b == b' ' || b == b'\t') {
            start = line_start;
        }
        let mut end = self.tokens[last].end;
        let mut probe = end;
        while probe < bytes.len() && matches!(bytes[probe], b' ' | b'\t' | b'\r') {
            probe += 1;
        }
        if probe == bytes.len() || bytes[probe] == b'\n' {
            end = (probe + 1).min(bytes.len());
        }
        start..end
    }

    fn bindings(&self) -> FxHashSet<String> {
        let mut bindings = FxHashSet::default();
        for index in 0..self.len() {
            if !self.is_ident(index) || self.after_dot(index) {
                continue;
            }
            match self.text_at(index) {
                "const" | "let" | "var" => {
                    let mut names = Vec::new();
                    self.collect_binding(index + 1, &mut names);
                    bindings.extend(names);
                }
                "function" | "class" => {
                    let mut next = index + 1;
                    if self.is_punct(next, "*") {
                        next += 1;
                    }
                    if self.is_ident(next) {
                        bindings.insert(self.text_at(next).to_owned());
                        next += 1;
                    }
                    if self.is_punct(next, "(") {
                        self.collect_parameters(next, &mut bindings);
                    }
                }
                "catch" if self.is_punct(index + 1, "(") => {
                    self.collect_parameters(index + 1, &mut bindings);
                }
                name => {
                    // Later declarators: `let a = 1, b = 2`
                    if index > 0
                        && self.is_punct(index - 1, ",")
                        && self.is_punct(index + 1, "=")
                        && !self.is_punct(index + 2, "=")
                        && !self.is_arrow(index + 1)
                    {
                        bindings.insert(name.to_owned());
                    }
                    if self.is_arrow(index + 1) {
                        bindings.insert(name.to_owned());
                    }
                }
            }
        }
        for index in 0..self.len() {
            if self.is_punct(index, ")") && self.is_arrow(index + 1) {
                if let Some(open) = self.matching_open(index) {
                    self.collect_parameters(open, &mut bindings);
                }
            }
        }
        bindings
    }

    fn matching_open(&self, close: usize) -> Option<usize> {
        let mut depth = 0isize;
        for index in (0..=close).rev() {
            depth += self.bracket_delta(index);
            if depth == 0 {
                return Some(index);
            }
        }
        None
    }

    /// Names inside a parameter list opening at `open`
    fn collect_parameters(&self, open: usize, bindings: &mut FxHashSet<String>) {
        let mut depth = 0isize;
        for index in open..self.len() {
            depth += self.bracket_delta(index);
            if depth == 0 {
                break;
            }
            if self.is_ident(index)
                && !self.after_dot(index)
                && !self.is_punct(index + 1, ":")
                && !is_keyword(self.text_at(index))
            {
                bindings.insert(self.text_at(index).to_owned());
            }
        }
    }

    fn is_object_key(&self, index: usize) -> bool {
        self.is_punct(index + 1, ":")
            && index > 0
            && (self.is_punct(index - 1, "{") || self.is_punct(index - 1, ","))
    }

    /// Method shorthand in an object literal or class body: `name(...) {`
    fn is_method_key(&self, index: usize) -> bool {
        if index == 0 || !self.is_punct(index + 1, "(") {
            return false;
        }
        if !matches!(self.text_at(index - 1), "{" | "," | "}")
            || self.kind_at(index - 1) != Some(TokenKind::Punct)
        {
            return false;
        }
        self.matching_close(index + 1)
            .is_some_and(|close| self.is_punct(close + 1, "{"))
    }

    fn matching_close(&self, open: usize) -> Option<usize> {
        let mut depth = 0isize;
        for index in open..self.len() {
            depth += self.bracket_delta(index);
            if depth == 0 {
                return Some(index);
            }
        }
        None
    }

    fn references(&self, bindings: &FxHashSet<String>) -> FxIndexSet<String> {
        let mut references = FxIndexSet::default();
        for index in 0..self.len() {
            if !self.is_ident(index)
                || self.after_dot(index)
                || self.is_object_key(index)
                || self.is_method_key(index)
            {
                continue;
            }
            let name = self.text_at(index);
            if is_keyword(name) || bindings.contains(name) {
                continue;
            }
            references.insert(name.to_owned());
        }
        references
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn names(table: &SymbolTable) -> Vec<&str> {
        table.top_level().collect()
    }

    #[test]
    fn test_multiple_declarators_and_nesting() {
        let table = SymbolTable::scan(
            "let selReg = null, curStep = 0, animFrames = {};\nfunction a(x) { const inner = 1; return inner + x; }\nconst b = (y, z) => { return y + z; }\n",
        );
        assert_eq!(names(&table), vec!["selReg", "curStep", "animFrames", "a", "b"]);
        for local in ["inner", "x", "y", "z"] {
            assert!(table.bindings.contains(local), "{local} should be bound");
            assert!(!table.references.contains(local));
        }
    }

    #[test]
    fn test_statements_without_semicolons() {
        let text = "const A = 1\nconst B = {\n  k: 2\n}\nfoo(A)\n";
        let table = SymbolTable::scan(text);
        assert_eq!(names(&table), vec!["A", "B"]);
        assert_eq!(&text[table.declarations[1].span.clone()], "const B = {\n  k: 2\n}\n");
        assert!(table.references.contains("foo"));
        assert!(!table.references.contains("A"));
    }

    #[test]
    fn test_properties_and_keys_are_not_references() {
        let table = SymbolTable::scan("const v = obj.name + REGIONS[k].desc;\nconst o = { name: v, desc };\n");
        assert!(table.references.contains("obj"));
        assert!(table.references.contains("REGIONS"));
        assert!(table.references.contains("k"));
        assert!(!table.references.contains("name"));
    }

    #[test]
    fn test_braces_in_literals_do_not_hide_declarations() {
        let table = SymbolTable::scan("const s = '{';\nfunction f() { return `}${s}`; }\nconst t = /{/;\n");
        assert_eq!(names(&table), vec!["s", "f", "t"]);
    }

    #[test]
    fn test_function_expression_inside_const() {
        let table = SymbolTable::scan("const f = function g() { var z = 1; };\nlet q;\n");
        assert_eq!(names(&table), vec!["f", "q"]);
        assert!(table.bindings.contains("g"));
        assert!(table.bindings.contains("z"));
    }

    #[test]
    fn test_span_covers_indented_line() {
        let text = "  const REGIONS = {CAL:{n:'x'}};\n  const COL = {y:2};\n";
        let table = SymbolTable::scan(text);
        assert_eq!(&text[table.declarations[0].span.clone()], "  const REGIONS = {CAL:{n:'x'}};\n");
        assert_eq!(&text[table.declarations[1].span.clone()], "  const COL = {y:2};\n");
    }

    #[test]
    fn test_async_function_and_destructuring() {
        let table = SymbolTable::scan("async function load() {}\nconst { a, b: c } = obj;\n");
        assert_eq!(names(&table), vec!["load", "a", "c"]);
        assert_eq!(table.declarations[0].kind, DeclarationKind::Function);
    }

    #[test]
    fn test_method_shorthand_is_not_a_reference() {
        let table = SymbolTable::scan(
            "const d = {\n  register(c) { this.c = c; },\n  show() { paint(); }\n};\nclass K { hide() {} }\n",
        );
        assert!(!table.references.contains("register"));
        assert!(!table.references.contains("show"));
        assert!(!table.references.contains("hide"));
        assert!(table.references.contains("paint"));
    }

    #[test]
    fn test_member_calls_are_not_declarations() {
        let table = SymbolTable::scan("obj.function = 1;\nwindow.addEventListener('x', () => {});\n");
        assert!(table.declarations.is_empty());
    }
}
