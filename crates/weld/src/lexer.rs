//! Minimal lossless JavaScript tokenizer
//!
//! The tokenizer only needs to know enough about the language to keep
//! braces, identifiers and field accesses that live inside string literals,
//! template text, regex literals and comments away from the structural
//! passes. Concatenating the text of every token reproduces the input
//! exactly.
//!
//! Regex literals are recognized with the usual previous-token heuristic: a
//! `/` starts a regex when the preceding significant token cannot end an
//! expression.

/// Kind of a lexical token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Ident,
    Number,
    /// Punctuation; every character is its own token except `...`
    Punct,
    /// Single or double quoted string, quotes included
    Str,
    /// Raw template text: the opening backtick or a closing `}` up to the
    /// next `${` or closing backtick, delimiters included
    TemplateChunk,
    Regex,
    LineComment,
    BlockComment,
    Whitespace,
}

impl TokenKind {
    /// Tokens that carry no code: whitespace and comments
    pub fn is_trivia(self) -> bool {
        matches!(
            self,
            Self::Whitespace | Self::LineComment | Self::BlockComment
        )
    }
}

/// A token as a byte range into the tokenized text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }

    pub fn is_punct(&self, source: &str, punct: &str) -> bool {
        self.kind == TokenKind::Punct && self.text(source) == punct
    }

    pub fn is_ident(&self, source: &str, ident: &str) -> bool {
        self.kind == TokenKind::Ident && self.text(source) == ident
    }
}

/// Keywords after which a `/` begins a regex literal
const REGEX_PREFIX_KEYWORDS: &[&str] = &[
    "return",
    "typeof",
    "instanceof",
    "in",
    "of",
    "new",
    "delete",
    "void",
    "throw",
    "case",
    "do",
    "else",
    "yield",
    "await",
];

pub fn is_ident_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_' || byte == b'$' || byte >= 0x80
}

pub fn is_ident_continue(byte: u8) -> bool {
    is_ident_start(byte) || byte.is_ascii_digit()
}

/// Tokenize `source` starting in code context
pub fn tokenize(source: &str) -> Vec<Token> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    tokens: Vec<Token>,
    /// One entry per open `${` substitution: the code brace depth inside it
    template_stack: Vec<usize>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            tokens: Vec::new(),
            template_stack: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Token> {
        while self.pos < self.bytes.len() {
            let start = self.pos;
            let kind = self.next_kind();
            debug_assert!(self.pos > start, "lexer must always advance");
            self.tokens.push(Token {
                kind,
                start,
                end: self.pos,
            });
        }
        self.tokens
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn next_kind(&mut self) -> TokenKind {
        let byte = self.bytes[self.pos];
        match byte {
            b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c => {
                while self
                    .peek(0)
                    .is_some_and(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c))
                {
                    self.pos += 1;
                }
                TokenKind::Whitespace
            }
            b'/' if self.peek(1) == Some(b'/') => {
                while self.peek(0).is_some_and(|b| b != b'\n') {
                    self.pos += 1;
                }
                TokenKind::LineComment
            }
            b'/' if self.peek(1) == Some(b'*') => {
                self.pos += 2;
                match self.source[self.pos..].find("*/") {
                    Some(offset) => self.pos += offset + 2,
                    None => self.pos = self.bytes.len(),
                }
                TokenKind::BlockComment
            }
            b'/' if self.regex_allowed() => self.regex_or_slash(),
            b'\'' | b'"' => {
                self.string(byte);
                TokenKind::Str
            }
            b'`' => {
                self.pos += 1;
                self.template_chunk();
                TokenKind::TemplateChunk
            }
            b'}' if self.template_stack.last() == Some(&0) => {
                self.template_stack.pop();
                self.pos += 1;
                self.template_chunk();
                TokenKind::TemplateChunk
            }
            b'{' => {
                if let Some(depth) = self.template_stack.last_mut() {
                    *depth += 1;
                }
                self.pos += 1;
                TokenKind::Punct
            }
            b'}' => {
                if let Some(depth) = self.template_stack.last_mut() {
                    *depth -= 1;
                }
                self.pos += 1;
                TokenKind::Punct
            }
            b'.' if self.peek(1) == Some(b'.') && self.peek(2) == Some(b'.') => {
                self.pos += 3;
                TokenKind::Punct
            }
            b'.' if self.peek(1).is_some_and(|b| b.is_ascii_digit()) => {
                self.number();
                TokenKind::Number
            }
            b'0'..=b'9' => {
                self.number();
                TokenKind::Number
            }
            b if is_ident_start(b) => {
                while self.peek(0).is_some_and(is_ident_continue) {
                    self.pos += 1;
                }
                TokenKind::Ident
            }
            _ => {
                self.pos += 1;
                TokenKind::Punct
            }
        }
    }

    fn string(&mut self, quote: u8) {
        self.pos += 1;
        while let Some(b) = self.peek(0) {
            match b {
                b'\\' => self.pos = (self.pos + 2).min(self.bytes.len()),
                // Unterminated strings end at the line break
                b'\n' => return,
                _ if b == quote => {
                    self.pos += 1;
                    return;
                }
                _ => self.pos += 1,
            }
        }
    }

    /// Scan template text up to and including the closing backtick or `${`
    fn template_chunk(&mut self) {
        while let Some(b) = self.peek(0) {
            match b {
                b'\\' => self.pos = (self.pos + 2).min(self.bytes.len()),
                b'`' => {
                    self.pos += 1;
                    return;
                }
                b'$' if self.peek(1) == Some(b'{') => {
                    self.pos += 2;
                    self.template_stack.push(0);
                    return;
                }
                _ => self.pos += 1,
            }
        }
    }

    fn number(&mut self) {
        let start = self.pos;
        self.pos += 1;
        while let Some(b) = self.peek(0) {
            let exponent_sign = matches!(b, b'+' | b'-')
                && matches!(self.bytes[self.pos - 1], b'e' | b'E')
                && !self.source[start..self.pos].starts_with("0x");
            if b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || exponent_sign {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn regex_allowed(&self) -> bool {
        let Some(prev) = self.tokens.iter().rev().find(|t| !t.kind.is_trivia()) else {
            return true;
        };
        let text = prev.text(self.source);
        match prev.kind {
            TokenKind::Punct => !matches!(text, ")" | "]" | "}"),
            TokenKind::Ident => REGEX_PREFIX_KEYWORDS.contains(&text),
            _ => false,
        }
    }

    /// Scan a regex literal; falls back to a lone `/` if the line ends first
    fn regex_or_slash(&mut self) -> TokenKind {
        let start = self.pos;
        self.pos += 1;
        let mut in_class = false;
        while let Some(b) = self.peek(0) {
            match b {
                b'\\' => self.pos += 2,
                b'\n' => break,
                b'[' => {
                    in_class = true;
                    self.pos += 1;
                }
                b']' => {
                    in_class = false;
                    self.pos += 1;
                }
                b'/' if !in_class => {
                    self.pos += 1;
                    while self.peek(0).is_some_and(is_ident_continue) {
                        self.pos += 1;
                    }
                    return TokenKind::Regex;
                }
                _ => self.pos += 1,
            }
        }
        self.pos = start + 1;
        TokenKind::Punct
    }
}

/// Indices of significant (non-trivia) tokens
pub fn significant(tokens: &[Token]) -> Vec<usize> {
    tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| !t.kind.is_trivia())
        .map(|(i, _)| i)
        .collect()
}
