use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Keyword,     // ; := skip while do end if then else
    Parenthesis, // ( )
    Operator,    // + - | * / & !
    Comparator,  // <= >= <> < > =
    Boolean,
    Number,
    Identifier,
    Unknown,
    EOF,
}

impl TokenKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::Keyword => "keyword",
            TokenKind::Parenthesis => "parenthesis",
            TokenKind::Operator => "operator",
            TokenKind::Comparator => "comparator",
            TokenKind::Boolean => "boolean",
            TokenKind::Number => "number",
            TokenKind::Identifier => "identifier",
            TokenKind::Unknown => "unknown",
            TokenKind::EOF => "end-of-input",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A lexeme borrowed from the source, tagged with its kind and byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Token<'a> {
    pub text: &'a str,
    pub kind: TokenKind,
    pub offset: usize,
}

impl<'a> Token<'a> {
    pub fn new(text: &'a str, kind: TokenKind, offset: usize) -> Self {
        Self { text, kind, offset }
    }

    pub fn is(&self, kind: TokenKind, text: &str) -> bool {
        self.kind == kind && self.text == text
    }

    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.is(TokenKind::Keyword, keyword)
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>4}  {:<12} {:?}", self.offset, self.kind, self.text)
    }
}
