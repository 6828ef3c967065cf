use crate::token::{Token, TokenKind};

const KEYWORDS: [&str; 9] = [";", ":=", "skip", "while", "do", "end", "if", "then", "else"];
const PARENTHESES: [&str; 2] = ["(", ")"];
const OPERATORS: [&str; 7] = ["+", "-", "|", "*", "/", "&", "!"];
const COMPARATORS: [&str; 6] = ["<=", ">=", "<>", "<", ">", "="];
const BOOLEANS: [&str; 2] = ["true", "false"];

/// A pattern reports how many bytes it matches at the start of the input, 0 for no match.
type Pattern = fn(&str) -> usize;

/// Patterns are tried in order and the first non-empty match wins, so keywords
/// and booleans shadow identifiers that start with them. `None` marks whitespace.
const PATTERNS: [(Option<TokenKind>, Pattern); 8] = [
    (Some(TokenKind::Keyword), keyword),
    (Some(TokenKind::Parenthesis), parenthesis),
    (Some(TokenKind::Operator), operator),
    (Some(TokenKind::Comparator), comparator),
    (Some(TokenKind::Boolean), boolean),
    (Some(TokenKind::Number), number),
    (Some(TokenKind::Identifier), identifier),
    (None, whitespace),
];

fn keyword(input: &str) -> usize {
    match_literal(input, &KEYWORDS)
}

fn parenthesis(input: &str) -> usize {
    match_literal(input, &PARENTHESES)
}

fn operator(input: &str) -> usize {
    match_literal(input, &OPERATORS)
}

fn comparator(input: &str) -> usize {
    match_literal(input, &COMPARATORS)
}

fn boolean(input: &str) -> usize {
    match_literal(input, &BOOLEANS)
}

fn number(input: &str) -> usize {
    match_while(input, |c| c.is_ascii_digit())
}

fn identifier(input: &str) -> usize {
    match_while(input, |c| c.is_ascii_alphabetic() || c == '_')
}

/// Unicode whitespace plus the byte-order mark.
fn whitespace(input: &str) -> usize {
    match_while(input, |c| c.is_whitespace() || c == '\u{feff}')
}

fn match_literal(input: &str, alternatives: &[&str]) -> usize {
    alternatives
        .iter()
        .find(|literal| input.starts_with(**literal))
        .map_or(0, |literal| literal.len())
}

fn match_while(input: &str, accept: impl Fn(char) -> bool) -> usize {
    input
        .char_indices()
        .find(|&(_, c)| !accept(c))
        .map_or(input.len(), |(idx, _)| idx)
}

pub struct Lexer<'a> {
    input: &'a str,
    cursor: usize,
    finished: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            cursor: 0,
            finished: false,
        }
    }

    /// Returns the next token, skipping whitespace. Once the end-of-input token
    /// has been produced this returns `None`.
    pub fn next_token(&mut self) -> Option<Token<'a>> {
        if self.finished {
            return None;
        }

        while self.cursor < self.input.len() {
            let start = self.cursor;
            let remaining = &self.input[start..];

            let matched = PATTERNS.iter().find_map(|(kind, pattern)| {
                let len = pattern(remaining);
                (len > 0).then_some((*kind, len))
            });

            match matched {
                Some((Some(kind), len)) => {
                    self.cursor += len;
                    return Some(Token::new(&remaining[..len], kind, start));
                }
                Some((None, len)) => self.cursor += len,
                None => {
                    // Step over exactly one character so multi-byte input stays on a boundary.
                    let len = remaining.chars().next().map_or(1, char::len_utf8);
                    self.cursor += len;
                    return Some(Token::new(&remaining[..len], TokenKind::Unknown, start));
                }
            }
        }

        self.finished = true;
        Some(Token::new("", TokenKind::EOF, self.input.len()))
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}

/// Splits `input` into tokens. Never fails: characters no pattern accepts
/// become `Unknown` tokens for the parser to reject, and the result always
/// ends with exactly one `EOF` token.
pub fn tokenize(input: &str) -> Vec<Token<'_>> {
    Lexer::new(input).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn kinds(input: &str) -> Vec<(TokenKind, &str)> {
        tokenize(input)
            .into_iter()
            .map(|token| (token.kind, token.text))
            .collect()
    }

    #[test]
    fn test_simple_program() {
        let input = indoc! {"
            x := 3 + 4;
            while x <= 10 do x := x * 2 end
        "};
        let expected_tokens = vec![
            (TokenKind::Identifier, "x"),
            (TokenKind::Keyword, ":="),
            (TokenKind::Number, "3"),
            (TokenKind::Operator, "+"),
            (TokenKind::Number, "4"),
            (TokenKind::Keyword, ";"),
            (TokenKind::Keyword, "while"),
            (TokenKind::Identifier, "x"),
            (TokenKind::Comparator, "<="),
            (TokenKind::Number, "10"),
            (TokenKind::Keyword, "do"),
            (TokenKind::Identifier, "x"),
            (TokenKind::Keyword, ":="),
            (TokenKind::Identifier, "x"),
            (TokenKind::Operator, "*"),
            (TokenKind::Number, "2"),
            (TokenKind::Keyword, "end"),
            (TokenKind::EOF, ""),
        ];
        assert_eq!(kinds(input), expected_tokens);
    }

    #[test]
    fn records_byte_offsets() {
        let tokens = tokenize("ab  :=\n12");
        let offsets = tokens.iter().map(|token| token.offset).collect::<Vec<_>>();
        assert_eq!(offsets, vec![0, 4, 7, 9]);
    }

    #[test]
    fn keywords_and_booleans_shadow_identifier_prefixes() {
        assert_eq!(
            kinds("done trueish"),
            vec![
                (TokenKind::Keyword, "do"),
                (TokenKind::Identifier, "ne"),
                (TokenKind::Boolean, "true"),
                (TokenKind::Identifier, "ish"),
                (TokenKind::EOF, ""),
            ]
        );
    }

    #[test]
    fn prefers_two_character_comparators() {
        assert_eq!(
            kinds("<><=>=<>="),
            vec![
                (TokenKind::Comparator, "<>"),
                (TokenKind::Comparator, "<="),
                (TokenKind::Comparator, ">="),
                (TokenKind::Comparator, "<>"),
                (TokenKind::Comparator, "="),
                (TokenKind::EOF, ""),
            ]
        );
    }

    #[test]
    fn unknown_characters_become_single_tokens() {
        assert_eq!(
            kinds("x @é 1"),
            vec![
                (TokenKind::Identifier, "x"),
                (TokenKind::Unknown, "@"),
                (TokenKind::Unknown, "é"),
                (TokenKind::Number, "1"),
                (TokenKind::EOF, ""),
            ]
        );
    }

    #[test]
    fn identifiers_do_not_contain_digits() {
        assert_eq!(
            kinds("x1"),
            vec![
                (TokenKind::Identifier, "x"),
                (TokenKind::Number, "1"),
                (TokenKind::EOF, ""),
            ]
        );
    }

    #[test]
    fn empty_input_yields_only_eof() {
        let tokens = tokenize("   \n\t");
        assert_eq!(tokens, vec![Token::new("", TokenKind::EOF, 5)]);
    }

    #[test]
    fn concatenated_texts_reproduce_source_without_whitespace() {
        let source = "if a<>b then c := !(a & b) | 1 else skip end; ?";
        let joined = tokenize(source)
            .iter()
            .map(|token| token.text)
            .collect::<String>();
        let stripped = source
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>();
        assert_eq!(joined, stripped);
    }

    #[test]
    fn skips_a_leading_byte_order_mark() {
        let tokens = tokenize("\u{feff}x := 1");
        assert_eq!(tokens[0], Token::new("x", TokenKind::Identifier, 3));
        assert!(tokens.iter().all(|token| token.kind != TokenKind::Unknown));
    }
}
