use crate::ast::{Comparator, Expression, HighOperator, LowOperator, Sequence, Statement};
use crate::lexer;
use crate::token::{Token, TokenKind};

pub mod error;

pub use error::{ParseResult, SyntaxError};

/// Deepest expression tree, and deepest block or factor nesting, the parser
/// accepts. Every backend walks the tree recursively.
pub const MAX_NESTING_DEPTH: usize = 256;

/// An expression together with the height of its tree.
type Measured = (Expression, usize);

/// Recursive-descent parser over an already tokenized program.
///
/// The parser only ever looks at the current token; each grammar rule is a
/// method and precedence falls out of the call structure
/// (comparison > expression > term > factor).
pub struct Parser<'t, 'a> {
    tokens: &'t [Token<'a>],
    position: usize,
    nesting: usize,
}

impl<'t, 'a> Parser<'t, 'a> {
    pub fn new(tokens: &'t [Token<'a>]) -> Self {
        Self {
            tokens,
            position: 0,
            nesting: 0,
        }
    }

    pub fn parse_program(mut self) -> ParseResult<Sequence> {
        let program = self.parse_sequence()?;
        let trailing = self.current();
        if trailing.kind != TokenKind::EOF {
            return Err(SyntaxError::unexpected(&trailing));
        }
        Ok(program)
    }

    fn parse_sequence(&mut self) -> ParseResult<Sequence> {
        let mut statements = Vec::new();
        loop {
            statements.push(self.parse_statement()?);
            if self.at_sequence_end() {
                return Ok(Sequence::new(statements));
            }
            self.expect_keyword(";")?;
        }
    }

    /// A sequence nested inside `while` or `if`.
    fn parse_block(&mut self) -> ParseResult<Sequence> {
        let token = self.current();
        self.enter(&token)?;
        let block = self.parse_sequence();
        self.nesting -= 1;
        block
    }

    fn at_sequence_end(&self) -> bool {
        let token = self.current();
        token.kind == TokenKind::EOF || token.is_keyword("else") || token.is_keyword("end")
    }

    fn parse_statement(&mut self) -> ParseResult<Statement> {
        let token = self.current();
        if token.kind != TokenKind::Keyword {
            return self.parse_assignment();
        }
        match token.text {
            "skip" => {
                self.advance();
                Ok(Statement::Skip)
            }
            "while" => self.parse_while(),
            "if" => self.parse_if(),
            _ => Err(SyntaxError::unexpected(&token)),
        }
    }

    fn parse_assignment(&mut self) -> ParseResult<Statement> {
        let name = self.expect_identifier()?;
        self.expect_keyword(":=")?;
        let (value, _) = self.parse_comparison()?;
        Ok(Statement::Assignment { name, value })
    }

    fn parse_while(&mut self) -> ParseResult<Statement> {
        self.expect_keyword("while")?;
        let (head, _) = self.parse_comparison()?;
        self.expect_keyword("do")?;
        let body = self.parse_block()?;
        self.expect_keyword("end")?;
        Ok(Statement::While { head, body })
    }

    fn parse_if(&mut self) -> ParseResult<Statement> {
        self.expect_keyword("if")?;
        let (condition, _) = self.parse_comparison()?;
        self.expect_keyword("then")?;
        let consequence = self.parse_block()?;
        let alternative = if self.current().is_keyword("else") {
            self.advance();
            self.parse_block()?
        } else {
            Sequence::skip()
        };
        self.expect_keyword("end")?;
        Ok(Statement::If {
            condition,
            consequence,
            alternative,
        })
    }

    /// `Expression (comparator Expression)?`; comparisons do not chain.
    fn parse_comparison(&mut self) -> ParseResult<Measured> {
        let (left, left_height) = self.parse_expression()?;
        let token = self.current();
        if token.kind != TokenKind::Comparator {
            return Ok((left, left_height));
        }
        let op = Comparator::from_symbol(token.text).ok_or_else(|| SyntaxError::unexpected(&token))?;
        self.advance();
        let (right, right_height) = self.parse_expression()?;
        let height = Self::grow(left_height.max(right_height), &token)?;
        let expr = Expression::Comparison {
            left: Box::new(left),
            op,
            right: Box::new(right),
        };
        Ok((expr, height))
    }

    fn parse_expression(&mut self) -> ParseResult<Measured> {
        let (mut expr, mut height) = self.parse_term()?;
        while let Some(op) = self.current_operator(LowOperator::from_symbol) {
            let token = self.current();
            self.advance();
            let (right, right_height) = self.parse_term()?;
            height = Self::grow(height.max(right_height), &token)?;
            expr = Expression::BinaryLow {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok((expr, height))
    }

    fn parse_term(&mut self) -> ParseResult<Measured> {
        let (mut expr, mut height) = self.parse_factor()?;
        while let Some(op) = self.current_operator(HighOperator::from_symbol) {
            let token = self.current();
            self.advance();
            let (right, right_height) = self.parse_factor()?;
            height = Self::grow(height.max(right_height), &token)?;
            expr = Expression::BinaryHigh {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok((expr, height))
    }

    fn parse_factor(&mut self) -> ParseResult<Measured> {
        let token = self.current();
        match token.kind {
            TokenKind::Operator if token.text == "!" => {
                self.advance();
                let (operand, height) = self.nested(&token, Self::parse_factor)?;
                Ok((Expression::Not(Box::new(operand)), Self::grow(height, &token)?))
            }
            TokenKind::Number => {
                let value = token.text.parse::<i64>().map_err(|_| SyntaxError::InvalidNumber {
                    text: token.text.to_string(),
                    offset: token.offset,
                })?;
                self.advance();
                Ok((Expression::Number(value), 1))
            }
            TokenKind::Identifier => {
                self.advance();
                Ok((Expression::Identifier(token.text.to_string()), 1))
            }
            TokenKind::Boolean => {
                self.advance();
                Ok((Expression::Boolean(token.text == "true"), 1))
            }
            TokenKind::Parenthesis if token.text == "(" => {
                self.advance();
                let (inner, height) = self.nested(&token, Self::parse_comparison)?;
                self.expect(TokenKind::Parenthesis, ")")?;
                Ok((
                    Expression::Parenthesized(Box::new(inner)),
                    Self::grow(height, &token)?,
                ))
            }
            _ => Err(SyntaxError::unexpected(&token)),
        }
    }

    /// Runs `rule` one nesting level deeper than the current one.
    fn nested(
        &mut self,
        token: &Token<'_>,
        rule: fn(&mut Self) -> ParseResult<Measured>,
    ) -> ParseResult<Measured> {
        self.enter(token)?;
        let result = rule(self);
        self.nesting -= 1;
        result
    }

    fn enter(&mut self, token: &Token<'_>) -> ParseResult<()> {
        if self.nesting >= MAX_NESTING_DEPTH {
            return Err(SyntaxError::too_deep(token));
        }
        self.nesting += 1;
        Ok(())
    }

    /// Height of a node whose tallest child is `height` high.
    fn grow(height: usize, token: &Token<'_>) -> ParseResult<usize> {
        if height >= MAX_NESTING_DEPTH {
            return Err(SyntaxError::too_deep(token));
        }
        Ok(height + 1)
    }

    fn current_operator<T>(&self, from_symbol: fn(&str) -> Option<T>) -> Option<T> {
        let token = self.current();
        if token.kind == TokenKind::Operator {
            from_symbol(token.text)
        } else {
            None
        }
    }

    fn expect_identifier(&mut self) -> ParseResult<String> {
        let token = self.current();
        if token.kind == TokenKind::Identifier {
            self.advance();
            Ok(token.text.to_string())
        } else {
            Err(SyntaxError::unexpected(&token))
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> ParseResult<()> {
        self.expect(TokenKind::Keyword, keyword)
    }

    fn expect(&mut self, kind: TokenKind, text: &str) -> ParseResult<()> {
        let token = self.current();
        if token.is(kind, text) {
            self.advance();
            Ok(())
        } else {
            Err(SyntaxError::unexpected(&token))
        }
    }

    /// The token under the cursor. A stream missing its `EOF` sentinel behaves
    /// as if one followed the last token.
    fn current(&self) -> Token<'a> {
        match self.tokens.get(self.position) {
            Some(token) => *token,
            None => {
                let offset = self
                    .tokens
                    .last()
                    .map_or(0, |token| token.offset + token.text.len());
                Token::new("", TokenKind::EOF, offset)
            }
        }
    }

    fn advance(&mut self) {
        if self.current().kind != TokenKind::EOF {
            self.position += 1;
        }
    }
}

pub fn parse_tokens(tokens: &[Token<'_>]) -> ParseResult<Sequence> {
    Parser::new(tokens).parse_program()
}

pub fn parse(input: &str) -> ParseResult<Sequence> {
    parse_tokens(&lexer::tokenize(input))
}
