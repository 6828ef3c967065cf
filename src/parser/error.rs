use thiserror::Error;

use super::MAX_NESTING_DEPTH;
use crate::token::{Token, TokenKind};

/// Grammar violations reported by the parser.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyntaxError {
    #[error("Unexpected {kind} token '{text}' at {offset}")]
    UnexpectedToken {
        kind: TokenKind,
        text: String,
        offset: usize,
    },
    #[error("Invalid integer literal '{text}' at {offset}")]
    InvalidNumber { text: String, offset: usize },
    #[error("Nesting deeper than {limit} levels at {offset}")]
    NestingTooDeep { limit: usize, offset: usize },
}

impl SyntaxError {
    pub(super) fn unexpected(token: &Token<'_>) -> Self {
        SyntaxError::UnexpectedToken {
            kind: token.kind,
            text: token.text.to_string(),
            offset: token.offset,
        }
    }

    pub(super) fn too_deep(token: &Token<'_>) -> Self {
        SyntaxError::NestingTooDeep {
            limit: MAX_NESTING_DEPTH,
            offset: token.offset,
        }
    }

    pub fn offset(&self) -> usize {
        match self {
            SyntaxError::UnexpectedToken { offset, .. }
            | SyntaxError::InvalidNumber { offset, .. }
            | SyntaxError::NestingTooDeep { offset, .. } => *offset,
        }
    }
}

pub type ParseResult<T> = Result<T, SyntaxError>;
