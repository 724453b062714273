use crate::error::ErrorKind;
use crate::lexer::Position;

use std::fmt;

pub type Result<T> = std::result::Result<T, ParseError>;

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub kind: ErrorKind,
    pub message: String,
    pub pos: Position,
}

impl ParseError {
    pub fn syntax<S: Into<String>>(message: S, pos: Position) -> ParseError {
        ParseError {
            kind: ErrorKind::Syntax,
            message: message.into(),
            pos,
        }
    }

    pub fn lexical<S: Into<String>>(message: S, pos: Position) -> ParseError {
        ParseError {
            kind: ErrorKind::Lexical,
            message: message.into(),
            pos,
        }
    }

    pub fn expected<S, T>(expected: S, got: T, pos: Position) -> ParseError
    where
        S: Into<String>,
        T: Into<String>,
    {
        ParseError::syntax(
            format!(
                "Expected `{}`, got `{}` instead.",
                expected.into(),
                got.into()
            ),
            pos,
        )
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.kind, self.message, self.pos)
    }
}

impl std::error::Error for ParseError {}
