use crate::interpreter::ErrorObject;
use crate::lexer::{Lexer, Position};
use crate::parser::ParseError;

use std::fmt;
use std::io;

use itertools::Itertools;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BlueError>;

/// Classification shared by lexer, parser and evaluator errors. Rendered as
/// the `<Kind>Error` prefix of every user-visible message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Lexical,
    Syntax,
    Name,
    Type,
    Arithmetic,
    Argument,
    Import,
    Runtime,
    /// Raised by `exit(n)`; never caught by `try`.
    Exit(i32),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        #[rustfmt::skip]
        let pretty = match self {
            ErrorKind::Lexical    => "LexicalError",
            ErrorKind::Syntax     => "SyntaxError",
            ErrorKind::Name       => "NameError",
            ErrorKind::Type       => "TypeError",
            ErrorKind::Arithmetic => "ArithmeticError",
            ErrorKind::Argument   => "ArgumentError",
            ErrorKind::Import     => "ImportError",
            ErrorKind::Runtime    => "RuntimeError",
            ErrorKind::Exit(_)    => "Exit",
        };

        write!(f, "{}", pretty)
    }
}

/// Failures surfaced to the driver.
#[derive(Debug, Error)]
pub enum BlueError {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("{}", .0.iter().join("\n"))]
    Parse(Vec<ParseError>),

    #[error("{error}")]
    Runtime {
        error: ErrorObject,
        trace: Vec<Position>,
    },

    #[error("bundle error: {0}")]
    Bundle(String),

    #[error("exit status {0}")]
    Exit(i32),
}

impl BlueError {
    pub fn exit_code(&self) -> i32 {
        match self {
            BlueError::Exit(code) => *code,
            _ => 1,
        }
    }

    /// Renders the message followed by one caret-annotated excerpt per
    /// frame, innermost first. `source` looks up the text of a file.
    pub fn report<F>(&self, source: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        let frame = |pos: &Position| match source(&pos.file) {
            Some(text) => format!("  at {}\n{}", pos, Lexer::excerpt(&text, pos.line, pos.column)),
            None => format!("  at {}", pos),
        };

        match self {
            BlueError::Parse(errors) => errors
                .iter()
                .map(|error| format!("{}\n{}", error, frame(&error.pos)))
                .join("\n"),
            BlueError::Runtime { error, trace } => {
                let mut lines = vec![error.to_string()];
                lines.extend(trace.iter().map(frame));
                lines.join("\n")
            }
            error => error.to_string(),
        }
    }
}
