pub mod ast;
mod error;
mod parser;

pub use error::{ParseError, Result};
pub use parser::{parse_string_parts, Parser};

use crate::lexer::Lexer;

/// Parses a whole source text, collecting every syntax error.
pub fn parse_program(input: &str, file: &str) -> std::result::Result<ast::Program, Vec<ParseError>> {
    Parser::new(Lexer::new(input, file)).parse()
}
