mod lexer;
mod token;

pub use lexer::{lexical_errors, Lexer};
pub use token::{lookup_ident, Position, Token, TokenKind};
