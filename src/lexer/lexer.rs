use crate::lexer::token::{lookup_ident, Position, Token, TokenKind};

use std::iter::Iterator;
use std::sync::Arc;

/// Lazy token stream over a source text.
///
/// Newlines are plain whitespace; the parser consults token line numbers
/// where a line break matters. `#` comments and `###` block comments are
/// dropped, `##` docstrings are yielded as [`TokenKind::DocComment`].
#[derive(Debug)]
pub struct Lexer<'a> {
    input: &'a str,
    file: Arc<str>,
    current: usize,
    peek: usize,
    ch: u8,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new<F: Into<Arc<str>>>(input: &'a str, file: F) -> Lexer<'a> {
        let mut lexer = Lexer {
            input,
            file: file.into(),
            current: 0,
            peek: 0,
            ch: 0,
            line: 1,
            column: 0,
        };

        lexer.read_char();

        lexer
    }

    fn bytes(&self) -> &'a [u8] {
        self.input.as_bytes()
    }

    fn at_end(&self) -> bool {
        self.current >= self.input.len()
    }

    fn read_char(&mut self) {
        if self.ch == b'\n' {
            self.line += 1;
            self.column = 0;
        }
        if self.peek >= self.input.len() {
            self.ch = 0;
        } else {
            self.ch = self.bytes()[self.peek];
        }
        // continuation bytes of a multi-byte codepoint do not advance the column
        if self.ch & 0xC0 != 0x80 {
            self.column += 1;
        }
        self.current = self.peek;
        self.peek += 1;
    }

    fn peek_char(&self) -> u8 {
        self.peek_nth(0)
    }

    fn peek_nth(&self, n: usize) -> u8 {
        self.bytes().get(self.peek + n).copied().unwrap_or(0)
    }

    fn current_pos(&self) -> Position {
        Position::new(self.file.clone(), self.line, self.column)
    }

    fn read_if_peek(&mut self, ch: u8, yes: TokenKind, no: TokenKind) -> TokenKind {
        if self.peek_char() == ch {
            self.read_char();
            yes
        } else {
            no
        }
    }

    fn read_while(&mut self, predicate: fn(u8) -> bool) -> &'a str {
        let position = self.current;

        while !self.at_end() && predicate(self.ch) {
            self.read_char()
        }

        &self.input[position..self.current]
    }

    fn skip_whitespace(&mut self) {
        while (self.ch as char).is_ascii_whitespace() {
            self.read_char()
        }
    }

    // Skips whitespace and comments; stops on a docstring or a real token.
    fn skip_trivia(&mut self) -> Option<Token> {
        loop {
            self.skip_whitespace();

            if self.ch != b'#' {
                return None;
            }

            let pos = self.current_pos();
            if self.peek_char() == b'#' && self.peek_nth(1) == b'#' {
                if let Err(message) = self.skip_block_comment() {
                    return Some(Token::new(TokenKind::Illegal, message, pos));
                }
            } else if self.peek_char() == b'#' {
                self.read_char();
                self.read_char();
                let doc = self.read_while(|ch| ch != b'\n');
                return Some(Token::new(TokenKind::DocComment, doc, pos));
            } else {
                self.read_while(|ch| ch != b'\n');
            }
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), &'static str> {
        for _ in 0..3 {
            self.read_char();
        }
        loop {
            if self.at_end() {
                return Err("unterminated block comment");
            }
            if self.ch == b'#' && self.peek_char() == b'#' && self.peek_nth(1) == b'#' {
                for _ in 0..3 {
                    self.read_char();
                }
                return Ok(());
            }
            self.read_char();
        }
    }

    // `current` is on the opening quote; returns the raw body and leaves
    // `current` on the closing quote. `#{...}` regions may nest braces and
    // quoted strings.
    fn read_string(&mut self, quote: u8) -> Result<&'a str, &'static str> {
        self.read_char();
        let start = self.current;
        let mut depth = 0usize;

        loop {
            if self.at_end() {
                return Err("unterminated string");
            }
            match self.ch {
                b'\\' => self.read_char(),
                b'#' if depth == 0 && self.peek_char() == b'{' => {
                    self.read_char();
                    depth = 1;
                }
                b'{' if depth > 0 => depth += 1,
                b'}' if depth > 0 => depth -= 1,
                b'"' | b'\'' if depth > 0 => {
                    let inner = self.ch;
                    self.read_char();
                    while self.ch != inner {
                        if self.at_end() {
                            return Err("unterminated string");
                        }
                        if self.ch == b'\\' {
                            self.read_char();
                        }
                        self.read_char();
                    }
                }
                ch if ch == quote && depth == 0 => break,
                _ => {}
            }
            self.read_char();
        }

        Ok(&self.input[start..self.current])
    }

    // `current` is on the first of three quotes; leaves `current` on the last
    // closing quote.
    fn read_raw_string(&mut self) -> Result<&'a str, &'static str> {
        for _ in 0..3 {
            self.read_char();
        }
        let start = self.current;
        loop {
            if self.at_end() {
                return Err("unterminated raw string");
            }
            if self.ch == b'"' && self.peek_char() == b'"' && self.peek_nth(1) == b'"' {
                let literal = &self.input[start..self.current];
                self.read_char();
                self.read_char();
                return Ok(literal);
            }
            self.read_char();
        }
    }

    // `current` is on the opening slash; leaves `current` on the closing one.
    fn read_regex(&mut self) -> Result<&'a str, &'static str> {
        self.read_char();
        let start = self.current;
        while self.ch != b'/' {
            if self.at_end() || self.ch == b'\n' {
                return Err("unterminated regex literal");
            }
            if self.ch == b'\\' {
                self.read_char();
            }
            self.read_char();
        }
        Ok(&self.input[start..self.current])
    }

    // Reads a numeric literal starting on a digit. Underscores are stripped.
    fn read_number(&mut self) -> Result<(TokenKind, String), String> {
        if self.ch == b'0' && matches!(self.peek_char(), b'x' | b'X' | b'o' | b'O' | b'b' | b'B') {
            self.read_char();
            let (kind, radix, prefix) = match self.ch.to_ascii_lowercase() {
                b'x' => (TokenKind::Hex, 16, "0x"),
                b'o' => (TokenKind::Octal, 8, "0o"),
                _ => (TokenKind::Binary, 2, "0b"),
            };
            self.read_char();
            let digits: String = self
                .read_while(|ch| ch.is_ascii_alphanumeric() || ch == b'_')
                .chars()
                .filter(|ch| *ch != '_')
                .collect();
            let (digits, big) = match digits.strip_suffix('n') {
                Some(digits) => (digits.to_string(), true),
                None => (digits, false),
            };
            if digits.is_empty() || !digits.chars().all(|ch| ch.is_digit(radix)) {
                return Err(format!("malformed number: {}{}", prefix, digits));
            }
            let kind = if big { TokenKind::BigInt } else { kind };
            return Ok((kind, format!("{}{}", prefix, digits)));
        }

        let start = self.current;
        let mut kind = TokenKind::Int;
        self.read_while(|ch| ch.is_ascii_digit() || ch == b'_');

        if self.ch == b'.' && self.peek_char().is_ascii_digit() {
            kind = TokenKind::Float;
            self.read_char();
            self.read_while(|ch| ch.is_ascii_digit() || ch == b'_');
        }

        if matches!(self.ch, b'e' | b'E') {
            let sign = matches!(self.peek_char(), b'+' | b'-');
            let digit = if sign { self.peek_nth(1) } else { self.peek_char() };
            if digit.is_ascii_digit() {
                kind = TokenKind::Float;
                self.read_char();
                if sign {
                    self.read_char();
                }
                self.read_while(|ch| ch.is_ascii_digit());
            }
        }

        let literal: String = self.input[start..self.current]
            .chars()
            .filter(|ch| *ch != '_')
            .collect();

        if self.ch == b'n' && !is_letter(self.peek_char()) && !self.peek_char().is_ascii_digit() {
            self.read_char();
            kind = match kind {
                TokenKind::Int => TokenKind::BigInt,
                _ => TokenKind::BigFloat,
            };
        } else if is_letter(self.ch) {
            let rest = self.read_while(|ch| is_letter(ch) || ch.is_ascii_digit());
            return Err(format!("malformed number: {}{}", literal, rest));
        }

        Ok((kind, literal))
    }

    /// Renders line `line` of `source` with a caret under `column`.
    pub fn excerpt(source: &str, line: usize, column: usize) -> String {
        let text = source.lines().nth(line.saturating_sub(1)).unwrap_or("");
        let pad: String = text
            .chars()
            .take(column.saturating_sub(1))
            .map(|ch| if ch == '\t' { '\t' } else { ' ' })
            .collect();

        format!("    {}\n    {}^", text, pad)
    }
}

fn is_letter(ch: u8) -> bool {
    (ch as char).is_ascii_alphabetic() || (ch as char) == '_'
}

fn is_digit(ch: u8) -> bool {
    (ch as char).is_ascii_digit()
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(doc) = self.skip_trivia() {
            return Some(doc);
        }

        let pos = self.current_pos();

        if self.at_end() {
            return Some(Token::eof(pos));
        }

        let kind = match self.ch {
            b'=' => match self.peek_char() {
                b'=' => self.read_if_peek(b'=', TokenKind::Eq, TokenKind::Assign),
                b'>' => self.read_if_peek(b'>', TokenKind::Arrow, TokenKind::Assign),
                _ => TokenKind::Assign,
            },
            b'+' => self.read_if_peek(b'=', TokenKind::PlusAssign, TokenKind::Plus),
            b'-' => self.read_if_peek(b'=', TokenKind::MinusAssign, TokenKind::Minus),
            b'*' => {
                if self.peek_char() == b'*' {
                    self.read_char();
                    self.read_if_peek(b'=', TokenKind::PowerAssign, TokenKind::Power)
                } else {
                    self.read_if_peek(b'=', TokenKind::AsteriskAssign, TokenKind::Asterisk)
                }
            }
            b'/' => {
                if self.peek_char() == b'/' {
                    self.read_char();
                    self.read_if_peek(b'=', TokenKind::SlashSlashAssign, TokenKind::SlashSlash)
                } else {
                    self.read_if_peek(b'=', TokenKind::SlashAssign, TokenKind::Slash)
                }
            }
            b'%' => self.read_if_peek(b'=', TokenKind::PercentAssign, TokenKind::Percent),
            b'!' => self.read_if_peek(b'=', TokenKind::Neq, TokenKind::Bang),
            b'~' => self.read_if_peek(b'=', TokenKind::TildeAssign, TokenKind::Tilde),
            b'^' => self.read_if_peek(b'=', TokenKind::CaretAssign, TokenKind::Caret),
            b'&' => match self.peek_char() {
                b'&' => self.read_if_peek(b'&', TokenKind::And, TokenKind::Ampersand),
                _ => self.read_if_peek(b'=', TokenKind::AmpersandAssign, TokenKind::Ampersand),
            },
            b'|' => match self.peek_char() {
                b'|' => self.read_if_peek(b'|', TokenKind::Or, TokenKind::Pipe),
                _ => self.read_if_peek(b'=', TokenKind::PipeAssign, TokenKind::Pipe),
            },
            b'<' => match self.peek_char() {
                b'<' => {
                    self.read_char();
                    self.read_if_peek(b'=', TokenKind::ShlAssign, TokenKind::Shl)
                }
                _ => self.read_if_peek(b'=', TokenKind::Lte, TokenKind::Lt),
            },
            b'>' => match self.peek_char() {
                b'>' => {
                    self.read_char();
                    self.read_if_peek(b'=', TokenKind::ShrAssign, TokenKind::Shr)
                }
                _ => self.read_if_peek(b'=', TokenKind::Gte, TokenKind::Gt),
            },
            b'.' => {
                if self.peek_char() == b'.' {
                    self.read_char();
                    self.read_if_peek(b'<', TokenKind::DotDotLt, TokenKind::DotDot)
                } else {
                    TokenKind::Dot
                }
            }
            b',' => TokenKind::Comma,
            b':' => TokenKind::Colon,
            b';' => TokenKind::Semicolon,
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'[' => TokenKind::LBracket,
            b']' => TokenKind::RBracket,
            b'{' => TokenKind::LBrace,
            b'}' => TokenKind::RBrace,
            b'"' if self.peek_char() == b'"' && self.peek_nth(1) == b'"' => {
                let token = match self.read_raw_string() {
                    Ok(raw) => Token::new(TokenKind::Raw, raw, pos),
                    Err(message) => return Some(Token::new(TokenKind::Illegal, message, pos)),
                };
                self.read_char();
                return Some(token);
            }
            quote @ (b'"' | b'\'' | b'`') => {
                let kind = match quote {
                    b'"' => TokenKind::Str,
                    b'\'' => TokenKind::StrSingle,
                    _ => TokenKind::Exec,
                };
                let token = match self.read_string(quote) {
                    Ok(body) => Token::new(kind, body, pos),
                    Err(message) => return Some(Token::new(TokenKind::Illegal, message, pos)),
                };
                self.read_char();
                return Some(token);
            }
            _ => {
                if is_letter(self.ch) {
                    let ident = self.read_while(|ch| is_letter(ch) || is_digit(ch));
                    if ident == "r" && self.ch == b'/' {
                        let token = match self.read_regex() {
                            Ok(pattern) => Token::new(TokenKind::Regex, pattern, pos),
                            Err(message) => {
                                return Some(Token::new(TokenKind::Illegal, message, pos))
                            }
                        };
                        self.read_char();
                        return Some(token);
                    }
                    return Some(Token::new(lookup_ident(ident), ident, pos));
                } else if is_digit(self.ch) {
                    return Some(match self.read_number() {
                        Ok((kind, literal)) => Token::new(kind, literal, pos),
                        Err(message) => Token::new(TokenKind::Illegal, message, pos),
                    });
                } else {
                    let ch = self.input[self.current..].chars().next().unwrap_or('\0');
                    for _ in 1..ch.len_utf8() {
                        self.read_char();
                    }
                    self.read_char();
                    return Some(Token::new(
                        TokenKind::Illegal,
                        format!("illegal character `{}`", ch),
                        pos,
                    ));
                }
            }
        };

        let literal = kind.to_string();
        self.read_char();

        Some(Token::new(kind, literal, pos))
    }
}

/// Lexes the whole input and returns every illegal token found.
pub fn lexical_errors(input: &str, file: &str) -> Vec<Token> {
    Lexer::new(input, file)
        .take_while(|token| token.kind != TokenKind::Eof)
        .filter(|token| token.kind == TokenKind::Illegal)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn kinds(input: &str) -> Vec<(TokenKind, String)> {
        Lexer::new(input, "test")
            .take_while(|token| token.kind != TokenKind::Eof)
            .map(|token| (token.kind, token.literal))
            .collect()
    }

    #[test]
    fn example1() {
        let input = "=+(){},;";

        let expected = vec![
            TokenKind::Assign,
            TokenKind::Plus,
            TokenKind::LParen,
            TokenKind::RParen,
            TokenKind::LBrace,
            TokenKind::RBrace,
            TokenKind::Comma,
            TokenKind::Semicolon,
        ];

        let tokens: Vec<TokenKind> = kinds(input).into_iter().map(|(kind, _)| kind).collect();

        assert_eq!(tokens, expected)
    }

    #[test]
    fn example2() {
        let input = "val five = 5;\n\
            var add = fun(x, y=2) {\n\
                x + y;\n\
            };\n\
            add(five, 10)\n";

        let expected = vec![
            (TokenKind::Val, "val"),
            (TokenKind::Ident, "five"),
            (TokenKind::Assign, "="),
            (TokenKind::Int, "5"),
            (TokenKind::Semicolon, ";"),
            (TokenKind::Var, "var"),
            (TokenKind::Ident, "add"),
            (TokenKind::Assign, "="),
            (TokenKind::Fun, "fun"),
            (TokenKind::LParen, "("),
            (TokenKind::Ident, "x"),
            (TokenKind::Comma, ","),
            (TokenKind::Ident, "y"),
            (TokenKind::Assign, "="),
            (TokenKind::Int, "2"),
            (TokenKind::RParen, ")"),
            (TokenKind::LBrace, "{"),
            (TokenKind::Ident, "x"),
            (TokenKind::Plus, "+"),
            (TokenKind::Ident, "y"),
            (TokenKind::Semicolon, ";"),
            (TokenKind::RBrace, "}"),
            (TokenKind::Semicolon, ";"),
            (TokenKind::Ident, "add"),
            (TokenKind::LParen, "("),
            (TokenKind::Ident, "five"),
            (TokenKind::Comma, ","),
            (TokenKind::Int, "10"),
            (TokenKind::RParen, ")"),
        ];

        let expected: Vec<(TokenKind, String)> = expected
            .into_iter()
            .map(|(kind, literal)| (kind, literal.to_string()))
            .collect();

        assert_eq!(kinds(input), expected)
    }

    #[test_case("+=", TokenKind::PlusAssign ; "plus assign")]
    #[test_case("//=", TokenKind::SlashSlashAssign ; "floor div assign")]
    #[test_case("**=", TokenKind::PowerAssign ; "power assign")]
    #[test_case("~=", TokenKind::TildeAssign ; "tilde assign")]
    #[test_case("<<=", TokenKind::ShlAssign ; "shl assign")]
    #[test_case(">>=", TokenKind::ShrAssign ; "shr assign")]
    #[test_case("..<", TokenKind::DotDotLt ; "exclusive range")]
    #[test_case("=>", TokenKind::Arrow ; "arrow")]
    #[test_case("&&", TokenKind::And ; "and symbol")]
    #[test_case("or", TokenKind::Or ; "or keyword")]
    #[test_case("notin", TokenKind::NotIn ; "notin keyword")]
    fn operators(input: &str, expected: TokenKind) {
        assert_eq!(kinds(input), vec![(expected, expected.to_string())])
    }

    #[test_case("0xFF", TokenKind::Hex, "0xFF" ; "hex")]
    #[test_case("0o17", TokenKind::Octal, "0o17" ; "octal")]
    #[test_case("0b1010_1010", TokenKind::Binary, "0b10101010" ; "binary with underscores")]
    #[test_case("1_000_000", TokenKind::Int, "1000000" ; "decimal with underscores")]
    #[test_case("3.25", TokenKind::Float, "3.25" ; "float")]
    #[test_case("1e10", TokenKind::Float, "1e10" ; "exponent")]
    #[test_case("123n", TokenKind::BigInt, "123" ; "big int")]
    #[test_case("1.5n", TokenKind::BigFloat, "1.5" ; "big float")]
    fn numbers(input: &str, kind: TokenKind, literal: &str) {
        assert_eq!(kinds(input), vec![(kind, literal.to_string())])
    }

    #[test]
    fn range_is_not_a_float() {
        assert_eq!(
            kinds("1..10"),
            vec![
                (TokenKind::Int, "1".to_string()),
                (TokenKind::DotDot, "..".to_string()),
                (TokenKind::Int, "10".to_string()),
            ]
        )
    }

    #[test_case("\"foo bar\"", TokenKind::Str, "foo bar" ; "double quoted")]
    #[test_case("'foo'", TokenKind::StrSingle, "foo" ; "single quoted")]
    #[test_case("\"a \\\" b\"", TokenKind::Str, "a \\\" b" ; "escaped quote")]
    #[test_case("\"x #{m[\"k\"]} y\"", TokenKind::Str, "x #{m[\"k\"]} y" ; "nested quote in interpolation")]
    #[test_case("\"\"\"raw #{x} \\n\"\"\"", TokenKind::Raw, "raw #{x} \\n" ; "raw string")]
    #[test_case("`ls -la`", TokenKind::Exec, "ls -la" ; "exec string")]
    #[test_case("r/a+b/", TokenKind::Regex, "a+b" ; "regex")]
    fn strings(input: &str, kind: TokenKind, literal: &str) {
        assert_eq!(kinds(input), vec![(kind, literal.to_string())])
    }

    #[test]
    fn comments() {
        let input = "1 # line comment\n\
            ### block\n comment ###\n\
            ## docstring here\n\
            2";

        assert_eq!(
            kinds(input),
            vec![
                (TokenKind::Int, "1".to_string()),
                (TokenKind::DocComment, " docstring here".to_string()),
                (TokenKind::Int, "2".to_string()),
            ]
        )
    }

    #[test_case("\"abc" ; "unterminated string")]
    #[test_case("0x" ; "empty hex")]
    #[test_case("0b102" ; "bad binary digit")]
    #[test_case("12abc" ; "letters after digits")]
    #[test_case("@" ; "illegal character")]
    #[test_case("### open" ; "unterminated block comment")]
    fn illegal(input: &str) {
        assert_eq!(lexical_errors(input, "test").len(), 1)
    }

    #[test]
    fn positions() {
        let tokens: Vec<Token> = Lexer::new("a\n  bb", "main.b")
            .take_while(|token| token.kind != TokenKind::Eof)
            .collect();

        assert_eq!(tokens[1].pos.line, 2);
        assert_eq!(tokens[1].pos.column, 3);
        assert_eq!(tokens[1].pos.to_string(), "main.b:2:3");
    }

    #[test]
    fn excerpt_places_caret() {
        assert_eq!(Lexer::excerpt("x = 1\ny = oops", 2, 5), "    y = oops\n        ^");
    }
}
