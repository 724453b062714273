use std::fmt;
use std::sync::Arc;

/// Source location of a token. Positions never take part in AST equality,
/// so two parses of the same text compare equal wherever they came from.
#[derive(Debug, Clone, Default)]
pub struct Position {
    pub file: Arc<str>,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(file: Arc<str>, line: usize, column: usize) -> Position {
        Position { file, line, column }
    }
}

impl PartialEq for Position {
    fn eq(&self, _: &Position) -> bool {
        true
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Eof,
    Illegal,

    // Identifiers and Literals
    Ident,
    Int,
    Float,
    Hex,
    Octal,
    Binary,
    BigInt,
    BigFloat,
    Str,
    StrSingle,
    Raw,
    Exec,
    Regex,
    DocComment,

    // Operators
    Assign,
    Plus,
    Minus,
    Asterisk,
    Slash,
    SlashSlash,
    Percent,
    Power,
    Bang,
    Tilde,
    Ampersand,
    Pipe,
    Caret,
    Shl,
    Shr,
    And,
    Or,
    Lt,
    Gt,
    Lte,
    Gte,
    Eq,
    Neq,
    DotDot,
    DotDotLt,
    Dot,
    Arrow,

    // Compound assignment
    PlusAssign,
    MinusAssign,
    AsteriskAssign,
    SlashAssign,
    SlashSlashAssign,
    PowerAssign,
    PercentAssign,
    AmpersandAssign,
    PipeAssign,
    CaretAssign,
    TildeAssign,
    ShlAssign,
    ShrAssign,

    // Delimiters
    Comma,
    Colon,
    Semicolon,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,

    // Keywords
    Fun,
    Var,
    Val,
    True,
    False,
    Null,
    If,
    Elif,
    Else,
    Return,
    For,
    In,
    NotIn,
    Not,
    Match,
    Try,
    Catch,
    Finally,
    Break,
    Continue,
    Import,
    Spawn,
    SelfPid,
    Eval,
}

impl TokenKind {
    pub fn is_compound_assign(&self) -> bool {
        matches!(
            self,
            TokenKind::PlusAssign
                | TokenKind::MinusAssign
                | TokenKind::AsteriskAssign
                | TokenKind::SlashAssign
                | TokenKind::SlashSlashAssign
                | TokenKind::PowerAssign
                | TokenKind::PercentAssign
                | TokenKind::AmpersandAssign
                | TokenKind::PipeAssign
                | TokenKind::CaretAssign
                | TokenKind::TildeAssign
                | TokenKind::ShlAssign
                | TokenKind::ShrAssign
        )
    }

    /// The binary operator an augmented assignment applies before storing.
    /// `~=` clears the right-hand bits, i.e. `a ~= b` is `a = a & ~b`.
    pub fn assign_operator(&self) -> Option<TokenKind> {
        #[rustfmt::skip]
        let operator = match self {
            TokenKind::PlusAssign       => TokenKind::Plus,
            TokenKind::MinusAssign      => TokenKind::Minus,
            TokenKind::AsteriskAssign   => TokenKind::Asterisk,
            TokenKind::SlashAssign      => TokenKind::Slash,
            TokenKind::SlashSlashAssign => TokenKind::SlashSlash,
            TokenKind::PowerAssign      => TokenKind::Power,
            TokenKind::PercentAssign    => TokenKind::Percent,
            TokenKind::AmpersandAssign  => TokenKind::Ampersand,
            TokenKind::PipeAssign       => TokenKind::Pipe,
            TokenKind::CaretAssign      => TokenKind::Caret,
            TokenKind::TildeAssign      => TokenKind::Tilde,
            TokenKind::ShlAssign        => TokenKind::Shl,
            TokenKind::ShrAssign        => TokenKind::Shr,
            _ => return None,
        };

        Some(operator)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        #[rustfmt::skip]
        let pretty = match self {
            TokenKind::Eof        => "EOF",
            TokenKind::Illegal    => "ILLEGAL",
            TokenKind::Ident      => "identifier",
            TokenKind::Int        => "integer",
            TokenKind::Float      => "float",
            TokenKind::Hex        => "hex integer",
            TokenKind::Octal      => "octal integer",
            TokenKind::Binary     => "binary integer",
            TokenKind::BigInt     => "big integer",
            TokenKind::BigFloat   => "big float",
            TokenKind::Str        => "string",
            TokenKind::StrSingle  => "string",
            TokenKind::Raw        => "raw string",
            TokenKind::Exec       => "exec string",
            TokenKind::Regex      => "regex",
            TokenKind::DocComment => "docstring",
            TokenKind::Assign     => "=",
            TokenKind::Plus       => "+",
            TokenKind::Minus      => "-",
            TokenKind::Asterisk   => "*",
            TokenKind::Slash      => "/",
            TokenKind::SlashSlash => "//",
            TokenKind::Percent    => "%",
            TokenKind::Power      => "**",
            TokenKind::Bang       => "!",
            TokenKind::Tilde      => "~",
            TokenKind::Ampersand  => "&",
            TokenKind::Pipe       => "|",
            TokenKind::Caret      => "^",
            TokenKind::Shl        => "<<",
            TokenKind::Shr        => ">>",
            TokenKind::And        => "and",
            TokenKind::Or         => "or",
            TokenKind::Lt         => "<",
            TokenKind::Gt         => ">",
            TokenKind::Lte        => "<=",
            TokenKind::Gte        => ">=",
            TokenKind::Eq         => "==",
            TokenKind::Neq        => "!=",
            TokenKind::DotDot     => "..",
            TokenKind::DotDotLt   => "..<",
            TokenKind::Dot        => ".",
            TokenKind::Arrow      => "=>",
            TokenKind::PlusAssign       => "+=",
            TokenKind::MinusAssign      => "-=",
            TokenKind::AsteriskAssign   => "*=",
            TokenKind::SlashAssign      => "/=",
            TokenKind::SlashSlashAssign => "//=",
            TokenKind::PowerAssign      => "**=",
            TokenKind::PercentAssign    => "%=",
            TokenKind::AmpersandAssign  => "&=",
            TokenKind::PipeAssign       => "|=",
            TokenKind::CaretAssign      => "^=",
            TokenKind::TildeAssign      => "~=",
            TokenKind::ShlAssign        => "<<=",
            TokenKind::ShrAssign        => ">>=",
            TokenKind::Comma      => ",",
            TokenKind::Colon      => ":",
            TokenKind::Semicolon  => ";",
            TokenKind::LParen     => "(",
            TokenKind::RParen     => ")",
            TokenKind::LBracket   => "[",
            TokenKind::RBracket   => "]",
            TokenKind::LBrace     => "{",
            TokenKind::RBrace     => "}",
            TokenKind::Fun        => "fun",
            TokenKind::Var        => "var",
            TokenKind::Val        => "val",
            TokenKind::True       => "true",
            TokenKind::False      => "false",
            TokenKind::Null       => "null",
            TokenKind::If         => "if",
            TokenKind::Elif       => "elif",
            TokenKind::Else       => "else",
            TokenKind::Return     => "return",
            TokenKind::For        => "for",
            TokenKind::In         => "in",
            TokenKind::NotIn      => "notin",
            TokenKind::Not        => "not",
            TokenKind::Match      => "match",
            TokenKind::Try        => "try",
            TokenKind::Catch      => "catch",
            TokenKind::Finally    => "finally",
            TokenKind::Break      => "break",
            TokenKind::Continue   => "continue",
            TokenKind::Import     => "import",
            TokenKind::Spawn      => "spawn",
            TokenKind::SelfPid    => "self",
            TokenKind::Eval       => "eval",
        };

        write!(f, "{}", pretty)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub literal: String,
    pub pos: Position,
}

impl Token {
    pub fn new<S: Into<String>>(kind: TokenKind, literal: S, pos: Position) -> Token {
        Token {
            kind,
            literal: literal.into(),
            pos,
        }
    }

    pub fn eof(pos: Position) -> Token {
        Token::new(TokenKind::Eof, "", pos)
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Ident
            | TokenKind::Int
            | TokenKind::Float
            | TokenKind::Hex
            | TokenKind::Octal
            | TokenKind::Binary
            | TokenKind::BigInt
            | TokenKind::BigFloat => write!(f, "{}", self.literal),
            TokenKind::Str => write!(f, "\"{}\"", self.literal),
            TokenKind::StrSingle => write!(f, "'{}'", self.literal),
            TokenKind::Raw => write!(f, "\"\"\"{}\"\"\"", self.literal),
            TokenKind::Exec => write!(f, "`{}`", self.literal),
            TokenKind::Regex => write!(f, "r/{}/", self.literal),
            TokenKind::DocComment => write!(f, "##{}", self.literal),
            TokenKind::Illegal => write!(f, "ILLEGAL: {}", self.literal),
            kind => write!(f, "{}", kind),
        }
    }
}

pub fn lookup_ident(ident: &str) -> TokenKind {
    #[rustfmt::skip]
    let kind = match ident {
        "fun"      => TokenKind::Fun,
        "var"      => TokenKind::Var,
        "val"      => TokenKind::Val,
        "true"     => TokenKind::True,
        "false"    => TokenKind::False,
        "null"     => TokenKind::Null,
        "if"       => TokenKind::If,
        "elif"     => TokenKind::Elif,
        "else"     => TokenKind::Else,
        "return"   => TokenKind::Return,
        "for"      => TokenKind::For,
        "in"       => TokenKind::In,
        "notin"    => TokenKind::NotIn,
        "not"      => TokenKind::Not,
        "and"      => TokenKind::And,
        "or"       => TokenKind::Or,
        "match"    => TokenKind::Match,
        "try"      => TokenKind::Try,
        "catch"    => TokenKind::Catch,
        "finally"  => TokenKind::Finally,
        "break"    => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "import"   => TokenKind::Import,
        "spawn"    => TokenKind::Spawn,
        "self"     => TokenKind::SelfPid,
        "eval"     => TokenKind::Eval,
        _          => TokenKind::Ident,
    };

    kind
}
