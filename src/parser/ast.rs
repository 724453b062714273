use crate::lexer::{Position, TokenKind};

use std::fmt;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use itertools::Itertools;
use num_bigint::BigInt;

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Var {
        name: String,
        value: Expression,
        pos: Position,
    },
    Val {
        name: String,
        value: Expression,
        pos: Position,
    },
    Return(Expression),
    Break(Position),
    Continue(Position),
    Import {
        path: Vec<String>,
        pos: Position,
    },
    Try {
        body: Block,
        catch: Option<(String, Block)>,
        finally: Option<Block>,
    },
    Function {
        name: String,
        function: FunctionLiteral,
        pos: Position,
    },
    Expr(Expression),
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Var { name, value, .. } => write!(f, "var {} = {};", name, value),
            Statement::Val { name, value, .. } => write!(f, "val {} = {};", name, value),
            Statement::Return(expr) => write!(f, "return {};", expr),
            Statement::Break(_) => write!(f, "break;"),
            Statement::Continue(_) => write!(f, "continue;"),
            Statement::Import { path, .. } => write!(f, "import {};", path.join(".")),
            Statement::Try {
                body,
                catch,
                finally,
            } => {
                write!(f, "try {}", braced(body))?;
                if let Some((name, block)) = catch {
                    write!(f, " catch ({}) {}", name, braced(block))?;
                }
                if let Some(block) = finally {
                    write!(f, " finally {}", braced(block))?;
                }
                write!(f, ";")
            }
            Statement::Function { name, function, .. } => {
                write!(f, "fun {}({}) {};", name, function.params.iter().join(", "), braced(&function.body))
            }
            Statement::Expr(expr) => write!(f, "{};", expr),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub stmts: Vec<Statement>,
    pub doc: Option<String>,
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(doc) = &self.doc {
            for line in doc.lines() {
                writeln!(f, "##{}", line)?;
            }
        }
        write!(f, "{}", self.stmts.iter().join(" "))
    }
}

fn braced(block: &Block) -> String {
    if block.doc.is_some() {
        format!("{{\n{}\n}}", block)
    } else {
        format!("{{ {} }}", block)
    }
}

pub type Program = Block;

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Expression>,
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.default {
            Some(default) => write!(f, "{} = {}", self.name, default),
            None => write!(f, "{}", self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionLiteral {
    pub params: Vec<Param>,
    pub body: Arc<Block>,
}

/// One or two loop variables on the left of `in`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Single(String),
    Pair(String, String),
}

impl Binding {
    pub fn names(&self) -> Vec<&str> {
        match self {
            Binding::Single(name) => vec![name],
            Binding::Pair(first, second) => vec![first, second],
        }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Single(name) => write!(f, "{}", name),
            Binding::Pair(first, second) => write!(f, "[{}, {}]", first, second),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StringPart {
    Text(String),
    Code(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComprehensionKind {
    List,
    Set,
    Map,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchArm {
    pub pattern: Expression,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Ident(String, Position),
    Integer(i64),
    UInteger(u64),
    BigInteger(BigInt),
    Float(f64),
    BigFloat(BigDecimal),
    Boolean(bool),
    Null,
    Str {
        parts: Vec<StringPart>,
        pos: Position,
    },
    Raw(String),
    Exec {
        parts: Vec<StringPart>,
        pos: Position,
    },
    Regex {
        pattern: String,
        pos: Position,
    },
    List(Vec<Expression>),
    Map(Vec<(Expression, Expression)>),
    Set(Vec<Expression>),
    Comprehension {
        kind: ComprehensionKind,
        element: Box<Expression>,
        value: Option<Box<Expression>>,
        binding: Binding,
        iterable: Box<Expression>,
        guard: Option<Box<Expression>>,
        pos: Position,
    },
    Prefix {
        operator: TokenKind,
        expr: Box<Expression>,
        pos: Position,
    },
    Infix {
        left: Box<Expression>,
        operator: TokenKind,
        right: Box<Expression>,
        pos: Position,
    },
    Assign {
        target: Box<Expression>,
        operator: TokenKind,
        value: Box<Expression>,
        pos: Position,
    },
    If {
        branches: Vec<(Expression, Block)>,
        otherwise: Option<Block>,
    },
    For {
        cond: Box<Expression>,
        body: Block,
        pos: Position,
    },
    ForIn {
        binding: Binding,
        iterable: Box<Expression>,
        body: Block,
        pos: Position,
    },
    Match {
        scrutinee: Option<Box<Expression>>,
        arms: Vec<MatchArm>,
        pos: Position,
    },
    Function(FunctionLiteral),
    Call {
        function: Box<Expression>,
        args: Vec<Expression>,
        named: Vec<(String, Expression)>,
        pos: Position,
    },
    DotCall {
        receiver: Box<Expression>,
        method: String,
        args: Vec<Expression>,
        named: Vec<(String, Expression)>,
        pos: Position,
    },
    Index {
        left: Box<Expression>,
        index: Box<Expression>,
        pos: Position,
    },
    Spawn {
        function: Box<Expression>,
        args: Box<Expression>,
        pos: Position,
    },
    SelfPid,
    Eval {
        source: Box<Expression>,
        pos: Position,
    },
}

impl Expression {
    pub fn pos(&self) -> Option<&Position> {
        match self {
            Expression::Ident(_, pos)
            | Expression::Str { pos, .. }
            | Expression::Exec { pos, .. }
            | Expression::Regex { pos, .. }
            | Expression::Comprehension { pos, .. }
            | Expression::Prefix { pos, .. }
            | Expression::Infix { pos, .. }
            | Expression::Assign { pos, .. }
            | Expression::For { pos, .. }
            | Expression::ForIn { pos, .. }
            | Expression::Match { pos, .. }
            | Expression::Call { pos, .. }
            | Expression::DotCall { pos, .. }
            | Expression::Index { pos, .. }
            | Expression::Spawn { pos, .. }
            | Expression::Eval { pos, .. } => Some(pos),
            _ => None,
        }
    }
}

fn escape_text(text: &str, quote: char) -> String {
    let mut result = String::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\t' => result.push_str("\\t"),
            '\r' => result.push_str("\\r"),
            '\0' => result.push_str("\\0"),
            '#' if chars.peek() == Some(&'{') => result.push_str("\\#"),
            ch if ch == quote => {
                result.push('\\');
                result.push(ch);
            }
            ch => result.push(ch),
        }
    }

    result
}

fn fmt_parts(parts: &[StringPart], quote: char) -> String {
    parts
        .iter()
        .map(|part| match part {
            StringPart::Text(text) => escape_text(text, quote),
            StringPart::Code(code) => format!("#{{{}}}", code),
        })
        .collect()
}

fn fmt_call_args(args: &[Expression], named: &[(String, Expression)]) -> String {
    args.iter()
        .map(|arg| arg.to_string())
        .chain(named.iter().map(|(name, value)| format!("{} = {}", name, value)))
        .join(", ")
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Ident(name, _) => write!(f, "{}", name),
            Expression::Integer(n) => write!(f, "{}", n),
            Expression::UInteger(n) => write!(f, "0x{:x}", n),
            Expression::BigInteger(n) => write!(f, "{}n", n),
            Expression::Float(x) => write!(f, "{:?}", x),
            Expression::BigFloat(x) => write!(f, "{}n", x),
            Expression::Boolean(b) => write!(f, "{}", b),
            Expression::Null => write!(f, "null"),
            Expression::Str { parts, .. } => write!(f, "\"{}\"", fmt_parts(parts, '"')),
            Expression::Raw(text) => write!(f, "\"\"\"{}\"\"\"", text),
            Expression::Exec { parts, .. } => write!(f, "`{}`", fmt_parts(parts, '`')),
            Expression::Regex { pattern, .. } => write!(f, "r/{}/", pattern),
            Expression::List(items) => write!(f, "[{}]", items.iter().join(", ")),
            Expression::Map(pairs) => write!(
                f,
                "{{{}}}",
                pairs
                    .iter()
                    .map(|(key, value)| format!("{}: {}", key, value))
                    .join(", ")
            ),
            Expression::Set(items) => write!(f, "{{{}}}", items.iter().join(", ")),
            Expression::Comprehension {
                kind,
                element,
                value,
                binding,
                iterable,
                guard,
                ..
            } => {
                let head = match value {
                    Some(value) => format!("{}: {}", element, value),
                    None => element.to_string(),
                };
                let guard = guard
                    .as_ref()
                    .map_or(String::new(), |guard| format!(" if {}", guard));
                let body = format!("{} for ({} in {}){}", head, binding, iterable, guard);
                match kind {
                    ComprehensionKind::List => write!(f, "[{}]", body),
                    ComprehensionKind::Set | ComprehensionKind::Map => write!(f, "{{{}}}", body),
                }
            }
            Expression::Prefix { operator, expr, .. } => match operator {
                TokenKind::Not => write!(f, "(not {})", expr),
                operator => write!(f, "({}{})", operator, expr),
            },
            Expression::Infix {
                left,
                operator,
                right,
                ..
            } => write!(f, "({} {} {})", left, operator, right),
            Expression::Assign {
                target,
                operator,
                value,
                ..
            } => write!(f, "{} {} {}", target, operator, value),
            Expression::If {
                branches,
                otherwise,
            } => {
                let branches = branches
                    .iter()
                    .map(|(cond, block)| format!("if ({}) {}", cond, braced(block)))
                    .join(" else ");
                let otherwise = otherwise
                    .as_ref()
                    .map_or(String::new(), |block| format!(" else {}", braced(block)));
                write!(f, "{}{}", branches, otherwise)
            }
            Expression::For { cond, body, .. } => write!(f, "for ({}) {}", cond, braced(body)),
            Expression::ForIn {
                binding,
                iterable,
                body,
                ..
            } => write!(f, "for ({} in {}) {}", binding, iterable, braced(body)),
            Expression::Match {
                scrutinee, arms, ..
            } => {
                let scrutinee = scrutinee
                    .as_ref()
                    .map_or(String::new(), |expr| format!("({}) ", expr));
                let arms = arms
                    .iter()
                    .map(|arm| format!("{} => {}", arm.pattern, braced(&arm.body)))
                    .join(", ");
                write!(f, "match {}{{ {} }}", scrutinee, arms)
            }
            Expression::Function(function) => write!(
                f,
                "fun({}) {}",
                function.params.iter().join(", "),
                braced(&function.body)
            ),
            Expression::Call {
                function,
                args,
                named,
                ..
            } => write!(f, "{}({})", function, fmt_call_args(args, named)),
            Expression::DotCall {
                receiver,
                method,
                args,
                named,
                ..
            } => write!(f, "{}.{}({})", receiver, method, fmt_call_args(args, named)),
            Expression::Index { left, index, .. } => write!(f, "({}[{}])", left, index),
            Expression::Spawn { function, args, .. } => write!(f, "spawn({}, {})", function, args),
            Expression::SelfPid => write!(f, "self()"),
            Expression::Eval { source, .. } => write!(f, "eval({})", source),
        }
    }
}

// Statement
pub fn var_stmt<S: Into<String>>(name: S, value: Expression) -> Statement {
    Statement::Var {
        name: name.into(),
        value,
        pos: Position::default(),
    }
}

pub fn val_stmt<S: Into<String>>(name: S, value: Expression) -> Statement {
    Statement::Val {
        name: name.into(),
        value,
        pos: Position::default(),
    }
}

pub fn return_stmt(value: Expression) -> Statement {
    Statement::Return(value)
}

pub fn expr_stmt(value: Expression) -> Statement {
    Statement::Expr(value)
}

// Block / Program
pub fn block(stmts: Vec<Statement>) -> Block {
    Block { stmts, doc: None }
}

// Expression
pub fn name<S: Into<String>>(name: S) -> Expression {
    Expression::Ident(name.into(), Position::default())
}

pub fn integer(n: i64) -> Expression {
    Expression::Integer(n)
}

pub fn boolean(b: bool) -> Expression {
    Expression::Boolean(b)
}

pub fn string<S: Into<String>>(text: S) -> Expression {
    Expression::Str {
        parts: vec![StringPart::Text(text.into())],
        pos: Position::default(),
    }
}

pub fn prefix(operator: TokenKind, expr: Expression) -> Expression {
    Expression::Prefix {
        operator,
        expr: Box::new(expr),
        pos: Position::default(),
    }
}

pub fn infix(left: Expression, operator: TokenKind, right: Expression) -> Expression {
    Expression::Infix {
        left: Box::new(left),
        operator,
        right: Box::new(right),
        pos: Position::default(),
    }
}

pub fn assign(target: Expression, operator: TokenKind, value: Expression) -> Expression {
    Expression::Assign {
        target: Box::new(target),
        operator,
        value: Box::new(value),
        pos: Position::default(),
    }
}

pub fn if_expr(cond: Expression, yes: Block, no: Option<Block>) -> Expression {
    Expression::If {
        branches: vec![(cond, yes)],
        otherwise: no,
    }
}

pub fn function(params: Vec<Param>, body: Block) -> Expression {
    Expression::Function(FunctionLiteral {
        params,
        body: Arc::new(body),
    })
}

pub fn param<S: Into<String>>(name: S, default: Option<Expression>) -> Param {
    Param {
        name: name.into(),
        default,
    }
}

pub fn call(function: Expression, args: Vec<Expression>) -> Expression {
    Expression::Call {
        function: Box::new(function),
        args,
        named: vec![],
        pos: Position::default(),
    }
}

pub fn index(left: Expression, index: Expression) -> Expression {
    Expression::Index {
        left: Box::new(left),
        index: Box::new(index),
        pos: Position::default(),
    }
}

pub fn list(items: Vec<Expression>) -> Expression {
    Expression::List(items)
}

pub fn map(pairs: Vec<(Expression, Expression)>) -> Expression {
    Expression::Map(pairs)
}
