use crate::lexer::{Lexer, Position, Token, TokenKind};
use crate::parser::ast::*;
use crate::parser::error::{ParseError, Result};

use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    Assign,      // =, +=, ...
    LogicalOr,   // or
    LogicalAnd,  // and
    BitOr,       // |
    BitXor,      // ^
    BitAnd,      // &
    Equals,      // ==
    LessGreater, // >, <
    Shift,       // <<, >>
    Sum,         // +
    Product,     // *
    Exponent,    // **
    Membership,  // in, notin
    Range,       // .., ..<
    Prefix,      // -, not
    Call,        // f()
    Index,       // a[], a.b
}

impl Precedence {
    fn precedence(token: &TokenKind) -> Precedence {
        match token {
            TokenKind::Assign => Precedence::Assign,
            kind if kind.is_compound_assign() => Precedence::Assign,
            TokenKind::Or => Precedence::LogicalOr,
            TokenKind::And => Precedence::LogicalAnd,
            TokenKind::Pipe => Precedence::BitOr,
            TokenKind::Caret => Precedence::BitXor,
            TokenKind::Ampersand => Precedence::BitAnd,
            TokenKind::Eq | TokenKind::Neq => Precedence::Equals,
            TokenKind::Lt | TokenKind::Gt | TokenKind::Lte | TokenKind::Gte => {
                Precedence::LessGreater
            }
            TokenKind::Shl | TokenKind::Shr => Precedence::Shift,
            TokenKind::Plus | TokenKind::Minus => Precedence::Sum,
            TokenKind::Asterisk | TokenKind::Slash | TokenKind::SlashSlash | TokenKind::Percent => {
                Precedence::Product
            }
            TokenKind::Power => Precedence::Exponent,
            TokenKind::In | TokenKind::NotIn => Precedence::Membership,
            TokenKind::DotDot | TokenKind::DotDotLt => Precedence::Range,
            TokenKind::LParen => Precedence::Call,
            TokenKind::LBracket | TokenKind::Dot => Precedence::Index,
            _ => Precedence::Lowest,
        }
    }

    // Binding power used for the right operand; one step lower for the
    // right-associative operators.
    fn right(self) -> Precedence {
        match self {
            Precedence::Exponent => Precedence::Product,
            Precedence::Assign => Precedence::Lowest,
            precedence => precedence,
        }
    }
}

/*
   Invariant:
   (1) A parsing function is only called if `current` contains a valid
     first token according to the associated grammar rule.

   (2) If a parsing function returns Ok(...), the token `current` contains
     the first token `after` the associated grammar rule.

   E.g. parse_var_stmt: var <name> = <expr> ;
   (1) parse_var_stmt will only be called if `current` contains `TokenKind::Var`
   (2) if parse_var_stmt returns successfully `current` contains the first token
       after the optional `TokenKind::Semicolon`
*/
#[derive(Debug)]
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    peek: Token,
    current_docs: Vec<String>,
    peek_docs: Vec<String>,
    prev_line: usize,
}

impl<'a> Parser<'a> {
    pub fn new(lexer: Lexer<'a>) -> Parser<'a> {
        let mut parser = Parser {
            lexer,
            current: Token::eof(Position::default()),
            peek: Token::eof(Position::default()),
            current_docs: vec![],
            peek_docs: vec![],
            prev_line: 0,
        };

        parser.advance();
        parser.advance();

        parser
    }

    fn next_token(&mut self) -> (Token, Vec<String>) {
        let mut docs = vec![];
        loop {
            let token = match self.lexer.next() {
                Some(token) => token,
                None => return (Token::eof(self.current.pos.clone()), docs),
            };
            if token.kind == TokenKind::DocComment {
                docs.push(token.literal);
            } else {
                return (token, docs);
            }
        }
    }

    fn advance(&mut self) {
        self.prev_line = self.current.pos.line;
        let (token, docs) = self.next_token();
        self.current_docs = std::mem::replace(&mut self.peek_docs, docs);
        self.current = std::mem::replace(&mut self.peek, token);
    }

    fn advance_if(&mut self, kind: TokenKind) -> Result<()> {
        if self.current.kind == kind {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(kind.to_string()))
        }
    }

    fn skip(&mut self, kind: TokenKind) -> bool {
        if self.current.kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn unexpected<S: Into<String>>(&self, expected: S) -> ParseError {
        if self.current.kind == TokenKind::Illegal {
            ParseError::lexical(self.current.literal.clone(), self.current.pos.clone())
        } else {
            ParseError::expected(expected, self.current.to_string(), self.current.pos.clone())
        }
    }

    // true if `current` starts a new line, where `(` and `[` begin a new
    // statement instead of a call or an index
    fn on_new_line(&self) -> bool {
        self.current.pos.line > self.prev_line
    }

    fn take_docs(&mut self, docs: &mut Vec<String>) {
        docs.append(&mut self.current_docs);
    }

    fn into_doc(docs: Vec<String>) -> Option<String> {
        if docs.is_empty() {
            None
        } else {
            Some(docs.join("\n"))
        }
    }

    // <stmt>*
    pub fn parse(&mut self) -> std::result::Result<Program, Vec<ParseError>> {
        let mut stmts = vec![];
        let mut errors = vec![];
        let mut docs = vec![];

        while self.current.kind != TokenKind::Eof {
            self.take_docs(&mut docs);
            if self.current.kind == TokenKind::Eof {
                break;
            }
            match self.parse_stmt() {
                Ok(stmt) => stmts.push(stmt),
                Err(err) => {
                    errors.push(err);
                    self.synchronize();
                }
            }
        }
        self.take_docs(&mut docs);

        if errors.is_empty() {
            Ok(Block {
                stmts,
                doc: Parser::into_doc(docs),
            })
        } else {
            Err(errors)
        }
    }

    // skips to the next statement boundary after an error
    fn synchronize(&mut self) {
        let line = self.current.pos.line;
        self.advance();
        while self.current.kind != TokenKind::Eof
            && self.current.kind != TokenKind::Semicolon
            && self.current.pos.line == line
        {
            self.advance();
        }
        self.skip(TokenKind::Semicolon);
    }

    // <var_stmt> | <val_stmt> | <return_stmt> | ... | <expr>
    fn parse_stmt(&mut self) -> Result<Statement> {
        let stmt = match self.current.kind {
            TokenKind::Var | TokenKind::Val => self.parse_binding_stmt()?,
            TokenKind::Return => self.parse_return_stmt()?,
            TokenKind::Break => {
                let pos = self.current.pos.clone();
                self.advance(); // advance over `TokenKind::Break`
                Statement::Break(pos)
            }
            TokenKind::Continue => {
                let pos = self.current.pos.clone();
                self.advance(); // advance over `TokenKind::Continue`
                Statement::Continue(pos)
            }
            TokenKind::Import => self.parse_import_stmt()?,
            TokenKind::Try => self.parse_try_stmt()?,
            TokenKind::Fun if self.peek.kind == TokenKind::Ident => self.parse_function_stmt()?,
            _ => expr_stmt(self.parse_expr(Precedence::Lowest)?),
        };

        self.skip(TokenKind::Semicolon);

        Ok(stmt)
    }

    // <var|val><name><=><expr>
    fn parse_binding_stmt(&mut self) -> Result<Statement> {
        let immutable = self.current.kind == TokenKind::Val;
        let pos = self.current.pos.clone();
        self.advance(); // advance over `TokenKind::Var` / `TokenKind::Val`

        let name = self.parse_name()?;

        let value = if immutable || self.current.kind == TokenKind::Assign {
            self.advance_if(TokenKind::Assign)?; // advance over `TokenKind::Assign`
            self.parse_expr(Precedence::Lowest)?
        } else {
            Expression::Null
        };

        if immutable {
            Ok(Statement::Val { name, value, pos })
        } else {
            Ok(Statement::Var { name, value, pos })
        }
    }

    // <return><expr>?
    fn parse_return_stmt(&mut self) -> Result<Statement> {
        self.advance(); // advance over `TokenKind::Return`

        let expr = match self.current.kind {
            TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof => Expression::Null,
            _ => self.parse_expr(Precedence::Lowest)?,
        };

        Ok(return_stmt(expr))
    }

    // <import><name>(<.><name>)*
    fn parse_import_stmt(&mut self) -> Result<Statement> {
        let pos = self.current.pos.clone();
        self.advance(); // advance over `TokenKind::Import`

        let mut path = vec![self.parse_name()?];
        while self.skip(TokenKind::Dot) {
            path.push(self.parse_name()?);
        }

        Ok(Statement::Import { path, pos })
    }

    // <try><block>(<catch><(><name><)><block>)?(<finally><block>)?
    fn parse_try_stmt(&mut self) -> Result<Statement> {
        self.advance(); // advance over `TokenKind::Try`

        let body = self.parse_block()?;

        let catch = if self.skip(TokenKind::Catch) {
            let name = self.between(TokenKind::LParen, |parser| parser.parse_name(), TokenKind::RParen)?;
            Some((name, self.parse_block()?))
        } else {
            None
        };

        let finally = if self.skip(TokenKind::Finally) {
            Some(self.parse_block()?)
        } else {
            None
        };

        if catch.is_none() && finally.is_none() {
            return Err(self.unexpected("catch"));
        }

        Ok(Statement::Try {
            body,
            catch,
            finally,
        })
    }

    // <fun><name><(><params><)><block>
    fn parse_function_stmt(&mut self) -> Result<Statement> {
        let pos = self.current.pos.clone();
        self.advance(); // advance over `TokenKind::Fun`

        let name = self.parse_name()?;
        let function = self.parse_function_tail()?;

        Ok(Statement::Function {
            name,
            function,
            pos,
        })
    }

    // <{><stmt>*<}>
    fn parse_block(&mut self) -> Result<Block> {
        self.advance_if(TokenKind::LBrace)?; // advance over `TokenKind::LBrace`

        let mut stmts = vec![];
        let mut docs = vec![];

        loop {
            self.take_docs(&mut docs);
            match self.current.kind {
                TokenKind::RBrace => break,
                TokenKind::Eof => return Err(self.unexpected("}")),
                _ => stmts.push(self.parse_stmt()?),
            }
        }

        self.advance(); // advance over `TokenKind::RBrace`

        Ok(Block {
            stmts,
            doc: Parser::into_doc(docs),
        })
    }

    // <name>
    fn parse_name(&mut self) -> Result<String> {
        match self.current.kind {
            TokenKind::Ident => {
                let name = self.current.literal.clone();
                self.advance(); // advance over `TokenKind::Ident`
                Ok(name)
            }
            _ => Err(self.unexpected("name")),
        }
    }

    // <expr>
    fn parse_expr(&mut self, precedence: Precedence) -> Result<Expression> {
        let token = self.current.clone();
        let mut expr = match token.kind {
            TokenKind::Ident => {
                self.advance(); // advance over `TokenKind::Ident`
                Expression::Ident(token.literal, token.pos)
            }
            TokenKind::Int
            | TokenKind::Hex
            | TokenKind::Octal
            | TokenKind::Binary
            | TokenKind::BigInt
            | TokenKind::Float
            | TokenKind::BigFloat => {
                self.advance(); // advance over the numeric literal
                parse_number(&token)?
            }
            TokenKind::True => {
                self.advance(); // advance over `TokenKind::True`
                boolean(true)
            }
            TokenKind::False => {
                self.advance(); // advance over `TokenKind::False`
                boolean(false)
            }
            TokenKind::Null => {
                self.advance(); // advance over `TokenKind::Null`
                Expression::Null
            }
            TokenKind::Str | TokenKind::StrSingle => {
                self.advance(); // advance over the string literal
                Expression::Str {
                    parts: parse_string_parts(&token.literal)
                        .map_err(|message| ParseError::lexical(message, token.pos.clone()))?,
                    pos: token.pos,
                }
            }
            TokenKind::Raw => {
                self.advance(); // advance over `TokenKind::Raw`
                Expression::Raw(token.literal)
            }
            TokenKind::Exec => {
                self.advance(); // advance over `TokenKind::Exec`
                Expression::Exec {
                    parts: parse_string_parts(&token.literal)
                        .map_err(|message| ParseError::lexical(message, token.pos.clone()))?,
                    pos: token.pos,
                }
            }
            TokenKind::Regex => {
                self.advance(); // advance over `TokenKind::Regex`
                Expression::Regex {
                    pattern: token.literal,
                    pos: token.pos,
                }
            }
            TokenKind::Fun => {
                self.advance(); // advance over `TokenKind::Fun`
                Expression::Function(self.parse_function_tail()?)
            }
            TokenKind::Pipe | TokenKind::Or => self.parse_lambda_expr()?,
            TokenKind::LParen => self.parse_group_expr()?,
            TokenKind::LBracket => self.parse_list_expr()?,
            TokenKind::LBrace => self.parse_brace_expr()?,
            TokenKind::Minus | TokenKind::Bang | TokenKind::Not | TokenKind::Tilde => {
                self.parse_prefix_expr()?
            }
            TokenKind::If => self.parse_if_expr()?,
            TokenKind::For => self.parse_for_expr()?,
            TokenKind::Match => self.parse_match_expr()?,
            TokenKind::Spawn => self.parse_spawn_expr()?,
            TokenKind::SelfPid => {
                self.advance(); // advance over `TokenKind::SelfPid`
                self.advance_if(TokenKind::LParen)?;
                self.advance_if(TokenKind::RParen)?;
                Expression::SelfPid
            }
            TokenKind::Eval => {
                self.advance(); // advance over `TokenKind::Eval`
                let source = self.between(
                    TokenKind::LParen,
                    |parser| parser.parse_expr(Precedence::Lowest),
                    TokenKind::RParen,
                )?;
                Expression::Eval {
                    source: Box::new(source),
                    pos: token.pos,
                }
            }
            TokenKind::Shl => {
                return Err(ParseError::syntax(
                    "`<<` is not a prefix operator",
                    token.pos,
                ));
            }
            _ => return Err(self.unexpected("start of an expression")),
        };

        loop {
            let next = Precedence::precedence(&self.current.kind);
            if self.current.kind == TokenKind::Semicolon || precedence >= next {
                break;
            }
            expr = match self.current.kind {
                TokenKind::LParen | TokenKind::LBracket if self.on_new_line() => break,
                TokenKind::LParen => self.parse_call_expr(expr)?,
                TokenKind::LBracket => self.parse_index_expr(expr)?,
                TokenKind::Dot => self.parse_member_expr(expr)?,
                TokenKind::Assign => self.parse_assign_expr(expr)?,
                kind if kind.is_compound_assign() => self.parse_assign_expr(expr)?,
                _ => self.parse_infix_expr(expr)?,
            }
        }

        Ok(expr)
    }

    // <un_op><expr>
    fn parse_prefix_expr(&mut self) -> Result<Expression> {
        let operator = self.current.clone();
        self.advance(); // advance over `operator`

        let right = self.parse_expr(Precedence::Prefix)?;

        Ok(Expression::Prefix {
            operator: operator.kind,
            expr: Box::new(right),
            pos: operator.pos,
        })
    }

    // <bin_op><expr>
    fn parse_infix_expr(&mut self, left: Expression) -> Result<Expression> {
        let operator = self.current.clone();
        self.advance(); // advance over `operator`

        let precedence = Precedence::precedence(&operator.kind).right();

        let right = self.parse_expr(precedence)?;

        Ok(Expression::Infix {
            left: Box::new(left),
            operator: operator.kind,
            right: Box::new(right),
            pos: operator.pos,
        })
    }

    // <target><assign_op><expr>
    fn parse_assign_expr(&mut self, target: Expression) -> Result<Expression> {
        let operator = self.current.clone();

        if !matches!(target, Expression::Ident(..) | Expression::Index { .. }) {
            return Err(ParseError::syntax(
                format!("cannot assign to `{}`", target),
                operator.pos,
            ));
        }

        self.advance(); // advance over `operator`

        let value = self.parse_expr(Precedence::Assign.right())?;

        Ok(Expression::Assign {
            target: Box::new(target),
            operator: operator.kind,
            value: Box::new(value),
            pos: operator.pos,
        })
    }

    // <(><expr><)>
    fn parse_group_expr(&mut self) -> Result<Expression> {
        self.between(
            TokenKind::LParen,
            |parser| parser.parse_expr(Precedence::Lowest),
            TokenKind::RParen,
        )
    }

    // <[><expr>*<]> | <[><expr><for>...<]>
    fn parse_list_expr(&mut self) -> Result<Expression> {
        let pos = self.current.pos.clone();
        self.advance(); // advance over `TokenKind::LBracket`

        if self.skip(TokenKind::RBracket) {
            return Ok(list(vec![]));
        }

        let first = self.parse_expr(Precedence::Lowest)?;

        if self.current.kind == TokenKind::For {
            let expr = self.parse_comprehension(ComprehensionKind::List, first, None, pos)?;
            self.advance_if(TokenKind::RBracket)?; // advance over `TokenKind::RBracket`
            return Ok(expr);
        }

        let mut items = vec![first];
        while self.skip(TokenKind::Comma) {
            if self.current.kind == TokenKind::RBracket {
                break;
            }
            items.push(self.parse_expr(Precedence::Lowest)?);
        }

        self.advance_if(TokenKind::RBracket)?; // advance over `TokenKind::RBracket`

        Ok(list(items))
    }

    // <{><pairs><}> | <{><exprs><}> | <{>...<for>...<}>
    fn parse_brace_expr(&mut self) -> Result<Expression> {
        let pos = self.current.pos.clone();
        self.advance(); // advance over `TokenKind::LBrace`

        if self.skip(TokenKind::RBrace) {
            return Ok(map(vec![]));
        }

        let first = self.parse_expr(Precedence::Lowest)?;

        let expr = if self.skip(TokenKind::Colon) {
            let value = self.parse_expr(Precedence::Lowest)?;
            if self.current.kind == TokenKind::For {
                self.parse_comprehension(ComprehensionKind::Map, first, Some(value), pos)?
            } else {
                let mut pairs = vec![(first, value)];
                while self.skip(TokenKind::Comma) {
                    if self.current.kind == TokenKind::RBrace {
                        break;
                    }
                    pairs.push(self.parse_key_value_pair()?);
                }
                map(pairs)
            }
        } else if self.current.kind == TokenKind::For {
            self.parse_comprehension(ComprehensionKind::Set, first, None, pos)?
        } else {
            let mut items = vec![first];
            while self.skip(TokenKind::Comma) {
                if self.current.kind == TokenKind::RBrace {
                    break;
                }
                items.push(self.parse_expr(Precedence::Lowest)?);
            }
            Expression::Set(items)
        };

        self.advance_if(TokenKind::RBrace)?; // advance over `TokenKind::RBrace`

        Ok(expr)
    }

    // <expr><:><expr>
    fn parse_key_value_pair(&mut self) -> Result<(Expression, Expression)> {
        let key = self.parse_expr(Precedence::Lowest)?;

        self.advance_if(TokenKind::Colon)?; // advance over `TokenKind::Colon`

        let value = self.parse_expr(Precedence::Lowest)?;

        Ok((key, value))
    }

    // <for><(><binding><in><expr><)>(<if><expr>)?
    fn parse_comprehension(
        &mut self,
        kind: ComprehensionKind,
        element: Expression,
        value: Option<Expression>,
        pos: Position,
    ) -> Result<Expression> {
        self.advance(); // advance over `TokenKind::For`

        let cond_pos = self.current.pos.clone();
        let cond = self.parse_expr(Precedence::Lowest)?;
        let (binding, iterable) = split_in(cond).map_err(|_| {
            ParseError::syntax("comprehension needs a `name in iterable` clause", cond_pos)
        })?;

        let guard = if self.skip(TokenKind::If) {
            Some(Box::new(self.parse_expr(Precedence::Lowest)?))
        } else {
            None
        };

        Ok(Expression::Comprehension {
            kind,
            element: Box::new(element),
            value: value.map(Box::new),
            binding,
            iterable: Box::new(iterable),
            guard,
            pos,
        })
    }

    // <[><expr><]>
    fn parse_index_expr(&mut self, expr: Expression) -> Result<Expression> {
        let pos = self.current.pos.clone();
        let idx = self.between(
            TokenKind::LBracket,
            |parser| parser.parse_expr(Precedence::Lowest),
            TokenKind::RBracket,
        )?;

        Ok(Expression::Index {
            left: Box::new(expr),
            index: Box::new(idx),
            pos,
        })
    }

    // <.><name> | <.><name><(><args><)> | <.><int>
    fn parse_member_expr(&mut self, expr: Expression) -> Result<Expression> {
        let pos = self.current.pos.clone();
        self.advance(); // advance over `TokenKind::Dot`

        let member = self.current.clone();
        match member.kind {
            TokenKind::Ident => {
                self.advance(); // advance over `TokenKind::Ident`
                if self.current.kind == TokenKind::LParen && !self.on_new_line() {
                    let (args, named) = self.parse_call_args()?;
                    return Ok(Expression::DotCall {
                        receiver: Box::new(expr),
                        method: member.literal,
                        args,
                        named,
                        pos,
                    });
                }
                Ok(Expression::Index {
                    left: Box::new(expr),
                    index: Box::new(string(member.literal)),
                    pos,
                })
            }
            TokenKind::Int => {
                self.advance(); // advance over `TokenKind::Int`
                Ok(Expression::Index {
                    left: Box::new(expr),
                    index: Box::new(parse_number(&member)?),
                    pos,
                })
            }
            // `a.0.1` lexes the last two components as a float
            TokenKind::Float if member.literal.chars().all(|ch| ch.is_ascii_digit() || ch == '.') => {
                self.advance(); // advance over `TokenKind::Float`
                let mut expr = expr;
                for part in member.literal.split('.') {
                    let n = part.parse::<i64>().map_err(|err| {
                        ParseError::syntax(err.to_string(), member.pos.clone())
                    })?;
                    expr = Expression::Index {
                        left: Box::new(expr),
                        index: Box::new(integer(n)),
                        pos: pos.clone(),
                    };
                }
                Ok(expr)
            }
            _ => Err(self.unexpected("member name")),
        }
    }

    // <if><expr><block>(<else if|elif><expr><block>)*(<else><block>)?
    fn parse_if_expr(&mut self) -> Result<Expression> {
        self.advance(); // advance over `TokenKind::If`

        let cond = self.parse_expr(Precedence::Lowest)?;
        let yes = self.parse_block()?;
        let mut branches = vec![(cond, yes)];
        let mut otherwise = None;

        loop {
            if self.skip(TokenKind::Elif) {
                let cond = self.parse_expr(Precedence::Lowest)?;
                branches.push((cond, self.parse_block()?));
            } else if self.current.kind == TokenKind::Else && self.peek.kind == TokenKind::If {
                self.advance(); // advance over `TokenKind::Else`
                self.advance(); // advance over `TokenKind::If`
                let cond = self.parse_expr(Precedence::Lowest)?;
                branches.push((cond, self.parse_block()?));
            } else if self.skip(TokenKind::Else) {
                otherwise = Some(self.parse_block()?);
                break;
            } else {
                break;
            }
        }

        Ok(Expression::If {
            branches,
            otherwise,
        })
    }

    // <for><expr><block>
    fn parse_for_expr(&mut self) -> Result<Expression> {
        let pos = self.current.pos.clone();
        self.advance(); // advance over `TokenKind::For`

        let cond = self.parse_expr(Precedence::Lowest)?;
        let body = self.parse_block()?;

        match split_in(cond) {
            Ok((binding, iterable)) => Ok(Expression::ForIn {
                binding,
                iterable: Box::new(iterable),
                body,
                pos,
            }),
            Err(cond) => Ok(Expression::For {
                cond: Box::new(cond),
                body,
                pos,
            }),
        }
    }

    // <match><expr>?<{>(<expr><=>><block>,?)*<}>
    fn parse_match_expr(&mut self) -> Result<Expression> {
        let pos = self.current.pos.clone();
        self.advance(); // advance over `TokenKind::Match`

        let scrutinee = if self.current.kind == TokenKind::LBrace {
            None
        } else {
            Some(Box::new(self.parse_expr(Precedence::Lowest)?))
        };

        self.advance_if(TokenKind::LBrace)?; // advance over `TokenKind::LBrace`

        let mut arms = vec![];
        while self.current.kind != TokenKind::RBrace {
            let pattern = self.parse_expr(Precedence::Lowest)?;
            self.advance_if(TokenKind::Arrow)?; // advance over `TokenKind::Arrow`
            let body = self.parse_arm_body()?;
            arms.push(MatchArm { pattern, body });
            self.skip(TokenKind::Comma);
        }

        self.advance(); // advance over `TokenKind::RBrace`

        Ok(Expression::Match {
            scrutinee,
            arms,
            pos,
        })
    }

    // <block> | <expr>
    fn parse_arm_body(&mut self) -> Result<Block> {
        if self.current.kind == TokenKind::LBrace {
            self.parse_block()
        } else {
            Ok(block(vec![expr_stmt(self.parse_expr(Precedence::Lowest)?)]))
        }
    }

    // <(><params><)><block>
    fn parse_function_tail(&mut self) -> Result<FunctionLiteral> {
        let params = self.between(
            TokenKind::LParen,
            |parser| parser.parse_params(Precedence::Lowest),
            TokenKind::RParen,
        )?;

        let body = self.parse_block()?;

        Ok(FunctionLiteral {
            params,
            body: Arc::new(body),
        })
    }

    // <|><params><|><=>><block|expr>
    fn parse_lambda_expr(&mut self) -> Result<Expression> {
        let params = if self.skip(TokenKind::Or) {
            vec![]
        } else {
            self.between(
                TokenKind::Pipe,
                |parser| parser.parse_params(Precedence::BitOr),
                TokenKind::Pipe,
            )?
        };

        self.advance_if(TokenKind::Arrow)?; // advance over `TokenKind::Arrow`

        let body = self.parse_arm_body()?;

        Ok(function(params, body))
    }

    // (<name>(<=><expr>)?(<,><name>(<=><expr>)?)*)?
    fn parse_params(&mut self, default_precedence: Precedence) -> Result<Vec<Param>> {
        let mut params = vec![];

        if self.current.kind != TokenKind::Ident {
            return Ok(params);
        }

        loop {
            let name = self.parse_name()?;
            let default = if self.skip(TokenKind::Assign) {
                Some(self.parse_expr(default_precedence)?)
            } else {
                None
            };
            if params.iter().any(|param: &Param| param.name == name) {
                return Err(ParseError::syntax(
                    format!("duplicate parameter `{}`", name),
                    self.current.pos.clone(),
                ));
            }
            params.push(param(name, default));

            if !self.skip(TokenKind::Comma) {
                return Ok(params);
            }
        }
    }

    // <(><args><)>
    fn parse_call_expr(&mut self, expr: Expression) -> Result<Expression> {
        let pos = self.current.pos.clone();
        let (args, named) = self.parse_call_args()?;

        Ok(Expression::Call {
            function: Box::new(expr),
            args,
            named,
            pos,
        })
    }

    // <(>(<expr>|<name><=><expr>)*<)>
    fn parse_call_args(&mut self) -> Result<(Vec<Expression>, Vec<(String, Expression)>)> {
        let exprs = self.between(
            TokenKind::LParen,
            |parser| parser.parse_exprs(TokenKind::RParen),
            TokenKind::RParen,
        )?;

        let mut args = vec![];
        let mut named = vec![];
        for expr in exprs {
            match expr {
                Expression::Assign {
                    target,
                    operator: TokenKind::Assign,
                    value,
                    pos,
                } => match *target {
                    Expression::Ident(name, _) => named.push((name, *value)),
                    target => {
                        return Err(ParseError::syntax(
                            format!("invalid named argument `{}`", target),
                            pos,
                        ))
                    }
                },
                expr if named.is_empty() => args.push(expr),
                expr => {
                    return Err(ParseError::syntax(
                        format!("positional argument `{}` after named arguments", expr),
                        expr.pos().cloned().unwrap_or_else(|| self.current.pos.clone()),
                    ))
                }
            }
        }

        Ok((args, named))
    }

    // <spawn><(><expr>(<,><expr>)?<)>
    fn parse_spawn_expr(&mut self) -> Result<Expression> {
        let pos = self.current.pos.clone();
        self.advance(); // advance over `TokenKind::Spawn`

        let mut exprs = self.between(
            TokenKind::LParen,
            |parser| parser.parse_exprs(TokenKind::RParen),
            TokenKind::RParen,
        )?;

        let args = match exprs.len() {
            1 => list(vec![]),
            2 => exprs.remove(1),
            n => {
                return Err(ParseError::syntax(
                    format!("spawn takes a function and an argument list, got {} arguments", n),
                    pos,
                ))
            }
        };

        Ok(Expression::Spawn {
            function: Box::new(exprs.remove(0)),
            args: Box::new(args),
            pos,
        })
    }

    // (<expr>(<,><expr>)*<,>?)?
    fn parse_exprs(&mut self, end: TokenKind) -> Result<Vec<Expression>> {
        let mut exprs = vec![];

        while self.current.kind != end {
            exprs.push(self.parse_expr(Precedence::Lowest)?);
            if !self.skip(TokenKind::Comma) {
                break;
            }
        }

        Ok(exprs)
    }

    // <start><f><end>
    fn between<A, F>(&mut self, start: TokenKind, f: F, end: TokenKind) -> Result<A>
    where
        F: Fn(&mut Parser<'a>) -> Result<A>,
    {
        self.advance_if(start)?; // advance over `start`

        let value = f(self)?;

        self.advance_if(end)?; // advance over `end`

        Ok(value)
    }
}

// Splits `name in expr` / `[a, b] in expr` into a loop binding.
fn split_in(cond: Expression) -> std::result::Result<(Binding, Expression), Expression> {
    match cond {
        Expression::Infix {
            left,
            operator: TokenKind::In,
            right,
            pos,
        } => match *left {
            Expression::Ident(name, _) => Ok((Binding::Single(name), *right)),
            Expression::List(ref items) if items.len() == 2 => match (&items[0], &items[1]) {
                (Expression::Ident(first, _), Expression::Ident(second, _)) => {
                    Ok((Binding::Pair(first.clone(), second.clone()), *right))
                }
                _ => Err(Expression::Infix {
                    left,
                    operator: TokenKind::In,
                    right,
                    pos,
                }),
            },
            left => Err(Expression::Infix {
                left: Box::new(left),
                operator: TokenKind::In,
                right,
                pos,
            }),
        },
        cond => Err(cond),
    }
}

// Numeric literals; decimal integers that do not fit `i64` and based
// literals that do not fit `u64` become big integers.
fn parse_number(token: &Token) -> Result<Expression> {
    let literal = token.literal.as_str();
    let malformed = || ParseError::lexical(format!("malformed number: {}", literal), token.pos.clone());

    let radix_of = |literal: &str| -> (u32, String) {
        match literal.get(..2) {
            Some("0x") => (16, literal[2..].to_string()),
            Some("0o") => (8, literal[2..].to_string()),
            Some("0b") => (2, literal[2..].to_string()),
            _ => (10, literal.to_string()),
        }
    };

    match token.kind {
        TokenKind::Int => match literal.parse::<i64>() {
            Ok(n) => Ok(integer(n)),
            Err(_) => BigInt::from_str(literal)
                .map(Expression::BigInteger)
                .map_err(|_| malformed()),
        },
        TokenKind::Hex | TokenKind::Octal | TokenKind::Binary => {
            let (radix, digits) = radix_of(literal);
            match u64::from_str_radix(&digits, radix) {
                Ok(n) => Ok(Expression::UInteger(n)),
                Err(_) => BigInt::parse_bytes(digits.as_bytes(), radix)
                    .map(Expression::BigInteger)
                    .ok_or_else(malformed),
            }
        }
        TokenKind::BigInt => {
            let (radix, digits) = radix_of(literal);
            BigInt::parse_bytes(digits.as_bytes(), radix)
                .map(Expression::BigInteger)
                .ok_or_else(malformed)
        }
        TokenKind::Float => literal
            .parse::<f64>()
            .map(Expression::Float)
            .map_err(|_| malformed()),
        TokenKind::BigFloat => BigDecimal::from_str(literal)
            .map(Expression::BigFloat)
            .map_err(|_| malformed()),
        _ => Err(malformed()),
    }
}

/// Splits a raw string body into text (escapes resolved) and `#{...}` code
/// segments. Code is kept verbatim and parsed when the string is evaluated.
pub fn parse_string_parts(raw: &str) -> std::result::Result<Vec<StringPart>, String> {
    let mut parts = vec![];
    let mut text = String::new();
    let mut chars = raw.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some('n') => text.push('\n'),
                Some('t') => text.push('\t'),
                Some('r') => text.push('\r'),
                Some('0') => text.push('\0'),
                Some('e') => text.push('\u{1b}'),
                Some('u') if chars.peek() == Some(&'{') => {
                    chars.next();
                    let hex: String = chars.by_ref().take_while(|ch| *ch != '}').collect();
                    let ch = u32::from_str_radix(&hex, 16)
                        .ok()
                        .and_then(char::from_u32)
                        .ok_or_else(|| format!("invalid unicode escape `\\u{{{}}}`", hex))?;
                    text.push(ch);
                }
                Some(ch @ ('\\' | '"' | '\'' | '`' | '#')) => text.push(ch),
                Some(ch) => {
                    text.push('\\');
                    text.push(ch);
                }
                None => text.push('\\'),
            },
            '#' if chars.peek() == Some(&'{') => {
                chars.next();
                let mut code = String::new();
                let mut depth = 1;
                let mut quote: Option<char> = None;
                loop {
                    let ch = chars
                        .next()
                        .ok_or_else(|| "unterminated interpolation".to_string())?;
                    match (quote, ch) {
                        (Some(_), '\\') => {
                            code.push(ch);
                            if let Some(escaped) = chars.next() {
                                code.push(escaped);
                            }
                            continue;
                        }
                        (Some(q), ch) if ch == q => quote = None,
                        (Some(_), _) => {}
                        (None, '"' | '\'') => quote = Some(ch),
                        (None, '{') => depth += 1,
                        (None, '}') => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        (None, _) => {}
                    }
                    code.push(ch);
                }
                if !text.is_empty() {
                    parts.push(StringPart::Text(std::mem::take(&mut text)));
                }
                parts.push(StringPart::Code(code));
            }
            ch => text.push(ch),
        }
    }

    if !text.is_empty() {
        parts.push(StringPart::Text(text));
    }

    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn parse(input: &str) -> Program {
        let lexer = Lexer::new(input, "test");
        let mut parser = Parser::new(lexer);
        parser.parse().unwrap()
    }

    #[test_case(
        "var x = 5;",
        block(vec![var_stmt("x", integer(5))]) ;
        "var stmt 01"
    )]
    #[test_case(
        "val y = true",
        block(vec![val_stmt("y", boolean(true))]) ;
        "val stmt 01"
    )]
    #[test_case(
        "return 5;",
        block(vec![return_stmt(integer(5))]) ;
        "return stmt 01"
    )]
    #[test_case(
        "foobar",
        block(vec![expr_stmt(name("foobar"))]) ;
        "name literal"
    )]
    #[test_case(
        "fun(x, y=10) { x + y }",
        block(vec![expr_stmt(
            function(
                vec![param("x", None), param("y", Some(integer(10)))],
                block(vec![expr_stmt(infix(name("x"), TokenKind::Plus, name("y")))])
            )
        )]) ;
        "fn literal with default"
    )]
    #[test_case(
        "|a| => a * 2",
        block(vec![expr_stmt(
            function(
                vec![param("a", None)],
                block(vec![expr_stmt(infix(name("a"), TokenKind::Asterisk, integer(2)))])
            )
        )]) ;
        "lambda"
    )]
    #[test_case(
        "a + b * c",
        block(vec![expr_stmt(
            infix(
                name("a"),
                TokenKind::Plus,
                infix(name("b"), TokenKind::Asterisk, name("c")),
            )
        )]) ;
        "precedence product over sum"
    )]
    #[test_case(
        "2 ** 3 ** 2",
        block(vec![expr_stmt(
            infix(
                integer(2),
                TokenKind::Power,
                infix(integer(3), TokenKind::Power, integer(2)),
            )
        )]) ;
        "power is right associative"
    )]
    #[test_case(
        "a or b and c",
        block(vec![expr_stmt(
            infix(
                name("a"),
                TokenKind::Or,
                infix(name("b"), TokenKind::And, name("c")),
            )
        )]) ;
        "and binds tighter than or"
    )]
    #[test_case(
        "1 | 2 ^ 3 & 4",
        block(vec![expr_stmt(
            infix(
                integer(1),
                TokenKind::Pipe,
                infix(
                    integer(2),
                    TokenKind::Caret,
                    infix(integer(3), TokenKind::Ampersand, integer(4)),
                ),
            )
        )]) ;
        "bitwise precedence"
    )]
    #[test_case(
        "x in 1..10",
        block(vec![expr_stmt(
            infix(
                name("x"),
                TokenKind::In,
                infix(integer(1), TokenKind::DotDot, integer(10)),
            )
        )]) ;
        "range binds tighter than in"
    )]
    #[test_case(
        "-a * b",
        block(vec![expr_stmt(
            infix(prefix(TokenKind::Minus, name("a")), TokenKind::Asterisk, name("b"))
        )]) ;
        "prefix minus"
    )]
    #[test_case(
        "x += 1 + 2",
        block(vec![expr_stmt(
            assign(name("x"), TokenKind::PlusAssign, infix(integer(1), TokenKind::Plus, integer(2)))
        )]) ;
        "compound assignment is lowest"
    )]
    #[test_case(
        "a.b",
        block(vec![expr_stmt(index(name("a"), string("b")))]) ;
        "member access lowers to index"
    )]
    #[test_case(
        "a.0.1",
        block(vec![expr_stmt(index(index(name("a"), integer(0)), integer(1)))]) ;
        "numeric member chain"
    )]
    #[test_case(
        "add(1, 2 * 3)",
        block(vec![expr_stmt(
            call(name("add"), vec![integer(1), infix(integer(2), TokenKind::Asterisk, integer(3))])
        )]) ;
        "call expression"
    )]
    #[test_case(
        "{\"one\": 1, 2: true}",
        block(vec![expr_stmt(map(vec![(string("one"), integer(1)), (integer(2), boolean(true))]))]) ;
        "map literal"
    )]
    #[test_case(
        "if (x < y) { x } else { y }",
        block(vec![expr_stmt(if_expr(
            infix(name("x"), TokenKind::Lt, name("y")),
            block(vec![expr_stmt(name("x"))]),
            Some(block(vec![expr_stmt(name("y"))])),
        ))]) ;
        "if else"
    )]
    fn test(input: &str, expected: Program) {
        assert_eq!(parse(input), expected)
    }

    #[test]
    fn big_literals_promote() {
        assert_eq!(
            parse("9223372036854775808"),
            block(vec![expr_stmt(Expression::BigInteger(
                BigInt::from_str("9223372036854775808").unwrap()
            ))])
        );
        assert_eq!(
            parse("0xFFFFFFFFFFFFFFFF"),
            block(vec![expr_stmt(Expression::UInteger(u64::MAX))])
        );
    }

    #[test]
    fn dot_call_and_named_args() {
        let program = parse("\"x\".startswith(\"y\", strict = true)");
        match &program.stmts[0] {
            Statement::Expr(Expression::DotCall {
                method, args, named, ..
            }) => {
                assert_eq!(method, "startswith");
                assert_eq!(args, &vec![string("y")]);
                assert_eq!(named, &vec![("strict".to_string(), boolean(true))]);
            }
            stmt => panic!("unexpected statement {:?}", stmt),
        }
    }

    #[test]
    fn for_in_binds_pair() {
        let program = parse("for ([k, v] in m) { k }");
        match &program.stmts[0] {
            Statement::Expr(Expression::ForIn { binding, .. }) => {
                assert_eq!(binding, &Binding::Pair("k".to_string(), "v".to_string()))
            }
            stmt => panic!("unexpected statement {:?}", stmt),
        }
    }

    #[test_case("[x * 2 for (x in xs) if x > 1]", ComprehensionKind::List ; "list comprehension")]
    #[test_case("{x for (x in xs)}", ComprehensionKind::Set ; "set comprehension")]
    #[test_case("{k: v for ([k, v] in m)}", ComprehensionKind::Map ; "map comprehension")]
    fn comprehensions(input: &str, expected: ComprehensionKind) {
        match &parse(input).stmts[0] {
            Statement::Expr(Expression::Comprehension { kind, .. }) => assert_eq!(kind, &expected),
            stmt => panic!("unexpected statement {:?}", stmt),
        }
    }

    #[test]
    fn newline_starts_new_statement() {
        let program = parse("var x = y\n(1 + 2)");
        assert_eq!(program.stmts.len(), 2);
    }

    #[test]
    fn docstrings_attach_to_block() {
        let program = parse("fun f() {\n## adds things\n1\n}");
        match &program.stmts[0] {
            Statement::Function { function, .. } => {
                assert_eq!(function.body.doc.as_deref(), Some(" adds things"))
            }
            stmt => panic!("unexpected statement {:?}", stmt),
        }
    }

    #[test]
    fn string_parts() {
        assert_eq!(
            parse_string_parts("Hello #{1 + 2}\\n").unwrap(),
            vec![
                StringPart::Text("Hello ".to_string()),
                StringPart::Code("1 + 2".to_string()),
                StringPart::Text("\n".to_string()),
            ]
        );
        assert_eq!(
            parse_string_parts("#{m[\"}\"]}").unwrap(),
            vec![StringPart::Code("m[\"}\"]".to_string())]
        );
    }

    #[test_case("var = 5" ; "missing name")]
    #[test_case("fun(x, x) {}" ; "duplicate parameter")]
    #[test_case("1 = 2" ; "bad assignment target")]
    #[test_case("try { 1 }" ; "try without catch")]
    #[test_case("[1, 2" ; "missing closer")]
    #[test_case("<< 1" ; "reserved prefix")]
    #[test_case("[x for (xs) ]" ; "comprehension without in")]
    fn errors(input: &str) {
        let lexer = Lexer::new(input, "test");
        let mut parser = Parser::new(lexer);
        assert!(parser.parse().is_err())
    }

    #[test]
    fn errors_accumulate() {
        let lexer = Lexer::new("var = 1;\nval = 2;\n3", "test");
        let mut parser = Parser::new(lexer);
        assert_eq!(parser.parse().unwrap_err().len(), 2)
    }

    #[test_case("var x = 5; x += 1; x" ; "statements")]
    #[test_case("fun f(a, b = 2) { return a ** b; }; f(3)" ; "function statement")]
    #[test_case("[1, 2.5, 0xff, 12n, 1.5n, \"s #{x}\", 'q', \"\"\"raw\"\"\"]" ; "literals")]
    #[test_case("{\"a\": [1, {2, 3}], 4: null}" ; "nested collections")]
    #[test_case("if (a) { 1 } else if (b) { 2 } else { 3 }" ; "if chain")]
    #[test_case("for (i in 1..<10) { if (i == 5) { break; }; continue; }" ; "for in")]
    #[test_case("match x { 1 => { \"one\" }, _ => { \"other\" } }" ; "match")]
    #[test_case("match { a > 1 => \"big\", _ => \"small\" }" ; "match without scrutinee")]
    #[test_case("try { 1 / 0 } catch (e) { e } finally { done = true }" ; "try")]
    #[test_case("[x * 2 for (x in xs) if x > 1]; {k: v for ([k, v] in m)}" ; "comprehensions")]
    #[test_case("\"a\".upper().startswith(\"A\"); a.b.c = 3; a[0][1] -= 2" ; "member chains")]
    #[test_case("var p = spawn(f, [1, 2]); self(); eval(\"1 + 1\"); `echo hi`" ; "process forms")]
    #[test_case("import a.b.c; not x and ~y or -z" ; "import and prefixes")]
    #[test_case("f(1, flag = true); |x, y = 1| => { x + y }" ; "named args and lambda")]
    #[test_case("## module doc\nval k = r/ab+c/" ; "docstring and regex")]
    fn round_trip(input: &str) {
        let first = parse(input);
        let printed = first.to_string();
        let second = parse(&printed);

        assert_eq!(first, second, "printed as: {}", printed)
    }
}
