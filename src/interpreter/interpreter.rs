use crate::builtin;
use crate::error::ErrorKind;
use crate::interpreter::arith;
use crate::interpreter::environment::{AssignError, Env, Snapshot};
use crate::interpreter::error::ErrorObject;
use crate::interpreter::iteration::Cursor;
use crate::interpreter::module;
use crate::interpreter::object::{EnvLink, Function, Locked, Object, OrderedMap, OrderedSet};
use crate::interpreter::process::Runtime;
use crate::lexer::{Position, TokenKind};
use crate::parser::ast::*;
use crate::parser::parse_program;

use std::mem;
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use itertools::Itertools;
use regex::Regex;
use tracing::{debug, warn};

const MAX_DEPTH: usize = 10_000;
const MAX_RANGE: usize = 10_000_000;
const SPAWN_STACK_SIZE: usize = 256 * 1024 * 1024;
const MAILBOX_POLL: Duration = Duration::from_millis(20);

/// Settings for one interpreter instance.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Script being run, if any.
    pub entry: Option<PathBuf>,
    /// Directory that relative imports resolve against.
    pub base_dir: PathBuf,
    /// Arguments after the script name, exposed by `os.args()`.
    pub args: Vec<String>,
}

// Returns early from the enclosing function when `$obj` is an error.
macro_rules! propagate {
    ($obj:expr) => {
        match $obj {
            obj @ Object::Error(_) => return obj,
            obj => obj,
        }
    };
}

// Same as `propagate!` for helpers that return `Result<T, Object>`.
macro_rules! unwrap_or_return {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(error) => return error,
        }
    };
}

/// Tree-walking evaluator. Every evaluation yields an [`Object`]; errors are
/// `Object::Error` values that short-circuit the enclosing evaluation and
/// record the position of each frame they pass through in `trace`.
pub struct Evaluator {
    env: Env,
    runtime: Arc<Runtime>,
    pid: u64,
    mailbox: Option<Receiver<Object>>,
    trace: Vec<Position>,
    base_dir: PathBuf,
    depth: usize,
}

impl Evaluator {
    /// Evaluator for a main program; it owns pid 0 of a fresh runtime.
    pub fn new(config: Config) -> Evaluator {
        let base_dir = config.base_dir.clone();
        let runtime = Arc::new(Runtime::new(config));
        let (pid, mailbox) = runtime.register();

        Evaluator {
            env: Env::empty(),
            runtime,
            pid,
            mailbox: Some(mailbox),
            trace: vec![],
            base_dir,
            depth: 0,
        }
    }

    /// Evaluator sharing this one's runtime but starting from `env`; used
    /// for modules, which have no mailbox of their own.
    pub fn fork(&self, env: Env, base_dir: PathBuf) -> Evaluator {
        Evaluator {
            env,
            runtime: self.runtime.clone(),
            pid: self.pid,
            mailbox: None,
            trace: vec![],
            base_dir,
            depth: 0,
        }
    }

    fn process(runtime: Arc<Runtime>, pid: u64, mailbox: Receiver<Object>, base_dir: PathBuf) -> Evaluator {
        Evaluator {
            env: Env::empty(),
            runtime,
            pid,
            mailbox: Some(mailbox),
            trace: vec![],
            base_dir,
            depth: 0,
        }
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    pub fn pid(&self) -> u64 {
        self.pid
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Positions an uncaught error passed through, innermost first.
    pub fn trace(&self) -> &[Position] {
        &self.trace
    }

    pub fn take_trace(&mut self) -> Vec<Position> {
        mem::take(&mut self.trace)
    }

    /// Blocks on this process' mailbox; `None` when every sender is gone.
    /// The runtime keeps a sender per live process, so the mailbox is
    /// considered closed once no other process is alive and it is drained.
    pub fn receive(&self) -> Option<Object> {
        let mailbox = self.mailbox.as_ref()?;
        loop {
            match mailbox.recv_timeout(MAILBOX_POLL) {
                Ok(msg) => return Some(msg),
                Err(RecvTimeoutError::Disconnected) => return None,
                Err(RecvTimeoutError::Timeout) if self.runtime.is_alone(self.pid) => {
                    return mailbox.try_recv().ok();
                }
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
    }

    /// Parses and evaluates `source` in the current environment.
    pub fn run(&mut self, source: &str, file: &str) -> Object {
        self.runtime.add_source(file, source);

        match parse_program(source, file) {
            Ok(program) => self.eval(&program),
            Err(errors) => {
                self.trace.extend(errors.iter().map(|error| error.pos.clone()));
                let kind = errors.first().map_or(ErrorKind::Syntax, |error| error.kind);
                let message = errors.iter().map(|error| error.message.as_str()).join("\n");
                Object::error(ErrorObject::new(kind, message))
            }
        }
    }

    pub fn eval(&mut self, program: &Program) -> Object {
        match self.eval_stmts(&program.stmts) {
            Object::Return(obj) => *obj,
            Object::Break | Object::Continue => Object::Null,
            obj => obj,
        }
    }

    fn fail(&mut self, error: ErrorObject, pos: &Position) -> Object {
        self.trace.push(pos.clone());
        Object::error(error)
    }

    // Records `pos` as a frame when `obj` is an error.
    fn at(&mut self, obj: Object, pos: &Position) -> Object {
        if obj.is_error() {
            self.trace.push(pos.clone());
        }
        obj
    }

    fn with_env<T, F>(&mut self, env: Env, f: F) -> T
    where
        F: FnOnce(&mut Evaluator) -> T,
    {
        let previous = mem::replace(&mut self.env, env);
        let result = f(self);
        self.env = previous;
        result
    }

    fn eval_block(&mut self, block: &Block) -> Object {
        let env = Env::new(&self.env);
        self.with_env(env, |this| this.eval_stmts(&block.stmts))
    }

    fn eval_stmts(&mut self, stmts: &[Statement]) -> Object {
        let mut result = Object::Null;

        for stmt in stmts {
            result = self.eval_stmt(stmt);
            if matches!(
                result,
                Object::Return(_) | Object::Error(_) | Object::Break | Object::Continue
            ) {
                return result;
            }
        }

        result
    }

    fn eval_stmt(&mut self, stmt: &Statement) -> Object {
        match stmt {
            Statement::Var { name, value, .. } => {
                let value = propagate!(self.eval_expr(value));
                self.env.define(name, named(value, name), false);
                Object::Null
            }
            Statement::Val { name, value, .. } => {
                let value = propagate!(self.eval_expr(value));
                self.env.define(name, named(value, name), true);
                Object::Null
            }
            Statement::Return(expr) => {
                let value = propagate!(self.eval_expr(expr));
                Object::Return(Box::new(value))
            }
            Statement::Break(_) => Object::Break,
            Statement::Continue(_) => Object::Continue,
            Statement::Import { path, pos } => match module::import(self, path) {
                Ok(module) => {
                    let name = path.last().map_or("", String::as_str);
                    self.env.define(name, module, false);
                    Object::Null
                }
                Err(error) => self.fail(error, pos),
            },
            Statement::Try {
                body,
                catch,
                finally,
            } => self.eval_try(body, catch, finally),
            Statement::Function { name, function, .. } => {
                let function = propagate!(self.eval_function(function, Some(name)));
                self.env.define(name, function, false);
                Object::Null
            }
            Statement::Expr(expr) => self.eval_expr(expr),
        }
    }

    fn eval_try(
        &mut self,
        body: &Block,
        catch: &Option<(String, Block)>,
        finally: &Option<Block>,
    ) -> Object {
        let depth = self.trace.len();
        let mut result = self.eval_block(body);

        let caught = match (&result, catch) {
            (Object::Error(error), Some(clause)) if !error.is_exit() => {
                Some((clause, error.message.clone()))
            }
            _ => None,
        };
        if let Some(((name, block), message)) = caught {
            self.trace.truncate(depth);
            let env = Env::new(&self.env);
            env.define(name, Object::string(message), false);
            result = self.with_env(env, |this| this.eval_stmts(&block.stmts));
        }

        if let Some(finally) = finally {
            let after = self.eval_block(finally);
            if matches!(
                after,
                Object::Return(_) | Object::Error(_) | Object::Break | Object::Continue
            ) {
                return after;
            }
        }

        result
    }

    pub(crate) fn eval_expr(&mut self, expr: &Expression) -> Object {
        match expr {
            Expression::Ident(name, pos) => self.eval_ident(name, pos),
            Expression::Integer(n) => Object::Integer(*n),
            Expression::UInteger(n) => Object::UInteger(*n),
            Expression::BigInteger(n) => Object::big_integer(n.clone()),
            Expression::Float(x) => Object::Float(*x),
            Expression::BigFloat(x) => Object::big_float(x.clone()),
            Expression::Boolean(b) => Object::Boolean(*b),
            Expression::Null => Object::Null,
            Expression::Str { parts, pos } => self.eval_string(parts, pos),
            Expression::Raw(text) => Object::string(text),
            Expression::Exec { parts, pos } => {
                let command = propagate!(self.eval_string(parts, pos));
                match builtin::lookup("exec") {
                    Some(exec) => {
                        let output = (exec.func)(self, vec![command]);
                        self.at(output, pos)
                    }
                    None => self.fail(ErrorObject::unknown_name("exec"), pos),
                }
            }
            Expression::Regex { pattern, pos } => match Regex::new(pattern) {
                Ok(regex) => Object::host(self.runtime.next_id(), "REGEX", regex),
                Err(err) => self.fail(
                    ErrorObject::new(ErrorKind::Type, format!("invalid regex: {}", err)),
                    pos,
                ),
            },
            Expression::List(items) => self.eval_exprs(items),
            Expression::Map(pairs) => {
                let mut map = OrderedMap::new();
                for (key, value) in pairs {
                    let key = propagate!(self.eval_expr(key));
                    let value = propagate!(self.eval_expr(value));
                    map.insert(key, value);
                }
                Object::map(map)
            }
            Expression::Set(items) => {
                let mut set = OrderedSet::new();
                for item in items {
                    set.insert(propagate!(self.eval_expr(item)));
                }
                Object::set(set)
            }
            Expression::Comprehension {
                kind,
                element,
                value,
                binding,
                iterable,
                guard,
                pos,
            } => self.eval_comprehension(*kind, element, value.as_deref(), binding, iterable, guard.as_deref(), pos),
            Expression::Prefix { operator, expr, pos } => {
                let obj = propagate!(self.eval_expr(expr));
                match prefix(*operator, &obj) {
                    Some(obj) => obj,
                    None => self.fail(
                        ErrorObject::type_mismatch(format!("{}{}", operator, obj.type_name())),
                        pos,
                    ),
                }
            }
            Expression::Infix {
                left,
                operator,
                right,
                pos,
            } => self.eval_infix(left, *operator, right, pos),
            Expression::Assign {
                target,
                operator,
                value,
                pos,
            } => self.eval_assign(target, *operator, value, pos),
            Expression::If {
                branches,
                otherwise,
            } => {
                for (cond, block) in branches {
                    let cond = propagate!(self.eval_expr(cond));
                    if cond.is_truthy() {
                        return self.eval_block(block);
                    }
                }
                match otherwise {
                    Some(block) => self.eval_block(block),
                    None => Object::Null,
                }
            }
            Expression::For { cond, body, .. } => loop {
                let cond = propagate!(self.eval_expr(cond));
                if !cond.is_truthy() {
                    return Object::Null;
                }
                match self.eval_block(body) {
                    Object::Break => return Object::Null,
                    obj @ (Object::Return(_) | Object::Error(_)) => return obj,
                    _ => {}
                }
            },
            Expression::ForIn {
                binding,
                iterable,
                body,
                pos,
            } => self.eval_for_in(binding, iterable, body, pos),
            Expression::Match {
                scrutinee,
                arms,
                ..
            } => self.eval_match(scrutinee.as_deref(), arms),
            Expression::Function(function) => self.eval_function(function, None),
            Expression::Call {
                function,
                args,
                named,
                pos,
            } => {
                let callee = propagate!(self.eval_expr(function));
                let args = unwrap_or_return!(self.eval_args(args));
                let named = unwrap_or_return!(self.eval_named(named));
                let result = self.apply(callee, args, named);
                self.at(result, pos)
            }
            Expression::DotCall {
                receiver,
                method,
                args,
                named,
                pos,
            } => self.eval_dot_call(receiver, method, args, named, pos),
            Expression::Index { left, index, pos } => {
                let left = propagate!(self.eval_expr(left));
                let index = propagate!(self.eval_expr(index));
                match get_index(&left, &index) {
                    Ok(obj) => obj,
                    Err(error) => self.fail(error, pos),
                }
            }
            Expression::Spawn {
                function,
                args,
                pos,
            } => self.eval_spawn(function, args, pos),
            Expression::SelfPid => Object::Process(self.pid),
            Expression::Eval { source, pos } => {
                let source = propagate!(self.eval_expr(source));
                match source.as_str() {
                    Some(source) => {
                        let source = source.to_string();
                        self.eval_code(&source, pos)
                    }
                    None => self.fail(
                        ErrorObject::wrong_arg_type("eval", 1, "STRING", source.type_name()),
                        pos,
                    ),
                }
            }
        }
    }

    fn eval_ident(&mut self, name: &str, pos: &Position) -> Object {
        if let Some(obj) = self.env.get(name) {
            return obj;
        }
        if let Some(builtin) = builtin::lookup(name) {
            return Object::Builtin(builtin);
        }
        if name == "_" {
            return Object::Ignore;
        }
        self.fail(ErrorObject::unknown_name(name), pos)
    }

    fn eval_exprs(&mut self, exprs: &[Expression]) -> Object {
        let mut items = Vec::with_capacity(exprs.len());
        for expr in exprs {
            items.push(propagate!(self.eval_expr(expr)));
        }
        Object::list(items)
    }

    fn eval_args(&mut self, exprs: &[Expression]) -> std::result::Result<Vec<Object>, Object> {
        exprs
            .iter()
            .map(|expr| match self.eval_expr(expr) {
                obj @ Object::Error(_) => Err(obj),
                obj => Ok(obj),
            })
            .collect()
    }

    fn eval_named(
        &mut self,
        named: &[(String, Expression)],
    ) -> std::result::Result<Vec<(String, Object)>, Object> {
        named
            .iter()
            .map(|(name, expr)| match self.eval_expr(expr) {
                obj @ Object::Error(_) => Err(obj),
                obj => Ok((name.clone(), obj)),
            })
            .collect()
    }

    /// Evaluates `code` as a program in the current environment.
    fn eval_code(&mut self, code: &str, pos: &Position) -> Object {
        match parse_program(code, &pos.file) {
            Ok(program) => {
                let result = match self.eval_stmts(&program.stmts) {
                    Object::Return(obj) => *obj,
                    obj => obj,
                };
                self.at(result, pos)
            }
            Err(errors) => {
                let message = errors.iter().map(|error| error.message.as_str()).join("; ");
                self.fail(
                    ErrorObject::new(ErrorKind::Syntax, format!("in `{}`: {}", code, message)),
                    pos,
                )
            }
        }
    }

    fn eval_string(&mut self, parts: &[StringPart], pos: &Position) -> Object {
        let mut text = String::new();

        for part in parts {
            match part {
                StringPart::Text(part) => text.push_str(part),
                StringPart::Code(code) => {
                    let value = propagate!(self.eval_code(code, pos));
                    text.push_str(&value.to_string());
                }
            }
        }

        Object::string(text)
    }

    fn eval_function(&mut self, function: &FunctionLiteral, name: Option<&str>) -> Object {
        let mut defaults = Vec::with_capacity(function.params.len());
        for param in &function.params {
            defaults.push(match &param.default {
                Some(default) => Some(propagate!(self.eval_expr(default))),
                None => None,
            });
        }

        Object::Function(Arc::new(Function {
            name: name.map(str::to_string),
            params: function.params.iter().map(|param| param.name.clone()).collect(),
            defaults,
            body: function.body.clone(),
            env: EnvLink::Strong(self.env.clone()),
        }))
    }

    fn eval_infix(
        &mut self,
        left: &Expression,
        operator: TokenKind,
        right: &Expression,
        pos: &Position,
    ) -> Object {
        match operator {
            TokenKind::And => {
                let left = propagate!(self.eval_expr(left));
                if !left.is_truthy() {
                    return Object::Boolean(false);
                }
                let right = propagate!(self.eval_expr(right));
                Object::Boolean(right.is_truthy())
            }
            TokenKind::Or => {
                let left = propagate!(self.eval_expr(left));
                if left.is_truthy() {
                    return Object::Boolean(true);
                }
                let right = propagate!(self.eval_expr(right));
                Object::Boolean(right.is_truthy())
            }
            _ => {
                let left = propagate!(self.eval_expr(left));
                let right = propagate!(self.eval_expr(right));
                let result = binary(&left, operator, &right);
                self.at(result, pos)
            }
        }
    }

    fn eval_assign(
        &mut self,
        target: &Expression,
        operator: TokenKind,
        value: &Expression,
        pos: &Position,
    ) -> Object {
        match target {
            Expression::Ident(name, _) => {
                if self.env.is_immutable(name) {
                    return self.fail(ErrorObject::immutable(name), pos);
                }
                let value = propagate!(self.eval_expr(value));
                let value = match operator.assign_operator() {
                    None => named(value, name),
                    Some(operator) => {
                        let current = match self.env.get(name) {
                            Some(current) => current,
                            None => return self.fail(ErrorObject::unknown_name(name), pos),
                        };
                        let result = compound(&current, operator, &value);
                        propagate!(self.at(result, pos))
                    }
                };
                match self.env.assign(name, value.clone()) {
                    Ok(()) => value,
                    Err(AssignError::NotFound) => {
                        self.env.define(name, value.clone(), false);
                        value
                    }
                    Err(AssignError::Immutable) => self.fail(ErrorObject::immutable(name), pos),
                }
            }
            Expression::Index { left, index, .. } => {
                if let Some(root) = root_name(left) {
                    if self.env.is_immutable(root) {
                        return self.fail(ErrorObject::immutable(root), pos);
                    }
                }
                let container = propagate!(self.eval_expr(left));
                let index = propagate!(self.eval_expr(index));
                let value = propagate!(self.eval_expr(value));
                let value = match operator.assign_operator() {
                    None => value,
                    Some(operator) => {
                        let current = match get_index(&container, &index) {
                            Ok(current) => current,
                            Err(error) => return self.fail(error, pos),
                        };
                        let result = compound(&current, operator, &value);
                        propagate!(self.at(result, pos))
                    }
                };
                match set_index(&container, index, value.clone()) {
                    Ok(()) => value,
                    Err(error) => self.fail(error, pos),
                }
            }
            target => self.fail(
                ErrorObject::new(ErrorKind::Syntax, format!("cannot assign to `{}`", target)),
                pos,
            ),
        }
    }

    fn bind(&mut self, binding: &Binding, item: Object, pos: &Position) -> Option<Object> {
        match binding {
            Binding::Single(name) => {
                self.env.define(name, item, false);
                None
            }
            Binding::Pair(first, second) => {
                let pair = match &item {
                    Object::List(items) => {
                        let items = items.read_lock();
                        match items.as_slice() {
                            [a, b] => Some((a.clone(), b.clone())),
                            _ => None,
                        }
                    }
                    _ => None,
                };
                match pair {
                    Some((a, b)) => {
                        self.env.define(first, a, false);
                        self.env.define(second, b, false);
                        None
                    }
                    None => Some(self.fail(
                        ErrorObject::type_mismatch(format!(
                            "cannot destructure {} into {}",
                            item.repr(),
                            binding
                        )),
                        pos,
                    )),
                }
            }
        }
    }

    fn iterate(&mut self, iterable: &Expression, pos: &Position) -> std::result::Result<Cursor, Object> {
        let iterable = match self.eval_expr(iterable) {
            obj @ Object::Error(_) => return Err(obj),
            obj => obj,
        };
        Cursor::new(&iterable).ok_or_else(|| {
            self.fail(
                ErrorObject::type_mismatch(format!("cannot iterate over {}", iterable.type_name())),
                pos,
            )
        })
    }

    // The loop names live in the current scope while the loop runs. Once it
    // ends, however it ends, names it introduced are removed and names it
    // shadowed get their previous binding back.
    fn eval_for_in(
        &mut self,
        binding: &Binding,
        iterable: &Expression,
        body: &Block,
        pos: &Position,
    ) -> Object {
        let cursor = unwrap_or_return!(self.iterate(iterable, pos));
        let shadowed: Vec<(&str, Option<(Object, bool)>)> = binding
            .names()
            .into_iter()
            .map(|name| (name, self.env.local(name)))
            .collect();

        let mut result = Object::Null;
        for item in cursor {
            if let Some(error) = self.bind(binding, item, pos) {
                result = error;
                break;
            }
            match self.eval_block(body) {
                Object::Break => break,
                obj @ (Object::Return(_) | Object::Error(_)) => {
                    result = obj;
                    break;
                }
                _ => {}
            }
        }

        for (name, previous) in shadowed {
            match previous {
                Some((obj, immutable)) => self.env.define(name, obj, immutable),
                None => {
                    self.env.remove(name);
                }
            }
        }

        result
    }

    #[allow(clippy::too_many_arguments)]
    fn eval_comprehension(
        &mut self,
        kind: ComprehensionKind,
        element: &Expression,
        value: Option<&Expression>,
        binding: &Binding,
        iterable: &Expression,
        guard: Option<&Expression>,
        pos: &Position,
    ) -> Object {
        let cursor = unwrap_or_return!(self.iterate(iterable, pos));

        let env = Env::new(&self.env);
        self.with_env(env, |this| {
            let mut items = vec![];
            let mut pairs = OrderedMap::new();

            for item in cursor {
                if let Some(error) = this.bind(binding, item, pos) {
                    return error;
                }
                if let Some(guard) = guard {
                    if !propagate!(this.eval_expr(guard)).is_truthy() {
                        continue;
                    }
                }
                let element = propagate!(this.eval_expr(element));
                match value {
                    Some(value) => {
                        let value = propagate!(this.eval_expr(value));
                        pairs.insert(element, value);
                    }
                    None => items.push(element),
                }
            }

            match kind {
                ComprehensionKind::List => Object::list(items),
                ComprehensionKind::Set => Object::set(items.into_iter().collect()),
                ComprehensionKind::Map => Object::map(pairs),
            }
        })
    }

    fn eval_match(&mut self, scrutinee: Option<&Expression>, arms: &[MatchArm]) -> Object {
        let scrutinee = match scrutinee {
            Some(expr) => Some(propagate!(self.eval_expr(expr))),
            None => None,
        };

        for arm in arms {
            let pattern = propagate!(self.eval_expr(&arm.pattern));
            let matched = match &scrutinee {
                Some(value) => pattern_matches(&pattern, value),
                None => matches!(pattern, Object::Ignore) || pattern.is_truthy(),
            };
            if matched {
                return self.eval_block(&arm.body);
            }
        }

        Object::Null
    }

    fn eval_dot_call(
        &mut self,
        receiver: &Expression,
        method: &str,
        args: &[Expression],
        named: &[(String, Expression)],
        pos: &Position,
    ) -> Object {
        let receiver = propagate!(self.eval_expr(receiver));
        let args = unwrap_or_return!(self.eval_args(args));
        let named = unwrap_or_return!(self.eval_named(named));

        let member = match &receiver {
            Object::Module(module) => match module.env.get(method) {
                Some(member) => Some(member),
                None => {
                    return self.fail(
                        ErrorObject::import(format!(
                            "`{}` not found in module `{}`",
                            method, module.name
                        )),
                        pos,
                    )
                }
            },
            Object::Map(map) => map
                .read_lock()
                .get(&Object::string(method))
                .filter(|value| matches!(value, Object::Function(_) | Object::Builtin(_)))
                .cloned(),
            _ => None,
        };

        let result = match member {
            Some(member) => self.apply(member, args, named),
            None => match builtin::lookup(method) {
                Some(builtin) => {
                    let mut bound = Vec::with_capacity(args.len() + 1);
                    bound.push(receiver);
                    bound.extend(args);
                    self.apply(Object::Builtin(builtin), bound, named)
                }
                None => match get_index(&receiver, &Object::string(method)) {
                    Ok(Object::Null) => Object::error(ErrorObject::new(
                        ErrorKind::Name,
                        format!("{} has no method `{}`", receiver.type_name(), method),
                    )),
                    Ok(callee) => self.apply(callee, args, named),
                    Err(error) => Object::error(error),
                },
            },
        };

        self.at(result, pos)
    }

    /// Calls a function or builtin value.
    pub fn apply(&mut self, callee: Object, args: Vec<Object>, named: Vec<(String, Object)>) -> Object {
        match callee {
            Object::Function(function) => self.apply_function(&function, args, named),
            Object::Builtin(builtin) => {
                if let Some((name, _)) = named.first() {
                    return Object::error(ErrorObject::new(
                        ErrorKind::Argument,
                        format!("`{}` does not take named argument `{}`", builtin.name, name),
                    ));
                }
                (builtin.func)(self, args)
            }
            callee => Object::error(ErrorObject::type_mismatch(format!(
                "not a function: {}",
                callee.type_name()
            ))),
        }
    }

    fn apply_function(
        &mut self,
        function: &Function,
        args: Vec<Object>,
        named: Vec<(String, Object)>,
    ) -> Object {
        let name = function.name.as_deref().unwrap_or("<anonymous>");

        if args.len() > function.params.len() {
            return Object::error(ErrorObject::wrong_number_of_args(
                name,
                args.len(),
                &function.params.len().to_string(),
            ));
        }
        if let Some((unknown, _)) = named
            .iter()
            .find(|(arg, _)| !function.params.contains(arg))
        {
            return Object::error(ErrorObject::new(
                ErrorKind::Argument,
                format!("`{}` has no parameter `{}`", name, unknown),
            ));
        }
        if self.depth >= MAX_DEPTH {
            return Object::error(ErrorObject::runtime("maximum call depth exceeded"));
        }

        let captured = match function.env.upgrade() {
            Some(env) => env,
            None => return Object::error(ErrorObject::runtime("closure outlived its scope")),
        };

        let env = Env::new(&captured);
        let mut args = args.into_iter();
        for (param, default) in function.params.iter().zip(&function.defaults) {
            let positional = args.next();
            let value = named
                .iter()
                .find(|(arg, _)| arg == param)
                .map(|(_, value)| value.clone())
                .or(positional)
                .or_else(|| default.clone());
            match value {
                Some(value) => env.define(param, value, false),
                None => {
                    return Object::error(ErrorObject::new(
                        ErrorKind::Argument,
                        format!("missing argument `{}` to `{}`", param, name),
                    ))
                }
            }
        }

        self.depth += 1;
        let result = self.with_env(env, |this| this.eval_stmts(&function.body.stmts));
        self.depth -= 1;

        match result {
            Object::Return(obj) => *obj,
            Object::Break | Object::Continue => Object::Null,
            obj => obj,
        }
    }

    fn eval_spawn(&mut self, function: &Expression, args: &Expression, pos: &Position) -> Object {
        let function = propagate!(self.eval_expr(function));
        let args = propagate!(self.eval_expr(args));

        if !matches!(function, Object::Function(_) | Object::Builtin(_)) {
            return self.fail(
                ErrorObject::wrong_arg_type("spawn", 1, "FUNCTION", function.type_name()),
                pos,
            );
        }
        let args = match &args {
            Object::List(items) => items.read_lock().clone(),
            args => {
                return self.fail(
                    ErrorObject::wrong_arg_type("spawn", 2, "LIST", args.type_name()),
                    pos,
                )
            }
        };

        let mut snapshot = Snapshot::default();
        let function = snapshot.object(&function);
        let args: Vec<Object> = args.iter().map(|arg| snapshot.object(arg)).collect();

        let (pid, mailbox) = self.runtime.register();
        let runtime = self.runtime.clone();
        let base_dir = self.base_dir.clone();

        let spawned = thread::Builder::new()
            .name(format!("blue-{}", pid))
            .stack_size(SPAWN_STACK_SIZE)
            .spawn(move || {
                let mut evaluator = Evaluator::process(runtime.clone(), pid, mailbox, base_dir);
                if let Object::Error(error) = evaluator.apply(function, args, vec![]) {
                    if !error.is_exit() {
                        warn!(pid, "process failed: {}", error);
                    }
                }
                runtime.unregister(pid);
            });

        match spawned {
            Ok(_) => {
                debug!(pid, "spawned");
                Object::Process(pid)
            }
            Err(err) => {
                self.runtime.unregister(pid);
                self.fail(ErrorObject::runtime(format!("cannot spawn: {}", err)), pos)
            }
        }
    }
}

// Gives an anonymous function the name it is first bound to.
fn named(obj: Object, name: &str) -> Object {
    match obj {
        Object::Function(function) if function.name.is_none() => Object::Function(Arc::new(Function {
            name: Some(name.to_string()),
            ..(*function).clone()
        })),
        obj => obj,
    }
}

fn root_name(expr: &Expression) -> Option<&str> {
    match expr {
        Expression::Ident(name, _) => Some(name),
        Expression::Index { left, .. } => root_name(left),
        _ => None,
    }
}

fn prefix(operator: TokenKind, obj: &Object) -> Option<Object> {
    match operator {
        TokenKind::Not | TokenKind::Bang => Some(Object::Boolean(!obj.is_truthy())),
        TokenKind::Minus => arith::negate(obj),
        TokenKind::Tilde => arith::complement(obj),
        _ => None,
    }
}

fn pattern_matches(pattern: &Object, value: &Object) -> bool {
    match (pattern, value) {
        (Object::Ignore, _) => true,
        (Object::Map(pattern), Object::Map(value)) => {
            let (pattern, value) = (pattern.read_lock().clone(), value.read_lock().clone());
            let matched = pattern.iter().all(|(key, expected)| match value.get(key) {
                Some(actual) => pattern_matches(expected, actual),
                None => false,
            });
            matched
        }
        (Object::List(pattern), Object::List(value)) => {
            let (pattern, value) = (pattern.read_lock().clone(), value.read_lock().clone());
            let matched = pattern.len() == value.len()
                && pattern
                    .iter()
                    .zip(value.iter())
                    .all(|(expected, actual)| pattern_matches(expected, actual));
            matched
        }
        (pattern, value) => arith::equals(pattern, value),
    }
}

// `a op= b`; `~=` clears the bits of `b` in `a`.
fn compound(current: &Object, operator: TokenKind, value: &Object) -> Object {
    if operator == TokenKind::Tilde {
        return match arith::complement(value) {
            Some(mask) => binary(current, TokenKind::Ampersand, &mask),
            None => Object::error(ErrorObject::type_mismatch(format!(
                "{} ~= {}",
                current.type_name(),
                value.type_name()
            ))),
        };
    }
    binary(current, operator, value)
}

fn mismatch(left: &Object, operator: TokenKind, right: &Object) -> Object {
    Object::error(ErrorObject::type_mismatch(format!(
        "{} {} {}",
        left.type_name(),
        operator,
        right.type_name()
    )))
}

/// Binary operators other than the short-circuiting `and` and `or`.
pub fn binary(left: &Object, operator: TokenKind, right: &Object) -> Object {
    match operator {
        TokenKind::Eq => return Object::Boolean(arith::equals(left, right)),
        TokenKind::Neq => return Object::Boolean(!arith::equals(left, right)),
        TokenKind::In => return membership(left, right, false),
        TokenKind::NotIn => return membership(left, right, true),
        TokenKind::DotDot | TokenKind::DotDotLt => return range(left, operator, right),
        TokenKind::Lt | TokenKind::Gt | TokenKind::Lte | TokenKind::Gte => {
            return comparison(left, operator, right)
        }
        _ => {}
    }

    if let Some(result) = arith::binary(left, operator, right) {
        return result;
    }

    match (left, operator, right) {
        (Object::Str(s), TokenKind::Plus, right) => Object::string(format!("{}{}", s, right)),
        (Object::Str(s), TokenKind::Asterisk, n) | (n, TokenKind::Asterisk, Object::Str(s)) => {
            match arith::to_i64(n) {
                Some(n) if n >= 0 => Object::string(s.repeat(n as usize)),
                _ => mismatch(left, operator, right),
            }
        }
        (Object::List(a), TokenKind::Plus, Object::List(b)) => {
            let mut items = a.read_lock().clone();
            items.extend(b.read_lock().iter().cloned());
            Object::list(items)
        }
        (Object::List(a), TokenKind::Asterisk, n) | (n, TokenKind::Asterisk, Object::List(a)) => {
            match arith::to_i64(n) {
                Some(n) if n >= 0 => {
                    let items = a.read_lock().clone();
                    let len = items.len();
                    Object::list(items.into_iter().cycle().take(len * n as usize).collect())
                }
                _ => mismatch(left, operator, right),
            }
        }
        (Object::Map(a), TokenKind::Plus, Object::Map(b)) => {
            let mut map = a.read_lock().clone();
            for (key, value) in b.read_lock().iter() {
                map.insert(key.clone(), value.clone());
            }
            Object::map(map)
        }
        (Object::Set(a), operator, Object::Set(b)) => {
            let (a, b) = (a.read_lock().clone(), b.read_lock().clone());
            let set: OrderedSet = match operator {
                TokenKind::Pipe => a.iter().chain(b.iter()).cloned().collect(),
                TokenKind::Ampersand => a.iter().filter(|item| b.contains(item)).cloned().collect(),
                TokenKind::Minus => a.iter().filter(|item| !b.contains(item)).cloned().collect(),
                TokenKind::Caret => a
                    .iter()
                    .filter(|item| !b.contains(item))
                    .chain(b.iter().filter(|item| !a.contains(item)))
                    .cloned()
                    .collect(),
                _ => return mismatch(left, operator, right),
            };
            Object::set(set)
        }
        _ => mismatch(left, operator, right),
    }
}

fn comparison(left: &Object, operator: TokenKind, right: &Object) -> Object {
    use std::cmp::Ordering;

    let ordering = match (left, right) {
        (Object::Str(a), Object::Str(b)) => Some(a.cmp(b)),
        (Object::Set(a), Object::Set(b)) => {
            let (a, b) = (a.read_lock(), b.read_lock());
            let (sub, sup) = (a.is_subset(&b), b.is_subset(&a));
            let result = match operator {
                TokenKind::Lte => sub,
                TokenKind::Gte => sup,
                TokenKind::Lt => sub && !sup,
                _ => sup && !sub,
            };
            return Object::Boolean(result);
        }
        (left, right) if arith::is_number(left) && arith::is_number(right) => {
            match arith::compare(left, right) {
                Some(ordering) => Some(ordering),
                None => return Object::Boolean(false),
            }
        }
        _ => None,
    };

    match ordering {
        Some(ordering) => Object::Boolean(match operator {
            TokenKind::Lt => ordering == Ordering::Less,
            TokenKind::Gt => ordering == Ordering::Greater,
            TokenKind::Lte => ordering != Ordering::Greater,
            _ => ordering != Ordering::Less,
        }),
        None => mismatch(left, operator, right),
    }
}

fn membership(item: &Object, container: &Object, negate: bool) -> Object {
    let found = match container {
        Object::List(items) => items.read_lock().iter().any(|other| arith::equals(item, other)),
        Object::Set(set) => set.read_lock().contains(item),
        Object::Map(map) => map.read_lock().contains(item),
        Object::Str(text) => match item {
            Object::Str(needle) => text.contains(&**needle),
            _ => return mismatch(item, TokenKind::In, container),
        },
        _ => return mismatch(item, TokenKind::In, container),
    };

    Object::Boolean(found != negate)
}

/// `a..b` counts from `a` to `b` inclusive, `a..<b` stops before `b`;
/// either direction works.
fn range(left: &Object, operator: TokenKind, right: &Object) -> Object {
    let (start, end) = match (arith::to_i64(left), arith::to_i64(right)) {
        (Some(start), Some(end)) => (start, end),
        _ => return mismatch(left, operator, right),
    };

    let exclusive = operator == TokenKind::DotDotLt;
    if exclusive && start == end {
        return Object::error(ErrorObject::new(
            ErrorKind::Arithmetic,
            format!("empty range {}..<{}", start, end),
        ));
    }

    let len = start.abs_diff(end) as usize + usize::from(!exclusive);
    if len > MAX_RANGE {
        return Object::error(ErrorObject::new(
            ErrorKind::Arithmetic,
            format!("range of {} elements is too large", len),
        ));
    }

    let items: Vec<Object> = if start <= end {
        (start..=end).take(len).map(Object::Integer).collect()
    } else {
        (end..=start).rev().take(len).map(Object::Integer).collect()
    };

    Object::list(items)
}

fn list_position(len: usize, index: i64) -> Option<usize> {
    if index < 0 {
        let back = usize::try_from(index.unsigned_abs()).ok()?;
        len.checked_sub(back)
    } else {
        usize::try_from(index).ok()
    }
}

/// `left[index]`; out-of-range positions and missing keys yield `Null`.
pub fn get_index(left: &Object, index: &Object) -> std::result::Result<Object, ErrorObject> {
    match (left, index) {
        (Object::List(items), index) if arith::to_i64(index).is_some() => {
            let items = items.read_lock();
            let position = arith::to_i64(index).and_then(|index| list_position(items.len(), index));
            Ok(position
                .and_then(|position| items.get(position).cloned())
                .unwrap_or(Object::Null))
        }
        (Object::Str(text), index) if arith::to_i64(index).is_some() => {
            let len = text.chars().count();
            let position = arith::to_i64(index).and_then(|index| list_position(len, index));
            Ok(position
                .and_then(|position| text.chars().nth(position))
                .map_or(Object::Null, |ch| Object::string(ch.to_string())))
        }
        (Object::Map(map), key) => Ok(map.read_lock().get(key).cloned().unwrap_or(Object::Null)),
        (Object::Module(module), Object::Str(name)) => module.env.get(name).ok_or_else(|| {
            ErrorObject::import(format!("`{}` not found in module `{}`", name, module.name))
        }),
        (left, index) => Err(ErrorObject::type_mismatch(format!(
            "{}[{}]",
            left.type_name(),
            index.type_name()
        ))),
    }
}

/// `left[index] = value`; writing past the end of a list pads it with `Null`.
pub fn set_index(left: &Object, index: Object, value: Object) -> std::result::Result<(), ErrorObject> {
    match (left, &index) {
        (Object::List(items), index) if arith::to_i64(index).is_some() => {
            let mut items = items.write_lock();
            let len = items.len();
            let position = arith::to_i64(index)
                .and_then(|index| list_position(len, index))
                .ok_or_else(|| {
                    ErrorObject::type_mismatch(format!("list index {} out of range", index))
                })?;
            if position >= len {
                items.resize(position + 1, Object::Null);
            }
            items[position] = value;
            Ok(())
        }
        (Object::Map(map), _) => {
            map.write_lock().insert(index, value);
            Ok(())
        }
        (left, index) => Err(ErrorObject::type_mismatch(format!(
            "{}[{}] = ...",
            left.type_name(),
            index.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::str::FromStr;

    use num_bigint::BigInt;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn run(input: &str) -> Object {
        let mut evaluator = Evaluator::new(Config::default());
        evaluator.run(input, "test")
    }

    fn list(items: Vec<Object>) -> Object {
        Object::list(items)
    }

    #[test_case("5", Object::Integer(5) ; "integer literal")]
    #[test_case("true", Object::Boolean(true) ; "true literal")]
    #[test_case("!true", Object::Boolean(false) ; "prefix bang")]
    #[test_case("not null", Object::Boolean(true) ; "prefix not")]
    #[test_case("--5", Object::Integer(5) ; "prefix minus twice")]
    #[test_case("5 + 5 + 5 + 5 - 10", Object::Integer(10) ; "infix 01")]
    #[test_case("-50 + 100 + -50", Object::Integer(0) ; "infix 02")]
    #[test_case("(5 + 10 * 2 + 15 / 3) * 2 + -10", Object::Integer(50) ; "infix 03")]
    #[test_case("2 ** 3 ** 2", Object::Integer(512) ; "power right assoc")]
    #[test_case("7 // 2", Object::Integer(3) ; "floor division")]
    #[test_case("1 < 2 and 2 < 3", Object::Boolean(true) ; "logical and")]
    #[test_case("false or null", Object::Boolean(false) ; "logical or")]
    #[test_case("1 == 1.0", Object::Boolean(true) ; "numeric equality")]
    #[test_case("[1, [2]] == [1, [2]]", Object::Boolean(true) ; "structural equality")]
    #[test_case("\"ab\" * 3", Object::string("ababab") ; "string repeat")]
    #[test_case("\"b\" in \"abc\"", Object::Boolean(true) ; "substring")]
    #[test_case("3 notin [1, 2]", Object::Boolean(true) ; "notin")]
    #[test_case("1..3", list(vec![Object::Integer(1), Object::Integer(2), Object::Integer(3)]) ; "inclusive range")]
    #[test_case("3..<1", list(vec![Object::Integer(3), Object::Integer(2)]) ; "descending exclusive range")]
    #[test_case("({1, 2} | {2, 3}) == {1, 2, 3}", Object::Boolean(true) ; "set union")]
    #[test_case("{1, 2} <= {1, 2, 3}", Object::Boolean(true) ; "subset")]
    #[test_case("var x = 0xF0; x ~= 0x30; x", Object::UInteger(0xC0) ; "clear bits")]
    #[test_case("if (10 > 1) { 10 } else { 20 }", Object::Integer(10) ; "if else")]
    #[test_case("if (false) { 1 } elif (true) { 2 }", Object::Integer(2) ; "elif")]
    #[test_case("if (false) { 1 }", Object::Null ; "if without else")]
    #[test_case("var x = [1]; x[3] = 4; x", list(vec![Object::Integer(1), Object::Null, Object::Null, Object::Integer(4)]) ; "index set pads")]
    #[test_case("[1, 2, 3][-1]", Object::Integer(3) ; "negative index")]
    #[test_case("[1, 2, 3][5]", Object::Null ; "index out of range")]
    #[test_case("\"añb\"[1]", Object::string("ñ") ; "string index by codepoint")]
    #[test_case("var m = {\"a\": 1}; m.a += 1; m[\"a\"]", Object::Integer(2) ; "member compound assign")]
    #[test_case("var a = [[1, 2], [3, 4]]; a.1.0", Object::Integer(3) ; "numeric member chain")]
    #[test_case("var i = 0; for (i < 5) { i += 1 }; i", Object::Integer(5) ; "conditional loop")]
    #[test_case("var s = 0; for (x in [1, 2, 3]) { if (x == 2) { continue; }; s += x }; s", Object::Integer(4) ; "continue")]
    #[test_case("for (x in [1]) { x }; x", Object::error(ErrorObject::unknown_name("x")) ; "loop name removed")]
    #[test_case("[x * 2 for (x in 1..4) if x % 2 == 0]", list(vec![Object::Integer(4), Object::Integer(8)]) ; "list comprehension")]
    #[test_case("var m = {k: v * 10 for ([k, v] in {\"a\": 1})}; m.a", Object::Integer(10) ; "map comprehension")]
    #[test_case("match 2 { 1 => \"one\", 2 => \"two\", _ => \"many\" }", Object::string("two") ; "match value")]
    #[test_case("match 9 { 1 => \"one\", _ => \"many\" }", Object::string("many") ; "match wildcard")]
    #[test_case("var x = 5; match { x < 3 => \"small\", x < 10 => \"medium\" }", Object::string("medium") ; "match conditions")]
    #[test_case("match ({\"a\": 1, \"b\": 2}) { {\"a\": _, \"b\": 3} => 1, {\"a\": _} => 2 }", Object::Integer(2) ; "match map pattern")]
    #[test_case("match [1, 2] { [1, 3] => 1, [_, 2] => 2, _ => 3 }", Object::Integer(2) ; "match list pattern")]
    #[test_case("fun add(a, b) { a + b }; add(1, 2)", Object::Integer(3) ; "function statement")]
    #[test_case("var f = |x| => x * x; f(4)", Object::Integer(16) ; "lambda")]
    #[test_case("fun f(a, b = 2, c = 3) { [a, b, c] }; f(1, c = 9)", list(vec![Object::Integer(1), Object::Integer(2), Object::Integer(9)]) ; "named override")]
    #[test_case("fun fact(n) { if (n <= 1) { return 1 }; n * fact(n - 1) }; fact(5)", Object::Integer(120) ; "recursion")]
    #[test_case("fun counter() { var n = 0; return fun() { n += 1; n } }; var c = counter(); c(); c()", Object::Integer(2) ; "closure state")]
    #[test_case("\"abc\".upper()", Object::string("ABC") ; "dot call builtin")]
    #[test_case("var o = {\"f\": |x| => x + 1}; o.f(1)", Object::Integer(2) ; "dot call map member")]
    #[test_case("var x = 1; eval(\"x + 1\")", Object::Integer(2) ; "eval string")]
    #[test_case("try { 1 / 0 } catch (e) { e } finally { 5 }", Object::string("Division by zero") ; "try catch finally")]
    #[test_case("try { error(\"boom\") } catch (e) { e }", Object::string("boom") ; "catch user error")]
    #[test_case("try { 1 } catch (e) { 2 }", Object::Integer(1) ; "try without error")]
    #[test_case("var x = 1; try { 1 / 0 } finally { x = 2 }; x", Object::error(ErrorObject::division_by_zero()) ; "finally without catch rethrows")]
    #[test_case("type(self())", Object::string("PROCESS") ; "self pid")]
    fn test(input: &str, expected: Object) {
        assert_eq!(run(input), expected)
    }

    #[test_case("5 + true", ErrorKind::Type ; "type mismatch")]
    #[test_case("foobar", ErrorKind::Name ; "unknown name")]
    #[test_case("val x = 1; x = 2", ErrorKind::Name ; "immutable assign")]
    #[test_case("val xs = [1]; xs[0] = 2", ErrorKind::Name ; "immutable root")]
    #[test_case("x += 1", ErrorKind::Name ; "compound unknown")]
    #[test_case("1 // 0", ErrorKind::Arithmetic ; "floor division by zero")]
    #[test_case("1..<1", ErrorKind::Arithmetic ; "empty exclusive range")]
    #[test_case("fun f(a) { a }; f(1, 2)", ErrorKind::Argument ; "too many args")]
    #[test_case("fun f(a) { a }; f()", ErrorKind::Argument ; "missing arg")]
    #[test_case("len(1, 2)", ErrorKind::Argument ; "builtin arity")]
    #[test_case("\"#{1 +}\"", ErrorKind::Syntax ; "bad interpolation")]
    #[test_case("for (x in 5) {}", ErrorKind::Type ; "not iterable")]
    #[test_case("1u + 1", ErrorKind::Lexical ; "malformed number")]
    #[test_case("0x1 + 1", ErrorKind::Type ; "unsigned with signed")]
    fn test_error(input: &str, expected: ErrorKind) {
        match run(input) {
            Object::Error(error) => assert_eq!(error.kind, expected, "{}", error),
            obj => panic!("expected an error, got {}", obj),
        }
    }

    #[test]
    fn break_stops_loop() {
        let input = "var x = 0; for (i in 1..10) { x += 1; if (i == 5) { break; } }; x";
        assert_eq!(run(input), Object::Integer(5));
    }

    #[test]
    fn overflow_promotes() {
        assert_eq!(
            run("val a = 9223372036854775807; a + 1"),
            Object::big_integer(BigInt::from_str("9223372036854775808").unwrap())
        );
    }

    #[test]
    fn interpolation() {
        assert_eq!(run("\"Hello #{1 + 2}\""), Object::string("Hello 3"));
        assert_eq!(
            run("var m = {\"k\": [1, 2]}; \"#{m[\"k\"]} and #{len(m)}\""),
            Object::string("[1, 2] and 1")
        );
    }

    #[test]
    fn defaults() {
        assert_eq!(
            run("fun f(x, y=10){ x + y }; [f(1), f(1,2)]"),
            list(vec![Object::Integer(11), Object::Integer(3)])
        );
    }

    #[test]
    fn map_iteration_order() {
        let input = "var m = {1: \"a\", 2: \"b\", 3: \"c\"}; var out = \"\"; \
                     for ([k, v] in m) { out = out + k }; out";
        assert_eq!(run(input), Object::string("123"));
    }

    #[test_case("for (i in [1, 2]) { }; i", Object::error(ErrorObject::unknown_name("i")) ; "introduced name removed")]
    #[test_case("var i = 9; for (i in [1, 2]) { }; i", Object::Integer(9) ; "shadowed name restored")]
    #[test_case("var k = 0; for ([k, v] in {1: 2}) { }; [k, v]", Object::error(ErrorObject::unknown_name("v")) ; "pair partly restored")]
    #[test_case("val i = 9; for (i in [1]) { }; i = 3", Object::error(ErrorObject::immutable("i")) ; "restored val stays immutable")]
    fn loop_names_after_loop(input: &str, expected: Object) {
        assert_eq!(run(input), expected);
    }

    #[test]
    fn trace_records_call_frames() {
        let mut evaluator = Evaluator::new(Config::default());
        let result = evaluator.run("fun f() {\n  1 / 0\n}\nf()", "test");

        assert!(result.is_error());
        let lines: Vec<usize> = evaluator.trace().iter().map(|pos| pos.line).collect();
        assert_eq!(lines, vec![2, 4]);
    }

    #[test]
    fn catch_clears_trace() {
        let mut evaluator = Evaluator::new(Config::default());
        evaluator.run("try { 1 / 0 } catch (e) { e }", "test");
        assert!(evaluator.trace().is_empty());
    }

    #[test]
    fn catch_name_is_scoped() {
        assert_eq!(
            run("try { 1 / 0 } catch (e) { e }; e"),
            Object::error(ErrorObject::unknown_name("e"))
        );
    }

    #[test]
    fn spawned_process_replies() {
        let input = "var parent = self(); \
                     spawn(fun(to, n) { send(to, n * 2) }, [parent, 21]); \
                     recv()";
        assert_eq!(run(input), Object::Integer(42));
    }

    #[test_case("recv()", Object::Null ; "lone process")]
    #[test_case("spawn(fun() { 1 }); recv()", Object::Null ; "after child exited")]
    #[test_case(
        "var me = self(); spawn(fun() { send(me, 5) }); [recv(), recv()]",
        list(vec![Object::Integer(5), Object::Null]) ;
        "drained before closing"
    )]
    fn recv_without_senders(input: &str, expected: Object) {
        assert_eq!(run(input), expected);
    }

    #[test]
    fn spawned_process_sees_a_snapshot() {
        let input = "var xs = [1]; var me = self(); \
                     spawn(fun() { xs.push(2); send(me, len(xs)) }); \
                     [recv(), len(xs)]";
        assert_eq!(run(input), list(vec![Object::Integer(2), Object::Integer(1)]));
    }
}
