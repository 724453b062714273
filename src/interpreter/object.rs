use crate::interpreter::environment::{Env, WeakEnv};
use crate::interpreter::error::ErrorObject;
use crate::interpreter::hash::HashKey;
use crate::interpreter::Evaluator;
use crate::parser::ast::Block;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bigdecimal::BigDecimal;
use itertools::Itertools;
use num_bigint::BigInt;

/// Lock access that survives a panicked holder; the data behind every lock
/// in the interpreter is left consistent between statements.
pub(crate) trait Locked<T> {
    fn read_lock(&self) -> RwLockReadGuard<'_, T>;
    fn write_lock(&self) -> RwLockWriteGuard<'_, T>;
}

impl<T> Locked<T> for RwLock<T> {
    fn read_lock(&self) -> RwLockReadGuard<'_, T> {
        self.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, T> {
        self.write().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub type BuiltinFn = fn(&mut Evaluator, Vec<Object>) -> Object;

/// A host function exposed to scripts under `name`.
pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
    pub help: &'static str,
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Builtin({})", self.name)
    }
}

/// Environment a closure was created in. A closure bound inside the very
/// scope it captures keeps only a weak link there, the scope owns it.
#[derive(Debug, Clone)]
pub enum EnvLink {
    Strong(Env),
    Weak(WeakEnv),
}

impl EnvLink {
    pub fn upgrade(&self) -> Option<Env> {
        match self {
            EnvLink::Strong(env) => Some(env.clone()),
            EnvLink::Weak(env) => env.upgrade(),
        }
    }

    pub fn points_to(&self, env: &Env) -> bool {
        match self {
            EnvLink::Strong(link) => link.ptr_eq(env),
            EnvLink::Weak(link) => link.ptr_eq(env),
        }
    }

    pub fn addr(&self) -> usize {
        match self {
            EnvLink::Strong(env) => env.addr(),
            EnvLink::Weak(env) => env.addr(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub defaults: Vec<Option<Object>>,
    pub body: Arc<Block>,
    pub env: EnvLink,
}

impl Function {
    pub fn with_env(&self, env: EnvLink) -> Function {
        Function {
            env,
            ..self.clone()
        }
    }

    pub fn doc(&self) -> Option<&str> {
        self.body.doc.as_deref()
    }
}

#[derive(Debug)]
pub struct Module {
    pub name: String,
    pub env: Env,
}

/// Opaque value owned by host code: compiled regexes, subscriptions and
/// whatever a host table hands out.
pub struct HostObject {
    pub id: u64,
    pub type_name: &'static str,
    pub value: Arc<dyn Any + Send + Sync>,
}

impl HostObject {
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostObject({}#{})", self.type_name, self.id)
    }
}

/// Insertion-ordered map keyed by structural hash.
#[derive(Debug, Clone, Default)]
pub struct OrderedMap {
    pairs: HashMap<HashKey, (Object, Object)>,
    order: Vec<HashKey>,
}

impl OrderedMap {
    pub fn new() -> OrderedMap {
        OrderedMap::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, key: &Object) -> Option<&Object> {
        self.pairs.get(&key.hash_key()).map(|(_, value)| value)
    }

    pub fn contains(&self, key: &Object) -> bool {
        self.pairs.contains_key(&key.hash_key())
    }

    /// Replacing an existing key keeps its position.
    pub fn insert(&mut self, key: Object, value: Object) {
        let hash = key.hash_key();
        if self.pairs.insert(hash, (key, value)).is_none() {
            self.order.push(hash);
        }
    }

    pub fn remove(&mut self, key: &Object) -> Option<Object> {
        let hash = key.hash_key();
        let (_, value) = self.pairs.remove(&hash)?;
        self.order.retain(|other| *other != hash);
        Some(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Object, &Object)> {
        self.order
            .iter()
            .filter_map(|hash| self.pairs.get(hash))
            .map(|(key, value)| (key, value))
    }

    pub fn keys(&self) -> Vec<Object> {
        self.iter().map(|(key, _)| key.clone()).collect()
    }

    pub fn values(&self) -> Vec<Object> {
        self.iter().map(|(_, value)| value.clone()).collect()
    }

    pub fn entry_at(&self, index: usize) -> Option<(Object, Object)> {
        let hash = self.order.get(index)?;
        self.pairs.get(hash).cloned()
    }
}

impl FromIterator<(Object, Object)> for OrderedMap {
    fn from_iter<I: IntoIterator<Item = (Object, Object)>>(iter: I) -> Self {
        let mut map = OrderedMap::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

/// Insertion-ordered set keyed by structural hash.
#[derive(Debug, Clone, Default)]
pub struct OrderedSet {
    items: HashMap<HashKey, Object>,
    order: Vec<HashKey>,
}

impl OrderedSet {
    pub fn new() -> OrderedSet {
        OrderedSet::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, item: &Object) -> bool {
        self.items.contains_key(&item.hash_key())
    }

    pub fn insert(&mut self, item: Object) -> bool {
        let hash = item.hash_key();
        if self.items.contains_key(&hash) {
            return false;
        }
        self.items.insert(hash, item);
        self.order.push(hash);
        true
    }

    pub fn remove(&mut self, item: &Object) -> bool {
        let hash = item.hash_key();
        if self.items.remove(&hash).is_some() {
            self.order.retain(|other| *other != hash);
            true
        } else {
            false
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Object> {
        self.order.iter().filter_map(|hash| self.items.get(hash))
    }

    pub fn is_subset(&self, other: &OrderedSet) -> bool {
        self.order.iter().all(|hash| other.items.contains_key(hash))
    }
}

impl FromIterator<Object> for OrderedSet {
    fn from_iter<I: IntoIterator<Item = Object>>(iter: I) -> Self {
        let mut set = OrderedSet::new();
        for item in iter {
            set.insert(item);
        }
        set
    }
}

#[derive(Debug, Clone)]
pub enum Object {
    Integer(i64),
    UInteger(u64),
    BigInteger(Arc<BigInt>),
    Float(f64),
    BigFloat(Arc<BigDecimal>),
    Boolean(bool),
    Null,
    Ignore,
    Str(Arc<str>),
    List(Arc<RwLock<Vec<Object>>>),
    Map(Arc<RwLock<OrderedMap>>),
    Set(Arc<RwLock<OrderedSet>>),
    Function(Arc<Function>),
    Builtin(&'static Builtin),
    Return(Box<Object>),
    Break,
    Continue,
    Error(Arc<ErrorObject>),
    Module(Arc<Module>),
    Process(u64),
    Host(Arc<HostObject>),
}

impl Object {
    pub fn string<S: AsRef<str>>(text: S) -> Object {
        Object::Str(Arc::from(text.as_ref()))
    }

    pub fn list(items: Vec<Object>) -> Object {
        Object::List(Arc::new(RwLock::new(items)))
    }

    pub fn map(map: OrderedMap) -> Object {
        Object::Map(Arc::new(RwLock::new(map)))
    }

    pub fn set(set: OrderedSet) -> Object {
        Object::Set(Arc::new(RwLock::new(set)))
    }

    pub fn big_integer(n: BigInt) -> Object {
        Object::BigInteger(Arc::new(n))
    }

    pub fn big_float(x: BigDecimal) -> Object {
        Object::BigFloat(Arc::new(x))
    }

    pub fn error(error: ErrorObject) -> Object {
        Object::Error(Arc::new(error))
    }

    pub fn host<T: Any + Send + Sync>(id: u64, type_name: &'static str, value: T) -> Object {
        Object::Host(Arc::new(HostObject {
            id,
            type_name,
            value: Arc::new(value),
        }))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Object::Error(_))
    }

    pub fn is_truthy(&self) -> bool {
        !matches!(self, Object::Null | Object::Boolean(false))
    }

    pub fn type_name(&self) -> &'static str {
        #[rustfmt::skip]
        let name = match self {
            Object::Integer(_)    => "INTEGER",
            Object::UInteger(_)   => "UINTEGER",
            Object::BigInteger(_) => "BIG_INTEGER",
            Object::Float(_)      => "FLOAT",
            Object::BigFloat(_)   => "BIG_FLOAT",
            Object::Boolean(_)    => "BOOLEAN",
            Object::Null          => "NULL",
            Object::Ignore        => "IGNORE",
            Object::Str(_)        => "STRING",
            Object::List(_)       => "LIST",
            Object::Map(_)        => "MAP",
            Object::Set(_)        => "SET",
            Object::Function(_)   => "FUNCTION",
            Object::Builtin(_)    => "BUILTIN",
            Object::Return(_)     => "RETURN",
            Object::Break         => "BREAK",
            Object::Continue      => "CONTINUE",
            Object::Error(_)      => "ERROR",
            Object::Module(_)     => "MODULE",
            Object::Process(_)    => "PROCESS",
            Object::Host(host)    => host.type_name,
        };

        name
    }

    /// Form used inside collections and by the REPL: strings are quoted.
    pub fn repr(&self) -> String {
        match self {
            Object::Str(text) => format!("{:?}", text),
            obj => obj.to_string(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Object::Str(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::Integer(n) => write!(f, "{}", n),
            Object::UInteger(n) => write!(f, "0x{:x}", n),
            Object::BigInteger(n) => write!(f, "{}", n),
            Object::Float(x) => write!(f, "{:?}", x),
            Object::BigFloat(x) => write!(f, "{}", x),
            Object::Boolean(b) => write!(f, "{}", b),
            Object::Null => write!(f, "null"),
            Object::Ignore => write!(f, "_"),
            Object::Str(text) => write!(f, "{}", text),
            Object::List(items) => {
                write!(f, "[{}]", items.read_lock().iter().map(Object::repr).join(", "))
            }
            Object::Map(map) => write!(
                f,
                "{{{}}}",
                map.read_lock()
                    .iter()
                    .map(|(key, value)| format!("{}: {}", key.repr(), value.repr()))
                    .join(", ")
            ),
            Object::Set(set) => {
                let set = set.read_lock();
                if set.is_empty() {
                    write!(f, "set()")
                } else {
                    write!(f, "{{{}}}", set.iter().map(Object::repr).join(", "))
                }
            }
            Object::Function(function) => write!(
                f,
                "fun {}({})",
                function.name.as_deref().unwrap_or(""),
                function.params.iter().join(", ")
            ),
            Object::Builtin(builtin) => write!(f, "builtin {}", builtin.name),
            Object::Return(obj) => write!(f, "{}", obj),
            Object::Break => write!(f, "break"),
            Object::Continue => write!(f, "continue"),
            Object::Error(error) => write!(f, "{}", error),
            Object::Module(module) => write!(f, "module {}", module.name),
            Object::Process(pid) => write!(f, "process {}", pid),
            Object::Host(host) => write!(f, "<{} #{}>", host.type_name, host.id),
        }
    }
}

// Structural equality for host-side comparisons and tests; numeric variants
// never compare equal across types here.
impl PartialEq for Object {
    fn eq(&self, other: &Object) -> bool {
        match (self, other) {
            (Object::Integer(n), Object::Integer(m)) => n == m,
            (Object::UInteger(n), Object::UInteger(m)) => n == m,
            (Object::BigInteger(n), Object::BigInteger(m)) => n == m,
            (Object::Float(x), Object::Float(y)) => x == y,
            (Object::BigFloat(x), Object::BigFloat(y)) => x == y,
            (Object::Boolean(b), Object::Boolean(p)) => b == p,
            (Object::Null, Object::Null) => true,
            (Object::Ignore, Object::Ignore) => true,
            (Object::Str(s), Object::Str(t)) => s == t,
            (Object::List(a), Object::List(b)) => {
                Arc::ptr_eq(a, b) || *a.read_lock() == *b.read_lock()
            }
            (Object::Map(a), Object::Map(b)) => {
                Arc::ptr_eq(a, b) || {
                    let (a, b) = (a.read_lock(), b.read_lock());
                    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
                }
            }
            (Object::Set(a), Object::Set(b)) => {
                Arc::ptr_eq(a, b) || {
                    let (a, b) = (a.read_lock(), b.read_lock());
                    a.len() == b.len() && a.is_subset(&b)
                }
            }
            (Object::Function(f), Object::Function(g)) => {
                Arc::ptr_eq(&f.body, &g.body) && f.env.addr() == g.env.addr()
            }
            (Object::Builtin(f), Object::Builtin(g)) => f.name == g.name,
            (Object::Return(a), Object::Return(b)) => a == b,
            (Object::Break, Object::Break) => true,
            (Object::Continue, Object::Continue) => true,
            (Object::Error(a), Object::Error(b)) => a == b,
            (Object::Module(a), Object::Module(b)) => a.env.ptr_eq(&b.env),
            (Object::Process(a), Object::Process(b)) => a == b,
            (Object::Host(a), Object::Host(b)) => a.id == b.id,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test]
    fn map_keeps_insertion_order() {
        let mut map = OrderedMap::new();
        map.insert(Object::Integer(3), Object::string("c"));
        map.insert(Object::Integer(1), Object::string("a"));
        map.insert(Object::Integer(2), Object::string("b"));
        map.insert(Object::Integer(3), Object::string("C"));

        assert_eq!(
            map.keys(),
            vec![Object::Integer(3), Object::Integer(1), Object::Integer(2)]
        );
        assert_eq!(map.get(&Object::Integer(3)), Some(&Object::string("C")));

        map.remove(&Object::Integer(1));
        assert_eq!(map.keys(), vec![Object::Integer(3), Object::Integer(2)]);
    }

    #[test]
    fn set_ignores_duplicates() {
        let set: OrderedSet = vec![Object::Integer(1), Object::Integer(1), Object::string("x")]
            .into_iter()
            .collect();

        assert_eq!(set.len(), 2);
        assert!(set.contains(&Object::string("x")));
    }

    #[test_case(Object::Integer(-3), "-3" ; "integer")]
    #[test_case(Object::UInteger(255), "0xff" ; "uinteger")]
    #[test_case(Object::Float(2.0), "2.0" ; "float")]
    #[test_case(Object::string("hi"), "hi" ; "string")]
    #[test_case(Object::list(vec![Object::Integer(1), Object::string("a")]), "[1, \"a\"]" ; "list")]
    #[test_case(Object::set(OrderedSet::new()), "set()" ; "empty set")]
    #[test_case(Object::Null, "null" ; "null")]
    fn display(obj: Object, expected: &str) {
        assert_eq!(obj.to_string(), expected)
    }

    #[test_case(Object::Null, false ; "null")]
    #[test_case(Object::Boolean(false), false ; "false")]
    #[test_case(Object::Integer(0), true ; "zero")]
    #[test_case(Object::string(""), true ; "empty string")]
    fn truthiness(obj: Object, expected: bool) {
        assert_eq!(obj.is_truthy(), expected)
    }
}
