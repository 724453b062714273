use crate::interpreter::object::{EnvLink, Locked, Object, OrderedMap, OrderedSet};

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, RwLock, Weak};

struct Scope {
    bindings: BTreeMap<String, Object>,
    immutable: HashSet<String>,
    parent: Option<Env>,
}

/// Shared handle to one lexical scope. Cloning the handle shares the scope.
#[derive(Clone)]
pub struct Env(Arc<RwLock<Scope>>);

#[derive(Clone)]
pub struct WeakEnv(Weak<RwLock<Scope>>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignError {
    NotFound,
    Immutable,
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Env({:#x})", self.addr())
    }
}

impl fmt::Debug for WeakEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakEnv({:#x})", self.addr())
    }
}

impl WeakEnv {
    pub fn upgrade(&self) -> Option<Env> {
        self.0.upgrade().map(Env)
    }

    pub fn ptr_eq(&self, env: &Env) -> bool {
        std::ptr::eq(self.0.as_ptr(), Arc::as_ptr(&env.0))
    }

    pub fn addr(&self) -> usize {
        self.0.as_ptr() as usize
    }
}

impl Env {
    pub fn empty() -> Env {
        Env(Arc::new(RwLock::new(Scope {
            bindings: BTreeMap::new(),
            immutable: HashSet::new(),
            parent: None,
        })))
    }

    pub fn new(parent: &Env) -> Env {
        Env(Arc::new(RwLock::new(Scope {
            bindings: BTreeMap::new(),
            immutable: HashSet::new(),
            parent: Some(parent.clone()),
        })))
    }

    pub fn ptr_eq(&self, other: &Env) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub fn downgrade(&self) -> WeakEnv {
        WeakEnv(Arc::downgrade(&self.0))
    }

    pub fn parent(&self) -> Option<Env> {
        self.0.read_lock().parent.clone()
    }

    pub fn get(&self, name: &str) -> Option<Object> {
        let mut env = self.clone();
        loop {
            let parent = {
                let scope = env.0.read_lock();
                if let Some(obj) = scope.bindings.get(name) {
                    return Some(env.strengthen(obj));
                }
                scope.parent.clone()
            };
            env = parent?;
        }
    }

    /// Binds `name` in this scope, shadowing any outer binding.
    pub fn define(&self, name: &str, obj: Object, immutable: bool) {
        let obj = self.weaken(obj);
        let mut scope = self.0.write_lock();
        scope.bindings.insert(name.to_string(), obj);
        if immutable {
            scope.immutable.insert(name.to_string());
        } else {
            scope.immutable.remove(name);
        }
    }

    /// Rebinds `name` in the innermost scope that holds it.
    pub fn assign(&self, name: &str, obj: Object) -> Result<(), AssignError> {
        let mut env = self.clone();
        loop {
            let parent = {
                let mut scope = env.0.write_lock();
                if scope.bindings.contains_key(name) {
                    if scope.immutable.contains(name) {
                        return Err(AssignError::Immutable);
                    }
                    drop(scope);
                    let obj = env.weaken(obj);
                    env.0.write_lock().bindings.insert(name.to_string(), obj);
                    return Ok(());
                }
                scope.parent.clone()
            };
            env = parent.ok_or(AssignError::NotFound)?;
        }
    }

    pub fn is_immutable(&self, name: &str) -> bool {
        let mut env = self.clone();
        loop {
            let parent = {
                let scope = env.0.read_lock();
                if scope.bindings.contains_key(name) {
                    return scope.immutable.contains(name);
                }
                scope.parent.clone()
            };
            match parent {
                Some(parent) => env = parent,
                None => return false,
            }
        }
    }

    /// The binding of `name` in this scope only, with its immutability.
    pub fn local(&self, name: &str) -> Option<(Object, bool)> {
        let scope = self.0.read_lock();
        let obj = scope.bindings.get(name)?.clone();
        Some((obj, scope.immutable.contains(name)))
    }

    /// Drops a binding from this scope only.
    pub fn remove(&self, name: &str) -> Option<Object> {
        let mut scope = self.0.write_lock();
        scope.immutable.remove(name);
        scope.bindings.remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.0.read_lock().bindings.keys().cloned().collect()
    }

    /// Deep copy of this scope chain and of everything reachable from it.
    pub fn snapshot(&self) -> Env {
        Snapshot::default().env(self)
    }

    // A closure stored in the scope it captures would keep that scope alive
    // forever; store it with a weak link instead.
    fn weaken(&self, obj: Object) -> Object {
        match obj {
            Object::Function(function) => match &function.env {
                EnvLink::Strong(env) if env.ptr_eq(self) => {
                    Object::Function(Arc::new(function.with_env(EnvLink::Weak(self.downgrade()))))
                }
                _ => Object::Function(function),
            },
            obj => obj,
        }
    }

    fn strengthen(&self, obj: &Object) -> Object {
        match obj {
            Object::Function(function) => match &function.env {
                EnvLink::Weak(env) if env.ptr_eq(self) => {
                    Object::Function(Arc::new(function.with_env(EnvLink::Strong(self.clone()))))
                }
                _ => obj.clone(),
            },
            obj => obj.clone(),
        }
    }
}

/// Copies values and scope chains without sharing any mutable structure
/// with the originals. Scopes reached twice are copied once.
#[derive(Default)]
pub struct Snapshot {
    copied: Vec<(usize, Env)>,
}

impl Snapshot {
    pub fn env(&mut self, env: &Env) -> Env {
        if let Some((_, copy)) = self.copied.iter().find(|(addr, _)| *addr == env.addr()) {
            return copy.clone();
        }

        let (bindings, immutable, parent) = {
            let scope = env.0.read_lock();
            let bindings: Vec<(String, Object)> = scope
                .bindings
                .iter()
                .map(|(name, obj)| (name.clone(), obj.clone()))
                .collect();
            (bindings, scope.immutable.clone(), scope.parent.clone())
        };

        let parent = parent.map(|parent| self.env(&parent));
        let copy = Env(Arc::new(RwLock::new(Scope {
            bindings: BTreeMap::new(),
            immutable,
            parent,
        })));
        self.copied.push((env.addr(), copy.clone()));

        for (name, obj) in bindings {
            let obj = copy.weaken(self.object(&obj));
            copy.0.write_lock().bindings.insert(name, obj);
        }

        copy
    }

    pub fn object(&mut self, obj: &Object) -> Object {
        match obj {
            Object::List(items) => {
                let items: Vec<Object> = items.read_lock().clone();
                Object::list(items.iter().map(|item| self.object(item)).collect())
            }
            Object::Map(map) => {
                let pairs: Vec<(Object, Object)> = map
                    .read_lock()
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                Object::map(
                    pairs
                        .iter()
                        .map(|(key, value)| (self.object(key), self.object(value)))
                        .collect::<OrderedMap>(),
                )
            }
            Object::Set(set) => {
                let items: Vec<Object> = set.read_lock().iter().cloned().collect();
                Object::set(items.iter().map(|item| self.object(item)).collect::<OrderedSet>())
            }
            Object::Function(function) => match function.env.upgrade() {
                Some(env) => {
                    let env = self.env(&env);
                    Object::Function(Arc::new(function.with_env(EnvLink::Strong(env))))
                }
                None => obj.clone(),
            },
            Object::Return(inner) => Object::Return(Box::new(self.object(inner))),
            obj => obj.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::Block;

    use pretty_assertions::assert_eq;

    fn closure(env: &Env) -> Object {
        Object::Function(Arc::new(crate::interpreter::object::Function {
            name: None,
            params: vec![],
            defaults: vec![],
            body: Arc::new(Block::default()),
            env: EnvLink::Strong(env.clone()),
        }))
    }

    #[test]
    fn lookup_walks_parents() {
        let global = Env::empty();
        global.define("x", Object::Integer(1), false);
        let local = Env::new(&global);
        local.define("y", Object::Integer(2), false);

        assert_eq!(local.get("x"), Some(Object::Integer(1)));
        assert_eq!(local.get("y"), Some(Object::Integer(2)));
        assert_eq!(global.get("y"), None);
    }

    #[test]
    fn assign_updates_defining_scope() {
        let global = Env::empty();
        global.define("x", Object::Integer(1), false);
        let local = Env::new(&global);

        assert_eq!(local.assign("x", Object::Integer(5)), Ok(()));
        assert_eq!(global.get("x"), Some(Object::Integer(5)));
        assert_eq!(local.assign("nope", Object::Null), Err(AssignError::NotFound));
    }

    #[test]
    fn immutable_bindings_reject_assignment() {
        let global = Env::empty();
        global.define("x", Object::Integer(1), true);
        let local = Env::new(&global);

        assert!(local.is_immutable("x"));
        assert_eq!(local.assign("x", Object::Integer(2)), Err(AssignError::Immutable));

        local.define("x", Object::Integer(3), false);
        assert!(!local.is_immutable("x"));
    }

    #[test]
    fn self_capturing_closure_does_not_keep_scope_alive() {
        let env = Env::empty();
        env.define("f", closure(&env), false);
        let weak = env.downgrade();

        match env.get("f") {
            Some(Object::Function(function)) => {
                assert!(matches!(function.env, EnvLink::Strong(_)))
            }
            other => panic!("unexpected {:?}", other),
        }

        drop(env);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn snapshot_is_independent() {
        let global = Env::empty();
        global.define("xs", Object::list(vec![Object::Integer(1)]), false);
        global.define("f", closure(&global), false);

        let copy = global.snapshot();
        if let Some(Object::List(items)) = copy.get("xs") {
            items.write_lock().push(Object::Integer(2));
        }

        assert_eq!(global.get("xs"), Some(Object::list(vec![Object::Integer(1)])));
        match copy.get("f") {
            Some(Object::Function(function)) => assert!(function.env.points_to(&copy)),
            other => panic!("unexpected {:?}", other),
        }
    }
}
