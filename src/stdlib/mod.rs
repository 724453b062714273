//! Standard library modules. Each one is a script embedded in the binary
//! plus a table of host functions, all named with a leading underscore,
//! that the script wraps.

mod host;

use crate::embed::{Files, STDLIB};
use crate::interpreter::module;
use crate::interpreter::{Builtin, Env, ErrorObject, Evaluator, Object};

use tracing::debug;

pub struct StdModule {
    pub name: &'static str,
    pub host: &'static [Builtin],
}

#[rustfmt::skip]
static MODULES: &[StdModule] = &[
    StdModule { name: "math", host: host::MATH },
    StdModule { name: "os",   host: host::OS },
    StdModule { name: "time", host: host::TIME },
];

pub fn find(name: &str) -> Option<&'static StdModule> {
    MODULES.iter().find(|module| module.name == name)
}

pub fn names() -> impl Iterator<Item = &'static str> {
    MODULES.iter().map(|module| module.name)
}

/// Evaluates a standard library module once per runtime. The host table
/// sits in a scope above the module's own bindings.
pub fn load(evaluator: &mut Evaluator, module: &StdModule) -> Result<Object, ErrorObject> {
    let key = format!("<std>/{}", module.name);
    if let Some(loaded) = evaluator.runtime().cached_module(&key) {
        return Ok(loaded);
    }

    let source = STDLIB
        .read(&format!("{}.b", module.name))
        .ok_or_else(|| ErrorObject::import(format!("standard module `{}` is missing", module.name)))?;

    let host = Env::empty();
    for builtin in module.host {
        host.define(builtin.name, Object::Builtin(builtin), true);
    }

    let base_dir = evaluator.base_dir().clone();
    let loaded = module::evaluate_in(evaluator, module.name, &key, source, Env::new(&host), base_dir)?;
    evaluator.runtime().cache_module(&key, loaded.clone());
    debug!(module = module.name, "standard module loaded");

    Ok(loaded)
}
