pub(crate) mod arith;
mod environment;
mod error;
mod hash;
#[allow(clippy::module_inception)]
mod interpreter;
mod iteration;
pub(crate) mod module;
mod object;
mod process;

pub use environment::{AssignError, Env, Snapshot, WeakEnv};
pub use error::ErrorObject;
pub use hash::{HashKey, HashTag};
pub use interpreter::{binary, get_index, set_index, Config, Evaluator};
pub use iteration::Cursor;
pub use object::{
    Builtin, BuiltinFn, EnvLink, Function, HostObject, Module, Object, OrderedMap, OrderedSet,
};
pub use process::{Broker, Runtime, Subscription, MAIN_PID};

pub(crate) use object::{lock, Locked};
