use crate::builtin;
use crate::interpreter::arith;
use crate::interpreter::{Builtin, ErrorObject, Evaluator, Object};

use std::env;
use std::time::{SystemTime, UNIX_EPOCH};

use num_bigint::BigInt;
use num_traits::{FromPrimitive, ToPrimitive};

fn arity(name: &str, args: &[Object], want: &str) -> Object {
    Object::error(ErrorObject::wrong_number_of_args(name, args.len(), want))
}

fn number<F>(name: &str, args: &[Object], f: F) -> Object
where
    F: Fn(f64) -> f64,
{
    match args {
        [obj] => match arith::to_f64(obj) {
            Some(x) => Object::Float(f(x)),
            None => Object::error(ErrorObject::wrong_arg_type(name, 1, "a number", obj.type_name())),
        },
        _ => arity(name, args, "1"),
    }
}

// Integral results stay integers, widening when they do not fit.
fn integral(x: f64) -> Object {
    match BigInt::from_f64(x) {
        Some(n) => match n.to_i64() {
            Some(n) => Object::Integer(n),
            None => Object::big_integer(n),
        },
        None => Object::Float(x),
    }
}

fn sqrt(_: &mut Evaluator, args: Vec<Object>) -> Object {
    number("_sqrt", &args, f64::sqrt)
}

fn floor(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [obj @ (Object::Integer(_) | Object::UInteger(_) | Object::BigInteger(_))] => obj.clone(),
        _ => match number("_floor", &args, f64::floor) {
            Object::Float(x) => integral(x),
            obj => obj,
        },
    }
}

fn ceil(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [obj @ (Object::Integer(_) | Object::UInteger(_) | Object::BigInteger(_))] => obj.clone(),
        _ => match number("_ceil", &args, f64::ceil) {
            Object::Float(x) => integral(x),
            obj => obj,
        },
    }
}

fn now(_: &mut Evaluator, args: Vec<Object>) -> Object {
    if !args.is_empty() {
        return arity("_now", &args, "0");
    }
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => Object::Integer(elapsed.as_millis() as i64),
        Err(err) => Object::error(ErrorObject::runtime(format!("clock error: {}", err))),
    }
}

fn args(evaluator: &mut Evaluator, args: Vec<Object>) -> Object {
    if !args.is_empty() {
        return arity("_args", &args, "0");
    }
    Object::list(
        evaluator
            .runtime()
            .config()
            .args
            .iter()
            .map(Object::string)
            .collect(),
    )
}

fn env_var(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [Object::Str(name)] => env::var(&**name).map_or(Object::Null, Object::string),
        [obj] => Object::error(ErrorObject::wrong_arg_type("_env", 1, "STRING", obj.type_name())),
        _ => arity("_env", &args, "1"),
    }
}

fn cwd(_: &mut Evaluator, args: Vec<Object>) -> Object {
    if !args.is_empty() {
        return arity("_cwd", &args, "0");
    }
    match env::current_dir() {
        Ok(dir) => Object::string(dir.display().to_string()),
        Err(err) => Object::error(ErrorObject::runtime(format!("cannot read working directory: {}", err))),
    }
}

#[rustfmt::skip]
pub static MATH: &[Builtin] = &[
    Builtin { name: "_sqrt",  func: sqrt,  help: "_sqrt(x): square root as a float" },
    Builtin { name: "_floor", func: floor, help: "_floor(x): rounds down to an integer" },
    Builtin { name: "_ceil",  func: ceil,  help: "_ceil(x): rounds up to an integer" },
];

#[rustfmt::skip]
pub static TIME: &[Builtin] = &[
    Builtin { name: "_now",   func: now,            help: "_now(): milliseconds since the Unix epoch" },
    Builtin { name: "_sleep", func: builtin::sleep, help: "_sleep(ms): suspends the current process" },
];

#[rustfmt::skip]
pub static OS: &[Builtin] = &[
    Builtin { name: "_args",  func: args,          help: "_args(): script arguments" },
    Builtin { name: "_env",   func: env_var,       help: "_env(name): environment variable or null" },
    Builtin { name: "_exec",  func: builtin::exec, help: "_exec(command): output of a shell command" },
    Builtin { name: "_cwd",   func: cwd,           help: "_cwd(): working directory" },
    Builtin { name: "_exit",  func: builtin::exit, help: "_exit(code): ends the program" },
];
