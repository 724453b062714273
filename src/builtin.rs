use crate::error::ErrorKind;
use crate::interpreter::arith;
use crate::interpreter::{
    binary, Env, ErrorObject, Evaluator, Locked, Object, OrderedMap, OrderedSet, Subscription,
};
use crate::lexer::TokenKind;

use std::cmp::Ordering;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::Command;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use bigdecimal::BigDecimal;
use itertools::Itertools;
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use regex::Regex;

pub use crate::interpreter::Builtin;

const MAX_RANGE: usize = 10_000_000;

/// Looks up a global builtin by name.
pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|builtin| builtin.name == name)
}

pub fn names() -> impl Iterator<Item = &'static str> {
    BUILTINS.iter().map(|builtin| builtin.name)
}

fn arity(name: &str, args: &[Object], want: &str) -> Object {
    Object::error(ErrorObject::wrong_number_of_args(name, args.len(), want))
}

fn wrong(name: &str, position: usize, expected: &str, got: &Object) -> Object {
    Object::error(ErrorObject::wrong_arg_type(name, position, expected, got.type_name()))
}

fn runtime<S: Into<String>>(msg: S) -> Object {
    Object::error(ErrorObject::runtime(msg))
}

fn cannot_convert(obj: &Object, target: &str) -> Object {
    Object::error(ErrorObject::type_mismatch(format!(
        "cannot convert {} to {}",
        obj.repr(),
        target
    )))
}

fn narrow(n: BigInt) -> Object {
    match n.to_i64() {
        Some(n) => Object::Integer(n),
        None => Object::big_integer(n),
    }
}

// Items of anything `for` can walk, taken eagerly.
fn items_of(obj: &Object) -> Option<Vec<Object>> {
    match obj {
        Object::List(items) => Some(items.read_lock().clone()),
        Object::Set(set) => Some(set.read_lock().iter().cloned().collect()),
        Object::Map(map) => Some(map.read_lock().keys()),
        Object::Str(text) => Some(text.chars().map(|ch| Object::string(ch.to_string())).collect()),
        _ => None,
    }
}

fn order(a: &Object, b: &Object) -> Option<Ordering> {
    match (a, b) {
        (Object::Str(a), Object::Str(b)) => Some(a.cmp(b)),
        (a, b) => arith::compare(a, b),
    }
}

// Slice bound clamped into `0..=len`.
fn position(len: usize, index: i64) -> usize {
    if index < 0 {
        len.saturating_sub(index.unsigned_abs() as usize)
    } else {
        (index as usize).min(len)
    }
}

// Position of an existing item; negative indexes count from the end.
fn item_position(len: usize, index: i64) -> Option<usize> {
    let at = if index < 0 {
        len.checked_sub(usize::try_from(index.unsigned_abs()).ok()?)?
    } else {
        usize::try_from(index).ok()?
    };
    (at < len).then_some(at)
}

fn index_arg(name: &str, index: usize, obj: &Object) -> Result<i64, Object> {
    arith::to_i64(obj).ok_or_else(|| wrong(name, index, "INTEGER", obj))
}

fn text_arg<'a>(name: &str, index: usize, obj: &'a Object) -> Result<&'a str, Object> {
    obj.as_str().ok_or_else(|| wrong(name, index, "STRING", obj))
}

fn to_regex(name: &str, index: usize, obj: &Object) -> Result<Regex, Object> {
    match obj {
        Object::Host(host) => host
            .downcast::<Regex>()
            .cloned()
            .ok_or_else(|| wrong(name, index, "REGEX", obj)),
        Object::Str(pattern) => Regex::new(pattern).map_err(|err| {
            Object::error(ErrorObject::type_mismatch(format!("invalid regex: {}", err)))
        }),
        obj => Err(wrong(name, index, "REGEX", obj)),
    }
}

fn subscription(obj: &Object) -> Option<&Subscription> {
    match obj {
        Object::Host(host) => host.downcast::<Subscription>(),
        _ => None,
    }
}

macro_rules! arg {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(error) => return error,
        }
    };
}

// Output

fn write_out(args: &[Object], end: &str) -> Object {
    let mut stdout = io::stdout().lock();
    let text = args.iter().join(" ");
    match write!(stdout, "{}{}", text, end).and_then(|_| stdout.flush()) {
        Ok(()) => Object::Null,
        Err(err) => runtime(format!("cannot write to stdout: {}", err)),
    }
}

fn print(_: &mut Evaluator, args: Vec<Object>) -> Object {
    write_out(&args, "")
}

fn println(_: &mut Evaluator, args: Vec<Object>) -> Object {
    write_out(&args, "\n")
}

// Introspection and conversion

fn len(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [Object::Str(text)] => Object::Integer(text.chars().count() as i64),
        [Object::List(items)] => Object::Integer(items.read_lock().len() as i64),
        [Object::Map(map)] => Object::Integer(map.read_lock().len() as i64),
        [Object::Set(set)] => Object::Integer(set.read_lock().len() as i64),
        [obj] => wrong("len", 1, "STRING, LIST, MAP or SET", obj),
        _ => arity("len", &args, "1"),
    }
}

fn type_of(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [obj] => Object::string(obj.type_name()),
        _ => arity("type", &args, "1"),
    }
}

fn to_str(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [obj] => Object::string(obj.to_string()),
        _ => arity("str", &args, "1"),
    }
}

fn int(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [obj @ Object::Integer(_)] => obj.clone(),
        [Object::Boolean(b)] => Object::Integer(i64::from(*b)),
        [Object::Str(text)] => {
            let text = text.trim();
            if let Ok(n) = text.parse::<i64>() {
                Object::Integer(n)
            } else if let Ok(n) = BigInt::from_str(text) {
                Object::big_integer(n)
            } else if let Some(n) = text.parse::<f64>().ok().and_then(|x| arith::to_big(&Object::Float(x))) {
                narrow(n)
            } else {
                cannot_convert(&args[0], "INTEGER")
            }
        }
        [obj] => match arith::to_big(obj) {
            Some(n) => narrow(n),
            None => cannot_convert(obj, "INTEGER"),
        },
        _ => arity("int", &args, "1"),
    }
}

fn float(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [Object::Boolean(b)] => Object::Float(if *b { 1.0 } else { 0.0 }),
        [Object::Str(text)] => match text.trim().parse::<f64>() {
            Ok(x) => Object::Float(x),
            Err(_) => cannot_convert(&args[0], "FLOAT"),
        },
        [obj] => match arith::to_f64(obj) {
            Some(x) => Object::Float(x),
            None => cannot_convert(obj, "FLOAT"),
        },
        _ => arity("float", &args, "1"),
    }
}

fn uint(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [obj @ Object::UInteger(_)] => obj.clone(),
        [Object::Str(text)] => {
            let text = text.trim();
            let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
                Some(hex) => u64::from_str_radix(hex, 16),
                None => text.parse::<u64>(),
            };
            match parsed {
                Ok(n) => Object::UInteger(n),
                Err(_) => cannot_convert(&args[0], "UINTEGER"),
            }
        }
        [obj] => match arith::to_big(obj).and_then(|n| n.to_u64()) {
            Some(n) => Object::UInteger(n),
            None => cannot_convert(obj, "UINTEGER"),
        },
        _ => arity("uint", &args, "1"),
    }
}

fn bigint(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [Object::Str(text)] => match BigInt::from_str(text.trim()) {
            Ok(n) => Object::big_integer(n),
            Err(_) => cannot_convert(&args[0], "BIG_INTEGER"),
        },
        [obj] => match arith::to_big(obj) {
            Some(n) => Object::big_integer(n),
            None => cannot_convert(obj, "BIG_INTEGER"),
        },
        _ => arity("bigint", &args, "1"),
    }
}

fn bigfloat(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [Object::Str(text)] => match BigDecimal::from_str(text.trim()) {
            Ok(x) => Object::big_float(x),
            Err(_) => cannot_convert(&args[0], "BIG_FLOAT"),
        },
        [obj] => match arith::to_decimal(obj) {
            Some(x) => Object::big_float(x),
            None => cannot_convert(obj, "BIG_FLOAT"),
        },
        _ => arity("bigfloat", &args, "1"),
    }
}

fn help(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [] => Object::string(format!("builtins: {}", names().join(", "))),
        [Object::Builtin(builtin)] => Object::string(builtin.help),
        [Object::Function(function)] => Object::string(function.doc().unwrap_or("").trim()),
        [Object::Module(module)] => {
            Object::string(format!("module {}: {}", module.name, module.env.names().join(", ")))
        }
        [obj] => wrong("help", 1, "FUNCTION, BUILTIN or MODULE", obj),
        _ => arity("help", &args, "0 or 1"),
    }
}

// Collections

fn append(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.split_first() {
        Some((Object::List(items), rest)) => {
            let mut items = items.read_lock().clone();
            items.extend(rest.iter().cloned());
            Object::list(items)
        }
        Some((obj, _)) => wrong("append", 1, "LIST", obj),
        None => arity("append", &args, "at least 1"),
    }
}

fn push(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [list @ Object::List(items), item] => {
            items.write_lock().push(item.clone());
            list.clone()
        }
        [set @ Object::Set(items), item] => {
            items.write_lock().insert(item.clone());
            set.clone()
        }
        [obj, _] => wrong("push", 1, "LIST or SET", obj),
        _ => arity("push", &args, "2"),
    }
}

fn pop(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [Object::List(items)] => items.write_lock().pop().unwrap_or(Object::Null),
        [Object::List(items), index] => {
            let index = arg!(index_arg("pop", 2, index));
            let mut items = items.write_lock();
            match item_position(items.len(), index) {
                Some(at) => items.remove(at),
                None => Object::Null,
            }
        }
        [obj, ..] => wrong("pop", 1, "LIST", obj),
        _ => arity("pop", &args, "1 or 2"),
    }
}

fn keys(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [Object::Map(map)] => Object::list(map.read_lock().keys()),
        [obj] => wrong("keys", 1, "MAP", obj),
        _ => arity("keys", &args, "1"),
    }
}

fn values(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [Object::Map(map)] => Object::list(map.read_lock().values()),
        [obj] => wrong("values", 1, "MAP", obj),
        _ => arity("values", &args, "1"),
    }
}

fn delete(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [Object::Map(map), key] => map.write_lock().remove(key).unwrap_or(Object::Null),
        [Object::Set(set), item] => Object::Boolean(set.write_lock().remove(item)),
        [Object::List(items), index] => {
            let index = arg!(index_arg("delete", 2, index));
            let mut items = items.write_lock();
            match item_position(items.len(), index) {
                Some(at) => items.remove(at),
                None => Object::Null,
            }
        }
        [obj, _] => wrong("delete", 1, "MAP, SET or LIST", obj),
        _ => arity("delete", &args, "2"),
    }
}

fn contains(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [container, item] => binary(item, TokenKind::In, container),
        _ => arity("contains", &args, "2"),
    }
}

fn index_of(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [Object::List(items), item] => {
            let found = items.read_lock().iter().position(|other| arith::equals(item, other));
            Object::Integer(found.map_or(-1, |index| index as i64))
        }
        [Object::Str(text), needle] => {
            let needle = arg!(text_arg("index_of", 2, needle));
            let found = text
                .find(needle)
                .map(|byte| text[..byte].chars().count() as i64);
            Object::Integer(found.unwrap_or(-1))
        }
        [obj, _] => wrong("index_of", 1, "LIST or STRING", obj),
        _ => arity("index_of", &args, "2"),
    }
}

fn slice(_: &mut Evaluator, args: Vec<Object>) -> Object {
    let (target, start, end) = match args.as_slice() {
        [target, start] => (target, start, None),
        [target, start, end] => (target, start, Some(end)),
        _ => return arity("slice", &args, "2 or 3"),
    };
    let start = arg!(index_arg("slice", 2, start));
    let end = match end {
        Some(end) => Some(arg!(index_arg("slice", 3, end))),
        None => None,
    };
    let bounds = |len: usize| {
        let from = position(len, start);
        let to = end.map_or(len, |end| position(len, end));
        (from, to.max(from))
    };

    match target {
        Object::List(items) => {
            let items = items.read_lock();
            let (from, to) = bounds(items.len());
            Object::list(items[from..to].to_vec())
        }
        Object::Str(text) => {
            let (from, to) = bounds(text.chars().count());
            Object::string(text.chars().skip(from).take(to - from).collect::<String>())
        }
        obj => wrong("slice", 1, "LIST or STRING", obj),
    }
}

fn reverse(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [Object::List(items)] => Object::list(items.read_lock().iter().rev().cloned().collect()),
        [Object::Str(text)] => Object::string(text.chars().rev().collect::<String>()),
        [obj] => wrong("reverse", 1, "LIST or STRING", obj),
        _ => arity("reverse", &args, "1"),
    }
}

fn sort(evaluator: &mut Evaluator, args: Vec<Object>) -> Object {
    let (items, key) = match args.as_slice() {
        [Object::List(items)] => (items.read_lock().clone(), None),
        [Object::List(items), key] => (items.read_lock().clone(), Some(key.clone())),
        [obj, ..] => return wrong("sort", 1, "LIST", obj),
        _ => return arity("sort", &args, "1 or 2"),
    };

    let mut keyed = Vec::with_capacity(items.len());
    for item in items {
        let sort_key = match &key {
            Some(key) => match evaluator.apply(key.clone(), vec![item.clone()], vec![]) {
                error @ Object::Error(_) => return error,
                sort_key => sort_key,
            },
            None => item.clone(),
        };
        keyed.push((sort_key, item));
    }

    let mut unordered = None;
    keyed.sort_by(|(a, _), (b, _)| {
        order(a, b).unwrap_or_else(|| {
            unordered.get_or_insert_with(|| (a.type_name(), b.type_name()));
            Ordering::Equal
        })
    });

    match unordered {
        Some((a, b)) => Object::error(ErrorObject::type_mismatch(format!(
            "cannot order {} and {}",
            a, b
        ))),
        None => Object::list(keyed.into_iter().map(|(_, item)| item).collect()),
    }
}

fn sum(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [Object::List(items)] => {
            let items = items.read_lock().clone();
            let mut total = Object::Integer(0);
            for item in &items {
                total = match binary(&total, TokenKind::Plus, item) {
                    error @ Object::Error(_) => return error,
                    total => total,
                };
            }
            total
        }
        [obj] => wrong("sum", 1, "LIST", obj),
        _ => arity("sum", &args, "1"),
    }
}

fn range(_: &mut Evaluator, args: Vec<Object>) -> Object {
    let bounds: Vec<i64> = {
        let mut bounds = Vec::with_capacity(args.len());
        for (index, obj) in args.iter().enumerate() {
            bounds.push(arg!(index_arg("range", index + 1, obj)));
        }
        bounds
    };
    let (start, end, step) = match bounds.as_slice() {
        [end] => (0, *end, 1),
        [start, end] => (*start, *end, 1),
        [start, end, step] => (*start, *end, *step),
        _ => return arity("range", &args, "1 to 3"),
    };
    if step == 0 {
        return Object::error(ErrorObject::new(ErrorKind::Arithmetic, "range step must not be zero"));
    }

    let len = (end.abs_diff(start) / step.unsigned_abs()) as usize;
    if len > MAX_RANGE {
        return Object::error(ErrorObject::new(
            ErrorKind::Arithmetic,
            format!("range of {} elements is too large", len),
        ));
    }

    let mut items = vec![];
    let mut n = start;
    while (step > 0 && n < end) || (step < 0 && n > end) {
        items.push(Object::Integer(n));
        n = match n.checked_add(step) {
            Some(n) => n,
            None => break,
        };
    }
    Object::list(items)
}

fn set(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [] => Object::set(OrderedSet::new()),
        [obj] => match items_of(obj) {
            Some(items) => Object::set(items.into_iter().collect()),
            None => wrong("set", 1, "an iterable", obj),
        },
        _ => arity("set", &args, "0 or 1"),
    }
}

fn list(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [] => Object::list(vec![]),
        [Object::Map(map)] => Object::list(
            map.read_lock()
                .iter()
                .map(|(key, value)| Object::list(vec![key.clone(), value.clone()]))
                .collect(),
        ),
        [obj] => match items_of(obj) {
            Some(items) => Object::list(items),
            None => wrong("list", 1, "an iterable", obj),
        },
        _ => arity("list", &args, "0 or 1"),
    }
}

// Higher order

fn each<F>(name: &str, evaluator: &mut Evaluator, args: &[Object], mut f: F) -> Object
where
    F: FnMut(Object, Object) -> bool,
{
    let (items, callee) = match args {
        [collection, callee] => match items_of(collection) {
            Some(items) => (items, callee),
            None => return wrong(name, 1, "an iterable", collection),
        },
        _ => return arity(name, args, "2"),
    };

    for item in items {
        match evaluator.apply(callee.clone(), vec![item.clone()], vec![]) {
            error @ Object::Error(_) => return error,
            result => {
                if !f(item, result) {
                    break;
                }
            }
        }
    }
    Object::Null
}

fn map(evaluator: &mut Evaluator, args: Vec<Object>) -> Object {
    let mut mapped = vec![];
    match each("map", evaluator, &args, |_, result| {
        mapped.push(result);
        true
    }) {
        error @ Object::Error(_) => error,
        _ => Object::list(mapped),
    }
}

fn filter(evaluator: &mut Evaluator, args: Vec<Object>) -> Object {
    let mut kept = vec![];
    match each("filter", evaluator, &args, |item, result| {
        if result.is_truthy() {
            kept.push(item);
        }
        true
    }) {
        error @ Object::Error(_) => error,
        _ => Object::list(kept),
    }
}

fn any(evaluator: &mut Evaluator, args: Vec<Object>) -> Object {
    if let [collection] = args.as_slice() {
        return match items_of(collection) {
            Some(items) => Object::Boolean(items.iter().any(Object::is_truthy)),
            None => wrong("any", 1, "an iterable", collection),
        };
    }
    let mut found = false;
    match each("any", evaluator, &args, |_, result| {
        found = result.is_truthy();
        !found
    }) {
        error @ Object::Error(_) => error,
        _ => Object::Boolean(found),
    }
}

fn all(evaluator: &mut Evaluator, args: Vec<Object>) -> Object {
    if let [collection] = args.as_slice() {
        return match items_of(collection) {
            Some(items) => Object::Boolean(items.iter().all(Object::is_truthy)),
            None => wrong("all", 1, "an iterable", collection),
        };
    }
    let mut holds = true;
    match each("all", evaluator, &args, |_, result| {
        holds = result.is_truthy();
        holds
    }) {
        error @ Object::Error(_) => error,
        _ => Object::Boolean(holds),
    }
}

fn reduce(evaluator: &mut Evaluator, args: Vec<Object>) -> Object {
    let (collection, callee, initial) = match args.as_slice() {
        [collection, callee] => (collection, callee, None),
        [collection, callee, initial] => (collection, callee, Some(initial.clone())),
        _ => return arity("reduce", &args, "2 or 3"),
    };
    let mut items = match items_of(collection) {
        Some(items) => items.into_iter(),
        None => return wrong("reduce", 1, "an iterable", collection),
    };

    let mut acc = match initial.or_else(|| items.next()) {
        Some(acc) => acc,
        None => return Object::Null,
    };
    for item in items {
        acc = match evaluator.apply(callee.clone(), vec![acc, item], vec![]) {
            error @ Object::Error(_) => return error,
            acc => acc,
        };
    }
    acc
}

// Numbers

fn abs(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [Object::Integer(n)] => match n.checked_abs() {
            Some(n) => Object::Integer(n),
            None => Object::big_integer(BigInt::from(*n).abs()),
        },
        [obj @ Object::UInteger(_)] => obj.clone(),
        [Object::BigInteger(n)] => Object::big_integer(n.abs()),
        [Object::Float(x)] => Object::Float(x.abs()),
        [Object::BigFloat(x)] => Object::big_float(x.abs()),
        [obj] => wrong("abs", 1, "a number", obj),
        _ => arity("abs", &args, "1"),
    }
}

fn extreme(name: &str, args: &[Object], wanted: Ordering) -> Object {
    let items = match args {
        [] => return arity(name, args, "at least 1"),
        [Object::List(items)] => items.read_lock().clone(),
        args => args.to_vec(),
    };

    let mut best: Option<Object> = None;
    for item in items {
        best = match best {
            None => Some(item),
            Some(current) => match order(&item, &current) {
                Some(ordering) if ordering == wanted => Some(item),
                Some(_) => Some(current),
                None => {
                    return Object::error(ErrorObject::type_mismatch(format!(
                        "cannot compare {} and {}",
                        item.type_name(),
                        current.type_name()
                    )))
                }
            },
        };
    }
    best.unwrap_or(Object::Null)
}

fn min(_: &mut Evaluator, args: Vec<Object>) -> Object {
    extreme("min", &args, Ordering::Less)
}

fn max(_: &mut Evaluator, args: Vec<Object>) -> Object {
    extreme("max", &args, Ordering::Greater)
}

fn round(_: &mut Evaluator, args: Vec<Object>) -> Object {
    let (number, digits) = match args.as_slice() {
        [number] => (number, 0),
        [number, digits] => (number, arg!(index_arg("round", 2, digits))),
        _ => return arity("round", &args, "1 or 2"),
    };

    match number {
        Object::Integer(_) | Object::UInteger(_) | Object::BigInteger(_) => number.clone(),
        Object::Float(x) if digits <= 0 => match arith::to_big(&Object::Float(x.round())) {
            Some(n) => narrow(n),
            None => Object::Float(x.round()),
        },
        Object::Float(x) => {
            let scale = 10f64.powi(digits.min(i32::MAX as i64) as i32);
            Object::Float((x * scale).round() / scale)
        }
        Object::BigFloat(x) => Object::big_float(x.round(digits)),
        obj => wrong("round", 1, "a number", obj),
    }
}

// Strings

fn split(_: &mut Evaluator, args: Vec<Object>) -> Object {
    let (text, separator) = match args.as_slice() {
        [text] => (arg!(text_arg("split", 1, text)), None),
        [text, separator] => (
            arg!(text_arg("split", 1, text)),
            Some(arg!(text_arg("split", 2, separator))),
        ),
        _ => return arity("split", &args, "1 or 2"),
    };

    let parts: Vec<Object> = match separator {
        None => text.split_whitespace().map(Object::string).collect(),
        Some("") => text.chars().map(|ch| Object::string(ch.to_string())).collect(),
        Some(separator) => text.split(separator).map(Object::string).collect(),
    };
    Object::list(parts)
}

fn join(_: &mut Evaluator, args: Vec<Object>) -> Object {
    let (items, separator) = match args.as_slice() {
        [Object::List(items)] => (items, ""),
        [Object::List(items), separator] => (items, arg!(text_arg("join", 2, separator))),
        [obj, ..] => return wrong("join", 1, "LIST", obj),
        _ => return arity("join", &args, "1 or 2"),
    };
    let joined = items.read_lock().iter().join(separator);
    Object::string(joined)
}

fn map_text<F>(name: &str, args: &[Object], f: F) -> Object
where
    F: Fn(&str) -> String,
{
    match args {
        [Object::Str(text)] => Object::string(f(text)),
        [obj] => wrong(name, 1, "STRING", obj),
        _ => arity(name, args, "1"),
    }
}

fn upper(_: &mut Evaluator, args: Vec<Object>) -> Object {
    map_text("upper", &args, str::to_uppercase)
}

fn lower(_: &mut Evaluator, args: Vec<Object>) -> Object {
    map_text("lower", &args, str::to_lowercase)
}

fn trim(_: &mut Evaluator, args: Vec<Object>) -> Object {
    map_text("trim", &args, |text| text.trim().to_string())
}

fn replace(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [text, pattern, replacement] => {
            let text = arg!(text_arg("replace", 1, text));
            let replacement = arg!(text_arg("replace", 3, replacement));
            match pattern {
                Object::Str(pattern) => Object::string(text.replace(&**pattern, replacement)),
                pattern => {
                    let regex = arg!(to_regex("replace", 2, pattern));
                    Object::string(regex.replace_all(text, replacement))
                }
            }
        }
        _ => arity("replace", &args, "3"),
    }
}

fn startswith(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [text, prefix] => {
            let text = arg!(text_arg("startswith", 1, text));
            Object::Boolean(text.starts_with(arg!(text_arg("startswith", 2, prefix))))
        }
        _ => arity("startswith", &args, "2"),
    }
}

fn endswith(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [text, suffix] => {
            let text = arg!(text_arg("endswith", 1, text));
            Object::Boolean(text.ends_with(arg!(text_arg("endswith", 2, suffix))))
        }
        _ => arity("endswith", &args, "2"),
    }
}

fn chars(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [Object::Str(text)] => {
            Object::list(text.chars().map(|ch| Object::string(ch.to_string())).collect())
        }
        [obj] => wrong("chars", 1, "STRING", obj),
        _ => arity("chars", &args, "1"),
    }
}

fn is_match(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [pattern, text] => {
            let regex = arg!(to_regex("is_match", 1, pattern));
            Object::Boolean(regex.is_match(arg!(text_arg("is_match", 2, text))))
        }
        _ => arity("is_match", &args, "2"),
    }
}

fn find_all(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [pattern, text] => {
            let regex = arg!(to_regex("find_all", 1, pattern));
            let text = arg!(text_arg("find_all", 2, text));
            Object::list(
                regex
                    .find_iter(text)
                    .map(|found| Object::string(found.as_str()))
                    .collect(),
            )
        }
        _ => arity("find_all", &args, "2"),
    }
}

// Errors and control

fn error(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [message] => runtime(message.to_string()),
        _ => arity("error", &args, "1"),
    }
}

fn assert(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [cond] if cond.is_truthy() => Object::Null,
        [_] => runtime("assertion failed"),
        [cond, _] if cond.is_truthy() => Object::Null,
        [_, message] => runtime(format!("assertion failed: {}", message)),
        _ => arity("assert", &args, "1 or 2"),
    }
}

pub(crate) fn exit(_: &mut Evaluator, args: Vec<Object>) -> Object {
    let code = match args.as_slice() {
        [] => 0,
        [code] => arg!(index_arg("exit", 1, code)),
        _ => return arity("exit", &args, "0 or 1"),
    };
    Object::error(ErrorObject::exit(code.clamp(i32::MIN as i64, i32::MAX as i64) as i32))
}

pub(crate) fn sleep(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [ms] => match arith::to_f64(ms) {
            Some(ms) if ms >= 0.0 => {
                thread::sleep(Duration::from_secs_f64(ms / 1000.0));
                Object::Null
            }
            _ => wrong("sleep", 1, "a non-negative number", ms),
        },
        _ => arity("sleep", &args, "1"),
    }
}

pub(crate) fn exec(_: &mut Evaluator, args: Vec<Object>) -> Object {
    let command = match args.as_slice() {
        [command] => arg!(text_arg("exec", 1, command)),
        _ => return arity("exec", &args, "1"),
    };

    let output = if cfg!(windows) {
        Command::new("cmd").arg("/C").arg(command).output()
    } else {
        Command::new("sh").arg("-c").arg(command).output()
    };

    match output {
        Ok(output) => {
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            Object::string(text)
        }
        Err(err) => runtime(format!("cannot run `{}`: {}", command, err)),
    }
}

fn eval_file(evaluator: &mut Evaluator, args: Vec<Object>) -> Object {
    let path = match args.as_slice() {
        [path] => PathBuf::from(arg!(text_arg("eval_file", 1, path))),
        _ => return arity("eval_file", &args, "1"),
    };
    let file = evaluator.base_dir().join(path);

    match fs::read_to_string(&file) {
        Ok(source) => {
            let base_dir = file.parent().map(|dir| dir.to_path_buf()).unwrap_or_default();
            let mut child = evaluator.fork(Env::empty(), base_dir);
            child.run(&source, &file.display().to_string())
        }
        Err(err) => runtime(format!("cannot read {}: {}", file.display(), err)),
    }
}

// Processes and pubsub

fn send(evaluator: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [Object::Process(pid), msg] => Object::Boolean(evaluator.runtime().send(*pid, msg)),
        [obj, _] => wrong("send", 1, "PROCESS", obj),
        _ => arity("send", &args, "2"),
    }
}

fn recv(evaluator: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [] => evaluator.receive().unwrap_or(Object::Null),
        [obj] => match subscription(obj) {
            Some(subscription) => subscription.recv().unwrap_or(Object::Null),
            None => wrong("recv", 1, "SUBSCRIBER", obj),
        },
        _ => arity("recv", &args, "0 or 1"),
    }
}

fn subscribe(evaluator: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [topic] => {
            let topic = arg!(text_arg("subscribe", 1, topic));
            let id = evaluator.runtime().next_id();
            let subscription = evaluator.runtime().broker().subscribe(id, evaluator.pid(), topic);
            Object::host(id, "SUBSCRIBER", subscription)
        }
        [sub, topic] => {
            let topic = arg!(text_arg("subscribe", 2, topic));
            match subscription(sub) {
                Some(subscription) => {
                    Object::Boolean(evaluator.runtime().broker().add_topic(subscription.id, topic))
                }
                None => wrong("subscribe", 1, "SUBSCRIBER", sub),
            }
        }
        _ => arity("subscribe", &args, "1 or 2"),
    }
}

fn unsubscribe(evaluator: &mut Evaluator, args: Vec<Object>) -> Object {
    let (sub, topic) = match args.as_slice() {
        [sub] => (sub, None),
        [sub, topic] => (sub, Some(arg!(text_arg("unsubscribe", 2, topic)))),
        _ => return arity("unsubscribe", &args, "1 or 2"),
    };
    match subscription(sub) {
        Some(subscription) => {
            evaluator.runtime().broker().unsubscribe(subscription.id, topic);
            Object::Null
        }
        None => wrong("unsubscribe", 1, "SUBSCRIBER", sub),
    }
}

fn topics(evaluator: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [sub] => match subscription(sub) {
            Some(subscription) => Object::list(
                evaluator
                    .runtime()
                    .broker()
                    .topics(subscription.id)
                    .into_iter()
                    .map(Object::string)
                    .collect(),
            ),
            None => wrong("topics", 1, "SUBSCRIBER", sub),
        },
        _ => arity("topics", &args, "1"),
    }
}

fn publish(evaluator: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [topic, msg] => {
            let topic = arg!(text_arg("publish", 1, topic));
            Object::Integer(evaluator.runtime().broker().publish(topic, msg) as i64)
        }
        _ => arity("publish", &args, "2"),
    }
}

fn broadcast(evaluator: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [msg] => Object::Integer(evaluator.runtime().broker().broadcast(msg) as i64),
        _ => arity("broadcast", &args, "1"),
    }
}

fn pids(evaluator: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [] => Object::list(evaluator.runtime().pids().into_iter().map(Object::Process).collect()),
        _ => arity("pids", &args, "0"),
    }
}

fn to_map(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [] => Object::map(OrderedMap::new()),
        [Object::Map(map)] => Object::map(map.read_lock().clone()),
        [Object::List(items)] => {
            let mut map = OrderedMap::new();
            for item in items.read_lock().iter() {
                let pair = match item {
                    Object::List(pair) => pair.read_lock().clone(),
                    item => return wrong("dict", 1, "a LIST of pairs", item),
                };
                match pair.as_slice() {
                    [key, value] => map.insert(key.clone(), value.clone()),
                    _ => return wrong("dict", 1, "a LIST of pairs", item),
                }
            }
            Object::map(map)
        }
        [obj] => wrong("dict", 1, "MAP or LIST", obj),
        _ => arity("dict", &args, "0 or 1"),
    }
}

fn is_zero(_: &mut Evaluator, args: Vec<Object>) -> Object {
    match args.as_slice() {
        [Object::BigInteger(n)] => Object::Boolean(n.is_zero()),
        [Object::BigFloat(x)] => Object::Boolean(x.is_zero()),
        [obj] => match arith::to_f64(obj) {
            Some(x) => Object::Boolean(x == 0.0),
            None => wrong("is_zero", 1, "a number", obj),
        },
        _ => arity("is_zero", &args, "1"),
    }
}

#[rustfmt::skip]
static BUILTINS: &[Builtin] = &[
    Builtin { name: "len",         func: len,         help: "len(x): number of items in a string, list, map or set" },
    Builtin { name: "print",       func: print,       help: "print(args...): writes the arguments separated by spaces" },
    Builtin { name: "println",     func: println,     help: "println(args...): like print, followed by a newline" },
    Builtin { name: "type",        func: type_of,     help: "type(x): name of the type of x" },
    Builtin { name: "str",         func: to_str,      help: "str(x): x rendered as a string" },
    Builtin { name: "int",         func: int,         help: "int(x): x converted to an integer" },
    Builtin { name: "float",       func: float,       help: "float(x): x converted to a float" },
    Builtin { name: "uint",        func: uint,        help: "uint(x): x converted to an unsigned integer" },
    Builtin { name: "bigint",      func: bigint,      help: "bigint(x): x converted to an arbitrary precision integer" },
    Builtin { name: "bigfloat",    func: bigfloat,    help: "bigfloat(x): x converted to an arbitrary precision decimal" },
    Builtin { name: "append",      func: append,      help: "append(list, items...): new list with the items added" },
    Builtin { name: "push",        func: push,        help: "push(list, item): adds item to list in place and returns it" },
    Builtin { name: "pop",         func: pop,         help: "pop(list, index = -1): removes and returns an item" },
    Builtin { name: "keys",        func: keys,        help: "keys(map): list of keys in insertion order" },
    Builtin { name: "values",      func: values,      help: "values(map): list of values in insertion order" },
    Builtin { name: "delete",      func: delete,      help: "delete(container, key): removes a key, member or index" },
    Builtin { name: "contains",    func: contains,    help: "contains(container, item): same as `item in container`" },
    Builtin { name: "index_of",    func: index_of,    help: "index_of(list_or_string, item): first position of item or -1" },
    Builtin { name: "slice",       func: slice,       help: "slice(list_or_string, start, end = len): part between two positions" },
    Builtin { name: "reverse",     func: reverse,     help: "reverse(list_or_string): items in reverse order" },
    Builtin { name: "sort",        func: sort,        help: "sort(list, key = null): sorted copy of list" },
    Builtin { name: "sum",         func: sum,         help: "sum(list): total of the items" },
    Builtin { name: "range",       func: range,       help: "range(start = 0, end, step = 1): list of integers before end" },
    Builtin { name: "split",       func: split,       help: "split(string, separator = whitespace): list of parts" },
    Builtin { name: "join",        func: join,        help: "join(list, separator = \"\"): items joined into a string" },
    Builtin { name: "upper",       func: upper,       help: "upper(string): upper case copy" },
    Builtin { name: "lower",       func: lower,       help: "lower(string): lower case copy" },
    Builtin { name: "trim",        func: trim,        help: "trim(string): copy without surrounding whitespace" },
    Builtin { name: "replace",     func: replace,     help: "replace(string, pattern, replacement): replaces every match" },
    Builtin { name: "startswith",  func: startswith,  help: "startswith(string, prefix)" },
    Builtin { name: "endswith",    func: endswith,    help: "endswith(string, suffix)" },
    Builtin { name: "chars",       func: chars,       help: "chars(string): list of single character strings" },
    Builtin { name: "set",         func: set,         help: "set(iterable = none): set of the items" },
    Builtin { name: "list",        func: list,        help: "list(iterable = none): list of the items; maps give [key, value] pairs" },
    Builtin { name: "dict",        func: to_map,      help: "dict(pairs = none): map built from [key, value] pairs" },
    Builtin { name: "map",         func: map,         help: "map(iterable, f): list of f applied to every item" },
    Builtin { name: "filter",      func: filter,      help: "filter(iterable, f): items for which f is truthy" },
    Builtin { name: "reduce",      func: reduce,      help: "reduce(iterable, f, initial = first item): folds the items with f" },
    Builtin { name: "any",         func: any,         help: "any(iterable, f = null): true if any item (or f(item)) is truthy" },
    Builtin { name: "all",         func: all,         help: "all(iterable, f = null): true if every item (or f(item)) is truthy" },
    Builtin { name: "abs",         func: abs,         help: "abs(number): absolute value" },
    Builtin { name: "min",         func: min,         help: "min(list) or min(a, b, ...): smallest value" },
    Builtin { name: "max",         func: max,         help: "max(list) or max(a, b, ...): largest value" },
    Builtin { name: "round",       func: round,       help: "round(number, digits = 0): number rounded to digits places" },
    Builtin { name: "is_zero",     func: is_zero,     help: "is_zero(number): true for any zero value" },
    Builtin { name: "error",       func: error,       help: "error(message): raises a RuntimeError" },
    Builtin { name: "assert",      func: assert,      help: "assert(cond, message = null): raises a RuntimeError unless cond holds" },
    Builtin { name: "exit",        func: exit,        help: "exit(code = 0): ends the program with status code" },
    Builtin { name: "help",        func: help,        help: "help(x): help text of a builtin or docstring of a function" },
    Builtin { name: "sleep",       func: sleep,       help: "sleep(ms): suspends the current process" },
    Builtin { name: "exec",        func: exec,        help: "exec(command): runs a shell command and returns its output" },
    Builtin { name: "eval_file",   func: eval_file,   help: "eval_file(path): evaluates a script in a fresh environment" },
    Builtin { name: "send",        func: send,        help: "send(pid, message): puts a copy of message in a process mailbox" },
    Builtin { name: "recv",        func: recv,        help: "recv(subscriber = none): waits for the next message" },
    Builtin { name: "subscribe",   func: subscribe,   help: "subscribe(topic) or subscribe(subscriber, topic)" },
    Builtin { name: "unsubscribe", func: unsubscribe, help: "unsubscribe(subscriber, topic = none): drops one or all topics" },
    Builtin { name: "topics",      func: topics,      help: "topics(subscriber): topics the subscriber listens to" },
    Builtin { name: "publish",     func: publish,     help: "publish(topic, message): delivers to every subscriber; returns the count" },
    Builtin { name: "broadcast",   func: broadcast,   help: "broadcast(message): delivers to every subscriber of any topic" },
    Builtin { name: "pids",        func: pids,        help: "pids(): every running process" },
    Builtin { name: "is_match",    func: is_match,    help: "is_match(regex, string): true if the regex matches" },
    Builtin { name: "find_all",    func: find_all,    help: "find_all(regex, string): every match as a list of strings" },
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::Config;

    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn run(input: &str) -> Object {
        Evaluator::new(Config::default()).run(input, "test")
    }

    fn strings(items: &[&str]) -> Object {
        Object::list(items.iter().map(Object::string).collect())
    }

    fn ints(items: &[i64]) -> Object {
        Object::list(items.iter().copied().map(Object::Integer).collect())
    }

    #[test_case("len(\"héllo\")"                , Object::Integer(5)                 ; "len codepoints")]
    #[test_case("len([1, 2, 3])"                , Object::Integer(3)                 ; "len list")]
    #[test_case("len({1: 2})"                   , Object::Integer(1)                 ; "len map")]
    #[test_case("type(1.5)"                     , Object::string("FLOAT")            ; "type float")]
    #[test_case("str([1, \"a\"])"               , Object::string("[1, \"a\"]")       ; "str list")]
    #[test_case("int(\"42\")"                   , Object::Integer(42)                ; "int string")]
    #[test_case("int(3.9)"                      , Object::Integer(3)                 ; "int float")]
    #[test_case("float(2)"                      , Object::Float(2.0)                 ; "float int")]
    #[test_case("uint(\"0xff\")"                , Object::UInteger(255)              ; "uint hex")]
    #[test_case("append([1], 2, 3)"             , ints(&[1, 2, 3])                   ; "append")]
    #[test_case("var xs = [1]; xs.push(2); xs"  , ints(&[1, 2])                      ; "push in place")]
    #[test_case("var xs = [1, 2]; xs.pop()"     , Object::Integer(2)                 ; "pop")]
    #[test_case("[].pop()"                      , Object::Null                       ; "pop empty")]
    #[test_case("keys({\"b\": 1, \"a\": 2})"    , strings(&["b", "a"])               ; "keys ordered")]
    #[test_case("var m = {1: 2}; delete(m, 1); len(m)", Object::Integer(0)           ; "delete key")]
    #[test_case("[1, 2].contains(2)"            , Object::Boolean(true)              ; "contains")]
    #[test_case("\"añb\".index_of(\"b\")"       , Object::Integer(2)                 ; "index_of codepoints")]
    #[test_case("[1, 2, 3, 4].slice(1, -1)"     , ints(&[2, 3])                      ; "slice")]
    #[test_case("\"hello\".slice(1, 3)"         , Object::string("el")               ; "slice string")]
    #[test_case("reverse(\"abc\")"              , Object::string("cba")              ; "reverse")]
    #[test_case("sort([3, 1, 2.5])"             , Object::list(vec![Object::Integer(1), Object::Float(2.5), Object::Integer(3)]) ; "sort mixed numbers")]
    #[test_case("sort([\"bb\", \"a\"], len)"    , strings(&["a", "bb"])              ; "sort by key")]
    #[test_case("sum([1, 2, 3])"                , Object::Integer(6)                 ; "sum")]
    #[test_case("range(3)"                      , ints(&[0, 1, 2])                   ; "range end")]
    #[test_case("range(5, 0, -2)"               , ints(&[5, 3, 1])                   ; "range step")]
    #[test_case("\"a b  c\".split()"            , strings(&["a", "b", "c"])          ; "split whitespace")]
    #[test_case("\"a,b\".split(\",\")"          , strings(&["a", "b"])               ; "split separator")]
    #[test_case("[1, 2].join(\"-\")"            , Object::string("1-2")              ; "join")]
    #[test_case("\"  x \".trim().upper()"       , Object::string("X")                ; "chained dot calls")]
    #[test_case("\"aXbX\".replace(\"X\", \"-\")", Object::string("a-b-")             ; "replace")]
    #[test_case("\"a1b22\".replace(r/[0-9]+/, \"#\")", Object::string("a#b#")        ; "replace regex")]
    #[test_case("\"x\".startswith(\"y\")"       , Object::Boolean(false)             ; "startswith")]
    #[test_case("len(set([1, 1, 2]))"           , Object::Integer(2)                 ; "set from list")]
    #[test_case("list({1: 2})"                  , Object::list(vec![ints(&[1, 2])])  ; "list from map")]
    #[test_case("dict([[1, 2]])[1]"             , Object::Integer(2)                 ; "dict from pairs")]
    #[test_case("map([1, 2], |x| => x * 10)"    , ints(&[10, 20])                    ; "map")]
    #[test_case("[1, 2, 3, 4].filter(|x| => x % 2 == 0)", ints(&[2, 4])              ; "filter")]
    #[test_case("reduce([1, 2, 3], |a, b| => a + b)", Object::Integer(6)             ; "reduce")]
    #[test_case("reduce([], |a, b| => a + b, 10)", Object::Integer(10)               ; "reduce initial")]
    #[test_case("any([0, null, false])"         , Object::Boolean(true)              ; "any truthy zero")]
    #[test_case("all([1, 2], |x| => x > 1)"     , Object::Boolean(false)             ; "all with predicate")]
    #[test_case("abs(-3)"                       , Object::Integer(3)                 ; "abs")]
    #[test_case("min(3, 1, 2)"                  , Object::Integer(1)                 ; "min args")]
    #[test_case("max([\"a\", \"c\", \"b\"])"    , Object::string("c")                ; "max list")]
    #[test_case("round(2.5)"                    , Object::Integer(3)                 ; "round")]
    #[test_case("round(3.14159, 2)"             , Object::Float(3.14)                ; "round digits")]
    #[test_case("is_match(r/^a+$/, \"aaa\")"    , Object::Boolean(true)              ; "is_match")]
    #[test_case("find_all(\"[0-9]\", \"a1b2\")" , strings(&["1", "2"])               ; "find_all")]
    #[test_case("help(len)"                     , Object::string("len(x): number of items in a string, list, map or set") ; "help builtin")]
    #[test_case("fun f() {\n## Adds.\n1 }\nhelp(f)", Object::string("Adds.")         ; "help docstring")]
    #[test_case("assert(1 == 1)"                , Object::Null                       ; "assert holds")]
    #[test_case("len(pids())"                   , Object::Integer(1)                 ; "only main process")]
    fn test(input: &str, expected: Object) {
        assert_eq!(run(input), expected)
    }

    #[test_case("len(1)"                , ErrorKind::Argument ; "len wrong type")]
    #[test_case("len()"                 , ErrorKind::Argument ; "len arity")]
    #[test_case("int(\"abc\")"          , ErrorKind::Type     ; "int unparsable")]
    #[test_case("sort([1, \"a\"])"      , ErrorKind::Type     ; "sort unordered")]
    #[test_case("range(1, 2, 0)"        , ErrorKind::Arithmetic ; "range zero step")]
    #[test_case("error(\"boom\")"       , ErrorKind::Runtime  ; "user error")]
    #[test_case("assert(false, \"no\")" , ErrorKind::Runtime  ; "assert fails")]
    #[test_case("exit(3)"               , ErrorKind::Exit(3)  ; "exit code")]
    #[test_case("len([1], named = 2)"   , ErrorKind::Argument ; "named args rejected")]
    fn test_error(input: &str, expected: ErrorKind) {
        match run(input) {
            Object::Error(error) => assert_eq!(error.kind, expected, "{}", error),
            obj => panic!("expected an error, got {}", obj),
        }
    }

    #[test]
    fn arity_error_reports_name_got_and_want() {
        match run("len(1, 2)") {
            Object::Error(error) => assert_eq!(
                error.message,
                "wrong number of arguments to `len`: got 2, want 1"
            ),
            obj => panic!("expected an error, got {}", obj),
        }
    }

    #[test]
    fn type_error_reports_position() {
        match run("startswith(\"a\", 1)") {
            Object::Error(error) => assert_eq!(
                error.message,
                "argument 2 to `startswith` must be STRING, got INTEGER"
            ),
            obj => panic!("expected an error, got {}", obj),
        }
    }

    #[test]
    fn pubsub_round_trip() {
        let input = "var sub = subscribe(\"news\"); \
                     val n = publish(\"news\", {\"id\": 1}); \
                     [n, recv(sub)[\"id\"], topics(sub)]";
        assert_eq!(
            run(input),
            Object::list(vec![Object::Integer(1), Object::Integer(1), strings(&["news"])])
        );
    }

    #[test]
    fn unsubscribed_receiver_yields_null() {
        let input = "var sub = subscribe(\"t\"); unsubscribe(sub); [publish(\"t\", 1), recv(sub)]";
        assert_eq!(run(input), Object::list(vec![Object::Integer(0), Object::Null]));
    }

    #[test]
    fn exec_captures_output() {
        if cfg!(windows) {
            return;
        }
        assert_eq!(run("exec(\"echo hi\")"), Object::string("hi\n"));
        assert_eq!(run("`echo #{1 + 1}`"), Object::string("2\n"));
    }

    #[test]
    fn eval_file_uses_fresh_environment() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("side.b"), "var y = 2\ny * 21").unwrap();
        let mut evaluator = Evaluator::new(Config {
            base_dir: dir.path().to_path_buf(),
            ..Config::default()
        });

        assert_eq!(
            evaluator.run("var y = 1\n[eval_file(\"side.b\"), y]", "main.b"),
            ints(&[42, 1])
        );
    }
}
