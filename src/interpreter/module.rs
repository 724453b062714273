use crate::embed;
use crate::interpreter::environment::Env;
use crate::interpreter::error::ErrorObject;
use crate::interpreter::object::{Module, Object};
use crate::interpreter::Evaluator;
use crate::parser::parse_program;
use crate::stdlib;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use itertools::Itertools;
use tracing::debug;

pub const EXTENSION: &str = "b";

/// Resolves `import a.b.c`: standard library names first, then
/// `<base_dir>/a/b/c.b` (or the same relative path inside a bundle).
/// Every module is evaluated once per runtime and cached.
pub fn import(evaluator: &mut Evaluator, path: &[String]) -> Result<Object, ErrorObject> {
    let dotted = path.iter().join(".");

    if let [name] = path {
        if let Some(module) = stdlib::find(name) {
            return stdlib::load(evaluator, module);
        }
    }

    let relative: PathBuf = path.iter().collect::<PathBuf>().with_extension(EXTENSION);
    let file = evaluator.base_dir().join(&relative);
    let key = file.display().to_string();

    if let Some(module) = evaluator.runtime().cached_module(&key) {
        return Ok(module);
    }

    let source = read_source(&file)
        .ok_or_else(|| ErrorObject::import(format!("module `{}` not found at {}", dotted, key)))?;

    if !evaluator.runtime().begin_loading(&key) {
        return Err(ErrorObject::import(format!("circular import of `{}`", dotted)));
    }
    let base_dir = file.parent().map_or_else(PathBuf::new, Path::to_path_buf);
    let result = evaluate(evaluator, &dotted, &key, &source, base_dir);
    evaluator.runtime().end_loading(&key);

    let module = result?;
    evaluator.runtime().cache_module(&key, module.clone());
    debug!(module = %dotted, file = %key, "imported");

    Ok(module)
}

// Bundled programs keep their scripts keyed by path relative to the entry.
fn read_source(file: &Path) -> Option<String> {
    if embed::is_embed() {
        let key = file.to_string_lossy().replace('\\', "/");
        return embed::bundle().and_then(|files| files.read(&key).map(str::to_string));
    }
    fs::read_to_string(file).ok()
}

/// Evaluates `source` in a fresh environment and wraps it as a module
/// named after the last component of `dotted`.
pub(crate) fn evaluate(
    evaluator: &Evaluator,
    dotted: &str,
    file: &str,
    source: &str,
    base_dir: PathBuf,
) -> Result<Object, ErrorObject> {
    evaluate_in(evaluator, dotted, file, source, Env::empty(), base_dir)
}

pub(crate) fn evaluate_in(
    evaluator: &Evaluator,
    dotted: &str,
    file: &str,
    source: &str,
    env: Env,
    base_dir: PathBuf,
) -> Result<Object, ErrorObject> {
    evaluator.runtime().add_source(file, source);

    let program = parse_program(source, file).map_err(|errors| {
        let message = errors.iter().map(|error| error.to_string()).join("; ");
        ErrorObject::import(format!("cannot parse `{}`: {}", dotted, message))
    })?;

    let mut module_evaluator = evaluator.fork(env.clone(), base_dir);
    if let Object::Error(error) = module_evaluator.eval(&program) {
        if error.is_exit() {
            return Err((*error).clone());
        }
        return Err(ErrorObject::import(format!("error in `{}`: {}", dotted, error)));
    }

    let name = dotted.rsplit('.').next().unwrap_or(dotted).to_string();
    Ok(Object::Module(Arc::new(Module { name, env })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::interpreter::Config;

    use pretty_assertions::assert_eq;

    fn evaluator_in(dir: &Path) -> Evaluator {
        Evaluator::new(Config {
            base_dir: dir.to_path_buf(),
            ..Config::default()
        })
    }

    #[test]
    fn imports_nested_path() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("util")).unwrap();
        fs::write(dir.path().join("util/strings.b"), "fun shout(s) { s.upper() + \"!\" }").unwrap();

        let mut evaluator = evaluator_in(dir.path());
        let result = evaluator.run("import util.strings\nstrings.shout(\"hi\")", "main.b");

        assert_eq!(result, Object::string("HI!"));
    }

    #[test]
    fn modules_are_cached() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("counter.b"), "var n = 0\nfun bump() { n += 1; n }").unwrap();

        let mut evaluator = evaluator_in(dir.path());
        let result = evaluator.run(
            "import counter\ncounter.bump()\nimport counter\ncounter.bump()",
            "main.b",
        );

        assert_eq!(result, Object::Integer(2));
    }

    #[test]
    fn missing_module_is_import_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut evaluator = evaluator_in(dir.path());

        match evaluator.run("import nope", "main.b") {
            Object::Error(error) => assert_eq!(error.kind, ErrorKind::Import),
            obj => panic!("expected an error, got {}", obj),
        }
    }

    #[test]
    fn circular_import_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.b"), "import b").unwrap();
        fs::write(dir.path().join("b.b"), "import a").unwrap();

        let mut evaluator = evaluator_in(dir.path());
        match evaluator.run("import a", "main.b") {
            Object::Error(error) => {
                assert_eq!(error.kind, ErrorKind::Import);
                assert!(error.message.contains("circular"), "{}", error);
            }
            obj => panic!("expected an error, got {}", obj),
        }
    }

    #[test]
    fn unknown_member_is_import_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("m.b"), "val x = 1").unwrap();

        let mut evaluator = evaluator_in(dir.path());
        match evaluator.run("import m\nm.y", "main.b") {
            Object::Error(error) => assert_eq!(error.kind, ErrorKind::Import),
            obj => panic!("expected an error, got {}", obj),
        }
    }
}
