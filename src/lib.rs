pub mod builtin;
pub mod bundle;
pub mod embed;
pub mod error;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod repl;
pub mod stdlib;

pub use error::{BlueError, ErrorKind, Result};
pub use interpreter::{Config, Evaluator, Object};

use crate::embed::{Files, STDLIB};
use crate::parser::ParseError;

use std::fs;
use std::path::Path;
use std::thread;

use tracing::debug;

const MAIN_STACK_SIZE: usize = 256 * 1024 * 1024;

/// Lexes, parses and evaluates `source` as the main program `file`.
/// Lexical errors abort before parsing, syntax errors before evaluation.
pub fn run_source(source: &str, file: &str, config: Config) -> Result<Object> {
    let illegal = lexer::lexical_errors(source, file);
    if !illegal.is_empty() {
        return Err(BlueError::Parse(
            illegal
                .into_iter()
                .map(|token| ParseError::lexical(token.literal, token.pos))
                .collect(),
        ));
    }

    let program = parser::parse_program(source, file).map_err(BlueError::Parse)?;

    let mut evaluator = Evaluator::new(config);
    evaluator.runtime().add_source(file, source);

    match evaluator.eval(&program) {
        Object::Error(error) => match error.kind {
            ErrorKind::Exit(code) => Err(BlueError::Exit(code)),
            _ => Err(BlueError::Runtime {
                error: (*error).clone(),
                trace: evaluator.take_trace(),
            }),
        },
        obj => Ok(obj),
    }
}

/// Runs a script from disk; imports resolve next to it.
pub fn run_file<P: AsRef<Path>>(path: P, args: Vec<String>) -> Result<Object> {
    let path = path.as_ref();
    let source = fs::read_to_string(path)?;
    debug!(file = %path.display(), "running");

    let config = Config {
        entry: Some(path.to_path_buf()),
        base_dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
        args,
    };
    run_source(&source, &path.display().to_string(), config)
}

/// Entry point of bundled executables: `files` holds every script of the
/// program keyed by its path relative to the entry script. Returns the
/// process exit status.
pub fn run_embedded(entry: &'static str, files: &'static [(&'static str, &'static str)]) -> i32 {
    embed::install_bundle(files);

    let result = with_large_stack(move || {
        let source = embed::bundle()
            .and_then(|files| files.read(entry))
            .ok_or_else(|| BlueError::Bundle(format!("{} is missing from the bundle", entry)))?;
        let config = Config {
            entry: Some(entry.into()),
            args: std::env::args().skip(1).collect(),
            ..Config::default()
        };
        run_source(source, entry, config)
    });

    exit_status(result)
}

/// Prints an uncaught error to stderr and maps a result to an exit status.
pub fn exit_status(result: Result<Object>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(BlueError::Exit(code)) => code,
        Err(error) => {
            eprintln!("{}", report(&error));
            error.exit_code()
        }
    }
}

/// Renders `error` with source excerpts read from disk, the bundle or the
/// standard library.
pub fn report(error: &BlueError) -> String {
    error.report(source_text)
}

fn source_text(file: &str) -> Option<String> {
    if let Some(name) = file.strip_prefix("<std>/") {
        return STDLIB.read(&format!("{}.b", name)).map(str::to_string);
    }
    if let Some(files) = embed::bundle() {
        return files.read(file).map(str::to_string);
    }
    fs::read_to_string(file).ok()
}

/// Runs `f` on a thread whose stack is deep enough for recursive scripts.
pub fn with_large_stack<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let handle = thread::Builder::new()
        .name("blue-main".to_string())
        .stack_size(MAIN_STACK_SIZE)
        .spawn(f)?;

    match handle.join() {
        Ok(result) => result,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
