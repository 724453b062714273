use crate::error::BlueError;
use crate::interpreter::{Config, Evaluator, Object};
use crate::lexer::{Lexer, TokenKind};
use crate::parser::parse_program;

use std::fs;
use std::io::{self, BufRead, Write};

use clap::ValueEnum;
use itertools::Itertools;

const PROMPT: &str = ">> ";

const HELP: &str = "\
.exit           leave the session
.help           show this message
.save <file>    write every successfully evaluated line to <file>
.load <file>    evaluate <file> in this session";

/// What the REPL does with each line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Print the tokens of each line.
    Lexer,
    /// Print the parsed and pretty-printed program.
    Parser,
    /// Evaluate each line in a persistent environment.
    Evaluator,
}

#[derive(Debug, PartialEq)]
pub enum Reply {
    Quit,
    Output(String),
}

pub struct Repl {
    mode: Mode,
    evaluator: Evaluator,
    history: Vec<String>,
    counter: usize,
}

impl Repl {
    pub fn new(mode: Mode, config: Config) -> Repl {
        Repl {
            mode,
            evaluator: Evaluator::new(config),
            history: Vec::new(),
            counter: 0,
        }
    }

    /// Lines evaluated without error, in order.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn handle(&mut self, line: &str) -> Reply {
        let line = line.trim();

        if let Some(command) = line.strip_prefix('.') {
            return self.command(command);
        }
        if line.is_empty() {
            return Reply::Output(String::new());
        }

        match self.mode {
            Mode::Lexer => Reply::Output(tokens(line)),
            Mode::Parser => Reply::Output(match parse_program(line, "<repl>") {
                Ok(program) => program.to_string(),
                Err(errors) => errors.iter().join("\n"),
            }),
            Mode::Evaluator => self.evaluate(line),
        }
    }

    fn command(&mut self, command: &str) -> Reply {
        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (command, ""),
        };

        match (name, arg) {
            ("exit", _) => Reply::Quit,
            ("help", _) => Reply::Output(HELP.to_string()),
            ("save", "") | ("load", "") => Reply::Output(format!("usage: .{} <file>", name)),
            ("save", file) => Reply::Output(match fs::write(file, self.history.iter().join("\n") + "\n") {
                Ok(()) => format!("saved {} lines to {}", self.history.len(), file),
                Err(error) => format!("cannot save {}: {}", file, error),
            }),
            ("load", file) => match fs::read_to_string(file) {
                Ok(source) => self.execute(&source, file).unwrap_or_else(|failed| failed),
                Err(error) => Reply::Output(format!("cannot load {}: {}", file, error)),
            },
            _ => Reply::Output(format!("unknown command .{} (try .help)", name)),
        }
    }

    fn evaluate(&mut self, line: &str) -> Reply {
        let file = format!("<repl:{}>", self.history.len() + 1);
        match self.execute(line, &file) {
            Ok(reply) => {
                self.history.push(line.to_string());
                reply
            }
            Err(failed) => failed,
        }
    }

    /// `Err` carries the rendered error of a failed evaluation.
    fn execute(&mut self, source: &str, file: &str) -> Result<Reply, Reply> {
        match self.evaluator.run(source, file) {
            Object::Error(error) if error.is_exit() => Ok(Reply::Quit),
            Object::Error(error) => {
                let runtime = self.evaluator.runtime().clone();
                let report = BlueError::Runtime {
                    error: (*error).clone(),
                    trace: self.evaluator.take_trace(),
                }
                .report(|file| runtime.source(file));
                Err(Reply::Output(report))
            }
            Object::Null => Ok(Reply::Output(String::new())),
            obj => {
                self.counter += 1;
                let name = format!("_{}", self.counter);
                self.evaluator.env().define(&name, obj.clone(), false);
                Ok(Reply::Output(format!("{} = {}", name, obj.repr())))
            }
        }
    }
}

fn tokens(line: &str) -> String {
    Lexer::new(line, "<repl>")
        .take_while(|token| token.kind != TokenKind::Eof)
        .map(|token| format!("{:<10} {}", format!("{:?}", token.kind), token))
        .join("\n")
}

pub fn repl(mode: Mode, config: Config) -> io::Result<()> {
    let mut session = Repl::new(mode, config);
    let stdin = io::stdin();
    let mut buffer = String::new();

    loop {
        print!("{}", PROMPT);
        io::stdout().flush()?;

        buffer.clear();
        if stdin.lock().read_line(&mut buffer)? == 0 {
            return Ok(());
        }

        match session.handle(&buffer) {
            Reply::Quit => return Ok(()),
            Reply::Output(text) if text.is_empty() => {}
            Reply::Output(text) => println!("{}", text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn output(reply: Reply) -> String {
        match reply {
            Reply::Output(text) => text,
            Reply::Quit => panic!("unexpected quit"),
        }
    }

    #[test]
    fn results_are_numbered() {
        let mut repl = Repl::new(Mode::Evaluator, Config::default());

        assert_eq!(output(repl.handle("1 + 2")), "_1 = 3");
        assert_eq!(output(repl.handle("val s = \"x\"")), "");
        assert_eq!(output(repl.handle("s + \"y\"")), "_2 = \"xy\"");
        assert_eq!(output(repl.handle("_1 * 10")), "_3 = 30");
    }

    #[test]
    fn failed_lines_are_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("session.b");
        let mut repl = Repl::new(Mode::Evaluator, Config::default());

        repl.handle("var x = 1");
        let error = output(repl.handle("x + y"));
        assert!(error.starts_with("NameError"), "{}", error);
        repl.handle("x += 1");
        repl.handle(&format!(".save {}", file.display()));

        assert_eq!(repl.history(), ["var x = 1", "x += 1"]);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "var x = 1\nx += 1\n");
    }

    #[test]
    fn load_evaluates_into_session() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lib.b");
        std::fs::write(&file, "fun twice(n) { n * 2 }").unwrap();
        let mut repl = Repl::new(Mode::Evaluator, Config::default());

        repl.handle(&format!(".load {}", file.display()));

        assert_eq!(output(repl.handle("twice(21)")), "_1 = 42");
    }

    #[test]
    fn commands() {
        let mut repl = Repl::new(Mode::Evaluator, Config::default());

        assert!(output(repl.handle(".help")).contains(".save <file>"));
        assert_eq!(output(repl.handle(".save")), "usage: .save <file>");
        assert!(output(repl.handle(".nope")).starts_with("unknown command"));
        assert_eq!(repl.handle(".exit"), Reply::Quit);
        assert_eq!(repl.handle("exit(3)"), Reply::Quit);
    }

    #[test]
    fn parser_mode_pretty_prints() {
        let mut repl = Repl::new(Mode::Parser, Config::default());

        assert_eq!(output(repl.handle("val x = 1 + 2 * 3")), "val x = (1 + (2 * 3));");
    }

    #[test]
    fn lexer_mode_lists_tokens() {
        let mut repl = Repl::new(Mode::Lexer, Config::default());
        let text = output(repl.handle("x += 1"));

        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().next().is_some_and(|line| line.ends_with(" x")));
    }
}
