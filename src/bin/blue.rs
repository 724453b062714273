use blue_lang::bundle::bundle;
use blue_lang::repl::{repl, Mode};
use blue_lang::{exit_status, run_file, with_large_stack, Config};

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "The Blue programming language", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Script to run (exclude for repl)
    file: Option<PathBuf>,

    /// Arguments passed to the script
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a script
    Run {
        file: PathBuf,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Start an interactive session
    Repl {
        #[arg(long, value_enum, default_value_t = Mode::Evaluator)]
        mode: Mode,
    },
    /// Compile a script and its imports into a standalone executable
    Bundle {
        file: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the version
    Version,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("BLUE_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let command = match (cli.command, cli.file) {
        (Some(command), _) => command,
        (None, Some(file)) => Command::Run { file, args: cli.args },
        (None, None) => Command::Repl { mode: Mode::Evaluator },
    };

    match command {
        Command::Run { file, args } => {
            let result = with_large_stack(move || run_file(file, args));
            process::exit(exit_status(result));
        }
        Command::Repl { mode } => {
            println!("This is the Blue programming language!");
            println!("Feel free to type in commands! (.help for help)");

            if let Err(error) = with_large_stack(move || Ok(repl(mode, Config::default())?)) {
                eprintln!("{}", error);
                process::exit(1);
            }
        }
        Command::Bundle { file, output } => match bundle(&file, output.as_deref()) {
            Ok(binary) => println!("wrote {}", binary.display()),
            Err(error) => {
                eprintln!("{}", error);
                process::exit(error.exit_code());
            }
        },
        Command::Version => println!("blue {}", env!("CARGO_PKG_VERSION")),
    }
}
