//! Rill CLI
//!
//! Run a script, start a REPL, or generate shell completions.
//!
//! Exit codes follow the usual interpreter convention: 65 for compile
//! errors, 70 for runtime errors, 74 when the script file cannot be read.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{Shell, generate};
use rill_runtime::vm::{InterpretResult, Vm};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;

#[derive(ClapParser)]
#[command(name = "rill")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Rill interpreter - run scripts or start an interactive session", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a Rill script
    Run {
        /// Script file to execute
        script: PathBuf,

        /// Disassemble the compiled bytecode to stderr before running
        #[arg(long)]
        dump_bytecode: bool,
    },

    /// Start an interactive session
    Repl,

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    // Log filtering comes from the environment (RUST_LOG); diagnostics for
    // program errors go to stderr separately.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run {
            script,
            dump_bytecode,
        }) => run_file(&script, dump_bytecode),
        Some(Commands::Repl) | None => run_repl(),
        Some(Commands::Completions { shell }) => run_completions(shell),
    }
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "rill", &mut io::stdout());
}

fn run_repl() {
    if let Err(e) = rill_runtime::repl::run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run_file(script: &Path, dump_bytecode: bool) {
    let source = match fs::read_to_string(script) {
        Ok(source) => source,
        Err(_) => {
            eprintln!("Could not open file \"{}\".", script.display());
            process::exit(74);
        }
    };

    let mut vm = Vm::new();
    let result = if dump_bytecode {
        match vm.compile_only(&source) {
            Err(_) => InterpretResult::CompileError,
            Ok(chunk) => {
                let name = script.display().to_string();
                let _ = rill_core::debug::disassemble_chunk(&chunk, &name, &mut io::stderr());
                vm.run(&chunk)
            }
        }
    } else {
        vm.interpret(&source)
    };

    match result {
        InterpretResult::Ok => {}
        InterpretResult::CompileError => process::exit(65),
        InterpretResult::RuntimeError => process::exit(70),
    }
}
