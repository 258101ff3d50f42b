use std::{path::PathBuf, process::ExitCode};

use chainc::{
    frontend::{SourceFile, SourceFileOrigin},
    ir::{interpret, pretty_print::pretty_print_module},
};
use clap::{CommandFactory, Parser as ClapParser, error::ErrorKind};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

#[derive(Debug, ClapParser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Chainlang program to compile
    source_file: PathBuf,

    /// Where the textual IR is written
    #[arg(short, long, default_value = "output.ll")]
    output: PathBuf,

    /// Interpret the module after writing it
    #[arg(long)]
    run: bool,

    /// Print the IR to stdout
    #[arg(long)]
    print_ir: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if !args.source_file.is_file() {
        Args::command()
            .error(
                ErrorKind::InvalidValue,
                format!(
                    "Source file '{}' does not exist or is not a file!",
                    args.source_file.display()
                ),
            )
            .exit()
    }

    let contents = match std::fs::read_to_string(&args.source_file) {
        Ok(contents) => contents,
        Err(error) => {
            report(format!(
                "failed to read '{}': {error}",
                args.source_file.display()
            ));
            return ExitCode::FAILURE;
        }
    };

    let source_file = SourceFile {
        contents,
        origin: SourceFileOrigin::File(args.source_file.clone()),
    };

    let module = match chainc::compile_to_artifact(&source_file, &args.output) {
        Ok(module) => module,
        Err(error) => {
            report(format!("{error} ({})", source_file.origin));
            return ExitCode::FAILURE;
        }
    };

    if args.print_ir {
        print!("{}", pretty_print_module(&module));
    }

    if !args.run {
        return ExitCode::SUCCESS;
    }

    match interpret::run(&module) {
        Ok(execution) => {
            print!("{}", execution.stdout);
            ExitCode::from(execution.exit_code as u8)
        }
        Err(trap) => {
            report(format!("program trapped: {trap}"));
            ExitCode::FAILURE
        }
    }
}

fn report(message: String) {
    eprintln!("{}: {}", "error".red(), message);
}
