//! Command-line entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use elfas::{AsmError, Compiler};

#[derive(Debug, clap::Parser)]
#[clap(author, version, about)]
struct Args {
    /// Input assembly source file
    input: PathBuf,

    /// Output executable path
    #[clap(short, long, default_value = "a.out")]
    output: PathBuf,

    /// Print the token stream and exit without assembling
    #[clap(long)]
    dump_tokens: bool,

    /// Print the parsed statement stream and exit without assembling
    #[clap(long)]
    dump_ast: bool,
}

fn main() -> ExitCode {
    use clap::Parser;

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error:{}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), AsmError> {
    let source = std::fs::read_to_string(&args.input).map_err(|source| AsmError::Io {
        path: args.input.clone(),
        source,
    })?;

    if args.dump_tokens {
        for token in elfas::lexer::tokenize(&source) {
            println!("{} {:?}", token.kind, token.text());
        }
        return Ok(());
    }

    if args.dump_ast {
        let mut parser = elfas::Parser::new(&source);
        while let Some(stmt) = parser.next_statement() {
            println!("{}", stmt);
        }
        for diag in parser.diagnostics() {
            eprintln!("warning: {}", diag);
        }
        return Ok(());
    }

    let mut compiler = Compiler::new(source);
    compiler.set_output(&args.output);
    compiler.compile()
}
