use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use sprig::evaluator::DEFAULT_MAX_CALL_DEPTH;
use sprig::{Error, Interpreter, InterpreterConfig, Lexer, parse_program};
use tracing::{debug, warn};

/// Sprig - a small dynamically typed scripting language
#[derive(Parser, Debug)]
#[command(name = "sprig")]
#[command(about = "Run sprig scripts", long_about = None)]
struct Args {
    /// Script to run (reads stdin when neither a file nor -e is given)
    file: Option<PathBuf>,

    /// Run SOURCE directly and print its value
    #[arg(short = 'e', long = "eval", value_name = "SOURCE", conflicts_with = "file")]
    eval: Option<String>,

    /// Maximum nested function calls before a stack overflow is reported
    #[arg(long, default_value_t = DEFAULT_MAX_CALL_DEPTH)]
    max_depth: usize,

    /// Print the token stream instead of running
    #[arg(long, conflicts_with = "ast")]
    tokens: bool,

    /// Print the parsed program instead of running
    #[arg(long)]
    ast: bool,
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    // RUST_LOG controls the level, warnings only by default
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

// Returns a display name for diagnostics along with the source text.
fn load_source(args: &Args) -> io::Result<(String, String)> {
    if let Some(source) = &args.eval {
        return Ok(("<eval>".to_string(), source.clone()));
    }
    match &args.file {
        Some(path) => Ok((path.display().to_string(), std::fs::read_to_string(path)?)),
        None => {
            let mut source = String::new();
            io::stdin().read_to_string(&mut source)?;
            Ok(("<stdin>".to_string(), source))
        }
    }
}

fn report(error: &Error, name: &str, source: &str) -> ExitCode {
    if let Err(e) = error.eprint_report(name, source) {
        warn!(%e, "could not render diagnostic");
        eprintln!("{}", error.plain_message(name, source));
    }
    ExitCode::FAILURE
}

fn dump_tokens(name: &str, source: &str) -> ExitCode {
    for token in Lexer::new(source) {
        match token {
            Ok(token) => println!(
                "{:<10} {:<16} {:?}",
                token.span.to_string(),
                format!("{:?}", token.kind),
                token.lexeme
            ),
            Err(e) => return report(&e.into(), name, source),
        }
    }
    ExitCode::SUCCESS
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging();

    let (name, source) = match load_source(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: could not read input: {}", e);
            return ExitCode::FAILURE;
        }
    };
    debug!(%name, bytes = source.len(), "loaded source");

    if args.tokens {
        return dump_tokens(&name, &source);
    }

    let program = match parse_program(&source) {
        Ok(program) => program,
        Err(e) => return report(&e.into(), &name, &source),
    };
    if args.ast {
        println!("{}", program);
        return ExitCode::SUCCESS;
    }

    let mut interpreter = Interpreter::with_config(InterpreterConfig {
        max_call_depth: args.max_depth,
    });
    match interpreter.execute(&program) {
        Ok(value) => {
            // Scripts only print what they ask for; inline sources echo their value.
            if let (Some(value), Some(_)) = (value, &args.eval) {
                println!("{}", value.repr());
            }
            ExitCode::SUCCESS
        }
        Err(e) => report(&e.into(), &name, &source),
    }
}
