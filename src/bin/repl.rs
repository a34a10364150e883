use std::borrow::Cow;
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::highlight::{CmdKind, Highlighter};
use rustyline::history::DefaultHistory;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Cmd, Context, EditMode, Editor, EventHandler, KeyCode, KeyEvent, Modifiers};
use rustyline::{Completer, Helper, Highlighter, Hinter, Validator};
use sprig::evaluator::DEFAULT_MAX_CALL_DEPTH;
use sprig::lexer::KEYWORDS;
use sprig::{Environment, Interpreter, InterpreterConfig, TokenKind, tokenize};
use tracing::warn;

/// Interactive shell for sprig
#[derive(Parser, Debug)]
#[command(name = "repl")]
#[command(about = "Interactive sprig shell", long_about = None)]
struct Args {
    /// Maximum nested function calls before a stack overflow is reported
    #[arg(long, default_value_t = DEFAULT_MAX_CALL_DEPTH)]
    max_depth: usize,

    /// Use vi key bindings instead of emacs
    #[arg(long)]
    vi: bool,

    /// File used to load and save line history
    #[arg(long, value_name = "FILE", default_value = "sprig_history.txt")]
    history: PathBuf,
}

struct SprigCompleter {
    env: Rc<RefCell<Environment>>,
}

impl SprigCompleter {
    fn new(env: Rc<RefCell<Environment>>) -> Self {
        SprigCompleter { env }
    }
}

impl rustyline::completion::Completer for SprigCompleter {
    type Candidate = String;
    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        let last_token = match tokenize(&line[..pos]) {
            Ok(tokens) => tokens.into_iter().rev().find(|t| t.kind != TokenKind::Eof),
            Err(_) => None,
        };
        let Some(token) = last_token else {
            return Ok((pos, vec![]));
        };
        let is_word = matches!(token.kind, TokenKind::Identifier(_)) || token.kind.is_keyword();
        if !is_word || token.span.end != pos {
            return Ok((pos, vec![]));
        }

        let prefix = token.lexeme.as_str();
        let mut candidates: Vec<String> = self
            .env
            .borrow()
            .identifiers()
            .into_iter()
            .chain(KEYWORDS.iter().map(|k| k.to_string()))
            .filter(|id| id.starts_with(prefix))
            .collect();
        candidates.sort();
        candidates.dedup();
        Ok((token.span.start, candidates))
    }
}

#[derive(Completer, Helper, Highlighter, Hinter, Validator)]
struct ReplHelper {
    #[rustyline(Validator)]
    validator: SprigValidator,
    #[rustyline(Highlighter)]
    highlighter: SprigHighlighter,
    #[rustyline(Completer)]
    completer: SprigCompleter,
}

fn is_opener(c: char) -> bool {
    matches!(c, '(' | '{')
}

fn closes(opening: char, c: char) -> bool {
    (opening == '(' && c == ')') || (opening == '{' && c == '}')
}

/// Bracket structure of a line, ignoring strings and comments.
#[derive(Default)]
struct Brackets {
    pairs: Vec<(usize, usize)>, // Byte offsets of matched open/close
    unmatched: Vec<usize>,
    open: Vec<(char, usize)>, // Still open at end of line
    in_string: bool,
}

fn scan_brackets(input: &str) -> Brackets {
    let mut brackets = Brackets::default();
    let mut escape = false;
    let mut chars = input.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if brackets.in_string {
            if escape {
                escape = false;
            } else if c == '\\' {
                escape = true;
            } else if c == '"' {
                brackets.in_string = false;
            }
            continue;
        }

        match c {
            '"' => brackets.in_string = true,
            '/' if matches!(chars.peek(), Some((_, '/'))) => {
                // Line comment
                while let Some((_, c)) = chars.next() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            c if is_opener(c) => brackets.open.push((c, i)),
            ')' | '}' => match brackets.open.pop() {
                Some((opening, at)) if closes(opening, c) => brackets.pairs.push((at, i)),
                Some((_, at)) => {
                    brackets.unmatched.push(at);
                    brackets.unmatched.push(i);
                }
                None => brackets.unmatched.push(i),
            },
            _ => {}
        }
    }
    brackets
}

struct SprigValidator;

impl Validator for SprigValidator {
    fn validate(&self, ctx: &mut ValidationContext) -> rustyline::Result<ValidationResult> {
        let brackets = scan_brackets(ctx.input());
        if let Some(&at) = brackets.unmatched.first() {
            return Ok(ValidationResult::Invalid(Some(format!(
                "  - Unmatched bracket at position {}",
                at
            ))));
        }
        if brackets.in_string || !brackets.open.is_empty() {
            Ok(ValidationResult::Incomplete)
        } else {
            Ok(ValidationResult::Valid(None))
        }
    }
}

struct SprigHighlighter;

impl Highlighter for SprigHighlighter {
    fn highlight<'l>(&self, line: &'l str, pos: usize) -> Cow<'l, str> {
        let brackets = scan_brackets(line);
        // The pair touching the cursor, if any
        let active = brackets.pairs.iter().find(|(open, close)| {
            [*open, *close]
                .iter()
                .any(|&at| at == pos || at + 1 == pos)
        });

        let mut highlighted = String::with_capacity(line.len());
        let mut in_string = false;
        let mut escape = false;
        for (i, c) in line.char_indices() {
            if in_string {
                if escape {
                    escape = false;
                } else if c == '\\' {
                    escape = true;
                } else if c == '"' {
                    in_string = false;
                }
                highlighted.push_str(&format!("\x1b[32m{}\x1b[0m", c)); // Green for strings
                continue;
            }

            if c == '"' {
                in_string = true;
                highlighted.push_str(&format!("\x1b[32m{}\x1b[0m", c));
            } else if brackets.unmatched.contains(&i) {
                highlighted.push_str(&format!("\x1b[1;31m{}\x1b[0m", c)); // Red for unmatched
            } else if active.is_some_and(|&(open, close)| i == open || i == close) {
                highlighted.push_str(&format!("\x1b[1;34m{}\x1b[0m", c)); // Blue for the active pair
            } else {
                highlighted.push(c);
            }
        }

        Cow::Owned(highlighted)
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _kind: CmdKind) -> bool {
        true
    }
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> rustyline::Result<()> {
    let args = Args::parse();
    init_logging();

    println!("sprig REPL v{}", env!("CARGO_PKG_VERSION"));
    println!("Type 'exit' or press Ctrl-D to quit.");

    let mut interpreter = Interpreter::with_config(InterpreterConfig {
        max_call_depth: args.max_depth,
    });
    let helper = ReplHelper {
        validator: SprigValidator,
        highlighter: SprigHighlighter,
        completer: SprigCompleter::new(interpreter.globals()),
    };
    let edit_mode = if args.vi { EditMode::Vi } else { EditMode::Emacs };
    let config = rustyline::config::Config::builder()
        .edit_mode(edit_mode)
        .build();
    let mut rl: Editor<ReplHelper, DefaultHistory> = Editor::with_config(config)?;
    rl.set_helper(Some(helper));
    rl.bind_sequence(
        KeyEvent(KeyCode::Char('s'), Modifiers::CTRL),
        EventHandler::Simple(Cmd::Newline),
    );
    if rl.load_history(&args.history).is_err() {
        println!("No previous history.");
    }

    loop {
        match rl.readline("sprig> ") {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                if input.eq_ignore_ascii_case("exit") {
                    break;
                }

                // Bindings made before a failure are kept; the session goes on.
                match interpreter.run(input) {
                    Ok(Some(value)) => println!("{}", value.repr()),
                    Ok(None) => {}
                    Err(error) => {
                        warn!(%error, "discarding failed input");
                        if error.eprint_report("repl", input).is_err() {
                            eprintln!("{}", error.plain_message("repl", input));
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl-C
                println!("Interrupted. Type 'exit' or Ctrl-D to quit.");
            }
            Err(ReadlineError::Eof) => {
                // Ctrl-D
                println!("\nExiting.");
                break;
            }
            Err(err) => {
                eprintln!("Readline Error: {:?}", err);
                break;
            }
        }
    }
    rl.save_history(&args.history)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brackets_balance() {
        let brackets = scan_brackets("fn f(a) { return a; }");
        assert!(brackets.open.is_empty());
        assert!(brackets.unmatched.is_empty());
        assert_eq!(brackets.pairs.len(), 2);
    }

    #[test]
    fn test_brackets_ignore_strings_and_comments() {
        let brackets = scan_brackets("print(\"{(\") // )}");
        assert!(brackets.open.is_empty());
        assert!(brackets.unmatched.is_empty());
        assert!(!brackets.in_string);
    }

    #[test]
    fn test_brackets_incomplete_and_unmatched() {
        assert_eq!(scan_brackets("while (x) {").open.len(), 1);
        assert!(scan_brackets("\"open").in_string);
        assert_eq!(scan_brackets("(}").unmatched, vec![0, 1]);
        assert_eq!(scan_brackets("x)").unmatched, vec![1]);
    }
}
