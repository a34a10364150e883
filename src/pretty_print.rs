use crate::Error;
use crate::evaluator::RuntimeError;
use crate::lexer::LexError;
use crate::parser::ParseError;
use ariadne::{Config, Label, Report, ReportKind, Source};
use std::io::{self, Write};
use std::ops::Range;

type SourceSpan<'a> = (&'a str, Range<usize>);

impl Error {
    /// Headline and label text for the report.
    fn describe(&self) -> (String, String) {
        match self {
            Error::Lex(error) => match error {
                LexError::UnexpectedChar { ch, .. } => (
                    "Lexer error".to_string(),
                    format!("Unexpected character '{}'", ch),
                ),
                LexError::UnterminatedString { .. } => (
                    "Lexer error".to_string(),
                    "This string is never closed".to_string(),
                ),
                LexError::UnknownEscape { ch, .. } => (
                    "Lexer error".to_string(),
                    format!("Unknown escape sequence '\\{}'", ch),
                ),
            },
            Error::Parse(error) => match error {
                ParseError::UnexpectedToken {
                    expected, found, ..
                } => (
                    format!("Unexpected token: {}", found),
                    format!("Expected {}", expected),
                ),
                ParseError::ExpectedExpression { found, .. } => (
                    format!("Unexpected token: {}", found),
                    "Expected an expression here".to_string(),
                ),
                ParseError::ExpectedIdentifier { found, .. } => (
                    format!("Unexpected token: {}", found),
                    "Expected an identifier here".to_string(),
                ),
                ParseError::InvalidAssignmentTarget { .. } => (
                    "Invalid assignment target".to_string(),
                    "Only variables can be assigned to".to_string(),
                ),
                ParseError::ControlOutsideLoop { keyword, .. } => (
                    format!("'{}' outside of a loop", keyword),
                    "This statement must be inside a while or for loop".to_string(),
                ),
                // Parser::new hands lexer failures to Error::Lex
                ParseError::Lex(error) => (
                    "Lexer error".to_string(),
                    error.to_string(),
                ),
            },
            Error::Runtime(error) => match error {
                RuntimeError::UndefinedVariable { name, .. } => (
                    format!("Undefined variable `{}`", name),
                    "This name is not defined in the current scope".to_string(),
                ),
                RuntimeError::UndefinedAssignmentTarget { name, .. } => (
                    format!("Cannot assign to undefined variable `{}`", name),
                    "Declare it with `let` first".to_string(),
                ),
                RuntimeError::TypeMismatch { message, .. } => {
                    ("Type mismatch".to_string(), capitalize(message))
                }
                RuntimeError::DivisionByZero { .. } => (
                    "Division by zero".to_string(),
                    "The divisor evaluates to zero".to_string(),
                ),
                RuntimeError::ArityMismatch {
                    name,
                    expected,
                    found,
                    ..
                } => (
                    format!("Wrong number of arguments to `{}`", name),
                    format!("Expected {} argument(s), got {}", expected, found),
                ),
                RuntimeError::NotCallable { found, .. } => (
                    "Not callable".to_string(),
                    format!("A {} value cannot be called", found),
                ),
                RuntimeError::StackOverflow { limit, .. } => (
                    "Stack overflow".to_string(),
                    format!("Call depth exceeded {} here", limit),
                ),
                RuntimeError::Native { message, .. } => {
                    ("Native function failed".to_string(), capitalize(message))
                }
            },
        }
    }

    fn report<'a>(&self, source_id: &'a str, color: bool) -> Report<'a, SourceSpan<'a>> {
        let range = self.span().to_range();
        let (headline, label) = self.describe();
        Report::build(ReportKind::Error, (source_id, range.clone()))
            .with_config(Config::default().with_color(color))
            .with_message(headline)
            .with_label(Label::new((source_id, range)).with_message(label))
            .finish()
    }

    /// Renders the error against `source` without colors.
    pub fn write_report<W: Write>(&self, source_id: &str, source: &str, out: W) -> io::Result<()> {
        self.report(source_id, false)
            .write((source_id, Source::from(source)), out)
    }

    /// Renders the error to stderr.
    pub fn eprint_report(&self, source_id: &str, source: &str) -> io::Result<()> {
        self.report(source_id, true)
            .eprint((source_id, Source::from(source)))
    }

    /// One-line `id:line:column: error: message` form, for when a report
    /// cannot be written.
    pub fn plain_message(&self, source_id: &str, source: &str) -> String {
        let (line, column) = self.span().line_col(source);
        format!("{}:{}:{}: error: {}", source_id, line, column, self)
    }
}

fn capitalize(message: &str) -> String {
    let mut chars = message.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
