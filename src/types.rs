use crate::ast::FunctionDecl;
use crate::environment::Environment;
use crate::evaluator::EvalResult;
use crate::source::Span;
use std::cell::RefCell;
use std::fmt; // For custom display formatting
use std::io::Write;
use std::rc::Rc;

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Number(f64),
    String(String),
    Boolean(bool),
    Nil,
    Function(Rc<Closure>),
    Native(Rc<NativeFunction>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Boolean(_) => "boolean",
            Value::Nil => "nil",
            Value::Function(_) | Value::Native(_) => "function",
        }
    }

    /// `nil`, `false` and `0` are falsy; everything else (including "") is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0,
            _ => true,
        }
    }

    /// Rendering used when echoing values back, with strings quoted and escaped.
    pub fn repr(&self) -> String {
        match self {
            Value::String(s) => {
                let escaped = s.chars().fold(String::new(), |mut acc, char| {
                    match char {
                        '"' => acc.push_str("\\\""),
                        '\\' => acc.push_str("\\\\"),
                        '\n' => acc.push_str("\\n"),
                        '\r' => acc.push_str("\\r"),
                        '\t' => acc.push_str("\\t"),
                        '\0' => acc.push_str("\\0"),
                        c => acc.push(c),
                    }
                    acc
                });
                format!("\"{}\"", escaped)
            }
            other => other.to_string(),
        }
    }
}

// Functions compare by identity; numbers use IEEE equality.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Nil, Value::Nil) => true,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Nil => write!(f, "nil"),
            Value::Function(closure) => write!(f, "<fn {}>", closure.decl.name),
            Value::Native(native) => write!(f, "<native fn {}>", native.name),
        }
    }
}

/// A user-defined function paired with the environment it was defined in.
pub struct Closure {
    pub decl: Rc<FunctionDecl>,
    pub env: Rc<RefCell<Environment>>,
}

impl Closure {
    pub fn params(&self) -> &[String] {
        &self.decl.params
    }
}

// The captured environment may contain this closure, so it is left out.
impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Closure({}/{})", self.decl.name, self.decl.params.len())
    }
}

/// How many arguments a callable accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(expected) => count == expected,
            Arity::AtLeast(min) => count >= min,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(expected) => write!(f, "{}", expected),
            Arity::AtLeast(min) => write!(f, "at least {}", min),
        }
    }
}

/// What a native function gets to see of the interpreter.
pub struct NativeContext<'a> {
    pub out: &'a mut dyn Write,
    pub span: Span, // Span of the call expression
}

pub type NativeFn = fn(&mut NativeContext<'_>, Vec<Value>) -> EvalResult<Value>;

pub struct NativeFunction {
    pub name: String,
    pub arity: Arity,
    pub func: NativeFn,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Native({})", self.name)
    }
}
