use crate::Error;
use crate::ast::{BinaryOp, LogicalOp, Node, NodeKind, UnaryOp};
use crate::environment::{EnvError, Environment};
use crate::parser::parse_program;
use crate::source::Span;
use crate::stack::ensure_sufficient_stack;
use crate::types::{Arity, Closure, NativeContext, NativeFn, NativeFunction, Value};
use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;
use tracing::debug;

// --- Evaluation Error ---
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("undefined variable '{name}'")]
    UndefinedVariable { name: String, span: Span },
    #[error("cannot assign to undefined variable '{name}'")]
    UndefinedAssignmentTarget { name: String, span: Span },
    #[error("type mismatch: {message}")]
    TypeMismatch { message: String, span: Span },
    #[error("division by zero")]
    DivisionByZero { span: Span },
    #[error("'{name}' expects {expected} argument(s), got {found}")]
    ArityMismatch {
        name: String,
        expected: Arity,
        found: usize,
        span: Span,
    },
    #[error("a {found} value is not callable")]
    NotCallable { found: &'static str, span: Span },
    #[error("maximum call depth of {limit} exceeded")]
    StackOverflow { limit: usize, span: Span },
    // Failures reported by native functions
    #[error("{message}")]
    Native { message: String, span: Span },
}

impl RuntimeError {
    pub fn span(&self) -> Span {
        match self {
            RuntimeError::UndefinedVariable { span, .. }
            | RuntimeError::UndefinedAssignmentTarget { span, .. }
            | RuntimeError::TypeMismatch { span, .. }
            | RuntimeError::DivisionByZero { span }
            | RuntimeError::ArityMismatch { span, .. }
            | RuntimeError::NotCallable { span, .. }
            | RuntimeError::StackOverflow { span, .. }
            | RuntimeError::Native { span, .. } => *span,
        }
    }

    pub fn native(message: impl Into<String>, span: Span) -> Self {
        RuntimeError::Native {
            message: message.into(),
            span,
        }
    }
}

// Allow easy conversion from EnvError
impl From<EnvError> for RuntimeError {
    fn from(err: EnvError) -> Self {
        match err {
            EnvError::UndefinedVariable(name, span) => RuntimeError::UndefinedVariable { name, span },
            EnvError::UndefinedAssignmentTarget(name, span) => {
                RuntimeError::UndefinedAssignmentTarget { name, span }
            }
        }
    }
}

// Result type alias for convenience
pub type EvalResult<T> = Result<T, RuntimeError>;

/// How a statement finished. Threaded through blocks, loops and calls.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlSignal {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// The value a node produced plus how control left it.
pub type Outcome = (Value, ControlSignal);

fn normal(value: Value) -> Outcome {
    (value, ControlSignal::Normal)
}

pub const DEFAULT_MAX_CALL_DEPTH: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpreterConfig {
    /// Nested user-function calls allowed before `StackOverflow` is raised.
    pub max_call_depth: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

/// A `Write` sink that can be read back after the interpreter has written to it.
#[derive(Clone, Default)]
pub struct CapturedOutput(Rc<RefCell<Vec<u8>>>);

impl CapturedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for CapturedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct Interpreter {
    globals: Rc<RefCell<Environment>>,
    config: InterpreterConfig,
    depth: usize, // Active user-function calls
    output: Box<dyn Write>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_config(InterpreterConfig::default())
    }

    pub fn with_config(config: InterpreterConfig) -> Self {
        Self::with_output(config, Box::new(io::stdout()))
    }

    /// Creates an interpreter whose natives (e.g. `print`) write to `output`.
    pub fn with_output(config: InterpreterConfig, output: Box<dyn Write>) -> Self {
        let mut interpreter = Interpreter {
            globals: Environment::new(),
            config,
            depth: 0,
            output,
        };
        crate::primitives::register_all(&mut interpreter);
        interpreter
    }

    /// The root environment, shared across every `run`.
    pub fn globals(&self) -> Rc<RefCell<Environment>> {
        Rc::clone(&self.globals)
    }

    /// Registers a host function taking at least `min_arity` arguments.
    pub fn register_native(&mut self, name: &str, min_arity: usize, func: NativeFn) {
        self.register_native_with_arity(name, Arity::AtLeast(min_arity), func);
    }

    pub fn register_native_with_arity(&mut self, name: &str, arity: Arity, func: NativeFn) {
        debug!(name, %arity, "registering native function");
        let native = NativeFunction {
            name: name.to_string(),
            arity,
            func,
        };
        self.globals
            .borrow_mut()
            .define(name.to_string(), Value::Native(Rc::new(native)));
    }

    /// Lexes, parses and executes `source` against the root environment.
    pub fn run(&mut self, source: &str) -> Result<Option<Value>, Error> {
        let program = parse_program(source)?;
        Ok(self.execute(&program)?)
    }

    /// Executes a parsed program in the root environment.
    ///
    /// Returns the value of the final statement when it is an expression, or
    /// the value of a top-level `return`.
    pub fn execute(&mut self, program: &Node) -> EvalResult<Option<Value>> {
        let statements = match &program.kind {
            NodeKind::Program(statements) => statements.as_slice(),
            _ => std::slice::from_ref(program),
        };
        debug!(statements = statements.len(), "executing program");

        let globals = Rc::clone(&self.globals);
        let mut last = None;
        for statement in statements {
            let (value, signal) = self.evaluate(statement, &globals)?;
            if let ControlSignal::Return(value) = signal {
                return Ok(Some(value));
            }
            last = statement.is_expression().then_some(value);
        }
        Ok(last)
    }

    /// Evaluates a given AST node within the specified environment.
    pub fn evaluate(&mut self, node: &Node, env: &Rc<RefCell<Environment>>) -> EvalResult<Outcome> {
        ensure_sufficient_stack(|| self.evaluate_node(node, env))
    }

    fn evaluate_node(&mut self, node: &Node, env: &Rc<RefCell<Environment>>) -> EvalResult<Outcome> {
        match &node.kind {
            // Literals evaluate to themselves
            NodeKind::NumberLiteral(n) => Ok(normal(Value::Number(*n))),
            NodeKind::StringLiteral(s) => Ok(normal(Value::String(s.clone()))),
            NodeKind::BooleanLiteral(b) => Ok(normal(Value::Boolean(*b))),
            NodeKind::NilLiteral => Ok(normal(Value::Nil)),

            NodeKind::Identifier(name) => Ok(normal(env.borrow().get(name, node.span)?)),
            NodeKind::Assign { name, value } => {
                let value = self.eval_expr(value, env)?;
                env.borrow_mut().assign(name, value.clone(), node.span)?;
                Ok(normal(value))
            }
            NodeKind::Unary { op, operand } => {
                let operand = self.eval_expr(operand, env)?;
                Ok(normal(unary_op(*op, operand, node.span)?))
            }
            NodeKind::Binary { op, left, right } => {
                let left = self.eval_expr(left, env)?;
                let right = self.eval_expr(right, env)?;
                Ok(normal(binary_op(*op, left, right, node.span)?))
            }
            NodeKind::Logical { op, left, right } => {
                let left = self.eval_expr(left, env)?;
                let short_circuits = match op {
                    LogicalOp::And => !left.is_truthy(),
                    LogicalOp::Or => left.is_truthy(),
                };
                if short_circuits {
                    Ok(normal(left))
                } else {
                    Ok(normal(self.eval_expr(right, env)?))
                }
            }
            NodeKind::Call { callee, args } => {
                Ok(normal(self.evaluate_call(callee, args, env, node.span)?))
            }

            NodeKind::Let { name, value } => {
                let value = self.eval_expr(value, env)?;
                env.borrow_mut().define(name.clone(), value);
                Ok(normal(Value::Nil))
            }
            NodeKind::FunctionDef(decl) => {
                // Capture the defining environment, not the eventual call site.
                let closure = Closure {
                    decl: Rc::clone(decl),
                    env: Rc::clone(env),
                };
                env.borrow_mut()
                    .define(decl.name.clone(), Value::Function(Rc::new(closure)));
                Ok(normal(Value::Nil))
            }
            NodeKind::Block(statements) => {
                let block_env = Environment::new_enclosed(Rc::clone(env));
                self.execute_block(statements, &block_env)
            }
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.eval_expr(condition, env)?.is_truthy() {
                    self.evaluate(then_branch, env)
                } else if let Some(else_branch) = else_branch {
                    self.evaluate(else_branch, env)
                } else {
                    Ok(normal(Value::Nil))
                }
            }
            NodeKind::While {
                condition,
                body,
                increment,
            } => self.evaluate_while(condition, body, increment.as_deref(), env),
            NodeKind::Return(value) => {
                let value = match value {
                    Some(value) => self.eval_expr(value, env)?,
                    None => Value::Nil,
                };
                Ok((Value::Nil, ControlSignal::Return(value)))
            }
            NodeKind::Break => Ok((Value::Nil, ControlSignal::Break)),
            NodeKind::Continue => Ok((Value::Nil, ControlSignal::Continue)),
            NodeKind::Program(statements) => self.execute_block(statements, env),
        }
    }

    // Expressions always complete normally, so only the value matters.
    fn eval_expr(&mut self, node: &Node, env: &Rc<RefCell<Environment>>) -> EvalResult<Value> {
        let (value, _) = self.evaluate(node, env)?;
        Ok(value)
    }

    // Runs statements in `env`, stopping at the first non-Normal signal.
    fn execute_block(
        &mut self,
        statements: &[Node],
        env: &Rc<RefCell<Environment>>,
    ) -> EvalResult<Outcome> {
        for statement in statements {
            let (_, signal) = self.evaluate(statement, env)?;
            if !matches!(signal, ControlSignal::Normal) {
                return Ok((Value::Nil, signal));
            }
        }
        Ok(normal(Value::Nil))
    }

    fn evaluate_while(
        &mut self,
        condition: &Node,
        body: &Node,
        increment: Option<&Node>,
        env: &Rc<RefCell<Environment>>,
    ) -> EvalResult<Outcome> {
        while self.eval_expr(condition, env)?.is_truthy() {
            let (_, signal) = self.evaluate(body, env)?;
            match signal {
                ControlSignal::Break => break,
                ControlSignal::Return(value) => {
                    return Ok((Value::Nil, ControlSignal::Return(value)));
                }
                ControlSignal::Normal | ControlSignal::Continue => {}
            }
            if let Some(increment) = increment {
                self.eval_expr(increment, env)?;
            }
        }
        Ok(normal(Value::Nil))
    }

    fn evaluate_call(
        &mut self,
        callee: &Node,
        args: &[Node],
        env: &Rc<RefCell<Environment>>,
        span: Span,
    ) -> EvalResult<Value> {
        let callee = self.eval_expr(callee, env)?;
        if !matches!(callee, Value::Function(_) | Value::Native(_)) {
            return Err(RuntimeError::NotCallable {
                found: callee.type_name(),
                span,
            });
        }
        let mut arguments = Vec::with_capacity(args.len());
        for arg in args {
            arguments.push(self.eval_expr(arg, env)?);
        }
        self.call_value(&callee, arguments, span)
    }

    /// Calls a function value with already-evaluated arguments.
    pub fn call_value(
        &mut self,
        callee: &Value,
        arguments: Vec<Value>,
        span: Span,
    ) -> EvalResult<Value> {
        match callee {
            Value::Function(closure) => self.call_closure(closure, arguments, span),
            Value::Native(native) => {
                check_arity(&native.name, native.arity, arguments.len(), span)?;
                let mut context = NativeContext {
                    out: self.output.as_mut(),
                    span,
                };
                (native.func)(&mut context, arguments)
            }
            other => Err(RuntimeError::NotCallable {
                found: other.type_name(),
                span,
            }),
        }
    }

    #[tracing::instrument(level = "trace", skip_all, fields(function = %closure.decl.name))]
    fn call_closure(
        &mut self,
        closure: &Closure,
        arguments: Vec<Value>,
        span: Span,
    ) -> EvalResult<Value> {
        let params = closure.params();
        check_arity(
            &closure.decl.name,
            Arity::Exact(params.len()),
            arguments.len(),
            span,
        )?;
        if self.depth >= self.config.max_call_depth {
            return Err(RuntimeError::StackOverflow {
                limit: self.config.max_call_depth,
                span,
            });
        }

        // Parameters live in a child of the captured environment.
        let call_env = Environment::new_enclosed(Rc::clone(&closure.env));
        {
            let mut frame = call_env.borrow_mut();
            for (param, argument) in params.iter().zip(arguments) {
                frame.define(param.clone(), argument);
            }
        }

        self.depth += 1;
        let result = self.execute_block(&closure.decl.body, &call_env);
        self.depth -= 1;

        match result? {
            (_, ControlSignal::Return(value)) => Ok(value),
            _ => Ok(Value::Nil),
        }
    }
}

// Breaks the common cycle of global functions capturing the global scope.
impl Drop for Interpreter {
    fn drop(&mut self) {
        self.globals.borrow_mut().clear();
    }
}

fn check_arity(name: &str, expected: Arity, found: usize, span: Span) -> EvalResult<()> {
    if expected.accepts(found) {
        Ok(())
    } else {
        Err(RuntimeError::ArityMismatch {
            name: name.to_string(),
            expected,
            found,
            span,
        })
    }
}

fn unary_op(op: UnaryOp, operand: Value, span: Span) -> EvalResult<Value> {
    match (op, operand) {
        (UnaryOp::Not, value) => Ok(Value::Boolean(!value.is_truthy())),
        (UnaryOp::Negate, Value::Number(n)) => Ok(Value::Number(-n)),
        (UnaryOp::Negate, other) => Err(RuntimeError::TypeMismatch {
            message: format!("operator '{}' cannot be applied to {}", op, other.type_name()),
            span,
        }),
    }
}

fn type_mismatch<T>(op: BinaryOp, left: &Value, right: &Value, span: Span) -> EvalResult<T> {
    Err(RuntimeError::TypeMismatch {
        message: format!(
            "operator '{}' cannot be applied to {} and {}",
            op,
            left.type_name(),
            right.type_name()
        ),
        span,
    })
}

// Extracts two numbers or reports a TypeMismatch for the operator
fn numeric_operands(op: BinaryOp, left: &Value, right: &Value, span: Span) -> EvalResult<(f64, f64)> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok((*a, *b)),
        _ => type_mismatch(op, left, right, span),
    }
}

fn nonzero_divisor(divisor: f64, span: Span) -> EvalResult<f64> {
    if divisor == 0.0 {
        Err(RuntimeError::DivisionByZero { span })
    } else {
        Ok(divisor)
    }
}

fn binary_op(op: BinaryOp, left: Value, right: Value, span: Span) -> EvalResult<Value> {
    let value = match op {
        BinaryOp::Equal => Value::Boolean(left == right),
        BinaryOp::NotEqual => Value::Boolean(left != right),
        BinaryOp::Add => match (left, right) {
            (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
            (Value::String(a), Value::String(b)) => Value::String(a + &b),
            (left, right) => return type_mismatch(op, &left, &right, span),
        },
        BinaryOp::Subtract => {
            let (a, b) = numeric_operands(op, &left, &right, span)?;
            Value::Number(a - b)
        }
        BinaryOp::Multiply => {
            let (a, b) = numeric_operands(op, &left, &right, span)?;
            Value::Number(a * b)
        }
        BinaryOp::Divide => {
            let (a, b) = numeric_operands(op, &left, &right, span)?;
            Value::Number(a / nonzero_divisor(b, span)?)
        }
        BinaryOp::Modulo => {
            let (a, b) = numeric_operands(op, &left, &right, span)?;
            Value::Number(a % nonzero_divisor(b, span)?)
        }
        BinaryOp::Less => {
            let (a, b) = numeric_operands(op, &left, &right, span)?;
            Value::Boolean(a < b)
        }
        BinaryOp::LessEqual => {
            let (a, b) = numeric_operands(op, &left, &right, span)?;
            Value::Boolean(a <= b)
        }
        BinaryOp::Greater => {
            let (a, b) = numeric_operands(op, &left, &right, span)?;
            Value::Boolean(a > b)
        }
        BinaryOp::GreaterEqual => {
            let (a, b) = numeric_operands(op, &left, &right, span)?;
            Value::Boolean(a >= b)
        }
    };
    Ok(value)
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    fn interpreter() -> (Interpreter, CapturedOutput) {
        let output = CapturedOutput::new();
        let interpreter =
            Interpreter::with_output(InterpreterConfig::default(), Box::new(output.clone()));
        (interpreter, output)
    }

    // Helper to evaluate input and check the final value
    fn assert_eval(input: &str, expected: Value) {
        let (mut interpreter, _) = interpreter();
        match interpreter.run(input) {
            Ok(Some(value)) => assert_eq!(value, expected, "Input: '{}'", input),
            Ok(None) => panic!("Input '{}' produced no value", input),
            Err(e) => panic!("Evaluation failed for input '{}': {}", input, e),
        }
    }

    // Helper to assert runtime errors, comparing only the variant
    fn assert_eval_error(input: &str, expected_error_variant: &RuntimeError) {
        let (mut interpreter, _) = interpreter();
        let program = match parse_program(input) {
            Ok(program) => program,
            Err(e) => panic!("Parsing failed for input '{}': {}", input, e),
        };
        match interpreter.execute(&program) {
            Ok(result) => panic!(
                "Expected evaluation to fail for input '{}', but got: {:?}",
                input, result
            ),
            Err(e) => assert_eq!(
                std::mem::discriminant(&e),
                std::mem::discriminant(expected_error_variant),
                "Input: '{}', Expected error variant like {:?}, got: {:?}",
                input,
                expected_error_variant,
                e
            ),
        }
    }

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    fn string(s: &str) -> Value {
        Value::String(s.to_string())
    }

    #[test]
    fn test_eval_literals() {
        assert_eval("123", num(123.0));
        assert_eval("4.5", num(4.5));
        assert_eval("true", Value::Boolean(true));
        assert_eval("nil", Value::Nil);
        assert_eval(r#""hello""#, string("hello"));
    }

    #[test]
    fn test_eval_arithmetic() {
        assert_eval("2 + 3 * 4", num(14.0));
        assert_eval("(2 + 3) * 4", num(20.0));
        assert_eval("10 - 4 - 3", num(3.0));
        assert_eval("7 / 2", num(3.5));
        assert_eval("7 % 3", num(1.0));
        assert_eval("-(2 + 3)", num(-5.0));
        assert_eval(r#""foo" + "bar""#, string("foobar"));
    }

    #[test]
    fn test_eval_comparison_and_equality() {
        assert_eval("1 < 2", Value::Boolean(true));
        assert_eval("2 <= 2", Value::Boolean(true));
        assert_eval("3 > 4", Value::Boolean(false));
        assert_eval("3 >= 4", Value::Boolean(false));
        assert_eval("1 == 1", Value::Boolean(true));
        assert_eval(r#""a" == "a""#, Value::Boolean(true));
        assert_eval(r#"1 == "1""#, Value::Boolean(false));
        assert_eval("nil == nil", Value::Boolean(true));
        assert_eval("nil != false", Value::Boolean(true));
        assert_eval("!0", Value::Boolean(true));
        assert_eval(r#"!"""#, Value::Boolean(false));
    }

    #[test]
    fn test_logical_returns_deciding_operand() {
        assert_eval("nil || 3", num(3.0));
        assert_eval("2 || 3", num(2.0));
        assert_eval("0 && 3", num(0.0));
        assert_eval("1 && 3", num(3.0));
    }

    #[test]
    fn test_logical_short_circuits() {
        // The right operand would fail if evaluated
        assert_eval("false && undefined_name", Value::Boolean(false));
        assert_eval("true || undefined_name", Value::Boolean(true));
        assert_eval(
            "let hits = 0; fn hit() { hits = hits + 1; return true; } false && hit(); true || hit(); hits",
            num(0.0),
        );
    }

    #[test]
    fn test_block_scoping() {
        assert_eval("let x = 10; { let x = 20; } x", num(10.0));
        assert_eval("let x = 10; { x = 20; } x", num(20.0));
    }

    #[test]
    fn test_assignment_is_an_expression() {
        assert_eval("let a = 1; let b = 2; a = b = 5; a + b", num(10.0));
    }

    #[test]
    fn test_if_else() {
        assert_eval(
            "let r = 0; if (1 > 2) { r = 1; } else { r = 2; } r",
            num(2.0),
        );
        assert_eval("let r = 0; if (0) r = 1; r", num(0.0));
        assert_eval(r#"let r = 0; if ("") r = 1; r"#, num(1.0));
    }

    #[test]
    fn test_while_loop() {
        assert_eval(
            "let x = 5; let sum = 0; while (x > 0) { sum = sum + x; x = x - 1; } sum",
            num(15.0),
        );
    }

    #[test]
    fn test_break_and_continue() {
        assert_eval(
            "let i = 0; while (true) { i = i + 1; if (i == 4) { break; } } i",
            num(4.0),
        );
        assert_eval(
            "let odd = 0; for (let i = 0; i < 10; i = i + 1) { if (i % 2 == 0) { continue; } odd = odd + i; } odd",
            num(25.0),
        );
    }

    #[test]
    fn test_for_scope_does_not_leak() {
        assert_eval_error(
            "for (let i = 0; i < 3; i = i + 1) {} i",
            &RuntimeError::UndefinedVariable {
                name: String::new(),
                span: Span::default(),
            },
        );
    }

    #[test]
    fn test_return_propagates_out_of_loops() {
        assert_eval(
            "fn find() { let i = 0; while (true) { while (true) { if (i == 3) { return i * 10; } i = i + 1; } } } find()",
            num(30.0),
        );
    }

    #[test]
    fn test_function_without_return_yields_nil() {
        assert_eval("fn f() { let a = 1; } f()", Value::Nil);
        assert_eval("fn f() { return; } f()", Value::Nil);
    }

    #[test]
    fn test_recursion() {
        assert_eval(
            "fn fact(n) { if (n <= 1) { return 1; } return n * fact(n - 1); } fact(5)",
            num(120.0),
        );
        assert_eval(
            "fn fib(n) { if (n < 2) { return n; } return fib(n - 1) + fib(n - 2); } fib(15)",
            num(610.0),
        );
    }

    #[test]
    fn test_closures_capture_definition_scope() {
        assert_eval(
            "fn makeCounter() { let count = 0; fn inc() { count = count + 1; return count; } return inc; }
             let c = makeCounter(); c(); c()",
            num(2.0),
        );
        // Each call to the factory gets its own captured scope
        assert_eval(
            "fn makeCounter() { let count = 0; fn inc() { count = count + 1; return count; } return inc; }
             let a = makeCounter(); let b = makeCounter(); a(); a(); b()",
            num(1.0),
        );
        // Lexical, not dynamic, scoping
        assert_eval(
            "let x = \"global\"; fn show() { return x; } fn run() { let x = \"local\"; return show(); } run()",
            string("global"),
        );
    }

    #[test]
    fn test_top_level_return_ends_program() {
        assert_eval("let x = 1; return x + 1; x = 100;", num(2.0));
    }

    #[test]
    fn test_statement_only_program_has_no_value() {
        let (mut interpreter, _) = interpreter();
        assert_eq!(interpreter.run("let x = 1;"), Ok(None));
        assert_eq!(interpreter.run("x;"), Ok(Some(num(1.0))));
    }

    #[test]
    fn test_undefined_variable() {
        let undefined = RuntimeError::UndefinedVariable {
            name: String::new(),
            span: Span::default(),
        };
        assert_eval_error("y", &undefined);
        assert_eval_error("{ let inner = 1; } inner", &undefined);
    }

    #[test]
    fn test_assignment_never_creates_binding() {
        let (mut interpreter, _) = interpreter();
        let result = interpreter.run("ghost = 1;");
        assert!(matches!(
            result,
            Err(Error::Runtime(RuntimeError::UndefinedAssignmentTarget { ref name, .. })) if name == "ghost"
        ));
        assert!(!interpreter.globals().borrow().contains_local("ghost"));
    }

    #[test]
    fn test_type_mismatch() {
        let mismatch = RuntimeError::TypeMismatch {
            message: String::new(),
            span: Span::default(),
        };
        assert_eval_error(r#"1 + "a""#, &mismatch);
        assert_eval_error(r#""a" - "b""#, &mismatch);
        assert_eval_error("true < 1", &mismatch);
        assert_eval_error("-nil", &mismatch);
        assert_eval_error(r#""a" * 2"#, &mismatch);
    }

    #[test]
    fn test_division_by_zero() {
        let division = RuntimeError::DivisionByZero {
            span: Span::default(),
        };
        assert_eval_error("1 / 0", &division);
        assert_eval_error("5 % (2 - 2)", &division);
    }

    #[test]
    fn test_arity_mismatch() {
        let (mut interpreter, _) = interpreter();
        let result = interpreter.run("fn add(a, b) { return a + b; } add(1)");
        match result {
            Err(Error::Runtime(RuntimeError::ArityMismatch {
                name,
                expected,
                found,
                ..
            })) => {
                assert_eq!(name, "add");
                assert_eq!(expected, Arity::Exact(2));
                assert_eq!(found, 1);
            }
            other => panic!("Expected an arity mismatch, got {:?}", other),
        }
        assert!(matches!(
            interpreter.run("add(1, 2, 3)"),
            Err(Error::Runtime(RuntimeError::ArityMismatch { found: 3, .. }))
        ));
    }

    #[test]
    fn test_not_callable() {
        let not_callable = RuntimeError::NotCallable {
            found: "",
            span: Span::default(),
        };
        assert_eval_error("let x = 1; x()", &not_callable);
        assert_eval_error(r#""text"(1)"#, &not_callable);
    }

    #[test]
    fn test_not_callable_checked_before_arguments() {
        // The argument is never evaluated, so its undefined name is not reported
        assert_eval_error(
            "nil(undefined_name)",
            &RuntimeError::NotCallable {
                found: "",
                span: Span::default(),
            },
        );
    }

    #[test]
    fn test_arguments_evaluated_left_to_right() {
        let (mut interpreter, output) = interpreter();
        interpreter
            .run(
                "fn show(v) { print(v); return v; } fn pair(a, b, c) { return a + b + c; } pair(show(1), show(2), show(3));",
            )
            .unwrap();
        assert_eq!(output.contents(), "1\n2\n3\n");
    }

    #[test]
    fn test_stack_overflow() {
        let (mut interpreter, _) = interpreter();
        let result = interpreter.run("fn forever(n) { return forever(n + 1); } forever(0)");
        assert!(matches!(
            result,
            Err(Error::Runtime(RuntimeError::StackOverflow { limit, .. })) if limit == DEFAULT_MAX_CALL_DEPTH
        ));
        // The call depth is restored after the error
        assert_eq!(
            interpreter.run("fn one() { return 1; } one()"),
            Ok(Some(num(1.0)))
        );
    }

    #[test]
    fn test_configured_call_depth() {
        let output = CapturedOutput::new();
        let mut interpreter = Interpreter::with_output(
            InterpreterConfig { max_call_depth: 10 },
            Box::new(output),
        );
        let source = "fn down(n) { if (n == 0) { return 0; } return down(n - 1); }";
        interpreter.run(source).unwrap();
        assert_eq!(interpreter.run("down(9)"), Ok(Some(num(0.0))));
        assert!(matches!(
            interpreter.run("down(10)"),
            Err(Error::Runtime(RuntimeError::StackOverflow { limit: 10, .. }))
        ));
    }

    #[test]
    fn test_error_spans_point_at_source() {
        let (mut interpreter, _) = interpreter();
        let source = "let a = 1;\nlet b = a + missing;";
        match interpreter.run(source) {
            Err(Error::Runtime(error)) => {
                assert_eq!(&source[error.span().to_range()], "missing");
            }
            other => panic!("Expected runtime error, got {:?}", other),
        }
    }

    #[test]
    fn test_native_functions_share_arity_checks() {
        fn first(_: &mut NativeContext<'_>, args: Vec<Value>) -> EvalResult<Value> {
            Ok(args.into_iter().next().unwrap_or(Value::Nil))
        }
        let (mut interpreter, _) = interpreter();
        interpreter.register_native("first", 1, first);
        assert_eq!(interpreter.run("first(7, 8, 9)"), Ok(Some(num(7.0))));
        assert!(matches!(
            interpreter.run("first()"),
            Err(Error::Runtime(RuntimeError::ArityMismatch { found: 0, .. }))
        ));

        interpreter.register_native_with_arity("only", Arity::Exact(1), first);
        assert!(matches!(
            interpreter.run("only(1, 2)"),
            Err(Error::Runtime(RuntimeError::ArityMismatch { found: 2, .. }))
        ));
    }

    #[test]
    fn test_call_value_from_host() {
        let (mut interpreter, _) = interpreter();
        interpreter.run("fn twice(x) { return x * 2; }").unwrap();
        let twice = interpreter.globals().borrow().get("twice", Span::default()).unwrap();
        assert_eq!(
            interpreter.call_value(&twice, vec![num(21.0)], Span::default()),
            Ok(num(42.0))
        );
    }

    #[test]
    fn test_evaluate_reports_control_signals() {
        let (mut interpreter, _) = interpreter();
        let env = interpreter.globals();
        let program = parse_program("while (true) { return 5; }").unwrap();
        let NodeKind::Program(statements) = &program.kind else {
            panic!("Expected program");
        };
        assert_eq!(
            interpreter.evaluate(&statements[0], &env),
            Ok((Value::Nil, ControlSignal::Return(num(5.0))))
        );
    }
}
