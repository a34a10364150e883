use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use sprig::evaluator::{CapturedOutput, Interpreter, InterpreterConfig};
use sprig::lexer::tokenize;
use sprig::parser::parse_program;

// A reasonably complex program exercising most of the grammar
const BENCH_INPUT: &str = r#"
// Recursive Fibonacci
fn fib(n) {
    if (n < 2) { return n; }
    return fib(n - 1) + fib(n - 2);
}

fn makeCounter() {
    let count = 0;
    fn inc() { count = count + 1; return count; }
    return inc;
}

let counter = makeCounter();
let total = 0;
for (let i = 0; i < 50; i = i + 1) {
    if (i % 3 == 0) { continue; }
    total = total + counter();
    if (total > 1000 && !false) { break; }
}

let greeting = "string with escapes \"\n\t\" " + str(total);
fib(15);
"#;

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("Pipeline");

    group.bench_with_input(
        BenchmarkId::new("tokenize", "program"),
        &BENCH_INPUT,
        |b, input| b.iter(|| tokenize(black_box(input))),
    );

    group.bench_with_input(
        BenchmarkId::new("parse", "program"),
        &BENCH_INPUT,
        |b, input| b.iter(|| parse_program(black_box(input))),
    );

    // Parse once, measure evaluation alone
    if let Ok(program) = parse_program(BENCH_INPUT) {
        group.bench_function(BenchmarkId::new("execute", "program"), |b| {
            b.iter(|| {
                let mut interpreter = Interpreter::with_output(
                    InterpreterConfig::default(),
                    Box::new(CapturedOutput::new()),
                );
                interpreter.execute(black_box(&program))
            })
        });
    }

    group.finish();
}

fn bench_recursion(c: &mut Criterion) {
    let mut group = c.benchmark_group("Recursion");
    for n in [10, 15, 20] {
        let source = format!(
            "fn fib(n) {{ if (n < 2) {{ return n; }} return fib(n - 1) + fib(n - 2); }} fib({})",
            n
        );
        group.bench_with_input(BenchmarkId::new("fib", n), &source, |b, source| {
            b.iter(|| Interpreter::new().run(black_box(source)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_pipeline, bench_recursion);
criterion_main!(benches);
