//! Stack growth for the recursive parser and evaluator.
//!
//! Deeply nested source (or deep script recursion below the configured call
//! ceiling) would otherwise exhaust the host thread's stack before any
//! interpreter limit is reached.

/// Minimum stack space to keep available before recursing (128KB red zone).
const RED_ZONE: usize = 128 * 1024;

/// Stack space to allocate each time the stack has to grow (1MB).
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Runs `f`, first moving onto a fresh stack segment if the current one is
/// nearly exhausted.
#[inline]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}
