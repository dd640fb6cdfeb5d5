//! Error types for statement dispatch and script execution.
//!
//! Errors come in two layers:
//!
//! - [`Error`]: a single statement could not be completed. Syntax errors
//!   (no instruction matched), assertion failures (an instruction's check
//!   did not hold) and arbitrary errors raised by handler code are all
//!   treated identically: fatal to the containing thread's remaining script.
//! - [`ScriptError`]: a whole run failed, either because the script shape
//!   was invalid (detected before any thread starts) or because one thread
//!   recorded a [`ThreadFailure`].
//!
//! Errors are never retried. Exactly one failure (the first one observed
//! across all threads) is surfaced per run; concurrent failures in the same
//! run are discarded by design to keep reports legible.

use thiserror::Error;

/// A statement-level failure.
#[derive(Debug, Error)]
pub enum Error {
    /// No instruction pattern matched the statement.
    #[error("syntax error: no instruction matches `{statement}`")]
    Syntax {
        /// The statement that failed to match.
        statement: String,
    },

    /// A built-in or caller-supplied instruction's check did not hold.
    #[error("assertion failed: {message}")]
    Assertion {
        /// Description of the failed check.
        message: String,
    },

    /// An arbitrary error raised by handler code or the code under test.
    #[error(transparent)]
    Handler(#[from] anyhow::Error),
}

impl Error {
    /// Create a syntax error for an unmatched statement.
    pub fn syntax(statement: impl Into<String>) -> Self {
        Error::Syntax {
            statement: statement.into(),
        }
    }

    /// Create an assertion failure with the given message.
    pub fn assertion(message: impl Into<String>) -> Self {
        Error::Assertion {
            message: message.into(),
        }
    }
}

/// A run-level failure from [`run_script`](crate::ConcurrentInterpreter::run_script).
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The script's lines do not all have the same column count.
    ///
    /// Detected during parsing, before any thread is spawned.
    #[error("script line {line} has {found} columns, expected {expected}")]
    UnevenColumns {
        /// 1-based line number within the script.
        line: usize,
        /// Column count of the first line.
        expected: usize,
        /// Column count of the offending line.
        found: usize,
    },

    /// A worker thread failed while executing its program.
    #[error(transparent)]
    Thread(#[from] ThreadFailure),
}

/// Record of the first statement failure observed across all threads.
///
/// The synthesized `file`/`line` point at the script line within the caller's
/// source, so test tooling can navigate straight to the failing statement.
#[derive(Debug, Error)]
#[error("thread {thread} failed executing `{statement}` at {file}:{line}")]
pub struct ThreadFailure {
    /// Index of the failing thread (= script column).
    pub thread: usize,
    /// The compound statement that failed, as written in the script.
    pub statement: String,
    /// Source file of the `run_script` call site.
    pub file: &'static str,
    /// Synthesized source line: call-site line + line shift + script line.
    pub line: u32,
    /// The underlying statement failure.
    #[source]
    pub cause: Error,
}
