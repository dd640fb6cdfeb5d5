//! Instruction tables: ordered regex-to-handler dispatch.
//!
//! An instruction table is an ordered list of (pattern, handler) pairs.
//! Dispatch is a linear scan; the first pattern that matches the whole
//! statement wins. Caller-supplied entries are tried before the built-in
//! vocabulary, so extensions shadow built-ins purely by order, never by
//! replacement.
//!
//! Patterns are anchored at compile time (`^(?:pat)$`): a pattern matches a
//! statement only if it matches all of it, not a substring.

use regex::{Captures, Regex};

use crate::engine::ConcurrentInterpreter;
use crate::error::Error;

/// A value produced by interpreting a statement.
///
/// Handlers may also produce no value at all (`None`); the built-in equality
/// instruction writes that as `null` in scripts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// A signed integer.
    Int(i64),
    /// A boolean.
    Bool(bool),
    /// A string.
    Str(String),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

/// Result of a handler invocation: an optional value, or a statement error.
pub type HandlerResult = Result<Option<Value>, Error>;

/// A statement handler.
///
/// Receives the interpreter (so it can re-interpret sub-expressions), the
/// thread's context, and the pattern's capture groups.
pub type Handler<T> =
    Box<dyn Fn(&ConcurrentInterpreter<T>, &T, &Captures<'_>) -> HandlerResult + Send + Sync>;

/// One (pattern, handler) pair.
pub(crate) struct Entry<T> {
    /// Anchored pattern; matches the whole statement or not at all.
    pub(crate) pattern: Regex,
    /// Handler invoked when the pattern matches.
    pub(crate) handler: Handler<T>,
}

/// Compile a pattern anchored to the full statement.
///
/// Panics on an invalid pattern: instruction tables are built from literals
/// at test construction time, so a bad pattern is a programming error.
pub(crate) fn compile_anchored(pattern: &str) -> Regex {
    Regex::new(&format!("^(?:{pattern})$"))
        .unwrap_or_else(|e| panic!("invalid instruction pattern `{pattern}`: {e}"))
}

/// An ordered list of caller-supplied instructions.
///
/// Built fluently and handed to
/// [`ConcurrentInterpreter::new`](crate::ConcurrentInterpreter::new):
///
/// ```
/// use lockstep::{InstructionTable, Value};
///
/// let table = InstructionTable::new()
///     .entry(r"ping", |_, _ctx: &(), _| Ok(Some(Value::Str("pong".into()))));
/// ```
pub struct InstructionTable<T> {
    entries: Vec<Entry<T>>,
}

impl<T> InstructionTable<T> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append an instruction.
    ///
    /// `pattern` is a regular expression matched against the whole statement.
    /// Entries are tried in insertion order, before the built-in vocabulary.
    pub fn entry<F>(mut self, pattern: &str, handler: F) -> Self
    where
        F: Fn(&ConcurrentInterpreter<T>, &T, &Captures<'_>) -> HandlerResult
            + Send
            + Sync
            + 'static,
    {
        self.entries.push(Entry {
            pattern: compile_anchored(pattern),
            handler: Box::new(handler),
        });
        self
    }

    /// Number of entries in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn into_entries(self) -> Vec<Entry<T>> {
        self.entries
    }
}

impl<T> Default for InstructionTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
