//! Built-in instruction vocabulary.
//!
//! These instructions are appended after any caller-supplied entries, so a
//! caller pattern that also matches takes priority. Order within this list
//! matters too: the comment and timing wrappers must be tried before the
//! instructions they may wrap.
//!
//! | Pattern | Behavior |
//! |---|---|
//! | empty statement | no-op, no value |
//! | `EXPR // comment` | strip the comment, re-interpret `EXPR` |
//! | `EXPR time LOW..HIGH` | time `EXPR`, assert elapsed within bounds |
//! | `EXPR = VALUE` | interpret `EXPR`, assert result equals `VALUE` |
//! | `sleep` / `sleep(N)` | suspend for N time units (default 1) |
//! | `EXPR fails` | interpret `EXPR`, assert it returned an error |

use std::thread;
use std::time::Instant;

use regex::Captures;

use crate::engine::ConcurrentInterpreter;
use crate::error::Error;
use crate::table::{compile_anchored, Entry, HandlerResult, Value};
use crate::timing;

/// Build the default instruction list.
pub(crate) fn default_instructions<T>() -> Vec<Entry<T>> {
    vec![
        // An empty statement does nothing and returns no value.
        entry("", |_, _, _| Ok(None)),
        // "EXPR // comment" : strip everything from "//" and re-interpret.
        entry(r"(.*)//.*", |i, t, r| i.interpret(&r[1], t)),
        // "EXPR time LOW..HIGH" : interpret EXPR and check the elapsed time.
        // Wrapped in closures rather than passed as fn items: a generic fn
        // item type mentions T and would force `T: 'static` when boxed.
        entry(r"(.*)\s+time\s+(\d+)\.\.(\d+)", |i, t, r| {
            interpret_timed(i, t, r)
        }),
        // "EXPR = VALUE" : interpret EXPR and check the result.
        entry(r"(.*)\s*=\s*(null|-?\d+)", |i, t, r| {
            interpret_equality(i, t, r)
        }),
        // "sleep" or "sleep(N)" : suspend for N time units.
        entry(r"sleep(?:\((\d+)\))?", |i, _, r| {
            let units = opt_units(r, 1)?;
            thread::sleep(timing::scale(units, i.time_unit()));
            Ok(None)
        }),
        // "EXPR fails" : interpret EXPR and check that it errored.
        entry(r"(.*)\s+fails", |i, t, r| match i.interpret(&r[1], t) {
            Ok(value) => Err(Error::assertion(format!(
                "expected `{}` to fail, but it returned {:?}",
                r[1].trim(),
                value
            ))),
            Err(_) => Ok(None),
        }),
    ]
}

fn entry<T, F>(pattern: &str, handler: F) -> Entry<T>
where
    F: Fn(&ConcurrentInterpreter<T>, &T, &Captures<'_>) -> HandlerResult + Send + Sync + 'static,
{
    Entry {
        pattern: compile_anchored(pattern),
        handler: Box::new(handler),
    }
}

/// Parse an optional captured group as a number of time units.
fn opt_units(r: &Captures<'_>, default: u32) -> Result<u32, Error> {
    match r.get(1) {
        None => Ok(default),
        Some(m) => m
            .as_str()
            .parse()
            .map_err(|_| Error::assertion(format!("invalid time unit count `{}`", m.as_str()))),
    }
}

fn parse_units(text: &str) -> Result<u32, Error> {
    text.parse()
        .map_err(|_| Error::assertion(format!("invalid time bound `{text}`")))
}

/// The `EXPR time LOW..HIGH` instruction.
///
/// Timing a statement on a running thread is subject to scheduling jitter,
/// so the two bounds are measured asymmetrically:
///
/// - the lower bound is checked against a timestamp taken immediately before
///   interpreting (the latest possible start): if the expression took at
///   least LOW units measured from there, it certainly took at least LOW;
/// - the upper bound is checked against the last instant this thread was
///   about to block (the earliest possible start), at whole-unit
///   granularity, so sub-unit jitter on either side of the barrier never
///   fails an otherwise correct assertion.
fn interpret_timed<T>(
    i: &ConcurrentInterpreter<T>,
    context: &T,
    r: &Captures<'_>,
) -> HandlerResult {
    let low = parse_units(&r[2])?;
    let high = parse_units(&r[3])?;
    let unit = i.time_unit();

    let late_start = Instant::now();
    let result = i.interpret(&r[1], context)?;
    let end = Instant::now();

    let from_late_start = end.duration_since(late_start);
    if from_late_start < timing::scale(low, unit) {
        return Err(Error::assertion(format!(
            "`{}` took {:?}, expected at least {} time units",
            r[1].trim(),
            from_late_start,
            low
        )));
    }

    let early_start = timing::last_blocked().unwrap_or(late_start);
    let from_early_start = end.duration_since(early_start);
    if from_early_start >= timing::scale(high.saturating_add(1), unit) {
        return Err(Error::assertion(format!(
            "`{}` took {:?} measured from the last block, expected at most {} time units",
            r[1].trim(),
            from_early_start,
            high
        )));
    }

    Ok(result)
}

/// The `EXPR = VALUE` instruction. VALUE is `null` or an integer literal.
fn interpret_equality<T>(
    i: &ConcurrentInterpreter<T>,
    context: &T,
    r: &Captures<'_>,
) -> HandlerResult {
    let result = i.interpret(&r[1], context)?;

    let expected = match &r[2] {
        "null" => None,
        token => Some(Value::Int(token.parse().map_err(|_| {
            Error::assertion(format!("invalid integer literal `{token}`"))
        })?)),
    };

    if result != expected {
        return Err(Error::assertion(format!(
            "`{}` returned {:?}, expected {:?}",
            r[1].trim(),
            result,
            expected
        )));
    }

    Ok(result)
}
