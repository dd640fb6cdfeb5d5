//! The concurrent interpreter engine.
//!
//! The engine parses a tabular script into one program per thread, launches
//! one OS thread per column, and synchronizes all workers at a barrier after
//! every line. Each statement is dispatched through the instruction table:
//! caller entries first, then the built-in vocabulary, first full match wins.
//!
//! # Lockstep guarantee
//!
//! All threads execute line N only after every thread has finished line N-1
//! and reached the barrier. That is the engine's core contract: it lets a
//! test assert precise interleavings ("by this synchronization point, thread
//! A must already have done X"). Within a line, columns run concurrently
//! with no mutual ordering; statements joined with `;` on one column run
//! strictly in sequence.
//!
//! # Failure protocol
//!
//! The first statement failure on any thread is recorded in a write-once
//! slot. Threads that observe a recorded failure skip their remaining lines
//! but keep waiting at the barrier each line, so no live thread blocks
//! forever on an exited peer. Detection happens only at line boundaries: a
//! peer failure never interrupts an in-flight handler call. After all
//! threads join, the recorded failure is surfaced to the caller exactly
//! once, carrying the thread index, the failing statement, and a source
//! location synthesized from the call site.

use std::panic::{self, AssertUnwindSafe, Location};
use std::sync::{Barrier, OnceLock};
use std::thread;
use std::time::Duration;

use crate::builtins;
use crate::config::Config;
use crate::error::{Error, ScriptError, ThreadFailure};
use crate::script::Script;
use crate::table::{Entry, HandlerResult, InstructionTable};
use crate::timing;

/// A script interpreter with a fixed instruction vocabulary.
///
/// `T` is the per-thread context type handed to every handler. The engine
/// never shares one context value across threads; if `T` contains shared
/// mutable state (an `Arc` of atomics, say), synchronizing it is the
/// caller's business. That is deliberate: these scripts exist to exercise
/// unsynchronized access patterns under controlled interleavings.
pub struct ConcurrentInterpreter<T> {
    /// Caller-supplied entries, tried first.
    extensions: Vec<Entry<T>>,
    /// Built-in vocabulary, tried after the extensions.
    builtins: Vec<Entry<T>>,
    /// Base duration of one script time unit.
    time_unit: Duration,
}

impl<T> ConcurrentInterpreter<T> {
    /// Create an interpreter with the given caller instructions.
    ///
    /// The base time unit comes from [`Config`]; override it per instance
    /// with [`with_time_unit`](Self::with_time_unit).
    pub fn new(table: InstructionTable<T>) -> Self {
        Self {
            extensions: table.into_entries(),
            builtins: builtins::default_instructions(),
            time_unit: Config::get().time_unit(),
        }
    }

    /// Set the base time unit for `sleep` and `time x..y` instructions.
    pub fn with_time_unit(mut self, unit: Duration) -> Self {
        self.time_unit = unit;
        self
    }

    /// The base duration of one script time unit.
    pub fn time_unit(&self) -> Duration {
        self.time_unit
    }

    /// Interpret a single statement against the thread's context.
    ///
    /// The statement is trimmed, then matched against caller entries and
    /// built-ins in order; the first full match wins. No match is a
    /// [syntax error](Error::Syntax).
    pub fn interpret(&self, statement: &str, context: &T) -> HandlerResult {
        let statement = statement.trim();

        for entry in self.extensions.iter().chain(self.builtins.iter()) {
            if let Some(captures) = entry.pattern.captures(statement) {
                log::trace!("dispatching `{}` to /{}/", statement, entry.pattern);
                return (entry.handler)(self, context, &captures);
            }
        }

        Err(Error::syntax(statement))
    }

    /// Interpret a `;`-separated compound statement.
    ///
    /// Sub-statements run strictly in order; only the last one's result is
    /// returned, the others execute for their side effects.
    pub fn interpret_multiple(&self, compound: &str, context: &T) -> HandlerResult {
        let mut result = None;
        for statement in compound.split(';') {
            result = self.interpret(statement, context)?;
        }
        Ok(result)
    }

    /// Run a script, cloning `initial` for each thread's context.
    ///
    /// Returns when every thread has finished its program. Fails with
    /// [`ScriptError::UnevenColumns`] before any thread starts if the script
    /// shape is invalid, or with [`ScriptError::Thread`] carrying the first
    /// failure recorded by any thread.
    #[track_caller]
    pub fn run_script(&self, script: &str, initial: &T) -> Result<(), ScriptError>
    where
        T: Clone + Sync,
    {
        self.run_script_with(script, initial, 0, T::clone)
    }

    /// Run a script with an explicit line shift and per-thread transform.
    ///
    /// `transform` derives each thread's context from `initial`; it runs on
    /// the worker thread, before the first barrier wait. `line_shift` is
    /// added to reported failure lines, for call sites where the script
    /// literal does not start on the line right after the call.
    #[track_caller]
    pub fn run_script_with<F>(
        &self,
        script: &str,
        initial: &T,
        line_shift: u32,
        transform: F,
    ) -> Result<(), ScriptError>
    where
        T: Sync,
        F: Fn(&T) -> T + Sync,
    {
        let caller = Location::caller();
        let script = Script::parse(script)?;

        log::debug!(
            "running script from {}:{}: {} threads x {} lines",
            caller.file(),
            caller.line(),
            script.thread_count(),
            script.line_count()
        );

        let barrier = Barrier::new(script.thread_count());
        let failure: OnceLock<ThreadFailure> = OnceLock::new();
        let transform = &transform;

        thread::scope(|s| {
            let barrier = &barrier;
            let failure = &failure;
            for (thread_index, program) in script.programs().iter().enumerate() {
                s.spawn(move || {
                    let context = transform(initial);
                    self.run_worker(
                        thread_index,
                        program,
                        &context,
                        barrier,
                        failure,
                        caller,
                        line_shift,
                    );
                });
            }
        });

        match failure.into_inner() {
            Some(recorded) => Err(ScriptError::Thread(recorded)),
            None => Ok(()),
        }
    }

    /// Worker body: one thread, one column.
    #[allow(clippy::too_many_arguments)]
    fn run_worker(
        &self,
        thread_index: usize,
        program: &[String],
        context: &T,
        barrier: &Barrier,
        failure: &OnceLock<ThreadFailure>,
        caller: &'static Location<'static>,
        line_shift: u32,
    ) {
        // All threads start line 1 together.
        timing::mark_about_to_block();
        barrier.wait();

        for (line_index, statement) in program.iter().enumerate() {
            // Peer failures are only observed here, at the line boundary;
            // they never preempt a handler already in flight.
            if failure.get().is_none() {
                if let Some(cause) = self.execute_statement(statement, context) {
                    let line = caller.line() + line_shift + line_index as u32 + 1;
                    log::debug!(
                        "thread {} failed on `{}` (line {}): {}",
                        thread_index,
                        statement,
                        line,
                        cause
                    );
                    // First writer wins; a concurrent peer's failure stands.
                    let _ = failure.set(ThreadFailure {
                        thread: thread_index,
                        statement: statement.clone(),
                        file: caller.file(),
                        line,
                        cause,
                    });
                }
            }

            timing::mark_about_to_block();
            barrier.wait();
        }
    }

    /// Execute one compound statement, returning its failure if any.
    ///
    /// A panicking handler is caught here and recorded like any other error:
    /// letting it unwind past the barrier protocol would leave the other
    /// threads waiting forever.
    fn execute_statement(&self, statement: &str, context: &T) -> Option<Error> {
        let outcome =
            panic::catch_unwind(AssertUnwindSafe(|| self.interpret_multiple(statement, context)));

        match outcome {
            Ok(Ok(_)) => None,
            Ok(Err(error)) => Some(error),
            Err(payload) => Some(Error::Handler(anyhow::anyhow!(
                "handler panicked: {}",
                panic_message(payload.as_ref())
            ))),
        }
    }
}

impl<T> Default for ConcurrentInterpreter<T> {
    /// An interpreter with only the built-in vocabulary.
    fn default() -> Self {
        Self::new(InstructionTable::new())
    }
}

/// Best-effort extraction of a panic payload's message.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Value;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    fn counting_interpreter() -> ConcurrentInterpreter<Arc<AtomicI64>> {
        let table = InstructionTable::new()
            .entry(r"add (-?\d+)", |_, counter: &Arc<AtomicI64>, r| {
                let n: i64 = r[1].parse().unwrap();
                Ok(Some(Value::Int(counter.fetch_add(n, Ordering::SeqCst) + n)))
            })
            .entry(r"count", |_, counter, _| {
                Ok(Some(Value::Int(counter.load(Ordering::SeqCst))))
            })
            .entry(r"panic", |_, _, _| panic!("handler blew up"));
        ConcurrentInterpreter::new(table).with_time_unit(Duration::from_millis(10))
    }

    #[test]
    fn test_interpret_dispatches_first_match() {
        let i = counting_interpreter();
        let counter = Arc::new(AtomicI64::new(0));
        assert_eq!(
            i.interpret("add 2", &counter).unwrap(),
            Some(Value::Int(2))
        );
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_interpret_unmatched_is_syntax_error() {
        let i = counting_interpreter();
        let counter = Arc::new(AtomicI64::new(0));
        let err = i.interpret("launch the missiles", &counter).unwrap_err();
        match err {
            Error::Syntax { statement } => assert_eq!(statement, "launch the missiles"),
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_interpret_multiple_returns_last_result() {
        let i = counting_interpreter();
        let counter = Arc::new(AtomicI64::new(0));

        // "add 1" and "add 2" run for their side effects; only the last
        // sub-statement's result comes back.
        let result = i.interpret_multiple("add 1 ; add 2 ; count", &counter);
        assert_eq!(result.unwrap(), Some(Value::Int(3)));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_interpret_multiple_stops_at_first_error() {
        let i = counting_interpreter();
        let counter = Arc::new(AtomicI64::new(0));

        assert!(i.interpret_multiple("add 1 ; bogus ; add 2", &counter).is_err());
        // The error cut the sequence short.
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_extension_shadows_builtin_by_order() {
        // A caller entry matching "sleep" wins over the builtin because
        // caller entries are tried first.
        let table = InstructionTable::new()
            .entry(r"sleep", |_, _: &(), _| Ok(Some(Value::Int(42))));
        let i = ConcurrentInterpreter::new(table);

        let start = std::time::Instant::now();
        assert_eq!(i.interpret("sleep", &()).unwrap(), Some(Value::Int(42)));
        assert!(start.elapsed() < DEFAULT_TEST_BUDGET);
    }

    const DEFAULT_TEST_BUDGET: Duration = Duration::from_millis(50);

    #[test]
    fn test_run_script_runs_all_columns() {
        let i = counting_interpreter();
        let counter = Arc::new(AtomicI64::new(0));

        i.run_script("add 1 | add 2 | add 4", &counter).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_run_script_lockstep_ordering() {
        let i = counting_interpreter();
        let counter = Arc::new(AtomicI64::new(0));

        // The barrier guarantees the right column observes each line's
        // effect on the next line.
        i.run_script(
            "add 1 |\n      | count = 1\nadd 1 |\n      | count = 2",
            &counter,
        )
        .unwrap();
    }

    #[test]
    fn test_run_script_uneven_columns_abort_before_start() {
        let i = counting_interpreter();
        let counter = Arc::new(AtomicI64::new(0));

        let err = i.run_script("add 1 | add 1\nadd 1", &counter).unwrap_err();
        assert!(matches!(err, ScriptError::UnevenColumns { .. }));
        // No thread ever started, so no handler ran.
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_run_script_reports_failing_thread_and_statement() {
        let i = counting_interpreter();
        let counter = Arc::new(AtomicI64::new(0));

        let err = i.run_script("add 1 | count = 99", &counter).unwrap_err();
        match err {
            ScriptError::Thread(failure) => {
                assert_eq!(failure.thread, 1);
                assert_eq!(failure.statement, "count = 99");
                assert!(matches!(failure.cause, Error::Assertion { .. }));
            }
            other => panic!("expected thread failure, got {:?}", other),
        }
    }

    #[test]
    fn test_run_script_synthesizes_caller_line() {
        let i = counting_interpreter();
        let counter = Arc::new(AtomicI64::new(0));

        let call_line = line!() + 1;
        let err = i.run_script("count = 0\ncount = 99", &counter).unwrap_err();
        match err {
            ScriptError::Thread(failure) => {
                assert_eq!(failure.file, file!());
                // Line 2 of the script failed.
                assert_eq!(failure.line, call_line + 2);
            }
            other => panic!("expected thread failure, got {:?}", other),
        }
    }

    #[test]
    fn test_run_script_with_applies_line_shift() {
        let i = counting_interpreter();
        let counter = Arc::new(AtomicI64::new(0));

        let call_line = line!() + 1;
        let err = i.run_script_with("count = 99", &counter, 10, Arc::clone).unwrap_err();
        match err {
            ScriptError::Thread(failure) => assert_eq!(failure.line, call_line + 10 + 1),
            other => panic!("expected thread failure, got {:?}", other),
        }
    }

    #[test]
    fn test_run_script_transform_runs_per_thread() {
        let table = InstructionTable::new().entry(r"tick", |_, counter: &Arc<AtomicI64>, _| {
            Ok(Some(Value::Int(counter.load(Ordering::SeqCst))))
        });
        let i = ConcurrentInterpreter::new(table);
        let transforms = Arc::new(AtomicI64::new(0));

        i.run_script_with("tick | tick | tick", &transforms, 0, |shared| {
            shared.fetch_add(1, Ordering::SeqCst);
            Arc::clone(shared)
        })
        .unwrap();

        // One transform per column, applied before line 1.
        assert_eq!(transforms.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_panicking_handler_is_recorded_not_propagated() {
        let i = counting_interpreter();
        let counter = Arc::new(AtomicI64::new(0));

        // The panic must neither unwind out of run_script nor leave the
        // peer column stuck at the barrier.
        let err = i.run_script("panic | add 1\nadd 2 | add 2", &counter).unwrap_err();
        match err {
            ScriptError::Thread(failure) => {
                assert_eq!(failure.thread, 0);
                assert_eq!(failure.statement, "panic");
                assert!(failure.cause.to_string().contains("handler blew up"));
            }
            other => panic!("expected thread failure, got {:?}", other),
        }
    }

    #[test]
    fn test_failure_drains_remaining_lines() {
        let i = counting_interpreter();
        let counter = Arc::new(AtomicI64::new(0));

        // Line 2 fails on column A while column B runs an empty statement.
        // By line 3 the failure is visible to both columns (the failing
        // thread records it before reaching the line-2 barrier), so neither
        // "add" runs.
        let err = i
            .run_script("add 1 | add 2\ncount = 99 |\nadd 100 | add 100", &counter)
            .unwrap_err();

        assert!(matches!(err, ScriptError::Thread(_)));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_single_column_script() {
        let i = counting_interpreter();
        let counter = Arc::new(AtomicI64::new(0));

        i.run_script("add 1\nadd 1\ncount = 2", &counter).unwrap();
    }

    #[test]
    fn test_empty_script_is_a_noop_run() {
        let i = counting_interpreter();
        let counter = Arc::new(AtomicI64::new(0));
        i.run_script("", &counter).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
