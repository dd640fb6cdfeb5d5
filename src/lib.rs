//! Barrier-synchronized interpreter for multi-threaded test scripts.
//!
//! lockstep runs small tabular scripts that describe concurrent scenarios:
//! one column per thread, one line per synchronization round, statements
//! dispatched through a caller-extensible regex instruction table. All
//! threads rendezvous at a barrier after every line, which makes precise
//! interleavings scriptable ("thread B must observe thread A's line-1 write
//! on line 2").
//!
//! # Architecture
//!
//! - [`script`]: parses the pipe-and-semicolon table into per-thread programs
//! - [`table`]: ordered regex dispatch, caller entries before built-ins
//! - built-in vocabulary: `sleep`, `=`, `time x..y`, `fails`, comments and
//!   empty statements
//! - [`engine`]: thread orchestration, barrier protocol, first-failure slot
//! - [`timing`]: time-unit scaling and per-thread blocking timestamps
//! - [`config`]: base time unit from `lockstep.toml` or the environment
//! - [`error`]: statement- and run-level error types
//!
//! # Example
//!
//! ```
//! use lockstep::{ConcurrentInterpreter, InstructionTable, Value};
//! use std::sync::atomic::{AtomicI64, Ordering};
//! use std::sync::Arc;
//!
//! let table = InstructionTable::new()
//!     .entry(r"add (-?\d+)", |_, counter: &Arc<AtomicI64>, caps| {
//!         let n: i64 = caps[1].parse().unwrap();
//!         Ok(Some(Value::Int(counter.fetch_add(n, Ordering::SeqCst) + n)))
//!     });
//! let interpreter = ConcurrentInterpreter::new(table);
//!
//! let counter = Arc::new(AtomicI64::new(0));
//! interpreter.run_script(
//!     "
//!     add 1 | add 2
//!     add 3 |
//!     ",
//!     &counter,
//! )?;
//! assert_eq!(counter.load(Ordering::SeqCst), 6);
//! # Ok::<(), lockstep::ScriptError>(())
//! ```
//!
//! A failing statement on any thread stops the run: threads that observe the
//! failure skip their remaining lines (while still keeping the barrier fed)
//! and `run_script` reports the first failure with its thread index and a
//! source location synthesized from the call site.

mod builtins;
pub mod config;
pub mod engine;
pub mod error;
pub mod script;
pub mod table;
pub mod timing;

pub use config::Config;
pub use engine::ConcurrentInterpreter;
pub use error::{Error, ScriptError, ThreadFailure};
pub use script::Script;
pub use table::{HandlerResult, InstructionTable, Value};
pub use timing::DEFAULT_TIME_UNIT;
