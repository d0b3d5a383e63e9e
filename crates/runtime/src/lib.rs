//! Rill Runtime
//!
//! Owns everything that happens after compilation: the bytecode VM with its
//! value stack, globals table, and intern set, plus the interactive REPL.
//! The `rill` CLI binary lives in this crate too.
//!
//! The VM is an ordinary value, not process-global state. Construct one per
//! isolated session; writers for program output and diagnostics are
//! injected at construction so hosts (and tests) decide where text goes.
//!
//! ```rust,ignore
//! use rill_runtime::Vm;
//!
//! let mut vm = Vm::with_writers(Vec::new(), Vec::new());
//! vm.interpret("var x = 2; print x * 21;");
//! assert_eq!(vm.output(), b"42\n");
//! ```

pub mod repl;
pub mod vm;

pub use vm::{InterpretResult, STACK_MAX, Vm};
