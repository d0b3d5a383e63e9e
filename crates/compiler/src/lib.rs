//! Rill Compiler Library
//!
//! Compiles Rill source text into a bytecode [`Chunk`] in a single pass:
//! the Pratt parser pulls tokens from the streaming scanner and emits
//! instructions as it recognizes them. No syntax tree is built.
//!
//! Diagnostics are written to a caller-supplied sink as they are found, in
//! source order, so several errors can surface from one compile. The
//! returned `Result` only says whether any were reported.

pub mod compiler;
pub mod scanner;

pub use scanner::{Scanner, Token, TokenKind};

use compiler::Compiler;
use rill_core::chunk::Chunk;
use rill_core::strings::Strings;
use std::fmt;
use std::io::Write;

/// Marker error: one or more diagnostics were already written to the sink.
#[derive(Debug)]
pub struct CompileError;

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("compilation failed")
    }
}

impl std::error::Error for CompileError {}

/// Compile a complete program.
///
/// Identifier and string literals are canonicalized through `strings`, the
/// same intern set the VM executes against; that is what makes a name in
/// bytecode and a name defined at runtime the same object.
pub fn compile<W: Write>(
    source: &str,
    strings: &mut Strings,
    diag: &mut W,
) -> Result<Chunk, CompileError> {
    tracing::debug!(source_bytes = source.len(), "compile started");
    let (chunk, had_error) = Compiler::new(source, strings, diag).run();
    if had_error {
        tracing::debug!(bytes = chunk.len(), "compile failed");
        return Err(CompileError);
    }
    tracing::debug!(
        bytes = chunk.len(),
        constants = chunk.constants().len(),
        "compiled chunk"
    );
    Ok(chunk)
}
