//! Interactive session
//!
//! One `interpret` per line against a single long-lived VM, so globals and
//! interned strings accumulate across lines. Errors are reported and the
//! prompt comes back; Ctrl-C and Ctrl-D both end the session.

use crate::vm::Vm;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

pub fn run() -> Result<(), String> {
    let mut editor =
        DefaultEditor::new().map_err(|e| format!("Failed to start line editor: {}", e))?;
    let mut vm = Vm::new();

    println!("rill {} (Ctrl-D to exit)", env!("CARGO_PKG_VERSION"));

    loop {
        match editor.readline("> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line.as_str());
                // Result deliberately ignored: diagnostics already went to
                // stderr and the session continues either way.
                vm.interpret(&line);
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(format!("Failed to read line: {}", e)),
        }
    }

    Ok(())
}
