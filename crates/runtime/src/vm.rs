//! The Rill virtual machine
//!
//! A stack machine over one chunk at a time. The VM owns the pieces that
//! outlive a single `interpret` call: the value stack, the globals table,
//! and the intern set. Chunks are compiled per call and dropped when the
//! call returns; interned strings and globals survive, which is what lets
//! a REPL accumulate state line by line.
//!
//! Two writers are injected at construction: program output (`print` goes
//! here) and diagnostics (compile and runtime errors).

use rill_core::chunk::Chunk;
use rill_core::object::{Obj, ObjString};
use rill_core::opcode::OpCode;
use rill_core::strings::Strings;
use rill_core::table::Table;
use rill_core::value::Value;
use rillc::CompileError;
use std::io::{self, Write};
use std::rc::Rc;

/// Initial capacity of the value stack.
pub const STACK_MAX: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpretResult {
    Ok,
    CompileError,
    RuntimeError,
}

pub struct Vm<Out: Write, Diag: Write> {
    stack: Vec<Value>,
    globals: Table,
    strings: Strings,
    output: Out,
    diag: Diag,
}

impl Vm<io::Stdout, io::Stderr> {
    /// A VM wired to the process's stdout and stderr.
    pub fn new() -> Vm<io::Stdout, io::Stderr> {
        Vm::with_writers(io::stdout(), io::stderr())
    }
}

impl Default for Vm<io::Stdout, io::Stderr> {
    fn default() -> Vm<io::Stdout, io::Stderr> {
        Vm::new()
    }
}

impl<Out: Write, Diag: Write> Vm<Out, Diag> {
    pub fn with_writers(output: Out, diag: Diag) -> Vm<Out, Diag> {
        Vm {
            stack: Vec::with_capacity(STACK_MAX),
            globals: Table::new(),
            strings: Strings::new(),
            output,
            diag,
        }
    }

    /// Compile and execute a complete program text.
    pub fn interpret(&mut self, source: &str) -> InterpretResult {
        let chunk = match rillc::compile(source, &mut self.strings, &mut self.diag) {
            Ok(chunk) => chunk,
            Err(CompileError) => return InterpretResult::CompileError,
        };

        let result = self.run(&chunk);
        tracing::debug!(?result, "interpret finished");
        result
    }

    /// Compile without executing. The chunk is tied to this VM's intern
    /// set and may be passed to [`Vm::run`].
    pub fn compile_only(&mut self, source: &str) -> Result<Chunk, CompileError> {
        rillc::compile(source, &mut self.strings, &mut self.diag)
    }

    /// Borrow the program-output writer (tests read captured output here).
    pub fn output(&self) -> &Out {
        &self.output
    }

    /// Borrow the diagnostics writer.
    pub fn diagnostics(&self) -> &Diag {
        &self.diag
    }

    /// Execute a chunk produced by [`Vm::compile_only`] on this same VM.
    pub fn run(&mut self, chunk: &Chunk) -> InterpretResult {
        let mut ip = 0usize;

        loop {
            #[cfg(feature = "trace")]
            self.trace(chunk, ip);

            let byte = chunk.code()[ip];
            ip += 1;
            let Ok(op) = OpCode::try_from(byte) else {
                return self.runtime_error(chunk, ip, &format!("Unknown opcode {}.", byte));
            };

            match op {
                OpCode::Constant => {
                    let index = chunk.code()[ip] as usize;
                    ip += 1;
                    self.stack.push(chunk.constant(index).clone());
                }
                OpCode::Nil => self.stack.push(Value::Nil),
                OpCode::True => self.stack.push(Value::Bool(true)),
                OpCode::False => self.stack.push(Value::Bool(false)),
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::GetLocal => {
                    let slot = chunk.code()[ip] as usize;
                    ip += 1;
                    let value = self.stack[slot].clone();
                    self.stack.push(value);
                }
                OpCode::SetLocal => {
                    let slot = chunk.code()[ip] as usize;
                    ip += 1;
                    let value = self.peek(0).clone();
                    self.stack[slot] = value;
                }
                OpCode::GetGlobal => {
                    let index = chunk.code()[ip] as usize;
                    ip += 1;
                    let name = match self.name_constant(chunk, index) {
                        Some(name) => name,
                        None => {
                            return self.corrupt_name_constant(chunk, ip);
                        }
                    };
                    match self.globals.get(&name) {
                        Some(value) => {
                            let value = value.clone();
                            self.stack.push(value);
                        }
                        None => {
                            let message = format!("Undefined variable '{}'.", name.as_str());
                            return self.runtime_error(chunk, ip, &message);
                        }
                    }
                }
                OpCode::DefineGlobal => {
                    let index = chunk.code()[ip] as usize;
                    ip += 1;
                    let name = match self.name_constant(chunk, index) {
                        Some(name) => name,
                        None => {
                            return self.corrupt_name_constant(chunk, ip);
                        }
                    };
                    let value = self.peek(0).clone();
                    self.globals.set(name, value);
                    self.pop();
                }
                OpCode::SetGlobal => {
                    let index = chunk.code()[ip] as usize;
                    ip += 1;
                    let name = match self.name_constant(chunk, index) {
                        Some(name) => name,
                        None => {
                            return self.corrupt_name_constant(chunk, ip);
                        }
                    };
                    let value = self.peek(0).clone();
                    // Assignment never declares: a fresh insert means the
                    // name was undefined, so undo it and fail.
                    if self.globals.set(Rc::clone(&name), value) {
                        self.globals.delete(&name);
                        let message = format!("Undefined variable '{}'.", name.as_str());
                        return self.runtime_error(chunk, ip, &message);
                    }
                }
                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.stack.push(Value::Bool(a == b));
                }
                OpCode::Greater => {
                    if let Err(message) = self.binary_number_op(|a, b| Value::Bool(a > b)) {
                        return self.runtime_error(chunk, ip, message);
                    }
                }
                OpCode::Less => {
                    if let Err(message) = self.binary_number_op(|a, b| Value::Bool(a < b)) {
                        return self.runtime_error(chunk, ip, message);
                    }
                }
                OpCode::Add => {
                    let len = self.stack.len();
                    let result = match (&self.stack[len - 2], &self.stack[len - 1]) {
                        (Value::Obj(Obj::Str(a)), Value::Obj(Obj::Str(b))) => {
                            let mut text = String::with_capacity(a.len() + b.len());
                            text.push_str(a.as_str());
                            text.push_str(b.as_str());
                            Value::Obj(Obj::Str(self.strings.intern_owned(text)))
                        }
                        (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
                        _ => {
                            return self.runtime_error(
                                chunk,
                                ip,
                                "Operands must be two numbers or two strings.",
                            );
                        }
                    };
                    self.pop();
                    self.pop();
                    self.stack.push(result);
                }
                OpCode::Subtract => {
                    if let Err(message) = self.binary_number_op(|a, b| Value::Number(a - b)) {
                        return self.runtime_error(chunk, ip, message);
                    }
                }
                OpCode::Multiply => {
                    if let Err(message) = self.binary_number_op(|a, b| Value::Number(a * b)) {
                        return self.runtime_error(chunk, ip, message);
                    }
                }
                OpCode::Divide => {
                    if let Err(message) = self.binary_number_op(|a, b| Value::Number(a / b)) {
                        return self.runtime_error(chunk, ip, message);
                    }
                }
                OpCode::Not => {
                    let value = self.pop();
                    self.stack.push(Value::Bool(value.is_falsey()));
                }
                OpCode::Negate => {
                    match self.peek(0).as_number() {
                        Some(n) => {
                            self.pop();
                            self.stack.push(Value::Number(-n));
                        }
                        None => {
                            return self.runtime_error(chunk, ip, "Operand must be a number.");
                        }
                    }
                }
                OpCode::Print => {
                    let value = self.pop();
                    let _ = writeln!(self.output, "{}", value);
                }
                OpCode::Jump => {
                    let offset = read_u16(chunk, &mut ip);
                    ip += offset;
                }
                OpCode::JumpIfFalse => {
                    let offset = read_u16(chunk, &mut ip);
                    if self.peek(0).is_falsey() {
                        ip += offset;
                    }
                }
                OpCode::Loop => {
                    let offset = read_u16(chunk, &mut ip);
                    ip -= offset;
                }
                OpCode::Return => {
                    return InterpretResult::Ok;
                }
            }
        }
    }

    fn pop(&mut self) -> Value {
        debug_assert!(!self.stack.is_empty(), "pop on empty stack");
        self.stack.pop().unwrap_or(Value::Nil)
    }

    fn peek(&self, distance: usize) -> &Value {
        &self.stack[self.stack.len() - 1 - distance]
    }

    /// Both operands must be numbers; pops them and pushes the result.
    fn binary_number_op(&mut self, op: fn(f64, f64) -> Value) -> Result<(), &'static str> {
        let (Some(b), Some(a)) = (self.peek(0).as_number(), self.peek(1).as_number()) else {
            return Err("Operands must be numbers.");
        };
        self.pop();
        self.pop();
        self.stack.push(op(a, b));
        Ok(())
    }

    /// Fetch the interned name a global-variable instruction refers to.
    fn name_constant(&self, chunk: &Chunk, index: usize) -> Option<Rc<ObjString>> {
        chunk.constant(index).as_string().map(Rc::clone)
    }

    fn corrupt_name_constant(&mut self, chunk: &Chunk, ip: usize) -> InterpretResult {
        self.runtime_error(chunk, ip, "Corrupt chunk: name constant is not a string.")
    }

    /// Report a runtime error with the offending source line, reset the
    /// stack, and leave globals and interned strings intact for the next
    /// `interpret` call.
    fn runtime_error(&mut self, chunk: &Chunk, ip: usize, message: &str) -> InterpretResult {
        let _ = writeln!(self.diag, "{}", message);
        let line = chunk.line(ip - 1);
        let _ = writeln!(self.diag, "[line {}] in script", line);
        self.stack.clear();
        InterpretResult::RuntimeError
    }

    #[cfg(feature = "trace")]
    fn trace(&mut self, chunk: &Chunk, ip: usize) {
        let _ = write!(self.diag, "          ");
        for value in &self.stack {
            let _ = write!(self.diag, "[ {} ]", value);
        }
        let _ = writeln!(self.diag);
        let _ = rill_core::debug::disassemble_instruction(chunk, ip, &mut self.diag);
    }
}

fn read_u16(chunk: &Chunk, ip: &mut usize) -> usize {
    let offset = u16::from_be_bytes([chunk.code()[*ip], chunk.code()[*ip + 1]]);
    *ip += 2;
    offset as usize
}
