//! Rill Core: the shared foundation of the Rill virtual machine
//!
//! Everything both the compiler and the VM need to agree on lives here:
//!
//! - `value`: the tagged [`Value`] sum and its display rules
//! - `object`: heap strings with precomputed FNV-1a hashes
//! - `strings`: the intern set that makes string equality a pointer check
//! - `table`: the open-addressed hash table used for interning and globals
//! - `chunk`: bytecode buffer, source-line map, and constant pool
//! - `opcode`: the instruction set
//! - `debug`: the chunk disassembler

pub mod chunk;
pub mod debug;
pub mod object;
pub mod opcode;
pub mod strings;
pub mod table;
pub mod value;

pub use chunk::{Chunk, MAX_CONSTANTS};
pub use object::{Obj, ObjString, hash_bytes};
pub use opcode::OpCode;
pub use strings::Strings;
pub use table::Table;
pub use value::Value;
