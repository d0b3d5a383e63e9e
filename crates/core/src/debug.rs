//! Chunk disassembler
//!
//! Renders one line per instruction: byte offset, source line (`|` when the
//! line is unchanged from the previous instruction), opcode name, and
//! operands. Constant operands also render the pooled value.

use crate::chunk::Chunk;
use crate::opcode::OpCode;
use std::io::{self, Write};

pub fn disassemble_chunk<W: Write>(chunk: &Chunk, name: &str, out: &mut W) -> io::Result<()> {
    writeln!(out, "== {} ==", name)?;
    let mut offset = 0;
    while offset < chunk.len() {
        offset = disassemble_instruction(chunk, offset, out)?;
    }
    Ok(())
}

/// Disassemble the instruction at `offset`; returns the offset of the next
/// instruction.
pub fn disassemble_instruction<W: Write>(
    chunk: &Chunk,
    offset: usize,
    out: &mut W,
) -> io::Result<usize> {
    write!(out, "{:04} ", offset)?;
    if offset > 0 && chunk.line(offset) == chunk.line(offset - 1) {
        write!(out, "   | ")?;
    } else {
        write!(out, "{:4} ", chunk.line(offset))?;
    }

    let byte = chunk.code()[offset];
    let Ok(op) = OpCode::try_from(byte) else {
        writeln!(out, "Unknown opcode {}", byte)?;
        return Ok(offset + 1);
    };

    match op {
        OpCode::Constant | OpCode::GetGlobal | OpCode::DefineGlobal | OpCode::SetGlobal => {
            constant_instruction(op, chunk, offset, out)
        }
        OpCode::GetLocal | OpCode::SetLocal => byte_instruction(op, chunk, offset, out),
        OpCode::Jump | OpCode::JumpIfFalse => jump_instruction(op, 1, chunk, offset, out),
        OpCode::Loop => jump_instruction(op, -1, chunk, offset, out),
        _ => {
            writeln!(out, "{}", op.name())?;
            Ok(offset + 1)
        }
    }
}

fn constant_instruction<W: Write>(
    op: OpCode,
    chunk: &Chunk,
    offset: usize,
    out: &mut W,
) -> io::Result<usize> {
    let index = chunk.code()[offset + 1] as usize;
    writeln!(out, "{:<16} {:4} '{}'", op.name(), index, chunk.constant(index))?;
    Ok(offset + 2)
}

fn byte_instruction<W: Write>(
    op: OpCode,
    chunk: &Chunk,
    offset: usize,
    out: &mut W,
) -> io::Result<usize> {
    let slot = chunk.code()[offset + 1];
    writeln!(out, "{:<16} {:4}", op.name(), slot)?;
    Ok(offset + 2)
}

fn jump_instruction<W: Write>(
    op: OpCode,
    sign: i64,
    chunk: &Chunk,
    offset: usize,
    out: &mut W,
) -> io::Result<usize> {
    let jump = u16::from_be_bytes([chunk.code()[offset + 1], chunk.code()[offset + 2]]);
    let target = offset as i64 + 3 + sign * i64::from(jump);
    writeln!(out, "{:<16} {:4} -> {}", op.name(), offset, target)?;
    Ok(offset + 3)
}
