//! Single-pass compiler: Pratt parser and bytecode emitter in one walk
//!
//! There is no AST. The parser pulls tokens from the scanner and emits
//! bytecode into the target chunk as it goes; forward jumps are emitted
//! with placeholder operands and backpatched once the target offset is
//! known.
//!
//! Compile errors never abort the pass. Each is reported to the diagnostic
//! sink, panic mode suppresses the cascade that usually follows, and the
//! parser resynchronizes at the next statement boundary so later errors
//! still surface.

use crate::scanner::{Scanner, Token, TokenKind};
use rill_core::chunk::{Chunk, MAX_CONSTANTS};
use rill_core::object::Obj;
use rill_core::opcode::OpCode;
use rill_core::strings::Strings;
use rill_core::value::Value;
use std::io::Write;

/// Stack slots are addressed by one byte.
const MAX_LOCALS: usize = 256;

/// Expression precedence, lowest to highest. Parsing at a level consumes
/// every operator of that level or tighter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    None,
    Assignment, // =
    Or,         // or
    And,        // and
    Equality,   // == !=
    Comparison, // < > <= >=
    Term,       // + -
    Factor,     // * /
    Unary,      // ! -
    Call,       // . ()
    Primary,
}

impl Precedence {
    /// One level tighter; used for left-associative infix operands.
    fn next(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call | Precedence::Primary => Precedence::Primary,
        }
    }
}

type ParseFn<'src, 'ctx> = fn(&mut Compiler<'src, 'ctx>, bool);

/// One row of the Pratt table: how a token parses in prefix position, in
/// infix position, and how tightly it binds as an infix operator.
struct ParseRule<'src, 'ctx> {
    prefix: Option<ParseFn<'src, 'ctx>>,
    infix: Option<ParseFn<'src, 'ctx>>,
    precedence: Precedence,
}

/// A declared local variable. `depth` is `None` between declaration and
/// the end of its initializer, which is what makes `var a = a;` detectable.
struct Local<'src> {
    name: &'src str,
    depth: Option<u32>,
}

pub(crate) struct Compiler<'src, 'ctx> {
    scanner: Scanner<'src>,
    current: Token<'src>,
    previous: Token<'src>,
    had_error: bool,
    panic_mode: bool,
    chunk: Chunk,
    locals: Vec<Local<'src>>,
    scope_depth: u32,
    strings: &'ctx mut Strings,
    diag: &'ctx mut dyn Write,
}

impl<'src, 'ctx> Compiler<'src, 'ctx> {
    pub(crate) fn new(
        source: &'src str,
        strings: &'ctx mut Strings,
        diag: &'ctx mut dyn Write,
    ) -> Compiler<'src, 'ctx> {
        Compiler {
            scanner: Scanner::new(source),
            current: Token::empty(),
            previous: Token::empty(),
            had_error: false,
            panic_mode: false,
            chunk: Chunk::new(),
            locals: Vec::new(),
            scope_depth: 0,
            strings,
            diag,
        }
    }

    /// Run the pass. Returns the finished chunk and whether any error was
    /// reported along the way.
    pub(crate) fn run(mut self) -> (Chunk, bool) {
        self.advance();
        while !self.match_token(TokenKind::Eof) {
            self.declaration();
        }
        self.emit_return();
        (self.chunk, self.had_error)
    }

    // ------------------------------------------------------------------
    // Token plumbing
    // ------------------------------------------------------------------

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.scanner.next_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            // Error tokens carry their message as the lexeme.
            let token = self.current;
            self.error_at(token, token.lexeme);
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
            return;
        }
        self.error_at_current(message);
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    // ------------------------------------------------------------------
    // Error reporting
    // ------------------------------------------------------------------

    fn error_at(&mut self, token: Token<'src>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;

        let _ = write!(self.diag, "[line {}] Error", token.line);
        match token.kind {
            TokenKind::Eof => {
                let _ = write!(self.diag, " at end");
            }
            TokenKind::Error => {}
            _ => {
                let _ = write!(self.diag, " at '{}'", token.lexeme);
            }
        }
        let _ = writeln!(self.diag, ": {}", message);
        self.had_error = true;
    }

    /// Report at the token just consumed.
    fn error(&mut self, message: &str) {
        self.error_at(self.previous, message);
    }

    fn error_at_current(&mut self, message: &str) {
        self.error_at(self.current, message);
    }

    /// Skip tokens until a statement boundary, then resume normal parsing.
    fn synchronize(&mut self) {
        self.panic_mode = false;

        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => self.advance(),
            }
        }
    }

    // ------------------------------------------------------------------
    // Emission
    // ------------------------------------------------------------------

    fn emit_byte(&mut self, byte: u8) {
        // Attribute to the token just consumed so runtime errors point at
        // the right line.
        self.chunk.write(byte, self.previous.line);
    }

    fn emit_op(&mut self, op: OpCode) {
        self.emit_byte(op.into());
    }

    fn emit_ops(&mut self, first: OpCode, second: OpCode) {
        self.emit_op(first);
        self.emit_op(second);
    }

    fn emit_with_operand(&mut self, op: OpCode, operand: u8) {
        self.emit_op(op);
        self.emit_byte(operand);
    }

    fn emit_return(&mut self) {
        self.emit_op(OpCode::Return);
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        let index = self.chunk.add_constant(value);
        if index >= MAX_CONSTANTS {
            self.error("Too many constants in one chunk.");
            return 0;
        }
        index as u8
    }

    fn emit_constant(&mut self, value: Value) {
        let index = self.make_constant(value);
        self.emit_with_operand(OpCode::Constant, index);
    }

    /// Emit a forward jump with a placeholder offset; returns the offset of
    /// the placeholder for later patching.
    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.chunk.len() - 2
    }

    /// Point the placeholder at `offset` to the current end of code.
    fn patch_jump(&mut self, offset: usize) {
        // -2 adjusts for the operand bytes themselves.
        let jump = self.chunk.len() - offset - 2;
        if jump > u16::MAX as usize {
            self.error("Too much code to jump over.");
        }
        let bytes = (jump as u16).to_be_bytes();
        self.chunk.patch(offset, bytes[0]);
        self.chunk.patch(offset + 1, bytes[1]);
    }

    /// Emit an unconditional backward jump to `loop_start`.
    fn emit_loop(&mut self, loop_start: usize) {
        self.emit_op(OpCode::Loop);
        // +2 jumps over this instruction's own operand bytes.
        let offset = self.chunk.len() - loop_start + 2;
        if offset > u16::MAX as usize {
            self.error("Loop body too large.");
        }
        let bytes = (offset as u16).to_be_bytes();
        self.emit_byte(bytes[0]);
        self.emit_byte(bytes[1]);
    }

    // ------------------------------------------------------------------
    // Declarations and statements
    // ------------------------------------------------------------------

    fn declaration(&mut self) {
        if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }

        if self.panic_mode {
            self.synchronize();
        }
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");

        if self.match_token(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.consume(
            TokenKind::Semicolon,
            "Expect ';' after variable declaration.",
        );

        self.define_variable(global);
    }

    fn statement(&mut self) {
        if self.match_token(TokenKind::Print) {
            self.print_statement();
        } else if self.match_token(TokenKind::If) {
            self.if_statement();
        } else if self.match_token(TokenKind::While) {
            self.while_statement();
        } else if self.match_token(TokenKind::For) {
            self.for_statement();
        } else if self.match_token(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after value.");
        self.emit_op(OpCode::Print);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        self.emit_op(OpCode::Pop);
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        let else_jump = self.emit_jump(OpCode::Jump);

        self.patch_jump(then_jump);
        self.emit_op(OpCode::Pop);

        if self.match_token(TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.chunk.len();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop);
    }

    fn for_statement(&mut self) {
        // The whole clause is a scope so an initializer `var` is local.
        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.");

        if self.match_token(TokenKind::Semicolon) {
            // No initializer.
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.chunk.len();

        let mut exit_jump = None;
        if !self.match_token(TokenKind::Semicolon) {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.");
            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse));
            self.emit_op(OpCode::Pop);
        }

        if !self.match_token(TokenKind::RightParen) {
            // The increment executes after the body, but appears before it
            // in the bytecode: jump over it into the body, and make the
            // body's loop target the increment.
            let body_jump = self.emit_jump(OpCode::Jump);
            let increment_start = self.chunk.len();
            self.expression();
            self.emit_op(OpCode::Pop);
            self.consume(TokenKind::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
            self.emit_op(OpCode::Pop);
        }
        self.end_scope();
    }

    // ------------------------------------------------------------------
    // Scopes and variables
    // ------------------------------------------------------------------

    fn begin_scope(&mut self) {
        self.scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.scope_depth -= 1;

        while self
            .locals
            .last()
            .is_some_and(|local| local.depth.is_some_and(|d| d > self.scope_depth))
        {
            self.emit_op(OpCode::Pop);
            self.locals.pop();
        }
    }

    /// Consume an identifier, declare it, and (for globals) intern the name
    /// into the constant pool. Locals need no constant: they are addressed
    /// by stack slot.
    fn parse_variable(&mut self, message: &str) -> u8 {
        self.consume(TokenKind::Identifier, message);

        self.declare_variable();
        if self.scope_depth > 0 {
            return 0;
        }

        self.identifier_constant(self.previous)
    }

    fn identifier_constant(&mut self, name: Token<'src>) -> u8 {
        let interned = self.strings.intern(name.lexeme);
        self.make_constant(Value::Obj(Obj::Str(interned)))
    }

    /// Record a new local in the current scope. No-op at global scope.
    fn declare_variable(&mut self) {
        if self.scope_depth == 0 {
            return;
        }
        let name = self.previous;

        let mut clashes = false;
        for local in self.locals.iter().rev() {
            if local.depth.is_some_and(|d| d < self.scope_depth) {
                break;
            }
            if local.name == name.lexeme {
                clashes = true;
                break;
            }
        }
        if clashes {
            self.error("Already a variable with this name in this scope.");
        }

        self.add_local(name);
    }

    fn add_local(&mut self, name: Token<'src>) {
        if self.locals.len() == MAX_LOCALS {
            self.error("Too many local variables in function.");
            return;
        }
        // Declared but uninitialized until the initializer has compiled.
        self.locals.push(Local {
            name: name.lexeme,
            depth: None,
        });
    }

    fn mark_initialized(&mut self) {
        if let Some(local) = self.locals.last_mut() {
            local.depth = Some(self.scope_depth);
        }
    }

    fn define_variable(&mut self, global: u8) {
        if self.scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_with_operand(OpCode::DefineGlobal, global);
    }

    /// Find a local by name, innermost first. The slot index equals the
    /// local's runtime stack position.
    fn resolve_local(&mut self, name: Token<'src>) -> Option<u8> {
        for (slot, local) in self.locals.iter().enumerate().rev() {
            if local.name == name.lexeme {
                if local.depth.is_none() {
                    self.error("Can't read local variable in its own initializer.");
                }
                return Some(slot as u8);
            }
        }
        None
    }

    fn named_variable(&mut self, name: Token<'src>, can_assign: bool) {
        let (get_op, set_op, arg) = match self.resolve_local(name) {
            Some(slot) => (OpCode::GetLocal, OpCode::SetLocal, slot),
            None => {
                let index = self.identifier_constant(name);
                (OpCode::GetGlobal, OpCode::SetGlobal, index)
            }
        };

        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit_with_operand(set_op, arg);
        } else {
            self.emit_with_operand(get_op, arg);
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    /// The Pratt core: one prefix production, then infix productions while
    /// the next operator binds at least as tightly as `precedence`.
    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let Some(prefix) = Self::rule(self.previous.kind).prefix else {
            self.error("Expect expression.");
            return;
        };

        // Assignment may only be consumed at assignment precedence or
        // looser; otherwise `a * b = c` would parse as `a * (b = c)`.
        let can_assign = precedence <= Precedence::Assignment;
        prefix(self, can_assign);

        while precedence <= Self::rule(self.current.kind).precedence {
            self.advance();
            if let Some(infix) = Self::rule(self.previous.kind).infix {
                infix(self, can_assign);
            }
        }

        if can_assign && self.match_token(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    fn rule(kind: TokenKind) -> ParseRule<'src, 'ctx> {
        let (prefix, infix, precedence): (
            Option<ParseFn<'src, 'ctx>>,
            Option<ParseFn<'src, 'ctx>>,
            Precedence,
        ) = match kind {
            TokenKind::LeftParen => (Some(Self::grouping), None, Precedence::None),
            TokenKind::Minus => (Some(Self::unary), Some(Self::binary), Precedence::Term),
            TokenKind::Plus => (None, Some(Self::binary), Precedence::Term),
            TokenKind::Slash | TokenKind::Star => (None, Some(Self::binary), Precedence::Factor),
            TokenKind::Bang => (Some(Self::unary), None, Precedence::None),
            TokenKind::BangEqual | TokenKind::EqualEqual => {
                (None, Some(Self::binary), Precedence::Equality)
            }
            TokenKind::Greater
            | TokenKind::GreaterEqual
            | TokenKind::Less
            | TokenKind::LessEqual => (None, Some(Self::binary), Precedence::Comparison),
            TokenKind::Identifier => (Some(Self::variable), None, Precedence::None),
            TokenKind::String => (Some(Self::string), None, Precedence::None),
            TokenKind::Number => (Some(Self::number), None, Precedence::None),
            TokenKind::And => (None, Some(Self::and_operator), Precedence::And),
            TokenKind::Or => (None, Some(Self::or_operator), Precedence::Or),
            TokenKind::False | TokenKind::Nil | TokenKind::True => {
                (Some(Self::literal), None, Precedence::None)
            }
            _ => (None, None, Precedence::None),
        };
        ParseRule {
            prefix,
            infix,
            precedence,
        }
    }

    fn grouping(&mut self, _can_assign: bool) {
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after expression.");
    }

    fn number(&mut self, _can_assign: bool) {
        // The scanner only hands over digit runs, so this cannot fail.
        let value: f64 = self.previous.lexeme.parse().unwrap_or(0.0);
        self.emit_constant(Value::Number(value));
    }

    fn string(&mut self, _can_assign: bool) {
        let lexeme = self.previous.lexeme;
        // Trim the surrounding quotes.
        let text = &lexeme[1..lexeme.len() - 1];
        let interned = self.strings.intern(text);
        self.emit_constant(Value::Obj(Obj::Str(interned)));
    }

    fn literal(&mut self, _can_assign: bool) {
        match self.previous.kind {
            TokenKind::False => self.emit_op(OpCode::False),
            TokenKind::Nil => self.emit_op(OpCode::Nil),
            TokenKind::True => self.emit_op(OpCode::True),
            _ => unreachable!("literal() called for non-literal token"),
        }
    }

    fn variable(&mut self, can_assign: bool) {
        self.named_variable(self.previous, can_assign);
    }

    fn unary(&mut self, _can_assign: bool) {
        let operator = self.previous.kind;

        // Compile the operand first; the instruction acts on its result.
        self.parse_precedence(Precedence::Unary);

        match operator {
            TokenKind::Bang => self.emit_op(OpCode::Not),
            TokenKind::Minus => self.emit_op(OpCode::Negate),
            _ => unreachable!("unary() called for non-unary token"),
        }
    }

    fn binary(&mut self, _can_assign: bool) {
        let operator = self.previous.kind;
        let rule = Self::rule(operator);
        // One level tighter makes the operator left-associative.
        self.parse_precedence(rule.precedence.next());

        match operator {
            TokenKind::Plus => self.emit_op(OpCode::Add),
            TokenKind::Minus => self.emit_op(OpCode::Subtract),
            TokenKind::Star => self.emit_op(OpCode::Multiply),
            TokenKind::Slash => self.emit_op(OpCode::Divide),
            TokenKind::BangEqual => self.emit_ops(OpCode::Equal, OpCode::Not),
            TokenKind::EqualEqual => self.emit_op(OpCode::Equal),
            TokenKind::Greater => self.emit_op(OpCode::Greater),
            TokenKind::GreaterEqual => self.emit_ops(OpCode::Less, OpCode::Not),
            TokenKind::Less => self.emit_op(OpCode::Less),
            TokenKind::LessEqual => self.emit_ops(OpCode::Greater, OpCode::Not),
            _ => unreachable!("binary() called for non-binary token"),
        }
    }

    /// `and` short-circuits: when the left side is falsey it stays on the
    /// stack as the result and the right side is never evaluated.
    fn and_operator(&mut self, _can_assign: bool) {
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);

        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::And);

        self.patch_jump(end_jump);
    }

    /// `or` short-circuits through a falsey-jump over an unconditional one.
    fn or_operator(&mut self, _can_assign: bool) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);

        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);

        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }
}

#[cfg(test)]
mod tests {
    use crate::compile;
    use rill_core::chunk::Chunk;
    use rill_core::opcode::OpCode;
    use rill_core::strings::Strings;
    use rill_core::value::Value;

    fn compile_ok(source: &str) -> Chunk {
        let mut strings = Strings::new();
        let mut diag = Vec::new();
        match compile(source, &mut strings, &mut diag) {
            Ok(chunk) => chunk,
            Err(_) => panic!(
                "expected clean compile, got:\n{}",
                String::from_utf8_lossy(&diag)
            ),
        }
    }

    fn compile_err(source: &str) -> String {
        let mut strings = Strings::new();
        let mut diag = Vec::new();
        assert!(
            compile(source, &mut strings, &mut diag).is_err(),
            "expected a compile error for {source:?}"
        );
        String::from_utf8(diag).unwrap()
    }

    fn op(code: OpCode) -> u8 {
        code.into()
    }

    #[test]
    fn test_arithmetic_expression_bytecode() {
        let chunk = compile_ok("1 + 2;");
        assert_eq!(
            chunk.code(),
            &[
                op(OpCode::Constant),
                0,
                op(OpCode::Constant),
                1,
                op(OpCode::Add),
                op(OpCode::Pop),
                op(OpCode::Return),
            ]
        );
        assert_eq!(chunk.constant(0), &Value::Number(1.0));
        assert_eq!(chunk.constant(1), &Value::Number(2.0));
    }

    #[test]
    fn test_instruction_stream_is_well_formed() {
        let chunk = compile_ok("1 +\n2;\nprint 3;\nif (1 < 2) print 4;");
        // Walking by declared operand lengths lands exactly on the end.
        let mut offset = 0;
        while offset < chunk.len() {
            let opcode = OpCode::try_from(chunk.code()[offset]).unwrap();
            offset += 1 + opcode.operand_len();
        }
        assert_eq!(offset, chunk.len());
        // Every byte has a line attributed.
        for offset in 0..chunk.len() {
            assert!(chunk.line(offset) >= 1);
        }
    }

    #[test]
    fn test_precedence_binds_factor_over_term() {
        // 1 + 2 * 3 must multiply first.
        let chunk = compile_ok("1 + 2 * 3;");
        assert_eq!(
            chunk.code(),
            &[
                op(OpCode::Constant),
                0,
                op(OpCode::Constant),
                1,
                op(OpCode::Constant),
                2,
                op(OpCode::Multiply),
                op(OpCode::Add),
                op(OpCode::Pop),
                op(OpCode::Return),
            ]
        );
    }

    #[test]
    fn test_grouping_overrides_precedence() {
        let chunk = compile_ok("(1 + 2) * 3;");
        assert_eq!(
            chunk.code(),
            &[
                op(OpCode::Constant),
                0,
                op(OpCode::Constant),
                1,
                op(OpCode::Add),
                op(OpCode::Constant),
                2,
                op(OpCode::Multiply),
                op(OpCode::Pop),
                op(OpCode::Return),
            ]
        );
    }

    #[test]
    fn test_comparison_desugaring() {
        let chunk = compile_ok("1 <= 2;");
        assert_eq!(
            chunk.code(),
            &[
                op(OpCode::Constant),
                0,
                op(OpCode::Constant),
                1,
                op(OpCode::Greater),
                op(OpCode::Not),
                op(OpCode::Pop),
                op(OpCode::Return),
            ]
        );

        let chunk = compile_ok("1 != 2;");
        assert!(
            chunk
                .code()
                .windows(2)
                .any(|w| w == [op(OpCode::Equal), op(OpCode::Not)])
        );
    }

    #[test]
    fn test_global_definition_bytecode() {
        let chunk = compile_ok("var a = 1;");
        // The name is interned into the pool before the initializer's
        // constant.
        assert_eq!(
            chunk.code(),
            &[
                op(OpCode::Constant),
                1,
                op(OpCode::DefineGlobal),
                0,
                op(OpCode::Return),
            ]
        );
        assert!(chunk.constant(0).as_string().is_some());
        assert_eq!(chunk.constant(1), &Value::Number(1.0));
    }

    #[test]
    fn test_uninitialized_var_defaults_to_nil() {
        let chunk = compile_ok("var a;");
        assert_eq!(
            chunk.code(),
            &[op(OpCode::Nil), op(OpCode::DefineGlobal), 0, op(OpCode::Return)]
        );
    }

    #[test]
    fn test_local_variable_uses_slot_addressing() {
        let chunk = compile_ok("{ var a = 1; print a; }");
        assert_eq!(
            chunk.code(),
            &[
                op(OpCode::Constant),
                0,
                op(OpCode::GetLocal),
                0,
                op(OpCode::Print),
                op(OpCode::Pop),
                op(OpCode::Return),
            ]
        );
        // No identifier reaches the constant pool for locals.
        assert_eq!(chunk.constants().len(), 1);
    }

    #[test]
    fn test_nested_locals_resolve_to_distinct_slots() {
        let chunk = compile_ok("{ var a = 1; { var b = 2; print a + b; } }");
        let code = chunk.code();
        let get_local = op(OpCode::GetLocal);
        let slots: Vec<u8> = code
            .windows(2)
            .filter(|w| w[0] == get_local)
            .map(|w| w[1])
            .collect();
        assert_eq!(slots, vec![0, 1]);
    }

    #[test]
    fn test_name_leaves_scope_and_falls_back_to_global() {
        // After the block closes, `x` is no longer a local.
        let chunk = compile_ok("{ var x = 1; } x;");
        let code = chunk.code();
        assert!(code.contains(&op(OpCode::GetGlobal)));
        assert!(!code.contains(&op(OpCode::GetLocal)));
    }

    #[test]
    fn test_block_pops_its_locals() {
        let chunk = compile_ok("{ var a = 1; var b = 2; }");
        let pops = chunk
            .code()
            .iter()
            .filter(|&&b| b == op(OpCode::Pop))
            .count();
        assert_eq!(pops, 2);
    }

    #[test]
    fn test_if_without_else_still_pops_condition_on_both_paths() {
        let chunk = compile_ok("if (true) print 1;");
        let code = chunk.code();
        assert_eq!(code[0], op(OpCode::True));
        assert_eq!(code[1], op(OpCode::JumpIfFalse));
        // then-branch jump lands past the else-side Pop.
        assert_eq!(
            code[code.len() - 2..],
            [op(OpCode::Pop), op(OpCode::Return)]
        );
    }

    #[test]
    fn test_while_emits_backward_loop() {
        let chunk = compile_ok("while (false) print 1;");
        assert!(chunk.code().contains(&op(OpCode::Loop)));
    }

    #[test]
    fn test_and_short_circuit_shape() {
        let chunk = compile_ok("false and true;");
        assert_eq!(
            chunk.code(),
            &[
                op(OpCode::False),
                op(OpCode::JumpIfFalse),
                0,
                2,
                op(OpCode::Pop),
                op(OpCode::True),
                op(OpCode::Pop),
                op(OpCode::Return),
            ]
        );
    }

    #[test]
    fn test_or_short_circuit_shape() {
        let chunk = compile_ok("false or true;");
        assert_eq!(
            chunk.code(),
            &[
                op(OpCode::False),
                op(OpCode::JumpIfFalse),
                0,
                3,
                op(OpCode::Jump),
                0,
                2,
                op(OpCode::Pop),
                op(OpCode::True),
                op(OpCode::Pop),
                op(OpCode::Return),
            ]
        );
    }

    #[test]
    fn test_string_literal_is_interned_once() {
        let mut strings = Strings::new();
        let mut diag = Vec::new();
        let chunk = compile("\"dup\" == \"dup\";", &mut strings, &mut diag).unwrap();
        let a = chunk.constant(0).as_string().unwrap();
        let b = chunk.constant(1).as_string().unwrap();
        assert!(std::rc::Rc::ptr_eq(a, b));
    }

    #[test]
    fn test_missing_semicolon_reports_at_end() {
        let diag = compile_err("print 1");
        assert_eq!(diag, "[line 1] Error at end: Expect ';' after value.\n");
    }

    #[test]
    fn test_expect_expression_message() {
        let diag = compile_err("1 + ;");
        assert_eq!(diag, "[line 1] Error at ';': Expect expression.\n");
    }

    #[test]
    fn test_invalid_assignment_target() {
        let diag = compile_err("var a; var b; var c; a + b = c;");
        assert!(diag.contains("Invalid assignment target."));
    }

    #[test]
    fn test_panic_mode_recovers_at_statement_boundary() {
        let diag = compile_err("1 + ;\n2 + ;");
        assert_eq!(
            diag,
            "[line 1] Error at ';': Expect expression.\n\
             [line 2] Error at ';': Expect expression.\n"
        );
    }

    #[test]
    fn test_cascade_is_suppressed_within_one_statement() {
        // Both `+` operands are missing, but only the first failure in the
        // statement is reported.
        let diag = compile_err("+ + +;");
        assert_eq!(diag.lines().count(), 1);
    }

    #[test]
    fn test_scanner_errors_reach_diagnostics() {
        let diag = compile_err("print \"open;\n");
        assert!(diag.contains("Unterminated string."));

        let diag = compile_err("@;");
        assert!(diag.contains("Unexpected character."));
    }

    #[test]
    fn test_duplicate_local_in_same_scope() {
        let diag = compile_err("{ var a = 1; var a = 2; }");
        assert!(diag.contains("Already a variable with this name in this scope."));
    }

    #[test]
    fn test_shadowing_in_inner_scope_is_allowed() {
        compile_ok("{ var a = 1; { var a = 2; } }");
    }

    #[test]
    fn test_local_read_in_own_initializer() {
        let diag = compile_err("{ var a = a; }");
        assert!(diag.contains("Can't read local variable in its own initializer."));
    }

    #[test]
    fn test_global_initializer_may_reference_itself() {
        // Globals resolve late; this compiles (and fails at runtime).
        compile_ok("var a = a;");
    }

    #[test]
    fn test_too_many_constants() {
        let mut source = String::new();
        for i in 0..300 {
            source.push_str(&format!("{i};"));
        }
        let diag = compile_err(&source);
        assert!(diag.contains("Too many constants in one chunk."));
    }

    #[test]
    fn test_error_line_attribution() {
        let diag = compile_err("1;\n2;\n+;\n");
        assert!(diag.starts_with("[line 3] Error"));
    }

    #[test]
    fn test_too_many_locals() {
        // Uninitialized declarations keep the constant pool empty, so the
        // local limit is the only one hit.
        let mut source = String::from("{");
        for i in 0..257 {
            source.push_str(&format!("var l{i};"));
        }
        source.push('}');
        let diag = compile_err(&source);
        assert!(diag.contains("Too many local variables in function."));
    }

    #[test]
    fn test_jump_over_64k_of_code() {
        // A then-branch bigger than a u16 jump can span. `a;` compiles to
        // three bytes (GetLocal, slot, Pop) and adds no constants.
        let mut source = String::from("{ var a = 1; if (a) { ");
        for _ in 0..22_000 {
            source.push_str("a;");
        }
        source.push_str("} }");
        let diag = compile_err(&source);
        assert!(diag.contains("Too much code to jump over."));
    }

    #[test]
    fn test_loop_body_over_64k_of_code() {
        let mut source = String::from("{ var a = 0; while (a) { ");
        for _ in 0..22_000 {
            source.push_str("a;");
        }
        source.push_str("} }");
        let diag = compile_err(&source);
        assert!(diag.contains("Loop body too large."));
    }
}
