//! Single-pass bytecode emission from the AST.
//!
//! Compilation runs in two passes over the declaration list: the first
//! registers every function name so call sites may reference functions
//! declared later in the source, the second emits one chunk per function in
//! source order.  Forward jumps are emitted with a zero offset and patched
//! once the target address is known; offsets are measured from the
//! instruction *after* the jump.

use std::collections::HashMap;

use tracing::debug;

use crate::bytecode::{Chunk, Constant, FunctionRef, Instruction, Program};
use crate::error::{CompileError, CompileErrorKind};
use crate::lexer::Lexer;
use crate::parser::{BinaryOp, Expr, FunctionDecl, Parser, Stmt};

/// Compile script source into an executable [`Program`].
pub fn compile(source: &str) -> Result<Program, CompileError> {
    let tokens = Lexer::new(source).tokenize()?;
    let declarations = Parser::new(tokens).parse_file()?;
    compile_declarations(&declarations)
}

/// Compile an already-parsed declaration list.
pub fn compile_declarations(declarations: &[FunctionDecl]) -> Result<Program, CompileError> {
    let mut function_indices: HashMap<String, u32> = HashMap::new();
    let mut program = Program::new();

    for decl in declarations {
        if function_indices.contains_key(&decl.name) {
            return Err(CompileError::new(
                CompileErrorKind::UnsupportedConstruct,
                format!("duplicate function '{}'", decl.name),
                Some(decl.line),
            ));
        }
        let index = program.functions.len() as u32;
        function_indices.insert(decl.name.clone(), index);
        program.functions.push(FunctionRef {
            name: decl.name.clone(),
            arity: decl.params.len() as u16,
            chunk_index: index,
            locals: decl.params.len() as u16,
        });
    }

    for (index, decl) in declarations.iter().enumerate() {
        let (chunk, locals) = ChunkBuilder::new(decl, &function_indices).emit_body()?;
        program.functions[index].locals = locals;
        program.chunks.push(chunk);
    }

    debug!(functions = program.functions.len(), "compiled program");
    Ok(program)
}

/// Per-function emitter holding the chunk under construction and the local
/// slot table.
struct ChunkBuilder<'a> {
    decl: &'a FunctionDecl,
    functions: &'a HashMap<String, u32>,
    chunk: Chunk,
    slots: HashMap<String, u16>,
    next_slot: u16,
    line: u32,
}

impl<'a> ChunkBuilder<'a> {
    fn new(decl: &'a FunctionDecl, functions: &'a HashMap<String, u32>) -> Self {
        let mut slots = HashMap::new();
        let mut next_slot = 0u16;
        for param in &decl.params {
            slots.insert(param.clone(), next_slot);
            next_slot += 1;
        }
        Self {
            decl,
            functions,
            chunk: Chunk::new(),
            slots,
            next_slot,
            line: decl.line,
        }
    }

    fn emit_body(mut self) -> Result<(Chunk, u16), CompileError> {
        for stmt in &self.decl.body {
            self.emit_stmt(stmt)?;
        }
        // Well-defined fall-through: every chunk ends by returning null.
        let null_ix = self.chunk.add_constant(Constant::Null);
        self.emit(Instruction::PushConst(null_ix));
        self.emit(Instruction::Return);
        Ok((self.chunk, self.next_slot))
    }

    fn emit(&mut self, instruction: Instruction) -> usize {
        self.chunk.push(instruction, self.line)
    }

    /// Return the slot bound to `name`, allocating the next free slot on
    /// first use.  A name that is read before any store will read `Null` at
    /// runtime.
    fn slot_for(&mut self, name: &str) -> u16 {
        if let Some(&slot) = self.slots.get(name) {
            return slot;
        }
        let slot = self.next_slot;
        self.next_slot += 1;
        self.slots.insert(name.to_string(), slot);
        slot
    }

    /// Rewrite the placeholder offset at `at` to land on the current end of
    /// the chunk.  Offsets count from the instruction after the jump.
    fn patch_to_here(&mut self, at: usize) {
        let offset = (self.chunk.code.len() as i64 - at as i64 - 1) as i32;
        match &mut self.chunk.code[at] {
            Instruction::Jump(slot) | Instruction::JumpIfFalse(slot) => *slot = offset,
            other => unreachable!("patch target {other:?} is not a jump"),
        }
    }

    fn emit_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Let { name, expr, line } => {
                self.line = *line;
                self.emit_expr(expr)?;
                let slot = self.slot_for(name);
                self.emit(Instruction::StoreLocal(slot));
            }
            Stmt::Expr { expr, line } => {
                self.line = *line;
                self.emit_expr(expr)?;
                self.emit(Instruction::Pop);
            }
            Stmt::Return { expr, line } => {
                self.line = *line;
                match expr {
                    Some(expr) => self.emit_expr(expr)?,
                    None => {
                        let null_ix = self.chunk.add_constant(Constant::Null);
                        self.emit(Instruction::PushConst(null_ix));
                    }
                }
                self.emit(Instruction::Return);
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
                line,
            } => {
                self.line = *line;
                self.emit_expr(cond)?;
                let jump_to_else = self.emit(Instruction::JumpIfFalse(0));
                for stmt in then_body {
                    self.emit_stmt(stmt)?;
                }
                self.line = *line;
                let jump_to_end = self.emit(Instruction::Jump(0));
                self.patch_to_here(jump_to_else);
                if let Some(else_body) = else_body {
                    for stmt in else_body {
                        self.emit_stmt(stmt)?;
                    }
                }
                self.patch_to_here(jump_to_end);
            }
        }
        Ok(())
    }

    fn emit_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Str(value) => {
                let ix = self.chunk.add_constant(Constant::String(value.clone()));
                self.emit(Instruction::PushConst(ix));
            }
            Expr::Int(value) => {
                let ix = self.chunk.add_constant(Constant::Int(*value));
                self.emit(Instruction::PushConst(ix));
            }
            Expr::Float(value) => {
                let ix = self.chunk.add_constant(Constant::Double(*value));
                self.emit(Instruction::PushConst(ix));
            }
            Expr::Bool(value) => {
                let ix = self.chunk.add_constant(Constant::Bool(*value));
                self.emit(Instruction::PushConst(ix));
            }
            Expr::Ident(name) => {
                let slot = self.slot_for(name);
                self.emit(Instruction::LoadLocal(slot));
            }
            Expr::Call { name, args } => {
                for arg in args {
                    self.emit_expr(arg)?;
                }
                let argc = args.len() as u16;
                match self.functions.get(name) {
                    Some(&func_ix) => {
                        self.emit(Instruction::CallFunc(func_ix, argc));
                    }
                    None => {
                        let name_ix = self.chunk.add_constant(Constant::Name(name.clone()));
                        self.emit(Instruction::CallNative(name_ix, argc));
                    }
                }
            }
            Expr::Binary { lhs, op, rhs } => {
                self.emit_expr(lhs)?;
                self.emit_expr(rhs)?;
                match op {
                    BinaryOp::Add => self.emit(Instruction::Add),
                    BinaryOp::Eq => self.emit(Instruction::Eq),
                };
            }
        }
        Ok(())
    }
}
