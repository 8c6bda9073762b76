//! AST → `Chunk` bytecode compiler (§4.4), grounded on `dai_compile.c` and
//! the `dai_compile/*.h` family: one module-level `Chunk` for the top-level
//! program, and one fresh `Chunk` per `fn`/method compiled through the same
//! statement/expression walk. Control flow (if/while/for-in, break/continue,
//! and/or short-circuiting) patches forward jumps exactly the way the
//! symbol table resolves names — recursively, one nested scope at a time.
//!
//! Classes don't get their own `Chunk`: `Op::Class` allocates the
//! `ClassObj` at *run* time (so a method can close over the enclosing
//! scope the same way any other function literal does), and the compiler
//! only emits the `Class`/`Inherit`/`DefineField`/`DefineMethod` sequence
//! around each member's already-compiled value.

use dai_core::bytecode::op::BinaryOp;
use dai_core::bytecode::{Chunk, ConstValue, Op};
use dai_core::heap::Heap;
use dai_core::object::{FunctionObj, Obj};

use crate::ast::{
    AssignOp, ClassDecl, ClassField, Expr, ExprKind, FunctionLiteral, InfixOp, PrefixOp, Program, Stmt, StmtKind,
};
use crate::error::CompileError;
use crate::lexer::Span;
use crate::symbol::{SymbolKind, SymbolTable};

type CResult<T> = Result<T, CompileError>;

/// One loop's break/continue bookkeeping. `continue` jumps back to
/// `continue_target` (the loop condition for `while`, the `IterNext`
/// instruction for `for`-`in`); `break` is patched to just past the loop
/// once the whole body has compiled.
struct LoopCtx {
    continue_target: usize,
    break_patches: Vec<usize>,
    /// Local-slot count `continue` must unwind back down to before jumping
    /// to `continue_target`. For `while` this is the same as `break_base`
    /// (the loop has no state of its own). For `for`-`in` it sits *after*
    /// the reserved iterator/index/element slots, since `IterNext` reads
    /// those by fixed slot index and `continue` must leave them in place.
    continue_base: u32,
    /// Local-slot count `break` must unwind back down to — always the
    /// scope height from just before the loop started, since `break` skips
    /// the loop's own trailing `PopN` entirely.
    break_base: u32,
}

/// One `Chunk` under construction, plus the running stack-depth high-water
/// mark `FunctionObj::max_stack_size` needs and the loop-nesting stack
/// `break`/`continue` walk.
struct FnCx {
    chunk: Chunk,
    loops: Vec<LoopCtx>,
    stack_depth: i32,
    max_stack: u16,
    max_locals: u16,
}

impl FnCx {
    fn new() -> Self {
        FnCx { chunk: Chunk::new(), loops: Vec::new(), stack_depth: 0, max_stack: 0, max_locals: 0 }
    }

    fn emit(&mut self, op: Op, line: u32) -> usize {
        if let Some(delta) = op.stack_delta() {
            self.stack_depth += delta;
            if self.stack_depth > self.max_stack as i32 {
                self.max_stack = self.stack_depth as u16;
            }
        }
        self.chunk.push_op(op, line)
    }

    /// `Call`/`CallMethod`-family ops aren't in `stack_delta`'s uniform
    /// table (their effect depends on argc), so call sites pass the net
    /// effect they know directly.
    fn emit_with_delta(&mut self, op: Op, line: u32, delta: i32) -> usize {
        self.stack_depth += delta;
        if self.stack_depth > self.max_stack as i32 {
            self.max_stack = self.stack_depth as u16;
        }
        self.chunk.push_op(op, line)
    }

    fn note_local_count(&mut self, count: u32) {
        if count as u16 > self.max_locals {
            self.max_locals = count as u16;
        }
    }
}

/// Walks a `Program` or a function/method body, emitting into its own
/// `FnCx` and threading a `SymbolTable` scope alongside it. Needs `Heap`
/// access because nested function/method literals compile to a
/// heap-allocated `FunctionObj` constant (§4.4).
pub struct Compiler<'a> {
    heap: &'a mut Heap,
    file: String,
    symtab: SymbolTable,
    fx: FnCx,
    /// `true` while compiling a method body, so `self`/`super` are valid.
    in_method: bool,
}

impl<'a> Compiler<'a> {
    pub fn new(heap: &'a mut Heap, file: impl Into<String>) -> Self {
        Compiler { heap, file: file.into(), symtab: SymbolTable::new_root(), fx: FnCx::new(), in_method: false }
    }

    /// Same as [`Compiler::new`], but predefines `builtin_names` as
    /// `SymbolKind::Builtin` at the given index (so `Op::GetBuiltin(i)`
    /// lines up with the VM's own builtins table — `dai-stdlib` and
    /// `dai-vm` must agree on this order, which is the caller's job).
    pub fn with_builtins(heap: &'a mut Heap, file: impl Into<String>, builtin_names: &[&str]) -> Self {
        let mut symtab = SymbolTable::new_root();
        for (idx, name) in builtin_names.iter().enumerate() {
            symtab.define_builtin(idx as u32, name);
        }
        Compiler { heap, file: file.into(), symtab, fx: FnCx::new(), in_method: false }
    }

    /// Compiles a whole program into the module-level `Chunk`.
    pub fn compile_module(self, program: &Program) -> CResult<Chunk> {
        self.compile_module_with_globals(program).map(|(chunk, _)| chunk)
    }

    /// Same as [`Compiler::compile_module`], but also returns the
    /// name→slot table for every top-level binding — the VM needs this to
    /// populate a `ModuleObj`'s by-name lookup, since `Op::DefineGlobal`
    /// addresses a global purely by its dense slot index.
    pub fn compile_module_with_globals(mut self, program: &Program) -> CResult<(Chunk, Vec<(String, u32)>)> {
        self.predefine_top_level(&program.statements)?;
        for stmt in &program.statements {
            self.compile_stmt(stmt)?;
        }
        self.fx.emit(Op::Return, 0);
        let globals = self.symtab.global_bindings();
        Ok((self.fx.chunk, globals))
    }

    /// Top-level `var`/`fn`/`class` names are visible to every other
    /// top-level statement regardless of textual order (mutual recursion
    /// between top-level functions), so they're predefined before any
    /// statement is compiled — the same two-phase walk `dai_compile.c`
    /// does over a module's global scope.
    fn predefine_top_level(&mut self, statements: &[Stmt]) -> CResult<()> {
        for stmt in statements {
            let name = match &stmt.kind {
                StmtKind::Var { name, .. } => Some(name.as_str()),
                StmtKind::FunctionDecl(f) => f.name.as_deref(),
                StmtKind::ClassDecl(c) => Some(c.name.as_str()),
                _ => None,
            };
            if let Some(name) = name {
                self.symtab.predefine(name);
            }
        }
        Ok(())
    }

    fn err(&self, span: Span, msg: impl Into<String>) -> CompileError {
        CompileError::new(self.file.clone(), span.start.line, span.start.col, msg)
    }

    fn line(&self, span: Span) -> u32 {
        span.start.line
    }

    // ---- statements ----------------------------------------------------

    fn compile_stmt(&mut self, stmt: &Stmt) -> CResult<()> {
        let line = self.line(stmt.span);
        match &stmt.kind {
            StmtKind::Var { name, is_const, value } => self.compile_var(name, *is_const, value, line),
            StmtKind::Assign { target, op, value } => self.compile_assign(target, *op, value, line),
            StmtKind::Return(value) => self.compile_return(value.as_ref(), line),
            StmtKind::Expr(expr) => {
                self.compile_expr(expr)?;
                self.fx.emit(Op::Pop, line);
                Ok(())
            }
            StmtKind::Block(stmts) => self.compile_block_scope(stmts, line),
            StmtKind::If { branches, else_branch } => self.compile_if(branches, else_branch.as_deref(), line),
            StmtKind::While { cond, body } => self.compile_while(cond, body, line),
            StmtKind::ForIn { index_name, elem_name, iterable, body } => {
                self.compile_for_in(index_name, elem_name, iterable, body, line)
            }
            StmtKind::Break => {
                let base = self
                    .fx
                    .loops
                    .last()
                    .ok_or_else(|| self.err(stmt.span, "'break' outside of a loop"))?
                    .break_base;
                self.pop_down_to(base, line);
                let at = self.fx.emit(Op::Jump(0), line);
                self.fx.loops.last_mut().unwrap().break_patches.push(at);
                Ok(())
            }
            StmtKind::Continue => {
                let loop_ctx = self
                    .fx
                    .loops
                    .last()
                    .ok_or_else(|| self.err(stmt.span, "'continue' outside of a loop"))?;
                let (base, target) = (loop_ctx.continue_base, loop_ctx.continue_target);
                self.pop_down_to(base, line);
                self.emit_jump_back(target, line);
                Ok(())
            }
            StmtKind::FunctionDecl(f) => self.compile_function_decl(f, line),
            StmtKind::ClassDecl(c) => self.compile_class_decl(c, line),
        }
    }

    fn compile_var(&mut self, name: &str, is_const: bool, value: &Expr, line: u32) -> CResult<()> {
        self.compile_expr(value)?;
        let is_global = self.symtab.is_global();
        let sym = self.symtab.define_with_const(name, is_const);
        if is_global {
            self.fx.emit(Op::DefineGlobal(sym.index as u16), line);
        } else {
            self.fx.note_local_count(self.symtab.total_slots());
        }
        Ok(())
    }

    /// A block scope's own locals live directly on the operand stack (same
    /// slots their declaring `var` pushed), so leaving the block has to pop
    /// them back off before control returns to the enclosing scope — a
    /// `while` loop that didn't would grow the stack by one slot per
    /// iteration for every local its body declares.
    fn compile_block_scope(&mut self, stmts: &[Stmt], line: u32) -> CResult<()> {
        let outer = std::mem::replace(&mut self.symtab, SymbolTable::new_root());
        self.symtab = SymbolTable::new_enclosed(outer);
        for s in stmts {
            self.compile_stmt(s)?;
        }
        self.fx.note_local_count(self.symtab.total_slots());
        let own_locals = self.symtab.count();
        let outer = self.symtab.pop();
        self.symtab = outer;
        if own_locals > 0 {
            self.fx.emit(Op::PopN(own_locals.min(u8::MAX as u32) as u8), line);
        }
        Ok(())
    }

    fn compile_return(&mut self, value: Option<&Expr>, line: u32) -> CResult<()> {
        match value {
            Some(e) => {
                self.compile_expr(e)?;
                self.fx.emit(Op::ReturnValue, line);
            }
            None => {
                self.fx.emit(Op::Return, line);
            }
        }
        Ok(())
    }

    fn compile_if(&mut self, branches: &[(Expr, Vec<Stmt>)], else_branch: Option<&[Stmt]>, line: u32) -> CResult<()> {
        let mut end_jumps = Vec::new();
        for (i, (cond, body)) in branches.iter().enumerate() {
            self.compile_expr(cond)?;
            let skip = self.fx.emit(Op::JumpIfFalse(0), line);
            self.compile_block_scope(body, line)?;
            let is_last = i + 1 == branches.len();
            if !is_last || else_branch.is_some() {
                end_jumps.push(self.fx.emit(Op::Jump(0), line));
            }
            self.fx.chunk.patch_jump_to_here(skip);
        }
        if let Some(else_body) = else_branch {
            self.compile_block_scope(else_body, line)?;
        }
        for j in end_jumps {
            self.fx.chunk.patch_jump_to_here(j);
        }
        Ok(())
    }

    fn compile_while(&mut self, cond: &Expr, body: &[Stmt], line: u32) -> CResult<()> {
        let loop_start = self.fx.chunk.here();
        self.compile_expr(cond)?;
        let exit = self.fx.emit(Op::JumpIfFalse(0), line);
        let locals_base = self.symtab.total_slots();
        self.fx.loops.push(LoopCtx {
            continue_target: loop_start,
            break_patches: Vec::new(),
            continue_base: locals_base,
            break_base: locals_base,
        });
        self.compile_block_scope(body, line)?;
        self.emit_jump_back(loop_start, line);
        let loop_ctx = self.fx.loops.pop().unwrap();
        self.fx.chunk.patch_jump_to_here(exit);
        for b in loop_ctx.break_patches {
            self.fx.chunk.patch_jump_to_here(b);
        }
        Ok(())
    }

    /// `for (i, e in iterable) { body }`: the iterable is evaluated once
    /// into a reserved local slot, `IterInit` turns it into an iterator in
    /// place, and `IterNext` both advances it and exits the loop once
    /// exhausted — binding `i`/`e` as ordinary locals of the loop body's
    /// block scope on every iteration.
    fn compile_for_in(
        &mut self,
        index_name: &str,
        elem_name: &str,
        iterable: &Expr,
        body: &[Stmt],
        line: u32,
    ) -> CResult<()> {
        let outer = std::mem::replace(&mut self.symtab, SymbolTable::new_root());
        let locals_base = outer.total_slots();
        self.symtab = SymbolTable::new_enclosed(outer);

        self.compile_expr(iterable)?;
        let iter_slot = self.symtab.define("__iter__");
        self.fx.note_local_count(self.symtab.total_slots());
        self.fx.emit(Op::IterInit(iter_slot.index as u8), line);

        // Reserve the two local slots `IterNext` writes (index, element)
        // directly into on every iteration — slots `iter_slot+1`/`+2`, a
        // fixed layout `IterInit`/`IterNext` both rely on.
        let _index_sym = self.symtab.define(index_name);
        let _elem_sym = self.symtab.define(elem_name);
        self.fx.note_local_count(self.symtab.total_slots());
        self.fx.emit(Op::Nil, line);
        self.fx.emit(Op::Nil, line);
        let iter_next_at = self.fx.chunk.here();
        let exit = self.fx.emit(Op::IterNext(iter_slot.index as u8, 0), line);

        // `continue` must leave the iterator/index/element slots in place —
        // `IterNext` reads them by fixed slot index — so its base sits past
        // them; `break` skips this loop's own trailing `PopN` entirely, so
        // it unwinds all the way back to before the loop started.
        let continue_base = self.symtab.total_slots();
        self.fx.loops.push(LoopCtx {
            continue_target: iter_next_at,
            break_patches: Vec::new(),
            continue_base,
            break_base: locals_base,
        });
        for s in body {
            self.compile_stmt(s)?;
        }
        let loop_ctx = self.fx.loops.pop().unwrap();
        self.emit_jump_back(iter_next_at, line);
        self.fx.chunk.patch_jump_to_here(exit);
        for b in loop_ctx.break_patches {
            self.fx.chunk.patch_jump_to_here(b);
        }
        // Pop every local this scope introduced: the iterator plus index
        // and element slots, plus anything `body` declared at its own
        // top level (it shares this scope rather than nesting a new one).
        let own_locals = self.symtab.count();
        if own_locals > 0 {
            self.fx.emit(Op::PopN(own_locals.min(u8::MAX as u32) as u8), line);
        }

        let outer = self.symtab.pop();
        self.symtab = outer;
        Ok(())
    }

    fn emit_jump_back(&mut self, target: usize, line: u32) {
        let at = self.fx.chunk.here();
        let offset = (at - target + 1) as u16;
        self.fx.emit(Op::JumpBack(offset), line);
    }

    /// Pops locals back down to `base` slots — `break`/`continue` reaching
    /// here from nested blocks skip those blocks' own trailing `PopN`, so
    /// the cleanup has to happen at the jump site instead.
    fn pop_down_to(&mut self, base: u32, line: u32) {
        let current = self.symtab.total_slots();
        let drop = current.saturating_sub(base);
        if drop > 0 {
            self.fx.emit(Op::PopN(drop.min(u8::MAX as u32) as u8), line);
        }
    }

    // ---- assignment ------------------------------------------------------

    fn compile_assign(&mut self, target: &Expr, op: AssignOp, value: &Expr, line: u32) -> CResult<()> {
        match &*target.kind {
            ExprKind::Ident(name) => {
                let sym = self
                    .symtab
                    .resolve(name)
                    .ok_or_else(|| self.err(target.span, format!("undefined name '{name}'")))?;
                if sym.is_const {
                    return Err(self.err(target.span, format!("cannot assign to const binding '{name}'")));
                }
                self.compile_compound_value(target, op, value, line)?;
                match sym.kind {
                    SymbolKind::Global => {
                        self.fx.emit(Op::SetGlobal(sym.index as u16), line);
                        self.fx.emit(Op::Pop, line);
                    }
                    SymbolKind::Local | SymbolKind::SelfRef => {
                        self.fx.emit(Op::SetLocal(sym.index as u8), line);
                        self.fx.emit(Op::Pop, line);
                    }
                    SymbolKind::Free => {
                        return Err(self.err(target.span, "cannot assign to a captured variable"));
                    }
                    SymbolKind::Builtin => {
                        return Err(self.err(target.span, "cannot assign to a builtin"));
                    }
                }
                Ok(())
            }
            ExprKind::Dot { object, name } => {
                if matches!(&*object.kind, ExprKind::SelfExpr) {
                    self.compile_compound_value(target, op, value, line)?;
                    let idx = self.fx.chunk.add_const(ConstValue::Str(name.clone()));
                    self.fx.emit(Op::SetSelfProperty(idx), line);
                } else {
                    self.compile_expr(object)?;
                    self.compile_compound_value(target, op, value, line)?;
                    let idx = self.fx.chunk.add_const(ConstValue::Str(name.clone()));
                    self.fx.emit(Op::SetProperty(idx), line);
                    self.fx.emit(Op::Pop, line);
                }
                Ok(())
            }
            ExprKind::Subscript { object, index } => {
                self.compile_expr(object)?;
                self.compile_expr(index)?;
                self.compile_compound_value(target, op, value, line)?;
                self.fx.emit(Op::SubscriptSet, line);
                self.fx.emit(Op::Pop, line);
                Ok(())
            }
            _ => Err(self.err(target.span, "invalid assignment target")),
        }
    }

    /// Pushes the new value for `target op= value`: for plain `=` that's
    /// just `value`; for a compound operator it's `target op value`
    /// (re-reading `target` through the same access path).
    fn compile_compound_value(&mut self, target: &Expr, op: AssignOp, value: &Expr, line: u32) -> CResult<()> {
        if op == AssignOp::Assign {
            return self.compile_expr(value);
        }
        self.compile_expr(target)?;
        self.compile_expr(value)?;
        let bin = match op {
            AssignOp::Add => Op::Add,
            AssignOp::Sub => Op::Sub,
            AssignOp::Mul => Op::Mul,
            AssignOp::Div => Op::Div,
            AssignOp::Assign => unreachable!(),
        };
        self.fx.emit(bin, line);
        Ok(())
    }

    // ---- expressions -----------------------------------------------------

    fn compile_expr(&mut self, expr: &Expr) -> CResult<()> {
        let line = self.line(expr.span);
        match &*expr.kind {
            ExprKind::Int(n) => {
                let idx = self.fx.chunk.add_const(ConstValue::I64(*n));
                self.fx.emit(Op::Constant(idx), line);
            }
            ExprKind::Float(f) => {
                let idx = self.fx.chunk.add_const(ConstValue::F64(*f));
                self.fx.emit(Op::Constant(idx), line);
            }
            ExprKind::Str(s) => {
                let idx = self.fx.chunk.add_const(ConstValue::Str(s.clone()));
                self.fx.emit(Op::Constant(idx), line);
            }
            ExprKind::Bool(b) => {
                self.fx.emit(if *b { Op::True } else { Op::False }, line);
            }
            ExprKind::Nil => {
                self.fx.emit(Op::Nil, line);
            }
            ExprKind::Ident(name) => self.compile_ident(name, expr.span)?,
            ExprKind::SelfExpr => {
                if !self.in_method {
                    return Err(self.err(expr.span, "'self' used outside of a method"));
                }
                self.fx.emit(Op::GetLocal(0), line);
            }
            ExprKind::SuperProperty(name) => {
                if !self.in_method {
                    return Err(self.err(expr.span, "'super' used outside of a method"));
                }
                let idx = self.fx.chunk.add_const(ConstValue::Str(name.clone()));
                self.fx.emit(Op::GetSuperProperty(idx), line);
            }
            ExprKind::Prefix { op, expr: inner } => {
                self.compile_expr(inner)?;
                self.fx.emit(
                    match op {
                        PrefixOp::Neg => Op::Minus,
                        PrefixOp::Not => Op::Bang,
                        PrefixOp::BitNot => Op::BitwiseNot,
                    },
                    line,
                );
            }
            ExprKind::Infix { op, left, right } => self.compile_infix(*op, left, right, line)?,
            ExprKind::And { left, right } => {
                self.compile_expr(left)?;
                let jump = self.fx.emit(Op::AndJump(0), line);
                self.fx.emit(Op::Pop, line);
                self.compile_expr(right)?;
                self.fx.chunk.patch_jump_to_here(jump);
            }
            ExprKind::Or { left, right } => {
                self.compile_expr(left)?;
                let jump = self.fx.emit(Op::OrJump(0), line);
                self.fx.emit(Op::Pop, line);
                self.compile_expr(right)?;
                self.fx.chunk.patch_jump_to_here(jump);
            }
            ExprKind::Call { callee, args } => self.compile_call(callee, args, line)?,
            ExprKind::Dot { object, name } => {
                if matches!(&*object.kind, ExprKind::SelfExpr) {
                    if !self.in_method {
                        return Err(self.err(expr.span, "'self' used outside of a method"));
                    }
                    let idx = self.fx.chunk.add_const(ConstValue::Str(name.clone()));
                    self.fx.emit(Op::GetSelfProperty(idx), line);
                } else {
                    self.compile_expr(object)?;
                    let idx = self.fx.chunk.add_const(ConstValue::Str(name.clone()));
                    self.fx.emit(Op::GetProperty(idx), line);
                }
            }
            ExprKind::Subscript { object, index } => {
                self.compile_expr(object)?;
                self.compile_expr(index)?;
                self.fx.emit(Op::Subscript, line);
            }
            ExprKind::Array(items) => {
                for it in items {
                    self.compile_expr(it)?;
                }
                self.fx.emit(Op::Array(items.len() as u16), line);
            }
            ExprKind::Map(pairs) => {
                for (k, v) in pairs {
                    self.compile_expr(k)?;
                    self.compile_expr(v)?;
                }
                self.fx.emit(Op::Map(pairs.len() as u16), line);
            }
            ExprKind::Function(f) => self.compile_function_literal(f, line)?,
        }
        Ok(())
    }

    fn compile_ident(&mut self, name: &str, span: Span) -> CResult<()> {
        let line = self.line(span);
        let sym = self.symtab.resolve(name).ok_or_else(|| self.err(span, format!("undefined name '{name}'")))?;
        match sym.kind {
            SymbolKind::Global => self.fx.emit(Op::GetGlobal(sym.index as u16), line),
            SymbolKind::Local | SymbolKind::SelfRef => self.fx.emit(Op::GetLocal(sym.index as u8), line),
            SymbolKind::Free => self.fx.emit(Op::GetFree(sym.index as u8), line),
            SymbolKind::Builtin => self.fx.emit(Op::GetBuiltin(sym.index as u8), line),
        };
        Ok(())
    }

    /// `<`/`<=` have no dedicated opcode; the source reuses `>`/`>=` with
    /// the operands swapped (§4.4).
    fn compile_infix(&mut self, op: InfixOp, left: &Expr, right: &Expr, line: u32) -> CResult<()> {
        match op {
            InfixOp::Lt => {
                self.compile_expr(right)?;
                self.compile_expr(left)?;
                self.fx.emit(Op::GreaterThan, line);
            }
            InfixOp::Le => {
                self.compile_expr(right)?;
                self.compile_expr(left)?;
                self.fx.emit(Op::GreaterEqualThan, line);
            }
            _ => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.fx.emit(
                    match op {
                        InfixOp::Add => Op::Add,
                        InfixOp::Sub => Op::Sub,
                        InfixOp::Mul => Op::Mul,
                        InfixOp::Div => Op::Div,
                        InfixOp::Mod => Op::Mod,
                        InfixOp::Shl => Op::Binary(BinaryOp::Shl),
                        InfixOp::Shr => Op::Binary(BinaryOp::Shr),
                        InfixOp::BitAnd => Op::Binary(BinaryOp::BitAnd),
                        InfixOp::BitOr => Op::Binary(BinaryOp::BitOr),
                        InfixOp::BitXor => Op::Binary(BinaryOp::BitXor),
                        InfixOp::Eq => Op::Equal,
                        InfixOp::Ne => Op::NotEqual,
                        InfixOp::Gt => Op::GreaterThan,
                        InfixOp::Ge => Op::GreaterEqualThan,
                        InfixOp::Lt | InfixOp::Le => unreachable!(),
                    },
                    line,
                );
            }
        }
        Ok(())
    }

    fn compile_call(&mut self, callee: &Expr, args: &[Expr], line: u32) -> CResult<()> {
        // `obj.method(args)`/`self.method(args)`/`super.method(args)` use the
        // dedicated `CallMethod`-family opcodes instead of a plain property
        // load followed by `Call`, avoiding an intermediate `BoundMethod`
        // allocation on the hot path.
        match &*callee.kind {
            ExprKind::Dot { object, name } if matches!(&*object.kind, ExprKind::SelfExpr) => {
                if !self.in_method {
                    return Err(self.err(callee.span, "'self' used outside of a method"));
                }
                for a in args {
                    self.compile_expr(a)?;
                }
                let idx = self.fx.chunk.add_const(ConstValue::Str(name.clone()));
                self.fx.emit_with_delta(Op::CallSelfMethod(idx, args.len() as u8), line, 1 - args.len() as i32);
                return Ok(());
            }
            ExprKind::Dot { object, name } => {
                self.compile_expr(object)?;
                for a in args {
                    self.compile_expr(a)?;
                }
                let idx = self.fx.chunk.add_const(ConstValue::Str(name.clone()));
                self.fx.emit_with_delta(Op::CallMethod(idx, args.len() as u8), line, -(args.len() as i32));
                return Ok(());
            }
            ExprKind::SuperProperty(name) => {
                if !self.in_method {
                    return Err(self.err(callee.span, "'super' used outside of a method"));
                }
                for a in args {
                    self.compile_expr(a)?;
                }
                let idx = self.fx.chunk.add_const(ConstValue::Str(name.clone()));
                self.fx.emit_with_delta(Op::CallSuperMethod(idx, args.len() as u8), line, 1 - args.len() as i32);
                return Ok(());
            }
            _ => {}
        }
        self.compile_expr(callee)?;
        for a in args {
            self.compile_expr(a)?;
        }
        self.fx.emit_with_delta(Op::Call(args.len() as u8), line, -(args.len() as i32));
        Ok(())
    }

    fn compile_function_decl(&mut self, f: &FunctionLiteral, line: u32) -> CResult<()> {
        let name = f.name.as_deref().expect("function declarations are always named");
        self.compile_function_value(f, false)?;
        let is_global = self.symtab.is_global();
        let sym = self.symtab.define(name);
        if is_global {
            self.fx.emit(Op::DefineGlobal(sym.index as u16), line);
        } else {
            self.fx.note_local_count(self.symtab.total_slots());
        }
        Ok(())
    }

    /// Compiles a `fn` literal (named or anonymous) and pushes either a
    /// bare `Constant` (no captures) or a `Closure` (captures present).
    fn compile_function_literal(&mut self, f: &FunctionLiteral, _line: u32) -> CResult<()> {
        self.compile_function_value(f, false)
    }

    /// `is_method` allows `self`/`super` inside the body. The `FunctionObj`
    /// itself is built with `superclass: None` — the real parent `ObjRef`
    /// isn't known until `Op::Inherit` runs at VM time, so attaching it is
    /// the `DefineMethod`/`DefineClassMethod` handler's job, not the
    /// compiler's.
    fn compile_function_value(&mut self, f: &FunctionLiteral, is_method: bool) -> CResult<()> {
        let line = self.line(f.span);
        let outer_in_method = self.in_method;
        self.in_method = is_method;

        let outer_symtab = std::mem::replace(&mut self.symtab, SymbolTable::new_root());
        self.symtab = SymbolTable::new_function(outer_symtab);
        self.symtab.define_self();

        let outer_fx = std::mem::replace(&mut self.fx, FnCx::new());

        // Default-value expressions are evaluated in the *outer* frame, one
        // per defaulted parameter, each packaged via `SetFunctionDefault`
        // right after the function value itself is pushed — so they must be
        // compiled before we swap frames back. Stash them now and emit once
        // we're back in the outer context.
        let mut default_exprs: Vec<(u8, Expr)> = Vec::new();
        for (i, default) in f.defaults.iter().enumerate() {
            if let Some(d) = default {
                default_exprs.push((i as u8, d.clone()));
            }
            self.symtab.define(&f.params[i]);
        }
        self.fx.note_local_count(self.symtab.total_slots());

        for s in &f.body {
            self.compile_stmt(s)?;
        }
        if !matches!(self.fx.chunk.ops.last(), Some(Op::ReturnValue) | Some(Op::Return)) {
            self.fx.emit(Op::Return, line);
        }

        let free_symbols = self.symtab.free_symbols().to_vec();
        let inner_fx = std::mem::replace(&mut self.fx, outer_fx);
        let inner_symtab = self.symtab.pop();
        self.symtab = inner_symtab;
        self.in_method = outer_in_method;

        let function_obj = FunctionObj {
            name: f.name.clone().unwrap_or_else(|| "<anonymous>".to_string()),
            arity: f.params.len() as u8,
            max_local_count: inner_fx.max_locals.max(self.symtab_function_floor(&f.params)),
            max_stack_size: inner_fx.max_stack,
            chunk: inner_fx.chunk,
            source_file: self.file.clone(),
            superclass: None,
            defaults: Vec::new(),
            module: None,
            free_count: free_symbols.len() as u8,
        };
        let obj_ref = self.heap.alloc(Obj::Function(function_obj));
        let const_idx = self.fx.chunk.add_const(ConstValue::Function(obj_ref));

        // Push the captured free variables (outer locals/frees) in capture
        // order, then `Closure`; a zero-capture function is a bare constant.
        if free_symbols.is_empty() {
            self.fx.emit(Op::Constant(const_idx), line);
        } else {
            for free in &free_symbols {
                match free.kind {
                    SymbolKind::Local | SymbolKind::SelfRef => {
                        self.fx.emit(Op::GetLocal(free.index as u8), line);
                    }
                    SymbolKind::Free => {
                        self.fx.emit(Op::GetFree(free.index as u8), line);
                    }
                    SymbolKind::Global | SymbolKind::Builtin => {
                        unreachable!("globals/builtins are never captured as frees")
                    }
                }
            }
            self.fx.emit(Op::Closure(const_idx, free_symbols.len() as u8), line);
        }

        for (param_index, default_expr) in default_exprs {
            self.compile_expr(&default_expr)?;
            self.fx.emit(Op::SetFunctionDefault(param_index), line);
        }

        Ok(())
    }

    fn symtab_function_floor(&self, params: &[String]) -> u16 {
        // self + declared params, minimum local width even if the body
        // declares no further locals.
        (params.len() as u16) + 1
    }

    // ---- classes -----------------------------------------------------

    fn compile_class_decl(&mut self, c: &ClassDecl, line: u32) -> CResult<()> {
        let name_idx = self.fx.chunk.add_const(ConstValue::Str(c.name.clone()));
        self.fx.emit(Op::Class(name_idx), line);

        if let Some(parent) = &c.parent {
            self.compile_expr(parent)?;
            self.fx.emit(Op::Inherit, line);
        }

        self.compile_class_fields(&c.fields, false, c.span, line)?;
        self.compile_class_fields(&c.class_fields, true, c.span, line)?;
        self.compile_class_methods(&c.methods, false, line)?;
        self.compile_class_methods(&c.class_methods, true, line)?;

        let is_global = self.symtab.is_global();
        let sym = self.symtab.define(&c.name);
        if is_global {
            self.fx.emit(Op::DefineGlobal(sym.index as u16), line);
        } else {
            self.fx.note_local_count(self.symtab.total_slots());
        }
        Ok(())
    }

    fn compile_class_fields(
        &mut self,
        fields: &[ClassField],
        is_class_field: bool,
        class_span: Span,
        line: u32,
    ) -> CResult<()> {
        let mut seen = std::collections::HashSet::new();
        for field in fields {
            if !seen.insert(field.name.clone()) {
                return Err(self.err(class_span, format!("duplicate field '{}'", field.name)));
            }
            match &field.default {
                Some(d) => self.compile_expr(d)?,
                None => {
                    self.fx.emit(Op::Nil, line);
                }
            }
            let name_idx = self.fx.chunk.add_const(ConstValue::Str(field.name.clone()));
            self.fx.emit(
                if is_class_field {
                    Op::DefineClassField(name_idx, field.is_const)
                } else {
                    Op::DefineField(name_idx, field.is_const)
                },
                line,
            );
        }
        Ok(())
    }

    fn compile_class_methods(&mut self, methods: &[FunctionLiteral], is_class_method: bool, line: u32) -> CResult<()> {
        let mut seen = std::collections::HashSet::new();
        for m in methods {
            let name = m.name.clone().expect("class methods are always named");
            if !seen.insert(name.clone()) {
                return Err(self.err(m.span, format!("duplicate method '{name}'")));
            }
            self.compile_function_value(m, true)?;
            let name_idx = self.fx.chunk.add_const(ConstValue::Str(name));
            self.fx.emit(if is_class_method { Op::DefineClassMethod(name_idx) } else { Op::DefineMethod(name_idx) }, line);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_with_heap(src: &str) -> (Chunk, Heap) {
        let tokens = crate::lexer::tokenize(src, "test").expect("lex");
        let program = crate::parser::parse(tokens, "test").expect("parse");
        let mut heap = Heap::new();
        let chunk = Compiler::new(&mut heap, "test").compile_module(&program).expect("compile");
        (chunk, heap)
    }

    fn compile(src: &str) -> Chunk {
        compile_with_heap(src).0
    }

    fn try_compile(src: &str) -> CResult<Chunk> {
        let tokens = crate::lexer::tokenize(src, "test").expect("lex");
        let program = crate::parser::parse(tokens, "test").expect("parse");
        let mut heap = Heap::new();
        Compiler::new(&mut heap, "test").compile_module(&program)
    }

    fn count(chunk: &Chunk, pred: impl Fn(&Op) -> bool) -> usize {
        chunk.ops.iter().filter(|o| pred(o)).count()
    }

    #[test]
    fn global_var_declaration_compiles_arithmetic_then_define() {
        let chunk = compile("var a = 1 + 2;");
        assert_eq!(
            chunk.ops,
            vec![Op::Constant(0), Op::Constant(1), Op::Add, Op::DefineGlobal(0), Op::Return]
        );
    }

    #[test]
    fn lt_and_le_reuse_greater_than_with_swapped_operands() {
        let chunk = compile("var a = 1 < 2;");
        assert!(chunk.ops.contains(&Op::GreaterThan));
        assert_eq!(count(&chunk, |o| matches!(o, Op::GreaterThan)), 1);
    }

    #[test]
    fn const_binding_rejects_reassignment() {
        let err = try_compile("con x = 1; x = 2;").unwrap_err();
        assert!(err.message.contains("const"), "unexpected message: {}", err.message);
    }

    #[test]
    fn if_else_emits_exactly_one_conditional_and_one_unconditional_jump() {
        let chunk = compile("var x = 0; if (true) { x = 1; } else { x = 2; };");
        assert_eq!(count(&chunk, |o| matches!(o, Op::JumpIfFalse(_))), 1);
        assert_eq!(count(&chunk, |o| matches!(o, Op::Jump(_))), 1);
    }

    #[test]
    fn break_inside_a_nested_if_unwinds_the_loop_bodys_locals_before_jumping() {
        // `doubled` lives in the while-body scope; `break` fires from a
        // nested if-block that declares nothing of its own, so it has to
        // pop `doubled` itself before jumping clear of the loop. The
        // fall-through path pops the same slot again on normal scope exit.
        let chunk = compile(
            "var i = 0; while (i < 3) { var doubled = i * 2; if (doubled > 2) { break; }; i = i + 1; }",
        );
        assert_eq!(count(&chunk, |o| matches!(o, Op::PopN(1))), 2);
        assert_eq!(count(&chunk, |o| matches!(o, Op::Jump(_))), 1);
        assert_eq!(count(&chunk, |o| matches!(o, Op::JumpBack(_))), 1);
    }

    #[test]
    fn break_outside_a_loop_is_a_compile_error() {
        let err = try_compile("break;").unwrap_err();
        assert!(err.message.contains("break"));
    }

    #[test]
    fn for_in_continue_leaves_the_iterator_slots_untouched() {
        // Before the continue/break base split, `continue` popped the
        // reserved iterator/index/element slots too, corrupting `IterNext`'s
        // fixed-slot reads on the next iteration. With nothing declared
        // between those slots and the `continue`, no PopN at all should sit
        // in front of it — the only PopN left is the loop's own trailing
        // cleanup of all three reserved slots.
        let chunk = compile(
            "var total = 0; for (i, e in [1, 2, 3]) { if (e == 2) { continue; }; total = total + e; }",
        );
        assert_eq!(count(&chunk, |o| matches!(o, Op::IterInit(_))), 1);
        assert_eq!(count(&chunk, |o| matches!(o, Op::IterNext(_, _))), 1);
        let pop_ns: Vec<_> = chunk.ops.iter().filter(|o| matches!(o, Op::PopN(_))).collect();
        assert_eq!(pop_ns, vec![&Op::PopN(3)]);
    }

    #[test]
    fn for_in_break_unwinds_all_the_way_back_to_before_the_loop() {
        let chunk = compile(
            "for (i, e in [1, 2, 3]) { if (e == 2) { break; }; }",
        );
        // The break fires from inside the nested if-block, with no locals
        // of its own, so its unwind must still reach past the iterator,
        // index and element slots reserved by the enclosing for-in.
        assert!(chunk.ops.iter().any(|o| matches!(o, Op::PopN(3))));
    }

    #[test]
    fn function_with_no_captures_compiles_to_a_bare_constant() {
        let (chunk, heap) = compile_with_heap("fn add(a, b) { return a + b; }; var r = add(1, 2);");
        assert_eq!(count(&chunk, |o| matches!(o, Op::Call(2))), 1);
        assert_eq!(count(&chunk, |o| matches!(o, Op::DefineGlobal(_))), 2);
        let const_idx = chunk
            .ops
            .iter()
            .find_map(|o| if let Op::Constant(idx) = o { Some(*idx) } else { None })
            .expect("add compiles to a bare Constant, no Closure");
        match chunk.consts.get(const_idx).unwrap() {
            ConstValue::Function(r) => match heap.get(*r) {
                Obj::Function(f) => {
                    assert_eq!(f.name, "add");
                    assert_eq!(f.arity, 2);
                    assert_eq!(f.free_count, 0);
                }
                other => panic!("expected a Function object, got {other:?}"),
            },
            other => panic!("expected a Function constant, got {other:?}"),
        }
    }

    #[test]
    fn closures_capture_the_enclosing_parameter_as_a_free_variable() {
        let (chunk, heap) = compile_with_heap(
            "fn make_adder(x) { fn adder(y) { return x + y; }; return adder; };",
        );
        // `make_adder` itself captures nothing, so it's a bare Constant.
        let const_idx = chunk
            .ops
            .iter()
            .find_map(|o| if let Op::Constant(idx) = o { Some(*idx) } else { None })
            .expect("make_adder compiles to a bare Constant");
        let outer = match chunk.consts.get(const_idx).unwrap() {
            ConstValue::Function(r) => match heap.get(*r) {
                Obj::Function(f) => f,
                other => panic!("expected a Function object, got {other:?}"),
            },
            other => panic!("expected a Function constant, got {other:?}"),
        };
        // `adder`'s body captures `x`, so its own chunk pushes a GetLocal(x)
        // before a Closure(_, 1) rather than a bare Constant.
        assert!(outer.chunk.ops.iter().any(|o| matches!(o, Op::Closure(_, 1))));
        assert!(outer.chunk.ops.iter().any(|o| matches!(o, Op::GetLocal(_))));
    }

    #[test]
    fn self_property_access_has_no_explicit_receiver_push() {
        let (chunk, heap) = compile_with_heap(
            "class P { var a = 1; fn get() { return self.a; }; }; class C < P { fn get() { return super.get() + 10; }; }; var c = C();",
        );
        assert_eq!(count(&chunk, |o| matches!(o, Op::Class(_))), 2);
        assert!(chunk.ops.iter().any(|o| matches!(o, Op::Inherit)));
        assert!(chunk.ops.iter().any(|o| matches!(o, Op::DefineField(_, _))));
        assert!(chunk.ops.iter().any(|o| matches!(o, Op::DefineMethod(_))));

        // find `P.get`'s compiled body among the heap's functions and check
        // it reads `self.a` via a bare GetSelfProperty, no GetLocal(0) first.
        let get_bodies: Vec<_> = chunk
            .consts
            .function_consts()
            .filter_map(|r| match heap.get(*r) {
                Obj::Function(f) if f.name == "get" => Some(f),
                _ => None,
            })
            .collect();
        assert_eq!(get_bodies.len(), 2, "both P.get and C.get should produce a function constant");
        assert!(get_bodies.iter().all(|f| f.superclass.is_none()), "the real parent is stamped by the VM, not the compiler");
        let base_get = get_bodies
            .iter()
            .find(|f| f.chunk.ops.iter().any(|o| matches!(o, Op::GetSelfProperty(_))))
            .expect("P.get reads self.a directly");
        assert!(!base_get.chunk.ops.iter().any(|o| matches!(o, Op::CallSuperMethod(_, _))));
        let overriding_get = get_bodies
            .iter()
            .find(|f| f.chunk.ops.iter().any(|o| matches!(o, Op::CallSuperMethod(_, _))))
            .expect("C.get calls super.get()");
        assert!(overriding_get.chunk.ops.iter().any(|o| matches!(o, Op::CallSuperMethod(_, 0))));
    }

    #[test]
    fn duplicate_field_names_are_rejected() {
        let err = try_compile("class P { var a = 1; var a = 2; };").unwrap_err();
        assert!(err.message.contains("duplicate field"));
    }

    #[test]
    fn duplicate_method_names_are_rejected() {
        let err = try_compile("class P { fn a() { return 1; }; fn a() { return 2; }; };").unwrap_err();
        assert!(err.message.contains("duplicate method"));
    }

    #[test]
    fn and_or_short_circuit_with_a_trailing_pop_in_the_untaken_branch() {
        let chunk = compile("var a = true and false; var b = false or true;");
        assert_eq!(count(&chunk, |o| matches!(o, Op::AndJump(_))), 1);
        assert_eq!(count(&chunk, |o| matches!(o, Op::OrJump(_))), 1);
    }

    #[test]
    fn array_and_map_literals_fold_their_elements_into_one_op() {
        let chunk = compile("var a = [1, 2, 3]; var m = {\"k\": 1};");
        assert!(chunk.ops.contains(&Op::Array(3)));
        assert!(chunk.ops.contains(&Op::Map(1)));
    }

    #[test]
    fn compound_assignment_re_reads_the_target_through_its_access_path() {
        let chunk = compile("var a = 1; a += 2;");
        // `a += 2` must read `a` again (GetGlobal) before adding, then
        // SetGlobal, then a trailing Pop since it's a statement.
        assert_eq!(count(&chunk, |o| matches!(o, Op::GetGlobal(_))), 1);
        assert_eq!(count(&chunk, |o| matches!(o, Op::SetGlobal(_))), 1);
        assert_eq!(count(&chunk, |o| matches!(o, Op::Pop)), 1);
    }
}
