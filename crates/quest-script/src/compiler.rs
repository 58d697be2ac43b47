//! Lowers a parsed [`Script`] to a flat instruction list.
//!
//! Top-level code comes first and ends in `Halt`; function bodies follow.
//! Every instruction remembers the source line of the statement it came
//! from so runtime errors can point at it.

use std::collections::HashMap;

use crate::ast::{BinaryOp, Callee, Expr, FunctionDecl, LogicalOp, Script, Stmt, StmtKind, UnaryOp};
use crate::builtins::{MathFn, math_constant};
use crate::error::ParseError;
use crate::parser::parse_script;
use crate::value::Value;

// ── Program ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub(crate) enum Op {
    Const(Value),
    Pop,
    Dup,
    LoadLocal(usize),
    StoreLocal(usize),
    LoadGlobal(usize),
    StoreGlobal(usize),
    Unary(UnaryOp),
    Binary(BinaryOp),
    Jump(usize),
    JumpIfFalse(usize),
    /// `&&`: jump keeping the falsy operand, otherwise drop it.
    JumpIfFalseKeep(usize),
    /// `||`: jump keeping the truthy operand, otherwise drop it.
    JumpIfTrueKeep(usize),
    Call { function: usize, argc: usize },
    CallNative { slot: usize, argc: usize },
    CallMath { f: MathFn, argc: usize },
    Return,
    Throw,
    Halt,
}

#[derive(Debug, Clone)]
pub(crate) struct Function {
    pub(crate) entry: usize,
    pub(crate) arity: usize,
    pub(crate) locals: usize,
}

/// A compiled script, ready to be handed to an [`Interpreter`](crate::Interpreter).
#[derive(Debug, Clone)]
pub struct Program {
    pub(crate) code: Vec<Op>,
    pub(crate) lines: Vec<usize>,
    pub(crate) functions: Vec<Function>,
    pub(crate) globals: Vec<String>,
    /// Globals introduced with `var` start out `undefined`; the rest are
    /// unset until first assignment.
    pub(crate) declared: Vec<bool>,
    pub(crate) natives: Vec<String>,
}

impl Program {
    /// Names the script calls that are neither its own functions nor `Math`.
    pub fn native_names(&self) -> &[String] {
        &self.natives
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

/// Parse and compile `src`.
pub fn compile(src: &str) -> Result<Program, ParseError> {
    let script = parse_script(src)?;
    Compiler::default().compile(&script)
}

/// Parse `src` and compile it as the body of an endless loop.
///
/// Top-level function declarations stay outside the loop, and statements
/// keep their own source lines.
pub fn compile_looped(src: &str) -> Result<Program, ParseError> {
    let script = parse_script(src)?;
    let (mut body, rest): (Vec<Stmt>, Vec<Stmt>) = script
        .body
        .into_iter()
        .partition(|stmt| matches!(stmt.kind, StmtKind::Function(_)));
    let line = rest.first().map_or(1, |stmt| stmt.line);
    body.push(Stmt {
        kind: StmtKind::While {
            test: Expr::Bool(true),
            body: Box::new(Stmt { kind: StmtKind::Block(rest), line }),
        },
        line,
    });
    Compiler::default().compile(&Script { body })
}

// ── Compiler ──────────────────────────────────────────────────────────────

#[derive(Default)]
struct LoopCtx {
    breaks: Vec<usize>,
    continues: Vec<usize>,
}

#[derive(Default)]
struct Compiler {
    code: Vec<Op>,
    lines: Vec<usize>,
    line: usize,
    functions: Vec<Function>,
    function_index: HashMap<String, usize>,
    globals: Vec<String>,
    global_index: HashMap<String, usize>,
    declared: Vec<bool>,
    natives: Vec<String>,
    native_index: HashMap<String, usize>,
    /// Locals of the function being compiled; `None` at top level.
    scope: Option<HashMap<String, usize>>,
    loops: Vec<LoopCtx>,
}

impl Compiler {
    fn compile(mut self, script: &Script) -> Result<Program, ParseError> {
        let mut decls = Vec::new();
        for stmt in &script.body {
            if let StmtKind::Function(decl) = &stmt.kind {
                self.line = stmt.line;
                if self.function_index.contains_key(&decl.name) {
                    return Err(self.err(format!("function {} is declared twice", decl.name)));
                }
                self.function_index.insert(decl.name.clone(), self.functions.len());
                self.functions.push(Function { entry: 0, arity: decl.params.len(), locals: 0 });
                decls.push(decl);
            }
        }

        let mut hoisted = Vec::new();
        collect_vars(&script.body, &mut hoisted);
        for name in hoisted {
            let slot = self.global_slot(&name);
            self.declared[slot] = true;
        }

        for stmt in &script.body {
            if !matches!(stmt.kind, StmtKind::Function(_)) {
                self.stmt(stmt)?;
            }
        }
        self.emit(Op::Halt);

        for (index, decl) in decls.into_iter().enumerate() {
            self.function(index, decl)?;
        }

        Ok(Program {
            code: self.code,
            lines: self.lines,
            functions: self.functions,
            globals: self.globals,
            declared: self.declared,
            natives: self.natives,
        })
    }

    fn function(&mut self, index: usize, decl: &FunctionDecl) -> Result<(), ParseError> {
        let mut names = decl.params.clone();
        collect_vars(&decl.body, &mut names);
        let mut scope = HashMap::new();
        for name in names {
            let next = scope.len();
            scope.entry(name).or_insert(next);
        }
        let locals = scope.len();
        self.scope = Some(scope);

        let entry = self.code.len();
        for stmt in &decl.body {
            self.stmt(stmt)?;
        }
        self.emit(Op::Const(Value::Undefined));
        self.emit(Op::Return);

        self.functions[index].entry = entry;
        self.functions[index].locals = locals;
        self.scope = None;
        Ok(())
    }

    fn err(&self, msg: impl Into<String>) -> ParseError {
        ParseError::new(msg, self.line, 1)
    }

    fn emit(&mut self, op: Op) -> usize {
        self.code.push(op);
        self.lines.push(self.line);
        self.code.len() - 1
    }

    fn here(&self) -> usize {
        self.code.len()
    }

    /// Point the jump at `at` to the next instruction.
    fn patch(&mut self, at: usize) {
        let target = self.here();
        self.patch_to(at, target);
    }

    fn patch_to(&mut self, at: usize, target: usize) {
        match &mut self.code[at] {
            Op::Jump(t) | Op::JumpIfFalse(t) | Op::JumpIfFalseKeep(t) | Op::JumpIfTrueKeep(t) => {
                *t = target;
            }
            other => unreachable!("patching non-jump {:?}", other),
        }
    }

    fn global_slot(&mut self, name: &str) -> usize {
        if let Some(&slot) = self.global_index.get(name) {
            return slot;
        }
        let slot = self.globals.len();
        self.globals.push(name.to_string());
        self.declared.push(false);
        self.global_index.insert(name.to_string(), slot);
        slot
    }

    fn native_slot(&mut self, name: &str) -> usize {
        if let Some(&slot) = self.native_index.get(name) {
            return slot;
        }
        let slot = self.natives.len();
        self.natives.push(name.to_string());
        self.native_index.insert(name.to_string(), slot);
        slot
    }

    fn load(&mut self, name: &str) {
        let local = self.scope.as_ref().and_then(|s| s.get(name).copied());
        match local {
            Some(slot) => self.emit(Op::LoadLocal(slot)),
            None => {
                let slot = self.global_slot(name);
                self.emit(Op::LoadGlobal(slot))
            }
        };
    }

    fn store(&mut self, name: &str) {
        let local = self.scope.as_ref().and_then(|s| s.get(name).copied());
        match local {
            Some(slot) => self.emit(Op::StoreLocal(slot)),
            None => {
                let slot = self.global_slot(name);
                self.emit(Op::StoreGlobal(slot))
            }
        };
    }

    // ── Statements ────────────────────────────────────────────────────────

    fn stmt(&mut self, stmt: &Stmt) -> Result<(), ParseError> {
        self.line = stmt.line;
        match &stmt.kind {
            StmtKind::VarDecl(decls) => {
                for (name, init) in decls {
                    if let Some(init) = init {
                        self.expr(init)?;
                        self.store(name);
                        self.emit(Op::Pop);
                    }
                }
            }
            StmtKind::Expr(expr) => {
                self.expr(expr)?;
                self.emit(Op::Pop);
            }
            StmtKind::If { test, then, otherwise } => {
                self.expr(test)?;
                let skip_then = self.emit(Op::JumpIfFalse(0));
                self.stmt(then)?;
                match otherwise {
                    Some(otherwise) => {
                        let skip_else = self.emit(Op::Jump(0));
                        self.patch(skip_then);
                        self.stmt(otherwise)?;
                        self.patch(skip_else);
                    }
                    None => self.patch(skip_then),
                }
            }
            StmtKind::While { test, body } => {
                let start = self.here();
                self.expr(test)?;
                let exit = self.emit(Op::JumpIfFalse(0));
                self.loop_body(body, start, exit)?;
            }
            StmtKind::DoWhile { body, test } => {
                let start = self.here();
                self.loops.push(LoopCtx::default());
                self.stmt(body)?;
                let ctx = self.loops.pop().unwrap_or_default();
                let check = self.here();
                self.line = stmt.line;
                self.expr(test)?;
                let exit = self.emit(Op::JumpIfFalse(0));
                self.emit(Op::Jump(start));
                self.close_loop(ctx, check, Some(exit));
            }
            StmtKind::For { init, test, update, body } => {
                if let Some(init) = init {
                    self.stmt(init)?;
                }
                let start = self.here();
                let exit = match test {
                    Some(test) => {
                        self.expr(test)?;
                        Some(self.emit(Op::JumpIfFalse(0)))
                    }
                    None => None,
                };
                self.loops.push(LoopCtx::default());
                self.stmt(body)?;
                let ctx = self.loops.pop().unwrap_or_default();
                let next = self.here();
                self.line = stmt.line;
                if let Some(update) = update {
                    self.expr(update)?;
                    self.emit(Op::Pop);
                }
                self.emit(Op::Jump(start));
                self.close_loop(ctx, next, exit);
            }
            StmtKind::Break => {
                let jump = self.emit(Op::Jump(0));
                match self.loops.last_mut() {
                    Some(ctx) => ctx.breaks.push(jump),
                    None => return Err(self.err("break outside of a loop")),
                }
            }
            StmtKind::Continue => {
                let jump = self.emit(Op::Jump(0));
                match self.loops.last_mut() {
                    Some(ctx) => ctx.continues.push(jump),
                    None => return Err(self.err("continue outside of a loop")),
                }
            }
            StmtKind::Return(value) => {
                if self.scope.is_none() {
                    return Err(self.err("return outside of a function"));
                }
                match value {
                    Some(value) => self.expr(value)?,
                    None => {
                        self.emit(Op::Const(Value::Undefined));
                    }
                }
                self.emit(Op::Return);
            }
            StmtKind::Throw(value) => {
                self.expr(value)?;
                self.emit(Op::Throw);
            }
            StmtKind::Block(body) => {
                for stmt in body {
                    self.stmt(stmt)?;
                }
            }
            StmtKind::Function(decl) => {
                return Err(self.err(format!(
                    "function {} must be declared at the top level",
                    decl.name
                )));
            }
            StmtKind::Empty => {}
        }
        Ok(())
    }

    fn loop_body(&mut self, body: &Stmt, start: usize, exit: usize) -> Result<(), ParseError> {
        self.loops.push(LoopCtx::default());
        self.stmt(body)?;
        let ctx = self.loops.pop().unwrap_or_default();
        self.emit(Op::Jump(start));
        self.close_loop(ctx, start, Some(exit));
        Ok(())
    }

    fn close_loop(&mut self, ctx: LoopCtx, continue_target: usize, exit: Option<usize>) {
        for jump in ctx.continues {
            self.patch_to(jump, continue_target);
        }
        if let Some(exit) = exit {
            self.patch(exit);
        }
        for jump in ctx.breaks {
            self.patch(jump);
        }
    }

    // ── Expressions ───────────────────────────────────────────────────────

    fn expr(&mut self, expr: &Expr) -> Result<(), ParseError> {
        match expr {
            Expr::Number(n) => {
                self.emit(Op::Const(Value::Number(*n)));
            }
            Expr::Str(s) => {
                self.emit(Op::Const(Value::string(s)));
            }
            Expr::Bool(b) => {
                self.emit(Op::Const(Value::Bool(*b)));
            }
            Expr::Null => {
                self.emit(Op::Const(Value::Null));
            }
            Expr::Ident(name) => match name.as_str() {
                "undefined" => {
                    self.emit(Op::Const(Value::Undefined));
                }
                "NaN" => {
                    self.emit(Op::Const(Value::Number(f64::NAN)));
                }
                "Infinity" => {
                    self.emit(Op::Const(Value::Number(f64::INFINITY)));
                }
                _ => self.load(name),
            },
            Expr::Member { object, property } => {
                match (object.as_str(), math_constant(property)) {
                    ("Math", Some(n)) => {
                        self.emit(Op::Const(Value::Number(n)));
                    }
                    _ => return Err(self.err(format!("unsupported property {object}.{property}"))),
                }
            }
            Expr::Unary { op, operand } => {
                self.expr(operand)?;
                self.emit(Op::Unary(*op));
            }
            Expr::Binary { op, lhs, rhs } => {
                self.expr(lhs)?;
                self.expr(rhs)?;
                self.emit(Op::Binary(*op));
            }
            Expr::Logical { op, lhs, rhs } => {
                self.expr(lhs)?;
                let short = match op {
                    LogicalOp::And => self.emit(Op::JumpIfFalseKeep(0)),
                    LogicalOp::Or => self.emit(Op::JumpIfTrueKeep(0)),
                };
                self.expr(rhs)?;
                self.patch(short);
            }
            Expr::Conditional { test, then, otherwise } => {
                self.expr(test)?;
                let skip_then = self.emit(Op::JumpIfFalse(0));
                self.expr(then)?;
                let skip_else = self.emit(Op::Jump(0));
                self.patch(skip_then);
                self.expr(otherwise)?;
                self.patch(skip_else);
            }
            Expr::Assign { target, op, value } => {
                if let Some(op) = op {
                    self.load(target);
                    self.expr(value)?;
                    self.emit(Op::Binary(*op));
                } else {
                    self.expr(value)?;
                }
                self.store(target);
            }
            Expr::Update { target, increment, prefix } => {
                let op = if *increment { BinaryOp::Add } else { BinaryOp::Sub };
                self.load(target);
                self.emit(Op::Unary(UnaryOp::Plus));
                if !prefix {
                    self.emit(Op::Dup);
                }
                self.emit(Op::Const(Value::Number(1.0)));
                self.emit(Op::Binary(op));
                self.store(target);
                if !prefix {
                    self.emit(Op::Pop);
                }
            }
            Expr::Call { callee, args } => self.call(callee, args)?,
        }
        Ok(())
    }

    fn call(&mut self, callee: &Callee, args: &[Expr]) -> Result<(), ParseError> {
        let op = match callee {
            Callee::Name(name) => match self.function_index.get(name) {
                Some(&function) => Op::Call { function, argc: args.len() },
                None => Op::CallNative { slot: self.native_slot(name), argc: args.len() },
            },
            Callee::Member { object, property } => match (object.as_str(), MathFn::lookup(property)) {
                ("Math", Some(f)) => Op::CallMath { f, argc: args.len() },
                _ => return Err(self.err(format!("{object}.{property} is not a function"))),
            },
        };
        for arg in args {
            self.expr(arg)?;
        }
        self.emit(op);
        Ok(())
    }
}

/// Names declared with `var`/`let`/`const` anywhere in `body`, not descending
/// into nested functions.
fn collect_vars(body: &[Stmt], out: &mut Vec<String>) {
    for stmt in body {
        collect_stmt_vars(stmt, out);
    }
}

fn collect_stmt_vars(stmt: &Stmt, out: &mut Vec<String>) {
    match &stmt.kind {
        StmtKind::VarDecl(decls) => {
            for (name, _) in decls {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
        }
        StmtKind::If { then, otherwise, .. } => {
            collect_stmt_vars(then, out);
            if let Some(otherwise) = otherwise {
                collect_stmt_vars(otherwise, out);
            }
        }
        StmtKind::While { body, .. } | StmtKind::DoWhile { body, .. } => collect_stmt_vars(body, out),
        StmtKind::For { init, body, .. } => {
            if let Some(init) = init {
                collect_stmt_vars(init, out);
            }
            collect_stmt_vars(body, out);
        }
        StmtKind::Block(body) => collect_vars(body, out),
        _ => {}
    }
}
