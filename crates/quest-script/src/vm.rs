use std::collections::HashMap;
use std::iter;
use std::rc::Rc;

use rand::SeedableRng;
use rand::rngs::SmallRng;

use crate::compiler::{Op, Program};
use crate::error::{NativeError, ScriptError};
use crate::value::{self, Value};

/// Deepest user-function nesting before the script is aborted.
pub const MAX_CALL_DEPTH: usize = 256;
/// Operand stack ceiling.
pub const MAX_STACK: usize = 10_000;

const DEFAULT_SEED: u64 = 0x0051_7e57;

// ── Natives ───────────────────────────────────────────────────────────────

/// Handle for a host function registered in a [`NativeTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeId(pub usize);

/// The set of host function names a script may call.
///
/// Ids are handed out in registration order, so a host can keep its own
/// implementations in a parallel `Vec` indexed by `NativeId.0`.
#[derive(Debug, Clone, Default)]
pub struct NativeTable {
    names: Vec<String>,
    index: HashMap<String, NativeId>,
}

impl NativeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name`, returning the existing id if it is already known.
    pub fn register(&mut self, name: impl Into<String>) -> NativeId {
        let name = name.into();
        if let Some(&id) = self.index.get(&name) {
            return id;
        }
        let id = NativeId(self.names.len());
        self.index.insert(name.clone(), id);
        self.names.push(name);
        id
    }

    pub fn lookup(&self, name: &str) -> Option<NativeId> {
        self.index.get(name).copied()
    }

    pub fn name(&self, id: NativeId) -> Option<&str> {
        self.names.get(id.0).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Receives native calls made by a running script.
///
/// The interpreter never owns game state; whoever drives `step` lends it a
/// `Host` for exactly that call.
pub trait Host {
    fn call_native(&mut self, id: NativeId, args: &[Value]) -> Result<Value, NativeError>;
}

// ── Interpreter ───────────────────────────────────────────────────────────

/// How [`Interpreter::run`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    BudgetExhausted,
}

#[derive(Debug)]
struct Frame {
    return_pc: usize,
    locals_base: usize,
    stack_base: usize,
}

/// Executes a [`Program`] one instruction per [`step`](Self::step).
pub struct Interpreter {
    program: Rc<Program>,
    natives: Vec<Option<NativeId>>,
    globals: Vec<Option<Value>>,
    stack: Vec<Value>,
    locals: Vec<Value>,
    frames: Vec<Frame>,
    pc: usize,
    rng: SmallRng,
    finished: bool,
    steps: u64,
}

impl Interpreter {
    pub fn new(program: Rc<Program>, natives: &NativeTable) -> Self {
        let resolved = program.natives.iter().map(|name| natives.lookup(name)).collect();
        let globals = program
            .declared
            .iter()
            .map(|&declared| declared.then_some(Value::Undefined))
            .collect();
        Self {
            program,
            natives: resolved,
            globals,
            stack: Vec::new(),
            locals: Vec::new(),
            frames: Vec::new(),
            pc: 0,
            rng: SmallRng::seed_from_u64(DEFAULT_SEED),
            finished: false,
            steps: 0,
        }
    }

    /// Reseeds `Math.random`.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    /// Instructions executed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Reads a global by name; `None` when unknown or never assigned.
    pub fn global(&self, name: &str) -> Option<&Value> {
        let slot = self.program.globals.iter().position(|g| g == name)?;
        self.globals[slot].as_ref()
    }

    /// `false` once the script has finished, or when everything left at top
    /// level is bookkeeping with no observable effect.
    pub fn has_more_code(&self) -> bool {
        if self.finished {
            return false;
        }
        if !self.frames.is_empty() {
            return true;
        }
        self.program.code[self.pc..]
            .iter()
            .take_while(|op| !matches!(op, Op::Halt))
            .any(|op| !matches!(op, Op::Pop))
    }

    /// Executes one instruction. Returns whether any code remains.
    ///
    /// After an error the interpreter is finished.
    pub fn step<H: Host + ?Sized>(&mut self, host: &mut H) -> Result<bool, ScriptError> {
        if self.finished {
            return Ok(false);
        }
        match self.execute(host) {
            Ok(()) => Ok(!self.finished),
            Err(err) => {
                self.finished = true;
                Err(err)
            }
        }
    }

    /// Steps until the script completes or `budget` instructions have run.
    pub fn run<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        budget: u64,
    ) -> Result<RunOutcome, ScriptError> {
        for _ in 0..budget {
            if !self.step(host)? {
                return Ok(RunOutcome::Completed);
            }
        }
        Ok(if self.finished { RunOutcome::Completed } else { RunOutcome::BudgetExhausted })
    }

    fn line(&self, pc: usize) -> usize {
        self.program.lines.get(pc).copied().unwrap_or(0)
    }

    fn runtime(&self, pc: usize, message: impl Into<String>) -> ScriptError {
        ScriptError::Runtime { message: message.into(), line: self.line(pc) }
    }

    fn push(&mut self, pc: usize, value: Value) -> Result<(), ScriptError> {
        if self.stack.len() >= MAX_STACK {
            return Err(self.runtime(pc, "stack overflow"));
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().unwrap_or(Value::Undefined)
    }

    fn top(&self) -> Value {
        self.stack.last().cloned().unwrap_or(Value::Undefined)
    }

    fn pop_args(&mut self, argc: usize) -> Vec<Value> {
        let start = self.stack.len().saturating_sub(argc);
        self.stack.split_off(start)
    }

    fn locals_base(&self) -> usize {
        self.frames.last().map_or(0, |f| f.locals_base)
    }

    fn execute<H: Host + ?Sized>(&mut self, host: &mut H) -> Result<(), ScriptError> {
        let program = Rc::clone(&self.program);
        let pc = self.pc;
        let Some(op) = program.code.get(pc) else {
            self.finished = true;
            return Ok(());
        };
        self.pc += 1;
        self.steps += 1;

        match op {
            Op::Const(v) => self.push(pc, v.clone())?,
            Op::Pop => {
                self.pop();
            }
            Op::Dup => {
                let v = self.top();
                self.push(pc, v)?;
            }
            Op::LoadLocal(slot) => {
                let v = self.locals[self.locals_base() + slot].clone();
                self.push(pc, v)?;
            }
            Op::StoreLocal(slot) => {
                let at = self.locals_base() + slot;
                self.locals[at] = self.top();
            }
            Op::LoadGlobal(slot) => match &self.globals[*slot] {
                Some(v) => {
                    let v = v.clone();
                    self.push(pc, v)?;
                }
                None => {
                    return Err(self.runtime(pc, format!("{} is not defined", program.globals[*slot])));
                }
            },
            Op::StoreGlobal(slot) => {
                self.globals[*slot] = Some(self.top());
            }
            Op::Unary(op) => {
                let v = self.pop();
                self.push(pc, value::unary(*op, &v))?;
            }
            Op::Binary(op) => {
                let rhs = self.pop();
                let lhs = self.pop();
                self.push(pc, value::binary(*op, &lhs, &rhs))?;
            }
            Op::Jump(target) => self.pc = *target,
            Op::JumpIfFalse(target) => {
                if !self.pop().is_truthy() {
                    self.pc = *target;
                }
            }
            Op::JumpIfFalseKeep(target) => {
                if self.top().is_truthy() {
                    self.pop();
                } else {
                    self.pc = *target;
                }
            }
            Op::JumpIfTrueKeep(target) => {
                if self.top().is_truthy() {
                    self.pc = *target;
                } else {
                    self.pop();
                }
            }
            Op::Call { function, argc } => {
                if self.frames.len() >= MAX_CALL_DEPTH {
                    return Err(self.runtime(pc, "maximum call stack size exceeded"));
                }
                let function = &program.functions[*function];
                let args = self.pop_args(*argc);
                let locals_base = self.locals.len();
                self.locals.extend(args.into_iter().chain(iter::repeat(Value::Undefined)).take(function.arity));
                self.locals.resize(locals_base + function.locals, Value::Undefined);
                self.frames.push(Frame {
                    return_pc: self.pc,
                    locals_base,
                    stack_base: self.stack.len(),
                });
                self.pc = function.entry;
            }
            Op::CallNative { slot, argc } => {
                let args = self.pop_args(*argc);
                let Some(id) = self.natives[*slot] else {
                    let name = &program.natives[*slot];
                    return Err(self.runtime(pc, format!("{name} is not defined")));
                };
                match host.call_native(id, &args) {
                    Ok(v) => self.push(pc, v)?,
                    Err(NativeError::Throw(value)) => {
                        return Err(ScriptError::Thrown { value, line: self.line(pc) });
                    }
                    Err(NativeError::Fault(message)) => return Err(self.runtime(pc, message)),
                }
            }
            Op::CallMath { f, argc } => {
                let args = self.pop_args(*argc);
                let v = f.call(&args, &mut self.rng);
                self.push(pc, v)?;
            }
            Op::Return => {
                let v = self.pop();
                match self.frames.pop() {
                    Some(frame) => {
                        self.locals.truncate(frame.locals_base);
                        self.stack.truncate(frame.stack_base);
                        self.pc = frame.return_pc;
                        self.push(pc, v)?;
                    }
                    None => self.finished = true,
                }
            }
            Op::Throw => {
                let value = self.pop();
                return Err(ScriptError::Thrown { value, line: self.line(pc) });
            }
            Op::Halt => {
                self.pc = pc;
                self.finished = true;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile;

    /// Records calls and answers every native with `undefined`.
    #[derive(Default)]
    struct Recorder {
        table: NativeTable,
        calls: Vec<(String, Vec<Value>)>,
    }

    impl Recorder {
        fn with(names: &[&str]) -> Self {
            let mut table = NativeTable::new();
            for name in names {
                table.register(*name);
            }
            Self { table, calls: Vec::new() }
        }
    }

    impl Host for Recorder {
        fn call_native(&mut self, id: NativeId, args: &[Value]) -> Result<Value, NativeError> {
            let name = self.table.name(id).unwrap_or("?").to_string();
            if name == "fail" {
                return Err(NativeError::Throw(Value::Bool(false)));
            }
            self.calls.push((name, args.to_vec()));
            Ok(Value::Undefined)
        }
    }

    fn run(src: &str, host: &mut Recorder) -> Result<Interpreter, ScriptError> {
        let program = Rc::new(compile(src).unwrap());
        let mut interp = Interpreter::new(program, &host.table);
        interp.run(host, 100_000)?;
        Ok(interp)
    }

    fn eval(src: &str) -> Value {
        let mut host = Recorder::default();
        let interp = run(src, &mut host).unwrap();
        interp.global("result").cloned().unwrap_or(Value::Undefined)
    }

    // ── Evaluation ────────────────────────────────────────────────────────

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(eval("result = 2 + 3 * 4 - 10 / 5;"), Value::Number(12.0));
        assert_eq!(eval("result = -7 % 3;"), Value::Number(-1.0));
    }

    #[test]
    fn loops_and_updates() {
        assert_eq!(
            eval("var result = 0; for (var i = 0; i < 5; i++) { if (i == 3) continue; result += i; }"),
            Value::Number(7.0)
        );
        assert_eq!(
            eval("var result = 0; do { result++; } while (result < 3);"),
            Value::Number(3.0)
        );
        assert_eq!(
            eval("var result = 0; while (true) { result = result + 2; if (result > 5) break; }"),
            Value::Number(6.0)
        );
    }

    #[test]
    fn postfix_yields_old_value() {
        assert_eq!(eval("var i = 1; result = i++ + i;"), Value::Number(3.0));
        assert_eq!(eval("var i = 1; result = ++i + i;"), Value::Number(4.0));
    }

    #[test]
    fn logical_operators_short_circuit() {
        assert_eq!(eval("result = 0 || 'x';"), Value::string("x"));
        assert_eq!(eval("result = 0 && undefinedName;"), Value::Number(0.0));
        assert_eq!(eval("result = 1 < 2 ? 'yes' : 'no';"), Value::string("yes"));
    }

    #[test]
    fn recursion_with_locals() {
        assert_eq!(
            eval("function fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); }\nresult = fib(10);"),
            Value::Number(55.0)
        );
    }

    #[test]
    fn math_members() {
        assert_eq!(eval("result = Math.max(1, 5, 3) + Math.floor(Math.PI);"), Value::Number(8.0));
    }

    #[test]
    fn random_is_reproducible_per_seed() {
        let program = Rc::new(compile("result = Math.random();").unwrap());
        let mut host = Recorder::default();
        let mut a = Interpreter::new(program.clone(), &host.table).with_seed(9);
        let mut b = Interpreter::new(program, &host.table).with_seed(9);
        a.run(&mut host, 100).unwrap();
        b.run(&mut host, 100).unwrap();
        assert_eq!(a.global("result"), b.global("result"));
    }

    // ── Natives ───────────────────────────────────────────────────────────

    #[test]
    fn natives_receive_arguments() {
        let mut host = Recorder::with(&["moveForward"]);
        run("moveForward('block_id_a'); moveForward();", &mut host).unwrap();
        assert_eq!(host.calls.len(), 2);
        assert_eq!(host.calls[0].1, vec![Value::string("block_id_a")]);
        assert!(host.calls[1].1.is_empty());
    }

    #[test]
    fn unregistered_native_is_a_runtime_error() {
        let mut host = Recorder::default();
        let err = run("\nfly();", &mut host).err().unwrap();
        assert_eq!(err, ScriptError::Runtime { message: "fly is not defined".into(), line: 2 });
    }

    #[test]
    fn native_throw_surfaces_as_thrown() {
        let mut host = Recorder::with(&["fail"]);
        let err = run("fail();", &mut host).err().unwrap();
        assert_eq!(err.thrown(), Some(&Value::Bool(false)));
    }

    // ── Termination ───────────────────────────────────────────────────────

    #[test]
    fn script_throw_is_reported_with_line() {
        let mut host = Recorder::default();
        let err = run("var a = 1;\nthrow 'boom';", &mut host).err().unwrap();
        assert_eq!(err, ScriptError::Thrown { value: Value::string("boom"), line: 2 });
    }

    #[test]
    fn undefined_variable_read() {
        let mut host = Recorder::default();
        assert!(matches!(run("result = nope;", &mut host), Err(ScriptError::Runtime { .. })));
    }

    #[test]
    fn runaway_recursion_is_stopped() {
        let mut host = Recorder::default();
        let err = run("function f() { return f(); }\nf();", &mut host).err().unwrap();
        assert!(err.to_string().contains("call stack"));
    }

    #[test]
    fn infinite_loop_exhausts_budget() {
        let program = Rc::new(compile("while (true) {}").unwrap());
        let mut host = Recorder::default();
        let mut interp = Interpreter::new(program, &host.table);
        assert_eq!(interp.run(&mut host, 1_000).unwrap(), RunOutcome::BudgetExhausted);
        assert_eq!(interp.steps(), 1_000);
    }

    #[test]
    fn trailing_bookkeeping_is_not_more_code() {
        let program = Rc::new(compile("a(); b();").unwrap());
        let mut host = Recorder::with(&["a", "b"]);
        let mut interp = Interpreter::new(program, &host.table);
        while host.calls.len() < 2 {
            interp.step(&mut host).unwrap();
        }
        assert!(!interp.has_more_code());
        assert!(interp.step(&mut host).unwrap());
        assert!(!interp.step(&mut host).unwrap());
    }

    #[test]
    fn finished_interpreter_stays_finished() {
        let program = Rc::new(compile("throw 1;").unwrap());
        let mut host = Recorder::default();
        let mut interp = Interpreter::new(program, &host.table);
        assert!(interp.step(&mut host).unwrap());
        assert!(interp.step(&mut host).is_err());
        assert!(!interp.step(&mut host).unwrap());
        assert!(!interp.has_more_code());
    }
}
