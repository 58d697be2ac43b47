//! Binding tables that expose game primitives to scripts.
//!
//! A game declares a `&'static [Binding<Ctx>]`. Each binding is a plain
//! function taking the game's context explicitly; nothing captures engine
//! state. Per interpreter step, a [`NativeCall`] lends the context to the
//! interpreter and records whether an action ran and which block it came
//! from.

use std::collections::HashSet;

use anyhow::{Result, bail};
use quest_script::{Host, Interpreter, NativeError, NativeId, NativeTable, ScriptError, Value};

/// Prefix block code generators put on the trailing id argument.
pub const BLOCK_ID_PREFIX: &str = "block_id_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// Changes the world; presentation has to animate it.
    Action,
    /// Reads the world.
    Query,
    /// Marks its first argument as the highlighted block without acting.
    Marker,
}

pub type NativeFn<C> = fn(&mut C, &NativeArgs<'_>) -> Result<Value, NativeError>;

pub struct Binding<C> {
    pub name: &'static str,
    /// Declared parameter count; a trailing string beyond it is a block id.
    pub arity: usize,
    pub kind: BindingKind,
    pub call: NativeFn<C>,
}

impl<C> Binding<C> {
    pub const fn action(name: &'static str, arity: usize, call: NativeFn<C>) -> Self {
        Self { name, arity, kind: BindingKind::Action, call }
    }

    pub const fn query(name: &'static str, arity: usize, call: NativeFn<C>) -> Self {
        Self { name, arity, kind: BindingKind::Query, call }
    }

    pub const fn marker(name: &'static str, call: NativeFn<C>) -> Self {
        Self { name, arity: 1, kind: BindingKind::Marker, call }
    }
}

// ── Arguments ─────────────────────────────────────────────────────────────

/// Arguments of one native call with the block id already split off.
#[derive(Debug, Clone, Copy)]
pub struct NativeArgs<'a> {
    values: &'a [Value],
    block_id: Option<&'a str>,
}

impl<'a> NativeArgs<'a> {
    pub fn new(values: &'a [Value], block_id: Option<&'a str>) -> Self {
        Self { values, block_id }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value(&self, i: usize) -> Value {
        self.values.get(i).cloned().unwrap_or(Value::Undefined)
    }

    /// Numeric coercion; a missing argument is `NaN`.
    pub fn number(&self, i: usize) -> f64 {
        self.values.get(i).map_or(f64::NAN, Value::to_number)
    }

    /// Like [`number`](Self::number) but missing or `undefined` gives `default`.
    pub fn number_or(&self, i: usize, default: f64) -> f64 {
        match self.values.get(i) {
            None | Some(Value::Undefined) => default,
            Some(v) => v.to_number(),
        }
    }

    pub fn text(&self, i: usize) -> String {
        self.values.get(i).map(Value::to_string).unwrap_or_default()
    }

    pub fn block_id(&self) -> Option<&'a str> {
        self.block_id
    }
}

/// Splits a trailing block id off `args` when more than `arity` were passed.
pub fn split_block_id(args: &[Value], arity: usize) -> (&[Value], Option<&str>) {
    if args.len() > arity {
        if let Some((Value::Str(last), rest)) = args.split_last() {
            return (rest, Some(strip_block_prefix(last)));
        }
    }
    (args, None)
}

pub fn strip_block_prefix(id: &str) -> &str {
    id.strip_prefix(BLOCK_ID_PREFIX).unwrap_or(id)
}

// ── Api ───────────────────────────────────────────────────────────────────

/// A binding table plus the name table the interpreter resolves against.
pub struct NativeApi<C: 'static> {
    bindings: &'static [Binding<C>],
    table: NativeTable,
}

impl<C: 'static> NativeApi<C> {
    pub fn new(bindings: &'static [Binding<C>]) -> Self {
        let mut table = NativeTable::new();
        for binding in bindings {
            table.register(binding.name);
        }
        debug_assert_eq!(table.len(), bindings.len(), "duplicate binding name");
        Self { bindings, table }
    }

    pub fn table(&self) -> &NativeTable {
        &self.table
    }

    pub fn bindings(&self) -> &'static [Binding<C>] {
        self.bindings
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> {
        self.bindings.iter().map(|b| b.name)
    }
}

/// Rejects tables with duplicate or empty names.
pub fn validate_catalogue<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<usize> {
    let mut seen = HashSet::new();
    for name in names {
        if name.is_empty() {
            bail!("binding with an empty name");
        }
        if !seen.insert(name) {
            bail!("binding {name} is declared twice");
        }
    }
    Ok(seen.len())
}

// ── Host adapter ──────────────────────────────────────────────────────────

/// Lends a game context to the interpreter for a single step.
pub struct NativeCall<'a, C: 'static> {
    api: &'a NativeApi<C>,
    ctx: &'a mut C,
    acted: bool,
    highlight: Option<String>,
}

impl<'a, C: 'static> NativeCall<'a, C> {
    pub fn new(api: &'a NativeApi<C>, ctx: &'a mut C) -> Self {
        Self { api, ctx, acted: false, highlight: None }
    }

    /// Whether an action ran, and the block id it or a marker reported.
    pub fn finish(self) -> (bool, Option<String>) {
        (self.acted, self.highlight)
    }
}

impl<C: 'static> Host for NativeCall<'_, C> {
    fn call_native(&mut self, id: NativeId, args: &[Value]) -> Result<Value, NativeError> {
        let Some(binding) = self.api.bindings.get(id.0) else {
            return Err(NativeError::Fault(format!("unknown native #{}", id.0)));
        };
        let (values, block_id) = split_block_id(args, binding.arity);
        match binding.kind {
            BindingKind::Action => {
                self.acted = true;
                if let Some(id) = block_id {
                    self.highlight = Some(id.to_string());
                }
            }
            BindingKind::Marker => {
                if let Some(Value::Str(id)) = values.first() {
                    self.highlight = Some(strip_block_prefix(id).to_string());
                }
            }
            BindingKind::Query => {}
        }
        (binding.call)(self.ctx, &NativeArgs::new(values, block_id))
    }
}

// ── Slices ────────────────────────────────────────────────────────────────

/// How a bounded run of interpreter steps ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Slice {
    /// An action ran; presentation should see it now.
    Acted { block_id: Option<String> },
    /// No observable code remains.
    Exhausted,
    /// The op allowance ran out first.
    Paused,
    Failed(ScriptError),
}

/// Steps `interp` at most `max_ops` times, stopping after the first action.
/// Returns how the slice ended and how many ops it used.
pub fn run_slice<C: 'static>(
    interp: &mut Interpreter,
    api: &NativeApi<C>,
    ctx: &mut C,
    max_ops: u64,
) -> (Slice, u64) {
    let mut ops = 0;
    let mut marked = None;
    while ops < max_ops {
        let mut call = NativeCall::new(api, ctx);
        let stepped = interp.step(&mut call);
        ops += 1;
        let (acted, highlight) = call.finish();
        if highlight.is_some() {
            marked = highlight;
        }
        match stepped {
            Err(err) => return (Slice::Failed(err), ops),
            Ok(_) if acted => return (Slice::Acted { block_id: marked }, ops),
            Ok(more) if !more || !interp.has_more_code() => return (Slice::Exhausted, ops),
            Ok(_) => {}
        }
    }
    (Slice::Paused, ops)
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use quest_script::compile;

    use super::*;

    #[derive(Default)]
    struct Counter {
        moves: u32,
        log: Vec<Option<String>>,
    }

    fn api_move(ctx: &mut Counter, args: &NativeArgs<'_>) -> Result<Value, NativeError> {
        ctx.moves += 1;
        ctx.log.push(args.block_id().map(str::to_string));
        Ok(Value::Undefined)
    }

    fn api_moves(ctx: &mut Counter, _: &NativeArgs<'_>) -> Result<Value, NativeError> {
        Ok(Value::Number(f64::from(ctx.moves)))
    }

    fn api_turn(_: &mut Counter, args: &NativeArgs<'_>) -> Result<Value, NativeError> {
        Ok(Value::Number(args.number_or(0, 90.0)))
    }

    fn api_noop(_: &mut Counter, _: &NativeArgs<'_>) -> Result<Value, NativeError> {
        Ok(Value::Undefined)
    }

    static API: &[Binding<Counter>] = &[
        Binding::action("move", 0, api_move),
        Binding::query("moves", 0, api_moves),
        Binding::action("turn", 1, api_turn),
        Binding::marker("highlightBlock", api_noop),
    ];

    fn interp(src: &str, api: &NativeApi<Counter>) -> Interpreter {
        Interpreter::new(Rc::new(compile(src).unwrap()), api.table())
    }

    // ── Block ids ─────────────────────────────────────────────────────────

    #[test]
    fn trailing_id_is_split_only_beyond_arity() {
        let args = [Value::string("block_id_7")];
        assert_eq!(split_block_id(&args, 0), (&[][..], Some("7")));
        assert_eq!(split_block_id(&args, 1), (&args[..], None));
    }

    #[test]
    fn trailing_non_string_is_kept() {
        let args = [Value::Number(1.0), Value::Number(2.0)];
        assert_eq!(split_block_id(&args, 1), (&args[..], None));
    }

    // ── Slices ────────────────────────────────────────────────────────────

    #[test]
    fn slice_stops_after_first_action() {
        let api = NativeApi::new(API);
        let mut ctx = Counter::default();
        let mut it = interp("move('block_id_a'); move('block_id_b');", &api);
        let (slice, _) = run_slice(&mut it, &api, &mut ctx, 100);
        assert_eq!(slice, Slice::Acted { block_id: Some("a".into()) });
        assert_eq!(ctx.moves, 1);
    }

    #[test]
    fn queries_do_not_yield() {
        let api = NativeApi::new(API);
        let mut ctx = Counter::default();
        let mut it = interp("var n = moves(); n = moves();", &api);
        let (slice, _) = run_slice(&mut it, &api, &mut ctx, 100);
        assert_eq!(slice, Slice::Exhausted);
    }

    #[test]
    fn last_action_reports_exhaustion_on_the_next_slice() {
        let api = NativeApi::new(API);
        let mut ctx = Counter::default();
        let mut it = interp("move();", &api);
        assert!(matches!(run_slice(&mut it, &api, &mut ctx, 100).0, Slice::Acted { .. }));
        assert!(!it.has_more_code());
    }

    #[test]
    fn op_allowance_pauses() {
        let api = NativeApi::new(API);
        let mut ctx = Counter::default();
        let mut it = interp("while (true) {}", &api);
        assert_eq!(run_slice(&mut it, &api, &mut ctx, 10), (Slice::Paused, 10));
    }

    #[test]
    fn marker_sets_highlight_for_next_action() {
        let api = NativeApi::new(API);
        let mut ctx = Counter::default();
        let mut it = interp("highlightBlock('block_id_z'); turn(45);", &api);
        let (slice, _) = run_slice(&mut it, &api, &mut ctx, 100);
        assert_eq!(slice, Slice::Acted { block_id: Some("z".into()) });
    }

    #[test]
    fn catalogue_rejects_duplicates() {
        assert_eq!(validate_catalogue(["a", "b"]).unwrap(), 2);
        assert!(validate_catalogue(["a", "a"]).is_err());
    }
}
