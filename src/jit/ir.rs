//! Typed SSA intermediate representation (`SPEC_FULL.md` §4.4).
//!
//! Grounded on `examples/original_source/src/jit/ir/ir.c` (the "second IR generation" named in
//! `SPEC_FULL.md` §9 — blocks, values, and instructions out of a bump arena with explicit
//! use-lists, as opposed to the legacy recording builder in `jit/backend/x64/`).

use std::collections::HashMap;

pub const IR_MAX_ARGS: usize = 4;
pub const NO_REGISTER: u8 = 0xff;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstrId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ty {
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    V128,
    Block,
    Str,
    Ptr,
}

impl Ty {
    pub fn is_float(self) -> bool {
        matches!(self, Ty::F32 | Ty::F64 | Ty::V128)
    }

    pub fn is_int(self) -> bool {
        matches!(self, Ty::I8 | Ty::I16 | Ty::I32 | Ty::I64)
    }

    pub fn byte_size(self) -> u32 {
        match self {
            Ty::I8 => 1,
            Ty::I16 => 2,
            Ty::I32 | Ty::F32 => 4,
            Ty::I64 | Ty::F64 => 8,
            Ty::V128 => 16,
            Ty::Block | Ty::Str | Ty::Ptr => 8,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Ty::I8 => "i8",
            Ty::I16 => "i16",
            Ty::I32 => "i32",
            Ty::I64 => "i64",
            Ty::F32 => "f32",
            Ty::F64 => "f64",
            Ty::V128 => "v128",
            Ty::Block => "block",
            Ty::Str => "str",
            Ty::Ptr => "ptr",
        }
    }

    fn parse(s: &str) -> Option<Ty> {
        Some(match s {
            "i8" => Ty::I8,
            "i16" => Ty::I16,
            "i32" => Ty::I32,
            "i64" => Ty::I64,
            "f32" => Ty::F32,
            "f64" => Ty::F64,
            "v128" => Ty::V128,
            "block" => Ty::Block,
            "str" => Ty::Str,
            "ptr" => Ty::Ptr,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Opcode {
    LoadCtx,
    StoreCtx,
    LoadLocal,
    StoreLocal,
    LoadFast,
    LoadSlow,
    StoreFast,
    StoreSlow,
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Xor,
    Not,
    Shl,
    Shr,
    Sar,
    Ashd,
    Lshd,
    Cmp(CmpKind),
    Sext,
    Zext,
    Trunc,
    FtoI,
    ItoF,
    FExt,
    FTrunc,
    Bitcast,
    VBroadcast,
    VAdd,
    VMul,
    VDot,
    Branch,
    BranchCond,
    Call,
    CallSideEffect,
    DebugInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpKind {
    EqI,
    NeI,
    LtS,
    LtU,
    LeS,
    LeU,
    EqF,
    NeF,
    LtF,
    LeF,
}

/// Opcodes that cross a call boundary: every caller-saved temporary live across one must be
/// spilled (`SPEC_FULL.md` §4.4, allocator step 4, call sites).
pub fn is_call(op: Opcode) -> bool {
    matches!(op, Opcode::Call | Opcode::CallSideEffect)
}

/// SH-4 dynamic arithmetic shift, mirroring the x64 backend's `ASHD` emitter
/// (`examples/original_source/src/jit/backend/x64/x64_emitter.cc`'s `EMITTER(ASHD)`): `n`'s
/// sign bit selects direction (clear: shift left, set: shift right) and the magnitude is taken
/// from `n`'s low 5 bits; a right shift with those 5 bits all zero is the full-width-shift
/// overflow case, saturating to `v`'s sign bit rather than a no-op.
pub fn eval_ashd(v: i32, n: i32) -> i32 {
    if (n as u32) & 0x8000_0000 == 0 {
        v.wrapping_shl((n as u32) & 0x1f)
    } else {
        let mag = (n as u32) & 0x1f;
        if mag == 0 {
            v >> 31
        } else {
            v >> (32 - mag)
        }
    }
}

/// SH-4 dynamic logical shift (`EMITTER(LSHD)`): same direction/magnitude decoding as
/// [`eval_ashd`], but the right-shift overflow case yields zero instead of a sign-extended fill.
pub fn eval_lshd(v: u32, n: i32) -> u32 {
    if (n as u32) & 0x8000_0000 == 0 {
        v.wrapping_shl((n as u32) & 0x1f)
    } else {
        let mag = (n as u32) & 0x1f;
        if mag == 0 {
            0
        } else {
            v >> (32 - mag)
        }
    }
}

#[derive(Debug, Clone)]
pub enum ConstPayload {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Block(BlockId),
    Ptr(u64),
    Str(String),
}

pub enum ValueKind {
    Const(ConstPayload),
    Instr(InstrId),
}

pub struct Value {
    pub ty: Ty,
    pub kind: ValueKind,
    pub reg: u8,
    pub uses: Vec<(InstrId, u8)>,
}

pub struct Instr {
    pub op: Opcode,
    pub args: [Option<ValueId>; IR_MAX_ARGS],
    pub result: Option<ValueId>,
    pub block: BlockId,
}

#[derive(Default)]
pub struct Block {
    pub instrs: Vec<InstrId>,
    pub preds: Vec<BlockId>,
    pub succs: Vec<BlockId>,
    /// Bump offset for this block's local (spill) slots, in bytes.
    pub local_cursor: u32,
}

/// Bump-allocated IR function. Values and instructions are appended and never individually
/// freed; the allocator below mutates `Value::reg` and inserts synthetic fill/spill
/// instructions in place.
pub struct IrFunction {
    pub values: Vec<Value>,
    pub instrs: Vec<Instr>,
    pub blocks: Vec<Block>,
    current_block: BlockId,
}

impl IrFunction {
    pub fn new() -> Self {
        let mut f = IrFunction {
            values: Vec::new(),
            instrs: Vec::new(),
            blocks: Vec::new(),
            current_block: BlockId(0),
        };
        f.blocks.push(Block::default());
        f
    }

    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block::default());
        id
    }

    pub fn set_current_block(&mut self, block: BlockId) {
        self.current_block = block;
    }

    fn push_const(&mut self, ty: Ty, payload: ConstPayload) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(Value {
            ty,
            kind: ValueKind::Const(payload),
            reg: NO_REGISTER,
            uses: Vec::new(),
        });
        id
    }

    pub fn alloc_i8(&mut self, v: i8) -> ValueId {
        self.push_const(Ty::I8, ConstPayload::I8(v))
    }
    pub fn alloc_i16(&mut self, v: i16) -> ValueId {
        self.push_const(Ty::I16, ConstPayload::I16(v))
    }
    pub fn alloc_i32(&mut self, v: i32) -> ValueId {
        self.push_const(Ty::I32, ConstPayload::I32(v))
    }
    pub fn alloc_i64(&mut self, v: i64) -> ValueId {
        self.push_const(Ty::I64, ConstPayload::I64(v))
    }
    pub fn alloc_f32(&mut self, v: f32) -> ValueId {
        self.push_const(Ty::F32, ConstPayload::F32(v))
    }
    pub fn alloc_f64(&mut self, v: f64) -> ValueId {
        self.push_const(Ty::F64, ConstPayload::F64(v))
    }
    pub fn alloc_block_ref(&mut self, block: BlockId) -> ValueId {
        self.push_const(Ty::Block, ConstPayload::Block(block))
    }

    /// Allocates a raw host-pointer constant (guest-context field addresses, jump targets
    /// resolved at emit time).
    pub fn alloc_ptr(&mut self, v: u64) -> ValueId {
        self.push_const(Ty::Ptr, ConstPayload::Ptr(v))
    }

    /// Allocates a symbolic-label constant, used by call/branch targets that are resolved by
    /// name rather than by a known `BlockId` at build time.
    pub fn alloc_str(&mut self, v: impl Into<String>) -> ValueId {
        self.push_const(Ty::Str, ConstPayload::Str(v.into()))
    }

    /// Allocates a local (spill) slot in `block`, bumping its cursor aligned to `ty`'s size.
    pub fn alloc_local(&mut self, block: BlockId, ty: Ty) -> u32 {
        let b = &mut self.blocks[block.0 as usize];
        let size = ty.byte_size();
        b.local_cursor = (b.local_cursor + size - 1) / size * size;
        let offset = b.local_cursor;
        b.local_cursor += size;
        offset
    }

    /// Aliases an existing local-slot `offset` with a different `ty`, without bumping the
    /// block's cursor or allocating new space — the slot already reserved by `alloc_local` is
    /// reinterpreted at a different width (e.g. a spilled i64 reloaded a half at a time).
    pub fn reuse_local(&self, offset: u32, ty: Ty) -> u32 {
        debug_assert_eq!(offset % ty.byte_size(), 0, "reuse_local offset misaligned for {:?}", ty);
        offset
    }

    /// Appends an instruction to the current block. `result_ty` of `None` means this op has no
    /// result value (stores, branches).
    pub fn append_instr(&mut self, op: Opcode, args: [Option<ValueId>; IR_MAX_ARGS], result_ty: Option<Ty>) -> InstrId {
        let block = self.current_block;
        let instr_id = InstrId(self.instrs.len() as u32);

        let result = result_ty.map(|ty| {
            let id = ValueId(self.values.len() as u32);
            self.values.push(Value {
                ty,
                kind: ValueKind::Instr(instr_id),
                reg: NO_REGISTER,
                uses: Vec::new(),
            });
            id
        });

        for (i, arg) in args.iter().enumerate() {
            if let Some(v) = arg {
                self.values[v.0 as usize].uses.push((instr_id, i as u8));
            }
        }

        self.instrs.push(Instr { op, args, result, block });
        self.blocks[block.0 as usize].instrs.push(instr_id);
        instr_id
    }

    /// Rewrites argument `i` of `instr`, maintaining use-lists by removing the stale entry and
    /// recording the new one (`SPEC_FULL.md` §4.4, "replace-in-place").
    pub fn set_arg(&mut self, instr: InstrId, i: usize, new_value: ValueId) {
        let old = self.instrs[instr.0 as usize].args[i];
        if let Some(old) = old {
            let uses = &mut self.values[old.0 as usize].uses;
            if let Some(pos) = uses.iter().position(|&(inst, idx)| inst == instr && idx == i as u8) {
                uses.remove(pos);
            }
        }
        self.instrs[instr.0 as usize].args[i] = Some(new_value);
        self.values[new_value.0 as usize].uses.push((instr, i as u8));
    }

    /// Appends a dynamic arithmetic shift (`SPEC_FULL.md` §4.4, "shifts take an i32 count"):
    /// `a`'s sign determines direction and the magnitude is masked to 5 bits at runtime (see
    /// [`eval_ashd`]). Fatal if `n` is not typed `i32`.
    pub fn append_ashd(&mut self, a: ValueId, n: ValueId) -> InstrId {
        assert_eq!(self.values[n.0 as usize].ty, Ty::I32, "ashd count must be i32");
        let ty = self.values[a.0 as usize].ty;
        assert!(ty.is_int(), "ashd operand must be an integer type");
        self.append_instr(Opcode::Ashd, [Some(a), Some(n), None, None], Some(ty))
    }

    /// Appends a dynamic logical shift. See [`eval_lshd`] for the runtime semantics this opcode
    /// evaluates to.
    pub fn append_lshd(&mut self, a: ValueId, n: ValueId) -> InstrId {
        assert_eq!(self.values[n.0 as usize].ty, Ty::I32, "lshd count must be i32");
        let ty = self.values[a.0 as usize].ty;
        assert!(ty.is_int(), "lshd operand must be an integer type");
        self.append_instr(Opcode::Lshd, [Some(a), Some(n), None, None], Some(ty))
    }
}

/// Renders one instruction as `%N = OP <ty> arg0, arg1, ...` (or without the `%N =` prefix when
/// it has no result), matching the textual form in `SPEC_FULL.md` §4.4.1. `<ty>` is the result's
/// type, or, for a result-less instruction, the first argument's type (`void` if there is none).
pub fn format_instr(f: &IrFunction, id: InstrId) -> String {
    let instr = &f.instrs[id.0 as usize];
    let args: Vec<String> = instr
        .args
        .iter()
        .flatten()
        .map(|v| format_value(f, *v))
        .collect();
    let ty_token = match instr_ty(f, instr) {
        Some(ty) => ty.name(),
        None => "void",
    };
    let op_name = opcode_name(instr.op);
    match instr.result {
        Some(r) => format!("%{} = {} {} {}", r.0, op_name, ty_token, args.join(", ")),
        None => format!("{} {} {}", op_name, ty_token, args.join(", ")),
    }
}

fn instr_ty(f: &IrFunction, instr: &Instr) -> Option<Ty> {
    if let Some(r) = instr.result {
        return Some(f.values[r.0 as usize].ty);
    }
    instr.args.iter().flatten().next().map(|v| f.values[v.0 as usize].ty)
}

fn format_value(f: &IrFunction, id: ValueId) -> String {
    match &f.values[id.0 as usize].kind {
        ValueKind::Const(ConstPayload::I32(v)) => format!("i32 {}", v),
        ValueKind::Const(ConstPayload::I64(v)) => format!("i64 {}", v),
        ValueKind::Const(ConstPayload::F32(v)) => format!("f32 {}", v),
        ValueKind::Const(ConstPayload::F64(v)) => format!("f64 {}", v),
        ValueKind::Const(ConstPayload::I8(v)) => format!("i8 {}", v),
        ValueKind::Const(ConstPayload::I16(v)) => format!("i16 {}", v),
        ValueKind::Const(ConstPayload::Block(b)) => format!("block {}", b.0),
        ValueKind::Const(ConstPayload::Ptr(v)) => format!("ptr {:#x}", v),
        ValueKind::Const(ConstPayload::Str(s)) => format!("str \"{}\"", s),
        ValueKind::Instr(_) => format!("%{}", id.0),
    }
}

fn opcode_name(op: Opcode) -> String {
    if let Opcode::Cmp(kind) = op {
        return format!("cmp.{}", cmp_kind_name(kind));
    }
    match op {
        Opcode::LoadCtx => "load_ctx",
        Opcode::StoreCtx => "store_ctx",
        Opcode::LoadLocal => "load_local",
        Opcode::StoreLocal => "store_local",
        Opcode::LoadFast => "load_fast",
        Opcode::LoadSlow => "load_slow",
        Opcode::StoreFast => "store_fast",
        Opcode::StoreSlow => "store_slow",
        Opcode::Add => "add",
        Opcode::Sub => "sub",
        Opcode::Mul => "mul",
        Opcode::Div => "div",
        Opcode::And => "and",
        Opcode::Or => "or",
        Opcode::Xor => "xor",
        Opcode::Not => "not",
        Opcode::Shl => "shl",
        Opcode::Shr => "shr",
        Opcode::Sar => "sar",
        Opcode::Ashd => "ashd",
        Opcode::Lshd => "lshd",
        Opcode::Cmp(_) => unreachable!(),
        Opcode::Sext => "sext",
        Opcode::Zext => "zext",
        Opcode::Trunc => "trunc",
        Opcode::FtoI => "ftoi",
        Opcode::ItoF => "itof",
        Opcode::FExt => "fext",
        Opcode::FTrunc => "ftrunc",
        Opcode::Bitcast => "bitcast",
        Opcode::VBroadcast => "vbroadcast",
        Opcode::VAdd => "vadd",
        Opcode::VMul => "vmul",
        Opcode::VDot => "vdot",
        Opcode::Branch => "branch",
        Opcode::BranchCond => "branch_cond",
        Opcode::Call => "call",
        Opcode::CallSideEffect => "call_side_effect",
        Opcode::DebugInfo => "debug_info",
    }
    .to_string()
}

fn cmp_kind_name(k: CmpKind) -> &'static str {
    match k {
        CmpKind::EqI => "eqi",
        CmpKind::NeI => "nei",
        CmpKind::LtS => "lts",
        CmpKind::LtU => "ltu",
        CmpKind::LeS => "les",
        CmpKind::LeU => "leu",
        CmpKind::EqF => "eqf",
        CmpKind::NeF => "nef",
        CmpKind::LtF => "ltf",
        CmpKind::LeF => "lef",
    }
}

fn parse_opcode(s: &str) -> Option<Opcode> {
    if let Some(rest) = s.strip_prefix("cmp.") {
        let kind = match rest {
            "eqi" => CmpKind::EqI,
            "nei" => CmpKind::NeI,
            "lts" => CmpKind::LtS,
            "ltu" => CmpKind::LtU,
            "les" => CmpKind::LeS,
            "leu" => CmpKind::LeU,
            "eqf" => CmpKind::EqF,
            "nef" => CmpKind::NeF,
            "ltf" => CmpKind::LtF,
            "lef" => CmpKind::LeF,
            _ => return None,
        };
        return Some(Opcode::Cmp(kind));
    }
    Some(match s {
        "load_ctx" => Opcode::LoadCtx,
        "store_ctx" => Opcode::StoreCtx,
        "load_local" => Opcode::LoadLocal,
        "store_local" => Opcode::StoreLocal,
        "load_fast" => Opcode::LoadFast,
        "load_slow" => Opcode::LoadSlow,
        "store_fast" => Opcode::StoreFast,
        "store_slow" => Opcode::StoreSlow,
        "add" => Opcode::Add,
        "sub" => Opcode::Sub,
        "mul" => Opcode::Mul,
        "div" => Opcode::Div,
        "and" => Opcode::And,
        "or" => Opcode::Or,
        "xor" => Opcode::Xor,
        "not" => Opcode::Not,
        "shl" => Opcode::Shl,
        "shr" => Opcode::Shr,
        "sar" => Opcode::Sar,
        "ashd" => Opcode::Ashd,
        "lshd" => Opcode::Lshd,
        "sext" => Opcode::Sext,
        "zext" => Opcode::Zext,
        "trunc" => Opcode::Trunc,
        "ftoi" => Opcode::FtoI,
        "itof" => Opcode::ItoF,
        "fext" => Opcode::FExt,
        "ftrunc" => Opcode::FTrunc,
        "bitcast" => Opcode::Bitcast,
        "vbroadcast" => Opcode::VBroadcast,
        "vadd" => Opcode::VAdd,
        "vmul" => Opcode::VMul,
        "vdot" => Opcode::VDot,
        "branch" => Opcode::Branch,
        "branch_cond" => Opcode::BranchCond,
        "call" => Opcode::Call,
        "call_side_effect" => Opcode::CallSideEffect,
        "debug_info" => Opcode::DebugInfo,
        _ => return None,
    })
}

/// Serializes an entire function: one `block N:` header per block followed by its instructions
/// in program order, each rendered via [`format_instr`] and indented two spaces.
pub fn write(f: &IrFunction) -> String {
    let mut out = String::new();
    for (i, block) in f.blocks.iter().enumerate() {
        out.push_str(&format!("block {}:\n", i));
        for &instr_id in &block.instrs {
            out.push_str("  ");
            out.push_str(&format_instr(f, instr_id));
            out.push('\n');
        }
    }
    out
}

/// Parses text produced by [`write`] back into a fresh [`IrFunction`] (`SPEC_FULL.md` §4.4.1,
/// §8 invariant 7). Values are renumbered in allocation order rather than preserving the
/// original `%N` labels, so the round-trip this reader/writer pair guarantees is
/// `write(parse(text)) == text` only up to that slot renumbering (which is a no-op whenever
/// `text` was itself produced by `write`, since both number results in definition order) and
/// incidental whitespace.
pub fn parse(text: &str) -> IrFunction {
    let mut f = IrFunction::new();
    let mut slots: HashMap<u32, ValueId> = HashMap::new();
    let mut blocks_seen = 0u32;

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix("block ") {
            let n: u32 = rest.trim_end_matches(':').parse().expect("malformed block header");
            if n == 0 {
                f.set_current_block(BlockId(0));
            } else {
                let id = f.new_block();
                assert_eq!(id.0, n, "IR text blocks must appear in ascending order");
                f.set_current_block(id);
            }
            blocks_seen += 1;
            continue;
        }
        parse_instr_line(&mut f, line, &mut slots);
    }
    let _ = blocks_seen;
    f
}

fn parse_instr_line(f: &mut IrFunction, line: &str, slots: &mut HashMap<u32, ValueId>) {
    let (result_slot, rest) = match line.find(" = ") {
        Some(eq) => (Some(line[1..eq].parse::<u32>().expect("malformed result slot")), &line[eq + 3..]),
        None => (None, line),
    };

    let mut parts = rest.splitn(3, ' ');
    let op_name = parts.next().expect("missing opcode");
    let ty_token = parts.next().expect("missing type");
    let args_str = parts.next().unwrap_or("").trim();

    let op = parse_opcode(op_name).unwrap_or_else(|| panic!("unknown opcode `{}`", op_name));
    let mut arg_array: [Option<ValueId>; IR_MAX_ARGS] = [None; IR_MAX_ARGS];
    if !args_str.is_empty() {
        for (i, tok) in args_str.split(", ").enumerate() {
            arg_array[i] = Some(parse_arg(f, tok, slots));
        }
    }

    let result_ty = if result_slot.is_some() && ty_token != "void" {
        Some(Ty::parse(ty_token).unwrap_or_else(|| panic!("unknown type `{}`", ty_token)))
    } else {
        None
    };

    let instr_id = f.append_instr(op, arg_array, result_ty);
    if let (Some(slot), Some(r)) = (result_slot, f.instrs[instr_id.0 as usize].result) {
        slots.insert(slot, r);
    }
}

fn parse_arg(f: &mut IrFunction, tok: &str, slots: &HashMap<u32, ValueId>) -> ValueId {
    if let Some(slot_str) = tok.strip_prefix('%') {
        let slot: u32 = slot_str.parse().expect("malformed value reference");
        return *slots.get(&slot).unwrap_or_else(|| panic!("undefined value %{}", slot));
    }
    let (ty_tok, lit) = tok.split_once(' ').expect("malformed constant argument");
    match ty_tok {
        "i8" => f.alloc_i8(lit.parse().expect("bad i8 literal")),
        "i16" => f.alloc_i16(lit.parse().expect("bad i16 literal")),
        "i32" => f.alloc_i32(lit.parse().expect("bad i32 literal")),
        "i64" => f.alloc_i64(lit.parse().expect("bad i64 literal")),
        "f32" => f.alloc_f32(lit.parse().expect("bad f32 literal")),
        "f64" => f.alloc_f64(lit.parse().expect("bad f64 literal")),
        "block" => f.alloc_block_ref(BlockId(lit.parse().expect("bad block literal"))),
        "ptr" => {
            let v = match lit.strip_prefix("0x") {
                Some(hex) => u64::from_str_radix(hex, 16).expect("bad ptr literal"),
                None => lit.parse().expect("bad ptr literal"),
            };
            f.alloc_ptr(v)
        }
        "str" => f.alloc_str(lit.trim_matches('"').to_string()),
        other => panic!("unknown constant type `{}`", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_instr_links_use_lists() {
        let mut f = IrFunction::new();
        let c1 = f.alloc_i32(1);
        let c2 = f.alloc_i32(2);
        let add = f.append_instr(Opcode::Add, [Some(c1), Some(c2), None, None], Some(Ty::I32));
        assert_eq!(f.values[c1.0 as usize].uses, vec![(add, 0)]);
        assert_eq!(f.values[c2.0 as usize].uses, vec![(add, 1)]);
    }

    #[test]
    fn set_arg_moves_use_list_entry() {
        let mut f = IrFunction::new();
        let c1 = f.alloc_i32(1);
        let c2 = f.alloc_i32(2);
        let c3 = f.alloc_i32(3);
        let add = f.append_instr(Opcode::Add, [Some(c1), Some(c2), None, None], Some(Ty::I32));
        f.set_arg(add, 0, c3);
        assert!(f.values[c1.0 as usize].uses.is_empty());
        assert_eq!(f.values[c3.0 as usize].uses, vec![(add, 0)]);
    }

    #[test]
    fn alloc_local_aligns_to_type_size() {
        let mut f = IrFunction::new();
        let b = BlockId(0);
        let a = f.alloc_local(b, Ty::I8);
        let c = f.alloc_local(b, Ty::I64);
        assert_eq!(a, 0);
        assert_eq!(c % 8, 0);
    }

    #[test]
    fn reuse_local_aliases_without_bumping_cursor() {
        let mut f = IrFunction::new();
        let b = BlockId(0);
        let offset = f.alloc_local(b, Ty::I64);
        let cursor_before = f.blocks[0].local_cursor;
        let reused = f.reuse_local(offset, Ty::I32);
        assert_eq!(reused, offset);
        assert_eq!(f.blocks[0].local_cursor, cursor_before);
    }

    #[test]
    fn alloc_ptr_and_alloc_str_round_trip_through_text() {
        let mut f = IrFunction::new();
        let p = f.alloc_ptr(0x1000);
        f.append_instr(Opcode::LoadCtx, [Some(p), None, None, None], Some(Ty::I32));
        let s = f.alloc_str("handler");
        f.append_instr(Opcode::Call, [Some(s), None, None, None], None);
        let text = write(&f);
        assert!(text.contains("ptr 0x1000"));
        assert!(text.contains("str \"handler\""));

        let reparsed = parse(&text);
        assert_eq!(write(&reparsed), text);
    }

    #[test]
    fn ir_text_round_trips_through_parse_and_write() {
        let mut f = IrFunction::new();
        let c1 = f.alloc_i32(1);
        let c2 = f.alloc_i32(2);
        f.append_instr(Opcode::Add, [Some(c1), Some(c2), None, None], Some(Ty::I32));
        let text = write(&f);
        let reparsed = parse(&text);
        assert_eq!(write(&reparsed), text);
    }

    #[test]
    fn ashd_matches_sh4_dynamic_shift_semantics() {
        // `SPEC_FULL.md` §8 concrete scenario "Dynamic shift semantics".
        assert_eq!(eval_ashd(i32::MIN, -31), -1);
        assert_eq!(eval_ashd(i32::MIN, 0x8000_0000u32 as i32), -1);
    }

    #[test]
    fn lshd_matches_sh4_dynamic_shift_semantics() {
        assert_eq!(eval_lshd(1, 31), 0x8000_0000);
    }

    #[test]
    fn lshd_right_shift_overflow_yields_zero_not_sign_fill() {
        // Same overflow case as `ashd`'s (count magnitude masked to zero, direction bit set),
        // but the logical shift fills with zero instead of sign-extending.
        assert_eq!(eval_lshd(0x8000_0000, 0x8000_0000u32 as i32), 0);
        assert_eq!(eval_ashd(i32::MIN, 0x8000_0000u32 as i32), -1);
    }

    #[test]
    #[should_panic(expected = "ashd count must be i32")]
    fn append_ashd_requires_i32_count() {
        let mut f = IrFunction::new();
        let v = f.alloc_i32(1);
        let bad_count = f.alloc_i64(5);
        f.append_ashd(v, bad_count);
    }
}
