use std::fmt::Write as _;

use crate::ir::inst::{Inst, Opcode};
use crate::ir::types::TyId;
use crate::ir::value::{MemAddr, ValueData, ValueId, ValueKind};

/// Handle into a function's label table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelId(pub u32);

impl LabelId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A function: its linear instruction vector, the value arena the
/// instructions refer into, and the metadata the backend maintains
/// across passes.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub insts: Vec<Inst>,
    values: Vec<ValueData>,
    labels: Vec<String>,
    pub params: Vec<ValueId>,
    pub ret_value: Option<ValueId>,
    pub exit_label: Option<LabelId>,
    /// Largest argument count among this function's call sites.
    pub max_call_args: u32,
    /// Stack frame depth in bytes (spills + locals), before the
    /// outgoing-argument overflow area.
    pub max_dep: u32,
    /// Register ids the prologue must save. Seeded with FP (and LR when
    /// calling) and extended by the allocator.
    pub protected_regs: Vec<i32>,
    pub has_call: bool,
    pub is_builtin: bool,
}

impl Function {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            insts: Vec::new(),
            values: Vec::new(),
            labels: Vec::new(),
            params: Vec::new(),
            ret_value: None,
            exit_label: None,
            max_call_args: 0,
            max_dep: 0,
            protected_regs: Vec::new(),
            has_call: false,
            is_builtin: false,
        }
    }

    // --- Value arena ---

    pub fn value(&self, id: ValueId) -> &ValueData {
        &self.values[id.index()]
    }

    pub fn value_mut(&mut self, id: ValueId) -> &mut ValueData {
        &mut self.values[id.index()]
    }

    pub fn values(&self) -> &[ValueData] {
        &self.values
    }

    pub fn value_ids(&self) -> impl Iterator<Item = ValueId> {
        (0..self.values.len() as u32).map(ValueId)
    }

    fn push_value(&mut self, data: ValueData) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(data);
        id
    }

    /// Integer constants are interned per function.
    pub fn new_const_int(&mut self, v: i32, ty: TyId) -> ValueId {
        if let Some(idx) = self
            .values
            .iter()
            .position(|d| d.kind == ValueKind::ConstInt(v))
        {
            return ValueId(idx as u32);
        }
        self.push_value(ValueData::new(ValueKind::ConstInt(v), ty, format!("{}", v)))
    }

    pub fn new_const_float(&mut self, v: f32, ty: TyId) -> ValueId {
        if let Some(idx) = self
            .values
            .iter()
            .position(|d| matches!(d.kind, ValueKind::ConstFloat(f) if f.to_bits() == v.to_bits()))
        {
            return ValueId(idx as u32);
        }
        self.push_value(ValueData::new(
            ValueKind::ConstFloat(v),
            ty,
            format!("{}", v),
        ))
    }

    pub fn new_global_ref(&mut self, name: &str, ty: TyId) -> ValueId {
        if let Some(idx) = self
            .values
            .iter()
            .position(|d| d.kind == ValueKind::Global && d.name == name)
        {
            return ValueId(idx as u32);
        }
        self.push_value(ValueData::new(ValueKind::Global, ty, name.to_string()))
    }

    pub fn new_local(&mut self, ty: TyId, name: &str) -> ValueId {
        self.push_value(ValueData::new(ValueKind::Local, ty, name.to_string()))
    }

    pub fn new_param(&mut self, ty: TyId, name: &str) -> ValueId {
        let index = self.params.len() as u32;
        let id = self.push_value(ValueData::new(
            ValueKind::Param { index },
            ty,
            name.to_string(),
        ));
        self.params.push(id);
        id
    }

    pub fn new_temp(&mut self, ty: TyId, name: &str) -> ValueId {
        self.push_value(ValueData::new(ValueKind::Temp, ty, name.to_string()))
    }

    pub fn new_mem_var(&mut self, ty: TyId) -> ValueId {
        let name = format!("%m{}", self.values.len());
        self.push_value(ValueData::new(ValueKind::Mem, ty, name))
    }

    /// Binding to a fixed physical register, interned per register id.
    pub fn reg_value(&mut self, reg: i32, ty: TyId) -> ValueId {
        if let Some(idx) = self
            .values
            .iter()
            .position(|d| d.kind == ValueKind::Reg && d.reg_id == reg)
        {
            return ValueId(idx as u32);
        }
        let mut data = ValueData::new(ValueKind::Reg, ty, format!("%x{}", reg));
        data.reg_id = reg;
        self.push_value(data)
    }

    pub fn set_mem_addr(&mut self, id: ValueId, base: i32, offset: i64) {
        self.value_mut(id).mem = Some(MemAddr { base, offset });
    }

    // --- Labels ---

    pub fn new_label(&mut self) -> LabelId {
        let id = LabelId(self.labels.len() as u32);
        self.labels.push(format!(".L{}", id.0));
        id
    }

    pub fn label_name(&self, id: LabelId) -> &str {
        &self.labels[id.index()]
    }

    pub fn set_label_name(&mut self, id: LabelId, name: String) {
        self.labels[id.index()] = name;
    }

    // --- Instructions ---

    /// Append an instruction, maintaining the call-site metadata the
    /// backend depends on.
    pub fn push(&mut self, inst: Inst) {
        if inst.op == Opcode::FuncCall {
            self.has_call = true;
            self.max_call_args = self.max_call_args.max(inst.operands.len() as u32);
        }
        self.insts.push(inst);
    }

    /// Opcode of the instruction defining `id`, if `id` is a result.
    pub fn def_opcode(&self, id: ValueId) -> Option<Opcode> {
        self.insts
            .iter()
            .find(|inst| inst.result == Some(id))
            .map(|inst| inst.op)
    }

    /// One-line IR text for an instruction, used for annotation
    /// comments and diagnostics.
    pub fn inst_to_string(&self, inst: &Inst) -> String {
        let names: Vec<&str> = inst
            .operands
            .iter()
            .map(|id| self.value(*id).name.as_str())
            .collect();
        let opn = |i: usize| names.get(i).copied().unwrap_or("?");
        let mut out = String::new();
        match inst.op {
            Opcode::Entry => out.push_str("entry"),
            Opcode::Exit => {
                out.push_str("exit");
                if !inst.operands.is_empty() {
                    let _ = write!(out, " {}", opn(0));
                }
            }
            Opcode::Label => {
                if let Some(l) = inst.target {
                    let _ = write!(out, "label {}", self.label_name(l));
                }
            }
            Opcode::Goto => match (inst.operands.first(), inst.target, inst.alt_target) {
                (Some(_), Some(t), Some(f)) => {
                    let _ = write!(
                        out,
                        "bc {}, label {}, label {}",
                        opn(0),
                        self.label_name(t),
                        self.label_name(f)
                    );
                }
                (_, Some(t), _) => {
                    let _ = write!(out, "goto {}", self.label_name(t));
                }
                _ => out.push_str("goto ?"),
            },
            Opcode::Assign => {
                let _ = write!(out, "{} = {}", opn(0), opn(1));
            }
            Opcode::FuncCall => {
                if let Some(res) = inst.result {
                    let _ = write!(out, "{} = ", self.value(res).name);
                }
                let _ = write!(out, "call {}(", inst.callee.as_deref().unwrap_or("?"));
                for i in 0..inst.operands.len() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(opn(i));
                }
                out.push(')');
            }
            Opcode::Arg => {
                let _ = write!(out, "arg {}", opn(0));
            }
            Opcode::Store => {
                let _ = write!(out, "store {}, {}", opn(1), opn(0));
            }
            Opcode::Load => {
                if let Some(res) = inst.result {
                    let _ = write!(out, "{} = load {}", self.value(res).name, opn(0));
                }
            }
            Opcode::Cast => {
                if let Some(res) = inst.result {
                    let _ = write!(out, "{} = cast {}", self.value(res).name, opn(0));
                }
            }
            op => {
                let mnemonic = match op {
                    Opcode::IAdd => "add",
                    Opcode::ISub => "sub",
                    Opcode::IMul => "mul",
                    Opcode::IDiv => "div",
                    Opcode::IMod => "mod",
                    Opcode::IEq => "icmp eq",
                    Opcode::INe => "icmp ne",
                    Opcode::IGt => "icmp gt",
                    Opcode::ILe => "icmp le",
                    Opcode::IGe => "icmp ge",
                    Opcode::ILt => "icmp lt",
                    Opcode::FAdd => "fadd",
                    Opcode::FSub => "fsub",
                    Opcode::FMul => "fmul",
                    Opcode::FDiv => "fdiv",
                    Opcode::FMod => "fmod",
                    Opcode::FEq => "fcmp eq",
                    Opcode::FNe => "fcmp ne",
                    Opcode::FGt => "fcmp gt",
                    Opcode::FGe => "fcmp ge",
                    Opcode::FLt => "fcmp lt",
                    Opcode::FLe => "fcmp le",
                    Opcode::Xor => "xor",
                    Opcode::Gep => "getelemptr",
                    _ => "?",
                };
                if let Some(res) = inst.result {
                    let _ = write!(out, "{} = ", self.value(res).name);
                }
                let _ = write!(out, "{} {}, {}", mnemonic, opn(0), opn(1));
            }
        }
        out
    }
}
