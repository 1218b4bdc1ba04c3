use crate::ir::function::LabelId;
use crate::ir::value::ValueId;

/// IR opcodes. The integer comparisons must stay in this declaration
/// order: the condition table is indexed by distance from `IEq`, and
/// the complement of a condition is found by flipping the low ordinal
/// bit (eq/ne, gt/le, ge/lt).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Entry,
    Exit,
    Label,
    Goto,
    IAdd,
    ISub,
    IMul,
    IDiv,
    IMod,
    IEq,
    INe,
    IGt,
    ILe,
    IGe,
    ILt,
    FAdd,
    FSub,
    FMul,
    FDiv,
    FMod,
    FEq,
    FNe,
    FGt,
    FGe,
    FLt,
    FLe,
    Xor,
    Assign,
    Cast,
    FuncCall,
    Arg,
    Gep,
    Store,
    Load,
}

impl Opcode {
    pub fn is_int_cmp(self) -> bool {
        matches!(
            self,
            Opcode::IEq | Opcode::INe | Opcode::IGt | Opcode::ILe | Opcode::IGe | Opcode::ILt
        )
    }

    /// Ordinal within the integer comparison group.
    pub fn cmp_ordinal(self) -> usize {
        self as usize - Opcode::IEq as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastKind {
    IntToFloat,
    FloatToInt,
    BoolToInt,
    IntToBool,
}

/// One linear IR instruction: opcode, ordered operands, optional result
/// value, and a dead flag that suppresses emission.
#[derive(Debug, Clone)]
pub struct Inst {
    pub op: Opcode,
    pub operands: Vec<ValueId>,
    pub result: Option<ValueId>,
    pub dead: bool,
    /// Defined label for `Label`, if-true target for `Goto`.
    pub target: Option<LabelId>,
    /// If-false target for a conditional `Goto`.
    pub alt_target: Option<LabelId>,
    pub cast: Option<CastKind>,
    pub callee: Option<String>,
}

impl Inst {
    fn bare(op: Opcode) -> Self {
        Self {
            op,
            operands: Vec::new(),
            result: None,
            dead: false,
            target: None,
            alt_target: None,
            cast: None,
            callee: None,
        }
    }

    pub fn entry() -> Self {
        Self::bare(Opcode::Entry)
    }

    pub fn exit(ret: Option<ValueId>) -> Self {
        let mut inst = Self::bare(Opcode::Exit);
        inst.operands.extend(ret);
        inst
    }

    pub fn label(label: LabelId) -> Self {
        let mut inst = Self::bare(Opcode::Label);
        inst.target = Some(label);
        inst
    }

    pub fn goto(target: LabelId) -> Self {
        let mut inst = Self::bare(Opcode::Goto);
        inst.target = Some(target);
        inst
    }

    pub fn goto_cond(cond: ValueId, if_true: LabelId, if_false: LabelId) -> Self {
        let mut inst = Self::bare(Opcode::Goto);
        inst.operands.push(cond);
        inst.target = Some(if_true);
        inst.alt_target = Some(if_false);
        inst
    }

    /// Move `src` into `dst`. The destination is operand 0.
    pub fn assign(dst: ValueId, src: ValueId) -> Self {
        let mut inst = Self::bare(Opcode::Assign);
        inst.operands.push(dst);
        inst.operands.push(src);
        inst
    }

    pub fn binary(op: Opcode, result: ValueId, lhs: ValueId, rhs: ValueId) -> Self {
        let mut inst = Self::bare(op);
        inst.operands.push(lhs);
        inst.operands.push(rhs);
        inst.result = Some(result);
        inst
    }

    pub fn call(callee: &str, args: Vec<ValueId>, result: Option<ValueId>) -> Self {
        let mut inst = Self::bare(Opcode::FuncCall);
        inst.operands = args;
        inst.result = result;
        inst.callee = Some(callee.to_string());
        inst
    }

    pub fn arg(value: ValueId) -> Self {
        let mut inst = Self::bare(Opcode::Arg);
        inst.operands.push(value);
        inst
    }

    pub fn gep(result: ValueId, base: ValueId, index: ValueId) -> Self {
        let mut inst = Self::bare(Opcode::Gep);
        inst.operands.push(base);
        inst.operands.push(index);
        inst.result = Some(result);
        inst
    }

    pub fn store(ptr: ValueId, value: ValueId) -> Self {
        let mut inst = Self::bare(Opcode::Store);
        inst.operands.push(ptr);
        inst.operands.push(value);
        inst
    }

    pub fn load(result: ValueId, ptr: ValueId) -> Self {
        let mut inst = Self::bare(Opcode::Load);
        inst.operands.push(ptr);
        inst.result = Some(result);
        inst
    }

    pub fn cast(result: ValueId, kind: CastKind, src: ValueId) -> Self {
        let mut inst = Self::bare(Opcode::Cast);
        inst.operands.push(src);
        inst.result = Some(result);
        inst.cast = Some(kind);
        inst
    }
}
