use crate::ir::types::TyId;

/// Handle into a function's value arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId(pub u32);

impl ValueId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    ConstInt(i32),
    ConstFloat(f32),
    /// Reference to a module-level symbol; the value's name is the symbol.
    Global,
    /// Stack-resident local variable.
    Local,
    /// Formal parameter with its position in the signature.
    Param { index: u32 },
    /// Instruction result.
    Temp,
    /// Binding to a fixed physical register.
    Reg,
    /// Synthesized memory-resident variable (call argument staging).
    Mem,
}

/// Base register + signed byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemAddr {
    pub base: i32,
    pub offset: i64,
}

/// An abstract operand. Register id and memory address are written by
/// the allocator (or the parameter rewriter) and are read-only during
/// instruction selection.
#[derive(Debug, Clone)]
pub struct ValueData {
    pub kind: ValueKind,
    pub ty: TyId,
    pub name: String,
    /// -1 means not register-resident.
    pub reg_id: i32,
    pub mem: Option<MemAddr>,
}

impl ValueData {
    pub fn new(kind: ValueKind, ty: TyId, name: String) -> Self {
        Self {
            kind,
            ty,
            name,
            reg_id: -1,
            mem: None,
        }
    }

    pub fn is_const(&self) -> bool {
        matches!(self.kind, ValueKind::ConstInt(_) | ValueKind::ConstFloat(_))
    }

    pub fn as_const_int(&self) -> Option<i32> {
        match self.kind {
            ValueKind::ConstInt(v) => Some(v),
            _ => None,
        }
    }
}
