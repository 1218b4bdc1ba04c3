use std::fmt::Write as _;

/// Interned type handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TyId(pub u32);

impl TyId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TyKind {
    Void,
    /// Integer with bit width; width 1 is boolean.
    Int { bits: u8 },
    /// 32-bit float.
    Float,
    /// Fixed-size array; nests for multi-dimensional arrays.
    Array { elem: TyId, count: usize },
}

/// Module-level interned type storage.
#[derive(Debug, Default, Clone)]
pub struct TyTable {
    types: Vec<TyKind>,
}

impl TyTable {
    pub fn new() -> Self {
        Self { types: Vec::new() }
    }

    /// Intern a type, reusing an existing entry when one matches.
    pub fn add(&mut self, kind: TyKind) -> TyId {
        if let Some(idx) = self.types.iter().position(|k| *k == kind) {
            return TyId(idx as u32);
        }
        let id = TyId(self.types.len() as u32);
        self.types.push(kind);
        id
    }

    pub fn kind(&self, id: TyId) -> &TyKind {
        &self.types[id.index()]
    }

    pub fn void(&mut self) -> TyId {
        self.add(TyKind::Void)
    }

    pub fn bool_ty(&mut self) -> TyId {
        self.add(TyKind::Int { bits: 1 })
    }

    pub fn int32(&mut self) -> TyId {
        self.add(TyKind::Int { bits: 32 })
    }

    pub fn float(&mut self) -> TyId {
        self.add(TyKind::Float)
    }

    pub fn array(&mut self, elem: TyId, count: usize) -> TyId {
        self.add(TyKind::Array { elem, count })
    }

    pub fn is_array(&self, id: TyId) -> bool {
        matches!(self.kind(id), TyKind::Array { .. })
    }

    /// Byte size: array size = element size x count.
    pub fn size_of(&self, id: TyId) -> u32 {
        match self.kind(id) {
            TyKind::Void => 0,
            TyKind::Int { bits } => (*bits as u32).div_ceil(8),
            TyKind::Float => 4,
            TyKind::Array { elem, count } => self.size_of(*elem) * *count as u32,
        }
    }

    /// Element size for arrays, own size otherwise.
    pub fn elem_size(&self, id: TyId) -> u32 {
        match self.kind(id) {
            TyKind::Array { elem, .. } => self.size_of(*elem),
            _ => self.size_of(id),
        }
    }

    /// Innermost non-array type.
    pub fn base_elem(&self, id: TyId) -> TyId {
        match self.kind(id) {
            TyKind::Array { elem, .. } => self.base_elem(*elem),
            _ => id,
        }
    }

    pub fn type_to_string(&self, id: TyId) -> String {
        let mut out = String::new();
        self.write_ty(id, &mut out);
        out
    }

    fn write_ty(&self, id: TyId, out: &mut String) {
        match self.kind(id) {
            TyKind::Void => out.push_str("void"),
            TyKind::Int { bits } => {
                let _ = write!(out, "i{}", bits);
            }
            TyKind::Float => out.push_str("float"),
            TyKind::Array { elem, count } => {
                let _ = write!(out, "[{} x ", count);
                self.write_ty(*elem, out);
                out.push(']');
            }
        }
    }
}
