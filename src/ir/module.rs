use indexmap::IndexMap;

use crate::ir::function::Function;
use crate::ir::types::{TyId, TyTable};

/// A module-level variable. `init == None` places it in BSS.
#[derive(Debug, Clone)]
pub struct GlobalVar {
    pub name: String,
    pub ty: TyId,
    pub align: u32,
    pub init: Option<i32>,
}

impl GlobalVar {
    pub fn is_bss(&self) -> bool {
        self.init.is_none()
    }
}

/// Translation unit handed to the backend: interned types, ordered
/// globals, and ordered functions. Insertion order is emission order.
#[derive(Debug, Default)]
pub struct Module {
    pub types: TyTable,
    pub globals: IndexMap<String, GlobalVar>,
    pub funcs: IndexMap<String, Function>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_global(&mut self, name: &str, ty: TyId, align: u32, init: Option<i32>) {
        self.globals.insert(
            name.to_string(),
            GlobalVar {
                name: name.to_string(),
                ty,
                align,
                init,
            },
        );
    }

    pub fn add_function(&mut self, func: Function) {
        self.funcs.insert(func.name.clone(), func);
    }
}
