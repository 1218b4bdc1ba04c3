pub mod function;
pub mod inst;
pub mod module;
pub mod types;
pub mod value;

pub use function::{Function, LabelId};
pub use inst::{CastKind, Inst, Opcode};
pub use module::{GlobalVar, Module};
pub use types::{TyId, TyKind, TyTable};
pub use value::{MemAddr, ValueData, ValueId, ValueKind};
