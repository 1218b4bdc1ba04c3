pub mod calls;
pub mod codegen;
pub mod iloc;
pub mod isel;
pub mod platform;
pub mod regalloc;
pub mod scratch;

pub use codegen::{CodeGenerator, CodegenOptions};
