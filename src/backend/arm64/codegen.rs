//! Module driver: assembly header, data section, and per-function code
//! sections on a caller-provided output stream.

use std::io::Write;

use crate::backend::arm64::iloc::ILoc;
use crate::backend::arm64::isel::InstSelector;
use crate::backend::arm64::platform::reg_name;
use crate::backend::arm64::regalloc;
use crate::backend::arm64::scratch::ScratchAllocator;
use crate::diag::CodegenError;
use crate::ir::{LabelId, Module, Opcode, ValueKind};

#[derive(Debug, Default, Clone, Copy)]
pub struct CodegenOptions {
    /// Annotate the output with IR text and value locations.
    pub show_linear_ir: bool,
    /// Serialize empty buffer lines as blank output lines.
    pub emit_blank_lines: bool,
}

pub struct CodeGenerator<'a, W: Write> {
    module: &'a mut Module,
    out: W,
    opts: CodegenOptions,
    /// Module-global label counter: label names must be unique across
    /// functions, not merely within one.
    label_index: u32,
}

impl<'a, W: Write> CodeGenerator<'a, W> {
    pub fn new(module: &'a mut Module, out: W) -> Self {
        Self::with_options(module, out, CodegenOptions::default())
    }

    pub fn with_options(module: &'a mut Module, out: W, opts: CodegenOptions) -> Self {
        Self {
            module,
            out,
            opts,
            label_index: 0,
        }
    }

    /// Header, data section, then one code section per function.
    pub fn run(&mut self) -> Result<(), CodegenError> {
        self.gen_header()?;
        self.gen_data_section()?;
        for idx in 0..self.module.funcs.len() {
            self.gen_code_section(idx)?;
        }
        Ok(())
    }

    /// The `rem` macro expands integer remainder to sdiv+msub.
    pub fn gen_header(&mut self) -> Result<(), CodegenError> {
        self.out.write_all(
            b".macro rem dst, divd, divr\n\
              sdiv \\dst, \\divd, \\divr\n\
              msub \\dst, \\dst, \\divr, \\divd\n\
              .endm\n",
        )?;
        Ok(())
    }

    /// Globals: BSS entries become `.comm`, initialized ones a
    /// `.data`-section word.
    pub fn gen_data_section(&mut self) -> Result<(), CodegenError> {
        for global in self.module.globals.values() {
            match global.init {
                None => {
                    writeln!(
                        self.out,
                        ".comm {}, {}, {}",
                        global.name,
                        self.module.types.size_of(global.ty),
                        global.align
                    )?;
                }
                Some(value) => {
                    writeln!(self.out, ".type {}, @object", global.name)?;
                    writeln!(self.out, ".data")?;
                    writeln!(self.out, ".globl {}", global.name)?;
                    writeln!(self.out, ".align 2")?;
                    writeln!(self.out, "{}:", global.name)?;
                    writeln!(self.out, ".word 0x{:x}", value as u32)?;
                }
            }
        }
        Ok(())
    }

    /// Allocate, select, and serialize one function into `.text`.
    pub fn gen_code_section(&mut self, idx: usize) -> Result<(), CodegenError> {
        writeln!(self.out, ".text")?;

        let Module { types, funcs, .. } = &mut *self.module;
        let Some((_, func)) = funcs.get_index_mut(idx) else {
            return Err(CodegenError::MalformedIr(format!(
                "no function at index {}",
                idx
            )));
        };

        regalloc::register_allocation(types, func);

        // Rename labels with the module-global counter before any
        // branch text is emitted.
        let label_ids: Vec<LabelId> = func
            .insts
            .iter()
            .filter(|inst| inst.op == Opcode::Label)
            .filter_map(|inst| inst.target)
            .collect();
        for id in label_ids {
            func.set_label_name(id, format!(".L{}", self.label_index));
            self.label_index += 1;
        }

        let mut iloc = ILoc::new();
        let mut scratch = ScratchAllocator::new();
        let mut selector = InstSelector::new(types, func, &mut iloc, &mut scratch);
        selector.set_show_linear_ir(self.opts.show_linear_ir);
        selector.run()?;

        iloc.delete_unused_labels();

        writeln!(self.out, ".align 2")?;
        writeln!(self.out, ".globl {}", func.name)?;
        writeln!(self.out, ".type {}, @function", func.name)?;
        writeln!(self.out, "{}:", func.name)?;

        if self.opts.show_linear_ir {
            for value in func.values() {
                let placed = matches!(
                    value.kind,
                    ValueKind::Local | ValueKind::Temp | ValueKind::Param { .. }
                );
                if !placed {
                    continue;
                }
                if value.reg_id != -1 {
                    writeln!(self.out, "\t@ {}:{}", value.name, reg_name(value.reg_id))?;
                } else if let Some(addr) = value.mem {
                    writeln!(
                        self.out,
                        "\t@ {}:[{},#{}]",
                        value.name,
                        reg_name(addr.base),
                        addr.offset
                    )?;
                }
            }
        }

        iloc.write(&mut self.out, self.opts.emit_blank_lines)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/t_codegen.rs"]
mod tests;
