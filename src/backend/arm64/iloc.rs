//! Ordered assembly-line buffer and the emission primitives the
//! instruction selector builds on: load/store with base+offset
//! addressing, large-immediate materialization, symbol-relative
//! addressing, and stack frame allocation.

use std::io::{self, Write};

use crate::backend::arm64::platform::{self, reg_name};
use crate::diag::{CodegenError, log_error};
use crate::ir::{Function, ValueData, ValueKind};

/// One buffered line: opcode, destination slot, up to two source slots,
/// and a dead flag that suppresses serialization.
#[derive(Debug, Clone)]
pub struct AsmInst {
    pub op: String,
    pub dst: String,
    pub arg1: String,
    pub arg2: String,
    pub dead: bool,
}

impl AsmInst {
    fn new(op: &str, dst: &str, arg1: &str, arg2: &str) -> Self {
        Self {
            op: op.to_string(),
            dst: dst.to_string(),
            arg1: arg1.to_string(),
            arg2: arg2.to_string(),
            dead: false,
        }
    }

    /// Label lines carry the label in the opcode slot and ":" as the
    /// destination.
    pub fn is_label(&self) -> bool {
        self.op.starts_with('.') && self.dst == ":"
    }

    pub fn render(&self) -> String {
        if self.is_label() {
            return format!("{}:", self.op);
        }
        let mut out = self.op.clone();
        if !self.dst.is_empty() {
            out.push(' ');
            out.push_str(&self.dst);
        }
        if !self.arg1.is_empty() {
            out.push_str(", ");
            out.push_str(&self.arg1);
        }
        if !self.arg2.is_empty() {
            out.push_str(", ");
            out.push_str(&self.arg2);
        }
        out
    }
}

/// Assembly buffer for one function body.
#[derive(Debug, Default)]
pub struct ILoc {
    code: Vec<AsmInst>,
}

impl ILoc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn code(&self) -> &[AsmInst] {
        &self.code
    }

    pub fn last(&self) -> Option<&AsmInst> {
        self.code.last()
    }

    pub fn last_mut(&mut self) -> Option<&mut AsmInst> {
        self.code.last_mut()
    }

    fn emit(&mut self, op: &str, dst: &str, arg1: &str, arg2: &str) {
        self.code.push(AsmInst::new(op, dst, arg1, arg2));
    }

    pub fn label(&mut self, name: &str) {
        self.emit(name, ":", "", "");
    }

    pub fn inst(&mut self, op: &str, dst: &str) {
        self.emit(op, dst, "", "");
    }

    pub fn inst2(&mut self, op: &str, dst: &str, arg1: &str) {
        self.emit(op, dst, arg1, "");
    }

    pub fn inst3(&mut self, op: &str, dst: &str, arg1: &str, arg2: &str) {
        self.emit(op, dst, arg1, arg2);
    }

    pub fn comment(&mut self, text: &str) {
        self.emit("@", text, "", "");
    }

    pub fn nop(&mut self) {
        self.emit("", "", "", "");
    }

    /// Materialize a 32-bit integer. Zero comes from the zero register;
    /// constants whose halves (and whose complement's halves) are all
    /// non-zero need a mov/movk pair; everything else is a single mov.
    pub fn load_imm(&mut self, reg: i32, constant: i32) {
        if constant == 0 {
            self.emit("mov", reg_name(reg), "wzr", "");
            return;
        }
        let z = constant as u32;
        let n = !constant as u32;
        let (z_low, z_high) = (z & 0xffff, z >> 16);
        let (n_low, n_high) = (n & 0xffff, n >> 16);
        if z_low != 0 && z_high != 0 && n_low != 0 && n_high != 0 {
            self.emit("mov", reg_name(reg), &format!("#{}", z_low), "");
            self.emit("movk", reg_name(reg), &format!("#{}", z_high), "lsl #16");
        } else {
            self.emit("mov", reg_name(reg), &format!("#{}", constant), "");
        }
    }

    /// Page-relative address of a symbol, then the word at its low 12
    /// bits.
    pub fn load_symbol(&mut self, reg: i32, name: &str) {
        let x = platform::xreg_name(reg);
        self.emit("adrp", &x, name, "");
        self.emit("ldr", reg_name(reg), &format!("[{},:lo12:{}]", x, name), "");
    }

    fn base_operand(base: i32) -> String {
        let name = reg_name(base);
        match name.strip_prefix('w') {
            Some(rest) => format!("x{}", rest),
            None => name.to_string(),
        }
    }

    /// `ldr reg, [base, #offset]`; an unencodable offset is loaded into
    /// the destination register first and used as an index.
    pub fn load_base(&mut self, reg: i32, base: i32, offset: i64) {
        let rs = reg_name(reg);
        let mut addr = Self::base_operand(base);
        if platform::is_disp(offset) {
            if offset != 0 {
                addr.push_str(&format!(",#{}", offset));
            }
        } else {
            self.load_imm(reg, offset as i32);
            addr.push_str(&format!(",{}", rs));
        }
        self.emit("ldr", rs, &format!("[{}]", addr), "");
    }

    /// Mirror of `load_base`; an unencodable offset goes through the
    /// caller-provided scratch register.
    pub fn store_base(&mut self, src: i32, base: i32, offset: i64, tmp: i32) {
        let mut addr = Self::base_operand(base);
        if platform::is_disp(offset) {
            if offset != 0 {
                addr.push_str(&format!(",#{}", offset));
            }
        } else {
            self.load_imm(tmp, offset as i32);
            addr.push_str(&format!(",{}", reg_name(tmp)));
        }
        self.emit("str", reg_name(src), &format!("[{}]", addr), "");
    }

    pub fn mov_reg(&mut self, dst: i32, src: i32) {
        if dst != src {
            self.emit("mov", reg_name(dst), reg_name(src), "");
        }
    }

    /// Bring a value into `reg`, whatever its current home: constant,
    /// register, global symbol, or stack slot.
    pub fn load_var(&mut self, reg: i32, value: &ValueData) {
        match &value.kind {
            ValueKind::ConstInt(v) => {
                if value.reg_id != -1 {
                    self.mov_reg(reg, value.reg_id);
                } else {
                    self.load_imm(reg, *v);
                }
            }
            ValueKind::ConstFloat(v) => {
                self.load_imm(reg, v.to_bits() as i32);
            }
            _ if value.reg_id != -1 => {
                self.mov_reg(reg, value.reg_id);
            }
            ValueKind::Global => {
                self.load_symbol(reg, &value.name);
            }
            _ => match value.mem {
                Some(addr) => self.load_base(reg, addr.base, addr.offset),
                None => {
                    log_error!("{}", CodegenError::UnplacedValue(value.name.clone()));
                }
            },
        }
    }

    /// Mirror of `load_var`. Globals are addressed through `tmp` with a
    /// page-relative store.
    pub fn store_var(&mut self, src: i32, value: &ValueData, tmp: i32) {
        if value.reg_id != -1 {
            self.mov_reg(value.reg_id, src);
            return;
        }
        match &value.kind {
            ValueKind::Global => {
                let x = platform::xreg_name(tmp);
                self.emit("adrp", &x, &value.name, "");
                self.emit(
                    "str",
                    reg_name(src),
                    &format!("[{},:lo12:{}]", x, value.name),
                    "",
                );
            }
            _ => match value.mem {
                Some(addr) => self.store_base(src, addr.base, addr.offset, tmp),
                None => {
                    log_error!("{}", CodegenError::UnplacedValue(value.name.clone()));
                }
            },
        }
    }

    /// Address of a stack slot: `add reg, base, #off`, synthesizing the
    /// offset through `reg` itself when not encodable.
    pub fn lea_stack(&mut self, reg: i32, base: i32, offset: i64) {
        let rs = platform::xreg_name(reg);
        let base_name = platform::xreg_name(base);
        if platform::const_expr(offset as i32) {
            self.emit("add", &rs, &base_name, &format!("#{}", offset));
        } else {
            self.load_imm(reg, offset as i32);
            self.emit("add", &rs, &base_name, &rs);
        }
    }

    /// Total frame bytes for a function: locals/spills plus the
    /// overflow area for stack-passed call arguments.
    pub fn frame_size(func: &Function) -> i32 {
        let overflow = (func.max_call_args as i32 - 8).max(0);
        func.max_dep as i32 + overflow * 8
    }

    /// Claim the stack frame and point FP past the outgoing-argument
    /// overflow area.
    pub fn alloc_stack(&mut self, func: &Function, tmp: i32) {
        let overflow = (func.max_call_args as i32 - 8).max(0);
        let off = Self::frame_size(func);
        if off == 0 {
            return;
        }
        if platform::const_expr(off) {
            self.emit("sub", "sp", "sp", &format!("#{}", off));
        } else {
            self.load_imm(tmp, off);
            self.emit("sub", "sp", "sp", reg_name(tmp));
        }
        self.emit("add", "x29", "sp", &format!("#{}", overflow * 8));
    }

    pub fn call(&mut self, name: &str) {
        self.emit("bl", name, "", "");
    }

    pub fn jump(&mut self, label: &str) {
        self.emit("b", label, "", "");
    }

    pub fn branch(&mut self, cond: &str, label: &str) {
        self.emit(&format!("b{}", cond), label, "", "");
    }

    /// Mark every label no live branch mentions as dead.
    pub fn delete_unused_labels(&mut self) {
        let label_lines: Vec<usize> = self
            .code
            .iter()
            .enumerate()
            .filter(|(_, inst)| !inst.dead && inst.is_label())
            .map(|(i, _)| i)
            .collect();

        for li in label_lines {
            let name = self.code[li].op.clone();
            let used = self
                .code
                .iter()
                .any(|inst| !inst.dead && inst.op.starts_with('b') && inst.dst == name);
            if !used {
                self.code[li].dead = true;
            }
        }
    }

    /// Serialize live lines: labels flush-left, everything else behind
    /// one tab.
    pub fn write<W: Write>(&self, out: &mut W, emit_blank_lines: bool) -> io::Result<()> {
        for inst in &self.code {
            if inst.dead {
                continue;
            }
            let line = inst.render();
            if inst.is_label() {
                writeln!(out, "{}", line)?;
            } else if !line.is_empty() {
                writeln!(out, "\t{}", line)?;
            } else if emit_blank_lines {
                writeln!(out)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/t_iloc.rs"]
mod tests;
