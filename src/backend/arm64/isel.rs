//! Pattern-directed instruction selection: one handler per IR opcode,
//! emitting through the assembly buffer with the register assignments
//! the allocator published.

use crate::backend::arm64::iloc::ILoc;
use crate::backend::arm64::platform::{
    SP_REG, TMP_REG, TMP_REG2, ZR_REG, reg_name, xreg_name,
};
use crate::backend::arm64::scratch::ScratchAllocator;
use crate::diag::{CodegenError, log_error};
use crate::ir::{CastKind, Function, Inst, Opcode, TyTable, ValueId};

/// Condition names indexed by comparison ordinal; the complement of an
/// entry is its neighbour (ordinal ^ 1).
const COND_NAMES: [&str; 6] = ["eq", "ne", "gt", "le", "ge", "lt"];

fn cond_name(op: Opcode) -> &'static str {
    COND_NAMES[op.cmp_ordinal()]
}

fn cond_name_negated(op: Opcode) -> &'static str {
    COND_NAMES[op.cmp_ordinal() ^ 1]
}

pub struct InstSelector<'a> {
    types: &'a TyTable,
    func: &'a mut Function,
    iloc: &'a mut ILoc,
    scratch: &'a mut ScratchAllocator,
    /// Most recently lowered integer comparison, pending fusion into a
    /// branch or a condition-set.
    lstcmp: Option<Opcode>,
    /// ARG markers seen since the last call.
    real_arg_count: u32,
    show_linear_ir: bool,
}

impl<'a> InstSelector<'a> {
    pub fn new(
        types: &'a TyTable,
        func: &'a mut Function,
        iloc: &'a mut ILoc,
        scratch: &'a mut ScratchAllocator,
    ) -> Self {
        Self {
            types,
            func,
            iloc,
            scratch,
            lstcmp: None,
            real_arg_count: 0,
            show_linear_ir: false,
        }
    }

    pub fn set_show_linear_ir(&mut self, show: bool) {
        self.show_linear_ir = show;
    }

    pub fn run(&mut self) -> Result<(), CodegenError> {
        let insts = self.func.insts.clone();
        for inst in &insts {
            if inst.dead {
                continue;
            }
            self.translate(inst)?;
        }
        Ok(())
    }

    fn translate(&mut self, inst: &Inst) -> Result<(), CodegenError> {
        if self.show_linear_ir {
            let text = self.func.inst_to_string(inst);
            if !text.is_empty() {
                self.iloc.comment(&text);
            }
        }
        match inst.op {
            Opcode::Entry => self.translate_entry(),
            Opcode::Exit => self.translate_exit(inst),
            Opcode::Label => self.translate_label(inst),
            Opcode::Goto => self.translate_goto(inst),
            Opcode::Assign => self.translate_assign_inst(inst),
            Opcode::IAdd => self.translate_two_operator(inst, "add"),
            Opcode::ISub => self.translate_two_operator(inst, "sub"),
            Opcode::IMul => self.translate_two_operator(inst, "mul"),
            Opcode::IDiv => self.translate_two_operator(inst, "sdiv"),
            Opcode::IMod => self.translate_rem(inst),
            Opcode::IEq | Opcode::INe | Opcode::IGt | Opcode::ILe | Opcode::IGe | Opcode::ILt => {
                self.translate_cmp(inst)
            }
            Opcode::FAdd => self.translate_two_operator(inst, "fadd"),
            Opcode::FSub => self.translate_two_operator(inst, "fsub"),
            Opcode::FMul => self.translate_two_operator(inst, "fmul"),
            Opcode::FDiv => self.translate_two_operator(inst, "fdiv"),
            Opcode::FMod => {
                // No architectural fmod; the sentinel mnemonic makes the
                // downstream assembler reject the output instead of
                // miscompiling.
                log_error!(
                    "{}",
                    CodegenError::Unsupported("float remainder".to_string())
                );
                self.translate_two_operator(inst, "fmod")
            }
            Opcode::Xor => self.translate_xor(inst),
            Opcode::Cast => self.translate_cast(inst),
            Opcode::FuncCall => self.translate_call(inst),
            Opcode::Arg => self.translate_arg(inst),
            Opcode::Gep => self.translate_gep(inst),
            Opcode::Store => self.translate_store(inst),
            Opcode::Load => self.translate_load(inst),
            op => {
                log_error!("instruction selection: unsupported opcode {:?}", op);
                Ok(())
            }
        }
    }

    /// Prologue: push protected registers in pairs, a trailing odd one
    /// alone, then claim the frame.
    fn translate_entry(&mut self) -> Result<(), CodegenError> {
        let protected = self.func.protected_regs.clone();
        let last = protected.len() as i32 - 1;
        let mut i = 0i32;
        while i < last {
            let (xa, xb) = (protected[i as usize], protected[(i + 1) as usize]);
            i += 2;
            self.iloc
                .inst3("stp", &xreg_name(xa), &xreg_name(xb), "[sp,#-16]!");
        }
        if i <= last {
            self.iloc
                .inst2("str", &xreg_name(protected[i as usize]), "[sp,#-16]!");
        }
        self.iloc.alloc_stack(self.func, TMP_REG);
        Ok(())
    }

    /// Epilogue: return value into x0, release the frame, pop the
    /// protected registers in reverse, return.
    fn translate_exit(&mut self, inst: &Inst) -> Result<(), CodegenError> {
        if let Some(&ret) = inst.operands.first() {
            self.iloc.load_var(0, self.func.value(ret));
        }

        let frame = ILoc::frame_size(self.func);
        if frame != 0 {
            if crate::backend::arm64::platform::const_expr(frame) {
                self.iloc.inst3("add", "sp", "sp", &format!("#{}", frame));
            } else {
                self.iloc.load_imm(TMP_REG, frame);
                self.iloc.inst3("add", "sp", "sp", reg_name(TMP_REG));
            }
        }

        let protected = self.func.protected_regs.clone();
        if !protected.is_empty() {
            let m = protected.len();
            if m & 1 == 1 {
                self.iloc
                    .inst2("ldr", &xreg_name(protected[m - 1]), "[sp],#16");
            }
            let mut i = (m as i32 - 2) | 1;
            while i > 0 {
                let (xa, xb) = (protected[(i - 1) as usize], protected[i as usize]);
                i -= 2;
                self.iloc
                    .inst3("ldp", &xreg_name(xa), &xreg_name(xb), "[sp],#16");
            }
        }

        self.iloc.inst("ret", "");
        Ok(())
    }

    fn translate_label(&mut self, inst: &Inst) -> Result<(), CodegenError> {
        let Some(label) = inst.target else {
            log_error!("label instruction without a label");
            return Ok(());
        };
        let name = self.func.label_name(label).to_string();
        // An unconditional jump straight onto its own label is a no-op.
        let jump_onto_label = self
            .iloc
            .last()
            .is_some_and(|last| last.op == "b" && last.dst == name);
        if jump_onto_label {
            self.iloc.last_mut().unwrap().dead = true;
        }
        self.iloc.label(&name);
        Ok(())
    }

    fn translate_goto(&mut self, inst: &Inst) -> Result<(), CodegenError> {
        let Some(if_true) = inst.target else {
            log_error!("goto without a target label");
            return Ok(());
        };
        if inst.operands.is_empty() {
            let name = self.func.label_name(if_true).to_string();
            self.iloc.jump(&name);
            return Ok(());
        }

        let Some(if_false) = inst.alt_target else {
            log_error!("conditional goto without an if-false label");
            return Ok(());
        };
        let true_name = self.func.label_name(if_true).to_string();
        let false_name = self.func.label_name(if_false).to_string();
        match self.lstcmp.take() {
            // The pending comparison left its verdict in the flags.
            Some(cmp) => self.iloc.branch(cond_name(cmp), &true_name),
            None => self.iloc.branch("ne", &true_name),
        }
        self.iloc.jump(&false_name);
        Ok(())
    }

    fn translate_assign_inst(&mut self, inst: &Inst) -> Result<(), CodegenError> {
        let (Some(&dst), Some(&src)) = (inst.operands.first(), inst.operands.get(1)) else {
            log_error!("assign is missing an operand");
            return Ok(());
        };
        self.translate_assign(dst, src)
    }

    /// The move matrix: register/memory on either side.
    fn translate_assign(&mut self, dst: ValueId, src: ValueId) -> Result<(), CodegenError> {
        let src_reg = self.func.value(src).reg_id;
        let dst_reg = self.func.value(dst).reg_id;

        if src_reg != -1 {
            self.iloc.store_var(src_reg, self.func.value(dst), TMP_REG);
        } else if dst_reg != -1 {
            self.iloc.load_var(dst_reg, self.func.value(src));
        } else {
            let tmp = self.scratch.allocate().ok_or_else(|| {
                CodegenError::ScratchExhausted(format!(
                    "memory-to-memory move of {}",
                    self.func.value(src).name
                ))
            })?;
            self.iloc.load_var(tmp, self.func.value(src));
            self.iloc.store_var(tmp, self.func.value(dst), TMP_REG);
            self.scratch.release(tmp);
        }
        Ok(())
    }

    /// Shared lowering for `op rd, rs1, rs2`: operands not already in
    /// registers are materialized into the reserved scratches, and a
    /// memory-resident result is stored back afterwards.
    fn translate_two_operator(&mut self, inst: &Inst, op: &str) -> Result<(), CodegenError> {
        let (Some(&lhs), Some(&rhs)) = (inst.operands.first(), inst.operands.get(1)) else {
            log_error!("{:?} is missing an operand", inst.op);
            return Ok(());
        };
        let Some(result) = inst.result else {
            log_error!("{:?} has no result value", inst.op);
            return Ok(());
        };

        let lhs_reg = self.func.value(lhs).reg_id;
        let rhs_reg = self.func.value(rhs).reg_id;
        let result_reg = self.func.value(result).reg_id;

        let load_lhs = if lhs_reg == -1 {
            self.iloc.load_var(TMP_REG, self.func.value(lhs));
            TMP_REG
        } else {
            lhs_reg
        };
        let load_rhs = if rhs_reg == -1 {
            self.iloc.load_var(TMP_REG2, self.func.value(rhs));
            TMP_REG2
        } else {
            rhs_reg
        };
        let load_result = if result_reg == -1 { TMP_REG2 } else { result_reg };

        self.iloc.inst3(
            op,
            reg_name(load_result),
            reg_name(load_lhs),
            reg_name(load_rhs),
        );

        if result_reg == -1 {
            self.iloc
                .store_var(TMP_REG2, self.func.value(result), TMP_REG);
        }
        Ok(())
    }

    /// `rem` expands to sdiv+msub through the module-header macro; when
    /// the result shares a register with an operand, that operand is
    /// parked in a scratch first.
    fn translate_rem(&mut self, inst: &Inst) -> Result<(), CodegenError> {
        let (Some(&lhs), Some(&rhs)) = (inst.operands.first(), inst.operands.get(1)) else {
            log_error!("rem is missing an operand");
            return Ok(());
        };
        let lhs_reg = self.func.value(lhs).reg_id;
        let rhs_reg = self.func.value(rhs).reg_id;
        let result_reg = inst.result.map_or(-1, |r| self.func.value(r).reg_id);

        if result_reg != -1 {
            if result_reg == lhs_reg {
                self.iloc.mov_reg(TMP_REG, lhs_reg);
                self.func.value_mut(lhs).reg_id = TMP_REG;
            } else if result_reg == rhs_reg {
                self.iloc.mov_reg(TMP_REG, rhs_reg);
                self.func.value_mut(rhs).reg_id = TMP_REG;
            }
        }
        let outcome = self.translate_two_operator(inst, "rem");
        self.func.value_mut(lhs).reg_id = lhs_reg;
        self.func.value_mut(rhs).reg_id = rhs_reg;
        outcome
    }

    /// Comparison lowering: remember the opcode for a following branch
    /// or condition-set. A compare against zero right after an add/sub
    /// of the same register fuses into the flag-setting variant;
    /// otherwise `subs wzr, rs1, rs2` sets the flags explicitly.
    fn translate_cmp(&mut self, inst: &Inst) -> Result<(), CodegenError> {
        let (Some(&lhs), Some(&rhs)) = (inst.operands.first(), inst.operands.get(1)) else {
            log_error!("{:?} is missing an operand", inst.op);
            return Ok(());
        };
        let Some(result) = inst.result else {
            log_error!("{:?} has no result value", inst.op);
            return Ok(());
        };

        self.lstcmp = Some(inst.op);

        if self.func.value(rhs).as_const_int() == Some(0) {
            let lhs_reg = self.func.value(lhs).reg_id;
            let fuses = lhs_reg >= 0
                && self.iloc.last().is_some_and(|prev| {
                    prev.arg1 == reg_name(lhs_reg) && (prev.op == "add" || prev.op == "sub")
                });
            if fuses {
                self.iloc.last_mut().unwrap().op.push('s');
                return Ok(());
            }
        }

        // Route through the two-operand helper with the result forced
        // to the zero register, then restore it for any consumers.
        let saved = self.func.value(result).reg_id;
        self.func.value_mut(result).reg_id = ZR_REG;
        let outcome = self.translate_two_operator(inst, "subs");
        self.func.value_mut(result).reg_id = saved;
        outcome
    }

    fn translate_cast(&mut self, inst: &Inst) -> Result<(), CodegenError> {
        match inst.cast {
            Some(CastKind::BoolToInt) => {
                let Some(result) = inst.result else {
                    log_error!("cast has no result value");
                    return Ok(());
                };
                let Some(cmp) = self.lstcmp else {
                    log_error!("bool-to-int cast without a preceding comparison");
                    return Ok(());
                };
                let result_reg = self.func.value(result).reg_id;
                let load_reg = if result_reg == -1 { TMP_REG2 } else { result_reg };
                self.iloc.inst2("cset", reg_name(load_reg), cond_name(cmp));
                if result_reg == -1 {
                    self.iloc
                        .store_var(TMP_REG2, self.func.value(result), TMP_REG);
                }
            }
            // The remaining casts are value-preserving at this layer.
            _ => {}
        }
        Ok(())
    }

    /// XOR with 1 over a comparison result is boolean negation: set the
    /// complemented condition instead of computing an eor.
    fn translate_xor(&mut self, inst: &Inst) -> Result<(), CodegenError> {
        let (Some(&lhs), Some(&rhs)) = (inst.operands.first(), inst.operands.get(1)) else {
            log_error!("xor is missing an operand");
            return Ok(());
        };
        let Some(result) = inst.result else {
            log_error!("xor has no result value");
            return Ok(());
        };

        if self.func.value(rhs).as_const_int() == Some(1)
            && let Some(def_op) = self.func.def_opcode(lhs)
            && def_op.is_int_cmp()
        {
            let result_reg = self.func.value(result).reg_id;
            let load_reg = if result_reg == -1 {
                self.scratch.allocate().ok_or_else(|| {
                    CodegenError::ScratchExhausted(format!(
                        "negation of {}",
                        self.func.value(lhs).name
                    ))
                })?
            } else {
                result_reg
            };
            self.iloc
                .inst2("cset", reg_name(load_reg), cond_name_negated(def_op));
            if result_reg == -1 {
                self.iloc
                    .store_var(load_reg, self.func.value(result), TMP_REG);
                self.scratch.release(load_reg);
            }
            return Ok(());
        }

        self.translate_two_operator(inst, "eor")
    }

    /// Element address: constant subscripts fold into the base's
    /// offset; otherwise the address is computed into the second
    /// scratch with a scaled add (power-of-two strides) or madd.
    fn translate_gep(&mut self, inst: &Inst) -> Result<(), CodegenError> {
        let (Some(&base), Some(&index)) = (inst.operands.first(), inst.operands.get(1)) else {
            log_error!("getelemptr is missing an operand");
            return Ok(());
        };
        let Some(result) = inst.result else {
            log_error!("getelemptr has no result value");
            return Ok(());
        };

        let base_mem = self.func.value(base).mem;
        let stride = self.types.elem_size(self.func.value(result).ty) as i64;

        if let Some(addr) = base_mem
            && let Some(c) = self.func.value(index).as_const_int()
        {
            self.func
                .set_mem_addr(result, addr.base, addr.offset + c as i64 * stride);
            return Ok(());
        }

        let (base_reg, base_off) = match base_mem {
            Some(addr) => (addr.base, addr.offset),
            None => {
                self.iloc.load_var(TMP_REG, self.func.value(base));
                (TMP_REG, 0)
            }
        };
        let index_reg = match self.func.value(index).reg_id {
            reg if reg >= 0 && reg < 32 && !self.func.value(index).is_const() => reg,
            _ => {
                self.iloc.load_var(TMP_REG2, self.func.value(index));
                TMP_REG2
            }
        };

        if stride.count_ones() == 1 {
            self.iloc.inst3(
                "add",
                &xreg_name(TMP_REG2),
                &xreg_name(base_reg),
                &format!("x{},lsl #{}", index_reg, stride.trailing_zeros()),
            );
        } else {
            self.iloc
                .inst2("mov", &xreg_name(TMP_REG), &format!("#{}", stride));
            self.iloc.inst3(
                "madd",
                &xreg_name(TMP_REG2),
                &xreg_name(index_reg),
                &format!("x{},x{}", TMP_REG, base_reg),
            );
        }
        self.func.set_mem_addr(result, TMP_REG2, base_off);
        Ok(())
    }

    fn translate_store(&mut self, inst: &Inst) -> Result<(), CodegenError> {
        let (Some(&ptr), Some(&src)) = (inst.operands.first(), inst.operands.get(1)) else {
            log_error!("store is missing an operand");
            return Ok(());
        };

        let src_reg = match self.func.value(src).reg_id {
            -1 => {
                self.iloc.load_var(TMP_REG, self.func.value(src));
                TMP_REG
            }
            reg => reg,
        };
        let (base_reg, offset) = match self.func.value(ptr).reg_id {
            -1 => match self.func.value(ptr).mem {
                Some(addr) => (addr.base, addr.offset),
                None => {
                    log_error!(
                        "{}",
                        CodegenError::UnplacedValue(self.func.value(ptr).name.clone())
                    );
                    return Ok(());
                }
            },
            reg => (reg, 0),
        };
        self.iloc.store_base(src_reg, base_reg, offset, TMP_REG);
        Ok(())
    }

    fn translate_load(&mut self, inst: &Inst) -> Result<(), CodegenError> {
        let Some(&ptr) = inst.operands.first() else {
            log_error!("load is missing an operand");
            return Ok(());
        };
        let Some(result) = inst.result else {
            log_error!("load has no result value");
            return Ok(());
        };

        let result_reg = self.func.value(result).reg_id;
        let load_reg = if result_reg == -1 { TMP_REG } else { result_reg };
        let (base_reg, offset) = match self.func.value(ptr).reg_id {
            -1 => match self.func.value(ptr).mem {
                Some(addr) => (addr.base, addr.offset),
                None => {
                    log_error!(
                        "{}",
                        CodegenError::UnplacedValue(self.func.value(ptr).name.clone())
                    );
                    return Ok(());
                }
            },
            reg => (reg, 0),
        };
        self.iloc.load_base(load_reg, base_reg, offset);
        if result_reg == -1 {
            self.iloc
                .store_var(TMP_REG, self.func.value(result), TMP_REG2);
        }
        Ok(())
    }

    /// Call sequence: x0..x7 are pinned so intervening materialization
    /// cannot take them, the argument moves the rewriter staged are
    /// re-checked in place, then `bl`.
    fn translate_call(&mut self, inst: &Inst) -> Result<(), CodegenError> {
        let operand_count = inst.operands.len();
        if self.real_arg_count != 0 && self.real_arg_count as usize != operand_count {
            log_error!(
                "call to {} has {} ARG markers for {} operands",
                inst.callee.as_deref().unwrap_or("?"),
                self.real_arg_count,
                operand_count
            );
        }

        if operand_count > 0 {
            for reg in 0..8 {
                self.scratch.reserve(reg);
            }

            // Stack-passed arguments go through SP-relative staging
            // slots.
            let mut esp: i64 = 0;
            for k in 8..operand_count {
                let arg = inst.operands[k];
                if Some(arg) == inst.result {
                    continue;
                }
                let ty = self.func.value(arg).ty;
                let slot = self.func.new_mem_var(ty);
                self.func.set_mem_addr(slot, SP_REG, esp);
                esp += 4;
                self.translate_assign(slot, arg)?;
            }

            // Register arguments land in x0..x7 in operand order.
            let mut d = 0i32;
            for k in 0..operand_count.min(8) {
                let arg = inst.operands[k];
                if Some(arg) == inst.result {
                    continue;
                }
                let ty = self.func.value(arg).ty;
                let reg_val = self.func.reg_value(d, ty);
                self.translate_assign(reg_val, arg)?;
                d += 1;
            }
        }

        match &inst.callee {
            Some(name) => self.iloc.call(name),
            None => log_error!("call instruction without a callee name"),
        }

        if operand_count > 0 {
            for reg in 0..8 {
                self.scratch.release(reg);
            }
        }
        self.real_arg_count = 0;
        Ok(())
    }

    /// ARG markers only validate placement: the first eight must sit in
    /// their argument registers, the rest in SP-relative slots.
    fn translate_arg(&mut self, inst: &Inst) -> Result<(), CodegenError> {
        let Some(&src) = inst.operands.first() else {
            log_error!("arg marker without an operand");
            return Ok(());
        };
        let reg = self.func.value(src).reg_id;
        if self.real_arg_count < 8 {
            if reg == -1 {
                log_error!(
                    "argument {} ({}) is not register-resident",
                    self.real_arg_count + 1,
                    self.func.value(src).name
                );
            } else if reg != self.real_arg_count as i32 {
                log_error!(
                    "argument {} ({}) is in the wrong register: {}",
                    self.real_arg_count + 1,
                    self.func.value(src).name,
                    reg
                );
            }
        } else {
            match self.func.value(src).mem {
                Some(addr) if addr.base == SP_REG => {}
                _ => {
                    log_error!(
                        "argument {} ({}) is not SP-addressed",
                        self.real_arg_count + 1,
                        self.func.value(src).name
                    );
                }
            }
        }
        self.real_arg_count += 1;
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/t_isel.rs"]
mod tests;
