//! Calling-convention rewriting: pre-selection mutation of the
//! instruction vector so argument and return values land in the
//! registers and stack slots AAPCS64 mandates.

use crate::backend::arm64::platform::{FP_REG, SP_REG, is_callee_saved};
use crate::ir::{Function, Inst, Opcode, TyTable, ValueId};

/// Rewrite every call site:
/// arguments at index >= 8 are staged through fresh SP-relative locals,
/// arguments 0..7 are moved into their argument registers unless they
/// already live there, one ARG marker per operand precedes the call,
/// and a result not already in x0 is moved out after it.
pub fn adjust_func_call_insts(types: &mut TyTable, func: &mut Function) {
    let int_ty = types.int32();
    let insts = std::mem::take(&mut func.insts);
    let mut out: Vec<Inst> = Vec::with_capacity(insts.len());

    for mut inst in insts {
        if inst.op != Opcode::FuncCall {
            out.push(inst);
            continue;
        }

        let operand_count = inst.operands.len();

        // Arguments 8.. pass on the stack: stage each through a fresh
        // local pinned to (SP, esp).
        let mut esp: i64 = 0;
        for k in 8..operand_count {
            let arg = inst.operands[k];
            if Some(arg) == inst.result {
                break;
            }
            let slot = func.new_local(int_ty, &format!("%arg{}", k));
            func.set_mem_addr(slot, SP_REG, esp);
            esp += 4;
            out.push(Inst::assign(slot, arg));
            inst.operands[k] = slot;
        }

        // Arguments 0..7 pass in registers; leave an operand alone only
        // when the allocator already placed it in its argument register.
        for k in 0..operand_count.min(8) {
            let arg = inst.operands[k];
            if Some(arg) == inst.result {
                break;
            }
            if func.value(arg).reg_id == k as i32 {
                continue;
            }
            let ty = func.value(arg).ty;
            let reg_val = func.reg_value(k as i32, ty);
            out.push(Inst::assign(reg_val, arg));
            inst.operands[k] = reg_val;
        }

        // One ARG marker per operand, in order, so selection can check
        // the placement.
        for k in 0..operand_count {
            let arg = inst.operands[k];
            if Some(arg) == inst.result {
                continue;
            }
            out.push(Inst::arg(arg));
        }

        // The return value arrives in x0; move it out unless the result
        // was allocated there.
        let result_move = match inst.result {
            Some(result) if func.value(result).reg_id != 0 => {
                let ty = func.value(result).ty;
                let x0 = func.reg_value(0, ty);
                Some(Inst::assign(result, x0))
            }
            _ => None,
        };

        out.push(inst);
        out.extend(result_move);
    }

    func.insts = out;
}

/// Bind formal parameters. Functions that call lower the first eight
/// parameters through entry moves out of x0..x7; leaf functions keep
/// them in the argument registers directly. Parameters past the eighth
/// live above the saved frame pointer.
pub fn adjust_formal_params(func: &mut Function) {
    let params: Vec<ValueId> = func.params.clone();
    let param_count = params.len();

    // Entry moves only matter when a call will clobber x0..x7.
    let moved_count = if func.has_call { param_count.min(8) } else { 0 };
    let mut moves = Vec::with_capacity(moved_count);
    for (k, &param) in params.iter().enumerate().take(moved_count) {
        let ty = func.value(param).ty;
        let reg_val = func.reg_value(k as i32, ty);
        moves.push(Inst::assign(param, reg_val));
    }
    // Immediately after ENTRY.
    let at = func.insts.len().min(1);
    func.insts.splice(at..at, moves);

    // Remaining register-class parameters bind to x0..x7 in place; a
    // callee-saved register the allocator gave them is no longer worth
    // protecting.
    let mut k = moved_count;
    while k < param_count.min(8) {
        let reg = func.value(params[k]).reg_id;
        if is_callee_saved(reg) {
            func.protected_regs.retain(|&r| r != reg);
        }
        func.value_mut(params[k]).reg_id = k as i32;
        k += 1;
    }

    // Stack-passed parameters sit at positive offsets above FP, past
    // the frame and the saved-register area.
    let mut fp_esp = func.max_dep as i64 + func.protected_regs.len() as i64 * 4;
    while k < param_count {
        let reg = func.value(params[k]).reg_id;
        if is_callee_saved(reg) {
            func.protected_regs.retain(|&r| r != reg);
            func.value_mut(params[k]).reg_id = -1;
        }
        func.set_mem_addr(params[k], FP_REG, fp_esp);
        fp_esp += 4;
        k += 1;
    }
}

#[cfg(test)]
#[path = "../../tests/t_calls.rs"]
mod tests;
