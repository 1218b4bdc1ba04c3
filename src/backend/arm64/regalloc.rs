//! Liveness analysis and linear-scan register allocation over the
//! linear IR of one function.

use crate::backend::arm64::calls;
use crate::backend::arm64::platform::{FP_REG, LR_REG, ZR_REG, is_callee_saved};
use crate::ir::{Function, TyTable, ValueId, ValueKind};

/// Index interval during which a value must stay addressable, plus the
/// location it ends up with.
#[derive(Debug, Clone)]
pub struct LiveRange {
    pub value: ValueId,
    pub start: usize,
    pub end: usize,
    pub reg: i32,
    pub stack_offset: i64,
}

impl LiveRange {
    fn open(value: ValueId, start: usize, end: usize) -> Self {
        Self {
            value,
            start,
            end,
            reg: -1,
            stack_offset: -1,
        }
    }

    pub fn overlaps(&self, other: &LiveRange) -> bool {
        !(self.end < other.start || self.start > other.end)
    }
}

/// Run the whole pre-selection pipeline on one function: protection
/// seeding, liveness, linear scan, call-site rewriting, frame
/// alignment, and formal-parameter binding.
pub fn register_allocation(types: &mut TyTable, func: &mut Function) {
    if func.is_builtin {
        return;
    }

    // The zero constant reads straight from the zero register.
    for id in func.value_ids().collect::<Vec<_>>() {
        if func.value(id).kind == ValueKind::ConstInt(0) {
            func.value_mut(id).reg_id = ZR_REG;
        }
    }

    func.protected_regs.push(FP_REG);
    if func.has_call {
        func.protected_regs.push(LR_REG);
    }

    let mut ranges = calculate_live_ranges(func);
    ranges.sort_by_key(|r| r.start);

    linear_scan(types, func, &mut ranges);

    calls::adjust_func_call_insts(types, func);

    // SP stays 16-byte aligned.
    func.max_dep = (func.max_dep + 15) & !15;

    calls::adjust_formal_params(func);
}

/// Single forward pass over the instruction vector. A result opens a
/// range ending at its last use; each non-constant operand widens (or
/// opens) the range of the value it names.
pub fn calculate_live_ranges(func: &Function) -> Vec<LiveRange> {
    let mut ranges: Vec<LiveRange> = Vec::new();

    for (pos, inst) in func.insts.iter().enumerate() {
        if let Some(result) = inst.result {
            let end = find_last_use(func, result, pos);
            ranges.push(LiveRange::open(result, pos, end));
        }

        for &operand in &inst.operands {
            if Some(operand) == inst.result {
                continue;
            }
            match func.value(operand).kind {
                ValueKind::Temp | ValueKind::Local | ValueKind::Param { .. } => {
                    extend_range(func, &mut ranges, operand, pos);
                }
                _ => {}
            }
        }
    }

    ranges
}

/// Highest instruction index that uses `value`, scanning from the end
/// toward `start`; `start` itself when nothing later uses it.
fn find_last_use(func: &Function, value: ValueId, start: usize) -> usize {
    for i in (start..func.insts.len()).rev() {
        if func.insts[i].operands.contains(&value) {
            return i;
        }
    }
    start
}

fn extend_range(func: &Function, ranges: &mut Vec<LiveRange>, value: ValueId, pos: usize) {
    if let Some(range) = ranges.iter_mut().find(|r| r.value == value) {
        range.end = range.end.max(pos);
        return;
    }
    // First sighting without a definition: formal parameters are live
    // from function entry.
    let start = match func.value(value).kind {
        ValueKind::Param { .. } => 0,
        _ => pos,
    };
    ranges.push(LiveRange::open(value, start, pos));
}

/// Claim a fresh stack slot sized to the value's type.
fn allocate_stack_slot(types: &TyTable, func: &mut Function, value: ValueId) -> i64 {
    let offset = func.max_dep as i64;
    func.max_dep += types.size_of(func.value(value).ty);
    offset
}

fn expire_old_ranges(active: &mut Vec<LiveRange>, free_regs: &mut Vec<i32>, pos: usize) {
    active.retain(|range| {
        if range.end <= pos {
            free_regs.push(range.reg);
            false
        } else {
            true
        }
    });
}

/// Linear scan over ranges sorted by start. Address-typed values spill
/// unconditionally; everything else takes a register from the free pool
/// until it runs dry.
fn linear_scan(types: &TyTable, func: &mut Function, ranges: &mut [LiveRange]) {
    let mut free_regs: Vec<i32> = (19..=28).collect();
    if !func.has_call {
        // Without a call in the body the caller-saved temporaries are
        // safe to hand out as well.
        free_regs.extend(9..=15);
    }
    let mut active: Vec<LiveRange> = Vec::new();

    for range in ranges.iter_mut() {
        expire_old_ranges(&mut active, &mut free_regs, range.start);

        let is_array = types.is_array(func.value(range.value).ty);
        if !(is_array || free_regs.is_empty()) {
            range.reg = free_regs.pop().unwrap();
            active.push(range.clone());
        } else {
            range.stack_offset = allocate_stack_slot(types, func, range.value);
        }
    }

    // Publish the assignments back onto the values.
    for range in ranges.iter() {
        if range.reg != -1 {
            func.value_mut(range.value).reg_id = range.reg;
            if is_callee_saved(range.reg) && !func.protected_regs.contains(&range.reg) {
                func.protected_regs.push(range.reg);
            }
        } else {
            func.set_mem_addr(range.value, FP_REG, range.stack_offset);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/t_regalloc.rs"]
mod tests;
