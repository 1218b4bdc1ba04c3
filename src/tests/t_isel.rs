use crate::backend::arm64::iloc::ILoc;
use crate::backend::arm64::isel::InstSelector;
use crate::backend::arm64::platform::{FP_REG, LR_REG, TMP_REG2};
use crate::backend::arm64::scratch::ScratchAllocator;
use crate::ir::{CastKind, Function, Inst, Opcode, TyTable};

fn select(types: &TyTable, func: &mut Function) -> Vec<String> {
    let mut iloc = ILoc::new();
    let mut scratch = ScratchAllocator::new();
    InstSelector::new(types, func, &mut iloc, &mut scratch)
        .run()
        .unwrap();
    iloc.code()
        .iter()
        .filter(|inst| !inst.dead)
        .map(|inst| inst.render())
        .collect()
}

#[test]
fn test_assign_register_to_register() {
    let mut types = TyTable::new();
    let int = types.int32();
    let mut func = Function::new("f");
    let a = func.new_local(int, "%l0");
    let b = func.new_local(int, "%l1");
    func.value_mut(a).reg_id = 19;
    func.value_mut(b).reg_id = 20;
    func.push(Inst::assign(b, a));
    assert_eq!(select(&types, &mut func), vec!["mov w20, w19"]);
}

#[test]
fn test_assign_memory_to_register() {
    let mut types = TyTable::new();
    let int = types.int32();
    let mut func = Function::new("f");
    let src = func.new_local(int, "%l0");
    let dst = func.new_local(int, "%l1");
    func.set_mem_addr(src, FP_REG, 8);
    func.value_mut(dst).reg_id = 20;
    func.push(Inst::assign(dst, src));
    assert_eq!(select(&types, &mut func), vec!["ldr w20, [x29,#8]"]);
}

#[test]
fn test_assign_register_to_memory() {
    let mut types = TyTable::new();
    let int = types.int32();
    let mut func = Function::new("f");
    let src = func.new_local(int, "%l0");
    let dst = func.new_local(int, "%l1");
    func.value_mut(src).reg_id = 19;
    func.set_mem_addr(dst, FP_REG, 12);
    func.push(Inst::assign(dst, src));
    assert_eq!(select(&types, &mut func), vec!["str w19, [x29,#12]"]);
}

#[test]
fn test_assign_memory_to_memory_borrows_a_scratch() {
    let mut types = TyTable::new();
    let int = types.int32();
    let mut func = Function::new("f");
    let src = func.new_local(int, "%l0");
    let dst = func.new_local(int, "%l1");
    func.set_mem_addr(src, FP_REG, 0);
    func.set_mem_addr(dst, FP_REG, 4);
    func.push(Inst::assign(dst, src));
    assert_eq!(
        select(&types, &mut func),
        vec!["ldr w0, [x29]", "str w0, [x29,#4]"]
    );
}

#[test]
fn test_add_reloads_spilled_operand() {
    let mut types = TyTable::new();
    let int = types.int32();
    let mut func = Function::new("f");
    let a = func.new_local(int, "%l0");
    let b = func.new_local(int, "%l1");
    let t = func.new_temp(int, "%t0");
    func.value_mut(a).reg_id = 19;
    func.set_mem_addr(b, FP_REG, 0);
    func.value_mut(t).reg_id = 20;
    func.push(Inst::binary(Opcode::IAdd, t, a, b));
    assert_eq!(
        select(&types, &mut func),
        vec!["ldr w17, [x29]", "add w20, w19, w17"]
    );
}

#[test]
fn test_memory_result_stores_back_through_scratch() {
    let mut types = TyTable::new();
    let int = types.int32();
    let mut func = Function::new("f");
    let a = func.new_local(int, "%l0");
    let b = func.new_local(int, "%l1");
    let t = func.new_temp(int, "%t0");
    func.value_mut(a).reg_id = 19;
    func.value_mut(b).reg_id = 20;
    func.set_mem_addr(t, FP_REG, 0);
    func.push(Inst::binary(Opcode::ISub, t, a, b));
    assert_eq!(
        select(&types, &mut func),
        vec!["sub w17, w19, w20", "str w17, [x29]"]
    );
}

#[test]
fn test_compare_against_zero_fuses_into_flag_setting_add() {
    let mut types = TyTable::new();
    let int = types.int32();
    let bool_ty = types.bool_ty();
    let mut func = Function::new("f");
    let a = func.new_local(int, "%l0");
    let b = func.new_local(int, "%l1");
    let t1 = func.new_temp(int, "%t1");
    let t2 = func.new_temp(bool_ty, "%t2");
    let zero = func.new_const_int(0, int);
    let if_true = func.new_label();
    let if_false = func.new_label();
    // The add result shares a register with the comparison operand.
    func.value_mut(a).reg_id = 19;
    func.value_mut(b).reg_id = 20;
    func.value_mut(t1).reg_id = 19;
    func.push(Inst::binary(Opcode::IAdd, t1, a, b));
    func.push(Inst::binary(Opcode::IEq, t2, t1, zero));
    func.push(Inst::goto_cond(t2, if_true, if_false));
    assert_eq!(
        select(&types, &mut func),
        vec!["adds w19, w19, w20", "beq .L0", "b .L1"]
    );
}

#[test]
fn test_compare_without_fusion_sets_flags_explicitly() {
    let mut types = TyTable::new();
    let int = types.int32();
    let bool_ty = types.bool_ty();
    let mut func = Function::new("f");
    let a = func.new_local(int, "%l0");
    let b = func.new_local(int, "%l1");
    let t = func.new_temp(bool_ty, "%t0");
    let if_true = func.new_label();
    let if_false = func.new_label();
    func.value_mut(a).reg_id = 19;
    func.value_mut(b).reg_id = 20;
    func.push(Inst::binary(Opcode::ILt, t, a, b));
    func.push(Inst::goto_cond(t, if_true, if_false));
    assert_eq!(
        select(&types, &mut func),
        vec!["subs wzr, w19, w20", "blt .L0", "b .L1"]
    );
}

#[test]
fn test_conditional_goto_without_pending_compare_tests_ne() {
    let mut types = TyTable::new();
    let int = types.int32();
    let mut func = Function::new("f");
    let c = func.new_local(int, "%l0");
    let if_true = func.new_label();
    let if_false = func.new_label();
    func.value_mut(c).reg_id = 19;
    func.push(Inst::goto_cond(c, if_true, if_false));
    assert_eq!(select(&types, &mut func), vec!["bne .L0", "b .L1"]);
}

#[test]
fn test_xor_with_one_negates_a_comparison() {
    let mut types = TyTable::new();
    let int = types.int32();
    let bool_ty = types.bool_ty();
    let mut func = Function::new("f");
    let a = func.new_local(int, "%l0");
    let b = func.new_local(int, "%l1");
    let c = func.new_temp(bool_ty, "%t0");
    let n = func.new_temp(bool_ty, "%t1");
    let one = func.new_const_int(1, int);
    func.value_mut(a).reg_id = 19;
    func.value_mut(b).reg_id = 20;
    func.value_mut(n).reg_id = 21;
    func.push(Inst::binary(Opcode::ILt, c, a, b));
    func.push(Inst::binary(Opcode::Xor, n, c, one));
    // lt complements to ge.
    assert_eq!(
        select(&types, &mut func),
        vec!["subs wzr, w19, w20", "cset w21, ge"]
    );
}

#[test]
fn test_xor_without_the_pattern_emits_eor() {
    let mut types = TyTable::new();
    let int = types.int32();
    let mut func = Function::new("f");
    let a = func.new_local(int, "%l0");
    let b = func.new_local(int, "%l1");
    let t = func.new_temp(int, "%t0");
    func.value_mut(a).reg_id = 19;
    func.value_mut(b).reg_id = 20;
    func.value_mut(t).reg_id = 21;
    func.push(Inst::binary(Opcode::Xor, t, a, b));
    assert_eq!(select(&types, &mut func), vec!["eor w21, w19, w20"]);
}

#[test]
fn test_bool_to_int_cast_sets_the_pending_condition() {
    let mut types = TyTable::new();
    let int = types.int32();
    let bool_ty = types.bool_ty();
    let mut func = Function::new("f");
    let a = func.new_local(int, "%l0");
    let b = func.new_local(int, "%l1");
    let c = func.new_temp(bool_ty, "%t0");
    let r = func.new_temp(int, "%t1");
    func.value_mut(a).reg_id = 19;
    func.value_mut(b).reg_id = 20;
    func.value_mut(r).reg_id = 22;
    func.push(Inst::binary(Opcode::ILt, c, a, b));
    func.push(Inst::cast(r, CastKind::BoolToInt, c));
    assert_eq!(
        select(&types, &mut func),
        vec!["subs wzr, w19, w20", "cset w22, lt"]
    );
}

#[test]
fn test_gep_with_constant_index_folds_into_the_offset() {
    let mut types = TyTable::new();
    let int = types.int32();
    let arr_ty = types.array(int, 10);
    let mut func = Function::new("f");
    let arr = func.new_local(arr_ty, "%arr");
    let idx = func.new_const_int(2, int);
    let p = func.new_temp(arr_ty, "%t0");
    func.set_mem_addr(arr, FP_REG, 16);
    func.push(Inst::gep(p, arr, idx));
    assert!(select(&types, &mut func).is_empty());
    let addr = func.value(p).mem.unwrap();
    assert_eq!(addr.base, FP_REG);
    assert_eq!(addr.offset, 24);
}

#[test]
fn test_gep_with_power_of_two_stride_uses_scaled_add() {
    let mut types = TyTable::new();
    let int = types.int32();
    let arr_ty = types.array(int, 10);
    let mut func = Function::new("f");
    let arr = func.new_local(arr_ty, "%arr");
    let idx = func.new_local(int, "%i");
    let p = func.new_temp(arr_ty, "%t0");
    func.set_mem_addr(arr, FP_REG, 16);
    func.value_mut(idx).reg_id = 5;
    func.push(Inst::gep(p, arr, idx));
    assert_eq!(select(&types, &mut func), vec!["add x17, x29, x5,lsl #2"]);
    let addr = func.value(p).mem.unwrap();
    assert_eq!(addr.base, TMP_REG2);
    assert_eq!(addr.offset, 16);
}

#[test]
fn test_gep_with_odd_stride_uses_madd() {
    let mut types = TyTable::new();
    let int = types.int32();
    let wide = types.add(crate::ir::TyKind::Int { bits: 48 });
    let arr_ty = types.array(wide, 4);
    let mut func = Function::new("f");
    let arr = func.new_local(arr_ty, "%arr");
    let idx = func.new_local(int, "%i");
    let p = func.new_temp(arr_ty, "%t0");
    func.set_mem_addr(arr, FP_REG, 0);
    func.value_mut(idx).reg_id = 5;
    func.push(Inst::gep(p, arr, idx));
    assert_eq!(
        select(&types, &mut func),
        vec!["mov x16, #6", "madd x17, x5, x16,x29"]
    );
}

#[test]
fn test_rem_parks_the_colliding_operand() {
    let mut types = TyTable::new();
    let int = types.int32();
    let mut func = Function::new("f");
    let a = func.new_local(int, "%l0");
    let b = func.new_local(int, "%l1");
    let t = func.new_temp(int, "%t0");
    func.value_mut(a).reg_id = 19;
    func.value_mut(b).reg_id = 20;
    func.value_mut(t).reg_id = 19;
    func.push(Inst::binary(Opcode::IMod, t, a, b));
    assert_eq!(
        select(&types, &mut func),
        vec!["mov w16, w19", "rem w19, w16, w20"]
    );
    // The operand's own register assignment is restored afterwards.
    assert_eq!(func.value(a).reg_id, 19);
}

#[test]
fn test_store_and_load_through_a_pointer() {
    let mut types = TyTable::new();
    let int = types.int32();
    let mut func = Function::new("f");
    let ptr = func.new_temp(int, "%t0");
    let src = func.new_local(int, "%l0");
    let dst = func.new_temp(int, "%t1");
    func.set_mem_addr(ptr, TMP_REG2, 8);
    func.value_mut(src).reg_id = 19;
    func.value_mut(dst).reg_id = 20;
    func.push(Inst::store(ptr, src));
    func.push(Inst::load(dst, ptr));
    assert_eq!(
        select(&types, &mut func),
        vec!["str w19, [x17,#8]", "ldr w20, [x17,#8]"]
    );
}

#[test]
fn test_prologue_pairs_protected_registers() {
    let mut types = TyTable::new();
    let mut func = Function::new("f");
    func.protected_regs = vec![FP_REG, LR_REG, 19];
    func.push(Inst::entry());
    assert_eq!(
        select(&types, &mut func),
        vec!["stp x29, x30, [sp,#-16]!", "str x19, [sp,#-16]!"]
    );
}

#[test]
fn test_epilogue_reverses_the_prologue() {
    let mut types = TyTable::new();
    let mut func = Function::new("f");
    func.protected_regs = vec![FP_REG, LR_REG, 19];
    func.push(Inst::exit(None));
    assert_eq!(
        select(&types, &mut func),
        vec!["ldr x19, [sp],#16", "ldp x29, x30, [sp],#16", "ret"]
    );
}

#[test]
fn test_jump_onto_own_label_dies() {
    let mut types = TyTable::new();
    let mut func = Function::new("f");
    let label = func.new_label();
    func.push(Inst::goto(label));
    func.push(Inst::label(label));
    assert_eq!(select(&types, &mut func), vec![".L0:"]);
}

#[test]
fn test_fmod_emits_the_sentinel_mnemonic() {
    let mut types = TyTable::new();
    let float = types.float();
    let mut func = Function::new("f");
    let a = func.new_local(float, "%l0");
    let b = func.new_local(float, "%l1");
    let t = func.new_temp(float, "%t0");
    func.value_mut(a).reg_id = 19;
    func.value_mut(b).reg_id = 20;
    func.value_mut(t).reg_id = 21;
    func.push(Inst::binary(Opcode::FMod, t, a, b));
    assert_eq!(select(&types, &mut func), vec!["fmod w21, w19, w20"]);
}

#[test]
fn test_arg_markers_emit_nothing() {
    let mut types = TyTable::new();
    let int = types.int32();
    let mut func = Function::new("f");
    let v = func.new_local(int, "%l0");
    func.value_mut(v).reg_id = 0;
    func.push(Inst::arg(v));
    assert!(select(&types, &mut func).is_empty());
}
