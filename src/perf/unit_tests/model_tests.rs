use std::sync::Arc;

use crate::perf::dyn_info::{DynamicInstructionInfo, InfoNotAvailable};
use crate::perf::instruction::{BasicBlock, Instruction, InstructionType, Operand};
use crate::perf::unit_tests::helpers::enabled_model;

fn add(cost: u64) -> Instruction {
    Instruction::new(
        InstructionType::Add,
        cost,
        vec![Operand::write_reg(1), Operand::read_reg(2)],
    )
}

fn load(cost: u64) -> Instruction {
    Instruction::new(
        InstructionType::Load,
        cost,
        vec![Operand::write_reg(3), Operand::read_mem()],
    )
}

fn read_info(latency: u64) -> DynamicInstructionInfo {
    DynamicInstructionInfo::MemoryRead {
        address: 0x1000,
        latency,
    }
}

fn sentinel() -> Arc<BasicBlock> {
    Arc::new(BasicBlock::new(vec![add(1)]))
}

#[test]
fn simple_block_charges_static_cost_plus_latencies() {
    let model = enabled_model("simple");
    model.queue_basic_block(Arc::new(BasicBlock::new(vec![add(1), load(2)])));
    model.push_dynamic_instruction_info(read_info(5));
    model.queue_basic_block(sentinel());
    model.iterate();
    assert_eq!(model.cycle_count(), 8);
    assert_eq!(model.dynamic_info_queue_len(), 0);
    assert_eq!(model.instruction_count(), 2);
}

#[test]
fn last_block_is_never_drained() {
    let model = enabled_model("simple");
    model.queue_basic_block(Arc::new(BasicBlock::new(vec![add(7)])));
    model.iterate();
    assert_eq!(model.cycle_count(), 0);
    assert_eq!(model.basic_block_queue_len(), 1);
    // A block enqueued behind it unblocks the head.
    model.queue_basic_block(sentinel());
    model.iterate();
    assert_eq!(model.cycle_count(), 7);
    assert_eq!(model.basic_block_queue_len(), 1);
}

#[test]
fn empty_block_pops_with_zero_cost() {
    let model = enabled_model("simple");
    model.queue_basic_block(Arc::new(BasicBlock::default()));
    model.queue_basic_block(sentinel());
    model.iterate();
    assert_eq!(model.cycle_count(), 0);
    assert_eq!(model.basic_block_queue_len(), 1);
}

#[test]
fn no_memory_operands_never_touch_info_queue() {
    let model = enabled_model("simple");
    model.push_dynamic_instruction_info(read_info(9));
    model.queue_basic_block(Arc::new(BasicBlock::new(vec![add(1), add(2)])));
    model.queue_basic_block(sentinel());
    model.iterate();
    assert_eq!(model.cycle_count(), 3);
    assert_eq!(model.dynamic_info_queue_len(), 1);
}

#[test]
fn iterate_is_idempotent_when_info_is_available() {
    let model = enabled_model("simple");
    model.queue_basic_block(Arc::new(BasicBlock::new(vec![add(1), load(2)])));
    model.push_dynamic_instruction_info(read_info(5));
    model.queue_basic_block(sentinel());
    model.iterate();
    let after_first = model.cycle_count();
    model.iterate();
    assert_eq!(model.cycle_count(), after_first);
}

#[test]
fn drain_suspends_and_resumes_mid_block() {
    let model = enabled_model("simple");
    model.queue_basic_block(Arc::new(BasicBlock::new(vec![load(2), add(1)])));
    model.iterate();
    assert_eq!(model.cycle_count(), 0);

    model.push_dynamic_instruction_info(read_info(4));
    model.queue_basic_block(sentinel());
    model.iterate();
    // LOAD.cost + latency, then ADD.cost; the head block is popped.
    assert_eq!(model.cycle_count(), 7);
    assert_eq!(model.basic_block_queue_len(), 1);
    assert_eq!(model.dynamic_info_queue_len(), 0);
}

#[test]
fn missing_info_consumes_nothing() {
    let model = enabled_model("simple");
    let two_loads = Instruction::new(
        InstructionType::Load,
        2,
        vec![Operand::read_mem(), Operand::read_mem()],
    );
    model.queue_basic_block(Arc::new(BasicBlock::new(vec![two_loads])));
    model.queue_basic_block(sentinel());
    model.push_dynamic_instruction_info(read_info(5));
    model.iterate();
    // All-or-nothing: one of two infos present, so neither is consumed.
    assert_eq!(model.cycle_count(), 0);
    assert_eq!(model.dynamic_info_queue_len(), 1);

    model.push_dynamic_instruction_info(read_info(7));
    model.iterate();
    assert_eq!(model.cycle_count(), 2 + 5 + 7);
    assert_eq!(model.dynamic_info_queue_len(), 0);
}

#[test]
fn disabled_model_discards_enqueues() {
    let model = enabled_model("simple");
    model.disable();
    model.queue_basic_block(Arc::new(BasicBlock::new(vec![add(1)])));
    model.queue_dynamic_instruction(add(1));
    model.push_dynamic_instruction_info(read_info(5));
    assert_eq!(model.basic_block_queue_len(), 0);
    assert_eq!(model.dynamic_info_queue_len(), 0);
}

#[test]
fn disable_mid_drain_retains_blocks_until_reenable() {
    let model = enabled_model("simple");
    model.queue_basic_block(Arc::new(BasicBlock::new(vec![add(3)])));
    model.queue_basic_block(sentinel());
    model.disable();
    model.iterate();
    assert_eq!(model.cycle_count(), 0);
    assert_eq!(model.basic_block_queue_len(), 2);

    model.enable();
    model.iterate();
    assert_eq!(model.cycle_count(), 3);
    assert_eq!(model.basic_block_queue_len(), 1);
}

#[test]
fn enable_disable_pair_leaves_queues_empty() {
    let model = enabled_model("simple");
    model.disable();
    model.enable();
    model.disable();
    assert_eq!(model.basic_block_queue_len(), 0);
    assert_eq!(model.dynamic_info_queue_len(), 0);
    assert_eq!(model.cycle_count(), 0);
}

#[test]
fn dynamic_instructions_get_their_own_blocks() {
    let model = enabled_model("simple");
    model.queue_dynamic_instruction(add(4));
    model.queue_dynamic_instruction(add(6));
    assert_eq!(model.basic_block_queue_len(), 2);
    model.iterate();
    assert_eq!(model.cycle_count(), 4);
    assert_eq!(model.basic_block_queue_len(), 1);
}

#[test]
fn info_queue_head_access_and_pop() {
    let model = enabled_model("simple");
    assert_eq!(model.get_dynamic_instruction_info(), Err(InfoNotAvailable));
    model.push_dynamic_instruction_info(read_info(5));
    model.push_dynamic_instruction_info(read_info(6));
    assert_eq!(model.get_dynamic_instruction_info(), Ok(read_info(5)));
    model.pop_dynamic_instruction_info();
    assert_eq!(model.get_dynamic_instruction_info(), Ok(read_info(6)));
}

#[test]
#[should_panic(expected = "expected memory")]
fn info_direction_mismatch_is_fatal() {
    let model = enabled_model("simple");
    model.queue_basic_block(Arc::new(BasicBlock::new(vec![load(2)])));
    model.push_dynamic_instruction_info(DynamicInstructionInfo::MemoryWrite {
        address: 0x2000,
        latency: 3,
    });
    model.queue_basic_block(sentinel());
    model.iterate();
}

#[test]
#[should_panic(expected = "growing too big")]
fn info_queue_overflow_is_fatal() {
    let model = enabled_model("simple");
    for _ in 0..5000 {
        model.push_dynamic_instruction_info(read_info(1));
    }
}

#[test]
#[should_panic(expected = "expected some dynamic info")]
fn pop_on_empty_queue_is_fatal() {
    let model = enabled_model("simple");
    model.pop_dynamic_instruction_info();
}

#[test]
#[should_panic(expected = "MCP tile")]
fn enabling_the_mcp_model_is_fatal() {
    use crate::perf::model::{CoreKind, CorePerfModel};
    use crate::perf::unit_tests::helpers::config_with_model;

    let config = config_with_model("simple");
    let mcp_tile = config.topology.mcp_tile();
    let model = CorePerfModel::create(mcp_tile, CoreKind::Main, &config).expect("main model");
    model.enable();
}

#[test]
#[should_panic(expected = "invalid core perf model type")]
fn unknown_model_name_is_fatal() {
    use crate::perf::model::{CoreKind, CorePerfModel};
    use crate::perf::unit_tests::helpers::config_with_model;

    let config = config_with_model("mystery");
    let _ = CorePerfModel::create(0, CoreKind::Main, &config);
}

#[test]
fn reset_clears_queues_and_counters() {
    let model = enabled_model("simple");
    model.queue_basic_block(Arc::new(BasicBlock::new(vec![add(5)])));
    model.queue_basic_block(sentinel());
    model.push_dynamic_instruction_info(read_info(1));
    model.iterate();
    assert!(model.cycle_count() > 0);

    model.reset();
    assert_eq!(model.cycle_count(), 0);
    assert_eq!(model.instruction_count(), 0);
    assert_eq!(model.basic_block_queue_len(), 0);
    assert_eq!(model.dynamic_info_queue_len(), 0);
}
