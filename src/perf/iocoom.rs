use std::collections::HashMap;

use crate::config::IocoomConfig;
use crate::perf::dyn_info::DynamicInstructionInfo;
use crate::perf::instruction::{Instruction, InstructionType, OperandDirection, OperandKind};
use crate::perf::model::{train_branch_predictor, CorePerfModel, ModelCore, ModelVariant, Outcome};
use crate::perf::Cycle;

/// A fixed set of slots, each busy until its completion cycle.
#[derive(Debug)]
struct UnitQueue {
    slots: Vec<Cycle>,
}

impl UnitQueue {
    fn new(entries: usize) -> Self {
        assert!(entries > 0, "unit queue needs at least one slot");
        UnitQueue {
            slots: vec![0; entries],
        }
    }

    /// Claims the earliest free slot at or after `now`; returns when the
    /// operation starts and when it completes.
    fn execute(&mut self, now: Cycle, latency: Cycle) -> (Cycle, Cycle) {
        let (index, free_at) = self
            .slots
            .iter()
            .copied()
            .enumerate()
            .min_by_key(|&(_, free_at)| free_at)
            .expect("at least one slot");
        let start = now.max(free_at);
        let done = start + latency;
        self.slots[index] = done;
        (start, done)
    }

    fn reset(&mut self) {
        self.slots.fill(0);
    }
}

/// In-order-issue, out-of-order-completion bookkeeping: a register
/// scoreboard of ready cycles, a bounded load unit, and a bounded store
/// buffer.
pub(crate) struct IocoomState {
    register_ready: HashMap<u64, Cycle>,
    load_unit: UnitQueue,
    store_buffer: UnitQueue,
}

impl IocoomState {
    pub(crate) fn new(config: &IocoomConfig) -> Self {
        IocoomState {
            register_ready: HashMap::new(),
            load_unit: UnitQueue::new(config.outstanding_loads),
            store_buffer: UnitQueue::new(config.store_buffer_entries),
        }
    }

    pub(crate) fn reset(&mut self) {
        self.register_ready.clear();
        self.load_unit.reset();
        self.store_buffer.reset();
    }
}

pub(crate) fn handle_instruction(
    model: &CorePerfModel,
    core: &mut ModelCore,
    instruction: &Instruction,
) -> Outcome {
    let infos = match model.take_instruction_infos(instruction) {
        Ok(infos) => infos,
        Err(_) => return Outcome::Suspended,
    };

    // Spawn timing is accounted by the control plane, not this pipeline.
    // Its infos were consumed above so the FIFO stays aligned.
    if instruction.itype() == InstructionType::Spawn {
        return Outcome::Aborted;
    }

    let mem_count = instruction.memory_operand_count();
    let mispredicted = if instruction.itype() == InstructionType::Branch {
        train_branch_predictor(core, &infos[mem_count])
    } else {
        false
    };
    let penalty = core.mispredict_penalty;

    let ModelVariant::Iocoom(state) = &mut core.variant else {
        unreachable!("iocoom handler dispatched on a non-iocoom variant");
    };

    // In-order issue: wait until every source register is ready.
    let mut issue = core.cycle_count;
    for operand in instruction.operands() {
        if operand.kind == OperandKind::Register && operand.direction == OperandDirection::Read {
            issue = issue.max(*state.register_ready.get(&operand.value).unwrap_or(&0));
        }
    }

    let mut completion = issue + instruction.cost();
    let mut mem_infos = infos.iter().take(mem_count);
    for operand in instruction.memory_operands() {
        let info: &DynamicInstructionInfo = mem_infos.next().expect("validated on take");
        match operand.direction {
            OperandDirection::Read => {
                let (_, done) = state.load_unit.execute(issue, info.latency());
                completion = completion.max(done);
            }
            OperandDirection::Write => {
                // Stores retire in the background; a full buffer stalls the
                // pipeline until a slot frees up.
                let (start, _) = state.store_buffer.execute(issue, info.latency());
                completion = completion.max(start);
            }
        }
    }

    if mispredicted {
        completion += penalty;
    }

    for operand in instruction.operands() {
        if operand.kind == OperandKind::Register && operand.direction == OperandDirection::Write {
            state.register_ready.insert(operand.value, completion);
        }
    }

    core.instruction_count += 1;
    // Single-commit-per-cycle in-order retirement.
    core.cycle_count = (core.cycle_count + 1).max(completion);
    Outcome::Advanced
}
