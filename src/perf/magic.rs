use crate::perf::instruction::{Instruction, InstructionType};
use crate::perf::model::{train_branch_predictor, CorePerfModel, ModelCore, Outcome};
use crate::perf::Cycle;

fn is_modeled(itype: InstructionType, pep: bool) -> bool {
    if pep {
        // The PEP core models inter-tile operations only.
        matches!(
            itype,
            InstructionType::Recv | InstructionType::Sync | InstructionType::Spawn
        )
    } else {
        matches!(itype, InstructionType::Recv)
    }
}

/// Filtered model: instructions in the modeled set contribute their static
/// cost, everything else a flat cost of 1.  Memory-operand info is consumed
/// and its latency charged regardless of modeling, so the info FIFO stays
/// aligned with the instruction stream.
pub(crate) fn handle_instruction(
    model: &CorePerfModel,
    core: &mut ModelCore,
    instruction: &Instruction,
    pep: bool,
) -> Outcome {
    let infos = match model.take_instruction_infos(instruction) {
        Ok(infos) => infos,
        Err(_) => return Outcome::Suspended,
    };

    let mut cost: Cycle = 0;
    let mut infos = infos.into_iter();
    for _operand in instruction.memory_operands() {
        let info = infos.next().expect("one info per memory operand");
        cost += info.latency();
    }
    if instruction.itype() == InstructionType::Branch {
        let info = infos.next().expect("branch info was validated");
        train_branch_predictor(core, &info);
    }

    cost += if is_modeled(instruction.itype(), pep) {
        instruction.cost()
    } else {
        1
    };

    core.instruction_count += 1;
    core.cycle_count += cost;
    Outcome::Advanced
}
