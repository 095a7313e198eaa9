use crate::perf::instruction::{Instruction, InstructionType};
use crate::perf::model::{train_branch_predictor, CorePerfModel, ModelCore, Outcome};

/// Fixed-cost model: each instruction contributes its static cost plus the
/// latencies of its memory operands.
pub(crate) fn handle_instruction(
    model: &CorePerfModel,
    core: &mut ModelCore,
    instruction: &Instruction,
) -> Outcome {
    let infos = match model.take_instruction_infos(instruction) {
        Ok(infos) => infos,
        Err(_) => return Outcome::Suspended,
    };

    let mut cost = instruction.cost();
    let mut infos = infos.into_iter();
    for _operand in instruction.memory_operands() {
        let info = infos.next().expect("one info per memory operand");
        cost += info.latency();
    }
    if instruction.itype() == InstructionType::Branch {
        let info = infos.next().expect("branch info was validated");
        // The predictor observes the outcome; this model charges no penalty.
        train_branch_predictor(core, &info);
    }

    core.instruction_count += 1;
    core.cycle_count += cost;
    Outcome::Advanced
}
