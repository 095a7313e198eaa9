use std::sync::Arc;

use crate::perf::Cycle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionType {
    Generic,
    Add,
    Sub,
    Mul,
    Div,
    Jmp,
    Branch,
    Load,
    Store,
    Recv,
    Sync,
    Spawn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    Register,
    Memory,
    Immediate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandDirection {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operand {
    pub kind: OperandKind,
    pub direction: OperandDirection,
    /// Register id, effective-address placeholder, or immediate value.
    pub value: u64,
}

impl Operand {
    pub fn read_reg(reg: u64) -> Self {
        Operand {
            kind: OperandKind::Register,
            direction: OperandDirection::Read,
            value: reg,
        }
    }

    pub fn write_reg(reg: u64) -> Self {
        Operand {
            kind: OperandKind::Register,
            direction: OperandDirection::Write,
            value: reg,
        }
    }

    pub fn read_mem() -> Self {
        Operand {
            kind: OperandKind::Memory,
            direction: OperandDirection::Read,
            value: 0,
        }
    }

    pub fn write_mem() -> Self {
        Operand {
            kind: OperandKind::Memory,
            direction: OperandDirection::Write,
            value: 0,
        }
    }

    pub fn immediate(value: u64) -> Self {
        Operand {
            kind: OperandKind::Immediate,
            direction: OperandDirection::Read,
            value,
        }
    }

    pub fn is_memory(&self) -> bool {
        self.kind == OperandKind::Memory
    }
}

#[derive(Debug, Clone)]
pub struct Instruction {
    itype: InstructionType,
    cost: Cycle,
    operands: Vec<Operand>,
}

impl Instruction {
    pub fn new(itype: InstructionType, cost: Cycle, operands: Vec<Operand>) -> Self {
        Instruction {
            itype,
            cost,
            operands,
        }
    }

    pub fn itype(&self) -> InstructionType {
        self.itype
    }

    pub fn cost(&self) -> Cycle {
        self.cost
    }

    pub fn operands(&self) -> &[Operand] {
        &self.operands
    }

    pub fn memory_operands(&self) -> impl Iterator<Item = &Operand> {
        self.operands.iter().filter(|op| op.is_memory())
    }

    pub fn memory_operand_count(&self) -> usize {
        self.memory_operands().count()
    }

    /// Number of dynamic-info entries the model must see before it can
    /// process this instruction: one per memory operand, plus the resolved
    /// outcome for a branch.
    pub fn info_demand(&self) -> usize {
        self.memory_operand_count() + usize::from(self.itype == InstructionType::Branch)
    }
}

/// Immutable once enqueued.
#[derive(Debug, Clone, Default)]
pub struct BasicBlock {
    instructions: Vec<Instruction>,
}

impl BasicBlock {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        BasicBlock { instructions }
    }

    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }
}

/// Dynamic blocks are owned by the queue and dropped on drain; static blocks
/// are shared with the front-end and only the handle is dropped.
#[derive(Debug)]
pub enum QueuedBlock {
    Dynamic(BasicBlock),
    Static(Arc<BasicBlock>),
}

impl QueuedBlock {
    pub fn block(&self) -> &BasicBlock {
        match self {
            QueuedBlock::Dynamic(bb) => bb,
            QueuedBlock::Static(bb) => bb,
        }
    }
}
