pub mod branch;
pub mod dyn_info;
pub mod instruction;
pub mod model;

mod iocoom;
mod magic;
mod simple;

#[cfg(test)]
mod unit_tests;

pub type Cycle = u64;

pub use branch::{BranchPredictor, BranchPredictorSummary};
pub use dyn_info::{DynamicInstructionInfo, InfoNotAvailable};
pub use instruction::{
    BasicBlock, Instruction, InstructionType, Operand, OperandDirection, OperandKind,
};
pub use model::{CoreKind, CorePerfModel, CorePerfSummary, Outcome, DYN_INFO_QUEUE_LIMIT};
