use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::trace;
use serde::Serialize;

use crate::config::SimConfig;
use crate::perf::branch::{BranchPredictor, BranchPredictorSummary};
use crate::perf::dyn_info::{DynamicInstructionInfo, InfoNotAvailable};
use crate::perf::instruction::{BasicBlock, Instruction, InstructionType, QueuedBlock};
use crate::perf::iocoom::IocoomState;
use crate::perf::{iocoom, magic, simple};
use crate::perf::Cycle;

/// Growth past this bound means the drain has fallen pathologically behind
/// the front-end.
pub const DYN_INFO_QUEUE_LIMIT: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreKind {
    Main,
    Pep,
}

impl CoreKind {
    fn as_str(&self) -> &'static str {
        match self {
            CoreKind::Main => "main",
            CoreKind::Pep => "pep",
        }
    }
}

/// What `handle_instruction` did with the instruction at the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Modeled; the cursor advances.
    Advanced,
    /// Skipped by the variant; the cursor still advances.
    Aborted,
    /// Required info is missing; the drain returns with the cursor and both
    /// queues untouched so a later `iterate` resumes here.
    Suspended,
}

pub(crate) enum ModelVariant {
    Simple,
    Iocoom(IocoomState),
    Magic,
    MagicPep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VariantKind {
    Simple,
    Iocoom,
    Magic,
    MagicPep,
}

impl ModelVariant {
    fn kind(&self) -> VariantKind {
        match self {
            ModelVariant::Simple => VariantKind::Simple,
            ModelVariant::Iocoom(_) => VariantKind::Iocoom,
            ModelVariant::Magic => VariantKind::Magic,
            ModelVariant::MagicPep => VariantKind::MagicPep,
        }
    }

    fn name(&self) -> &'static str {
        match self.kind() {
            VariantKind::Simple => "simple",
            VariantKind::Iocoom => "iocoom",
            VariantKind::Magic => "magic",
            VariantKind::MagicPep => "magic_pep",
        }
    }
}

pub(crate) struct ModelCore {
    pub cycle_count: Cycle,
    pub checkpointed_cycle_count: Cycle,
    pub frequency: f64,
    pub average_frequency: f64,
    pub total_time: f64,
    pub instruction_count: u64,
    pub branch_predictor: Option<BranchPredictor>,
    pub mispredict_penalty: Cycle,
    pub(crate) variant: ModelVariant,
    current_ins_index: usize,
    basic_blocks: VecDeque<QueuedBlock>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CorePerfSummary {
    pub tile_id: u32,
    pub core: &'static str,
    pub model: &'static str,
    pub instructions: u64,
    pub cycle_count: Cycle,
    pub completion_time: f64,
    pub average_frequency: f64,
    pub branch_predictor: Option<BranchPredictorSummary>,
}

/// Per-core performance model: the front-end enqueues basic blocks and
/// dynamic side-information; the drain replays them into a cycle count.
///
/// The `core` lock doubles as the basic-block queue lock and is held for an
/// entire drain; the dynamic-info queue has its own lock, taken transiently.
/// Never hold both in any other order.
pub struct CorePerfModel {
    tile_id: u32,
    kind: CoreKind,
    is_mcp_tile: bool,
    modeling_configured: bool,
    enabled: AtomicBool,
    core: Mutex<ModelCore>,
    dyn_info_queue: Mutex<VecDeque<DynamicInstructionInfo>>,
}

impl CorePerfModel {
    /// Instantiates the model configured for this tile and core kind, or
    /// `None` for a PEP slot configured off.  Unknown model names are fatal.
    pub fn create(tile_id: u32, kind: CoreKind, config: &SimConfig) -> Option<Arc<CorePerfModel>> {
        let is_mcp_tile = tile_id == config.topology.mcp_tile();
        let variant = match kind {
            CoreKind::Main => match config.perf.core_model.as_str() {
                "simple" => ModelVariant::Simple,
                "iocoom" => ModelVariant::Iocoom(IocoomState::new(&config.perf.iocoom)),
                "magic" => ModelVariant::Magic,
                other => panic!("invalid core perf model type: {}", other),
            },
            CoreKind::Pep => {
                // The MCP tile never carries a PEP core.
                if is_mcp_tile {
                    return None;
                }
                match config.perf.pep_model.as_str() {
                    "none" => return None,
                    "magic" => ModelVariant::MagicPep,
                    other => panic!("invalid pep perf model type: {}", other),
                }
            }
        };
        Some(Arc::new(CorePerfModel {
            tile_id,
            kind,
            is_mcp_tile,
            modeling_configured: config.performance_modeling_enabled(),
            enabled: AtomicBool::new(false),
            core: Mutex::new(ModelCore {
                cycle_count: 0,
                checkpointed_cycle_count: 0,
                frequency: config.perf.frequency,
                average_frequency: 0.0,
                total_time: 0.0,
                instruction_count: 0,
                branch_predictor: BranchPredictor::create(&config.perf.branch_predictor),
                mispredict_penalty: config.perf.branch_predictor.mispredict_penalty,
                variant,
                current_ins_index: 0,
                basic_blocks: VecDeque::new(),
            }),
            dyn_info_queue: Mutex::new(VecDeque::new()),
        }))
    }

    pub fn tile_id(&self) -> u32 {
        self.tile_id
    }

    pub fn kind(&self) -> CoreKind {
        self.kind
    }

    pub fn is_mcp_tile(&self) -> bool {
        self.is_mcp_tile
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn enable(&self) {
        assert!(
            !self.is_mcp_tile,
            "attempted to enable the MCP tile's performance model"
        );
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    fn modeling_active(&self) -> bool {
        self.modeling_configured && self.is_enabled()
    }

    /// Wraps a single front-end instruction in a fresh dynamic basic block.
    /// Discarded outright when modeling is off.
    pub fn queue_dynamic_instruction(&self, instruction: Instruction) {
        if !self.modeling_active() {
            return;
        }
        let mut bb = BasicBlock::default();
        bb.push(instruction);
        let mut core = self.lock_core();
        core.basic_blocks.push_back(QueuedBlock::Dynamic(bb));
    }

    /// Enqueues a shared static block.  No-op while disabled.
    pub fn queue_basic_block(&self, block: Arc<BasicBlock>) {
        if !self.modeling_active() {
            return;
        }
        let mut core = self.lock_core();
        core.basic_blocks.push_back(QueuedBlock::Static(block));
    }

    pub fn push_dynamic_instruction_info(&self, info: DynamicInstructionInfo) {
        if !self.modeling_active() {
            return;
        }
        let mut queue = self.lock_dyn_info();
        queue.push_back(info);
        assert!(
            queue.len() < DYN_INFO_QUEUE_LIMIT,
            "dynamic info queue is growing too big"
        );
    }

    pub fn pop_dynamic_instruction_info(&self) {
        if !self.modeling_active() {
            return;
        }
        let mut queue = self.lock_dyn_info();
        assert!(
            !queue.is_empty(),
            "expected some dynamic info to be available"
        );
        queue.pop_front();
    }

    pub fn get_dynamic_instruction_info(
        &self,
    ) -> Result<DynamicInstructionInfo, InfoNotAvailable> {
        let queue = self.lock_dyn_info();
        queue.front().copied().ok_or(InfoNotAvailable)
    }

    pub fn dynamic_info_queue_len(&self) -> usize {
        self.lock_dyn_info().len()
    }

    pub fn basic_block_queue_len(&self) -> usize {
        self.lock_core().basic_blocks.len()
    }

    /// Drains queued blocks up to the sentinel.  The last block is never
    /// drained: one in-flight block must remain behind the one being
    /// processed so that late-arriving info has a well-defined owner.
    pub fn iterate(&self) {
        if !self.is_enabled() {
            return;
        }
        let mut core = self.lock_core();
        while core.basic_blocks.len() > 1 {
            let block = core.basic_blocks.pop_front().expect("checked above");
            loop {
                let index = core.current_ins_index;
                let Some(instruction) = block.block().get(index) else {
                    break;
                };
                match self.handle_instruction(&mut core, instruction) {
                    Outcome::Advanced | Outcome::Aborted => core.current_ins_index += 1,
                    Outcome::Suspended => {
                        trace!(
                            "tile {} {}: info not available at instruction {}",
                            self.tile_id,
                            self.kind.as_str(),
                            index
                        );
                        core.basic_blocks.push_front(block);
                        return;
                    }
                }
            }
            // A dynamic block is owned by the queue and dropped here; a
            // static block only drops its handle.
            drop(block);
            core.current_ins_index = 0;
        }
    }

    fn handle_instruction(&self, core: &mut ModelCore, instruction: &Instruction) -> Outcome {
        match core.variant.kind() {
            VariantKind::Simple => simple::handle_instruction(self, core, instruction),
            VariantKind::Iocoom => iocoom::handle_instruction(self, core, instruction),
            VariantKind::Magic => magic::handle_instruction(self, core, instruction, false),
            VariantKind::MagicPep => magic::handle_instruction(self, core, instruction, true),
        }
    }

    /// Pops every info the instruction demands, or none at all: if the queue
    /// holds fewer entries than needed the caller suspends and retries with
    /// identical expectations.  Entries are validated against the operand
    /// order before any of them is consumed; a mismatch is fatal.
    pub(crate) fn take_instruction_infos(
        &self,
        instruction: &Instruction,
    ) -> Result<Vec<DynamicInstructionInfo>, InfoNotAvailable> {
        let demand = instruction.info_demand();
        if demand == 0 {
            return Ok(Vec::new());
        }
        let mut queue = self.lock_dyn_info();
        if queue.len() < demand {
            return Err(InfoNotAvailable);
        }
        assert!(
            queue.len() < DYN_INFO_QUEUE_LIMIT,
            "dynamic info queue is growing too big"
        );
        let mut slot = 0;
        for operand in instruction.memory_operands() {
            let info = queue[slot];
            assert!(
                info.matches_direction(operand.direction),
                "expected memory {:?} info, got {:?}",
                operand.direction,
                info
            );
            slot += 1;
        }
        if instruction.itype() == InstructionType::Branch {
            let info = queue[slot];
            assert!(info.is_branch(), "expected branch info, got {:?}", info);
        }
        Ok(queue.drain(..demand).collect())
    }

    // -- frequency accounting

    /// Called on thread start.
    pub fn set_cycle_count(&self, cycle_count: Cycle) {
        let mut core = self.lock_core();
        core.cycle_count = cycle_count;
        core.checkpointed_cycle_count = cycle_count;
        if let ModelVariant::Iocoom(ref mut state) = core.variant {
            state.reset();
        }
    }

    pub fn cycle_count(&self) -> Cycle {
        self.lock_core().cycle_count
    }

    pub fn frequency(&self) -> f64 {
        self.lock_core().frequency
    }

    pub fn average_frequency(&self) -> f64 {
        self.lock_core().average_frequency
    }

    pub fn total_time(&self) -> f64 {
        self.lock_core().total_time
    }

    pub fn instruction_count(&self) -> u64 {
        self.lock_core().instruction_count
    }

    /// Called on thread exit and whenever the frequency changes.
    pub fn recompute_average_frequency(&self) {
        let mut core = self.lock_core();
        Self::recompute_locked(&mut core);
    }

    fn recompute_locked(core: &mut ModelCore) {
        let cycles_elapsed = (core.cycle_count - core.checkpointed_cycle_count) as f64;
        let total_cycles_executed = core.average_frequency * core.total_time + cycles_elapsed;
        let total_time_taken = core.total_time + cycles_elapsed / core.frequency;
        if total_time_taken > 0.0 {
            core.average_frequency = total_cycles_executed / total_time_taken;
        }
        core.total_time = total_time_taken;
        core.checkpointed_cycle_count = core.cycle_count;
    }

    pub fn update_on_frequency_change(&self, frequency: f64) {
        let mut core = self.lock_core();
        Self::recompute_locked(&mut core);
        core.frequency = frequency;
    }

    /// Clears both queues and zeroes the counters; the clock keeps its
    /// configured frequency.
    pub fn reset(&self) {
        let mut core = self.lock_core();
        core.basic_blocks.clear();
        core.current_ins_index = 0;
        core.cycle_count = 0;
        core.checkpointed_cycle_count = 0;
        core.average_frequency = 0.0;
        core.total_time = 0.0;
        core.instruction_count = 0;
        if let Some(bp) = core.branch_predictor.as_mut() {
            bp.reset();
        }
        if let ModelVariant::Iocoom(ref mut state) = core.variant {
            state.reset();
        }
        drop(core);
        self.lock_dyn_info().clear();
    }

    pub fn summary(&self) -> CorePerfSummary {
        let core = self.lock_core();
        CorePerfSummary {
            tile_id: self.tile_id,
            core: self.kind.as_str(),
            model: core.variant.name(),
            instructions: core.instruction_count,
            cycle_count: core.cycle_count,
            completion_time: core.cycle_count as f64 / core.frequency,
            average_frequency: core.average_frequency,
            branch_predictor: core.branch_predictor.as_ref().map(|bp| bp.summary()),
        }
    }

    fn lock_core(&self) -> std::sync::MutexGuard<'_, ModelCore> {
        self.core.lock().expect("basic block queue lock poisoned")
    }

    fn lock_dyn_info(&self) -> std::sync::MutexGuard<'_, VecDeque<DynamicInstructionInfo>> {
        self.dyn_info_queue
            .lock()
            .expect("dynamic info queue lock poisoned")
    }
}

/// Runs the consumed branch info through the owned predictor.  Returns true
/// on a misprediction.
pub(crate) fn train_branch_predictor(core: &mut ModelCore, info: &DynamicInstructionInfo) -> bool {
    let DynamicInstructionInfo::Branch {
        taken,
        target,
        address,
    } = *info
    else {
        panic!("expected branch info, got {:?}", info);
    };
    match core.branch_predictor.as_mut() {
        Some(bp) => {
            let predicted = bp.predict(address, target);
            bp.update(predicted, taken, address, target);
            predicted != taken
        }
        None => false,
    }
}
