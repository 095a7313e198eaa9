use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use clap::Parser;
use log::info;

use tessera::capi;
use tessera::config::{ConfigTree, SimConfig, Topology};
use tessera::perf::dyn_info::DynamicInstructionInfo;
use tessera::perf::instruction::{BasicBlock, Instruction, InstructionType, Operand};
use tessera::sim::top::Simulator;

#[derive(Parser)]
#[command(version, about)]
struct TesseraArgs {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    total_tiles: Option<u32>,
    #[arg(long)]
    process_count: Option<u32>,
    #[arg(long)]
    core_model: Option<String>,
    #[arg(long)]
    pep_model: Option<String>,
}

pub fn main() {
    env_logger::init();
    let argv = TesseraArgs::parse();

    let tree = match &argv.config {
        Some(path) => ConfigTree::from_file(path).expect("cannot load config"),
        None => ConfigTree::empty(),
    };
    let mut config = SimConfig::new(tree);
    if let Some(tiles) = argv.total_tiles {
        config.general.total_tiles = tiles;
    }
    if let Some(procs) = argv.process_count {
        config.general.process_count = procs;
    }
    config.topology = Topology::new(config.general.total_tiles, config.general.process_count);
    if let Some(model) = argv.core_model {
        config.perf.core_model = model;
    }
    if let Some(model) = argv.pep_model {
        config.perf.pep_model = model;
    }

    let sim = Simulator::new(config);
    run_demo(&sim);
    sim.finish();
}

/// Feeds the calling tile's pipeline a short functional stream: a couple of
/// static blocks plus their memory side-information.
fn exercise_pipeline(sim: &Simulator) {
    let tile = sim
        .tiles()
        .current_tile()
        .expect("demo thread is not bound");
    let model = tile.main_model().clone();
    let block = Arc::new(BasicBlock::new(vec![
        Instruction::new(
            InstructionType::Add,
            1,
            vec![Operand::write_reg(1), Operand::read_reg(2)],
        ),
        Instruction::new(
            InstructionType::Load,
            2,
            vec![Operand::write_reg(3), Operand::read_mem()],
        ),
        Instruction::new(
            InstructionType::Store,
            1,
            vec![Operand::write_mem(), Operand::read_reg(3)],
        ),
    ]));
    for round in 0..8u64 {
        model.queue_basic_block(block.clone());
        model.push_dynamic_instruction_info(DynamicInstructionInfo::MemoryRead {
            address: 0x1000 + round * 8,
            latency: 10,
        });
        model.push_dynamic_instruction_info(DynamicInstructionInfo::MemoryWrite {
            address: 0x2000 + round * 8,
            latency: 4,
        });
        model.iterate();
    }
}

/// Built-in workload: one worker per remaining application tile.  Each
/// worker binds an endpoint, runs a mutex-protected update, reports back to
/// the primary endpoint, and meets the fleet at a barrier.
fn run_demo(sim: &Arc<Simulator>) {
    capi::initialize_thread(sim);
    capi::capi_initialize(sim, 0);
    capi::init_models(sim);

    let workers = sim.config().topology.app_tile_count() - 1;
    let mutex = capi::mutex_init(sim);
    let start_barrier = capi::barrier_init(sim, workers + 1);
    let counter = Arc::new(AtomicU64::new(0));

    let worker_sim = sim.clone();
    let worker_counter = counter.clone();
    let entry = sim.thread_manager().register_entry(Arc::new(move |arg| {
        let sim = &worker_sim;
        let rank = arg as i32;
        capi::capi_initialize(sim, rank);
        capi::barrier_wait(sim, start_barrier);
        capi::enable_models(sim);

        exercise_pipeline(sim);
        capi::mutex_lock(sim, mutex);
        worker_counter.fetch_add(arg, Ordering::SeqCst);
        capi::mutex_unlock(sim, mutex);
        capi::message_send_w(sim, rank, 0, &arg.to_le_bytes());

        capi::disable_models(sim);
    }));

    let spawned: Vec<i32> = (1..=workers as u64)
        .map(|rank| capi::spawn_thread(sim, entry, rank))
        .collect();

    capi::barrier_wait(sim, start_barrier);
    capi::enable_models(sim);

    exercise_pipeline(sim);
    let mut received = 0u64;
    for rank in 1..=workers as u64 {
        let mut buf = [0u8; 8];
        capi::message_receive_w(sim, rank as i32, 0, &mut buf);
        received += u64::from_le_bytes(buf);
    }

    capi::disable_models(sim);

    for tile in &spawned {
        capi::join_thread(sim, *tile);
    }

    let expected: u64 = (1..=workers as u64).sum();
    assert_eq!(counter.load(Ordering::SeqCst), expected);
    assert_eq!(received, expected);
    info!(
        "demo complete: {} workers, counter {}, received sum {}",
        workers, expected, received
    );
}
