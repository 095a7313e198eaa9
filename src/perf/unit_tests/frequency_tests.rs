use std::sync::Arc;

use crate::perf::instruction::{BasicBlock, Instruction, InstructionType};
use crate::perf::model::{CoreKind, CorePerfModel};
use crate::perf::unit_tests::helpers::config_with_model;

fn model_at(frequency: f64) -> Arc<CorePerfModel> {
    let mut config = config_with_model("simple");
    config.perf.frequency = frequency;
    let model = CorePerfModel::create(1, CoreKind::Main, &config).expect("main model");
    model.enable();
    model
}

fn advance(model: &CorePerfModel, cycles: u64) {
    model.queue_basic_block(Arc::new(BasicBlock::new(vec![Instruction::new(
        InstructionType::Generic,
        cycles,
        vec![],
    )])));
    model.queue_basic_block(Arc::new(BasicBlock::default()));
    model.iterate();
}

#[test]
fn average_frequency_times_total_time_tracks_cycles() {
    let model = model_at(2.0);
    advance(&model, 50);
    model.recompute_average_frequency();
    assert!((model.average_frequency() * model.total_time() - 50.0).abs() < 1e-6);
    assert!((model.average_frequency() - 2.0).abs() < 1e-9);

    model.update_on_frequency_change(4.0);
    advance(&model, 100);
    model.recompute_average_frequency();
    // 50 cycles at 2 GHz plus 100 at 4 GHz.
    assert!((model.average_frequency() * model.total_time() - 150.0).abs() < 1e-6);
    assert!((model.frequency() - 4.0).abs() < 1e-9);
}

#[test]
fn recompute_is_idempotent_without_new_cycles() {
    let model = model_at(1.5);
    advance(&model, 30);
    model.recompute_average_frequency();
    let average = model.average_frequency();
    let total_time = model.total_time();
    model.recompute_average_frequency();
    assert!((model.average_frequency() - average).abs() < 1e-9);
    assert!((model.total_time() - total_time).abs() < 1e-9);
}

#[test]
fn set_cycle_count_moves_the_checkpoint() {
    let model = model_at(1.0);
    model.set_cycle_count(1000);
    assert_eq!(model.cycle_count(), 1000);
    // No cycles elapsed since the checkpoint, so nothing accrues.
    model.recompute_average_frequency();
    assert_eq!(model.total_time(), 0.0);
}

#[test]
fn summary_reports_completion_time_in_cycles_over_frequency() {
    let model = model_at(2.0);
    advance(&model, 80);
    let summary = model.summary();
    assert_eq!(summary.cycle_count, 80);
    assert!((summary.completion_time - 40.0).abs() < 1e-9);
    assert_eq!(summary.model, "simple");
    assert_eq!(summary.core, "main");
    assert_eq!(summary.instructions, 1);
}
