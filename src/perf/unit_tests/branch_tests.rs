use std::sync::Arc;

use crate::config::BranchPredictorConfig;
use crate::perf::branch::BranchPredictor;
use crate::perf::dyn_info::DynamicInstructionInfo;
use crate::perf::instruction::{BasicBlock, Instruction, InstructionType};
use crate::perf::model::{CoreKind, CorePerfModel};
use crate::perf::unit_tests::helpers::config_with_model;

fn one_bit_config() -> BranchPredictorConfig {
    BranchPredictorConfig {
        kind: "one_bit".to_string(),
        size: 16,
        mispredict_penalty: 14,
    }
}

#[test]
fn factory_returns_none_for_none() {
    let config = BranchPredictorConfig::default();
    assert!(BranchPredictor::create(&config).is_none());
}

#[test]
#[should_panic(expected = "invalid branch predictor type")]
fn unknown_predictor_kind_is_fatal() {
    let mut config = one_bit_config();
    config.kind = "oracle".to_string();
    let _ = BranchPredictor::create(&config);
}

#[test]
fn one_bit_predictor_learns_the_last_outcome() {
    let mut bp = BranchPredictor::create(&one_bit_config()).expect("predictor");
    let predicted = bp.predict(0x40, 0x80);
    assert!(!predicted);
    bp.update(predicted, true, 0x40, 0x80);
    assert!(bp.predict(0x40, 0x80));

    let summary = bp.summary();
    assert_eq!(summary.num_correct, 0);
    assert_eq!(summary.num_incorrect, 1);
}

#[test]
fn summary_accuracy_counts_predictions() {
    let mut bp = BranchPredictor::create(&one_bit_config()).expect("predictor");
    for _ in 0..3 {
        let predicted = bp.predict(0x10, 0x20);
        bp.update(predicted, true, 0x10, 0x20);
    }
    let summary = bp.summary();
    assert_eq!(summary.num_correct + summary.num_incorrect, 3);
    assert!((summary.accuracy - 2.0 / 3.0).abs() < 1e-9);
}

#[test]
fn iocoom_charges_the_mispredict_penalty() {
    let mut config = config_with_model("iocoom");
    config.perf.branch_predictor = one_bit_config();
    let model = CorePerfModel::create(1, CoreKind::Main, &config).expect("main model");
    model.enable();

    model.queue_basic_block(Arc::new(BasicBlock::new(vec![Instruction::new(
        InstructionType::Branch,
        1,
        vec![],
    )])));
    model.push_dynamic_instruction_info(DynamicInstructionInfo::Branch {
        taken: true,
        target: 0x200,
        address: 0x100,
    });
    model.queue_basic_block(Arc::new(BasicBlock::default()));
    model.iterate();
    // Cold predictor says not-taken, so the branch eats the penalty.
    assert_eq!(model.cycle_count(), 1 + 14);

    let summary = model.summary().branch_predictor.expect("predictor summary");
    assert_eq!(summary.num_incorrect, 1);
}

#[test]
fn branch_without_info_suspends() {
    let mut config = config_with_model("simple");
    config.perf.branch_predictor = one_bit_config();
    let model = CorePerfModel::create(1, CoreKind::Main, &config).expect("main model");
    model.enable();

    model.queue_basic_block(Arc::new(BasicBlock::new(vec![Instruction::new(
        InstructionType::Branch,
        2,
        vec![],
    )])));
    model.queue_basic_block(Arc::new(BasicBlock::default()));
    model.iterate();
    assert_eq!(model.cycle_count(), 0);

    model.push_dynamic_instruction_info(DynamicInstructionInfo::Branch {
        taken: false,
        target: 0x200,
        address: 0x100,
    });
    model.iterate();
    assert_eq!(model.cycle_count(), 2);
    assert_eq!(model.dynamic_info_queue_len(), 0);
}
