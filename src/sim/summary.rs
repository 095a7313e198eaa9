use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use log::info;
use serde::Serialize;

use crate::control::mcp::McpSummary;
use crate::perf::branch::BranchPredictorSummary;
use crate::perf::model::CorePerfSummary;

static PERF_RUN_DIR: OnceLock<PathBuf> = OnceLock::new();

pub fn perf_run_dir() -> Option<PathBuf> {
    if let Some(path) = PERF_RUN_DIR.get() {
        return Some(path.clone());
    }

    let root = env::var("TESSERA_PERF_LOG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("performance_logs"));
    if fs::create_dir_all(&root).is_err() {
        return None;
    }

    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let pid = std::process::id();
    let run_dir = root.join(format!("run_{ts}_{pid}"));
    if fs::create_dir_all(&run_dir).is_err() {
        return None;
    }

    let _ = PERF_RUN_DIR.set(run_dir.clone());
    Some(run_dir)
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub per_core: Vec<CorePerfSummary>,
    pub total: AggregateSummary,
    pub mcp: McpSummary,
}

#[derive(Debug, Default, Serialize)]
pub struct AggregateSummary {
    pub num_cores: usize,
    pub instructions: u64,
    pub max_cycle_count: u64,
    pub max_completion_time: f64,
    pub branch_predictor: BranchPredictorSummary,
}

pub fn aggregate_summaries(per_core: &[CorePerfSummary]) -> AggregateSummary {
    let mut total = AggregateSummary::default();
    total.num_cores = per_core.len();

    for core in per_core {
        total.instructions = total.instructions.saturating_add(core.instructions);
        total.max_cycle_count = total.max_cycle_count.max(core.cycle_count);
        total.max_completion_time = total.max_completion_time.max(core.completion_time);
        if let Some(bp) = &core.branch_predictor {
            total.branch_predictor.num_correct = total
                .branch_predictor
                .num_correct
                .saturating_add(bp.num_correct);
            total.branch_predictor.num_incorrect = total
                .branch_predictor
                .num_incorrect
                .saturating_add(bp.num_incorrect);
        }
    }

    let predictions =
        total.branch_predictor.num_correct + total.branch_predictor.num_incorrect;
    if predictions > 0 {
        total.branch_predictor.accuracy =
            total.branch_predictor.num_correct as f64 / predictions as f64;
    }

    total
}

pub fn write_summary(per_core: Vec<CorePerfSummary>, mcp: McpSummary) {
    let total = aggregate_summaries(&per_core);
    info!(
        "run complete: {} instructions, longest completion time {:.1}",
        total.instructions, total.max_completion_time
    );

    let run_dir = match perf_run_dir() {
        Some(dir) => dir,
        None => return,
    };
    let summary = RunSummary {
        total,
        per_core,
        mcp,
    };
    let path = run_dir.join("summary.json");
    if let Ok(payload) = serde_json::to_string_pretty(&summary) {
        let _ = fs::write(path, payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(cycles: u64, instructions: u64) -> CorePerfSummary {
        CorePerfSummary {
            tile_id: 0,
            core: "main",
            model: "simple",
            instructions,
            cycle_count: cycles,
            completion_time: cycles as f64,
            average_frequency: 1.0,
            branch_predictor: None,
        }
    }

    #[test]
    fn aggregate_takes_maxima_and_sums() {
        let total = aggregate_summaries(&[summary(100, 10), summary(250, 5)]);
        assert_eq!(total.num_cores, 2);
        assert_eq!(total.instructions, 15);
        assert_eq!(total.max_cycle_count, 250);
        assert_eq!(total.max_completion_time, 250.0);
    }
}
