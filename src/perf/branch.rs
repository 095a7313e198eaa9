use serde::Serialize;

use crate::config::BranchPredictorConfig;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BranchPredictorSummary {
    pub num_correct: u64,
    pub num_incorrect: u64,
    pub accuracy: f64,
}

/// Concrete predictors, selected by configuration.
#[derive(Debug)]
pub enum BranchPredictor {
    OneBit(OneBitPredictor),
}

impl BranchPredictor {
    pub fn create(config: &BranchPredictorConfig) -> Option<BranchPredictor> {
        match config.kind.as_str() {
            "none" => None,
            "one_bit" => Some(BranchPredictor::OneBit(OneBitPredictor::new(config.size))),
            other => panic!("invalid branch predictor type: {}", other),
        }
    }

    pub fn predict(&mut self, address: u64, target: u64) -> bool {
        match self {
            BranchPredictor::OneBit(p) => p.predict(address, target),
        }
    }

    pub fn update(&mut self, predicted: bool, actual: bool, address: u64, target: u64) {
        match self {
            BranchPredictor::OneBit(p) => p.update(predicted, actual, address, target),
        }
    }

    pub fn summary(&self) -> BranchPredictorSummary {
        match self {
            BranchPredictor::OneBit(p) => p.summary(),
        }
    }

    pub fn reset(&mut self) {
        match self {
            BranchPredictor::OneBit(p) => p.reset(),
        }
    }
}

/// One taken-bit per entry, indexed by instruction address.
#[derive(Debug)]
pub struct OneBitPredictor {
    bits: Vec<bool>,
    num_correct: u64,
    num_incorrect: u64,
}

impl OneBitPredictor {
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "branch predictor size must be > 0");
        OneBitPredictor {
            bits: vec![false; size],
            num_correct: 0,
            num_incorrect: 0,
        }
    }

    fn index(&self, address: u64) -> usize {
        (address as usize) % self.bits.len()
    }

    pub fn predict(&mut self, address: u64, _target: u64) -> bool {
        self.bits[self.index(address)]
    }

    pub fn update(&mut self, predicted: bool, actual: bool, address: u64, _target: u64) {
        if predicted == actual {
            self.num_correct += 1;
        } else {
            self.num_incorrect += 1;
        }
        let index = self.index(address);
        self.bits[index] = actual;
    }

    pub fn summary(&self) -> BranchPredictorSummary {
        let total = self.num_correct + self.num_incorrect;
        BranchPredictorSummary {
            num_correct: self.num_correct,
            num_incorrect: self.num_incorrect,
            accuracy: if total == 0 {
                0.0
            } else {
                self.num_correct as f64 / total as f64
            },
        }
    }

    pub fn reset(&mut self) {
        self.bits.fill(false);
        self.num_correct = 0;
        self.num_incorrect = 0;
    }
}
