pub mod summary;
pub mod top;

#[cfg(test)]
mod unit_tests;

pub use top::Simulator;
