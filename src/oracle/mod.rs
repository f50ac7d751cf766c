//! Classification and evaluation: description text in, decision out.

pub mod description;
pub mod evaluator;

pub use description::parse;
pub use evaluator::OutcomeEvaluator;
