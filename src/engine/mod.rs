//! Core engine: the resolve -> create duty cycle.

pub mod creation;
pub mod resolution;
pub mod scheduler;

pub use creation::CreationEngine;
pub use resolution::ResolutionEngine;
pub use scheduler::{CycleScheduler, StatusSnapshot};
