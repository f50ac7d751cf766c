//! PROPHET: autonomous oracle agent for an on-chain prediction market.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod sources;
pub mod oracle;
pub mod ledger;
pub mod engine;
pub mod report;
pub mod dashboard;
