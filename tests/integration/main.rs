//! Integration tests: engines driven end to end against an in-memory
//! ledger and deterministic truth sources.

mod mock_ledger;

mod resolution;
mod scheduler;
