//! Integration test suite for hdvault.
//!
//! Exercises the address manager end to end over both store backends and
//! checks its invariants under randomized inputs.

pub mod helpers;
