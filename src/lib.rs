//! VERDICT — Adaptive probability fusion and staking engine.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod prob;
pub mod voting;
pub mod calibrate;
pub mod controller;
pub mod risk;
pub mod ledger;
pub mod sources;
pub mod storage;
pub mod engine;
