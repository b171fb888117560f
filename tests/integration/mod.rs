//! Integration test suite for updraft
//!
//! End-to-end tests of the public API and the `updraft` binary. Network tests run
//! against an in-process HTTP server bound to `127.0.0.1`.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **update_flow**: check → download → verify → apply through `UpdateClient`,
//!   rollback on apply failure, pruning, persisted history
//! - **cli**: the binary's commands and error output

mod common;

mod cli;
mod update_flow;
