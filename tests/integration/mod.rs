//! Integration test suite for solution-deploy
//!
//! End-to-end flows against the in-memory portal from `test_utils`: creating
//! a solution from a source portal, deploying it into a destination, and
//! driving the `soldeploy` binary.
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **resolve**: Dependency discovery and solution creation
//! - **deploy**: Replaying a solution and failure behavior
//! - **cli**: Command-line surface

#[path = "../common/mod.rs"]
mod common;

mod cli;
mod deploy;
mod resolve;
