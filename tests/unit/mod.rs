//! Unit test suite for solution-deploy.
//!
//! Exercises the public building blocks in isolation: deploy ordering,
//! placeholder templatizing and substitution, and the template dictionary.
//!
//! ```bash
//! cargo test --test unit
//! ```

#[path = "../common/mod.rs"]
mod common;

mod sequencing;
mod templating;
