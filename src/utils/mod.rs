//! Terminal helpers.
//!
//! - [`progress`] - Progress bars and spinners for long-running commands

pub mod progress;

pub use progress::{ProgressBar, is_progress_disabled};
