//! Test utilities for solution-deploy
//!
//! - [`InMemoryPortal`], a portal fake implementing both reader and writer
//! - [`fixtures`], small builders for source items
//! - [`init_test_logging`], a once-only tracing initializer
//!
//! # Example
//!
//! ```rust,no_run
//! use serde_json::json;
//! use solution_deploy::test_utils::InMemoryPortal;
//!
//! let portal = InMemoryPortal::default();
//! portal.add_item(json!({"id": "map1", "type": "Web Map", "title": "Parcels"}));
//! ```

pub mod fixtures;
pub mod portal;

pub use portal::InMemoryPortal;

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has any effect. Uses `level` if given, otherwise
/// `RUST_LOG`; with neither, logging stays off.
///
/// ```bash
/// RUST_LOG=solution_deploy=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}
