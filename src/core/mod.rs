//! Core types for solution-deploy
//!
//! - [`ItemTemplate`] and [`ResourcePath`], the entities produced by resolution
//!   and consumed by deployment
//! - [`item_type`], the portal item type names and registry keys
//! - [`SolutionError`], the typed error taxonomy, and [`Failure`], the single
//!   error shape returned across the public boundary
//! - [`ErrorContext`] and [`user_friendly_error`] for CLI display

pub mod error;
pub mod item_type;
pub mod template;

pub use error::{ErrorContext, Failure, SolutionError, Stage, find_solution_error, user_friendly_error};
pub use template::{DEFAULT_DEPLOYMENT_COST, ItemTemplate, ResourcePath};
