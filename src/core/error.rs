//! Error handling for solution-deploy
//!
//! Two layers of error types live here:
//! 1. [`SolutionError`], the strongly-typed taxonomy every internal stage raises
//!    (usually wrapped in an [`anyhow::Error`] with extra context).
//! 2. [`Failure`], the single error shape that crosses the public boundary of
//!    the resolve, sequence and deploy operations. Callers never need to match
//!    on stage-specific error types: a failure says which stage failed, which
//!    item ids were involved, and carries the original cause chain.
//!
//! The CLI additionally converts errors into an [`ErrorContext`], which adds a
//! human-readable suggestion and optional details before printing in color.
//!
//! # Examples
//!
//! ```rust,no_run
//! use solution_deploy::core::{Failure, SolutionError, Stage};
//!
//! let err = anyhow::Error::from(SolutionError::CreationFailed {
//!     item_id: "y".to_string(),
//!     item_type: "Web Map".to_string(),
//!     reason: "HTTP 500".to_string(),
//! });
//! let failure = Failure::from_anyhow(Stage::Deploy, err);
//! assert_eq!(failure.item_ids, vec!["y".to_string()]);
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The typed failure cases raised while resolving, sequencing and deploying.
#[derive(Error, Debug)]
pub enum SolutionError {
    /// The id does not resolve as an item nor as a group.
    #[error("Item or group not found: {item_id}")]
    ItemNotFound {
        /// Source id that was looked up
        item_id: String,
    },

    /// Fetching or parsing an item (or one of its dependencies) failed.
    #[error("Failed to resolve item '{item_id}': {reason}")]
    ResolutionFailed {
        /// Item whose resolution failed
        item_id: String,
        /// Description of the failure
        reason: String,
    },

    /// A converter reported an item as depending on itself.
    #[error("Item '{item_id}' lists itself as a dependency")]
    SelfDependency {
        /// Offending item id
        item_id: String,
    },

    /// The dependency graph contains a cycle; no order can be produced.
    #[error("Cyclical dependency graph detected: {}", cycle.join(" → "))]
    CyclicDependency {
        /// Item ids along the cycle, first id repeated at the end
        cycle: Vec<String>,
    },

    /// An item failed to materialize in the destination portal.
    #[error("Failed to create {item_type} from template '{item_id}': {reason}")]
    CreationFailed {
        /// Source id of the template that failed
        item_id: String,
        /// Item type of the template
        item_type: String,
        /// Description of the failure
        reason: String,
    },

    /// An item was created but a follow-up step (resource copy) failed.
    #[error("Created '{created_id}' from template '{item_id}', but post-processing failed: {reason}")]
    PostProcessFailed {
        /// Source id of the template
        item_id: String,
        /// Id of the item already created in the destination
        created_id: String,
        /// Description of the failure
        reason: String,
    },

    /// A template still references placeholders the dictionary cannot satisfy.
    #[error("Template '{item_id}' has unresolved placeholders: {}", placeholders.join(", "))]
    UnresolvedPlaceholders {
        /// Source id of the template being materialized
        item_id: String,
        /// Placeholder text (including braces) that failed to resolve
        placeholders: Vec<String>,
    },

    /// The template dictionary was written twice for the same key.
    #[error("Template dictionary already has an entry for '{key}'")]
    DuplicateDictionaryEntry {
        /// Dictionary key that was written twice
        key: String,
    },

    /// A template is structurally invalid for its item type.
    #[error("Invalid template '{item_id}': {reason}")]
    InvalidTemplate {
        /// Source id of the template
        item_id: String,
        /// What is wrong with it
        reason: String,
    },

    /// The portal answered with an error object.
    #[error("Portal error during {operation}: {message} (code {code})")]
    PortalError {
        /// REST operation that failed (e.g. "addItem")
        operation: String,
        /// Portal error code
        code: i64,
        /// Portal error message
        message: String,
    },

    /// The portal could not be reached.
    #[error("Network error during {operation}: {reason}")]
    NetworkError {
        /// REST operation that failed
        operation: String,
        /// Transport error description
        reason: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl SolutionError {
    /// Item ids named by this error, if any.
    #[must_use]
    pub fn item_ids(&self) -> Vec<String> {
        match self {
            Self::ItemNotFound {
                item_id,
            }
            | Self::ResolutionFailed {
                item_id,
                ..
            }
            | Self::SelfDependency {
                item_id,
            }
            | Self::CreationFailed {
                item_id,
                ..
            }
            | Self::PostProcessFailed {
                item_id,
                ..
            }
            | Self::UnresolvedPlaceholders {
                item_id,
                ..
            }
            | Self::InvalidTemplate {
                item_id,
                ..
            } => vec![item_id.clone()],
            Self::CyclicDependency {
                cycle,
            } => {
                let mut ids = cycle.clone();
                // The closing id repeats the first one.
                if ids.len() > 1 && ids.first() == ids.last() {
                    ids.pop();
                }
                ids
            }
            _ => Vec::new(),
        }
    }
}

/// Which internal stage produced a [`Failure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Dependency discovery and template creation
    Resolve,
    /// Topological ordering
    Sequence,
    /// Replaying templates into the destination
    Deploy,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Resolve => write!(f, "resolve"),
            Stage::Sequence => write!(f, "sequence"),
            Stage::Deploy => write!(f, "deploy"),
        }
    }
}

/// Uniform error value returned by every public core operation.
///
/// `item_ids` is filled from the typed [`SolutionError`] found in the cause
/// chain, so callers can report the failing item without downcasting.
#[derive(Debug)]
pub struct Failure {
    /// Stage that failed
    pub stage: Stage,
    /// Top-level message
    pub message: String,
    /// Item ids implicated in the failure (may be empty)
    pub item_ids: Vec<String>,
    /// Underlying cause
    pub cause: Option<anyhow::Error>,
}

impl Failure {
    /// Create a failure without an underlying cause.
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            item_ids: Vec::new(),
            cause: None,
        }
    }

    /// Wrap an internal error, extracting item ids from the outermost
    /// [`SolutionError`] attached to it.
    pub fn from_anyhow(stage: Stage, error: anyhow::Error) -> Self {
        let item_ids = find_solution_error(&error).map(SolutionError::item_ids).unwrap_or_default();
        Self {
            stage,
            message: format!("{error:#}"),
            item_ids,
            cause: Some(error),
        }
    }

    /// The outermost [`SolutionError`] in the cause chain, if any.
    #[must_use]
    pub fn solution_error(&self) -> Option<&SolutionError> {
        self.cause.as_ref().and_then(find_solution_error)
    }

    /// Whether this failure was caused by a cyclic dependency graph.
    #[must_use]
    pub fn is_cyclic(&self) -> bool {
        matches!(self.solution_error(), Some(SolutionError::CyclicDependency { .. }))
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.message)
    }
}

impl std::error::Error for Failure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_ref().map(|cause| {
            let source: &(dyn std::error::Error + Send + Sync + 'static) = cause.as_ref();
            source as &(dyn std::error::Error + 'static)
        })
    }
}

/// Find the typed error in an [`anyhow::Error`], whether it was the original
/// error or attached later as context.
#[must_use]
pub fn find_solution_error(error: &anyhow::Error) -> Option<&SolutionError> {
    error
        .downcast_ref::<SolutionError>()
        .or_else(|| error.chain().find_map(|cause| cause.downcast_ref::<SolutionError>()))
}

/// Error context wrapper that provides user-friendly error information
///
/// When displayed, errors show the message in red, optional details in
/// yellow and an optional suggestion in green.
#[derive(Debug)]
pub struct ErrorContext {
    /// Main error message
    pub message: String,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details about the error
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.message);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

/// Convert any error into a user-friendly [`ErrorContext`].
///
/// Known [`SolutionError`] variants get tailored suggestions; everything else
/// is reported with its full cause chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let failure = error.downcast_ref::<Failure>();
    let typed = failure.and_then(Failure::solution_error).or_else(|| find_solution_error(&error));

    let mut message = error.to_string();
    match failure {
        // The failure message already carries the whole cause chain.
        Some(failure) if !failure.item_ids.is_empty() => {
            message.push_str(&format!("\n\nFailing item(s): {}", failure.item_ids.join(", ")));
        }
        Some(_) => {}
        None => {
            let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
            if !chain.is_empty() {
                message.push_str("\n\nCaused by:");
                for (i, cause) in chain.iter().enumerate() {
                    message.push_str(&format!("\n  {}: {}", i + 1, cause));
                }
            }
        }
    }

    let ctx = ErrorContext::new(message);
    match typed {
        Some(SolutionError::CyclicDependency {
            ..
        }) => ctx
            .with_suggestion("Break the cycle in the source items; templates that reference each other cannot be ordered")
            .with_details("Every item must be created after the items it references"),
        Some(SolutionError::SelfDependency {
            ..
        }) => ctx.with_details("A converter reported the item as its own dependency"),
        Some(SolutionError::UnresolvedPlaceholders {
            ..
        }) => ctx
            .with_suggestion("Supply the missing values with --set key=value or recreate the solution")
            .with_details("Every {{...}} placeholder must resolve from the template dictionary"),
        Some(SolutionError::CreationFailed {
            ..
        })
        | Some(SolutionError::PostProcessFailed {
            ..
        }) => ctx.with_details(
            "Items created before the failure were left in place; deployment is not transactional",
        ),
        Some(SolutionError::ItemNotFound {
            ..
        }) => ctx.with_suggestion("Check the item id and that the portal profile can see it"),
        Some(SolutionError::PortalError {
            code: 498 | 499,
            ..
        }) => ctx.with_suggestion("The portal token is invalid or expired; update it in the config file"),
        Some(SolutionError::NetworkError {
            ..
        }) => ctx.with_suggestion("Check your network connection and the portal url"),
        Some(SolutionError::ConfigError {
            ..
        })
        | Some(SolutionError::TomlError(_)) => {
            ctx.with_suggestion("Run 'soldeploy config path' to locate the config file and check its syntax")
        }
        _ => ctx,
    }
}
