//! Constants shared across modules.

/// Default spacing between resource copy starts, in milliseconds.
pub const DEFAULT_RESOURCE_COPY_DELAY_MS: u64 = 1000;

/// Default number of resource copies in flight per item.
pub const DEFAULT_MAX_PARALLEL_COPIES: usize = 4;

/// Environment variable overriding the global config path.
pub const CONFIG_PATH_ENV: &str = "SOLDEPLOY_CONFIG_PATH";

/// Environment variable disabling progress bars.
pub const NO_PROGRESS_ENV: &str = "SOLDEPLOY_NO_PROGRESS";

/// Type keywords marking a stored solution.
pub const SOLUTION_TYPE_KEYWORDS: [&str; 2] = ["Solution", "Template"];

/// Type keywords marking a deployed solution.
pub const DEPLOYED_TYPE_KEYWORDS: [&str; 2] = ["Solution", "Deployed"];
