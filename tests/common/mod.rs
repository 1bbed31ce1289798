//! Helpers shared by the test suites.

#![allow(dead_code)]

use assert_cmd::Command;
use serde_json::json;
use solution_deploy::core::ItemTemplate;
use solution_deploy::deploy::DeployOptions;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

/// Template with a title and the given dependencies, keyed `k<id>`.
pub fn template(id: &str, item_type: &str, deps: &[&str]) -> ItemTemplate {
    let mut template = ItemTemplate::new(id, item_type, format!("k{id}"));
    template.item.insert("title".to_string(), json!(id.to_uppercase()));
    template.item.insert("type".to_string(), json!(item_type));
    for dep in deps {
        template.add_dependency(*dep);
    }
    template
}

/// Ids of `templates`, in order.
pub fn ids(templates: &[ItemTemplate]) -> Vec<String> {
    templates.iter().map(|t| t.item_id.clone()).collect()
}

/// Deploy options without copy throttling.
pub fn fast_options() -> DeployOptions {
    DeployOptions {
        resource_copy_delay: Duration::ZERO,
        ..DeployOptions::default()
    }
}

/// A scratch directory with a config path for running the binary.
pub struct TestEnv {
    pub dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("temp dir"),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("config.toml")
    }

    /// `soldeploy` with `--config` pointing into the scratch dir and progress off.
    pub fn soldeploy(&self) -> Command {
        let mut cmd = Command::cargo_bin("soldeploy").expect("binary is built");
        cmd.arg("--config")
            .arg(self.config_path())
            .arg("--no-progress")
            .env_remove("SOLDEPLOY_CONFIG_PATH")
            .env_remove("RUST_LOG")
            .env("NO_COLOR", "1");
        cmd
    }
}
