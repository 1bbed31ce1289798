//! Configuration management for soldeploy.
//!
//! A single user-wide file, `~/.soldeploy/config.toml`, holds named portal
//! profiles (url, username, token) and deployment tuning. Solutions never
//! carry credentials; commands name a profile (`--source`, `--dest`) and the
//! token is looked up here.
//!
//! See [`global`] for the file format and location rules.

pub mod global;

pub use global::{DeployConfig, GlobalConfig, PortalProfile};
