//! solution-deploy: copy GIS Solutions between portal instances.
//!
//! A *solution* is a bundle of portal items (feature services, web maps,
//! apps, dashboards, groups) stored as one Solution item. Creating a solution
//! walks every item a root references, turns each into an [`core::ItemTemplate`]
//! whose cross-references are `{{key.itemId}}`-style placeholders, and stores
//! the templates. Deploying one sorts the templates so dependencies come
//! first, then recreates them in a destination portal while a
//! [`templating::TemplateDictionary`] maps every placeholder to the ids and
//! urls of the freshly created items.
//!
//! # Architecture Overview
//!
//! ```text
//!   source portal ──► resolver ──► converters ──► TemplateStore ──► Solution item
//!                                                                        │
//!   destination ◄── deploy::Replayer ◄── resolver::sort_templates ◄──────┘
//! ```
//!
//! # Core Modules
//!
//! - [`cli`] - `soldeploy` command surface
//! - [`config`] - Global config (`~/.soldeploy/config.toml`): portal profiles and deploy settings
//! - [`core`] - Templates, item types and the error model
//! - [`portal`] - Portal read/write traits and the REST client
//! - [`converters`] - Per-type templatize/create logic
//! - [`resolver`] - Dependency resolution and the deploy order
//! - [`templating`] - Placeholders, the template dictionary and field templatization
//! - [`deploy`] - Creation replay with throttled resource copies
//! - [`solution`] - Create, plan and deploy whole solutions
//! - [`utils`] - Progress bars
//!
//! # Example
//!
//! ```rust,no_run
//! use solution_deploy::converters::ConverterRegistry;
//! use solution_deploy::portal::RestPortal;
//! use solution_deploy::solution::{CreateSolutionRequest, create_solution};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let portal = RestPortal::new("https://org.example.com/portal", "casey", Some("token".into()));
//! let registry = ConverterRegistry::with_defaults();
//! let request = CreateSolutionRequest::new("Permit Review", vec!["4f2e8a".to_string()]);
//! let created = create_solution(&portal, &portal, &registry, &request).await?;
//! println!("solution {}", created.solution_id);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod constants;
pub mod converters;
pub mod core;
pub mod deploy;
pub mod portal;
pub mod resolver;
pub mod solution;
pub mod templating;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
