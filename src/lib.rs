//! routecheck: regression testing for routing profiles.
//!
//! Routes every test case twice, once with an expected (baseline) profile
//! and once with the actual profile under test, and reports the cases whose
//! geometries differ.
//!
//! # Architecture
//!
//! The main components are:
//!
//! - **Queue**: A bounded-concurrency run queue for async work items
//! - **Routing**: Clients for the routing service (BRouter)
//! - **Orchestrator**: Turns test cases into queued route comparisons
//! - **Report**: Generate run reports (console, JUnit XML)
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::time::Duration;
//!
//! use routecheck::config::load_config;
//! use routecheck::orchestrator::Orchestrator;
//! use routecheck::report::NullReporter;
//! use routecheck::routing::BrouterClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config(Path::new("routecheck.toml"))?;
//!     let base_dir = Path::new(".");
//!
//!     let client = BrouterClient::new(
//!         &config.routecheck.brouter_uri,
//!         Duration::from_secs(config.routecheck.request_timeout_secs),
//!     )?;
//!     let orchestrator = Orchestrator::new(client, NullReporter, &config.queue);
//!
//!     let result = orchestrator
//!         .run_suite(config.profiles.resolve(base_dir)?, config.load_cases(base_dir)?)
//!         .await?;
//!     println!("{} of {} routes match", result.passed, result.total_cases);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod geometry;
pub mod orchestrator;
pub mod queue;
pub mod report;
pub mod routing;

// Re-export commonly used types
pub use config::{Config, load_config};
pub use orchestrator::{Orchestrator, RunResult, TestCase};
pub use queue::{QueueError, RunHandle, RunQueue, WorkPanic};
pub use report::Reporter;
pub use routing::{BrouterClient, RouteClient};
