//! Equivalence harness for the lanewise engine.
//!
//! Every scenario builds a small module, runs it under native vector codegen
//! and under scalar-lowered codegen at each tier, and requires bit-identical
//! results that also match a host-computed expectation.
//!
//! ```no_run
//! use lanewise_harness::Driver;
//!
//! let report = Driver::builtin().run_matching(Some("all_true"));
//! print!("{}", report.render_text());
//! assert!(report.is_success());
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod host;
pub mod registry;
pub mod runner;
pub mod scenarios;

pub use config::{LanewiseConfig, ReportFormat};
pub use driver::{Driver, Outcome, RunReport, ScenarioCtx, ScenarioReport};
pub use error::HarnessError;
pub use registry::{Coverage, Registry, Scenario};
pub use runner::{ExecConfig, Instance, Runner};
