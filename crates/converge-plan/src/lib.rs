//! Converge Plan
//!
//! Pure reconciliation: no I/O, no clock, no randomness.
//!
//! # Core Concepts
//!
//! - [`plan`]: desired schemas + observed remote state → ordered [`Plan`]
//! - [`diff_attributes`]: desired + current attributes → [`AttributeDiff`]
//! - [`PlanOptions`]: overlay-only and builtin-override modes
//!
//! # Example
//!
//! ```rust,ignore
//! use converge_plan::{plan, PlanOptions};
//!
//! let plan = plan(&report.schemas, &observed, PlanOptions::default());
//! if plan.is_empty() {
//!     return Ok(()); // nothing to apply, no change set opened
//! }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod diff;
mod planner;

pub use diff::{diff_attributes, AttributeDiff};
pub use planner::{
    plan, FunctionUnbind, FunctionUpdate, Plan, PlanError, PlanIssue, PlanOptions, SchemaPlan,
    SchemaTarget,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
