//! Converge Core
//!
//! Remote state fetching, transactional apply, subscription resolution and
//! the top-level operations built from them.
//!
//! # Architecture
//!
//! ```text
//! schemas/ → TreeScanner ─┐
//!                         ├→ plan → ChangeSet::run(apply_plan)
//! HEAD → fetch_observed ──┘
//!
//! document → resolve_subscriptions → diff_attributes → ChangeSet::run(update)
//! ```
//!
//! # Core Concepts
//!
//! - [`ChangeSet`]: one server-side staging area per invocation, abandoned
//!   when the batch fails
//! - [`apply_plan`]: executes a plan in fixed order and stops at the first
//!   failing call
//! - [`resolve_component`]: turns a name or query into a canonical id, or
//!   fails; never guesses
//! - [`Reconciler`]: the operations behind every CLI subcommand
//!
//! # Example
//!
//! ```rust,ignore
//! use converge_api::HttpClient;
//! use converge_core::{ConvergeConfig, Reconciler};
//!
//! let config = ConvergeConfig::load(None)?;
//! let client = HttpClient::new(config.client_config()?)?;
//! let report = Reconciler::new(&client, config).push_schemas(false).await?;
//! println!("{} mutations", report.plan.mutation_count());
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod apply;
pub mod changeset;
pub mod component;
pub mod config;
pub mod error;
pub mod fetch;
pub mod ops;
pub mod resolve;

pub use apply::{apply_plan, ApplyReport};
pub use changeset::ChangeSet;
pub use component::{update_from_diff, ComponentChange, ComponentDocument};
pub use config::ConvergeConfig;
pub use error::{ConvergeError, ConvergeResult, ResolveError};
pub use fetch::{fetch_observed, fetch_schema};
pub use ops::{
    definition_from_remote, generate_overlay, PullReport, PushReport, Reconciler, SkippedUnit,
};
pub use resolve::{is_canonical_id, resolve_component, resolve_subscriptions};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving reconciliation
    pub use crate::config::ConvergeConfig;
    pub use crate::error::{ConvergeError, ConvergeResult};
    pub use crate::ops::{PullReport, PushReport, Reconciler};
    pub use converge_api::RemoteApi;
    pub use converge_plan::{Plan, PlanOptions};
}
