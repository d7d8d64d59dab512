//! Converge Scan
//!
//! The boundary between schema trees on disk and the desired-state model.
//!
//! # Core Operations
//!
//! - **Scan**: Read a schema root into validated [`SchemaDefinition`]s
//! - **Write**: Serialize schemas back to the same layout (used by pull)
//! - **Scaffold**: Create a new overlay function from a kind template
//!
//! # Architecture
//!
//! ```text
//! schemas/ → TreeScanner → ScanReport { schemas, issues } → planner
//!
//! remote → SchemaDefinition → TreeWriter → schemas/
//! ```
//!
//! Validation problems never abort a scan. They are collected as
//! [`ScanIssue`]s and only the offending schema or function is skipped.
//!
//! # Example
//!
//! ```rust,ignore
//! use converge_scan::TreeScanner;
//!
//! let report = TreeScanner::new().scan("schemas").await?;
//! for issue in &report.issues {
//!     eprintln!("{}: {}", issue.path.display(), issue.error);
//! }
//! ```
//!
//! [`SchemaDefinition`]: converge_model::SchemaDefinition

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod error;
pub mod layout;
pub mod overlay;
pub mod scanner;
pub mod writer;

pub use error::{ScanError, ScanResult};
pub use overlay::{scaffold_overlay, OverlayScaffold};
pub use scanner::{ScanIssue, ScanReport, TreeScanner};
pub use writer::TreeWriter;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with schema trees
    pub use crate::error::{ScanError, ScanResult};
    pub use crate::scanner::{ScanIssue, ScanReport, TreeScanner};
    pub use crate::writer::TreeWriter;
    pub use converge_model::{FunctionDefinition, SchemaDefinition, SchemaFields};
}
