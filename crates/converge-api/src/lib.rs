//! Converge API
//!
//! The remote service boundary: a [`RemoteApi`] trait expressed in model
//! types, and an [`HttpClient`] that implements it with `reqwest`.
//!
//! # Core Concepts
//!
//! - **Change sets**: every read and write names a change set. Writes are
//!   staged there until merged or abandoned.
//! - **Not found**: lookups return `Ok(None)` only for a 404. Any other
//!   failure is an [`ApiError`].
//!
//! # Example
//!
//! ```rust,ignore
//! use converge_api::{ClientConfig, HttpClient, RemoteApi};
//!
//! let client = HttpClient::new(ClientConfig {
//!     base_url: "http://localhost:5380".into(),
//!     workspace_id: "01HZX...".into(),
//!     api_token: token,
//!     timeout: Duration::from_secs(30),
//! })?;
//! let head = client.head_change_set().await?;
//! let schema = client.find_schema(&head, "AWS::EC2::Instance").await?;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod client;
pub mod error;
pub mod remote;
pub mod types;

pub use client::{ClientConfig, HttpClient};
pub use error::{optional, ApiError, ApiResult};
pub use remote::RemoteApi;
pub use types::{
    is_unset_marker, unset_marker, ChangeSetSummary, ComponentUpdate, ComponentView,
    CreateFunction, CreatedSchema, DefaultVariant, SchemaSummary, UpdateFunction,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
