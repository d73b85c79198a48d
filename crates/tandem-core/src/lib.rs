//! tandem-core library.
//!
//! Resolves the dependency closure of monorepo packages, derives each
//! package's next semantic version from its commit history, propagates
//! bumps through dependents and stages the resulting releases.
//!
//! # Conventions
//!
//! - **Errors**: library operations return [`error::TandemError`]; config
//!   loading returns `anyhow::Result` with a `TandemError` inside.
//! - **Logging**: `tracing` macros, never `println!`.
//! - **Side effects**: only through the [`collab`] traits.

pub mod collab;
pub mod config;
pub mod eligibility;
pub mod error;
pub mod graph;
pub mod history;
pub mod lock;
pub mod manifest;
pub mod propagate;
pub mod publish;
pub mod resolve;
pub mod run;
pub mod version;

pub use error::{ErrorCode, Ineligibility, TandemError};
pub use run::{RunOptions, RunReport, resolve_and_version, resolve_and_version_with};
pub use version::{Channel, Part, Version};
