//! revflow cloud model
//!
//! Domain types and the remote API abstraction for building data exchange
//! revisions out of asynchronously materialized assets.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                revflow-exchange                  │
//! │     (submit / upload / poll / reconcile)         │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                 revflow-cloud                    │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │           API Abstraction                 │   │
//! │  │  trait ExchangeApi { ... }                │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │ Model types  │  │  State Mgmt  │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼───────────┐
//! │  remote service   │
//! │ (or in-memory)    │
//! └───────────────────┘
//! ```

pub mod api;
pub mod asset;
pub mod error;
pub mod job;
#[cfg(feature = "test-utils")]
pub mod memory;
pub mod revision;
pub mod state;

// Re-exports
pub use api::{AssetPage, ExchangeApi};
pub use asset::{Asset, AssetDetails, AssetSpec, MaterializedAsset};
pub use error::{CloudError, Result};
pub use job::{
    CreatedJob, JobDetails, JobError, JobRequest, JobSnapshot, JobState, JobType, SignedUpload,
};
#[cfg(feature = "test-utils")]
pub use memory::{ApiCall, InMemoryExchange, JobScript};
pub use revision::{CreateRevision, Revision, RevisionId, RevisionUpdate};
pub use state::{GlobalState, RevisionState, StateLock, StateStore};
