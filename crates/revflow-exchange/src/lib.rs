//! revflow exchange engine
//!
//! Builds data exchange revisions out of assets that the backend materializes
//! through asynchronous jobs.
//!
//! # Flow
//!
//! ```text
//! RevisionManager::build
//!   │
//!   ├─ create revision (or reopen + seed KnownIdSet)
//!   │
//!   ├─ for each AssetSpec, in order ───────────────────────────┐
//!   │     submit_job ──► [signed upload: hash ► PUT ► start]   │
//!   │        │                                                 │
//!   │     poll_job (Waiting/InProgress ► Completed)            │
//!   │        │                                                 │
//!   │     reconcile_new_asset (listing − KnownIdSet = 1 id)    │
//!   │        └─► KnownIdSet + id ──────────────────────────────┘
//!   │
//!   └─ finalize (optional)
//! ```
//!
//! Specs are never processed concurrently: the reconciler can only attribute
//! a new asset to a job while exactly one job is in flight.
//!
//! # Example
//!
//! ```ignore
//! use revflow_exchange::{RevisionManager, RevisionPlan};
//! use revflow_cloud::AssetSpec;
//! use tokio_util::sync::CancellationToken;
//!
//! let manager = RevisionManager::new(api, revflow_config::EngineConfig::load()?);
//! let plan = RevisionPlan::new("data-set-id")
//!     .with_comment("2024-06 drop")
//!     .with_asset(AssetSpec::import_from_cloud_storage("bucket", "prices.csv"))
//!     .with_asset(AssetSpec::import_from_signed_upload("./local/extra.csv"))
//!     .finalized(true);
//!
//! let built = manager.create(&plan, &CancellationToken::new()).await?;
//! ```

pub mod error;
pub mod finalize;
pub mod lifecycle;
pub mod poll;
pub mod reconcile;
pub mod submit;
pub mod upload;

pub use error::{ExchangeError, Result, UploadError};
pub use finalize::{apply_comment, prepare_delete, set_finalized};
pub use lifecycle::{BuildPolicy, RevisionManager, RevisionPlan, RevisionSnapshot};
pub use poll::{PollAction, PollConfig, next_action, poll_job};
pub use reconcile::{KnownIdSet, list_all_assets, reconcile_new_asset};
pub use submit::{start_job, submit_job};
pub use upload::{FileDigest, UploadStreamer, digest_file};
