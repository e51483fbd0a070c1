//! # Orderly Sync - Offline Synchronization Engine
//!
//! Reconciles mutation queues from intermittently offline POS devices
//! against shared server state.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SyncEngine                                     │
//! │                                                                         │
//! │  upload_batch ─────► BatchApplier ──► SyncActionValidator (core)        │
//! │                          │       ──► ConflictDetector    (core)         │
//! │                          │       ──► EntityMutator  ──► entities        │
//! │                          │       ──► ConflictStore  ──► conflicts       │
//! │                          └─────────► journal (sync_records)             │
//! │                                                                         │
//! │  resolve_conflict ─► ConflictResolver ──► ConflictStore / mutator       │
//! │  download_changes ─► ChangeFeedProvider ──► entities (read-only)        │
//! │  status ──────────► SyncStatusTracker ──► journal + conflicts           │
//! │                                                                         │
//! │  EntityLocks serialize each (entity_type, entity_id) across all.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//! - **Idempotency**: every action carries a stable id; retried batches
//!   replay recorded outcomes instead of reapplying
//! - **Disputed data is never overwritten**: a conflicting action parks in
//!   the conflict store until an operator resolves it
//! - **At-least-once feed**: the watermark protocol can repeat changes but
//!   never drops one
//!
//! ## Example
//! ```rust,no_run
//! use orderly_db::{Database, DbConfig};
//! use orderly_sync::{EngineConfig, SyncEngine};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(DbConfig::new("orderly.db")).await?;
//! let engine = SyncEngine::new(&db, EngineConfig::default());
//!
//! let status = engine.status("rest-1", None).await?;
//! println!("health: {:?}", status.sync_health);
//! # Ok(())
//! # }
//! ```

pub mod applier;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod locks;
pub mod mutator;
pub mod resolver;
pub mod status;
pub mod store;

pub use applier::{BatchApplier, BatchOutcome, ConflictSummary, ProcessedAction};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::EngineConfig;
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
pub use feed::{ChangeFeedProvider, ChangeSet};
pub use locks::EntityLocks;
pub use mutator::{EntityMutator, MutationError, StoreMutator};
pub use resolver::{ConflictResolver, ResolutionOutcome};
pub use status::{SyncHealth, SyncStatusReport, SyncStatusTracker};
pub use store::ConflictStore;
