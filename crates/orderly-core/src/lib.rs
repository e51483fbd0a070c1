//! # orderly-core: Pure Sync Logic for Orderly
//!
//! This crate is the **heart** of the offline synchronization engine. It
//! contains the rules with real invariants - action validation, conflict
//! detection, version arithmetic - as pure functions with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Orderly Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    POS Terminals (offline queue)                │   │
//! │  │    order edits ──► product edits ──► payments ──► retries       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ HTTP /sync/*                           │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    orderly-sync (engine)                        │   │
//! │  │    BatchApplier, ConflictStore, Resolver, ChangeFeed            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ orderly-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐   │   │
//! │  │   │  action   │  │  record   │  │ conflict  │  │ detector  │   │   │
//! │  │   │ SyncAction│  │SyncRecord │  │ Conflict  │  │  rules    │   │   │
//! │  │   │ validator │  │ statuses  │  │ proposals │  │  diffing  │   │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘   │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK READS • PURE FUNCTIONS        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`action`] - Mutation envelope types ([`SyncAction`], [`EntityKind`], ...)
//! - [`change`] - Change-feed projection types and entity snapshots
//! - [`conflict`] - Conflict record, proposals, resolution strategies
//! - [`detector`] - Field-granular conflict detection rules
//! - [`error`] - Validation error types
//! - [`record`] - Server-side journal entry and its status state machine
//! - [`validator`] - Action validation and normalization
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic - same input = same output
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Time as a Value**: "now" is always a parameter, never read from the OS
//! 4. **Explicit Errors**: All errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::Utc;
//! use orderly_core::{ConflictDetector, Detection, SyncAction, SyncActionValidator};
//!
//! let validator = SyncActionValidator::default();
//!
//! let raw: SyncAction = serde_json::from_value(serde_json::json!({
//!     "entity_type": "product",
//!     "entity_id": "prod-1",
//!     "action": "create",
//!     "data": { "name": "Margherita", "price": 9.50 },
//!     "client_timestamp": Utc::now(),
//!     "version": 1,
//! })).unwrap();
//!
//! let action = validator.validate(raw, Utc::now()).unwrap();
//!
//! // No server state for prod-1 yet: the create applies cleanly.
//! assert!(matches!(ConflictDetector::detect(&action, None), Detection::NoConflict));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod action;
pub mod change;
pub mod conflict;
pub mod detector;
pub mod error;
pub mod record;
pub mod validator;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use orderly_core::SyncAction` instead of
// `use orderly_core::action::SyncAction`

pub use action::{ActionKind, DataMap, EntityKind, SyncAction, ValidatedAction};
pub use change::{ChangeRecord, EntitySnapshot};
pub use conflict::{ClientProposal, Conflict, ConflictType, ResolutionStrategy};
pub use detector::{ConflictDetector, Detection};
pub use error::ValidationError;
pub use record::{SyncRecord, SyncStatus};
pub use validator::SyncActionValidator;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default tolerance for client clocks running ahead of the server, in seconds.
///
/// ## Why a tolerance at all?
/// POS terminals drift. A timestamp slightly in the future is normal clock
/// skew; a timestamp far in the future is a broken device whose actions
/// would poison `client_wins` ordering, so those are rejected outright.
pub const DEFAULT_CLOCK_SKEW_SECS: i64 = 300;

/// Maximum number of actions accepted in a single upload batch.
///
/// ## Business Reason
/// A terminal that was offline for a week re-submits its whole queue at once.
/// Bounding the batch keeps one device from monopolizing the server while
/// still letting large queues drain over a few requests.
pub const MAX_BATCH_ACTIONS: usize = 500;

/// Default page size for the incremental change feed.
pub const DEFAULT_FEED_LIMIT: usize = 200;

/// Hard cap on the change feed page size.
pub const MAX_FEED_LIMIT: usize = 1000;
