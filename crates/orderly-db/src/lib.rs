//! # orderly-db: Database Layer for Orderly
//!
//! SQLite persistence for the sync engine: the entity table the engine
//! reconciles against, the journal of processed actions, and the registry
//! of live conflicts.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        orderly-db Layout                                │
//! │                                                                         │
//! │  ┌─────────────┐   ┌──────────────────────────────────────────────┐    │
//! │  │  Database   │──►│              Repositories                    │    │
//! │  │  (pool.rs)  │   │                                              │    │
//! │  │             │   │  EntityRepository     latest entity state    │    │
//! │  │  SqlitePool │   │  SyncRecordRepository journal + idempotency  │    │
//! │  │  WAL mode   │   │  ConflictRepository   live conflicts         │    │
//! │  │  migrations │   │                                              │    │
//! │  └─────────────┘   └──────────────────────────────────────────────┘    │
//! │                                                                         │
//! │  Rows cross the boundary as orderly-core types; this crate owns the    │
//! │  TEXT/JSON column encoding and nothing else knows about SQL.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::conflict::ConflictRepository;
pub use repository::entity::EntityRepository;
pub use repository::journal::SyncRecordRepository;
