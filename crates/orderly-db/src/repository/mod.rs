//! # Repository Module
//!
//! Data-access repositories for the sync engine's three tables.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Repository Layout                                  │
//! │                                                                         │
//! │  EntityRepository      ──► entities      (latest state, soft delete)    │
//! │  SyncRecordRepository  ──► sync_records  (journal, idempotency index)   │
//! │  ConflictRepository    ──► conflicts     (live conflicts only)          │
//! │                                                                         │
//! │  Each repository owns a pool clone and exposes orderly-core types;      │
//! │  enum/JSON column encoding stays inside this module.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod conflict;
pub mod entity;
pub mod journal;

use std::str::FromStr;

use crate::error::{DbError, DbResult};

/// Decodes a stored enum string, mapping bad values to [`DbError::Decode`].
///
/// Stored enums can only go bad through disk corruption or a schema from
/// a newer build; either way the row is unusable.
pub(crate) fn decode_enum<T: FromStr<Err = String>>(column: &str, raw: &str) -> DbResult<T> {
    raw.parse()
        .map_err(|e: String| DbError::decode(format!("{column}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use orderly_core::EntityKind;

    #[test]
    fn test_decode_enum() {
        let kind: EntityKind = decode_enum("entity_type", "order").unwrap();
        assert_eq!(kind, EntityKind::Order);

        let err = decode_enum::<EntityKind>("entity_type", "junk").unwrap_err();
        assert!(err.to_string().contains("entity_type"));
    }
}
