//! Per-request tenant context extracted from headers.
//!
//! Every sync endpoint is tenant-scoped. The upstream gateway
//! authenticates devices and forwards identity as headers:
//!
//! - `x-restaurant-id` (required) tenant the request operates on
//! - `x-device-id` (optional) device originating the request
//! - `x-role` (optional, defaults to `staff`) caller's role
//!
//! Role gates: conflict dismissal and force-sync require `manager` or
//! `owner`.

use std::fmt;
use std::str::FromStr;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::ApiError;

pub const RESTAURANT_HEADER: &str = "x-restaurant-id";
pub const DEVICE_HEADER: &str = "x-device-id";
pub const ROLE_HEADER: &str = "x-role";

/// Caller role, ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    Staff,
    Manager,
    Owner,
}

impl Role {
    /// Whether this role may perform manager-level operations
    /// (dismissing conflicts, forcing a full sync).
    pub fn is_manager(self) -> bool {
        self >= Role::Manager
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "staff" => Ok(Role::Staff),
            "manager" => Ok(Role::Manager),
            "owner" => Ok(Role::Owner),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Staff => "staff",
            Role::Manager => "manager",
            Role::Owner => "owner",
        };
        f.write_str(s)
    }
}

/// Identity attached to a single request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub restaurant_id: String,
    pub device_id: Option<String>,
    pub role: Role,
}

impl RequestContext {
    /// Fails with 403 unless the caller holds a manager-level role.
    pub fn require_manager(&self) -> Result<(), ApiError> {
        if self.role.is_manager() {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "role {} may not perform this operation",
                self.role
            )))
        }
    }
}

fn header_str<'a>(parts: &'a Parts, name: &str) -> Result<Option<&'a str>, ApiError> {
    match parts.headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("header {name} is not valid UTF-8"))),
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let restaurant_id = header_str(parts, RESTAURANT_HEADER)?
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ApiError::BadRequest(format!("missing required header {RESTAURANT_HEADER}"))
            })?
            .to_string();

        let device_id = header_str(parts, DEVICE_HEADER)?
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let role = match header_str(parts, ROLE_HEADER)? {
            None => Role::Staff,
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e: String| ApiError::BadRequest(e))?,
        };

        Ok(RequestContext {
            restaurant_id,
            device_id,
            role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ordering_gates_manager_operations() {
        assert!(!Role::Staff.is_manager());
        assert!(Role::Manager.is_manager());
        assert!(Role::Owner.is_manager());
    }

    #[test]
    fn role_parses_from_header_values() {
        assert_eq!("owner".parse::<Role>().unwrap(), Role::Owner);
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn staff_cannot_pass_manager_gate() {
        let ctx = RequestContext {
            restaurant_id: "rest-1".to_string(),
            device_id: None,
            role: Role::Staff,
        };
        assert!(ctx.require_manager().is_err());
    }
}
