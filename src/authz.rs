//! Role-based authorization.
//!
//! Roles form a ladder `viewer < editor < moderator < admin`. A requirement
//! is a non-empty list of roles and is satisfied when any one of them is.
//! `admin` is exempt from the ladder: a requirement naming it only accepts a
//! principal whose role is exactly `admin`, so adding a role above it later
//! cannot widen admin-only operations. Role names outside the ladder are
//! compared by exact, case-sensitive string equality.

use std::fmt;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Viewer,
    Editor,
    Moderator,
    Admin,
    Unrecognized(String),
}

impl Role {
    pub fn parse(name: &str) -> Self {
        match name {
            "viewer" => Role::Viewer,
            "editor" => Role::Editor,
            "moderator" => Role::Moderator,
            "admin" => Role::Admin,
            other => Role::Unrecognized(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::Viewer => "viewer",
            Role::Editor => "editor",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
            Role::Unrecognized(name) => name,
        }
    }

    /// Position on the ladder; `None` for names outside it.
    pub fn level(&self) -> Option<u8> {
        match self {
            Role::Viewer => Some(1),
            Role::Editor => Some(2),
            Role::Moderator => Some(3),
            Role::Admin => Some(4),
            Role::Unrecognized(_) => None,
        }
    }
}

impl From<String> for Role {
    fn from(name: String) -> Self {
        Role::parse(&name)
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Roles accepted by an operation, OR-ed together. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRequirement(Vec<Role>);

impl RoleRequirement {
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Result<Self, ConfigError> {
        let roles: Vec<Role> = roles.into_iter().collect();
        if roles.is_empty() {
            return Err(ConfigError::EmptyRoleRequirement);
        }
        Ok(Self(roles))
    }

    pub fn single(role: Role) -> Self {
        Self(vec![role])
    }

    pub fn roles(&self) -> &[Role] {
        &self.0
    }
}

impl fmt::Display for RoleRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, role) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            f.write_str(role.as_str())?;
        }
        Ok(())
    }
}

/// The authenticated caller of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub id: String,
    pub role: Role,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchReason {
    /// The exempt role only matches itself.
    ExactMatchRequired,
    /// Both roles are on the ladder but the principal sits lower.
    InsufficientLevel,
    /// The required name is off the ladder and the principal's role differs.
    NotEqual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleMismatch {
    pub required: Role,
    pub reason: MismatchReason,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthDenial {
    #[error("Unauthorized - {reason}")]
    Unauthenticated { reason: String },

    #[error("Forbidden - role '{actual}' does not satisfy '{required}'")]
    Forbidden {
        required: RoleRequirement,
        actual: String,
        failures: Vec<RoleMismatch>,
    },

    #[error("User profile not found or access denied")]
    ProfileUnavailable { user_id: String },
}

impl AuthDenial {
    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        AuthDenial::Unauthenticated {
            reason: reason.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthDenial::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            AuthDenial::Forbidden { .. } | AuthDenial::ProfileUnavailable { .. } => {
                StatusCode::FORBIDDEN
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AuthDenial::Unauthenticated { .. } => "unauthenticated",
            AuthDenial::Forbidden { .. } => "forbidden",
            AuthDenial::ProfileUnavailable { .. } => "profile_unavailable",
        }
    }
}

fn satisfies(actual: &Role, required: &Role) -> Result<(), MismatchReason> {
    match required {
        Role::Admin if *actual == Role::Admin => Ok(()),
        Role::Admin => Err(MismatchReason::ExactMatchRequired),
        Role::Unrecognized(name) if actual.as_str() == name => Ok(()),
        Role::Unrecognized(_) => Err(MismatchReason::NotEqual),
        _ => match (actual.level(), required.level()) {
            (Some(have), Some(need)) if have >= need => Ok(()),
            _ => Err(MismatchReason::InsufficientLevel),
        },
    }
}

/// Decide whether `principal` may perform an operation guarded by `required`.
pub fn authorize(
    principal: Option<&Principal>,
    required: &RoleRequirement,
) -> Result<(), AuthDenial> {
    let Some(principal) = principal else {
        return Err(AuthDenial::unauthenticated("authentication required"));
    };

    let mut failures = Vec::with_capacity(required.roles().len());
    for role in required.roles() {
        match satisfies(&principal.role, role) {
            Ok(()) => return Ok(()),
            Err(reason) => failures.push(RoleMismatch {
                required: role.clone(),
                reason,
            }),
        }
    }

    Err(AuthDenial::Forbidden {
        required: required.clone(),
        actual: principal.role.to_string(),
        failures,
    })
}
