//! Member identity and authorization model.
//!
//! # Responsibility
//! - Represent registered members and their role.
//! - Provide the `Actor` value the guard operations authorize against.
//!
//! # Invariants
//! - Authentication itself lives outside the core; callers hand in an
//!   already-authenticated `Actor`.
//! - Staff may act on any loan; members only on their own.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for a member.
pub type MemberId = Uuid;

/// Access level of a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular borrower.
    Member,
    /// Inventory and loan management rights.
    Staff,
}

/// A registered member as stored in the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub uuid: MemberId,
    /// Display/login name, unique across the roster.
    pub name: String,
    pub role: Role,
}

impl Member {
    /// Creates a new member with a generated stable ID.
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            role,
        }
    }

    /// Checks roster invariants before persistence.
    pub fn validate(&self) -> Result<(), MemberValidationError> {
        if self.name.trim().is_empty() {
            return Err(MemberValidationError::EmptyName);
        }
        Ok(())
    }

    /// Returns the authorization view of this member.
    pub fn actor(&self) -> Actor {
        Actor {
            member_id: self.uuid,
            role: self.role,
        }
    }
}

/// The authenticated caller of a guard operation.
///
/// Deliberately a plain value: authorization decisions take
/// `(actor role, resource owner)` as explicit parameters instead of relying
/// on ambient request state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub member_id: MemberId,
    pub role: Role,
}

impl Actor {
    /// Returns whether this actor holds staff rights.
    pub fn is_staff(&self) -> bool {
        self.role == Role::Staff
    }
}

/// Validation failure for roster writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberValidationError {
    EmptyName,
}

impl Display for MemberValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "member name cannot be empty"),
        }
    }
}

impl Error for MemberValidationError {}
