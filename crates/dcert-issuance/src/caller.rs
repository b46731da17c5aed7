//! # Caller Identity
//!
//! Identity and role are established by the upstream authentication
//! collaborator; the orchestrators only check them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IssuanceError;

/// Caller role, ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Issuer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Issuer => "issuer",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = IssuanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "issuer" => Ok(Self::Issuer),
            "admin" => Ok(Self::Admin),
            other => Err(IssuanceError::InvalidInput(format!("unknown role {other:?}"))),
        }
    }
}

/// The authenticated caller of an orchestrator operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerIdentity {
    pub user_id: Uuid,
    pub role: Role,
    /// The institute the caller acts for. Required for issuers.
    pub institute_id: Option<Uuid>,
    /// Verified e-mail address. A plain user's certificates are found by it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl CallerIdentity {
    /// Fail with [`IssuanceError::Forbidden`] unless the caller holds at
    /// least `min`.
    pub fn require(&self, min: Role) -> Result<(), IssuanceError> {
        if self.role >= min {
            Ok(())
        } else {
            Err(IssuanceError::Forbidden(format!(
                "role {} may not perform this operation (requires {min})",
                self.role
            )))
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
