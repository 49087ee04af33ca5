//! Caller identity and role checks.
//!
//! Every engine operation takes an [`AuthContext`] resolved once at the HTTP
//! boundary and calls one of its `require_*` checks before touching storage.

use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    SuperAdmin,
    Admin,
    Teacher,
    Parent,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "SUPER_ADMIN",
            Role::Admin => "ADMIN",
            Role::Teacher => "TEACHER",
            Role::Parent => "PARENT",
            Role::Student => "STUDENT",
        }
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SUPER_ADMIN" => Ok(Role::SuperAdmin),
            "ADMIN" => Ok(Role::Admin),
            "TEACHER" => Ok(Role::Teacher),
            "PARENT" => Ok(Role::Parent),
            "STUDENT" => Ok(Role::Student),
            _ => Err(()),
        }
    }
}

/// Identity and roles of the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: String,
    pub roles: Vec<Role>,
}

impl AuthContext {
    pub fn new(user_id: impl Into<String>, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            user_id: user_id.into(),
            roles: roles.into_iter().collect(),
        }
    }

    /// Parse a comma separated role header value. Unknown roles are dropped.
    pub fn parse_roles(raw: &str) -> Vec<Role> {
        raw.split(',').filter_map(|r| r.parse().ok()).collect()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// ADMIN or SUPER_ADMIN.
    pub fn require_admin(&self) -> Result<(), AppError> {
        self.require_identity()?;
        if self.has_role(Role::Admin) || self.has_role(Role::SuperAdmin) {
            return Ok(());
        }
        tracing::warn!(user_id = %self.user_id, required = "ADMIN", "Authorization denied");
        Err(AppError::Forbidden(anyhow::anyhow!(
            "Caller {} requires ADMIN or SUPER_ADMIN",
            self.user_id
        )))
    }

    pub fn require_super_admin(&self) -> Result<(), AppError> {
        self.require_identity()?;
        if self.has_role(Role::SuperAdmin) {
            return Ok(());
        }
        tracing::warn!(user_id = %self.user_id, required = "SUPER_ADMIN", "Authorization denied");
        Err(AppError::Forbidden(anyhow::anyhow!(
            "Caller {} requires SUPER_ADMIN",
            self.user_id
        )))
    }

    fn require_identity(&self) -> Result<(), AppError> {
        if self.user_id.trim().is_empty() {
            return Err(AppError::Unauthorized(anyhow::anyhow!(
                "Caller identity is missing"
            )));
        }
        Ok(())
    }
}
