//! Edit capability checks.
//!
//! DESIGN
//! ======
//! Deciding who may change a board belongs to the auth layer in front of the
//! relay. The relay only asks one yes/no question per mutating event or save,
//! through the `EditPolicy` trait. `AllowAll` is the open default; `RoleTable`
//! is a static per-board role map for deployments that pin viewers.

use std::collections::HashMap;

use tracing::debug;

// =============================================================================
// POLICY
// =============================================================================

pub trait EditPolicy: Send + Sync {
    /// Whether `user_id` may mutate `board_id`.
    fn may_edit(&self, board_id: &str, user_id: &str) -> bool;
}

/// Every user may edit every board.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl EditPolicy for AllowAll {
    fn may_edit(&self, _board_id: &str, _user_id: &str) -> bool {
        true
    }
}

// =============================================================================
// ROLES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Owner,
    Editor,
    Viewer,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Editor => "editor",
            Self::Viewer => "viewer",
        }
    }

    #[must_use]
    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "owner" => Some(Self::Owner),
            "editor" => Some(Self::Editor),
            "viewer" => Some(Self::Viewer),
            _ => None,
        }
    }

    #[must_use]
    pub fn can_edit(self) -> bool {
        matches!(self, Self::Owner | Self::Editor)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RoleParseError {
    #[error("malformed role entry: {0:?}")]
    Malformed(String),
    #[error("unknown role: {0:?}")]
    UnknownRole(String),
}

/// Static (board, user) -> role map. Users without an entry get `fallback`.
#[derive(Debug, Clone)]
pub struct RoleTable {
    roles: HashMap<(String, String), Role>,
    fallback: Role,
}

impl RoleTable {
    #[must_use]
    pub fn new(fallback: Role) -> Self {
        Self { roles: HashMap::new(), fallback }
    }

    #[must_use]
    pub fn with_role(mut self, board_id: &str, user_id: &str, role: Role) -> Self {
        self.roles.insert((board_id.to_owned(), user_id.to_owned()), role);
        self
    }

    #[must_use]
    pub fn role(&self, board_id: &str, user_id: &str) -> Role {
        self.roles
            .get(&(board_id.to_owned(), user_id.to_owned()))
            .copied()
            .unwrap_or(self.fallback)
    }

    /// Parse `board:user:role` entries separated by commas, e.g.
    /// `b1:alice:owner,b1:bob:viewer`. Blank entries are skipped.
    ///
    /// # Errors
    ///
    /// Returns `RoleParseError` on an entry without three parts or with an
    /// unknown role name.
    pub fn parse(entries: &str, fallback: Role) -> Result<Self, RoleParseError> {
        let mut table = Self::new(fallback);
        for entry in entries.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
            let [board_id, user_id, role] = parts.as_slice() else {
                return Err(RoleParseError::Malformed(entry.to_owned()));
            };
            if board_id.is_empty() || user_id.is_empty() {
                return Err(RoleParseError::Malformed(entry.to_owned()));
            }
            let role = Role::from_str(role).ok_or_else(|| RoleParseError::UnknownRole((*role).to_owned()))?;
            debug!(%board_id, %user_id, role = role.as_str(), "board role entry");
            table = table.with_role(board_id, user_id, role);
        }
        Ok(table)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

impl EditPolicy for RoleTable {
    fn may_edit(&self, board_id: &str, user_id: &str) -> bool {
        self.role(board_id, user_id).can_edit()
    }
}

#[cfg(test)]
#[path = "access_test.rs"]
mod tests;
