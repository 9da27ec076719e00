use crate::error::LendingError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

pub type BorrowerId = u64;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Borrower,
    Admin,
}

/// A user known to the borrower directory.
///
/// Administrators live in the same directory; they may act on other
/// borrowers' loans but own no credit limit unless activated.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Borrower {
    pub id: BorrowerId,
    pub uuid: Uuid,
    pub name: String,
    pub role: Role,
}

impl Borrower {
    pub fn new(id: BorrowerId, name: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            uuid: Uuid::new_v4(),
            name: name.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Self-or-admin access rule applied to every borrower-owned resource.
    pub fn may_act_for(&self, owner: BorrowerId) -> bool {
        self.is_admin() || self.id == owner
    }
}

impl FromStr for Role {
    type Err = LendingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "borrower" => Ok(Role::Borrower),
            "admin" => Ok(Role::Admin),
            other => Err(LendingError::ValidationError(format!("Unknown role '{other}'"))),
        }
    }
}
