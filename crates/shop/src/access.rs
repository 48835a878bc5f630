//! Who may do what.

use std::collections::HashSet;

use common::UserId;
use serde::{Deserialize, Serialize};

use crate::{Result, ShopError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Admin,
}

/// The user on whose behalf an operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn customer(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Customer,
        }
    }

    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Fails with `Forbidden` unless the actor is an administrator.
    pub fn require_admin(&self, action: &'static str) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ShopError::Forbidden { action })
        }
    }
}

/// The configured set of administrators.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    admins: HashSet<UserId>,
}

impl AccessPolicy {
    pub fn new(admins: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            admins: admins.into_iter().collect(),
        }
    }

    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.admins.contains(&user_id)
    }

    /// Resolves the role of a user.
    pub fn actor(&self, user_id: UserId) -> Actor {
        if self.is_admin(user_id) {
            Actor::admin(user_id)
        } else {
            Actor::customer(user_id)
        }
    }

    /// Administrators, in ascending id order.
    pub fn admins(&self) -> Vec<UserId> {
        let mut admins: Vec<_> = self.admins.iter().copied().collect();
        admins.sort();
        admins
    }
}
