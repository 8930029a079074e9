//! User Directory
//!
//! The marketplace's view of a user is small: who they are and, once they
//! have paid for something, which gateway customer record bills them.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::identity::Identity;
use crate::ids::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: String,
    /// Populated lazily the first time a subscription is paid for
    pub gateway_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// User storage trait
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get(&self, id: UserId) -> StoreResult<Option<User>>;

    /// Record a caller seen on an authenticated request, refreshing the email
    async fn upsert(&self, identity: &Identity) -> StoreResult<User>;

    /// Link a gateway customer to the user.
    ///
    /// An existing link is kept unless `overwrite` is set; the returned user
    /// reflects whichever id is stored afterwards.
    async fn set_gateway_customer_id(
        &self,
        id: UserId,
        customer_id: &str,
        overwrite: bool,
    ) -> StoreResult<User>;
}

/// In-memory user directory
#[derive(Default)]
pub struct MemoryUsers {
    users: RwLock<HashMap<UserId, User>>,
}

impl MemoryUsers {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserDirectory for MemoryUsers {
    async fn get(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn upsert(&self, identity: &Identity) -> StoreResult<User> {
        let mut users = self.users.write().await;
        let user = users.entry(identity.user_id).or_insert_with(|| User {
            id: identity.user_id,
            email: identity.email.clone(),
            gateway_customer_id: None,
            created_at: Utc::now(),
        });
        if user.email != identity.email {
            user.email.clone_from(&identity.email);
        }
        Ok(user.clone())
    }

    async fn set_gateway_customer_id(
        &self,
        id: UserId,
        customer_id: &str,
        overwrite: bool,
    ) -> StoreResult<User> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&id).ok_or_else(|| StoreError::MissingRecord {
            entity: "user",
            id: id.to_string(),
        })?;

        if overwrite || user.gateway_customer_id.is_none() {
            user.gateway_customer_id = Some(customer_id.to_string());
        }
        Ok(user.clone())
    }
}
