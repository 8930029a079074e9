//! Subscription Ledger
//!
//! Authoritative store of subscription rows and their status transitions.
//! The ledger knows nothing about payment semantics beyond keeping the
//! gateway correlation ids it is handed.
//!
//! One ledger type serves both agent and team subscriptions; the
//! [`Target`] parameter decides what a row points at.
//!
//! ```text
//!   create(pending) ──▶ pending ──set_status(active)──▶ active
//!                          │                              │
//!                          └──────── cancel ──────────────┴──▶ canceled
//! ```
//!
//! Invariant: at most one `active` row per (user, target). [`MemoryLedger`]
//! enforces it when a row becomes active, the way a partial unique index
//! would in a relational store.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::catalog::CatalogStore;
use crate::error::{StoreError, StoreResult};
use crate::ids::{AgentId, IdSequence, SubscriptionId, TeamId, UserId};

/// Subscription lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    /// Payment intent created, awaiting confirmation
    Pending,
    /// Payment verified, subscription live
    Active,
    /// Terminal
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the subscription workflow needs to know about a purchasable item
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Offering {
    pub name: String,
    /// Minor currency units
    pub price: i64,
}

/// The thing a subscription points at
#[async_trait]
pub trait Target:
    Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// Human readable kind, e.g. "agent"
    const LABEL: &'static str;

    /// Key under which the target id is tagged on gateway objects
    const METADATA_KEY: &'static str;

    /// Raw id, for metadata tags
    fn raw_id(&self) -> u64;

    /// Look up price and name in the catalog
    async fn offering(&self, catalog: &dyn CatalogStore) -> StoreResult<Option<Offering>>;
}

/// Subscription to a single agent
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTarget {
    pub agent_id: AgentId,
}

impl From<AgentId> for AgentTarget {
    fn from(agent_id: AgentId) -> Self {
        Self { agent_id }
    }
}

impl fmt::Display for AgentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent {}", self.agent_id)
    }
}

#[async_trait]
impl Target for AgentTarget {
    const LABEL: &'static str = "agent";
    const METADATA_KEY: &'static str = "agentId";

    fn raw_id(&self) -> u64 {
        self.agent_id.get()
    }

    async fn offering(&self, catalog: &dyn CatalogStore) -> StoreResult<Option<Offering>> {
        Ok(catalog.get_agent(self.agent_id).await?.map(|agent| Offering {
            name: agent.name,
            price: agent.price,
        }))
    }
}

/// Subscription to an agent team
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamTarget {
    pub team_id: TeamId,
}

impl From<TeamId> for TeamTarget {
    fn from(team_id: TeamId) -> Self {
        Self { team_id }
    }
}

impl fmt::Display for TeamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent team {}", self.team_id)
    }
}

#[async_trait]
impl Target for TeamTarget {
    const LABEL: &'static str = "agent team";
    const METADATA_KEY: &'static str = "teamId";

    fn raw_id(&self) -> u64 {
        self.team_id.get()
    }

    async fn offering(&self, catalog: &dyn CatalogStore) -> StoreResult<Option<Offering>> {
        Ok(catalog.get_team(self.team_id).await?.map(|team| Offering {
            name: team.name,
            price: team.price,
        }))
    }
}

/// A subscription row
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription<T> {
    pub id: SubscriptionId,
    pub user_id: UserId,
    #[serde(flatten)]
    pub target: T,
    pub status: SubscriptionStatus,
    pub start_date: DateTime<Utc>,
    /// Set only when the row is canceled
    pub end_date: Option<DateTime<Utc>>,
    pub payment_intent_id: Option<String>,
    pub gateway_subscription_id: Option<String>,
    pub gateway_price_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub type AgentSubscription = Subscription<AgentTarget>;
pub type TeamSubscription = Subscription<TeamTarget>;

impl<T: Target> Subscription<T> {
    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }

    fn same_pair(&self, user_id: UserId, target: T) -> bool {
        self.user_id == user_id && self.target == target
    }
}

/// Row creation payload
#[derive(Clone, Debug)]
pub struct NewSubscription<T> {
    pub user_id: UserId,
    pub target: T,
    pub status: SubscriptionStatus,
    /// Defaults to creation time
    pub start_date: Option<DateTime<Utc>>,
    pub payment_intent_id: Option<String>,
}

impl<T: Target> NewSubscription<T> {
    /// A pending row awaiting confirmation of `payment_intent_id`
    pub fn pending(user_id: UserId, target: T, payment_intent_id: impl Into<String>) -> Self {
        Self {
            user_id,
            target,
            status: SubscriptionStatus::Pending,
            start_date: None,
            payment_intent_id: Some(payment_intent_id.into()),
        }
    }
}

/// Gateway correlation ids; `None` means "leave unchanged"
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GatewayIds {
    pub payment_intent_id: Option<String>,
    pub gateway_subscription_id: Option<String>,
    pub gateway_price_id: Option<String>,
}

impl GatewayIds {
    pub fn payment_intent(id: impl Into<String>) -> Self {
        Self {
            payment_intent_id: Some(id.into()),
            ..Default::default()
        }
    }
}

/// Subscription storage trait
///
/// Lookups of unknown ids return `Ok(None)`; callers translate that into a
/// not-found response.
#[async_trait]
pub trait SubscriptionLedger<T: Target>: Send + Sync {
    /// The live row for (user, target), if any
    async fn find_active(&self, user_id: UserId, target: T) -> StoreResult<Option<Subscription<T>>>;

    /// Insert a row. Does not check for other rows on the same pair; an
    /// `active` insert is the exception and fails on a duplicate.
    async fn create(&self, new: NewSubscription<T>) -> StoreResult<Subscription<T>>;

    async fn get(&self, id: SubscriptionId) -> StoreResult<Option<Subscription<T>>>;

    /// Move a row to `status`. Entering `canceled` stamps `end_date`;
    /// entering `active` fails with [`StoreError::DuplicateActive`] if another
    /// row for the pair is already active. `canceled` is terminal: leaving it
    /// fails with [`StoreError::CanceledRow`].
    async fn set_status(
        &self,
        id: SubscriptionId,
        status: SubscriptionStatus,
    ) -> StoreResult<Option<Subscription<T>>>;

    /// Merge correlation ids; absent fields never clear stored values
    async fn attach_gateway_ids(
        &self,
        id: SubscriptionId,
        ids: GatewayIds,
    ) -> StoreResult<Option<Subscription<T>>>;

    async fn list_by_user(&self, user_id: UserId) -> StoreResult<Vec<Subscription<T>>>;

    /// Mark canceled. A row that is already canceled keeps its original `end_date`.
    async fn cancel(&self, id: SubscriptionId) -> StoreResult<Option<Subscription<T>>>;

    async fn find_by_payment_intent(&self, payment_intent_id: &str) -> StoreResult<Option<Subscription<T>>>;

    async fn find_by_gateway_subscription(
        &self,
        gateway_subscription_id: &str,
    ) -> StoreResult<Option<Subscription<T>>>;

    /// Cancel every `pending` row created before `cutoff`
    async fn expire_pending(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Subscription<T>>>;
}

struct LedgerTable<T> {
    rows: BTreeMap<SubscriptionId, Subscription<T>>,
    ids: IdSequence,
}

impl<T: Target> LedgerTable<T> {
    fn active_conflict(&self, user_id: UserId, target: T, except: Option<SubscriptionId>) -> Option<StoreError> {
        self.rows
            .values()
            .any(|row| row.is_active() && row.same_pair(user_id, target) && Some(row.id) != except)
            .then(|| StoreError::DuplicateActive {
                user_id,
                target: target.to_string(),
            })
    }

    fn transition(&mut self, id: SubscriptionId, status: SubscriptionStatus) -> StoreResult<Option<Subscription<T>>> {
        let Some((user_id, target, current)) = self.rows.get(&id).map(|row| (row.user_id, row.target, row.status))
        else {
            return Ok(None);
        };

        if current == SubscriptionStatus::Canceled && status != SubscriptionStatus::Canceled {
            return Err(StoreError::CanceledRow { id });
        }

        if status == SubscriptionStatus::Active {
            if let Some(err) = self.active_conflict(user_id, target, Some(id)) {
                return Err(err);
            }
        }

        let Some(row) = self.rows.get_mut(&id) else {
            return Ok(None);
        };
        if status == SubscriptionStatus::Canceled && row.status != SubscriptionStatus::Canceled {
            row.end_date = Some(Utc::now());
        }
        row.status = status;
        Ok(Some(row.clone()))
    }
}

/// In-memory ledger: a table plus a monotonic id generator behind one lock
pub struct MemoryLedger<T> {
    table: RwLock<LedgerTable<T>>,
    _target: PhantomData<fn() -> T>,
}

impl<T: Target> Default for MemoryLedger<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Target> MemoryLedger<T> {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(LedgerTable {
                rows: BTreeMap::new(),
                ids: IdSequence::default(),
            }),
            _target: PhantomData,
        }
    }

    /// Every row, in id order
    pub async fn all(&self) -> Vec<Subscription<T>> {
        self.table.read().await.rows.values().cloned().collect()
    }
}

#[async_trait]
impl<T: Target> SubscriptionLedger<T> for MemoryLedger<T> {
    async fn find_active(&self, user_id: UserId, target: T) -> StoreResult<Option<Subscription<T>>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .find(|row| row.is_active() && row.same_pair(user_id, target))
            .cloned())
    }

    async fn create(&self, new: NewSubscription<T>) -> StoreResult<Subscription<T>> {
        let mut table = self.table.write().await;

        if new.status == SubscriptionStatus::Active {
            if let Some(err) = table.active_conflict(new.user_id, new.target, None) {
                return Err(err);
            }
        }

        let now = Utc::now();
        let id = SubscriptionId(table.ids.next());
        let row = Subscription {
            id,
            user_id: new.user_id,
            target: new.target,
            status: new.status,
            start_date: new.start_date.unwrap_or(now),
            end_date: (new.status == SubscriptionStatus::Canceled).then_some(now),
            payment_intent_id: new.payment_intent_id,
            gateway_subscription_id: None,
            gateway_price_id: None,
            created_at: now,
        };
        table.rows.insert(id, row.clone());
        Ok(row)
    }

    async fn get(&self, id: SubscriptionId) -> StoreResult<Option<Subscription<T>>> {
        Ok(self.table.read().await.rows.get(&id).cloned())
    }

    async fn set_status(
        &self,
        id: SubscriptionId,
        status: SubscriptionStatus,
    ) -> StoreResult<Option<Subscription<T>>> {
        self.table.write().await.transition(id, status)
    }

    async fn attach_gateway_ids(
        &self,
        id: SubscriptionId,
        ids: GatewayIds,
    ) -> StoreResult<Option<Subscription<T>>> {
        let mut table = self.table.write().await;
        Ok(table.rows.get_mut(&id).map(|row| {
            if ids.payment_intent_id.is_some() {
                row.payment_intent_id = ids.payment_intent_id;
            }
            if ids.gateway_subscription_id.is_some() {
                row.gateway_subscription_id = ids.gateway_subscription_id;
            }
            if ids.gateway_price_id.is_some() {
                row.gateway_price_id = ids.gateway_price_id;
            }
            row.clone()
        }))
    }

    async fn list_by_user(&self, user_id: UserId) -> StoreResult<Vec<Subscription<T>>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn cancel(&self, id: SubscriptionId) -> StoreResult<Option<Subscription<T>>> {
        self.table.write().await.transition(id, SubscriptionStatus::Canceled)
    }

    async fn find_by_payment_intent(&self, payment_intent_id: &str) -> StoreResult<Option<Subscription<T>>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .find(|row| row.payment_intent_id.as_deref() == Some(payment_intent_id))
            .cloned())
    }

    async fn find_by_gateway_subscription(
        &self,
        gateway_subscription_id: &str,
    ) -> StoreResult<Option<Subscription<T>>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .find(|row| row.gateway_subscription_id.as_deref() == Some(gateway_subscription_id))
            .cloned())
    }

    async fn expire_pending(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Subscription<T>>> {
        let mut table = self.table.write().await;
        let now = Utc::now();

        Ok(table
            .rows
            .values_mut()
            .filter(|row| row.status == SubscriptionStatus::Pending && row.created_at < cutoff)
            .map(|row| {
                row.status = SubscriptionStatus::Canceled;
                row.end_date = Some(now);
                row.clone()
            })
            .collect())
    }
}
