//! Subscription Orchestrator
//!
//! Sequences the two-phase purchase of an agent or team:
//!
//! ```text
//! start ──▶ gateway intent ──▶ pending row ──▶ (browser confirms with gateway)
//!                                                      │
//! complete ◀───────────────────────────────────────────┘
//!    └─▶ re-verify intent server-side ──▶ active ──▶ provision gateway customer
//! ```
//!
//! The gateway is consulted only where money changes hands (start and
//! complete) and, best effort, to void intents of swept rows or stop a
//! recurring gateway subscription on cancel. Access decisions always come
//! from the ledger.
//!
//! Activations of one row are serialized, and customer provisioning is
//! serialized per user, so a webhook racing the browser's Complete call
//! neither activates twice nor creates two gateway customers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use market_payments::{PaymentError, PaymentGateway, PaymentIntentRequest};
use serde::{Deserialize, Serialize};

use crate::catalog::{Agent, AgentTeam, CatalogStore};
use crate::error::{MarketError, Result, StoreError};
use crate::identity::Identity;
use crate::ids::{SubscriptionId, UserId};
use crate::ledger::{
    AgentTarget, GatewayIds, NewSubscription, Subscription, SubscriptionLedger, SubscriptionStatus, Target,
    TeamTarget,
};
use crate::lock::KeyedMutex;
use crate::users::UserDirectory;

/// What the browser needs to confirm the payment with the gateway
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedSubscription {
    pub client_secret: String,
    pub subscription_id: SubscriptionId,
}

/// Drives the subscription state machine for one kind of target
pub struct SubscriptionService<T: Target> {
    ledger: Arc<dyn SubscriptionLedger<T>>,
    catalog: Arc<dyn CatalogStore>,
    users: Arc<dyn UserDirectory>,
    /// `None` when no gateway is configured
    gateway: Option<Arc<dyn PaymentGateway>>,
    starts: KeyedMutex<(UserId, T)>,
    activations: KeyedMutex<SubscriptionId>,
    /// Shared with other services that provision the same users
    customers: Arc<KeyedMutex<UserId>>,
}

pub type AgentSubscriptions = SubscriptionService<AgentTarget>;
pub type TeamSubscriptions = SubscriptionService<TeamTarget>;

impl<T: Target> SubscriptionService<T> {
    pub fn new(
        ledger: Arc<dyn SubscriptionLedger<T>>,
        catalog: Arc<dyn CatalogStore>,
        users: Arc<dyn UserDirectory>,
        gateway: Option<Arc<dyn PaymentGateway>>,
    ) -> Self {
        Self {
            ledger,
            catalog,
            users,
            gateway,
            starts: KeyedMutex::new(),
            activations: KeyedMutex::new(),
            customers: Arc::new(KeyedMutex::new()),
        }
    }

    /// Serialize customer provisioning with every other service holding `lock`
    pub fn with_customer_lock(mut self, lock: Arc<KeyedMutex<UserId>>) -> Self {
        self.customers = lock;
        self
    }

    pub fn ledger(&self) -> &Arc<dyn SubscriptionLedger<T>> {
        &self.ledger
    }

    fn gateway(&self) -> Result<&Arc<dyn PaymentGateway>> {
        self.gateway.as_ref().ok_or(MarketError::PaymentsDisabled)
    }

    /// Open a payment intent for `target` and record a pending row for it.
    ///
    /// Starts for the same (user, target) are serialized. The gateway intent
    /// is created before the row, so a gateway failure leaves nothing behind.
    pub async fn start(&self, identity: &Identity, target: T) -> Result<StartedSubscription> {
        let offering = target
            .offering(self.catalog.as_ref())
            .await?
            .ok_or_else(|| MarketError::not_found(T::LABEL, target.raw_id()))?;
        if offering.price <= 0 {
            return Err(MarketError::validation(format!("This {} is not for sale", T::LABEL)));
        }
        let gateway = self.gateway()?;

        let _guard = self.starts.lock(&(identity.user_id, target)).await;

        if self.ledger.find_active(identity.user_id, target).await?.is_some() {
            return Err(MarketError::Conflict(format!("Already subscribed to this {}", T::LABEL)));
        }

        let request = PaymentIntentRequest::new(offering.price)
            .with_description(format!("Subscription to {}", offering.name))
            .with_metadata("userId", identity.user_id.to_string())
            .with_metadata(T::METADATA_KEY, target.raw_id().to_string())
            .with_metadata("productName", offering.name.as_str());

        let intent = gateway.create_payment_intent(request).await?;
        let client_secret = intent.client_secret.ok_or_else(|| {
            PaymentError::IncompleteResponse(format!("payment intent {} has no client secret", intent.id))
        })?;

        let row = self
            .ledger
            .create(NewSubscription::pending(identity.user_id, target, intent.id.as_str()))
            .await?;

        tracing::info!(
            subscription_id = %row.id,
            user_id = %identity.user_id,
            target = %target,
            payment_intent = %intent.id,
            amount = offering.price,
            gateway = gateway.name(),
            "Subscription pending payment"
        );

        Ok(StartedSubscription {
            client_secret,
            subscription_id: row.id,
        })
    }

    /// Activate a pending row once the gateway confirms its intent succeeded.
    ///
    /// The client's claim is only used to pick the intent; its status is
    /// always re-read from the gateway. Completing an active row returns it
    /// unchanged.
    pub async fn complete(
        &self,
        identity: &Identity,
        id: SubscriptionId,
        payment_intent_id: &str,
    ) -> Result<Subscription<T>> {
        let payment_intent_id = payment_intent_id.trim();
        if payment_intent_id.is_empty() {
            return Err(MarketError::validation("Payment intent ID is required"));
        }

        let row = self
            .ledger
            .get(id)
            .await?
            .ok_or_else(|| MarketError::not_found("subscription", id))?;

        if row.user_id != identity.user_id {
            return Err(MarketError::Forbidden("Not your subscription".into()));
        }

        match row.status {
            SubscriptionStatus::Active => return Ok(row),
            SubscriptionStatus::Canceled => {
                self.check_paid_after_cancel(&row, payment_intent_id).await;
                return Err(MarketError::Conflict("Subscription is canceled".into()));
            }
            SubscriptionStatus::Pending => {}
        }

        if row
            .payment_intent_id
            .as_deref()
            .is_some_and(|stored| stored != payment_intent_id)
        {
            return Err(MarketError::validation(
                "Payment intent does not belong to this subscription",
            ));
        }

        self.activate(row.id, payment_intent_id).await
    }

    /// Cancel a row. Owners and admins only.
    ///
    /// A recurring gateway subscription attached to the row is canceled best
    /// effort; the local cancellation stands either way.
    pub async fn cancel(&self, identity: &Identity, id: SubscriptionId) -> Result<Subscription<T>> {
        let row = self
            .ledger
            .get(id)
            .await?
            .ok_or_else(|| MarketError::not_found("subscription", id))?;

        if !identity.can_manage(row.user_id) {
            return Err(MarketError::Forbidden("Not your subscription".into()));
        }
        if row.status == SubscriptionStatus::Canceled {
            return Err(MarketError::Conflict("Subscription is already canceled".into()));
        }

        let canceled = self
            .ledger
            .cancel(id)
            .await?
            .ok_or_else(|| MarketError::not_found("subscription", id))?;

        tracing::info!(subscription_id = %id, canceled_by = %identity.user_id, "Subscription canceled");

        if let (Some(gateway_subscription), Some(gateway)) =
            (canceled.gateway_subscription_id.as_deref(), self.gateway.as_ref())
        {
            if let Err(e) = gateway.cancel_subscription(gateway_subscription).await {
                tracing::warn!(
                    subscription_id = %id,
                    gateway_subscription,
                    error = %e,
                    "Gateway cancellation failed; local cancellation stands"
                );
            }
        }

        Ok(canceled)
    }

    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Subscription<T>>> {
        Ok(self.ledger.list_by_user(user_id).await?)
    }

    /// Webhook path for a succeeded intent.
    ///
    /// Returns `None` when no row carries the intent. Rows that are not
    /// pending come back untouched; a canceled one is logged as a payment
    /// that needs refunding.
    pub async fn activate_by_intent(&self, payment_intent_id: &str) -> Result<Option<Subscription<T>>> {
        let Some(row) = self.ledger.find_by_payment_intent(payment_intent_id).await? else {
            return Ok(None);
        };

        match row.status {
            SubscriptionStatus::Active => {
                tracing::debug!(subscription_id = %row.id, "Intent already reconciled");
                return Ok(Some(row));
            }
            SubscriptionStatus::Canceled => {
                warn_paid_after_cancel(&row, payment_intent_id);
                return Ok(Some(row));
            }
            SubscriptionStatus::Pending => {}
        }

        self.activate(row.id, payment_intent_id).await.map(Some)
    }

    /// Webhook path for a recurring subscription deleted at the gateway.
    /// No outbound gateway call is made.
    pub async fn cancel_by_gateway_subscription(
        &self,
        gateway_subscription_id: &str,
    ) -> Result<Option<Subscription<T>>> {
        let Some(row) = self
            .ledger
            .find_by_gateway_subscription(gateway_subscription_id)
            .await?
        else {
            return Ok(None);
        };

        if row.status == SubscriptionStatus::Canceled {
            return Ok(Some(row));
        }

        let canceled = self.ledger.cancel(row.id).await?;
        tracing::info!(subscription_id = %row.id, gateway_subscription_id, "Subscription canceled by gateway");
        Ok(canceled)
    }

    /// Cancel pending rows older than `ttl` and void their intents at the
    /// gateway so the old client secrets can no longer take a payment.
    pub async fn expire_abandoned(&self, ttl: Duration) -> Result<Vec<Subscription<T>>> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|_| MarketError::validation("pending TTL is out of range"))?;
        let swept = self.ledger.expire_pending(Utc::now() - ttl).await?;

        if swept.is_empty() {
            return Ok(swept);
        }
        tracing::info!(count = swept.len(), kind = T::LABEL, "Expired abandoned pending subscriptions");

        if let Some(gateway) = self.gateway.as_ref() {
            for row in &swept {
                let Some(intent_id) = row.payment_intent_id.as_deref() else {
                    continue;
                };
                if let Err(e) = gateway.cancel_payment_intent(intent_id).await {
                    tracing::warn!(
                        subscription_id = %row.id,
                        user_id = %row.user_id,
                        payment_intent = intent_id,
                        gateway = gateway.name(),
                        error = %e,
                        "Could not void intent of expired subscription; it may have been paid"
                    );
                }
            }
        }

        Ok(swept)
    }

    async fn activate(&self, id: SubscriptionId, payment_intent_id: &str) -> Result<Subscription<T>> {
        let gateway = self.gateway()?;
        let _guard = self.activations.lock(&id).await;

        // Another activation may have finished while this one waited
        let row = self
            .ledger
            .get(id)
            .await?
            .ok_or_else(|| MarketError::not_found("subscription", id))?;
        match row.status {
            SubscriptionStatus::Active => return Ok(row),
            SubscriptionStatus::Canceled => {
                return Err(MarketError::Conflict("Subscription is canceled".into()));
            }
            SubscriptionStatus::Pending => {}
        }

        let intent = gateway.retrieve_payment_intent(payment_intent_id).await?;
        if !intent.is_succeeded() {
            tracing::info!(
                subscription_id = %id,
                payment_intent = payment_intent_id,
                status = %intent.status,
                "Payment not complete"
            );
            return Err(MarketError::PaymentNotComplete { status: intent.status });
        }

        self.ledger
            .attach_gateway_ids(id, GatewayIds::payment_intent(payment_intent_id))
            .await?;
        let active = match self.ledger.set_status(id, SubscriptionStatus::Active).await {
            Ok(Some(active)) => active,
            Ok(None) => return Err(MarketError::not_found("subscription", id)),
            Err(StoreError::CanceledRow { .. }) => {
                // Canceled while the gateway was being consulted
                warn_paid_after_cancel(&row, payment_intent_id);
                return Err(MarketError::Conflict("Subscription is canceled".into()));
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            subscription_id = %active.id,
            user_id = %active.user_id,
            target = %active.target,
            gateway = gateway.name(),
            "Subscription active"
        );

        self.provision_customer(active.user_id).await;
        Ok(active)
    }

    /// Complete was called on a canceled row. If the intent went through
    /// anyway, someone has to refund it.
    async fn check_paid_after_cancel(&self, row: &Subscription<T>, payment_intent_id: &str) {
        let Some(gateway) = self.gateway.as_ref() else {
            return;
        };
        if row.payment_intent_id.as_deref() != Some(payment_intent_id) {
            return;
        }
        match gateway.retrieve_payment_intent(payment_intent_id).await {
            Ok(intent) if intent.is_succeeded() => warn_paid_after_cancel(row, payment_intent_id),
            Ok(_) => {}
            Err(e) => tracing::debug!(subscription_id = %row.id, error = %e, "Intent lookup failed"),
        }
    }

    /// Link a gateway customer to the user if none is linked yet. Failures
    /// are logged and swallowed: the subscription is already paid for.
    async fn provision_customer(&self, user_id: UserId) {
        let Some(gateway) = self.gateway.as_ref() else {
            return;
        };
        let _guard = self.customers.lock(&user_id).await;

        let user = match self.users.get(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::warn!(user_id = %user_id, "Cannot provision customer for unknown user");
                return;
            }
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Customer lookup failed");
                return;
            }
        };

        if user.gateway_customer_id.is_some() {
            return;
        }

        let customer = match gateway.create_customer(&user.email, None).await {
            Ok(customer) => customer,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Customer provisioning failed");
                return;
            }
        };

        match self.users.set_gateway_customer_id(user_id, &customer.id, false).await {
            Ok(user) if user.gateway_customer_id.as_deref() == Some(customer.id.as_str()) => {
                tracing::info!(user_id = %user_id, customer = %customer.id, "Gateway customer linked");
            }
            Ok(_) => tracing::warn!(
                user_id = %user_id,
                customer = %customer.id,
                "User already had a gateway customer; new one is orphaned"
            ),
            Err(e) => tracing::warn!(user_id = %user_id, error = %e, "Failed to store gateway customer"),
        }
    }
}

fn warn_paid_after_cancel<T: Target>(row: &Subscription<T>, payment_intent_id: &str) {
    tracing::warn!(
        subscription_id = %row.id,
        user_id = %row.user_id,
        target = %row.target,
        payment_intent = payment_intent_id,
        "Payment succeeded for a canceled subscription; refund required"
    );
}

impl SubscriptionService<AgentTarget> {
    /// Agents behind the user's active subscriptions. Agents deleted from
    /// the catalog are skipped.
    pub async fn subscribed_agents(&self, user_id: UserId) -> Result<Vec<Agent>> {
        let mut agents = Vec::new();
        for row in self.ledger.list_by_user(user_id).await? {
            if !row.is_active() {
                continue;
            }
            if let Some(agent) = self.catalog.get_agent(row.target.agent_id).await? {
                agents.push(agent);
            }
        }
        Ok(agents)
    }
}

impl SubscriptionService<TeamTarget> {
    /// Teams behind the user's active team subscriptions
    pub async fn subscribed_teams(&self, user_id: UserId) -> Result<Vec<AgentTeam>> {
        let mut teams = Vec::new();
        for row in self.ledger.list_by_user(user_id).await? {
            if !row.is_active() {
                continue;
            }
            if let Some(team) = self.catalog.get_team(row.target.team_id).await? {
                teams.push(team);
            }
        }
        Ok(teams)
    }
}
