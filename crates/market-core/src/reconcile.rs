//! Gateway webhook reconciliation
//!
//! Applies verified gateway events to whichever ledger owns the referenced
//! intent or recurring subscription. Agent rows are tried first, then team
//! rows.

use std::sync::Arc;

use async_trait::async_trait;
use market_payments::WebhookReconciler;

use crate::error::{MarketError, Result};
use crate::orchestrator::{AgentSubscriptions, TeamSubscriptions};

pub struct SubscriptionReconciler {
    agents: Arc<AgentSubscriptions>,
    teams: Arc<TeamSubscriptions>,
}

impl SubscriptionReconciler {
    pub fn new(agents: Arc<AgentSubscriptions>, teams: Arc<TeamSubscriptions>) -> Self {
        Self { agents, teams }
    }
}

/// A conflicting activation cannot be fixed by redelivery, so it is logged
/// and acknowledged instead of failing the webhook.
fn settle<S>(result: Result<Option<S>>, payment_intent_id: &str) -> Result<bool> {
    match result {
        Ok(found) => Ok(found.is_some()),
        Err(MarketError::Conflict(reason)) => {
            tracing::warn!(payment_intent_id, %reason, "Webhook activation skipped");
            Ok(true)
        }
        Err(e) => Err(e),
    }
}

#[async_trait]
impl WebhookReconciler for SubscriptionReconciler {
    type Error = MarketError;

    async fn payment_succeeded(&self, payment_intent_id: &str) -> Result<()> {
        if settle(self.agents.activate_by_intent(payment_intent_id).await, payment_intent_id)? {
            return Ok(());
        }
        if settle(self.teams.activate_by_intent(payment_intent_id).await, payment_intent_id)? {
            return Ok(());
        }

        tracing::warn!(payment_intent_id, "No subscription carries this payment intent");
        Ok(())
    }

    async fn subscription_deleted(&self, subscription_id: &str) -> Result<()> {
        if self.agents.cancel_by_gateway_subscription(subscription_id).await?.is_some() {
            return Ok(());
        }
        if self.teams.cancel_by_gateway_subscription(subscription_id).await?.is_some() {
            return Ok(());
        }

        tracing::warn!(subscription_id, "No subscription carries this gateway subscription");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use market_payments::{IntentStatus, MockGateway, PaymentGateway};

    use super::*;
    use crate::catalog::{CatalogStore, MemoryCatalog, NewAgent, NewTeam};
    use crate::identity::Identity;
    use crate::ids::{AgentId, TeamId, UserId};
    use crate::ledger::{AgentTarget, MemoryLedger, NewSubscription, SubscriptionLedger, SubscriptionStatus, TeamTarget};
    use crate::users::{MemoryUsers, UserDirectory};

    struct World {
        gateway: Arc<MockGateway>,
        agent_ledger: Arc<MemoryLedger<AgentTarget>>,
        team_ledger: Arc<MemoryLedger<TeamTarget>>,
        agents: Arc<AgentSubscriptions>,
        teams: Arc<TeamSubscriptions>,
    }

    async fn world() -> World {
        let catalog = Arc::new(MemoryCatalog::new());
        catalog
            .create_agent(
                NewAgent {
                    name: "Data Analyst".into(),
                    description: "Reports".into(),
                    price: 4999,
                    category: "Analytics".into(),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        catalog
            .create_team(
                NewTeam {
                    name: "LexiSuite".into(),
                    description: "Legal".into(),
                    category: "Legal".into(),
                    price: 9999,
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();

        let users = Arc::new(MemoryUsers::new());
        users.upsert(&Identity::user(UserId(1), "alice@example.com")).await.unwrap();

        let gateway = Arc::new(MockGateway::new());
        let agent_ledger = Arc::new(MemoryLedger::<AgentTarget>::new());
        let team_ledger = Arc::new(MemoryLedger::<TeamTarget>::new());

        let agents = Arc::new(AgentSubscriptions::new(
            agent_ledger.clone(),
            catalog.clone(),
            users.clone(),
            Some(gateway.clone() as Arc<dyn PaymentGateway>),
        ));
        let teams = Arc::new(TeamSubscriptions::new(
            team_ledger.clone(),
            catalog,
            users,
            Some(gateway.clone() as Arc<dyn PaymentGateway>),
        ));

        World {
            gateway,
            agent_ledger,
            team_ledger,
            agents,
            teams,
        }
    }

    #[tokio::test]
    async fn test_payment_succeeded_activates_team_row() {
        let w = world().await;
        let alice = Identity::user(UserId(1), "alice@example.com");
        w.gateway.queue_intent_id("pi_team").await;
        let started = w.teams.start(&alice, TeamTarget::from(TeamId(1))).await.unwrap();
        w.gateway.set_intent_status("pi_team", IntentStatus::Succeeded).await;

        let reconciler = SubscriptionReconciler::new(w.agents.clone(), w.teams.clone());
        reconciler.payment_succeeded("pi_team").await.unwrap();

        let row = w.team_ledger.get(started.subscription_id).await.unwrap().unwrap();
        assert_eq!(row.status, SubscriptionStatus::Active);
        assert!(w.agent_ledger.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_ids_are_acknowledged() {
        let w = world().await;
        let reconciler = SubscriptionReconciler::new(w.agents.clone(), w.teams.clone());
        assert!(reconciler.payment_succeeded("pi_nobody").await.is_ok());
        assert!(reconciler.subscription_deleted("sub_nobody").await.is_ok());
    }

    #[tokio::test]
    async fn test_conflicting_activation_is_acknowledged() {
        let w = world().await;
        let target = AgentTarget::from(AgentId(1));
        let active = w
            .agent_ledger
            .create(NewSubscription {
                status: SubscriptionStatus::Active,
                ..NewSubscription::pending(UserId(1), target, "pi_first")
            })
            .await
            .unwrap();

        // Left over from before the first row became active
        let second = w
            .agent_ledger
            .create(NewSubscription::pending(UserId(1), target, "pi_second"))
            .await
            .unwrap();

        w.gateway
            .insert_intent(market_payments::PaymentIntent {
                id: "pi_second".into(),
                client_secret: None,
                status: IntentStatus::Succeeded,
                amount: 4999,
                currency: "usd".into(),
                metadata: Default::default(),
            })
            .await;

        let reconciler = SubscriptionReconciler::new(w.agents.clone(), w.teams.clone());
        reconciler.payment_succeeded("pi_second").await.unwrap();

        let second = w.agent_ledger.get(second.id).await.unwrap().unwrap();
        assert_eq!(second.status, SubscriptionStatus::Pending);
        let still = w.agent_ledger.find_active(UserId(1), target).await.unwrap().unwrap();
        assert_eq!(still.id, active.id);
    }

    #[tokio::test]
    async fn test_gateway_failure_surfaces_for_redelivery() {
        let w = world().await;
        w.agent_ledger
            .create(NewSubscription::pending(
                UserId(1),
                AgentTarget::from(AgentId(1)),
                "pi_1",
            ))
            .await
            .unwrap();
        w.gateway.fail_retrieve_intent(true).await;

        let reconciler = SubscriptionReconciler::new(w.agents.clone(), w.teams.clone());
        let result = reconciler.payment_succeeded("pi_1").await;
        assert!(matches!(result, Err(MarketError::Gateway(_))));
    }
}
