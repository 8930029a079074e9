//! Workflow Requests
//!
//! Users ask for custom automations; admins triage them. Nothing here
//! touches billing.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{MarketError, Result, StoreResult};
use crate::ids::{IdSequence, TeamId, UserId, WorkflowRequestId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Basic,
    Advanced,
    Enterprise,
}

/// Triage status of a request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            "completed" => Ok(RequestStatus::Completed),
            _ => Err(MarketError::validation("Invalid status")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRequest {
    pub id: WorkflowRequestId,
    pub user_id: UserId,
    pub name: String,
    pub description: String,
    pub complexity: Complexity,
    /// Comma separated integration names, free-form
    pub integrations: Option<String>,
    pub status: RequestStatus,
    pub team_id: Option<TeamId>,
    pub created_at: DateTime<Utc>,
}

/// Request body for a new workflow request. The owner and status are not
/// client-controlled.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWorkflowRequest {
    pub name: String,
    pub description: String,
    pub complexity: Complexity,
    #[serde(default)]
    pub integrations: Option<String>,
    #[serde(default)]
    pub team_id: Option<TeamId>,
}

impl NewWorkflowRequest {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(MarketError::validation("name must not be empty"));
        }
        if self.description.trim().is_empty() {
            return Err(MarketError::validation("description must not be empty"));
        }
        Ok(())
    }
}

#[async_trait]
pub trait WorkflowRequestStore: Send + Sync {
    /// Persist a request for `user_id`; status always starts as pending
    async fn create(&self, user_id: UserId, request: NewWorkflowRequest) -> StoreResult<WorkflowRequest>;

    async fn list_by_user(&self, user_id: UserId) -> StoreResult<Vec<WorkflowRequest>>;

    async fn list_all(&self) -> StoreResult<Vec<WorkflowRequest>>;

    async fn set_status(
        &self,
        id: WorkflowRequestId,
        status: RequestStatus,
    ) -> StoreResult<Option<WorkflowRequest>>;
}

#[derive(Default)]
struct RequestTable {
    rows: BTreeMap<WorkflowRequestId, WorkflowRequest>,
    ids: IdSequence,
}

#[derive(Default)]
pub struct MemoryWorkflowRequests {
    table: RwLock<RequestTable>,
}

impl MemoryWorkflowRequests {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowRequestStore for MemoryWorkflowRequests {
    async fn create(&self, user_id: UserId, request: NewWorkflowRequest) -> StoreResult<WorkflowRequest> {
        let mut table = self.table.write().await;
        let id = WorkflowRequestId(table.ids.next());
        let row = WorkflowRequest {
            id,
            user_id,
            name: request.name,
            description: request.description,
            complexity: request.complexity,
            integrations: request.integrations.filter(|s| !s.trim().is_empty()),
            status: RequestStatus::Pending,
            team_id: request.team_id,
            created_at: Utc::now(),
        };
        table.rows.insert(id, row.clone());
        Ok(row)
    }

    async fn list_by_user(&self, user_id: UserId) -> StoreResult<Vec<WorkflowRequest>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> StoreResult<Vec<WorkflowRequest>> {
        Ok(self.table.read().await.rows.values().cloned().collect())
    }

    async fn set_status(
        &self,
        id: WorkflowRequestId,
        status: RequestStatus,
    ) -> StoreResult<Option<WorkflowRequest>> {
        let mut table = self.table.write().await;
        Ok(table.rows.get_mut(&id).map(|row| {
            row.status = status;
            row.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str) -> NewWorkflowRequest {
        NewWorkflowRequest {
            name: name.into(),
            description: "Route inbound invoices to the right approver".into(),
            complexity: Complexity::Advanced,
            integrations: Some("Slack,QuickBooks".into()),
            team_id: None,
        }
    }

    #[tokio::test]
    async fn test_create_starts_pending() {
        let store = MemoryWorkflowRequests::new();
        let row = store.create(UserId(4), request("Invoice routing")).await.unwrap();

        assert_eq!(row.id, WorkflowRequestId(1));
        assert_eq!(row.status, RequestStatus::Pending);
        assert_eq!(row.user_id, UserId(4));
    }

    #[tokio::test]
    async fn test_lists_and_status_update() {
        let store = MemoryWorkflowRequests::new();
        store.create(UserId(1), request("a")).await.unwrap();
        let theirs = store.create(UserId(2), request("b")).await.unwrap();

        assert_eq!(store.list_by_user(UserId(1)).await.unwrap().len(), 1);
        assert_eq!(store.list_all().await.unwrap().len(), 2);

        let updated = store
            .set_status(theirs.id, RequestStatus::Approved)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, RequestStatus::Approved);

        assert!(store
            .set_status(WorkflowRequestId(99), RequestStatus::Rejected)
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_validate_and_parse() {
        assert!(request("x").validate().is_ok());
        assert!(request("  ").validate().is_err());

        assert_eq!("completed".parse::<RequestStatus>().unwrap(), RequestStatus::Completed);
        assert!("archived".parse::<RequestStatus>().is_err());

        let body: NewWorkflowRequest = serde_json::from_str(
            r#"{"name":"n","description":"d","complexity":"enterprise"}"#,
        )
        .unwrap();
        assert_eq!(body.complexity, Complexity::Enterprise);
        assert!(body.integrations.is_none());
    }
}
