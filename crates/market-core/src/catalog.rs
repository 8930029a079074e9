//! Catalog Store
//!
//! Agents and agent teams: read-mostly reference data. The subscription
//! workflow only ever reads price and name from here; admins get full CRUD.
//!
//! Deleting an agent or team does not look at the ledgers, so subscriptions
//! may outlive the catalog entry they point to.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{MarketError, Result, StoreResult};
use crate::ids::{AgentId, IdSequence, TeamId, UserId};

/// A subscribable automation unit
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub description: String,
    /// Minor currency units
    pub price: i64,
    pub category: String,
    pub features: Vec<String>,
    pub is_popular: bool,
    pub is_new: bool,
    pub is_enterprise: bool,
    pub team_id: Option<TeamId>,
    pub team_role: Option<String>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    /// Badged agents show up on the featured shelf
    pub fn is_featured(&self) -> bool {
        self.is_popular || self.is_new || self.is_enterprise
    }
}

/// Agent creation payload
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAgent {
    pub name: String,
    pub description: String,
    pub price: i64,
    pub category: String,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub is_popular: bool,
    #[serde(default)]
    pub is_new: bool,
    #[serde(default)]
    pub is_enterprise: bool,
    #[serde(default)]
    pub team_id: Option<TeamId>,
    #[serde(default)]
    pub team_role: Option<String>,
}

impl NewAgent {
    pub fn validate(&self) -> Result<()> {
        require_text("name", &self.name)?;
        require_text("description", &self.description)?;
        require_text("category", &self.category)?;
        require_price(self.price)
    }
}

/// Partial agent update; absent fields are left alone
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub category: Option<String>,
    pub features: Option<Vec<String>>,
    pub is_popular: Option<bool>,
    pub is_new: Option<bool>,
    pub is_enterprise: Option<bool>,
    pub team_id: Option<TeamId>,
    pub team_role: Option<String>,
}

impl AgentPatch {
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            require_text("name", name)?;
        }
        if let Some(description) = &self.description {
            require_text("description", description)?;
        }
        if let Some(category) = &self.category {
            require_text("category", category)?;
        }
        self.price.map_or(Ok(()), require_price)
    }

    fn apply(self, agent: &mut Agent) {
        if let Some(v) = self.name {
            agent.name = v;
        }
        if let Some(v) = self.description {
            agent.description = v;
        }
        if let Some(v) = self.price {
            agent.price = v;
        }
        if let Some(v) = self.category {
            agent.category = v;
        }
        if let Some(v) = self.features {
            agent.features = v;
        }
        if let Some(v) = self.is_popular {
            agent.is_popular = v;
        }
        if let Some(v) = self.is_new {
            agent.is_new = v;
        }
        if let Some(v) = self.is_enterprise {
            agent.is_enterprise = v;
        }
        if let Some(v) = self.team_id {
            agent.team_id = Some(v);
        }
        if let Some(v) = self.team_role {
            agent.team_role = Some(v);
        }
    }
}

/// One step of a team's workflow
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub step: u32,
    pub description: String,
    /// Name of the agent responsible for this step
    pub agent: String,
}

/// A bundle of agents sold as one subscription
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTeam {
    pub id: TeamId,
    pub name: String,
    pub description: String,
    pub category: String,
    /// Minor currency units
    pub price: i64,
    pub target: Option<String>,
    pub impact: Option<String>,
    pub workflow: Vec<WorkflowStep>,
    pub is_popular: bool,
    pub is_featured: bool,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

/// Team creation payload
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTeam {
    pub name: String,
    pub description: String,
    pub category: String,
    pub price: i64,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub impact: Option<String>,
    #[serde(default)]
    pub workflow: Vec<WorkflowStep>,
    #[serde(default)]
    pub is_popular: bool,
    #[serde(default)]
    pub is_featured: bool,
}

impl NewTeam {
    pub fn validate(&self) -> Result<()> {
        require_text("name", &self.name)?;
        require_text("description", &self.description)?;
        require_text("category", &self.category)?;
        require_price(self.price)?;
        validate_workflow(&self.workflow)
    }
}

/// Partial team update
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<i64>,
    pub target: Option<String>,
    pub impact: Option<String>,
    pub workflow: Option<Vec<WorkflowStep>>,
    pub is_popular: Option<bool>,
    pub is_featured: Option<bool>,
}

impl TeamPatch {
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            require_text("name", name)?;
        }
        if let Some(description) = &self.description {
            require_text("description", description)?;
        }
        if let Some(category) = &self.category {
            require_text("category", category)?;
        }
        if let Some(workflow) = &self.workflow {
            validate_workflow(workflow)?;
        }
        self.price.map_or(Ok(()), require_price)
    }

    fn apply(self, team: &mut AgentTeam) {
        if let Some(v) = self.name {
            team.name = v;
        }
        if let Some(v) = self.description {
            team.description = v;
        }
        if let Some(v) = self.category {
            team.category = v;
        }
        if let Some(v) = self.price {
            team.price = v;
        }
        if let Some(v) = self.target {
            team.target = Some(v);
        }
        if let Some(v) = self.impact {
            team.impact = Some(v);
        }
        if let Some(v) = self.workflow {
            team.workflow = v;
        }
        if let Some(v) = self.is_popular {
            team.is_popular = v;
        }
        if let Some(v) = self.is_featured {
            team.is_featured = v;
        }
    }
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(MarketError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_price(price: i64) -> Result<()> {
    if price < 0 {
        return Err(MarketError::validation("price must not be negative"));
    }
    Ok(())
}

/// Steps must be numbered 1..=n in order
fn validate_workflow(steps: &[WorkflowStep]) -> Result<()> {
    for (index, step) in steps.iter().enumerate() {
        let expected = u32::try_from(index + 1).unwrap_or(u32::MAX);
        if step.step != expected {
            return Err(MarketError::validation(format!(
                "workflow step {} is out of order (expected {expected})",
                step.step
            )));
        }
        require_text("workflow step description", &step.description)?;
    }
    Ok(())
}

/// Catalog storage trait
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_agents(&self) -> StoreResult<Vec<Agent>>;

    async fn featured_agents(&self) -> StoreResult<Vec<Agent>>;

    async fn get_agent(&self, id: AgentId) -> StoreResult<Option<Agent>>;

    async fn create_agent(&self, agent: NewAgent, created_by: Option<UserId>) -> StoreResult<Agent>;

    async fn update_agent(&self, id: AgentId, patch: AgentPatch) -> StoreResult<Option<Agent>>;

    async fn delete_agent(&self, id: AgentId) -> StoreResult<bool>;

    /// Agents that belong to a team, in id order
    async fn team_agents(&self, team_id: TeamId) -> StoreResult<Vec<Agent>>;

    async fn list_teams(&self) -> StoreResult<Vec<AgentTeam>>;

    async fn featured_teams(&self) -> StoreResult<Vec<AgentTeam>>;

    async fn get_team(&self, id: TeamId) -> StoreResult<Option<AgentTeam>>;

    async fn create_team(&self, team: NewTeam, created_by: Option<UserId>) -> StoreResult<AgentTeam>;

    async fn update_team(&self, id: TeamId, patch: TeamPatch) -> StoreResult<Option<AgentTeam>>;

    async fn delete_team(&self, id: TeamId) -> StoreResult<bool>;
}

#[derive(Default)]
struct CatalogTables {
    agents: BTreeMap<AgentId, Agent>,
    teams: BTreeMap<TeamId, AgentTeam>,
    agent_ids: IdSequence,
    team_ids: IdSequence,
}

/// In-memory catalog
#[derive(Default)]
pub struct MemoryCatalog {
    tables: RwLock<CatalogTables>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn list_agents(&self) -> StoreResult<Vec<Agent>> {
        Ok(self.tables.read().await.agents.values().cloned().collect())
    }

    async fn featured_agents(&self) -> StoreResult<Vec<Agent>> {
        let tables = self.tables.read().await;
        Ok(tables.agents.values().filter(|a| a.is_featured()).cloned().collect())
    }

    async fn get_agent(&self, id: AgentId) -> StoreResult<Option<Agent>> {
        Ok(self.tables.read().await.agents.get(&id).cloned())
    }

    async fn create_agent(&self, agent: NewAgent, created_by: Option<UserId>) -> StoreResult<Agent> {
        let mut tables = self.tables.write().await;
        let id = AgentId(tables.agent_ids.next());
        let record = Agent {
            id,
            name: agent.name,
            description: agent.description,
            price: agent.price,
            category: agent.category,
            features: agent.features,
            is_popular: agent.is_popular,
            is_new: agent.is_new,
            is_enterprise: agent.is_enterprise,
            team_id: agent.team_id,
            team_role: agent.team_role,
            created_by,
            created_at: Utc::now(),
        };
        tables.agents.insert(id, record.clone());
        Ok(record)
    }

    async fn update_agent(&self, id: AgentId, patch: AgentPatch) -> StoreResult<Option<Agent>> {
        let mut tables = self.tables.write().await;
        Ok(tables.agents.get_mut(&id).map(|agent| {
            patch.apply(agent);
            agent.clone()
        }))
    }

    async fn delete_agent(&self, id: AgentId) -> StoreResult<bool> {
        Ok(self.tables.write().await.agents.remove(&id).is_some())
    }

    async fn team_agents(&self, team_id: TeamId) -> StoreResult<Vec<Agent>> {
        let tables = self.tables.read().await;
        Ok(tables
            .agents
            .values()
            .filter(|a| a.team_id == Some(team_id))
            .cloned()
            .collect())
    }

    async fn list_teams(&self) -> StoreResult<Vec<AgentTeam>> {
        Ok(self.tables.read().await.teams.values().cloned().collect())
    }

    async fn featured_teams(&self) -> StoreResult<Vec<AgentTeam>> {
        let tables = self.tables.read().await;
        Ok(tables
            .teams
            .values()
            .filter(|t| t.is_popular || t.is_featured)
            .cloned()
            .collect())
    }

    async fn get_team(&self, id: TeamId) -> StoreResult<Option<AgentTeam>> {
        Ok(self.tables.read().await.teams.get(&id).cloned())
    }

    async fn create_team(&self, team: NewTeam, created_by: Option<UserId>) -> StoreResult<AgentTeam> {
        let mut tables = self.tables.write().await;
        let id = TeamId(tables.team_ids.next());
        let record = AgentTeam {
            id,
            name: team.name,
            description: team.description,
            category: team.category,
            price: team.price,
            target: team.target,
            impact: team.impact,
            workflow: team.workflow,
            is_popular: team.is_popular,
            is_featured: team.is_featured,
            created_by,
            created_at: Utc::now(),
        };
        tables.teams.insert(id, record.clone());
        Ok(record)
    }

    async fn update_team(&self, id: TeamId, patch: TeamPatch) -> StoreResult<Option<AgentTeam>> {
        let mut tables = self.tables.write().await;
        Ok(tables.teams.get_mut(&id).map(|team| {
            patch.apply(team);
            team.clone()
        }))
    }

    async fn delete_team(&self, id: TeamId) -> StoreResult<bool> {
        Ok(self.tables.write().await.teams.remove(&id).is_some())
    }
}

fn demo_agent(name: &str, description: &str, price: i64, category: &str, features: &[&str]) -> NewAgent {
    NewAgent {
        name: name.into(),
        description: description.into(),
        price,
        category: category.into(),
        features: features.iter().map(|f| (*f).to_string()).collect(),
        ..Default::default()
    }
}

/// Load the demo catalog: eight standalone agents and the LexiSuite team
pub async fn seed_demo_catalog(catalog: &dyn CatalogStore) -> StoreResult<()> {
    let standalone = [
        NewAgent {
            is_popular: true,
            ..demo_agent(
                "Email Assistant",
                "Automate email management and responses.",
                999,
                "Communication",
                &["Email classification", "Auto-replies", "Follow-up reminders"],
            )
        },
        NewAgent {
            is_popular: true,
            ..demo_agent(
                "Social Media Manager",
                "Automate content creation and scheduling across all your social media platforms.",
                1299,
                "Marketing",
                &["Content creation", "Scheduling", "Analytics"],
            )
        },
        NewAgent {
            is_new: true,
            ..demo_agent(
                "Data Analyzer",
                "Process and analyze large datasets to extract valuable insights automatically.",
                1999,
                "Data",
                &["Data processing", "Analysis", "Visualization"],
            )
        },
        NewAgent {
            is_enterprise: true,
            ..demo_agent(
                "Customer Support",
                "AI-powered customer support that handles inquiries 24/7 with natural language.",
                2499,
                "Support",
                &["Query handling", "Knowledge base integration", "Escalation"],
            )
        },
        NewAgent {
            is_new: true,
            ..demo_agent(
                "LexiDraft AI",
                "AI-powered contract generation & compliance review for lawyers and law firms.",
                2999,
                "Legal",
                &["Contract generation", "Compliance review", "Legal document automation"],
            )
        },
        NewAgent {
            is_popular: true,
            ..demo_agent(
                "HiredEdge",
                "Auto-generates ATS-optimized resumes & applies to jobs with one click.",
                1499,
                "Career",
                &["Resume optimization", "Job application automation", "ATS keyword matching"],
            )
        },
        NewAgent {
            is_enterprise: true,
            ..demo_agent(
                "PropMatch AI",
                "AI-driven lead scoring, automated follow-ups, & real-time property matching.",
                3499,
                "Real Estate",
                &["Lead generation", "Property matching", "Automated follow-ups"],
            )
        },
        NewAgent {
            is_popular: true,
            ..demo_agent(
                "ShopGenie",
                "Auto-optimizes product titles, descriptions & pricing based on market trends.",
                1999,
                "E-commerce",
                &["Product listing optimization", "Pricing strategy", "Description enhancement"],
            )
        },
    ];

    for agent in standalone {
        catalog.create_agent(agent, None).await?;
    }

    let members = [
        ("ContractBot", "User uploads or requests a contract", "Document Generation", 2999),
        ("ReviewBot", "ReviewBot checks for missing clauses & compliance", "Compliance Analysis", 2499),
        ("CaseLawBot", "CaseLawBot pulls case references for relevant sections", "Legal Research", 2999),
        ("DueDiligenceBot", "DueDiligenceBot flags risks involving any parties", "Risk Assessment", 3499),
    ];

    let team = catalog
        .create_team(
            NewTeam {
                name: "LexiSuite".into(),
                description: "AI-powered legal document generation, compliance review, and due diligence".into(),
                category: "Legal".into(),
                price: 9999,
                target: Some("Law Firms, Compliance Teams, Enterprises with Contract Management Needs".into()),
                impact: Some("Saves 80% of time in contract drafting & legal research".into()),
                workflow: members
                    .iter()
                    .zip(1u32..)
                    .map(|((agent, step, _, _), n)| WorkflowStep {
                        step: n,
                        description: (*step).to_string(),
                        agent: (*agent).to_string(),
                    })
                    .collect(),
                is_popular: true,
                is_featured: true,
            },
            None,
        )
        .await?;

    for (name, _, role, price) in members {
        catalog
            .create_agent(
                NewAgent {
                    team_id: Some(team.id),
                    team_role: Some(role.into()),
                    ..demo_agent(name, role, price, "Legal", &[])
                },
                None,
            )
            .await?;
    }

    tracing::info!(team = %team.name, "Seeded demo catalog");
    Ok(())
}
