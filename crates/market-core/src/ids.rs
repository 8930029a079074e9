//! Identifiers
//!
//! Every table uses a monotonic integer surrogate key. Each key gets its own
//! newtype so an agent id can never be passed where a subscription id is expected.

use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<u64>().map(Self)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Marketplace user
    UserId
);
id_type!(
    /// Catalog agent
    AgentId
);
id_type!(
    /// Catalog agent team
    TeamId
);
id_type!(
    /// Row in either subscription ledger
    SubscriptionId
);
id_type!(
    /// Custom workflow request
    WorkflowRequestId
);

/// Monotonic id source for in-memory tables (first id is 1)
#[derive(Debug)]
pub struct IdSequence(u64);

impl Default for IdSequence {
    fn default() -> Self {
        Self(1)
    }
}

impl IdSequence {
    pub fn next(&mut self) -> u64 {
        let id = self.0;
        self.0 += 1;
        id
    }
}
