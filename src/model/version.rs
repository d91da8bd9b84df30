//! Routing-table clock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The single counter+timestamp row signalling routing-table staleness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub version: u64,
    pub last_updated: DateTime<Utc>,
}

impl Version {
    pub fn initial() -> Self {
        Self {
            version: 1,
            last_updated: Utc::now(),
        }
    }

    /// The next generation.
    pub fn bumped(&self) -> Self {
        let mut last_updated = Utc::now();
        // Generations are compared by timestamp equality; never reuse one.
        if last_updated <= self.last_updated {
            last_updated = self.last_updated + chrono::Duration::microseconds(1);
        }
        Self {
            version: self.version + 1,
            last_updated,
        }
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::initial()
    }
}
