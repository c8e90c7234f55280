//! Investigation cases and their lifecycle
//!
//! An investigation is the aggregation root: evidence, analyses, anomalies,
//! traces, damage calculations and reports all hang off its id. Cases are never
//! deleted, only closed.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, EngineResult};

/// Case status. Transitions only move forward unless a case is reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestigationStatus {
    Open,
    InProgress,
    Completed,
    Closed,
}

impl InvestigationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvestigationStatus::Open => "open",
            InvestigationStatus::InProgress => "in_progress",
            InvestigationStatus::Completed => "completed",
            InvestigationStatus::Closed => "closed",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            InvestigationStatus::Open => 0,
            InvestigationStatus::InProgress => 1,
            InvestigationStatus::Completed => 2,
            InvestigationStatus::Closed => 3,
        }
    }

    /// Forward moves (including skipping states) and no-op moves are allowed
    pub fn can_transition_to(&self, next: InvestigationStatus) -> bool {
        next.rank() >= self.rank()
    }

    pub fn check_transition(&self, next: InvestigationStatus) -> EngineResult<()> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(EngineError::InvalidTransition {
                from: self.as_str().to_string(),
                to: next.as_str().to_string(),
            })
        }
    }

    /// Status a case returns to when explicitly reopened
    pub fn reopen(&self) -> EngineResult<InvestigationStatus> {
        match self {
            InvestigationStatus::Completed | InvestigationStatus::Closed => {
                Ok(InvestigationStatus::InProgress)
            }
            _ => Err(EngineError::InvalidTransition {
                from: self.as_str().to_string(),
                to: InvestigationStatus::InProgress.as_str().to_string(),
            }),
        }
    }
}

impl fmt::Display for InvestigationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvestigationStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(InvestigationStatus::Open),
            "in_progress" => Ok(InvestigationStatus::InProgress),
            "completed" => Ok(InvestigationStatus::Completed),
            "closed" => Ok(InvestigationStatus::Closed),
            other => Err(EngineError::validation(format!(
                "Unknown investigation status '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Investigation {
    pub id: String,
    /// Human-facing case identifier
    pub case_number: String,
    pub title: String,
    pub allegations: Option<String>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub status: InvestigationStatus,
    pub owner_id: String,
    pub lead_investigator: Option<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for opening a case
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewInvestigation {
    #[serde(default)]
    pub case_number: Option<String>,
    pub title: String,
    #[serde(default)]
    pub allegations: Option<String>,
    #[serde(default)]
    pub period_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub period_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub lead_investigator: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl NewInvestigation {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.title.trim().is_empty() {
            return Err(EngineError::validation("Investigation title is required"));
        }
        if let (Some(start), Some(end)) = (self.period_start, self.period_end) {
            if start > end {
                return Err(EngineError::validation(
                    "Investigation period start must not be after its end",
                ));
            }
        }
        if let Some(meta) = &self.metadata {
            if !meta.is_object() {
                return Err(EngineError::validation("Investigation metadata must be a JSON object"));
            }
        }
        Ok(())
    }

    /// Materialize the case for `owner_id` as a freshly opened investigation
    pub fn into_investigation(self, owner_id: &str) -> EngineResult<Investigation> {
        self.validate()?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let case_number = self
            .case_number
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| format!("FA-{}-{}", now.format("%Y%m%d"), &id[..8].to_uppercase()));

        Ok(Investigation {
            id,
            case_number,
            title: self.title.trim().to_string(),
            allegations: self.allegations,
            period_start: self.period_start,
            period_end: self.period_end,
            status: InvestigationStatus::Open,
            owner_id: owner_id.to_string(),
            lead_investigator: self.lead_investigator,
            metadata: self.metadata.unwrap_or_else(|| Value::Object(Default::default())),
            created_at: now,
            updated_at: now,
        })
    }
}
