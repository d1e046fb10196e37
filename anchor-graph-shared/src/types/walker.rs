use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::access::Access;
use crate::types::dates;
use crate::types::object_id::ObjectId;
use crate::types::reference::{AnchorKind, Reference};

/// Lifecycle of a scheduled walker run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Pending => "PENDING",
            ScheduleStatus::Running => "RUNNING",
            ScheduleStatus::Completed => "COMPLETED",
            ScheduleStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ScheduleStatus::Completed | ScheduleStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub status: ScheduleStatus,
    pub root_id: ObjectId,
    #[serde(default)]
    pub node_id: Option<ObjectId>,
    #[serde(with = "dates")]
    pub execute_date: DateTime<Utc>,
    #[serde(default, with = "dates::option")]
    pub executed_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub http_status: Option<u16>,
    #[serde(default)]
    pub reports: Vec<Value>,
    #[serde(default)]
    pub custom: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Persisted walker document, one per scheduled or submitted run.
///
/// `name` is the registered walker name. `archetype` holds the walker's
/// fields and is written back after the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkerRecord {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    #[serde(default)]
    pub root: Option<ObjectId>,
    #[serde(default)]
    pub access: Access,
    #[serde(default)]
    pub archetype: Map<String, Value>,
    #[serde(default)]
    pub schedule: Option<Schedule>,
}

impl WalkerRecord {
    /// A PENDING run of `name` owned by `root`, due at `execute_date`.
    pub fn pending(
        id: ObjectId,
        name: impl Into<String>,
        root: ObjectId,
        node_id: Option<ObjectId>,
        archetype: Map<String, Value>,
        execute_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            root: Some(root),
            access: Access::default(),
            archetype,
            schedule: Some(Schedule {
                status: ScheduleStatus::Pending,
                root_id: root,
                node_id,
                execute_date,
                executed_date: None,
                http_status: None,
                reports: Vec::new(),
                custom: None,
                error: None,
            }),
        }
    }

    /// Handle returned to submitters: `w:<name>:<hex>`.
    pub fn reference(&self) -> Reference {
        Reference::new(AnchorKind::Walker, Some(self.name.clone()), self.id)
    }

    pub fn status(&self) -> Option<ScheduleStatus> {
        self.schedule.as_ref().map(|schedule| schedule.status)
    }

    pub fn to_document(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn from_document(document: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(document)
    }
}
