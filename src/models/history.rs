use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::OrderStatus;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorType {
    Ops,
    Driver,
    System,
}

impl ActorType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActorType::Ops => "OPS",
            ActorType::Driver => "DRIVER",
            ActorType::System => "SYSTEM",
        }
    }
}

/// Who is performing an operation. `id` is free-form and only recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub kind: ActorType,
    pub id: Option<String>,
}

impl Actor {
    pub fn ops(id: Option<String>) -> Self {
        Self {
            kind: ActorType::Ops,
            id,
        }
    }

    pub fn driver(id: Option<String>) -> Self {
        Self {
            kind: ActorType::Driver,
            id,
        }
    }

    /// Automatic entries; `id` names whoever triggered them, if anyone.
    pub fn system(id: Option<String>) -> Self {
        Self {
            kind: ActorType::System,
            id,
        }
    }
}

/// One audit record. Entries are written once and never edited.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusHistoryEntry {
    pub id: Uuid,
    pub from_status: Option<OrderStatus>,
    pub to_status: OrderStatus,
    pub actor_type: ActorType,
    pub actor_id: Option<String>,
    pub stop_id: Option<Uuid>,
    pub note: Option<String>,
    pub at: DateTime<Utc>,
}

impl StatusHistoryEntry {
    pub fn new(
        from_status: Option<OrderStatus>,
        to_status: OrderStatus,
        actor: &Actor,
        note: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            from_status,
            to_status,
            actor_type: actor.kind,
            actor_id: actor.id.clone(),
            stop_id: None,
            note,
            at: Utc::now(),
        }
    }

    pub fn with_stop(mut self, stop_id: Option<Uuid>) -> Self {
        self.stop_id = stop_id;
        self
    }

    /// Same-status entries annotate the order (reassignment) without moving it.
    pub fn is_annotation(&self) -> bool {
        self.from_status == Some(self.to_status)
    }
}
