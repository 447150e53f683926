//! Sync request metadata and ordering.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Priority of a sync request. Higher wins.
///
/// User-triggered requests are scheduled `High`, foreground hints `Medium`,
/// and background sweeps `Low`.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// Which entity a sync request targets.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    User,
    Repo,
}

impl RequestKind {
    /// Stable label used in metrics and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            RequestKind::User => "user",
            RequestKind::Repo => "repo",
        }
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata of one queued sync request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMeta {
    /// Entity kind the request targets.
    pub kind: RequestKind,
    /// Internal ID, meaningful within `kind`.
    pub id: u32,
    /// Scheduling priority.
    pub priority: Priority,
    /// Instant before which the request is not eligible; `None` means
    /// "immediately".
    pub next_sync_at: Option<DateTime<Utc>>,
}

impl RequestMeta {
    /// Create a request that is eligible immediately.
    pub fn immediate(kind: RequestKind, id: u32, priority: Priority) -> Self {
        Self {
            kind,
            id,
            priority,
            next_sync_at: None,
        }
    }

    /// Queue ordering: higher priority first, then earlier `next_sync_at`
    /// (`None` sorts before every instant). `Less` means "scheduled first".
    pub(crate) fn queue_order(&self, other: &RequestMeta) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| match (self.next_sync_at, other.next_sync_at) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(a), Some(b)) => a.cmp(&b),
            })
    }
}
