//! Alert system module
//!
//! Threshold rules turn telemetry into notifications with deterministic ids
//! (`<kind>-<truck>`), the notification center keeps a bounded, deduplicated,
//! newest-first list, and delivery hands newly seen alerts to notification channels.

use crate::store::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

pub mod channels;
pub mod delivery;
pub mod dispatcher;
pub mod rules;

/// Most recent notifications retained.
pub const MAX_NOTIFICATIONS: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Temperature,
    Humidity,
    Shock,
    Connection,
}

impl AlertKind {
    /// Name used in the `type` field and e-mail subject.
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Temperature => "temperature",
            AlertKind::Humidity => "humidity",
            AlertKind::Shock => "shock",
            AlertKind::Connection => "connection",
        }
    }

    /// Prefix of the deterministic notification id.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            AlertKind::Temperature => "temp",
            AlertKind::Humidity => "humidity",
            AlertKind::Shock => "shock",
            AlertKind::Connection => "offline",
        }
    }

    pub fn category(&self) -> Category {
        match self {
            AlertKind::Connection => Category::Fleet,
            _ => Category::Sensor,
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Sensor,
    Fleet,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Sensor => "sensor",
            Category::Fleet => "fleet",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

/// One alert shown to users and delivered over channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub category: Category,
    pub message: String,
    pub value: String,
    pub truck: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub is_read: bool,
}

impl Notification {
    pub fn new(
        kind: AlertKind,
        truck: &str,
        message: String,
        value: String,
        severity: Severity,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: notification_id(kind, truck),
            kind,
            category: kind.category(),
            message,
            value,
            truck: truck.to_string(),
            severity,
            timestamp,
            is_read: false,
        }
    }

    pub fn visible_to(&self, role: Role) -> bool {
        match role {
            Role::Farmer | Role::Admin => true,
            Role::Driver | Role::Transporter => self.category == Category::Fleet,
        }
    }
}

/// Deterministic id: repeated breaches of the same kind on the same truck share it.
pub fn notification_id(kind: AlertKind, truck: &str) -> String {
    format!("{}-{}", kind.id_prefix(), truck)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub added: usize,
    pub refreshed: usize,
}

/// Bounded, deduplicated notification list, newest first.
#[derive(Debug, Clone)]
pub struct NotificationCenter {
    items: Vec<Notification>,
    capacity: usize,
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::with_capacity(MAX_NOTIFICATIONS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::new(),
            capacity,
        }
    }

    /// Put `incoming` in front of the existing list. A notification whose id is already
    /// present replaces the old record (fresh value, unread again); within `incoming` the
    /// first occurrence of an id wins. The list is then truncated to capacity.
    pub fn merge(&mut self, incoming: Vec<Notification>) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        if incoming.is_empty() {
            return outcome;
        }
        let existing: HashSet<String> = self.items.iter().map(|n| n.id.clone()).collect();
        let mut seen: HashSet<String> = HashSet::new();
        let mut merged = Vec::with_capacity(incoming.len() + self.items.len());

        for n in incoming {
            if !seen.insert(n.id.clone()) {
                continue;
            }
            if existing.contains(&n.id) {
                outcome.refreshed += 1;
            } else {
                outcome.added += 1;
            }
            merged.push(n);
        }
        for n in self.items.drain(..) {
            if seen.insert(n.id.clone()) {
                merged.push(n);
            }
        }
        merged.truncate(self.capacity);
        self.items = merged;
        debug!(
            "Alerts: merged notifications (added={}, refreshed={}, total={})",
            outcome.added,
            outcome.refreshed,
            self.items.len()
        );
        outcome
    }

    pub fn all(&self) -> &[Notification] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&Notification> {
        self.items.iter().find(|n| n.id == id)
    }

    pub fn notifications_for(&self, role: Role) -> Vec<&Notification> {
        self.items.iter().filter(|n| n.visible_to(role)).collect()
    }

    pub fn unread_count(&self, role: Role) -> usize {
        self.items
            .iter()
            .filter(|n| n.visible_to(role) && !n.is_read)
            .count()
    }

    /// Returns false if no notification has this id.
    pub fn mark_as_read(&mut self, id: &str) -> bool {
        match self.items.iter_mut().find(|n| n.id == id) {
            Some(n) => {
                n.is_read = true;
                true
            }
            None => false,
        }
    }

    pub fn mark_all_as_read(&mut self) {
        for n in self.items.iter_mut() {
            n.is_read = true;
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
