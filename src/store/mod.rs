//! Persisted session and preference state in `<data_dir>/state.json`.
//!
//! Holds the logged-in user, UI language, alert recipient override and the ids of alerts
//! already e-mailed per recipient. Mutated in memory, written back with `save`; long-running
//! writers call `reload` first so edits from other processes survive.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Dashboard role. Decides which alerts a user sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Farmer,
    Driver,
    Transporter,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Farmer => "farmer",
            Role::Driver => "driver",
            Role::Transporter => "transporter",
            Role::Admin => "admin",
        };
        f.write_str(s)
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "farmer" | "kisan" => Ok(Role::Farmer),
            "driver" => Ok(Role::Driver),
            "transporter" | "owner" => Ok(Role::Transporter),
            "admin" | "headoffice" => Ok(Role::Admin),
            other => Err(format!(
                "Unknown role '{}' (expected farmer|driver|transporter|admin)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub role: Role,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<UserSession>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_recipient: Option<String>,
    /// recipient -> alert ids already delivered to that recipient
    #[serde(default)]
    pub sent_alert_ids: BTreeMap<String, BTreeSet<String>>,
}

fn read_state(path: &Path) -> PersistedState {
    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<PersistedState>(&content) {
            Ok(state) => state,
            Err(e) => {
                warn!("Store: failed to parse {:?}, starting empty: {}", path, e);
                PersistedState::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("Store: no state file at {:?}", path);
            PersistedState::default()
        }
        Err(e) => {
            warn!("Store: failed to read {:?}, starting empty: {}", path, e);
            PersistedState::default()
        }
    }
}

pub struct StateStore {
    path: PathBuf,
    state: PersistedState,
}

impl StateStore {
    /// Load the state file. A missing or unreadable file starts from empty state.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = read_state(&path);
        Self { path, state }
    }

    /// Re-read the file so changes saved by another process win. Sent ids recorded in
    /// memory are merged into the fresh copy.
    pub fn reload(&mut self) {
        let mut fresh = read_state(&self.path);
        for (recipient, ids) in std::mem::take(&mut self.state.sent_alert_ids) {
            fresh.sent_alert_ids.entry(recipient).or_default().extend(ids);
        }
        self.state = fresh;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &PersistedState {
        &self.state
    }

    /// Write the state file, creating the parent directory if needed.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create state directory {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(&self.state).context("Failed to serialize state")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write state file {:?}", self.path))?;
        debug!("Store: saved state to {:?}", self.path);
        Ok(())
    }

    pub fn session(&self) -> Option<&UserSession> {
        self.state.session.as_ref()
    }

    pub fn login(&mut self, session: UserSession) {
        info!("Store: login as {} ({})", session.name, session.role);
        self.state.session = Some(session);
    }

    pub fn logout(&mut self) {
        if let Some(s) = self.state.session.take() {
            info!("Store: logout {}", s.name);
        }
    }

    pub fn language(&self) -> &str {
        self.state.language.as_deref().unwrap_or("en")
    }

    pub fn set_language(&mut self, lang: &str) {
        self.state.language = Some(lang.to_string());
    }

    pub fn set_recipient(&mut self, email: &str) {
        self.state.alert_recipient = Some(email.trim().to_string());
    }

    /// Logged-in user's e-mail, else the stored recipient, else `default`.
    pub fn alert_recipient(&self, default: &str) -> String {
        self.state
            .session
            .as_ref()
            .and_then(|s| s.email.clone())
            .or_else(|| self.state.alert_recipient.clone())
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| default.to_string())
    }

    pub fn was_sent(&self, recipient: &str, alert_id: &str) -> bool {
        self.state
            .sent_alert_ids
            .get(recipient)
            .map(|ids| ids.contains(alert_id))
            .unwrap_or(false)
    }

    /// Mark an alert as sent. Returns false if it already was.
    pub fn mark_sent(&mut self, recipient: &str, alert_id: &str) -> bool {
        self.state
            .sent_alert_ids
            .entry(recipient.to_string())
            .or_default()
            .insert(alert_id.to_string())
    }

    pub fn sent_ids_for(&self, recipient: &str) -> Vec<String> {
        self.state
            .sent_alert_ids
            .get(recipient)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }
}
