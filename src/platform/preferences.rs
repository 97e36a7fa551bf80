//! User device preferences and the store contract.
//!
//! Persistence medium is up to the embedding application; this module ships an
//! in-memory store that keeps the serialized form, the same shape a key/value
//! backed store would hold.

use crate::audio::Role;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A preferred device for one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferredDevice {
    /// Stable device UID; the only field reconciliation looks at
    pub uid: String,

    /// Last known display name, used while the device is absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl PreferredDevice {
    pub fn new(uid: impl Into<String>, name: Option<&str>) -> Self {
        Self {
            uid: uid.into(),
            name: name.map(str::to_string),
        }
    }
}

/// User preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preference {
    /// Whether the preferred devices are enforced
    pub active: bool,

    #[serde(default)]
    pub input: Option<PreferredDevice>,

    #[serde(default)]
    pub output: Option<PreferredDevice>,
}

impl Default for Preference {
    fn default() -> Self {
        Self {
            active: true,
            input: None,
            output: None,
        }
    }
}

impl Preference {
    pub fn preferred(&self, role: Role) -> Option<&PreferredDevice> {
        match role {
            Role::Input => self.input.as_ref(),
            Role::Output => self.output.as_ref(),
        }
    }

    pub fn preferred_uid(&self, role: Role) -> Option<&str> {
        self.preferred(role).map(|p| p.uid.as_str())
    }

    pub fn set_preferred(&mut self, role: Role, device: Option<PreferredDevice>) {
        match role {
            Role::Input => self.input = device,
            Role::Output => self.output = device,
        }
    }
}

/// Preferences service error types.
#[derive(Debug, Error)]
pub enum PreferencesError {
    #[error("Failed to write preferences: {0}")]
    WriteFailed(String),

    #[error("Invalid stored preferences: {0}")]
    InvalidValue(#[source] serde_json::Error),
}

/// Where the controller keeps [`Preference`] between runs.
pub trait PreferenceStore: Send {
    /// Stored preferences, `None` on first run.
    fn load(&self) -> Result<Option<Preference>, PreferencesError>;

    fn save(&mut self, preference: &Preference) -> Result<(), PreferencesError>;
}

/// Store that keeps the JSON encoding in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryPreferenceStore {
    data: Option<String>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `preference` already stored.
    pub fn seeded(preference: &Preference) -> Result<Self, PreferencesError> {
        let mut store = Self::new();
        store.save(preference)?;
        Ok(store)
    }

    /// Start with raw stored data, as read from some external medium.
    pub fn from_raw(data: impl Into<String>) -> Self {
        Self {
            data: Some(data.into()),
        }
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn load(&self) -> Result<Option<Preference>, PreferencesError> {
        self.data
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(PreferencesError::InvalidValue)
    }

    fn save(&mut self, preference: &Preference) -> Result<(), PreferencesError> {
        let data = serde_json::to_string(preference)
            .map_err(|e| PreferencesError::WriteFailed(e.to_string()))?;
        self.data = Some(data);
        Ok(())
    }
}
