//! In-memory snapshot of enumerated devices.

use super::backend::AudioBackend;
use super::device::{AudioError, Device, RawDevice, Role};
use crate::platform::Preference;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Validated device list built from backend enumeration.
#[derive(Debug, Clone, Default)]
pub struct DeviceCatalog {
    devices: Vec<Device>,
    enumerated: bool,
}

impl DeviceCatalog {
    /// Create an empty catalog that has not been enumerated yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog directly from raw listings.
    pub fn from_raw(raw: Vec<RawDevice>) -> Self {
        let mut catalog = Self::new();
        catalog.replace(raw);
        catalog
    }

    /// Re-enumerate through `backend`.
    ///
    /// On failure the catalog is left empty and unknown and the error is
    /// returned for the caller to report.
    pub fn refresh<B: AudioBackend + ?Sized>(&mut self, backend: &B) -> Result<&[Device], AudioError> {
        match backend.list_devices() {
            Ok(raw) => {
                self.replace(raw);
                Ok(&self.devices)
            }
            Err(e) => {
                warn!(error = %e, "device enumeration failed");
                self.devices.clear();
                self.enumerated = false;
                Err(e)
            }
        }
    }

    fn replace(&mut self, raw: Vec<RawDevice>) {
        let mut seen = HashSet::new();
        let mut devices = Vec::with_capacity(raw.len());

        for entry in raw {
            if !entry.supports_input && !entry.supports_output {
                continue;
            }
            let Some(uid) = entry.uid.filter(|uid| !uid.is_empty()) else {
                debug!(handle = entry.handle.0, "skipping device without a UID");
                continue;
            };
            if !seen.insert(uid.clone()) {
                warn!(%uid, "duplicate device UID in enumeration");
                continue;
            }

            let name = entry
                .name
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| uid.clone());

            devices.push(Device {
                handle: Some(entry.handle),
                uid,
                name,
                supports_input: entry.supports_input,
                supports_output: entry.supports_output,
                is_available: true,
            });
        }

        self.devices = devices;
        self.enumerated = true;
    }

    /// Devices from the last successful enumeration, in backend order.
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// False until a refresh succeeds with at least one device. An empty
    /// catalog means the device set is unknown, not that none exist.
    pub fn is_known(&self) -> bool {
        self.enumerated && !self.devices.is_empty()
    }

    pub fn resolve(&self, uid: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.uid == uid)
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.resolve(uid).is_some()
    }

    /// The catalog plus unavailable placeholders for preferred devices that
    /// are not currently present.
    pub fn with_placeholders(&self, preference: &Preference) -> Vec<Device> {
        let mut devices = self.devices.clone();

        for role in Role::ALL {
            let Some(preferred) = preference.preferred(role) else {
                continue;
            };
            if self.contains(&preferred.uid) {
                continue;
            }

            if let Some(existing) = devices
                .iter_mut()
                .find(|d| !d.is_available && d.uid == preferred.uid)
            {
                existing.supports_input |= role == Role::Input;
                existing.supports_output |= role == Role::Output;
                continue;
            }

            devices.push(Device {
                handle: None,
                uid: preferred.uid.clone(),
                name: preferred
                    .name
                    .clone()
                    .unwrap_or_else(|| preferred.uid.clone()),
                supports_input: role == Role::Input,
                supports_output: role == Role::Output,
                is_available: false,
            });
        }

        devices
    }
}
