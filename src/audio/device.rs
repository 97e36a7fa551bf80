//! Audio device data models.
//!
//! Defines the device records produced by enumeration, the two reconciled
//! roles, and the error types shared by every backend.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};
use thiserror::Error;

/// Enumeration-local handle for a device.
///
/// Only meaningful within the listing that produced it. Never persist it or
/// compare handles from different enumeration calls; use the UID instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub u64);

/// A device as reported by a backend, before validation.
///
/// Backends report what the OS gives them; [`DeviceCatalog`](super::DeviceCatalog)
/// decides which entries are usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDevice {
    pub handle: DeviceHandle,

    /// Stable OS identifier, `None` if the OS query failed
    pub uid: Option<String>,

    /// Human-readable name, `None` if the OS query failed
    pub name: Option<String>,

    pub supports_input: bool,
    pub supports_output: bool,
}

/// A validated audio device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    /// Enumeration handle, `None` for placeholder entries
    #[serde(skip)]
    pub handle: Option<DeviceHandle>,

    /// Stable OS-assigned identifier, unique within a catalog snapshot
    pub uid: String,

    /// Display name
    pub name: String,

    pub supports_input: bool,
    pub supports_output: bool,

    /// False for placeholders of preferred devices that are not connected
    pub is_available: bool,
}

impl Device {
    /// Whether the device can serve as the default for `role`.
    pub fn supports(&self, role: Role) -> bool {
        match role {
            Role::Input => self.supports_input,
            Role::Output => self.supports_output,
        }
    }
}

/// The two independent axes the engine reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Recording devices (microphones)
    Input,

    /// Playback devices (speakers, headphones)
    Output,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Input, Role::Output];
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Input => f.write_str("input"),
            Role::Output => f.write_str("output"),
        }
    }
}

/// One value per [`Role`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PerRole<T> {
    pub input: T,
    pub output: T,
}

impl<T> PerRole<T> {
    pub fn new(input: T, output: T) -> Self {
        Self { input, output }
    }
}

impl<T> Index<Role> for PerRole<T> {
    type Output = T;

    fn index(&self, role: Role) -> &T {
        match role {
            Role::Input => &self.input,
            Role::Output => &self.output,
        }
    }
}

impl<T> IndexMut<Role> for PerRole<T> {
    fn index_mut(&mut self, role: Role) -> &mut T {
        match role {
            Role::Input => &mut self.input,
            Role::Output => &mut self.output,
        }
    }
}

/// Audio backend error types.
///
/// OS status codes are carried as plain integers (HRESULT on Windows) so the
/// type stays platform neutral.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AudioError {
    #[error("COM initialization failed (status {code:#010x})")]
    ComInitFailed { code: i32 },

    #[error("Failed to enumerate devices (status {code:#010x})")]
    EnumerationFailed { code: i32 },

    #[error("Failed to register for device notifications (status {code:#010x})")]
    SubscriptionFailed { code: i32 },
}

/// Failure of a default-device write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SetDefaultError {
    /// The target is not in the backend's current device set. Not retriable.
    #[error("device {uid} is not present")]
    NotFound { uid: String },

    /// The OS call failed. Retriable.
    #[error("OS rejected the default device change (status {0:#010x})")]
    Os(i32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_role_indexes_by_role() {
        let mut values = PerRole::new(1, 2);
        assert_eq!(values[Role::Input], 1);
        assert_eq!(values[Role::Output], 2);

        values[Role::Output] = 5;
        assert_eq!(values.output, 5);
    }

    #[test]
    fn device_supports_matches_flags() {
        let device = Device {
            handle: None,
            uid: "mic".to_string(),
            name: "Mic".to_string(),
            supports_input: true,
            supports_output: false,
            is_available: true,
        };

        assert!(device.supports(Role::Input));
        assert!(!device.supports(Role::Output));
    }

    #[test]
    fn os_status_is_rendered_as_hex() {
        let err = SetDefaultError::Os(0x8889_0004_u32 as i32);
        assert_eq!(
            err.to_string(),
            "OS rejected the default device change (status 0x88890004)"
        );
    }
}
