//! Audio device model and the OS audio subsystem boundary.
//!
//! This module provides the device types, the backend contract the engine
//! consumes, the device catalog, and the Windows Core Audio backend.

pub mod backend;
pub mod catalog;
pub mod device;

#[cfg(windows)]
pub mod mmdevice;

#[cfg(test)]
pub(crate) mod fake;

pub use backend::{AudioBackend, BackendEvent, EventCallback, SubscriptionHandle};
pub use catalog::DeviceCatalog;
pub use device::{AudioError, Device, DeviceHandle, PerRole, RawDevice, Role, SetDefaultError};

#[cfg(windows)]
pub use mmdevice::WindowsBackend;
