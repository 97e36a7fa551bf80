//! Windows Core Audio backend.
//!
//! Capture endpoints are inputs and render endpoints are outputs; the endpoint
//! ID string is the device UID. COM objects are created per call so the
//! backend can be used from any runtime thread.

mod enumerator;
mod notifications;
mod policy;

pub use enumerator::{ComGuard, DeviceEnumerator};
pub use notifications::EndpointNotificationClient;

use crate::audio::{
    AudioBackend, AudioError, EventCallback, RawDevice, Role, SetDefaultError, SubscriptionHandle,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{debug, warn};
use windows::Win32::Media::Audio::{IMMDeviceEnumerator, IMMNotificationClient};

/// A live notification registration.
struct Registration {
    enumerator: IMMDeviceEnumerator,
    client: IMMNotificationClient,
}

// Both objects are created in the multithreaded apartment and are free-threaded.
unsafe impl Send for Registration {}

/// [`AudioBackend`] over the MMDevice API.
///
/// Registrations outlive the per-call COM guards, so the process must keep
/// the multithreaded apartment alive (hold a [`ComGuard`] on the main thread)
/// while subscribed.
pub struct WindowsBackend {
    registrations: Mutex<HashMap<u64, Registration>>,
    next_id: AtomicU64,
}

impl WindowsBackend {
    /// Check that the audio subsystem is reachable.
    pub fn new() -> Result<Self, AudioError> {
        let _com = ComGuard::new()?;
        DeviceEnumerator::new()?;

        Ok(Self {
            registrations: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    fn with_enumerator<T>(
        &self,
        f: impl FnOnce(&DeviceEnumerator) -> Result<T, AudioError>,
    ) -> Result<T, AudioError> {
        let _com = ComGuard::new()?;
        let enumerator = DeviceEnumerator::new()?;
        f(&enumerator)
    }
}

impl AudioBackend for WindowsBackend {
    fn list_devices(&self) -> Result<Vec<RawDevice>, AudioError> {
        self.with_enumerator(|enumerator| enumerator.list_endpoints())
    }

    fn default_device(&self, role: Role) -> Option<String> {
        self.with_enumerator(|enumerator| Ok(enumerator.default_endpoint_id(role)))
            .ok()
            .flatten()
    }

    fn set_default_device(&self, uid: &str, role: Role) -> Result<(), SetDefaultError> {
        let present = self
            .with_enumerator(|enumerator| Ok(enumerator.is_active_endpoint(uid, role)))
            .map_err(|e| {
                warn!(error = %e, "cannot query endpoint before write");
                SetDefaultError::Os(com_status(&e))
            })?;
        if !present {
            return Err(SetDefaultError::NotFound {
                uid: uid.to_string(),
            });
        }

        let _com = ComGuard::new().map_err(|e| SetDefaultError::Os(com_status(&e)))?;
        policy::set_default_endpoint(uid).map_err(|e| SetDefaultError::Os(e.code().0))
    }

    fn subscribe(&self, callback: EventCallback) -> Result<SubscriptionHandle, AudioError> {
        let _com = ComGuard::new()?;
        let enumerator = DeviceEnumerator::new()?;
        let enumerator = enumerator.raw_enumerator().clone();

        let client = EndpointNotificationClient::new(callback)
            .register(&enumerator)
            .map_err(|e| AudioError::SubscriptionFailed { code: e.code().0 })?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.registrations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id, Registration { enumerator, client });

        debug!(id, "registered endpoint notification client");
        Ok(SubscriptionHandle::new(id))
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        // COM must outlive the registration's interface pointers
        let com = ComGuard::new();

        let registration = self
            .registrations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&handle.id());

        let Some(registration) = registration else {
            return;
        };
        if let Err(e) = &com {
            warn!(id = handle.id(), error = %e, "cannot enter COM to unregister notification client");
            return;
        }

        unsafe {
            if let Err(e) = registration
                .enumerator
                .UnregisterEndpointNotificationCallback(&registration.client)
            {
                warn!(id = handle.id(), error = %e, "failed to unregister notification client");
            }
        }
        debug!(id = handle.id(), "unregistered endpoint notification client");
    }
}

impl Drop for WindowsBackend {
    fn drop(&mut self) {
        let ids: Vec<u64> = self
            .registrations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .copied()
            .collect();
        for id in ids {
            self.unsubscribe(SubscriptionHandle::new(id));
        }
    }
}

fn com_status(error: &AudioError) -> i32 {
    match error {
        AudioError::ComInitFailed { code }
        | AudioError::EnumerationFailed { code }
        | AudioError::SubscriptionFailed { code } => *code,
    }
}
