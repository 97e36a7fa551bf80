//! Scriptable in-memory backend for tests.

use super::backend::{AudioBackend, BackendEvent, EventCallback, SubscriptionHandle};
use super::device::{AudioError, DeviceHandle, PerRole, RawDevice, Role, SetDefaultError};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

pub(crate) fn raw_input(uid: &str, name: &str) -> RawDevice {
    raw_device(uid, name, true, false)
}

pub(crate) fn raw_output(uid: &str, name: &str) -> RawDevice {
    raw_device(uid, name, false, true)
}

fn raw_device(uid: &str, name: &str, input: bool, output: bool) -> RawDevice {
    RawDevice {
        handle: DeviceHandle(0),
        uid: Some(uid.to_string()),
        name: Some(name.to_string()),
        supports_input: input,
        supports_output: output,
    }
}

/// A recorded `set_default_device` invocation.
#[derive(Debug, Clone)]
pub(crate) struct SetCall {
    pub uid: String,
    pub role: Role,
    pub at: Instant,
}

#[derive(Default)]
struct FakeState {
    devices: Vec<RawDevice>,
    listing_fails: bool,
    defaults: PerRole<Option<String>>,
    set_calls: Vec<SetCall>,
    scripted_failures: VecDeque<i32>,
    subscribers: HashMap<u64, EventCallback>,
    next_subscription: u64,
    subscribe_calls: usize,
    subscribe_fails: bool,
}

/// Behaves like an OS audio subsystem: writes change the default and fire
/// `DefaultChanged`, just as a real system re-announces the new default.
#[derive(Default)]
pub(crate) struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn with_devices(devices: Vec<RawDevice>) -> Self {
        let backend = Self::default();
        backend.lock().devices = devices;
        backend
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Change the OS default without notifying anyone.
    pub fn set_system_default(&self, role: Role, uid: Option<&str>) {
        self.lock().defaults[role] = uid.map(str::to_string);
    }

    pub fn system_default(&self, role: Role) -> Option<String> {
        self.lock().defaults[role].clone()
    }

    pub fn add_device(&self, device: RawDevice) {
        self.lock().devices.push(device);
    }

    pub fn fail_listing(&self, fails: bool) {
        self.lock().listing_fails = fails;
    }

    pub fn fail_subscribe(&self, fails: bool) {
        self.lock().subscribe_fails = fails;
    }

    /// The next `count` writes fail with an OS status.
    pub fn fail_next_sets(&self, count: usize) {
        let mut state = self.lock();
        for _ in 0..count {
            state.scripted_failures.push_back(0x8000_4005_u32 as i32);
        }
    }

    pub fn set_calls(&self) -> Vec<SetCall> {
        self.lock().set_calls.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub fn subscribe_calls(&self) -> usize {
        self.lock().subscribe_calls
    }

    /// Deliver a notification to every current subscriber.
    pub fn emit(&self, event: BackendEvent) {
        let callbacks: Vec<EventCallback> = self.lock().subscribers.values().cloned().collect();
        for callback in callbacks {
            callback(event);
        }
    }
}

impl AudioBackend for FakeBackend {
    fn list_devices(&self) -> Result<Vec<RawDevice>, AudioError> {
        let state = self.lock();
        if state.listing_fails {
            return Err(AudioError::EnumerationFailed { code: -1 });
        }
        Ok(state.devices.clone())
    }

    fn default_device(&self, role: Role) -> Option<String> {
        self.lock().defaults[role].clone()
    }

    fn set_default_device(&self, uid: &str, role: Role) -> Result<(), SetDefaultError> {
        {
            let mut state = self.lock();
            state.set_calls.push(SetCall {
                uid: uid.to_string(),
                role,
                at: Instant::now(),
            });

            let present = state
                .devices
                .iter()
                .any(|d| d.uid.as_deref() == Some(uid));
            if !present {
                return Err(SetDefaultError::NotFound {
                    uid: uid.to_string(),
                });
            }
            if let Some(code) = state.scripted_failures.pop_front() {
                return Err(SetDefaultError::Os(code));
            }
            state.defaults[role] = Some(uid.to_string());
        }

        self.emit(BackendEvent::DefaultChanged(role));
        Ok(())
    }

    fn subscribe(&self, callback: EventCallback) -> Result<SubscriptionHandle, AudioError> {
        let mut state = self.lock();
        state.subscribe_calls += 1;
        if state.subscribe_fails {
            return Err(AudioError::SubscriptionFailed { code: -1 });
        }
        state.next_subscription += 1;
        let id = state.next_subscription;
        state.subscribers.insert(id, callback);
        Ok(SubscriptionHandle::new(id))
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.lock().subscribers.remove(&handle.id());
    }
}
