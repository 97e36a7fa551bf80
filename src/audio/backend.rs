//! The contract between the reconciliation engine and the OS audio subsystem.

use super::device::{AudioError, RawDevice, Role, SetDefaultError};
use std::sync::Arc;

/// Change notifications pushed by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendEvent {
    /// The OS default device for a role changed
    DefaultChanged(Role),

    /// A device was added, removed, enabled or disabled
    DeviceListChanged,
}

/// Receiver for backend notifications.
///
/// Invoked on whatever thread the OS delivers notifications on. Implementations
/// must return promptly and must not call back into the backend.
pub type EventCallback = Arc<dyn Fn(BackendEvent) + Send + Sync>;

/// Registration returned by [`AudioBackend::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// OS audio subsystem operations the engine depends on.
///
/// Every method except `subscribe`/`unsubscribe` is called synchronously from
/// the engine task, so calls block a runtime worker while they run. They must
/// be short OS queries (the Windows backend makes a few COM calls per method)
/// and must never wait on the engine itself.
pub trait AudioBackend: Send + Sync + 'static {
    /// Enumerate devices. Errors are surfaced so the catalog can report them;
    /// the catalog turns them into an empty, unknown snapshot.
    fn list_devices(&self) -> Result<Vec<RawDevice>, AudioError>;

    /// UID of the current default device for `role`, `None` if the query fails.
    fn default_device(&self, role: Role) -> Option<String>;

    /// Make `uid` the default device for `role`.
    fn set_default_device(&self, uid: &str, role: Role) -> Result<(), SetDefaultError>;

    /// Start delivering change notifications to `callback`.
    fn subscribe(&self, callback: EventCallback) -> Result<SubscriptionHandle, AudioError>;

    /// Remove exactly the listeners added by the matching `subscribe`.
    /// Once this returns the callback is never invoked again.
    fn unsubscribe(&self, handle: SubscriptionHandle);
}
