//! What the engine reports back to its owner.

use crate::audio::{Device, Role};
use thiserror::Error;
use tokio::sync::mpsc;

/// Result of one correction, after any retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionOutcome {
    /// The preferred device is now the default
    Applied,

    /// The preferred device is not connected; nothing was retried
    DeviceNotFound,

    /// Every write attempt failed
    GaveUpAfterRetries,
}

/// Non-fatal faults. The engine keeps running after all of them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineFault {
    /// Device enumeration failed; the catalog is unknown until the next refresh
    #[error("device enumeration failed: {0}")]
    EnumerationFailed(String),

    /// Notification registration was rejected; no live corrections happen
    #[error("device notifications unavailable: {0}")]
    SubscriptionFailed(String),
}

/// Callbacks from the engine to a controller/UI layer.
///
/// Called from the engine task; implementations must not block.
pub trait EngineDelegate: Send + Sync {
    /// The device list changed. Includes placeholders for absent preferred devices.
    fn on_device_list_changed(&self, _devices: &[Device]) {}

    fn on_correction_outcome(&self, _role: Role, _outcome: CorrectionOutcome) {}

    fn on_fault(&self, _fault: &EngineFault) {}
}

/// Delegate callbacks as values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    DeviceListChanged(Vec<Device>),
    CorrectionOutcome { role: Role, outcome: CorrectionOutcome },
    Fault(EngineFault),
}

/// Delegate that forwards every callback into a channel, for owners that
/// process engine events on their own loop.
pub struct ChannelDelegate {
    sender: mpsc::UnboundedSender<EngineEvent>,
}

impl ChannelDelegate {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn send(&self, event: EngineEvent) {
        // Receiver gone means the owner is shutting down
        let _ = self.sender.send(event);
    }
}

impl EngineDelegate for ChannelDelegate {
    fn on_device_list_changed(&self, devices: &[Device]) {
        self.send(EngineEvent::DeviceListChanged(devices.to_vec()));
    }

    fn on_correction_outcome(&self, role: Role, outcome: CorrectionOutcome) {
        self.send(EngineEvent::CorrectionOutcome { role, outcome });
    }

    fn on_fault(&self, fault: &EngineFault) {
        self.send(EngineEvent::Fault(fault.clone()));
    }
}
