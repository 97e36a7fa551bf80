//! The reconciliation state machine.
//!
//! A single task owns every role's state. Backend notifications, caller
//! commands and timer expiries are all handled here one at a time, so no two
//! transitions ever race. Debounce and retry delays are deadlines stored in
//! the role's phase; moving a role back to `Idle` drops its deadline, which is
//! how pending corrections are cancelled.

use super::delegate::{CorrectionOutcome, EngineDelegate, EngineFault};
use crate::audio::{
    AudioBackend, BackendEvent, DeviceCatalog, PerRole, Role, SetDefaultError,
};
use crate::config::EngineConfig;
use crate::platform::{Preference, PreferredDevice};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

/// Messages handled by the engine task.
pub(crate) enum Command {
    Backend(BackendEvent),
    SetActive(bool),
    SetPreferred {
        role: Role,
        device: Option<PreferredDevice>,
    },
    Snapshot {
        role: Role,
        response: oneshot::Sender<RoleSnapshot>,
    },
}

/// Where a role is in its correction lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    Idle,
    Scheduled,
    Correcting,
}

/// Read-only view of one role's reconciliation state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSnapshot {
    pub last_observed_default: Option<String>,
    pub phase: PhaseKind,
}

impl RoleSnapshot {
    pub fn pending_correction(&self) -> bool {
        self.phase != PhaseKind::Idle
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Idle,

    /// Debouncing; the default is re-checked at `due`
    Scheduled { due: Instant },

    /// Write attempt number `attempt` failed; the next one runs at `due`
    Correcting { attempt: u32, due: Instant },
}

impl Phase {
    fn due(&self) -> Option<Instant> {
        match *self {
            Phase::Idle => None,
            Phase::Scheduled { due } | Phase::Correcting { due, .. } => Some(due),
        }
    }

    fn kind(&self) -> PhaseKind {
        match self {
            Phase::Idle => PhaseKind::Idle,
            Phase::Scheduled { .. } => PhaseKind::Scheduled,
            Phase::Correcting { .. } => PhaseKind::Correcting,
        }
    }
}

#[derive(Debug)]
struct RoleState {
    last_observed_default: Option<String>,
    phase: Phase,
}

impl Default for RoleState {
    fn default() -> Self {
        Self {
            last_observed_default: None,
            phase: Phase::Idle,
        }
    }
}

/// Only a positively observed, different UID is a mismatch. Unknown state
/// never triggers a write.
fn is_mismatch(observed: Option<&str>, preferred: Option<&str>) -> bool {
    matches!((observed, preferred), (Some(observed), Some(preferred)) if observed != preferred)
}

pub(crate) struct EngineActor<B: AudioBackend> {
    backend: Arc<B>,
    config: EngineConfig,
    delegate: Arc<dyn EngineDelegate>,
    preference: Preference,
    catalog: DeviceCatalog,
    roles: PerRole<RoleState>,
}

impl<B: AudioBackend> EngineActor<B> {
    pub(crate) fn new(
        backend: Arc<B>,
        config: EngineConfig,
        delegate: Arc<dyn EngineDelegate>,
        preference: Preference,
    ) -> Self {
        Self {
            backend,
            config,
            delegate,
            preference,
            catalog: DeviceCatalog::new(),
            roles: PerRole::default(),
        }
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        self.refresh_catalog();
        for role in Role::ALL {
            self.roles[role].last_observed_default = self.backend.default_device(role);
        }
        debug!(
            input = ?self.roles.input.last_observed_default,
            output = ?self.roles.output.last_observed_default,
            "engine task started"
        );

        loop {
            let deadline = self.next_deadline();
            // Due timers are handled before any queued command
            tokio::select! {
                biased;
                _ = wait_until(deadline) => self.fire_due_timers(),
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
            }
        }

        debug!("engine task finished");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Backend(BackendEvent::DefaultChanged(role)) => self.on_default_changed(role),
            Command::Backend(BackendEvent::DeviceListChanged) => self.refresh_catalog(),
            Command::SetActive(active) => self.set_active(active),
            Command::SetPreferred { role, device } => self.set_preferred(role, device),
            Command::Snapshot { role, response } => {
                let state = &self.roles[role];
                let _ = response.send(RoleSnapshot {
                    last_observed_default: state.last_observed_default.clone(),
                    phase: state.phase.kind(),
                });
            }
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        Role::ALL
            .into_iter()
            .filter_map(|role| self.roles[role].phase.due())
            .min()
    }

    fn fire_due_timers(&mut self) {
        let now = Instant::now();
        for role in Role::ALL {
            let phase = self.roles[role].phase;
            if phase.due().is_some_and(|due| due <= now) {
                self.roles[role].phase = Phase::Idle;
                match phase {
                    Phase::Scheduled { .. } => self.debounce_elapsed(role),
                    Phase::Correcting { attempt, .. } => self.attempt(role, attempt + 1),
                    Phase::Idle => {}
                }
            }
        }
    }

    fn on_default_changed(&mut self, role: Role) {
        let observed = self.backend.default_device(role);
        debug!(%role, observed = ?observed, "default device changed");
        self.roles[role].last_observed_default = observed.clone();

        if !self.preference.active {
            return;
        }

        if !matches!(self.roles[role].phase, Phase::Idle) {
            debug!(%role, "correction already pending, coalescing notification");
            return;
        }

        if is_mismatch(observed.as_deref(), self.preference.preferred_uid(role)) {
            let due = Instant::now() + self.config.debounce();
            debug!(%role, "scheduling correction");
            self.roles[role].phase = Phase::Scheduled { due };
        }
    }

    fn debounce_elapsed(&mut self, role: Role) {
        // The default may have moved back on its own while we waited
        let current = self.backend.default_device(role);
        self.roles[role].last_observed_default = current.clone();

        if is_mismatch(current.as_deref(), self.preference.preferred_uid(role)) {
            self.attempt(role, 1);
        } else {
            debug!(%role, current = ?current, "default no longer differs, dropping correction");
        }
    }

    fn set_active(&mut self, active: bool) {
        self.preference.active = active;
        info!(active, "reconciliation {}", if active { "enabled" } else { "disabled" });

        for role in Role::ALL {
            self.cancel(role);
            if active && self.preference.preferred(role).is_some() {
                self.attempt(role, 1);
            }
        }
    }

    fn set_preferred(&mut self, role: Role, device: Option<PreferredDevice>) {
        info!(%role, uid = ?device.as_ref().map(|d| &d.uid), "preferred device changed");
        self.preference.set_preferred(role, device);
        self.cancel(role);

        if self.preference.active && self.preference.preferred(role).is_some() {
            self.attempt(role, 1);
        }
    }

    fn cancel(&mut self, role: Role) {
        if !matches!(self.roles[role].phase, Phase::Idle) {
            debug!(%role, "cancelling pending correction");
        }
        self.roles[role].phase = Phase::Idle;
    }

    /// Run write attempt number `attempt` for `role`.
    fn attempt(&mut self, role: Role, attempt: u32) {
        let Some(uid) = self.preference.preferred_uid(role).map(str::to_owned) else {
            return;
        };

        if !self.target_present(&uid) {
            info!(%role, %uid, "preferred device is not connected");
            self.finish(role, CorrectionOutcome::DeviceNotFound);
            return;
        }

        match self.backend.set_default_device(&uid, role) {
            Ok(()) => {
                info!(%role, %uid, attempt, "restored preferred device");
                self.roles[role].last_observed_default = Some(uid);
                self.finish(role, CorrectionOutcome::Applied);
            }
            Err(SetDefaultError::NotFound { .. }) => {
                info!(%role, %uid, "preferred device disappeared before the write");
                self.finish(role, CorrectionOutcome::DeviceNotFound);
            }
            Err(SetDefaultError::Os(code)) if attempt < self.config.max_attempts() => {
                warn!(%role, %uid, attempt, code, "failed to set default device, retrying");
                let due = Instant::now() + self.config.retry_delay();
                self.roles[role].phase = Phase::Correcting { attempt, due };
            }
            Err(SetDefaultError::Os(code)) => {
                error!(%role, %uid, attempt, code, "giving up on restoring preferred device");
                self.finish(role, CorrectionOutcome::GaveUpAfterRetries);
            }
        }
    }

    /// Whether a write to `uid` is worth issuing. A stale catalog gets one
    /// refresh first since the list notification may lag the default change.
    /// With an unknown catalog the backend decides.
    fn target_present(&mut self, uid: &str) -> bool {
        if self.catalog.contains(uid) {
            return true;
        }
        self.refresh_catalog();
        self.catalog.contains(uid) || !self.catalog.is_known()
    }

    fn finish(&mut self, role: Role, outcome: CorrectionOutcome) {
        self.roles[role].phase = Phase::Idle;
        self.delegate.on_correction_outcome(role, outcome);
    }

    /// Re-enumerate and publish the new list. A failed enumeration is only
    /// reported as a fault; the delegate keeps the last list it was given.
    fn refresh_catalog(&mut self) {
        if let Err(e) = self.catalog.refresh(self.backend.as_ref()) {
            self.delegate
                .on_fault(&EngineFault::EnumerationFailed(e.to_string()));
            return;
        }
        let devices = self.catalog.with_placeholders(&self.preference);
        debug!(count = self.catalog.devices().len(), "device catalog refreshed");
        self.delegate.on_device_list_changed(&devices);
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::is_mismatch;

    #[test]
    fn only_observed_difference_is_a_mismatch() {
        assert!(is_mismatch(Some("b"), Some("a")));
        assert!(!is_mismatch(Some("a"), Some("a")));
        assert!(!is_mismatch(None, Some("a")));
        assert!(!is_mismatch(Some("b"), None));
        assert!(!is_mismatch(None, None));
    }
}
