//! Application state and lifecycle management.
//!
//! `AppState` is the controller between a UI and the reconciliation engine:
//! it owns the user's preferences, persists every change, hands changes to
//! the engine, and folds engine events into user-visible status.

use crate::audio::{AudioBackend, Device, DeviceCatalog, PerRole, Role};
use crate::config::EngineConfig;
use crate::engine::{
    ChannelDelegate, CorrectionOutcome, EngineEvent, Monitoring, ReconcileEngine,
};
use crate::platform::{Preference, PreferenceStore, PreferredDevice};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Main application state.
pub struct AppState<B: AudioBackend, S: PreferenceStore> {
    /// Known devices, plus placeholders for absent preferred devices
    pub devices: Vec<Device>,

    /// Current user preferences
    pub preferences: Preference,

    /// Result of the most recent correction per role
    pub last_outcome: PerRole<Option<CorrectionOutcome>>,

    /// Error state for UI display
    pub error_message: Option<String>,

    /// Set once the engine has been started
    pub monitoring: Option<Monitoring>,

    backend: Arc<B>,
    store: S,
    engine: ReconcileEngine<B>,
}

impl<B: AudioBackend, S: PreferenceStore> AppState<B, S> {
    /// Create the controller. Engine events arrive on the returned receiver
    /// and should be passed to [`AppState::handle_engine_event`].
    pub fn new(
        backend: Arc<B>,
        store: S,
        config: EngineConfig,
    ) -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (delegate, events) = ChannelDelegate::channel();
        let engine = ReconcileEngine::new(Arc::clone(&backend), config, Arc::new(delegate));

        let state = Self {
            devices: Vec::new(),
            preferences: Preference::default(),
            last_outcome: PerRole::default(),
            error_message: None,
            monitoring: None,
            backend,
            store,
            engine,
        };
        (state, events)
    }

    /// Load preferences and start the engine.
    ///
    /// With nothing stored, `fallback` is used if given, otherwise the current
    /// system defaults become the preferred devices.
    pub fn initialize(&mut self, fallback: Option<Preference>) -> Monitoring {
        let mut catalog = DeviceCatalog::new();
        let listed = match catalog.refresh(self.backend.as_ref()) {
            Ok(_) => true,
            Err(e) => {
                self.error_message = Some(format!("Could not list audio devices: {e}"));
                false
            }
        };

        self.preferences = match self.store.load() {
            Ok(Some(preferences)) => preferences,
            Ok(None) => {
                let preferences = fallback.unwrap_or_else(|| self.seed_preferences(&catalog));
                info!(
                    input = ?preferences.preferred_uid(Role::Input),
                    output = ?preferences.preferred_uid(Role::Output),
                    "no stored preferences, starting from defaults"
                );
                preferences
            }
            Err(e) => {
                warn!(error = %e, "stored preferences unreadable, starting over");
                self.error_message = Some(e.to_string());
                fallback.unwrap_or_else(|| self.seed_preferences(&catalog))
            }
        };
        self.persist();

        if listed {
            self.devices = catalog.with_placeholders(&self.preferences);
        }
        let monitoring = self.engine.start(&self.preferences);
        self.monitoring = Some(monitoring);
        monitoring
    }

    /// First-run preferences: keep whatever the system uses right now.
    fn seed_preferences(&self, catalog: &DeviceCatalog) -> Preference {
        let seed = |role: Role| {
            self.backend.default_device(role).map(|uid| {
                let name = catalog.resolve(&uid).map(|d| d.name.clone());
                PreferredDevice { uid, name }
            })
        };

        Preference {
            active: true,
            input: seed(Role::Input),
            output: seed(Role::Output),
        }
    }

    /// Enable or disable enforcement of the preferred devices.
    pub fn set_active(&mut self, active: bool) {
        self.preferences.active = active;
        self.persist();
        self.engine.set_active(active);
    }

    /// Choose the preferred device for `role`; `None` follows the system default.
    pub fn set_preferred(&mut self, role: Role, uid: Option<String>) {
        let device = uid.map(|uid| {
            let name = self
                .devices
                .iter()
                .find(|d| d.is_available && d.uid == uid)
                .map(|d| d.name.clone())
                .or_else(|| {
                    // Keep the cached name while the same device is away
                    self.preferences
                        .preferred(role)
                        .filter(|p| p.uid == uid)
                        .and_then(|p| p.name.clone())
                });
            PreferredDevice { uid, name }
        });

        self.preferences.set_preferred(role, device.clone());
        self.last_outcome[role] = None;
        self.persist();
        self.engine.set_preferred(role, device);
    }

    /// Handle an event from the engine.
    pub fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::DeviceListChanged(devices) => {
                self.devices = devices;
                self.refresh_cached_names();
            }
            EngineEvent::CorrectionOutcome { role, outcome } => {
                self.last_outcome[role] = Some(outcome);
                match outcome {
                    CorrectionOutcome::Applied => self.error_message = None,
                    CorrectionOutcome::DeviceNotFound => {}
                    CorrectionOutcome::GaveUpAfterRetries => {
                        self.error_message = Some(format!("Could not switch the {role} device"));
                    }
                }
            }
            EngineEvent::Fault(fault) => {
                self.error_message = Some(fault.to_string());
            }
        }
    }

    /// Update cached display names for preferred devices that are present.
    fn refresh_cached_names(&mut self) {
        let mut changed = false;

        for role in Role::ALL {
            let Some(preferred) = self.preferences.preferred(role) else {
                continue;
            };
            let live_name = self
                .devices
                .iter()
                .find(|d| d.is_available && d.uid == preferred.uid)
                .map(|d| d.name.clone());

            if live_name.is_some() && live_name != preferred.name {
                let uid = preferred.uid.clone();
                self.preferences
                    .set_preferred(role, Some(PreferredDevice { uid, name: live_name }));
                changed = true;
            }
        }

        if changed {
            self.persist();
        }
    }

    fn persist(&mut self) {
        if let Err(e) = self.store.save(&self.preferences) {
            warn!(error = %e, "failed to save preferences");
            self.error_message = Some(format!("Could not save preferences: {e}"));
        }
    }

    /// Devices that can be picked for `role`.
    pub fn devices_for(&self, role: Role) -> impl Iterator<Item = &Device> {
        self.devices.iter().filter(move |d| d.supports(role))
    }

    /// Short status text, one line per role, for a tooltip or menu header.
    pub fn status_line(&self) -> String {
        let mut lines = Vec::new();
        if !self.preferences.active {
            lines.push("Paused".to_string());
        }

        for role in Role::ALL {
            let label = match role {
                Role::Input => "Input",
                Role::Output => "Output",
            };

            let text = match self.preferences.preferred(role) {
                None => "System default".to_string(),
                Some(preferred) => {
                    let device = self.devices.iter().find(|d| d.uid == preferred.uid);
                    let name = device
                        .map(|d| d.name.clone())
                        .or_else(|| preferred.name.clone())
                        .unwrap_or_else(|| preferred.uid.clone());

                    // Not listed at all means the device set is unknown
                    if device.is_some_and(|d| !d.is_available) {
                        format!("{name} (disconnected)")
                    } else if self.last_outcome[role] == Some(CorrectionOutcome::GaveUpAfterRetries) {
                        format!("{name} (switch failed)")
                    } else {
                        name
                    }
                }
            };
            lines.push(format!("{label}: {text}"));
        }

        lines.join("\n")
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn engine(&self) -> &ReconcileEngine<B> {
        &self.engine
    }

    /// Stop the engine; no engine events are produced afterwards.
    pub async fn shutdown(&mut self) {
        self.engine.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::fake::{raw_input, raw_output, FakeBackend};
    use crate::audio::BackendEvent;
    use crate::engine::EngineFault;
    use crate::platform::MemoryPreferenceStore;
    use std::time::Duration;
    use tokio::time::sleep;

    fn make_backend() -> Arc<FakeBackend> {
        let backend = FakeBackend::with_devices(vec![
            raw_input("UID-A", "Studio Mic"),
            raw_input("UID-B", "Webcam Mic"),
            raw_output("UID-X", "Speakers"),
        ]);
        backend.set_system_default(Role::Input, Some("UID-B"));
        backend.set_system_default(Role::Output, Some("UID-X"));
        Arc::new(backend)
    }

    fn make_state(
        backend: &Arc<FakeBackend>,
        store: MemoryPreferenceStore,
    ) -> (
        AppState<FakeBackend, MemoryPreferenceStore>,
        mpsc::UnboundedReceiver<EngineEvent>,
    ) {
        AppState::new(Arc::clone(backend), store, EngineConfig::default())
    }

    async fn drain(
        state: &mut AppState<FakeBackend, MemoryPreferenceStore>,
        events: &mut mpsc::UnboundedReceiver<EngineEvent>,
    ) {
        sleep(Duration::from_millis(1)).await;
        while let Ok(event) = events.try_recv() {
            state.handle_engine_event(event);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_run_seeds_from_system_defaults() {
        let backend = make_backend();
        let (mut state, _events) = make_state(&backend, MemoryPreferenceStore::new());

        assert_eq!(state.initialize(None), Monitoring::Live);

        let expected = Preference {
            active: true,
            input: Some(PreferredDevice::new("UID-B", Some("Webcam Mic"))),
            output: Some(PreferredDevice::new("UID-X", Some("Speakers"))),
        };
        assert_eq!(state.preferences, expected);
        assert_eq!(state.store().load().unwrap(), Some(expected));
        assert_eq!(state.status_line(), "Input: Webcam Mic\nOutput: Speakers");

        state.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stored_preferences_win_over_fallback() {
        let backend = make_backend();
        let stored = Preference {
            active: false,
            input: Some(PreferredDevice::new("UID-A", Some("Studio Mic"))),
            output: None,
        };
        let store = MemoryPreferenceStore::seeded(&stored).unwrap();
        let (mut state, _events) = make_state(&backend, store);

        state.initialize(Some(Preference::default()));

        assert_eq!(state.preferences, stored);
        assert_eq!(state.status_line(), "Paused\nInput: Studio Mic\nOutput: System default");

        state.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_fallback_used_on_first_run() {
        let backend = make_backend();
        let (mut state, _events) = make_state(&backend, MemoryPreferenceStore::new());
        let fallback = Preference {
            active: true,
            input: Some(PreferredDevice::new("UID-A", None)),
            output: None,
        };

        state.initialize(Some(fallback.clone()));

        assert_eq!(state.preferences, fallback);
        assert_eq!(state.store().load().unwrap(), Some(fallback));

        state.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_corrupt_store_is_reported_and_replaced() {
        let backend = make_backend();
        let (mut state, _events) =
            make_state(&backend, MemoryPreferenceStore::from_raw("garbage"));

        state.initialize(None);

        assert!(state.error_message.is_some());
        assert_eq!(state.preferences.preferred_uid(Role::Input), Some("UID-B"));
        assert!(state.store().load().is_ok());

        state.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_preferred_persists_name_and_switches() {
        let backend = make_backend();
        let (mut state, mut events) = make_state(&backend, MemoryPreferenceStore::new());
        state.initialize(None);
        drain(&mut state, &mut events).await;

        state.set_preferred(Role::Input, Some("UID-A".to_string()));
        drain(&mut state, &mut events).await;

        let stored = state.store().load().unwrap().unwrap();
        assert_eq!(
            stored.input,
            Some(PreferredDevice::new("UID-A", Some("Studio Mic")))
        );
        assert_eq!(backend.system_default(Role::Input).as_deref(), Some("UID-A"));
        assert_eq!(state.last_outcome[Role::Input], Some(CorrectionOutcome::Applied));

        state.set_preferred(Role::Input, None);
        assert_eq!(state.store().load().unwrap().unwrap().input, None);
        assert_eq!(state.engine().preference().preferred_uid(Role::Input), None);

        state.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_pausing_persists_and_resuming_restores() {
        let backend = make_backend();
        let (mut state, mut events) = make_state(&backend, MemoryPreferenceStore::new());
        state.initialize(None);
        state.set_preferred(Role::Output, Some("UID-X".to_string()));
        drain(&mut state, &mut events).await;

        state.set_active(false);
        assert!(!state.store().load().unwrap().unwrap().active);
        assert!(!state.engine().preference().active);
        assert!(state.status_line().starts_with("Paused\n"));

        backend.set_system_default(Role::Input, Some("UID-A"));
        state.set_active(true);
        drain(&mut state, &mut events).await;

        assert!(state.store().load().unwrap().unwrap().active);
        assert_eq!(backend.system_default(Role::Input).as_deref(), Some("UID-B"));

        state.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_absent_preferred_device_shows_cached_name() {
        let backend = make_backend();
        let stored = Preference {
            active: true,
            input: Some(PreferredDevice::new("UID-USB", Some("USB Mic"))),
            output: None,
        };
        let (mut state, mut events) =
            make_state(&backend, MemoryPreferenceStore::seeded(&stored).unwrap());
        state.initialize(None);
        drain(&mut state, &mut events).await;

        assert!(state
            .devices_for(Role::Input)
            .any(|d| d.uid == "UID-USB" && !d.is_available));
        assert_eq!(
            state.status_line(),
            "Input: USB Mic (disconnected)\nOutput: System default"
        );

        // Re-selecting while it is away keeps the cached name
        state.set_preferred(Role::Input, Some("UID-USB".to_string()));
        assert_eq!(
            state.preferences.input,
            Some(PreferredDevice::new("UID-USB", Some("USB Mic")))
        );

        state.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_enumeration_keeps_device_list() {
        let backend = make_backend();
        let stored = Preference {
            active: true,
            input: Some(PreferredDevice::new("UID-A", Some("Studio Mic"))),
            output: None,
        };
        let (mut state, mut events) =
            make_state(&backend, MemoryPreferenceStore::seeded(&stored).unwrap());
        state.initialize(None);
        drain(&mut state, &mut events).await;
        let before = state.devices.clone();
        assert_eq!(before.len(), 3);

        backend.fail_listing(true);
        backend.emit(BackendEvent::DeviceListChanged);
        drain(&mut state, &mut events).await;

        assert_eq!(state.devices, before);
        assert_eq!(state.status_line(), "Input: Studio Mic\nOutput: System default");
        assert!(state
            .error_message
            .as_deref()
            .is_some_and(|e| e.starts_with("device enumeration failed")));

        state.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_list_refreshes_cached_name() {
        let backend = make_backend();
        let stored = Preference {
            active: false,
            input: Some(PreferredDevice::new("UID-A", Some("Old Name"))),
            output: None,
        };
        let (mut state, mut events) =
            make_state(&backend, MemoryPreferenceStore::seeded(&stored).unwrap());
        state.initialize(None);
        drain(&mut state, &mut events).await;

        assert_eq!(
            state.store().load().unwrap().unwrap().input,
            Some(PreferredDevice::new("UID-A", Some("Studio Mic")))
        );

        state.shutdown().await;
    }

    #[tokio::test]
    async fn test_outcomes_and_faults_update_status() {
        let backend = make_backend();
        let (mut state, _events) = make_state(&backend, MemoryPreferenceStore::new());
        state.initialize(None);

        state.handle_engine_event(EngineEvent::CorrectionOutcome {
            role: Role::Output,
            outcome: CorrectionOutcome::GaveUpAfterRetries,
        });
        assert_eq!(
            state.error_message.as_deref(),
            Some("Could not switch the output device")
        );
        assert!(state.status_line().ends_with("Output: Speakers (switch failed)"));

        state.handle_engine_event(EngineEvent::CorrectionOutcome {
            role: Role::Output,
            outcome: CorrectionOutcome::Applied,
        });
        assert!(state.error_message.is_none());
        assert!(state.status_line().ends_with("Output: Speakers"));

        state.handle_engine_event(EngineEvent::Fault(EngineFault::SubscriptionFailed(
            "denied".to_string(),
        )));
        assert_eq!(
            state.error_message.as_deref(),
            Some("device notifications unavailable: denied")
        );

        state.shutdown().await;
    }
}
