//! Device-preference reconciliation engine.
//!
//! Watches backend notifications and drives the OS default device back to the
//! preferred one, with a short debounce and a bounded number of retries.
//!
//! The engine needs a tokio runtime: [`ReconcileEngine::start`] spawns the
//! task that owns all reconciliation state.

mod actor;
mod delegate;


pub use actor::{PhaseKind, RoleSnapshot};
pub use delegate::{ChannelDelegate, CorrectionOutcome, EngineDelegate, EngineEvent, EngineFault};

use crate::audio::{AudioBackend, BackendEvent, Role, SubscriptionHandle};
use crate::config::EngineConfig;
use crate::platform::{Preference, PreferredDevice};
use actor::{Command, EngineActor};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Whether live notifications are flowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Monitoring {
    /// Subscribed to backend notifications
    Live,

    /// Subscription was rejected; only explicit corrections happen
    Degraded,
}

struct Running {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
    subscription: Option<SubscriptionHandle>,
}

/// Keeps preferred devices selected as the OS default.
pub struct ReconcileEngine<B: AudioBackend> {
    backend: Arc<B>,
    config: EngineConfig,
    delegate: Arc<dyn EngineDelegate>,
    preference: Preference,
    running: Option<Running>,
}

impl<B: AudioBackend> ReconcileEngine<B> {
    pub fn new(backend: Arc<B>, config: EngineConfig, delegate: Arc<dyn EngineDelegate>) -> Self {
        Self {
            backend,
            config,
            delegate,
            preference: Preference::default(),
            running: None,
        }
    }

    /// Subscribe to the backend and start reconciling against `preference`.
    ///
    /// Calling this while running does nothing and reports the current state.
    pub fn start(&mut self, preference: &Preference) -> Monitoring {
        if let Some(running) = &self.running {
            warn!("reconcile engine already running");
            return if running.subscription.is_some() {
                Monitoring::Live
            } else {
                Monitoring::Degraded
            };
        }

        self.preference = preference.clone();
        let (commands, receiver) = mpsc::unbounded_channel();

        let sender = commands.clone();
        let subscription = match self.backend.subscribe(Arc::new(move |event: BackendEvent| {
            let _ = sender.send(Command::Backend(event));
        })) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "device notifications unavailable, running degraded");
                self.delegate
                    .on_fault(&EngineFault::SubscriptionFailed(e.to_string()));
                None
            }
        };

        let actor = EngineActor::new(
            Arc::clone(&self.backend),
            self.config.clone(),
            Arc::clone(&self.delegate),
            self.preference.clone(),
        );
        let task = tokio::spawn(actor.run(receiver));

        let monitoring = if subscription.is_some() {
            Monitoring::Live
        } else {
            Monitoring::Degraded
        };
        info!(?monitoring, active = self.preference.active, "reconcile engine started");

        self.running = Some(Running {
            commands,
            task,
            subscription,
        });
        monitoring
    }

    /// Unsubscribe and stop the engine task. Safe to call repeatedly.
    ///
    /// When this returns no backend listener remains and no delegate
    /// callback will run.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        if let Some(handle) = running.subscription {
            self.backend.unsubscribe(handle);
        }
        drop(running.commands);
        running.task.abort();
        let _ = running.task.await;

        info!("reconcile engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Preferences as last handed to the engine.
    pub fn preference(&self) -> &Preference {
        &self.preference
    }

    /// Enable or disable enforcement. Enabling immediately corrects every role
    /// with a preference; disabling cancels anything pending.
    pub fn set_active(&mut self, active: bool) {
        self.preference.active = active;
        self.send(Command::SetActive(active));
    }

    /// Change the preferred device for `role`. `None` reverts to following the
    /// system default. When active, a set device is applied immediately.
    pub fn set_preferred(&mut self, role: Role, device: Option<PreferredDevice>) {
        self.preference.set_preferred(role, device.clone());
        self.send(Command::SetPreferred { role, device });
    }

    /// Current reconciliation state of `role`, `None` when not running.
    pub async fn role_state(&self, role: Role) -> Option<RoleSnapshot> {
        let running = self.running.as_ref()?;
        let (response, receiver) = oneshot::channel();
        running
            .commands
            .send(Command::Snapshot { role, response })
            .ok()?;
        receiver.await.ok()
    }

    fn send(&self, command: Command) {
        match &self.running {
            Some(running) => {
                let _ = running.commands.send(command);
            }
            None => debug!("engine not running, preference stored for next start"),
        }
    }
}

impl<B: AudioBackend> Drop for ReconcileEngine<B> {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            if let Some(handle) = running.subscription {
                self.backend.unsubscribe(handle);
            }
            running.task.abort();
        }
    }
}
