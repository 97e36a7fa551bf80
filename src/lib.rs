//! Audio Keeper - Library
//!
//! Keeps a user's preferred input and output devices selected as the system
//! default, putting them back when something else takes over.
//!
//! ## Features
//!
//! - Restores the preferred device shortly after an unwanted default change
//! - Retries failed switches a bounded number of times
//! - Remembers preferred devices while they are disconnected
//! - Persists preferences and seeds them from the current defaults on first run
//! - Windows Core Audio backend; other platforms plug in via [`AudioBackend`]

pub mod app;
pub mod audio;
pub mod config;
pub mod engine;
pub mod platform;

pub use app::AppState;
pub use audio::{AudioBackend, AudioError, Device, DeviceCatalog, Role};
pub use config::{AppConfig, EngineConfig};
pub use engine::{CorrectionOutcome, EngineEvent, Monitoring, ReconcileEngine};
pub use platform::{MemoryPreferenceStore, Preference, PreferenceStore, PreferredDevice};
