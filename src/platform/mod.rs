//! Platform collaborators outside the audio subsystem.
//!
//! Currently the preference model and its store.

pub mod preferences;

pub use preferences::{
    MemoryPreferenceStore, Preference, PreferenceStore, PreferencesError, PreferredDevice,
};
