//! Device enumeration using Windows MMDevice API.
//!
//! Provides COM initialization and endpoint queries.

use crate::audio::{AudioError, DeviceHandle, RawDevice, Role};
use windows::core::{Interface, PCWSTR, PWSTR};
use windows::Win32::Devices::Properties::DEVPKEY_Device_FriendlyName;
use windows::Win32::Foundation::RPC_E_CHANGED_MODE;
use windows::Win32::Media::Audio::{
    eCapture, eConsole, eRender, EDataFlow, IMMDevice, IMMDeviceEnumerator, IMMEndpoint,
    MMDeviceEnumerator, DEVICE_STATE_ACTIVE,
};
use windows::Win32::System::Com::{
    CoCreateInstance, CoInitializeEx, CoTaskMemFree, CoUninitialize, CLSCTX_ALL,
    COINIT_MULTITHREADED, STGM,
};
use windows::Win32::UI::Shell::PropertiesSystem::{IPropertyStore, PROPERTYKEY};

/// COM initialization guard that uninitializes COM on drop.
pub struct ComGuard {
    initialized: bool,
}

impl ComGuard {
    /// Enter the multithreaded apartment for the current thread.
    ///
    /// A thread that already lives in another apartment can still make the
    /// calls we need, so that case is accepted without taking ownership.
    pub fn new() -> Result<Self, AudioError> {
        let hr = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) };
        if hr == RPC_E_CHANGED_MODE {
            return Ok(Self { initialized: false });
        }
        hr.ok()
            .map_err(|e| AudioError::ComInitFailed { code: e.code().0 })?;
        Ok(Self { initialized: true })
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        if self.initialized {
            unsafe {
                CoUninitialize();
            }
        }
    }
}

pub(crate) fn data_flow(role: Role) -> EDataFlow {
    match role {
        Role::Input => eCapture,
        Role::Output => eRender,
    }
}

/// Device enumerator using Windows MMDevice API.
pub struct DeviceEnumerator {
    enumerator: IMMDeviceEnumerator,
}

impl DeviceEnumerator {
    /// Create a new DeviceEnumerator.
    ///
    /// Note: COM must be initialized before calling this function.
    pub fn new() -> Result<Self, AudioError> {
        unsafe {
            let enumerator: IMMDeviceEnumerator =
                CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                    .map_err(|e| AudioError::EnumerationFailed { code: e.code().0 })?;

            Ok(Self { enumerator })
        }
    }

    /// Get all active endpoints, capture first, then render.
    pub fn list_endpoints(&self) -> Result<Vec<RawDevice>, AudioError> {
        let mut devices = Vec::new();

        for role in Role::ALL {
            unsafe {
                let collection = self
                    .enumerator
                    .EnumAudioEndpoints(data_flow(role), DEVICE_STATE_ACTIVE)
                    .map_err(|e| AudioError::EnumerationFailed { code: e.code().0 })?;

                let count = collection
                    .GetCount()
                    .map_err(|e| AudioError::EnumerationFailed { code: e.code().0 })?;

                for i in 0..count {
                    let Ok(device) = collection.Item(i) else {
                        continue;
                    };
                    devices.push(RawDevice {
                        handle: DeviceHandle(devices.len() as u64),
                        uid: device_id(&device),
                        name: device_name(&device),
                        supports_input: role == Role::Input,
                        supports_output: role == Role::Output,
                    });
                }
            }
        }

        Ok(devices)
    }

    /// Get the default endpoint ID for a role, `None` if there is none or the
    /// query fails.
    pub fn default_endpoint_id(&self, role: Role) -> Option<String> {
        unsafe {
            let device = self
                .enumerator
                .GetDefaultAudioEndpoint(data_flow(role), eConsole)
                .ok()?;
            device_id(&device)
        }
    }

    /// Whether `device_id` names an active endpoint usable for `role`.
    pub fn is_active_endpoint(&self, device_id: &str, role: Role) -> bool {
        unsafe {
            let device_id_wide: Vec<u16> =
                device_id.encode_utf16().chain(std::iter::once(0)).collect();

            let Ok(device) = self
                .enumerator
                .GetDevice(PCWSTR::from_raw(device_id_wide.as_ptr()))
            else {
                return false;
            };

            let active = device
                .GetState()
                .map(|state| state == DEVICE_STATE_ACTIVE)
                .unwrap_or(false);
            let flow_matches = device
                .cast::<IMMEndpoint>()
                .and_then(|endpoint| endpoint.GetDataFlow())
                .map(|flow| flow == data_flow(role))
                .unwrap_or(false);

            active && flow_matches
        }
    }

    /// Get the raw IMMDeviceEnumerator for notification registration.
    pub fn raw_enumerator(&self) -> &IMMDeviceEnumerator {
        &self.enumerator
    }
}

/// Endpoint ID string, which is stable across reconnects.
fn device_id(device: &IMMDevice) -> Option<String> {
    unsafe {
        let id: PWSTR = device.GetId().ok()?;
        let id_string = id.to_string().ok();
        CoTaskMemFree(Some(id.0 as *const _));
        id_string
    }
}

/// Get the friendly name of a device from its property store.
fn device_name(device: &IMMDevice) -> Option<String> {
    unsafe {
        let props: IPropertyStore = device.OpenPropertyStore(STGM(0)).ok()?;

        // Convert DEVPROPKEY to PROPERTYKEY
        let key = PROPERTYKEY {
            fmtid: DEVPKEY_Device_FriendlyName.fmtid,
            pid: DEVPKEY_Device_FriendlyName.pid,
        };

        let prop = props.GetValue(&key).ok()?;

        // Use the Display trait to get the string value
        let s = prop.to_string();
        if s.is_empty() {
            None
        } else {
            Some(s)
        }
    }
}
