//! Device change notifications using IMMNotificationClient.
//!
//! Translates endpoint callbacks into [`BackendEvent`]s and hands them to the
//! subscriber's callback without doing any work on the COM thread.

use crate::audio::{BackendEvent, EventCallback, Role};
use windows::core::{implement, PCWSTR};
use windows::Win32::Media::Audio::{
    eCapture, eConsole, eRender, EDataFlow, ERole, IMMDeviceEnumerator, IMMNotificationClient,
    IMMNotificationClient_Impl, DEVICE_STATE,
};
use windows::Win32::UI::Shell::PropertiesSystem::PROPERTYKEY;
// Re-export windows_core so the implement macro can find it
#[allow(unused_imports)]
use windows_core;

/// Notification client that forwards events to a callback.
#[implement(IMMNotificationClient)]
pub struct EndpointNotificationClient {
    callback: EventCallback,
}

impl EndpointNotificationClient {
    pub fn new(callback: EventCallback) -> Self {
        Self { callback }
    }

    /// Register this notification client with an enumerator.
    /// Takes ownership of self because the COM interface needs to own the data.
    pub fn register(
        self,
        enumerator: &IMMDeviceEnumerator,
    ) -> Result<IMMNotificationClient, windows::core::Error> {
        unsafe {
            let client: IMMNotificationClient = self.into();
            enumerator.RegisterEndpointNotificationCallback(&client)?;
            Ok(client)
        }
    }

    fn convert_flow(flow: EDataFlow) -> Option<Role> {
        if flow == eCapture {
            Some(Role::Input)
        } else if flow == eRender {
            Some(Role::Output)
        } else {
            None
        }
    }
}

impl IMMNotificationClient_Impl for EndpointNotificationClient_Impl {
    fn OnDeviceStateChanged(
        &self,
        _pwstrdeviceid: &PCWSTR,
        _dwnewstate: DEVICE_STATE,
    ) -> windows::core::Result<()> {
        (self.callback)(BackendEvent::DeviceListChanged);
        Ok(())
    }

    fn OnDeviceAdded(&self, _pwstrdeviceid: &PCWSTR) -> windows::core::Result<()> {
        (self.callback)(BackendEvent::DeviceListChanged);
        Ok(())
    }

    fn OnDeviceRemoved(&self, _pwstrdeviceid: &PCWSTR) -> windows::core::Result<()> {
        (self.callback)(BackendEvent::DeviceListChanged);
        Ok(())
    }

    fn OnDefaultDeviceChanged(
        &self,
        flow: EDataFlow,
        role: ERole,
        _pwstrdefaultdeviceid: &PCWSTR,
    ) -> windows::core::Result<()> {
        // One notification fires per ERole; the console role is the one we track
        if role != eConsole {
            return Ok(());
        }

        if let Some(role) = EndpointNotificationClient::convert_flow(flow) {
            (self.callback)(BackendEvent::DefaultChanged(role));
        }
        Ok(())
    }

    fn OnPropertyValueChanged(
        &self,
        _pwstrdeviceid: &PCWSTR,
        _key: &PROPERTYKEY,
    ) -> windows::core::Result<()> {
        Ok(())
    }
}
