//! Default endpoint writes through `IPolicyConfig`.

use windows::core::*;
use windows::Win32::System::Com::*;

/// Endpoint role as understood by `IPolicyConfig`.
#[repr(u32)]
#[derive(Debug, Clone, Copy)]
pub enum EndpointRole {
    Console = 0,
    Communications = 2,
}

/// IPolicyConfig COM interface (undocumented but stable)
#[windows::core::interface("F8679F50-850A-41CF-9C72-430F290290C8")]
pub unsafe trait IPolicyConfig: IUnknown {
    // Reserved methods to maintain vtable order
    fn reserved1(&self) -> HRESULT;
    fn reserved2(&self) -> HRESULT;
    fn reserved3(&self) -> HRESULT;
    fn reserved4(&self) -> HRESULT;
    fn reserved5(&self) -> HRESULT;
    fn reserved6(&self) -> HRESULT;
    fn reserved7(&self) -> HRESULT;
    fn reserved8(&self) -> HRESULT;
    fn reserved9(&self) -> HRESULT;
    fn reserved10(&self) -> HRESULT;

    fn SetDefaultEndpoint(&self, device_id: PCWSTR, role: u32) -> HRESULT;
}

const CLSID_POLICY_CONFIG_CLIENT: GUID = GUID::from_u128(0x870af99c_171d_4f9e_af0d_e63df40c2bc9);

/// Make `device_id` the default endpoint for the console and communications
/// roles, which is what the Sound control panel does.
pub fn set_default_endpoint(device_id: &str) -> Result<()> {
    unsafe {
        let policy_config: IPolicyConfig =
            CoCreateInstance(&CLSID_POLICY_CONFIG_CLIENT, None, CLSCTX_ALL)?;

        let device_id_wide: Vec<u16> = device_id.encode_utf16().chain(std::iter::once(0)).collect();
        for role in [EndpointRole::Console, EndpointRole::Communications] {
            policy_config
                .SetDefaultEndpoint(PCWSTR(device_id_wide.as_ptr()), role as u32)
                .ok()?;
        }

        Ok(())
    }
}
