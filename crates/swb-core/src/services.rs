//! Device collaborators reached by the application handlers.
//!
//! Implementations wrap the real Wi-Fi manager, update engine and log
//! tooling. Every call is synchronous and made from the reactor thread.

use swb_proto::rts::{
    ConnectWifiResult, OtaProgress, WifiConnState, WifiConnectRequest, WifiIpResponse,
    WifiScanResponse,
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WifiStatus {
    pub ssid: Vec<u8>,
    pub state: WifiConnState,
    pub access_point: bool,
}

impl WifiStatus {
    pub fn is_online(&self) -> bool {
        self.state == WifiConnState::Online
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub ble_state: u32,
    pub battery_state: u32,
    pub build: String,
    pub has_owner: bool,
}

pub trait DeviceServices {
    fn wifi_status(&mut self) -> WifiStatus;

    fn device_info(&mut self) -> DeviceInfo;

    fn wifi_scan(&mut self) -> WifiScanResponse;

    /// Start connecting. May return a verdict immediately or `None` to be
    /// polled through [`DeviceServices::wifi_status`].
    fn wifi_connect(&mut self, request: &WifiConnectRequest) -> ConnectWifiResult;

    fn wifi_forget(&mut self, ssid: &[u8], delete_all: bool) -> bool;

    fn set_access_point(&mut self, enable: bool, ssid: &str, password: &str) -> bool;

    fn wifi_ip(&mut self) -> WifiIpResponse;

    /// Returns false if the update engine refused the request.
    fn start_ota(&mut self, url: &str) -> bool;

    fn cancel_ota(&mut self);

    fn ota_progress(&mut self) -> OtaProgress;

    /// Collect a log archive.
    fn collect_logs(&mut self) -> std::io::Result<Vec<u8>>;
}
