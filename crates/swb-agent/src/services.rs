//! Device services for a host with no robot attached.
//!
//! Wi-Fi and OTA requests are logged and answered with a fixed offline
//! state. Log download serves the agent's own log file when one is
//! configured.

use std::io;
use std::path::PathBuf;

use tracing::info;

use swb_core::services::{DeviceInfo, DeviceServices, WifiStatus};
use swb_proto::rts::{
    ConnectWifiResult, OtaProgress, OtaStatus, WifiConnState, WifiConnectRequest, WifiIpResponse,
    WifiScanResponse,
};

pub struct DetachedServices {
    log_file: Option<PathBuf>,
    access_point: bool,
}

impl DetachedServices {
    pub fn new(log_file: Option<PathBuf>) -> Self {
        Self { log_file, access_point: false }
    }
}

impl DeviceServices for DetachedServices {
    fn wifi_status(&mut self) -> WifiStatus {
        WifiStatus {
            ssid: Vec::new(),
            state: WifiConnState::Disconnected,
            access_point: self.access_point,
        }
    }

    fn device_info(&mut self) -> DeviceInfo {
        DeviceInfo {
            build: format!("swb-agent {}", env!("CARGO_PKG_VERSION")),
            ..Default::default()
        }
    }

    fn wifi_scan(&mut self) -> WifiScanResponse {
        info!("Wi-Fi scan requested; no radio attached");
        WifiScanResponse::default()
    }

    fn wifi_connect(&mut self, request: &WifiConnectRequest) -> ConnectWifiResult {
        info!(ssid = %String::from_utf8_lossy(&request.ssid), "Wi-Fi connect requested; no radio attached");
        ConnectWifiResult::Failure
    }

    fn wifi_forget(&mut self, ssid: &[u8], delete_all: bool) -> bool {
        info!(ssid = %String::from_utf8_lossy(ssid), delete_all, "Wi-Fi forget requested");
        true
    }

    fn set_access_point(&mut self, enable: bool, ssid: &str, _password: &str) -> bool {
        info!(enable, ssid, "access point requested");
        self.access_point = enable;
        true
    }

    fn wifi_ip(&mut self) -> WifiIpResponse {
        WifiIpResponse::default()
    }

    fn start_ota(&mut self, url: &str) -> bool {
        info!(url, "OTA requested; updates are not applied by the agent");
        false
    }

    fn cancel_ota(&mut self) {}

    fn ota_progress(&mut self) -> OtaProgress {
        OtaProgress { status: OtaStatus::Error, progress: 0, total: 0 }
    }

    fn collect_logs(&mut self) -> io::Result<Vec<u8>> {
        match &self.log_file {
            Some(path) => std::fs::read(path),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "no log file configured")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logs_read_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.log");
        std::fs::write(&path, b"line one\nline two\n").unwrap();
        let mut services = DetachedServices::new(Some(path));
        assert_eq!(services.collect_logs().unwrap(), b"line one\nline two\n");
    }

    #[test]
    fn test_no_log_file_is_error() {
        let mut services = DetachedServices::new(None);
        assert!(services.collect_logs().is_err());
    }

    #[test]
    fn test_access_point_reflected_in_status() {
        let mut services = DetachedServices::new(None);
        assert!(services.set_access_point(true, "Vector-AB12", "12345678"));
        assert!(services.wifi_status().access_point);
        assert!(!services.start_ota("http://example/ota"));
    }
}
