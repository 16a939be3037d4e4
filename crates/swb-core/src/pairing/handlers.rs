//! Handlers for requests from an authenticated client.
//!
//! Reached only in `ConfirmedSharedSecret` over the encrypted channel; the
//! dispatcher in the parent module enforces that before calling in here.

use tracing::{debug, info, warn};

use swb_proto::rts::{
    ConnectWifiResult, FileChunk, OtaStatus, StatusResponse, WifiAccessPointResponse,
    WifiConnectRequest, WifiConnectResponse, WifiForgetRequest, WifiForgetResponse,
};
use swb_proto::RtsMessage;

use super::{PairingSignal, PairingStateMachine, TimerCommand, TimerKind, WifiConnectPoll};
use crate::errors::PairingError;
use crate::services::{DeviceServices, WifiStatus};
use crate::transport::RtsTransport;

impl<T: RtsTransport, S: DeviceServices> PairingStateMachine<T, S> {
    pub(super) fn handle_application(&mut self, msg: RtsMessage) -> Result<(), PairingError> {
        let tag = msg.tag();
        match msg {
            RtsMessage::StatusRequest => self.send_status(),
            RtsMessage::WifiScanRequest => {
                let scan = self.services.wifi_scan();
                debug!(networks = scan.results.len(), "Wi-Fi scan complete");
                self.send(&RtsMessage::WifiScanResponse(scan))
            }
            RtsMessage::WifiConnectRequest(request) => self.handle_wifi_connect(request),
            RtsMessage::WifiForgetRequest(request) => self.handle_wifi_forget(request),
            RtsMessage::WifiAccessPointRequest { enable } => self.handle_access_point(enable),
            RtsMessage::WifiIpRequest => {
                let ip = self.services.wifi_ip();
                self.send(&RtsMessage::WifiIpResponse(ip))
            }
            RtsMessage::OtaUpdateRequest { url } => self.handle_ota_update(url),
            RtsMessage::OtaCancelRequest => self.handle_ota_cancel(),
            RtsMessage::LogRequest => self.handle_log_request(),
            RtsMessage::ConnRequest { .. }
            | RtsMessage::ConnResponse(_)
            | RtsMessage::Nonce(_)
            | RtsMessage::Ack { .. }
            | RtsMessage::Challenge { .. }
            | RtsMessage::ChallengeResponse { .. }
            | RtsMessage::ChallengeSuccess
            | RtsMessage::CancelPairing
            | RtsMessage::StatusResponse(_)
            | RtsMessage::WifiScanResponse(_)
            | RtsMessage::WifiConnectResponse(_)
            | RtsMessage::WifiForgetResponse(_)
            | RtsMessage::WifiAccessPointResponse(_)
            | RtsMessage::WifiIpResponse(_)
            | RtsMessage::OtaUpdateResponse(_)
            | RtsMessage::LogResponse { .. }
            | RtsMessage::FileDownload(_) => Err(PairingError::UnexpectedMessage {
                tag,
                phase: self.session.phase,
                comms: self.session.comms,
            }),
        }
    }

    fn send_status(&mut self) -> Result<(), PairingError> {
        let wifi = self.services.wifi_status();
        let info = self.services.device_info();
        self.send(&RtsMessage::StatusResponse(StatusResponse {
            ssid: wifi.ssid,
            conn_state: wifi.state,
            access_point: wifi.access_point,
            ble_state: info.ble_state,
            battery_state: info.battery_state,
            build: info.build,
            ota_in_progress: self.ota_in_progress,
            has_owner: info.has_owner,
        }))
    }

    // ------------------------------------------------------------------------
    // Wi-Fi
    // ------------------------------------------------------------------------

    fn handle_wifi_connect(&mut self, request: WifiConnectRequest) -> Result<(), PairingError> {
        let requested = match request.timeout_secs {
            0 => self.config.wifi_connect_default_timeout_secs,
            secs => secs,
        };
        let timeout_secs = requested.max(self.config.wifi_connect_min_timeout_secs);
        info!(
            ssid = %String::from_utf8_lossy(&request.ssid),
            timeout_secs,
            "Wi-Fi connect requested"
        );
        self.signals.push_back(PairingSignal::WifiCredentialsReceived {
            ssid: request.ssid.clone(),
            password: request.password.clone(),
        });

        let result = self.services.wifi_connect(&request);
        let status = self.services.wifi_status();
        if status.is_online() || result == ConnectWifiResult::InvalidKey {
            self.session.wifi_connect = None;
            return self.send_wifi_connect_response(status, result);
        }

        let interval_ms = self.config.wifi_poll_interval_ms.max(1);
        let max_ticks = (u64::from(timeout_secs) * 1000).div_ceil(interval_ms);
        self.session.wifi_connect = Some(WifiConnectPoll { ticks: 0, max_ticks });
        self.schedule_wifi_poll();
        Ok(())
    }

    /// One tick of an in-flight connect. Answers once the device is online
    /// or the request's timeout has elapsed.
    pub(super) fn poll_wifi_connect(&mut self) {
        let Some(poll) = self.session.wifi_connect.as_mut() else {
            return;
        };
        poll.ticks += 1;
        let ticks = poll.ticks;
        let expired = ticks >= poll.max_ticks;

        let status = self.services.wifi_status();
        if !status.is_online() && !expired {
            self.schedule_wifi_poll();
            return;
        }
        self.session.wifi_connect = None;
        debug!(ticks, online = status.is_online(), "Wi-Fi connect poll finished");
        if let Err(e) = self.send_wifi_connect_response(status, ConnectWifiResult::None) {
            self.on_fault(e);
        }
    }

    fn schedule_wifi_poll(&mut self) {
        self.timers.push_back(TimerCommand::Start {
            kind: TimerKind::WifiConnectPoll,
            after: self.config.wifi_poll_interval(),
            generation: self.generation,
        });
    }

    fn send_wifi_connect_response(
        &mut self,
        status: WifiStatus,
        result: ConnectWifiResult,
    ) -> Result<(), PairingError> {
        info!(state = ?status.state, ?result, "Wi-Fi connect finished");
        self.send(&RtsMessage::WifiConnectResponse(WifiConnectResponse {
            ssid: status.ssid,
            conn_state: status.state,
            result,
        }))
    }

    fn handle_wifi_forget(&mut self, request: WifiForgetRequest) -> Result<(), PairingError> {
        let success = self.services.wifi_forget(&request.ssid, request.delete_all);
        info!(
            ssid = %String::from_utf8_lossy(&request.ssid),
            delete_all = request.delete_all,
            success,
            "Wi-Fi forget"
        );
        self.send(&RtsMessage::WifiForgetResponse(WifiForgetResponse {
            success,
            ssid: request.ssid,
        }))
    }

    fn handle_access_point(&mut self, enable: bool) -> Result<(), PairingError> {
        let response = if enable {
            let password = self.kex.generate_pin(self.config.ap_password_len)?;
            let ssid = self.kex.device_name().to_string();
            if self.services.set_access_point(true, &ssid, &password) {
                WifiAccessPointResponse { success: true, ssid, password }
            } else {
                WifiAccessPointResponse::default()
            }
        } else {
            WifiAccessPointResponse {
                success: self.services.set_access_point(false, "", ""),
                ..Default::default()
            }
        };
        info!(enable, success = response.success, "access point request");
        self.send(&RtsMessage::WifiAccessPointResponse(response))
    }

    // ------------------------------------------------------------------------
    // OTA
    // ------------------------------------------------------------------------

    fn handle_ota_update(&mut self, url: String) -> Result<(), PairingError> {
        if self.ota_in_progress {
            info!(%url, "OTA already running, request ignored");
            return Ok(());
        }
        info!(%url, "OTA update requested");
        self.ota_in_progress = true;
        self.signals.push_back(PairingSignal::OtaUpdateRequested(url.clone()));
        if self.services.start_ota(&url) {
            self.send_ota_progress(OtaStatus::InProgress, 0, 0)
        } else {
            warn!(%url, "update engine refused the request");
            self.ota_in_progress = false;
            self.send_ota_progress(OtaStatus::Error, 0, 0)
        }
    }

    fn handle_ota_cancel(&mut self) -> Result<(), PairingError> {
        if self.ota_in_progress {
            self.services.cancel_ota();
            self.ota_in_progress = false;
            info!("OTA cancelled");
        }
        self.send_status()
    }

    // ------------------------------------------------------------------------
    // Logs
    // ------------------------------------------------------------------------

    fn handle_log_request(&mut self) -> Result<(), PairingError> {
        let file_id = self.kex.random_u32()?;
        let archive = match self.services.collect_logs() {
            Ok(archive) => archive,
            Err(e) => {
                warn!(error = %e, "log collection failed");
                return self.send(&RtsMessage::LogResponse { exit_code: -1, file_id });
            }
        };
        let Ok(total) = u32::try_from(archive.len()) else {
            warn!(bytes = archive.len(), "log archive too large to send");
            return self.send(&RtsMessage::LogResponse { exit_code: -1, file_id });
        };

        self.send(&RtsMessage::LogResponse { exit_code: 0, file_id })?;
        let mut offset = 0u32;
        for chunk in archive.chunks(self.config.file_chunk_size.max(1)) {
            // chunk.len() <= total, which fits in u32
            offset += chunk.len() as u32;
            self.send(&RtsMessage::FileDownload(FileChunk {
                status: 0,
                file_id,
                offset,
                total,
                chunk: chunk.to_vec(),
            }))?;
        }
        debug!(file_id, bytes = total, "log archive sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::{drive_to_confirmed, encrypted, test_machine, FakeServices, RecordingTransport};
    use crate::pairing::Phase;
    use crate::store::MemoryKeyStorage;
    use swb_proto::rts::{OtaProgress, WifiConnState};
    use swb_proto::CommsType;

    type Machine = PairingStateMachine<RecordingTransport, FakeServices>;

    fn confirmed() -> Machine {
        let (mut m, _) = test_machine(MemoryKeyStorage::new());
        drive_to_confirmed(&mut m);
        m.drain_signals();
        m.drain_timers();
        m.transport_mut().take_sent();
        m.services_mut().calls.clear();
        m
    }

    fn replies(m: &Machine) -> Vec<RtsMessage> {
        m.transport()
            .sent_messages()
            .into_iter()
            .map(|(comms, msg)| {
                assert_eq!(comms, CommsType::Encrypted);
                msg
            })
            .collect()
    }

    fn connect_request(timeout_secs: u32) -> RtsMessage {
        RtsMessage::WifiConnectRequest(WifiConnectRequest {
            ssid: b"home".to_vec(),
            password: "hunter22".into(),
            timeout_secs,
            ..Default::default()
        })
    }

    fn poll_timer(m: &mut Machine) -> Option<u64> {
        m.drain_timers().into_iter().find_map(|t| match t {
            TimerCommand::Start { kind: TimerKind::WifiConnectPoll, generation, .. } => {
                Some(generation)
            }
            _ => None,
        })
    }

    #[test]
    fn test_status_reports_device_state() {
        let mut m = confirmed();
        m.services_mut().wifi.ssid = b"home".to_vec();
        m.services_mut().wifi.state = WifiConnState::Online;
        m.services_mut().info.build = "1.8.0".into();
        m.set_ota_in_progress(true);

        m.handle_link_event(encrypted(&RtsMessage::StatusRequest));

        match replies(&m).as_slice() {
            [RtsMessage::StatusResponse(status)] => {
                assert_eq!(status.ssid, b"home");
                assert_eq!(status.conn_state, WifiConnState::Online);
                assert_eq!(status.build, "1.8.0");
                assert!(status.ota_in_progress);
            }
            other => panic!("unexpected replies: {:?}", other),
        }
    }

    #[test]
    fn test_connect_answers_immediately_when_online() {
        let mut m = confirmed();
        m.services_mut().online_after_polls = Some(0);
        m.services_mut().connect_result = ConnectWifiResult::Success;

        m.handle_link_event(encrypted(&connect_request(5)));

        assert_eq!(
            replies(&m),
            vec![RtsMessage::WifiConnectResponse(WifiConnectResponse {
                ssid: b"home".to_vec(),
                conn_state: WifiConnState::Online,
                result: ConnectWifiResult::Success,
            })]
        );
        assert!(poll_timer(&mut m).is_none());
        assert!(m.drain_signals().contains(&PairingSignal::WifiCredentialsReceived {
            ssid: b"home".to_vec(),
            password: "hunter22".into(),
        }));
    }

    #[test]
    fn test_connect_polls_until_online() {
        let mut m = confirmed();
        m.services_mut().online_after_polls = Some(3);

        m.handle_link_event(encrypted(&connect_request(10)));
        assert!(replies(&m).is_empty());

        for _ in 0..2 {
            let generation = poll_timer(&mut m).expect("poll scheduled");
            m.on_timer(TimerKind::WifiConnectPoll, generation);
            assert!(replies(&m).is_empty());
        }
        let generation = poll_timer(&mut m).expect("poll scheduled");
        m.on_timer(TimerKind::WifiConnectPoll, generation);

        match replies(&m).as_slice() {
            [RtsMessage::WifiConnectResponse(response)] => {
                assert_eq!(response.conn_state, WifiConnState::Online);
                assert_eq!(response.result, ConnectWifiResult::None);
            }
            other => panic!("unexpected replies: {:?}", other),
        }
        assert!(poll_timer(&mut m).is_none());
    }

    #[test]
    fn test_connect_gives_up_after_timeout() {
        let mut m = confirmed();
        m.handle_link_event(encrypted(&connect_request(2)));

        let mut polls = 0;
        while let Some(generation) = poll_timer(&mut m) {
            m.on_timer(TimerKind::WifiConnectPoll, generation);
            polls += 1;
        }

        assert_eq!(polls, 2);
        match replies(&m).as_slice() {
            [RtsMessage::WifiConnectResponse(response)] => {
                assert_ne!(response.conn_state, WifiConnState::Online);
                assert_eq!(response.result, ConnectWifiResult::None);
            }
            other => panic!("unexpected replies: {:?}", other),
        }
    }

    #[test]
    fn test_connect_timeout_has_floor() {
        let mut m = confirmed();
        m.handle_link_event(encrypted(&connect_request(0)));
        let mut polls = 0;
        while let Some(generation) = poll_timer(&mut m) {
            m.on_timer(TimerKind::WifiConnectPoll, generation);
            polls += 1;
        }
        assert_eq!(polls, 15);
    }

    #[test]
    fn test_invalid_key_answers_immediately() {
        let mut m = confirmed();
        m.services_mut().connect_result = ConnectWifiResult::InvalidKey;
        m.handle_link_event(encrypted(&connect_request(10)));
        match replies(&m).as_slice() {
            [RtsMessage::WifiConnectResponse(response)] => {
                assert_eq!(response.result, ConnectWifiResult::InvalidKey);
            }
            other => panic!("unexpected replies: {:?}", other),
        }
    }

    #[test]
    fn test_reset_abandons_connect_poll() {
        let mut m = confirmed();
        m.handle_link_event(encrypted(&connect_request(10)));
        let generation = poll_timer(&mut m).expect("poll scheduled");
        m.reset(true);
        assert!(m.drain_timers().contains(&TimerCommand::Cancel(TimerKind::WifiConnectPoll)));
        m.transport_mut().take_sent();

        m.on_timer(TimerKind::WifiConnectPoll, generation);
        assert!(m.transport().sent.is_empty());
        assert_eq!(m.phase(), Phase::Initial);
    }

    #[test]
    fn test_forget_reports_result() {
        let mut m = confirmed();
        m.handle_link_event(encrypted(&RtsMessage::WifiForgetRequest(WifiForgetRequest {
            ssid: b"cafe".to_vec(),
            delete_all: false,
        })));
        assert_eq!(
            replies(&m),
            vec![RtsMessage::WifiForgetResponse(WifiForgetResponse {
                success: true,
                ssid: b"cafe".to_vec(),
            })]
        );
        assert_eq!(m.services().calls, vec!["wifi_forget"]);
    }

    #[test]
    fn test_access_point_uses_device_name_and_random_password() {
        let mut m = confirmed();
        m.handle_link_event(encrypted(&RtsMessage::WifiAccessPointRequest { enable: true }));

        let name = m.key_exchange().device_name().to_string();
        match replies(&m).as_slice() {
            [RtsMessage::WifiAccessPointResponse(response)] => {
                assert!(response.success);
                assert_eq!(response.ssid, name);
                assert_eq!(response.password.len(), 8);
                assert!(response.password.bytes().all(|b| b.is_ascii_digit()));
                assert_eq!(
                    m.services().access_point,
                    Some((name.clone(), response.password.clone()))
                );
            }
            other => panic!("unexpected replies: {:?}", other),
        }

        m.transport_mut().take_sent();
        m.handle_link_event(encrypted(&RtsMessage::WifiAccessPointRequest { enable: false }));
        assert_eq!(
            replies(&m),
            vec![RtsMessage::WifiAccessPointResponse(WifiAccessPointResponse {
                success: true,
                ..Default::default()
            })]
        );
        assert_eq!(m.services().access_point, None);
    }

    #[test]
    fn test_ota_update_runs_once() {
        let mut m = confirmed();
        let url = "https://updates.example/vic-1.8.ota".to_string();
        m.handle_link_event(encrypted(&RtsMessage::OtaUpdateRequest { url: url.clone() }));

        assert!(m.is_ota_in_progress());
        assert_eq!(m.drain_signals(), vec![PairingSignal::OtaUpdateRequested(url.clone())]);
        assert_eq!(
            replies(&m),
            vec![RtsMessage::OtaUpdateResponse(OtaProgress {
                status: OtaStatus::InProgress,
                progress: 0,
                total: 0,
            })]
        );

        m.transport_mut().take_sent();
        m.handle_link_event(encrypted(&RtsMessage::OtaUpdateRequest { url }));
        assert!(m.transport().sent.is_empty());
        assert_eq!(m.services().ota_started.len(), 1);
    }

    #[test]
    fn test_ota_refused_reports_error() {
        let mut m = confirmed();
        m.services_mut().refuse_ota = true;
        m.handle_link_event(encrypted(&RtsMessage::OtaUpdateRequest { url: "x".into() }));
        assert!(!m.is_ota_in_progress());
        assert!(matches!(
            replies(&m).as_slice(),
            [RtsMessage::OtaUpdateResponse(OtaProgress { status: OtaStatus::Error, .. })]
        ));
    }

    #[test]
    fn test_heartbeat_follows_ota_to_completion() {
        let mut m = confirmed();
        m.handle_link_event(encrypted(&RtsMessage::OtaUpdateRequest { url: "x".into() }));
        m.services_mut().ota_script.extend([
            OtaProgress { status: OtaStatus::InProgress, progress: 50, total: 100 },
            OtaProgress { status: OtaStatus::Completed, progress: 100, total: 100 },
        ]);
        m.transport_mut().take_sent();

        m.heartbeat();
        m.heartbeat();
        m.heartbeat();

        assert!(!m.is_ota_in_progress());
        let statuses: Vec<_> = replies(&m)
            .into_iter()
            .map(|msg| match msg {
                RtsMessage::OtaUpdateResponse(p) => (p.status, p.progress),
                other => panic!("unexpected reply: {:?}", other),
            })
            .collect();
        assert_eq!(statuses, vec![(OtaStatus::InProgress, 50), (OtaStatus::Completed, 100)]);
    }

    #[test]
    fn test_ota_cancel_replies_with_status() {
        let mut m = confirmed();
        m.handle_link_event(encrypted(&RtsMessage::OtaUpdateRequest { url: "x".into() }));
        m.transport_mut().take_sent();

        m.handle_link_event(encrypted(&RtsMessage::OtaCancelRequest));
        assert!(!m.is_ota_in_progress());
        assert!(m.services().ota_cancelled);
        assert!(matches!(
            replies(&m).as_slice(),
            [RtsMessage::StatusResponse(StatusResponse { ota_in_progress: false, .. })]
        ));
    }

    #[test]
    fn test_log_archive_is_chunked() {
        let mut m = confirmed();
        m.services_mut().logs = (0..600u32).map(|i| i as u8).collect();
        m.handle_link_event(encrypted(&RtsMessage::LogRequest));

        let replies = replies(&m);
        let file_id = match replies.first() {
            Some(RtsMessage::LogResponse { exit_code: 0, file_id }) => *file_id,
            other => panic!("unexpected first reply: {:?}", other),
        };
        let chunks: Vec<_> = replies[1..]
            .iter()
            .map(|msg| match msg {
                RtsMessage::FileDownload(chunk) => chunk.clone(),
                other => panic!("unexpected reply: {:?}", other),
            })
            .collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(
            chunks.iter().map(|c| c.offset).collect::<Vec<_>>(),
            vec![256, 512, 600]
        );
        assert!(chunks.iter().all(|c| c.file_id == file_id && c.total == 600));
        let joined: Vec<u8> = chunks.into_iter().flat_map(|c| c.chunk).collect();
        assert_eq!(joined, m.services().logs);
    }

    #[test]
    fn test_log_failure_reports_exit_code() {
        let mut m = confirmed();
        m.services_mut().fail_logs = true;
        m.handle_link_event(encrypted(&RtsMessage::LogRequest));
        assert!(matches!(
            replies(&m).as_slice(),
            [RtsMessage::LogResponse { exit_code: -1, .. }]
        ));
    }

    #[test]
    fn test_response_kinds_are_not_requests() {
        let mut m = confirmed();
        m.handle_link_event(encrypted(&RtsMessage::WifiIpResponse(Default::default())));
        assert_eq!(m.abnormality_count(), 1);
        assert!(m.transport().sent.is_empty());
    }
}
