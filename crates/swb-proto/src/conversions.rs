//! Conversions between the protobuf wire types and [`RtsMessage`].

use crate::rts::*;
use crate::v1::{rts_connection_v1::Msg, *};
use crate::validation::{
    fixed_array, optional_array, sizes, validate_not_empty, validate_ssid, ValidationError,
    ValidationResult,
};

// ============================================================================
// Enum conversions
// ============================================================================

impl From<ConnType> for RtsConnTypeV1 {
    fn from(value: ConnType) -> Self {
        match value {
            ConnType::FirstTimePair => RtsConnTypeV1::FirstTimePair,
            ConnType::Reconnect => RtsConnTypeV1::Reconnect,
        }
    }
}

impl TryFrom<i32> for ConnType {
    type Error = ValidationError;

    fn try_from(value: i32) -> ValidationResult<Self> {
        match RtsConnTypeV1::try_from(value) {
            Ok(RtsConnTypeV1::FirstTimePair) => Ok(ConnType::FirstTimePair),
            Ok(RtsConnTypeV1::Reconnect) => Ok(ConnType::Reconnect),
            _ => Err(ValidationError::UnknownVariant { field: "connection_type", value }),
        }
    }
}

impl From<WifiConnState> for WifiConnStateV1 {
    fn from(value: WifiConnState) -> Self {
        match value {
            WifiConnState::Unknown => WifiConnStateV1::Unknown,
            WifiConnState::Online => WifiConnStateV1::Online,
            WifiConnState::Connected => WifiConnStateV1::Connected,
            WifiConnState::Disconnected => WifiConnStateV1::Disconnected,
        }
    }
}

impl From<i32> for WifiConnState {
    fn from(value: i32) -> Self {
        match WifiConnStateV1::try_from(value) {
            Ok(WifiConnStateV1::Online) => WifiConnState::Online,
            Ok(WifiConnStateV1::Connected) => WifiConnState::Connected,
            Ok(WifiConnStateV1::Disconnected) => WifiConnState::Disconnected,
            _ => WifiConnState::Unknown,
        }
    }
}

// ============================================================================
// Domain -> wire
// ============================================================================

fn scan_result_to_wire(r: &WifiScanResult) -> RtsWifiScanResultV1 {
    RtsWifiScanResultV1 {
        auth_type: r.auth_type,
        signal_strength: r.signal_strength,
        wifi_ssid: r.ssid.clone(),
        hidden: r.hidden,
        provisioned: r.provisioned,
    }
}

impl From<&RtsMessage> for RtsConnectionV1 {
    fn from(msg: &RtsMessage) -> Self {
        let inner = match msg {
            RtsMessage::ConnRequest { public_key } => Msg::ConnRequest(RtsConnRequestV1 {
                public_key: public_key.to_vec(),
            }),
            RtsMessage::ConnResponse(r) => Msg::ConnResponse(RtsConnResponseV1 {
                connection_type: RtsConnTypeV1::from(r.connection_type) as i32,
                public_key: r.public_key.to_vec(),
            }),
            RtsMessage::Nonce(n) => Msg::Nonce(RtsNonceMessageV1 {
                to_robot_nonce: n.to_robot.to_vec(),
                to_device_nonce: n.to_device.to_vec(),
            }),
            RtsMessage::Ack { referenced_tag } => Msg::Ack(RtsAckV1 {
                rts_connection_tag: *referenced_tag,
            }),
            RtsMessage::Challenge { value } => {
                Msg::Challenge(RtsChallengeMessageV1 { number: *value })
            }
            RtsMessage::ChallengeResponse { answer } => {
                Msg::ChallengeResponse(RtsChallengeResponseV1 { number: *answer })
            }
            RtsMessage::ChallengeSuccess => Msg::ChallengeSuccess(RtsChallengeSuccessV1 {}),
            RtsMessage::CancelPairing => Msg::CancelPairing(RtsCancelPairingV1 {}),
            RtsMessage::StatusRequest => Msg::StatusRequest(RtsStatusRequestV1 {}),
            RtsMessage::StatusResponse(s) => Msg::StatusResponse(RtsStatusResponseV1 {
                wifi_ssid: s.ssid.clone(),
                wifi_state: WifiConnStateV1::from(s.conn_state) as i32,
                access_point: s.access_point,
                ble_state: s.ble_state,
                battery_state: s.battery_state,
                version: s.build.clone(),
                ota_in_progress: s.ota_in_progress,
                has_owner: s.has_owner,
            }),
            RtsMessage::WifiScanRequest => Msg::WifiScanRequest(RtsWifiScanRequestV1 {}),
            RtsMessage::WifiScanResponse(s) => Msg::WifiScanResponse(RtsWifiScanResponseV1 {
                status_code: s.status,
                scan_result: s.results.iter().map(scan_result_to_wire).collect(),
            }),
            RtsMessage::WifiConnectRequest(r) => {
                Msg::WifiConnectRequest(RtsWifiConnectRequestV1 {
                    wifi_ssid: r.ssid.clone(),
                    password: r.password.clone(),
                    auth_type: r.auth_type,
                    hidden: r.hidden,
                    timeout: r.timeout_secs,
                })
            }
            RtsMessage::WifiConnectResponse(r) => {
                Msg::WifiConnectResponse(RtsWifiConnectResponseV1 {
                    wifi_ssid: r.ssid.clone(),
                    wifi_state: WifiConnStateV1::from(r.conn_state) as i32,
                    connect_result: r.result as u32,
                })
            }
            RtsMessage::WifiForgetRequest(r) => Msg::WifiForgetRequest(RtsWifiForgetRequestV1 {
                delete_all: r.delete_all,
                wifi_ssid: r.ssid.clone(),
            }),
            RtsMessage::WifiForgetResponse(r) => {
                Msg::WifiForgetResponse(RtsWifiForgetResponseV1 {
                    did_delete: r.success,
                    wifi_ssid: r.ssid.clone(),
                })
            }
            RtsMessage::WifiAccessPointRequest { enable } => {
                Msg::WifiAccessPointRequest(RtsWifiAccessPointRequestV1 { enable: *enable })
            }
            RtsMessage::WifiAccessPointResponse(r) => {
                Msg::WifiAccessPointResponse(RtsWifiAccessPointResponseV1 {
                    enabled: r.success,
                    ssid: r.ssid.clone(),
                    password: r.password.clone(),
                })
            }
            RtsMessage::WifiIpRequest => Msg::WifiIpRequest(RtsWifiIpRequestV1 {}),
            RtsMessage::WifiIpResponse(r) => Msg::WifiIpResponse(RtsWifiIpResponseV1 {
                has_ipv4: r.ipv4.is_some(),
                has_ipv6: r.ipv6.is_some(),
                ip_v4: r.ipv4.map(|a| a.to_vec()).unwrap_or_default(),
                ip_v6: r.ipv6.map(|a| a.to_vec()).unwrap_or_default(),
            }),
            RtsMessage::OtaUpdateRequest { url } => {
                Msg::OtaUpdateRequest(RtsOtaUpdateRequestV1 { url: url.clone() })
            }
            RtsMessage::OtaUpdateResponse(p) => Msg::OtaUpdateResponse(RtsOtaUpdateResponseV1 {
                status: p.status as u32,
                current: p.progress,
                expected: p.total,
            }),
            RtsMessage::OtaCancelRequest => Msg::OtaCancelRequest(RtsOtaCancelRequestV1 {}),
            RtsMessage::LogRequest => Msg::LogRequest(RtsLogRequestV1 {}),
            RtsMessage::LogResponse { exit_code, file_id } => {
                Msg::LogResponse(RtsLogResponseV1 { exit_code: *exit_code, file_id: *file_id })
            }
            RtsMessage::FileDownload(c) => Msg::FileDownload(RtsFileDownloadV1 {
                status: c.status,
                file_id: c.file_id,
                packet_number: c.offset,
                packet_total: c.total,
                file_chunk: c.chunk.clone(),
            }),
        };
        RtsConnectionV1 { msg: Some(inner) }
    }
}

// ============================================================================
// Wire -> domain
// ============================================================================

fn scan_result_from_wire(r: RtsWifiScanResultV1) -> ValidationResult<WifiScanResult> {
    validate_ssid("scan_result.wifi_ssid", &r.wifi_ssid)?;
    Ok(WifiScanResult {
        auth_type: r.auth_type,
        signal_strength: r.signal_strength,
        ssid: r.wifi_ssid,
        hidden: r.hidden,
        provisioned: r.provisioned,
    })
}

impl TryFrom<Msg> for RtsMessage {
    type Error = ValidationError;

    fn try_from(msg: Msg) -> ValidationResult<Self> {
        let out = match msg {
            Msg::ConnRequest(m) => RtsMessage::ConnRequest {
                public_key: fixed_array("public_key", &m.public_key)?,
            },
            Msg::ConnResponse(m) => RtsMessage::ConnResponse(ConnResponse {
                connection_type: ConnType::try_from(m.connection_type)?,
                public_key: fixed_array("public_key", &m.public_key)?,
            }),
            Msg::Nonce(m) => RtsMessage::Nonce(NonceMessage {
                to_robot: fixed_array("to_robot_nonce", &m.to_robot_nonce)?,
                to_device: fixed_array("to_device_nonce", &m.to_device_nonce)?,
            }),
            Msg::Ack(m) => RtsMessage::Ack { referenced_tag: m.rts_connection_tag },
            Msg::Challenge(m) => RtsMessage::Challenge { value: m.number },
            Msg::ChallengeResponse(m) => RtsMessage::ChallengeResponse { answer: m.number },
            Msg::ChallengeSuccess(_) => RtsMessage::ChallengeSuccess,
            Msg::CancelPairing(_) => RtsMessage::CancelPairing,
            Msg::StatusRequest(_) => RtsMessage::StatusRequest,
            Msg::StatusResponse(m) => {
                validate_ssid("wifi_ssid", &m.wifi_ssid)?;
                RtsMessage::StatusResponse(StatusResponse {
                    ssid: m.wifi_ssid,
                    conn_state: WifiConnState::from(m.wifi_state),
                    access_point: m.access_point,
                    ble_state: m.ble_state,
                    battery_state: m.battery_state,
                    build: m.version,
                    ota_in_progress: m.ota_in_progress,
                    has_owner: m.has_owner,
                })
            }
            Msg::WifiScanRequest(_) => RtsMessage::WifiScanRequest,
            Msg::WifiScanResponse(m) => RtsMessage::WifiScanResponse(WifiScanResponse {
                status: m.status_code,
                results: m
                    .scan_result
                    .into_iter()
                    .map(scan_result_from_wire)
                    .collect::<ValidationResult<Vec<_>>>()?,
            }),
            Msg::WifiConnectRequest(m) => {
                if m.wifi_ssid.is_empty() {
                    return Err(ValidationError::EmptyField { field: "wifi_ssid" });
                }
                validate_ssid("wifi_ssid", &m.wifi_ssid)?;
                RtsMessage::WifiConnectRequest(WifiConnectRequest {
                    ssid: m.wifi_ssid,
                    password: m.password,
                    auth_type: m.auth_type,
                    hidden: m.hidden,
                    timeout_secs: m.timeout,
                })
            }
            Msg::WifiConnectResponse(m) => {
                validate_ssid("wifi_ssid", &m.wifi_ssid)?;
                RtsMessage::WifiConnectResponse(WifiConnectResponse {
                    ssid: m.wifi_ssid,
                    conn_state: WifiConnState::from(m.wifi_state),
                    result: ConnectWifiResult::from_u32(m.connect_result),
                })
            }
            Msg::WifiForgetRequest(m) => {
                validate_ssid("wifi_ssid", &m.wifi_ssid)?;
                RtsMessage::WifiForgetRequest(WifiForgetRequest {
                    ssid: m.wifi_ssid,
                    delete_all: m.delete_all,
                })
            }
            Msg::WifiForgetResponse(m) => RtsMessage::WifiForgetResponse(WifiForgetResponse {
                success: m.did_delete,
                ssid: m.wifi_ssid,
            }),
            Msg::WifiAccessPointRequest(m) => RtsMessage::WifiAccessPointRequest { enable: m.enable },
            Msg::WifiAccessPointResponse(m) => {
                RtsMessage::WifiAccessPointResponse(WifiAccessPointResponse {
                    success: m.enabled,
                    ssid: m.ssid,
                    password: m.password,
                })
            }
            Msg::WifiIpRequest(_) => RtsMessage::WifiIpRequest,
            Msg::WifiIpResponse(m) => RtsMessage::WifiIpResponse(WifiIpResponse {
                ipv4: optional_array::<{ sizes::IPV4_SIZE }>("ip_v4", m.has_ipv4, &m.ip_v4)?,
                ipv6: optional_array::<{ sizes::IPV6_SIZE }>("ip_v6", m.has_ipv6, &m.ip_v6)?,
            }),
            Msg::OtaUpdateRequest(m) => {
                validate_not_empty("url", &m.url)?;
                RtsMessage::OtaUpdateRequest { url: m.url }
            }
            Msg::OtaUpdateResponse(m) => RtsMessage::OtaUpdateResponse(OtaProgress {
                status: OtaStatus::from_u32(m.status),
                progress: m.current,
                total: m.expected,
            }),
            Msg::OtaCancelRequest(_) => RtsMessage::OtaCancelRequest,
            Msg::LogRequest(_) => RtsMessage::LogRequest,
            Msg::LogResponse(m) => RtsMessage::LogResponse {
                exit_code: m.exit_code,
                file_id: m.file_id,
            },
            Msg::FileDownload(m) => RtsMessage::FileDownload(FileChunk {
                status: m.status,
                file_id: m.file_id,
                offset: m.packet_number,
                total: m.packet_total,
                chunk: m.file_chunk,
            }),
        };
        Ok(out)
    }
}
