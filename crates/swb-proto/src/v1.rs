//! Protobuf definitions for RTS (robot-to-smartphone) protocol version 3.
//!
//! Field tags are fixed and MUST NOT change once released. The oneof tag of
//! each message in [`RtsConnectionV1`] doubles as its wire tag, which is what
//! [`RtsAckV1::rts_connection_tag`] refers to.

/// Connection type announced by the client in its public-key response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum RtsConnTypeV1 {
    Unspecified = 0,
    FirstTimePair = 1,
    Reconnect = 2,
}

/// Wi-Fi connectivity as reported by the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum WifiConnStateV1 {
    Unknown = 0,
    Online = 1,
    Connected = 2,
    Disconnected = 3,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RtsConnRequestV1 {
    #[prost(bytes = "vec", tag = "1")]
    pub public_key: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RtsConnResponseV1 {
    #[prost(enumeration = "RtsConnTypeV1", tag = "1")]
    pub connection_type: i32,
    #[prost(bytes = "vec", tag = "2")]
    pub public_key: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RtsNonceMessageV1 {
    #[prost(bytes = "vec", tag = "1")]
    pub to_robot_nonce: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub to_device_nonce: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RtsAckV1 {
    #[prost(uint32, tag = "1")]
    pub rts_connection_tag: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RtsChallengeMessageV1 {
    #[prost(uint32, tag = "1")]
    pub number: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RtsChallengeResponseV1 {
    #[prost(uint32, tag = "1")]
    pub number: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RtsChallengeSuccessV1 {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RtsCancelPairingV1 {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RtsStatusRequestV1 {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RtsStatusResponseV1 {
    #[prost(bytes = "vec", tag = "1")]
    pub wifi_ssid: ::prost::alloc::vec::Vec<u8>,
    #[prost(enumeration = "WifiConnStateV1", tag = "2")]
    pub wifi_state: i32,
    #[prost(bool, tag = "3")]
    pub access_point: bool,
    #[prost(uint32, tag = "4")]
    pub ble_state: u32,
    #[prost(uint32, tag = "5")]
    pub battery_state: u32,
    #[prost(string, tag = "6")]
    pub version: ::prost::alloc::string::String,
    #[prost(bool, tag = "7")]
    pub ota_in_progress: bool,
    #[prost(bool, tag = "8")]
    pub has_owner: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RtsWifiScanRequestV1 {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RtsWifiScanResultV1 {
    #[prost(uint32, tag = "1")]
    pub auth_type: u32,
    #[prost(uint32, tag = "2")]
    pub signal_strength: u32,
    #[prost(bytes = "vec", tag = "3")]
    pub wifi_ssid: ::prost::alloc::vec::Vec<u8>,
    #[prost(bool, tag = "4")]
    pub hidden: bool,
    #[prost(bool, tag = "5")]
    pub provisioned: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RtsWifiScanResponseV1 {
    #[prost(uint32, tag = "1")]
    pub status_code: u32,
    #[prost(message, repeated, tag = "2")]
    pub scan_result: ::prost::alloc::vec::Vec<RtsWifiScanResultV1>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RtsWifiConnectRequestV1 {
    #[prost(bytes = "vec", tag = "1")]
    pub wifi_ssid: ::prost::alloc::vec::Vec<u8>,
    #[prost(string, tag = "2")]
    pub password: ::prost::alloc::string::String,
    #[prost(uint32, tag = "3")]
    pub auth_type: u32,
    #[prost(bool, tag = "4")]
    pub hidden: bool,
    #[prost(uint32, tag = "5")]
    pub timeout: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RtsWifiConnectResponseV1 {
    #[prost(bytes = "vec", tag = "1")]
    pub wifi_ssid: ::prost::alloc::vec::Vec<u8>,
    #[prost(enumeration = "WifiConnStateV1", tag = "2")]
    pub wifi_state: i32,
    #[prost(uint32, tag = "3")]
    pub connect_result: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RtsWifiForgetRequestV1 {
    #[prost(bool, tag = "1")]
    pub delete_all: bool,
    #[prost(bytes = "vec", tag = "2")]
    pub wifi_ssid: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RtsWifiForgetResponseV1 {
    #[prost(bool, tag = "1")]
    pub did_delete: bool,
    #[prost(bytes = "vec", tag = "2")]
    pub wifi_ssid: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RtsWifiAccessPointRequestV1 {
    #[prost(bool, tag = "1")]
    pub enable: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RtsWifiAccessPointResponseV1 {
    #[prost(bool, tag = "1")]
    pub enabled: bool,
    #[prost(string, tag = "2")]
    pub ssid: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub password: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RtsWifiIpRequestV1 {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RtsWifiIpResponseV1 {
    #[prost(bool, tag = "1")]
    pub has_ipv4: bool,
    #[prost(bool, tag = "2")]
    pub has_ipv6: bool,
    #[prost(bytes = "vec", tag = "3")]
    pub ip_v4: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub ip_v6: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RtsOtaUpdateRequestV1 {
    #[prost(string, tag = "1")]
    pub url: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RtsOtaUpdateResponseV1 {
    #[prost(uint32, tag = "1")]
    pub status: u32,
    #[prost(uint64, tag = "2")]
    pub current: u64,
    #[prost(uint64, tag = "3")]
    pub expected: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RtsOtaCancelRequestV1 {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RtsLogRequestV1 {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RtsLogResponseV1 {
    #[prost(int32, tag = "1")]
    pub exit_code: i32,
    #[prost(uint32, tag = "2")]
    pub file_id: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RtsFileDownloadV1 {
    #[prost(uint32, tag = "1")]
    pub status: u32,
    #[prost(uint32, tag = "2")]
    pub file_id: u32,
    #[prost(uint32, tag = "3")]
    pub packet_number: u32,
    #[prost(uint32, tag = "4")]
    pub packet_total: u32,
    #[prost(bytes = "vec", tag = "5")]
    pub file_chunk: ::prost::alloc::vec::Vec<u8>,
}

/// Envelope carried by every frame on the link.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RtsConnectionV1 {
    #[prost(
        oneof = "rts_connection_v1::Msg",
        tags = "1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26"
    )]
    pub msg: ::core::option::Option<rts_connection_v1::Msg>,
}

/// Nested oneof for [`RtsConnectionV1`].
pub mod rts_connection_v1 {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Msg {
        #[prost(message, tag = "1")]
        ConnRequest(super::RtsConnRequestV1),
        #[prost(message, tag = "2")]
        ConnResponse(super::RtsConnResponseV1),
        #[prost(message, tag = "3")]
        Nonce(super::RtsNonceMessageV1),
        #[prost(message, tag = "4")]
        Ack(super::RtsAckV1),
        #[prost(message, tag = "5")]
        Challenge(super::RtsChallengeMessageV1),
        #[prost(message, tag = "6")]
        ChallengeResponse(super::RtsChallengeResponseV1),
        #[prost(message, tag = "7")]
        ChallengeSuccess(super::RtsChallengeSuccessV1),
        #[prost(message, tag = "8")]
        CancelPairing(super::RtsCancelPairingV1),
        #[prost(message, tag = "9")]
        StatusRequest(super::RtsStatusRequestV1),
        #[prost(message, tag = "10")]
        StatusResponse(super::RtsStatusResponseV1),
        #[prost(message, tag = "11")]
        WifiScanRequest(super::RtsWifiScanRequestV1),
        #[prost(message, tag = "12")]
        WifiScanResponse(super::RtsWifiScanResponseV1),
        #[prost(message, tag = "13")]
        WifiConnectRequest(super::RtsWifiConnectRequestV1),
        #[prost(message, tag = "14")]
        WifiConnectResponse(super::RtsWifiConnectResponseV1),
        #[prost(message, tag = "15")]
        WifiForgetRequest(super::RtsWifiForgetRequestV1),
        #[prost(message, tag = "16")]
        WifiForgetResponse(super::RtsWifiForgetResponseV1),
        #[prost(message, tag = "17")]
        WifiAccessPointRequest(super::RtsWifiAccessPointRequestV1),
        #[prost(message, tag = "18")]
        WifiAccessPointResponse(super::RtsWifiAccessPointResponseV1),
        #[prost(message, tag = "19")]
        WifiIpRequest(super::RtsWifiIpRequestV1),
        #[prost(message, tag = "20")]
        WifiIpResponse(super::RtsWifiIpResponseV1),
        #[prost(message, tag = "21")]
        OtaUpdateRequest(super::RtsOtaUpdateRequestV1),
        #[prost(message, tag = "22")]
        OtaUpdateResponse(super::RtsOtaUpdateResponseV1),
        #[prost(message, tag = "23")]
        OtaCancelRequest(super::RtsOtaCancelRequestV1),
        #[prost(message, tag = "24")]
        LogRequest(super::RtsLogRequestV1),
        #[prost(message, tag = "25")]
        LogResponse(super::RtsLogResponseV1),
        #[prost(message, tag = "26")]
        FileDownload(super::RtsFileDownloadV1),
    }
}
