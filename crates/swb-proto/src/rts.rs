//! Domain view of the RTS message catalogue.
//!
//! Every frame is parsed into exactly one [`RtsMessage`]. Binary fields that
//! have a fixed size on the wire (public keys, nonces, IP addresses) are
//! fixed-size arrays here; SSIDs are raw bytes rather than hex strings.

/// X25519 public key length.
pub const PUBLIC_KEY_LEN: usize = 32;
/// XChaCha20-Poly1305 nonce length.
pub const NONCE_LEN: usize = 24;

pub type PublicKeyBytes = [u8; PUBLIC_KEY_LEN];
pub type NonceBytes = [u8; NONCE_LEN];

/// Whether a message travels in the clear or through the AEAD channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CommsType {
    #[default]
    Unencrypted,
    Encrypted,
}

/// Wire tag of each message kind. Values match the oneof tags in
/// [`crate::v1::RtsConnectionV1`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageTag {
    ConnRequest = 1,
    ConnResponse = 2,
    Nonce = 3,
    Ack = 4,
    Challenge = 5,
    ChallengeResponse = 6,
    ChallengeSuccess = 7,
    CancelPairing = 8,
    StatusRequest = 9,
    StatusResponse = 10,
    WifiScanRequest = 11,
    WifiScanResponse = 12,
    WifiConnectRequest = 13,
    WifiConnectResponse = 14,
    WifiForgetRequest = 15,
    WifiForgetResponse = 16,
    WifiAccessPointRequest = 17,
    WifiAccessPointResponse = 18,
    WifiIpRequest = 19,
    WifiIpResponse = 20,
    OtaUpdateRequest = 21,
    OtaUpdateResponse = 22,
    OtaCancelRequest = 23,
    LogRequest = 24,
    LogResponse = 25,
    FileDownload = 26,
}

impl MessageTag {
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        use MessageTag::*;
        let tag = match value {
            1 => ConnRequest,
            2 => ConnResponse,
            3 => Nonce,
            4 => Ack,
            5 => Challenge,
            6 => ChallengeResponse,
            7 => ChallengeSuccess,
            8 => CancelPairing,
            9 => StatusRequest,
            10 => StatusResponse,
            11 => WifiScanRequest,
            12 => WifiScanResponse,
            13 => WifiConnectRequest,
            14 => WifiConnectResponse,
            15 => WifiForgetRequest,
            16 => WifiForgetResponse,
            17 => WifiAccessPointRequest,
            18 => WifiAccessPointResponse,
            19 => WifiIpRequest,
            20 => WifiIpResponse,
            21 => OtaUpdateRequest,
            22 => OtaUpdateResponse,
            23 => OtaCancelRequest,
            24 => LogRequest,
            25 => LogResponse,
            26 => FileDownload,
            _ => return None,
        };
        Some(tag)
    }

    /// Channel a message of this kind must arrive on. `None` means either
    /// (only `CancelPairing`).
    pub fn comms_type(self) -> Option<CommsType> {
        use MessageTag::*;
        match self {
            ConnRequest | ConnResponse | Nonce | Ack => Some(CommsType::Unencrypted),
            CancelPairing => None,
            _ => Some(CommsType::Encrypted),
        }
    }

    /// Post-authentication requests served by the application handlers.
    pub fn is_application_request(self) -> bool {
        use MessageTag::*;
        matches!(
            self,
            StatusRequest
                | WifiScanRequest
                | WifiConnectRequest
                | WifiForgetRequest
                | WifiAccessPointRequest
                | WifiIpRequest
                | OtaUpdateRequest
                | OtaCancelRequest
                | LogRequest
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnType {
    FirstTimePair,
    Reconnect,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WifiConnState {
    #[default]
    Unknown,
    Online,
    Connected,
    Disconnected,
}

/// Outcome of a Wi-Fi connect attempt, as reported to the client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u32)]
pub enum ConnectWifiResult {
    /// No verdict yet (reported when polling ends without a direct result).
    #[default]
    None = 0,
    Success = 1,
    Failure = 2,
    InvalidKey = 3,
}

impl ConnectWifiResult {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::Success,
            2 => Self::Failure,
            3 => Self::InvalidKey,
            _ => Self::None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u32)]
pub enum OtaStatus {
    #[default]
    Unknown = 0,
    InProgress = 1,
    Completed = 2,
    Rebooting = 3,
    Error = 4,
}

impl OtaStatus {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::InProgress,
            2 => Self::Completed,
            3 => Self::Rebooting,
            4 => Self::Error,
            _ => Self::Unknown,
        }
    }

    /// The update engine has exited.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Rebooting | Self::Error)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnResponse {
    pub connection_type: ConnType,
    pub public_key: PublicKeyBytes,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NonceMessage {
    pub to_robot: NonceBytes,
    pub to_device: NonceBytes,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusResponse {
    pub ssid: Vec<u8>,
    pub conn_state: WifiConnState,
    pub access_point: bool,
    pub ble_state: u32,
    pub battery_state: u32,
    pub build: String,
    pub ota_in_progress: bool,
    pub has_owner: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WifiScanResult {
    pub auth_type: u32,
    pub signal_strength: u32,
    pub ssid: Vec<u8>,
    pub hidden: bool,
    pub provisioned: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WifiScanResponse {
    pub status: u32,
    pub results: Vec<WifiScanResult>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WifiConnectRequest {
    pub ssid: Vec<u8>,
    pub password: String,
    pub auth_type: u32,
    pub hidden: bool,
    pub timeout_secs: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WifiConnectResponse {
    pub ssid: Vec<u8>,
    pub conn_state: WifiConnState,
    pub result: ConnectWifiResult,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WifiForgetRequest {
    pub ssid: Vec<u8>,
    pub delete_all: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WifiForgetResponse {
    pub success: bool,
    pub ssid: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WifiAccessPointResponse {
    pub success: bool,
    pub ssid: String,
    pub password: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WifiIpResponse {
    pub ipv4: Option<[u8; 4]>,
    pub ipv6: Option<[u8; 16]>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OtaProgress {
    pub status: OtaStatus,
    pub progress: u64,
    pub total: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileChunk {
    pub status: u32,
    pub file_id: u32,
    /// Bytes delivered so far, including this chunk.
    pub offset: u32,
    pub total: u32,
    pub chunk: Vec<u8>,
}

/// One parsed frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RtsMessage {
    ConnRequest { public_key: PublicKeyBytes },
    ConnResponse(ConnResponse),
    Nonce(NonceMessage),
    Ack { referenced_tag: u32 },
    Challenge { value: u32 },
    ChallengeResponse { answer: u32 },
    ChallengeSuccess,
    CancelPairing,
    StatusRequest,
    StatusResponse(StatusResponse),
    WifiScanRequest,
    WifiScanResponse(WifiScanResponse),
    WifiConnectRequest(WifiConnectRequest),
    WifiConnectResponse(WifiConnectResponse),
    WifiForgetRequest(WifiForgetRequest),
    WifiForgetResponse(WifiForgetResponse),
    WifiAccessPointRequest { enable: bool },
    WifiAccessPointResponse(WifiAccessPointResponse),
    WifiIpRequest,
    WifiIpResponse(WifiIpResponse),
    OtaUpdateRequest { url: String },
    OtaUpdateResponse(OtaProgress),
    OtaCancelRequest,
    LogRequest,
    LogResponse { exit_code: i32, file_id: u32 },
    FileDownload(FileChunk),
}

impl RtsMessage {
    pub fn tag(&self) -> MessageTag {
        match self {
            Self::ConnRequest { .. } => MessageTag::ConnRequest,
            Self::ConnResponse(_) => MessageTag::ConnResponse,
            Self::Nonce(_) => MessageTag::Nonce,
            Self::Ack { .. } => MessageTag::Ack,
            Self::Challenge { .. } => MessageTag::Challenge,
            Self::ChallengeResponse { .. } => MessageTag::ChallengeResponse,
            Self::ChallengeSuccess => MessageTag::ChallengeSuccess,
            Self::CancelPairing => MessageTag::CancelPairing,
            Self::StatusRequest => MessageTag::StatusRequest,
            Self::StatusResponse(_) => MessageTag::StatusResponse,
            Self::WifiScanRequest => MessageTag::WifiScanRequest,
            Self::WifiScanResponse(_) => MessageTag::WifiScanResponse,
            Self::WifiConnectRequest(_) => MessageTag::WifiConnectRequest,
            Self::WifiConnectResponse(_) => MessageTag::WifiConnectResponse,
            Self::WifiForgetRequest(_) => MessageTag::WifiForgetRequest,
            Self::WifiForgetResponse(_) => MessageTag::WifiForgetResponse,
            Self::WifiAccessPointRequest { .. } => MessageTag::WifiAccessPointRequest,
            Self::WifiAccessPointResponse(_) => MessageTag::WifiAccessPointResponse,
            Self::WifiIpRequest => MessageTag::WifiIpRequest,
            Self::WifiIpResponse(_) => MessageTag::WifiIpResponse,
            Self::OtaUpdateRequest { .. } => MessageTag::OtaUpdateRequest,
            Self::OtaUpdateResponse(_) => MessageTag::OtaUpdateResponse,
            Self::OtaCancelRequest => MessageTag::OtaCancelRequest,
            Self::LogRequest => MessageTag::LogRequest,
            Self::LogResponse { .. } => MessageTag::LogResponse,
            Self::FileDownload(_) => MessageTag::FileDownload,
        }
    }
}
