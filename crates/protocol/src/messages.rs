//! Message schema for the native API.
//!
//! Hand-maintained protobuf definitions for the message types the client
//! handles structurally, plus the compile-time table that maps wire type
//! identifiers to their encoder/decoder pairs. Messages are plain `prost`
//! structs; the [`ApiMessage`] sum is the single entry point for encoding
//! and decoding by identifier.

use prost::Message;

use crate::error::{ProtocolError, Result};

/// Protocol version advertised by this client.
pub const API_VERSION_MAJOR: u32 = 1;
/// Protocol minor version advertised by this client.
pub const API_VERSION_MINOR: u32 = 9;

/// Wire identifiers of the well-known message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageType {
    HelloRequest = 1,
    HelloResponse = 2,
    ConnectRequest = 3,
    ConnectResponse = 4,
    DisconnectRequest = 5,
    DisconnectResponse = 6,
    PingRequest = 7,
    PingResponse = 8,
    DeviceInfoRequest = 9,
    DeviceInfoResponse = 10,
    ListEntitiesRequest = 11,
    ListEntitiesBinarySensorResponse = 12,
    ListEntitiesCoverResponse = 13,
    ListEntitiesFanResponse = 14,
    ListEntitiesLightResponse = 15,
    ListEntitiesSensorResponse = 16,
    ListEntitiesSwitchResponse = 17,
    ListEntitiesTextSensorResponse = 18,
    ListEntitiesDoneResponse = 19,
    SubscribeStatesRequest = 20,
    BinarySensorStateResponse = 21,
    CoverStateResponse = 22,
    FanStateResponse = 23,
    LightStateResponse = 24,
    SensorStateResponse = 25,
    SwitchStateResponse = 26,
    TextSensorStateResponse = 27,
    SubscribeLogsRequest = 28,
    SubscribeLogsResponse = 29,
    CoverCommandRequest = 30,
    FanCommandRequest = 31,
    LightCommandRequest = 32,
    SwitchCommandRequest = 33,
}

impl MessageType {
    /// Message types that may be exchanged before authentication completes.
    pub fn allowed_before_auth(self) -> bool {
        matches!(
            self,
            MessageType::HelloRequest
                | MessageType::HelloResponse
                | MessageType::ConnectRequest
                | MessageType::ConnectResponse
                | MessageType::DisconnectRequest
                | MessageType::DisconnectResponse
                | MessageType::PingRequest
                | MessageType::PingResponse
        )
    }
}

impl From<MessageType> for u32 {
    fn from(value: MessageType) -> u32 {
        value as u32
    }
}

impl TryFrom<u32> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: u32) -> Result<Self> {
        use MessageType::*;
        Ok(match value {
            1 => HelloRequest,
            2 => HelloResponse,
            3 => ConnectRequest,
            4 => ConnectResponse,
            5 => DisconnectRequest,
            6 => DisconnectResponse,
            7 => PingRequest,
            8 => PingResponse,
            9 => DeviceInfoRequest,
            10 => DeviceInfoResponse,
            11 => ListEntitiesRequest,
            12 => ListEntitiesBinarySensorResponse,
            13 => ListEntitiesCoverResponse,
            14 => ListEntitiesFanResponse,
            15 => ListEntitiesLightResponse,
            16 => ListEntitiesSensorResponse,
            17 => ListEntitiesSwitchResponse,
            18 => ListEntitiesTextSensorResponse,
            19 => ListEntitiesDoneResponse,
            20 => SubscribeStatesRequest,
            21 => BinarySensorStateResponse,
            22 => CoverStateResponse,
            23 => FanStateResponse,
            24 => LightStateResponse,
            25 => SensorStateResponse,
            26 => SwitchStateResponse,
            27 => TextSensorStateResponse,
            28 => SubscribeLogsRequest,
            29 => SubscribeLogsResponse,
            30 => CoverCommandRequest,
            31 => FanCommandRequest,
            32 => LightCommandRequest,
            33 => SwitchCommandRequest,
            other => return Err(ProtocolError::UnexpectedMessage { got: other }),
        })
    }
}

/// Log verbosity for the log-subscription stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(i32)]
pub enum LogLevel {
    None = 0,
    Error = 1,
    Warn = 2,
    #[default]
    Info = 3,
    Config = 4,
    Debug = 5,
    Verbose = 6,
    VeryVerbose = 7,
}

impl TryFrom<i32> for LogLevel {
    type Error = ProtocolError;

    fn try_from(value: i32) -> Result<Self> {
        Ok(match value {
            0 => LogLevel::None,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Config,
            5 => LogLevel::Debug,
            6 => LogLevel::Verbose,
            7 => LogLevel::VeryVerbose,
            other => {
                return Err(ProtocolError::UnexpectedMessage {
                    got: other.max(0) as u32,
                })
            }
        })
    }
}

// ============================================================================
// Session messages
// ============================================================================

#[derive(Clone, PartialEq, prost::Message)]
pub struct HelloRequest {
    #[prost(string, tag = "1")]
    pub client_info: String,
    #[prost(uint32, tag = "2")]
    pub api_version_major: u32,
    #[prost(uint32, tag = "3")]
    pub api_version_minor: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct HelloResponse {
    #[prost(uint32, tag = "1")]
    pub api_version_major: u32,
    #[prost(uint32, tag = "2")]
    pub api_version_minor: u32,
    #[prost(string, tag = "3")]
    pub server_info: String,
    #[prost(string, tag = "4")]
    pub name: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ConnectRequest {
    #[prost(string, tag = "1")]
    pub password: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ConnectResponse {
    #[prost(bool, tag = "1")]
    pub invalid_password: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DisconnectRequest {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DisconnectResponse {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PingRequest {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PingResponse {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DeviceInfoRequest {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DeviceInfoResponse {
    #[prost(bool, tag = "1")]
    pub uses_password: bool,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub mac_address: String,
    #[prost(string, tag = "4")]
    pub esphome_version: String,
    #[prost(string, tag = "5")]
    pub compilation_time: String,
    #[prost(string, tag = "6")]
    pub model: String,
    #[prost(bool, tag = "7")]
    pub has_deep_sleep: bool,
    #[prost(string, tag = "8")]
    pub project_name: String,
    #[prost(string, tag = "9")]
    pub project_version: String,
    #[prost(uint32, tag = "10")]
    pub webserver_port: u32,
    #[prost(uint32, tag = "11")]
    pub legacy_bluetooth_proxy_version: u32,
    #[prost(string, tag = "12")]
    pub manufacturer: String,
    #[prost(string, tag = "13")]
    pub friendly_name: String,
    #[prost(uint32, tag = "14")]
    pub legacy_voice_assistant_version: u32,
    #[prost(uint32, tag = "15")]
    pub bluetooth_proxy_feature_flags: u32,
    #[prost(string, tag = "16")]
    pub suggested_area: String,
    #[prost(uint32, tag = "17")]
    pub voice_assistant_feature_flags: u32,
}

// ============================================================================
// Entity enumeration
// ============================================================================

#[derive(Clone, PartialEq, prost::Message)]
pub struct ListEntitiesRequest {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ListEntitiesBinarySensorResponse {
    #[prost(string, tag = "1")]
    pub object_id: String,
    #[prost(fixed32, tag = "2")]
    pub key: u32,
    #[prost(string, tag = "3")]
    pub name: String,
    #[prost(string, tag = "4")]
    pub unique_id: String,
    #[prost(string, tag = "5")]
    pub device_class: String,
    #[prost(bool, tag = "6")]
    pub is_status_binary_sensor: bool,
    #[prost(bool, tag = "7")]
    pub disabled_by_default: bool,
    #[prost(string, tag = "8")]
    pub icon: String,
    #[prost(int32, tag = "9")]
    pub entity_category: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ListEntitiesCoverResponse {
    #[prost(string, tag = "1")]
    pub object_id: String,
    #[prost(fixed32, tag = "2")]
    pub key: u32,
    #[prost(string, tag = "3")]
    pub name: String,
    #[prost(string, tag = "4")]
    pub unique_id: String,
    #[prost(bool, tag = "5")]
    pub assumed_state: bool,
    #[prost(bool, tag = "6")]
    pub supports_position: bool,
    #[prost(bool, tag = "7")]
    pub supports_tilt: bool,
    #[prost(string, tag = "8")]
    pub device_class: String,
    #[prost(bool, tag = "9")]
    pub disabled_by_default: bool,
    #[prost(string, tag = "10")]
    pub icon: String,
    #[prost(int32, tag = "11")]
    pub entity_category: i32,
    #[prost(bool, tag = "12")]
    pub supports_stop: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ListEntitiesFanResponse {
    #[prost(string, tag = "1")]
    pub object_id: String,
    #[prost(fixed32, tag = "2")]
    pub key: u32,
    #[prost(string, tag = "3")]
    pub name: String,
    #[prost(string, tag = "4")]
    pub unique_id: String,
    #[prost(bool, tag = "5")]
    pub supports_oscillation: bool,
    #[prost(bool, tag = "6")]
    pub supports_speed: bool,
    #[prost(bool, tag = "7")]
    pub supports_direction: bool,
    #[prost(int32, tag = "8")]
    pub supported_speed_count: i32,
    #[prost(bool, tag = "9")]
    pub disabled_by_default: bool,
    #[prost(string, tag = "10")]
    pub icon: String,
    #[prost(int32, tag = "11")]
    pub entity_category: i32,
    #[prost(string, repeated, tag = "12")]
    pub supported_preset_modes: Vec<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ListEntitiesLightResponse {
    #[prost(string, tag = "1")]
    pub object_id: String,
    #[prost(fixed32, tag = "2")]
    pub key: u32,
    #[prost(string, tag = "3")]
    pub name: String,
    #[prost(string, tag = "4")]
    pub unique_id: String,
    #[prost(bool, tag = "5")]
    pub legacy_supports_brightness: bool,
    #[prost(bool, tag = "6")]
    pub legacy_supports_rgb: bool,
    #[prost(bool, tag = "7")]
    pub legacy_supports_white_value: bool,
    #[prost(bool, tag = "8")]
    pub legacy_supports_color_temperature: bool,
    #[prost(float, tag = "9")]
    pub min_mireds: f32,
    #[prost(float, tag = "10")]
    pub max_mireds: f32,
    #[prost(string, repeated, tag = "11")]
    pub effects: Vec<String>,
    #[prost(int32, repeated, tag = "12")]
    pub supported_color_modes: Vec<i32>,
    #[prost(bool, tag = "13")]
    pub disabled_by_default: bool,
    #[prost(string, tag = "14")]
    pub icon: String,
    #[prost(int32, tag = "15")]
    pub entity_category: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ListEntitiesSensorResponse {
    #[prost(string, tag = "1")]
    pub object_id: String,
    #[prost(fixed32, tag = "2")]
    pub key: u32,
    #[prost(string, tag = "3")]
    pub name: String,
    #[prost(string, tag = "4")]
    pub unique_id: String,
    #[prost(string, tag = "5")]
    pub icon: String,
    #[prost(string, tag = "6")]
    pub unit_of_measurement: String,
    #[prost(int32, tag = "7")]
    pub accuracy_decimals: i32,
    #[prost(bool, tag = "8")]
    pub force_update: bool,
    #[prost(string, tag = "9")]
    pub device_class: String,
    #[prost(int32, tag = "10")]
    pub state_class: i32,
    #[prost(int32, tag = "11")]
    pub legacy_last_reset_type: i32,
    #[prost(bool, tag = "12")]
    pub disabled_by_default: bool,
    #[prost(int32, tag = "13")]
    pub entity_category: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ListEntitiesSwitchResponse {
    #[prost(string, tag = "1")]
    pub object_id: String,
    #[prost(fixed32, tag = "2")]
    pub key: u32,
    #[prost(string, tag = "3")]
    pub name: String,
    #[prost(string, tag = "4")]
    pub unique_id: String,
    #[prost(string, tag = "5")]
    pub icon: String,
    #[prost(bool, tag = "6")]
    pub assumed_state: bool,
    #[prost(bool, tag = "7")]
    pub disabled_by_default: bool,
    #[prost(int32, tag = "8")]
    pub entity_category: i32,
    #[prost(string, tag = "9")]
    pub device_class: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ListEntitiesTextSensorResponse {
    #[prost(string, tag = "1")]
    pub object_id: String,
    #[prost(fixed32, tag = "2")]
    pub key: u32,
    #[prost(string, tag = "3")]
    pub name: String,
    #[prost(string, tag = "4")]
    pub unique_id: String,
    #[prost(string, tag = "5")]
    pub icon: String,
    #[prost(bool, tag = "6")]
    pub disabled_by_default: bool,
    #[prost(int32, tag = "7")]
    pub entity_category: i32,
    #[prost(string, tag = "8")]
    pub device_class: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ListEntitiesDoneResponse {}

// ============================================================================
// State subscription
// ============================================================================

#[derive(Clone, PartialEq, prost::Message)]
pub struct SubscribeStatesRequest {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BinarySensorStateResponse {
    #[prost(fixed32, tag = "1")]
    pub key: u32,
    #[prost(bool, tag = "2")]
    pub state: bool,
    #[prost(bool, tag = "3")]
    pub missing_state: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CoverStateResponse {
    #[prost(fixed32, tag = "1")]
    pub key: u32,
    #[prost(int32, tag = "2")]
    pub legacy_state: i32,
    #[prost(float, tag = "3")]
    pub position: f32,
    #[prost(float, tag = "4")]
    pub tilt: f32,
    #[prost(int32, tag = "5")]
    pub current_operation: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FanStateResponse {
    #[prost(fixed32, tag = "1")]
    pub key: u32,
    #[prost(bool, tag = "2")]
    pub state: bool,
    #[prost(bool, tag = "3")]
    pub oscillating: bool,
    #[prost(int32, tag = "4")]
    pub speed: i32,
    #[prost(int32, tag = "5")]
    pub direction: i32,
    #[prost(int32, tag = "6")]
    pub speed_level: i32,
    #[prost(string, tag = "7")]
    pub preset_mode: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct LightStateResponse {
    #[prost(fixed32, tag = "1")]
    pub key: u32,
    #[prost(bool, tag = "2")]
    pub state: bool,
    #[prost(float, tag = "3")]
    pub brightness: f32,
    #[prost(float, tag = "4")]
    pub red: f32,
    #[prost(float, tag = "5")]
    pub green: f32,
    #[prost(float, tag = "6")]
    pub blue: f32,
    #[prost(float, tag = "7")]
    pub white: f32,
    #[prost(float, tag = "8")]
    pub color_temperature: f32,
    #[prost(string, tag = "9")]
    pub effect: String,
    #[prost(float, tag = "10")]
    pub color_brightness: f32,
    #[prost(int32, tag = "11")]
    pub color_mode: i32,
    #[prost(float, tag = "12")]
    pub cold_white: f32,
    #[prost(float, tag = "13")]
    pub warm_white: f32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SensorStateResponse {
    #[prost(fixed32, tag = "1")]
    pub key: u32,
    #[prost(float, tag = "2")]
    pub state: f32,
    #[prost(bool, tag = "3")]
    pub missing_state: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SwitchStateResponse {
    #[prost(fixed32, tag = "1")]
    pub key: u32,
    #[prost(bool, tag = "2")]
    pub state: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct TextSensorStateResponse {
    #[prost(fixed32, tag = "1")]
    pub key: u32,
    #[prost(string, tag = "2")]
    pub state: String,
    #[prost(bool, tag = "3")]
    pub missing_state: bool,
}

// ============================================================================
// Log subscription
// ============================================================================

#[derive(Clone, PartialEq, prost::Message)]
pub struct SubscribeLogsRequest {
    #[prost(int32, tag = "1")]
    pub level: i32,
    #[prost(bool, tag = "2")]
    pub dump_config: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SubscribeLogsResponse {
    #[prost(int32, tag = "1")]
    pub level: i32,
    #[prost(bytes = "vec", tag = "3")]
    pub message: Vec<u8>,
    #[prost(bool, tag = "4")]
    pub send_failed: bool,
}

// ============================================================================
// Commands
// ============================================================================

#[derive(Clone, PartialEq, prost::Message)]
pub struct CoverCommandRequest {
    #[prost(fixed32, tag = "1")]
    pub key: u32,
    #[prost(bool, tag = "2")]
    pub has_legacy_command: bool,
    #[prost(int32, tag = "3")]
    pub legacy_command: i32,
    #[prost(bool, tag = "4")]
    pub has_position: bool,
    #[prost(float, tag = "5")]
    pub position: f32,
    #[prost(bool, tag = "6")]
    pub has_tilt: bool,
    #[prost(float, tag = "7")]
    pub tilt: f32,
    #[prost(bool, tag = "8")]
    pub stop: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FanCommandRequest {
    #[prost(fixed32, tag = "1")]
    pub key: u32,
    #[prost(bool, tag = "2")]
    pub has_state: bool,
    #[prost(bool, tag = "3")]
    pub state: bool,
    #[prost(bool, tag = "4")]
    pub has_speed: bool,
    #[prost(int32, tag = "5")]
    pub speed: i32,
    #[prost(bool, tag = "6")]
    pub has_oscillating: bool,
    #[prost(bool, tag = "7")]
    pub oscillating: bool,
    #[prost(bool, tag = "8")]
    pub has_direction: bool,
    #[prost(int32, tag = "9")]
    pub direction: i32,
    #[prost(bool, tag = "10")]
    pub has_speed_level: bool,
    #[prost(int32, tag = "11")]
    pub speed_level: i32,
    #[prost(bool, tag = "12")]
    pub has_preset_mode: bool,
    #[prost(string, tag = "13")]
    pub preset_mode: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct LightCommandRequest {
    #[prost(fixed32, tag = "1")]
    pub key: u32,
    #[prost(bool, tag = "2")]
    pub has_state: bool,
    #[prost(bool, tag = "3")]
    pub state: bool,
    #[prost(bool, tag = "4")]
    pub has_brightness: bool,
    #[prost(float, tag = "5")]
    pub brightness: f32,
    #[prost(bool, tag = "6")]
    pub has_rgb: bool,
    #[prost(float, tag = "7")]
    pub red: f32,
    #[prost(float, tag = "8")]
    pub green: f32,
    #[prost(float, tag = "9")]
    pub blue: f32,
    #[prost(bool, tag = "10")]
    pub has_white: bool,
    #[prost(float, tag = "11")]
    pub white: f32,
    #[prost(bool, tag = "12")]
    pub has_color_temperature: bool,
    #[prost(float, tag = "13")]
    pub color_temperature: f32,
    #[prost(bool, tag = "14")]
    pub has_transition_length: bool,
    #[prost(uint32, tag = "15")]
    pub transition_length: u32,
    #[prost(bool, tag = "16")]
    pub has_flash_length: bool,
    #[prost(uint32, tag = "17")]
    pub flash_length: u32,
    #[prost(bool, tag = "18")]
    pub has_effect: bool,
    #[prost(string, tag = "19")]
    pub effect: String,
    #[prost(bool, tag = "20")]
    pub has_color_brightness: bool,
    #[prost(float, tag = "21")]
    pub color_brightness: f32,
    #[prost(bool, tag = "22")]
    pub has_color_mode: bool,
    #[prost(int32, tag = "23")]
    pub color_mode: i32,
    #[prost(bool, tag = "24")]
    pub has_cold_white: bool,
    #[prost(float, tag = "25")]
    pub cold_white: f32,
    #[prost(bool, tag = "26")]
    pub has_warm_white: bool,
    #[prost(float, tag = "27")]
    pub warm_white: f32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SwitchCommandRequest {
    #[prost(fixed32, tag = "1")]
    pub key: u32,
    #[prost(bool, tag = "2")]
    pub state: bool,
}

// ============================================================================
// The type table
// ============================================================================

/// One decoded application message of any well-known type.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiMessage {
    HelloRequest(HelloRequest),
    HelloResponse(HelloResponse),
    ConnectRequest(ConnectRequest),
    ConnectResponse(ConnectResponse),
    DisconnectRequest(DisconnectRequest),
    DisconnectResponse(DisconnectResponse),
    PingRequest(PingRequest),
    PingResponse(PingResponse),
    DeviceInfoRequest(DeviceInfoRequest),
    DeviceInfoResponse(DeviceInfoResponse),
    ListEntitiesRequest(ListEntitiesRequest),
    ListEntitiesBinarySensorResponse(ListEntitiesBinarySensorResponse),
    ListEntitiesCoverResponse(ListEntitiesCoverResponse),
    ListEntitiesFanResponse(ListEntitiesFanResponse),
    ListEntitiesLightResponse(ListEntitiesLightResponse),
    ListEntitiesSensorResponse(ListEntitiesSensorResponse),
    ListEntitiesSwitchResponse(ListEntitiesSwitchResponse),
    ListEntitiesTextSensorResponse(ListEntitiesTextSensorResponse),
    ListEntitiesDoneResponse(ListEntitiesDoneResponse),
    SubscribeStatesRequest(SubscribeStatesRequest),
    BinarySensorStateResponse(BinarySensorStateResponse),
    CoverStateResponse(CoverStateResponse),
    FanStateResponse(FanStateResponse),
    LightStateResponse(LightStateResponse),
    SensorStateResponse(SensorStateResponse),
    SwitchStateResponse(SwitchStateResponse),
    TextSensorStateResponse(TextSensorStateResponse),
    SubscribeLogsRequest(SubscribeLogsRequest),
    SubscribeLogsResponse(SubscribeLogsResponse),
    CoverCommandRequest(CoverCommandRequest),
    FanCommandRequest(FanCommandRequest),
    LightCommandRequest(LightCommandRequest),
    SwitchCommandRequest(SwitchCommandRequest),
}

macro_rules! for_each_message {
    ($self:expr, $m:ident => $body:expr) => {
        match $self {
            ApiMessage::HelloRequest($m) => $body,
            ApiMessage::HelloResponse($m) => $body,
            ApiMessage::ConnectRequest($m) => $body,
            ApiMessage::ConnectResponse($m) => $body,
            ApiMessage::DisconnectRequest($m) => $body,
            ApiMessage::DisconnectResponse($m) => $body,
            ApiMessage::PingRequest($m) => $body,
            ApiMessage::PingResponse($m) => $body,
            ApiMessage::DeviceInfoRequest($m) => $body,
            ApiMessage::DeviceInfoResponse($m) => $body,
            ApiMessage::ListEntitiesRequest($m) => $body,
            ApiMessage::ListEntitiesBinarySensorResponse($m) => $body,
            ApiMessage::ListEntitiesCoverResponse($m) => $body,
            ApiMessage::ListEntitiesFanResponse($m) => $body,
            ApiMessage::ListEntitiesLightResponse($m) => $body,
            ApiMessage::ListEntitiesSensorResponse($m) => $body,
            ApiMessage::ListEntitiesSwitchResponse($m) => $body,
            ApiMessage::ListEntitiesTextSensorResponse($m) => $body,
            ApiMessage::ListEntitiesDoneResponse($m) => $body,
            ApiMessage::SubscribeStatesRequest($m) => $body,
            ApiMessage::BinarySensorStateResponse($m) => $body,
            ApiMessage::CoverStateResponse($m) => $body,
            ApiMessage::FanStateResponse($m) => $body,
            ApiMessage::LightStateResponse($m) => $body,
            ApiMessage::SensorStateResponse($m) => $body,
            ApiMessage::SwitchStateResponse($m) => $body,
            ApiMessage::TextSensorStateResponse($m) => $body,
            ApiMessage::SubscribeLogsRequest($m) => $body,
            ApiMessage::SubscribeLogsResponse($m) => $body,
            ApiMessage::CoverCommandRequest($m) => $body,
            ApiMessage::FanCommandRequest($m) => $body,
            ApiMessage::LightCommandRequest($m) => $body,
            ApiMessage::SwitchCommandRequest($m) => $body,
        }
    };
}

impl ApiMessage {
    /// The wire identifier of this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            ApiMessage::HelloRequest(_) => MessageType::HelloRequest,
            ApiMessage::HelloResponse(_) => MessageType::HelloResponse,
            ApiMessage::ConnectRequest(_) => MessageType::ConnectRequest,
            ApiMessage::ConnectResponse(_) => MessageType::ConnectResponse,
            ApiMessage::DisconnectRequest(_) => MessageType::DisconnectRequest,
            ApiMessage::DisconnectResponse(_) => MessageType::DisconnectResponse,
            ApiMessage::PingRequest(_) => MessageType::PingRequest,
            ApiMessage::PingResponse(_) => MessageType::PingResponse,
            ApiMessage::DeviceInfoRequest(_) => MessageType::DeviceInfoRequest,
            ApiMessage::DeviceInfoResponse(_) => MessageType::DeviceInfoResponse,
            ApiMessage::ListEntitiesRequest(_) => MessageType::ListEntitiesRequest,
            ApiMessage::ListEntitiesBinarySensorResponse(_) => {
                MessageType::ListEntitiesBinarySensorResponse
            }
            ApiMessage::ListEntitiesCoverResponse(_) => MessageType::ListEntitiesCoverResponse,
            ApiMessage::ListEntitiesFanResponse(_) => MessageType::ListEntitiesFanResponse,
            ApiMessage::ListEntitiesLightResponse(_) => MessageType::ListEntitiesLightResponse,
            ApiMessage::ListEntitiesSensorResponse(_) => MessageType::ListEntitiesSensorResponse,
            ApiMessage::ListEntitiesSwitchResponse(_) => MessageType::ListEntitiesSwitchResponse,
            ApiMessage::ListEntitiesTextSensorResponse(_) => {
                MessageType::ListEntitiesTextSensorResponse
            }
            ApiMessage::ListEntitiesDoneResponse(_) => MessageType::ListEntitiesDoneResponse,
            ApiMessage::SubscribeStatesRequest(_) => MessageType::SubscribeStatesRequest,
            ApiMessage::BinarySensorStateResponse(_) => MessageType::BinarySensorStateResponse,
            ApiMessage::CoverStateResponse(_) => MessageType::CoverStateResponse,
            ApiMessage::FanStateResponse(_) => MessageType::FanStateResponse,
            ApiMessage::LightStateResponse(_) => MessageType::LightStateResponse,
            ApiMessage::SensorStateResponse(_) => MessageType::SensorStateResponse,
            ApiMessage::SwitchStateResponse(_) => MessageType::SwitchStateResponse,
            ApiMessage::TextSensorStateResponse(_) => MessageType::TextSensorStateResponse,
            ApiMessage::SubscribeLogsRequest(_) => MessageType::SubscribeLogsRequest,
            ApiMessage::SubscribeLogsResponse(_) => MessageType::SubscribeLogsResponse,
            ApiMessage::CoverCommandRequest(_) => MessageType::CoverCommandRequest,
            ApiMessage::FanCommandRequest(_) => MessageType::FanCommandRequest,
            ApiMessage::LightCommandRequest(_) => MessageType::LightCommandRequest,
            ApiMessage::SwitchCommandRequest(_) => MessageType::SwitchCommandRequest,
        }
    }

    /// Encode the message payload (without framing).
    pub fn encode(&self) -> Vec<u8> {
        for_each_message!(self, m => m.encode_to_vec())
    }

    /// Decode a payload by wire identifier.
    ///
    /// Returns `Ok(None)` for identifiers outside the well-known table so
    /// the router can log and drop them.
    pub fn decode(msg_type: u32, payload: &[u8]) -> Result<Option<ApiMessage>> {
        let Ok(kind) = MessageType::try_from(msg_type) else {
            return Ok(None);
        };
        use MessageType as T;
        let msg = match kind {
            T::HelloRequest => ApiMessage::HelloRequest(HelloRequest::decode(payload)?),
            T::HelloResponse => ApiMessage::HelloResponse(HelloResponse::decode(payload)?),
            T::ConnectRequest => ApiMessage::ConnectRequest(ConnectRequest::decode(payload)?),
            T::ConnectResponse => ApiMessage::ConnectResponse(ConnectResponse::decode(payload)?),
            T::DisconnectRequest => {
                ApiMessage::DisconnectRequest(DisconnectRequest::decode(payload)?)
            }
            T::DisconnectResponse => {
                ApiMessage::DisconnectResponse(DisconnectResponse::decode(payload)?)
            }
            T::PingRequest => ApiMessage::PingRequest(PingRequest::decode(payload)?),
            T::PingResponse => ApiMessage::PingResponse(PingResponse::decode(payload)?),
            T::DeviceInfoRequest => {
                ApiMessage::DeviceInfoRequest(DeviceInfoRequest::decode(payload)?)
            }
            T::DeviceInfoResponse => {
                ApiMessage::DeviceInfoResponse(DeviceInfoResponse::decode(payload)?)
            }
            T::ListEntitiesRequest => {
                ApiMessage::ListEntitiesRequest(ListEntitiesRequest::decode(payload)?)
            }
            T::ListEntitiesBinarySensorResponse => ApiMessage::ListEntitiesBinarySensorResponse(
                ListEntitiesBinarySensorResponse::decode(payload)?,
            ),
            T::ListEntitiesCoverResponse => {
                ApiMessage::ListEntitiesCoverResponse(ListEntitiesCoverResponse::decode(payload)?)
            }
            T::ListEntitiesFanResponse => {
                ApiMessage::ListEntitiesFanResponse(ListEntitiesFanResponse::decode(payload)?)
            }
            T::ListEntitiesLightResponse => {
                ApiMessage::ListEntitiesLightResponse(ListEntitiesLightResponse::decode(payload)?)
            }
            T::ListEntitiesSensorResponse => {
                ApiMessage::ListEntitiesSensorResponse(ListEntitiesSensorResponse::decode(payload)?)
            }
            T::ListEntitiesSwitchResponse => {
                ApiMessage::ListEntitiesSwitchResponse(ListEntitiesSwitchResponse::decode(payload)?)
            }
            T::ListEntitiesTextSensorResponse => ApiMessage::ListEntitiesTextSensorResponse(
                ListEntitiesTextSensorResponse::decode(payload)?,
            ),
            T::ListEntitiesDoneResponse => {
                ApiMessage::ListEntitiesDoneResponse(ListEntitiesDoneResponse::decode(payload)?)
            }
            T::SubscribeStatesRequest => {
                ApiMessage::SubscribeStatesRequest(SubscribeStatesRequest::decode(payload)?)
            }
            T::BinarySensorStateResponse => {
                ApiMessage::BinarySensorStateResponse(BinarySensorStateResponse::decode(payload)?)
            }
            T::CoverStateResponse => {
                ApiMessage::CoverStateResponse(CoverStateResponse::decode(payload)?)
            }
            T::FanStateResponse => ApiMessage::FanStateResponse(FanStateResponse::decode(payload)?),
            T::LightStateResponse => {
                ApiMessage::LightStateResponse(LightStateResponse::decode(payload)?)
            }
            T::SensorStateResponse => {
                ApiMessage::SensorStateResponse(SensorStateResponse::decode(payload)?)
            }
            T::SwitchStateResponse => {
                ApiMessage::SwitchStateResponse(SwitchStateResponse::decode(payload)?)
            }
            T::TextSensorStateResponse => {
                ApiMessage::TextSensorStateResponse(TextSensorStateResponse::decode(payload)?)
            }
            T::SubscribeLogsRequest => {
                ApiMessage::SubscribeLogsRequest(SubscribeLogsRequest::decode(payload)?)
            }
            T::SubscribeLogsResponse => {
                ApiMessage::SubscribeLogsResponse(SubscribeLogsResponse::decode(payload)?)
            }
            T::CoverCommandRequest => {
                ApiMessage::CoverCommandRequest(CoverCommandRequest::decode(payload)?)
            }
            T::FanCommandRequest => {
                ApiMessage::FanCommandRequest(FanCommandRequest::decode(payload)?)
            }
            T::LightCommandRequest => {
                ApiMessage::LightCommandRequest(LightCommandRequest::decode(payload)?)
            }
            T::SwitchCommandRequest => {
                ApiMessage::SwitchCommandRequest(SwitchCommandRequest::decode(payload)?)
            }
        };
        Ok(Some(msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_conversions() {
        for id in 1u32..=33 {
            let kind = MessageType::try_from(id).unwrap();
            assert_eq!(u32::from(kind), id);
        }
        assert!(MessageType::try_from(0).is_err());
        assert!(MessageType::try_from(34).is_err());
    }

    #[test]
    fn test_allowed_before_auth() {
        assert!(MessageType::HelloRequest.allowed_before_auth());
        assert!(MessageType::ConnectRequest.allowed_before_auth());
        assert!(MessageType::PingResponse.allowed_before_auth());
        assert!(MessageType::DisconnectRequest.allowed_before_auth());
        assert!(!MessageType::DeviceInfoRequest.allowed_before_auth());
        assert!(!MessageType::SubscribeStatesRequest.allowed_before_auth());
        assert!(!MessageType::SwitchCommandRequest.allowed_before_auth());
    }

    #[test]
    fn test_log_level_conversions() {
        assert_eq!(LogLevel::try_from(0).unwrap(), LogLevel::None);
        assert_eq!(LogLevel::try_from(5).unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::try_from(7).unwrap(), LogLevel::VeryVerbose);
        assert!(LogLevel::try_from(8).is_err());
        assert!(LogLevel::try_from(-1).is_err());
    }

    #[test]
    fn test_hello_roundtrip_via_table() {
        let msg = ApiMessage::HelloRequest(HelloRequest {
            client_info: "test client".into(),
            api_version_major: API_VERSION_MAJOR,
            api_version_minor: API_VERSION_MINOR,
        });
        let payload = msg.encode();
        let decoded = ApiMessage::decode(msg.message_type().into(), &payload)
            .unwrap()
            .unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_empty_message_encodes_to_nothing() {
        let msg = ApiMessage::PingRequest(PingRequest::default());
        assert!(msg.encode().is_empty());
        let decoded = ApiMessage::decode(7, &[]).unwrap().unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_device_info_roundtrip() {
        let msg = ApiMessage::DeviceInfoResponse(DeviceInfoResponse {
            uses_password: true,
            name: "bedroom".into(),
            mac_address: "AA:BB:CC:DD:EE:FF".into(),
            esphome_version: "2024.6.0".into(),
            compilation_time: "Jun  1 2024, 12:00:00".into(),
            model: "esp32dev".into(),
            has_deep_sleep: true,
            friendly_name: "Bedroom Node".into(),
            suggested_area: "bedroom".into(),
            ..Default::default()
        });
        let decoded = ApiMessage::decode(10, &msg.encode()).unwrap().unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_entity_key_is_fixed32() {
        let msg = ListEntitiesSwitchResponse {
            key: 0x0102_0304,
            ..Default::default()
        };
        let bytes = msg.encode_to_vec();
        // field 2, wire type 5 (32-bit) then the key little-endian
        assert!(bytes
            .windows(5)
            .any(|w| w == [0x15, 0x04, 0x03, 0x02, 0x01]));
    }

    #[test]
    fn test_state_roundtrips() {
        let samples = [
            ApiMessage::BinarySensorStateResponse(BinarySensorStateResponse {
                key: 1,
                state: true,
                missing_state: false,
            }),
            ApiMessage::SensorStateResponse(SensorStateResponse {
                key: 2,
                state: 21.5,
                missing_state: false,
            }),
            ApiMessage::TextSensorStateResponse(TextSensorStateResponse {
                key: 3,
                state: "ok".into(),
                missing_state: false,
            }),
            ApiMessage::FanStateResponse(FanStateResponse {
                key: 4,
                state: true,
                oscillating: true,
                speed_level: 3,
                ..Default::default()
            }),
        ];
        for msg in samples {
            let decoded = ApiMessage::decode(msg.message_type().into(), &msg.encode())
                .unwrap()
                .unwrap();
            assert_eq!(decoded, msg);
        }
    }

    #[test]
    fn test_unknown_type_is_none() {
        assert!(ApiMessage::decode(90, &[0x08, 0x01]).unwrap().is_none());
    }

    #[test]
    fn test_truncated_payload_is_decode_error() {
        // A string field header promising 10 bytes with none following.
        let err = ApiMessage::decode(2, &[0x1a, 0x0a]).unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[test]
    fn test_light_command_has_flags() {
        let cmd = LightCommandRequest {
            key: 9,
            has_state: true,
            state: true,
            has_brightness: true,
            brightness: 0.5,
            ..Default::default()
        };
        let decoded = match ApiMessage::decode(32, &cmd.encode_to_vec()).unwrap().unwrap() {
            ApiMessage::LightCommandRequest(c) => c,
            other => panic!("wrong variant: {other:?}"),
        };
        assert!(decoded.has_state && decoded.state);
        assert!(decoded.has_brightness);
        assert!(!decoded.has_effect);
    }
}
