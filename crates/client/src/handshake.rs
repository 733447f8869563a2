//! Handshake and authentication driver.
//!
//! Runs once on every fresh socket: hello exchange, optional password
//! authentication, device-info fetch, deep-sleep propagation. Each step is
//! bounded at five seconds and the whole sequence at ten; any failure
//! closes the connection and surfaces from the caller's `connect()`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use esphome_proto::messages::{
    ApiMessage, ConnectRequest, DeviceInfoRequest, DeviceInfoResponse, HelloRequest, MessageType,
    API_VERSION_MAJOR, API_VERSION_MINOR,
};
use esphome_proto::ProtocolError;
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::connection::Connection;
use crate::error::ApiError;
use crate::pending::PendingWaiters;

/// Budget for each handshake step.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Budget for the whole handshake sequence.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Attributes reported by the device during the handshake.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceInfo {
    pub name: String,
    pub friendly_name: String,
    pub mac_address: String,
    pub model: String,
    pub manufacturer: String,
    pub esphome_version: String,
    pub compilation_time: String,
    pub suggested_area: String,
    pub uses_password: bool,
    pub has_deep_sleep: bool,
    pub project_name: String,
    pub project_version: String,
    pub webserver_port: u32,
    pub bluetooth_proxy_feature_flags: u32,
    pub voice_assistant_feature_flags: u32,
}

impl From<DeviceInfoResponse> for DeviceInfo {
    fn from(m: DeviceInfoResponse) -> Self {
        Self {
            name: m.name,
            friendly_name: m.friendly_name,
            mac_address: m.mac_address,
            model: m.model,
            manufacturer: m.manufacturer,
            esphome_version: m.esphome_version,
            compilation_time: m.compilation_time,
            suggested_area: m.suggested_area,
            uses_password: m.uses_password,
            has_deep_sleep: m.has_deep_sleep,
            project_name: m.project_name,
            project_version: m.project_version,
            webserver_port: m.webserver_port,
            bluetooth_proxy_feature_flags: m.bluetooth_proxy_feature_flags,
            voice_assistant_feature_flags: m.voice_assistant_feature_flags,
        }
    }
}

/// Run the full handshake on the current socket.
///
/// `guard` prevents concurrent attempts: a second call while one is in
/// flight fails with [`ApiError::AuthenticationInProgress`]. On failure
/// the connection is closed (orderly, so no auto-reconnect fires) before
/// the error is returned.
pub(crate) async fn authenticate(
    connection: &Connection,
    pending: &Arc<PendingWaiters>,
    config: &ConnectionConfig,
    guard: &AtomicBool,
) -> Result<DeviceInfo, ApiError> {
    if guard.swap(true, Ordering::SeqCst) {
        return Err(ApiError::AuthenticationInProgress);
    }

    let result = match tokio::time::timeout(
        HANDSHAKE_TIMEOUT,
        run_sequence(connection, pending, config),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(ApiError::Timeout {
            operation: "handshake",
            budget: HANDSHAKE_TIMEOUT,
        }),
    };
    guard.store(false, Ordering::SeqCst);

    if let Err(ref e) = result {
        debug!(error = %e, "handshake failed, closing connection");
        connection.disconnect().await;
    }
    result
}

async fn run_sequence(
    connection: &Connection,
    pending: &Arc<PendingWaiters>,
    config: &ConnectionConfig,
) -> Result<DeviceInfo, ApiError> {
    // Step 1: hello.
    let hello = ApiMessage::HelloRequest(HelloRequest {
        client_info: config.client_info.clone(),
        api_version_major: API_VERSION_MAJOR,
        api_version_minor: API_VERSION_MINOR,
    });
    let reply = request(connection, pending, hello, MessageType::HelloResponse, "hello").await?;
    let ApiMessage::HelloResponse(hello) = reply else {
        return Err(ProtocolError::UnexpectedMessage {
            got: reply.message_type().into(),
        }
        .into());
    };
    if hello.api_version_major != API_VERSION_MAJOR {
        return Err(ApiError::ProtocolVersionMismatch {
            client_major: API_VERSION_MAJOR,
            device_major: hello.api_version_major,
            device_minor: hello.api_version_minor,
        });
    }
    debug!(
        api_major = hello.api_version_major,
        api_minor = hello.api_version_minor,
        server_info = %hello.server_info,
        "hello complete"
    );
    connection
        .set_api_version(hello.api_version_major, hello.api_version_minor)
        .await;
    connection.set_server_info(hello.server_info).await;

    // Step 2/3: authenticate.
    if let Some(password) = &config.password {
        let connect = ApiMessage::ConnectRequest(ConnectRequest {
            password: password.clone(),
        });
        let reply = request(
            connection,
            pending,
            connect,
            MessageType::ConnectResponse,
            "authenticate",
        )
        .await?;
        let ApiMessage::ConnectResponse(response) = reply else {
            return Err(ProtocolError::UnexpectedMessage {
                got: reply.message_type().into(),
            }
            .into());
        };
        if response.invalid_password {
            return Err(ApiError::InvalidPassword {
                host: config.host.clone(),
            });
        }
    }
    connection.set_authenticated(true).await;

    // Step 4: device info.
    let reply = request(
        connection,
        pending,
        ApiMessage::DeviceInfoRequest(DeviceInfoRequest::default()),
        MessageType::DeviceInfoResponse,
        "device info",
    )
    .await?;
    let ApiMessage::DeviceInfoResponse(response) = reply else {
        return Err(ProtocolError::UnexpectedMessage {
            got: reply.message_type().into(),
        }
        .into());
    };
    let device = DeviceInfo::from(response);

    // Step 5: deep-sleep devices own the connection cadence.
    if device.has_deep_sleep {
        connection.set_deep_sleep_mode(true);
    }

    info!(
        name = %device.name,
        model = %device.model,
        esphome_version = %device.esphome_version,
        deep_sleep = device.has_deep_sleep,
        "authenticated"
    );
    Ok(device)
}

/// Register the waiter, send the request, await the reply.
async fn request(
    connection: &Connection,
    pending: &Arc<PendingWaiters>,
    msg: ApiMessage,
    expected: MessageType,
    operation: &'static str,
) -> Result<ApiMessage, ApiError> {
    let reply = pending.register(expected);
    connection.send_message(&msg).await?;
    reply.wait(STEP_TIMEOUT, operation).await
}
