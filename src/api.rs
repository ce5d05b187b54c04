//! Host-facing API functions.
//!
//! These functions communicate with the control task through the static
//! request/response channel pair and are designed to be called from
//! application code. They are generic over the application architecture:
//! a host binding layer, a CLI, a test harness.
//!
//! Calls complete when the control task has processed the request; for
//! [`set_active_source`]/[`set_active_sink`] with an empty address and for
//! role cleanup this includes waiting (bounded) for the audio session
//! shutdown, so the response doubles as the ready signal.

use heapless::Vec;

use crate::address::PeerAddress;
use crate::av::{AvError, Role};
use crate::constants::MAX_CODEC_PREFERENCES;
use crate::service::ServiceSnapshot;
use crate::session::{AudioFocusState, CodecPreference};
use crate::{ApiRequest, ApiResponse, API_REQUEST_CHANNEL, API_RESPONSE_CHANNEL};

async fn roundtrip(request: ApiRequest) -> Result<(), AvError> {
    let sender = API_REQUEST_CHANNEL.sender();
    let receiver = API_RESPONSE_CHANNEL.receiver();

    sender.send(request).await;

    match receiver.receive().await {
        ApiResponse::Done => Ok(()),
        ApiResponse::Error(e) => Err(e),
        ApiResponse::Snapshot(_) => Err(AvError::UnexpectedResponse),
    }
}

fn preferences_vec(
    preferences: &[CodecPreference],
) -> Result<Vec<CodecPreference, MAX_CODEC_PREFERENCES>, AvError> {
    Vec::from_slice(preferences).map_err(|()| AvError::InvalidParam)
}

/// Initialise the Source role.
///
/// # Errors
///
/// Returns an `AvError` if:
/// - More preferences are passed than fit the API (`InvalidParam`)
/// - The audio path refuses to come up (`InitFailed`)
pub async fn init_source(
    max_connected_peers: usize,
    codec_priorities: &[CodecPreference],
    offload_capabilities: &[CodecPreference],
) -> Result<(), AvError> {
    roundtrip(ApiRequest::InitSource {
        max_connected_peers,
        codec_priorities: preferences_vec(codec_priorities)?,
        offload_capabilities: preferences_vec(offload_capabilities)?,
    })
    .await
}

/// Initialise the Sink role.
///
/// # Errors
///
/// Returns `AvError::InitFailed` if the audio path refuses to come up.
pub async fn init_sink(max_connected_peers: usize) -> Result<(), AvError> {
    roundtrip(ApiRequest::InitSink {
        max_connected_peers,
    })
    .await
}

/// Tear down the Source role; completes once the audio session shut down
/// (bounded wait) and every peer is destroyed.
///
/// # Errors
///
/// Currently infallible; the `Result` mirrors the other API calls.
pub async fn cleanup_source() -> Result<(), AvError> {
    roundtrip(ApiRequest::CleanupSource).await
}

/// Tear down the Sink role.
///
/// # Errors
///
/// Currently infallible; the `Result` mirrors the other API calls.
pub async fn cleanup_sink() -> Result<(), AvError> {
    roundtrip(ApiRequest::CleanupSink).await
}

/// Connect to a peer on whichever role is enabled.
///
/// # Errors
///
/// Returns `AvError::NotReady` when neither role is initialised.
pub async fn connect(address: PeerAddress) -> Result<(), AvError> {
    roundtrip(ApiRequest::Connect(address)).await
}

/// Disconnect a peer.
///
/// # Errors
///
/// Returns `AvError::NotReady` when neither role is initialised.
pub async fn disconnect(address: PeerAddress) -> Result<(), AvError> {
    roundtrip(ApiRequest::Disconnect(address)).await
}

/// Select the active remote Sink peer of the local Source role; an empty
/// address clears it and shuts the audio session down. Waits for the
/// active-peer swap to complete.
///
/// # Errors
///
/// Returns an `AvError` if:
/// - The Source role is not initialised (`NotReady`)
/// - The peer is absent or not connected (`NotConnected`)
/// - The audio session could not be moved (`SessionRestartFailed`)
pub async fn set_active_sink(address: PeerAddress) -> Result<(), AvError> {
    roundtrip(ApiRequest::SetActivePeer {
        role: Role::Source,
        address,
    })
    .await
}

/// Select the active remote Source peer of the local Sink role.
///
/// # Errors
///
/// Same contract as [`set_active_sink`], for the Sink role.
pub async fn set_active_source(address: PeerAddress) -> Result<(), AvError> {
    roundtrip(ApiRequest::SetActivePeer {
        role: Role::Sink,
        address,
    })
    .await
}

/// Toggle silence mode on a connected Source-role peer.
///
/// # Errors
///
/// Returns an `AvError` if:
/// - The Source role is not initialised (`NotReady`)
/// - The address is empty (`InvalidParam`)
/// - The peer is absent (`PeerNotFound`) or not connected (`NotConnected`)
pub async fn set_silence(address: PeerAddress, silence: bool) -> Result<(), AvError> {
    roundtrip(ApiRequest::SetSilence { address, silence }).await
}

/// Apply new codec preferences to a peer; the running session is ended
/// first when the peer is the active one. Waits for the update to be
/// handed to the audio path.
///
/// # Errors
///
/// Returns an `AvError` if:
/// - The Source role is not initialised (`NotReady`)
/// - The address is empty or the preference list too long (`InvalidParam`)
pub async fn configure_codec(
    address: PeerAddress,
    preferences: &[CodecPreference],
) -> Result<(), AvError> {
    roundtrip(ApiRequest::ConfigureCodec {
        address,
        preferences: preferences_vec(preferences)?,
    })
    .await
}

/// Start streaming on the active peer.
///
/// # Errors
///
/// Currently infallible; failures surface as audio-state notifications.
pub async fn stream_start() -> Result<(), AvError> {
    roundtrip(ApiRequest::StartStream {
        use_latency_mode: None,
    })
    .await
}

/// Start streaming on the active peer with an explicit latency mode.
///
/// # Errors
///
/// Currently infallible; failures surface as audio-state notifications.
pub async fn stream_start_with_latency(use_latency_mode: bool) -> Result<(), AvError> {
    roundtrip(ApiRequest::StartStream {
        use_latency_mode: Some(use_latency_mode),
    })
    .await
}

/// Stop streaming. An empty address stops every started peer.
///
/// # Errors
///
/// Currently infallible; failures surface as audio-state notifications.
pub async fn stream_stop(address: PeerAddress) -> Result<(), AvError> {
    roundtrip(ApiRequest::StopStream { address }).await
}

/// Suspend streaming on every started peer.
///
/// # Errors
///
/// Currently infallible; failures surface as audio-state notifications.
pub async fn stream_suspend() -> Result<(), AvError> {
    roundtrip(ApiRequest::SuspendStream).await
}

/// Start the hardware offload path on the active peer.
///
/// # Errors
///
/// Currently infallible; the outcome arrives through the audio session's
/// offload acknowledgement.
pub async fn stream_start_offload() -> Result<(), AvError> {
    roundtrip(ApiRequest::StartOffload).await
}

/// Toggle low-latency mode on the active peer.
///
/// # Errors
///
/// Currently infallible.
pub async fn set_low_latency(low_latency: bool) -> Result<(), AvError> {
    roundtrip(ApiRequest::SetLowLatency(low_latency)).await
}

/// Record a peer's delay report (1/10 ms units) and forward it to the
/// audio path when the peer is the active remote Sink.
///
/// # Errors
///
/// Currently infallible.
pub async fn set_audio_delay(address: PeerAddress, delay_tenths_ms: u16) -> Result<(), AvError> {
    roundtrip(ApiRequest::SetAudioDelay {
        address,
        delay_tenths_ms,
    })
    .await
}

/// Forward the host's audio focus decision to the Sink decoder path.
///
/// # Errors
///
/// Currently infallible.
pub async fn set_audio_focus_state(state: AudioFocusState) -> Result<(), AvError> {
    roundtrip(ApiRequest::SetAudioFocusState(state)).await
}

/// Forward the host's track gain (used for ducking) to the Sink path.
///
/// # Errors
///
/// Currently infallible.
pub async fn set_audio_track_gain(gain: f32) -> Result<(), AvError> {
    roundtrip(ApiRequest::SetAudioTrackGain(gain)).await
}

/// Resize the dynamic audio buffer used by the encoder path.
///
/// # Errors
///
/// Currently infallible.
pub async fn set_dynamic_audio_buffer_size(size: u8) -> Result<(), AvError> {
    roundtrip(ApiRequest::SetDynamicAudioBufferSize(size)).await
}

/// Fetch a diagnostic snapshot of both roles.
///
/// # Errors
///
/// Returns `AvError::UnexpectedResponse` if the control task replied out
/// of order.
pub async fn snapshot() -> Result<ServiceSnapshot, AvError> {
    let sender = API_REQUEST_CHANNEL.sender();
    let receiver = API_RESPONSE_CHANNEL.receiver();

    sender.send(ApiRequest::Snapshot).await;

    match receiver.receive().await {
        ApiResponse::Snapshot(snapshot) => Ok(snapshot),
        ApiResponse::Error(e) => Err(e),
        ApiResponse::Done => Err(AvError::UnexpectedResponse),
    }
}
