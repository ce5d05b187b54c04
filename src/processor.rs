//! The control task and the producer-side entry points.
//!
//! One task owns the [`AvService`] and with it every peer and registry
//! mutation. It waits on the API request channel, the inbound transport
//! channel, the media frame channel and the earliest armed peer timer, and
//! processes whichever becomes ready. Producers on other execution contexts
//! only ever touch the static channels.

use embassy_futures::select::{select4, Either4};
use embassy_time::{with_timeout, Timer};

use crate::address::PeerAddress;
use crate::av::{AvError, Role};
use crate::callbacks::HostCallbacks;
use crate::constants::AUDIO_SHUTDOWN_TIMEOUT;
use crate::rc::RcController;
use crate::service::AvService;
use crate::session::{self, AudioSessionHooks, MediaFrame, SESSION_SHUTDOWN};
use crate::transport::{Transport, TransportEvent};
use crate::{
    ApiRequest, ApiResponse, Inbound, API_REQUEST_CHANNEL, API_RESPONSE_CHANNEL, INBOUND_CHANNEL,
    MEDIA_FRAME_CHANNEL,
};

/// Post one transport event to the control task, waiting for channel space.
///
/// The event is an owned deep copy; the caller may reuse its buffers as
/// soon as this returns.
pub async fn post_transport_event(remote_endpoint: Role, event: TransportEvent) {
    INBOUND_CHANNEL
        .send(Inbound::Transport {
            remote_endpoint,
            event,
        })
        .await;
}

/// Post one transport event without waiting.
///
/// # Errors
/// [`AvError::QueueFull`] when the inbound channel has no space.
pub fn try_post_transport_event(
    remote_endpoint: Role,
    event: TransportEvent,
) -> Result<(), AvError> {
    INBOUND_CHANNEL
        .try_send(Inbound::Transport {
            remote_endpoint,
            event,
        })
        .map_err(|_| AvError::QueueFull)
}

/// Post audio configuration discovered on the Sink media path.
///
/// # Errors
/// [`AvError::QueueFull`] when the inbound channel has no space.
pub fn post_sink_media_config(
    address: PeerAddress,
    sample_rate: u32,
    channel_count: u8,
) -> Result<(), AvError> {
    INBOUND_CHANNEL
        .try_send(Inbound::SinkConfig {
            address,
            sample_rate,
            channel_count,
        })
        .map_err(|_| AvError::QueueFull)
}

/// Post one decoded media frame from the data plane.
///
/// The data plane never blocks: the frame is dropped when the gate
/// published by the control task says the peer is not the active streaming
/// Sink peer, or when the frame channel is full. The control task re-checks
/// the peer state authoritatively before the frame reaches the session
/// queue.
///
/// # Errors
/// [`AvError::NotReady`] when the frame was pre-dropped by the gate,
/// [`AvError::QueueFull`] when the frame channel has no space.
pub fn post_sink_media(frame: MediaFrame) -> Result<(), AvError> {
    let (address, open) = session::media_gate();
    if !open || address != frame.address {
        return Err(AvError::NotReady);
    }
    MEDIA_FRAME_CHANNEL
        .try_send(frame)
        .map_err(|_| AvError::QueueFull)
}

/// The control task owning the service.
///
/// Spawn exactly one instance; every other entry point in this crate
/// communicates with it through the static channels.
pub async fn av_task<T, A, H, R>(mut service: AvService<T, A, H, R>) -> !
where
    T: Transport,
    A: AudioSessionHooks,
    H: HostCallbacks,
    R: RcController,
{
    loop {
        let deadline = service.next_rc_deadline();
        let timer = async {
            match deadline {
                Some((role, address, at)) => {
                    Timer::at(at).await;
                    (role, address)
                }
                None => core::future::pending().await,
            }
        };

        match select4(
            API_REQUEST_CHANNEL.receive(),
            INBOUND_CHANNEL.receive(),
            MEDIA_FRAME_CHANNEL.receive(),
            timer,
        )
        .await
        {
            Either4::First(request) => {
                let response = handle_api_request(&mut service, request).await;
                API_RESPONSE_CHANNEL.send(response).await;
            }
            Either4::Second(Inbound::Transport {
                remote_endpoint,
                event,
            }) => {
                service.handle_transport_event(remote_endpoint, event);
            }
            Either4::Second(Inbound::SinkConfig {
                address,
                sample_rate,
                channel_count,
            }) => {
                service.on_sink_media_config(address, sample_rate, channel_count);
            }
            Either4::Third(frame) => service.on_sink_media(frame),
            Either4::Fourth((role, address)) => service.handle_rc_open_timeout(role, address),
        }
    }
}

fn status(result: Result<(), AvError>) -> ApiResponse {
    match result {
        Ok(()) => ApiResponse::Done,
        Err(error) => ApiResponse::Error(error),
    }
}

/// Wait for the audio session to confirm its shutdown, bounded by
/// [`AUDIO_SHUTDOWN_TIMEOUT`]. A timeout is logged and not fatal.
async fn await_session_shutdown() {
    if with_timeout(AUDIO_SHUTDOWN_TIMEOUT, SESSION_SHUTDOWN.wait())
        .await
        .is_err()
    {
        log::error!("timed out waiting for audio session shutdown to complete");
    }
}

async fn handle_api_request<T, A, H, R>(
    service: &mut AvService<T, A, H, R>,
    request: ApiRequest,
) -> ApiResponse
where
    T: Transport,
    A: AudioSessionHooks,
    H: HostCallbacks,
    R: RcController,
{
    match request {
        ApiRequest::InitSource {
            max_connected_peers,
            codec_priorities,
            offload_capabilities,
        } => status(service.init_source(
            max_connected_peers,
            &codec_priorities,
            &offload_capabilities,
        )),
        ApiRequest::InitSink {
            max_connected_peers,
        } => status(service.init_sink(max_connected_peers)),
        ApiRequest::CleanupSource => {
            let had_active = !service.registry(Role::Source).active_peer().is_empty();
            service.cleanup_source();
            if had_active {
                await_session_shutdown().await;
            }
            ApiResponse::Done
        }
        ApiRequest::CleanupSink => {
            let had_active = !service.registry(Role::Sink).active_peer().is_empty();
            service.cleanup_sink();
            if had_active {
                await_session_shutdown().await;
            }
            ApiResponse::Done
        }
        ApiRequest::Connect(address) => status(service.connect(address)),
        ApiRequest::Disconnect(address) => status(service.disconnect(address)),
        ApiRequest::SetActivePeer { role, address } => {
            if !service.registry(role).is_enabled() {
                log::warn!("{} role is not enabled", role.label());
                return ApiResponse::Error(AvError::NotReady);
            }
            let had_active = !service.registry(role).active_peer().is_empty();
            match service.set_active_peer(role, address) {
                Ok(()) => {
                    // Clearing the active peer shuts the audio path down;
                    // the caller's ready signal is the response itself, so
                    // hold it until the shutdown completes (or times out).
                    if address.is_empty() && had_active {
                        await_session_shutdown().await;
                    }
                    ApiResponse::Done
                }
                Err(error) => ApiResponse::Error(error),
            }
        }
        ApiRequest::SetSilence { address, silence } => {
            if !service.registry(Role::Source).is_enabled() {
                return ApiResponse::Error(AvError::NotReady);
            }
            status(service.set_silence_peer(address, silence))
        }
        ApiRequest::ConfigureCodec {
            address,
            preferences,
        } => status(service.configure_codec(address, &preferences)),
        ApiRequest::StartStream { use_latency_mode } => {
            service.stream_start(use_latency_mode);
            ApiResponse::Done
        }
        ApiRequest::StopStream { address } => {
            service.stream_stop(address);
            ApiResponse::Done
        }
        ApiRequest::SuspendStream => {
            service.stream_suspend();
            ApiResponse::Done
        }
        ApiRequest::StartOffload => {
            service.stream_start_offload();
            ApiResponse::Done
        }
        ApiRequest::SetLowLatency(low_latency) => {
            service.set_low_latency(low_latency);
            ApiResponse::Done
        }
        ApiRequest::SetAudioDelay {
            address,
            delay_tenths_ms,
        } => {
            service.set_audio_delay(address, delay_tenths_ms);
            ApiResponse::Done
        }
        ApiRequest::SetAudioFocusState(state) => {
            service.set_audio_focus_state(state);
            ApiResponse::Done
        }
        ApiRequest::SetAudioTrackGain(gain) => {
            service.set_audio_track_gain(gain);
            ApiResponse::Done
        }
        ApiRequest::SetDynamicAudioBufferSize(size) => {
            service.set_dynamic_audio_buffer_size(size);
            ApiResponse::Done
        }
        ApiRequest::Snapshot => ApiResponse::Snapshot(service.snapshot()),
    }
}
