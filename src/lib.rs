#![no_std]
#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![allow(clippy::unused_async, clippy::large_enum_variant, clippy::too_many_lines)]

pub mod api;
pub mod av;
pub mod constants;

mod address;
mod callbacks;
mod config;
mod processor;
mod rc;
mod service;
mod session;
#[cfg(test)]
mod testing;
mod transport;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use heapless::Vec;

pub use address::PeerAddress;
pub use av::event::{AvEvent, AvOpcode};
pub use av::peer::{Peer, PeerFlags, PeerSnapshot, PeerState};
pub use av::registry::PeerRegistry;
pub use av::{AvError, Role, ServiceClass, StreamHandle, STREAM_HANDLE_UNKNOWN};
pub use callbacks::{AudioState, ConnectionState, HostCallbacks};
pub use config::AvConfig;
pub use processor::{
    av_task, post_sink_media, post_sink_media_config, post_transport_event,
    try_post_transport_event,
};
pub use rc::RcController;
pub use service::{AvService, RoleSnapshot, ServiceSnapshot};
pub use session::{
    AudioFocusState, AudioSessionHooks, CodecPreference, MediaFrame, SESSION_SHUTDOWN,
};
pub use transport::{
    EdrProfile, Features, MetaMessage, OpenData, RcKey, RcMessage, RcMessageData, StartData,
    SuspendData, Transport, TransportEvent, TransportStatus,
};

use constants::{MAX_API_REQUESTS, MAX_CODEC_PREFERENCES, MAX_PENDING_EVENTS, MAX_PENDING_FRAMES};

pub(crate) static API_REQUEST_CHANNEL: Channel<CriticalSectionRawMutex, ApiRequest, MAX_API_REQUESTS> =
    Channel::new();

pub(crate) static API_RESPONSE_CHANNEL: Channel<
    CriticalSectionRawMutex,
    ApiResponse,
    MAX_API_REQUESTS,
> = Channel::new();

pub(crate) static INBOUND_CHANNEL: Channel<CriticalSectionRawMutex, Inbound, MAX_PENDING_EVENTS> =
    Channel::new();

pub(crate) static MEDIA_FRAME_CHANNEL: Channel<
    CriticalSectionRawMutex,
    MediaFrame,
    MAX_PENDING_FRAMES,
> = Channel::new();

/// One item posted to the control task from a producer context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Inbound {
    /// A deep-copied transport event, tagged with the remote endpoint type.
    Transport {
        remote_endpoint: Role,
        event: TransportEvent,
    },
    /// Audio configuration parsed from the Sink media path.
    SinkConfig {
        address: PeerAddress,
        sample_rate: u32,
        channel_count: u8,
    },
}

/// API requests sent to the control task
#[derive(Debug, Clone)]
pub enum ApiRequest {
    /// Initialise the Source role
    InitSource {
        /// Upper bound on simultaneously connecting/connected peers
        max_connected_peers: usize,
        /// Codec priorities configured by the host
        codec_priorities: Vec<CodecPreference, MAX_CODEC_PREFERENCES>,
        /// Codec capabilities usable on the offload path
        offload_capabilities: Vec<CodecPreference, MAX_CODEC_PREFERENCES>,
    },
    /// Initialise the Sink role
    InitSink {
        /// Upper bound on simultaneously connecting/connected peers
        max_connected_peers: usize,
    },
    /// Tear down the Source role
    CleanupSource,
    /// Tear down the Sink role
    CleanupSink,
    /// Connect to a peer
    Connect(PeerAddress),
    /// Disconnect a peer
    Disconnect(PeerAddress),
    /// Change (or clear) the active peer of a role
    SetActivePeer {
        /// The local role whose active peer changes
        role: Role,
        /// New active peer, or empty to clear
        address: PeerAddress,
    },
    /// Toggle silence mode on a Source-role peer
    SetSilence {
        /// The peer to change
        address: PeerAddress,
        /// Enable or disable silence mode
        silence: bool,
    },
    /// Apply new codec preferences to a peer
    ConfigureCodec {
        /// The peer to reconfigure
        address: PeerAddress,
        /// The updated preferences
        preferences: Vec<CodecPreference, MAX_CODEC_PREFERENCES>,
    },
    /// Start streaming on the active peer
    StartStream {
        /// Requested low-latency mode; `None` keeps the last value
        use_latency_mode: Option<bool>,
    },
    /// Stop streaming (empty address: every started peer)
    StopStream {
        /// The peer to stop, or empty
        address: PeerAddress,
    },
    /// Suspend streaming on every started peer
    SuspendStream,
    /// Start the offload path on the active peer
    StartOffload,
    /// Toggle low-latency mode on the active peer
    SetLowLatency(bool),
    /// Record a peer's delay report
    SetAudioDelay {
        /// The reporting peer
        address: PeerAddress,
        /// Delay in 1/10 ms
        delay_tenths_ms: u16,
    },
    /// Forward the host's audio focus decision to the Sink path
    SetAudioFocusState(AudioFocusState),
    /// Forward the host's track gain to the Sink path
    SetAudioTrackGain(f32),
    /// Resize the encoder path's dynamic audio buffer
    SetDynamicAudioBufferSize(u8),
    /// Request a diagnostic snapshot
    Snapshot,
}

/// API responses sent back from the control task
#[derive(Debug, Clone)]
pub enum ApiResponse {
    /// The request completed
    Done,
    /// Diagnostic snapshot of both roles
    Snapshot(ServiceSnapshot),
    /// The request failed
    Error(AvError),
}
