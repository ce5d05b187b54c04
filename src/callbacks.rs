//! Notifications delivered to the host application.
//!
//! The callback table is installed once when the service is constructed and
//! stays valid until cleanup. Callbacks are invoked on the control task and
//! must be fire-and-forget; a host binding that needs its own thread posts
//! the notification there itself.

use crate::address::PeerAddress;
use crate::session::CodecPreference;

/// Connection state reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum ConnectionState {
    /// No AVDTP connection.
    Disconnected,
    /// An AVDTP connection attempt is in progress.
    Connecting,
    /// The AVDTP connection is up.
    Connected,
    /// The AVDTP connection is being torn down.
    Disconnecting,
}

/// Audio state reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum AudioState {
    /// The stream entered the Started state.
    Started,
    /// The stream left the Started state locally.
    Stopped,
    /// The remote suspended the stream.
    RemoteSuspend,
}

/// Host-facing notification surface for both roles.
pub trait HostCallbacks {
    /// The connection state of `address` changed.
    fn connection_state(&self, address: PeerAddress, state: ConnectionState);

    /// The audio state of `address` changed.
    fn audio_state(&self, address: PeerAddress, state: AudioState);

    /// Source role: the codec configuration for `address` changed.
    fn source_codec_config(
        &self,
        address: PeerAddress,
        current: CodecPreference,
        local_capabilities: &[CodecPreference],
        selectable_capabilities: &[CodecPreference],
    );

    /// Sink role: the audio configuration announced by a remote Source.
    fn sink_audio_config(&self, address: PeerAddress, sample_rate: u32, channel_count: u8);

    /// Policy query: should `address` be limited to the mandatory codec?
    fn mandatory_codec_preferred(&self, address: PeerAddress) -> bool;
}
