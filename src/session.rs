//! Audio session boundary.
//!
//! [`AudioSessionHooks`] models the opaque audio HAL / codec side of the
//! stack: session lifecycle for the active peer, stream acknowledgements,
//! flush control and the decoded-frame queue of the Sink role. The
//! connection manager only ever calls these hooks from its control task;
//! implementations must not block and may marshal the work to their own
//! executor.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;

use crate::address::PeerAddress;
use crate::av::Role;
use crate::constants::MAX_MEDIA_FRAME_BYTES;
use crate::transport::{StartData, SuspendData, TransportStatus};

/// Signalled by the audio session implementation once a shutdown requested
/// through [`AudioSessionHooks::begin_shutdown`] has completed. The control
/// task bounds its wait on this signal to one second and proceeds either
/// way.
pub static SESSION_SHUTDOWN: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// One codec preference entry, ordered by priority.
///
/// The concrete codec parameter space is owned by the audio side; the
/// connection manager only transports these records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub struct CodecPreference {
    /// Codec index as defined by the audio side.
    pub codec: u8,
    /// Priority; higher wins.
    pub priority: i32,
}

/// Audio focus states forwarded from the host to the Sink decoder path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum AudioFocusState {
    /// Focus lost or never granted; decoded audio must not be rendered.
    NotGranted,
    /// Focus granted; decoded audio may be rendered.
    Granted,
}

/// One decoded media frame handed over by the data plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFrame {
    /// Peer the frame was received from.
    pub address: PeerAddress,
    /// Decoded payload.
    pub data: heapless::Vec<u8, MAX_MEDIA_FRAME_BYTES>,
}

/// Best-effort gate the data plane consults before enqueueing a decoded
/// frame, re-checked authoritatively on the control task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MediaGate {
    pub address: PeerAddress,
    pub open: bool,
}

pub(crate) static MEDIA_GATE: Mutex<CriticalSectionRawMutex, Cell<MediaGate>> =
    Mutex::new(Cell::new(MediaGate {
        address: PeerAddress::EMPTY,
        open: false,
    }));

/// Publish the media gate for the data plane.
pub(crate) fn publish_media_gate(address: PeerAddress, open: bool) {
    MEDIA_GATE.lock(|gate| gate.set(MediaGate { address, open }));
}

/// Read the media gate from any context.
pub(crate) fn media_gate() -> (PeerAddress, bool) {
    let gate = MEDIA_GATE.lock(Cell::get);
    (gate.address, gate.open)
}

/// Hooks into the audio session / codec layer.
pub trait AudioSessionHooks {
    /// Initialise the audio path for `role`. Returns `false` on failure.
    fn init(&self, role: Role) -> bool;

    /// Tear down the audio path for `role`.
    fn cleanup(&self, role: Role);

    /// Install the codec priorities configured by the host.
    fn configure_codec_priorities(&self, priorities: &[CodecPreference]);

    /// Install the codec capabilities usable on the offload path.
    fn update_offload_capabilities(&self, capabilities: &[CodecPreference]);

    /// Bind the codec layer to a new active peer; empty clears the binding.
    /// Returns `false` if the binding could not be changed.
    fn set_codec_active_peer(&self, address: PeerAddress) -> bool;

    /// Start an audio session towards `address`. Returns `false` if the
    /// session could not be started.
    fn start_session(&self, address: PeerAddress) -> bool;

    /// End the audio session towards `address`.
    fn end_session(&self, address: PeerAddress);

    /// Move the running session from `from` to `to`. Returns `false` if the
    /// session could not be moved; the previous session is torn down either
    /// way.
    fn restart_session(&self, from: PeerAddress, to: PeerAddress) -> bool;

    /// Begin shutting the audio path down; completion is reported through
    /// [`SESSION_SHUTDOWN`].
    fn begin_shutdown(&self);

    /// Acknowledge a stream start towards the audio HAL. `start` is `None`
    /// when the stream was already running. Returns `true` once the HAL
    /// accepted the acknowledgement.
    fn on_started(&self, address: PeerAddress, start: Option<&StartData>) -> bool;

    /// The stream was suspended.
    fn on_suspended(&self, suspend: Option<&SuspendData>);

    /// The stream was stopped.
    fn on_stopped(&self, suspend: Option<&SuspendData>);

    /// The active peer went idle.
    fn on_idle(&self);

    /// Relay the outcome of an offload start.
    fn on_offload_started(&self, address: PeerAddress, status: TransportStatus);

    /// Forward the delay report of the active remote Sink, in 1/10 ms.
    fn set_remote_delay(&self, delay_tenths_ms: u16);

    /// Flush (or stop flushing) outbound frames.
    fn set_tx_flush(&self, flush: bool);

    /// Flush (or stop flushing) inbound frames.
    fn set_rx_flush(&self, flush: bool);

    /// Queue one decoded frame for rendering; returns the queue depth.
    fn enqueue(&self, frame: MediaFrame) -> usize;

    /// Apply new codec preferences for a peer.
    fn update_codec_config(&self, address: PeerAddress, preferences: &[CodecPreference]);

    /// Forward the host's audio focus decision to the Sink decoder path.
    fn set_audio_focus_state(&self, state: AudioFocusState);

    /// Forward the host's track gain (used for ducking) to the Sink path.
    fn set_audio_track_gain(&self, gain: f32);

    /// Resize the dynamic audio buffer used by the encoder path.
    fn set_dynamic_audio_buffer_size(&self, size: u8);
}
