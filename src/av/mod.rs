//! AV connection management core.
//!
//! The pieces that make up one role's view of its remote peers:
//!
//! - **Events** ([`event::AvEvent`]): owned values combining an opcode with
//!   a typed payload, safe to hand across task boundaries.
//! - **Peers** ([`peer::Peer`]): identity, flags, timers and handle bindings
//!   for one remote device.
//! - **State machine** ([`state_machine`]): the five-state per-peer
//!   lifecycle (Idle, Opening, Opened, Started, Closing).
//! - **Registry** ([`registry::PeerRegistry`]): the per-role peer
//!   collection with admission control and active-peer bookkeeping.

pub mod event;
pub mod peer;
pub mod registry;
pub(crate) mod state_machine;

/// Streaming direction of a stream endpoint.
///
/// Used both for the local role (a Source pushes audio, a Sink consumes it)
/// and for the remote peer's endpoint type, which is always the complement
/// of the local role it is connected to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum Role {
    /// Audio source (sends audio)
    Source,
    /// Audio sink (receives audio)
    Sink,
}

impl Role {
    /// The opposite streaming direction.
    #[must_use]
    pub const fn complement(self) -> Role {
        match self {
            Role::Source => Role::Sink,
            Role::Sink => Role::Source,
        }
    }

    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Role::Source => "Source",
            Role::Sink => "Sink",
        }
    }
}

/// Service class advertised when opening a connection or registering a
/// stream endpoint with the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum ServiceClass {
    /// The local device acts as audio source.
    AudioSource,
    /// The local device acts as audio sink.
    AudioSink,
}

/// Lower-transport channel handle for one peer.
///
/// Assigned by the transport on registration; [`STREAM_HANDLE_UNKNOWN`]
/// until then.
pub type StreamHandle = u8;

/// Sentinel for a handle that has not been bound yet.
pub const STREAM_HANDLE_UNKNOWN: StreamHandle = 0;

/// AV connection manager errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum AvError {
    /// The role is not initialised (or was cleaned up)
    NotReady,
    /// Invalid parameter provided (e.g. malformed or empty address)
    InvalidParam,
    /// Audio session initialisation failed
    InitFailed,
    /// No peer exists for the given address or handle
    PeerNotFound,
    /// The peer exists but is not connected
    NotConnected,
    /// All peer ids of the role are in use
    NoFreePeerId,
    /// The peer id has no lower-transport handle bound to it
    HandleUnbound,
    /// The peer table of the role is full
    TooManyPeers,
    /// Restarting the audio session for a new active peer failed
    SessionRestartFailed,
    /// An internal queue was full and the item was dropped
    QueueFull,
    /// The response received over the API channel did not match the request
    UnexpectedResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_complement() {
        assert_eq!(Role::Source.complement(), Role::Sink);
        assert_eq!(Role::Sink.complement(), Role::Source);
        assert_eq!(Role::Source.complement().complement(), Role::Source);
    }

    #[test]
    fn test_role_labels() {
        assert_eq!(Role::Source.label(), "Source");
        assert_eq!(Role::Sink.label(), "Sink");
    }
}
