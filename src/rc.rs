//! AVRCP side-channel collaborator.
//!
//! Remote-control command handling lives outside this crate; the connection
//! manager only forwards RC events to it and asks three questions: is the
//! control channel up for a peer, which handle does it use, and is there a
//! PLAY command parked until the AV connection completes.

use crate::address::PeerAddress;
use crate::av::event::AvEvent;
use crate::av::StreamHandle;

/// The AVRCP controller/target module next to this connection manager.
pub trait RcController {
    /// Forward one RC-class event for `address`.
    fn handle_event(&self, address: PeerAddress, event: &AvEvent);

    /// Whether the AVRCP control channel is connected to `address`.
    fn is_connected(&self, address: PeerAddress) -> bool;

    /// The handle of the connected AVRCP channel, if any.
    fn connected_handle(&self, address: PeerAddress) -> Option<StreamHandle>;

    /// Release (or drop) a PLAY command queued while the AV connection was
    /// still being set up.
    fn check_pending_play(&self, address: PeerAddress, accepted: bool);
}
