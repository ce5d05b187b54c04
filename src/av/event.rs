//! Owned events driving the per-peer state machine.
//!
//! An [`AvEvent`] combines an opcode with its typed payload. Events cross
//! from transport callbacks, timers and API callers onto the control task,
//! so every payload is an owned value: `Clone` is a deep copy (including
//! the nested vendor/browse buffers of a meta message) and `Drop` releases
//! everything.

use crate::address::PeerAddress;
use crate::transport::TransportEvent;

/// One event addressed to a peer's state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvEvent {
    /// An event reported by the lower transport.
    Transport(TransportEvent),
    /// Outbound connection request.
    ConnectRequest,
    /// Disconnect request.
    DisconnectRequest,
    /// Start streaming on the peer.
    StartStreamRequest {
        /// Requested low-latency mode; `None` keeps the last value.
        use_latency_mode: Option<bool>,
    },
    /// Stop streaming on the peer.
    StopStreamRequest,
    /// Suspend streaming on the peer.
    SuspendStreamRequest,
    /// Audio configuration discovered for a remote Source peer.
    SinkConfigRequest {
        /// Remote device address.
        address: PeerAddress,
        /// Sample rate in Hz.
        sample_rate: u32,
        /// Channel count (1 = mono, 2 = stereo).
        channel_count: u8,
    },
    /// The underlying ACL link dropped.
    AclDisconnected,
    /// Start the hardware offload path.
    OffloadStartRequest,
    /// The AVRCP module reports a control connection without AV.
    AvrcpOpened,
    /// The AVRCP module reports its control connection closed.
    AvrcpClosed,
    /// The AVRCP module saw a remote PLAY while we consider the peer
    /// suspended.
    AvrcpRemotePlay,
    /// Change the low-latency mode of the running stream.
    SetLatencyRequest {
        /// Requested mode.
        low_latency: bool,
    },
}

/// Fieldless mirror of [`AvEvent`] used for dispatch tables and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
#[allow(missing_docs)]
pub enum AvOpcode {
    Enable,
    Register,
    Open,
    Close,
    Start,
    Stop,
    Suspend,
    Reconfig,
    Pending,
    Reject,
    ProtectReq,
    ProtectRsp,
    RcOpen,
    RcClose,
    RcBrowseOpen,
    RcBrowseClose,
    RemoteCmd,
    RemoteRsp,
    VendorCmd,
    VendorRsp,
    MetaMsg,
    RcFeat,
    RcPsm,
    OffloadStartRsp,
    ConnectReq,
    DisconnectReq,
    StartStreamReq,
    StopStreamReq,
    SuspendStreamReq,
    SinkConfigReq,
    AclDisconnected,
    OffloadStartReq,
    AvrcpOpen,
    AvrcpClose,
    AvrcpRemotePlay,
    SetLatencyReq,
}

impl AvOpcode {
    /// Diagnostic name of the opcode.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            AvOpcode::Enable => "Enable",
            AvOpcode::Register => "Register",
            AvOpcode::Open => "Open",
            AvOpcode::Close => "Close",
            AvOpcode::Start => "Start",
            AvOpcode::Stop => "Stop",
            AvOpcode::Suspend => "Suspend",
            AvOpcode::Reconfig => "Reconfig",
            AvOpcode::Pending => "Pending",
            AvOpcode::Reject => "Reject",
            AvOpcode::ProtectReq => "ProtectReq",
            AvOpcode::ProtectRsp => "ProtectRsp",
            AvOpcode::RcOpen => "RcOpen",
            AvOpcode::RcClose => "RcClose",
            AvOpcode::RcBrowseOpen => "RcBrowseOpen",
            AvOpcode::RcBrowseClose => "RcBrowseClose",
            AvOpcode::RemoteCmd => "RemoteCmd",
            AvOpcode::RemoteRsp => "RemoteRsp",
            AvOpcode::VendorCmd => "VendorCmd",
            AvOpcode::VendorRsp => "VendorRsp",
            AvOpcode::MetaMsg => "MetaMsg",
            AvOpcode::RcFeat => "RcFeat",
            AvOpcode::RcPsm => "RcPsm",
            AvOpcode::OffloadStartRsp => "OffloadStartRsp",
            AvOpcode::ConnectReq => "ConnectReq",
            AvOpcode::DisconnectReq => "DisconnectReq",
            AvOpcode::StartStreamReq => "StartStreamReq",
            AvOpcode::StopStreamReq => "StopStreamReq",
            AvOpcode::SuspendStreamReq => "SuspendStreamReq",
            AvOpcode::SinkConfigReq => "SinkConfigReq",
            AvOpcode::AclDisconnected => "AclDisconnected",
            AvOpcode::OffloadStartReq => "OffloadStartReq",
            AvOpcode::AvrcpOpen => "AvrcpOpen",
            AvOpcode::AvrcpClose => "AvrcpClose",
            AvOpcode::AvrcpRemotePlay => "AvrcpRemotePlay",
            AvOpcode::SetLatencyReq => "SetLatencyReq",
        }
    }
}

impl AvEvent {
    /// The opcode of this event.
    #[must_use]
    pub const fn opcode(&self) -> AvOpcode {
        match self {
            AvEvent::Transport(event) => match event {
                TransportEvent::Enabled { .. } => AvOpcode::Enable,
                TransportEvent::Registered { .. } => AvOpcode::Register,
                TransportEvent::Opened(_) => AvOpcode::Open,
                TransportEvent::Closed { .. } => AvOpcode::Close,
                TransportEvent::Started(_) => AvOpcode::Start,
                TransportEvent::Stopped(_) => AvOpcode::Stop,
                TransportEvent::Suspended(_) => AvOpcode::Suspend,
                TransportEvent::Reconfigured { .. } => AvOpcode::Reconfig,
                TransportEvent::Pending { .. } => AvOpcode::Pending,
                TransportEvent::Rejected { .. } => AvOpcode::Reject,
                TransportEvent::ProtectRequest { .. } => AvOpcode::ProtectReq,
                TransportEvent::ProtectResponse { .. } => AvOpcode::ProtectRsp,
                TransportEvent::RcOpened { .. } => AvOpcode::RcOpen,
                TransportEvent::RcClosed { .. } => AvOpcode::RcClose,
                TransportEvent::RcBrowseOpened { .. } => AvOpcode::RcBrowseOpen,
                TransportEvent::RcBrowseClosed { .. } => AvOpcode::RcBrowseClose,
                TransportEvent::RemoteCommand { .. } => AvOpcode::RemoteCmd,
                TransportEvent::RemoteResponse { .. } => AvOpcode::RemoteRsp,
                TransportEvent::VendorCommand => AvOpcode::VendorCmd,
                TransportEvent::VendorResponse => AvOpcode::VendorRsp,
                TransportEvent::MetaMessage(_) => AvOpcode::MetaMsg,
                TransportEvent::RcFeatures { .. } => AvOpcode::RcFeat,
                TransportEvent::RcCoverArtPsm { .. } => AvOpcode::RcPsm,
                TransportEvent::OffloadStartResponse { .. } => AvOpcode::OffloadStartRsp,
            },
            AvEvent::ConnectRequest => AvOpcode::ConnectReq,
            AvEvent::DisconnectRequest => AvOpcode::DisconnectReq,
            AvEvent::StartStreamRequest { .. } => AvOpcode::StartStreamReq,
            AvEvent::StopStreamRequest => AvOpcode::StopStreamReq,
            AvEvent::SuspendStreamRequest => AvOpcode::SuspendStreamReq,
            AvEvent::SinkConfigRequest { .. } => AvOpcode::SinkConfigReq,
            AvEvent::AclDisconnected => AvOpcode::AclDisconnected,
            AvEvent::OffloadStartRequest => AvOpcode::OffloadStartReq,
            AvEvent::AvrcpOpened => AvOpcode::AvrcpOpen,
            AvEvent::AvrcpClosed => AvOpcode::AvrcpClose,
            AvEvent::AvrcpRemotePlay => AvOpcode::AvrcpRemotePlay,
            AvEvent::SetLatencyRequest { .. } => AvOpcode::SetLatencyReq,
        }
    }

    /// Diagnostic name of this event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.opcode().name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MetaMessage, OpenData, RcMessage, RcMessageData, TransportStatus};
    use crate::transport::{EdrProfile, StartData};
    use crate::av::Role;

    #[test]
    fn test_opcode_names() {
        assert_eq!(AvEvent::ConnectRequest.name(), "ConnectReq");
        assert_eq!(AvEvent::AvrcpRemotePlay.name(), "AvrcpRemotePlay");
        assert_eq!(
            AvEvent::Transport(TransportEvent::Closed { handle: 0x41 }).name(),
            "Close"
        );
        assert_eq!(
            AvEvent::Transport(TransportEvent::Started(StartData {
                handle: 0x41,
                status: TransportStatus::Success,
                suspending: false,
                initiator: true,
            }))
            .name(),
            "Start"
        );
    }

    #[test]
    fn test_opcode_mapping_is_stable() {
        let open = AvEvent::Transport(TransportEvent::Opened(OpenData {
            address: PeerAddress::EMPTY,
            handle: 0x41,
            status: TransportStatus::Success,
            endpoint: Role::Sink,
            edr: EdrProfile::EDR,
        }));
        assert_eq!(open.opcode(), AvOpcode::Open);
        assert_eq!(
            AvEvent::StartStreamRequest {
                use_latency_mode: None
            }
            .opcode(),
            AvOpcode::StartStreamReq
        );
    }

    #[test]
    fn test_event_clone_deep_copies_meta_buffers() {
        let mut browse = heapless::Vec::new();
        browse.extend_from_slice(&[1, 2, 3, 4]).unwrap();
        let event = AvEvent::Transport(TransportEvent::MetaMessage(MetaMessage {
            data: heapless::Vec::new(),
            message: Some(RcMessage {
                label: 1,
                detail: RcMessageData::Browse { data: browse },
            }),
        }));

        let copy = event.clone();
        assert_eq!(copy, event);
        assert_eq!(copy.opcode(), AvOpcode::MetaMsg);
    }
}
