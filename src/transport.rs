//! Lower AVDTP/AVRCP transport boundary.
//!
//! [`Transport`] is the call-out surface: commands the connection manager
//! issues towards the signalling layer. [`TransportEvent`] is the inbound
//! surface: everything the signalling layer reports back. Events are routed
//! to a peer either by address or by handle, depending on the variant (an
//! incoming open carries the address; most stream events carry only the
//! handle).

use core::ops::{BitOr, BitOrAssign};

use crate::address::PeerAddress;
use crate::av::{Role, ServiceClass, StreamHandle};
use crate::constants::MAX_META_DATA;

/// Feature bits passed to [`Transport::enable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub struct Features(u16);

impl Features {
    /// No features.
    pub const NONE: Features = Features(0);
    /// AVRCP target role.
    pub const RCTG: Features = Features(0x0001);
    /// AVRCP metadata exchange.
    pub const METADATA: Features = Features(0x0002);
    /// Vendor-dependent AVRCP commands.
    pub const VENDOR: Features = Features(0x0004);
    /// Do not auto-suspend streaming on SCO/call activity.
    pub const NO_SCO_SUSPEND: Features = Features(0x0008);
    /// AVDTP delay reporting.
    pub const DELAY_REPORT: Features = Features(0x0010);
    /// AVRCP controller role.
    pub const RCCT: Features = Features(0x0020);
    /// AVRCP 1.4 advanced control (absolute volume).
    pub const ADV_CTRL: Features = Features(0x0040);
    /// AVRCP browsing channel.
    pub const BROWSE: Features = Features(0x0080);
    /// AVRCP cover art.
    pub const COVER_ART: Features = Features(0x0100);

    /// Check whether every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Features) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Raw feature bits.
    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }
}

impl BitOr for Features {
    type Output = Features;

    fn bitor(self, rhs: Features) -> Features {
        Features(self.0 | rhs.0)
    }
}

impl BitOrAssign for Features {
    fn bitor_assign(&mut self, rhs: Features) {
        self.0 |= rhs.0;
    }
}

/// Transport-rate descriptor reported when a connection opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, defmt::Format)]
pub struct EdrProfile(u8);

impl EdrProfile {
    /// Basic rate only.
    pub const NONE: EdrProfile = EdrProfile(0);
    /// Enhanced data rate supported.
    pub const EDR: EdrProfile = EdrProfile(0x01);
    /// 3 Mbps EDR packets supported (implies EDR).
    pub const EDR_3MBPS: EdrProfile = EdrProfile(0x03);

    /// Construct from raw transport bits.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        EdrProfile(bits)
    }

    /// Whether any EDR rate is available.
    #[must_use]
    pub const fn is_edr(self) -> bool {
        self.0 != 0
    }

    /// Whether 3 Mbps EDR packets are available.
    #[must_use]
    pub const fn is_3mbps(self) -> bool {
        (self.0 & 0x02) != 0
    }
}

/// Completion status attached to transport confirmations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum TransportStatus {
    /// The operation completed.
    Success,
    /// Generic failure.
    Fail,
    /// The stream-level operation failed.
    FailStream,
}

impl TransportStatus {
    /// `true` for [`TransportStatus::Success`].
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, TransportStatus::Success)
    }
}

/// Payload of a (possibly spontaneous) open confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenData {
    /// Remote device address.
    pub address: PeerAddress,
    /// Channel handle of the connection.
    pub handle: StreamHandle,
    /// Whether the open succeeded.
    pub status: TransportStatus,
    /// Stream endpoint type of the remote device.
    pub endpoint: Role,
    /// Transport rate negotiated for the link.
    pub edr: EdrProfile,
}

/// Payload of a stream start confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartData {
    /// Channel handle of the stream.
    pub handle: StreamHandle,
    /// Whether the start succeeded.
    pub status: TransportStatus,
    /// The transport is about to suspend the stream again.
    pub suspending: bool,
    /// Whether the local side initiated the start.
    pub initiator: bool,
}

/// Payload of a stream suspend or stop confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuspendData {
    /// Channel handle of the stream.
    pub handle: StreamHandle,
    /// Whether the operation succeeded.
    pub status: TransportStatus,
    /// Whether the local side initiated the operation.
    pub initiator: bool,
}

/// AVRCP passthrough key reported with a remote command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum RcKey {
    /// PLAY passthrough.
    Play,
    /// PAUSE passthrough.
    Pause,
    /// STOP passthrough.
    Stop,
    /// Any other passthrough operation id.
    Other(u8),
}

/// One AVRCP meta message, deep-copied at the transport boundary.
///
/// The outer `data` buffer and the nested vendor/browse buffer inside
/// `message` are independent owned copies; the producer may reuse its
/// buffers immediately after posting the event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetaMessage {
    /// Outer message buffer.
    pub data: heapless::Vec<u8, MAX_META_DATA>,
    /// Parsed message record, if the transport attached one.
    pub message: Option<RcMessage>,
}

/// The message record nested inside a [`MetaMessage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RcMessage {
    /// AVRCP transaction label.
    pub label: u8,
    /// Per-opcode payload.
    pub detail: RcMessageData,
}

/// Payload of an [`RcMessage`], keyed by the AVRCP opcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RcMessageData {
    /// Vendor-dependent message with its own data buffer.
    Vendor {
        /// Registered company id of the vendor.
        company_id: u32,
        /// Vendor payload.
        data: heapless::Vec<u8, MAX_META_DATA>,
    },
    /// Browsing-channel message with its own data buffer.
    Browse {
        /// Browse payload.
        data: heapless::Vec<u8, MAX_META_DATA>,
    },
    /// Any other opcode; no nested buffer.
    Other,
}

/// Events reported by the lower transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The signalling service is enabled.
    Enabled {
        /// Features the transport actually enabled.
        features: Features,
    },
    /// A stream endpoint registration completed.
    Registered {
        /// Handle assigned to the endpoint.
        handle: StreamHandle,
        /// The peer id the endpoint was registered for.
        peer_id: u8,
    },
    /// An AV connection completed (locally or remotely initiated).
    Opened(OpenData),
    /// The AVDTP link closed.
    Closed {
        /// Channel handle of the closed link.
        handle: StreamHandle,
    },
    /// Stream start confirmation.
    Started(StartData),
    /// Stream stop confirmation.
    Stopped(SuspendData),
    /// Stream suspend confirmation.
    Suspended(SuspendData),
    /// Stream reconfiguration confirmation.
    Reconfigured {
        /// Channel handle of the stream.
        handle: StreamHandle,
        /// Whether the reconfiguration succeeded.
        status: TransportStatus,
    },
    /// A remote device started an incoming connection.
    Pending {
        /// Remote device address.
        address: PeerAddress,
    },
    /// A connection request was rejected by the remote.
    Rejected {
        /// Remote device address.
        address: PeerAddress,
        /// Channel handle the rejection refers to.
        handle: StreamHandle,
    },
    /// Content-protection request from the remote.
    ProtectRequest {
        /// Channel handle of the stream.
        handle: StreamHandle,
    },
    /// Content-protection response from the remote.
    ProtectResponse {
        /// Channel handle of the stream.
        handle: StreamHandle,
    },
    /// The AVRCP control channel opened.
    RcOpened {
        /// Remote device address.
        address: PeerAddress,
    },
    /// The AVRCP control channel closed.
    RcClosed {
        /// Remote device address.
        address: PeerAddress,
    },
    /// The AVRCP browsing channel opened.
    RcBrowseOpened {
        /// Remote device address.
        address: PeerAddress,
    },
    /// The AVRCP browsing channel closed.
    RcBrowseClosed {
        /// Remote device address.
        address: PeerAddress,
    },
    /// AVRCP passthrough command from the remote.
    RemoteCommand {
        /// The passthrough key.
        key: RcKey,
    },
    /// AVRCP passthrough response from the remote.
    RemoteResponse {
        /// The passthrough key.
        key: RcKey,
    },
    /// Vendor-dependent AVRCP command.
    VendorCommand,
    /// Vendor-dependent AVRCP response.
    VendorResponse,
    /// AVRCP metadata message.
    MetaMessage(MetaMessage),
    /// AVRCP feature bits discovered for a peer.
    RcFeatures {
        /// Remote device address.
        address: PeerAddress,
        /// Features the peer supports.
        features: Features,
    },
    /// Cover-art L2CAP PSM discovered for a peer.
    RcCoverArtPsm {
        /// Remote device address.
        address: PeerAddress,
        /// The dynamic PSM value.
        psm: u16,
    },
    /// Offload start confirmation.
    OffloadStartResponse {
        /// Whether the offload path started.
        status: TransportStatus,
    },
}

/// Commands towards the lower AVDTP/AVRCP signalling layer.
///
/// All methods are fire-and-forget from the connection manager's point of
/// view; completions come back as [`TransportEvent`]s.
pub trait Transport {
    /// Enable the signalling service with the given feature set.
    fn enable(&self, features: Features);

    /// Disable the signalling service.
    fn disable(&self);

    /// Register one stream endpoint; the transport confirms with
    /// [`TransportEvent::Registered`] carrying the assigned handle.
    fn register(&self, service_name: &str, peer_id: u8, with_media: bool, service: ServiceClass);

    /// Deregister a previously registered endpoint.
    fn deregister(&self, handle: StreamHandle);

    /// Open an AV connection to `address` on `handle`.
    fn open(&self, address: PeerAddress, handle: StreamHandle, initiator: bool, service: ServiceClass);

    /// Close the AV connection on `handle`.
    fn close(&self, handle: StreamHandle);

    /// Start the stream on `handle`.
    fn start(&self, handle: StreamHandle, use_latency_mode: bool);

    /// Stop the stream on `handle`; `suspend` keeps the stream context.
    fn stop(&self, handle: StreamHandle, suspend: bool);

    /// Bring up the AVRCP leg for the connection on `handle`.
    fn open_rc(&self, handle: StreamHandle);

    /// Tear down the AVRCP leg for the connection on `handle`.
    fn close_rc(&self, handle: StreamHandle);

    /// Toggle low-latency mode for the stream on `handle`.
    fn set_latency(&self, handle: StreamHandle, low_latency: bool);

    /// Start the hardware offload path for the stream on `handle`.
    fn offload_start(&self, handle: StreamHandle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_features_bit_ops() {
        let features = Features::RCTG | Features::METADATA | Features::VENDOR;
        assert!(features.contains(Features::RCTG));
        assert!(features.contains(Features::METADATA | Features::VENDOR));
        assert!(!features.contains(Features::BROWSE));

        let mut features = Features::NONE;
        features |= Features::DELAY_REPORT;
        assert!(features.contains(Features::DELAY_REPORT));
        assert_eq!(features.bits(), Features::DELAY_REPORT.bits());
    }

    #[test]
    fn test_edr_profile() {
        assert!(!EdrProfile::NONE.is_edr());
        assert!(!EdrProfile::NONE.is_3mbps());

        assert!(EdrProfile::EDR.is_edr());
        assert!(!EdrProfile::EDR.is_3mbps());

        assert!(EdrProfile::EDR_3MBPS.is_edr());
        assert!(EdrProfile::EDR_3MBPS.is_3mbps());

        assert!(EdrProfile::from_bits(0x01).is_edr());
    }

    #[test]
    fn test_meta_message_clone_is_independent() {
        let mut data = heapless::Vec::new();
        data.extend_from_slice(&[0x10, 0x20, 0x30]).unwrap();
        let mut vendor = heapless::Vec::new();
        vendor.extend_from_slice(&[0xAA, 0xBB]).unwrap();

        let original = MetaMessage {
            data,
            message: Some(RcMessage {
                label: 3,
                detail: RcMessageData::Vendor {
                    company_id: 0x1958,
                    data: vendor,
                },
            }),
        };

        let mut copy = original.clone();
        assert_eq!(copy, original);

        // Mutating the copy must not affect the original buffers.
        copy.data.push(0x40).unwrap();
        if let Some(RcMessage {
            detail: RcMessageData::Vendor { data, .. },
            ..
        }) = &mut copy.message
        {
            data.push(0xCC).unwrap();
        }
        assert_eq!(original.data.len(), 3);
        if let Some(RcMessage {
            detail: RcMessageData::Vendor { data, .. },
            ..
        }) = &original.message
        {
            assert_eq!(data.len(), 2);
        } else {
            panic!("vendor payload lost");
        }
    }
}
