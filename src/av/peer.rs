//! One remote device known to a role.

use embassy_time::Instant;
use heapless::String;

use crate::address::PeerAddress;
use crate::av::{Role, ServiceClass, StreamHandle};
use crate::constants::OPEN_ON_RC_TIMEOUT;
use crate::transport::EdrProfile;

/// States of the per-peer connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum PeerState {
    /// AVDTP disconnected
    Idle,
    /// Opening AVDTP connection
    Opening,
    /// AVDTP is in OPEN state
    Opened,
    /// A2DP stream started
    Started,
    /// Closing AVDTP connection
    Closing,
}

impl PeerState {
    /// Human-readable state label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            PeerState::Idle => "Idle",
            PeerState::Opening => "Opening",
            PeerState::Opened => "Opened",
            PeerState::Started => "Started",
            PeerState::Closing => "Closing",
        }
    }
}

/// Orthogonal per-peer flag bits.
///
/// The state id alone cannot express "suspended by remote vs by local" or
/// "start pending acknowledgement"; these bits carry that, and are cleared
/// on fixed transitions: `LOCAL_SUSPEND_PENDING` on leaving Started,
/// `PENDING_START` on leaving Opened, `PENDING_STOP` on leaving Started,
/// everything on entering Idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, defmt::Format)]
pub struct PeerFlags(u8);

impl PeerFlags {
    /// A locally requested suspend is waiting for confirmation.
    pub const LOCAL_SUSPEND_PENDING: u8 = 0x01;
    /// The remote suspended the stream; blocks media restarts.
    pub const REMOTE_SUSPEND: u8 = 0x02;
    /// A stream start is waiting for confirmation.
    pub const PENDING_START: u8 = 0x04;
    /// A stream stop is waiting for confirmation.
    pub const PENDING_STOP: u8 = 0x08;

    /// Set the flags in `mask`.
    pub fn set(&mut self, mask: u8) {
        self.0 |= mask;
    }

    /// Clear the flags in `mask`.
    pub fn clear(&mut self, mask: u8) {
        self.0 &= !mask;
    }

    /// Clear every flag.
    pub fn clear_all(&mut self) {
        self.0 = 0;
    }

    /// Whether any flag in `mask` is set.
    #[must_use]
    pub const fn check(&self, mask: u8) -> bool {
        (self.0 & mask) != 0
    }

    /// Whether no flag is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Symbolic rendering, e.g. `PENDING_START|REMOTE_SUSPEND` or `None`.
    #[must_use]
    pub fn symbolic(&self) -> String<64> {
        let mut out: String<64> = String::new();
        let push = |name: &str, out: &mut String<64>| {
            if !out.is_empty() {
                out.push('|').ok();
            }
            out.push_str(name).ok();
        };
        if self.check(Self::LOCAL_SUSPEND_PENDING) {
            push("LOCAL_SUSPEND_PENDING", &mut out);
        }
        if self.check(Self::REMOTE_SUSPEND) {
            push("REMOTE_SUSPEND", &mut out);
        }
        if self.check(Self::PENDING_START) {
            push("PENDING_START", &mut out);
        }
        if self.check(Self::PENDING_STOP) {
            push("PENDING_STOP", &mut out);
        }
        if out.is_empty() {
            out.push_str("None").ok();
        }
        out
    }
}

/// One remote device: identity, state machine data, flags and timers.
#[derive(Debug)]
pub struct Peer {
    address: PeerAddress,
    /// Stream endpoint type of the remote device (the local role is its
    /// complement). Immutable after creation.
    endpoint: Role,
    handle: StreamHandle,
    id: u8,
    state: PeerState,
    previous_state: Option<PeerState>,
    flags: PeerFlags,
    edr: EdrProfile,
    self_initiated: bool,
    silenced: bool,
    delay_report: u16,
    mandatory_codec_preferred: bool,
    use_latency_mode: bool,
    open_on_rc_deadline: Option<Instant>,
}

impl Peer {
    /// Create a peer in the initial Idle state.
    ///
    /// A freshly created peer has `previous_state == None` and is therefore
    /// not eligible for the idle-deletion sweep until it has transitioned
    /// at least once.
    #[must_use]
    pub fn new(address: PeerAddress, endpoint: Role, handle: StreamHandle, id: u8) -> Self {
        Self {
            address,
            endpoint,
            handle,
            id,
            state: PeerState::Idle,
            previous_state: None,
            flags: PeerFlags::default(),
            edr: EdrProfile::NONE,
            self_initiated: false,
            silenced: false,
            delay_report: 0,
            mandatory_codec_preferred: false,
            use_latency_mode: false,
            open_on_rc_deadline: None,
        }
    }

    /// Remote device address.
    #[must_use]
    pub const fn address(&self) -> PeerAddress {
        self.address
    }

    /// Stream endpoint type of the remote device.
    #[must_use]
    pub const fn endpoint(&self) -> Role {
        self.endpoint
    }

    /// The service class the local device exposes towards this peer.
    #[must_use]
    pub const fn local_service_class(&self) -> ServiceClass {
        match self.endpoint {
            Role::Sink => ServiceClass::AudioSource,
            Role::Source => ServiceClass::AudioSink,
        }
    }

    /// Lower-transport handle; [`crate::av::STREAM_HANDLE_UNKNOWN`] until
    /// bound.
    #[must_use]
    pub const fn handle(&self) -> StreamHandle {
        self.handle
    }

    /// Bind or correct the lower-transport handle.
    pub fn set_handle(&mut self, handle: StreamHandle) {
        self.handle = handle;
    }

    /// Peer id within the role.
    #[must_use]
    pub const fn id(&self) -> u8 {
        self.id
    }

    /// Current state-machine state.
    #[must_use]
    pub const fn state(&self) -> PeerState {
        self.state
    }

    /// State before the last transition; `None` for a fresh peer.
    #[must_use]
    pub const fn previous_state(&self) -> Option<PeerState> {
        self.previous_state
    }

    pub(crate) fn enter_state(&mut self, state: PeerState) {
        self.previous_state = Some(self.state);
        self.state = state;
    }

    /// Flag bits.
    #[must_use]
    pub const fn flags(&self) -> PeerFlags {
        self.flags
    }

    /// Mutable flag bits.
    pub fn flags_mut(&mut self) -> &mut PeerFlags {
        &mut self.flags
    }

    /// Transport rate of the connection.
    #[must_use]
    pub const fn edr(&self) -> EdrProfile {
        self.edr
    }

    /// Record the transport rate reported at open.
    pub fn set_edr(&mut self, edr: EdrProfile) {
        self.edr = edr;
    }

    /// Whether the most recent connection attempt was outbound.
    #[must_use]
    pub const fn self_initiated(&self) -> bool {
        self.self_initiated
    }

    /// Record who initiated the most recent connection attempt.
    pub fn set_self_initiated(&mut self, self_initiated: bool) {
        self.self_initiated = self_initiated;
    }

    /// Whether the peer is excluded from audio routing decisions.
    #[must_use]
    pub const fn is_silenced(&self) -> bool {
        self.silenced
    }

    /// Toggle silence mode.
    pub fn set_silenced(&mut self, silenced: bool) {
        self.silenced = silenced;
    }

    /// Last delay report announced by the peer, in 1/10 ms.
    #[must_use]
    pub const fn delay_report(&self) -> u16 {
        self.delay_report
    }

    /// Record a delay report.
    pub fn set_delay_report(&mut self, delay_tenths_ms: u16) {
        self.delay_report = delay_tenths_ms;
    }

    /// Host policy: restrict this peer to the mandatory codec.
    #[must_use]
    pub const fn mandatory_codec_preferred(&self) -> bool {
        self.mandatory_codec_preferred
    }

    /// Record the mandatory-codec policy answer.
    pub fn set_mandatory_codec_preferred(&mut self, preferred: bool) {
        self.mandatory_codec_preferred = preferred;
    }

    /// Last requested low-latency mode.
    #[must_use]
    pub const fn use_latency_mode(&self) -> bool {
        self.use_latency_mode
    }

    /// Record the requested low-latency mode.
    pub fn set_use_latency_mode(&mut self, use_latency_mode: bool) {
        self.use_latency_mode = use_latency_mode;
    }

    /// Arm the one-shot AVRCP-without-AV upgrade timer.
    pub fn arm_open_on_rc_timer(&mut self) {
        self.open_on_rc_deadline = Some(Instant::now() + OPEN_ON_RC_TIMEOUT);
    }

    /// Cancel the AVRCP-without-AV upgrade timer.
    pub fn cancel_open_on_rc_timer(&mut self) {
        self.open_on_rc_deadline = None;
    }

    /// Deadline of the armed upgrade timer, if any.
    #[must_use]
    pub const fn open_on_rc_deadline(&self) -> Option<Instant> {
        self.open_on_rc_deadline
    }

    /// Whether the peer can be reclaimed by the idle sweep.
    #[must_use]
    pub fn can_be_deleted(&self) -> bool {
        self.state == PeerState::Idle && self.previous_state.is_some()
    }

    /// Whether the AVDTP connection is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self.state, PeerState::Opened | PeerState::Started)
    }

    /// Whether the stream is running.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.state == PeerState::Started
    }

    /// Diagnostic snapshot of this peer.
    #[must_use]
    pub fn snapshot(&self) -> PeerSnapshot {
        PeerSnapshot {
            address: self.address.format_hex(),
            connected: self.is_connected(),
            streaming: self.is_streaming(),
            endpoint: self.endpoint.label(),
            state: self.state.label(),
            flags: self.flags.symbolic(),
            open_on_rc_timer_armed: self.open_on_rc_deadline.is_some(),
            handle: self.handle,
            peer_id: self.id,
            edr: self.edr.is_edr(),
            three_mbps: self.edr.is_3mbps(),
            self_initiated: self.self_initiated,
            silenced: self.silenced,
            delay_report_tenths_ms: self.delay_report,
            mandatory_codec_preferred: self.mandatory_codec_preferred,
        }
    }
}

/// Serializable diagnostic view of one peer.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PeerSnapshot {
    /// Formatted device address.
    pub address: String<17>,
    /// Whether the AVDTP connection is up.
    pub connected: bool,
    /// Whether the stream is running.
    pub streaming: bool,
    /// Remote endpoint type label.
    pub endpoint: &'static str,
    /// State machine label.
    pub state: &'static str,
    /// Symbolic flag rendering.
    pub flags: String<64>,
    /// Whether the AVRCP-without-AV timer is armed.
    pub open_on_rc_timer_armed: bool,
    /// Lower-transport handle.
    pub handle: StreamHandle,
    /// Peer id within the role.
    pub peer_id: u8,
    /// EDR available.
    pub edr: bool,
    /// 3 Mbps EDR packets available.
    pub three_mbps: bool,
    /// The most recent connection attempt was outbound.
    pub self_initiated: bool,
    /// Excluded from audio routing.
    pub silenced: bool,
    /// Last delay report, in 1/10 ms.
    pub delay_report_tenths_ms: u16,
    /// Restricted to the mandatory codec.
    pub mandatory_codec_preferred: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> Peer {
        Peer::new(
            PeerAddress::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]),
            Role::Sink,
            0x41,
            0,
        )
    }

    #[test]
    fn test_fresh_peer_is_idle_and_not_deletable() {
        let peer = peer();
        assert_eq!(peer.state(), PeerState::Idle);
        assert_eq!(peer.previous_state(), None);
        assert!(!peer.can_be_deleted());
        assert!(!peer.is_connected());
        assert!(!peer.is_streaming());
    }

    #[test]
    fn test_peer_deletable_after_reentering_idle() {
        let mut peer = peer();
        peer.enter_state(PeerState::Opening);
        assert!(!peer.can_be_deleted());
        peer.enter_state(PeerState::Idle);
        assert_eq!(peer.previous_state(), Some(PeerState::Opening));
        assert!(peer.can_be_deleted());
    }

    #[test]
    fn test_connection_predicates_follow_state() {
        let mut peer = peer();
        peer.enter_state(PeerState::Opened);
        assert!(peer.is_connected());
        assert!(!peer.is_streaming());
        peer.enter_state(PeerState::Started);
        assert!(peer.is_connected());
        assert!(peer.is_streaming());
        peer.enter_state(PeerState::Closing);
        assert!(!peer.is_connected());
    }

    #[test]
    fn test_flags_set_clear_check() {
        let mut flags = PeerFlags::default();
        assert!(flags.is_empty());

        flags.set(PeerFlags::PENDING_START | PeerFlags::REMOTE_SUSPEND);
        assert!(flags.check(PeerFlags::PENDING_START));
        assert!(flags.check(PeerFlags::PENDING_START | PeerFlags::PENDING_STOP));
        assert!(!flags.check(PeerFlags::PENDING_STOP));

        flags.clear(PeerFlags::PENDING_START);
        assert!(!flags.check(PeerFlags::PENDING_START));
        assert!(flags.check(PeerFlags::REMOTE_SUSPEND));

        flags.clear_all();
        assert!(flags.is_empty());
    }

    #[test]
    fn test_flags_symbolic_rendering() {
        let mut flags = PeerFlags::default();
        assert_eq!(flags.symbolic().as_str(), "None");

        flags.set(PeerFlags::LOCAL_SUSPEND_PENDING | PeerFlags::PENDING_STOP);
        assert_eq!(
            flags.symbolic().as_str(),
            "LOCAL_SUSPEND_PENDING|PENDING_STOP"
        );
    }

    #[test]
    fn test_local_service_class_is_complement() {
        let remote_sink = peer();
        assert_eq!(
            remote_sink.local_service_class(),
            ServiceClass::AudioSource
        );

        let remote_source = Peer::new(PeerAddress::EMPTY, Role::Source, 0x42, 1);
        assert_eq!(
            remote_source.local_service_class(),
            ServiceClass::AudioSink
        );
    }

    #[test]
    fn test_snapshot_reflects_peer() {
        let mut peer = peer();
        peer.enter_state(PeerState::Opened);
        peer.set_edr(EdrProfile::EDR_3MBPS);
        peer.set_delay_report(150);
        peer.flags_mut().set(PeerFlags::PENDING_START);

        let snapshot = peer.snapshot();
        assert_eq!(snapshot.address.as_str(), "00:11:22:33:44:55");
        assert!(snapshot.connected);
        assert!(!snapshot.streaming);
        assert_eq!(snapshot.state, "Opened");
        assert_eq!(snapshot.endpoint, "Sink");
        assert_eq!(snapshot.flags.as_str(), "PENDING_START");
        assert!(snapshot.edr);
        assert!(snapshot.three_mbps);
        assert_eq!(snapshot.delay_report_tenths_ms, 150);
    }
}
