//! The per-peer connection state machine.
//!
//! Five states: Idle, Opening, Opened, Started, Closing. A handler returns
//! `true` when it consumed the event; unhandled events are logged by the
//! caller and leave peer state untouched. Transitions always run the old
//! state's exit actions and then the new state's entry actions.
//!
//! Handlers are fully synchronous. Side effects towards the transport, the
//! audio session, the RC module and the host happen inline through the
//! context; mutations that need the owning registry (active-peer changes,
//! the idle sweep, events for other peers) are emitted as [`FollowUp`]
//! actions and applied by the service after the handler returns.

use heapless::Vec;

use crate::address::PeerAddress;
use crate::av::event::AvEvent;
use crate::av::peer::{Peer, PeerFlags, PeerState};
use crate::av::Role;
use crate::callbacks::{AudioState, ConnectionState, HostCallbacks};
use crate::constants::MAX_FOLLOW_UPS;
use crate::rc::RcController;
use crate::session::AudioSessionHooks;
use crate::av::STREAM_HANDLE_UNKNOWN;
use crate::transport::{
    EdrProfile, RcKey, StartData, Transport, TransportEvent, TransportStatus,
};

/// Registry-level work emitted by a state handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FollowUp {
    /// Reset the owning role's active peer to empty.
    ClearActivePeer,
    /// Make this peer the owning role's active peer.
    SetActivePeer(PeerAddress),
    /// Run the idle-peer sweep on the owning role.
    DeleteIdlePeers,
    /// Feed a synthesized event to a peer of the owning role.
    Dispatch(PeerAddress, AvEvent),
}

pub(crate) type FollowUps = Vec<FollowUp, MAX_FOLLOW_UPS>;

/// Read-only surroundings of one state-machine step.
pub(crate) struct SmContext<'a, T, A, H, R> {
    pub transport: &'a T,
    pub audio: &'a A,
    pub callbacks: &'a H,
    pub rc: &'a R,
    /// Active peer of the registry owning this peer.
    pub active_peer: PeerAddress,
    /// Whether that active peer is started with no suspend/stop pending.
    pub active_started_ready: bool,
    /// Admission verdict for this peer's address.
    pub connect_allowed: bool,
}

fn is_active<T, A, H, R>(peer: &Peer, ctx: &SmContext<'_, T, A, H, R>) -> bool {
    peer.address() == ctx.active_peer
}

fn is_rc_event(event: &AvEvent) -> bool {
    matches!(
        event,
        AvEvent::Transport(
            TransportEvent::RcOpened { .. }
                | TransportEvent::RcClosed { .. }
                | TransportEvent::RcBrowseOpened { .. }
                | TransportEvent::RcBrowseClosed { .. }
                | TransportEvent::RemoteCommand { .. }
                | TransportEvent::RemoteResponse { .. }
                | TransportEvent::VendorCommand
                | TransportEvent::VendorResponse
                | TransportEvent::MetaMessage(_)
                | TransportEvent::RcFeatures { .. }
                | TransportEvent::RcCoverArtPsm { .. }
        )
    )
}

fn failed_start(peer: &Peer) -> StartData {
    StartData {
        handle: peer.handle(),
        status: TransportStatus::FailStream,
        suspending: true,
        initiator: true,
    }
}

/// Run one event through the peer's current state. Returns `false` when
/// the state declared the event unhandled.
pub(crate) fn process_event<T, A, H, R>(
    peer: &mut Peer,
    event: &AvEvent,
    ctx: &SmContext<'_, T, A, H, R>,
    out: &mut FollowUps,
) -> bool
where
    T: Transport,
    A: AudioSessionHooks,
    H: HostCallbacks,
    R: RcController,
{
    log::debug!(
        "peer {} state={} event={} flags={} active={}",
        peer.address(),
        peer.state().label(),
        event.name(),
        peer.flags().symbolic(),
        is_active(peer, ctx)
    );

    match peer.state() {
        PeerState::Idle => idle(peer, event, ctx, out),
        PeerState::Opening => opening(peer, event, ctx, out),
        PeerState::Opened => opened(peer, event, ctx, out),
        PeerState::Started => started(peer, event, ctx, out),
        PeerState::Closing => closing(peer, event, ctx, out),
    }
}

fn transition<T, A, H, R>(
    peer: &mut Peer,
    to: PeerState,
    ctx: &SmContext<'_, T, A, H, R>,
    out: &mut FollowUps,
) where
    T: Transport,
    A: AudioSessionHooks,
    H: HostCallbacks,
    R: RcController,
{
    on_exit(peer);
    peer.enter_state(to);
    on_enter(peer, ctx, out);
}

fn on_exit(peer: &mut Peer) {
    match peer.state() {
        PeerState::Idle => peer.cancel_open_on_rc_timer(),
        PeerState::Opened => peer.flags_mut().clear(PeerFlags::PENDING_START),
        _ => {}
    }
}

fn on_enter<T, A, H, R>(peer: &mut Peer, ctx: &SmContext<'_, T, A, H, R>, out: &mut FollowUps)
where
    T: Transport,
    A: AudioSessionHooks,
    H: HostCallbacks,
    R: RcController,
{
    match peer.state() {
        PeerState::Idle => {
            peer.set_edr(EdrProfile::NONE);
            peer.flags_mut().clear_all();

            // Stop the audio path if this was the peer it is coupled to.
            if is_active(peer, ctx) || ctx.active_peer.is_empty() {
                ctx.audio.on_idle();
            }
            if is_active(peer, ctx) && peer.can_be_deleted() {
                out.push(FollowUp::ClearActivePeer).ok();
            }
            out.push(FollowUp::DeleteIdlePeers).ok();
        }
        PeerState::Opening => {
            ctx.callbacks
                .connection_state(peer.address(), ConnectionState::Connecting);
        }
        PeerState::Opened => {
            peer.flags_mut().clear(
                PeerFlags::LOCAL_SUSPEND_PENDING
                    | PeerFlags::PENDING_START
                    | PeerFlags::PENDING_STOP,
            );
            // A Sink activates the first connected device itself; a Source
            // leaves that decision to the host's device manager.
            if peer.endpoint() == Role::Source && ctx.active_peer.is_empty() {
                out.push(FollowUp::SetActivePeer(peer.address())).ok();
            }
        }
        PeerState::Started => {
            peer.flags_mut().clear(PeerFlags::REMOTE_SUSPEND);
            ctx.audio.set_rx_flush(false);
            ctx.callbacks
                .audio_state(peer.address(), AudioState::Started);
        }
        PeerState::Closing => {
            if is_active(peer, ctx) {
                if peer.endpoint() == Role::Sink {
                    // Immediately stop transmission of frames.
                    ctx.audio.set_tx_flush(true);
                } else {
                    ctx.audio.set_rx_flush(true);
                }
            }
        }
    }
}

fn idle<T, A, H, R>(
    peer: &mut Peer,
    event: &AvEvent,
    ctx: &SmContext<'_, T, A, H, R>,
    out: &mut FollowUps,
) -> bool
where
    T: Transport,
    A: AudioSessionHooks,
    H: HostCallbacks,
    R: RcController,
{
    match event {
        AvEvent::StopStreamRequest | AvEvent::SuspendStreamRequest | AvEvent::AclDisconnected => {
            // Re-enter Idle so the peer becomes eligible for deletion.
            transition(peer, PeerState::Idle, ctx, out);
        }

        AvEvent::DisconnectRequest => {
            if peer.handle() != STREAM_HANDLE_UNKNOWN {
                ctx.transport.close(peer.handle());
                if peer.endpoint() == Role::Source {
                    ctx.transport.close_rc(peer.handle());
                }
            }
            transition(peer, PeerState::Idle, ctx, out);
        }

        AvEvent::ConnectRequest | AvEvent::Transport(TransportEvent::Pending { .. }) => {
            peer.set_self_initiated(matches!(event, AvEvent::ConnectRequest));
            if !ctx.connect_allowed {
                log::error!(
                    "cannot connect peer {}: too many connected peers",
                    peer.address()
                );
                out.push(FollowUp::Dispatch(peer.address(), AvEvent::DisconnectRequest))
                    .ok();
                return true;
            }
            peer.set_mandatory_codec_preferred(
                ctx.callbacks.mandatory_codec_preferred(peer.address()),
            );
            ctx.transport.open(
                peer.address(),
                peer.handle(),
                true,
                peer.local_service_class(),
            );
            transition(peer, PeerState::Opening, ctx, out);
        }

        AvEvent::AvrcpOpened | AvEvent::Transport(TransportEvent::RcOpened { .. }) => {
            // Some headsets bring up AVRCP first and never follow with AV.
            // Arm a timer that upgrades the connection if AV does not
            // arrive on its own.
            log::warn!(
                "peer {}: {} without AV connection",
                peer.address(),
                event.name()
            );
            if !ctx.connect_allowed {
                log::error!(
                    "cannot connect peer {}: too many connected peers",
                    peer.address()
                );
                out.push(FollowUp::Dispatch(peer.address(), AvEvent::DisconnectRequest))
                    .ok();
                return true;
            }
            peer.arm_open_on_rc_timer();
            if is_rc_event(event) {
                ctx.rc.handle_event(peer.address(), event);
            }
        }

        AvEvent::AvrcpClosed | AvEvent::Transport(TransportEvent::RcClosed { .. }) => {
            log::debug!(
                "peer {}: {}: stopping AV open timer",
                peer.address(),
                event.name()
            );
            peer.cancel_open_on_rc_timer();
            if is_rc_event(event) {
                ctx.rc.handle_event(peer.address(), event);
            }
        }

        // A remote can run its streaming procedure while we still consider
        // the signalling channel down; configuration must be reported from
        // Idle as well.
        AvEvent::SinkConfigRequest {
            address,
            sample_rate,
            channel_count,
        } => {
            if peer.endpoint() == Role::Source {
                ctx.callbacks
                    .sink_audio_config(*address, *sample_rate, *channel_count);
            }
        }

        AvEvent::Transport(TransportEvent::Opened(data)) => {
            log::info!(
                "peer {} open: status={:?} edr={:?}",
                peer.address(),
                data.status,
                data.edr
            );
            if data.status.is_success() {
                peer.set_edr(data.edr);
                if !ctx.connect_allowed {
                    log::error!(
                        "cannot connect peer {}: too many connected peers",
                        peer.address()
                    );
                    out.push(FollowUp::Dispatch(peer.address(), AvEvent::DisconnectRequest))
                        .ok();
                    return true;
                }
                ctx.callbacks
                    .connection_state(peer.address(), ConnectionState::Connected);
                transition(peer, PeerState::Opened, ctx, out);
                if peer.endpoint() == Role::Sink {
                    ctx.rc.check_pending_play(peer.address(), true);
                } else {
                    ctx.transport.open_rc(peer.handle());
                }
            } else {
                ctx.callbacks
                    .connection_state(peer.address(), ConnectionState::Disconnected);
                transition(peer, PeerState::Idle, ctx, out);
                if peer.endpoint() == Role::Sink {
                    ctx.rc.check_pending_play(peer.address(), false);
                }
            }
        }

        AvEvent::OffloadStartRequest => {
            log::error!(
                "peer {}: offload start request while stream is not opened",
                peer.address()
            );
            ctx.audio
                .on_offload_started(peer.address(), TransportStatus::Fail);
        }

        event if is_rc_event(event) => ctx.rc.handle_event(peer.address(), event),

        _ => return false,
    }
    true
}

fn opening<T, A, H, R>(
    peer: &mut Peer,
    event: &AvEvent,
    ctx: &SmContext<'_, T, A, H, R>,
    out: &mut FollowUps,
) -> bool
where
    T: Transport,
    A: AudioSessionHooks,
    H: HostCallbacks,
    R: RcController,
{
    match event {
        AvEvent::StopStreamRequest | AvEvent::SuspendStreamRequest => {}

        // Opening is the one intermediate state where an ACL drop must be
        // acted on; everywhere else connect/disconnect requests cover it.
        AvEvent::AclDisconnected => {
            log::warn!(
                "peer {}: ACL disconnected while opening",
                peer.address()
            );
            ctx.callbacks
                .connection_state(peer.address(), ConnectionState::Disconnected);
            transition(peer, PeerState::Idle, ctx, out);
        }

        AvEvent::Transport(TransportEvent::Rejected { .. }) => {
            ctx.callbacks
                .connection_state(peer.address(), ConnectionState::Disconnected);
            transition(peer, PeerState::Idle, ctx, out);
        }

        AvEvent::Transport(TransportEvent::Opened(data)) => {
            log::info!(
                "peer {} open: status={:?} edr={:?}",
                peer.address(),
                data.status,
                data.edr
            );
            let success = data.status.is_success();
            if success {
                peer.set_edr(data.edr);
                ctx.callbacks
                    .connection_state(peer.address(), ConnectionState::Connected);
                transition(peer, PeerState::Opened, ctx, out);
            } else {
                // Tear down a lingering AVRCP leg if the AV open failed.
                if ctx.rc.is_connected(peer.address()) {
                    log::warn!(
                        "peer {}: disconnecting AVRCP after failed open",
                        peer.address()
                    );
                    if let Some(rc_handle) = ctx.rc.connected_handle(peer.address()) {
                        ctx.transport.close_rc(rc_handle);
                    }
                }
                ctx.callbacks
                    .connection_state(peer.address(), ConnectionState::Disconnected);
                transition(peer, PeerState::Idle, ctx, out);
            }
            if peer.endpoint() == Role::Sink {
                ctx.rc.check_pending_play(peer.address(), success);
            } else if success {
                ctx.transport.open_rc(peer.handle());
            }
        }

        AvEvent::SinkConfigRequest {
            address,
            sample_rate,
            channel_count,
        } => {
            if peer.endpoint() == Role::Source {
                ctx.callbacks
                    .sink_audio_config(*address, *sample_rate, *channel_count);
            }
        }

        AvEvent::ConnectRequest | AvEvent::Transport(TransportEvent::Pending { .. }) => {
            log::warn!(
                "peer {}: already connecting, ignoring {}",
                peer.address(),
                event.name()
            );
        }

        AvEvent::OffloadStartRequest => {
            log::error!(
                "peer {}: offload start request while stream is not opened",
                peer.address()
            );
            ctx.audio
                .on_offload_started(peer.address(), TransportStatus::Fail);
        }

        AvEvent::Transport(TransportEvent::Closed { .. }) => {
            ctx.audio.on_stopped(None);
            ctx.callbacks
                .connection_state(peer.address(), ConnectionState::Disconnected);
            transition(peer, PeerState::Idle, ctx, out);
        }

        AvEvent::DisconnectRequest => {
            ctx.transport.close(peer.handle());
            ctx.callbacks
                .connection_state(peer.address(), ConnectionState::Disconnected);
            transition(peer, PeerState::Idle, ctx, out);
        }

        event if is_rc_event(event) => ctx.rc.handle_event(peer.address(), event),

        _ => return false,
    }
    true
}

fn opened<T, A, H, R>(
    peer: &mut Peer,
    event: &AvEvent,
    ctx: &SmContext<'_, T, A, H, R>,
    out: &mut FollowUps,
) -> bool
where
    T: Transport,
    A: AudioSessionHooks,
    H: HostCallbacks,
    R: RcController,
{
    // A remote PLAY passthrough while we hold the remote-suspend flag means
    // the remote resumed; reset the flag before normal dispatch.
    if let AvEvent::Transport(TransportEvent::RemoteCommand { key: RcKey::Play }) = event {
        if peer.flags().check(PeerFlags::REMOTE_SUSPEND) {
            log::info!(
                "peer {}: resetting remote suspend flag on RC PLAY",
                peer.address()
            );
            peer.flags_mut().clear(PeerFlags::REMOTE_SUSPEND);
        }
    }

    match event {
        AvEvent::StopStreamRequest | AvEvent::SuspendStreamRequest | AvEvent::AclDisconnected => {}

        AvEvent::StartStreamRequest { use_latency_mode } => {
            if let Some(mode) = use_latency_mode {
                peer.set_use_latency_mode(*mode);
            }
            ctx.transport.start(peer.handle(), peer.use_latency_mode());
            peer.flags_mut().set(PeerFlags::PENDING_START);
        }

        AvEvent::Transport(TransportEvent::Started(data)) => {
            log::info!(
                "peer {} start: status={:?} suspending={} initiator={} flags={}",
                peer.address(),
                data.status,
                data.suspending,
                data.initiator,
                peer.flags().symbolic()
            );
            if data.status.is_success() && data.suspending {
                return true;
            }

            // A remote-initiated start towards a non-active or unprepared
            // Sink is taken down again right away with a local suspend.
            let mut should_suspend = false;
            if peer.endpoint() == Role::Sink {
                if !peer
                    .flags()
                    .check(PeerFlags::PENDING_START | PeerFlags::REMOTE_SUSPEND)
                {
                    log::warn!(
                        "peer {}: trigger suspend as remote initiated",
                        peer.address()
                    );
                    should_suspend = true;
                } else if !is_active(peer, ctx) {
                    log::warn!(
                        "peer {}: trigger suspend as non-active",
                        peer.address()
                    );
                    should_suspend = true;
                }

                if ctx.audio.on_started(peer.address(), Some(data)) {
                    // Only clear pending flag after acknowledgement.
                    peer.flags_mut().clear(PeerFlags::PENDING_START);
                }
            }

            // Remain in Opened if the start failed; the caller retries.
            if !data.status.is_success() {
                return false;
            }

            if should_suspend {
                out.push(FollowUp::Dispatch(
                    peer.address(),
                    AvEvent::SuspendStreamRequest,
                ))
                .ok();
            }
            transition(peer, PeerState::Started, ctx, out);
        }

        AvEvent::DisconnectRequest => {
            ctx.transport.close(peer.handle());
            if peer.endpoint() == Role::Source {
                ctx.transport.close_rc(peer.handle());
            }
            ctx.callbacks
                .connection_state(peer.address(), ConnectionState::Disconnecting);
            transition(peer, PeerState::Closing, ctx, out);
        }

        AvEvent::Transport(TransportEvent::Closed { .. }) => {
            if peer.flags().check(PeerFlags::PENDING_START) {
                log::warn!(
                    "peer {}: failed pending start request",
                    peer.address()
                );
                // The pending-start flag itself is cleared on state exit.
                ctx.audio
                    .on_started(peer.address(), Some(&failed_start(peer)));
            } else if is_active(peer, ctx) {
                ctx.audio.on_stopped(None);
            }
            ctx.callbacks
                .connection_state(peer.address(), ConnectionState::Disconnected);
            transition(peer, PeerState::Idle, ctx, out);
        }

        AvEvent::Transport(TransportEvent::Reconfigured { status, .. }) => {
            if !status.is_success() {
                log::warn!(
                    "peer {}: failed reconfiguration",
                    peer.address()
                );
                if peer.flags().check(PeerFlags::PENDING_START) {
                    peer.flags_mut().clear(PeerFlags::PENDING_START);
                    ctx.audio
                        .on_started(peer.address(), Some(&failed_start(peer)));
                }
                out.push(FollowUp::Dispatch(peer.address(), AvEvent::DisconnectRequest))
                    .ok();
                return true;
            }

            if is_active(peer, ctx) {
                log::info!(
                    "peer {}: reconfig done, restarting audio session",
                    peer.address()
                );
                ctx.audio.start_session(peer.address());
            }
            if peer.flags().check(PeerFlags::PENDING_START) {
                ctx.transport.start(peer.handle(), peer.use_latency_mode());
            }
        }

        AvEvent::ConnectRequest | AvEvent::Transport(TransportEvent::Pending { .. }) => {
            log::warn!(
                "peer {}: ignoring {} for already connected device",
                peer.address(),
                event.name()
            );
        }

        AvEvent::OffloadStartRequest => {
            log::error!(
                "peer {}: offload start request while stream is not started",
                peer.address()
            );
            ctx.audio
                .on_offload_started(peer.address(), TransportStatus::Fail);
        }

        AvEvent::AvrcpRemotePlay => {
            if peer.flags().check(PeerFlags::REMOTE_SUSPEND) {
                log::info!(
                    "peer {}: resetting remote suspend flag on RC PLAY",
                    peer.address()
                );
                peer.flags_mut().clear(PeerFlags::REMOTE_SUSPEND);
            }
        }

        AvEvent::SetLatencyRequest { low_latency } => {
            ctx.transport.set_latency(peer.handle(), *low_latency);
        }

        event if is_rc_event(event) => ctx.rc.handle_event(peer.address(), event),

        _ => return false,
    }
    true
}

fn started<T, A, H, R>(
    peer: &mut Peer,
    event: &AvEvent,
    ctx: &SmContext<'_, T, A, H, R>,
    out: &mut FollowUps,
) -> bool
where
    T: Transport,
    A: AudioSessionHooks,
    H: HostCallbacks,
    R: RcController,
{
    match event {
        AvEvent::AclDisconnected => {}

        AvEvent::StartStreamRequest { .. } => {
            // We were started remotely; just acknowledge the local request.
            if peer.endpoint() == Role::Sink {
                ctx.audio.on_started(peer.address(), None);
            }
        }

        AvEvent::StopStreamRequest | AvEvent::SuspendStreamRequest => {
            let stopping = matches!(event, AvEvent::StopStreamRequest);
            // Block the media task from restarting the stream while the
            // suspend is in flight; a local suspend overrides a remote one.
            peer.flags_mut().set(PeerFlags::LOCAL_SUSPEND_PENDING);
            peer.flags_mut().clear(PeerFlags::REMOTE_SUSPEND);

            if peer.endpoint() == Role::Sink
                && (is_active(peer, ctx) || !ctx.active_started_ready)
            {
                if stopping {
                    ctx.audio.on_stopped(None);
                } else {
                    // Ensure outbound frames stop right away.
                    ctx.audio.set_tx_flush(true);
                }
            } else if peer.endpoint() == Role::Source {
                ctx.audio.on_stopped(None);
            }
            ctx.transport.stop(peer.handle(), true);
        }

        AvEvent::DisconnectRequest => {
            ctx.transport.close(peer.handle());
            if peer.endpoint() == Role::Source {
                ctx.transport.close_rc(peer.handle());
            }
            ctx.callbacks
                .connection_state(peer.address(), ConnectionState::Disconnecting);
            transition(peer, PeerState::Closing, ctx, out);
        }

        AvEvent::Transport(TransportEvent::Suspended(data)) => {
            log::info!(
                "peer {} suspend: status={:?} initiator={} flags={}",
                peer.address(),
                data.status,
                data.initiator,
                peer.flags().symbolic()
            );
            if is_active(peer, ctx) || !ctx.active_started_ready {
                ctx.audio.on_suspended(Some(data));
            }

            if !data.status.is_success() {
                peer.flags_mut().clear(PeerFlags::LOCAL_SUSPEND_PENDING);
                if peer.endpoint() == Role::Sink && is_active(peer, ctx) {
                    // Suspend failed, resume transmission.
                    ctx.audio.set_tx_flush(false);
                }
                return false;
            }

            let state = if data.initiator {
                AudioState::Stopped
            } else {
                // Remote suspend blocks media restarts unless we already
                // initiated a local suspend ourselves.
                if !peer.flags().check(PeerFlags::LOCAL_SUSPEND_PENDING) {
                    peer.flags_mut().set(PeerFlags::REMOTE_SUSPEND);
                }
                AudioState::RemoteSuspend
            };
            ctx.callbacks.audio_state(peer.address(), state);
            transition(peer, PeerState::Opened, ctx, out);
        }

        AvEvent::Transport(TransportEvent::Stopped(data)) => {
            log::info!(
                "peer {} stop: status={:?} flags={}",
                peer.address(),
                data.status,
                peer.flags().symbolic()
            );
            peer.flags_mut().set(PeerFlags::PENDING_STOP);
            peer.flags_mut().clear(PeerFlags::LOCAL_SUSPEND_PENDING);

            // The encoder and audio provider are shared; a non-active peer
            // only touches them when the active stream is not ready anyway.
            if is_active(peer, ctx) || !ctx.active_started_ready {
                ctx.audio.on_stopped(Some(data));
            }
            ctx.callbacks
                .audio_state(peer.address(), AudioState::Stopped);

            if data.status.is_success() {
                transition(peer, PeerState::Opened, ctx, out);
            }
        }

        AvEvent::Transport(TransportEvent::Closed { .. }) => {
            peer.flags_mut().set(PeerFlags::PENDING_STOP);
            if is_active(peer, ctx) {
                ctx.audio.on_stopped(None);
            }
            ctx.callbacks
                .connection_state(peer.address(), ConnectionState::Disconnected);
            transition(peer, PeerState::Idle, ctx, out);
        }

        AvEvent::OffloadStartRequest => {
            if peer.flags().check(
                PeerFlags::LOCAL_SUSPEND_PENDING
                    | PeerFlags::REMOTE_SUSPEND
                    | PeerFlags::PENDING_STOP,
            ) {
                log::warn!(
                    "peer {}: stream is suspending, failing offload start",
                    peer.address()
                );
                ctx.audio
                    .on_offload_started(peer.address(), TransportStatus::Fail);
            } else {
                ctx.transport.offload_start(peer.handle());
            }
        }

        AvEvent::Transport(TransportEvent::OffloadStartResponse { status }) => {
            ctx.audio.on_offload_started(peer.address(), *status);
        }

        AvEvent::SetLatencyRequest { low_latency } => {
            ctx.transport.set_latency(peer.handle(), *low_latency);
        }

        event if is_rc_event(event) => ctx.rc.handle_event(peer.address(), event),

        _ => return false,
    }
    true
}

fn closing<T, A, H, R>(
    peer: &mut Peer,
    event: &AvEvent,
    ctx: &SmContext<'_, T, A, H, R>,
    out: &mut FollowUps,
) -> bool
where
    T: Transport,
    A: AudioSessionHooks,
    H: HostCallbacks,
    R: RcController,
{
    match event {
        AvEvent::SuspendStreamRequest | AvEvent::AclDisconnected => {}

        AvEvent::Transport(TransportEvent::Stopped(_)) | AvEvent::StopStreamRequest => {
            if is_active(peer, ctx) {
                ctx.audio.on_stopped(None);
            }
        }

        AvEvent::Transport(TransportEvent::Closed { .. }) => {
            ctx.callbacks
                .connection_state(peer.address(), ConnectionState::Disconnected);
            transition(peer, PeerState::Idle, ctx, out);
        }

        AvEvent::Transport(
            TransportEvent::RcClosed { .. } | TransportEvent::RcBrowseClosed { .. },
        ) => {
            ctx.rc.handle_event(peer.address(), event);
        }

        AvEvent::OffloadStartRequest => {
            log::error!(
                "peer {}: offload start request while stream is not opened",
                peer.address()
            );
            ctx.audio
                .on_offload_started(peer.address(), TransportStatus::Fail);
        }

        AvEvent::ConnectRequest => {
            log::warn!(
                "peer {}: ignoring connect request while closing",
                peer.address()
            );
            transition(peer, PeerState::Idle, ctx, out);
        }

        _ => return false,
    }
    true
}
