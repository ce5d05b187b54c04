//! The connection manager service.
//!
//! [`AvService`] owns both role registries and the collaborator objects,
//! and is mutated exclusively by the control task. It resolves inbound
//! events to a peer (by address, creating on demand, or by handle), runs
//! the state machine, and applies the registry-level follow-up work the
//! handlers emit.

use embassy_time::Instant;
use heapless::{Deque, String, Vec};

use crate::address::PeerAddress;
use crate::av::event::AvEvent;
use crate::av::peer::{Peer, PeerFlags, PeerSnapshot, PeerState};
use crate::av::registry::PeerRegistry;
use crate::av::state_machine::{self, FollowUp, FollowUps, SmContext};
use crate::av::{AvError, Role, ServiceClass, StreamHandle, STREAM_HANDLE_UNKNOWN};
use crate::callbacks::HostCallbacks;
use crate::config::AvConfig;
use crate::constants::{MAX_AV_PEERS, MAX_EVENT_BURST, SINK_SERVICE_NAME, SOURCE_SERVICE_NAME};
use crate::rc::RcController;
use crate::session::{self, AudioFocusState, AudioSessionHooks, CodecPreference, MediaFrame};
use crate::transport::{Features, Transport, TransportEvent};

/// Serializable diagnostic view of one role.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RoleSnapshot {
    /// Whether the role is initialised.
    pub enabled: bool,
    /// Formatted address of the active peer.
    pub active_peer: String<17>,
    /// Snapshot of every known peer.
    pub peers: Vec<PeerSnapshot, MAX_AV_PEERS>,
}

/// Serializable diagnostic view of the whole service.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ServiceSnapshot {
    /// The Source role.
    pub source: RoleSnapshot,
    /// The Sink role.
    pub sink: RoleSnapshot,
}

/// The A2DP connection manager.
pub struct AvService<T, A, H, R> {
    transport: T,
    audio: A,
    callbacks: H,
    rc: R,
    config: AvConfig,
    source: PeerRegistry,
    sink: PeerRegistry,
}

impl<T, A, H, R> AvService<T, A, H, R>
where
    T: Transport,
    A: AudioSessionHooks,
    H: HostCallbacks,
    R: RcController,
{
    /// Create the service with its collaborators. Both roles start
    /// disabled; nothing touches the transport until an init call.
    pub fn new(transport: T, audio: A, callbacks: H, rc: R, config: AvConfig) -> Self {
        Self {
            transport,
            audio,
            callbacks,
            rc,
            config,
            source: PeerRegistry::new(Role::Source),
            sink: PeerRegistry::new(Role::Sink),
        }
    }

    /// The platform configuration the service was built with.
    #[must_use]
    pub const fn config(&self) -> &AvConfig {
        &self.config
    }

    /// The registry of `role`.
    #[must_use]
    pub fn registry(&self, role: Role) -> &PeerRegistry {
        match role {
            Role::Source => &self.source,
            Role::Sink => &self.sink,
        }
    }

    fn registry_mut(&mut self, role: Role) -> &mut PeerRegistry {
        match role {
            Role::Source => &mut self.source,
            Role::Sink => &mut self.sink,
        }
    }

    /// The role whose events an API call without explicit role addresses:
    /// Source when enabled, Sink otherwise.
    fn enabled_role(&self) -> Result<Role, AvError> {
        if self.source.is_enabled() {
            Ok(Role::Source)
        } else if self.sink.is_enabled() {
            Ok(Role::Sink)
        } else {
            Err(AvError::NotReady)
        }
    }

    fn source_features(&self) -> Features {
        // NO_SCO_SUSPEND keeps the transport from auto-suspending the
        // stream on call activity; suspends are driven from up here.
        let mut features =
            Features::RCTG | Features::METADATA | Features::VENDOR | Features::NO_SCO_SUSPEND;
        if self.config.delay_reporting_enabled {
            features |= Features::DELAY_REPORT;
        }
        if self.config.absolute_volume_enabled {
            features |= Features::RCCT | Features::ADV_CTRL | Features::BROWSE;
        }
        features
    }

    fn sink_features(&self) -> Features {
        let mut features = Features::NO_SCO_SUSPEND
            | Features::RCCT
            | Features::METADATA
            | Features::VENDOR
            | Features::ADV_CTRL
            | Features::RCTG
            | Features::BROWSE
            | Features::COVER_ART;
        if self.config.delay_reporting_enabled {
            features |= Features::DELAY_REPORT;
        }
        features
    }

    /// Initialise the Source role.
    ///
    /// # Errors
    /// [`AvError::InitFailed`] when the audio path refuses to come up.
    pub fn init_source(
        &mut self,
        max_connected_peers: usize,
        codec_priorities: &[CodecPreference],
        offload_capabilities: &[CodecPreference],
    ) -> Result<(), AvError> {
        if self.source.is_enabled() {
            return Ok(());
        }
        log::info!("init source: max_connected_peers={max_connected_peers}");

        self.source.cleanup_all();
        let offload = self.config.offload_enabled();
        self.source.set_offload_enabled(offload);
        log::debug!("offload enabled = {offload}");
        if offload {
            self.audio.update_offload_capabilities(offload_capabilities);
        }
        self.audio.configure_codec_priorities(codec_priorities);
        if !self.audio.init(Role::Source) {
            return Err(AvError::InitFailed);
        }

        self.transport.enable(self.source_features());
        for peer_id in 0..MAX_AV_PEERS as u8 {
            self.transport
                .register(SOURCE_SERVICE_NAME, peer_id, false, ServiceClass::AudioSource);
        }
        self.source.enable(max_connected_peers);
        Ok(())
    }

    /// Initialise the Sink role.
    ///
    /// # Errors
    /// [`AvError::InitFailed`] when the audio path refuses to come up.
    pub fn init_sink(&mut self, max_connected_peers: usize) -> Result<(), AvError> {
        if self.sink.is_enabled() {
            return Ok(());
        }
        log::info!("init sink: max_connected_peers={max_connected_peers}");

        self.sink.cleanup_all();
        self.audio.configure_codec_priorities(&[]);
        if !self.audio.init(Role::Sink) {
            return Err(AvError::InitFailed);
        }

        self.transport.enable(self.sink_features());
        for peer_id in 0..MAX_AV_PEERS as u8 {
            self.transport
                .register(SINK_SERVICE_NAME, peer_id, true, ServiceClass::AudioSink);
        }
        self.sink.enable(max_connected_peers);
        Ok(())
    }

    /// Tear the Source role down: quiesce the active peer, shut down the
    /// audio path, destroy all peers, deregister all handles.
    pub fn cleanup_source(&mut self) {
        if !self.source.is_enabled() {
            return;
        }
        log::info!("cleanup source");
        let _ = self.set_active_peer(Role::Source, PeerAddress::EMPTY);
        self.audio.cleanup(Role::Source);
        self.source.cleanup_all();
        for handle in self.source.bound_handles() {
            self.transport.deregister(handle);
        }
        self.source.clear_handle_bindings();
        self.transport.disable();
        self.source.disable();
        self.refresh_media_gate();
    }

    /// Tear the Sink role down, in the same order as the Source role.
    pub fn cleanup_sink(&mut self) {
        if !self.sink.is_enabled() {
            return;
        }
        log::info!("cleanup sink");
        let _ = self.set_active_peer(Role::Sink, PeerAddress::EMPTY);
        self.audio.cleanup(Role::Sink);
        self.sink.cleanup_all();
        for handle in self.sink.bound_handles() {
            self.transport.deregister(handle);
        }
        self.sink.clear_handle_bindings();
        self.transport.disable();
        self.sink.disable();
        self.refresh_media_gate();
    }

    /// Route one transport event to the owning peer and process it.
    ///
    /// `remote_endpoint` is the stream endpoint type of the remote device
    /// the event concerns: Sink events belong to the local Source role and
    /// vice versa.
    pub fn handle_transport_event(&mut self, remote_endpoint: Role, event: TransportEvent) {
        let local_role = remote_endpoint.complement();
        let event = AvEvent::Transport(event);
        log::debug!(
            "transport event for {} role: {}",
            local_role.label(),
            event.name()
        );

        let (address, handle) = {
            let AvEvent::Transport(inner) = &event else {
                return;
            };
            match inner {
                TransportEvent::Enabled { features } => {
                    log::debug!("service enabled, features=0x{:04x}", features.bits());
                    return;
                }
                TransportEvent::Registered { handle, peer_id } => {
                    log::debug!("registered handle=0x{handle:02x} peer_id={peer_id}");
                    self.registry_mut(local_role)
                        .handle_registered(*peer_id, *handle);
                    return;
                }
                TransportEvent::Opened(data) => (data.address, data.handle),
                TransportEvent::Closed { handle } => (PeerAddress::EMPTY, *handle),
                TransportEvent::Started(data) => (PeerAddress::EMPTY, data.handle),
                TransportEvent::Stopped(data) | TransportEvent::Suspended(data) => {
                    (PeerAddress::EMPTY, data.handle)
                }
                TransportEvent::Reconfigured { handle, .. } => (PeerAddress::EMPTY, *handle),
                TransportEvent::Pending { address } => (*address, STREAM_HANDLE_UNKNOWN),
                TransportEvent::Rejected { address, handle } => (*address, *handle),
                TransportEvent::ProtectRequest { handle }
                | TransportEvent::ProtectResponse { handle } => (PeerAddress::EMPTY, *handle),
                TransportEvent::RcOpened { address }
                | TransportEvent::RcClosed { address }
                | TransportEvent::RcBrowseOpened { address }
                | TransportEvent::RcBrowseClosed { address }
                | TransportEvent::RcFeatures { address, .. }
                | TransportEvent::RcCoverArtPsm { address, .. } => {
                    (*address, STREAM_HANDLE_UNKNOWN)
                }
                // Routed to whatever peer currently owns the audio session.
                TransportEvent::RemoteCommand { .. }
                | TransportEvent::RemoteResponse { .. }
                | TransportEvent::VendorCommand
                | TransportEvent::VendorResponse
                | TransportEvent::MetaMessage(_)
                | TransportEvent::OffloadStartResponse { .. } => {
                    (self.registry(local_role).active_peer(), STREAM_HANDLE_UNKNOWN)
                }
            }
        };

        self.drive(local_role, address, handle, event);
    }

    /// Feed a locally synthesized event to a peer of `local_role`.
    pub fn handle_local_event(&mut self, local_role: Role, address: PeerAddress, event: AvEvent) {
        self.drive(local_role, address, STREAM_HANDLE_UNKNOWN, event);
    }

    fn drive(&mut self, role: Role, address: PeerAddress, handle: StreamHandle, event: AvEvent) {
        let mut queue: Deque<(PeerAddress, StreamHandle, AvEvent), MAX_EVENT_BURST> = Deque::new();
        if queue.push_back((address, handle, event)).is_err() {
            return;
        }

        while let Some((address, handle, event)) = queue.pop_front() {
            let mut follow_ups = FollowUps::new();
            {
                let active_peer = self.registry(role).active_peer();
                let active_started_ready = self.started_ready(role);
                let connect_allowed = self.registry(role).allowed_to_connect(address);

                let Self {
                    transport,
                    audio,
                    callbacks,
                    rc,
                    source,
                    sink,
                    ..
                } = self;
                let registry = match role {
                    Role::Source => source,
                    Role::Sink => sink,
                };
                let peer = match registry.resolve(address, handle) {
                    Ok(peer) => peer,
                    Err(err) => {
                        log::error!(
                            "cannot find or create {} peer for address={} handle=0x{:02x} ({:?}): event {} dropped",
                            role.label(),
                            address,
                            handle,
                            err,
                            event.name()
                        );
                        continue;
                    }
                };
                let ctx = SmContext {
                    transport: &*transport,
                    audio: &*audio,
                    callbacks: &*callbacks,
                    rc: &*rc,
                    active_peer,
                    active_started_ready,
                    connect_allowed,
                };
                if !state_machine::process_event(peer, &event, &ctx, &mut follow_ups) {
                    log::warn!(
                        "peer {} state {}: unhandled event {}",
                        peer.address(),
                        peer.state().label(),
                        event.name()
                    );
                }
            }

            for follow_up in follow_ups {
                match follow_up {
                    FollowUp::ClearActivePeer => {
                        let _ = self.set_active_peer(role, PeerAddress::EMPTY);
                    }
                    FollowUp::SetActivePeer(peer_address) => {
                        if self.set_active_peer(role, peer_address).is_err() {
                            log::error!(
                                "error setting {} as active {} peer",
                                peer_address,
                                role.label()
                            );
                        }
                    }
                    FollowUp::DeleteIdlePeers => self.registry_mut(role).delete_idle_peers(),
                    FollowUp::Dispatch(peer_address, next) => {
                        if queue
                            .push_back((peer_address, STREAM_HANDLE_UNKNOWN, next))
                            .is_err()
                        {
                            log::error!("follow-up event queue overflow");
                        }
                    }
                }
            }
            self.refresh_media_gate();
        }
    }

    /// Swap the active peer of `role`, or clear it with an empty address.
    ///
    /// Clearing ends the running session and begins an audio shutdown whose
    /// completion the control task awaits with a bounded deadline. For a
    /// non-empty address the audio session is restarted towards the new
    /// peer first and the registry is only updated on success.
    ///
    /// # Errors
    /// [`AvError::NotConnected`] when the peer is absent or not connected,
    /// [`AvError::SessionRestartFailed`] when the audio session could not
    /// be moved.
    pub fn set_active_peer(&mut self, role: Role, address: PeerAddress) -> Result<(), AvError> {
        log::info!(
            "set active {} peer: {}",
            role.label(),
            address
        );
        if self.registry(role).active_peer() == address {
            return Ok(()); // Nothing has changed
        }

        if address.is_empty() {
            log::debug!("peer address is empty, shutting down the audio path");
            if !self.audio.set_codec_active_peer(PeerAddress::EMPTY) {
                log::warn!("unable to clear active peer in the codec layer");
            }
            let previous = self.registry(role).active_peer();
            self.audio.end_session(previous);
            self.audio.begin_shutdown();
            self.registry_mut(role).set_active_peer(PeerAddress::EMPTY);
            self.refresh_media_gate();
            return Ok(());
        }

        let connected = self
            .registry(role)
            .find(address)
            .is_some_and(Peer::is_connected);
        if !connected {
            log::error!(
                "error setting {} as active {} peer",
                address,
                role.label()
            );
            return Err(AvError::NotConnected);
        }

        let previous = self.registry(role).active_peer();
        if !self.audio.restart_session(previous, address) {
            return Err(AvError::SessionRestartFailed);
        }
        self.registry_mut(role).set_active_peer(address);
        self.refresh_media_gate();
        Ok(())
    }

    /// Connect to `address` on whichever role is enabled.
    ///
    /// # Errors
    /// [`AvError::NotReady`] when neither role is initialised.
    pub fn connect(&mut self, address: PeerAddress) -> Result<(), AvError> {
        let role = self.enabled_role()?;
        log::info!("connect peer {}", address);
        self.handle_local_event(role, address, AvEvent::ConnectRequest);
        Ok(())
    }

    /// Disconnect `address` on whichever role is enabled.
    ///
    /// # Errors
    /// [`AvError::NotReady`] when neither role is initialised.
    pub fn disconnect(&mut self, address: PeerAddress) -> Result<(), AvError> {
        let role = self.enabled_role()?;
        log::info!("disconnect peer {}", address);
        self.handle_local_event(role, address, AvEvent::DisconnectRequest);
        Ok(())
    }

    /// The underlying ACL link to `address` dropped.
    pub fn acl_disconnected(&mut self, address: PeerAddress) {
        log::info!("peer {}: ACL disconnected", address);
        if let Ok(role) = self.enabled_role() {
            self.handle_local_event(role, address, AvEvent::AclDisconnected);
        }
    }

    /// Start streaming on the Source role's active peer.
    pub fn stream_start(&mut self, use_latency_mode: Option<bool>) {
        let active = self.source.active_peer();
        self.handle_local_event(
            Role::Source,
            active,
            AvEvent::StartStreamRequest { use_latency_mode },
        );
    }

    /// Stop streaming; with an empty address every Started Source peer is
    /// stopped (the active peer may have changed mid-reconfiguration).
    pub fn stream_stop(&mut self, address: PeerAddress) {
        if !address.is_empty() {
            self.handle_local_event(Role::Source, address, AvEvent::StopStreamRequest);
            return;
        }
        self.fan_out_to_started(AvEvent::StopStreamRequest);
    }

    /// Suspend streaming on every Started Source peer.
    pub fn stream_suspend(&mut self) {
        self.fan_out_to_started(AvEvent::SuspendStreamRequest);
    }

    fn fan_out_to_started(&mut self, event: AvEvent) {
        let started: Vec<PeerAddress, MAX_AV_PEERS> = self
            .source
            .peers()
            .filter(|peer| peer.is_streaming())
            .map(Peer::address)
            .collect();
        if started.is_empty() {
            self.audio.on_stopped(None);
            return;
        }
        for address in started {
            self.handle_local_event(Role::Source, address, event.clone());
        }
    }

    /// Start the offload path on the Source role's active peer.
    pub fn stream_start_offload(&mut self) {
        let active = self.source.active_peer();
        self.handle_local_event(Role::Source, active, AvEvent::OffloadStartRequest);
    }

    /// Toggle low-latency mode on the Source role's active peer.
    pub fn set_low_latency(&mut self, low_latency: bool) {
        let active = self.source.active_peer();
        self.handle_local_event(Role::Source, active, AvEvent::SetLatencyRequest { low_latency });
    }

    /// Put a connected Source-role peer in (or out of) silence mode.
    ///
    /// # Errors
    /// [`AvError::InvalidParam`] for the empty address,
    /// [`AvError::PeerNotFound`] / [`AvError::NotConnected`] accordingly.
    pub fn set_silence_peer(&mut self, address: PeerAddress, silence: bool) -> Result<(), AvError> {
        if address.is_empty() {
            return Err(AvError::InvalidParam);
        }
        log::info!("set silence {} on {}", silence, address);
        let peer = self
            .source
            .find_mut(address)
            .ok_or(AvError::PeerNotFound)?;
        if !peer.is_connected() {
            return Err(AvError::NotConnected);
        }
        peer.set_silenced(silence);
        Ok(())
    }

    /// Whether a connected Source-role peer is in silence mode.
    #[must_use]
    pub fn is_peer_silenced(&self, address: PeerAddress) -> bool {
        self.source
            .find(address)
            .is_some_and(|peer| peer.is_connected() && peer.is_silenced())
    }

    /// Apply new codec preferences; ends the running session first when the
    /// peer is the active one.
    ///
    /// # Errors
    /// [`AvError::NotReady`] when the Source role is disabled,
    /// [`AvError::InvalidParam`] for the empty address.
    pub fn configure_codec(
        &mut self,
        address: PeerAddress,
        preferences: &[CodecPreference],
    ) -> Result<(), AvError> {
        if !self.source.is_enabled() {
            return Err(AvError::NotReady);
        }
        if address.is_empty() {
            return Err(AvError::InvalidParam);
        }
        if self.source.active_peer() == address {
            self.audio.end_session(address);
        }
        self.audio.update_codec_config(address, preferences);
        Ok(())
    }

    /// Record a delay report for `address` and forward it to the audio
    /// session when the peer is the active remote Sink.
    pub fn set_audio_delay(&mut self, address: PeerAddress, delay_tenths_ms: u16) {
        let Ok(role) = self.enabled_role() else {
            return;
        };
        let active = self.registry(role).active_peer();
        let mut forward = false;
        if let Some(peer) = self.registry_mut(role).find_mut(address) {
            if peer.endpoint() == Role::Sink {
                peer.set_delay_report(delay_tenths_ms);
                forward = peer.address() == active;
            }
        }
        if forward {
            self.audio.set_remote_delay(delay_tenths_ms);
        }
    }

    /// Delay report of the active remote Sink, in 1/10 ms; zero if none.
    #[must_use]
    pub fn audio_delay(&self) -> u16 {
        self.active_peer_of_enabled_role()
            .filter(|peer| peer.endpoint() == Role::Sink)
            .map_or(0, Peer::delay_report)
    }

    /// Clear the remote-suspend flag of the active peer (audio-path
    /// recovery hook).
    pub fn clear_remote_suspend_flag(&mut self) {
        let Ok(role) = self.enabled_role() else {
            return;
        };
        let active = self.registry(role).active_peer();
        if let Some(peer) = self.registry_mut(role).find_mut(active) {
            log::debug!(
                "peer {}: clearing remote suspend flag",
                peer.address()
            );
            peer.flags_mut().clear(PeerFlags::REMOTE_SUSPEND);
        } else {
            log::warn!("no active peer found");
        }
    }

    fn active_peer_of_enabled_role(&self) -> Option<&Peer> {
        let role = self.enabled_role().ok()?;
        let registry = self.registry(role);
        registry.find(registry.active_peer())
    }

    /// Whether the active peer has its AVDTP connection up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.active_peer_of_enabled_role()
            .is_some_and(Peer::is_connected)
    }

    /// Stream endpoint type of the active peer; remote Sink if none.
    #[must_use]
    pub fn active_peer_endpoint(&self) -> Role {
        self.active_peer_of_enabled_role()
            .map_or(Role::Sink, Peer::endpoint)
    }

    /// Whether the connection of `address` runs at an EDR rate.
    #[must_use]
    pub fn is_peer_edr(&self, address: PeerAddress) -> bool {
        self.find_in_enabled_role(address)
            .is_some_and(|peer| peer.is_connected() && peer.edr().is_edr())
    }

    /// Whether the connection of `address` supports 3 Mbps EDR packets.
    #[must_use]
    pub fn peer_supports_3mbps(&self, address: PeerAddress) -> bool {
        self.find_in_enabled_role(address)
            .is_some_and(|peer| peer.is_connected() && peer.edr().is_3mbps())
    }

    /// Whether host policy restricts `address` to the mandatory codec.
    #[must_use]
    pub fn peer_prefers_mandatory_codec(&self, address: PeerAddress) -> bool {
        self.find_in_enabled_role(address)
            .is_some_and(Peer::mandatory_codec_preferred)
    }

    fn find_in_enabled_role(&self, address: PeerAddress) -> Option<&Peer> {
        let role = self.enabled_role().ok()?;
        self.registry(role).find(address)
    }

    /// Whether the active peer's stream can be started: connection Opened
    /// and neither a remote suspend nor a stop pending.
    #[must_use]
    pub fn stream_ready(&self) -> bool {
        let Some(peer) = self.active_peer_of_enabled_role() else {
            log::warn!("no active peer found");
            return false;
        };
        if peer
            .flags()
            .check(PeerFlags::REMOTE_SUSPEND | PeerFlags::PENDING_STOP)
        {
            return false;
        }
        peer.state() == PeerState::Opened
    }

    /// Whether the active peer is streaming with no suspend or stop in
    /// flight; the media task polls this before touching the stream.
    #[must_use]
    pub fn stream_started_ready(&self) -> bool {
        self.enabled_role()
            .map(|role| self.started_ready(role))
            .unwrap_or(false)
    }

    fn started_ready(&self, role: Role) -> bool {
        let registry = self.registry(role);
        let Some(peer) = registry.find(registry.active_peer()) else {
            return false;
        };
        if peer.flags().check(
            PeerFlags::LOCAL_SUSPEND_PENDING
                | PeerFlags::REMOTE_SUSPEND
                | PeerFlags::PENDING_STOP,
        ) {
            return false;
        }
        peer.state() == PeerState::Started
    }

    /// Forward a Source codec state change to the host.
    pub fn report_source_codec_state(
        &self,
        address: PeerAddress,
        current: CodecPreference,
        local_capabilities: &[CodecPreference],
        selectable_capabilities: &[CodecPreference],
    ) {
        if self.source.is_enabled() {
            self.callbacks.source_codec_config(
                address,
                current,
                local_capabilities,
                selectable_capabilities,
            );
        }
    }

    /// Forward the host's audio focus decision to the Sink decoder path.
    pub fn set_audio_focus_state(&self, state: AudioFocusState) {
        self.audio.set_audio_focus_state(state);
    }

    /// Forward the host's track gain to the Sink decoder path.
    pub fn set_audio_track_gain(&self, gain: f32) {
        self.audio.set_audio_track_gain(gain);
    }

    /// Resize the encoder path's dynamic audio buffer.
    pub fn set_dynamic_audio_buffer_size(&self, size: u8) {
        self.audio.set_dynamic_audio_buffer_size(size);
    }

    /// Hand one decoded frame to the session queue, if the originating peer
    /// is the active Sink-role peer in a streaming-capable state.
    pub fn on_sink_media(&mut self, frame: MediaFrame) {
        let Some(peer) = self.sink.find(frame.address) else {
            log::debug!(
                "dropping media frame from unknown peer {}",
                frame.address
            );
            return;
        };
        if peer.address() == self.sink.active_peer()
            && matches!(peer.state(), PeerState::Started | PeerState::Opened)
        {
            let depth = self.audio.enqueue(frame);
            log::debug!("sink queue depth {depth}");
        }
    }

    /// A remote Source announced its audio configuration.
    pub fn on_sink_media_config(
        &mut self,
        address: PeerAddress,
        sample_rate: u32,
        channel_count: u8,
    ) {
        self.handle_local_event(
            Role::Sink,
            address,
            AvEvent::SinkConfigRequest {
                address,
                sample_rate,
                channel_count,
            },
        );
    }

    /// Earliest armed AVRCP-without-AV deadline across both roles.
    #[must_use]
    pub fn next_rc_deadline(&self) -> Option<(Role, PeerAddress, Instant)> {
        let mut next: Option<(Role, PeerAddress, Instant)> = None;
        for role in [Role::Source, Role::Sink] {
            for peer in self.registry(role).peers() {
                if let Some(deadline) = peer.open_on_rc_deadline() {
                    if next.map_or(true, |(_, _, at)| deadline < at) {
                        next = Some((role, peer.address(), deadline));
                    }
                }
            }
        }
        next
    }

    /// The AVRCP-without-AV timer of `address` fired: if AVRCP is still
    /// connected, upgrade to a full AV connection.
    pub fn handle_rc_open_timeout(&mut self, role: Role, address: PeerAddress) {
        log::debug!("AV open timer fired for {}", address);
        let Some(peer) = self.registry_mut(role).find_mut(address) else {
            return;
        };
        peer.cancel_open_on_rc_timer();

        if !self.rc.is_connected(address) {
            log::error!("AVRCP peer {} is not connected", address);
            return;
        }
        if self.registry(role).is_enabled() {
            log::debug!("connecting to AVRCP peer {}", address);
            self.handle_local_event(role, address, AvEvent::ConnectRequest);
        }
    }

    fn refresh_media_gate(&self) {
        let active = self.sink.active_peer();
        let open = self.sink.is_enabled()
            && self
                .sink
                .find(active)
                .is_some_and(|peer| matches!(peer.state(), PeerState::Started | PeerState::Opened));
        session::publish_media_gate(active, open);
    }

    /// Diagnostic snapshot of both roles.
    #[must_use]
    pub fn snapshot(&self) -> ServiceSnapshot {
        ServiceSnapshot {
            source: Self::role_snapshot(&self.source),
            sink: Self::role_snapshot(&self.sink),
        }
    }

    fn role_snapshot(registry: &PeerRegistry) -> RoleSnapshot {
        RoleSnapshot {
            enabled: registry.is_enabled(),
            active_peer: registry.active_peer().format_hex(),
            peers: registry.peers().map(Peer::snapshot).collect(),
        }
    }
}
